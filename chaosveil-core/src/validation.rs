//! Reproducibility checks: distance/similarity preservation and end-to-end
//! retrieval accuracy over encrypted vectors.

use std::fmt;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    engine::ObfuscationEngine,
    error::{VeilError, VeilResult},
    search::{cosine_similarity, euclidean_distance, indexed_candidates},
};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationStatus {
    Pass,
    Fail,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct ValidationCriteria {
    /// Top-1 accuracy, in percent, that a passing run must exceed.
    pub min_accuracy: f64,
    /// Bound on every probe error.
    pub tolerance: f64,
}

impl Default for ValidationCriteria {
    fn default() -> Self {
        Self {
            min_accuracy: 90.0,
            tolerance: 1e-9,
        }
    }
}

/// Worst-case numerical drift observed over all sampled pairs.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct IsometryProbe {
    pub pairs: usize,
    pub orthogonality_defect: f64,
    pub max_isometry_error: f64,
    pub max_roundtrip_error: f64,
    pub max_similarity_drift: f64,
}

impl IsometryProbe {
    pub fn worst_error(&self) -> f64 {
        self.orthogonality_defect
            .max(self.max_isometry_error)
            .max(self.max_roundtrip_error)
            .max(self.max_similarity_drift)
    }
}

pub fn isometry_probe(engine: &ObfuscationEngine, vectors: &[Vec<f64>]) -> VeilResult<IsometryProbe> {
    let encrypted = engine.encrypt_batch(vectors)?;
    let restored = engine.decrypt_batch(&encrypted)?;
    let max_roundtrip_error = vectors
        .iter()
        .zip(&restored)
        .map(|(plain, back)| euclidean_distance(plain, back))
        .fold(0.0, f64::max);

    let n = vectors.len();
    let (max_isometry_error, max_similarity_drift) = (0..n)
        .into_par_iter()
        .map(|i| {
            let mut worst = (0.0_f64, 0.0_f64);
            for j in (i + 1)..n {
                let plain = euclidean_distance(&vectors[i], &vectors[j]);
                let rotated = euclidean_distance(&encrypted[i], &encrypted[j]);
                let drift = (cosine_similarity(&vectors[i], &vectors[j])
                    - cosine_similarity(&encrypted[i], &encrypted[j]))
                .abs();
                worst.0 = worst.0.max((plain - rotated).abs());
                worst.1 = worst.1.max(drift);
            }
            worst
        })
        .reduce(|| (0.0, 0.0), |a, b| (a.0.max(b.0), a.1.max(b.1)));

    Ok(IsometryProbe {
        pairs: n * n.saturating_sub(1) / 2,
        orthogonality_defect: engine.matrix().orthogonality_defect(),
        max_isometry_error,
        max_roundtrip_error,
        max_similarity_drift,
    })
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RetrievalOutcome {
    pub samples: usize,
    pub hits: usize,
    /// Percent of queries whose top-1 encrypted neighbor is their own passage.
    pub accuracy: f64,
}

/// Query `i` is expected to retrieve passage `i`.
pub fn retrieval_accuracy(
    engine: &ObfuscationEngine,
    queries: &[Vec<f64>],
    passages: &[Vec<f64>],
) -> VeilResult<RetrievalOutcome> {
    if passages.is_empty() {
        return Err(VeilError::EmptyCandidateSet);
    }
    if queries.len() != passages.len() {
        return Err(VeilError::mismatch(passages.len(), queries.len()));
    }
    let encrypted_passages = engine.encrypt_candidates(&indexed_candidates(passages.to_vec()))?;
    let encrypted_queries = engine.encrypt_batch(queries)?;
    let results = engine.search_batch(&encrypted_queries, &encrypted_passages, 1)?;
    let hits = results
        .iter()
        .enumerate()
        .filter(|(idx, neighbors)| neighbors.first().map(|hit| hit.id) == Some(*idx))
        .count();
    let samples = queries.len();
    let accuracy = hits as f64 / samples as f64 * 100.0;
    info!(samples, hits, accuracy, "encrypted retrieval evaluated");
    Ok(RetrievalOutcome {
        samples,
        hits,
        accuracy,
    })
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ValidationReport {
    pub dataset: String,
    pub model: String,
    pub samples: usize,
    pub dimension: usize,
    pub hits: usize,
    pub accuracy: f64,
    pub key_fingerprint: String,
    pub probe: IsometryProbe,
    pub status: ValidationStatus,
}

impl ValidationReport {
    pub fn assemble(
        dataset: impl Into<String>,
        model: impl Into<String>,
        engine: &ObfuscationEngine,
        retrieval: &RetrievalOutcome,
        probe: IsometryProbe,
        criteria: &ValidationCriteria,
    ) -> Self {
        let passed =
            retrieval.accuracy > criteria.min_accuracy && probe.worst_error() <= criteria.tolerance;
        Self {
            dataset: dataset.into(),
            model: model.into(),
            samples: retrieval.samples,
            dimension: engine.dimension(),
            hits: retrieval.hits,
            accuracy: retrieval.accuracy,
            key_fingerprint: engine.fingerprint_hex(),
            probe,
            status: if passed {
                ValidationStatus::Pass
            } else {
                ValidationStatus::Fail
            },
        }
    }

    pub fn passed(&self) -> bool {
        self.status == ValidationStatus::Pass
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn render_summary(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(60);
        let prefix = self.key_fingerprint.get(..16).unwrap_or(self.key_fingerprint.as_str());
        writeln!(f, "{rule}")?;
        writeln!(f, "CHAOSVEIL: VERIFICATION SUMMARY")?;
        writeln!(f, "{rule}")?;
        writeln!(f, "Dataset Used:        {}", self.dataset)?;
        writeln!(f, "Sample Size:         {} pairs", self.samples)?;
        writeln!(f, "Embedding Source:    {}", self.model)?;
        writeln!(f, "Dimension:           {}", self.dimension)?;
        writeln!(f, "Key Fingerprint:     {prefix}")?;
        writeln!(f, "{}", "-".repeat(60))?;
        writeln!(f, "Orthogonality Defect: {:.3e}", self.probe.orthogonality_defect)?;
        writeln!(f, "Isometry Error:       {:.3e}", self.probe.max_isometry_error)?;
        writeln!(f, "Round-trip Error:     {:.3e}", self.probe.max_roundtrip_error)?;
        writeln!(f, "Similarity Drift:     {:.3e}", self.probe.max_similarity_drift)?;
        writeln!(
            f,
            "Retrieval Accuracy:   {:.1}% ({}/{})",
            self.accuracy, self.hits, self.samples
        )?;
        writeln!(f, "System Status:        {:?}", self.status)?;
        writeln!(f, "{rule}")
    }
}
