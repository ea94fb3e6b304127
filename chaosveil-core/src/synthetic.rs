//! Seeded stand-ins for embedding-model output, used by tests and the validator.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use crate::{
    error::{VeilError, VeilResult},
    search::euclidean_distance,
};

const MAX_RESAMPLES: usize = 10_000;

pub struct SyntheticCorpus {
    dimension: usize,
    rng: ChaCha20Rng,
}

/// Layout of a planted nearest-neighbor scenario.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PlantedTarget {
    pub target_distance: f64,
    pub distractors: usize,
    /// Distractors closer than this to the query are re-drawn.
    pub min_distractor_distance: f64,
    /// Position of the target inside the candidate list.
    pub target_index: usize,
}

impl Default for PlantedTarget {
    fn default() -> Self {
        Self {
            target_distance: 0.1,
            distractors: 99,
            min_distractor_distance: 0.6,
            target_index: 42,
        }
    }
}

#[derive(Clone, Debug)]
pub struct PlantedScenario {
    pub query: Vec<f64>,
    pub candidates: Vec<Vec<f64>>,
    pub target_index: usize,
}

impl SyntheticCorpus {
    pub fn new(dimension: usize, seed: u64) -> VeilResult<Self> {
        if dimension == 0 {
            return Err(VeilError::InvalidDimension(dimension));
        }
        Ok(Self {
            dimension,
            rng: ChaCha20Rng::seed_from_u64(seed),
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn gaussian(&mut self, scale: f64) -> Vec<f64> {
        (0..self.dimension)
            .map(|_| self.rng.sample::<f64, _>(StandardNormal) * scale)
            .collect()
    }

    /// Isotropic random direction of length 1.
    pub fn unit_vector(&mut self) -> Vec<f64> {
        loop {
            let mut vector = self.gaussian(1.0);
            if normalize(&mut vector) {
                return vector;
            }
        }
    }

    pub fn unit_vectors(&mut self, count: usize) -> Vec<Vec<f64>> {
        (0..count).map(|_| self.unit_vector()).collect()
    }

    /// A unit vector and a renormalized copy perturbed by Gaussian noise of
    /// standard deviation `noise` per component.
    pub fn similar_pair(&mut self, noise: f64) -> (Vec<f64>, Vec<f64>) {
        let a = self.unit_vector();
        loop {
            let mut b: Vec<f64> = a
                .iter()
                .zip(self.gaussian(noise))
                .map(|(x, n)| x + n)
                .collect();
            if normalize(&mut b) {
                return (a, b);
            }
        }
    }

    /// Passages plus one noisy query per passage; query `i` belongs to passage `i`.
    pub fn query_passage_pairs(&mut self, count: usize, noise: f64) -> (Vec<Vec<f64>>, Vec<Vec<f64>>) {
        (0..count)
            .map(|_| {
                let (passage, query) = self.similar_pair(noise);
                (query, passage)
            })
            .unzip()
    }

    /// A query, a target at exactly `target_distance` from it, and distractors
    /// that are all farther than `min_distractor_distance`.
    pub fn planted_target(&mut self, layout: &PlantedTarget) -> VeilResult<PlantedScenario> {
        if !(layout.min_distractor_distance < 2.0) || layout.target_distance < 0.0 {
            return Err(VeilError::InvalidConfig(
                "planted layout distances out of range".into(),
            ));
        }
        if layout.target_index > layout.distractors {
            return Err(VeilError::InvalidConfig(format!(
                "target index {} beyond {} distractors",
                layout.target_index, layout.distractors
            )));
        }
        let query = self.unit_vector();
        let direction = self.unit_vector();
        let target: Vec<f64> = query
            .iter()
            .zip(&direction)
            .map(|(q, d)| q + layout.target_distance * d)
            .collect();

        let mut candidates = Vec::with_capacity(layout.distractors + 1);
        for _ in 0..layout.distractors {
            candidates.push(self.distractor(&query, layout.min_distractor_distance)?);
        }
        candidates.insert(layout.target_index, target);
        Ok(PlantedScenario {
            query,
            candidates,
            target_index: layout.target_index,
        })
    }

    fn distractor(&mut self, query: &[f64], min_distance: f64) -> VeilResult<Vec<f64>> {
        for _ in 0..MAX_RESAMPLES {
            let candidate = self.unit_vector();
            if euclidean_distance(query, &candidate) > min_distance {
                return Ok(candidate);
            }
        }
        Err(VeilError::InvalidConfig(format!(
            "no distractor farther than {min_distance} after {MAX_RESAMPLES} draws"
        )))
    }
}

fn normalize(vector: &mut [f64]) -> bool {
    let norm = vector.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm == 0.0 || !norm.is_finite() {
        return false;
    }
    vector.iter_mut().for_each(|x| *x /= norm);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn same_seed_same_vectors() {
        let a = SyntheticCorpus::new(16, 7).unwrap().unit_vectors(5);
        let b = SyntheticCorpus::new(16, 7).unwrap().unit_vectors(5);
        assert_eq!(a, b);
    }

    #[test]
    fn unit_vectors_have_unit_norm() {
        let mut corpus = SyntheticCorpus::new(32, 1).unwrap();
        for vector in corpus.unit_vectors(10) {
            let norm = vector.iter().map(|x| x * x).sum::<f64>().sqrt();
            assert_abs_diff_eq!(norm, 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn similar_pair_is_close() {
        let mut corpus = SyntheticCorpus::new(128, 3).unwrap();
        let (a, b) = corpus.similar_pair(0.01);
        assert!(euclidean_distance(&a, &b) < 0.3);
    }

    #[test]
    fn planted_layout_holds() {
        let mut corpus = SyntheticCorpus::new(64, 11).unwrap();
        let layout = PlantedTarget {
            distractors: 30,
            target_index: 5,
            ..PlantedTarget::default()
        };
        let scenario = corpus.planted_target(&layout).unwrap();
        assert_eq!(scenario.candidates.len(), 31);
        for (idx, candidate) in scenario.candidates.iter().enumerate() {
            let distance = euclidean_distance(&scenario.query, candidate);
            if idx == 5 {
                assert_abs_diff_eq!(distance, 0.1, epsilon = 1e-12);
            } else {
                assert!(distance > 0.6);
            }
        }
    }

    #[test]
    fn rejects_impossible_layout() {
        let mut corpus = SyntheticCorpus::new(8, 0).unwrap();
        let layout = PlantedTarget {
            min_distractor_distance: 2.5,
            ..PlantedTarget::default()
        };
        assert!(corpus.planted_target(&layout).is_err());
    }
}
