//! Linear-scan nearest-neighbor search over rotated vectors.
//!
//! Every metric here is invariant under an orthogonal `Q`, so a ranking
//! computed on encrypted vectors matches the ranking on the plain ones up to
//! rounding. This is a reference scan, not an index.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    config::SearchConfig,
    error::{VeilError, VeilResult},
};

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum DistanceMetric {
    /// L2 distance.
    #[default]
    Euclidean,
    /// `1 - cos(a, b)`; a zero vector has similarity 0 with everything.
    Cosine,
    /// Negated inner product, so smaller still means closer.
    InnerProduct,
}

impl DistanceMetric {
    pub fn distance(&self, a: &[f64], b: &[f64]) -> f64 {
        match self {
            Self::Euclidean => euclidean_distance(a, b),
            Self::Cosine => 1.0 - cosine_similarity(a, b),
            Self::InnerProduct => -inner_product(a, b),
        }
    }
}

pub fn euclidean_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

pub fn inner_product(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    let norms = inner_product(a, a).sqrt() * inner_product(b, b).sqrt();
    if norms == 0.0 {
        return 0.0;
    }
    inner_product(a, b) / norms
}

/// Encrypted vector with the caller's identifier attached.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Candidate<I> {
    pub id: I,
    pub vector: Vec<f64>,
}

impl<I> Candidate<I> {
    pub fn new(id: I, vector: Vec<f64>) -> Self {
        Self { id, vector }
    }
}

/// Enumerates plain vectors as candidates keyed by position.
pub fn indexed_candidates(vectors: Vec<Vec<f64>>) -> Vec<Candidate<usize>> {
    vectors
        .into_iter()
        .enumerate()
        .map(|(id, vector)| Candidate { id, vector })
        .collect()
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Neighbor<I> {
    pub id: I,
    pub distance: f64,
}

#[derive(Clone, Debug, Default)]
pub struct NeighborSearch {
    config: SearchConfig,
}

impl NeighborSearch {
    pub fn new(config: SearchConfig) -> VeilResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn metric(&self) -> DistanceMetric {
        self.config.metric
    }

    /// Returns up to `top_k` candidates ordered by ascending distance.
    ///
    /// `top_k` is clamped into `1..=candidates.len()`; asking for more
    /// neighbors than exist is not an error.
    pub fn search<I>(
        &self,
        query: &[f64],
        candidates: &[Candidate<I>],
        top_k: usize,
    ) -> VeilResult<Vec<Neighbor<I>>>
    where
        I: Clone + Send + Sync,
    {
        check_candidates(query.len(), candidates)?;
        Ok(self.rank_checked(query, candidates, top_k))
    }

    /// Runs independent queries in parallel; result order follows `queries`.
    /// The candidate set is validated even when `queries` is empty.
    pub fn search_batch<I>(
        &self,
        queries: &[Vec<f64>],
        candidates: &[Candidate<I>],
        top_k: usize,
    ) -> VeilResult<Vec<Vec<Neighbor<I>>>>
    where
        I: Clone + Send + Sync,
    {
        let dimension = match queries.first() {
            Some(first) => first.len(),
            None => candidates.first().map_or(0, |candidate| candidate.vector.len()),
        };
        check_candidates(dimension, candidates)?;
        if let Some(bad) = queries.iter().find(|query| query.len() != dimension) {
            return Err(VeilError::mismatch(dimension, bad.len()));
        }
        debug!(queries = queries.len(), candidates = candidates.len(), "batch search");
        Ok(queries
            .par_iter()
            .map(|query| self.rank_checked(query, candidates, top_k))
            .collect())
    }

    fn rank_checked<I>(
        &self,
        query: &[f64],
        candidates: &[Candidate<I>],
        top_k: usize,
    ) -> Vec<Neighbor<I>>
    where
        I: Clone + Send + Sync,
    {
        let metric = self.config.metric;
        let distances: Vec<f64> = if candidates.len() >= self.config.parallel_threshold {
            candidates
                .par_iter()
                .map(|candidate| metric.distance(query, &candidate.vector))
                .collect()
        } else {
            candidates
                .iter()
                .map(|candidate| metric.distance(query, &candidate.vector))
                .collect()
        };
        let k = top_k.clamp(1, candidates.len());
        if k != top_k {
            debug!(requested = top_k, clamped = k, "top_k clamped");
        }
        rank(&distances, self.config.tie_tolerance)
            .into_iter()
            .take(k)
            .map(|idx| Neighbor {
                id: candidates[idx].id.clone(),
                distance: distances[idx],
            })
            .collect()
    }
}

fn check_candidates<I>(dimension: usize, candidates: &[Candidate<I>]) -> VeilResult<()> {
    if candidates.is_empty() {
        return Err(VeilError::EmptyCandidateSet);
    }
    match candidates
        .iter()
        .find(|candidate| candidate.vector.len() != dimension)
    {
        Some(bad) => Err(VeilError::mismatch(dimension, bad.vector.len())),
        None => Ok(()),
    }
}

/// Candidate positions by ascending distance. A run of distances within
/// `tolerance` of the run's first entry keeps candidate order.
fn rank(distances: &[f64], tolerance: f64) -> Vec<usize> {
    let mut order: Vec<usize> = (0..distances.len()).collect();
    order.sort_by(|&a, &b| distances[a].total_cmp(&distances[b]).then(a.cmp(&b)));
    let mut start = 0;
    while start < order.len() {
        let anchor = distances[order[start]];
        let mut end = start + 1;
        while end < order.len() && distances[order[end]] - anchor <= tolerance {
            end += 1;
        }
        order[start..end].sort_unstable();
        start = end;
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn candidates() -> Vec<Candidate<&'static str>> {
        vec![
            Candidate::new("far", vec![5.0, 0.0]),
            Candidate::new("near", vec![1.0, 0.0]),
            Candidate::new("mid", vec![0.0, 3.0]),
        ]
    }

    #[test]
    fn ranks_by_ascending_distance() {
        let hits = NeighborSearch::default()
            .search(&[0.0, 0.0], &candidates(), 3)
            .unwrap();
        let ids: Vec<_> = hits.iter().map(|hit| hit.id).collect();
        assert_eq!(ids, vec!["near", "mid", "far"]);
        assert_abs_diff_eq!(hits[1].distance, 3.0);
    }

    #[test]
    fn clamps_top_k() {
        let search = NeighborSearch::default();
        assert_eq!(search.search(&[0.0, 0.0], &candidates(), 10).unwrap().len(), 3);
        assert_eq!(search.search(&[0.0, 0.0], &candidates(), 0).unwrap().len(), 1);
    }

    #[test]
    fn ties_keep_candidate_order() {
        let tied = vec![
            Candidate::new(7, vec![0.0, 1.0]),
            Candidate::new(3, vec![1.0, 0.0]),
            Candidate::new(9, vec![-1.0, 1e-13]),
            Candidate::new(1, vec![0.0, 0.5]),
        ];
        let ids: Vec<_> = NeighborSearch::default()
            .search(&[0.0, 0.0], &tied, 4)
            .unwrap()
            .into_iter()
            .map(|hit| hit.id)
            .collect();
        assert_eq!(ids, vec![1, 7, 3, 9]);
    }

    #[test]
    fn rank_groups_runs_within_tolerance() {
        let order = rank(&[2.0, 1.0 + 5e-10, 1.0, 3.0], 1e-9);
        assert_eq!(order, vec![1, 2, 0, 3]);
    }

    #[test]
    fn empty_candidates_fail() {
        let none: Vec<Candidate<u32>> = Vec::new();
        assert_eq!(
            NeighborSearch::default().search(&[1.0], &none, 1),
            Err(VeilError::EmptyCandidateSet)
        );
    }

    #[test]
    fn mismatched_candidate_fails() {
        let mut set = candidates();
        set[2].vector.push(1.0);
        assert_eq!(
            NeighborSearch::default().search(&[0.0, 0.0], &set, 1),
            Err(VeilError::DimensionMismatch {
                expected: 2,
                actual: 3
            })
        );
    }

    #[test]
    fn parallel_path_matches_serial_path() {
        let set: Vec<_> = (0..64)
            .map(|i| Candidate::new(i, vec![(i as f64).sin(), (i as f64).cos(), i as f64 * 0.01]))
            .collect();
        let query = [0.3, -0.2, 0.1];
        let serial = NeighborSearch::default().search(&query, &set, 10).unwrap();
        let parallel = NeighborSearch::new(SearchConfig {
            parallel_threshold: 1,
            ..SearchConfig::default()
        })
        .unwrap()
        .search(&query, &set, 10)
        .unwrap();
        assert_eq!(serial, parallel);
    }

    #[test]
    fn cosine_and_inner_product_metrics() {
        let a = [1.0, 0.0];
        let b = [0.0, 2.0];
        assert_abs_diff_eq!(DistanceMetric::Cosine.distance(&a, &b), 1.0);
        assert_abs_diff_eq!(DistanceMetric::Cosine.distance(&a, &[3.0, 0.0]), 0.0);
        assert_abs_diff_eq!(DistanceMetric::InnerProduct.distance(&b, &b), -4.0);
        assert_abs_diff_eq!(cosine_similarity(&[0.0, 0.0], &a), 0.0);
    }

    #[test]
    fn batch_search_preserves_query_order() {
        let queries = vec![vec![5.0, 0.1], vec![0.9, 0.0], vec![0.0, 2.9]];
        let results = NeighborSearch::default()
            .search_batch(&queries, &candidates(), 1)
            .unwrap();
        let top: Vec<_> = results.iter().map(|hits| hits[0].id).collect();
        assert_eq!(top, vec!["far", "near", "mid"]);
    }

    #[test]
    fn empty_batch_still_validates_candidates() {
        let none: Vec<Candidate<u32>> = Vec::new();
        assert_eq!(
            NeighborSearch::default().search_batch(&[], &none, 1),
            Err(VeilError::EmptyCandidateSet)
        );
        let results = NeighborSearch::default()
            .search_batch(&[], &candidates(), 1)
            .unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn batch_search_rejects_ragged_queries() {
        let queries = vec![vec![0.0, 0.0], vec![0.0]];
        assert!(matches!(
            NeighborSearch::default().search_batch(&queries, &candidates(), 1),
            Err(VeilError::DimensionMismatch { .. })
        ));
    }
}
