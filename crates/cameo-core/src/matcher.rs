//! Identity matching — cosine-distance classification of query feature
//! vectors against the reference set.

use crate::reference::ReferenceSet;
use ndarray::{ArrayView1, ArrayView2};
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;

/// Default cosine distance threshold for a positive match.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.65;

#[derive(Error, Debug)]
pub enum MatchError {
    #[error("reference set is empty — build references before matching")]
    EmptyReferenceSet,
    #[error("query feature dimension {query} does not match reference dimension {reference}")]
    DimensionMismatch { query: usize, reference: usize },
}

/// Cosine distance `1 − a·b / (‖a‖‖b‖)`.
///
/// A zero-norm operand yields similarity 0, i.e. distance 1.
pub fn cosine_distance(a: ArrayView1<f32>, b: ArrayView1<f32>) -> f32 {
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    1.0 - cosine_similarity_to_normed(a, b, norm_b)
}

fn cosine_similarity_to_normed(a: ArrayView1<f32>, b: ArrayView1<f32>, norm_b: f32) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
    }
    let denom = norm_a.sqrt() * norm_b;
    if denom > 0.0 {
        dot / denom
    } else {
        0.0
    }
}

/// Classifies per-frame query vectors against the shared reference set.
///
/// Presence is an any-of-n aggregation: a label counts as present when
/// at least one face in the frame falls under the distance threshold for
/// it. Ties exactly at the threshold are non-matches.
pub struct IdentityMatcher {
    refs: Arc<ReferenceSet>,
    ref_norms: Vec<f32>,
    threshold: f32,
}

impl IdentityMatcher {
    /// Fails on an empty reference set — that is a misconfigured system,
    /// not "nobody enrolled yet".
    pub fn new(refs: Arc<ReferenceSet>, threshold: f32) -> Result<Self, MatchError> {
        if refs.is_empty() {
            return Err(MatchError::EmptyReferenceSet);
        }
        let ref_norms = refs
            .features()
            .rows()
            .into_iter()
            .map(|row| row.iter().map(|x| x * x).sum::<f32>().sqrt())
            .collect();
        Ok(Self {
            refs,
            ref_norms,
            threshold,
        })
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Return the set of reference labels present among the `(n, dim)`
    /// query rows. `n == 0` short-circuits to the empty set without any
    /// distance computation.
    pub fn match_labels(
        &self,
        queries: ArrayView2<f32>,
    ) -> Result<BTreeSet<String>, MatchError> {
        let mut detected = BTreeSet::new();
        if queries.nrows() == 0 {
            return Ok(detected);
        }
        if queries.ncols() != self.refs.feature_dim() {
            return Err(MatchError::DimensionMismatch {
                query: queries.ncols(),
                reference: self.refs.feature_dim(),
            });
        }

        for (j, reference) in self.refs.features().rows().into_iter().enumerate() {
            let hit = queries.rows().into_iter().any(|query| {
                let distance =
                    1.0 - cosine_similarity_to_normed(query, reference, self.ref_norms[j]);
                distance < self.threshold
            });
            if hit {
                detected.insert(self.refs.labels()[j].clone());
            }
        }

        Ok(detected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    fn refs(labels: &[&str], rows: Vec<Vec<f32>>) -> Arc<ReferenceSet> {
        let dim = rows[0].len();
        let flat: Vec<f32> = rows.into_iter().flatten().collect();
        let features = Array2::from_shape_vec((labels.len(), dim), flat).unwrap();
        Arc::new(
            ReferenceSet::new(labels.iter().map(|s| s.to_string()).collect(), features).unwrap(),
        )
    }

    #[test]
    fn test_self_match_law() {
        // A query identical to a reference row has distance 0 and is
        // always reported for any positive threshold.
        let matcher = refs(&["alice"], vec![vec![1.0, 0.0, 0.0, 0.0]]);
        let matcher = IdentityMatcher::new(matcher, 0.65).unwrap();
        let queries = array![[1.0, 0.0, 0.0, 0.0]];
        let labels = matcher.match_labels(queries.view()).unwrap();
        assert_eq!(labels, BTreeSet::from(["alice".to_string()]));
    }

    #[test]
    fn test_distance_symmetric() {
        let a = array![0.3f32, -1.2, 4.0, 0.5];
        let b = array![2.0f32, 0.1, -0.7, 1.5];
        let d_ab = cosine_distance(a.view(), b.view());
        let d_ba = cosine_distance(b.view(), a.view());
        assert!((d_ab - d_ba).abs() < 1e-6);
    }

    #[test]
    fn test_distance_zero_vector() {
        let a = array![0.0f32, 0.0];
        let b = array![1.0f32, 0.0];
        assert!((cosine_distance(a.view(), b.view()) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_threshold_tie_is_non_match() {
        // Identical vectors have distance exactly 0; with θ = 0 the
        // strict comparison must reject them.
        let matcher =
            IdentityMatcher::new(refs(&["alice"], vec![vec![1.0, 0.0]]), 0.0).unwrap();
        let queries = array![[1.0f32, 0.0]];
        assert!(matcher.match_labels(queries.view()).unwrap().is_empty());
    }

    #[test]
    fn test_any_of_n_aggregation() {
        // Only the second of two faces matches; the label is still
        // reported present.
        let matcher =
            IdentityMatcher::new(refs(&["bob"], vec![vec![1.0, 0.0]]), 0.65).unwrap();
        let queries = array![[0.0f32, 1.0], [1.0, 0.0]];
        let labels = matcher.match_labels(queries.view()).unwrap();
        assert_eq!(labels, BTreeSet::from(["bob".to_string()]));
    }

    #[test]
    fn test_multiple_labels() {
        let matcher = IdentityMatcher::new(
            refs(
                &["alice", "bob", "carol"],
                vec![
                    vec![1.0, 0.0, 0.0],
                    vec![0.0, 1.0, 0.0],
                    vec![0.0, 0.0, 1.0],
                ],
            ),
            0.65,
        )
        .unwrap();
        let queries = array![[1.0f32, 0.0, 0.0], [0.0, 0.0, 1.0]];
        let labels = matcher.match_labels(queries.view()).unwrap();
        assert_eq!(
            labels,
            BTreeSet::from(["alice".to_string(), "carol".to_string()])
        );
    }

    #[test]
    fn test_no_queries_short_circuits() {
        let matcher =
            IdentityMatcher::new(refs(&["alice"], vec![vec![1.0, 0.0]]), 0.65).unwrap();
        let queries = Array2::<f32>::zeros((0, 2));
        assert!(matcher.match_labels(queries.view()).unwrap().is_empty());
    }

    #[test]
    fn test_empty_reference_set_rejected() {
        let empty = Arc::new(
            ReferenceSet::new(vec![], Array2::<f32>::zeros((0, 4))).unwrap(),
        );
        assert!(matches!(
            IdentityMatcher::new(empty, 0.65),
            Err(MatchError::EmptyReferenceSet)
        ));
    }

    #[test]
    fn test_dimension_mismatch_is_fatal() {
        let matcher =
            IdentityMatcher::new(refs(&["alice"], vec![vec![1.0, 0.0]]), 0.65).unwrap();
        let queries = Array2::<f32>::zeros((1, 3));
        assert!(matches!(
            matcher.match_labels(queries.view()),
            Err(MatchError::DimensionMismatch {
                query: 3,
                reference: 2
            })
        ));
    }
}
