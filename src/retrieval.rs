//! Relevance filtering over raw nearest-neighbor hits.
//!
//! Distance from the index and similarity shown to callers are two views
//! of the same number. The metric converts one to the other; the threshold
//! decides which side of the cutoff a candidate lands on. Both threshold
//! conventions are supported because plain retrieval filters on minimum
//! similarity while context assembly filters on maximum raw distance.

use crate::models::{RetrievedCandidate, ScoredChunk};

/// How raw index distance maps to a caller-facing similarity score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DistanceMetric {
    /// `similarity = 1 - distance`. Distance 0 is identical, 2 is opposite.
    Cosine,
    /// `similarity = -distance`. Preserves ordering; has no fixed upper bound.
    Euclidean,
}

impl DistanceMetric {
    pub fn similarity(&self, distance: f64) -> f64 {
        match self {
            DistanceMetric::Cosine => 1.0 - distance,
            DistanceMetric::Euclidean => -distance,
        }
    }
}

/// Relevance cutoff applied to each candidate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RelevanceThreshold {
    /// Keep candidates whose similarity score is at least this value.
    MinSimilarity(f64),
    /// Keep candidates whose raw distance is at most this value.
    MaxDistance(f64),
}

impl RelevanceThreshold {
    /// Boundary values are admitted on both conventions.
    pub fn admits(&self, distance: f64, similarity: f64) -> bool {
        match self {
            RelevanceThreshold::MinSimilarity(min) => similarity >= *min,
            RelevanceThreshold::MaxDistance(max) => distance <= *max,
        }
    }
}

/// Score candidates, drop those outside the threshold, and order the
/// survivors by descending similarity.
///
/// The sort is stable: candidates with equal scores keep the index's
/// original order. Truncation to `k` is the caller's job since the caller
/// knows how much headroom it requested.
pub fn filter_candidates(
    candidates: Vec<RetrievedCandidate>,
    metric: DistanceMetric,
    threshold: RelevanceThreshold,
) -> Vec<ScoredChunk> {
    let mut scored: Vec<ScoredChunk> = candidates
        .into_iter()
        .filter_map(|c| {
            let score = metric.similarity(c.distance);
            if threshold.admits(c.distance, score) {
                Some(ScoredChunk {
                    content: c.content,
                    meta: c.meta,
                    score,
                })
            } else {
                None
            }
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChunkMeta;

    fn candidate(content: &str, distance: f64) -> RetrievedCandidate {
        RetrievedCandidate {
            content: content.to_string(),
            meta: ChunkMeta::for_source("Constitution"),
            distance,
        }
    }

    #[test]
    fn test_min_similarity_drops_below_cutoff() {
        let candidates = vec![
            candidate("kept", 0.3),    // similarity 0.7
            candidate("dropped", 0.8), // similarity 0.2
        ];
        let scored = filter_candidates(
            candidates,
            DistanceMetric::Cosine,
            RelevanceThreshold::MinSimilarity(0.4),
        );
        assert_eq!(scored.len(), 1);
        assert_eq!(scored[0].content, "kept");
        assert!((scored[0].score - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_boundary_candidate_is_admitted() {
        // similarity exactly 0.4
        let scored = filter_candidates(
            vec![candidate("edge", 0.6)],
            DistanceMetric::Cosine,
            RelevanceThreshold::MinSimilarity(0.4),
        );
        assert_eq!(scored.len(), 1);

        // distance exactly 1.1
        let scored = filter_candidates(
            vec![candidate("edge", 1.1)],
            DistanceMetric::Cosine,
            RelevanceThreshold::MaxDistance(1.1),
        );
        assert_eq!(scored.len(), 1);
    }

    #[test]
    fn test_max_distance_keeps_weak_cosine_matches() {
        // Cosine distance 1.05 means negative similarity, but the distance
        // convention still admits it under the 1.1 cutoff.
        let scored = filter_candidates(
            vec![candidate("weak", 1.05), candidate("far", 1.3)],
            DistanceMetric::Cosine,
            RelevanceThreshold::MaxDistance(1.1),
        );
        assert_eq!(scored.len(), 1);
        assert_eq!(scored[0].content, "weak");
        assert!(scored[0].score < 0.0);
    }

    #[test]
    fn test_survivors_sorted_descending_by_score() {
        let candidates = vec![
            candidate("b", 0.5),
            candidate("a", 0.1),
            candidate("c", 0.3),
        ];
        let scored = filter_candidates(
            candidates,
            DistanceMetric::Cosine,
            RelevanceThreshold::MinSimilarity(0.0),
        );
        let order: Vec<&str> = scored.iter().map(|s| s.content.as_str()).collect();
        assert_eq!(order, vec!["a", "c", "b"]);
    }

    #[test]
    fn test_equal_scores_keep_index_order() {
        let candidates = vec![
            candidate("first", 0.2),
            candidate("second", 0.2),
            candidate("third", 0.2),
        ];
        let scored = filter_candidates(
            candidates,
            DistanceMetric::Cosine,
            RelevanceThreshold::MinSimilarity(0.0),
        );
        let order: Vec<&str> = scored.iter().map(|s| s.content.as_str()).collect();
        assert_eq!(order, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_all_filtered_yields_empty() {
        let scored = filter_candidates(
            vec![candidate("far", 0.9)],
            DistanceMetric::Cosine,
            RelevanceThreshold::MinSimilarity(0.4),
        );
        assert!(scored.is_empty());
    }

    #[test]
    fn test_euclidean_preserves_ordering() {
        let scored = filter_candidates(
            vec![candidate("near", 2.0), candidate("nearer", 1.0)],
            DistanceMetric::Euclidean,
            RelevanceThreshold::MaxDistance(5.0),
        );
        assert_eq!(scored[0].content, "nearer");
        assert!(scored[0].score > scored[1].score);
    }
}
