//! Second-pass reordering of similarity-search candidates.
//!
//! The index returns candidates in raw cosine-similarity order; a
//! [`Reranker`] recomputes (or reuses) one relevance score per candidate
//! before the retriever truncates to top-k. The sort is stable and
//! descending, so ties keep their original similarity-query order and
//! repeated calls over fixed inputs produce identical orderings.

use std::cmp::Ordering;

use crate::index::ScoredEntry;
use crate::models::Passage;

/// Pluggable rerank policy.
///
/// Implementations provide a single score per candidate; the provided
/// [`rerank`](Reranker::rerank) preserves the stable-sort, descending-
/// order contract for all of them.
pub trait Reranker: Send + Sync {
    /// Relevance of one candidate for the query. Higher is better.
    fn score(&self, query: &str, candidate: &ScoredEntry) -> f32;

    /// Score all candidates and sort descending (stable).
    fn rerank(&self, query: &str, candidates: Vec<ScoredEntry>) -> Vec<Passage> {
        let mut passages: Vec<Passage> = candidates
            .into_iter()
            .map(|candidate| {
                let score = self.score(query, &candidate);
                Passage {
                    content: candidate.content,
                    metadata: candidate.metadata,
                    score,
                }
            })
            .collect();
        // Vec::sort_by is stable: ties keep candidate order.
        passages.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        passages
    }
}

/// Minimal policy: rank purely by the cosine similarity the index
/// already computed.
pub struct SimilarityReranker;

impl Reranker for SimilarityReranker {
    fn score(&self, _query: &str, candidate: &ScoredEntry) -> f32 {
        candidate.similarity
    }
}

/// Richer policy: blend cosine similarity with query-term overlap.
///
/// The overlap signal is the fraction of whitespace-separated query
/// terms (lowercased) that occur in the candidate's content. Useful
/// when the embedding model is weak on exact names and identifiers.
pub struct KeywordOverlapReranker {
    /// Weight of the overlap signal: `score = (1-w)*similarity + w*overlap`.
    pub overlap_weight: f32,
}

impl Default for KeywordOverlapReranker {
    fn default() -> Self {
        Self {
            overlap_weight: 0.3,
        }
    }
}

impl Reranker for KeywordOverlapReranker {
    fn score(&self, query: &str, candidate: &ScoredEntry) -> f32 {
        let query_lower = query.to_lowercase();
        let terms: Vec<&str> = query_lower.split_whitespace().collect();
        if terms.is_empty() {
            return candidate.similarity;
        }

        let content_lower = candidate.content.to_lowercase();
        let matched = terms.iter().filter(|t| content_lower.contains(**t)).count();
        let overlap = matched as f32 / terms.len() as f32;

        (1.0 - self.overlap_weight) * candidate.similarity + self.overlap_weight * overlap
    }
}
