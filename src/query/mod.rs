//! Similarity search over a corpus.
//!
//! Search is brute force: the query is scored against every corpus vector
//! with cosine similarity and the best `k` are returned. Corpora are built
//! offline and are small enough for a linear scan.
//!
//! # Usage
//!
//! ```ignore
//! let index = BruteForceIndex::new(&corpus);
//! let results = index.search(&query_vector, 5)?;
//! for result in results {
//!     println!("{} - Score: {:.3}", result.record.title, result.score);
//! }
//! ```

use thiserror::Error;

use crate::corpus::Corpus;
use crate::models::SearchResult;

/// Errors that can occur during query processing.
#[derive(Debug, Error)]
pub enum QueryError {
    /// Query vector and corpus vectors have different lengths
    #[error("Query dimension {actual} does not match corpus dimension {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Result type for query operations.
pub type QueryResult<T> = Result<T, QueryError>;

/// Compute cosine similarity between two vectors of equal length.
///
/// Ranges from -1 to 1. A zero-magnitude vector has similarity 0.0 with
/// everything.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "Vectors must have the same length");

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot_product / (norm_a * norm_b)
}

/// Rank `(position, score)` pairs best first, keeping input order on ties.
///
/// A NaN score (from a vector with non-finite components) counts as 0.0, the
/// same as a zero-magnitude vector.
pub(crate) fn rank(mut scored: Vec<(usize, f32)>, k: usize) -> Vec<(usize, f32)> {
    for (_, score) in scored.iter_mut() {
        if score.is_nan() {
            *score = 0.0;
        }
    }
    // stable: equal scores stay in insertion order
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.truncate(k);
    scored
}

/// Linear-scan nearest neighbor index over a read-only corpus.
#[derive(Debug, Clone, Copy)]
pub struct BruteForceIndex<'a> {
    corpus: &'a Corpus,
}

impl<'a> BruteForceIndex<'a> {
    pub fn new(corpus: &'a Corpus) -> Self {
        Self { corpus }
    }

    /// Return the `k` corpus records most similar to `query`, best first.
    ///
    /// Asking for more results than the corpus holds returns the whole
    /// corpus. Ties are broken by corpus position (earlier wins).
    ///
    /// # Errors
    /// Returns `QueryError::DimensionMismatch` if the query length differs
    /// from the corpus dimension
    pub fn search(&self, query: &[f32], k: usize) -> QueryResult<Vec<SearchResult>> {
        let expected = self.corpus.dimension();
        if query.len() != expected {
            return Err(QueryError::DimensionMismatch {
                expected,
                actual: query.len(),
            });
        }

        let scored = self
            .corpus
            .embeddings()
            .iter()
            .enumerate()
            .map(|(idx, vector)| (idx, cosine_similarity(query, vector)))
            .collect();

        Ok(rank(scored, k)
            .into_iter()
            .map(|(idx, score)| SearchResult::new(self.corpus.records()[idx].clone(), score))
            .collect())
    }

    /// Search each query independently.
    pub fn search_batch(&self, queries: &[Vec<f32>], k: usize) -> QueryResult<Vec<Vec<SearchResult>>> {
        queries.iter().map(|q| self.search(q, k)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EmbeddingConfig, Record, RelevanceLevel};

    fn corpus(vectors: Vec<Vec<f32>>) -> Corpus {
        let dimension = vectors.first().map(Vec::len).unwrap_or(3);
        let records = (0..vectors.len())
            .map(|i| Record::new(format!("id-{}", i), format!("Paper {}", i), "Abstract", vec![]))
            .collect();
        Corpus::new(
            records,
            vectors,
            EmbeddingConfig {
                model_name: "test".to_string(),
                dimension,
            },
        )
        .unwrap()
    }

    fn ids(results: &[SearchResult]) -> Vec<&str> {
        results.iter().map(|r| r.record.id.as_str()).collect()
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0, 0.0], &[1.0, 0.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 1.0], &[-1.0, -1.0]) + 1.0).abs() < 1e-6);
        assert!((cosine_similarity(&[2.0, 0.0], &[5.0, 0.0]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_zero_vector() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_search_sorted_descending() {
        let c = corpus(vec![
            vec![0.0, 1.0, 0.0],
            vec![0.8, 0.6, 0.0],
            vec![1.0, 0.0, 0.0],
        ]);
        let results = BruteForceIndex::new(&c).search(&[1.0, 0.0, 0.0], 3).unwrap();
        assert_eq!(ids(&results), vec!["id-2", "id-1", "id-0"]);
        for pair in results.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
        assert_eq!(results[0].relevance, RelevanceLevel::Identical);
    }

    #[test]
    fn test_top_k_truncation() {
        let c = corpus(vec![
            vec![1.0, 0.0, 0.0],
            vec![0.9, 0.1, 0.0],
            vec![0.8, 0.2, 0.0],
            vec![0.7, 0.3, 0.0],
        ]);
        let results = BruteForceIndex::new(&c).search(&[1.0, 0.0, 0.0], 2).unwrap();
        assert_eq!(ids(&results), vec!["id-0", "id-1"]);
    }

    #[test]
    fn test_k_larger_than_corpus_returns_all() {
        let c = corpus(vec![vec![0.0, 1.0, 0.0], vec![1.0, 0.0, 0.0]]);
        let results = BruteForceIndex::new(&c).search(&[1.0, 0.0, 0.0], 10).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(ids(&results), vec!["id-1", "id-0"]);
    }

    #[test]
    fn test_k_zero_returns_nothing() {
        let c = corpus(vec![vec![1.0, 0.0, 0.0]]);
        assert!(BruteForceIndex::new(&c).search(&[1.0, 0.0, 0.0], 0).unwrap().is_empty());
    }

    #[test]
    fn test_ties_keep_insertion_order() {
        let c = corpus(vec![
            vec![0.0, 1.0, 0.0],
            vec![1.0, 0.0, 0.0],
            vec![2.0, 0.0, 0.0],
            vec![1.0, 0.0, 0.0],
        ]);
        let index = BruteForceIndex::new(&c);
        let first = index.search(&[1.0, 0.0, 0.0], 3).unwrap();
        assert_eq!(ids(&first), vec!["id-1", "id-2", "id-3"]);

        // repeated runs give the same order
        for _ in 0..5 {
            assert_eq!(ids(&index.search(&[1.0, 0.0, 0.0], 3).unwrap()), ids(&first));
        }
    }

    #[test]
    fn test_nan_score_never_outranks_a_match() {
        let c = corpus(vec![
            vec![f32::NAN, 0.0, 0.0],
            vec![1.0, 0.0, 0.0],
            vec![0.0, 1.0, 0.0],
            vec![-1.0, 0.0, 0.0],
        ]);
        let results = BruteForceIndex::new(&c).search(&[1.0, 0.0, 0.0], 4).unwrap();

        assert_eq!(ids(&results), vec!["id-1", "id-0", "id-2", "id-3"]);
        assert_eq!(results[1].score, 0.0);
        assert!(results.iter().all(|r| !r.score.is_nan()));
    }

    #[test]
    fn test_dimension_mismatch_is_error() {
        let c = corpus(vec![vec![1.0, 0.0, 0.0]]);
        let err = BruteForceIndex::new(&c).search(&[1.0, 0.0], 1).unwrap_err();
        assert!(matches!(err, QueryError::DimensionMismatch { expected: 3, actual: 2 }));
    }

    #[test]
    fn test_empty_corpus() {
        let c = corpus(vec![]);
        assert!(BruteForceIndex::new(&c).search(&[1.0, 0.0, 0.0], 5).unwrap().is_empty());
    }

    #[test]
    fn test_search_batch_is_independent() {
        let c = corpus(vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]]);
        let index = BruteForceIndex::new(&c);
        let batch = index
            .search_batch(&[vec![0.0, 1.0, 0.0], vec![1.0, 0.0, 0.0]], 1)
            .unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0][0].record.id, "id-1");
        assert_eq!(batch[1][0].record.id, "id-0");
        assert_eq!(ids(&batch[1]), ids(&index.search(&[1.0, 0.0, 0.0], 1).unwrap()));
    }
}
