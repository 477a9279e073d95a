//! Embedding provider abstraction and the embedder handle.
//!
//! An [`EmbeddingProvider`] wraps one pretrained model. The pipeline never
//! talks to a provider directly; it goes through an [`Embedder`], which is
//! built once around the provider and guarantees that single-document and
//! batch embedding take the same code path, so query vectors stay comparable
//! with corpus vectors.

pub mod fastembed;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::models::{EmbeddingConfig, EmbeddingVector};

/// Errors that can occur during embedding operations.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Model inference failed
    #[error("Model error: {0}")]
    ModelError(String),

    /// Configuration error (unknown model name, unusable cache dir)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The model returned a vector of unexpected length
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The model returned a different number of vectors than inputs
    #[error("Embedding count mismatch: {inputs} inputs produced {outputs} vectors")]
    CountMismatch { inputs: usize, outputs: usize },
}

/// Result type for embedding operations.
pub type EmbeddingResult<T> = Result<T, EmbeddingError>;

/// Trait for text embedding providers.
///
/// Implementors turn text into fixed-length vectors using one model. Inputs
/// are expected to be normalized doc strings already.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for the given text.
    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>>;

    /// Generate embeddings for multiple texts, in input order.
    async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>>;

    /// Number of dimensions in the produced vectors.
    fn dimension(&self) -> usize;

    /// Identifier of the underlying model.
    fn model_name(&self) -> &str;
}

/// Model handle used by every pipeline stage that needs vectors.
///
/// # Example
/// ```ignore
/// let embedder = Embedder::new(FastEmbedProvider::default()?);
/// let query = embedder.embed_one(record.doc_string()).await?;
/// ```
#[derive(Debug, Clone)]
pub struct Embedder<E> {
    provider: E,
}

impl<E: EmbeddingProvider> Embedder<E> {
    pub fn new(provider: E) -> Self {
        Self { provider }
    }

    /// Model identity of the vectors this embedder produces.
    pub fn config(&self) -> EmbeddingConfig {
        EmbeddingConfig {
            model_name: self.provider.model_name().to_string(),
            dimension: self.provider.dimension(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.provider.dimension()
    }

    pub fn provider(&self) -> &E {
        &self.provider
    }

    /// Embed a batch of doc strings, one vector per input in the same order.
    ///
    /// An empty batch yields an empty result without touching the model.
    pub async fn embed_batch(&self, docs: &[&str]) -> EmbeddingResult<Vec<EmbeddingVector>> {
        if docs.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Embedding batch of {} documents", docs.len());
        let vectors = self.provider.embed_batch(docs).await?;

        if vectors.len() != docs.len() {
            return Err(EmbeddingError::CountMismatch {
                inputs: docs.len(),
                outputs: vectors.len(),
            });
        }
        let expected = self.provider.dimension();
        if let Some(bad) = vectors.iter().find(|v| v.len() != expected) {
            return Err(EmbeddingError::DimensionMismatch {
                expected,
                actual: bad.len(),
            });
        }

        Ok(vectors)
    }

    /// Embed in chunks of `chunk_size`, calling `on_chunk` with the running
    /// count of embedded documents after each chunk.
    pub async fn embed_chunked<F>(
        &self,
        docs: &[&str],
        chunk_size: usize,
        mut on_chunk: F,
    ) -> EmbeddingResult<Vec<EmbeddingVector>>
    where
        F: FnMut(usize),
    {
        let mut vectors = Vec::with_capacity(docs.len());
        for chunk in docs.chunks(chunk_size.max(1)) {
            vectors.extend(self.embed_batch(chunk).await?);
            on_chunk(vectors.len());
        }
        Ok(vectors)
    }

    /// Embed a single doc string as a batch of one.
    pub async fn embed_one(&self, doc: &str) -> EmbeddingResult<EmbeddingVector> {
        self.embed_batch(&[doc])
            .await?
            .into_iter()
            .next()
            .ok_or(EmbeddingError::CountMismatch {
                inputs: 1,
                outputs: 0,
            })
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{BrokenProvider, HashingProvider};
    use super::*;

    #[tokio::test]
    async fn test_embed_one_matches_batch() {
        let embedder = Embedder::new(HashingProvider::new(16));
        for text in ["Waves on LATEX  manifolds", "", "short"] {
            let single = embedder.embed_one(text).await.unwrap();
            let batch = embedder.embed_batch(&[text]).await.unwrap();
            assert_eq!(single, batch[0]);
        }
    }

    #[tokio::test]
    async fn test_empty_batch_skips_model() {
        let provider = HashingProvider::new(8);
        let calls = provider.batch_calls.clone();
        let embedder = Embedder::new(provider);

        let out = embedder.embed_batch(&[]).await.unwrap();
        assert!(out.is_empty());
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_text_is_valid_input() {
        let embedder = Embedder::new(HashingProvider::new(8));
        let out = embedder.embed_batch(&["", "  "]).await.unwrap();
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|v| v.len() == 8));
    }

    #[tokio::test]
    async fn test_batch_preserves_order() {
        let provider = HashingProvider::new(32);
        let embedder = Embedder::new(provider.clone());
        let docs = ["first doc", "second doc", "third doc"];
        let out = embedder.embed_batch(&docs).await.unwrap();
        for (doc, vec) in docs.iter().zip(&out) {
            assert_eq!(vec, &provider.vector(doc));
        }
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejected() {
        let embedder = Embedder::new(BrokenProvider {
            dimension: 4,
            returned_dimension: 3,
            drop_last: false,
            fail: false,
        });
        let err = embedder.embed_batch(&["a"]).await.unwrap_err();
        assert!(matches!(
            err,
            EmbeddingError::DimensionMismatch { expected: 4, actual: 3 }
        ));
    }

    #[tokio::test]
    async fn test_count_mismatch_rejected() {
        let embedder = Embedder::new(BrokenProvider {
            dimension: 2,
            returned_dimension: 2,
            drop_last: true,
            fail: false,
        });
        let err = embedder.embed_batch(&["a", "b"]).await.unwrap_err();
        assert!(matches!(
            err,
            EmbeddingError::CountMismatch { inputs: 2, outputs: 1 }
        ));
    }

    #[tokio::test]
    async fn test_embed_chunked_matches_single_batch() {
        let provider = HashingProvider::new(16);
        let calls = provider.batch_calls.clone();
        let embedder = Embedder::new(provider);
        let docs = ["a b c", "d e f", "g h i", "j k l", "m n o"];

        let mut progress = Vec::new();
        let chunked = embedder
            .embed_chunked(&docs, 2, |done| progress.push(done))
            .await
            .unwrap();

        assert_eq!(progress, vec![2, 4, 5]);
        assert_eq!(*calls.lock().unwrap(), vec![2, 2, 1]);
        assert_eq!(chunked, embedder.embed_batch(&docs).await.unwrap());
    }

    #[tokio::test]
    async fn test_provider_failure_propagates() {
        let embedder = Embedder::new(BrokenProvider {
            dimension: 2,
            returned_dimension: 2,
            drop_last: false,
            fail: true,
        });
        let err = embedder.embed_one("x").await.unwrap_err();
        assert!(matches!(err, EmbeddingError::ModelError(_)));
    }

    #[test]
    fn test_config_reflects_provider() {
        let embedder = Embedder::new(HashingProvider::new(12).named("mini"));
        assert_eq!(
            embedder.config(),
            EmbeddingConfig {
                model_name: "mini".to_string(),
                dimension: 12
            }
        );
    }
}
