//! The reference corpus searched at query time.
//!
//! A [`Corpus`] is an ordered list of records, one embedding vector per
//! record, and the [`EmbeddingConfig`] of the model that produced them. It is
//! validated once on construction and never mutated afterwards; rebuilding a
//! corpus means building a new value. Two load paths exist: reading a stored
//! snapshot and fetching plus embedding from scratch.

use thiserror::Error;
use tracing::info;

use crate::embedding::{Embedder, EmbeddingError, EmbeddingProvider};
use crate::models::{EmbeddingConfig, Record};
use crate::provider::{FetchRequest, PaperProvider, ProviderError};
use crate::storage::{CorpusStorage, StorageError};

/// Errors that can occur while assembling a corpus.
#[derive(Debug, Error)]
pub enum CorpusError {
    /// Records and vectors do not pair up
    #[error("Corpus has {records} records but {embeddings} embeddings")]
    CountMismatch { records: usize, embeddings: usize },

    /// A vector does not have the configured dimension
    #[error("Embedding {row} has dimension {actual}, expected {expected}")]
    DimensionMismatch {
        row: usize,
        expected: usize,
        actual: usize,
    },

    /// The configuration itself is unusable
    #[error("Invalid embedding configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
}

/// Result type for corpus operations.
pub type CorpusResult<T> = Result<T, CorpusError>;

/// Immutable set of records with their embeddings.
#[derive(Debug, Clone)]
pub struct Corpus {
    records: Vec<Record>,
    embeddings: Vec<Vec<f32>>,
    config: EmbeddingConfig,
}

impl Corpus {
    /// Pair records with their vectors.
    ///
    /// # Errors
    /// Fails if the counts differ, if any vector's length differs from
    /// `config.dimension`, or if the configuration names no model or a zero
    /// dimension
    pub fn new(
        records: Vec<Record>,
        embeddings: Vec<Vec<f32>>,
        config: EmbeddingConfig,
    ) -> CorpusResult<Self> {
        if config.model_name.trim().is_empty() {
            return Err(CorpusError::InvalidConfig("missing model name".to_string()));
        }
        if config.dimension == 0 {
            return Err(CorpusError::InvalidConfig("dimension must be positive".to_string()));
        }
        if records.len() != embeddings.len() {
            return Err(CorpusError::CountMismatch {
                records: records.len(),
                embeddings: embeddings.len(),
            });
        }
        if let Some((row, bad)) = embeddings
            .iter()
            .enumerate()
            .find(|(_, v)| v.len() != config.dimension)
        {
            return Err(CorpusError::DimensionMismatch {
                row,
                expected: config.dimension,
                actual: bad.len(),
            });
        }

        Ok(Self {
            records,
            embeddings,
            config,
        })
    }

    /// Read a previously saved snapshot.
    pub async fn load_from_snapshot<S: CorpusStorage + ?Sized>(storage: &S) -> CorpusResult<Self> {
        let corpus = storage.load().await?;
        info!(
            "Loaded corpus of {} records from {} ({})",
            corpus.len(),
            storage.location(),
            corpus.config.model_name
        );
        Ok(corpus)
    }

    /// Fetch records and embed them in chunks of `batch_size`.
    ///
    /// `on_progress` receives the number of records embedded so far.
    pub async fn load_from_fetch<P, E, F>(
        provider: &P,
        embedder: &Embedder<E>,
        request: &FetchRequest,
        batch_size: usize,
        on_progress: F,
    ) -> CorpusResult<Self>
    where
        P: PaperProvider + ?Sized,
        E: EmbeddingProvider,
        F: FnMut(usize),
    {
        let records = provider.fetch(request).await?;
        info!("Fetched {} records from {}", records.len(), provider.name());

        let docs: Vec<&str> = records.iter().map(Record::doc_string).collect();
        let embeddings = embedder.embed_chunked(&docs, batch_size, on_progress).await?;

        Self::new(records, embeddings, embedder.config())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.config.dimension
    }

    pub fn config(&self) -> &EmbeddingConfig {
        &self.config
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn embeddings(&self) -> &[Vec<f32>] {
        &self.embeddings
    }

    /// Record and vector at `index`.
    pub fn get(&self, index: usize) -> Option<(&Record, &[f32])> {
        Some((self.records.get(index)?, self.embeddings.get(index)?.as_slice()))
    }

    /// Position of the record with the given id.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.records.iter().position(|r| r.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Record, &[f32])> {
        self.records
            .iter()
            .zip(self.embeddings.iter().map(Vec::as_slice))
    }
}
