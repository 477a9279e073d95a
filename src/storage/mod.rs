//! Corpus snapshot persistence.
//!
//! A snapshot is the checkpoint between the offline build and query time:
//! the records, their vectors and the embedding configuration, written once
//! and read back wholesale. Snapshots are never updated in place.

pub mod parquet;

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

use crate::corpus::Corpus;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Filesystem error
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A required snapshot file does not exist
    #[error("Snapshot file missing: {0}")]
    MissingFile(PathBuf),

    /// Refusing to overwrite an existing snapshot
    #[error("Snapshot already exists at {0}")]
    AlreadyExists(PathBuf),

    /// Metadata and embedding tables have different row counts
    #[error("Snapshot row count mismatch: {metadata} metadata rows, {embeddings} embedding rows")]
    RowCountMismatch { metadata: usize, embeddings: usize },

    /// Columnar encoding or decoding failed
    #[error("Parquet error: {0}")]
    ParquetError(String),

    /// Data serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Snapshot contents violate the expected schema
    #[error("Schema error: {0}")]
    SchemaError(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for corpus snapshot backends.
#[async_trait]
pub trait CorpusStorage: Send + Sync {
    /// Persist a corpus as a new snapshot.
    ///
    /// # Errors
    /// Returns `StorageError::AlreadyExists` if any snapshot file is already
    /// present. A failed save leaves no snapshot files behind
    async fn save(&self, corpus: &Corpus) -> StorageResult<()>;

    /// Read the snapshot back.
    ///
    /// # Errors
    /// Returns `StorageError::MissingFile` if any snapshot file is absent and
    /// `StorageError::RowCountMismatch` if the tables do not pair up
    async fn load(&self) -> StorageResult<Corpus>;

    /// Whether a complete snapshot is present.
    async fn exists(&self) -> bool;

    /// Whether any part of a snapshot is present, complete or not.
    ///
    /// `save` refuses exactly when this is true.
    async fn is_occupied(&self) -> bool;

    /// Human-readable location for log messages.
    fn location(&self) -> String;
}
