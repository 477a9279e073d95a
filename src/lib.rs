//! arXiv recommender - find related papers by semantic similarity.
//!
//! Given an arXiv identifier, the paper's metadata is fetched, its title and
//! abstract are stripped of LaTeX noise, the resulting doc string is embedded
//! with a pretrained sentence model, and the closest papers of a prebuilt
//! reference corpus are returned.
//!
//! # Architecture
//!
//! - **models**: Core data structures (Record, TagSet, SearchResult, etc.)
//! - **cleaning**: LaTeX and accent normalization of titles and abstracts
//! - **tags**: arXiv subject and MSC tag extraction, one-hot encoding, tag scoring
//! - **embedding**: Embedding providers and the shared embedder handle
//! - **provider**: Paper metadata sources (arXiv API, JSON files)
//! - **storage**: Corpus snapshot persistence (Parquet)
//! - **corpus**: The immutable reference corpus and its load paths
//! - **query**: Cosine similarity and top-k search
//! - **pipeline**: Query-mode and build-mode pipelines
//!
//! # Workflow
//!
//! ## Offline Build
//!
//! 1. Fetch paper metadata for a search query
//! 2. Normalize titles and abstracts into doc strings
//! 3. Embed the doc strings in batches
//! 4. Persist records and vectors as a snapshot
//!
//! ## Recommendation
//!
//! 1. Load a snapshot and check its model against the embedder
//! 2. Fetch the input paper(s) by identifier
//! 3. Normalize and embed the input
//! 4. Return the top-k corpus papers by cosine similarity
//!
//! # Example
//!
//! ```ignore
//! use arxiv_recommender::{
//!     corpus::Corpus,
//!     embedding::{fastembed::FastEmbedProvider, Embedder},
//!     pipeline::RecommendationPipeline,
//!     provider::arxiv::{ArxivConfig, ArxivProvider},
//!     storage::parquet::ParquetCorpusStore,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let corpus = Corpus::load_from_snapshot(&ParquetCorpusStore::new("library")).await?;
//!     let embedder = Embedder::new(FastEmbedProvider::from_name(&corpus.config().model_name, None)?);
//!     let pipeline = RecommendationPipeline::new(ArxivProvider::new(ArxivConfig::default())?, embedder, corpus)?;
//!
//!     let rec = pipeline.recommend_one("2101.00001", 5).await?;
//!     for result in rec.results {
//!         println!("{}: {}", result.record.title, result.score);
//!     }
//!     Ok(())
//! }
//! ```

pub mod cleaning;
pub mod corpus;
pub mod embedding;
pub mod models;
pub mod pipeline;
pub mod provider;
pub mod query;
pub mod storage;
pub mod tags;

// Re-export commonly used types at the crate root
pub use corpus::Corpus;
pub use embedding::{Embedder, EmbeddingProvider};
pub use models::{EmbeddingConfig, EmbeddingVector, Recommendation, Record, RelevanceLevel, SearchResult, TagSet};
pub use pipeline::{CorpusBuilder, RecommendationPipeline};
pub use provider::{FetchRequest, PaperProvider};
pub use storage::CorpusStorage;
pub use tags::TagMapper;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default number of recommendations per paper
pub const DEFAULT_TOP_K: usize = 5;

/// Default embedding model name
pub const DEFAULT_EMBEDDING_MODEL: &str = "AllMiniLML6V2";

/// Default embedding dimension for AllMiniLML6V2
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 384;
