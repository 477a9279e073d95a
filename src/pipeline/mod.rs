//! Recommendation and corpus-build pipelines.
//!
//! Query mode runs Fetch -> Normalize -> Embed -> Search for each input
//! identifier against a read-only corpus. Build mode runs Fetch -> Normalize
//! -> Embed over a search result set and persists the outcome as a snapshot.
//! Normalization happens inside record construction, so every record that
//! leaves the fetch stage already carries its doc string.
//!
//! Any stage failure aborts the run; there are no partial results.
//!
//! # Usage
//!
//! ```ignore
//! let store = ParquetCorpusStore::new("library/");
//! let corpus = Corpus::load_from_snapshot(&store).await?;
//! let embedder = Embedder::new(FastEmbedProvider::from_name(&corpus.config().model_name, None)?);
//! let pipeline = RecommendationPipeline::new(ArxivProvider::new(ArxivConfig::default())?, embedder, corpus)?;
//!
//! for rec in pipeline.recommend(&["2101.00001".to_string()], 5).await? {
//!     println!("{}", rec.input.title);
//! }
//! ```

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info};

use crate::cleaning;
use crate::corpus::{Corpus, CorpusError};
use crate::embedding::{Embedder, EmbeddingError, EmbeddingProvider};
use crate::models::{EmbeddingConfig, Recommendation, Record, SearchResult};
use crate::provider::{FetchRequest, PaperProvider, ProviderError};
use crate::query::{BruteForceIndex, QueryError};
use crate::storage::{CorpusStorage, StorageError};
use crate::tags::TagMapper;

/// Default number of documents per embedding call when building.
pub const DEFAULT_BATCH_SIZE: usize = 64;

/// Errors that abort a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Fetch failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("Embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Search failed: {0}")]
    Query(#[from] QueryError),

    #[error("Corpus error: {0}")]
    Corpus(#[from] CorpusError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Embedder and corpus were produced by different models
    #[error("Embedding configuration mismatch: corpus uses {corpus_model} ({corpus_dimension} dims), embedder uses {embedder_model} ({embedder_dimension} dims)")]
    ConfigMismatch {
        corpus_model: String,
        corpus_dimension: usize,
        embedder_model: String,
        embedder_dimension: usize,
    },

    /// Invalid input data
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

fn check_config(corpus: &EmbeddingConfig, embedder: &EmbeddingConfig) -> PipelineResult<()> {
    if corpus != embedder {
        return Err(PipelineError::ConfigMismatch {
            corpus_model: corpus.model_name.clone(),
            corpus_dimension: corpus.dimension,
            embedder_model: embedder.model_name.clone(),
            embedder_dimension: embedder.dimension,
        });
    }
    Ok(())
}

/// Query-mode pipeline over a fixed corpus.
pub struct RecommendationPipeline<P, E>
where
    P: PaperProvider,
    E: EmbeddingProvider,
{
    provider: P,
    embedder: Embedder<E>,
    corpus: Corpus,
}

impl<P, E> RecommendationPipeline<P, E>
where
    P: PaperProvider,
    E: EmbeddingProvider,
{
    /// Assemble the pipeline.
    ///
    /// # Errors
    /// Returns `PipelineError::ConfigMismatch` if the embedder's model name or
    /// dimension differs from the corpus's
    pub fn new(provider: P, embedder: Embedder<E>, corpus: Corpus) -> PipelineResult<Self> {
        check_config(corpus.config(), &embedder.config())?;
        Ok(Self {
            provider,
            embedder,
            corpus,
        })
    }

    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    pub fn embedder(&self) -> &Embedder<E> {
        &self.embedder
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    async fn fetch_stage(&self, ids: &[String]) -> PipelineResult<Vec<Record>> {
        let records = self.provider.fetch(&FetchRequest::Ids(ids.to_vec())).await?;
        debug!("Fetched {} input records", records.len());
        Ok(records)
    }

    async fn embed_stage(&self, records: &[Record]) -> PipelineResult<Vec<Vec<f32>>> {
        let docs: Vec<&str> = records.iter().map(Record::doc_string).collect();
        Ok(self.embedder.embed_batch(&docs).await?)
    }

    fn search_stage(&self, vectors: &[Vec<f32>], k: usize) -> PipelineResult<Vec<Vec<SearchResult>>> {
        Ok(BruteForceIndex::new(&self.corpus).search_batch(vectors, k)?)
    }

    /// Recommend the `k` closest corpus papers for each identifier.
    ///
    /// Returns one [`Recommendation`] per input, in input order.
    pub async fn recommend(&self, ids: &[String], k: usize) -> PipelineResult<Vec<Recommendation>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let started = Instant::now();
        let records = self.fetch_stage(ids).await?;
        let vectors = self.embed_stage(&records).await?;
        let results = self.search_stage(&vectors, k)?;

        info!(
            "Recommended for {} papers in {:.2}s",
            records.len(),
            started.elapsed().as_secs_f64()
        );

        Ok(records
            .into_iter()
            .zip(results)
            .map(|(input, results)| Recommendation { input, results })
            .collect())
    }

    /// Recommend for a single identifier.
    pub async fn recommend_one(&self, id: &str, k: usize) -> PipelineResult<Recommendation> {
        self.recommend(&[id.to_string()], k)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| PipelineError::Provider(ProviderError::NotFound(vec![id.to_string()])))
    }

    /// Search the corpus with free text instead of a paper.
    ///
    /// The text goes through the same normalization as paper doc strings.
    pub async fn search_text(&self, text: &str, k: usize) -> PipelineResult<Vec<SearchResult>> {
        let doc = cleaning::normalize(text);
        if doc.trim().is_empty() {
            return Err(PipelineError::InvalidInput("empty query text".to_string()));
        }
        let vector = self.embedder.embed_one(&doc).await?;
        Ok(BruteForceIndex::new(&self.corpus).search(&vector, k)?)
    }
}

/// Statistics from a corpus build.
#[derive(Debug, Default, Clone)]
pub struct BuildStats {
    /// Records returned by the fetch stage
    pub fetched: usize,

    /// Vectors produced
    pub embedded: usize,

    /// Model identity of the snapshot
    pub model_name: String,
    pub dimension: usize,

    /// Records per subject label, when a tag mapper is attached
    pub subject_counts: BTreeMap<String, usize>,

    /// Records carrying at least one mapped MSC label
    pub msc_tagged: usize,

    pub elapsed: Duration,
}

/// Offline builder: fetch, embed, persist.
pub struct CorpusBuilder<P, E, S>
where
    P: PaperProvider,
    E: EmbeddingProvider,
    S: CorpusStorage,
{
    provider: P,
    embedder: Embedder<E>,
    storage: S,
    batch_size: usize,
    tag_mapper: Option<TagMapper>,
}

impl<P, E, S> CorpusBuilder<P, E, S>
where
    P: PaperProvider,
    E: EmbeddingProvider,
    S: CorpusStorage,
{
    /// # Arguments
    /// * `batch_size` - Documents per embedding call (default: 64)
    pub fn new(provider: P, embedder: Embedder<E>, storage: S, batch_size: Option<usize>) -> Self {
        Self {
            provider,
            embedder,
            storage,
            batch_size: batch_size.unwrap_or(DEFAULT_BATCH_SIZE).max(1),
            tag_mapper: None,
        }
    }

    /// Collect subject and MSC statistics while building.
    pub fn with_tag_mapper(mut self, mapper: TagMapper) -> Self {
        self.tag_mapper = Some(mapper);
        self
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Build and persist a corpus.
    pub async fn build(&self, request: &FetchRequest) -> PipelineResult<(Corpus, BuildStats)> {
        self.build_with_progress(request, |_| {}).await
    }

    /// Build and persist a corpus, reporting embedding progress.
    ///
    /// `on_progress` receives the number of records embedded so far.
    ///
    /// # Errors
    /// Fails before fetching if the storage holds any part of a snapshot
    pub async fn build_with_progress<F>(
        &self,
        request: &FetchRequest,
        on_progress: F,
    ) -> PipelineResult<(Corpus, BuildStats)>
    where
        F: FnMut(usize),
    {
        if self.storage.is_occupied().await {
            return Err(StorageError::AlreadyExists(self.storage.location().into()).into());
        }

        let started = Instant::now();
        let corpus = Corpus::load_from_fetch(
            &self.provider,
            &self.embedder,
            request,
            self.batch_size,
            on_progress,
        )
        .await?;
        self.storage.save(&corpus).await?;

        let mut stats = BuildStats {
            fetched: corpus.len(),
            embedded: corpus.embeddings().len(),
            model_name: corpus.config().model_name.clone(),
            dimension: corpus.dimension(),
            ..Default::default()
        };

        if let Some(mapper) = &self.tag_mapper {
            let tag_sets: Vec<_> = corpus
                .records()
                .iter()
                .map(|r| mapper.tag_set(&r.categories))
                .collect();
            stats.msc_tagged = tag_sets.iter().filter(|t| t.has_msc()).count();

            let matrix = mapper.one_hot_subjects(&tag_sets);
            for (idx, label) in matrix.columns().iter().enumerate() {
                let count = matrix.rows().iter().filter(|row| row[idx]).count();
                stats.subject_counts.insert(label.clone(), count);
            }
        }

        stats.elapsed = started.elapsed();
        info!(
            "Built corpus of {} records with {} in {:.2}s",
            stats.fetched,
            stats.model_name,
            stats.elapsed.as_secs_f64()
        );
        Ok((corpus, stats))
    }
}
