//! Parquet snapshot store.
//!
//! Layout of a snapshot directory:
//!
//! - `metadata.parquet`: one row per record (`id`, `title`, `abstract`,
//!   `categories`, `authors`, `published`)
//! - `embeddings.parquet`: one `Float32` column per dimension, named `"0"`,
//!   `"1"`, ..., rows in metadata order
//! - `embedding_config.json`: model name and dimension
//!
//! Every file is written to a temporary path first and renamed into place.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow_array::builder::{ListBuilder, StringBuilder};
use arrow_array::{Array, ArrayRef, Float32Array, ListArray, RecordBatch, StringArray};
use arrow_schema::{ArrowError, DataType, Field, Schema};
use async_trait::async_trait;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::errors::ParquetError;
use tracing::{debug, info, warn};

use super::{CorpusStorage, StorageError, StorageResult};
use crate::corpus::Corpus;
use crate::models::{EmbeddingConfig, Record};

pub const METADATA_FILE: &str = "metadata.parquet";
pub const EMBEDDINGS_FILE: &str = "embeddings.parquet";
pub const CONFIG_FILE: &str = "embedding_config.json";

impl From<ParquetError> for StorageError {
    fn from(e: ParquetError) -> Self {
        StorageError::ParquetError(e.to_string())
    }
}

impl From<ArrowError> for StorageError {
    fn from(e: ArrowError) -> Self {
        StorageError::ParquetError(e.to_string())
    }
}

/// Snapshot store rooted at one directory.
#[derive(Debug, Clone)]
pub struct ParquetCorpusStore {
    dir: PathBuf,
}

impl ParquetCorpusStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    fn files(&self) -> [PathBuf; 3] {
        [
            self.path(METADATA_FILE),
            self.path(EMBEDDINGS_FILE),
            self.path(CONFIG_FILE),
        ]
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StorageError + '_ {
    move |source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn list_field() -> Arc<Field> {
    Arc::new(Field::new("item", DataType::Utf8, true))
}

fn metadata_schema() -> Schema {
    Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("title", DataType::Utf8, false),
        Field::new("abstract", DataType::Utf8, false),
        Field::new("categories", DataType::List(list_field()), false),
        Field::new("authors", DataType::List(list_field()), false),
        Field::new("published", DataType::Utf8, true),
    ])
}

fn embeddings_schema(dimension: usize) -> Schema {
    Schema::new(
        (0..dimension)
            .map(|i| Field::new(i.to_string(), DataType::Float32, false))
            .collect::<Vec<_>>(),
    )
}

fn string_list(rows: impl Iterator<Item = Vec<String>>) -> ListArray {
    let mut builder = ListBuilder::new(StringBuilder::new());
    for row in rows {
        for value in row {
            builder.values().append_value(value);
        }
        builder.append(true);
    }
    builder.finish()
}

fn metadata_batch(records: &[Record]) -> StorageResult<RecordBatch> {
    let ids = StringArray::from(records.iter().map(|r| r.id.as_str()).collect::<Vec<_>>());
    let titles = StringArray::from(records.iter().map(|r| r.title.as_str()).collect::<Vec<_>>());
    let abstracts = StringArray::from(
        records
            .iter()
            .map(|r| r.abstract_text.as_str())
            .collect::<Vec<_>>(),
    );
    let categories = string_list(records.iter().map(|r| r.categories.clone()));
    let authors = string_list(records.iter().map(|r| r.authors.clone()));
    let published = StringArray::from(
        records
            .iter()
            .map(|r| r.published.as_deref())
            .collect::<Vec<_>>(),
    );

    let columns: Vec<ArrayRef> = vec![
        Arc::new(ids),
        Arc::new(titles),
        Arc::new(abstracts),
        Arc::new(categories),
        Arc::new(authors),
        Arc::new(published),
    ];
    Ok(RecordBatch::try_new(Arc::new(metadata_schema()), columns)?)
}

fn embeddings_batch(embeddings: &[Vec<f32>], dimension: usize) -> StorageResult<RecordBatch> {
    let columns: Vec<ArrayRef> = (0..dimension)
        .map(|j| {
            Arc::new(Float32Array::from(
                embeddings.iter().map(|v| v[j]).collect::<Vec<f32>>(),
            )) as ArrayRef
        })
        .collect();
    Ok(RecordBatch::try_new(Arc::new(embeddings_schema(dimension)), columns)?)
}

fn write_parquet(batch: &RecordBatch, output_path: &Path) -> StorageResult<()> {
    let temp_path = output_path.with_extension("tmp");
    let file = File::create(&temp_path).map_err(io_error(&temp_path))?;

    let mut writer = ArrowWriter::try_new(file, batch.schema(), None)?;
    writer.write(batch)?;
    writer.close()?;

    std::fs::rename(&temp_path, output_path).map_err(io_error(output_path))?;
    debug!("Wrote {} rows to {}", batch.num_rows(), output_path.display());
    Ok(())
}

fn read_parquet(path: &Path) -> StorageResult<(usize, Vec<RecordBatch>)> {
    let file = File::open(path).map_err(io_error(path))?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    let columns = builder.schema().fields().len();
    let batches = builder.build()?.collect::<Result<Vec<_>, _>>()?;
    Ok((columns, batches))
}

fn string_column<'b>(batch: &'b RecordBatch, name: &str) -> StorageResult<&'b StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| StorageError::SchemaError(format!("missing string column '{}'", name)))
}

fn list_column<'b>(batch: &'b RecordBatch, name: &str) -> StorageResult<&'b ListArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<ListArray>())
        .ok_or_else(|| StorageError::SchemaError(format!("missing list column '{}'", name)))
}

fn list_values(list: &ListArray, row: usize) -> StorageResult<Vec<String>> {
    let values = list.value(row);
    let strings = values
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| StorageError::SchemaError("list items are not strings".to_string()))?;
    Ok(strings.iter().flatten().map(str::to_string).collect())
}

fn records_from_batch(batch: &RecordBatch) -> StorageResult<Vec<Record>> {
    let ids = string_column(batch, "id")?;
    let titles = string_column(batch, "title")?;
    let abstracts = string_column(batch, "abstract")?;
    let categories = list_column(batch, "categories")?;
    let authors = list_column(batch, "authors")?;
    let published = string_column(batch, "published")?;

    (0..batch.num_rows())
        .map(|i| {
            let published = if published.is_null(i) {
                None
            } else {
                Some(published.value(i).to_string())
            };
            Ok(Record::new(
                ids.value(i),
                titles.value(i),
                abstracts.value(i),
                list_values(categories, i)?,
            )
            .with_authors(list_values(authors, i)?)
            .with_published(published))
        })
        .collect()
}

fn vectors_from_batch(batch: &RecordBatch, dimension: usize) -> StorageResult<Vec<Vec<f32>>> {
    let columns = (0..dimension)
        .map(|j| {
            batch
                .column_by_name(&j.to_string())
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
                .ok_or_else(|| {
                    StorageError::SchemaError(format!("missing embedding column '{}'", j))
                })
        })
        .collect::<StorageResult<Vec<_>>>()?;

    Ok((0..batch.num_rows())
        .map(|i| columns.iter().map(|c| c.value(i)).collect())
        .collect())
}

impl ParquetCorpusStore {
    fn write_files(&self, corpus: &Corpus) -> StorageResult<()> {
        write_parquet(&metadata_batch(corpus.records())?, &self.path(METADATA_FILE))?;
        write_parquet(
            &embeddings_batch(corpus.embeddings(), corpus.dimension())?,
            &self.path(EMBEDDINGS_FILE),
        )?;

        let config_path = self.path(CONFIG_FILE);
        let temp_path = config_path.with_extension("tmp");
        let json = serde_json::to_string_pretty(corpus.config())
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;
        std::fs::write(&temp_path, json).map_err(io_error(&temp_path))?;
        std::fs::rename(&temp_path, &config_path).map_err(io_error(&config_path))?;
        Ok(())
    }

    /// Remove whatever a failed save managed to write.
    fn discard_partial(&self) {
        for path in self.files() {
            for candidate in [path.with_extension("tmp"), path] {
                if candidate.is_file() {
                    if let Err(e) = std::fs::remove_file(&candidate) {
                        warn!("Could not remove {}: {}", candidate.display(), e);
                    }
                }
            }
        }
    }
}

#[async_trait]
impl CorpusStorage for ParquetCorpusStore {
    async fn save(&self, corpus: &Corpus) -> StorageResult<()> {
        if self.is_occupied().await {
            return Err(StorageError::AlreadyExists(self.dir.clone()));
        }
        std::fs::create_dir_all(&self.dir).map_err(io_error(&self.dir))?;

        if let Err(e) = self.write_files(corpus) {
            self.discard_partial();
            return Err(e);
        }

        info!("Saved snapshot of {} records to {}", corpus.len(), self.dir.display());
        Ok(())
    }

    async fn load(&self) -> StorageResult<Corpus> {
        if let Some(missing) = self.files().into_iter().find(|p| !p.exists()) {
            return Err(StorageError::MissingFile(missing));
        }

        let config_path = self.path(CONFIG_FILE);
        let text = std::fs::read_to_string(&config_path).map_err(io_error(&config_path))?;
        let config: EmbeddingConfig = serde_json::from_str(&text)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;

        let (_, metadata) = read_parquet(&self.path(METADATA_FILE))?;
        let mut records = Vec::new();
        for batch in &metadata {
            records.extend(records_from_batch(batch)?);
        }

        let (columns, batches) = read_parquet(&self.path(EMBEDDINGS_FILE))?;
        if columns != config.dimension {
            return Err(StorageError::SchemaError(format!(
                "{} embedding columns but configured dimension is {}",
                columns, config.dimension
            )));
        }
        let mut embeddings = Vec::new();
        for batch in &batches {
            embeddings.extend(vectors_from_batch(batch, config.dimension)?);
        }

        if records.len() != embeddings.len() {
            return Err(StorageError::RowCountMismatch {
                metadata: records.len(),
                embeddings: embeddings.len(),
            });
        }

        Corpus::new(records, embeddings, config).map_err(|e| StorageError::SchemaError(e.to_string()))
    }

    async fn exists(&self) -> bool {
        self.files().iter().all(|p| p.exists())
    }

    async fn is_occupied(&self) -> bool {
        self.files().iter().any(|p| p.exists())
    }

    fn location(&self) -> String {
        self.dir.display().to_string()
    }
}
