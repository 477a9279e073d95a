//! Subject and MSC tag extraction.
//!
//! arXiv lists a paper's categories as raw codes. Two taxonomies are
//! recognized: the broad arXiv subject codes (`math.AP`, `cs.LG`, ...) and
//! Mathematics Subject Classification codes (`35Q99`), which authors append as
//! the last category entry. Both are translated to English labels through
//! lookup tables loaded once and handed to [`TagMapper`].

pub mod scoring;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use tracing::debug;

use crate::models::TagSet;

/// Errors that can occur while loading lookup tables.
#[derive(Debug, Error)]
pub enum TagError {
    /// The lookup table file could not be read
    #[error("Failed to read lookup table {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The lookup table is not a JSON object of strings
    #[error("Invalid lookup table {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Result type for tag operations.
pub type TagResult<T> = Result<T, TagError>;

static MSC_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[0-9]{2}[0-9a-zA-Z]{3}\b").expect("MSC code pattern"));

/// Immutable map from raw code to English label.
#[derive(Debug, Clone, Default)]
pub struct LookupTable {
    entries: BTreeMap<String, String>,
}

impl LookupTable {
    /// Load a table from a JSON object file (`{"math.AP": "Analysis of PDEs"}`).
    pub fn from_file(path: impl AsRef<Path>) -> TagResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| TagError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let entries: BTreeMap<String, String> =
            serde_json::from_str(&text).map_err(|source| TagError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        debug!("Loaded {} lookup entries from {}", entries.len(), path.display());
        Ok(Self { entries })
    }

    /// Build a table from in-memory pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn get(&self, code: &str) -> Option<&str> {
        self.entries.get(code).map(String::as_str)
    }

    pub fn contains(&self, code: &str) -> bool {
        self.entries.contains_key(code)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// English labels in code order.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.values().map(String::as_str)
    }
}

/// Binary tag matrix: one row per input tag set, one column per label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OneHotMatrix {
    columns: Vec<String>,
    rows: Vec<Vec<bool>>,
}

impl OneHotMatrix {
    /// Column labels; never contains duplicates.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<bool>] {
        &self.rows
    }

    /// Values of the column with the given label, top to bottom.
    pub fn column(&self, label: &str) -> Option<Vec<bool>> {
        let idx = self.columns.iter().position(|c| c == label)?;
        Some(self.rows.iter().map(|row| row[idx]).collect())
    }
}

/// Maps raw category lists to subject codes and MSC labels.
#[derive(Debug, Clone)]
pub struct TagMapper {
    subjects: LookupTable,
    msc: LookupTable,
}

impl TagMapper {
    pub fn new(subjects: LookupTable, msc: LookupTable) -> Self {
        Self { subjects, msc }
    }

    /// Load both tables from disk.
    pub fn from_files(
        subjects_path: impl AsRef<Path>,
        msc_path: impl AsRef<Path>,
    ) -> TagResult<Self> {
        Ok(Self::new(
            LookupTable::from_file(subjects_path)?,
            LookupTable::from_file(msc_path)?,
        ))
    }

    pub fn subject_table(&self) -> &LookupTable {
        &self.subjects
    }

    pub fn msc_table(&self) -> &LookupTable {
        &self.msc
    }

    /// Keep the raw codes that belong to the subject taxonomy.
    pub fn extract_subjects(&self, categories: &[String]) -> BTreeSet<String> {
        categories
            .iter()
            .filter(|code| self.subjects.contains(code))
            .cloned()
            .collect()
    }

    /// English labels for a set of subject codes.
    pub fn subject_labels(&self, subjects: &BTreeSet<String>) -> BTreeSet<String> {
        subjects
            .iter()
            .filter_map(|code| self.subjects.get(code))
            .map(str::to_string)
            .collect()
    }

    /// Translate MSC codes found in the last category entry.
    ///
    /// Returns `None` when no code in that entry maps to a label, so callers
    /// can branch on "has MSC tags" without checking for an empty list.
    pub fn extract_msc(&self, categories: &[String]) -> Option<Vec<String>> {
        let last = categories.last()?;
        let labels: Vec<String> = MSC_CODE
            .find_iter(last)
            .filter_map(|m| self.msc.get(m.as_str()))
            .map(str::to_string)
            .collect();

        if labels.is_empty() {
            None
        } else {
            Some(labels)
        }
    }

    pub fn tag_set(&self, categories: &[String]) -> TagSet {
        TagSet {
            subjects: self.extract_subjects(categories),
            msc: self.extract_msc(categories),
        }
    }

    /// One-hot encode the subject codes of a batch of tag sets.
    ///
    /// Columns follow the sorted raw codes and are labelled in English. Codes
    /// sharing a label (`math.MP` and `math-ph`) collapse into one column whose
    /// cells are the logical OR of the originals.
    pub fn one_hot_subjects(&self, tag_sets: &[TagSet]) -> OneHotMatrix {
        let codes: BTreeSet<&str> = tag_sets
            .iter()
            .flat_map(|t| t.subjects.iter().map(String::as_str))
            .collect();

        let mut columns: Vec<String> = Vec::new();
        let mut column_of_label: HashMap<String, usize> = HashMap::new();
        let mut column_of_code: HashMap<&str, usize> = HashMap::new();
        for code in codes {
            let label = self.subjects.get(code).unwrap_or(code).to_string();
            let idx = *column_of_label.entry(label.clone()).or_insert_with(|| {
                columns.push(label);
                columns.len() - 1
            });
            column_of_code.insert(code, idx);
        }

        let rows = tag_sets
            .iter()
            .map(|tags| {
                let mut row = vec![false; columns.len()];
                for code in &tags.subjects {
                    if let Some(&idx) = column_of_code.get(code.as_str()) {
                        row[idx] = true;
                    }
                }
                row
            })
            .collect();

        OneHotMatrix { columns, rows }
    }
}
