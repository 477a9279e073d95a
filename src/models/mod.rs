//! Core data models for the recommender.
//!
//! This module contains the fundamental data structures shared across the
//! pipeline: paper records, their derived tag sets, search results and the
//! embedding configuration that identifies a corpus.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::cleaning;

/// One paper as returned by the metadata fetch stage.
///
/// The `doc_string` is derived from the title and abstract when the record is
/// constructed and cannot be set independently. Records deserialized from a
/// snapshot or JSON file go through [`Record::new`] as well, so the derived
/// field always reflects the current cleaning rules.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(from = "RawRecord", into = "RawRecord")]
pub struct Record {
    /// Stable external identifier (e.g. `2101.00001v1`)
    pub id: String,

    /// Paper title as fetched
    pub title: String,

    /// Abstract text as fetched
    pub abstract_text: String,

    /// Raw category codes in the order the source listed them
    pub categories: Vec<String>,

    /// Author names, possibly empty
    pub authors: Vec<String>,

    /// Publication timestamp (RFC 3339) when known
    pub published: Option<String>,

    doc_string: String,
}

impl Record {
    /// Create a record and derive its normalized document string.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        abstract_text: impl Into<String>,
        categories: Vec<String>,
    ) -> Self {
        let title = title.into();
        let abstract_text = abstract_text.into();
        let doc_string = cleaning::doc_string(&title, &abstract_text);
        Self {
            id: id.into(),
            title,
            abstract_text,
            categories,
            authors: Vec::new(),
            published: None,
            doc_string,
        }
    }

    /// Attach author names.
    pub fn with_authors(mut self, authors: Vec<String>) -> Self {
        self.authors = authors;
        self
    }

    /// Attach a publication timestamp.
    pub fn with_published(mut self, published: Option<String>) -> Self {
        self.published = published;
        self
    }

    /// Normalized title + abstract, the unit of embedding.
    pub fn doc_string(&self) -> &str {
        &self.doc_string
    }
}

/// Serialized shape of a [`Record`]; the doc string is never read back.
#[derive(Serialize, Deserialize)]
struct RawRecord {
    id: String,
    title: String,
    #[serde(alias = "abstract", alias = "summary")]
    abstract_text: String,
    #[serde(default)]
    categories: Vec<String>,
    #[serde(default)]
    authors: Vec<String>,
    #[serde(default)]
    published: Option<String>,
}

impl From<RawRecord> for Record {
    fn from(raw: RawRecord) -> Self {
        Record::new(raw.id, raw.title, raw.abstract_text, raw.categories)
            .with_authors(raw.authors)
            .with_published(raw.published)
    }
}

impl From<Record> for RawRecord {
    fn from(record: Record) -> Self {
        Self {
            id: record.id,
            title: record.title,
            abstract_text: record.abstract_text,
            categories: record.categories,
            authors: record.authors,
            published: record.published,
        }
    }
}

/// One embedded doc string. Every vector in a corpus has the same length.
pub type EmbeddingVector = Vec<f32>;

/// Tags derived from a record's raw category list.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TagSet {
    /// Raw subject codes present in the subject taxonomy (e.g. `math.AP`)
    pub subjects: BTreeSet<String>,

    /// English MSC labels, `None` when no MSC code could be mapped
    pub msc: Option<Vec<String>>,
}

impl TagSet {
    /// Whether the record carries at least one mapped MSC label.
    pub fn has_msc(&self) -> bool {
        self.msc.is_some()
    }
}

/// Relevance classification for search results.
///
/// Papers are bucketed by their cosine similarity to the query so the
/// interactive surface can color results.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RelevanceLevel {
    /// Cosine similarity > 0.95
    Identical,

    /// Cosine similarity > 0.85
    HighlySimilar,

    /// Cosine similarity > 0.70
    Similar,

    /// Anything lower
    Relevant,
}

impl RelevanceLevel {
    /// Determine relevance level from a cosine similarity score.
    pub fn from_score(score: f32) -> Self {
        if score > 0.95 {
            RelevanceLevel::Identical
        } else if score > 0.85 {
            RelevanceLevel::HighlySimilar
        } else if score > 0.70 {
            RelevanceLevel::Similar
        } else {
            RelevanceLevel::Relevant
        }
    }

    /// Upper-case label used by the CLI output.
    pub fn label(&self) -> &'static str {
        match self {
            RelevanceLevel::Identical => "IDENTICAL",
            RelevanceLevel::HighlySimilar => "HIGHLY_SIMILAR",
            RelevanceLevel::Similar => "SIMILAR",
            RelevanceLevel::Relevant => "RELEVANT",
        }
    }
}

/// A corpus record paired with its similarity to the query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// The matched corpus record
    pub record: Record,

    /// Cosine similarity score (higher is better)
    pub score: f32,

    /// Categorical relevance classification
    pub relevance: RelevanceLevel,
}

impl SearchResult {
    /// Create a new search result from a record and similarity score.
    pub fn new(record: Record, score: f32) -> Self {
        Self {
            record,
            score,
            relevance: RelevanceLevel::from_score(score),
        }
    }
}

/// Identity of the embedding model behind a set of vectors.
///
/// Stored next to every corpus snapshot; query vectors are only compared
/// against a corpus produced with an equal configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EmbeddingConfig {
    /// Name of the embedding model (e.g. `AllMiniLML6V2`)
    pub model_name: String,

    /// Dimension of the embedding vectors
    pub dimension: usize,
}

/// Output of one pipeline run for a single input paper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    /// The paper the recommendations were computed for
    pub input: Record,

    /// Most similar corpus papers, best first
    pub results: Vec<SearchResult>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relevance_level_from_score() {
        assert_eq!(RelevanceLevel::from_score(0.96), RelevanceLevel::Identical);
        assert_eq!(RelevanceLevel::from_score(0.90), RelevanceLevel::HighlySimilar);
        assert_eq!(RelevanceLevel::from_score(0.75), RelevanceLevel::Similar);
        assert_eq!(RelevanceLevel::from_score(0.60), RelevanceLevel::Relevant);
    }

    #[test]
    fn test_record_derives_doc_string() {
        let record = Record::new("1", "A\ntitle", "An abstract", vec![]);
        assert_eq!(record.doc_string(), "A title An abstract");
    }

    #[test]
    fn test_record_json_rederives_doc_string() {
        let json = r#"{
            "id": "2101.00001v1",
            "title": "Waves",
            "summary": "We study $u$ on \\'{e}tale sites.",
            "categories": ["math.AP"]
        }"#;
        let record: Record = serde_json::from_str(json).unwrap();
        assert_eq!(record.abstract_text, "We study $u$ on \\'{e}tale sites.");
        assert_eq!(record.doc_string(), "Waves We study LATEX  on etale sites.");
        assert!(record.authors.is_empty());

        let back = serde_json::to_value(&record).unwrap();
        assert!(back.get("doc_string").is_none());
        assert_eq!(back["abstract_text"], "We study $u$ on \\'{e}tale sites.");
    }

    #[test]
    fn test_tag_set_has_msc() {
        let mut tags = TagSet::default();
        assert!(!tags.has_msc());
        tags.msc = Some(vec!["Label".to_string()]);
        assert!(tags.has_msc());
    }
}
