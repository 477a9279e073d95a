//! Paper metadata providers.
//!
//! The `PaperProvider` trait abstracts where paper metadata comes from, so the
//! pipeline can run against the live arXiv API or a frozen JSON dump without
//! knowing which.
//!
//! Providers return fully constructed [`Record`]s; the doc string is derived
//! as part of record construction.

use async_trait::async_trait;
use thiserror::Error;

use crate::models::Record;

pub mod arxiv;
pub mod json;

/// Errors that can occur when fetching papers from a provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Failed to read from the data source
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse the data format
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Network or connection error
    #[error("Network error: {0}")]
    NetworkError(String),

    /// The source reported an error for the request
    #[error("API error: {0}")]
    ApiError(String),

    /// Requested identifiers that the source does not know
    #[error("Papers not found: {}", .0.join(", "))]
    NotFound(Vec<String>),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// What to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchRequest {
    /// Specific papers by identifier, returned in request order
    Ids(Vec<String>),

    /// Papers matching a search query, most recently updated first
    Query { query: String, max_results: usize },
}

impl FetchRequest {
    pub fn ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FetchRequest::Ids(ids.into_iter().map(Into::into).collect())
    }

    pub fn query(query: impl Into<String>, max_results: usize) -> Self {
        FetchRequest::Query {
            query: query.into(),
            max_results,
        }
    }
}

/// Trait for sourcing paper metadata.
#[async_trait]
pub trait PaperProvider: Send + Sync {
    /// Fetch the records described by `request`.
    ///
    /// # Errors
    /// Returns `ProviderError::NotFound` when an id request names papers the
    /// source does not have, or another variant if the source fails
    async fn fetch(&self, request: &FetchRequest) -> ProviderResult<Vec<Record>>;

    /// Get a human-readable name of this provider for logging.
    fn name(&self) -> &str;
}

/// Either provider behind one concrete type, for callers that pick the
/// source at runtime.
#[derive(Debug)]
pub enum DynamicPaperProvider {
    Arxiv(arxiv::ArxivProvider),
    Json(json::JsonFilePaperProvider),
}

#[async_trait]
impl PaperProvider for DynamicPaperProvider {
    async fn fetch(&self, request: &FetchRequest) -> ProviderResult<Vec<Record>> {
        match self {
            DynamicPaperProvider::Arxiv(p) => p.fetch(request).await,
            DynamicPaperProvider::Json(p) => p.fetch(request).await,
        }
    }

    fn name(&self) -> &str {
        match self {
            DynamicPaperProvider::Arxiv(p) => p.name(),
            DynamicPaperProvider::Json(p) => p.name(),
        }
    }
}

/// Build an arXiv search query from field filters.
///
/// Empty fields are skipped; the rest are joined with `AND`, e.g.
/// `au:Tao AND cat:math.AP`.
pub fn format_query(author: &str, title: &str, category: &str, abstract_text: &str) -> String {
    [
        ("au", author),
        ("ti", title),
        ("cat", category),
        ("abs", abstract_text),
    ]
    .iter()
    .filter(|(_, value)| !value.trim().is_empty())
    .map(|(field, value)| format!("{}:{}", field, value.trim()))
    .collect::<Vec<_>>()
    .join(" AND ")
}

/// Whether two arXiv identifiers name the same paper, ignoring the version
/// suffix when either side omits it.
pub fn same_paper(requested: &str, id: &str) -> bool {
    if requested == id {
        return true;
    }
    let has_version = |s: &str| {
        s.rfind('v')
            .map(|i| i + 1 < s.len() && s[i + 1..].chars().all(|c| c.is_ascii_digit()))
            .unwrap_or(false)
    };
    match (has_version(requested), has_version(id)) {
        (false, true) => id
            .rsplit_once('v')
            .map(|(base, _)| base == requested)
            .unwrap_or(false),
        (true, false) => requested
            .rsplit_once('v')
            .map(|(base, _)| base == id)
            .unwrap_or(false),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_query_skips_empty_fields() {
        assert_eq!(
            format_query("Tao", "", "math.AP", ""),
            "au:Tao AND cat:math.AP"
        );
        assert_eq!(format_query("", "", "", "blow-up"), "abs:blow-up");
        assert_eq!(format_query("", " ", "", ""), "");
    }

    #[test]
    fn test_format_query_field_order() {
        assert_eq!(
            format_query("Tao", "waves", "math.AP", "energy"),
            "au:Tao AND ti:waves AND cat:math.AP AND abs:energy"
        );
    }

    #[test]
    fn test_same_paper_versions() {
        assert!(same_paper("2101.00001", "2101.00001v2"));
        assert!(same_paper("2101.00001v2", "2101.00001"));
        assert!(same_paper("2101.00001v2", "2101.00001v2"));
        assert!(!same_paper("2101.00001v1", "2101.00001v2"));
        assert!(!same_paper("2101.00001", "2101.00002v1"));
        assert!(same_paper("math/0501001", "math/0501001v1"));
    }

    #[tokio::test]
    async fn test_dynamic_provider_delegates() {
        let provider = DynamicPaperProvider::Json(json::JsonFilePaperProvider::from_records(vec![
            Record::new("2101.00001v1", "Title", "Abstract", vec![]),
        ]));
        assert_eq!(provider.name(), "json:memory");
        let records = provider.fetch(&FetchRequest::ids(["2101.00001"])).await.unwrap();
        assert_eq!(records[0].id, "2101.00001v1");
    }

    #[test]
    fn test_fetch_request_constructors() {
        assert_eq!(
            FetchRequest::ids(["a", "b"]),
            FetchRequest::Ids(vec!["a".to_string(), "b".to_string()])
        );
        assert_eq!(
            FetchRequest::query("cat:math.AP", 10),
            FetchRequest::Query {
                query: "cat:math.AP".to_string(),
                max_results: 10
            }
        );
    }
}
