//! JSON file provider.
//!
//! Serves records from a JSON array on disk, the frozen counterpart of the
//! live arXiv provider. Each element needs `id`, `title` and `abstract` (or
//! `summary`); `categories`, `authors` and `published` are optional.
//!
//! ```json
//! [
//!   {
//!     "id": "2101.00001v1",
//!     "title": "Blow-up for the heat equation",
//!     "abstract": "We prove ...",
//!     "categories": ["math.AP", "35K55"]
//!   }
//! ]
//! ```

use std::path::Path;

use async_trait::async_trait;
use tracing::{debug, info};

use super::{same_paper, FetchRequest, PaperProvider, ProviderError, ProviderResult};
use crate::models::Record;

/// Provider backed by an in-memory list loaded from a JSON file.
#[derive(Debug, Clone)]
pub struct JsonFilePaperProvider {
    name: String,
    records: Vec<Record>,
}

impl JsonFilePaperProvider {
    /// Load every record in the file.
    ///
    /// # Errors
    /// Returns `ProviderError::IoError` if the file cannot be read and
    /// `ProviderError::ParseError` if it is not an array of records
    pub fn from_file(path: impl AsRef<Path>) -> ProviderResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let records: Vec<Record> = serde_json::from_str(&text)
            .map_err(|e| ProviderError::ParseError(format!("{}: {}", path.display(), e)))?;
        info!("Loaded {} records from {}", records.len(), path.display());

        Ok(Self {
            name: format!("json:{}", path.display()),
            records,
        })
    }

    pub fn from_records(records: Vec<Record>) -> Self {
        Self {
            name: "json:memory".to_string(),
            records,
        }
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    fn matches_query(record: &Record, terms: &[String]) -> bool {
        let haystack = format!(
            "{} {} {}",
            record.title,
            record.abstract_text,
            record.categories.join(" ")
        )
        .to_lowercase();
        terms.iter().all(|t| haystack.contains(t.as_str()))
    }
}

#[async_trait]
impl PaperProvider for JsonFilePaperProvider {
    async fn fetch(&self, request: &FetchRequest) -> ProviderResult<Vec<Record>> {
        match request {
            FetchRequest::Ids(ids) => {
                let mut found = Vec::with_capacity(ids.len());
                let mut missing = Vec::new();
                for id in ids {
                    match self.records.iter().find(|r| same_paper(id, &r.id)) {
                        Some(record) => found.push(record.clone()),
                        None => missing.push(id.clone()),
                    }
                }
                if !missing.is_empty() {
                    return Err(ProviderError::NotFound(missing));
                }
                Ok(found)
            }
            FetchRequest::Query { query, max_results } => {
                // Whitespace-separated terms, all must occur; an empty query matches everything
                let terms: Vec<String> = query.split_whitespace().map(str::to_lowercase).collect();
                let records: Vec<Record> = self
                    .records
                    .iter()
                    .filter(|r| Self::matches_query(r, &terms))
                    .take(*max_results)
                    .cloned()
                    .collect();
                debug!("Query '{}' matched {} records", query, records.len());
                Ok(records)
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"[
        {"id": "2101.00001v1", "title": "Heat flow", "abstract": "Blow-up of $u$ solutions", "categories": ["math.AP", "35K55"]},
        {"id": "2101.00002v2", "title": "Random walks", "summary": "Brownian motion", "categories": ["math.PR"]},
        {"id": "2101.00003v1", "title": "Wave maps", "abstract": "Energy methods"}
    ]"#;

    fn provider() -> JsonFilePaperProvider {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        JsonFilePaperProvider::from_file(file.path()).unwrap()
    }

    #[test]
    fn test_from_file_parses_records() {
        let p = provider();
        assert_eq!(p.records().len(), 3);
        assert_eq!(p.records()[1].abstract_text, "Brownian motion");
        assert!(p.records()[2].categories.is_empty());
        assert!(p.name().starts_with("json:"));
    }

    #[test]
    fn test_from_file_errors() {
        assert!(matches!(
            JsonFilePaperProvider::from_file("/nonexistent/records.json").unwrap_err(),
            ProviderError::IoError(_)
        ));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{\"not\": \"an array\"}").unwrap();
        assert!(matches!(
            JsonFilePaperProvider::from_file(file.path()).unwrap_err(),
            ProviderError::ParseError(_)
        ));
    }

    #[tokio::test]
    async fn test_fetch_ids_in_request_order() {
        let records = provider()
            .fetch(&FetchRequest::ids(["2101.00003", "2101.00001v1"]))
            .await
            .unwrap();
        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["2101.00003v1", "2101.00001v1"]);
    }

    #[tokio::test]
    async fn test_fetch_unknown_id_fails() {
        let err = provider()
            .fetch(&FetchRequest::ids(["2101.00001", "9999.99999"]))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::NotFound(ids) if ids == vec!["9999.99999".to_string()]));
    }

    #[tokio::test]
    async fn test_fetch_query_filters_and_limits() {
        let p = provider();
        let hits = p.fetch(&FetchRequest::query("math.AP blow-up", 10)).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "2101.00001v1");

        let all = p.fetch(&FetchRequest::query("", 2)).await.unwrap();
        assert_eq!(all.len(), 2);
    }
}
