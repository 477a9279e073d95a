//! arXiv API provider.
//!
//! Talks to the public Atom endpoint (`export.arxiv.org/api/query`). Requests
//! are paged, spaced at least `delay` apart as the API terms ask, and retried
//! on transport errors and server-side failures.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{same_paper, FetchRequest, PaperProvider, ProviderError, ProviderResult};
use crate::models::Record;

pub const ARXIV_API_BASE: &str = "https://export.arxiv.org/api/query";
const USER_AGENT: &str = concat!("arxiv-recommender/", env!("CARGO_PKG_VERSION"));

/// Client settings.
#[derive(Debug, Clone)]
pub struct ArxivConfig {
    pub base_url: String,
    /// Entries requested per API call
    pub page_size: usize,
    /// Extra attempts after a failed call
    pub num_retries: u32,
    /// Minimum spacing between calls, also used as the retry backoff
    pub delay: Duration,
    pub timeout: Duration,
}

impl Default for ArxivConfig {
    fn default() -> Self {
        Self {
            base_url: ARXIV_API_BASE.to_string(),
            page_size: 100,
            num_retries: 3,
            delay: Duration::from_secs(3),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Live arXiv metadata provider.
#[derive(Debug)]
pub struct ArxivProvider {
    client: reqwest::Client,
    config: ArxivConfig,
    last_request: Mutex<Option<Instant>>,
}

impl ArxivProvider {
    /// # Errors
    /// Returns `ProviderError::ConfigError` for a zero page size or if the
    /// HTTP client cannot be built
    pub fn new(config: ArxivConfig) -> ProviderResult<Self> {
        if config.page_size == 0 {
            return Err(ProviderError::ConfigError("page size must be positive".to_string()));
        }
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ProviderError::ConfigError(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            config,
            last_request: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &ArxivConfig {
        &self.config
    }

    async fn rate_limit(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(instant) = *last {
            let elapsed = instant.elapsed();
            if elapsed < self.config.delay {
                tokio::time::sleep(self.config.delay - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    /// One API call with retries; returns the parsed page.
    async fn call(&self, params: &[(&str, String)]) -> ProviderResult<Vec<Record>> {
        let mut attempt = 0;
        loop {
            self.rate_limit().await;
            debug!("arXiv request {:?} (attempt {})", params, attempt + 1);

            let outcome = match self.client.get(&self.config.base_url).query(params).send().await {
                Ok(response) if response.status().is_server_error() => {
                    Err(ProviderError::NetworkError(format!("arXiv returned {}", response.status())))
                }
                Ok(response) if !response.status().is_success() => {
                    return Err(ProviderError::ApiError(format!(
                        "arXiv returned {}",
                        response.status()
                    )));
                }
                Ok(response) => response
                    .text()
                    .await
                    .map_err(|e| ProviderError::NetworkError(e.to_string())),
                Err(e) => Err(ProviderError::NetworkError(e.to_string())),
            };

            match outcome {
                Ok(body) => return parse_feed(&body),
                Err(e) if attempt < self.config.num_retries => {
                    attempt += 1;
                    warn!("arXiv request failed ({}), retrying {}/{}", e, attempt, self.config.num_retries);
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fetch_ids(&self, ids: &[String]) -> ProviderResult<Vec<Record>> {
        let mut fetched = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(self.config.page_size) {
            let params = [
                ("id_list", chunk.join(",")),
                ("max_results", chunk.len().to_string()),
            ];
            fetched.extend(self.call(&params).await?);
        }

        // Return in request order
        let mut records = Vec::with_capacity(ids.len());
        let mut missing = Vec::new();
        for id in ids {
            match fetched.iter().find(|r| same_paper(id, &r.id)) {
                Some(record) => records.push(record.clone()),
                None => missing.push(id.clone()),
            }
        }
        if !missing.is_empty() {
            return Err(ProviderError::NotFound(missing));
        }
        Ok(records)
    }

    async fn fetch_query(&self, query: &str, max_results: usize) -> ProviderResult<Vec<Record>> {
        let mut records = Vec::new();
        while records.len() < max_results {
            let page = self.config.page_size.min(max_results - records.len());
            let entries = self.call(&search_params(query, records.len(), page)).await?;
            let received = entries.len();
            records.extend(entries);
            debug!("Fetched {} of at most {} records", records.len(), max_results);

            if received < page {
                break;
            }
        }
        Ok(records)
    }
}

#[async_trait]
impl PaperProvider for ArxivProvider {
    async fn fetch(&self, request: &FetchRequest) -> ProviderResult<Vec<Record>> {
        let records = match request {
            FetchRequest::Ids(ids) => self.fetch_ids(ids).await?,
            FetchRequest::Query { query, max_results } => {
                if query.trim().is_empty() {
                    return Err(ProviderError::ConfigError("empty search query".to_string()));
                }
                self.fetch_query(query, *max_results).await?
            }
        };
        info!("Fetched {} records from arXiv", records.len());
        Ok(records)
    }

    fn name(&self) -> &str {
        "arxiv"
    }
}

/// Query-string parameters for one page of a search.
pub fn search_params(query: &str, start: usize, max_results: usize) -> Vec<(&'static str, String)> {
    vec![
        ("search_query", query.to_string()),
        ("start", start.to_string()),
        ("max_results", max_results.to_string()),
        ("sortBy", "lastUpdatedDate".to_string()),
        ("sortOrder", "descending".to_string()),
    ]
}

/// Identifier from an entry URL: `http://arxiv.org/abs/2101.00001v1` gives
/// `2101.00001v1`, old-style `.../abs/math/0501001v1` keeps its archive.
pub fn id_from_entry_url(url: &str) -> String {
    let url = url.trim();
    match url.split_once("/abs/") {
        Some((_, id)) => id.to_string(),
        None => url.rsplit('/').next().unwrap_or(url).to_string(),
    }
}

fn is_local(name: &[u8], target: &str) -> bool {
    match name.iter().rposition(|&b| b == b':') {
        Some(pos) => &name[pos + 1..] == target.as_bytes(),
        None => name == target.as_bytes(),
    }
}

fn get_attr_value(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == key)
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

#[derive(Default)]
struct EntryFields {
    id: String,
    title: String,
    summary: String,
    categories: Vec<String>,
    authors: Vec<String>,
    published: Option<String>,
}

impl EntryFields {
    fn finish(self) -> ProviderResult<Record> {
        if self.id.contains("/api/errors") {
            return Err(ProviderError::ApiError(self.summary.trim().to_string()));
        }
        let title = self.title.split_whitespace().collect::<Vec<_>>().join(" ");
        Ok(Record::new(
            id_from_entry_url(&self.id),
            title,
            self.summary.trim(),
            self.categories,
        )
        .with_authors(self.authors)
        .with_published(self.published))
    }
}

/// Parse every `<entry>` of an Atom feed into records.
///
/// # Errors
/// Returns `ProviderError::ParseError` on malformed XML and
/// `ProviderError::ApiError` if the feed carries an error entry
pub fn parse_feed(xml: &str) -> ProviderResult<Vec<Record>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut records = Vec::new();
    let mut entry: Option<EntryFields> = None;
    let mut in_author = false;
    let mut cur_text = String::new();

    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Eof) => break,
            Ok(Event::Start(e)) => {
                let name = e.name();
                if is_local(name.as_ref(), "entry") {
                    entry = Some(EntryFields::default());
                } else if is_local(name.as_ref(), "author") {
                    in_author = true;
                } else if let Some(fields) = entry.as_mut() {
                    if is_local(name.as_ref(), "category") {
                        fields.categories.extend(get_attr_value(&e, b"term"));
                    }
                }
                cur_text.clear();
            }
            Ok(Event::Empty(e)) => {
                if let Some(fields) = entry.as_mut() {
                    if is_local(e.name().as_ref(), "category") {
                        fields.categories.extend(get_attr_value(&e, b"term"));
                    }
                }
            }
            Ok(Event::End(e)) => {
                let name = e.name();
                if is_local(name.as_ref(), "entry") {
                    if let Some(fields) = entry.take() {
                        records.push(fields.finish()?);
                    }
                } else if is_local(name.as_ref(), "author") {
                    in_author = false;
                } else if let Some(fields) = entry.as_mut() {
                    let text = cur_text.trim();
                    let local = name.local_name();
                    match local.as_ref() {
                        b"id" => fields.id = text.to_string(),
                        b"title" => fields.title = text.to_string(),
                        b"summary" => fields.summary = text.to_string(),
                        b"published" if !text.is_empty() => {
                            fields.published = Some(text.to_string())
                        }
                        b"name" if in_author && !text.is_empty() => {
                            fields.authors.push(text.to_string())
                        }
                        _ => {}
                    }
                }
                cur_text.clear();
            }
            Ok(Event::Text(t)) => {
                let text = t
                    .unescape()
                    .map_err(|e| ProviderError::ParseError(format!("XML text: {}", e)))?;
                cur_text.push_str(&text);
            }
            Ok(Event::CData(t)) => {
                cur_text.push_str(&String::from_utf8_lossy(t.as_ref()));
            }
            Err(e) => {
                return Err(ProviderError::ParseError(format!(
                    "XML parse error at position {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom" xmlns:opensearch="http://a9.com/-/spec/opensearch/1.1/" xmlns:arxiv="http://arxiv.org/schemas/atom">
  <title type="html">ArXiv Query: search_query=cat:math.AP</title>
  <opensearch:totalResults>2</opensearch:totalResults>
  <entry>
    <id>http://arxiv.org/abs/2101.00001v2</id>
    <updated>2021-02-01T00:00:00Z</updated>
    <published>2021-01-01T00:00:00Z</published>
    <title>Global existence for
      the heat equation</title>
    <summary>  We prove that $u$ exists &amp; is smooth.
Second line.
</summary>
    <author><name>Ada Lovelace</name></author>
    <author><name>Carl Gauss</name><arxiv:affiliation>Goettingen</arxiv:affiliation></author>
    <arxiv:primary_category term="math.AP" scheme="http://arxiv.org/schemas/atom"/>
    <category term="math.AP" scheme="http://arxiv.org/schemas/atom"/>
    <category term="35Q99" scheme="http://arxiv.org/schemas/atom"/>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/math/0501001v1</id>
    <published>2005-01-01T00:00:00Z</published>
    <title>Old style identifier</title>
    <summary>Abstract.</summary>
  </entry>
</feed>"#;

    #[test]
    fn test_parse_feed_entries() {
        let records = parse_feed(FEED).unwrap();
        assert_eq!(records.len(), 2);

        let first = &records[0];
        assert_eq!(first.id, "2101.00001v2");
        assert_eq!(first.title, "Global existence for the heat equation");
        assert_eq!(first.abstract_text, "We prove that $u$ exists & is smooth.\nSecond line.");
        assert_eq!(first.categories, vec!["math.AP".to_string(), "35Q99".to_string()]);
        assert_eq!(first.authors, vec!["Ada Lovelace".to_string(), "Carl Gauss".to_string()]);
        assert_eq!(first.published.as_deref(), Some("2021-01-01T00:00:00Z"));
        assert!(first.doc_string().contains("LATEX"));

        let second = &records[1];
        assert_eq!(second.id, "math/0501001v1");
        assert!(second.categories.is_empty());
        assert!(second.authors.is_empty());
    }

    #[test]
    fn test_parse_feed_without_entries() {
        let xml = r#"<feed xmlns="http://www.w3.org/2005/Atom"><title>Empty</title></feed>"#;
        assert!(parse_feed(xml).unwrap().is_empty());
    }

    #[test]
    fn test_parse_feed_error_entry() {
        let xml = r#"<feed xmlns="http://www.w3.org/2005/Atom">
  <entry>
    <id>http://arxiv.org/api/errors#incorrect_id_format_for_1234</id>
    <title>Error</title>
    <summary>incorrect id format for 1234</summary>
  </entry>
</feed>"#;
        let err = parse_feed(xml).unwrap_err();
        assert!(matches!(err, ProviderError::ApiError(msg) if msg.contains("1234")));
    }

    #[test]
    fn test_parse_feed_malformed() {
        let err = parse_feed("<feed><entry><id>x</title></entry></feed>").unwrap_err();
        assert!(matches!(err, ProviderError::ParseError(_)));
    }

    #[test]
    fn test_id_from_entry_url() {
        assert_eq!(id_from_entry_url("http://arxiv.org/abs/2101.00001v1"), "2101.00001v1");
        assert_eq!(id_from_entry_url("http://arxiv.org/abs/hep-th/9901001v3"), "hep-th/9901001v3");
        assert_eq!(id_from_entry_url("2101.00001v1"), "2101.00001v1");
    }

    #[test]
    fn test_search_params_sorted_by_update() {
        let params = search_params("cat:math.AP", 200, 100);
        assert!(params.contains(&("search_query", "cat:math.AP".to_string())));
        assert!(params.contains(&("start", "200".to_string())));
        assert!(params.contains(&("max_results", "100".to_string())));
        assert!(params.contains(&("sortBy", "lastUpdatedDate".to_string())));
    }

    #[test]
    fn test_zero_page_size_rejected() {
        let err = ArxivProvider::new(ArxivConfig {
            page_size: 0,
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, ProviderError::ConfigError(_)));
    }
}
