//! Firecrawl search client
//!
//! Uses the `/v1/search` endpoint with markdown scraping, so each hit comes
//! back with the page content the engine summarises.

use async_trait::async_trait;
use delve_core::{
    config_error, search_error, DelveError, DelveResult, ErrorContext, SearchBackend,
    SearchConfig, SourceInfo,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

pub const API_KEY_ENV: &str = "FIRECRAWL_API_KEY";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest<'a> {
    query: &'a str,
    limit: usize,
    scrape_options: ScrapeOptions,
}

#[derive(Debug, Serialize)]
struct ScrapeOptions {
    formats: [&'static str; 1],
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    data: Vec<SearchHit>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    url: Option<String>,
    title: Option<String>,
    description: Option<String>,
    markdown: Option<String>,
    #[serde(default)]
    metadata: Option<HitMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HitMetadata {
    title: Option<String>,
    source_url: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl SearchHit {
    /// Hits without any usable URL are dropped
    fn into_source(self) -> Option<SourceInfo> {
        let metadata = self.metadata;
        let (meta_title, meta_url) = match metadata {
            Some(m) => (m.title, m.source_url),
            None => (None, None),
        };

        let url = non_empty(self.url).or(non_empty(meta_url))?;
        Some(SourceInfo {
            url,
            title: non_empty(self.title).or(non_empty(meta_title)),
            content: non_empty(self.markdown),
            snippet: non_empty(self.description),
        })
    }
}

/// Map a Firecrawl response body to documents, keeping at most `limit`
fn parse_response(body: &str, limit: usize) -> DelveResult<Vec<SourceInfo>> {
    let response: SearchResponse = serde_json::from_str(body).map_err(|e| DelveError::Parse {
        message: format!("Invalid Firecrawl response: {}", e),
        context: ErrorContext::new("firecrawl_search").with_operation("parse_response"),
    })?;

    if response.success == Some(false) {
        return Err(search_error!(
            response
                .error
                .unwrap_or_else(|| "Firecrawl reported an unsuccessful search".to_string()),
            "firecrawl_search",
            "firecrawl"
        ));
    }

    Ok(response
        .data
        .into_iter()
        .filter_map(SearchHit::into_source)
        .take(limit)
        .collect())
}

/// Turn a non-success status into the matching error kind
fn status_error(status: reqwest::StatusCode, body: &str, retry_after: Option<u64>) -> DelveError {
    let detail = if body.trim().is_empty() {
        status.canonical_reason().unwrap_or("Unknown error").to_string()
    } else {
        body.trim().chars().take(300).collect()
    };

    match status.as_u16() {
        429 => DelveError::RateLimit {
            message: format!("Firecrawl rate limit: {}", detail),
            retry_after_ms: retry_after.map(|secs| secs * 1000),
            context: ErrorContext::new("firecrawl_search")
                .with_operation("search")
                .with_suggestion("Lower research.concurrency or wait before retrying"),
        },
        401 | 403 => DelveError::Config {
            message: format!(
                "Firecrawl rejected the API key (HTTP {}): {}",
                status.as_u16(),
                detail
            ),
            source: None,
            context: ErrorContext::new("firecrawl_search")
                .with_operation("search")
                .with_suggestion("Check search.api_key or FIRECRAWL_API_KEY"),
        },
        code => search_error!(
            format!("HTTP {} from Firecrawl: {}", code, detail),
            "firecrawl_search",
            "firecrawl"
        ),
    }
}

/// Web search backend over the Firecrawl API
pub struct FirecrawlSearch {
    client: reqwest::Client,
    endpoint: Url,
    api_key: String,
}

impl FirecrawlSearch {
    pub fn new(base_url: &str, api_key: impl Into<String>, timeout: Duration) -> DelveResult<Self> {
        let endpoint = Url::parse(base_url)
            .and_then(|base| base.join("v1/search"))
            .map_err(|e| {
                config_error!(
                    format!("Invalid search base URL '{}': {}", base_url, e),
                    "firecrawl_search"
                )
            })?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("delve/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DelveError::Network {
                message: format!("Failed to create HTTP client: {}", e),
                source: Some(Box::new(e)),
                context: ErrorContext::new("firecrawl_search").with_operation("create_client"),
            })?;

        info!("Created Firecrawl search client for {}", endpoint);

        Ok(Self {
            client,
            endpoint,
            api_key: api_key.into(),
        })
    }

    /// Build from configuration; the key falls back to `FIRECRAWL_API_KEY`
    pub fn from_config(config: &SearchConfig) -> DelveResult<Self> {
        if config.provider != "firecrawl" {
            return Err(config_error!(
                format!("Unsupported search provider: {}", config.provider),
                "firecrawl_search"
            ));
        }

        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .or_else(|| std::env::var(API_KEY_ENV).ok())
            .ok_or_else(|| {
                config_error!(
                    format!("Firecrawl API key not found (set search.api_key or {})", API_KEY_ENV),
                    "firecrawl_search"
                )
            })?;

        Self::new(
            &config.base_url,
            api_key,
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl SearchBackend for FirecrawlSearch {
    async fn search(&self, query: &str, limit: usize) -> DelveResult<Vec<SourceInfo>> {
        debug!(query = query, limit = limit, "Searching Firecrawl");

        let request = SearchRequest {
            query,
            limit,
            scrape_options: ScrapeOptions {
                formats: ["markdown"],
            },
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    search_error!(
                        format!("Firecrawl request timed out: {}", e),
                        "firecrawl_search",
                        "firecrawl"
                    )
                } else {
                    DelveError::Network {
                        message: format!("Failed to reach Firecrawl: {}", e),
                        source: Some(Box::new(e)),
                        context: ErrorContext::new("firecrawl_search").with_operation("search"),
                    }
                }
            })?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok());
        let body = response.text().await.map_err(|e| DelveError::Network {
            message: format!("Failed to read Firecrawl response: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("firecrawl_search").with_operation("read_body"),
        })?;

        if !status.is_success() {
            return Err(status_error(status, &body, retry_after));
        }

        let documents = parse_response(&body, limit)?;
        debug!(query = query, results = documents.len(), "Firecrawl search complete");
        Ok(documents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_response_maps_hits() {
        let body = r##"{
            "success": true,
            "data": [
                {"url": "https://a.example", "title": "A", "description": "short", "markdown": "# A"},
                {"title": "no url"},
                {"url": "", "metadata": {"title": "B", "sourceURL": "https://b.example"}},
                {"url": "https://c.example"}
            ]
        }"##;

        let docs = parse_response(body, 10).unwrap();
        assert_eq!(docs.len(), 3);
        assert_eq!(docs[0].content.as_deref(), Some("# A"));
        assert_eq!(docs[0].snippet.as_deref(), Some("short"));
        assert_eq!(docs[1].title.as_deref(), Some("B"));
        assert_eq!(docs[2].title, None);

        assert_eq!(parse_response(body, 1).unwrap().len(), 1);
    }

    #[test]
    fn test_unsuccessful_response_is_a_search_error() {
        let body = r#"{"success": false, "error": "quota exhausted"}"#;
        match parse_response(body, 5) {
            Err(DelveError::Search { message, .. }) => assert_eq!(message, "quota exhausted"),
            other => panic!("Expected search error, got {:?}", other),
        }
        assert!(matches!(
            parse_response("<html>", 5),
            Err(DelveError::Parse { .. })
        ));
    }

    #[test]
    fn test_status_errors() {
        let limited = status_error(reqwest::StatusCode::TOO_MANY_REQUESTS, "", Some(3));
        assert!(matches!(
            limited,
            DelveError::RateLimit {
                retry_after_ms: Some(3000),
                ..
            }
        ));
        assert!(limited.is_recoverable());

        let auth = status_error(reqwest::StatusCode::UNAUTHORIZED, "bad key", None);
        assert!(!auth.is_recoverable());

        let server = status_error(reqwest::StatusCode::BAD_GATEWAY, "", None);
        assert!(matches!(server, DelveError::Search { .. }));
    }
}
