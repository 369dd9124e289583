//! Web search tool
//!
//! Wraps the Tavily search API behind [`SearchProvider`] so the step executor
//! sees a typed `query -> [SearchHit]` contract.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::core::config::SearchConfig;
use crate::core::{PlanexecError, Result};

/// One ranked search result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// Anything that can answer a web search query
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Return at most `limit` hits for `query`, best first
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>>;

    /// Provider name for logs
    fn name(&self) -> &str;
}

/// Tavily API request body.
#[derive(Debug, Serialize)]
struct TavilySearchRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    max_results: usize,
    include_answer: bool,
    include_raw_content: bool,
}

/// Tavily API response.
#[derive(Debug, Deserialize)]
struct TavilySearchResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

/// A single result from Tavily.
#[derive(Debug, Deserialize)]
struct TavilyResult {
    #[serde(default)]
    title: String,
    url: String,
    #[serde(default)]
    content: String,
}

impl From<TavilyResult> for SearchHit {
    fn from(result: TavilyResult) -> Self {
        Self {
            title: result.title,
            url: result.url,
            snippet: result.content,
        }
    }
}

/// Tavily-backed search provider
#[derive(Clone)]
pub struct TavilySearch {
    client: Client,
    endpoint: Url,
    api_key: String,
}

impl TavilySearch {
    /// Build from configuration; fails when no API key is configured
    pub fn from_config(config: &SearchConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| PlanexecError::config("search.api_key (or TAVILY_API_KEY) is not set"))?;

        let endpoint = Url::parse(&config.endpoint).map_err(|e| {
            PlanexecError::config(format!("Invalid search endpoint '{}': {}", config.endpoint, e))
        })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint,
            api_key,
        })
    }
}

#[async_trait]
impl SearchProvider for TavilySearch {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let request = TavilySearchRequest {
            api_key: &self.api_key,
            query,
            max_results: limit,
            include_answer: false,
            include_raw_content: false,
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&request)
            .send()
            .await
            .map_err(|e| PlanexecError::search(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(PlanexecError::search(format!(
                "Tavily API error ({}): {}",
                status, error_text
            )));
        }

        let body: TavilySearchResponse = response
            .json()
            .await
            .map_err(|e| PlanexecError::search(format!("invalid response: {}", e)))?;

        Ok(body
            .results
            .into_iter()
            .take(limit)
            .map(SearchHit::from)
            .collect())
    }

    fn name(&self) -> &str {
        "tavily"
    }
}

/// Render hits as a compact numbered list for the model
pub fn format_hits(query: &str, hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return format!("No results found for: {}", query);
    }

    let mut output = String::new();
    for (i, hit) in hits.iter().enumerate() {
        output.push_str(&format!(
            "{}. {}\n   {}\n   {}\n",
            i + 1,
            hit.title,
            hit.url,
            hit.snippet
        ));
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_api_key_is_config_error() {
        let config = SearchConfig {
            endpoint: "https://api.tavily.com/search".to_string(),
            api_key: None,
            max_results: 5,
            timeout_secs: 5,
        };
        let err = TavilySearch::from_config(&config).err().unwrap();
        assert!(matches!(err, PlanexecError::Config(_)));
    }

    #[test]
    fn test_invalid_endpoint_is_config_error() {
        let config = SearchConfig {
            endpoint: "not a url".to_string(),
            api_key: Some("key".to_string()),
            max_results: 5,
            timeout_secs: 5,
        };
        assert!(TavilySearch::from_config(&config).is_err());
    }

    #[test]
    fn test_tavily_response_maps_to_hits() {
        let raw = r#"{"results": [{"title": "Rust", "url": "https://rust-lang.org", "content": "A language", "score": 0.9}]}"#;
        let parsed: TavilySearchResponse = serde_json::from_str(raw).unwrap();
        let hits: Vec<SearchHit> = parsed.results.into_iter().map(SearchHit::from).collect();
        assert_eq!(hits[0].snippet, "A language");
        assert_eq!(hits[0].url, "https://rust-lang.org");
    }

    #[test]
    fn test_format_hits() {
        assert_eq!(format_hits("x", &[]), "No results found for: x");
        let hits = vec![SearchHit {
            title: "T".to_string(),
            url: "https://t.example".to_string(),
            snippet: "S".to_string(),
        }];
        let text = format_hits("x", &hits);
        assert!(text.starts_with("1. T"));
        assert!(text.contains("https://t.example"));
    }
}
