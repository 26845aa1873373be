use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::Client;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::warn;

use crate::config::WebSearchConfig;
use crate::domain::models::WebResult;
use crate::domain::ports::WebSearchTool;
use crate::security::RateLimiter;

/// Process-wide budget (§4.6), not per-client.
const WEB_SEARCH_RATE_LIMIT_KEY: &str = "web_search";

/// Phrases that suggest the user wants current/external information the
/// model can't know from training alone. Matched case-insensitively, same
/// shape as `services/query_analyzer.rs`'s intent phrase lists.
const SEARCH_TRIGGER_PHRASES: &[&str] = &[
    "latest version",
    "current version",
    "as of today",
    "latest release",
    "changelog",
    "documentation for",
    "official docs",
    "news about",
    "recent release",
    "what's new in",
];

#[derive(Deserialize)]
struct RawSearchResult {
    title: String,
    url: String,
    snippet: String,
    #[serde(default)]
    score: f32,
}

#[derive(Deserialize)]
struct RawSearchResponse {
    results: Vec<RawSearchResult>,
}

struct CacheEntry {
    results: Vec<WebResult>,
    expires_at: Instant,
}

/// C7 adapter. Never raises: every failure path returns an empty list and
/// logs, matching §4.6's "never raises to the orchestrator" contract.
pub struct HttpWebSearchTool {
    client: Client,
    enabled: bool,
    allowed_domains: Vec<String>,
    cache: DashMap<String, CacheEntry>,
    ttl: Duration,
    rate_limiter: RateLimiter,
}

impl HttpWebSearchTool {
    pub fn new(config: &WebSearchConfig) -> Self {
        Self {
            client: Client::builder().timeout(Duration::from_secs(10)).build().expect("http client"),
            enabled: config.enabled,
            allowed_domains: config.allowed_domains.clone(),
            cache: DashMap::new(),
            ttl: Duration::from_secs(config.ttl_seconds),
            rate_limiter: RateLimiter::new(config.rate_limit_per_minute, Duration::from_secs(60)),
        }
    }

    fn normalize_query(query: &str) -> String {
        query.trim().to_lowercase()
    }

    fn domain_allowed(&self, url: &str) -> bool {
        self.allowed_domains.iter().any(|domain| url.contains(domain.as_str()))
    }
}

#[async_trait]
impl WebSearchTool for HttpWebSearchTool {
    async fn search(&self, query: &str, max_results: usize) -> Vec<WebResult> {
        if !self.enabled {
            return Vec::new();
        }

        let key = Self::normalize_query(query);

        if let Some(entry) = self.cache.get(&key) {
            if entry.expires_at > Instant::now() {
                return entry.results.iter().take(max_results).cloned().collect();
            }
        }

        if self.rate_limiter.check(WEB_SEARCH_RATE_LIMIT_KEY).is_err() {
            warn!("web search throttled");
            return Vec::new();
        }

        let response = match self
            .client
            .get("https://search.example.internal/v1/search")
            .query(&[("q", query), ("max_results", &max_results.to_string())])
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                warn!(error = %e, "web search upstream failure");
                return Vec::new();
            }
        };

        let parsed: RawSearchResponse = match response.json().await {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(error = %e, "web search response parse failure");
                return Vec::new();
            }
        };

        let results: Vec<WebResult> = parsed
            .results
            .into_iter()
            .filter(|r| self.domain_allowed(&r.url))
            .map(|r| WebResult {
                title: r.title,
                url: r.url,
                snippet: r.snippet,
                score: r.score,
                source: "web_search".to_string(),
            })
            .take(max_results)
            .collect();

        self.cache.insert(
            key,
            CacheEntry { results: results.clone(), expires_at: Instant::now() + self.ttl },
        );

        results
    }

    fn should_search(&self, user_message: &str) -> bool {
        if !self.enabled {
            return false;
        }
        let lower = user_message.to_lowercase();
        SEARCH_TRIGGER_PHRASES.iter().any(|phrase| lower.contains(phrase))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool(enabled: bool) -> HttpWebSearchTool {
        HttpWebSearchTool::new(&WebSearchConfig {
            enabled,
            api_key: None,
            allowed_domains: vec!["docs.rs".to_string()],
            ttl_seconds: 3600,
            rate_limit_per_minute: 10,
            max_results: 3,
        })
    }

    #[test]
    fn detects_search_trigger_phrases() {
        let tool = tool(true);
        assert!(tool.should_search("what is the latest version of tokio?"));
        assert!(tool.should_search("point me to the official docs for axum"));
        assert!(!tool.should_search("explain dependency inversion"));
    }

    #[test]
    fn disabled_tool_never_searches() {
        let tool = tool(false);
        assert!(!tool.should_search("what's new in rust 1.80"));
    }

    #[test]
    fn domain_allow_list_filters_results() {
        let tool = tool(true);
        assert!(tool.domain_allowed("https://docs.rs/tokio/latest"));
        assert!(!tool.domain_allowed("https://some-random-blog.example/post"));
    }
}
