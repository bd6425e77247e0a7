//! Web search provider
//!
//! Search, page extraction, and suggestion tools against a configurable
//! SearXNG-style JSON endpoint. Outbound requests are spaced at least one
//! second apart per provider instance; identical requests within the cache
//! TTL are served from memory and skip both the network and the limiter.
//! When no endpoint is configured or the remote call fails, results degrade
//! to a mock record carrying the query and an explanatory note.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use regex::Regex;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::config::defaults;
use crate::error::ToolError;
use crate::registry::{ParamType, ToolDescriptor, ToolProvider};

/// Configuration for the web search provider
#[derive(Debug, Clone)]
pub struct WebSearchConfig {
    /// SearXNG-style search endpoint; mock results when unset
    pub api_endpoint: Option<String>,
    /// Suggestion endpoint; mock suggestions when unset
    pub suggest_endpoint: Option<String>,
    pub cache_ttl: Duration,
    pub min_interval: Duration,
}

impl Default for WebSearchConfig {
    fn default() -> Self {
        Self {
            api_endpoint: None,
            suggest_endpoint: None,
            cache_ttl: Duration::from_secs(defaults::SEARCH_CACHE_SECONDS),
            min_interval: Duration::from_millis(defaults::SEARCH_MIN_INTERVAL_MS),
        }
    }
}

struct CacheEntry {
    value: Value,
    inserted: Instant,
}

/// Provider for web search and content extraction
pub struct WebSearchProvider {
    config: WebSearchConfig,
    client: reqwest::Client,
    cache: Mutex<HashMap<String, CacheEntry>>,
    last_request: tokio::sync::Mutex<Option<Instant>>,
    fetches: AtomicU64,
}

impl WebSearchProvider {
    pub fn new(config: WebSearchConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .user_agent("ringmaster/0.1")
            .build()
            .unwrap_or_default();
        Self {
            config,
            client,
            cache: Mutex::new(HashMap::new()),
            last_request: tokio::sync::Mutex::new(None),
            fetches: AtomicU64::new(0),
        }
    }

    /// How many times the provider actually produced a result (network or
    /// mock) instead of serving the cache.
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::SeqCst)
    }

    fn cache_key(tool: &str, args: &Map<String, Value>) -> String {
        // BTreeMap gives a deterministic key regardless of argument order.
        let sorted: BTreeMap<&String, &Value> = args.iter().collect();
        format!(
            "{}:{}",
            tool,
            serde_json::to_string(&sorted).unwrap_or_default()
        )
    }

    fn cache_get(&self, key: &str) -> Option<Value> {
        let cache = self.cache.lock();
        let entry = cache.get(key)?;
        if entry.inserted.elapsed() < self.config.cache_ttl {
            debug!(key, "web search cache hit");
            Some(entry.value.clone())
        } else {
            None
        }
    }

    fn cache_put(&self, key: String, value: Value) {
        let mut cache = self.cache.lock();
        // Drop expired entries opportunistically so the map stays bounded.
        let ttl = self.config.cache_ttl;
        cache.retain(|_, entry| entry.inserted.elapsed() < ttl);
        cache.insert(
            key,
            CacheEntry {
                value,
                inserted: Instant::now(),
            },
        );
    }

    /// Enforce the one-request-per-second spacing.
    async fn throttle(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.config.min_interval {
                tokio::time::sleep(self.config.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    fn mock_results(query: &str, note: &str, count: u64) -> Value {
        let results: Vec<Value> = (1..=count)
            .map(|i| {
                json!({
                    "title": format!("Result {} for '{}'", i, query),
                    "url": format!("https://example.com/search/{}", i),
                    "snippet": note,
                })
            })
            .collect();
        json!({
            "query": query,
            "results": results,
            "count": results.len(),
            "mock": true,
            "note": note,
            "timestamp": Utc::now().to_rfc3339(),
        })
    }

    async fn search_web(&self, query: &str, max_results: u64, region: Option<&str>) -> Value {
        self.fetches.fetch_add(1, Ordering::SeqCst);

        let Some(endpoint) = self.config.api_endpoint.clone() else {
            return Self::mock_results(
                query,
                "web search endpoint not configured; returning placeholder results",
                max_results.min(3),
            );
        };

        self.throttle().await;

        let mut request = self.client.get(&endpoint).query(&[
            ("q", query),
            ("format", "json"),
            ("count", &max_results.to_string()),
        ]);
        if let Some(region) = region {
            request = request.query(&[("region", region)]);
        }

        let outcome = async {
            let response = request.send().await.map_err(|e| e.to_string())?;
            if !response.status().is_success() {
                return Err(format!("search endpoint returned {}", response.status()));
            }
            response.json::<Value>().await.map_err(|e| e.to_string())
        }
        .await;

        match outcome {
            Ok(body) => {
                let results: Vec<Value> = body
                    .get("results")
                    .and_then(Value::as_array)
                    .map(|items| {
                        items
                            .iter()
                            .take(max_results as usize)
                            .map(|item| {
                                json!({
                                    "title": item.get("title").and_then(Value::as_str).unwrap_or("No title"),
                                    "url": item.get("url").and_then(Value::as_str).unwrap_or(""),
                                    "snippet": item
                                        .get("content")
                                        .or_else(|| item.get("snippet"))
                                        .and_then(Value::as_str)
                                        .unwrap_or(""),
                                })
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                json!({
                    "query": query,
                    "results": results,
                    "count": results.len(),
                    "mock": false,
                    "timestamp": Utc::now().to_rfc3339(),
                })
            }
            Err(reason) => {
                warn!(%reason, query, "web search failed, degrading to mock results");
                Self::mock_results(
                    query,
                    &format!("search request failed ({}); returning placeholder results", reason),
                    max_results.min(3),
                )
            }
        }
    }

    async fn extract_content(&self, url_text: &str, max_length: u64) -> Result<Value, ToolError> {
        let parsed = url::Url::parse(url_text)
            .map_err(|e| ToolError::Validation(format!("invalid URL '{}': {}", url_text, e)))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(ToolError::Validation(
                "only HTTP and HTTPS URLs are supported".into(),
            ));
        }

        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.throttle().await;

        let outcome = async {
            let response = self
                .client
                .get(parsed.clone())
                .send()
                .await
                .map_err(|e| e.to_string())?;
            if !response.status().is_success() {
                return Err(format!("fetch returned {}", response.status()));
            }
            response.text().await.map_err(|e| e.to_string())
        }
        .await;

        let value = match outcome {
            Ok(body) => {
                let (text, truncated) = cap_content(&extract_text(&body), max_length as usize);
                json!({
                    "url": url_text,
                    "content": text,
                    "truncated": truncated,
                    "mock": false,
                    "timestamp": Utc::now().to_rfc3339(),
                })
            }
            Err(reason) => {
                warn!(%reason, url = url_text, "content extraction failed, degrading to mock");
                json!({
                    "url": url_text,
                    "content": "",
                    "mock": true,
                    "note": format!("content extraction failed: {}", reason),
                    "timestamp": Utc::now().to_rfc3339(),
                })
            }
        };
        Ok(value)
    }

    async fn suggestions(&self, query: &str, max_suggestions: u64) -> Value {
        self.fetches.fetch_add(1, Ordering::SeqCst);

        if let Some(endpoint) = self.config.suggest_endpoint.clone() {
            self.throttle().await;
            let outcome = async {
                let response = self
                    .client
                    .get(&endpoint)
                    .query(&[("q", query)])
                    .send()
                    .await
                    .map_err(|e| e.to_string())?;
                response.json::<Value>().await.map_err(|e| e.to_string())
            }
            .await;

            // Autocomplete endpoints answer `[query, [suggestions...]]`.
            if let Ok(body) = outcome {
                if let Some(list) = body.get(1).and_then(Value::as_array) {
                    let suggestions: Vec<&str> = list
                        .iter()
                        .filter_map(Value::as_str)
                        .take(max_suggestions as usize)
                        .collect();
                    return json!({
                        "query": query,
                        "suggestions": suggestions,
                        "mock": false,
                        "timestamp": Utc::now().to_rfc3339(),
                    });
                }
            }
            warn!(query, "suggestion endpoint failed, degrading to mock");
        }

        let templates = ["tutorial", "examples", "documentation", "guide", "vs"];
        let suggestions: Vec<String> = templates
            .iter()
            .take(max_suggestions as usize)
            .map(|suffix| format!("{} {}", query, suffix))
            .collect();
        json!({
            "query": query,
            "suggestions": suggestions,
            "mock": true,
            "note": "suggestion endpoint not configured; returning derived suggestions",
            "timestamp": Utc::now().to_rfc3339(),
        })
    }
}

/// Cap content at a character count. The cap is in characters, not bytes,
/// so a multibyte sequence is never split.
fn cap_content(text: &str, max_chars: usize) -> (String, bool) {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => (text[..index].to_string(), true),
        None => (text.to_string(), false),
    }
}

/// Clamp helper used for all bounded arguments.
fn clamp_arg(args: &Map<String, Value>, key: &str, default: u64, min: u64, max: u64) -> u64 {
    args.get(key)
        .and_then(Value::as_u64)
        .unwrap_or(default)
        .clamp(min, max)
}

/// Crude HTML-to-text: drop scripts, styles, and tags, collapse whitespace.
fn extract_text(html: &str) -> String {
    let script = Regex::new(r"(?is)<(script|style|noscript)[^>]*>.*?</(script|style|noscript)>")
        .expect("static regex");
    let tags = Regex::new(r"(?s)<[^>]+>").expect("static regex");
    let without_script = script.replace_all(html, " ");
    let without_tags = tags.replace_all(&without_script, " ");
    let decoded = without_tags
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ");
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[async_trait]
impl ToolProvider for WebSearchProvider {
    fn name(&self) -> &str {
        "websearch"
    }

    fn description(&self) -> &str {
        "Web search, page content extraction, and search suggestions"
    }

    fn tools(&self) -> Vec<ToolDescriptor> {
        vec![
            ToolDescriptor::new("websearch", "search_web", "Search the web for a query")
                .with_category("network")
                .with_param("query", ParamType::String, "Search query", true)
                .with_param(
                    "max_results",
                    ParamType::Integer,
                    "Result count, clamped to 1-10 (default 5)",
                    false,
                )
                .with_param("region", ParamType::String, "Region hint, e.g. us-en", false),
            ToolDescriptor::new("websearch", "extract_content", "Fetch a page and extract its text")
                .with_category("network")
                .with_param("url", ParamType::String, "Page URL", true)
                .with_param(
                    "max_length",
                    ParamType::Integer,
                    "Content cap in characters, clamped to 100-10000 (default 2000)",
                    false,
                ),
            ToolDescriptor::new(
                "websearch",
                "search_and_extract",
                "Search, then extract text from the top results",
            )
            .with_category("network")
            .with_timeout(60)
            .with_param("query", ParamType::String, "Search query", true)
            .with_param(
                "max_results",
                ParamType::Integer,
                "Results to extract, clamped to 1-10 (default 3)",
                false,
            )
            .with_param(
                "max_content_length",
                ParamType::Integer,
                "Per-page content cap, clamped to 100-10000 (default 1000)",
                false,
            ),
            ToolDescriptor::new("websearch", "get_search_suggestions", "Suggest related queries")
                .with_category("network")
                .with_param("query", ParamType::String, "Partial query", true)
                .with_param(
                    "max_suggestions",
                    ParamType::Integer,
                    "Suggestion count, clamped to 1-10 (default 5)",
                    false,
                ),
        ]
    }

    async fn call(&self, tool: &str, args: &Map<String, Value>) -> Result<Value, ToolError> {
        let key = Self::cache_key(tool, args);
        if let Some(cached) = self.cache_get(&key) {
            return Ok(cached);
        }

        let query_arg = |name: &str| -> Result<String, ToolError> {
            args.get(name)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| ToolError::Validation(format!("{} is required", name)))
        };

        let value = match tool {
            "search_web" => {
                let query = query_arg("query")?;
                let max_results = clamp_arg(args, "max_results", 5, 1, 10);
                let region = args.get("region").and_then(Value::as_str);
                self.search_web(&query, max_results, region).await
            }
            "extract_content" => {
                let url = query_arg("url")?;
                let max_length = clamp_arg(args, "max_length", 2000, 100, 10_000);
                self.extract_content(&url, max_length).await?
            }
            "search_and_extract" => {
                let query = query_arg("query")?;
                let max_results = clamp_arg(args, "max_results", 3, 1, 10);
                let max_length = clamp_arg(args, "max_content_length", 1000, 100, 10_000);

                let search = self.search_web(&query, max_results, None).await;
                let mut extracted = Vec::new();
                if search["mock"] != json!(true) {
                    if let Some(results) = search["results"].as_array() {
                        for result in results {
                            let Some(url) = result["url"].as_str().filter(|u| !u.is_empty())
                            else {
                                continue;
                            };
                            match self.extract_content(url, max_length).await {
                                Ok(content) => extracted.push(content),
                                Err(error) => {
                                    warn!(%error, url, "skipping unextractable result")
                                }
                            }
                        }
                    }
                }
                json!({
                    "query": query,
                    "search": search,
                    "extracted": extracted,
                    "timestamp": Utc::now().to_rfc3339(),
                })
            }
            "get_search_suggestions" => {
                let query = query_arg("query")?;
                let max_suggestions = clamp_arg(args, "max_suggestions", 5, 1, 10);
                self.suggestions(&query, max_suggestions).await
            }
            other => return Err(ToolError::NotFound(other.to_string())),
        };

        self.cache_put(key, value.clone());
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn provider() -> WebSearchProvider {
        // No endpoints configured: every call produces mock records without
        // touching the network.
        WebSearchProvider::new(WebSearchConfig {
            min_interval: Duration::from_millis(0),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn out_of_range_values_are_clamped() {
        let provider = provider();
        let result = provider
            .call(
                "search_web",
                &args(&[("query", json!("rust")), ("max_results", json!(100))]),
            )
            .await
            .unwrap();
        assert!(result["count"].as_u64().unwrap() <= 10);

        let result = provider
            .call(
                "get_search_suggestions",
                &args(&[("query", json!("rust")), ("max_suggestions", json!(0))]),
            )
            .await
            .unwrap();
        assert_eq!(result["suggestions"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn identical_requests_hit_cache() {
        let provider = provider();
        let call_args = args(&[("query", json!("cache me"))]);

        let first = provider.call("search_web", &call_args).await.unwrap();
        let second = provider.call("search_web", &call_args).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(provider.fetch_count(), 1);
    }

    #[tokio::test]
    async fn different_arguments_miss_cache() {
        let provider = provider();
        provider
            .call("search_web", &args(&[("query", json!("one"))]))
            .await
            .unwrap();
        provider
            .call("search_web", &args(&[("query", json!("two"))]))
            .await
            .unwrap();
        assert_eq!(provider.fetch_count(), 2);
    }

    #[tokio::test]
    async fn mock_results_carry_note() {
        let provider = provider();
        let result = provider
            .call("search_web", &args(&[("query", json!("offline"))]))
            .await
            .unwrap();
        assert_eq!(result["mock"], json!(true));
        assert_eq!(result["query"], json!("offline"));
        assert!(result["note"].as_str().unwrap().contains("not configured"));
    }

    #[tokio::test]
    async fn bad_url_is_validation_error() {
        let provider = provider();
        let error = provider
            .call("extract_content", &args(&[("url", json!("not a url"))]))
            .await
            .unwrap_err();
        assert!(matches!(error, ToolError::Validation(_)));

        let error = provider
            .call("extract_content", &args(&[("url", json!("ftp://host/x"))]))
            .await
            .unwrap_err();
        assert!(matches!(error, ToolError::Validation(_)));
    }

    #[test]
    fn cap_content_counts_characters_not_bytes() {
        // Each of these characters is multibyte in UTF-8; a byte-index
        // truncate would land inside a sequence and panic.
        let (text, truncated) = cap_content("héllo wörld", 4);
        assert_eq!(text, "héll");
        assert!(truncated);

        let (text, truncated) = cap_content("日本語のページ本文", 3);
        assert_eq!(text, "日本語");
        assert!(truncated);
    }

    #[test]
    fn cap_content_leaves_short_text_alone() {
        let (text, truncated) = cap_content("short", 100);
        assert_eq!(text, "short");
        assert!(!truncated);

        // Exactly at the cap is not truncated.
        let (text, truncated) = cap_content("abcd", 4);
        assert_eq!(text, "abcd");
        assert!(!truncated);
    }

    #[test]
    fn html_text_extraction() {
        let html = r#"<html><head><script>var x = 1;</script><style>p{}</style></head>
            <body><h1>Title</h1><p>Hello &amp; welcome</p></body></html>"#;
        let text = extract_text(html);
        assert!(text.contains("Title"));
        assert!(text.contains("Hello & welcome"));
        assert!(!text.contains("var x"));
        assert!(!text.contains("<p>"));
    }
}
