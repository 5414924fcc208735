//! Web search tool: DuckDuckGo's HTML endpoint, scraped with regexes.
//!
//! Gives the model access to current information it may not have been
//! trained on (recent events, whether a band exists, song lyrics).

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use m1nd_core::error::ToolError;
use m1nd_core::tool::{Tool, ToolArguments};
use regex::Regex;
use tracing::debug;

const SEARCH_URL: &str = "https://html.duckduckgo.com/html/";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

static ANCHOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?s)<a\s([^>]*)>(.*?)</a>"#).expect("anchor pattern"));
static HREF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"href="([^"]+)""#).expect("href pattern"));
static CLASS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"class="([^"]*)""#).expect("class pattern"));
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("tag pattern"));
static ENTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(?:#([0-9]{1,7})|#[xX]([0-9a-fA-F]{1,6})|([a-zA-Z]+));").expect("entity pattern")
});

pub struct WebSearchTool {
    client: reqwest::Client,
    timeout: Duration,
    max_results: usize,
}

impl WebSearchTool {
    pub fn new(timeout: Duration, max_results: usize) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
            max_results: max_results.max(1),
        }
    }

    async fn fetch(&self, query: &str) -> Result<String, ToolError> {
        let failed = |reason: String| ToolError::ExecutionFailed {
            tool_name: "web_search".into(),
            reason,
        };

        let response = self
            .client
            .get(SEARCH_URL)
            .query(&[("q", query)])
            .header("User-Agent", USER_AGENT)
            .header("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8")
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ToolError::Timeout {
                        tool_name: "web_search".into(),
                        timeout_secs: self.timeout.as_secs(),
                    }
                } else {
                    failed(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(failed(format!("search returned HTTP {}", response.status())));
        }

        response.text().await.map_err(|e| failed(e.to_string()))
    }
}

impl Default for WebSearchTool {
    fn default() -> Self {
        Self::new(Duration::from_secs(10), 5)
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the internet for up-to-date information. Use it for current events, \
         facts that may have changed, whether something exists, song lyrics and other \
         information that may be missing or outdated in your knowledge."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query, in any language"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, arguments: &ToolArguments) -> Result<String, ToolError> {
        let query = arguments
            .get("query")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'query' argument".into()))?;

        debug!(query = %query, "Searching the web");
        let html = self.fetch(query).await?;
        let results = parse_results(&html, self.max_results);
        debug!(query = %query, results = results.len(), "Web search finished");

        Ok(format_results(&results))
    }
}

#[derive(Debug, Clone, PartialEq)]
struct SearchResult {
    title: String,
    url: String,
    snippet: String,
}

/// Extract up to `limit` results from a DuckDuckGo HTML page.
fn parse_results(html: &str, limit: usize) -> Vec<SearchResult> {
    let mut results: Vec<SearchResult> = Vec::new();

    for cap in ANCHOR.captures_iter(html) {
        let attrs = &cap[1];
        let classes = CLASS.captures(attrs).map(|c| c[1].to_string()).unwrap_or_default();

        if classes.contains("result__a") {
            if results.len() == limit {
                break;
            }
            let title = clean_html(&cap[2]);
            let url = HREF
                .captures(attrs)
                .map(|c| resolve_url(&decode_entities(&c[1])))
                .unwrap_or_default();
            if !title.is_empty() && !url.is_empty() {
                results.push(SearchResult {
                    title,
                    url,
                    snippet: String::new(),
                });
            }
        } else if classes.contains("result__snippet") {
            if let Some(last) = results.last_mut().filter(|r| r.snippet.is_empty()) {
                last.snippet = clean_html(&cap[2]);
            }
        }
    }

    results
}

/// Unwrap DuckDuckGo's `/l/?uddg=<target>` redirect links.
fn resolve_url(href: &str) -> String {
    let absolute = if href.starts_with("//") {
        format!("https:{href}")
    } else {
        href.to_string()
    };

    if absolute.contains("uddg=") {
        if let Ok(parsed) = reqwest::Url::parse(&absolute) {
            if let Some((_, target)) = parsed.query_pairs().find(|(k, _)| k == "uddg") {
                return target.into_owned();
            }
        }
    }
    absolute
}

/// Decode numeric references and the common named entities in one pass.
/// Anything unrecognised is left as written.
fn decode_entities(s: &str) -> String {
    ENTITY
        .replace_all(s, |caps: &regex::Captures| {
            let decoded = if let Some(dec) = caps.get(1) {
                dec.as_str().parse().ok().and_then(char::from_u32)
            } else if let Some(hex) = caps.get(2) {
                u32::from_str_radix(hex.as_str(), 16).ok().and_then(char::from_u32)
            } else {
                match &caps[3] {
                    "amp" => Some('&'),
                    "lt" => Some('<'),
                    "gt" => Some('>'),
                    "quot" => Some('"'),
                    "apos" => Some('\''),
                    "nbsp" => Some(' '),
                    _ => None,
                }
            };
            decoded.map_or_else(|| caps[0].to_string(), String::from)
        })
        .into_owned()
}

fn clean_html(s: &str) -> String {
    decode_entities(&TAG.replace_all(s, "")).trim().to_string()
}

fn format_results(results: &[SearchResult]) -> String {
    if results.is_empty() {
        return "No search results found. Try a different query.".into();
    }

    let mut out = String::from("Web search results:\n\n");
    for (i, r) in results.iter().enumerate() {
        out.push_str(&format!("{}. {}\n", i + 1, r.title));
        out.push_str(&format!("   URL: {}\n", r.url));
        if !r.snippet.is_empty() {
            out.push_str(&format!("   Description: {}\n", r.snippet));
        }
        out.push('\n');
    }
    out
}
