//! Web tools backed by the Tavily API: WebSearch and ExtractPageContent.
//!
//! Both need a search credential. Without one they fail with a configuration
//! error instead of attempting the request.

use async_trait::async_trait;
use serde::Deserialize;
use skiff_config::Settings;
use skiff_core::error::ToolError;
use skiff_core::tool::{Tool, ToolResult};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use crate::required_str;

/// Shared HTTP client and credential for the Tavily endpoints.
pub struct TavilyClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl TavilyClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.search.base_url.clone(),
            settings.search_api_key().map(str::to_string),
        )
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn post<T: for<'de> Deserialize<'de>>(
        &self,
        tool: &str,
        endpoint: &str,
        mut body: serde_json::Value,
    ) -> Result<T, ToolError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| ToolError::NotConfigured {
            tool_name: tool.into(),
            reason: "no search API key configured (set TAVILY_API_KEY or [search] api_key)".into(),
        })?;
        body["api_key"] = serde_json::json!(api_key);

        let url = format!("{}/{endpoint}", self.base_url);
        debug!(tool, url = %url, "Calling search API");

        let fail = |reason: String| ToolError::ExecutionFailed {
            tool_name: tool.into(),
            reason,
        };

        let response = self
            .client
            .post(&url)
            .timeout(Duration::from_secs(60))
            .json(&body)
            .send()
            .await
            .map_err(|e| fail(format!("Search request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            warn!(tool, status = status.as_u16(), body = %error_body, "Search API error");
            return Err(fail(format!("Search API error ({}): {error_body}", status.as_u16())));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| fail(format!("Failed to parse search response: {e}")))
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    results: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(default)]
    title: String,
    url: String,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct ExtractResponse {
    #[serde(default)]
    results: Vec<ExtractedPage>,
    #[serde(default)]
    failed_results: Vec<FailedPage>,
}

#[derive(Debug, Deserialize)]
struct ExtractedPage {
    url: String,
    #[serde(default)]
    raw_content: String,
}

#[derive(Debug, Deserialize)]
struct FailedPage {
    url: String,
    #[serde(default)]
    error: String,
}

fn format_search(query: &str, resp: &SearchResponse) -> String {
    if resp.results.is_empty() && resp.answer.is_none() {
        return format!("No results found for: {query}");
    }

    let mut out = String::new();
    if let Some(answer) = resp.answer.as_deref().filter(|a| !a.is_empty()) {
        out.push_str(&format!("Answer: {answer}\n\n"));
    }
    for (i, hit) in resp.results.iter().enumerate() {
        out.push_str(&format!("{}. {}\n   {}\n   {}\n\n", i + 1, hit.title, hit.url, hit.content));
    }
    out.trim_end().to_string()
}

fn format_extract(resp: &ExtractResponse) -> String {
    let mut sections: Vec<String> = resp
        .results
        .iter()
        .map(|page| format!("## {}\n\n{}", page.url, page.raw_content.trim()))
        .collect();
    sections.extend(
        resp.failed_results
            .iter()
            .map(|f| format!("## {}\n\nFailed to extract: {}", f.url, f.error)),
    );
    sections.join("\n\n")
}

pub struct WebSearchTool {
    tavily: Arc<TavilyClient>,
}

impl WebSearchTool {
    pub fn new(tavily: Arc<TavilyClient>) -> Self {
        Self { tavily }
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "WebSearch"
    }

    fn description(&self) -> &str {
        "Search the web. Returns titles, URLs, and snippets of the most relevant results."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                },
                "max_results": {
                    "type": "integer",
                    "description": "Number of results to return (default 5, max 20)"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let query = required_str(&arguments, "WebSearch", "query")?;
        let max_results = arguments
            .get("max_results")
            .and_then(|v| v.as_u64())
            .unwrap_or(5)
            .clamp(1, 20);

        let resp: SearchResponse = self
            .tavily
            .post(
                "WebSearch",
                "search",
                serde_json::json!({
                    "query": query,
                    "max_results": max_results,
                    "include_answer": true,
                }),
            )
            .await?;

        Ok(ToolResult::ok(format_search(query, &resp)))
    }
}

pub struct ExtractPageContentTool {
    tavily: Arc<TavilyClient>,
}

impl ExtractPageContentTool {
    pub fn new(tavily: Arc<TavilyClient>) -> Self {
        Self { tavily }
    }
}

#[async_trait]
impl Tool for ExtractPageContentTool {
    fn name(&self) -> &str {
        "ExtractPageContent"
    }

    fn description(&self) -> &str {
        "Fetch one or more web pages and return their main text content."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "urls": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Page URLs to extract"
                }
            },
            "required": ["urls"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let urls: Vec<String> = match arguments.get("urls") {
            Some(serde_json::Value::String(url)) => vec![url.clone()],
            Some(serde_json::Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        };
        if urls.is_empty() {
            return Err(ToolError::InvalidArguments(
                "ExtractPageContent: missing required parameter 'urls'".into(),
            ));
        }

        let resp: ExtractResponse = self
            .tavily
            .post("ExtractPageContent", "extract", serde_json::json!({ "urls": urls }))
            .await?;

        if resp.results.is_empty() && resp.failed_results.is_empty() {
            return Ok(ToolResult::ok("No content extracted"));
        }
        Ok(ToolResult::ok(format_extract(&resp)))
    }
}
