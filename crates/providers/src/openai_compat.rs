//! OpenAI-compatible provider implementation.
//!
//! Works with: OpenAI, OpenRouter, Ollama, vLLM, llama.cpp server, LM Studio,
//! and any endpoint exposing `/chat/completions` with SSE streaming.
//!
//! The provider forwards raw deltas. Tool-call fragments are passed through
//! with their slot index untouched; reassembly happens in the agent.

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use skiff_config::Settings;
use skiff_core::error::ProviderError;
use skiff_core::message::Message;
use skiff_core::provider::*;
use tracing::{debug, trace, warn};
use crate::sse::{SseDecoder, SseLine};

/// An OpenAI-compatible LLM provider.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiCompatProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatProvider")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider.
    ///
    /// `base_url` is the API root (e.g. `https://api.openai.com/v1`); without
    /// an `api_key` no `Authorization` header is sent.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: Option<String>,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            client,
        })
    }

    /// Build from the endpoint and credential in `settings`.
    ///
    /// A missing endpoint is not an error here; the agent loop reports it at startup.
    pub fn from_settings(settings: &Settings) -> Result<Self, ProviderError> {
        Self::new(
            "openai-compatible",
            settings.api_url.clone().unwrap_or_default(),
            settings.api_key.clone(),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Convert our Message types to OpenAI API format.
    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| {
                let tool_calls: Vec<ApiToolCall> = m
                    .tool_calls()
                    .iter()
                    .map(|tc| ApiToolCall {
                        id: tc.id.clone(),
                        r#type: "function".into(),
                        function: ApiFunction {
                            name: tc.name.clone(),
                            arguments: tc.arguments.clone(),
                        },
                    })
                    .collect();

                // Some servers reject an empty string next to tool_calls
                let content = match m {
                    Message::Assistant { content, .. } if content.is_empty() && !tool_calls.is_empty() => None,
                    _ => Some(m.content().to_string()),
                };

                ApiMessage {
                    role: m.role().as_str().into(),
                    content,
                    tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
                    tool_call_id: match m {
                        Message::Tool { tool_call_id, .. } => Some(tool_call_id.clone()),
                        _ => None,
                    },
                }
            })
            .collect()
    }

    /// Convert tool definitions to OpenAI API format.
    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<ApiToolDefinition> {
        tools
            .iter()
            .map(|t| ApiToolDefinition {
                r#type: "function".into(),
                function: ApiToolFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect()
    }

    fn request_body(request: &ProviderRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.messages),
            "temperature": request.temperature,
            "stream": true,
        });

        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
        }

        body
    }
}

#[derive(Debug)]
enum ChunkError {
    /// The payload is not a chunk at all; skipped.
    Malformed(serde_json::Error),
    /// The server reported an error inside the stream.
    Upstream(ProviderError),
}

/// Turn one SSE `data:` payload into a chunk. `Ok(None)` means nothing to forward.
fn parse_chunk(data: &str) -> Result<Option<StreamChunk>, ChunkError> {
    let resp: StreamResponse = serde_json::from_str(data).map_err(ChunkError::Malformed)?;

    if let Some(error) = resp.error {
        return Err(ChunkError::Upstream(in_band_error(&error)));
    }

    let mut chunk = StreamChunk {
        usage: resp.usage.map(|u| Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }),
        ..StreamChunk::default()
    };

    if let Some(choice) = resp.choices.into_iter().next() {
        chunk.content = choice.delta.content.filter(|c| !c.is_empty());
        chunk.tool_calls = choice
            .delta
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| {
                let (name, arguments) = match tc.function {
                    Some(f) => (f.name, f.arguments),
                    None => (None, None),
                };
                ToolCallDelta {
                    index: tc.index,
                    id: tc.id,
                    name,
                    arguments,
                }
            })
            .collect();
    }

    let empty = chunk.content.is_none() && chunk.tool_calls.is_empty() && chunk.usage.is_none();
    Ok((!empty).then_some(chunk))
}

/// `{"error": {"message": .., "code": ..}}` or `{"error": "..."}` sent after a 200.
fn in_band_error(error: &serde_json::Value) -> ProviderError {
    let message = match error {
        serde_json::Value::String(s) => s.clone(),
        other => other
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| other.to_string()),
    };
    let status_code = error
        .get("code")
        .and_then(|c| c.as_u64())
        .and_then(|c| u16::try_from(c).ok())
        .unwrap_or(200);
    ProviderError::ApiError { status_code, message }
}

fn done_chunk() -> StreamChunk {
    StreamChunk {
        done: true,
        ..StreamChunk::default()
    }
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = Self::request_body(&request);

        debug!(
            provider = %self.name,
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Sending streaming request"
        );

        let mut builder = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status().as_u16();

        if status == 429 {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(5);
            return Err(ProviderError::RateLimited { retry_after_secs });
        }

        if status == 401 || status == 403 {
            return Err(ProviderError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ));
        }

        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Provider streaming error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let (tx, rx) = tokio::sync::mpsc::channel(64);
        let provider_name = self.name.clone();

        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut decoder = SseDecoder::new();

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx
                            .send(Err(ProviderError::StreamInterrupted(e.to_string())))
                            .await;
                        return;
                    }
                };

                for line in decoder.push(&bytes) {
                    let data = match line {
                        SseLine::Done => {
                            let _ = tx.send(Ok(done_chunk())).await;
                            return;
                        }
                        SseLine::Data(data) => data,
                    };

                    match parse_chunk(&data) {
                        Ok(Some(chunk)) => {
                            if tx.send(Ok(chunk)).await.is_err() {
                                return; // receiver dropped
                            }
                        }
                        Ok(None) => {}
                        Err(ChunkError::Upstream(err)) => {
                            warn!(provider = %provider_name, error = %err, "Provider reported an error mid-stream");
                            let _ = tx.send(Err(err)).await;
                            return;
                        }
                        Err(ChunkError::Malformed(e)) => {
                            trace!(
                                provider = %provider_name,
                                data = %data,
                                error = %e,
                                "Ignoring unparseable SSE chunk"
                            );
                        }
                    }
                }
            }

            if let Some(SseLine::Data(data)) = decoder.finish() {
                match parse_chunk(&data) {
                    Ok(Some(chunk)) => {
                        let _ = tx.send(Ok(chunk)).await;
                    }
                    Err(ChunkError::Upstream(err)) => {
                        warn!(provider = %provider_name, error = %err, "Provider reported an error mid-stream");
                        let _ = tx.send(Err(err)).await;
                        return;
                    }
                    Ok(None) | Err(ChunkError::Malformed(_)) => {}
                }
            }

            // Stream closed without [DONE]
            let _ = tx.send(Ok(done_chunk())).await;
        });

        Ok(rx)
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    r#type: String,
    function: ApiFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

// --- Streaming SSE types ---

/// A single SSE `data: {...}` chunk from a streaming response.
#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<StreamToolCallDelta>>,
}

/// A tool call delta; arrives incrementally across chunks.
#[derive(Debug, Deserialize)]
struct StreamToolCallDelta {
    index: u32,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<StreamFunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}
