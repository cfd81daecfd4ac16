//! OpenAI-compatible provider implementation.
//!
//! Talks to any endpoint exposing `/chat/completions` in the OpenAI shape.
//!
//! Supports:
//! - Chat completions (non-streaming and streaming SSE)
//! - Usage reporting on both paths (`stream_options.include_usage`)

use async_trait::async_trait;
use chatstack_config::ProviderConfig;
use chatstack_core::error::ProviderError;
use chatstack_core::message::ChatTurn;
use chatstack_core::provider::*;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, trace, warn};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_TIMEOUT_SECS: u64 = 120;
const DEFAULT_RETRY_AFTER_SECS: u64 = 5;

/// An OpenAI-compatible LLM provider.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self::with_timeout(name, base_url, api_key, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    fn with_timeout(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Falling back to default HTTP client");
                reqwest::Client::new()
            });

        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        }
    }

    /// Create an OpenAI provider (convenience constructor).
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::new("openai", OPENAI_BASE_URL, api_key)
    }

    /// Build a provider from the `[provider]` config table.
    ///
    /// Fails with `NotConfigured` when no API key is available.
    pub fn from_config(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            ProviderError::NotConfigured(
                "no API key; set provider.api_key, CHATSTACK_API_KEY or OPENAI_API_KEY".into(),
            )
        })?;
        let name = if config.api_url.trim_end_matches('/') == OPENAI_BASE_URL {
            "openai"
        } else {
            "openai-compatible"
        };
        Ok(Self::with_timeout(
            name,
            config.api_url.clone(),
            api_key,
            Duration::from_secs(config.timeout_secs),
        ))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Convert turns to the OpenAI wire format.
    ///
    /// Context turns go out with their prefix attached.
    fn to_api_messages(messages: &[std::sync::Arc<ChatTurn>]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| ApiMessage {
                role: m.role().as_str().to_string(),
                content: Some(m.content()),
            })
            .collect()
    }

    fn request_body(request: &ProviderRequest, stream: bool) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.messages),
            "temperature": request.temperature,
            "stream": stream,
        });

        if stream {
            body["stream_options"] = serde_json::json!({ "include_usage": true });
        }

        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        body
    }

    async fn post(
        &self,
        body: &serde_json::Value,
        stream: bool,
    ) -> Result<reqwest::Response, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut builder = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json");
        if stream {
            builder = builder.header("Accept", "text/event-stream");
        }

        let response = builder.json(body).send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout(e.to_string())
            } else {
                ProviderError::Network(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        if status == 200 {
            return Ok(response);
        }

        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let error_body = response.text().await.unwrap_or_default();
        warn!(provider = %self.name, status, body = %error_body, "Provider returned error");
        Err(classify_status(status, retry_after, &error_body))
    }
}

/// Map a non-200 response to a `ProviderError`.
fn classify_status(status: u16, retry_after: Option<u64>, body: &str) -> ProviderError {
    let detail: Option<ApiErrorBody> = serde_json::from_str(body).ok();
    let (code, message) = match detail {
        Some(d) => (d.error.code, d.error.message),
        None => (None, body.to_string()),
    };
    let context_exceeded = code.as_deref() == Some("context_length_exceeded");

    match status {
        429 => ProviderError::RateLimited {
            retry_after_secs: retry_after.unwrap_or(DEFAULT_RETRY_AFTER_SECS),
        },
        401 | 403 => ProviderError::AuthenticationFailed(if message.is_empty() {
            "Invalid API key or insufficient permissions".into()
        } else {
            message
        }),
        413 => ProviderError::RequestTooLarge(message),
        400 if context_exceeded => ProviderError::RequestTooLarge(message),
        400 => ProviderError::InvalidRequest(message),
        404 => ProviderError::ModelNotFound(message),
        _ => ProviderError::ApiError {
            status_code: status,
            message,
        },
    }
}

#[async_trait]
impl chatstack_core::Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let body = Self::request_body(&request, false);

        debug!(
            provider = %self.name,
            model = %request.model,
            messages = request.messages.len(),
            "Sending completion request"
        );

        let response = self.post(&body, false).await?;

        let api_response: ApiResponse =
            response.json().await.map_err(|e| ProviderError::ApiError {
                status_code: 200,
                message: format!("Failed to parse response: {e}"),
            })?;

        let choice =
            api_response
                .choices
                .into_iter()
                .next()
                .ok_or_else(|| ProviderError::ApiError {
                    status_code: 200,
                    message: "No choices in response".into(),
                })?;

        Ok(ProviderResponse {
            content: choice.message.content.unwrap_or_default(),
            usage: api_response.usage.map(Usage::from),
            model: api_response.model,
        })
    }

    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ChunkReceiver, ProviderError> {
        let body = Self::request_body(&request, true);

        debug!(provider = %self.name, model = %request.model, "Sending streaming request");

        let response = self.post(&body, true).await?;

        let (tx, rx) = tokio::sync::mpsc::channel(64);
        let provider_name = self.name.clone();

        // Reads the SSE byte stream until [DONE], the usage chunk, or the
        // receiver going away.
        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut buffer = SseLineBuffer::default();

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

                buffer.extend(&bytes);

                while let Some(line) = buffer.next_line() {
                    match parse_sse_line(&line) {
                        SseEvent::Skip => {}
                        SseEvent::Ignored(error) => {
                            trace!(
                                provider = %provider_name,
                                line = %line,
                                error = %error,
                                "Ignoring unparseable SSE chunk"
                            );
                        }
                        SseEvent::Delta(content) => {
                            if tx.send(Ok(StreamChunk::delta(content))).await.is_err() {
                                return; // receiver dropped
                            }
                        }
                        SseEvent::Usage(usage) => {
                            let _ = tx.send(Ok(StreamChunk::finished(Some(usage)))).await;
                            return;
                        }
                        SseEvent::Done => {
                            let _ = tx.send(Ok(StreamChunk::finished(None))).await;
                            return;
                        }
                    }
                }
            }

            // Stream ended without [DONE]
            let _ = tx.send(Ok(StreamChunk::finished(None))).await;
        });

        Ok(rx)
    }
}

/// Accumulates raw response bytes and yields complete lines.
///
/// Network chunks can split a multi-byte UTF-8 character, so bytes are
/// only decoded once the terminating `\n` has arrived.
#[derive(Debug, Default)]
struct SseLineBuffer {
    pending: Vec<u8>,
}

impl SseLineBuffer {
    fn extend(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    fn next_line(&mut self) -> Option<String> {
        let line_end = self.pending.iter().position(|b| *b == b'\n')?;
        let raw: Vec<u8> = self.pending.drain(..=line_end).collect();
        let raw = &raw[..line_end];
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        Some(String::from_utf8_lossy(raw).into_owned())
    }
}

/// What one SSE line means for the consumer.
#[derive(Debug, PartialEq)]
enum SseEvent {
    /// Blank line, comment, or a chunk carrying nothing new
    Skip,
    /// A `data:` payload that failed to parse
    Ignored(String),
    Delta(String),
    Usage(Usage),
    Done,
}

fn parse_sse_line(line: &str) -> SseEvent {
    if line.is_empty() || line.starts_with(':') {
        return SseEvent::Skip;
    }

    let Some(data) = line.strip_prefix("data:") else {
        return SseEvent::Skip;
    };
    let data = data.trim();

    if data == "[DONE]" {
        return SseEvent::Done;
    }

    match serde_json::from_str::<StreamResponse>(data) {
        Ok(resp) => {
            if let Some(usage) = resp.usage {
                return SseEvent::Usage(usage.into());
            }
            match resp.choices.into_iter().next().and_then(|c| c.delta.content) {
                Some(content) if !content.is_empty() => SseEvent::Delta(content),
                _ => SseEvent::Skip,
            }
        }
        Err(e) => SseEvent::Ignored(e.to_string()),
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    model: String,
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

impl From<ApiUsage> for Usage {
    fn from(u: ApiUsage) -> Self {
        Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    message: String,
    #[serde(default)]
    code: Option<String>,
}

// --- Streaming SSE types ---

/// A single SSE `data: {...}` chunk from a streaming response.
#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatstack_core::{HeuristicTokenizer, Provider};
    use std::sync::Arc;

    #[test]
    fn openai_constructor() {
        let provider = OpenAiCompatProvider::openai("sk-test");
        assert_eq!(provider.name(), "openai");
        assert_eq!(provider.base_url(), "https://api.openai.com/v1");
    }

    #[test]
    fn trailing_slash_trimmed() {
        let provider = OpenAiCompatProvider::new("local", "http://localhost:8080/v1/", "k");
        assert_eq!(provider.base_url(), "http://localhost:8080/v1");
    }

    #[test]
    fn from_config_requires_key() {
        let config = ProviderConfig::default();
        let err = OpenAiCompatProvider::from_config(&config).err().unwrap();
        assert!(matches!(err, ProviderError::NotConfigured(_)));

        let config = ProviderConfig {
            api_key: Some("sk-test".into()),
            api_url: "http://localhost:9999/v1".into(),
            timeout_secs: 5,
        };
        let provider = OpenAiCompatProvider::from_config(&config).unwrap();
        assert_eq!(provider.name(), "openai-compatible");
    }

    #[test]
    fn message_conversion_uses_prefixed_content() {
        let tok = HeuristicTokenizer;
        let messages = vec![
            Arc::new(ChatTurn::system("You are helpful", &tok)),
            Arc::new(ChatTurn::context("Background", "the sky is blue", &tok)),
            Arc::new(ChatTurn::user("Hello", &tok)),
        ];
        let api = OpenAiCompatProvider::to_api_messages(&messages);
        assert_eq!(api.len(), 3);
        assert_eq!(api[0].role, "system");
        assert_eq!(api[1].role, "system");
        assert_eq!(api[1].content.as_deref(), Some("Background: the sky is blue"));
        assert_eq!(api[2].role, "user");
    }

    #[test]
    fn streaming_body_requests_usage() {
        let request = ProviderRequest {
            model: "gpt-4".into(),
            messages: Vec::new(),
            temperature: 0.5,
            max_tokens: Some(400),
            stream: true,
        };
        let body = OpenAiCompatProvider::request_body(&request, true);
        assert_eq!(body["stream"], true);
        assert_eq!(body["stream_options"]["include_usage"], true);
        assert_eq!(body["max_tokens"], 400);

        let body = OpenAiCompatProvider::request_body(&request, false);
        assert!(body.get("stream_options").is_none());
    }

    // --- Status mapping ---

    #[test]
    fn rate_limit_honours_retry_after() {
        let err = classify_status(429, Some(12), "");
        assert!(matches!(err, ProviderError::RateLimited { retry_after_secs: 12 }));
        let err = classify_status(429, None, "");
        assert!(matches!(err, ProviderError::RateLimited { retry_after_secs: 5 }));
    }

    #[test]
    fn context_length_exceeded_is_too_large() {
        let body = r#"{"error":{"message":"maximum context length is 4097 tokens","type":"invalid_request_error","code":"context_length_exceeded"}}"#;
        match classify_status(400, None, body) {
            ProviderError::RequestTooLarge(msg) => assert!(msg.contains("4097")),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(matches!(
            classify_status(413, None, "payload too large"),
            ProviderError::RequestTooLarge(_)
        ));
    }

    #[test]
    fn other_statuses() {
        let body = r#"{"error":{"message":"bad param","code":null}}"#;
        assert!(matches!(classify_status(400, None, body), ProviderError::InvalidRequest(m) if m == "bad param"));
        assert!(matches!(classify_status(401, None, ""), ProviderError::AuthenticationFailed(_)));
        assert!(matches!(classify_status(403, None, ""), ProviderError::AuthenticationFailed(_)));
        assert!(matches!(classify_status(404, None, ""), ProviderError::ModelNotFound(_)));
        assert!(matches!(
            classify_status(503, None, "overloaded"),
            ProviderError::ApiError { status_code: 503, .. }
        ));
    }

    // --- SSE parsing ---

    #[test]
    fn parse_stream_content_delta() {
        let line = r#"data: {"choices":[{"delta":{"content":"Hello"},"finish_reason":null}]}"#;
        assert_eq!(parse_sse_line(line), SseEvent::Delta("Hello".into()));
    }

    #[test]
    fn parse_stream_finish_chunk_carries_nothing() {
        let line = r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}]}"#;
        assert_eq!(parse_sse_line(line), SseEvent::Skip);
    }

    #[test]
    fn parse_stream_usage() {
        let line = r#"data: {"choices":[],"usage":{"prompt_tokens":10,"completion_tokens":5,"total_tokens":15}}"#;
        match parse_sse_line(line) {
            SseEvent::Usage(usage) => {
                assert_eq!(usage.prompt_tokens, 10);
                assert_eq!(usage.completion_tokens, 5);
                assert_eq!(usage.total_tokens, 15);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn parse_done_and_noise() {
        assert_eq!(parse_sse_line("data: [DONE]"), SseEvent::Done);
        assert_eq!(parse_sse_line(""), SseEvent::Skip);
        assert_eq!(parse_sse_line(": keep-alive"), SseEvent::Skip);
        assert_eq!(parse_sse_line("event: ping"), SseEvent::Skip);
        assert!(matches!(parse_sse_line("data: {oops"), SseEvent::Ignored(_)));
    }

    #[test]
    fn parse_empty_content_is_skipped() {
        let line = r#"data: {"choices":[{"delta":{"role":"assistant","content":""}}]}"#;
        assert_eq!(parse_sse_line(line), SseEvent::Skip);
    }

    #[test]
    fn line_buffer_joins_character_split_across_chunks() {
        let mut buffer = SseLineBuffer::default();
        buffer.extend(b"data: {\"choices\":[{\"delta\":{\"content\":\"caf\xC3");
        assert_eq!(buffer.next_line(), None);

        buffer.extend(b"\xA9\"}}]}\r\n\ndata: [DONE]\n");
        let line = buffer.next_line().unwrap();
        assert_eq!(parse_sse_line(&line), SseEvent::Delta("café".into()));
        assert_eq!(buffer.next_line().as_deref(), Some(""));
        assert_eq!(buffer.next_line().as_deref(), Some("data: [DONE]"));
        assert_eq!(buffer.next_line(), None);
    }

    #[test]
    fn line_buffer_keeps_partial_line_pending() {
        let mut buffer = SseLineBuffer::default();
        buffer.extend(b"data: [DO");
        assert_eq!(buffer.next_line(), None);
        buffer.extend(b"NE]\n");
        assert_eq!(buffer.next_line().as_deref(), Some("data: [DONE]"));
    }
}
