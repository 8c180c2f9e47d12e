//! Upstream chat-completion client
//!
//! Provides a `ChatUpstream` trait with one implementation:
//! - **OpenAiCompatibleClient** — `POST {base_url}/chat/completions` against any
//!   OpenAI-compatible endpoint (RainyModel, OpenRouter, OllamaFreeAPI)
//!
//! Nothing here retries. Every failure is surfaced once to the caller.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use reqwest::header::HeaderMap;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::models::Role;
use crate::providers::{credential_from_env, Provider};

pub const POLICY_HEADER: &str = "X-RainyModel-Policy";
pub const ROUTE_HEADER: &str = "x-rainymodel-route";
pub const UPSTREAM_HEADER: &str = "x-rainymodel-upstream";
pub const MODEL_HEADER: &str = "x-rainymodel-model";
pub const LATENCY_HEADER: &str = "x-rainymodel-latency-ms";
pub const FALLBACK_HEADER: &str = "x-rainymodel-fallback-reason";

// ============================================================================
// Request / response types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f64,
    pub max_tokens: u32,
    pub stream: bool,
}

/// A request plus the routing policy sent alongside it as a header.
#[derive(Debug, Clone)]
pub struct UpstreamCall {
    pub request: ChatCompletionRequest,
    pub policy: String,
}

/// Routing metadata the router attaches as response headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutingHeaders {
    pub route: Option<String>,
    pub upstream: Option<String>,
    pub model: Option<String>,
    pub latency_ms: Option<u64>,
    pub fallback_reason: Option<String>,
}

impl RoutingHeaders {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let text = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        Self {
            route: text(ROUTE_HEADER),
            upstream: text(UPSTREAM_HEADER),
            model: text(MODEL_HEADER),
            latency_ms: text(LATENCY_HEADER).and_then(|v| v.trim().parse().ok()),
            fallback_reason: text(FALLBACK_HEADER),
        }
    }
}

/// A buffered completion.
#[derive(Debug, Clone)]
pub struct Completion {
    pub body: Value,
    pub routing: RoutingHeaders,
}

impl Completion {
    /// Assistant text of the first choice, empty when absent.
    pub fn content(&self) -> String {
        self.body["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string()
    }

    pub fn usage(&self) -> Value {
        match self.body.get("usage") {
            Some(u) if !u.is_null() => u.clone(),
            _ => Value::Object(Default::default()),
        }
    }
}

/// An open event stream. `events` yields raw body chunks.
pub struct CompletionStream {
    pub routing: RoutingHeaders,
    pub events: BoxStream<'static, Result<Bytes, UpstreamError>>,
}

#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("Request timed out")]
    Timeout,

    #[error("{0}")]
    Transport(String),

    #[error("Upstream returned {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Invalid upstream response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for UpstreamError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            UpstreamError::Timeout
        } else {
            UpstreamError::Transport(e.to_string())
        }
    }
}

// ============================================================================
// ChatUpstream trait
// ============================================================================

/// Abstraction over a provider's chat-completion endpoint.
#[async_trait]
pub trait ChatUpstream: Send + Sync {
    fn provider(&self) -> Provider;

    /// Non-streaming completion.
    async fn complete(&self, call: &UpstreamCall) -> Result<Completion, UpstreamError>;

    /// Open a streaming completion. Resolves once response headers arrive.
    async fn open_stream(&self, call: &UpstreamCall) -> Result<CompletionStream, UpstreamError>;
}

// ============================================================================
// OpenAiCompatibleClient
// ============================================================================

#[derive(Debug, Clone)]
pub struct OpenAiCompatibleClient {
    client: Client,
    provider: Provider,
    base_url: String,
    api_key_env: String,
    timeout: Duration,
}

impl OpenAiCompatibleClient {
    pub fn new(
        provider: Provider,
        base_url: String,
        api_key_env: String,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().connect_timeout(timeout).build()?;

        Ok(Self {
            client,
            provider,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key_env,
            timeout,
        })
    }

    fn request(&self, call: &UpstreamCall) -> reqwest::RequestBuilder {
        let api_key = credential_from_env(&self.api_key_env).unwrap_or_default();
        self.client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .header(POLICY_HEADER, &call.policy)
            .json(&call.request)
    }
}

#[async_trait]
impl ChatUpstream for OpenAiCompatibleClient {
    fn provider(&self) -> Provider {
        self.provider
    }

    async fn complete(&self, call: &UpstreamCall) -> Result<Completion, UpstreamError> {
        let response = self.request(call).timeout(self.timeout).send().await?;
        let status = response.status();
        let routing = RoutingHeaders::from_headers(response.headers());

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(
                provider = self.provider.as_str(),
                status = status.as_u16(),
                "Upstream rejected chat completion"
            );
            return Err(UpstreamError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let text = response.text().await?;
        let body: Value = serde_json::from_str(&text)
            .map_err(|e| UpstreamError::InvalidResponse(e.to_string()))?;

        Ok(Completion { body, routing })
    }

    async fn open_stream(&self, call: &UpstreamCall) -> Result<CompletionStream, UpstreamError> {
        let response = tokio::time::timeout(self.timeout, self.request(call).send())
            .await
            .map_err(|_| UpstreamError::Timeout)??;
        let status = response.status();
        let routing = RoutingHeaders::from_headers(response.headers());

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let events = response.bytes_stream().map_err(UpstreamError::from).boxed();
        Ok(CompletionStream { routing, events })
    }
}

// ============================================================================
// Event-stream line handling
// ============================================================================

/// One `data:` line from an upstream event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamLine {
    Data(String),
    Done,
}

/// Reassembles newline-terminated lines across arbitrary chunk boundaries.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw[..raw.len() - 1]);
            lines.push(line.trim_end_matches('\r').to_string());
        }
        lines
    }

    /// Whatever remains once the stream ends without a trailing newline.
    pub fn finish(self) -> Option<String> {
        let rest = String::from_utf8_lossy(&self.pending).trim().to_string();
        (!rest.is_empty()).then_some(rest)
    }
}

/// Classify a line. Non-`data:` lines (comments, blank separators) yield `None`.
pub fn parse_stream_line(line: &str) -> Option<StreamLine> {
    let payload = line.strip_prefix("data: ")?;
    if payload.trim() == "[DONE]" {
        Some(StreamLine::Done)
    } else {
        Some(StreamLine::Data(payload.to_string()))
    }
}

/// Text delta carried by a streamed chunk, if any.
pub fn delta_content(chunk: &Value) -> Option<&str> {
    chunk["choices"][0]["delta"]["content"]
        .as_str()
        .filter(|s| !s.is_empty())
}

// ============================================================================
// TESTS
// ============================================================================
