use async_trait::async_trait;
use axum::http::HeaderMap;
use serde_json::Value;

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::estimator::Confidence;
use crate::pricing::Provider;

pub mod anthropic;
pub mod openai;

pub use anthropic::AnthropicAdapter;
pub use openai::OpenAiAdapter;

/// Token counts observed from an upstream response, buffered or streamed.
/// Either side may be absent; the pipeline falls back to the estimate for
/// missing input and to zero for missing output, flagging the record.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ObservedUsage {
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
}

impl ObservedUsage {
    pub fn is_empty(&self) -> bool {
        self.input_tokens.is_none() && self.output_tokens.is_none()
    }
}

/// A provider request parsed just enough to govern it. The body itself is
/// forwarded unchanged.
#[derive(Clone, Debug)]
pub struct ParsedRequest {
    pub model: String,
    pub max_tokens: Option<u32>,
    pub stream: bool,
    pub body: Value,
}

/// Accumulates usage from a streamed response. Fed every chunk after it
/// has been handed to the client; never buffers the stream itself.
pub trait StreamUsageTracker: Send {
    fn ingest(&mut self, chunk: &[u8]);
    fn observed(&self) -> ObservedUsage;
}

/// Provider-specific I/O: request validation, authentication, the upstream
/// call, and usage extraction for both response shapes.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn provider(&self) -> Provider;

    /// Path the proxy forwards to, relative to the provider base URL.
    fn upstream_path(&self) -> &'static str;

    /// Configured base URL for this provider's upstream.
    fn base_url<'c>(&self, config: &'c GatewayConfig) -> &'c str;

    fn parse_request(&self, body: &[u8]) -> Result<ParsedRequest, GatewayError>;

    fn count_input_tokens(&self, request: &ParsedRequest) -> (u32, Confidence);

    /// Credentials from the incoming request's provider-native auth
    /// header, falling back to the server-configured default.
    fn resolve_credentials(&self, headers: &HeaderMap, config: &GatewayConfig) -> Option<String>;

    async fn forward(
        &self,
        client: &reqwest::Client,
        base_url: &str,
        credentials: &str,
        body: &Value,
    ) -> Result<reqwest::Response, GatewayError>;

    /// Usage from a buffered JSON response body.
    fn extract_usage(&self, response: &Value) -> Option<ObservedUsage>;

    fn stream_tracker(&self, model: &str) -> Box<dyn StreamUsageTracker>;
}

pub(crate) fn header_str<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

pub(crate) fn map_send_error(err: reqwest::Error) -> GatewayError {
    GatewayError::Upstream(format!("upstream request failed: {err}"))
}

pub(crate) fn parse_u64(value: Option<&Value>) -> Option<u64> {
    value.and_then(Value::as_u64)
}
