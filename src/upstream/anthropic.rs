use async_trait::async_trait;
use axum::http::HeaderMap;
use serde_json::Value;

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::estimator::Confidence;
use crate::pricing::Provider;
use crate::sse::SseScanner;
use crate::tokenizer;

use super::{
    header_str, map_send_error, parse_u64, ObservedUsage, ParsedRequest, ProviderAdapter,
    StreamUsageTracker,
};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic-shaped messages.
#[derive(Clone, Copy, Debug, Default)]
pub struct AnthropicAdapter;

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
    fn provider(&self) -> Provider {
        Provider::Anthropic
    }

    fn upstream_path(&self) -> &'static str {
        "/v1/messages"
    }

    fn base_url<'c>(&self, config: &'c GatewayConfig) -> &'c str {
        &config.anthropic_base_url
    }

    fn parse_request(&self, body: &[u8]) -> Result<ParsedRequest, GatewayError> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|err| GatewayError::InvalidRequest(format!("malformed JSON body: {err}")))?;
        let Some(obj) = value.as_object() else {
            return Err(GatewayError::InvalidRequest(
                "request body must be a JSON object".to_string(),
            ));
        };
        let model = obj
            .get("model")
            .and_then(Value::as_str)
            .filter(|model| !model.is_empty())
            .ok_or_else(|| GatewayError::InvalidRequest("missing field: model".to_string()))?
            .to_string();
        if !obj.get("messages").is_some_and(Value::is_array) {
            return Err(GatewayError::InvalidRequest(
                "missing field: messages".to_string(),
            ));
        }
        // The messages API makes max_tokens mandatory.
        let max_tokens = obj
            .get("max_tokens")
            .and_then(Value::as_u64)
            .map(|value| value.min(u64::from(u32::MAX)) as u32)
            .ok_or_else(|| GatewayError::InvalidRequest("missing field: max_tokens".to_string()))?;
        let stream = obj.get("stream").and_then(Value::as_bool).unwrap_or(false);
        Ok(ParsedRequest {
            model,
            max_tokens: Some(max_tokens),
            stream,
            body: value,
        })
    }

    fn count_input_tokens(&self, request: &ParsedRequest) -> (u32, Confidence) {
        tokenizer::count_anthropic_messages_input(&request.body)
    }

    fn resolve_credentials(&self, headers: &HeaderMap, config: &GatewayConfig) -> Option<String> {
        header_str(headers, "x-api-key")
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map(str::to_string)
            .or_else(|| config.anthropic_api_key.clone())
    }

    async fn forward(
        &self,
        client: &reqwest::Client,
        base_url: &str,
        credentials: &str,
        body: &Value,
    ) -> Result<reqwest::Response, GatewayError> {
        client
            .post(format!(
                "{}{}",
                base_url.trim_end_matches('/'),
                self.upstream_path()
            ))
            .header("x-api-key", credentials)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(body)
            .send()
            .await
            .map_err(map_send_error)
    }

    fn extract_usage(&self, response: &Value) -> Option<ObservedUsage> {
        let usage = response.get("usage")?.as_object()?;
        let input_tokens = parse_u64(usage.get("input_tokens"));
        let output_tokens = parse_u64(usage.get("output_tokens"));
        if input_tokens.is_none() && output_tokens.is_none() {
            return None;
        }
        Some(ObservedUsage {
            input_tokens,
            output_tokens,
        })
    }

    fn stream_tracker(&self, _model: &str) -> Box<dyn StreamUsageTracker> {
        Box::new(AnthropicStreamTracker {
            scanner: SseScanner::default(),
            input_tokens: None,
            output_tokens: None,
        })
    }
}

/// `message_start` carries the input count; every `message_delta` carries a
/// running output count, so the last observed value wins.
struct AnthropicStreamTracker {
    scanner: SseScanner,
    input_tokens: Option<u64>,
    output_tokens: Option<u64>,
}

impl StreamUsageTracker for AnthropicStreamTracker {
    fn ingest(&mut self, chunk: &[u8]) {
        let Self {
            scanner,
            input_tokens,
            output_tokens,
        } = self;
        scanner.push(chunk, |data| {
            let Ok(event) = serde_json::from_slice::<Value>(data) else {
                return;
            };
            match event.get("type").and_then(Value::as_str) {
                Some("message_start") => {
                    let usage = event
                        .get("message")
                        .and_then(|message| message.get("usage"));
                    if let Some(usage) = usage {
                        if let Some(input) = parse_u64(usage.get("input_tokens")) {
                            *input_tokens = Some(input);
                        }
                        if let Some(output) = parse_u64(usage.get("output_tokens")) {
                            *output_tokens = Some(output);
                        }
                    }
                }
                Some("message_delta") => {
                    if let Some(usage) = event.get("usage") {
                        if let Some(output) = parse_u64(usage.get("output_tokens")) {
                            *output_tokens = Some(output);
                        }
                        if let Some(input) = parse_u64(usage.get("input_tokens")) {
                            *input_tokens = Some(input);
                        }
                    }
                }
                _ => {}
            }
        });
    }

    fn observed(&self) -> ObservedUsage {
        ObservedUsage {
            input_tokens: self.input_tokens,
            output_tokens: self.output_tokens,
        }
    }
}
