use async_trait::async_trait;
use axum::http::HeaderMap;
use serde_json::Value;
use tiktoken_rs::CoreBPE;

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

/// OpenAI-shaped chat completions.
#[derive(Clone, Copy, Debug, Default)]
pub struct OpenAiAdapter;

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    fn provider(&self) -> Provider {
        Provider::OpenAi
    }

    fn upstream_path(&self) -> &'static str {
        "/v1/chat/completions"
    }

    fn base_url<'c>(&self, config: &'c GatewayConfig) -> &'c str {
        &config.openai_base_url
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
        let max_tokens = obj
            .get("max_completion_tokens")
            .or_else(|| obj.get("max_tokens"))
            .and_then(Value::as_u64)
            .map(|value| value.min(u64::from(u32::MAX)) as u32);
        let stream = obj.get("stream").and_then(Value::as_bool).unwrap_or(false);
        Ok(ParsedRequest {
            model,
            max_tokens,
            stream,
            body: value,
        })
    }

    fn count_input_tokens(&self, request: &ParsedRequest) -> (u32, Confidence) {
        tokenizer::count_openai_chat_input(&request.model, &request.body)
    }

    fn resolve_credentials(&self, headers: &HeaderMap, config: &GatewayConfig) -> Option<String> {
        header_str(headers, "authorization")
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(str::to_string)
            .or_else(|| config.openai_api_key.clone())
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
            .header("authorization", format!("Bearer {credentials}"))
            .json(body)
            .send()
            .await
            .map_err(map_send_error)
    }

    fn extract_usage(&self, response: &Value) -> Option<ObservedUsage> {
        extract_openai_usage(response.get("usage")?)
    }

    fn stream_tracker(&self, model: &str) -> Box<dyn StreamUsageTracker> {
        Box::new(OpenAiStreamTracker {
            scanner: SseScanner::default(),
            bpe: tokenizer::bpe_for_model(model),
            delta_tokens: 0,
            reported: None,
        })
    }
}

fn extract_openai_usage(usage: &Value) -> Option<ObservedUsage> {
    let obj = usage.as_object()?;
    let input_tokens = parse_u64(obj.get("prompt_tokens")).or_else(|| parse_u64(obj.get("input_tokens")));
    let output_tokens =
        parse_u64(obj.get("completion_tokens")).or_else(|| parse_u64(obj.get("output_tokens")));
    if input_tokens.is_none() && output_tokens.is_none() {
        return None;
    }
    Some(ObservedUsage {
        input_tokens,
        output_tokens,
    })
}

/// Counts streamed output by encoding each delta's content with the same
/// BPE used for the request. A `usage` object on any event (the final
/// chunk, when the client asked for it) takes precedence over the sum.
struct OpenAiStreamTracker {
    scanner: SseScanner,
    bpe: &'static CoreBPE,
    delta_tokens: u64,
    reported: Option<ObservedUsage>,
}

impl StreamUsageTracker for OpenAiStreamTracker {
    fn ingest(&mut self, chunk: &[u8]) {
        let Self {
            scanner,
            bpe,
            delta_tokens,
            reported,
        } = self;
        scanner.push(chunk, |data| {
            if data == b"[DONE]" {
                return;
            }
            let Ok(event) = serde_json::from_slice::<Value>(data) else {
                return;
            };
            if let Some(usage) = event.get("usage") {
                if let Some(observed) = extract_openai_usage(usage) {
                    *reported = Some(observed);
                }
            }
            if let Some(choices) = event.get("choices").and_then(Value::as_array) {
                for choice in choices {
                    let Some(content) = choice
                        .get("delta")
                        .and_then(|delta| delta.get("content"))
                        .and_then(Value::as_str)
                    else {
                        continue;
                    };
                    let count = bpe.encode_with_special_tokens(content).len() as u64;
                    *delta_tokens = delta_tokens.saturating_add(count);
                }
            }
        });
    }

    fn observed(&self) -> ObservedUsage {
        match self.reported {
            Some(reported) => ObservedUsage {
                input_tokens: reported.input_tokens,
                output_tokens: reported.output_tokens.or(Some(self.delta_tokens)),
            },
            None => ObservedUsage {
                input_tokens: None,
                output_tokens: Some(self.delta_tokens),
            },
        }
    }
}
