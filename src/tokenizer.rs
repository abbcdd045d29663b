use serde_json::Value;
use tiktoken_rs::CoreBPE;

use crate::estimator::Confidence;

// Fixed overheads applied on top of encoded text lengths. Chat counts
// follow the reference accounting for OpenAI-shaped requests; the
// Anthropic numbers are declared approximations.
const OPENAI_TOKENS_PER_MESSAGE: i64 = 3;
const OPENAI_TOKENS_PER_MESSAGE_LEGACY: i64 = 4;
const OPENAI_TOKENS_PER_NAME: i64 = 1;
const OPENAI_REPLY_PRIMING_TOKENS: i64 = 3;
const OPENAI_TOKENS_PER_TOOL: i64 = 6;
const OPENAI_TOKENS_PER_TOOL_COLLECTION: i64 = 12;
const ANTHROPIC_TOKENS_PER_MESSAGE: i64 = 4;
const ANTHROPIC_TOKENS_PER_SYSTEM: i64 = 4;
const ANTHROPIC_TOKENS_PER_TOOL: i64 = 10;

/// Output token estimate plus how much to trust it.
#[derive(Clone, Copy, Debug)]
pub struct OutputEstimate {
    pub tokens: u32,
    pub confidence: Confidence,
}

/// Encoder selection by model family: the 200k vocabulary for gpt-4o and
/// the o-series, the 100k vocabulary for everything else (including the
/// Anthropic approximation). Singletons are built lazily on first use and
/// shared for the life of the process.
pub fn bpe_for_model(model: &str) -> &'static CoreBPE {
    if model.starts_with("gpt-4o")
        || model.starts_with("o1")
        || model.starts_with("o3")
        || model.starts_with("o4")
    {
        tiktoken_rs::o200k_base_singleton()
    } else {
        tiktoken_rs::cl100k_base_singleton()
    }
}

fn encoded_len(bpe: &CoreBPE, text: &str) -> i64 {
    clamp_usize_to_i64(bpe.encode_with_special_tokens(text).len())
}

/// Counts input tokens for an OpenAI-shaped chat completion request.
pub fn count_openai_chat_input(model: &str, request: &Value) -> (u32, Confidence) {
    let bpe = bpe_for_model(model);
    let tokens_per_message = if model == "gpt-3.5-turbo-0301" {
        OPENAI_TOKENS_PER_MESSAGE_LEGACY
    } else {
        OPENAI_TOKENS_PER_MESSAGE
    };

    let mut num_tokens: i64 = 0;
    if let Some(messages) = request.get("messages").and_then(Value::as_array) {
        for message in messages {
            let Some(obj) = message.as_object() else {
                continue;
            };
            num_tokens = num_tokens.saturating_add(tokens_per_message);
            if let Some(role) = obj.get("role").and_then(Value::as_str) {
                num_tokens = num_tokens.saturating_add(encoded_len(bpe, role));
            }
            if let Some(content) = obj.get("content") {
                num_tokens = num_tokens.saturating_add(openai_content_tokens(bpe, content));
            }
            if let Some(name) = obj.get("name").and_then(Value::as_str) {
                num_tokens = num_tokens.saturating_add(encoded_len(bpe, name));
                num_tokens = num_tokens.saturating_add(OPENAI_TOKENS_PER_NAME);
            }
        }
    }
    num_tokens = num_tokens.saturating_add(OPENAI_REPLY_PRIMING_TOKENS);

    if let Some(tools) = request.get("tools").and_then(Value::as_array) {
        num_tokens = num_tokens.saturating_add(openai_tool_tokens(bpe, tools, true));
    }
    if let Some(functions) = request.get("functions").and_then(Value::as_array) {
        num_tokens = num_tokens.saturating_add(openai_tool_tokens(bpe, functions, false));
    }

    (clamp_i64_to_u32(num_tokens), Confidence::High)
}

fn openai_content_tokens(bpe: &CoreBPE, content: &Value) -> i64 {
    match content {
        Value::String(text) => encoded_len(bpe, text),
        Value::Array(parts) => parts
            .iter()
            .map(|part| match part {
                Value::String(text) => encoded_len(bpe, text),
                Value::Object(obj) => {
                    let part_type = obj.get("type").and_then(Value::as_str).unwrap_or_default();
                    if part_type != "text" && part_type != "input_text" {
                        return 0;
                    }
                    obj.get("text")
                        .and_then(Value::as_str)
                        .map(|text| encoded_len(bpe, text))
                        .unwrap_or(0)
                }
                _ => 0,
            })
            .fold(0i64, i64::saturating_add),
        _ => 0,
    }
}

fn openai_tool_tokens(bpe: &CoreBPE, definitions: &[Value], wrapped: bool) -> i64 {
    let mut tokens: i64 = OPENAI_TOKENS_PER_TOOL_COLLECTION;
    for definition in definitions {
        let function = if wrapped {
            definition.get("function").unwrap_or(definition)
        } else {
            definition
        };
        let Some(obj) = function.as_object() else {
            continue;
        };
        tokens = tokens.saturating_add(OPENAI_TOKENS_PER_TOOL);
        if let Some(name) = obj.get("name").and_then(Value::as_str) {
            tokens = tokens.saturating_add(encoded_len(bpe, name));
        }
        if let Some(description) = obj.get("description").and_then(Value::as_str) {
            tokens = tokens.saturating_add(encoded_len(bpe, description));
        }
        if let Some(parameters) = obj.get("parameters") {
            tokens = tokens.saturating_add(json_tokens(bpe, parameters));
        }
    }
    tokens
}

/// Counts input tokens for an Anthropic-shaped messages request using the
/// 100k encoder. The vendor's tokenizer is not public, so this is an
/// approximation; callers must not label the result better than `medium`.
pub fn count_anthropic_messages_input(request: &Value) -> (u32, Confidence) {
    let bpe = tiktoken_rs::cl100k_base_singleton();

    let mut num_tokens: i64 = 0;
    if let Some(system) = request.get("system") {
        let text = match system {
            Value::String(text) => encoded_len(bpe, text),
            other => anthropic_content_tokens(bpe, other),
        };
        num_tokens = num_tokens
            .saturating_add(text)
            .saturating_add(ANTHROPIC_TOKENS_PER_SYSTEM);
    }
    if let Some(messages) = request.get("messages").and_then(Value::as_array) {
        for message in messages {
            num_tokens = num_tokens.saturating_add(ANTHROPIC_TOKENS_PER_MESSAGE);
            if let Some(content) = message.get("content") {
                num_tokens = num_tokens.saturating_add(anthropic_content_tokens(bpe, content));
            }
        }
    }
    if let Some(tools) = request.get("tools").and_then(Value::as_array) {
        for tool in tools {
            let Some(obj) = tool.as_object() else {
                continue;
            };
            num_tokens = num_tokens.saturating_add(ANTHROPIC_TOKENS_PER_TOOL);
            if let Some(name) = obj.get("name").and_then(Value::as_str) {
                num_tokens = num_tokens.saturating_add(encoded_len(bpe, name));
            }
            if let Some(description) = obj.get("description").and_then(Value::as_str) {
                num_tokens = num_tokens.saturating_add(encoded_len(bpe, description));
            }
            if let Some(schema) = obj.get("input_schema") {
                num_tokens = num_tokens.saturating_add(json_tokens(bpe, schema));
            }
        }
    }

    (clamp_i64_to_u32(num_tokens), Confidence::Medium)
}

fn anthropic_content_tokens(bpe: &CoreBPE, content: &Value) -> i64 {
    match content {
        Value::String(text) => encoded_len(bpe, text),
        Value::Array(blocks) => blocks
            .iter()
            .map(|block| {
                let Some(obj) = block.as_object() else {
                    return 0;
                };
                match obj.get("type").and_then(Value::as_str) {
                    Some("text") => obj
                        .get("text")
                        .and_then(Value::as_str)
                        .map(|text| encoded_len(bpe, text))
                        .unwrap_or(0),
                    Some("tool_use") => {
                        let name = obj
                            .get("name")
                            .and_then(Value::as_str)
                            .map(|name| encoded_len(bpe, name))
                            .unwrap_or(0);
                        let input = obj
                            .get("input")
                            .map(|input| json_tokens(bpe, input))
                            .unwrap_or(0);
                        name.saturating_add(input)
                    }
                    Some("tool_result") => obj
                        .get("content")
                        .map(|inner| anthropic_content_tokens(bpe, inner))
                        .unwrap_or(0),
                    _ => 0,
                }
            })
            .fold(0i64, i64::saturating_add),
        _ => 0,
    }
}

fn json_tokens(bpe: &CoreBPE, value: &Value) -> i64 {
    let json = serde_json::to_string(value).unwrap_or_default();
    encoded_len(bpe, &json)
}

/// Output estimation ladder: 75% of a caller-supplied maximum (`high`),
/// 50% of the model's documented default maximum (`medium`), or the
/// configured fallback (`low`). Pass `default_max_output = 0` when the
/// model's default is unknown.
pub fn estimate_output_tokens(
    max_tokens: Option<u32>,
    default_max_output: u32,
    configured_default: u32,
) -> OutputEstimate {
    if let Some(max_tokens) = max_tokens {
        return OutputEstimate {
            tokens: (u64::from(max_tokens) * 3 / 4) as u32,
            confidence: Confidence::High,
        };
    }
    if default_max_output > 0 {
        return OutputEstimate {
            tokens: default_max_output / 2,
            confidence: Confidence::Medium,
        };
    }
    OutputEstimate {
        tokens: configured_default,
        confidence: Confidence::Low,
    }
}

fn clamp_usize_to_i64(value: usize) -> i64 {
    if value > usize::try_from(i64::MAX).unwrap_or(usize::MAX) {
        i64::MAX
    } else {
        value as i64
    }
}

fn clamp_i64_to_u32(value: i64) -> u32 {
    if value <= 0 {
        0
    } else if value > i64::from(u32::MAX) {
        u32::MAX
    } else {
        value as u32
    }
}
