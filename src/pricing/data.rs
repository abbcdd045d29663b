//! Declarative pricing data: the model table, the alias table, and the
//! prefix rules. Prices are USD per million tokens as published by the
//! providers; update by editing the rows, not the lookup code.

use super::{ModelPricing, Provider};

const fn row(
    provider: Provider,
    model: &'static str,
    input_per_m: f64,
    output_per_m: f64,
    context_window: u32,
    default_max_output: u32,
    deprecated: bool,
) -> ModelPricing {
    ModelPricing {
        provider,
        model,
        input_per_m,
        output_per_m,
        context_window,
        default_max_output,
        deprecated,
    }
}

pub(super) static MODEL_TABLE: &[ModelPricing] = &[
    // OpenAI, current generations first.
    row(Provider::OpenAi, "gpt-4o", 2.50, 10.00, 128_000, 16_384, false),
    row(Provider::OpenAi, "gpt-4o-2024-11-20", 2.50, 10.00, 128_000, 16_384, false),
    row(Provider::OpenAi, "gpt-4o-2024-08-06", 2.50, 10.00, 128_000, 16_384, false),
    row(Provider::OpenAi, "gpt-4o-2024-05-13", 5.00, 15.00, 128_000, 4_096, false),
    row(Provider::OpenAi, "chatgpt-4o-latest", 5.00, 15.00, 128_000, 16_384, false),
    row(Provider::OpenAi, "gpt-4o-mini", 0.15, 0.60, 128_000, 16_384, false),
    row(Provider::OpenAi, "gpt-4o-mini-2024-07-18", 0.15, 0.60, 128_000, 16_384, false),
    row(Provider::OpenAi, "gpt-4.1", 2.00, 8.00, 1_047_576, 32_768, false),
    row(Provider::OpenAi, "gpt-4.1-2025-04-14", 2.00, 8.00, 1_047_576, 32_768, false),
    row(Provider::OpenAi, "gpt-4.1-mini", 0.40, 1.60, 1_047_576, 32_768, false),
    row(Provider::OpenAi, "gpt-4.1-mini-2025-04-14", 0.40, 1.60, 1_047_576, 32_768, false),
    row(Provider::OpenAi, "gpt-4.1-nano", 0.10, 0.40, 1_047_576, 32_768, false),
    row(Provider::OpenAi, "gpt-4.1-nano-2025-04-14", 0.10, 0.40, 1_047_576, 32_768, false),
    row(Provider::OpenAi, "o1", 15.00, 60.00, 200_000, 100_000, false),
    row(Provider::OpenAi, "o1-2024-12-17", 15.00, 60.00, 200_000, 100_000, false),
    row(Provider::OpenAi, "o1-mini", 1.10, 4.40, 128_000, 65_536, false),
    row(Provider::OpenAi, "o1-mini-2024-09-12", 1.10, 4.40, 128_000, 65_536, false),
    row(Provider::OpenAi, "o1-preview", 15.00, 60.00, 128_000, 32_768, true),
    row(Provider::OpenAi, "o3", 2.00, 8.00, 200_000, 100_000, false),
    row(Provider::OpenAi, "o3-2025-04-16", 2.00, 8.00, 200_000, 100_000, false),
    row(Provider::OpenAi, "o3-mini", 1.10, 4.40, 200_000, 100_000, false),
    row(Provider::OpenAi, "o3-mini-2025-01-31", 1.10, 4.40, 200_000, 100_000, false),
    row(Provider::OpenAi, "o4-mini", 1.10, 4.40, 200_000, 100_000, false),
    row(Provider::OpenAi, "o4-mini-2025-04-16", 1.10, 4.40, 200_000, 100_000, false),
    row(Provider::OpenAi, "gpt-4-turbo", 10.00, 30.00, 128_000, 4_096, false),
    row(Provider::OpenAi, "gpt-4-turbo-2024-04-09", 10.00, 30.00, 128_000, 4_096, false),
    row(Provider::OpenAi, "gpt-4-0125-preview", 10.00, 30.00, 128_000, 4_096, true),
    row(Provider::OpenAi, "gpt-4-1106-preview", 10.00, 30.00, 128_000, 4_096, true),
    row(Provider::OpenAi, "gpt-4", 30.00, 60.00, 8_192, 8_192, false),
    row(Provider::OpenAi, "gpt-4-0613", 30.00, 60.00, 8_192, 8_192, true),
    row(Provider::OpenAi, "gpt-4-32k", 60.00, 120.00, 32_768, 8_192, true),
    row(Provider::OpenAi, "gpt-3.5-turbo", 0.50, 1.50, 16_385, 4_096, false),
    row(Provider::OpenAi, "gpt-3.5-turbo-0125", 0.50, 1.50, 16_385, 4_096, false),
    row(Provider::OpenAi, "gpt-3.5-turbo-1106", 1.00, 2.00, 16_385, 4_096, true),
    row(Provider::OpenAi, "gpt-3.5-turbo-0301", 1.50, 2.00, 4_096, 4_096, true),
    row(Provider::OpenAi, "gpt-3.5-turbo-16k", 3.00, 4.00, 16_385, 4_096, true),
    // Anthropic.
    row(Provider::Anthropic, "claude-3-5-sonnet-latest", 3.00, 15.00, 200_000, 8_192, false),
    row(Provider::Anthropic, "claude-3-5-sonnet-20241022", 3.00, 15.00, 200_000, 8_192, false),
    row(Provider::Anthropic, "claude-3-5-sonnet-20240620", 3.00, 15.00, 200_000, 8_192, false),
    row(Provider::Anthropic, "claude-3-5-haiku-latest", 0.80, 4.00, 200_000, 8_192, false),
    row(Provider::Anthropic, "claude-3-5-haiku-20241022", 0.80, 4.00, 200_000, 8_192, false),
    row(Provider::Anthropic, "claude-3-7-sonnet-latest", 3.00, 15.00, 200_000, 64_000, false),
    row(Provider::Anthropic, "claude-3-7-sonnet-20250219", 3.00, 15.00, 200_000, 64_000, false),
    row(Provider::Anthropic, "claude-sonnet-4-20250514", 3.00, 15.00, 200_000, 64_000, false),
    row(Provider::Anthropic, "claude-opus-4-20250514", 15.00, 75.00, 200_000, 32_000, false),
    row(Provider::Anthropic, "claude-3-opus-latest", 15.00, 75.00, 200_000, 4_096, false),
    row(Provider::Anthropic, "claude-3-opus-20240229", 15.00, 75.00, 200_000, 4_096, false),
    row(Provider::Anthropic, "claude-3-sonnet-20240229", 3.00, 15.00, 200_000, 4_096, true),
    row(Provider::Anthropic, "claude-3-haiku-20240307", 0.25, 1.25, 200_000, 4_096, false),
    row(Provider::Anthropic, "claude-2.1", 8.00, 24.00, 200_000, 4_096, true),
    row(Provider::Anthropic, "claude-2.0", 8.00, 24.00, 100_000, 4_096, true),
    row(Provider::Anthropic, "claude-instant-1.2", 0.80, 2.40, 100_000, 4_096, true),
    // Google.
    row(Provider::Google, "gemini-1.5-pro", 1.25, 5.00, 2_097_152, 8_192, false),
    row(Provider::Google, "gemini-1.5-pro-002", 1.25, 5.00, 2_097_152, 8_192, false),
    row(Provider::Google, "gemini-1.5-flash", 0.075, 0.30, 1_048_576, 8_192, false),
    row(Provider::Google, "gemini-1.5-flash-002", 0.075, 0.30, 1_048_576, 8_192, false),
    row(Provider::Google, "gemini-1.5-flash-8b", 0.0375, 0.15, 1_048_576, 8_192, false),
    row(Provider::Google, "gemini-2.0-flash", 0.10, 0.40, 1_048_576, 8_192, false),
    row(Provider::Google, "gemini-2.0-flash-lite", 0.075, 0.30, 1_048_576, 8_192, false),
    row(Provider::Google, "gemini-2.5-pro", 1.25, 10.00, 1_048_576, 65_536, false),
    row(Provider::Google, "gemini-2.5-flash", 0.30, 2.50, 1_048_576, 65_536, false),
    row(Provider::Google, "gemini-1.0-pro", 0.50, 1.50, 32_760, 8_192, true),
];

/// Curated short and colloquial names. Checked after exact matches, before
/// prefix rules.
pub(super) static ALIASES: &[(&str, Provider, &str)] = &[
    ("4o", Provider::OpenAi, "gpt-4o"),
    ("4o-mini", Provider::OpenAi, "gpt-4o-mini"),
    ("gpt4o", Provider::OpenAi, "gpt-4o"),
    ("gpt4o-mini", Provider::OpenAi, "gpt-4o-mini"),
    ("gpt4", Provider::OpenAi, "gpt-4"),
    ("gpt-4-turbo-preview", Provider::OpenAi, "gpt-4-0125-preview"),
    ("gpt-3.5", Provider::OpenAi, "gpt-3.5-turbo"),
    ("gpt-35-turbo", Provider::OpenAi, "gpt-3.5-turbo"),
    ("chatgpt", Provider::OpenAi, "chatgpt-4o-latest"),
    ("sonnet", Provider::Anthropic, "claude-3-5-sonnet-latest"),
    ("claude-sonnet", Provider::Anthropic, "claude-3-5-sonnet-latest"),
    ("claude-3.5-sonnet", Provider::Anthropic, "claude-3-5-sonnet-latest"),
    ("haiku", Provider::Anthropic, "claude-3-5-haiku-latest"),
    ("claude-haiku", Provider::Anthropic, "claude-3-5-haiku-latest"),
    ("claude-3.5-haiku", Provider::Anthropic, "claude-3-5-haiku-latest"),
    ("claude-3.7-sonnet", Provider::Anthropic, "claude-3-7-sonnet-latest"),
    ("opus", Provider::Anthropic, "claude-3-opus-latest"),
    ("claude-opus", Provider::Anthropic, "claude-3-opus-latest"),
    ("sonnet-4", Provider::Anthropic, "claude-sonnet-4-20250514"),
    ("opus-4", Provider::Anthropic, "claude-opus-4-20250514"),
    ("gemini-pro", Provider::Google, "gemini-1.5-pro"),
    ("gemini-flash", Provider::Google, "gemini-1.5-flash"),
    ("flash", Provider::Google, "gemini-2.0-flash"),
];

/// Provider-specific prefix rules, longest prefix first within each
/// provider. Dated or regional variants of a family land on the family's
/// canonical row.
pub(super) static PREFIX_RULES: &[(Provider, &str, &str)] = &[
    (Provider::OpenAi, "gpt-4o-mini", "gpt-4o-mini"),
    (Provider::OpenAi, "gpt-4o", "gpt-4o"),
    (Provider::OpenAi, "gpt-4.1-nano", "gpt-4.1-nano"),
    (Provider::OpenAi, "gpt-4.1-mini", "gpt-4.1-mini"),
    (Provider::OpenAi, "gpt-4.1", "gpt-4.1"),
    (Provider::OpenAi, "gpt-4-turbo", "gpt-4-turbo"),
    (Provider::OpenAi, "gpt-4-32k", "gpt-4-32k"),
    (Provider::OpenAi, "gpt-4", "gpt-4"),
    (Provider::OpenAi, "gpt-3.5-turbo-16k", "gpt-3.5-turbo-16k"),
    (Provider::OpenAi, "gpt-3.5", "gpt-3.5-turbo"),
    (Provider::OpenAi, "o1-mini", "o1-mini"),
    (Provider::OpenAi, "o1", "o1"),
    (Provider::OpenAi, "o3-mini", "o3-mini"),
    (Provider::OpenAi, "o3", "o3"),
    (Provider::OpenAi, "o4-mini", "o4-mini"),
    (Provider::Anthropic, "claude-3-5-sonnet", "claude-3-5-sonnet-latest"),
    (Provider::Anthropic, "claude-3-5-haiku", "claude-3-5-haiku-latest"),
    (Provider::Anthropic, "claude-3-7-sonnet", "claude-3-7-sonnet-latest"),
    (Provider::Anthropic, "claude-3-opus", "claude-3-opus-latest"),
    (Provider::Anthropic, "claude-3-sonnet", "claude-3-sonnet-20240229"),
    (Provider::Anthropic, "claude-3-haiku", "claude-3-haiku-20240307"),
    (Provider::Anthropic, "claude-sonnet-4", "claude-sonnet-4-20250514"),
    (Provider::Anthropic, "claude-opus-4", "claude-opus-4-20250514"),
    (Provider::Anthropic, "claude-instant", "claude-instant-1.2"),
    (Provider::Anthropic, "claude-2", "claude-2.1"),
    (Provider::Google, "gemini-1.5-flash-8b", "gemini-1.5-flash-8b"),
    (Provider::Google, "gemini-1.5-flash", "gemini-1.5-flash"),
    (Provider::Google, "gemini-1.5-pro", "gemini-1.5-pro"),
    (Provider::Google, "gemini-2.0-flash-lite", "gemini-2.0-flash-lite"),
    (Provider::Google, "gemini-2.0-flash", "gemini-2.0-flash"),
    (Provider::Google, "gemini-2.5-flash", "gemini-2.5-flash"),
    (Provider::Google, "gemini-2.5-pro", "gemini-2.5-pro"),
    (Provider::Google, "gemini-1.0", "gemini-1.0-pro"),
];

/// Conservative mid-price row returned when nothing matches.
pub(super) const FALLBACK_MODEL: (Provider, &str) = (Provider::OpenAi, "gpt-4o");
