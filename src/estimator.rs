use serde::{Deserialize, Serialize};

use crate::pricing::{self, PricingCatalog, Provider};
use crate::tokenizer::OutputEstimate;

/// Three-valued trust label for an estimate. Ordered so that `min` picks
/// the weaker of two labels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::Low => "low",
            Confidence::Medium => "medium",
            Confidence::High => "high",
        }
    }
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pre-execution cost estimate for one request. Transient; discarded once
/// the response is done.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CostEstimate {
    pub provider: Provider,
    pub model_id: String,
    /// Catalog row the price came from; differs from `model_id` when an
    /// alias or prefix rule matched, or when the fallback row was used.
    pub priced_as: &'static str,
    pub input_tokens: u32,
    pub estimated_output_tokens: u32,
    pub input_cost_usd: f64,
    pub estimated_output_cost_usd: f64,
    pub total_estimated_cost_usd: f64,
    pub confidence: Confidence,
}

/// Combines a token count and an output estimate with a pricing lookup.
/// Stateless. Confidence is the minimum of the input count's and the
/// output estimate's confidence, demoted to `low` when the model resolved
/// to the fallback row.
pub fn estimate(
    catalog: &PricingCatalog,
    provider: Provider,
    model: &str,
    input_tokens: u32,
    input_confidence: Confidence,
    output: OutputEstimate,
) -> CostEstimate {
    let resolved = catalog.resolve(provider, model);
    let input_cost_usd = pricing::token_cost_usd(u64::from(input_tokens), resolved.row.input_per_m);
    let estimated_output_cost_usd =
        pricing::token_cost_usd(u64::from(output.tokens), resolved.row.output_per_m);

    let mut confidence = input_confidence.min(output.confidence);
    if resolved.fallback {
        confidence = Confidence::Low;
    }

    CostEstimate {
        provider,
        model_id: model.to_string(),
        priced_as: resolved.row.model,
        input_tokens,
        estimated_output_tokens: output.tokens,
        input_cost_usd,
        estimated_output_cost_usd,
        total_estimated_cost_usd: input_cost_usd + estimated_output_cost_usd,
        confidence,
    }
}
