use std::collections::HashMap;

use serde::{Deserialize, Serialize};

mod data;

/// Provider family a model belongs to. The gateway proxies the first two;
/// Google rows exist so colloquial names still resolve to sane prices.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    OpenAi,
    Anthropic,
    Google,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Anthropic => "anthropic",
            Provider::Google => "google",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Provider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "openai" => Ok(Provider::OpenAi),
            "anthropic" => Ok(Provider::Anthropic),
            "google" => Ok(Provider::Google),
            _ => Err(()),
        }
    }
}

/// One pricing row. Prices are USD per million tokens.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct ModelPricing {
    pub provider: Provider,
    pub model: &'static str,
    pub input_per_m: f64,
    pub output_per_m: f64,
    pub context_window: u32,
    pub default_max_output: u32,
    pub deprecated: bool,
}

/// Result of a catalog lookup. `fallback` is set when no table entry,
/// alias, or prefix rule matched and the designated fallback row was used.
#[derive(Clone, Copy, Debug)]
pub struct Resolved {
    pub row: &'static ModelPricing,
    pub fallback: bool,
}

/// Static catalog with index maps built once at startup. Immutable after.
#[derive(Debug)]
pub struct PricingCatalog {
    by_provider: HashMap<Provider, HashMap<&'static str, &'static ModelPricing>>,
    by_model: HashMap<&'static str, &'static ModelPricing>,
    fallback: &'static ModelPricing,
}

impl Default for PricingCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl PricingCatalog {
    pub fn new() -> Self {
        let mut by_provider: HashMap<Provider, HashMap<&'static str, &'static ModelPricing>> =
            HashMap::new();
        let mut by_model = HashMap::new();
        for row in data::MODEL_TABLE {
            by_provider
                .entry(row.provider)
                .or_default()
                .insert(row.model, row);
            // First declared wins for the cross-provider index.
            by_model.entry(row.model).or_insert(row);
        }
        let (fallback_provider, fallback_model) = data::FALLBACK_MODEL;
        let fallback = by_provider
            .get(&fallback_provider)
            .and_then(|models| models.get(fallback_model))
            .copied()
            .unwrap_or(&data::MODEL_TABLE[0]);
        Self {
            by_provider,
            by_model,
            fallback,
        }
    }

    fn provider_row(&self, provider: Provider, model: &str) -> Option<&'static ModelPricing> {
        self.by_provider
            .get(&provider)
            .and_then(|models| models.get(model))
            .copied()
    }

    /// Tolerant lookup, first hit wins: exact (provider, model) -> exact
    /// model across providers -> alias table -> the request's provider's
    /// prefix rules, longest prefix first -> fallback row. Never fails.
    pub fn resolve(&self, provider: Provider, model: &str) -> Resolved {
        if let Some(row) = self.provider_row(provider, model) {
            return Resolved {
                row,
                fallback: false,
            };
        }
        if let Some(row) = self.by_model.get(model).copied() {
            return Resolved {
                row,
                fallback: false,
            };
        }
        for (alias, target_provider, target_model) in data::ALIASES {
            if *alias == model {
                if let Some(row) = self.provider_row(*target_provider, target_model) {
                    return Resolved {
                        row,
                        fallback: false,
                    };
                }
            }
        }
        for (rule_provider, prefix, target_model) in data::PREFIX_RULES {
            if *rule_provider != provider {
                continue;
            }
            if model.starts_with(prefix) {
                if let Some(row) = self.provider_row(*rule_provider, target_model) {
                    return Resolved {
                        row,
                        fallback: false,
                    };
                }
            }
        }
        Resolved {
            row: self.fallback,
            fallback: true,
        }
    }

    /// Cheapest non-deprecated row by combined unit price, optionally
    /// restricted to one provider. Deprecated rows still resolve but are
    /// never returned here.
    pub fn cheapest_model(&self, provider: Option<Provider>) -> Option<&'static ModelPricing> {
        data::MODEL_TABLE
            .iter()
            .filter(|row| !row.deprecated)
            .filter(|row| provider.map_or(true, |p| row.provider == p))
            .min_by(|a, b| {
                let left = a.input_per_m + a.output_per_m;
                let right = b.input_per_m + b.output_per_m;
                left.partial_cmp(&right).unwrap_or(std::cmp::Ordering::Equal)
            })
    }

    pub fn fallback_row(&self) -> &'static ModelPricing {
        self.fallback
    }
}

/// `tokens * price_per_m / 1e6`, unrounded. Callers round on exposure.
pub fn token_cost_usd(tokens: u64, price_per_m: f64) -> f64 {
    tokens as f64 * price_per_m / 1_000_000.0
}

/// Half-up rounding to six decimals, applied only when a USD amount leaves
/// the process (headers, JSON payloads). Internal sums stay unrounded.
pub fn round_usd(value: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    (value * 1_000_000.0 + 0.5).floor() / 1_000_000.0
}
