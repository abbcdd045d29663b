use serde::{Deserialize, Serialize};

/// One charged request. Append-only; never mutated after insertion.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    pub id: i64,
    pub project_id: String,
    pub provider: String,
    pub model_id: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
    pub request_id: String,
    /// Set when the upstream reported no (or partial) usage and parts of
    /// the charge came from the pre-execution estimate.
    pub estimated: bool,
    pub created_at_ms: u64,
}

/// Per-project spend limit. `spent_usd` is owned by the ledger and only
/// moves through `record_usage` and `reset_budget_spent`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Budget {
    pub project_id: String,
    pub limit_usd: f64,
    pub spent_usd: f64,
    pub period_start_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period_end_ms: Option<u64>,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
}

impl Budget {
    /// Whether the budget's period, if any, lies entirely in the past.
    pub fn period_expired(&self, now_ms: u64) -> bool {
        self.period_end_ms.is_some_and(|end| now_ms > end)
    }
}

/// Aggregate view over all of a project's records plus its current budget,
/// read in a single consistent snapshot.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSummary {
    pub project_id: String,
    pub total_requests: u64,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_cost_usd: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub budget: Option<Budget>,
}
