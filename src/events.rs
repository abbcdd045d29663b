use crate::budget::BudgetExceededDetails;
use crate::estimator::CostEstimate;
use crate::records::UsageRecord;

/// Callback seam for cost and budget events. Every method is invoked
/// synchronously from the request pipeline; implementations that need to
/// do heavy work should hand it off to their own worker.
pub trait CostEventSink: Send + Sync {
    fn on_estimate(&self, project_id: &str, estimate: &CostEstimate) {
        let _ = (project_id, estimate);
    }

    fn on_cost(&self, project_id: &str, record: &UsageRecord) {
        let _ = (project_id, record);
    }

    fn on_budget_warning(&self, project_id: &str, utilization_percent: f64) {
        let _ = (project_id, utilization_percent);
    }

    fn on_budget_exceeded(&self, project_id: &str, details: &BudgetExceededDetails) {
        let _ = (project_id, details);
    }
}

/// Default sink: structured logs through `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingEventSink;

impl CostEventSink for TracingEventSink {
    fn on_estimate(&self, project_id: &str, estimate: &CostEstimate) {
        tracing::debug!(
            project_id,
            model = %estimate.model_id,
            input_tokens = estimate.input_tokens,
            estimated_output_tokens = estimate.estimated_output_tokens,
            estimated_cost_usd = estimate.total_estimated_cost_usd,
            confidence = %estimate.confidence,
            "estimate"
        );
    }

    fn on_cost(&self, project_id: &str, record: &UsageRecord) {
        tracing::info!(
            project_id,
            request_id = %record.request_id,
            model = %record.model_id,
            input_tokens = record.input_tokens,
            output_tokens = record.output_tokens,
            cost_usd = record.cost_usd,
            estimated = record.estimated,
            "charge"
        );
    }

    fn on_budget_warning(&self, project_id: &str, utilization_percent: f64) {
        tracing::warn!(project_id, utilization_percent, "budget utilization high");
    }

    fn on_budget_exceeded(&self, project_id: &str, details: &BudgetExceededDetails) {
        tracing::warn!(
            project_id,
            limit_usd = details.limit_usd,
            current_spend_usd = details.current_spend_usd,
            estimated_cost_usd = details.estimated_cost_usd,
            "budget exceeded"
        );
    }
}
