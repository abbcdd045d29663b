use std::future::Future;
use std::sync::Arc;

use serde_json::Value;

use crate::budget::{Admission, BudgetController};
use crate::error::GatewayError;
use crate::estimator::{self, CostEstimate};
use crate::events::CostEventSink;
use crate::ledger::{LedgerStore, UsageCharge};
use crate::pricing::{token_cost_usd, PricingCatalog, Provider};
use crate::records::UsageRecord;
use crate::tokenizer;
use crate::upstream::ObservedUsage;

/// Explicit middleware for embedding the gateway's governance in another
/// program: no SDK object is wrapped or intercepted. The caller hands over
/// a request value and an async upstream callable; the guard estimates,
/// admits, invokes, and charges, in that order.
#[derive(Clone)]
pub struct CostGuard {
    catalog: Arc<PricingCatalog>,
    controller: BudgetController,
    ledger: LedgerStore,
    events: Arc<dyn CostEventSink>,
    default_max_output_tokens: u32,
}

/// What the guarded callable produced, plus the ledger row written for it.
#[derive(Debug)]
pub struct GuardOutcome<T> {
    pub value: T,
    pub estimate: CostEstimate,
    pub record: UsageRecord,
}

impl CostGuard {
    pub fn new(
        catalog: Arc<PricingCatalog>,
        controller: BudgetController,
        ledger: LedgerStore,
        events: Arc<dyn CostEventSink>,
        default_max_output_tokens: u32,
    ) -> Self {
        Self {
            catalog,
            controller,
            ledger,
            events,
            default_max_output_tokens,
        }
    }

    /// Runs `call` under budget governance. The callable reports the usage
    /// it observed from its own upstream exchange; the guard charges that
    /// usage to `project_id` under `request_id`. A rejection or a failed
    /// callable leaves the ledger untouched.
    pub async fn run<T, F, Fut>(
        &self,
        project_id: &str,
        request_id: &str,
        provider: Provider,
        request: &Value,
        call: F,
    ) -> Result<GuardOutcome<T>, GatewayError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(T, ObservedUsage), GatewayError>>,
    {
        let model = request
            .get("model")
            .and_then(Value::as_str)
            .ok_or_else(|| GatewayError::InvalidRequest("missing field: model".to_string()))?;
        let (input_tokens, input_confidence) = match provider {
            Provider::Anthropic => tokenizer::count_anthropic_messages_input(request),
            _ => tokenizer::count_openai_chat_input(model, request),
        };
        let max_tokens = request
            .get("max_tokens")
            .and_then(Value::as_u64)
            .map(|value| value.min(u64::from(u32::MAX)) as u32);

        let resolved = self.catalog.resolve(provider, model);
        let output = tokenizer::estimate_output_tokens(
            max_tokens,
            if resolved.fallback {
                0
            } else {
                resolved.row.default_max_output
            },
            self.default_max_output_tokens,
        );
        let estimate = estimator::estimate(
            &self.catalog,
            provider,
            model,
            input_tokens,
            input_confidence,
            output,
        );
        self.events.on_estimate(project_id, &estimate);

        match self.controller.admit(project_id, &estimate).await? {
            Admission::Rejected(details) => {
                self.events.on_budget_exceeded(project_id, &details);
                return Err(GatewayError::BudgetExceeded {
                    project_id: project_id.to_string(),
                    details,
                });
            }
            Admission::Admitted { .. } => {}
        }

        let (value, observed) = call().await?;

        let input = observed.input_tokens.unwrap_or(u64::from(estimate.input_tokens));
        let output_tokens = observed.output_tokens.unwrap_or(0);
        let cost_usd = token_cost_usd(input, resolved.row.input_per_m)
            + token_cost_usd(output_tokens, resolved.row.output_per_m);
        let record = self
            .ledger
            .record_usage(UsageCharge {
                project_id: project_id.to_string(),
                provider: provider.as_str().to_string(),
                model_id: model.to_string(),
                input_tokens: input,
                output_tokens,
                cost_usd,
                request_id: request_id.to_string(),
                estimated: observed.input_tokens.is_none() || observed.output_tokens.is_none(),
            })
            .await
            .map_err(GatewayError::Ledger)?;
        self.events.on_cost(project_id, &record);

        Ok(GuardOutcome {
            value,
            estimate,
            record,
        })
    }
}
