//! tokencap: a cost-governing gateway for LLM HTTP APIs.
//!
//! Clients send chat or message requests through the gateway instead of
//! the provider directly. Each request gets a pre-execution cost estimate,
//! is admitted or rejected against its project's monetary budget,
//! forwarded unchanged, observed for actual usage (buffered or streamed),
//! and charged to a durable usage ledger.

mod error;

pub mod budget;
pub mod config;
pub mod estimator;
pub mod events;
pub mod http;
pub mod ledger;
pub mod middleware;
pub mod observability;
pub mod pricing;
pub mod records;
pub mod sse;
pub mod tokenizer;
pub mod upstream;

pub use budget::{Admission, BudgetController, BudgetExceededDetails, BudgetSnapshot};
pub use config::GatewayConfig;
pub use error::{GatewayError, Result};
pub use estimator::{Confidence, CostEstimate};
pub use events::{CostEventSink, TracingEventSink};
pub use http::{router, AppState};
pub use ledger::{LedgerError, LedgerStore, UsageCharge};
pub use middleware::{CostGuard, GuardOutcome};
pub use observability::{Observability, ObservabilitySnapshot};
pub use pricing::{ModelPricing, PricingCatalog, Provider};
pub use records::{Budget, UsageRecord, UsageSummary};
pub use upstream::{
    AnthropicAdapter, ObservedUsage, OpenAiAdapter, ParsedRequest, ProviderAdapter,
    StreamUsageTracker,
};
