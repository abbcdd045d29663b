use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::budget::{BudgetController, BudgetExceededDetails};
use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::estimator::CostEstimate;
use crate::events::{CostEventSink, TracingEventSink};
use crate::ledger::LedgerStore;
use crate::observability::{Observability, ObservabilitySnapshot};
use crate::pricing::{round_usd, PricingCatalog};

mod admin;
mod proxy;

static REQUEST_ID_SEQ: AtomicU64 = AtomicU64::new(0);

pub(crate) const PROJECT_ID_HEADER: &str = "x-tokencap-project-id";

const REQUEST_ID_HEADER: &str = "x-tokencap-request-id";
const INPUT_TOKENS_HEADER: &str = "x-tokencap-input-tokens";
const ESTIMATED_OUTPUT_TOKENS_HEADER: &str = "x-tokencap-estimated-output-tokens";
const ESTIMATED_COST_HEADER: &str = "x-tokencap-estimated-cost-usd";
const CONFIDENCE_HEADER: &str = "x-tokencap-confidence";
const OUTPUT_TOKENS_HEADER: &str = "x-tokencap-output-tokens";
const COST_HEADER: &str = "x-tokencap-cost-usd";
const BUDGET_REMAINING_HEADER: &str = "x-tokencap-budget-remaining";

/// Shared per-process state behind every handler. Budget state itself
/// lives in the ledger; nothing here is an authoritative copy of it.
#[derive(Clone)]
pub struct AppState {
    pub(crate) config: Arc<GatewayConfig>,
    pub(crate) catalog: Arc<PricingCatalog>,
    pub(crate) ledger: LedgerStore,
    pub(crate) controller: BudgetController,
    pub(crate) events: Arc<dyn CostEventSink>,
    pub(crate) observability: Arc<Mutex<Observability>>,
    pub(crate) buffered_client: reqwest::Client,
    pub(crate) streaming_client: reqwest::Client,
}

impl AppState {
    pub fn new(config: GatewayConfig, ledger: LedgerStore) -> Result<Self, GatewayError> {
        let buffered_client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|err| GatewayError::Upstream(format!("http client error: {err}")))?;
        // Streaming gets an idle timeout instead of a total cap; a healthy
        // SSE stream can run for many minutes.
        let streaming_client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .read_timeout(Duration::from_secs(config.stream_idle_timeout_secs))
            .build()
            .map_err(|err| GatewayError::Upstream(format!("http client error: {err}")))?;

        Ok(Self {
            config: Arc::new(config),
            catalog: Arc::new(PricingCatalog::new()),
            controller: BudgetController::new(ledger.clone()),
            ledger,
            events: Arc::new(TracingEventSink),
            observability: Arc::new(Mutex::new(Observability::default())),
            buffered_client,
            streaming_client,
        })
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn CostEventSink>) -> Self {
        self.events = sink;
        self
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/v1/chat/completions", post(proxy::chat_completions))
        .route("/v1/messages", post(proxy::messages))
        .route("/v1/usage", get(admin::usage_summary))
        .route("/v1/usage/history", get(admin::usage_history))
        .route(
            "/v1/budget",
            post(admin::set_budget)
                .get(admin::get_budget)
                .delete(admin::delete_budget),
        )
        .route("/v1/budget/reset", post(admin::reset_budget))
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    #[serde(rename = "type")]
    kind: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<BudgetExceededDetails>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ErrorResponse {
    error: ErrorDetail,
}

impl ErrorResponse {
    pub(crate) fn new(kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                kind,
                message: message.into(),
                details: None,
            },
        }
    }

    fn budget_exceeded(message: impl Into<String>, details: BudgetExceededDetails) -> Self {
        Self {
            error: ErrorDetail {
                kind: "budget_exceeded",
                message: message.into(),
                details: Some(details),
            },
        }
    }

    pub(crate) fn from_error(err: &GatewayError) -> Self {
        match err {
            GatewayError::BudgetExceeded { details, .. } => {
                Self::budget_exceeded(err.to_string(), details.clone())
            }
            // Ledger internals stay out of the wire payload.
            GatewayError::Ledger(_) => Self::new(err.kind(), "ledger unavailable"),
            other => Self::new(other.kind(), other.to_string()),
        }
    }
}

pub(crate) fn gateway_error_status(err: &GatewayError) -> StatusCode {
    match err {
        GatewayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        GatewayError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
        GatewayError::BudgetExceeded { .. } => StatusCode::PAYMENT_REQUIRED,
        GatewayError::BudgetNotFound(_) => StatusCode::NOT_FOUND,
        GatewayError::Upstream(_) => StatusCode::BAD_GATEWAY,
        GatewayError::Ledger(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub(crate) fn gateway_error_response(err: &GatewayError) -> (StatusCode, Json<ErrorResponse>) {
    (gateway_error_status(err), Json(ErrorResponse::from_error(err)))
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

async fn metrics(State(state): State<AppState>) -> Json<ObservabilitySnapshot> {
    let snapshot = state.observability.lock().await.snapshot();
    Json(snapshot)
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ProjectQuery {
    pub(crate) project_id: Option<String>,
    pub(crate) limit: Option<usize>,
}

/// Header beats query beats the configured default.
pub(crate) fn resolve_project_id(
    headers: &HeaderMap,
    query_project_id: Option<&str>,
    config: &GatewayConfig,
) -> String {
    if let Some(value) = headers
        .get(PROJECT_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        return value.to_string();
    }
    if let Some(value) = query_project_id.map(str::trim).filter(|value| !value.is_empty()) {
        return value.to_string();
    }
    config.default_project_id.clone()
}

pub(crate) fn generate_request_id() -> String {
    let seq = REQUEST_ID_SEQ.fetch_add(1, Ordering::Relaxed);
    let ts_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis())
        .unwrap_or(0);
    format!("tc-{ts_ms}-{seq}")
}

fn insert_header(headers: &mut HeaderMap, name: &'static str, value: String) {
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(name, value);
    }
}

/// The estimate headers every forwarded request carries, streaming or not.
pub(crate) fn insert_estimate_headers(
    headers: &mut HeaderMap,
    request_id: &str,
    estimate: &CostEstimate,
) {
    insert_header(headers, REQUEST_ID_HEADER, request_id.to_string());
    insert_header(headers, INPUT_TOKENS_HEADER, estimate.input_tokens.to_string());
    insert_header(
        headers,
        ESTIMATED_OUTPUT_TOKENS_HEADER,
        estimate.estimated_output_tokens.to_string(),
    );
    insert_header(
        headers,
        ESTIMATED_COST_HEADER,
        format!("{:.6}", round_usd(estimate.total_estimated_cost_usd)),
    );
    insert_header(headers, CONFIDENCE_HEADER, estimate.confidence.as_str().to_string());
}

/// Actual-value headers; non-streaming responses only.
pub(crate) fn insert_actual_headers(
    headers: &mut HeaderMap,
    output_tokens: u64,
    cost_usd: f64,
    budget_remaining_usd: Option<f64>,
) {
    insert_header(headers, OUTPUT_TOKENS_HEADER, output_tokens.to_string());
    insert_header(headers, COST_HEADER, format!("{:.6}", round_usd(cost_usd)));
    if let Some(remaining) = budget_remaining_usd {
        insert_header(
            headers,
            BUDGET_REMAINING_HEADER,
            format!("{:.6}", round_usd(remaining)),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_id_priority_is_header_query_default() {
        let config = GatewayConfig::default();
        let mut headers = HeaderMap::new();

        assert_eq!(resolve_project_id(&headers, None, &config), "default");
        assert_eq!(resolve_project_id(&headers, Some("from-query"), &config), "from-query");

        headers.insert(PROJECT_ID_HEADER, "from-header".parse().unwrap());
        assert_eq!(
            resolve_project_id(&headers, Some("from-query"), &config),
            "from-header"
        );
    }

    #[test]
    fn request_ids_are_unique() {
        let first = generate_request_id();
        let second = generate_request_id();
        assert_ne!(first, second);
        assert!(first.starts_with("tc-"));
    }

    #[test]
    fn estimate_headers_format_cost_to_six_decimals() {
        use crate::estimator::Confidence;
        use crate::pricing::Provider;

        let estimate = CostEstimate {
            provider: Provider::OpenAi,
            model_id: "gpt-4o-mini".to_string(),
            priced_as: "gpt-4o-mini",
            input_tokens: 100,
            estimated_output_tokens: 50,
            input_cost_usd: 0.000015,
            estimated_output_cost_usd: 0.00003,
            total_estimated_cost_usd: 0.000045,
            confidence: Confidence::High,
        };
        let mut headers = HeaderMap::new();
        insert_estimate_headers(&mut headers, "tc-1", &estimate);
        assert_eq!(headers.get(ESTIMATED_COST_HEADER).unwrap(), "0.000045");
        assert_eq!(headers.get(CONFIDENCE_HEADER).unwrap(), "high");
        assert_eq!(headers.get(INPUT_TOKENS_HEADER).unwrap(), "100");
    }
}
