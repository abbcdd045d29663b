use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Deserialize;

use crate::error::GatewayError;
use crate::ledger::LedgerError;
use crate::pricing::round_usd;
use crate::records::{Budget, UsageRecord, UsageSummary};

use super::{gateway_error_response, resolve_project_id, AppState, ErrorResponse, ProjectQuery};

const DEFAULT_HISTORY_LIMIT: usize = 50;
const MAX_HISTORY_LIMIT: usize = 1000;

type HandlerError = (StatusCode, Json<ErrorResponse>);

fn internal_error(err: LedgerError) -> HandlerError {
    tracing::error!(error = %err, "ledger operation failed");
    gateway_error_response(&GatewayError::Ledger(err))
}

fn invalid_request(message: &str) -> HandlerError {
    gateway_error_response(&GatewayError::InvalidRequest(message.to_string()))
}

fn budget_not_found(project_id: &str) -> HandlerError {
    gateway_error_response(&GatewayError::BudgetNotFound(project_id.to_string()))
}

/// USD amounts are rounded half-up to six decimals only here, at the wire.
fn rounded_budget(mut budget: Budget) -> Budget {
    budget.limit_usd = round_usd(budget.limit_usd);
    budget.spent_usd = round_usd(budget.spent_usd);
    budget
}

fn rounded_record(mut record: UsageRecord) -> UsageRecord {
    record.cost_usd = round_usd(record.cost_usd);
    record
}

pub(super) async fn usage_summary(
    State(state): State<AppState>,
    Query(query): Query<ProjectQuery>,
    headers: HeaderMap,
) -> Result<Json<UsageSummary>, HandlerError> {
    let project_id = resolve_project_id(&headers, query.project_id.as_deref(), &state.config);
    let mut summary = state
        .ledger
        .usage_summary(&project_id)
        .await
        .map_err(internal_error)?;
    summary.total_cost_usd = round_usd(summary.total_cost_usd);
    summary.budget = summary.budget.map(rounded_budget);
    Ok(Json(summary))
}

pub(super) async fn usage_history(
    State(state): State<AppState>,
    Query(query): Query<ProjectQuery>,
    headers: HeaderMap,
) -> Result<Json<Vec<UsageRecord>>, HandlerError> {
    let project_id = resolve_project_id(&headers, query.project_id.as_deref(), &state.config);
    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .min(MAX_HISTORY_LIMIT);
    let records = state
        .ledger
        .recent_usage(&project_id, limit)
        .await
        .map_err(internal_error)?;
    Ok(Json(records.into_iter().map(rounded_record).collect()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct SetBudgetRequest {
    project_id: String,
    limit_usd: f64,
    #[serde(default)]
    period_days: Option<u32>,
}

pub(super) async fn set_budget(
    State(state): State<AppState>,
    Json(request): Json<SetBudgetRequest>,
) -> Result<Json<Budget>, HandlerError> {
    if request.project_id.trim().is_empty() {
        return Err(invalid_request("projectId must not be empty"));
    }
    if !request.limit_usd.is_finite() || request.limit_usd < 0.0 {
        return Err(invalid_request("limitUsd must be a non-negative number"));
    }
    if request.period_days == Some(0) {
        return Err(invalid_request("periodDays must be at least 1"));
    }
    let budget = state
        .ledger
        .set_budget(&request.project_id, request.limit_usd, request.period_days)
        .await
        .map_err(internal_error)?;
    tracing::info!(
        project_id = %request.project_id,
        limit_usd = request.limit_usd,
        period_days = ?request.period_days,
        "budget set"
    );
    Ok(Json(rounded_budget(budget)))
}

pub(super) async fn get_budget(
    State(state): State<AppState>,
    Query(query): Query<ProjectQuery>,
    headers: HeaderMap,
) -> Result<Json<Budget>, HandlerError> {
    let project_id = resolve_project_id(&headers, query.project_id.as_deref(), &state.config);
    let budget = state
        .ledger
        .get_budget(&project_id)
        .await
        .map_err(internal_error)?;
    match budget {
        Some(budget) => Ok(Json(rounded_budget(budget))),
        None => Err(budget_not_found(&project_id)),
    }
}

pub(super) async fn reset_budget(
    State(state): State<AppState>,
    Query(query): Query<ProjectQuery>,
    headers: HeaderMap,
) -> Result<Json<Budget>, HandlerError> {
    let project_id = resolve_project_id(&headers, query.project_id.as_deref(), &state.config);
    let reset = state
        .ledger
        .reset_budget_spent(&project_id)
        .await
        .map_err(internal_error)?;
    if !reset {
        return Err(budget_not_found(&project_id));
    }
    tracing::info!(%project_id, "budget spend reset");
    let budget = state
        .ledger
        .get_budget(&project_id)
        .await
        .map_err(internal_error)?;
    budget
        .map(rounded_budget)
        .map(Json)
        .ok_or_else(|| budget_not_found(&project_id))
}

pub(super) async fn delete_budget(
    State(state): State<AppState>,
    Query(query): Query<ProjectQuery>,
    headers: HeaderMap,
) -> Result<StatusCode, HandlerError> {
    let project_id = resolve_project_id(&headers, query.project_id.as_deref(), &state.config);
    let deleted = state
        .ledger
        .delete_budget(&project_id)
        .await
        .map_err(internal_error)?;
    if !deleted {
        return Err(budget_not_found(&project_id));
    }
    tracing::info!(%project_id, "budget deleted");
    Ok(StatusCode::NO_CONTENT)
}
