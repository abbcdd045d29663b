use axum::body::{Body, Bytes};
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use serde_json::Value;

use crate::budget::Admission;
use crate::error::GatewayError;
use crate::estimator::{self, CostEstimate};
use crate::ledger::{LedgerError, UsageCharge};
use crate::pricing::{token_cost_usd, ModelPricing};
use crate::records::{Budget, UsageRecord};
use crate::tokenizer;
use crate::upstream::{
    AnthropicAdapter, ObservedUsage, OpenAiAdapter, ProviderAdapter, StreamUsageTracker,
};

use super::{
    gateway_error_status, generate_request_id, insert_actual_headers, insert_estimate_headers,
    resolve_project_id, AppState, ErrorResponse, ProjectQuery,
};

pub(super) async fn chat_completions(
    State(state): State<AppState>,
    Query(query): Query<ProjectQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    proxy_request(state, headers, query, body, &OpenAiAdapter).await
}

pub(super) async fn messages(
    State(state): State<AppState>,
    Query(query): Query<ProjectQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    proxy_request(state, headers, query, body, &AnthropicAdapter).await
}

/// The per-request pipeline: parse, estimate, admit, forward, observe
/// usage, charge, respond. Admission and input failures never reach the
/// upstream or the ledger; upstream failures never reach the ledger.
async fn proxy_request<A: ProviderAdapter>(
    state: AppState,
    headers: HeaderMap,
    query: ProjectQuery,
    body: Bytes,
    adapter: &A,
) -> Response {
    state.observability.lock().await.record_request();
    let request_id = generate_request_id();
    let project_id = resolve_project_id(&headers, query.project_id.as_deref(), &state.config);

    let parsed = match adapter.parse_request(&body) {
        Ok(parsed) => parsed,
        Err(err) => return error_json(&err, None),
    };

    let (input_tokens, input_confidence) = adapter.count_input_tokens(&parsed);
    let resolved = state.catalog.resolve(adapter.provider(), &parsed.model);
    let output = tokenizer::estimate_output_tokens(
        parsed.max_tokens,
        if resolved.fallback {
            0
        } else {
            resolved.row.default_max_output
        },
        state.config.default_max_output_tokens,
    );
    let estimate = estimator::estimate(
        &state.catalog,
        adapter.provider(),
        &parsed.model,
        input_tokens,
        input_confidence,
        output,
    );
    state.events.on_estimate(&project_id, &estimate);

    let admission = match state.controller.admit(&project_id, &estimate).await {
        Ok(admission) => admission,
        Err(err) => {
            tracing::error!(%request_id, error = %err, "admission read failed");
            return error_json(
                &GatewayError::Ledger(err),
                Some((request_id.as_str(), &estimate)),
            );
        }
    };
    match admission {
        Admission::Rejected(details) => {
            state.observability.lock().await.record_rejected();
            state.events.on_budget_exceeded(&project_id, &details);
            tracing::info!(
                %request_id,
                %project_id,
                model = %parsed.model,
                estimated_cost_usd = estimate.total_estimated_cost_usd,
                "request rejected by budget"
            );
            let err = GatewayError::BudgetExceeded {
                project_id: project_id.clone(),
                details,
            };
            return error_json(&err, Some((request_id.as_str(), &estimate)));
        }
        Admission::Admitted { period_expired, .. } => {
            if period_expired {
                tracing::debug!(%request_id, %project_id, "budget period expired; admitting");
            }
            state.observability.lock().await.record_admitted();
        }
    }

    let Some(credentials) = adapter.resolve_credentials(&headers, &state.config) else {
        state.observability.lock().await.record_unauthorized();
        let err = GatewayError::Unauthorized {
            provider: adapter.provider().as_str(),
        };
        return error_json(&err, Some((request_id.as_str(), &estimate)));
    };

    let client = if parsed.stream {
        &state.streaming_client
    } else {
        &state.buffered_client
    };
    let upstream = match adapter
        .forward(client, adapter.base_url(&state.config), &credentials, &parsed.body)
        .await
    {
        Ok(upstream) => upstream,
        Err(err) => {
            state.observability.lock().await.record_upstream_error();
            tracing::warn!(%request_id, error = %err, "upstream call failed");
            return error_json(&err, Some((request_id.as_str(), &estimate)));
        }
    };

    let status = upstream.status();
    if !status.is_success() {
        // Proxy the provider's error verbatim; no usage was reported, so
        // nothing is charged.
        let mut headers = copy_upstream_headers(upstream.headers());
        let body = upstream.bytes().await.unwrap_or_default();
        insert_estimate_headers(&mut headers, &request_id, &estimate);
        tracing::info!(%request_id, status = status.as_u16(), "proxying upstream error");
        return raw_response(status, headers, Body::from(body));
    }

    if parsed.stream {
        let tracker = adapter.stream_tracker(&parsed.model);
        let finalizer = StreamFinalizer {
            state: state.clone(),
            project_id,
            request_id,
            estimate,
            row: resolved.row,
        };
        return stream_response(upstream, tracker, finalizer);
    }

    let upstream_headers = copy_upstream_headers(upstream.headers());
    let body = match upstream.bytes().await {
        Ok(body) => body,
        Err(err) => {
            state.observability.lock().await.record_upstream_error();
            let err = GatewayError::Upstream(format!("failed reading upstream body: {err}"));
            return error_json(&err, Some((request_id.as_str(), &estimate)));
        }
    };
    let parsed_body: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(err) => {
            state.observability.lock().await.record_upstream_error();
            let err = GatewayError::Upstream(format!("malformed upstream response: {err}"));
            return error_json(&err, Some((request_id.as_str(), &estimate)));
        }
    };

    let observed = adapter.extract_usage(&parsed_body).unwrap_or_default();
    let (record, post_budget) = match apply_charge(
        &state,
        &project_id,
        &request_id,
        &estimate,
        resolved.row,
        observed,
    )
    .await
    {
        Ok(outcome) => outcome,
        Err(err) => {
            tracing::error!(%request_id, error = %err, "charge failed");
            return error_json(
                &GatewayError::Ledger(err),
                Some((request_id.as_str(), &estimate)),
            );
        }
    };

    let mut headers = upstream_headers;
    insert_estimate_headers(&mut headers, &request_id, &estimate);
    insert_actual_headers(
        &mut headers,
        record.output_tokens,
        record.cost_usd,
        post_budget
            .as_ref()
            .map(|budget| budget.limit_usd - budget.spent_usd),
    );
    raw_response(status, headers, Body::from(body))
}

/// Computes the charge for one request from observed usage, falling back
/// to the estimate's input count and zero output where the upstream did
/// not report, and flags such records.
async fn apply_charge(
    state: &AppState,
    project_id: &str,
    request_id: &str,
    estimate: &CostEstimate,
    row: &'static ModelPricing,
    observed: ObservedUsage,
) -> Result<(UsageRecord, Option<Budget>), LedgerError> {
    let input_tokens = observed
        .input_tokens
        .unwrap_or(u64::from(estimate.input_tokens));
    let output_tokens = observed.output_tokens.unwrap_or(0);
    let estimated = observed.input_tokens.is_none() || observed.output_tokens.is_none();
    let cost_usd = token_cost_usd(input_tokens, row.input_per_m)
        + token_cost_usd(output_tokens, row.output_per_m);

    let record = state
        .ledger
        .record_usage(UsageCharge {
            project_id: project_id.to_string(),
            provider: estimate.provider.as_str().to_string(),
            model_id: estimate.model_id.clone(),
            input_tokens,
            output_tokens,
            cost_usd,
            request_id: request_id.to_string(),
            estimated,
        })
        .await?;
    state.observability.lock().await.record_usage_record();
    state.events.on_cost(project_id, &record);

    let post_budget = state.ledger.get_budget(project_id).await?;
    if let Some(budget) = post_budget.as_ref() {
        let utilization = if budget.limit_usd > 0.0 {
            budget.spent_usd / budget.limit_usd * 100.0
        } else {
            100.0
        };
        if utilization >= state.config.budget_warning_percent {
            state.events.on_budget_warning(project_id, utilization);
        }
    }
    Ok((record, post_budget))
}

#[derive(Clone, Copy, Debug)]
enum StreamEnd {
    Completed,
    Error,
    Aborted,
}

/// Everything needed to settle a streamed request's charge after the last
/// byte, whether the stream completed, failed, or the client went away.
struct StreamFinalizer {
    state: AppState,
    project_id: String,
    request_id: String,
    estimate: CostEstimate,
    row: &'static ModelPricing,
}

impl StreamFinalizer {
    async fn finalize(self, observed: ObservedUsage, end: StreamEnd) {
        let state = self.state;
        if matches!(end, StreamEnd::Aborted) {
            state.observability.lock().await.record_stream_abort();
        }
        tracing::debug!(
            request_id = %self.request_id,
            end = ?end,
            input_tokens = observed.input_tokens,
            output_tokens = observed.output_tokens,
            "stream closed"
        );
        if let Err(err) = apply_charge(
            &state,
            &self.project_id,
            &self.request_id,
            &self.estimate,
            self.row,
            observed,
        )
        .await
        {
            tracing::error!(request_id = %self.request_id, error = %err, "stream charge failed");
        }
    }
}

type UpstreamByteStream = BoxStream<'static, Result<Bytes, std::io::Error>>;

struct ProxyStreamState {
    upstream: UpstreamByteStream,
    tracker: Box<dyn StreamUsageTracker>,
    finalizer: Option<StreamFinalizer>,
}

impl ProxyStreamState {
    async fn finalize(&mut self, end: StreamEnd) {
        let Some(finalizer) = self.finalizer.take() else {
            return;
        };
        let observed = self.tracker.observed();
        finalizer.finalize(observed, end).await;
    }
}

/// A dropped state means the client disconnected mid-stream: settle the
/// best-effort charge off this stack, on the runtime if one is available.
impl Drop for ProxyStreamState {
    fn drop(&mut self) {
        let Some(finalizer) = self.finalizer.take() else {
            return;
        };
        let observed = self.tracker.observed();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    finalizer.finalize(observed, StreamEnd::Aborted).await;
                });
            }
            Err(_) => {
                let _ = std::thread::Builder::new()
                    .name("tokencap-stream-finalizer".to_string())
                    .spawn(move || {
                        let Ok(runtime) = tokio::runtime::Builder::new_current_thread()
                            .enable_all()
                            .build()
                        else {
                            return;
                        };
                        runtime.block_on(async move {
                            finalizer.finalize(observed, StreamEnd::Aborted).await;
                        });
                    });
            }
        }
    }
}

/// Non-buffering interception: each upstream chunk is parsed into the
/// usage tracker and forwarded before the next is read. Headers carry the
/// estimate only; by the time actual numbers exist the body has long
/// started.
fn stream_response(
    upstream: reqwest::Response,
    tracker: Box<dyn StreamUsageTracker>,
    finalizer: StreamFinalizer,
) -> Response {
    let status = upstream.status();
    let mut headers = copy_upstream_headers(upstream.headers());
    insert_estimate_headers(&mut headers, &finalizer.request_id, &finalizer.estimate);

    let upstream_stream: UpstreamByteStream = upstream
        .bytes_stream()
        .map(|chunk| chunk.map_err(std::io::Error::other))
        .boxed();

    let stream_state = ProxyStreamState {
        upstream: upstream_stream,
        tracker,
        finalizer: Some(finalizer),
    };

    let stream = futures_util::stream::try_unfold(stream_state, |mut stream_state| async move {
        match stream_state.upstream.next().await {
            Some(Ok(chunk)) => {
                stream_state.tracker.ingest(&chunk);
                Ok(Some((chunk, stream_state)))
            }
            Some(Err(err)) => {
                stream_state.finalize(StreamEnd::Error).await;
                Err(err)
            }
            None => {
                stream_state.finalize(StreamEnd::Completed).await;
                Ok(None)
            }
        }
    });

    raw_response(status, headers, Body::from_stream(stream))
}

/// Upstream headers minus the framing ones the server re-derives.
fn copy_upstream_headers(upstream: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in upstream {
        if matches!(
            name.as_str(),
            "content-length" | "transfer-encoding" | "connection"
        ) {
            continue;
        }
        headers.insert(name, value.clone());
    }
    headers
}

fn raw_response(status: StatusCode, headers: HeaderMap, body: Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

fn json_response(status: StatusCode, payload: &ErrorResponse) -> Response {
    let body = serde_json::to_vec(payload).unwrap_or_default();
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response.headers_mut().insert(
        "content-type",
        axum::http::HeaderValue::from_static("application/json"),
    );
    response
}

/// Error response derived from the gateway error's kind and status
/// mapping, with the estimate headers attached once one exists.
fn error_json(err: &GatewayError, estimate: Option<(&str, &CostEstimate)>) -> Response {
    let mut response = json_response(gateway_error_status(err), &ErrorResponse::from_error(err));
    if let Some((request_id, estimate)) = estimate {
        insert_estimate_headers(response.headers_mut(), request_id, estimate);
    }
    response
}
