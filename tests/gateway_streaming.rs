use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use httpmock::prelude::*;
use serde_json::json;
use tower::util::ServiceExt;

use tokencap::{AppState, GatewayConfig, LedgerStore};

struct TestGateway {
    app: axum::Router,
    ledger: LedgerStore,
    _dir: tempfile::TempDir,
}

async fn gateway(upstream: &MockServer) -> TestGateway {
    let dir = tempfile::tempdir().expect("tempdir");
    let ledger = LedgerStore::new(dir.path().join("tokencap.db"));
    ledger.init().await.expect("init ledger");

    let config = GatewayConfig {
        openai_api_key: Some("sk-test".to_string()),
        anthropic_api_key: Some("sk-ant-test".to_string()),
        openai_base_url: upstream.base_url(),
        anthropic_base_url: upstream.base_url(),
        ..GatewayConfig::default()
    };
    let state = AppState::new(config, ledger.clone()).expect("state");
    TestGateway {
        app: tokencap::router(state),
        ledger,
        _dir: dir,
    }
}

const ANTHROPIC_STREAM: &str = "event: message_start\n\
data: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_1\",\"usage\":{\"input_tokens\":200,\"output_tokens\":1}}}\n\
\n\
event: content_block_delta\n\
data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Hello\"}}\n\
\n\
event: message_delta\n\
data: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"end_turn\"},\"usage\":{\"output_tokens\":150}}\n\
\n\
event: message_stop\n\
data: {\"type\":\"message_stop\"}\n\
\n";

#[tokio::test]
async fn anthropic_stream_is_forwarded_verbatim_and_charged_at_close() {
    let upstream = MockServer::start();
    let mock = upstream.mock(|when, then| {
        when.method(POST).path("/v1/messages");
        then.status(200)
            .header("content-type", "text/event-stream")
            .body(ANTHROPIC_STREAM);
    });
    let gateway = gateway(&upstream).await;

    let payload = json!({
        "model": "claude-3-5-sonnet-latest",
        "max_tokens": 1024,
        "stream": true,
        "messages": [{"role": "user", "content": "hi"}],
    });
    let request = Request::builder()
        .method("POST")
        .uri("/v1/messages")
        .header("content-type", "application/json")
        .header("x-tokencap-project-id", "ps")
        .body(Body::from(payload.to_string()))
        .unwrap();
    let response = gateway.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Streaming responses carry the estimate headers only.
    assert!(response.headers().contains_key("x-tokencap-request-id"));
    assert!(response.headers().contains_key("x-tokencap-estimated-cost-usd"));
    assert!(!response.headers().contains_key("x-tokencap-cost-usd"));
    assert!(!response.headers().contains_key("x-tokencap-budget-remaining"));
    assert_eq!(
        response
            .headers()
            .get("content-type")
            .and_then(|value| value.to_str().ok()),
        Some("text/event-stream")
    );

    // Byte-identical passthrough.
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(body.as_ref(), ANTHROPIC_STREAM.as_bytes());
    mock.assert();

    let records = gateway.ledger.recent_usage("ps", 10).await.expect("recent");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].input_tokens, 200);
    assert_eq!(records[0].output_tokens, 150);
    assert!(!records[0].estimated);
    // 200 * $3/M + 150 * $15/M.
    assert!((records[0].cost_usd - 0.00285).abs() < 1e-12);

    let summary = gateway.ledger.usage_summary("ps").await.expect("summary");
    assert!((summary.total_cost_usd - 0.00285).abs() < 1e-12);
}

#[tokio::test]
async fn openai_stream_without_usage_counts_deltas_and_flags_the_record() {
    let upstream = MockServer::start();
    let stream_body = "data: {\"id\":\"c1\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Hello\"}}]}\n\n\
data: {\"id\":\"c1\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\" world\"}}]}\n\n\
data: [DONE]\n\n";
    upstream.mock(|when, then| {
        when.method(POST).path("/v1/chat/completions");
        then.status(200)
            .header("content-type", "text/event-stream")
            .body(stream_body);
    });
    let gateway = gateway(&upstream).await;

    let payload = json!({
        "model": "gpt-4o-mini",
        "stream": true,
        "messages": [{"role": "user", "content": "hi"}],
    });
    let request = Request::builder()
        .method("POST")
        .uri("/v1/chat/completions")
        .header("content-type", "application/json")
        .header("x-tokencap-project-id", "po")
        .body(Body::from(payload.to_string()))
        .unwrap();
    let response = gateway.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let input_estimate: u64 = response
        .headers()
        .get("x-tokencap-input-tokens")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse().ok())
        .expect("input tokens header");

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(body.as_ref(), stream_body.as_bytes());

    let records = gateway.ledger.recent_usage("po", 10).await.expect("recent");
    assert_eq!(records.len(), 1);
    // No usage reported: input falls back to the estimate, output to the
    // BPE-summed delta tokens, and the record is flagged.
    assert!(records[0].estimated);
    assert_eq!(records[0].input_tokens, input_estimate);
    assert!(records[0].output_tokens >= 2);
}

#[tokio::test]
async fn openai_stream_with_reported_usage_prefers_it() {
    let upstream = MockServer::start();
    let stream_body = "data: {\"id\":\"c1\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Hi\"}}]}\n\n\
data: {\"id\":\"c1\",\"choices\":[],\"usage\":{\"prompt_tokens\":40,\"completion_tokens\":9}}\n\n\
data: [DONE]\n\n";
    upstream.mock(|when, then| {
        when.method(POST).path("/v1/chat/completions");
        then.status(200)
            .header("content-type", "text/event-stream")
            .body(stream_body);
    });
    let gateway = gateway(&upstream).await;

    let payload = json!({
        "model": "gpt-4o-mini",
        "stream": true,
        "stream_options": {"include_usage": true},
        "messages": [{"role": "user", "content": "hi"}],
    });
    let request = Request::builder()
        .method("POST")
        .uri("/v1/chat/completions")
        .header("content-type", "application/json")
        .header("x-tokencap-project-id", "pu")
        .body(Body::from(payload.to_string()))
        .unwrap();
    let response = gateway.app.clone().oneshot(request).await.unwrap();
    let _ = to_bytes(response.into_body(), usize::MAX).await.unwrap();

    let records = gateway.ledger.recent_usage("pu", 10).await.expect("recent");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].input_tokens, 40);
    assert_eq!(records[0].output_tokens, 9);
    assert!(!records[0].estimated);
}

#[tokio::test]
async fn streaming_upstream_non_2xx_is_proxied_without_charge() {
    let upstream = MockServer::start();
    upstream.mock(|when, then| {
        when.method(POST).path("/v1/messages");
        then.status(529)
            .header("content-type", "application/json")
            .body(r#"{"type":"error","error":{"type":"overloaded_error"}}"#);
    });
    let gateway = gateway(&upstream).await;

    let payload = json!({
        "model": "claude-3-5-sonnet-latest",
        "max_tokens": 64,
        "stream": true,
        "messages": [{"role": "user", "content": "hi"}],
    });
    let request = Request::builder()
        .method("POST")
        .uri("/v1/messages")
        .header("content-type", "application/json")
        .header("x-tokencap-project-id", "pe")
        .body(Body::from(payload.to_string()))
        .unwrap();
    let response = gateway.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status().as_u16(), 529);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(
        body.as_ref(),
        br#"{"type":"error","error":{"type":"overloaded_error"}}"#
    );

    let summary = gateway.ledger.usage_summary("pe").await.expect("summary");
    assert_eq!(summary.total_requests, 0);
}

#[tokio::test]
async fn stream_without_any_usage_charges_estimate_input_and_zero_output() {
    let upstream = MockServer::start();
    let stream_body = "event: ping\ndata: {\"type\":\"ping\"}\n\n";
    upstream.mock(|when, then| {
        when.method(POST).path("/v1/messages");
        then.status(200)
            .header("content-type", "text/event-stream")
            .body(stream_body);
    });
    let gateway = gateway(&upstream).await;

    let payload = json!({
        "model": "claude-3-5-haiku-latest",
        "max_tokens": 64,
        "stream": true,
        "messages": [{"role": "user", "content": "hi"}],
    });
    let request = Request::builder()
        .method("POST")
        .uri("/v1/messages")
        .header("content-type", "application/json")
        .header("x-tokencap-project-id", "pz")
        .body(Body::from(payload.to_string()))
        .unwrap();
    let response = gateway.app.clone().oneshot(request).await.unwrap();
    let input_estimate: u64 = response
        .headers()
        .get("x-tokencap-input-tokens")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse().ok())
        .expect("input tokens header");
    let _ = to_bytes(response.into_body(), usize::MAX).await.unwrap();

    let records = gateway.ledger.recent_usage("pz", 10).await.expect("recent");
    assert_eq!(records.len(), 1);
    assert!(records[0].estimated);
    assert_eq!(records[0].input_tokens, input_estimate);
    assert_eq!(records[0].output_tokens, 0);
}
