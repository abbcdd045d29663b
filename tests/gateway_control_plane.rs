use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::util::ServiceExt;

use tokencap::{AppState, GatewayConfig, LedgerStore, UsageCharge};

struct TestGateway {
    app: axum::Router,
    ledger: LedgerStore,
    _dir: tempfile::TempDir,
}

async fn gateway() -> TestGateway {
    let dir = tempfile::tempdir().expect("tempdir");
    let ledger = LedgerStore::new(dir.path().join("tokencap.db"));
    ledger.init().await.expect("init ledger");
    let state = AppState::new(GatewayConfig::default(), ledger.clone()).expect("state");
    TestGateway {
        app: tokencap::router(state),
        ledger,
        _dir: dir,
    }
}

async fn send(gateway: &TestGateway, request: Request<Body>) -> (StatusCode, Value) {
    let response = gateway.app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let parsed = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or(Value::Null)
    };
    (status, parsed)
}

fn post_json(uri: &str, payload: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn charge(project: &str, request_id: &str, cost: f64) -> UsageCharge {
    UsageCharge {
        project_id: project.to_string(),
        provider: "openai".to_string(),
        model_id: "gpt-4o-mini".to_string(),
        input_tokens: 10,
        output_tokens: 5,
        cost_usd: cost,
        request_id: request_id.to_string(),
        estimated: false,
    }
}

#[tokio::test]
async fn health_and_metrics_respond() {
    let gateway = gateway().await;

    let (status, body) = send(&gateway, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = send(&gateway, get("/metrics")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["requests"], 0);
}

#[tokio::test]
async fn budget_crud_round_trip() {
    let gateway = gateway().await;

    let (status, body) = send(
        &gateway,
        post_json("/v1/budget", &json!({"projectId": "p1", "limitUsd": 5.0})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["projectId"], "p1");
    assert_eq!(body["limitUsd"], 5.0);
    assert_eq!(body["spentUsd"], 0.0);
    assert!(body.get("periodEndMs").is_none());

    let (status, body) = send(&gateway, get("/v1/budget?project_id=p1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["limitUsd"], 5.0);

    // Upsert with a period keeps spend, replaces limit and period.
    gateway
        .ledger
        .record_usage(charge("p1", "r1", 1.25))
        .await
        .expect("charge");
    let (status, body) = send(
        &gateway,
        post_json(
            "/v1/budget",
            &json!({"projectId": "p1", "limitUsd": 10.0, "periodDays": 30}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["limitUsd"], 10.0);
    assert_eq!(body["spentUsd"], 1.25);
    assert!(body["periodEndMs"].as_u64().is_some());

    let delete = Request::builder()
        .method("DELETE")
        .uri("/v1/budget?project_id=p1")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&gateway, delete).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(&gateway, get("/v1/budget?project_id=p1")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["type"], "not_found");
}

#[tokio::test]
async fn invalid_budget_payloads_are_rejected() {
    let gateway = gateway().await;

    let (status, body) = send(
        &gateway,
        post_json("/v1/budget", &json!({"projectId": "p1", "limitUsd": -1.0})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["type"], "invalid_request");

    let (status, _) = send(
        &gateway,
        post_json("/v1/budget", &json!({"projectId": "  ", "limitUsd": 1.0})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &gateway,
        post_json(
            "/v1/budget",
            &json!({"projectId": "p1", "limitUsd": 1.0, "periodDays": 0}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn reset_cycle_zeroes_spend_but_keeps_history() {
    let gateway = gateway().await;

    send(
        &gateway,
        post_json("/v1/budget", &json!({"projectId": "p4", "limitUsd": 10.0})),
    )
    .await;
    for (i, cost) in [1.0, 1.5, 0.5].iter().enumerate() {
        gateway
            .ledger
            .record_usage(charge("p4", &format!("r{i}"), *cost))
            .await
            .expect("charge");
    }

    let (status, body) = send(&gateway, get("/v1/budget?project_id=p4")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["spentUsd"], 3.0);

    let (status, body) = send(
        &gateway,
        post_json("/v1/budget/reset?project_id=p4", &json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["spentUsd"], 0.0);

    // Historical records survive the reset.
    let (status, body) = send(&gateway, get("/v1/usage?project_id=p4")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalCostUsd"], 3.0);
    assert_eq!(body["totalRequests"], 3);
    assert_eq!(body["budget"]["spentUsd"], 0.0);

    let (status, body) = send(
        &gateway,
        post_json("/v1/budget/reset?project_id=missing", &json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["type"], "not_found");
}

#[tokio::test]
async fn usage_summary_and_history_answer_by_project() {
    let gateway = gateway().await;

    for i in 0..4 {
        gateway
            .ledger
            .record_usage(charge("pa", &format!("a{i}"), 0.25))
            .await
            .expect("charge");
    }
    gateway
        .ledger
        .record_usage(charge("pb", "b0", 9.0))
        .await
        .expect("charge");

    let (status, body) = send(&gateway, get("/v1/usage?project_id=pa")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["projectId"], "pa");
    assert_eq!(body["totalRequests"], 4);
    assert_eq!(body["totalCostUsd"], 1.0);
    assert!(body.get("budget").is_none());

    let (status, body) = send(&gateway, get("/v1/usage/history?project_id=pa&limit=2")).await;
    assert_eq!(status, StatusCode::OK);
    let records = body.as_array().expect("array");
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["requestId"], "a3");
    assert_eq!(records[1]["requestId"], "a2");

    // The project header wins over the query string.
    let request = Request::builder()
        .method("GET")
        .uri("/v1/usage?project_id=pa")
        .header("x-tokencap-project-id", "pb")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&gateway, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["projectId"], "pb");
    assert_eq!(body["totalCostUsd"], 9.0);
}
