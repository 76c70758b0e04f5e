//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

struct TestServer {
    app: axum::Router,
    runtime: api::DefaultRuntime,
}

fn setup() -> TestServer {
    let config = api::config::Config::default();
    let (state, runtime) = api::create_default_state(&config);
    runtime.pool.start();
    let app = api::create_app(state, get_metrics_handle());
    TestServer { app, runtime }
}

async fn send(app: &axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

/// POST with the default operator bearer token attached.
fn post_json_as_operator(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("authorization", "Bearer optok_dev")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

fn get_req(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn create_checkout(server: &TestServer, amount_cents: i64) -> Value {
    let (status, body) = send(
        &server.app,
        post_json(
            "/transactions",
            json!({
                "user_id": Uuid::new_v4(),
                "target_type": "invoice",
                "target_id": Uuid::new_v4(),
                "amount_cents": amount_cents,
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "checkout failed: {body}");
    body
}

/// Delivers a signed settlement webhook and waits for the transaction to
/// reach the expected status.
async fn settle(server: &TestServer, tx_id: &str, event_id: &str, event_type: &str) {
    let (_, tx) = send(&server.app, get_req(&format!("/transactions/{tx_id}"))).await;
    assert_eq!(tx["status"], "pending");

    // The fake provider's intent references are derivable from the id.
    let reference = format!("pi_{}", tx_id.replace('-', ""));
    let body = serde_json::to_vec(&json!({
        "id": event_id,
        "type": event_type,
        "data": {"object": {"id": reference}}
    }))
    .unwrap();
    let signature = server.runtime.provider.sign(&body);

    let request = Request::builder()
        .method("POST")
        .uri("/webhooks/stripe")
        .header("content-type", "application/json")
        .header("webhook-signature", signature)
        .body(Body::from(body))
        .unwrap();
    let (status, ack) = send(&server.app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["received"], true);
}

async fn wait_for_status(server: &TestServer, tx_id: &str, expected: &str) {
    for _ in 0..300 {
        let (_, tx) = send(&server.app, get_req(&format!("/transactions/{tx_id}"))).await;
        if tx["status"] == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("transaction {tx_id} never reached status {expected}");
}

#[tokio::test]
async fn test_health_check() {
    let server = setup();
    let (status, body) = send(&server.app, get_req("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_metrics_endpoint_renders() {
    let server = setup();
    let response = server
        .app
        .clone()
        .oneshot(get_req("/metrics"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_checkout_returns_client_secret() {
    let server = setup();
    let body = create_checkout(&server, 5000).await;

    assert!(body["transaction_id"].as_str().is_some());
    assert!(!body["client_secret"].as_str().unwrap().is_empty());
    assert_eq!(body["capture_mode"], "immediate");

    let tx_id = body["transaction_id"].as_str().unwrap();
    let (status, tx) = send(&server.app, get_req(&format!("/transactions/{tx_id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tx["status"], "pending");
    assert_eq!(tx["amount_cents"], 5000);
    assert_eq!(tx["refunded_cents"], 0);
    // The client secret is never exposed on reads.
    assert!(tx.get("client_secret").is_none());
    assert!(tx.get("provider_secret").is_none());
}

#[tokio::test]
async fn test_checkout_validation_errors() {
    let server = setup();

    let (status, body) = send(
        &server.app,
        post_json(
            "/transactions",
            json!({
                "user_id": Uuid::new_v4(),
                "target_type": "invoice",
                "target_id": Uuid::new_v4(),
                "amount_cents": 0,
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("amount"));

    let (status, body) = send(
        &server.app,
        post_json(
            "/transactions",
            json!({
                "user_id": Uuid::new_v4(),
                "target_type": "mystery",
                "target_id": Uuid::new_v4(),
                "amount_cents": 100,
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("mystery"));
}

#[tokio::test]
async fn test_get_unknown_transaction_is_404() {
    let server = setup();
    let (status, _) = send(
        &server.app,
        get_req(&format!("/transactions/{}", Uuid::new_v4())),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_webhook_settles_and_duplicate_is_absorbed() {
    let server = setup();
    let body = create_checkout(&server, 5000).await;
    let tx_id = body["transaction_id"].as_str().unwrap().to_string();

    settle(&server, &tx_id, "evt_1", "payment.succeeded").await;
    wait_for_status(&server, &tx_id, "succeeded").await;

    // Redelivery of the same event is acknowledged and changes nothing.
    let reference = format!("pi_{}", tx_id.replace('-', ""));
    let raw = serde_json::to_vec(&json!({
        "id": "evt_1",
        "type": "payment.succeeded",
        "data": {"object": {"id": reference}}
    }))
    .unwrap();
    let signature = server.runtime.provider.sign(&raw);
    let request = Request::builder()
        .method("POST")
        .uri("/webhooks/stripe")
        .header("webhook-signature", signature)
        .body(Body::from(raw))
        .unwrap();
    let (status, _) = send(&server.app, request).await;
    assert_eq!(status, StatusCode::OK);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(server.runtime.channel.sent_count().await, 1);
}

#[tokio::test]
async fn test_webhook_with_garbage_body_is_rejected() {
    let server = setup();
    let request = Request::builder()
        .method("POST")
        .uri("/webhooks/stripe")
        .body(Body::from("<xml/>"))
        .unwrap();
    let (status, body) = send(&server.app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("envelope"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_refund_flow_and_over_limit_rejection() {
    let server = setup();
    let body = create_checkout(&server, 5000).await;
    let tx_id = body["transaction_id"].as_str().unwrap().to_string();
    settle(&server, &tx_id, "evt_r", "payment.succeeded").await;
    wait_for_status(&server, &tx_id, "succeeded").await;

    let (status, refund) = send(
        &server.app,
        post_json_as_operator(
            &format!("/transactions/{tx_id}/refunds"),
            json!({"amount_cents": 2000, "reason": "requested by customer"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(refund["amount_cents"], 2000);
    assert_eq!(refund["status"], "pending");

    // More than the remainder is rejected before any job exists.
    let (status, error) = send(
        &server.app,
        post_json_as_operator(
            &format!("/transactions/{tx_id}/refunds"),
            json!({"amount_cents": 4000}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(error["error"].as_str().unwrap().contains("refund"));

    let (status, refunds) = send(
        &server.app,
        get_req(&format!("/transactions/{tx_id}/refunds")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(refunds.as_array().unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_refund_before_settlement_is_conflict() {
    let server = setup();
    let body = create_checkout(&server, 5000).await;
    let tx_id = body["transaction_id"].as_str().unwrap();

    let (status, _) = send(
        &server.app,
        post_json_as_operator(&format!("/transactions/{tx_id}/refunds"), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_refund_requires_operator_token() {
    let server = setup();
    let body = create_checkout(&server, 5000).await;
    let tx_id = body["transaction_id"].as_str().unwrap().to_string();
    settle(&server, &tx_id, "evt_priv", "payment.succeeded").await;
    wait_for_status(&server, &tx_id, "succeeded").await;

    // No token at all.
    let (status, error) = send(
        &server.app,
        post_json(
            &format!("/transactions/{tx_id}/refunds"),
            json!({"amount_cents": 1000}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(error["error"].as_str().unwrap().contains("operator"));

    // A wrong token is no better.
    let request = Request::builder()
        .method("POST")
        .uri(format!("/transactions/{tx_id}/refunds"))
        .header("content-type", "application/json")
        .header("authorization", "Bearer not-the-token")
        .body(Body::from(
            serde_json::to_string(&json!({"amount_cents": 1000})).unwrap(),
        ))
        .unwrap();
    let (status, _) = send(&server.app, request).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Neither attempt created a refund.
    let (_, refunds) = send(
        &server.app,
        get_req(&format!("/transactions/{tx_id}/refunds")),
    )
    .await;
    assert_eq!(refunds.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_discarded_jobs_endpoint_empty() {
    let server = setup();
    let (status, body) = send(&server.app, get_req("/jobs/discarded")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 0);
}
