//! Routes exercised in-process through `tower::ServiceExt::oneshot`.

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use promptgate_api::{create_app, AppState};
use promptgate_policy::GateDefinition;
use promptgate_stages::{PipelineServices, PromptEntry, ServerConfig};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn app() -> Router {
    let mut config = ServerConfig::default();
    config
        .gates
        .definitions
        .push(GateDefinition::new("accuracy").with_criterion("Figures are correct"));
    config.prompts.insert(
        "report".to_string(),
        PromptEntry {
            text: "Write the report.".to_string(),
            gates: vec!["accuracy".to_string()],
            ..Default::default()
        },
    );
    let services = Arc::new(PipelineServices::from_config(config).unwrap());
    create_app(AppState::new(services).unwrap())
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    let request = match body {
        Some(body) => request.body(Body::from(body.to_string())).unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn test_execute_returns_review_prompt_then_passes() {
    let app = app();

    let (status, first) = send(&app, Method::POST, "/v1/execute", Some(json!({ "prompt_id": "report" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["status"], "awaiting-review");
    assert!(first["content"].as_str().unwrap().contains("Figures are correct"));

    let session = first["session_id"].as_str().unwrap().to_string();
    let (status, second) = send(
        &app,
        Method::POST,
        "/v1/execute",
        Some(json!({
            "prompt_id": "report",
            "session_id": session,
            "gate_verdict": "GATE_REVIEW: PASS - all figures checked",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["status"], "completed");
}

#[tokio::test]
async fn test_validation_failure_is_unprocessable() {
    let app = app();
    let (status, body) = send(&app, Method::POST, "/v1/execute", Some(json!({}))).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["stage"], "command.validate");
    assert!(body["diagnostics"]
        .as_array()
        .unwrap()
        .iter()
        .any(|d| d["code"] == "STAGE_FAILED"));
}

#[tokio::test]
async fn test_empty_session_id_is_unprocessable() {
    let app = app();
    let (status, body) = send(
        &app,
        Method::POST,
        "/v1/execute",
        Some(json!({ "prompt_id": "report", "session_id": "" })),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["stage"], "command.validate");
}

#[tokio::test]
async fn test_runtime_override_roundtrip() {
    let app = app();

    let (status, _) = send(
        &app,
        Method::PUT,
        "/v1/injection/overrides/system-prompt",
        Some(json!({ "enabled": false })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, listed) = send(&app, Method::GET, "/v1/injection/overrides", None).await;
    assert_eq!(listed["system-prompt"]["enabled"], false);

    let (status, _) = send(&app, Method::DELETE, "/v1/injection/overrides/system-prompt", None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, Method::DELETE, "/v1/injection/overrides/system-prompt", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unknown_injection_type_is_bad_request() {
    let app = app();
    let (status, body) = send(&app, Method::PUT, "/v1/injection/overrides/banner", Some(json!({}))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("banner"));
}

#[tokio::test]
async fn test_stages_and_health() {
    let app = app();

    let (_, stages) = send(&app, Method::GET, "/v1/stages", None).await;
    let ids: Vec<&str> = stages["stages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids.len(), 9);
    assert_eq!(ids[5], "gates.review");

    let (status, health) = send(&app, Method::GET, "/v1/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "ok");
    assert!(health["config_fingerprint"].as_str().unwrap().starts_with("blake3:"));
}

#[tokio::test]
async fn test_metrics_count_executed_requests() {
    let app = app();
    send(&app, Method::POST, "/v1/execute", Some(json!({ "prompt_id": "report" }))).await;

    let request = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();

    assert!(text.contains("promptgate_requests_total{status=\"awaiting-review\"} 1"));
}
