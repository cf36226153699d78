//! API Handlers
use crate::{metrics, AppState};
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use promptgate_core::{ExecutionContext, InjectionType, ParsedCommand, PipelineError, StageError, PROMPTGATE_VERSION};
use promptgate_injection::InjectionRule;
use serde_json::{json, Value};

pub async fn execute(State(state): State<AppState>, Json(command): Json<ParsedCommand>) -> (StatusCode, Json<Value>) {
    let ctx = ExecutionContext::new(command);
    let request_id = ctx.request_id.clone();

    match state.pipeline.execute(ctx).await {
        Ok(response) => {
            state.metrics.observe_response(&response);
            tracing::info!(
                request_id = %response.request_id,
                status = ?response.status,
                "request executed"
            );
            match serde_json::to_value(&response) {
                Ok(body) => (StatusCode::OK, Json(body)),
                Err(e) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "request_id": request_id, "error": e.to_string() })),
                ),
            }
        }
        Err(err) => {
            state.metrics.observe_failure(err.stage(), err.metrics());
            (failure_status(&err), Json(failure_body(&request_id, &err)))
        }
    }
}

fn failure_status(err: &PipelineError) -> StatusCode {
    match err {
        PipelineError::StageFailed {
            source: StageError::ValidationFailed(_),
            ..
        } => StatusCode::UNPROCESSABLE_ENTITY,
        PipelineError::StageFailed {
            source: StageError::Collaborator(_),
            ..
        } => StatusCode::BAD_GATEWAY,
        PipelineError::StageFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn failure_body(request_id: &str, err: &PipelineError) -> Value {
    json!({
        "request_id": request_id,
        "stage": err.stage(),
        "error": err.to_string(),
        "diagnostics": err.diagnostics(),
        "stages": err.metrics(),
    })
}

pub async fn list_stages(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let stages: Vec<Value> = state
        .pipeline
        .stage_ids()
        .into_iter()
        .filter_map(|id| state.pipeline.get_stage(id))
        .map(|stage| json!({ "id": stage.id(), "description": stage.description() }))
        .collect();

    (
        StatusCode::OK,
        Json(json!({ "pipeline_id": state.pipeline.pipeline_id(), "stages": stages })),
    )
}

pub async fn list_overrides(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!(state.services.injection.runtime_overrides())))
}

pub async fn set_override(
    State(state): State<AppState>,
    Path(injection_type): Path<String>,
    Json(rule): Json<InjectionRule>,
) -> (StatusCode, Json<Value>) {
    let injection_type = match injection_type.parse::<InjectionType>() {
        Ok(t) => t,
        Err(e) => return (StatusCode::BAD_REQUEST, Json(json!({ "error": e }))),
    };

    tracing::info!(injection_type = %injection_type, "runtime override set");
    state.services.injection.set_runtime_override(injection_type, rule.clone());
    (
        StatusCode::OK,
        Json(json!({ "injection_type": injection_type, "rule": rule })),
    )
}

pub async fn clear_override(
    State(state): State<AppState>,
    Path(injection_type): Path<String>,
) -> (StatusCode, Json<Value>) {
    let injection_type = match injection_type.parse::<InjectionType>() {
        Ok(t) => t,
        Err(e) => return (StatusCode::BAD_REQUEST, Json(json!({ "error": e }))),
    };

    match state.services.injection.clear_runtime_override(injection_type) {
        Some(rule) => {
            tracing::info!(injection_type = %injection_type, "runtime override cleared");
            (
                StatusCode::OK,
                Json(json!({ "injection_type": injection_type, "rule": rule })),
            )
        }
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("no runtime override for {}", injection_type) })),
        ),
    }
}

pub async fn injection_stats(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!(state.services.injection.stats())))
}

pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "version": PROMPTGATE_VERSION,
            "config_fingerprint": state.services.config_fingerprint(),
        })),
    )
}

pub async fn metrics(State(state): State<AppState>) -> Response {
    match metrics::encode(state.metrics.registry()) {
        Ok(text) => ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], text).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}
