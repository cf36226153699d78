//! promptgate API /v1: REST endpoints over the standard pipeline
pub mod handlers;
pub mod metrics;
pub mod middleware;

use axum::{
    routing::{get, post, put},
    Router,
};
use metrics::ApiMetrics;
use promptgate_core::PipelineRunner;
use promptgate_stages::{standard_pipeline, PipelineServices};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared handler state; one pipeline serves every request
#[derive(Clone)]
pub struct AppState {
    pub services: Arc<PipelineServices>,
    pub pipeline: Arc<PipelineRunner>,
    pub metrics: Arc<ApiMetrics>,
}

impl AppState {
    pub fn new(services: Arc<PipelineServices>) -> Result<Self, prometheus::Error> {
        Ok(Self {
            pipeline: Arc::new(standard_pipeline(Arc::clone(&services))),
            services,
            metrics: Arc::new(ApiMetrics::new()?),
        })
    }
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/v1/execute", post(handlers::execute))
        .route("/v1/stages", get(handlers::list_stages))
        .route("/v1/injection/overrides", get(handlers::list_overrides))
        .route(
            "/v1/injection/overrides/{injection_type}",
            put(handlers::set_override).delete(handlers::clear_override),
        )
        .route("/v1/injection/stats", get(handlers::injection_stats))
        .route("/v1/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::cors())
        .with_state(state)
}

pub async fn run(addr: &str, state: AppState) -> anyhow::Result<()> {
    let app = create_app(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("promptgate API listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}
