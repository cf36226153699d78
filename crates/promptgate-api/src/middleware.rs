//! HTTP middleware
use tower_http::cors::CorsLayer;

/// Agents call from arbitrary local tooling, so every origin is allowed
pub fn cors() -> CorsLayer {
    CorsLayer::permissive()
}
