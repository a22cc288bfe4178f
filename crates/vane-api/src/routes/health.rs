//! Health check endpoint — for load balancers, monitoring, and Docker health checks.

use axum::{routing::get, Json, Router};
use serde::Serialize;
use std::sync::Arc;

use crate::AppState;

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

/// Health check router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(health_check))
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy".into(), version: env!("CARGO_PKG_VERSION").to_string() })
}
