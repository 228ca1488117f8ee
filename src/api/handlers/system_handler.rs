//! System API Handlers
//!
//! Liveness, health, category catalogue and metrics.

use axum::{
    Json,
    extract::State,
    http::{HeaderValue, header},
    response::IntoResponse,
};
use chrono::Utc;

use crate::{
    api::{app_state::AppState, dto::*},
    observability::HealthStatus,
};

const ROOT_MESSAGE: &str = "BOQMate API is running";

/// GET /
pub async fn root() -> impl IntoResponse {
    Json(RootResponse {
        message: ROOT_MESSAGE.to_string(),
    })
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthStatus {
        status: "healthy".to_string(),
        timestamp: Utc::now().to_rfc3339(),
        version: state.version.clone(),
        uptime_seconds: state.uptime_seconds(),
        blocked_identities: state.pipeline.block_list().len(),
    })
}

/// GET /api/categories
pub async fn list_categories() -> impl IntoResponse {
    Json(CONSTRUCTION_CATEGORIES)
}

/// GET /metrics
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; version=0.0.4"),
        )],
        state.pipeline.metrics().gather(),
    )
}
