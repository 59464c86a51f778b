//! WebAPI - REST API Endpoints
//!
//! ## Responsibilities
//!
//! - HTTP API routes
//! - Request validation
//! - Response formatting

mod device_routes;
mod ptz_routes;
mod routes;

pub use routes::create_router;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::models::{HealthResponse, StatusResponse};
use crate::state::AppState;

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let (devices_total, devices_available) = state.registry.counts().await;
    let addressable_targets = state.registry.addressable().await.len();

    let response = HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_sec: (chrono::Utc::now() - state.started_at).num_seconds().max(0) as u64,
        devices_total,
        devices_available,
        addressable_targets,
    };

    Json(response)
}

/// Status endpoint
pub async fn service_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(StatusResponse {
        service: "ptz-tower".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        started_at: state.started_at,
    })
}
