//! API Routes

use axum::{
    extract::State,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};

use crate::models::ApiResponse;
use crate::state::AppState;

use super::{device_routes, ptz_routes};

/// Create API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health & Status
        .route("/healthz", get(super::health_check))
        .route("/api/status", get(super::service_status))
        // Devices
        .route("/api/devices", get(device_routes::list_devices))
        .route("/api/devices", post(device_routes::create_device))
        .route("/api/devices/:id", delete(device_routes::delete_device))
        .route("/api/devices/:id/refresh", post(device_routes::refresh_device))
        // Targets（PTZコントロール面の列挙とステータス）
        .route("/api/targets", get(list_targets))
        .route(
            "/api/targets/:device_id/:profile_token/ptz/status",
            get(ptz_routes::ptz_status),
        )
        // PTZ command surface
        .route("/api/ptz/:operation", post(ptz_routes::dispatch_command))
        .with_state(state)
}

// ========================================
// Target Handlers
// ========================================

/// GET /api/targets
/// ノード束縛のある(デバイス, プロファイル)の全組を返す
async fn list_targets(State(state): State<AppState>) -> impl IntoResponse {
    let targets = state.registry.addressable().await;
    Json(ApiResponse::success(targets))
}
