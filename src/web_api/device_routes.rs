//! Device API Routes
//!
//! デバイス登録・削除・再照会のHTTPエンドポイント

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;

use crate::error::{Error, Result};
use crate::models::ApiResponse;
use crate::onvif_client::DeviceConfig;
use crate::profile_registry::DeviceSummary;
use crate::state::AppState;

/// GET /api/devices
/// 登録済みデバイス一覧（可用性・PTZプロファイル数つき）
pub async fn list_devices(State(state): State<AppState>) -> impl IntoResponse {
    let devices = state.registry.list_devices().await;
    Json(ApiResponse::success(devices))
}

/// POST /api/devices
/// デバイス登録と初回refresh
pub async fn create_device(
    State(state): State<AppState>,
    Json(config): Json<DeviceConfig>,
) -> Result<impl IntoResponse> {
    let device_id = config.device_id.clone();
    state.registry.add_device(config).await?;

    // 初回refreshの失敗で登録は取り消さない。到達できないだけなら
    // バックグラウンドループが拾い直す
    if let Err(e) = state.registry.refresh(&device_id).await {
        tracing::warn!(device_id = %device_id, error = %e, "initial refresh failed");
    }

    let summary = find_summary(&state, &device_id).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(summary))))
}

/// DELETE /api/devices/:id
/// デバイス削除（プリセット帳とノードロックも破棄）
pub async fn delete_device(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    state.registry.remove_device(&id).await?;
    Ok(Json(json!({"ok": true})))
}

/// POST /api/devices/:id/refresh
/// プロファイル/ノード構成の再照会
pub async fn refresh_device(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    state.registry.refresh(&id).await?;
    let summary = find_summary(&state, &id).await?;
    Ok(Json(ApiResponse::success(summary)))
}

async fn find_summary(state: &AppState, device_id: &str) -> Result<DeviceSummary> {
    state
        .registry
        .list_devices()
        .await
        .into_iter()
        .find(|d| d.device_id == device_id)
        .ok_or_else(|| Error::NotFound(format!("device {} not registered", device_id)))
}
