//! PTZ API Routes
//!
//! PTZ操作のHTTP APIエンドポイント

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::capability::PtzNode;
use crate::command_translator::PtzParams;
use crate::error::{Error, Result};
use crate::models::{ApiResponse, PtzOperation};
use crate::profile_registry::{Preset, TargetSelector};
use crate::ptz_vector::parse_number;
use crate::state::AppState;

/// 境界で許すtimeoutの上限（秒）。ノードごとの上限とは別の一律チェック
const TIMEOUT_BOUNDARY_MAX_SEC: f64 = 100.0;

/// ディスパッチ要求ボディ
#[derive(Debug, Default, Deserialize)]
pub struct DispatchRequest {
    /// 省略時は"all"（全アドレス可能ターゲット）
    #[serde(default)]
    pub targets: TargetSelector,
    #[serde(default)]
    pub params: PtzParams,
}

/// POST /api/ptz/:operation
/// 論理PTZ指令を解決された全ターゲットへ配送
pub async fn dispatch_command(
    State(state): State<AppState>,
    Path(operation): Path<String>,
    Json(request): Json<DispatchRequest>,
) -> Result<impl IntoResponse> {
    let op = PtzOperation::parse(&operation)
        .ok_or_else(|| Error::Validation(format!("unknown PTZ operation: {}", operation)))?;
    reject_out_of_bounds_timeout(&request.params)?;

    let outcome = state
        .orchestrator
        .dispatch(op, &request.targets, &request.params)
        .await?;

    if outcome.ok {
        Ok(Json(ApiResponse::success(outcome)).into_response())
    } else {
        // 全ターゲット失敗はHTTPレベルでも失敗。診断はdataに全件残す
        let body = ApiResponse {
            ok: false,
            data: Some(outcome),
            error: Some("all targets failed".to_string()),
        };
        Ok((StatusCode::BAD_GATEWAY, Json(body)).into_response())
    }
}

/// timeoutが[0,100]の外なら翻訳層に渡す前に拒否する
fn reject_out_of_bounds_timeout(params: &PtzParams) -> Result<()> {
    if let Some(t) = parse_number(params.timeout.as_ref(), "params", "timeout")? {
        if !(0.0..=TIMEOUT_BOUNDARY_MAX_SEC).contains(&t) {
            return Err(Error::Validation(format!(
                "timeout must be within [0, {}], got {}",
                TIMEOUT_BOUNDARY_MAX_SEC, t
            )));
        }
    }
    Ok(())
}

/// ターゲットのPTZステータス
#[derive(Debug, Serialize)]
pub struct TargetStatus {
    pub entity_id: String,
    pub device_id: String,
    pub profile_token: String,
    /// 能力フラグと空間境界
    pub node: PtzNode,
    /// このサービスが開始した連続移動が進行中か
    pub is_moving: bool,
    pub known_presets: Vec<Preset>,
}

/// GET /api/targets/:device_id/:profile_token/ptz/status
/// 能力フラグ・既知プリセット・is_movingの取得
pub async fn ptz_status(
    State(state): State<AppState>,
    Path((device_id, profile_token)): Path<(String, String)>,
) -> Result<impl IntoResponse> {
    let entity_id = format!("{}/{}", device_id, profile_token);
    let target = state.registry.resolve_entity(&entity_id).await?;
    let node_key = target.node_key();

    Ok(Json(ApiResponse::success(TargetStatus {
        entity_id,
        device_id,
        profile_token,
        node: (*target.node).clone(),
        is_moving: state.orchestrator.is_moving(&node_key).await,
        known_presets: state.registry.known_presets(&node_key).await,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_timeout_boundary() {
        let mut params = PtzParams::default();
        assert!(reject_out_of_bounds_timeout(&params).is_ok());

        params.timeout = Some(json!(0));
        assert!(reject_out_of_bounds_timeout(&params).is_ok());
        params.timeout = Some(json!(100));
        assert!(reject_out_of_bounds_timeout(&params).is_ok());

        params.timeout = Some(json!(100.5));
        assert!(matches!(
            reject_out_of_bounds_timeout(&params),
            Err(Error::Validation(_))
        ));
        params.timeout = Some(json!(-1));
        assert!(reject_out_of_bounds_timeout(&params).is_err());

        // 数値として読めないtimeoutも境界で弾く
        params.timeout = Some(json!("soon"));
        assert!(reject_out_of_bounds_timeout(&params).is_err());
    }

    #[test]
    fn test_dispatch_request_defaults_to_all_targets() {
        let req: DispatchRequest = serde_json::from_str("{}").unwrap();
        assert!(matches!(req.targets, TargetSelector::Keyword(ref k) if k == "all"));

        let req: DispatchRequest =
            serde_json::from_str(r#"{"targets": {"entities": ["cam-a/profile_1"]}}"#).unwrap();
        assert!(matches!(req.targets, TargetSelector::Entities { ref entities }
            if entities == &["cam-a/profile_1".to_string()]));

        let req: DispatchRequest =
            serde_json::from_str(r#"{"targets": {"device": "cam-a"}}"#).unwrap();
        assert!(matches!(req.targets, TargetSelector::Device { ref device } if device == "cam-a"));
    }
}
