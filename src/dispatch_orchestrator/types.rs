//! DispatchOrchestrator 型定義

use serde::Serialize;

use crate::command_translator::EffectiveParams;
use crate::models::PtzOperation;
use crate::profile_registry::DroppedTarget;

/// 1ターゲットぶんの実行結果
#[derive(Debug, Clone, Serialize)]
pub struct TargetOutcome {
    /// `device_id/profile_token`
    pub entity: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// 実際にワイヤへ送った値（クランプ/補完込み）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effective: Option<EffectiveParams>,
}

impl TargetOutcome {
    pub fn success(entity: String, effective: EffectiveParams) -> Self {
        Self {
            entity,
            ok: true,
            error_code: None,
            message: None,
            effective: Some(effective),
        }
    }

    pub fn failure(entity: String, error: &crate::error::Error) -> Self {
        Self {
            entity,
            ok: false,
            error_code: Some(error.code().to_string()),
            message: Some(error.to_string()),
            effective: None,
        }
    }
}

/// ファンアウト1回ぶんの集約結果
///
/// 部分成功は成功。okがfalseになるのは全ターゲット失敗のときだけで、
/// その場合も診断はresultsに全件残る。
#[derive(Debug, Clone, Serialize)]
pub struct DispatchOutcome {
    pub dispatch_id: String,
    pub operation: PtzOperation,
    pub ok: bool,
    pub success_count: usize,
    pub failure_count: usize,
    /// 解決順を保ったターゲット別結果
    pub results: Vec<TargetOutcome>,
    /// 解決時点で外れたエンティティの診断
    pub dropped: Vec<DroppedTarget>,
}
