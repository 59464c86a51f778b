//! CommandTranslator type definitions

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ptz_vector::{MotionVector, SpeedVector};

/// 呼び出し側パラメータバッグ（未解析）
///
/// ベクトルキーは操作ごとに排他:
/// translation=相対 / position=絶対 / velocity=連続。
/// 操作が使わないキーが来たらValidationで弾く。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PtzParams {
    pub translation: Option<Value>,
    pub position: Option<Value>,
    pub velocity: Option<Value>,
    pub speed: Option<Value>,
    pub timeout: Option<Value>,
    pub pan_tilt: Option<bool>,
    pub zoom: Option<bool>,
    pub preset: Option<String>,
    pub name: Option<String>,
}

/// 実際にワイヤへ送った実効パラメータ
///
/// 要求値がそのまま通らなかった場合（クランプ、中点補完、タイムアウト
/// 丸め）を呼び出し側に報告する。
#[derive(Debug, Clone, Default, Serialize)]
pub struct EffectiveParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translation: Option<MotionVector>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<MotionVector>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub velocity: Option<MotionVector>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<SpeedVector>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_sec: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pan_tilt: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zoom: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preset: Option<String>,
    /// 要求値のどれかを境界に丸めたか
    pub clamped: bool,
    /// 欠け軸を空間中点で補完したか（絶対移動のみ）
    pub approximated: bool,
}
