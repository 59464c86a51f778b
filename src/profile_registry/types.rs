//! ProfileRegistry data types

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::capability::PtzNode;
use crate::onvif_client::{DeviceConfig, DeviceInfo};

/// デバイス1台ぶんのプロファイル記載
///
/// nodeがNoneのプロファイルはPTZ指令を受けられない（登録はするが
/// アドレス可能集合には入れない）。
#[derive(Debug, Clone)]
pub struct ProfileEntry {
    pub profile_token: String,
    pub profile_name: String,
    pub node: Option<Arc<PtzNode>>,
}

/// Immutable per-device snapshot
///
/// refreshのたびに丸ごと作り直してArcを差し替える。差し替え前に
/// 取得済みのArcは進行中のディスパッチ側で有効なまま。
#[derive(Debug)]
pub struct DeviceSnapshot {
    pub info: DeviceInfo,
    pub profiles: Vec<ProfileEntry>,
    pub refreshed_at: DateTime<Utc>,
}

/// 既知プリセット1件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preset {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Caller-supplied target selection
///
/// - `"all"`: アドレス可能な全ターゲット
/// - `{"device": "<device_id>"}`: 1デバイスの全PTZプロファイル
/// - `{"entities": ["<device_id>/<profile_token>", ...]}`: 明示列挙（順序保持）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TargetSelector {
    Keyword(String),
    Device { device: String },
    Entities { entities: Vec<String> },
}

impl Default for TargetSelector {
    fn default() -> Self {
        Self::Keyword("all".to_string())
    }
}

/// Resolved (device, profile) pair, alive for one dispatch only
#[derive(Debug, Clone)]
pub struct CommandTarget {
    pub device: DeviceConfig,
    pub profile_token: String,
    pub profile_name: String,
    /// 解決時点の能力スナップショット
    pub node: Arc<PtzNode>,
}

impl CommandTarget {
    /// エンティティID: device_id/profile_token
    pub fn entity_id(&self) -> String {
        format!("{}/{}", self.device.device_id, self.profile_token)
    }

    /// ノード直列化キー: device_id/node_token
    pub fn node_key(&self) -> String {
        format!("{}/{}", self.device.device_id, self.node.node_token)
    }
}

/// 解決から外れたエントリの診断
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DroppedTarget {
    pub entity: String,
    pub reason: String,
}

/// resolve()の結果。外れたものは失敗ではなく診断として残る
#[derive(Debug, Default)]
pub struct Resolution {
    pub targets: Vec<CommandTarget>,
    pub dropped: Vec<DroppedTarget>,
}

/// GET /api/devices 用のサマリ
#[derive(Debug, Clone, Serialize)]
pub struct DeviceSummary {
    pub device_id: String,
    pub name: String,
    pub endpoint: String,
    pub available: bool,
    /// ノード束縛のあるプロファイル数
    pub ptz_profile_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<DeviceInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refreshed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// GET /api/targets 用。1エントリ=1コントロール
#[derive(Debug, Clone, Serialize)]
pub struct AddressableTarget {
    pub entity_id: String,
    pub device_id: String,
    pub device_name: String,
    pub profile_token: String,
    pub profile_name: String,
    /// 表示名: "<device name> <profile name> PTZ"
    pub display_name: String,
    pub node: PtzNode,
}
