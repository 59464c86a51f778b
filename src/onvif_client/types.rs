//! ONVIF transport type definitions

use serde::{Deserialize, Serialize};

/// 接続設定（デバイス1台ぶん）
///
/// ONVIFエンドポイントと認証情報。device_idはこのサービス内での
/// 論理名で、プロトコルには送らない。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub device_id: String,
    #[serde(default)]
    pub name: String,
    /// 例: http://192.168.1.100:2020/onvif/device_service
    pub endpoint: String,
    pub username: String,
    pub password: String,
}

/// GetDeviceInformationの結果
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub firmware_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
}

/// GetProfilesで得た1プロファイルぶんの記述
///
/// node_tokenが無いプロファイルはPTZ指令を受けられない。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileDescriptor {
    pub token: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_token: Option<String>,
    /// PTZConfigurationのDefaultPTZTimeout（秒）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_timeout_sec: Option<f64>,
}
