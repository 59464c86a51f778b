//! ONVIF Transport Module
//!
//! PTZ指令と能力照会のプロトコル面。上位層はPtzTransportトレイト
//! 越しにだけ触り、SOAPの組み立てとXML解釈はこの中に閉じる。

pub mod client;
pub mod soap;
pub mod types;
pub mod xml;

use async_trait::async_trait;

use crate::capability::PtzNode;
use crate::error::Result;
use crate::ptz_vector::{MotionVector, SpeedVector};

pub use client::OnvifPtzClient;
pub use types::{DeviceConfig, DeviceInfo, ProfileDescriptor};

/// PTZトランスポート
///
/// 1メソッド=1プロトコル呼び出し。リトライはどの実装も行わない
/// （PTZ指令は再送で結果が変わる）。
#[async_trait]
pub trait PtzTransport: Send + Sync {
    /// デバイスのプロファイル一覧を照会
    async fn get_profiles(&self, device: &DeviceConfig) -> Result<Vec<ProfileDescriptor>>;

    /// PTZノードの能力記述を照会
    async fn get_node(&self, device: &DeviceConfig, node_token: &str) -> Result<PtzNode>;

    /// デバイス基本情報を照会（ベストエフォート）
    async fn get_device_info(&self, device: &DeviceConfig) -> Result<DeviceInfo>;

    async fn relative_move(
        &self,
        device: &DeviceConfig,
        profile_token: &str,
        translation: &MotionVector,
        speed: &SpeedVector,
    ) -> Result<()>;

    async fn absolute_move(
        &self,
        device: &DeviceConfig,
        profile_token: &str,
        position: &MotionVector,
        speed: &SpeedVector,
    ) -> Result<()>;

    async fn continuous_move(
        &self,
        device: &DeviceConfig,
        profile_token: &str,
        velocity: &MotionVector,
        timeout_sec: Option<f64>,
    ) -> Result<()>;

    async fn stop(
        &self,
        device: &DeviceConfig,
        profile_token: &str,
        pan_tilt: bool,
        zoom: bool,
    ) -> Result<()>;

    async fn set_home_position(&self, device: &DeviceConfig, profile_token: &str) -> Result<()>;

    async fn goto_home_position(
        &self,
        device: &DeviceConfig,
        profile_token: &str,
        speed: &SpeedVector,
    ) -> Result<()>;

    async fn set_preset(
        &self,
        device: &DeviceConfig,
        profile_token: &str,
        preset_id: &str,
        name: Option<&str>,
    ) -> Result<()>;

    async fn goto_preset(
        &self,
        device: &DeviceConfig,
        profile_token: &str,
        preset_id: &str,
        speed: &SpeedVector,
    ) -> Result<()>;
}
