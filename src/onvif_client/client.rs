//! ONVIF PTZ Client
//!
//! ONVIFカメラ向けPTZ制御クライアント。メディア/PTZ/デバイス各サービスへ
//! SOAPを直接送る。WS-Security UsernameToken認証を使用。

use async_trait::async_trait;
use reqwest::Client;

use crate::capability::{AxisRange, PtzNode, SpaceBounds, DEFAULT_PTZ_TIMEOUT_SEC};
use crate::error::{Error, Result};
use crate::ptz_vector::{MotionVector, SpeedVector};

use super::soap;
use super::types::{DeviceConfig, DeviceInfo, ProfileDescriptor};
use super::xml::{
    extract_xml_attribute, extract_xml_section, extract_xml_sections, extract_xml_value,
    parse_iso_duration_sec, xml_tag_present,
};
use super::PtzTransport;

/// ONVIF PTZ制御クライアント
pub struct OnvifPtzClient {
    /// HTTPクライアント
    client: Client,
}

impl OnvifPtzClient {
    /// 新規作成
    pub fn new(timeout_sec: u64) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(timeout_sec))
                .build()
                .unwrap_or_default(),
        }
    }

    /// SOAPリクエスト送信。成功時はレスポンスボディを返す
    async fn send_soap(
        &self,
        device: &DeviceConfig,
        url: &str,
        body: &str,
        action: &str,
    ) -> Result<String> {
        let envelope = soap::envelope(
            &soap::security_header(&device.username, &device.password),
            body,
        );

        tracing::debug!(
            device_id = %device.device_id,
            url = %url,
            action = %action,
            "Sending ONVIF request"
        );

        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/soap+xml; charset=utf-8")
            .body(envelope)
            .send()
            .await
            .map_err(|e| {
                Error::Connectivity(format!(
                    "{} to {} failed: {}",
                    action, device.device_id, e
                ))
            })?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        if !status.is_success() {
            tracing::error!(
                device_id = %device.device_id,
                status = %status,
                action = %action,
                "ONVIF request rejected"
            );
            return Err(Error::Transport(format!(
                "ONVIF {} failed with status {}: {}",
                action,
                status,
                fault_reason(&text).unwrap_or_else(|| truncate(&text, 200))
            )));
        }

        // デバイスによってはフォルトを200で返す
        if xml_tag_present(&text, "Fault") {
            let reason = fault_reason(&text).unwrap_or_else(|| "unspecified fault".to_string());
            tracing::error!(
                device_id = %device.device_id,
                action = %action,
                reason = %reason,
                "ONVIF request faulted"
            );
            return Err(Error::Transport(format!("ONVIF {} fault: {}", action, reason)));
        }

        tracing::debug!(device_id = %device.device_id, action = %action, "ONVIF request ok");
        Ok(text)
    }

    /// PTZ操作の送信（結果ボディは読み捨て）
    async fn send_ptz(&self, device: &DeviceConfig, body: &str, action: &str) -> Result<()> {
        let url = service_url(&device.endpoint, "ptz_service");
        self.send_soap(device, &url, body, action).await?;
        tracing::info!(
            device_id = %device.device_id,
            action = %action,
            "PTZ command executed"
        );
        Ok(())
    }
}

#[async_trait]
impl PtzTransport for OnvifPtzClient {
    async fn get_profiles(&self, device: &DeviceConfig) -> Result<Vec<ProfileDescriptor>> {
        let url = service_url(&device.endpoint, "media_service");
        let xml = self
            .send_soap(device, &url, &soap::get_profiles_body(), "GetProfiles")
            .await?;
        Ok(parse_profiles(&xml))
    }

    async fn get_node(&self, device: &DeviceConfig, node_token: &str) -> Result<PtzNode> {
        let url = service_url(&device.endpoint, "ptz_service");
        let xml = self
            .send_soap(device, &url, &soap::get_node_body(node_token), "GetNode")
            .await?;
        parse_node(&xml, node_token)
    }

    async fn get_device_info(&self, device: &DeviceConfig) -> Result<DeviceInfo> {
        let xml = self
            .send_soap(
                device,
                &device.endpoint,
                &soap::get_device_information_body(),
                "GetDeviceInformation",
            )
            .await?;
        Ok(DeviceInfo {
            manufacturer: extract_xml_value(&xml, "Manufacturer"),
            model: extract_xml_value(&xml, "Model"),
            firmware_version: extract_xml_value(&xml, "FirmwareVersion"),
            serial_number: extract_xml_value(&xml, "SerialNumber"),
        })
    }

    async fn relative_move(
        &self,
        device: &DeviceConfig,
        profile_token: &str,
        translation: &MotionVector,
        speed: &SpeedVector,
    ) -> Result<()> {
        let body = soap::relative_move_body(profile_token, translation, speed);
        self.send_ptz(device, &body, "RelativeMove").await
    }

    async fn absolute_move(
        &self,
        device: &DeviceConfig,
        profile_token: &str,
        position: &MotionVector,
        speed: &SpeedVector,
    ) -> Result<()> {
        let body = soap::absolute_move_body(profile_token, position, speed);
        self.send_ptz(device, &body, "AbsoluteMove").await
    }

    async fn continuous_move(
        &self,
        device: &DeviceConfig,
        profile_token: &str,
        velocity: &MotionVector,
        timeout_sec: Option<f64>,
    ) -> Result<()> {
        let body = soap::continuous_move_body(profile_token, velocity, timeout_sec);
        self.send_ptz(device, &body, "ContinuousMove").await
    }

    async fn stop(
        &self,
        device: &DeviceConfig,
        profile_token: &str,
        pan_tilt: bool,
        zoom: bool,
    ) -> Result<()> {
        let body = soap::stop_body(profile_token, pan_tilt, zoom);
        self.send_ptz(device, &body, "Stop").await
    }

    async fn set_home_position(&self, device: &DeviceConfig, profile_token: &str) -> Result<()> {
        let body = soap::set_home_position_body(profile_token);
        self.send_ptz(device, &body, "SetHomePosition").await
    }

    async fn goto_home_position(
        &self,
        device: &DeviceConfig,
        profile_token: &str,
        speed: &SpeedVector,
    ) -> Result<()> {
        let body = soap::goto_home_position_body(profile_token, speed);
        self.send_ptz(device, &body, "GotoHomePosition").await
    }

    async fn set_preset(
        &self,
        device: &DeviceConfig,
        profile_token: &str,
        preset_id: &str,
        name: Option<&str>,
    ) -> Result<()> {
        let body = soap::set_preset_body(profile_token, preset_id, name);
        self.send_ptz(device, &body, "SetPreset").await
    }

    async fn goto_preset(
        &self,
        device: &DeviceConfig,
        profile_token: &str,
        preset_id: &str,
        speed: &SpeedVector,
    ) -> Result<()> {
        let body = soap::goto_preset_body(profile_token, preset_id, speed);
        self.send_ptz(device, &body, "GotoPreset").await
    }
}

/// サービスURLを導出
///
/// device_service を目的サービスに置換。該当しないエンドポイントは
/// 最後のパス要素を置換する。
fn service_url(endpoint: &str, service: &str) -> String {
    if endpoint.contains("/onvif/device_service") {
        endpoint.replace("/onvif/device_service", &format!("/onvif/{}", service))
    } else {
        let base = endpoint.trim_end_matches('/');
        if let Some(pos) = base.rfind('/') {
            format!("{}/{}", &base[..pos], service)
        } else {
            format!("{}/onvif/{}", base, service)
        }
    }
}

/// SOAP Faultの理由文言を拾う
fn fault_reason(xml: &str) -> Option<String> {
    extract_xml_value(xml, "Text").or_else(|| extract_xml_value(xml, "Reason"))
}

fn truncate(s: &str, limit: usize) -> String {
    if s.len() <= limit {
        s.to_string()
    } else {
        let mut end = limit;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &s[..end])
    }
}

/// GetProfilesResponseをProfileDescriptor列へ
fn parse_profiles(xml: &str) -> Vec<ProfileDescriptor> {
    let mut profiles = Vec::new();
    for section in extract_xml_sections(xml, "Profiles") {
        let Some(token) = extract_xml_attribute(section, "Profiles", "token") else {
            continue;
        };
        let name = extract_xml_value(section, "Name").unwrap_or_else(|| token.clone());
        let ptz_cfg = extract_xml_section(section, "PTZConfiguration");
        let node_token = ptz_cfg.and_then(|cfg| extract_xml_value(cfg, "NodeToken"));
        let default_timeout_sec = ptz_cfg
            .and_then(|cfg| extract_xml_value(cfg, "DefaultPTZTimeout"))
            .and_then(|d| parse_iso_duration_sec(&d));
        profiles.push(ProfileDescriptor {
            token,
            name,
            node_token,
            default_timeout_sec,
        });
    }
    profiles
}

/// GetNodeResponseをPtzNodeへ
///
/// 能力フラグは各空間の広告有無から導く。空間を広告しないノードの
/// 境界は退化区間[0,0]で埋める（境界は常に存在させる）。
fn parse_node(xml: &str, requested_token: &str) -> Result<PtzNode> {
    let section = extract_xml_section(xml, "PTZNode").ok_or_else(|| {
        Error::Transport(format!(
            "GetNode response carries no PTZNode for {}",
            requested_token
        ))
    })?;

    let node_token = extract_xml_attribute(section, "PTZNode", "token")
        .unwrap_or_else(|| requested_token.to_string());

    let spaces = extract_xml_section(section, "SupportedPTZSpaces").unwrap_or(section);
    let abs_pt = extract_xml_section(spaces, "AbsolutePanTiltPositionSpace");
    let abs_zoom = extract_xml_section(spaces, "AbsoluteZoomPositionSpace");
    let rel_pt = extract_xml_section(spaces, "RelativePanTiltTranslationSpace");
    let rel_zoom = extract_xml_section(spaces, "RelativeZoomTranslationSpace");
    let cont_pt = extract_xml_section(spaces, "ContinuousPanTiltVelocitySpace");
    let cont_zoom = extract_xml_section(spaces, "ContinuousZoomVelocitySpace");

    let home_supported = extract_xml_value(section, "HomeSupported")
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    let max_presets = extract_xml_value(section, "MaximumNumberOfPresets")
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(0);

    Ok(PtzNode {
        node_token,
        supports_absolute: abs_pt.is_some() || abs_zoom.is_some(),
        supports_relative: rel_pt.is_some() || rel_zoom.is_some(),
        supports_continuous: cont_pt.is_some() || cont_zoom.is_some(),
        supports_home: home_supported,
        max_presets,
        absolute: SpaceBounds {
            pan: range_from(abs_pt, "XRange"),
            tilt: range_from(abs_pt, "YRange"),
            zoom: range_from(abs_zoom, "XRange"),
        },
        velocity: SpaceBounds {
            pan: range_from(cont_pt, "XRange"),
            tilt: range_from(cont_pt, "YRange"),
            zoom: range_from(cont_zoom, "XRange"),
        },
        default_timeout_sec: DEFAULT_PTZ_TIMEOUT_SEC,
    })
}

fn range_from(space: Option<&str>, axis_tag: &str) -> AxisRange {
    space
        .and_then(|s| extract_xml_section(s, axis_tag))
        .and_then(|r| {
            let min = extract_xml_value(r, "Min")?.parse::<f64>().ok()?;
            let max = extract_xml_value(r, "Max")?.parse::<f64>().ok()?;
            Some(AxisRange::new(min, max))
        })
        .unwrap_or_default()
}
