//! SOAP envelope construction
//!
//! ONVIFリクエストはWSDLスタブを使わず、必要な8種+照会3種だけを
//! 直接組み立てる。認証はWS-Security UsernameToken digest。

use base64::Engine;
use sha1::{Digest, Sha1};

use crate::ptz_vector::{MotionVector, SpeedVector};

/// WS-Security UsernameToken ヘッダー生成
///
/// Password Digest = Base64(SHA1(nonce + created + password))
pub fn security_header(username: &str, password: &str) -> String {
    // Nonce生成（16バイトランダム)
    let nonce: [u8; 16] = rand::random();
    let nonce_base64 = base64::engine::general_purpose::STANDARD.encode(nonce);

    // Created タイムスタンプ
    let created = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();

    let mut hasher = Sha1::new();
    hasher.update(nonce);
    hasher.update(created.as_bytes());
    hasher.update(password.as_bytes());
    let digest = hasher.finalize();
    let digest_base64 = base64::engine::general_purpose::STANDARD.encode(digest);

    format!(
        r#"<s:Header>
    <Security xmlns="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd"
              s:mustUnderstand="true">
      <UsernameToken>
        <Username>{}</Username>
        <Password Type="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-username-token-profile-1.0#PasswordDigest">{}</Password>
        <Nonce EncodingType="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-soap-message-security-1.0#Base64Binary">{}</Nonce>
        <Created xmlns="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd">{}</Created>
      </UsernameToken>
    </Security>
  </s:Header>"#,
        escape_xml(username),
        digest_base64,
        nonce_base64,
        created
    )
}

/// ヘッダーとボディを共通エンベロープで包む
pub fn envelope(security: &str, body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope"
            xmlns:tds="http://www.onvif.org/ver10/device/wsdl"
            xmlns:trt="http://www.onvif.org/ver10/media/wsdl"
            xmlns:tptz="http://www.onvif.org/ver20/ptz/wsdl"
            xmlns:tt="http://www.onvif.org/ver10/schema">
  {}
  <s:Body>
    {}
  </s:Body>
</s:Envelope>"#,
        security, body
    )
}

pub fn get_device_information_body() -> String {
    "<tds:GetDeviceInformation/>".to_string()
}

pub fn get_profiles_body() -> String {
    "<trt:GetProfiles/>".to_string()
}

pub fn get_node_body(node_token: &str) -> String {
    format!(
        "<tptz:GetNode><tptz:NodeToken>{}</tptz:NodeToken></tptz:GetNode>",
        escape_xml(node_token)
    )
}

/// 相対移動。欠けた軸は0（=その軸は動かさない）として送る。
pub fn relative_move_body(
    profile_token: &str,
    translation: &MotionVector,
    speed: &SpeedVector,
) -> String {
    let mut vector = String::new();
    vector.push_str(&pan_tilt_xml(
        translation.pan.unwrap_or(0.0),
        translation.tilt.unwrap_or(0.0),
    ));
    if let Some(z) = translation.zoom {
        vector.push_str(&zoom_xml(z));
    }
    format!(
        "<tptz:RelativeMove><tptz:ProfileToken>{}</tptz:ProfileToken><tptz:Translation>{}</tptz:Translation>{}</tptz:RelativeMove>",
        escape_xml(profile_token),
        vector,
        speed_xml(speed)
    )
}

/// 絶対移動。PanTiltは両軸そろっている場合のみ、Zoomは指定時のみ送る。
/// 片軸しか無いケースの補完は呼び出し側（translator）が済ませている。
pub fn absolute_move_body(
    profile_token: &str,
    position: &MotionVector,
    speed: &SpeedVector,
) -> String {
    let mut vector = String::new();
    if let (Some(x), Some(y)) = (position.pan, position.tilt) {
        vector.push_str(&pan_tilt_xml(x, y));
    }
    if let Some(z) = position.zoom {
        vector.push_str(&zoom_xml(z));
    }
    format!(
        "<tptz:AbsoluteMove><tptz:ProfileToken>{}</tptz:ProfileToken><tptz:Position>{}</tptz:Position>{}</tptz:AbsoluteMove>",
        escape_xml(profile_token),
        vector,
        speed_xml(speed)
    )
}

/// 連続移動。タイムアウト指定時はxs:durationで送る。
pub fn continuous_move_body(
    profile_token: &str,
    velocity: &MotionVector,
    timeout_sec: Option<f64>,
) -> String {
    let mut vector = String::new();
    if velocity.pan.is_some() || velocity.tilt.is_some() {
        vector.push_str(&pan_tilt_xml(
            velocity.pan.unwrap_or(0.0),
            velocity.tilt.unwrap_or(0.0),
        ));
    }
    if let Some(z) = velocity.zoom {
        vector.push_str(&zoom_xml(z));
    }
    let timeout = match timeout_sec {
        Some(t) => format!("<tptz:Timeout>PT{}S</tptz:Timeout>", t),
        None => String::new(),
    };
    format!(
        "<tptz:ContinuousMove><tptz:ProfileToken>{}</tptz:ProfileToken><tptz:Velocity>{}</tptz:Velocity>{}</tptz:ContinuousMove>",
        escape_xml(profile_token),
        vector,
        timeout
    )
}

pub fn stop_body(profile_token: &str, pan_tilt: bool, zoom: bool) -> String {
    format!(
        "<tptz:Stop><tptz:ProfileToken>{}</tptz:ProfileToken><tptz:PanTilt>{}</tptz:PanTilt><tptz:Zoom>{}</tptz:Zoom></tptz:Stop>",
        escape_xml(profile_token),
        pan_tilt,
        zoom
    )
}

pub fn set_home_position_body(profile_token: &str) -> String {
    format!(
        "<tptz:SetHomePosition><tptz:ProfileToken>{}</tptz:ProfileToken></tptz:SetHomePosition>",
        escape_xml(profile_token)
    )
}

pub fn goto_home_position_body(profile_token: &str, speed: &SpeedVector) -> String {
    format!(
        "<tptz:GotoHomePosition><tptz:ProfileToken>{}</tptz:ProfileToken>{}</tptz:GotoHomePosition>",
        escape_xml(profile_token),
        speed_xml(speed)
    )
}

pub fn set_preset_body(profile_token: &str, preset_id: &str, name: Option<&str>) -> String {
    let name_xml = match name {
        Some(n) => format!("<tptz:PresetName>{}</tptz:PresetName>", escape_xml(n)),
        None => String::new(),
    };
    format!(
        "<tptz:SetPreset><tptz:ProfileToken>{}</tptz:ProfileToken>{}<tptz:PresetToken>{}</tptz:PresetToken></tptz:SetPreset>",
        escape_xml(profile_token),
        name_xml,
        escape_xml(preset_id)
    )
}

pub fn goto_preset_body(profile_token: &str, preset_id: &str, speed: &SpeedVector) -> String {
    format!(
        "<tptz:GotoPreset><tptz:ProfileToken>{}</tptz:ProfileToken><tptz:PresetToken>{}</tptz:PresetToken>{}</tptz:GotoPreset>",
        escape_xml(profile_token),
        escape_xml(preset_id),
        speed_xml(speed)
    )
}

fn pan_tilt_xml(x: f64, y: f64) -> String {
    format!(r#"<tt:PanTilt x="{}" y="{}"/>"#, x, y)
}

fn zoom_xml(x: f64) -> String {
    format!(r#"<tt:Zoom x="{}"/>"#, x)
}

/// Speed要素。PanTilt速度は片軸指定ならもう片軸にも同じ値を使う
/// （プロトコル上x/yは常に対で送る必要がある）。
fn speed_xml(speed: &SpeedVector) -> String {
    if speed.is_empty() {
        return String::new();
    }
    let mut parts = String::new();
    if speed.pan.is_some() || speed.tilt.is_some() {
        let x = speed.pan.or(speed.tilt).unwrap_or(0.0);
        let y = speed.tilt.or(speed.pan).unwrap_or(0.0);
        parts.push_str(&format!(r#"<tt:PanTilt x="{}" y="{}"/>"#, x, y));
    }
    if let Some(z) = speed.zoom {
        parts.push_str(&format!(r#"<tt:Zoom x="{}"/>"#, z));
    }
    format!("<tptz:Speed>{}</tptz:Speed>", parts)
}

/// テキスト/属性値のXMLエスケープ
fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_security_header_generation() {
        let header = security_header("admin", "testpass");
        assert!(header.contains("<Username>admin</Username>"));
        assert!(header.contains("PasswordDigest"));
        assert!(header.contains("<Nonce"));
        assert!(header.contains("<Created"));
    }

    #[test]
    fn test_relative_move_fills_absent_axes_with_zero() {
        let t = MotionVector {
            pan: Some(0.1),
            tilt: None,
            zoom: None,
        };
        let body = relative_move_body("p1", &t, &SpeedVector::default());
        assert!(body.contains(r#"<tt:PanTilt x="0.1" y="0"/>"#));
        assert!(!body.contains("<tt:Zoom"));
        assert!(!body.contains("<tptz:Speed>"));
    }

    #[test]
    fn test_absolute_move_omits_unpaired_elements() {
        let p = MotionVector {
            pan: None,
            tilt: None,
            zoom: Some(0.5),
        };
        let body = absolute_move_body("p1", &p, &SpeedVector::default());
        assert!(!body.contains("<tt:PanTilt"));
        assert!(body.contains(r#"<tt:Zoom x="0.5"/>"#));
    }

    #[test]
    fn test_continuous_move_timeout_rendering() {
        let v = MotionVector {
            pan: Some(-0.2),
            tilt: Some(0.0),
            zoom: None,
        };
        let body = continuous_move_body("p1", &v, Some(5.0));
        assert!(body.contains("<tptz:Timeout>PT5S</tptz:Timeout>"));

        let body = continuous_move_body("p1", &v, None);
        assert!(!body.contains("<tptz:Timeout>"));
    }

    #[test]
    fn test_stop_flags() {
        let body = stop_body("p1", true, false);
        assert!(body.contains("<tptz:PanTilt>true</tptz:PanTilt>"));
        assert!(body.contains("<tptz:Zoom>false</tptz:Zoom>"));
    }

    #[test]
    fn test_speed_pairs_single_axis() {
        let s = SpeedVector {
            pan: Some(0.8),
            tilt: None,
            zoom: None,
        };
        let body = goto_home_position_body("p1", &s);
        assert!(body.contains(r#"<tt:PanTilt x="0.8" y="0.8"/>"#));
    }

    #[test]
    fn test_preset_name_escaped() {
        let body = set_preset_body("p1", "preset-1", Some("entrance & gate"));
        assert!(body.contains("<tptz:PresetName>entrance &amp; gate</tptz:PresetName>"));
        assert!(body.contains("<tptz:PresetToken>preset-1</tptz:PresetToken>"));
    }

    #[test]
    fn test_envelope_wraps_header_and_body() {
        let env = envelope(&security_header("u", "p"), "<tds:GetDeviceInformation/>");
        assert!(env.starts_with("<?xml"));
        assert!(env.contains("<s:Header>"));
        assert!(env.contains("<tds:GetDeviceInformation/>"));
    }
}
