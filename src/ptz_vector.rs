//! PTZベクトル正規化
//!
//! 呼び出し側から渡される緩い構造のpan/tilt/zoomベクトルを検証し、
//! プロトコルに渡せる数値へ変換する。不正な入力はネットワークに
//! 触れる前にここで弾く。

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// pan/tilt/zoom移動ベクトル
///
/// 欠けた軸は「変更なし」（相対/連続移動）または「未指定」（絶対移動）。
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MotionVector {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pan: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tilt: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zoom: Option<f64>,
}

impl MotionVector {
    pub fn is_empty(&self) -> bool {
        self.pan.is_none() && self.tilt.is_none() && self.zoom.is_none()
    }
}

/// 軸ごとの速さベクトル。各軸は非負。
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SpeedVector {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pan: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tilt: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zoom: Option<f64>,
}

impl SpeedVector {
    pub fn is_empty(&self) -> bool {
        self.pan.is_none() && self.tilt.is_none() && self.zoom.is_none()
    }
}

/// 緩いJSONからMotionVectorを組み立てる
///
/// 受け付ける形:
/// - ONVIF風ネスト: `{"pan_tilt": {"x": 0.1, "y": -0.2}, "zoom": 0.5}`
/// - フラット: `{"pan": 0.1, "tilt": -0.2, "zoom": 0.5}`
///
/// キー名は大文字小文字を区別しない（元サービススキーマの `PanTilt` /
/// `Zoom` 綴りも受ける）。未知キーは無視。構造自体が無い場合は
/// 全軸欠損（=変更なし）を返し、エラーにはしない。
pub fn parse_vector(raw: Option<&Value>) -> Result<MotionVector> {
    let fields = parse_axes(raw, "vector")?;
    Ok(MotionVector {
        pan: fields.pan,
        tilt: fields.tilt,
        zoom: fields.zoom,
    })
}

/// 緩いJSONからSpeedVectorを組み立てる。負の軸は拒否する。
pub fn parse_speed(raw: Option<&Value>) -> Result<SpeedVector> {
    let fields = parse_axes(raw, "speed")?;
    for (axis, value) in [
        ("pan", fields.pan),
        ("tilt", fields.tilt),
        ("zoom", fields.zoom),
    ] {
        if let Some(v) = value {
            if v < 0.0 {
                return Err(Error::Validation(format!(
                    "speed.{} must be non-negative, got {}",
                    axis, v
                )));
            }
        }
    }
    Ok(SpeedVector {
        pan: fields.pan,
        tilt: fields.tilt,
        zoom: fields.zoom,
    })
}

/// スカラー数値フィールドの緩い解釈（timeout等）
pub fn parse_number(raw: Option<&Value>, what: &str, field: &str) -> Result<Option<f64>> {
    match raw {
        None | Some(Value::Null) => Ok(None),
        Some(v) => numeric_leaf(v, what, field).map(Some),
    }
}

#[derive(Default)]
struct Axes {
    pan: Option<f64>,
    tilt: Option<f64>,
    zoom: Option<f64>,
}

fn parse_axes(raw: Option<&Value>, what: &str) -> Result<Axes> {
    let value = match raw {
        None | Some(Value::Null) => return Ok(Axes::default()),
        Some(v) => v,
    };
    let obj = value
        .as_object()
        .ok_or_else(|| Error::Validation(format!("{} must be a JSON object", what)))?;

    let mut axes = Axes::default();
    for (key, v) in obj {
        match key.to_ascii_lowercase().as_str() {
            "pan_tilt" | "pantilt" => parse_pan_tilt(v, what, &mut axes)?,
            "pan" => set_axis(&mut axes.pan, numeric_leaf(v, what, "pan")?, what, "pan")?,
            "tilt" => set_axis(&mut axes.tilt, numeric_leaf(v, what, "tilt")?, what, "tilt")?,
            "zoom" => {
                // ONVIFのZoomは1次元ベクトル。素の数値と {"x": n} の両方を受ける
                let leaf = match v {
                    Value::Object(inner) => {
                        let x = inner
                            .iter()
                            .find(|(k, _)| k.eq_ignore_ascii_case("x"))
                            .map(|(_, xv)| xv)
                            .ok_or_else(|| {
                                Error::Validation(format!("{}.zoom object requires an x field", what))
                            })?;
                        numeric_leaf(x, what, "zoom.x")?
                    }
                    other => numeric_leaf(other, what, "zoom")?,
                };
                set_axis(&mut axes.zoom, leaf, what, "zoom")?;
            }
            // 未知キーは前方互換のため無視する
            _ => {}
        }
    }
    Ok(axes)
}

fn parse_pan_tilt(v: &Value, what: &str, axes: &mut Axes) -> Result<()> {
    let obj = v
        .as_object()
        .ok_or_else(|| Error::Validation(format!("{}.pan_tilt must be a JSON object", what)))?;
    for (key, leaf) in obj {
        match key.to_ascii_lowercase().as_str() {
            "x" | "pan" => set_axis(
                &mut axes.pan,
                numeric_leaf(leaf, what, "pan_tilt.x")?,
                what,
                "pan",
            )?,
            "y" | "tilt" => set_axis(
                &mut axes.tilt,
                numeric_leaf(leaf, what, "pan_tilt.y")?,
                what,
                "tilt",
            )?,
            _ => {}
        }
    }
    Ok(())
}

fn set_axis(slot: &mut Option<f64>, value: f64, what: &str, axis: &str) -> Result<()> {
    if slot.is_some() {
        return Err(Error::Validation(format!(
            "{}.{} specified more than once",
            what, axis
        )));
    }
    *slot = Some(value);
    Ok(())
}

/// 数値リーフを有限のf64へ。数値と数値文字列を受け、それ以外は拒否。
fn numeric_leaf(v: &Value, what: &str, path: &str) -> Result<f64> {
    let parsed = match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match parsed {
        Some(f) if f.is_finite() => Ok(f),
        Some(_) => Err(Error::Validation(format!(
            "{}.{} must be a finite number",
            what, path
        ))),
        None => Err(Error::Validation(format!(
            "{}.{} must be a number, got {}",
            what, path, v
        ))),
    }
}
