//! PTZ capability model
//!
//! デバイス/プロファイル/ノードの組み合わせが何をサポートするかを表す
//! 不変の値型。判定とクランプだけを提供し、I/Oは行わない。

use serde::{Deserialize, Serialize};

use crate::models::PtzOperation;
use crate::ptz_vector::{MotionVector, SpeedVector};

/// 連続移動タイムアウトの既定値（デバイスが広告しない場合に使う）
pub const DEFAULT_PTZ_TIMEOUT_SEC: f64 = 60.0;

/// デバイス広告タイムアウトとして受け入れる上限（秒）。超過分はここへ丸める
pub const MAX_PTZ_TIMEOUT_SEC: f64 = 3600.0;

/// Ordered numeric range [min, max]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisRange {
    pub min: f64,
    pub max: f64,
}

impl AxisRange {
    /// 逆順の入力は正規化する（min <= max を常に保つ）
    pub fn new(min: f64, max: f64) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    /// 境界は常に存在する。空間を広告しないノードは退化区間 [0,0] を持つ
    pub fn degenerate() -> Self {
        Self { min: 0.0, max: 0.0 }
    }

    pub fn clamp(&self, v: f64) -> f64 {
        v.clamp(self.min, self.max)
    }

    pub fn midpoint(&self) -> f64 {
        (self.min + self.max) / 2.0
    }
}

impl Default for AxisRange {
    fn default() -> Self {
        Self::degenerate()
    }
}

/// ベクトルを解釈する座標空間
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PtzSpace {
    Absolute,
    Velocity,
}

/// 一つの空間における3軸ぶんの境界
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SpaceBounds {
    pub pan: AxisRange,
    pub tilt: AxisRange,
    pub zoom: AxisRange,
}

/// Capability snapshot of one PTZ node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PtzNode {
    pub node_token: String,
    // === 能力フラグ ===
    pub supports_absolute: bool,
    pub supports_relative: bool,
    pub supports_continuous: bool,
    pub supports_home: bool,
    pub max_presets: u32,
    // === 空間境界 ===
    pub absolute: SpaceBounds,
    pub velocity: SpaceBounds,
    /// Advertised default/maximum continuous-move timeout (seconds)
    pub default_timeout_sec: f64,
}

impl PtzNode {
    /// 指定操作をこのノードが受け付けるか
    ///
    /// Stopは何らかの移動能力があれば常に可。ホーム系は supports_home、
    /// プリセット系は max_presets > 0 がゲートになる。
    pub fn supports(&self, op: PtzOperation) -> bool {
        match op {
            PtzOperation::RelativeMove => self.supports_relative,
            PtzOperation::AbsoluteMove => self.supports_absolute,
            PtzOperation::ContinuousMove => self.supports_continuous,
            PtzOperation::Stop => {
                self.supports_relative || self.supports_absolute || self.supports_continuous
            }
            PtzOperation::SetHomePosition | PtzOperation::GotoHomePosition => self.supports_home,
            PtzOperation::SetPreset | PtzOperation::GotoPreset => self.max_presets > 0,
        }
    }

    fn bounds(&self, space: PtzSpace) -> &SpaceBounds {
        match space {
            PtzSpace::Absolute => &self.absolute,
            PtzSpace::Velocity => &self.velocity,
        }
    }

    /// 存在する軸だけを指定空間の境界にクランプする
    ///
    /// 失敗しない。クランプ済みベクトルと「どこかの軸を丸めたか」を返す。
    pub fn clamp(&self, space: PtzSpace, vector: &MotionVector) -> (MotionVector, bool) {
        let b = self.bounds(space);
        let mut was_clamped = false;
        let out = MotionVector {
            pan: clamp_axis(b.pan, vector.pan, &mut was_clamped),
            tilt: clamp_axis(b.tilt, vector.tilt, &mut was_clamped),
            zoom: clamp_axis(b.zoom, vector.zoom, &mut was_clamped),
        };
        (out, was_clamped)
    }

    /// 速さベクトルを速度空間の境界にクランプする
    pub fn clamp_speed(&self, speed: &SpeedVector) -> (SpeedVector, bool) {
        let b = &self.velocity;
        let mut was_clamped = false;
        let out = SpeedVector {
            pan: clamp_axis(b.pan, speed.pan, &mut was_clamped),
            tilt: clamp_axis(b.tilt, speed.tilt, &mut was_clamped),
            zoom: clamp_axis(b.zoom, speed.zoom, &mut was_clamped),
        };
        (out, was_clamped)
    }
}

fn clamp_axis(range: AxisRange, value: Option<f64>, was_clamped: &mut bool) -> Option<f64> {
    value.map(|v| {
        let c = range.clamp(v);
        if c != v {
            *was_clamped = true;
        }
        c
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_node() -> PtzNode {
        PtzNode {
            node_token: "node0".to_string(),
            supports_absolute: true,
            supports_relative: true,
            supports_continuous: true,
            supports_home: true,
            max_presets: 8,
            absolute: SpaceBounds {
                pan: AxisRange::new(-1.0, 1.0),
                tilt: AxisRange::new(-1.0, 1.0),
                zoom: AxisRange::new(0.0, 1.0),
            },
            velocity: SpaceBounds {
                pan: AxisRange::new(-1.0, 1.0),
                tilt: AxisRange::new(-1.0, 1.0),
                zoom: AxisRange::new(-1.0, 1.0),
            },
            default_timeout_sec: 60.0,
        }
    }

    #[test]
    fn test_supports_table() {
        let mut node = full_node();
        node.supports_relative = false;
        node.supports_absolute = false;
        node.supports_home = false;
        node.max_presets = 0;

        assert!(!node.supports(PtzOperation::RelativeMove));
        assert!(!node.supports(PtzOperation::AbsoluteMove));
        assert!(node.supports(PtzOperation::ContinuousMove));
        // 連続移動だけでもStopは受け付ける
        assert!(node.supports(PtzOperation::Stop));
        assert!(!node.supports(PtzOperation::SetHomePosition));
        assert!(!node.supports(PtzOperation::GotoHomePosition));
        assert!(!node.supports(PtzOperation::SetPreset));
        assert!(!node.supports(PtzOperation::GotoPreset));
    }

    #[test]
    fn test_stop_unsupported_without_any_motion() {
        let mut node = full_node();
        node.supports_relative = false;
        node.supports_absolute = false;
        node.supports_continuous = false;
        assert!(!node.supports(PtzOperation::Stop));
    }

    #[test]
    fn test_clamp_rounds_out_of_range_axes() {
        let node = full_node();
        let v = MotionVector {
            pan: Some(2.5),
            tilt: Some(-0.5),
            zoom: Some(-0.1),
        };
        let (c, was_clamped) = node.clamp(PtzSpace::Absolute, &v);
        assert!(was_clamped);
        assert_eq!(c.pan, Some(1.0));
        assert_eq!(c.tilt, Some(-0.5));
        assert_eq!(c.zoom, Some(0.0));
    }

    #[test]
    fn test_clamp_is_idempotent() {
        let node = full_node();
        let v = MotionVector {
            pan: Some(7.0),
            tilt: None,
            zoom: Some(0.3),
        };
        let (once, _) = node.clamp(PtzSpace::Velocity, &v);
        let (twice, was_clamped) = node.clamp(PtzSpace::Velocity, &once);
        assert_eq!(once, twice);
        assert!(!was_clamped);
    }

    #[test]
    fn test_clamp_leaves_absent_axes_absent() {
        let node = full_node();
        let v = MotionVector::default();
        let (c, was_clamped) = node.clamp(PtzSpace::Absolute, &v);
        assert!(c.is_empty());
        assert!(!was_clamped);
    }

    #[test]
    fn test_clamp_speed_uses_velocity_bounds() {
        let node = full_node();
        let s = SpeedVector {
            pan: Some(3.0),
            tilt: Some(0.5),
            zoom: None,
        };
        let (c, was_clamped) = node.clamp_speed(&s);
        assert!(was_clamped);
        assert_eq!(c.pan, Some(1.0));
        assert_eq!(c.tilt, Some(0.5));
    }

    #[test]
    fn test_axis_range_normalizes_reversed_input() {
        let r = AxisRange::new(1.0, -1.0);
        assert_eq!(r.min, -1.0);
        assert_eq!(r.max, 1.0);
        assert_eq!(r.midpoint(), 0.0);
    }

    #[test]
    fn test_degenerate_range_pins_to_zero() {
        let r = AxisRange::degenerate();
        assert_eq!(r.clamp(0.7), 0.0);
    }
}
