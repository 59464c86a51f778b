//! CommandTranslator Service
//!
//! ## 概要
//! (操作, 解決済みターゲット, パラメータバッグ) をちょうど1回の
//! プロトコル呼び出しへ変換する唯一の関門。リトライはしない
//! （相対移動の再送はデルタが二重になる）。
//!
//! ## 処理フロー
//! 1. CapabilityCheck: 不支持操作はワイヤに触れず拒否
//! 2. Normalize: ベクトル解析とノード境界へのクランプ
//! 3. PresetCheck: プリセット操作のみ（未知ID/容量超過を拒否）
//! 4. Invoke: トランスポート呼び出し（ターゲットごとに1回）
//! 5. Result: 実効パラメータを報告

use std::sync::Arc;

use tracing::debug;

use crate::capability::PtzSpace;
use crate::error::{Error, Result};
use crate::models::PtzOperation;
use crate::onvif_client::PtzTransport;
use crate::profile_registry::{CommandTarget, Preset, ProfileRegistry};
use crate::ptz_vector::{parse_number, parse_speed, parse_vector, SpeedVector};

use super::types::{EffectiveParams, PtzParams};

/// CommandTranslator Service
pub struct CommandTranslator {
    transport: Arc<dyn PtzTransport>,
    registry: Arc<ProfileRegistry>,
}

impl CommandTranslator {
    pub fn new(transport: Arc<dyn PtzTransport>, registry: Arc<ProfileRegistry>) -> Self {
        Self {
            transport,
            registry,
        }
    }

    /// 1ターゲットぶんの変換と呼び出し
    ///
    /// 呼び出し側（orchestrator）がノードリースを保持した状態で呼ぶ。
    pub async fn translate_and_invoke(
        &self,
        op: PtzOperation,
        target: &CommandTarget,
        params: &PtzParams,
    ) -> Result<EffectiveParams> {
        let node = target.node.as_ref();

        // 1. CapabilityCheck
        if !node.supports(op) {
            return Err(Error::Unsupported(format!(
                "{} does not support {}",
                target.entity_id(),
                op.as_str()
            )));
        }

        // 2. Normalize（共通部）: 操作が使わないキーの拒否、speed解析
        reject_unused_params(op, params)?;
        let speed_raw = parse_speed(params.speed.as_ref())?;
        let (speed, speed_clamped) = node.clamp_speed(&speed_raw);

        let device = &target.device;
        let token = target.profile_token.as_str();

        // 2〜5. 操作ごとの正規化と呼び出し
        let effective = match op {
            PtzOperation::RelativeMove => {
                let raw = parse_vector(params.translation.as_ref())?;
                if raw.is_empty() {
                    return Err(Error::Validation(
                        "translation requires at least one axis".to_string(),
                    ));
                }
                // 相対デルタの大きさは位置空間の境界に収める
                let (translation, clamped) = node.clamp(PtzSpace::Absolute, &raw);
                self.transport
                    .relative_move(device, token, &translation, &speed)
                    .await?;
                EffectiveParams {
                    translation: Some(translation),
                    speed: present(&speed),
                    clamped: clamped || speed_clamped,
                    ..Default::default()
                }
            }

            PtzOperation::AbsoluteMove => {
                let raw = parse_vector(params.position.as_ref())?;
                if raw.is_empty() {
                    return Err(Error::Validation(
                        "position requires at least one axis".to_string(),
                    ));
                }
                let (mut position, clamped) = node.clamp(PtzSpace::Absolute, &raw);
                // PanTiltは対でしか送れない。片軸だけの指定は
                // もう片軸を空間中点で補完し、approximatedで報告する
                let mut approximated = false;
                match (position.pan, position.tilt) {
                    (Some(_), None) => {
                        position.tilt = Some(node.absolute.tilt.midpoint());
                        approximated = true;
                    }
                    (None, Some(_)) => {
                        position.pan = Some(node.absolute.pan.midpoint());
                        approximated = true;
                    }
                    _ => {}
                }
                self.transport
                    .absolute_move(device, token, &position, &speed)
                    .await?;
                EffectiveParams {
                    position: Some(position),
                    speed: present(&speed),
                    clamped: clamped || speed_clamped,
                    approximated,
                    ..Default::default()
                }
            }

            PtzOperation::ContinuousMove => {
                let raw = parse_vector(params.velocity.as_ref())?;
                if raw.is_empty() {
                    return Err(Error::Validation(
                        "velocity requires at least one axis".to_string(),
                    ));
                }
                let (velocity, v_clamped) = node.clamp(PtzSpace::Velocity, &raw);
                // timeoutは[0, ノード上限]へ丸める。未指定はデバイス既定
                // に任せ、停止は呼び出し側の責任になる
                let requested = parse_number(params.timeout.as_ref(), "params", "timeout")?;
                let mut t_clamped = false;
                let timeout_sec = requested.map(|t| {
                    let c = t.clamp(0.0, node.default_timeout_sec);
                    if c != t {
                        t_clamped = true;
                    }
                    c
                });
                self.transport
                    .continuous_move(device, token, &velocity, timeout_sec)
                    .await?;
                EffectiveParams {
                    velocity: Some(velocity),
                    timeout_sec,
                    clamped: v_clamped || t_clamped,
                    ..Default::default()
                }
            }

            PtzOperation::Stop => {
                // 両フラグ欠けは両軸停止
                let pan_tilt = params.pan_tilt.unwrap_or(true);
                let zoom = params.zoom.unwrap_or(true);
                self.transport.stop(device, token, pan_tilt, zoom).await?;
                EffectiveParams {
                    pan_tilt: Some(pan_tilt),
                    zoom: Some(zoom),
                    ..Default::default()
                }
            }

            PtzOperation::SetHomePosition => {
                self.transport.set_home_position(device, token).await?;
                EffectiveParams::default()
            }

            PtzOperation::GotoHomePosition => {
                self.transport
                    .goto_home_position(device, token, &speed)
                    .await?;
                EffectiveParams {
                    speed: present(&speed),
                    clamped: speed_clamped,
                    ..Default::default()
                }
            }

            PtzOperation::SetPreset => {
                let preset_id = required_preset_id(params)?;
                let node_key = target.node_key();
                // 3. PresetCheck: 容量超過の新規IDは拒否（既存IDの上書きは可）
                let exists = self.registry.has_preset(&node_key, &preset_id).await;
                if !exists
                    && self.registry.preset_count(&node_key).await >= node.max_presets as usize
                {
                    return Err(Error::Validation(format!(
                        "preset capacity {} exhausted on {}",
                        node.max_presets,
                        target.entity_id()
                    )));
                }
                self.transport
                    .set_preset(device, token, &preset_id, params.name.as_deref())
                    .await?;
                // 成功した呼び出しだけが帳面に載る
                self.registry
                    .record_preset(
                        &node_key,
                        Preset {
                            id: preset_id.clone(),
                            name: params.name.clone(),
                        },
                    )
                    .await;
                debug!(node_key = %node_key, preset = %preset_id, "preset recorded");
                EffectiveParams {
                    preset: Some(preset_id),
                    ..Default::default()
                }
            }

            PtzOperation::GotoPreset => {
                let preset_id = required_preset_id(params)?;
                let node_key = target.node_key();
                // 3. PresetCheck: 未知IDはワイヤに触れずUnknownPreset
                if !self.registry.has_preset(&node_key, &preset_id).await {
                    return Err(Error::UnknownPreset(format!(
                        "preset {} was never set on {}",
                        preset_id,
                        target.entity_id()
                    )));
                }
                self.transport
                    .goto_preset(device, token, &preset_id, &speed)
                    .await?;
                EffectiveParams {
                    preset: Some(preset_id),
                    speed: present(&speed),
                    clamped: speed_clamped,
                    ..Default::default()
                }
            }
        };

        Ok(effective)
    }
}

/// パラメータバッグの形だけを先に検証する
///
/// ノード非依存の検証（キー排他、数値解析、必須キー）だけを行う。
/// orchestratorがファンアウト前に一度呼び、ワイヤに触れる前に
/// 不正入力を弾く。クランプ等のノード依存処理は含まない。
pub fn validate_params(op: PtzOperation, params: &PtzParams) -> Result<()> {
    reject_unused_params(op, params)?;
    match op {
        PtzOperation::RelativeMove => {
            if parse_vector(params.translation.as_ref())?.is_empty() {
                return Err(Error::Validation(
                    "translation requires at least one axis".to_string(),
                ));
            }
        }
        PtzOperation::AbsoluteMove => {
            if parse_vector(params.position.as_ref())?.is_empty() {
                return Err(Error::Validation(
                    "position requires at least one axis".to_string(),
                ));
            }
        }
        PtzOperation::ContinuousMove => {
            if parse_vector(params.velocity.as_ref())?.is_empty() {
                return Err(Error::Validation(
                    "velocity requires at least one axis".to_string(),
                ));
            }
        }
        PtzOperation::SetPreset | PtzOperation::GotoPreset => {
            required_preset_id(params)?;
        }
        PtzOperation::Stop | PtzOperation::SetHomePosition | PtzOperation::GotoHomePosition => {}
    }
    parse_speed(params.speed.as_ref())?;
    parse_number(params.timeout.as_ref(), "params", "timeout")?;
    Ok(())
}

/// 空でないspeedだけ実効パラメータに載せる
fn present(speed: &SpeedVector) -> Option<SpeedVector> {
    if speed.is_empty() {
        None
    } else {
        Some(*speed)
    }
}

fn required_preset_id(params: &PtzParams) -> Result<String> {
    let id = params
        .preset
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::Validation("preset id required".to_string()))?;
    Ok(id.to_string())
}

/// 操作が使わないパラメータの混入を拒否する
fn reject_unused_params(op: PtzOperation, params: &PtzParams) -> Result<()> {
    use PtzOperation::*;
    let checks: [(&str, bool, &[PtzOperation]); 9] = [
        ("translation", params.translation.is_some(), &[RelativeMove]),
        ("position", params.position.is_some(), &[AbsoluteMove]),
        ("velocity", params.velocity.is_some(), &[ContinuousMove]),
        (
            "speed",
            params.speed.is_some(),
            &[RelativeMove, AbsoluteMove, GotoHomePosition, GotoPreset],
        ),
        ("timeout", params.timeout.is_some(), &[ContinuousMove]),
        ("pan_tilt", params.pan_tilt.is_some(), &[Stop]),
        ("zoom", params.zoom.is_some(), &[Stop]),
        ("preset", params.preset.is_some(), &[SetPreset, GotoPreset]),
        ("name", params.name.is_some(), &[SetPreset]),
    ];
    for (key, supplied, allowed) in checks {
        if supplied && !allowed.contains(&op) {
            return Err(Error::Validation(format!(
                "parameter {} is not used by {}",
                key,
                op.as_str()
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node_lock::NodeLockManager;
    use crate::onvif_client::recording::{test_device, test_node, RecordingTransport};
    use serde_json::json;

    fn target_for(node: crate::capability::PtzNode) -> CommandTarget {
        CommandTarget {
            device: test_device("cam-a"),
            profile_token: "profile_1".to_string(),
            profile_name: "main".to_string(),
            node: Arc::new(node),
        }
    }

    fn build(transport: Arc<RecordingTransport>) -> (CommandTranslator, Arc<ProfileRegistry>) {
        let registry = Arc::new(ProfileRegistry::new(
            transport.clone(),
            Arc::new(NodeLockManager::new()),
        ));
        (
            CommandTranslator::new(transport, registry.clone()),
            registry,
        )
    }

    #[tokio::test]
    async fn test_unsupported_operation_never_reaches_transport() {
        let transport = Arc::new(RecordingTransport::new());
        let (translator, _) = build(transport.clone());

        let mut node = test_node("node0");
        node.supports_relative = false;
        let target = target_for(node);

        let params = PtzParams {
            translation: Some(json!({"pan": 0.1})),
            ..Default::default()
        };
        let err = translator
            .translate_and_invoke(PtzOperation::RelativeMove, &target, &params)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unsupported(_)));
        assert_eq!(transport.call_count().await, 0);
    }

    #[tokio::test]
    async fn test_relative_move_clamps_and_reports() {
        let transport = Arc::new(RecordingTransport::new());
        let (translator, _) = build(transport.clone());
        let target = target_for(test_node("node0"));

        let params = PtzParams {
            translation: Some(json!({"pan": 5.0, "tilt": -0.25})),
            speed: Some(json!({"pan_tilt": {"x": 0.5, "y": 0.5}})),
            ..Default::default()
        };
        let effective = translator
            .translate_and_invoke(PtzOperation::RelativeMove, &target, &params)
            .await
            .unwrap();

        assert!(effective.clamped);
        let translation = effective.translation.unwrap();
        assert_eq!(translation.pan, Some(1.0));
        assert_eq!(translation.tilt, Some(-0.25));
        assert!(effective.speed.is_some());

        let calls = transport.calls().await;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].action, "RelativeMove");
        assert_eq!(calls[0].profile_token, "profile_1");
    }

    #[tokio::test]
    async fn test_foreign_vector_key_rejected_before_wire() {
        let transport = Arc::new(RecordingTransport::new());
        let (translator, _) = build(transport.clone());
        let target = target_for(test_node("node0"));

        let params = PtzParams {
            position: Some(json!({"pan": 0.5})),
            ..Default::default()
        };
        let err = translator
            .translate_and_invoke(PtzOperation::RelativeMove, &target, &params)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(transport.call_count().await, 0);
    }

    #[tokio::test]
    async fn test_empty_translation_rejected() {
        let transport = Arc::new(RecordingTransport::new());
        let (translator, _) = build(transport.clone());
        let target = target_for(test_node("node0"));

        let params = PtzParams {
            translation: Some(json!({})),
            ..Default::default()
        };
        let err = translator
            .translate_and_invoke(PtzOperation::RelativeMove, &target, &params)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(transport.call_count().await, 0);
    }

    #[tokio::test]
    async fn test_continuous_timeout_clamped_to_node_max() {
        let transport = Arc::new(RecordingTransport::new());
        let (translator, _) = build(transport.clone());
        let mut node = test_node("node0");
        node.default_timeout_sec = 10.0;
        let target = target_for(node);

        let params = PtzParams {
            velocity: Some(json!({"pan": 0.4})),
            timeout: Some(json!(90)),
            ..Default::default()
        };
        let effective = translator
            .translate_and_invoke(PtzOperation::ContinuousMove, &target, &params)
            .await
            .unwrap();
        assert_eq!(effective.timeout_sec, Some(10.0));
        assert!(effective.clamped);

        // 未指定はNoneのまま通す（デバイス既定）
        let params = PtzParams {
            velocity: Some(json!({"pan": 0.4})),
            ..Default::default()
        };
        let effective = translator
            .translate_and_invoke(PtzOperation::ContinuousMove, &target, &params)
            .await
            .unwrap();
        assert_eq!(effective.timeout_sec, None);
    }

    #[tokio::test]
    async fn test_absolute_single_axis_fills_midpoint() {
        let transport = Arc::new(RecordingTransport::new());
        let (translator, _) = build(transport.clone());
        let mut node = test_node("node0");
        node.absolute.tilt = crate::capability::AxisRange::new(0.0, 1.0);
        let target = target_for(node);

        let params = PtzParams {
            position: Some(json!({"pan": 0.25})),
            ..Default::default()
        };
        let effective = translator
            .translate_and_invoke(PtzOperation::AbsoluteMove, &target, &params)
            .await
            .unwrap();
        assert!(effective.approximated);
        let position = effective.position.unwrap();
        assert_eq!(position.pan, Some(0.25));
        // 欠けたtiltはノードのtilt空間中点で補完される
        assert_eq!(position.tilt, Some(0.5));
    }

    #[tokio::test]
    async fn test_stop_defaults_to_both_axes() {
        let transport = Arc::new(RecordingTransport::new());
        let (translator, _) = build(transport.clone());
        let target = target_for(test_node("node0"));

        let effective = translator
            .translate_and_invoke(PtzOperation::Stop, &target, &PtzParams::default())
            .await
            .unwrap();
        assert_eq!(effective.pan_tilt, Some(true));
        assert_eq!(effective.zoom, Some(true));

        let params = PtzParams {
            pan_tilt: Some(true),
            zoom: Some(false),
            ..Default::default()
        };
        let effective = translator
            .translate_and_invoke(PtzOperation::Stop, &target, &params)
            .await
            .unwrap();
        assert_eq!(effective.zoom, Some(false));
    }

    #[tokio::test]
    async fn test_goto_preset_unknown_id_never_reaches_transport() {
        let transport = Arc::new(RecordingTransport::new());
        let (translator, _) = build(transport.clone());
        let target = target_for(test_node("node0"));

        let params = PtzParams {
            preset: Some("ghost".to_string()),
            ..Default::default()
        };
        let err = translator
            .translate_and_invoke(PtzOperation::GotoPreset, &target, &params)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnknownPreset(_)));
        assert_eq!(transport.call_count().await, 0);
    }

    #[tokio::test]
    async fn test_set_then_goto_preset() {
        let transport = Arc::new(RecordingTransport::new());
        let (translator, registry) = build(transport.clone());
        let target = target_for(test_node("node0"));

        let params = PtzParams {
            preset: Some("p1".to_string()),
            name: Some("entrance".to_string()),
            ..Default::default()
        };
        translator
            .translate_and_invoke(PtzOperation::SetPreset, &target, &params)
            .await
            .unwrap();
        assert!(registry.has_preset("cam-a/node0", "p1").await);

        let params = PtzParams {
            preset: Some("p1".to_string()),
            ..Default::default()
        };
        translator
            .translate_and_invoke(PtzOperation::GotoPreset, &target, &params)
            .await
            .unwrap();
        assert_eq!(transport.call_count().await, 2);
    }

    #[tokio::test]
    async fn test_set_preset_capacity_allows_overwrite_only() {
        let transport = Arc::new(RecordingTransport::new());
        let (translator, _) = build(transport.clone());
        let mut node = test_node("node0");
        node.max_presets = 1;
        let target = target_for(node);

        let set = |id: &str| PtzParams {
            preset: Some(id.to_string()),
            ..Default::default()
        };
        translator
            .translate_and_invoke(PtzOperation::SetPreset, &target, &set("p1"))
            .await
            .unwrap();

        // 容量いっぱいで新規IDは拒否
        let err = translator
            .translate_and_invoke(PtzOperation::SetPreset, &target, &set("p2"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        // 既存IDの上書きは通る
        translator
            .translate_and_invoke(PtzOperation::SetPreset, &target, &set("p1"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_failed_set_preset_not_recorded() {
        let transport = Arc::new(RecordingTransport::new());
        transport
            .set_fail_ops(
                "cam-a",
                crate::onvif_client::recording::FailMode::Transport,
            )
            .await;
        let (translator, registry) = build(transport.clone());
        let target = target_for(test_node("node0"));

        let params = PtzParams {
            preset: Some("p1".to_string()),
            ..Default::default()
        };
        let err = translator
            .translate_and_invoke(PtzOperation::SetPreset, &target, &params)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert!(!registry.has_preset("cam-a/node0", "p1").await);
    }
}
