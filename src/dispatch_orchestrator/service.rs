//! DispatchOrchestrator Service
//!
//! ## 処理フロー
//! 1. セレクタをProfileRegistryでターゲット列に解決
//! 2. パラメータバッグの形を一度だけ先行検証（不正入力はワイヤ前に拒否）
//! 3. 有界並行でファンアウト（ノードリース取得→CommandTranslator）
//! 4. ターゲット別結果を解決順で集約。部分成功は成功として返し、
//!    全滅のときだけ ok=false
//!
//! 最初の失敗で打ち切らない。1台の不調が残りのカメラを巻き込まない
//! ことがマルチターゲット指令の前提になる。

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{info, warn};
use uuid::Uuid;

use crate::command_translator::{validate_params, CommandTranslator, EffectiveParams, PtzParams};
use crate::error::{Error, Result};
use crate::models::PtzOperation;
use crate::node_lock::NodeLockManager;
use crate::profile_registry::{CommandTarget, ProfileRegistry, Resolution, TargetSelector};

use super::tracker::MoveTracker;
use super::types::{DispatchOutcome, TargetOutcome};

/// 同時に走らせるターゲット呼び出し数の既定値
pub const DEFAULT_DISPATCH_CONCURRENCY: usize = 4;

/// DispatchOrchestrator Service
pub struct DispatchOrchestrator {
    registry: Arc<ProfileRegistry>,
    translator: Arc<CommandTranslator>,
    locks: Arc<NodeLockManager>,
    tracker: MoveTracker,
    concurrency: usize,
}

impl DispatchOrchestrator {
    pub fn new(
        registry: Arc<ProfileRegistry>,
        translator: Arc<CommandTranslator>,
        locks: Arc<NodeLockManager>,
        concurrency: usize,
    ) -> Self {
        Self {
            registry,
            translator,
            locks,
            tracker: MoveTracker::new(),
            concurrency: concurrency.max(1),
        }
    }

    /// 1つの論理指令を解決済みターゲット全てへ配送する
    ///
    /// Errになるのはセレクタ不正・パラメータ不正・有効ターゲットゼロ
    /// のときだけ。ターゲット個別の失敗はDispatchOutcomeに残る。
    pub async fn dispatch(
        &self,
        op: PtzOperation,
        selector: &TargetSelector,
        params: &PtzParams,
    ) -> Result<DispatchOutcome> {
        // 1. 解決
        let resolution = self.registry.resolve(selector).await?;

        // 2. 形の検証はファンアウト前に一度だけ。不正入力は全ターゲット
        //    共通なので、個別診断ではなく呼び出し全体の失敗にする
        validate_params(op, params)?;

        if resolution.targets.is_empty() {
            // 有効ターゲットゼロだけが硬い失敗
            return Err(Error::NotFound(format!(
                "no PTZ-capable target matched the selector ({} dropped)",
                resolution.dropped.len()
            )));
        }

        let dispatch_id = Uuid::new_v4().to_string();
        info!(
            dispatch_id = %dispatch_id,
            operation = op.as_str(),
            targets = resolution.targets.len(),
            dropped = resolution.dropped.len(),
            "dispatching PTZ command"
        );

        // 3. 有界並行ファンアウト。各futureにターゲットを所有させ、
        //    完了順で回収して解決順に並べ直す
        let Resolution { targets, dropped } = resolution;
        let mut indexed: Vec<(usize, TargetOutcome)> =
            stream::iter(targets.into_iter().enumerate().map(|(i, target)| async move {
                let entity = target.entity_id();
                let outcome = match self.invoke_target(op, &target, params).await {
                    Ok(effective) => TargetOutcome::success(entity, effective),
                    Err(e) => {
                        warn!(entity = %entity, error = %e, "target invocation failed");
                        TargetOutcome::failure(entity, &e)
                    }
                };
                (i, outcome)
            }))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;
        indexed.sort_by_key(|(i, _)| *i);
        let results: Vec<TargetOutcome> = indexed.into_iter().map(|(_, o)| o).collect();

        // 4. 集約
        let success_count = results.iter().filter(|r| r.ok).count();
        let failure_count = results.len() - success_count;
        info!(
            dispatch_id = %dispatch_id,
            success = success_count,
            failed = failure_count,
            "dispatch complete"
        );

        Ok(DispatchOutcome {
            dispatch_id,
            operation: op,
            ok: success_count > 0,
            success_count,
            failure_count,
            results,
            dropped,
        })
    }

    async fn invoke_target(
        &self,
        op: PtzOperation,
        target: &CommandTarget,
        params: &PtzParams,
    ) -> Result<EffectiveParams> {
        let node_key = target.node_key();
        // 同一ノードへの呼び出しは直列。待ち過ぎは個別のBusyになる
        let _lease = self.locks.acquire(&node_key).await?;
        let effective = self
            .translator
            .translate_and_invoke(op, target, params)
            .await?;

        // リース保持中に移動帳簿を更新する
        match op {
            PtzOperation::ContinuousMove => {
                // timeout未指定ならノードの既定タイムアウトが期限
                let horizon = effective
                    .timeout_sec
                    .unwrap_or(target.node.default_timeout_sec);
                let velocity = effective.velocity.unwrap_or_default();
                self.tracker.record(&node_key, &velocity, horizon).await;
            }
            PtzOperation::Stop => self.tracker.clear(&node_key).await,
            _ => {}
        }
        Ok(effective)
    }

    /// ノードで連続移動が進行中か（status表示用）
    pub async fn is_moving(&self, node_key: &str) -> bool {
        self.tracker.is_moving(node_key).await
    }
}
