//! 連続移動トラッカー
//!
//! ContinuousMoveの成功を記録し、Stopの成功で消す。タイムアウト期限を
//! 過ぎたエントリは照会時に刈り取る。物理モーションの実測ではなく、
//! このサービスが開始した移動の帳簿。

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::debug;

use crate::capability::MAX_PTZ_TIMEOUT_SEC;
use crate::ptz_vector::MotionVector;

struct ActiveMove {
    deadline: Instant,
}

/// ノードキー(device_id/node_token)ごとの進行中連続移動
#[derive(Default)]
pub struct MoveTracker {
    moves: RwLock<HashMap<String, ActiveMove>>,
}

impl MoveTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// ContinuousMove成功を記録する。timeout_sec経過で自動的に消える
    pub async fn record(&self, node_key: &str, velocity: &MotionVector, timeout_sec: f64) {
        // 異常値も [0, 上限] に収める（NaNは0、無限大や巨大値は上限に落ちる）
        let horizon = timeout_sec.max(0.0).min(MAX_PTZ_TIMEOUT_SEC);
        let deadline = Instant::now() + Duration::from_secs_f64(horizon);
        debug!(
            node_key = %node_key,
            pan = ?velocity.pan,
            tilt = ?velocity.tilt,
            zoom = ?velocity.zoom,
            timeout_sec = horizon,
            "continuous move tracked"
        );
        self.moves
            .write()
            .await
            .insert(node_key.to_string(), ActiveMove { deadline });
    }

    /// Stop成功でエントリを消す
    pub async fn clear(&self, node_key: &str) {
        if self.moves.write().await.remove(node_key).is_some() {
            debug!(node_key = %node_key, "continuous move cleared");
        }
    }

    /// ノードで連続移動が進行中か。期限切れはここで刈り取る
    pub async fn is_moving(&self, node_key: &str) -> bool {
        let mut moves = self.moves.write().await;
        let now = Instant::now();
        moves.retain(|_, m| m.deadline > now);
        moves.contains_key(node_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_record_then_clear() {
        let tracker = MoveTracker::new();
        assert!(!tracker.is_moving("cam-a/node0").await);

        let v = MotionVector {
            pan: Some(0.5),
            ..Default::default()
        };
        tracker.record("cam-a/node0", &v, 30.0).await;
        assert!(tracker.is_moving("cam-a/node0").await);
        assert!(!tracker.is_moving("cam-b/node0").await);

        tracker.clear("cam-a/node0").await;
        assert!(!tracker.is_moving("cam-a/node0").await);
    }

    #[tokio::test]
    async fn test_entry_expires_after_timeout() {
        let tracker = MoveTracker::new();
        let v = MotionVector {
            tilt: Some(-0.2),
            ..Default::default()
        };
        tracker.record("cam-a/node0", &v, 0.05).await;
        assert!(tracker.is_moving("cam-a/node0").await);

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(!tracker.is_moving("cam-a/node0").await);
    }

    #[tokio::test]
    async fn test_rerecord_extends_deadline() {
        let tracker = MoveTracker::new();
        let v = MotionVector {
            pan: Some(1.0),
            ..Default::default()
        };
        tracker.record("cam-a/node0", &v, 0.05).await;
        tracker.record("cam-a/node0", &v, 30.0).await;

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(tracker.is_moving("cam-a/node0").await);
    }

    // Duration変換を超える巨大horizonでも記録は成立する
    #[tokio::test]
    async fn test_record_caps_oversized_horizon() {
        let tracker = MoveTracker::new();
        let v = MotionVector {
            pan: Some(0.1),
            ..Default::default()
        };
        tracker.record("cam-a/node0", &v, 1e29).await;
        assert!(tracker.is_moving("cam-a/node0").await);

        tracker.record("cam-a/node0", &v, f64::INFINITY).await;
        assert!(tracker.is_moving("cam-a/node0").await);

        // NaNは0扱いになり、即座に期限切れとして扱える
        tracker.record("cam-b/node0", &v, f64::NAN).await;
        assert!(!tracker.is_moving("cam-b/node0").await);
    }
}
