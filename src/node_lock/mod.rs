//! NodeLockManager - PTZノードごとの呼び出し直列化
//!
//! ## 目的
//!
//! - 同一ノードへのPTZ呼び出しを常に1件に制限（PTZは再試行非冪等）
//! - 先行呼び出しが完了するまで短時間待機
//! - タイムアウト時はBusyを返す（コマンドの無限待ちを防ぐ)
//!
//! リースはネットワーク呼び出しの間だけ保持する。物理的な移動の
//! 継続時間はロックの対象外。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::timeout;

use crate::error::{Error, Result};

/// デフォルト待機タイムアウト（5秒）
pub const DEFAULT_WAIT_TIMEOUT_MS: u64 = 5000;

/// NodeLockManager - ノードキーごとの呼び出しを直列化
pub struct NodeLockManager {
    /// ノードキー（device_id/node_token）ごとのロック
    locks: RwLock<HashMap<String, Arc<Mutex<()>>>>,
    /// 待機タイムアウト
    wait_timeout: Duration,
}

impl NodeLockManager {
    /// 新規作成
    pub fn new() -> Self {
        Self {
            locks: RwLock::new(HashMap::new()),
            wait_timeout: Duration::from_millis(DEFAULT_WAIT_TIMEOUT_MS),
        }
    }

    /// 待機タイムアウトを指定して作成
    pub fn with_timeout(timeout_ms: u64) -> Self {
        Self {
            locks: RwLock::new(HashMap::new()),
            wait_timeout: Duration::from_millis(timeout_ms),
        }
    }

    /// ノードへの呼び出し権を取得（待機あり）
    ///
    /// - 他の呼び出しが進行中なら短時間待機
    /// - タイムアウトしたらError::Busy
    /// - 返却されたNodeLeaseがDropされると自動解放
    pub async fn acquire(&self, node_key: &str) -> Result<NodeLease> {
        let lock = self.get_or_create_lock(node_key).await;

        match timeout(self.wait_timeout, lock.clone().lock_owned()).await {
            Ok(guard) => {
                tracing::debug!(node_key = %node_key, "node lease acquired");
                Ok(NodeLease {
                    node_key: node_key.to_string(),
                    _guard: guard,
                })
            }
            Err(_) => {
                tracing::warn!(
                    node_key = %node_key,
                    timeout_ms = self.wait_timeout.as_millis(),
                    "node lease wait timed out"
                );
                Err(Error::Busy {
                    node_key: node_key.to_string(),
                    message: format!(
                        "in-flight call did not finish within {}ms",
                        self.wait_timeout.as_millis()
                    ),
                })
            }
        }
    }

    /// ノードへの呼び出し権を試行（待機なし）
    ///
    /// - 他の呼び出しが進行中なら即None
    pub async fn try_acquire(&self, node_key: &str) -> Option<NodeLease> {
        let lock = self.get_or_create_lock(node_key).await;

        match lock.clone().try_lock_owned() {
            Ok(guard) => {
                tracing::debug!(node_key = %node_key, "node lease acquired (try)");
                Some(NodeLease {
                    node_key: node_key.to_string(),
                    _guard: guard,
                })
            }
            Err(_) => {
                tracing::debug!(node_key = %node_key, "node busy");
                None
            }
        }
    }

    /// ノードキーに対応するロックを取得（なければ作成）
    async fn get_or_create_lock(&self, node_key: &str) -> Arc<Mutex<()>> {
        // 読み取りロックでまず確認
        {
            let locks = self.locks.read().await;
            if let Some(lock) = locks.get(node_key) {
                return lock.clone();
            }
        }

        // なければ書き込みロックで作成
        let mut locks = self.locks.write().await;
        locks
            .entry(node_key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// デバイス配下のロックを破棄（デバイス削除時）
    ///
    /// 進行中のリースはArc経由で生き続けるため、破棄しても安全。
    pub async fn remove_device(&self, device_id: &str) {
        let prefix = format!("{}/", device_id);
        let mut locks = self.locks.write().await;
        locks.retain(|key, _| !key.starts_with(&prefix));
    }

    /// 登録済みノード数を取得（デバッグ用）
    pub async fn lock_count(&self) -> usize {
        self.locks.read().await.len()
    }
}

impl Default for NodeLockManager {
    fn default() -> Self {
        Self::new()
    }
}

/// ノード呼び出しリース - Dropで自動解放
pub struct NodeLease {
    node_key: String,
    _guard: tokio::sync::OwnedMutexGuard<()>,
}

impl NodeLease {
    pub fn node_key(&self) -> &str {
        &self.node_key
    }
}

impl Drop for NodeLease {
    fn drop(&mut self) {
        tracing::debug!(node_key = %self.node_key, "node lease released");
    }
}
