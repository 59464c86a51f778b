//! Application state
//!
//! Holds all shared components and state

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::command_translator::CommandTranslator;
use crate::dispatch_orchestrator::{DispatchOrchestrator, DEFAULT_DISPATCH_CONCURRENCY};
use crate::node_lock::{NodeLockManager, DEFAULT_WAIT_TIMEOUT_MS};
use crate::onvif_client::OnvifPtzClient;
use crate::profile_registry::ProfileRegistry;

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// 起動時に読み込むデバイス定義JSON（任意）
    pub devices_file: Option<String>,
    /// 未接続デバイスの再試行間隔（秒）
    pub refresh_interval_sec: u64,
    /// ファンアウトの同時実行上限
    pub dispatch_concurrency: usize,
    /// ノードリース待ちの上限（ミリ秒）
    pub node_wait_timeout_ms: u64,
    /// ONVIF HTTPリクエストのタイムアウト（秒）
    pub onvif_timeout_sec: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            devices_file: std::env::var("DEVICES_FILE").ok(),
            refresh_interval_sec: std::env::var("REFRESH_INTERVAL_SEC")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60),
            dispatch_concurrency: std::env::var("DISPATCH_CONCURRENCY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_DISPATCH_CONCURRENCY),
            node_wait_timeout_ms: std::env::var("NODE_WAIT_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_WAIT_TIMEOUT_MS),
            onvif_timeout_sec: std::env::var("ONVIF_TIMEOUT_SEC")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
        }
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Application config
    pub config: AppConfig,
    /// ProfileRegistry（デバイス→プロファイル→ノードのSSoT）
    pub registry: Arc<ProfileRegistry>,
    /// DispatchOrchestrator（指令のファンアウトと集約）
    pub orchestrator: Arc<DispatchOrchestrator>,
    /// 起動時刻
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// 依存を配線して共有状態を組み立てる
    pub fn new(config: AppConfig) -> Self {
        let transport = Arc::new(OnvifPtzClient::new(config.onvif_timeout_sec));
        let locks = Arc::new(NodeLockManager::with_timeout(config.node_wait_timeout_ms));
        let registry = Arc::new(ProfileRegistry::new(transport.clone(), locks.clone()));
        let translator = Arc::new(CommandTranslator::new(transport, registry.clone()));
        let orchestrator = Arc::new(DispatchOrchestrator::new(
            registry.clone(),
            translator,
            locks,
            config.dispatch_concurrency,
        ));

        Self {
            config,
            registry,
            orchestrator,
            started_at: Utc::now(),
        }
    }
}
