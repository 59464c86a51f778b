//! PTZ Tower - ONVIF PTZ command orchestration service
//!
//! Main entry point for the PTZ Tower application.

use std::time::Duration;

use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ptz_tower::profile_registry::load_seed_devices;
use ptz_tower::state::{AppConfig, AppState};
use ptz_tower::web_api;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ptz_tower=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting PTZ Tower v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = AppConfig::default();
    tracing::info!(
        host = %config.host,
        port = config.port,
        refresh_interval_sec = config.refresh_interval_sec,
        dispatch_concurrency = config.dispatch_concurrency,
        node_wait_timeout_ms = config.node_wait_timeout_ms,
        onvif_timeout_sec = config.onvif_timeout_sec,
        "Configuration loaded"
    );

    let state = AppState::new(config);

    // Register seed devices (DEVICES_FILE, optional)
    if let Some(path) = state.config.devices_file.clone() {
        match load_seed_devices(&path) {
            Ok(devices) => {
                tracing::info!(path = %path, count = devices.len(), "Seed devices loaded");
                for device in devices {
                    let device_id = device.device_id.clone();
                    if let Err(e) = state.registry.add_device(device).await {
                        tracing::error!(device_id = %device_id, error = %e, "Seed device rejected");
                        continue;
                    }
                    // 初回refreshの失敗は登録を取り消さない。再接続ループが拾う
                    if let Err(e) = state.registry.refresh(&device_id).await {
                        tracing::warn!(device_id = %device_id, error = %e, "Initial refresh failed");
                    }
                }
            }
            Err(e) => {
                tracing::error!(path = %path, error = %e, "Seed device file unusable");
            }
        }
    }

    // Start reconnect loop（未接続デバイスの定期再照会）
    let registry = state.registry.clone();
    let interval_sec = state.config.refresh_interval_sec.max(1);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_sec));
        loop {
            interval.tick().await;
            registry.refresh_unavailable().await;
        }
    });

    // Create router
    let app = web_api::create_router(state.clone())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = format!("{}:{}", state.config.host, state.config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
