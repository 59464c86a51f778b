//! ProfileRegistry Service
//!
//! ## 概要
//! デバイスごとのプロファイル/PTZノード構成を一元所有し、ターゲット解決に
//! 答える。refreshはスナップショットの原子的差し替えで行い、失敗時は
//! 旧スナップショットを保持する（空にするより古いまま使える方を取る）。
//!
//! ## 処理フロー (refresh)
//! 1. デバイス設定とrefresh直列化ロックを取得
//! 2. GetProfilesでプロファイル列挙
//! 3. ノード束縛のあるプロファイルごとにGetNodeで能力照会
//! 4. GetDeviceInformation（ベストエフォート）
//! 5. スナップショットArcを差し替え、availableフラグ更新

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::capability::{DEFAULT_PTZ_TIMEOUT_SEC, MAX_PTZ_TIMEOUT_SEC};
use crate::error::{Error, Result};
use crate::node_lock::NodeLockManager;
use crate::onvif_client::{DeviceConfig, DeviceInfo, PtzTransport};

use super::types::{
    AddressableTarget, CommandTarget, DeviceSnapshot, DeviceSummary, DroppedTarget, Preset,
    ProfileEntry, Resolution, TargetSelector,
};

/// デバイス1台ぶんの登録状態
struct DeviceState {
    config: DeviceConfig,
    snapshot: Option<Arc<DeviceSnapshot>>,
    available: bool,
    last_error: Option<String>,
    /// 同一デバイスのrefreshを直列化するロック
    refresh_lock: Arc<Mutex<()>>,
}

/// ProfileRegistry Service
pub struct ProfileRegistry {
    transport: Arc<dyn PtzTransport>,
    locks: Arc<NodeLockManager>,
    devices: RwLock<HashMap<String, DeviceState>>,
    /// 既知プリセット帳（キー: device_id/node_token）
    ///
    /// カメラ側のプリセットは再接続しても消えないため、refreshを
    /// 跨いで保持する。デバイス削除時にだけ破棄。
    presets: RwLock<HashMap<String, Vec<Preset>>>,
}

impl ProfileRegistry {
    pub fn new(transport: Arc<dyn PtzTransport>, locks: Arc<NodeLockManager>) -> Self {
        Self {
            transport,
            locks,
            devices: RwLock::new(HashMap::new()),
            presets: RwLock::new(HashMap::new()),
        }
    }

    /// デバイスを登録する（refreshは呼び出し側が続けて行う）
    pub async fn add_device(&self, config: DeviceConfig) -> Result<()> {
        if config.device_id.is_empty() {
            return Err(Error::Validation("device_id must not be empty".to_string()));
        }
        if config.device_id.contains('/') {
            // '/'はエンティティIDの区切りに使う
            return Err(Error::Validation(format!(
                "device_id {} must not contain '/'",
                config.device_id
            )));
        }
        if config.endpoint.is_empty() {
            return Err(Error::Validation("endpoint must not be empty".to_string()));
        }

        let mut devices = self.devices.write().await;
        if devices.contains_key(&config.device_id) {
            return Err(Error::Conflict(format!(
                "device {} already registered",
                config.device_id
            )));
        }
        info!(device_id = %config.device_id, endpoint = %config.endpoint, "device registered");
        devices.insert(
            config.device_id.clone(),
            DeviceState {
                config,
                snapshot: None,
                available: false,
                last_error: None,
                refresh_lock: Arc::new(Mutex::new(())),
            },
        );
        Ok(())
    }

    /// デバイスを削除し、プリセット帳とノードロックも破棄する
    pub async fn remove_device(&self, device_id: &str) -> Result<()> {
        {
            let mut devices = self.devices.write().await;
            if devices.remove(device_id).is_none() {
                return Err(Error::NotFound(format!(
                    "device {} not registered",
                    device_id
                )));
            }
        }
        let prefix = format!("{}/", device_id);
        self.presets
            .write()
            .await
            .retain(|key, _| !key.starts_with(&prefix));
        self.locks.remove_device(device_id).await;
        info!(device_id = %device_id, "device removed");
        Ok(())
    }

    /// プロファイル/ノード構成を照会し直す
    ///
    /// 失敗時は旧スナップショットを残したままavailable=falseにする。
    pub async fn refresh(&self, device_id: &str) -> Result<()> {
        // 1. 設定と直列化ロックを取得
        let (config, refresh_lock) = {
            let devices = self.devices.read().await;
            let state = devices.get(device_id).ok_or_else(|| {
                Error::NotFound(format!("device {} not registered", device_id))
            })?;
            (state.config.clone(), state.refresh_lock.clone())
        };

        // 2. 同一デバイスのrefreshは直列化（別デバイスは並行可）
        let _refresh_guard = refresh_lock.lock().await;

        match self.fetch_snapshot(&config).await {
            Ok(snapshot) => {
                let ptz_profiles = snapshot
                    .profiles
                    .iter()
                    .filter(|p| p.node.is_some())
                    .count();
                let mut devices = self.devices.write().await;
                // refresh中に削除されていたら結果は捨てる
                if let Some(state) = devices.get_mut(device_id) {
                    state.snapshot = Some(Arc::new(snapshot));
                    state.available = true;
                    state.last_error = None;
                }
                info!(
                    device_id = %device_id,
                    ptz_profiles = ptz_profiles,
                    "profile snapshot refreshed"
                );
                Ok(())
            }
            Err(e) => {
                let mut devices = self.devices.write().await;
                if let Some(state) = devices.get_mut(device_id) {
                    state.available = false;
                    state.last_error = Some(e.to_string());
                }
                warn!(
                    device_id = %device_id,
                    error = %e,
                    "profile refresh failed; keeping previous snapshot"
                );
                Err(e)
            }
        }
    }

    async fn fetch_snapshot(&self, config: &DeviceConfig) -> Result<DeviceSnapshot> {
        // 2. プロファイル列挙
        let descriptors = self.transport.get_profiles(config).await?;

        // 3. ノード束縛のあるプロファイルごとに能力照会
        let mut profiles = Vec::with_capacity(descriptors.len());
        for desc in descriptors {
            let node = match &desc.node_token {
                Some(token) => match self.transport.get_node(config, token).await {
                    Ok(mut node) => {
                        // 広告タイムアウトは信用せず [0, 上限] に丸めて採用する
                        node.default_timeout_sec = desc
                            .default_timeout_sec
                            .unwrap_or(DEFAULT_PTZ_TIMEOUT_SEC)
                            .clamp(0.0, MAX_PTZ_TIMEOUT_SEC);
                        Some(Arc::new(node))
                    }
                    Err(e) => {
                        warn!(
                            device_id = %config.device_id,
                            node_token = %token,
                            error = %e,
                            "node query failed; profile left unaddressable"
                        );
                        None
                    }
                },
                None => None,
            };
            profiles.push(ProfileEntry {
                profile_token: desc.token,
                profile_name: desc.name,
                node,
            });
        }

        // 4. デバイス情報はベストエフォート
        let info = match self.transport.get_device_info(config).await {
            Ok(info) => info,
            Err(e) => {
                debug!(device_id = %config.device_id, error = %e, "device info query failed");
                DeviceInfo::default()
            }
        };

        Ok(DeviceSnapshot {
            info,
            profiles,
            refreshed_at: Utc::now(),
        })
    }

    /// セレクタをターゲット列に解決する
    ///
    /// 解決できなかった名前は診断（dropped)として返し、解決全体は
    /// 失敗させない。唯一の硬いエラーは明示デバイス指定が未登録の場合。
    pub async fn resolve(&self, selector: &TargetSelector) -> Result<Resolution> {
        let devices = self.devices.read().await;
        let mut res = Resolution::default();
        match selector {
            TargetSelector::Keyword(word) => {
                if !word.eq_ignore_ascii_case("all") {
                    return Err(Error::Validation(format!(
                        "unknown target keyword: {}",
                        word
                    )));
                }
                let mut ids: Vec<&String> = devices.keys().collect();
                ids.sort();
                for id in ids {
                    if let Some(state) = devices.get(id.as_str()) {
                        collect_device_targets(state, &mut res);
                    }
                }
            }
            TargetSelector::Device { device } => {
                let state = devices.get(device).ok_or_else(|| {
                    Error::NotFound(format!("device {} not registered", device))
                })?;
                collect_device_targets(state, &mut res);
            }
            TargetSelector::Entities { entities } => {
                for entity in entities {
                    resolve_entity_into(&devices, entity, &mut res);
                }
            }
        }
        Ok(res)
    }

    /// 単一エンティティの解決（ステータス照会用）
    pub async fn resolve_entity(&self, entity_id: &str) -> Result<CommandTarget> {
        let selector = TargetSelector::Entities {
            entities: vec![entity_id.to_string()],
        };
        let mut res = self.resolve(&selector).await?;
        match res.targets.pop() {
            Some(target) => Ok(target),
            None => {
                let reason = res
                    .dropped
                    .first()
                    .map(|d| d.reason.clone())
                    .unwrap_or_else(|| "unknown entity".to_string());
                Err(Error::NotFound(format!("{}: {}", entity_id, reason)))
            }
        }
    }

    // === プリセット帳 ===

    /// SetPreset成功後の記録。同一IDは上書き
    pub async fn record_preset(&self, node_key: &str, preset: Preset) {
        let mut presets = self.presets.write().await;
        let book = presets.entry(node_key.to_string()).or_default();
        match book.iter_mut().find(|p| p.id == preset.id) {
            Some(existing) => *existing = preset,
            None => book.push(preset),
        }
    }

    pub async fn known_presets(&self, node_key: &str) -> Vec<Preset> {
        self.presets
            .read()
            .await
            .get(node_key)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn has_preset(&self, node_key: &str, preset_id: &str) -> bool {
        self.presets
            .read()
            .await
            .get(node_key)
            .map(|book| book.iter().any(|p| p.id == preset_id))
            .unwrap_or(false)
    }

    pub async fn preset_count(&self, node_key: &str) -> usize {
        self.presets
            .read()
            .await
            .get(node_key)
            .map(|book| book.len())
            .unwrap_or(0)
    }

    // === 照会系 ===

    pub async fn device_config(&self, device_id: &str) -> Option<DeviceConfig> {
        self.devices
            .read()
            .await
            .get(device_id)
            .map(|s| s.config.clone())
    }

    pub async fn list_devices(&self) -> Vec<DeviceSummary> {
        let devices = self.devices.read().await;
        let mut ids: Vec<&String> = devices.keys().collect();
        ids.sort();
        ids.into_iter()
            .filter_map(|id| devices.get(id.as_str()))
            .map(|state| DeviceSummary {
                device_id: state.config.device_id.clone(),
                name: state.config.name.clone(),
                endpoint: state.config.endpoint.clone(),
                available: state.available,
                ptz_profile_count: state
                    .snapshot
                    .as_ref()
                    .map(|s| s.profiles.iter().filter(|p| p.node.is_some()).count())
                    .unwrap_or(0),
                info: state.snapshot.as_ref().map(|s| s.info.clone()),
                refreshed_at: state.snapshot.as_ref().map(|s| s.refreshed_at),
                last_error: state.last_error.clone(),
            })
            .collect()
    }

    /// アドレス可能集合: ノード束縛のある(デバイス, プロファイル)全組
    pub async fn addressable(&self) -> Vec<AddressableTarget> {
        let devices = self.devices.read().await;
        let mut ids: Vec<&String> = devices.keys().collect();
        ids.sort();
        let mut out = Vec::new();
        for id in ids {
            let Some(state) = devices.get(id.as_str()) else {
                continue;
            };
            let Some(snapshot) = &state.snapshot else {
                continue;
            };
            let device_name = display_device_name(&state.config);
            for entry in &snapshot.profiles {
                if let Some(node) = &entry.node {
                    out.push(AddressableTarget {
                        entity_id: format!("{}/{}", state.config.device_id, entry.profile_token),
                        device_id: state.config.device_id.clone(),
                        device_name: device_name.to_string(),
                        profile_token: entry.profile_token.clone(),
                        profile_name: entry.profile_name.clone(),
                        display_name: format!(
                            "{} {} PTZ",
                            device_name, entry.profile_name
                        ),
                        node: node.as_ref().clone(),
                    });
                }
            }
        }
        out
    }

    pub async fn unavailable_device_ids(&self) -> Vec<String> {
        let devices = self.devices.read().await;
        let mut ids: Vec<String> = devices
            .iter()
            .filter(|(_, state)| !state.available)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// (登録台数, 接続可能台数)
    pub async fn counts(&self) -> (usize, usize) {
        let devices = self.devices.read().await;
        let available = devices.values().filter(|s| s.available).count();
        (devices.len(), available)
    }

    /// 未接続デバイスの再接続試行（バックグラウンドループから呼ばれる）
    pub async fn refresh_unavailable(&self) {
        for device_id in self.unavailable_device_ids().await {
            if let Err(e) = self.refresh(&device_id).await {
                debug!(device_id = %device_id, error = %e, "reconnect attempt failed");
            }
        }
    }
}

fn display_device_name(config: &DeviceConfig) -> &str {
    if config.name.is_empty() {
        &config.device_id
    } else {
        &config.name
    }
}

fn collect_device_targets(state: &DeviceState, res: &mut Resolution) {
    let Some(snapshot) = &state.snapshot else {
        res.dropped.push(DroppedTarget {
            entity: state.config.device_id.clone(),
            reason: "device not yet refreshed".to_string(),
        });
        return;
    };
    let before = res.targets.len();
    for entry in &snapshot.profiles {
        if let Some(node) = &entry.node {
            res.targets.push(CommandTarget {
                device: state.config.clone(),
                profile_token: entry.profile_token.clone(),
                profile_name: entry.profile_name.clone(),
                node: node.clone(),
            });
        }
    }
    if res.targets.len() == before {
        res.dropped.push(DroppedTarget {
            entity: state.config.device_id.clone(),
            reason: "no PTZ-capable profiles".to_string(),
        });
    }
}

fn resolve_entity_into(
    devices: &HashMap<String, DeviceState>,
    entity: &str,
    res: &mut Resolution,
) {
    let Some((device_id, profile_token)) = entity.split_once('/') else {
        res.dropped.push(DroppedTarget {
            entity: entity.to_string(),
            reason: "malformed entity id (expected device_id/profile_token)".to_string(),
        });
        return;
    };
    let Some(state) = devices.get(device_id) else {
        res.dropped.push(DroppedTarget {
            entity: entity.to_string(),
            reason: "unknown device".to_string(),
        });
        return;
    };
    let Some(snapshot) = &state.snapshot else {
        res.dropped.push(DroppedTarget {
            entity: entity.to_string(),
            reason: "device not yet refreshed".to_string(),
        });
        return;
    };
    let Some(entry) = snapshot
        .profiles
        .iter()
        .find(|p| p.profile_token == profile_token)
    else {
        res.dropped.push(DroppedTarget {
            entity: entity.to_string(),
            reason: "unknown profile".to_string(),
        });
        return;
    };
    match &entry.node {
        Some(node) => res.targets.push(CommandTarget {
            device: state.config.clone(),
            profile_token: entry.profile_token.clone(),
            profile_name: entry.profile_name.clone(),
            node: node.clone(),
        }),
        None => res.dropped.push(DroppedTarget {
            entity: entity.to_string(),
            reason: "profile has no PTZ node".to_string(),
        }),
    }
}

/// 起動時デバイス定義の読み込み（DeviceConfigのJSON配列）
pub fn load_seed_devices(path: &str) -> Result<Vec<DeviceConfig>> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("devices file {} unreadable: {}", path, e)))?;
    let devices: Vec<DeviceConfig> = serde_json::from_str(&raw)?;
    Ok(devices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::onvif_client::recording::{test_device, test_node, test_profile, RecordingTransport};
    use crate::onvif_client::xml::parse_iso_duration_sec;
    use crate::onvif_client::ProfileDescriptor;

    async fn registry_with_one_device() -> (Arc<RecordingTransport>, ProfileRegistry) {
        let transport = Arc::new(RecordingTransport::new());
        transport.add_profile("cam-a", test_profile("profile_1", "node0")).await;
        transport
            .add_profile(
                "cam-a",
                ProfileDescriptor {
                    token: "profile_2".to_string(),
                    name: "substream".to_string(),
                    node_token: None,
                    default_timeout_sec: None,
                },
            )
            .await;
        transport.add_node("cam-a", test_node("node0")).await;

        let registry = ProfileRegistry::new(transport.clone(), Arc::new(NodeLockManager::new()));
        registry.add_device(test_device("cam-a")).await.unwrap();
        (transport, registry)
    }

    #[tokio::test]
    async fn test_refresh_builds_addressable_snapshot() {
        let (_transport, registry) = registry_with_one_device().await;
        registry.refresh("cam-a").await.unwrap();

        let res = registry.resolve(&TargetSelector::default()).await.unwrap();
        // ノード束縛のあるprofile_1だけがアドレス可能
        assert_eq!(res.targets.len(), 1);
        assert_eq!(res.targets[0].entity_id(), "cam-a/profile_1");
        assert_eq!(res.targets[0].node_key(), "cam-a/node0");
        assert!(res.dropped.is_empty());

        let (total, available) = registry.counts().await;
        assert_eq!((total, available), (1, 1));
    }

    #[tokio::test]
    async fn test_refresh_caps_advertised_timeout() {
        let transport = Arc::new(RecordingTransport::new());
        let advertised = parse_iso_duration_sec("PT99999999999999999999999999999S").unwrap();
        transport
            .add_profile(
                "cam-a",
                ProfileDescriptor {
                    token: "profile_1".to_string(),
                    name: "main".to_string(),
                    node_token: Some("node0".to_string()),
                    default_timeout_sec: Some(advertised),
                },
            )
            .await;
        transport.add_node("cam-a", test_node("node0")).await;
        let registry = ProfileRegistry::new(transport.clone(), Arc::new(NodeLockManager::new()));
        registry.add_device(test_device("cam-a")).await.unwrap();
        registry.refresh("cam-a").await.unwrap();

        // 桁外れの広告値はスナップショットに入る前に上限へ丸められる
        let res = registry.resolve(&TargetSelector::default()).await.unwrap();
        assert_eq!(res.targets[0].node.default_timeout_sec, MAX_PTZ_TIMEOUT_SEC);
    }

    #[tokio::test]
    async fn test_refresh_failure_keeps_previous_snapshot() {
        let (transport, registry) = registry_with_one_device().await;
        registry.refresh("cam-a").await.unwrap();

        transport.set_fail_refresh("cam-a", true).await;
        let err = registry.refresh("cam-a").await.unwrap_err();
        assert!(matches!(err, Error::Connectivity(_)));

        // 旧スナップショットのまま解決できる
        let res = registry.resolve(&TargetSelector::default()).await.unwrap();
        assert_eq!(res.targets.len(), 1);

        // ただしavailableは落ちる
        let summary = &registry.list_devices().await[0];
        assert!(!summary.available);
        assert!(summary.last_error.is_some());

        // 再接続に成功すれば戻る
        transport.set_fail_refresh("cam-a", false).await;
        registry.refresh_unavailable().await;
        assert!(registry.list_devices().await[0].available);
    }

    #[tokio::test]
    async fn test_snapshot_swap_is_atomic_for_in_flight_targets() {
        let (transport, registry) = registry_with_one_device().await;
        registry.refresh("cam-a").await.unwrap();

        // 解決済みターゲットは旧Arcを保持する
        let res = registry.resolve(&TargetSelector::default()).await.unwrap();
        let held = res.targets[0].node.clone();
        assert_eq!(held.max_presets, 8);

        // ノードの能力が変わった状態でrefresh
        let mut changed = test_node("node0");
        changed.max_presets = 2;
        transport.add_node("cam-a", changed).await;
        registry.refresh("cam-a").await.unwrap();

        // 差し替え前に取ったArcは旧値のまま
        assert_eq!(held.max_presets, 8);
        // 新規解決は新値を見る
        let res = registry.resolve(&TargetSelector::default()).await.unwrap();
        assert_eq!(res.targets[0].node.max_presets, 2);
    }

    #[tokio::test]
    async fn test_resolve_entities_reports_dropped() {
        let (_transport, registry) = registry_with_one_device().await;
        registry.refresh("cam-a").await.unwrap();

        let selector = TargetSelector::Entities {
            entities: vec![
                "cam-a/profile_1".to_string(),
                "cam-a/profile_2".to_string(),
                "cam-a/profile_9".to_string(),
                "ghost/profile_1".to_string(),
                "malformed".to_string(),
            ],
        };
        let res = registry.resolve(&selector).await.unwrap();
        assert_eq!(res.targets.len(), 1);
        assert_eq!(res.dropped.len(), 4);
        assert_eq!(res.dropped[0].reason, "profile has no PTZ node");
        assert_eq!(res.dropped[1].reason, "unknown profile");
        assert_eq!(res.dropped[2].reason, "unknown device");
        assert!(res.dropped[3].reason.starts_with("malformed entity id"));
    }

    #[tokio::test]
    async fn test_resolve_device_form() {
        let (_transport, registry) = registry_with_one_device().await;
        registry.refresh("cam-a").await.unwrap();

        let res = registry
            .resolve(&TargetSelector::Device {
                device: "cam-a".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(res.targets.len(), 1);

        // 明示デバイス指定の未登録は硬いエラー
        let err = registry
            .resolve(&TargetSelector::Device {
                device: "ghost".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_resolve_rejects_unknown_keyword() {
        let (_transport, registry) = registry_with_one_device().await;
        let err = registry
            .resolve(&TargetSelector::Keyword("some".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_preset_book_survives_refresh_and_dies_with_device() {
        let (_transport, registry) = registry_with_one_device().await;
        registry.refresh("cam-a").await.unwrap();

        registry
            .record_preset(
                "cam-a/node0",
                Preset {
                    id: "p1".to_string(),
                    name: Some("entrance".to_string()),
                },
            )
            .await;
        assert!(registry.has_preset("cam-a/node0", "p1").await);

        // 同一IDは上書き
        registry
            .record_preset(
                "cam-a/node0",
                Preset {
                    id: "p1".to_string(),
                    name: Some("gate".to_string()),
                },
            )
            .await;
        let book = registry.known_presets("cam-a/node0").await;
        assert_eq!(book.len(), 1);
        assert_eq!(book[0].name.as_deref(), Some("gate"));

        // refreshを跨いで生存
        registry.refresh("cam-a").await.unwrap();
        assert!(registry.has_preset("cam-a/node0", "p1").await);

        // デバイス削除で破棄
        registry.remove_device("cam-a").await.unwrap();
        assert!(!registry.has_preset("cam-a/node0", "p1").await);
    }

    #[tokio::test]
    async fn test_add_device_validation() {
        let transport = Arc::new(RecordingTransport::new());
        let registry = ProfileRegistry::new(transport, Arc::new(NodeLockManager::new()));

        let mut bad = test_device("cam/slash");
        bad.device_id = "cam/slash".to_string();
        assert!(matches!(
            registry.add_device(bad).await,
            Err(Error::Validation(_))
        ));

        registry.add_device(test_device("cam-a")).await.unwrap();
        assert!(matches!(
            registry.add_device(test_device("cam-a")).await,
            Err(Error::Conflict(_))
        ));

        assert!(matches!(
            registry.remove_device("ghost").await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_addressable_listing() {
        let (_transport, registry) = registry_with_one_device().await;
        registry.refresh("cam-a").await.unwrap();

        let targets = registry.addressable().await;
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].entity_id, "cam-a/profile_1");
        assert_eq!(targets[0].display_name, "cam-a cam profile_1 stream PTZ");
        assert!(targets[0].node.supports_continuous);
    }
}
