//! ProfileRegistry Module
//!
//! デバイス→プロファイル→PTZノードのグラフを一元所有する。
//! 他コンポーネントは読むだけで、ディスパッチ中に書き換えない。

pub mod service;
pub mod types;

pub use service::{load_seed_devices, ProfileRegistry};
pub use types::{
    AddressableTarget, CommandTarget, DeviceSnapshot, DeviceSummary, DroppedTarget, Preset,
    ProfileEntry, Resolution, TargetSelector,
};
