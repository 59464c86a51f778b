//! DispatchOrchestrator
//!
//! 論理指令の解決・ファンアウト・集約。連続移動の進行帳簿も持つ。

pub mod service;
pub mod tracker;
pub mod types;

pub use service::{DispatchOrchestrator, DEFAULT_DISPATCH_CONCURRENCY};
pub use tracker::MoveTracker;
pub use types::{DispatchOutcome, TargetOutcome};
