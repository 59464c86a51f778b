//! CommandTranslator
//!
//! 操作とパラメータバッグをプロトコル呼び出しへ変換する関門。
//! 型定義は types.rs、変換パイプラインは service.rs に分離。

pub mod service;
pub mod types;

pub use service::{validate_params, CommandTranslator};
pub use types::{EffectiveParams, PtzParams};
