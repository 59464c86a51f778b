//! PTZ Tower Library
//!
//! ONVIF PTZ command orchestration tower
//!
//! ## Architecture (8 Components)
//!
//! 1. CapabilityModel - What a device/profile/node combination supports
//! 2. ProfileRegistry - SSoT for the device → profile → node graph
//! 3. VectorNormalizer - Loose motion/speed input → typed vectors
//! 4. CommandTranslator - One operation + one target → one protocol call
//! 5. DispatchOrchestrator - Multi-target fan-out and aggregation
//! 6. NodeLockManager - Per-node invocation serialization
//! 7. OnvifClient - SOAP transport behind the PtzTransport trait
//! 8. WebAPI - REST command surface
//!
//! ## Design Principles
//!
//! - SSoT: ProfileRegistry is the single source of truth for targets
//! - SOLID: Single responsibility per module
//! - Partial success is success: one camera's failure never hides the rest

pub mod capability;
pub mod command_translator;
pub mod dispatch_orchestrator;
pub mod node_lock;
pub mod onvif_client;
pub mod profile_registry;
pub mod ptz_vector;
pub mod web_api;
pub mod models;
pub mod error;
pub mod state;

pub use error::{Error, Result};
pub use state::AppState;
