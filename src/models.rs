//! Shared models and types for PTZ Tower
//!
//! This module contains types shared across multiple modules
//! to avoid circular dependencies.

use serde::{Deserialize, Serialize};

/// Standard API response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_sec: u64,
    pub devices_total: usize,
    pub devices_available: usize,
    pub addressable_targets: usize,
}

/// Service identity for GET /api/status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub service: String,
    pub version: String,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

/// The abstract PTZ operations this service can dispatch
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PtzOperation {
    RelativeMove,
    AbsoluteMove,
    ContinuousMove,
    Stop,
    SetHomePosition,
    GotoHomePosition,
    SetPreset,
    GotoPreset,
}

impl PtzOperation {
    /// Parse the snake_case wire name. Unknown names are the caller's error.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "relative_move" => Some(Self::RelativeMove),
            "absolute_move" => Some(Self::AbsoluteMove),
            "continuous_move" => Some(Self::ContinuousMove),
            "stop" => Some(Self::Stop),
            "set_home_position" => Some(Self::SetHomePosition),
            "goto_home_position" => Some(Self::GotoHomePosition),
            "set_preset" => Some(Self::SetPreset),
            "goto_preset" => Some(Self::GotoPreset),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RelativeMove => "relative_move",
            Self::AbsoluteMove => "absolute_move",
            Self::ContinuousMove => "continuous_move",
            Self::Stop => "stop",
            Self::SetHomePosition => "set_home_position",
            Self::GotoHomePosition => "goto_home_position",
            Self::SetPreset => "set_preset",
            Self::GotoPreset => "goto_preset",
        }
    }
}
