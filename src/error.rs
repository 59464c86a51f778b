//! Error handling for PTZ Tower

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Validation error (malformed parameter, rejected before the wire)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Conflict (duplicate)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Operation not supported by the target's PTZ node
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// GotoPreset against a preset id that was never set
    #[error("Unknown preset: {0}")]
    UnknownPreset(String),

    /// Device unreachable (refresh or send failed before the request left)
    #[error("Connectivity error: {0}")]
    Connectivity(String),

    /// Protocol call failed after reaching the device
    #[error("Transport error: {0}")]
    Transport(String),

    /// Node serialization wait timed out (one in-flight call per node)
    #[error("Node {node_key} busy: {message}")]
    Busy { node_key: String, message: String },

    /// Config error
    #[error("Config error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            Error::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            Error::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            Error::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
            Error::Unsupported(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "UNSUPPORTED_OPERATION",
                msg.clone(),
            ),
            Error::UnknownPreset(msg) => (StatusCode::NOT_FOUND, "UNKNOWN_PRESET", msg.clone()),
            Error::Connectivity(msg) => (
                StatusCode::BAD_GATEWAY,
                "CONNECTIVITY_ERROR",
                msg.clone(),
            ),
            Error::Transport(msg) => (StatusCode::BAD_GATEWAY, "TRANSPORT_ERROR", msg.clone()),
            Error::Busy { node_key, message } => (
                StatusCode::SERVICE_UNAVAILABLE,
                "NODE_BUSY",
                format!("Node {}: {}", node_key, message),
            ),
            Error::Config(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "CONFIG_ERROR",
                msg.clone(),
            ),
            Error::Serialization(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "SERIALIZATION_ERROR",
                e.to_string(),
            ),
            Error::Http(e) => (
                StatusCode::BAD_GATEWAY,
                "HTTP_ERROR",
                e.to_string(),
            ),
            Error::Io(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "IO_ERROR",
                e.to_string(),
            ),
            Error::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                msg.clone(),
            ),
        };

        tracing::error!(
            status = %status,
            error_code = %error_code,
            message = %message,
            "Request error"
        );

        let body = Json(json!({
            "error_code": error_code,
            "message": message
        }));

        (status, body).into_response()
    }
}

impl Error {
    /// Stable code string used in per-target dispatch diagnostics.
    pub fn code(&self) -> &'static str {
        match self {
            Error::NotFound(_) => "NOT_FOUND",
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::Conflict(_) => "CONFLICT",
            Error::Unsupported(_) => "UNSUPPORTED_OPERATION",
            Error::UnknownPreset(_) => "UNKNOWN_PRESET",
            Error::Connectivity(_) => "CONNECTIVITY_ERROR",
            Error::Transport(_) => "TRANSPORT_ERROR",
            Error::Busy { .. } => "NODE_BUSY",
            Error::Config(_) => "CONFIG_ERROR",
            Error::Serialization(_) => "SERIALIZATION_ERROR",
            Error::Http(_) => "HTTP_ERROR",
            Error::Io(_) => "IO_ERROR",
            Error::Internal(_) => "INTERNAL_ERROR",
        }
    }
}
