use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, HomeCloudError>;

#[derive(Error, Debug)]
pub enum HomeCloudError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Path escapes storage root: {0}")]
    PathEscape(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Storage limit exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("No free name for {} after {attempts} attempts", path.display())]
    CollisionProbeExhausted { path: PathBuf, attempts: u32 },

    #[error("Watch subscription failed: {0}")]
    WatchSubscription(String),

    #[error("Usage recompute failed: {0}")]
    Recompute(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Watcher error: {0}")]
    Notify(#[from] notify::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl HomeCloudError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn path_escape(msg: impl Into<String>) -> Self {
        Self::PathEscape(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    pub fn quota_exceeded(msg: impl Into<String>) -> Self {
        Self::QuotaExceeded(msg.into())
    }

    pub fn authentication(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    pub fn watch_subscription(msg: impl Into<String>) -> Self {
        Self::WatchSubscription(msg.into())
    }

    pub fn recompute(msg: impl Into<String>) -> Self {
        Self::Recompute(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// HTTP status a handler should answer with for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::PathEscape(_) | Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::QuotaExceeded(_) => StatusCode::INSUFFICIENT_STORAGE,
            Self::Authentication(_) => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client errors are reported as-is, server errors are not echoed back.
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }
}

impl IntoResponse for HomeCloudError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = if self.is_client_error() || status == StatusCode::INSUFFICIENT_STORAGE {
            self.to_string()
        } else {
            tracing::error!("Request failed: {}", self);
            "Internal server error".to_string()
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
