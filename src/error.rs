//! Error taxonomy for configuration changes and their propagation.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::path::PathBuf;

/// Errors surfaced by the document store and the reconciliation pipeline.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The request body was missing or did not have the expected shape.
    #[error("Invalid serverDefinitions configuration: {0}")]
    InvalidInput(String),

    /// A removal targeted a server name that is not configured.
    #[error("Server \"{0}\" not found")]
    NotFound(String),

    /// The configuration file could not be read, parsed, or written.
    #[error("Configuration storage unavailable at {}: {reason}", path.display())]
    StorageUnavailable { path: PathBuf, reason: String },

    /// The plugin manifest could not be loaded; the tool list was not rebuilt.
    #[error("Failed to load plugin manifest from {}: {reason}", path.display())]
    ManifestLoad { path: PathBuf, reason: String },

    /// The reconciliation task itself failed (panicked or was cancelled).
    #[error("Reconciliation task failed: {0}")]
    Internal(String),
}

impl ConfigError {
    pub fn storage(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        Self::StorageUnavailable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::StorageUnavailable { .. } | Self::ManifestLoad { .. } | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message safe to return to a caller. Server-side kinds never expose
    /// paths or underlying causes.
    pub fn public_message(&self) -> String {
        match self {
            Self::InvalidInput(_) | Self::NotFound(_) => self.to_string(),
            Self::StorageUnavailable { .. } => {
                "Failed to access MCP server configuration".to_string()
            }
            Self::ManifestLoad { .. } => "Failed to refresh available tools".to_string(),
            Self::Internal(_) => "Failed to apply MCP server configuration".to_string(),
        }
    }
}

impl IntoResponse for ConfigError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.public_message() }))).into_response()
    }
}
