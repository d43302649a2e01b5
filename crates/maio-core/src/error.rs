//! Error types for the MAIO model lifecycle.
//!
//! Domain errors are recoverable and carry enough context to be reported to a
//! caller as a stable code plus a message. Storage, serialization and
//! transport failures collapse into the `INTERNAL_ERROR` code.

use std::path::PathBuf;
use thiserror::Error;

use crate::models::{VersionAction, VersionStatus};

/// Main error type for the MAIO lifecycle crate.
#[derive(Debug, Error)]
pub enum MaioError {
    // Domain errors
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("{entity} named '{name}' already exists")]
    DuplicateName { entity: &'static str, name: String },

    #[error("Cannot {action} model version {version_id} while it is {from}")]
    InvalidTransition {
        version_id: i64,
        from: VersionStatus,
        action: VersionAction,
    },

    #[error("Model {model_id} has versions; its {field} cannot be changed")]
    ImmutableSignature { model_id: i64, field: &'static str },

    #[error("Invalid state for {entity} {id}: {message}")]
    InvalidState {
        entity: &'static str,
        id: i64,
        message: String,
    },

    #[error("Model version {version_id} is {status}, schedulers require DEPLOYED")]
    VersionNotDeployed {
        version_id: i64,
        status: VersionStatus,
    },

    #[error("Model version {version_id} already has a live deployment")]
    AlreadyDeployed { version_id: i64 },

    // Input errors
    #[error("Validation error for {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Invalid params: {message}")]
    InvalidParams { message: String },

    // Infrastructure errors
    #[error("Database error: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("{service} call failed: {message}")]
    External {
        service: &'static str,
        message: String,
    },

    #[error("Configuration error: {message}")]
    Config { message: String },
}

/// Result type alias for lifecycle operations.
pub type Result<T> = std::result::Result<T, MaioError>;

impl From<std::io::Error> for MaioError {
    fn from(err: std::io::Error) -> Self {
        MaioError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for MaioError {
    fn from(err: serde_json::Error) -> Self {
        MaioError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<rusqlite::Error> for MaioError {
    fn from(err: rusqlite::Error) -> Self {
        MaioError::Database {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<reqwest::Error> for MaioError {
    fn from(err: reqwest::Error) -> Self {
        MaioError::External {
            service: "http",
            message: err.to_string(),
        }
    }
}

impl MaioError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        MaioError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        MaioError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            MaioError::NotFound { .. } => "NOT_FOUND",
            MaioError::DuplicateName { .. } => "DUPLICATE_NAME",
            MaioError::InvalidTransition { .. } => "INVALID_TRANSITION",
            MaioError::ImmutableSignature { .. } => "IMMUTABLE_SIGNATURE",
            MaioError::InvalidState { .. } => "INVALID_STATE",
            MaioError::VersionNotDeployed { .. } => "VERSION_NOT_DEPLOYED",
            MaioError::AlreadyDeployed { .. } => "ALREADY_DEPLOYED",
            MaioError::Validation { .. } => "VALIDATION_ERROR",
            MaioError::InvalidParams { .. } => "INVALID_PARAMS",
            MaioError::Database { .. }
            | MaioError::Json { .. }
            | MaioError::Io { .. }
            | MaioError::External { .. }
            | MaioError::Config { .. } => "INTERNAL_ERROR",
        }
    }

    /// Convert to a JSON-RPC error code.
    ///
    /// Application codes live in -32000..-32099:
    /// - -32001: Not found
    /// - -32002: Duplicate name
    /// - -32003: Lifecycle precondition unmet (transition, state, deployment)
    /// - -32004: Immutable model signature
    /// - -32005: Validation error
    ///
    /// Invalid params map to -32602, everything else to -32603.
    pub fn to_rpc_error_code(&self) -> i32 {
        match self {
            MaioError::NotFound { .. } => -32001,
            MaioError::DuplicateName { .. } => -32002,
            MaioError::InvalidTransition { .. }
            | MaioError::InvalidState { .. }
            | MaioError::VersionNotDeployed { .. }
            | MaioError::AlreadyDeployed { .. } => -32003,
            MaioError::ImmutableSignature { .. } => -32004,
            MaioError::Validation { .. } => -32005,
            MaioError::InvalidParams { .. } => -32602,
            _ => -32603,
        }
    }

    /// True for failures the caller cannot fix by changing the request.
    pub fn is_internal(&self) -> bool {
        self.code() == "INTERNAL_ERROR"
    }
}
