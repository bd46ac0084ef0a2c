//! Error types for the pulse pipeline.
//!
//! All errors use `thiserror` for ergonomic error handling and proper error chains.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for pulse operations.
pub type Result<T> = std::result::Result<T, PulseError>;

/// Main error type for the pulse pipeline.
#[derive(Error, Debug)]
pub enum PulseError {
    // Metric validation errors
    #[error("incorrect metric value {value:?}")]
    BadValue { value: String },

    #[error("unknown metric type {kind:?}")]
    UnknownKind { kind: String },

    #[error("empty metric value {kind:?}")]
    EmptyValue { kind: String },

    #[error("{kind} metric {name} doesn't exist")]
    NotFound { kind: &'static str, name: String },

    // Transport errors (retriable by clients)
    #[error("transport error: {reason}")]
    Transport { reason: String },

    // Persistent storage errors (non-fatal to the request path)
    #[error("storage backend error: {reason}")]
    Backend { reason: String },

    #[error("database migration failed: {reason}")]
    MigrationFailed { reason: String },

    // Admission errors
    #[error("authentication failed: {reason}")]
    Auth { reason: String },

    // Payload decoding errors
    #[error("decode error: {reason}")]
    Decode { reason: String },

    // Configuration errors
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    // File system errors
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Generic errors
    #[error("internal error: {0}")]
    Internal(String),
}

impl PulseError {
    /// Create a Backend error from any error type.
    pub fn backend(err: impl std::fmt::Display) -> Self {
        Self::Backend { reason: err.to_string() }
    }

    /// Create a Transport error from any error type.
    pub fn transport(err: impl std::fmt::Display) -> Self {
        Self::Transport { reason: err.to_string() }
    }

    /// Create a Decode error from any error type.
    pub fn decode(err: impl std::fmt::Display) -> Self {
        Self::Decode { reason: err.to_string() }
    }

    /// True when retrying the operation may succeed.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Backend { .. })
    }
}
