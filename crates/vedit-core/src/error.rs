//! Error types for VEdit.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Main error type for VEdit operations.
#[derive(Error, Debug)]
pub enum VeditError {
    #[error("Invalid parameter: {0}")]
    Validation(String),

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Model load error: {0}")]
    ModelLoad(String),

    #[error("Recognition error: {0}")]
    Recognition(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("{operation} timed out after {}s", .after.as_secs_f64())]
    Timeout {
        operation: String,
        after: Duration,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification of a [`VeditError`].
///
/// Callers branch on this rather than on message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Engine,
    ModelLoad,
    Recognition,
    NotFound,
    Timeout,
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Engine => "engine",
            Self::ModelLoad => "model_load",
            Self::Recognition => "recognition",
            Self::NotFound => "not_found",
            Self::Timeout => "timeout",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl VeditError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Engine(_) => ErrorKind::Engine,
            Self::ModelLoad(_) => ErrorKind::ModelLoad,
            Self::Recognition(_) => ErrorKind::Recognition,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Io(e) if e.kind() == std::io::ErrorKind::NotFound => ErrorKind::NotFound,
            Self::Io(_) | Self::Serialization(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
}

impl Clone for VeditError {
    fn clone(&self) -> Self {
        match self {
            Self::Validation(m) => Self::Validation(m.clone()),
            Self::Engine(m) => Self::Engine(m.clone()),
            Self::ModelLoad(m) => Self::ModelLoad(m.clone()),
            Self::Recognition(m) => Self::Recognition(m.clone()),
            Self::NotFound(m) => Self::NotFound(m.clone()),
            Self::Timeout { operation, after } => Self::Timeout {
                operation: operation.clone(),
                after: *after,
            },
            // io::Error is not Clone; keep its kind so classification survives.
            Self::Io(e) => Self::Io(std::io::Error::new(e.kind(), e.to_string())),
            Self::Serialization(m) => Self::Serialization(m.clone()),
            Self::Internal(m) => Self::Internal(m.clone()),
        }
    }
}

/// Result type alias for VEdit operations.
pub type Result<T> = std::result::Result<T, VeditError>;
