//! Uniform failure type and the response envelope handed to callers.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use vedit_core::{ErrorKind, VeditError};

/// A failed operation, as reported to callers.
///
/// Never references partial output; failed operations register nothing.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{operation} failed ({kind}): {message}")]
pub struct OperationError {
    pub operation: String,
    pub kind: ErrorKind,
    pub message: String,
}

/// Result of a public orchestrator operation.
pub type OperationResult<T> = std::result::Result<T, OperationError>;

impl OperationError {
    pub fn new(operation: impl Into<String>, error: &VeditError) -> Self {
        Self {
            operation: operation.into(),
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

/// `{ success, message, data?, error? }` response wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<OperationError>,
}

impl<T> Envelope<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(error: OperationError) -> Self {
        Self {
            success: false,
            message: error.to_string(),
            data: None,
            error: Some(error),
        }
    }

    pub fn from_result(message: impl Into<String>, result: OperationResult<T>) -> Self {
        match result {
            Ok(data) => Self::ok(message, data),
            Err(error) => Self::failure(error),
        }
    }
}
