//! Error types for the recognition subsystem.

use thiserror::Error;
use vedit_core::VeditError;

/// Errors that can occur in recognition operations.
#[derive(Debug, Error)]
pub enum AiError {
    /// The model file for a tier is not in the model directory.
    #[error("Model not found: {model_id}")]
    ModelNotFound { model_id: String },

    /// The model exists but could not be initialized.
    #[error("Model load failed: {0}")]
    LoadFailed(String),

    /// Transcription or translation failed on a loaded model.
    #[error("Recognition failed: {0}")]
    RecognitionFailed(String),

    /// The engine produced output that could not be interpreted.
    #[error("Invalid model output: {0}")]
    InvalidOutput(String),

    /// The audio input does not exist.
    #[error("Audio file not found: {0}")]
    AudioNotFound(String),

    /// The call was abandoned after its deadline.
    #[error("Recognition cancelled")]
    Cancelled,

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for recognition operations.
pub type AiResult<T> = std::result::Result<T, AiError>;

impl From<AiError> for VeditError {
    fn from(err: AiError) -> Self {
        match err {
            AiError::ModelNotFound { .. } | AiError::LoadFailed(_) => {
                VeditError::ModelLoad(err.to_string())
            }
            AiError::AudioNotFound(path) => {
                VeditError::NotFound(format!("Audio file not found: {path}"))
            }
            AiError::RecognitionFailed(_) | AiError::InvalidOutput(_) => {
                VeditError::Recognition(err.to_string())
            }
            AiError::Cancelled => VeditError::Internal(err.to_string()),
            AiError::Io(e) => VeditError::Io(e),
        }
    }
}
