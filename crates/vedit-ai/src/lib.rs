//! VEdit AI - speech recognition
//!
//! Provides:
//! - Tiered recognition models with load-once caching
//! - Transcription, translation to English and word timings (whisper.cpp)
//! - Caption cues and SubRip rendering

pub mod captions;
pub mod error;
pub mod model_manager;
pub mod transcribe;

pub use captions::{build_captions, format_srt_time, render_srt, CaptionCue};
pub use error::{AiError, AiResult};
pub use model_manager::{
    catalog, LoadedModel, ModelHandle, ModelManager, ModelTier, RecognitionBackend, SpeechModel,
    TierInfo, TierState, TierStatus,
};
pub use transcribe::{
    default_model_dir, parse_whisper_json, RecognitionRequest, RecognitionResult,
    RecognitionTask, Segment, WhisperCppBackend, WhisperCppConfig, WhisperCppModel, Word,
};
