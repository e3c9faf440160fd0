//! VEdit Pipeline - artifact store and operation orchestrator
//!
//! Ties request validation, the artifact store and the media and
//! recognition engines into the operation set exposed to callers.

pub mod config;
pub mod envelope;
pub mod orchestrator;
pub mod request;
pub mod store;

pub use config::PipelineConfig;
pub use envelope::{Envelope, OperationError, OperationResult};
pub use orchestrator::{CaptionSet, Orchestrator, SubtitleFile, Translation, TRANSLATION_TARGET};
pub use request::{check_against_media, TransformRequest};
pub use store::{ArtifactStore, BatchItem, BatchReport, ImportOutcome, StagedOutput};
