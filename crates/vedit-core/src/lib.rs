//! VEdit Core - Foundation types for the media processing backend
//!
//! This crate provides the types shared by the engines and the orchestrator:
//! - Error taxonomy (validation, engine, model, recognition, not-found, timeout)
//! - Artifact descriptors and public mount layout
//! - Frame rate parsing
//! - Supervised external engine processes
//! - Bounded blocking worker pool with per-class timeouts

pub mod artifact;
pub mod error;
pub mod process;
pub mod time;
pub mod worker;

pub use artifact::{artifact_url, Artifact, ArtifactId, ArtifactKind, Mount};
pub use error::{ErrorKind, Result, VeditError};
pub use process::{run_supervised, ChildGuard, ProcessOutput};
pub use time::{approx_eq_secs, FrameRate, DURATION_SLACK_SECS};
pub use worker::{CancelFlag, OperationClass, Timeouts, WorkerPool};
