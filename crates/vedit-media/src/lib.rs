//! VEdit Media - FFmpeg integration for media transforms
//!
//! This crate handles:
//! - Media file probing (ffprobe)
//! - Transform operations as FFmpeg argument lists
//! - Running FFmpeg with guaranteed process release

pub mod codec;
pub mod engine;
pub mod probe;
pub mod transform;

pub use codec::{AudioCodec, CodecPair, VideoCodec, DEFAULT_CRF, MAX_CRF};
pub use engine::{ffmpeg_failure, FfmpegEngine, MediaEngine};
pub use probe::{parse_ffprobe_json, probe_file, MediaInfo};
pub use transform::{TransformInput, TransformJob, TransformOp};
