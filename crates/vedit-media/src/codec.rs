//! Codec presets used by the transform operations.
//!
//! Every video-producing transform encodes with the same default pair
//! (H.264 + AAC) whatever container is requested. Containers whose native
//! codec family differs (WebM, Ogg) are rejected by the muxer and surface as
//! engine errors; codec choice is not adapted to the target format.

use serde::{Deserialize, Serialize};

/// Video codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VideoCodec {
    H264,
}

impl VideoCodec {
    /// FFmpeg encoder name.
    pub fn ffmpeg_encoder(self) -> &'static str {
        match self {
            Self::H264 => "libx264",
        }
    }

    /// Pixel format handed to the encoder for a `width`x`height` frame.
    ///
    /// 4:2:0 chroma needs even dimensions; odd frames are encoded 4:4:4.
    pub fn pixel_format(self, width: u32, height: u32) -> &'static str {
        if width % 2 == 0 && height % 2 == 0 {
            "yuv420p"
        } else {
            "yuv444p"
        }
    }
}

/// Audio codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AudioCodec {
    Aac,
    Mp3,
    Pcm,
}

impl AudioCodec {
    /// FFmpeg encoder name.
    pub fn ffmpeg_encoder(self) -> &'static str {
        match self {
            Self::Aac => "aac",
            Self::Mp3 => "libmp3lame",
            Self::Pcm => "pcm_s16le",
        }
    }

    /// File extension for audio-only output in this codec.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Aac => "m4a",
            Self::Mp3 => "mp3",
            Self::Pcm => "wav",
        }
    }
}

/// The fixed video/audio pair every re-encode uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodecPair {
    pub video: VideoCodec,
    pub audio: AudioCodec,
}

impl CodecPair {
    pub const DEFAULT: Self = Self {
        video: VideoCodec::H264,
        audio: AudioCodec::Aac,
    };
}

impl Default for CodecPair {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Bitrate for extracted audio tracks, in kbps.
pub const EXTRACT_AUDIO_BITRATE_KBPS: u32 = 192;

/// Encoder preset for constant-quality compression.
pub const COMPRESS_PRESET: &str = "medium";

/// Default rate factor when a compression request omits one.
pub const DEFAULT_CRF: u32 = 28;

/// libx264 accepts rate factors in `0..=51`.
pub const MAX_CRF: u32 = 51;

/// Sample rate and channel count the recognition engine expects.
pub const SPEECH_SAMPLE_RATE: u32 = 16_000;
pub const SPEECH_CHANNELS: u32 = 1;

/// Default output container for video transforms.
pub const DEFAULT_VIDEO_CONTAINER: &str = "mp4";
