//! Media file probing to get metadata without full decode.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Command;
use tracing::{debug, warn};
use vedit_core::{run_supervised, CancelFlag, FrameRate, Result, VeditError};

/// Metadata for a media file with at least one video stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    /// Duration in seconds.
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    /// Exact frame rate as reported by the container.
    pub frame_rate: FrameRate,
    /// `frame_rate` reduced to a float.
    pub fps: f64,
    /// Video codec identifier (e.g. `h264`).
    pub codec: String,
    pub has_audio: bool,
    pub audio_codec: Option<String>,
    pub audio_sample_rate: Option<u32>,
    /// Container format name(s) as reported by ffprobe.
    pub format: String,
    pub size_bytes: u64,
}

// ── ffprobe JSON ────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    sample_rate: Option<String>,
    duration: Option<String>,
    #[serde(default)]
    disposition: ProbeDisposition,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeDisposition {
    #[serde(default)]
    attached_pic: u8,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    format_name: Option<String>,
    duration: Option<String>,
    size: Option<String>,
}

fn parse_secs(value: Option<&String>) -> Option<f64> {
    value.and_then(|v| v.parse::<f64>().ok()).filter(|d| d.is_finite())
}

fn parse_rate(stream: &ProbeStream) -> FrameRate {
    [stream.r_frame_rate.as_ref(), stream.avg_frame_rate.as_ref()]
        .into_iter()
        .flatten()
        .filter_map(|s| s.parse::<FrameRate>().ok())
        .find(|r| r.to_fps_f64() > 0.0)
        .unwrap_or_default()
}

/// Build a [`MediaInfo`] from `ffprobe -print_format json` output.
///
/// `fallback_size` is used when the container does not report its size.
pub fn parse_ffprobe_json(json: &str, fallback_size: u64) -> Result<MediaInfo> {
    let output: ProbeOutput = serde_json::from_str(json)
        .map_err(|e| VeditError::Engine(format!("unreadable ffprobe output: {e}")))?;

    // Cover art is reported as a video stream; it is not decodable video.
    let video = output
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video") && s.disposition.attached_pic == 0)
        .ok_or_else(|| VeditError::not_found("no decodable video stream"))?;
    let audio = output
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("audio"));

    let format = output.format.as_ref();
    let duration = parse_secs(format.and_then(|f| f.duration.as_ref()))
        .or_else(|| parse_secs(video.duration.as_ref()))
        .unwrap_or(0.0);
    let size_bytes = format
        .and_then(|f| f.size.as_ref())
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(fallback_size);
    let frame_rate = parse_rate(video);

    Ok(MediaInfo {
        duration,
        width: video.width.unwrap_or(0),
        height: video.height.unwrap_or(0),
        frame_rate,
        fps: frame_rate.to_fps_f64(),
        codec: video.codec_name.clone().unwrap_or_default(),
        has_audio: audio.is_some(),
        audio_codec: audio.and_then(|a| a.codec_name.clone()),
        audio_sample_rate: audio
            .and_then(|a| a.sample_rate.as_ref())
            .and_then(|r| r.parse().ok()),
        format: format
            .and_then(|f| f.format_name.clone())
            .unwrap_or_default(),
        size_bytes,
    })
}

/// Probe `input` with the ffprobe binary at `ffprobe`.
pub fn probe_file(ffprobe: &Path, input: &Path, cancel: &CancelFlag) -> Result<MediaInfo> {
    let metadata = std::fs::metadata(input).map_err(|_| {
        VeditError::not_found(format!("File not found: {}", input.display()))
    })?;

    let mut cmd = Command::new(ffprobe);
    cmd.args(["-v", "error", "-print_format", "json", "-show_format", "-show_streams"])
        .arg(input);

    debug!(input = %input.display(), "probing media");
    let output = run_supervised(&mut cmd, "ffprobe", cancel)?;
    if !output.success() {
        let detail = output.stderr_tail(500);
        warn!(input = %input.display(), stderr = %detail, "ffprobe failed");
        return Err(VeditError::Engine(format!(
            "ffprobe exited with status {}: {detail}",
            output.status
        )));
    }

    parse_ffprobe_json(&String::from_utf8_lossy(&output.stdout), metadata.len())
}
