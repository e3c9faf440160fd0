//! Transform requests and their parameter checks.
//!
//! Checks run in two phases: [`TransformRequest::validate`] covers
//! everything knowable from the parameters alone and runs before any engine
//! call; [`check_against_media`] runs once the inputs have been probed.

use serde::{Deserialize, Serialize};
use vedit_core::{approx_eq_secs, Result, VeditError, DURATION_SLACK_SECS};
use vedit_media::{MediaInfo, TransformOp, DEFAULT_CRF, MAX_CRF};

fn default_crf() -> u32 {
    DEFAULT_CRF
}

/// A transform operation with its input references.
///
/// Inputs are artifact URLs or paths inside the storage root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum TransformRequest {
    Trim {
        input: String,
        start: f64,
        end: f64,
    },
    Merge {
        inputs: Vec<String>,
    },
    ChangeSpeed {
        input: String,
        factor: f64,
    },
    AdjustVolume {
        input: String,
        factor: f64,
    },
    AddFade {
        input: String,
        #[serde(default)]
        fade_in: f64,
        #[serde(default)]
        fade_out: f64,
    },
    Resize {
        input: String,
        width: u32,
        height: u32,
    },
    ExtractAudio {
        input: String,
    },
    ConvertFormat {
        input: String,
        format: String,
    },
    Compress {
        input: String,
        #[serde(default = "default_crf")]
        crf: u32,
    },
}

fn finite(name: &str, value: f64) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(VeditError::validation(format!("{name} must be a finite number")))
    }
}

fn non_negative(name: &str, value: f64) -> Result<()> {
    if finite(name, value)? < 0.0 {
        return Err(VeditError::validation(format!("{name} must be >= 0, got {value}")));
    }
    Ok(())
}

fn container_name(format: &str) -> Result<String> {
    let name = format.trim().trim_start_matches('.').to_ascii_lowercase();
    if name.is_empty() || name.len() > 8 || !name.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(VeditError::validation(format!(
            "unsupported target format '{format}'"
        )));
    }
    Ok(name)
}

impl TransformRequest {
    /// Operation name used in logs and error results.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Trim { .. } => "trim",
            Self::Merge { .. } => "merge",
            Self::ChangeSpeed { .. } => "change_speed",
            Self::AdjustVolume { .. } => "adjust_volume",
            Self::AddFade { .. } => "add_fade",
            Self::Resize { .. } => "resize",
            Self::ExtractAudio { .. } => "extract_audio",
            Self::ConvertFormat { .. } => "convert_format",
            Self::Compress { .. } => "compress",
        }
    }

    /// Input references in order.
    pub fn inputs(&self) -> Vec<&str> {
        match self {
            Self::Merge { inputs } => inputs.iter().map(String::as_str).collect(),
            Self::Trim { input, .. }
            | Self::ChangeSpeed { input, .. }
            | Self::AdjustVolume { input, .. }
            | Self::AddFade { input, .. }
            | Self::Resize { input, .. }
            | Self::ExtractAudio { input }
            | Self::ConvertFormat { input, .. }
            | Self::Compress { input, .. } => vec![input.as_str()],
        }
    }

    /// Parameter-domain checks that need no media access.
    pub fn validate(&self) -> Result<()> {
        if self.inputs().iter().any(|i| i.trim().is_empty()) {
            return Err(VeditError::validation("input reference is empty"));
        }
        match self {
            Self::Trim { start, end, .. } => {
                non_negative("start", *start)?;
                finite("end", *end)?;
                if end <= start {
                    return Err(VeditError::validation(format!(
                        "end ({end}) must be greater than start ({start})"
                    )));
                }
            }
            Self::Merge { inputs } => {
                if inputs.len() < 2 {
                    return Err(VeditError::validation("merge needs at least two inputs"));
                }
            }
            Self::ChangeSpeed { factor, .. } => {
                if finite("factor", *factor)? <= 0.0 {
                    return Err(VeditError::validation(format!(
                        "speed factor must be > 0, got {factor}"
                    )));
                }
            }
            Self::AdjustVolume { factor, .. } => non_negative("volume factor", *factor)?,
            Self::AddFade {
                fade_in, fade_out, ..
            } => {
                non_negative("fade_in", *fade_in)?;
                non_negative("fade_out", *fade_out)?;
            }
            Self::Resize { width, height, .. } => {
                if *width == 0 || *height == 0 {
                    return Err(VeditError::validation(format!(
                        "width and height must be > 0, got {width}x{height}"
                    )));
                }
            }
            Self::ConvertFormat { format, .. } => {
                container_name(format)?;
            }
            Self::Compress { crf, .. } => {
                if *crf > MAX_CRF {
                    return Err(VeditError::validation(format!(
                        "crf must be within 0..={MAX_CRF}, got {crf}"
                    )));
                }
            }
            Self::ExtractAudio { .. } => {}
        }
        Ok(())
    }

    /// The engine operation for this request. Call after [`validate`](Self::validate).
    pub fn to_op(&self) -> Result<TransformOp> {
        Ok(match self {
            Self::Trim { start, end, .. } => TransformOp::Trim {
                start: *start,
                end: *end,
            },
            Self::Merge { .. } => TransformOp::Merge,
            Self::ChangeSpeed { factor, .. } => TransformOp::ChangeSpeed { factor: *factor },
            Self::AdjustVolume { factor, .. } => TransformOp::AdjustVolume { factor: *factor },
            Self::AddFade {
                fade_in, fade_out, ..
            } => TransformOp::AddFade {
                fade_in: *fade_in,
                fade_out: *fade_out,
            },
            Self::Resize { width, height, .. } => TransformOp::Resize {
                width: *width,
                height: *height,
            },
            Self::ExtractAudio { .. } => TransformOp::ExtractAudio,
            Self::ConvertFormat { format, .. } => TransformOp::ConvertFormat {
                container: container_name(format)?,
            },
            Self::Compress { crf, .. } => TransformOp::Compress { crf: *crf },
        })
    }
}

/// Checks that depend on probed media. `media` is in input order.
pub fn check_against_media(op: &TransformOp, media: &[MediaInfo]) -> Result<()> {
    let Some(first) = media.first() else {
        return Err(VeditError::Internal("no probed inputs".into()));
    };
    let duration = first.duration;
    let exceeds =
        |value: f64| value > duration && !approx_eq_secs(value, duration, DURATION_SLACK_SECS);

    match op {
        TransformOp::Trim { end, .. } if exceeds(*end) => Err(VeditError::validation(format!(
            "end ({end}) exceeds source duration ({duration:.3}s)"
        ))),
        TransformOp::AddFade { fade_in, fade_out } if exceeds(*fade_in) || exceeds(*fade_out) => {
            Err(VeditError::validation(format!(
                "fade duration exceeds clip duration ({duration:.3}s)"
            )))
        }
        TransformOp::ExtractAudio | TransformOp::AdjustVolume { .. } if !first.has_audio => {
            Err(VeditError::not_found("input has no audio stream"))
        }
        _ => Ok(()),
    }
}
