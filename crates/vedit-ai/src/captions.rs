//! Caption cues and SubRip rendering.

use crate::transcribe::RecognitionResult;
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// One timed caption, numbered from 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptionCue {
    pub id: usize,
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// One cue per recognized segment, in segment order, with text trimmed.
pub fn build_captions(result: &RecognitionResult) -> Vec<CaptionCue> {
    result
        .segments
        .iter()
        .enumerate()
        .map(|(i, segment)| CaptionCue {
            id: i + 1,
            start: segment.start,
            end: segment.end,
            text: segment.text.trim().to_string(),
        })
        .collect()
}

/// Format seconds as `HH:MM:SS,mmm`. Milliseconds are truncated, not
/// rounded; negative input clamps to zero.
pub fn format_srt_time(seconds: f64) -> String {
    let seconds = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };
    // The epsilon keeps values like 1.001 (stored as 1.00099...) on their ms.
    let total_ms = (seconds * 1000.0 + 1e-6).floor() as u64;
    let ms = total_ms % 1000;
    let total_secs = total_ms / 1000;
    format!(
        "{:02}:{:02}:{:02},{:03}",
        total_secs / 3600,
        (total_secs % 3600) / 60,
        total_secs % 60,
        ms
    )
}

/// Render cues as a SubRip document.
pub fn render_srt(cues: &[CaptionCue]) -> String {
    let mut out = String::new();
    for cue in cues {
        let _ = write!(
            out,
            "{}\n{} --> {}\n{}\n\n",
            cue.id,
            format_srt_time(cue.start),
            format_srt_time(cue.end),
            cue.text
        );
    }
    out
}
