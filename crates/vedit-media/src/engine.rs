//! FFmpeg-backed transformation engine.
//!
//! Uses ffmpeg-sidecar to spawn FFmpeg as a subprocess, which works without
//! system FFmpeg development headers. The child process is held by a guard
//! for the whole call, so it is killed and reaped on every exit path,
//! including cancellation while FFmpeg is producing no output.

use crate::probe::{probe_file, MediaInfo};
use crate::transform::TransformJob;
use ffmpeg_sidecar::child::FfmpegChild;
use ffmpeg_sidecar::command::FfmpegCommand;
use ffmpeg_sidecar::event::{FfmpegEvent, LogLevel};
use parking_lot::Mutex;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};
use vedit_core::process::tail;
use vedit_core::{CancelFlag, Result, VeditError};

/// Number of engine diagnostic lines kept for error messages.
const MAX_DIAGNOSTIC_LINES: usize = 20;

/// How often a running FFmpeg checks its cancel flag.
const CANCEL_POLL: Duration = Duration::from_millis(20);

/// The transcoding/probing engine seen by the orchestrator.
pub trait MediaEngine: Send + Sync {
    /// Read stream metadata without decoding.
    fn probe(&self, input: &Path, cancel: &CancelFlag) -> Result<MediaInfo>;

    /// Execute a transform, writing `job.output`.
    fn run(&self, job: &TransformJob, cancel: &CancelFlag) -> Result<()>;
}

/// FFmpeg's complaint when every stream it was asked for is absent.
const NO_STREAM_MARKERS: [&str; 2] = ["does not contain any stream", "matches no streams"];

/// Classify a failed FFmpeg run from its exit status and error output.
///
/// A missing input stream (e.g. audio requested from a silent clip) is
/// `NotFound`; everything else is an engine failure.
pub fn ffmpeg_failure(status: impl fmt::Display, stderr: &str) -> VeditError {
    if NO_STREAM_MARKERS.iter().any(|m| stderr.contains(m)) {
        return VeditError::not_found(format!("input lacks the required stream: {stderr}"));
    }
    VeditError::Engine(format!("ffmpeg exited with status {status}: {stderr}"))
}

/// Owns an FFmpeg child until it has been reaped.
struct FfmpegGuard {
    child: Option<FfmpegChild>,
}

impl FfmpegGuard {
    fn new(child: FfmpegChild) -> Self {
        Self { child: Some(child) }
    }

    fn child(&mut self) -> Result<&mut FfmpegChild> {
        self.child
            .as_mut()
            .ok_or_else(|| VeditError::Internal("ffmpeg process already released".into()))
    }

    fn kill(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill() {
                debug!(error = %e, "ffmpeg kill failed (already exited?)");
            }
            let _ = child.wait();
        }
    }

    fn wait(&mut self) -> Result<std::process::ExitStatus> {
        let status = self.child()?.wait()?;
        self.child = None;
        Ok(status)
    }
}

impl Drop for FfmpegGuard {
    fn drop(&mut self) {
        self.kill();
    }
}

/// Configuration for the FFmpeg engine.
#[derive(Debug, Clone)]
pub struct FfmpegEngine {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl FfmpegEngine {
    pub fn new(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    pub fn ffmpeg_path(&self) -> &Path {
        &self.ffmpeg
    }

    pub fn ffprobe_path(&self) -> &Path {
        &self.ffprobe
    }

    /// Check if FFmpeg is runnable.
    pub fn is_available(&self) -> bool {
        std::process::Command::new(&self.ffmpeg)
            .arg("-version")
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }
}

impl Default for FfmpegEngine {
    fn default() -> Self {
        Self::new("ffmpeg", "ffprobe")
    }
}

impl MediaEngine for FfmpegEngine {
    fn probe(&self, input: &Path, cancel: &CancelFlag) -> Result<MediaInfo> {
        probe_file(&self.ffprobe, input, cancel)
    }

    fn run(&self, job: &TransformJob, cancel: &CancelFlag) -> Result<()> {
        let op = job.op.name();
        let args = job.ffmpeg_args();
        info!(
            operation = op,
            inputs = job.inputs.len(),
            output = %job.output.display(),
            "running ffmpeg"
        );
        debug!(args = ?args, "ffmpeg arguments");

        let child = FfmpegCommand::new_with_path(&self.ffmpeg)
            .args(&args)
            .spawn()
            .map_err(|e| VeditError::Engine(format!("Failed to spawn ffmpeg: {e}")))?;
        let mut guard = FfmpegGuard::new(child);

        let events = guard
            .child()?
            .iter()
            .map_err(|e| VeditError::Engine(format!("Failed to read ffmpeg output: {e}")))?;

        // FFmpeg can sit silently (e.g. opening a stalled input), so the
        // cancel flag is watched on a timer rather than per event. Killing the
        // child closes its output and ends the event stream.
        let guard = Mutex::new(guard);
        let finished = AtomicBool::new(false);
        let mut diagnostics: Vec<String> = Vec::new();
        std::thread::scope(|scope| {
            scope.spawn(|| {
                while !finished.load(Ordering::Acquire) {
                    if cancel.is_cancelled() {
                        debug!(operation = op, "cancel raised, killing ffmpeg");
                        guard.lock().kill();
                        return;
                    }
                    std::thread::sleep(CANCEL_POLL);
                }
            });

            for event in events {
                if cancel.is_cancelled() {
                    break;
                }
                match event {
                    FfmpegEvent::Error(line)
                    | FfmpegEvent::Log(LogLevel::Error, line)
                    | FfmpegEvent::Log(LogLevel::Fatal, line) => {
                        if diagnostics.len() == MAX_DIAGNOSTIC_LINES {
                            diagnostics.remove(0);
                        }
                        diagnostics.push(line);
                    }
                    _ => {}
                }
            }
            finished.store(true, Ordering::Release);
        });

        let mut guard = guard.into_inner();
        if cancel.is_cancelled() {
            guard.kill();
            return Err(VeditError::Internal(format!("{op} cancelled")));
        }

        let status = guard.wait()?;
        if !status.success() {
            let detail = tail(&diagnostics.join("\n"), 1000);
            warn!(operation = op, status = %status, stderr = %detail, "ffmpeg failed");
            return Err(ffmpeg_failure(status, &detail));
        }

        let written = std::fs::metadata(&job.output).map(|m| m.len()).unwrap_or(0);
        if written == 0 {
            return Err(VeditError::Engine(format!(
                "ffmpeg produced no output for {op}"
            )));
        }

        debug!(operation = op, bytes = written, "ffmpeg finished");
        Ok(())
    }
}
