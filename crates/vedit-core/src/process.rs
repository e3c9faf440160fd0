//! Supervision of short-lived external engine processes.
//!
//! The child is owned by a guard for its whole life: however the caller
//! leaves (success, engine failure, cancellation, panic), the process is
//! killed if still running and always reaped.

use crate::error::{Result, VeditError};
use crate::worker::CancelFlag;
use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Captured result of a supervised process.
#[derive(Debug)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Last `max_chars` characters of stderr, for error messages.
    pub fn stderr_tail(&self, max_chars: usize) -> String {
        tail(&String::from_utf8_lossy(&self.stderr), max_chars)
    }
}

/// Keep only the last `max_chars` characters of `text`, trimmed.
pub fn tail(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    let count = text.chars().count();
    if count <= max_chars {
        return text.to_string();
    }
    text.chars().skip(count - max_chars).collect()
}

/// Owns a spawned child until it has been reaped.
pub struct ChildGuard {
    child: Option<Child>,
    label: String,
}

impl ChildGuard {
    pub fn new(child: Child, label: impl Into<String>) -> Self {
        Self {
            child: Some(child),
            label: label.into(),
        }
    }

    pub fn child_mut(&mut self) -> Option<&mut Child> {
        self.child.as_mut()
    }

    /// Kill (if running) and reap now.
    pub fn terminate(&mut self) {
        if let Some(mut child) = self.child.take() {
            if matches!(child.try_wait(), Ok(None)) {
                debug!(process = %self.label, "killing engine process");
                if let Err(e) = child.kill() {
                    warn!(process = %self.label, error = %e, "failed to kill engine process");
                }
            }
            let _ = child.wait();
        }
    }

    /// Hand the child back after it has exited on its own.
    fn finish(&mut self) -> Option<Child> {
        self.child.take()
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        self.terminate();
    }
}

fn drain<R: Read + Send + 'static>(reader: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    reader.map(|mut r| {
        std::thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = r.read_to_end(&mut buf);
            buf
        })
    })
}

fn join(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}

/// Run `cmd` to completion with stdout/stderr captured, stopping early if
/// `cancel` is raised.
pub fn run_supervised(cmd: &mut Command, label: &str, cancel: &CancelFlag) -> Result<ProcessOutput> {
    let child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                VeditError::Engine(format!("{label} executable not found: {e}"))
            } else {
                VeditError::Engine(format!("failed to spawn {label}: {e}"))
            }
        })?;

    let mut guard = ChildGuard::new(child, label);
    let (stdout, stderr) = match guard.child_mut() {
        Some(child) => (drain(child.stdout.take()), drain(child.stderr.take())),
        None => (None, None),
    };

    loop {
        if cancel.is_cancelled() {
            guard.terminate();
            join(stdout);
            join(stderr);
            return Err(VeditError::Internal(format!("{label} cancelled")));
        }
        let exited = match guard.child_mut() {
            Some(child) => child.try_wait()?,
            None => None,
        };
        if let Some(status) = exited {
            guard.finish();
            return Ok(ProcessOutput {
                status,
                stdout: join(stdout),
                stderr: join(stderr),
            });
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}
