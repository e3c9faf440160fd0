//! Bounded pool for blocking engine work.
//!
//! Transcoding and inference block a thread for as long as the external
//! engine runs. Jobs are moved onto tokio's blocking threads behind a
//! semaphore so at most `capacity` engine calls run at once and the async
//! side stays free to accept other requests.

use crate::error::{Result, VeditError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Handle that tells a running engine call to stop.
#[derive(Debug, Clone)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Create a new, unraised flag.
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    /// Signal cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Check if cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

impl Default for CancelFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// Operation classes that carry their own timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationClass {
    Probe,
    Transform,
    ModelLoad,
    Recognition,
}

impl fmt::Display for OperationClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Probe => "probe",
            Self::Transform => "transform",
            Self::ModelLoad => "model_load",
            Self::Recognition => "recognition",
        })
    }
}

/// Per-class time limits, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub probe: u64,
    pub transform: u64,
    pub model_load: u64,
    pub recognition: u64,
}

impl Timeouts {
    pub fn for_class(&self, class: OperationClass) -> Duration {
        let secs = match class {
            OperationClass::Probe => self.probe,
            OperationClass::Transform => self.transform,
            OperationClass::ModelLoad => self.model_load,
            OperationClass::Recognition => self.recognition,
        };
        Duration::from_secs(secs)
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            probe: 60,
            transform: 3600,
            model_load: 600,
            recognition: 3600,
        }
    }
}

/// Semaphore-bounded dispatcher onto blocking threads.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    capacity: usize,
    timeouts: Timeouts,
}

impl WorkerPool {
    pub fn new(capacity: usize, timeouts: Timeouts) -> Self {
        let capacity = capacity.max(1);
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
            timeouts,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of idle worker slots.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn timeouts(&self) -> &Timeouts {
        &self.timeouts
    }

    /// Run `job` on a blocking thread under the class timeout.
    ///
    /// The timeout covers execution, not the wait for a free slot. On expiry
    /// the job's [`CancelFlag`] is raised and [`VeditError::Timeout`] is
    /// returned; the slot is released only when the job itself returns.
    pub async fn run<T, F>(&self, class: OperationClass, label: &str, job: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&CancelFlag) -> Result<T> + Send + 'static,
    {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| VeditError::Internal("worker pool closed".into()))?;

        let cancel = CancelFlag::new();
        let job_cancel = cancel.clone();
        let limit = self.timeouts.for_class(class);

        debug!(%class, operation = label, "dispatching blocking job");
        let handle = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            job(&job_cancel)
        });

        match tokio::time::timeout(limit, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(VeditError::Internal(format!(
                "{label} worker failed: {join}"
            ))),
            Err(_) => {
                cancel.cancel();
                warn!(%class, operation = label, limit_secs = limit.as_secs_f64(), "job timed out");
                Err(VeditError::Timeout {
                    operation: label.to_string(),
                    after: limit,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    fn fast_timeouts() -> Timeouts {
        Timeouts {
            probe: 1,
            transform: 1,
            model_load: 1,
            recognition: 1,
        }
    }

    #[test]
    fn test_cancel_handle() {
        let cancel = CancelFlag::new();
        assert!(!cancel.is_cancelled());
        cancel.clone().cancel();
        assert!(cancel.is_cancelled());
    }

    #[test]
    fn test_timeouts_by_class() {
        let t = Timeouts::default();
        assert_eq!(t.for_class(OperationClass::Probe), Duration::from_secs(60));
        assert_eq!(t.for_class(OperationClass::ModelLoad), Duration::from_secs(600));
    }

    #[tokio::test]
    async fn test_returns_job_result() {
        let pool = WorkerPool::new(2, Timeouts::default());
        let value = pool
            .run(OperationClass::Probe, "probe", |_| Ok(41 + 1))
            .await
            .unwrap();
        assert_eq!(value, 42);
        assert_eq!(pool.available(), 2);
    }

    #[tokio::test]
    async fn test_job_error_is_passed_through() {
        let pool = WorkerPool::new(1, Timeouts::default());
        let err = pool
            .run::<(), _>(OperationClass::Transform, "trim", |_| {
                Err(VeditError::Engine("bad input".into()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, VeditError::Engine(_)));
    }

    #[tokio::test]
    async fn test_timeout_is_distinct_and_raises_cancel() {
        let pool = WorkerPool::new(1, fast_timeouts());
        let observed = Arc::new(AtomicBool::new(false));
        let seen = Arc::clone(&observed);

        let err = pool
            .run::<(), _>(OperationClass::Transform, "compress", move |cancel| {
                let started = Instant::now();
                while !cancel.is_cancelled() && started.elapsed() < Duration::from_secs(10) {
                    std::thread::sleep(Duration::from_millis(10));
                }
                seen.store(cancel.is_cancelled(), Ordering::SeqCst);
                Err(VeditError::Engine("killed".into()))
            })
            .await
            .unwrap_err();

        assert!(matches!(err, VeditError::Timeout { .. }));

        // The slot frees up once the job notices the flag and returns.
        let started = Instant::now();
        while pool.available() == 0 && started.elapsed() < Duration::from_secs(5) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(observed.load(Ordering::SeqCst));
        assert_eq!(pool.available(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrency_is_bounded() {
        let pool = WorkerPool::new(2, Timeouts::default());
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..6 {
            let pool = pool.clone();
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            tasks.push(tokio::spawn(async move {
                pool.run(OperationClass::Transform, "resize", move |_| {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(50));
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                })
                .await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }
}
