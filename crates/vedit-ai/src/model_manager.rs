//! Recognition model tiers and the process-wide model cache.
//!
//! Each tier is loaded at most once per process. Concurrent first requests
//! for the same tier share a single load, which keeps running even if the
//! request that started it goes away. A failed load leaves the tier
//! unloaded so the next request retries. A ready model serves one call at a
//! time; further callers queue on it.

use crate::error::{AiError, AiResult};
use crate::transcribe::{RecognitionRequest, RecognitionResult};
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use vedit_core::{CancelFlag, OperationClass, Result, VeditError, WorkerPool};

/// How often a queued caller re-checks its cancel flag.
const QUEUE_POLL: Duration = Duration::from_millis(50);

/// Recognition model size tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    Tiny,
    #[default]
    Base,
    Small,
    Medium,
    Large,
}

impl ModelTier {
    pub const ALL: [ModelTier; 5] = [
        Self::Tiny,
        Self::Base,
        Self::Small,
        Self::Medium,
        Self::Large,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tiny => "tiny",
            Self::Base => "base",
            Self::Small => "small",
            Self::Medium => "medium",
            Self::Large => "large",
        }
    }

    /// Weights filename in the model directory.
    pub fn filename(self) -> &'static str {
        match self {
            Self::Tiny => "ggml-tiny.bin",
            Self::Base => "ggml-base.bin",
            Self::Small => "ggml-small.bin",
            Self::Medium => "ggml-medium.bin",
            Self::Large => "ggml-large-v3.bin",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for ModelTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelTier {
    type Err = VeditError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == wanted)
            .ok_or_else(|| VeditError::validation(format!("unknown model tier '{s}'")))
    }
}

/// Catalog entry describing a tier's trade-off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TierInfo {
    pub name: ModelTier,
    pub size: &'static str,
    pub speed: &'static str,
    pub accuracy: &'static str,
}

const CATALOG: [TierInfo; 5] = [
    TierInfo { name: ModelTier::Tiny, size: "39 MB", speed: "fastest", accuracy: "lowest" },
    TierInfo { name: ModelTier::Base, size: "74 MB", speed: "fast", accuracy: "good" },
    TierInfo { name: ModelTier::Small, size: "244 MB", speed: "medium", accuracy: "better" },
    TierInfo { name: ModelTier::Medium, size: "769 MB", speed: "slow", accuracy: "great" },
    TierInfo { name: ModelTier::Large, size: "1550 MB", speed: "slowest", accuracy: "best" },
];

/// All tiers, smallest first.
pub fn catalog() -> &'static [TierInfo] {
    &CATALOG
}

/// Loads model instances. Implementations block; the manager runs them on
/// the worker pool.
pub trait RecognitionBackend: Send + Sync {
    /// `cancel` is raised when the load outlives its timeout.
    fn load(&self, tier: ModelTier, cancel: &CancelFlag) -> AiResult<Box<dyn SpeechModel>>;
}

/// A loaded recognition model. Calls on one instance never overlap.
pub trait SpeechModel: Send {
    fn recognize(
        &mut self,
        audio: &Path,
        request: &RecognitionRequest,
        cancel: &CancelFlag,
    ) -> AiResult<RecognitionResult>;
}

/// Shared handle to a ready model.
pub type ModelHandle = Arc<LoadedModel>;

/// A ready model and the queue serializing calls on it.
pub struct LoadedModel {
    tier: ModelTier,
    engine: Mutex<Box<dyn SpeechModel>>,
}

impl fmt::Debug for LoadedModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedModel").field("tier", &self.tier).finish()
    }
}

impl LoadedModel {
    pub fn new(tier: ModelTier, engine: Box<dyn SpeechModel>) -> Self {
        Self {
            tier,
            engine: Mutex::new(engine),
        }
    }

    pub fn tier(&self) -> ModelTier {
        self.tier
    }

    /// Wait for the model to be free. Gives up once `cancel` is raised, so
    /// an abandoned call never runs after its deadline.
    fn acquire(&self, cancel: &CancelFlag) -> AiResult<MutexGuard<'_, Box<dyn SpeechModel>>> {
        loop {
            if cancel.is_cancelled() {
                return Err(AiError::Cancelled);
            }
            if let Some(guard) = self.engine.try_lock_for(QUEUE_POLL) {
                return Ok(guard);
            }
        }
    }

    pub fn recognize(
        &self,
        audio: &Path,
        request: &RecognitionRequest,
        cancel: &CancelFlag,
    ) -> AiResult<RecognitionResult> {
        let mut engine = self.acquire(cancel)?;
        debug!(tier = %self.tier, audio = %audio.display(), "model acquired");
        engine.recognize(audio, request, cancel)
    }

    /// Segment-level transcription. `language = None` auto-detects.
    pub fn transcribe(
        &self,
        audio: &Path,
        language: Option<&str>,
        cancel: &CancelFlag,
    ) -> AiResult<RecognitionResult> {
        let request = RecognitionRequest::transcribe(language.map(str::to_string));
        self.recognize(audio, &request, cancel)
    }

    /// Transcription with per-word timings on every segment.
    pub fn transcribe_with_word_timestamps(
        &self,
        audio: &Path,
        language: Option<&str>,
        cancel: &CancelFlag,
    ) -> AiResult<RecognitionResult> {
        let request =
            RecognitionRequest::transcribe(language.map(str::to_string)).with_word_timestamps();
        self.recognize(audio, &request, cancel)
    }

    /// English text from speech in any language.
    pub fn translate(&self, audio: &Path, cancel: &CancelFlag) -> AiResult<RecognitionResult> {
        self.recognize(audio, &RecognitionRequest::translate(), cancel)
    }
}

/// Lifecycle state of a tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierState {
    Unloaded,
    Loading,
    Ready,
}

/// A tier paired with its current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TierStatus {
    pub tier: ModelTier,
    pub state: TierState,
}

/// Result of a load, published to every waiter. `None` while it runs.
type LoadOutcome = Option<Result<ModelHandle>>;

/// A tier's slot. The in-flight load belongs to the slot, not to whichever
/// caller started it, so dropping that caller never frees the slot early.
#[derive(Default)]
enum Slot {
    #[default]
    Unloaded,
    Loading {
        generation: u64,
        outcome: watch::Receiver<LoadOutcome>,
    },
    Ready(ModelHandle),
}

type SharedSlot = Arc<Mutex<Slot>>;

/// Hand `outcome` to waiters unless an earlier outcome (a timeout) was
/// already published.
fn publish(tx: &watch::Sender<LoadOutcome>, outcome: Result<ModelHandle>) {
    tx.send_if_modified(|current| {
        if current.is_some() {
            return false;
        }
        *current = Some(outcome);
        true
    });
}

/// Record how load `generation` ended. Runs when the backend call returns,
/// so the slot stays `Loading` for exactly as long as the load occupies a
/// worker.
fn settle(slot: &Mutex<Slot>, generation: u64, tier: ModelTier, loaded: &Result<ModelHandle>) {
    let mut state = slot.lock();
    let current = matches!(&*state, Slot::Loading { generation: g, .. } if *g == generation);
    if !current {
        return;
    }
    *state = match loaded {
        Ok(handle) => {
            info!(%tier, "recognition model ready");
            Slot::Ready(Arc::clone(handle))
        }
        Err(e) => {
            warn!(%tier, error = %e, "model load failed");
            Slot::Unloaded
        }
    };
}

/// Process-wide cache of loaded recognition models.
pub struct ModelManager {
    backend: Arc<dyn RecognitionBackend>,
    pool: WorkerPool,
    slots: [SharedSlot; 5],
    generation: AtomicU64,
}

impl ModelManager {
    /// Loads run on `pool` under its model-load timeout.
    pub fn new(backend: Arc<dyn RecognitionBackend>, pool: WorkerPool) -> Self {
        Self {
            backend,
            pool,
            slots: Default::default(),
            generation: AtomicU64::new(0),
        }
    }

    fn slot(&self, tier: ModelTier) -> &SharedSlot {
        &self.slots[tier.index()]
    }

    /// Return the model for `tier`, loading it on first use.
    ///
    /// Callers arriving while a load runs wait for that load. A caller that
    /// is dropped mid-wait leaves the load running for the others.
    pub async fn ensure_loaded(&self, tier: ModelTier) -> Result<ModelHandle> {
        let mut outcome = {
            let mut slot = self.slot(tier).lock();
            match &*slot {
                Slot::Ready(handle) => return Ok(Arc::clone(handle)),
                Slot::Loading { outcome, .. } => outcome.clone(),
                Slot::Unloaded => {
                    let (generation, outcome) = self.start_load(tier);
                    *slot = Slot::Loading {
                        generation,
                        outcome: outcome.clone(),
                    };
                    outcome
                }
            }
        };

        let settled = outcome
            .wait_for(Option::is_some)
            .await
            .map_err(|_| VeditError::Internal(format!("{tier} model load was abandoned")))?
            .clone();
        settled.unwrap_or_else(|| Err(VeditError::Internal(format!("{tier} model load vanished"))))
    }

    /// Spawn the load for `tier`. The caller marks the slot `Loading`.
    fn start_load(&self, tier: ModelTier) -> (u64, watch::Receiver<LoadOutcome>) {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = watch::channel(None);
        let tx = Arc::new(tx);
        let slot = Arc::clone(self.slot(tier));
        let backend = Arc::clone(&self.backend);
        let pool = self.pool.clone();

        info!(%tier, generation, "loading recognition model");
        tokio::spawn(async move {
            let job_slot = Arc::clone(&slot);
            let job_tx = Arc::clone(&tx);
            let label = format!("load {tier} model");
            let dispatched = pool
                .run(OperationClass::ModelLoad, &label, move |cancel| {
                    let loaded = backend
                        .load(tier, cancel)
                        .map(|engine| Arc::new(LoadedModel::new(tier, engine)))
                        .map_err(VeditError::from);
                    settle(&job_slot, generation, tier, &loaded);
                    let failed = loaded.as_ref().err().cloned();
                    // A raised flag means waiters were already told it timed out.
                    if !cancel.is_cancelled() {
                        publish(&job_tx, loaded);
                    }
                    failed.map_or(Ok(()), Err)
                })
                .await;

            match dispatched {
                Ok(()) => {}
                // The backend call is still winding down; it settles the
                // slot when it returns.
                Err(e @ VeditError::Timeout { .. }) => {
                    warn!(%tier, error = %e, "model load timed out");
                    publish(&tx, Err(e));
                }
                // Either already settled by the job, or the job never ran.
                Err(e) => {
                    let failed = Err(e);
                    settle(&slot, generation, tier, &failed);
                    publish(&tx, failed);
                }
            }
        });
        (generation, rx)
    }

    pub fn state(&self, tier: ModelTier) -> TierState {
        match &*self.slot(tier).lock() {
            Slot::Unloaded => TierState::Unloaded,
            Slot::Loading { .. } => TierState::Loading,
            Slot::Ready(_) => TierState::Ready,
        }
    }

    /// State of every tier, smallest first.
    pub fn status(&self) -> Vec<TierStatus> {
        ModelTier::ALL
            .into_iter()
            .map(|tier| TierStatus {
                tier,
                state: self.state(tier),
            })
            .collect()
    }
}
