//! In-process stand-ins for the media engine and the recognition backend.
//!
//! Fixture "media" files hold a JSON-encoded [`MediaInfo`]; the fake engine
//! probes by parsing it and writes a computed one for every transform.

use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use vedit_ai::{
    AiError, AiResult, ModelTier, RecognitionBackend, RecognitionRequest, RecognitionResult,
    RecognitionTask, Segment, SpeechModel, Word,
};
use vedit_core::{CancelFlag, FrameRate, Result, Timeouts, VeditError, WorkerPool};
use vedit_media::{ffmpeg_failure, MediaEngine, MediaInfo, TransformJob, TransformOp};
use vedit_pipeline::{ArtifactStore, Orchestrator};

// ── Media ──────────────────────────────────────────────────────

pub fn media(duration: f64, width: u32, height: u32, has_audio: bool) -> MediaInfo {
    MediaInfo {
        duration,
        width,
        height,
        frame_rate: FrameRate::FPS_30,
        fps: 30.0,
        codec: "h264".into(),
        has_audio,
        audio_codec: has_audio.then(|| "aac".to_string()),
        audio_sample_rate: has_audio.then_some(48_000),
        format: "mov,mp4,m4a,3gp,3g2,mj2".into(),
        size_bytes: 4096,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    Succeed,
    /// Write partial output, then report an engine error.
    Fail,
    /// Write partial output and run until cancelled.
    Hang,
}

pub struct FakeEngine {
    behavior: Mutex<Behavior>,
    probes: AtomicUsize,
    jobs: Mutex<Vec<TransformJob>>,
}

impl FakeEngine {
    pub fn new(behavior: Behavior) -> Self {
        Self {
            behavior: Mutex::new(behavior),
            probes: AtomicUsize::new(0),
            jobs: Mutex::new(Vec::new()),
        }
    }

    pub fn set_behavior(&self, behavior: Behavior) {
        *self.behavior.lock() = behavior;
    }

    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    pub fn jobs(&self) -> Vec<TransformJob> {
        self.jobs.lock().clone()
    }

    fn rendered(job: &TransformJob) -> MediaInfo {
        let infos: Vec<&MediaInfo> = job.inputs.iter().filter_map(|i| i.info.as_ref()).collect();
        let mut out = infos
            .first()
            .map(|i| (*i).clone())
            .unwrap_or_else(|| media(0.0, 0, 0, true));
        match &job.op {
            TransformOp::Trim { start, end } => out.duration = end - start,
            TransformOp::Merge => {
                out.duration = infos.iter().map(|i| i.duration).sum();
                out.width = infos.iter().map(|i| i.width).max().unwrap_or(0);
                out.height = infos.iter().map(|i| i.height).max().unwrap_or(0);
                out.has_audio = true;
            }
            TransformOp::ChangeSpeed { factor } => out.duration /= factor,
            TransformOp::Resize { width, height } => {
                out.width = *width;
                out.height = *height;
            }
            _ => {}
        }
        out
    }
}

impl MediaEngine for FakeEngine {
    fn probe(&self, input: &Path, _cancel: &CancelFlag) -> Result<MediaInfo> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        let text = std::fs::read_to_string(input)
            .map_err(|_| VeditError::not_found(format!("File not found: {}", input.display())))?;
        serde_json::from_str(&text)
            .map_err(|e| VeditError::Engine(format!("unreadable media: {e}")))
    }

    fn run(&self, job: &TransformJob, cancel: &CancelFlag) -> Result<()> {
        self.jobs.lock().push(job.clone());
        let behavior = *self.behavior.lock();
        match behavior {
            Behavior::Succeed => {
                // Mirrors ffmpeg refusing to write audio from a silent clip.
                if matches!(job.op, TransformOp::SpeechAudio | TransformOp::ExtractAudio) {
                    let silent = job
                        .inputs
                        .iter()
                        .filter_map(|i| std::fs::read_to_string(&i.path).ok())
                        .filter_map(|text| serde_json::from_str::<MediaInfo>(&text).ok())
                        .any(|info| !info.has_audio);
                    if silent {
                        return Err(ffmpeg_failure(
                            "exit status: 1",
                            "Output file #0 does not contain any stream",
                        ));
                    }
                }
                let out = serde_json::to_vec(&Self::rendered(job))
                    .map_err(|e| VeditError::Serialization(e.to_string()))?;
                std::fs::write(&job.output, out)?;
                Ok(())
            }
            Behavior::Fail => {
                std::fs::write(&job.output, b"partial")?;
                Err(VeditError::Engine("simulated encoder failure".into()))
            }
            Behavior::Hang => {
                std::fs::write(&job.output, b"partial")?;
                while !cancel.is_cancelled() {
                    std::thread::sleep(Duration::from_millis(10));
                }
                Err(VeditError::Internal("cancelled".into()))
            }
        }
    }
}

// ── Recognition ────────────────────────────────────────────────

pub fn segment(start: f64, end: f64, text: &str) -> Segment {
    Segment {
        start,
        end,
        text: text.into(),
        words: None,
    }
}

pub struct FakeBackend {
    loads: AtomicUsize,
    failures_left: AtomicUsize,
    delay: Duration,
    segments: Vec<Segment>,
    language: String,
    requests: Arc<Mutex<Vec<RecognitionRequest>>>,
}

impl FakeBackend {
    pub fn new(segments: Vec<Segment>, language: &str) -> Self {
        Self {
            loads: AtomicUsize::new(0),
            failures_left: AtomicUsize::new(0),
            delay: Duration::from_millis(100),
            segments,
            language: language.into(),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Fail the next `count` loads.
    pub fn failing(self, count: usize) -> Self {
        self.failures_left.store(count, Ordering::SeqCst);
        self
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<RecognitionRequest> {
        self.requests.lock().clone()
    }
}

impl RecognitionBackend for FakeBackend {
    fn load(&self, tier: ModelTier, cancel: &CancelFlag) -> AiResult<Box<dyn SpeechModel>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        if cancel.is_cancelled() {
            return Err(AiError::Cancelled);
        }
        let failed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(AiError::LoadFailed(format!("{tier}: corrupt weights")));
        }
        Ok(Box::new(FakeModel {
            segments: self.segments.clone(),
            language: self.language.clone(),
            requests: Arc::clone(&self.requests),
        }))
    }
}

struct FakeModel {
    segments: Vec<Segment>,
    language: String,
    requests: Arc<Mutex<Vec<RecognitionRequest>>>,
}

impl SpeechModel for FakeModel {
    fn recognize(
        &mut self,
        audio: &Path,
        request: &RecognitionRequest,
        _cancel: &CancelFlag,
    ) -> AiResult<RecognitionResult> {
        if !audio.is_file() {
            return Err(AiError::AudioNotFound(audio.display().to_string()));
        }
        self.requests.lock().push(request.clone());

        let mut segments = self.segments.clone();
        if request.word_timestamps {
            for s in &mut segments {
                s.words = Some(vec![Word {
                    text: s.text.trim().to_string(),
                    start: s.start,
                    end: s.end,
                    probability: 0.9,
                }]);
            }
        }
        if request.task == RecognitionTask::Translate {
            for s in &mut segments {
                s.text = format!(" [en]{}", s.text);
            }
        }
        Ok(RecognitionResult {
            text: segments.iter().map(|s| s.text.as_str()).collect::<String>().trim().to_string(),
            language: request.language.clone().unwrap_or_else(|| self.language.clone()),
            segments,
        })
    }
}

// ── Harness ────────────────────────────────────────────────────

pub fn timeouts(secs: u64) -> Timeouts {
    Timeouts {
        probe: secs,
        transform: secs,
        model_load: secs,
        recognition: secs,
    }
}

pub struct Harness {
    pub tmp: TempDir,
    pub engine: Arc<FakeEngine>,
    pub backend: Arc<FakeBackend>,
    pub store: Arc<ArtifactStore>,
    pub orchestrator: Orchestrator,
}

impl Harness {
    pub fn new(engine: FakeEngine, backend: FakeBackend, timeouts: Timeouts) -> Self {
        let tmp = tempfile::tempdir().expect("failed to create tempdir");
        let store = Arc::new(ArtifactStore::open(tmp.path().join("storage")).unwrap());
        let engine = Arc::new(engine);
        let backend = Arc::new(backend);
        let orchestrator = Orchestrator::new(
            Arc::clone(&store),
            Arc::clone(&engine) as Arc<dyn MediaEngine>,
            Arc::clone(&backend) as Arc<dyn RecognitionBackend>,
            WorkerPool::new(4, timeouts),
            ModelTier::Base,
        );
        Self {
            tmp,
            engine,
            backend,
            store,
            orchestrator,
        }
    }

    pub fn with_engine(engine: FakeEngine) -> Self {
        Self::new(engine, FakeBackend::new(Vec::new(), "en"), timeouts(10))
    }

    /// Write a fixture and import it; returns its `/uploads/..` URL.
    pub fn upload(&self, name: &str, info: &MediaInfo) -> String {
        let path: PathBuf = self.tmp.path().join(name);
        std::fs::write(&path, serde_json::to_vec(info).unwrap()).unwrap();
        self.store.import(&path).unwrap().url
    }

    /// Files currently in `temp/`.
    pub fn temp_files(&self) -> usize {
        std::fs::read_dir(self.store.temp_dir()).unwrap().count()
    }

    /// Probe a stored artifact through the fake engine.
    pub fn read_media(&self, url: &str) -> MediaInfo {
        let path = self.store.resolve(url).unwrap();
        serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap()
    }
}
