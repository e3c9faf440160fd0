//! The operation façade over the artifact store and both engines.
//!
//! Every public operation either returns its result or an
//! [`OperationError`]; engine failures are never swallowed. Blocking engine
//! work runs on the shared [`WorkerPool`] under the class timeout, and each
//! job owns its staged files, so a job that outlives its deadline cleans up
//! after itself when the engine finally stops.

use crate::config::PipelineConfig;
use crate::envelope::{OperationError, OperationResult};
use crate::request::{check_against_media, TransformRequest};
use crate::store::{ArtifactStore, BatchReport};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use vedit_ai::{
    build_captions, catalog, render_srt, CaptionCue, ModelManager, ModelTier, RecognitionBackend,
    RecognitionRequest, RecognitionResult, TierInfo, TierStatus, WhisperCppBackend,
};
use vedit_core::{Artifact, OperationClass, Result, VeditError, WorkerPool};
use vedit_media::{
    AudioCodec, FfmpegEngine, MediaEngine, MediaInfo, TransformInput, TransformJob, TransformOp,
};

/// Language every translation produces.
pub const TRANSLATION_TARGET: &str = "en";

/// Timed captions for a media file.
#[derive(Debug, Clone, Serialize)]
pub struct CaptionSet {
    pub captions: Vec<CaptionCue>,
    pub language: String,
    pub full_text: String,
}

/// A rendered subtitle file.
#[derive(Debug, Clone, Serialize)]
pub struct SubtitleFile {
    pub artifact: Artifact,
    pub url: String,
    pub language: String,
}

/// Speech translated to [`TRANSLATION_TARGET`].
#[derive(Debug, Clone, Serialize)]
pub struct Translation {
    pub original_language: String,
    pub text: String,
    pub target_language: String,
}

fn fail(operation: &str, error: VeditError) -> OperationError {
    let error = OperationError::new(operation, &error);
    warn!(operation, kind = %error.kind, error = %error.message, "operation failed");
    error
}

/// Entry point for transform and recognition operations.
pub struct Orchestrator {
    store: Arc<ArtifactStore>,
    engine: Arc<dyn MediaEngine>,
    models: ModelManager,
    pool: WorkerPool,
    default_tier: ModelTier,
}

impl Orchestrator {
    pub fn new(
        store: Arc<ArtifactStore>,
        engine: Arc<dyn MediaEngine>,
        backend: Arc<dyn RecognitionBackend>,
        pool: WorkerPool,
        default_tier: ModelTier,
    ) -> Self {
        Self {
            models: ModelManager::new(backend, pool.clone()),
            store,
            engine,
            pool,
            default_tier,
        }
    }

    /// FFmpeg and whisper.cpp engines over the configured storage root.
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        let store = Arc::new(ArtifactStore::open(&config.storage_root)?);
        let engine = Arc::new(FfmpegEngine::new(&config.ffmpeg_path, &config.ffprobe_path));
        let backend = Arc::new(WhisperCppBackend::new(config.whisper()));
        let pool = WorkerPool::new(config.workers, config.timeouts);
        info!(
            workers = pool.capacity(),
            default_tier = %config.default_tier,
            "orchestrator ready"
        );
        Ok(Self::new(store, engine, backend, pool, config.default_tier))
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn models(&self) -> &ModelManager {
        &self.models
    }

    pub fn default_tier(&self) -> ModelTier {
        self.default_tier
    }

    /// Copy external files into the uploads area.
    pub fn import<P: AsRef<Path>>(&self, sources: &[P]) -> BatchReport {
        self.store.import_batch(sources)
    }

    // ── Transforms ──────────────────────────────────────────────

    /// Validate, run and register one transform.
    pub async fn execute(&self, request: TransformRequest) -> OperationResult<Artifact> {
        let name = request.name();
        self.run_transform(&request).await.map_err(|e| fail(name, e))
    }

    async fn run_transform(&self, request: &TransformRequest) -> Result<Artifact> {
        request.validate()?;
        let op = request.to_op()?;
        let inputs = request
            .inputs()
            .into_iter()
            .map(|reference| self.store.resolve(reference))
            .collect::<Result<Vec<PathBuf>>>()?;
        let staged = self.store.stage(&op.output_extension())?;

        info!(
            operation = op.name(),
            inputs = inputs.len(),
            id = %staged.id(),
            "starting transform"
        );
        let engine = Arc::clone(&self.engine);
        let staged = self
            .pool
            .run(OperationClass::Transform, op.name(), move |cancel| {
                let mut media = Vec::with_capacity(inputs.len());
                for path in &inputs {
                    media.push(engine.probe(path, cancel)?);
                }
                check_against_media(&op, &media)?;

                let job_inputs = inputs
                    .into_iter()
                    .zip(media)
                    .map(|(path, info)| TransformInput::new(path, Some(info)))
                    .collect();
                let job = TransformJob::new(op, job_inputs, staged.path());
                engine.run(&job, cancel)?;
                Ok(staged)
            })
            .await?;

        self.store.commit(staged)
    }

    /// Stream metadata for a stored artifact.
    pub async fn probe(&self, input: &str) -> OperationResult<MediaInfo> {
        let run = async {
            let path = self.store.resolve(input)?;
            let engine = Arc::clone(&self.engine);
            self.pool
                .run(OperationClass::Probe, "probe", move |cancel| {
                    engine.probe(&path, cancel)
                })
                .await
        };
        run.await.map_err(|e| fail("probe", e))
    }

    // ── Recognition ─────────────────────────────────────────────

    /// Convert `input` to speech audio and run `request` on the tier's model.
    async fn recognize(
        &self,
        input: &str,
        tier: Option<ModelTier>,
        request: RecognitionRequest,
        label: &str,
    ) -> Result<RecognitionResult> {
        let source = self.store.resolve(input)?;
        let tier = tier.unwrap_or(self.default_tier);
        let model = self.models.ensure_loaded(tier).await?;
        let audio = self.store.stage(AudioCodec::Pcm.extension())?;
        let engine = Arc::clone(&self.engine);

        info!(operation = label, %tier, input = %source.display(), "starting recognition");
        self.pool
            .run(OperationClass::Recognition, label, move |cancel| {
                let job = TransformJob::new(
                    TransformOp::SpeechAudio,
                    vec![TransformInput::new(source, None)],
                    audio.path(),
                );
                engine.run(&job, cancel)?;
                let result = model.recognize(audio.path(), &request, cancel)?;
                drop(audio);
                Ok(result)
            })
            .await
    }

    /// Segment-level transcript. `language = None` auto-detects.
    pub async fn transcribe(
        &self,
        input: &str,
        tier: Option<ModelTier>,
        language: Option<String>,
    ) -> OperationResult<RecognitionResult> {
        self.recognize(input, tier, RecognitionRequest::transcribe(language), "transcribe")
            .await
            .map_err(|e| fail("transcribe", e))
    }

    /// Numbered caption cues with the detected language and full text.
    pub async fn generate_captions(
        &self,
        input: &str,
        tier: Option<ModelTier>,
        language: Option<String>,
    ) -> OperationResult<CaptionSet> {
        let request = RecognitionRequest::transcribe(language).with_word_timestamps();
        let result = self
            .recognize(input, tier, request, "generate_captions")
            .await
            .map_err(|e| fail("generate_captions", e))?;
        Ok(CaptionSet {
            captions: build_captions(&result),
            language: result.language,
            full_text: result.text,
        })
    }

    /// Transcribe and store the transcript as an SRT artifact.
    pub async fn generate_subtitles(
        &self,
        input: &str,
        tier: Option<ModelTier>,
        language: Option<String>,
    ) -> OperationResult<SubtitleFile> {
        let run = async {
            let request = RecognitionRequest::transcribe(language);
            let result = self
                .recognize(input, tier, request, "generate_subtitles")
                .await?;
            let document = render_srt(&build_captions(&result));
            let artifact = self.store.write_text("srt", &document)?;
            Ok::<_, VeditError>(SubtitleFile {
                url: artifact.url.clone(),
                artifact,
                language: result.language,
            })
        };
        run.await.map_err(|e| fail("generate_subtitles", e))
    }

    /// English text from speech in any language.
    pub async fn translate(
        &self,
        input: &str,
        tier: Option<ModelTier>,
    ) -> OperationResult<Translation> {
        let result = self
            .recognize(input, tier, RecognitionRequest::translate(), "translate")
            .await
            .map_err(|e| fail("translate", e))?;
        Ok(Translation {
            original_language: result.language,
            text: result.text,
            target_language: TRANSLATION_TARGET.to_string(),
        })
    }

    /// Load a tier ahead of its first request.
    pub async fn load_model(&self, tier: ModelTier) -> OperationResult<TierStatus> {
        self.models
            .ensure_loaded(tier)
            .await
            .map_err(|e| fail("load_model", e))?;
        Ok(TierStatus {
            tier,
            state: self.models.state(tier),
        })
    }

    pub fn model_catalog(&self) -> &'static [TierInfo] {
        catalog()
    }

    pub fn model_status(&self) -> Vec<TierStatus> {
        self.models.status()
    }
}
