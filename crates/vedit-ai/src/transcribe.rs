//! Speech recognition through whisper.cpp run as a sidecar process.
//!
//! A loaded [`WhisperCppModel`] is a checked (binary, weights) pair; every
//! recognition call runs the binary against a 16 kHz mono WAV and parses the
//! full JSON it writes next to a scratch prefix.

use crate::error::{AiError, AiResult};
use crate::model_manager::{ModelTier, RecognitionBackend, SpeechModel};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, warn};
use uuid::Uuid;
use vedit_core::{run_supervised, CancelFlag, VeditError};

/// A single word with timing information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Word {
    pub text: String,
    /// Start time in seconds.
    pub start: f64,
    /// End time in seconds.
    pub end: f64,
    /// Token probability (0.0 to 1.0), lowest across the word's pieces.
    pub probability: f32,
}

/// A timed span of recognized speech.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start: f64,
    pub end: f64,
    /// Text exactly as the engine produced it (usually with a leading space).
    pub text: String,
    /// Present only when word timestamps were requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub words: Option<Vec<Word>>,
}

/// Output of a transcription or translation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionResult {
    pub text: String,
    /// Detected or requested language code.
    pub language: String,
    pub segments: Vec<Segment>,
}

impl RecognitionResult {
    /// All words across segments, in order. Empty without word timestamps.
    pub fn words(&self) -> impl Iterator<Item = &Word> {
        self.segments
            .iter()
            .filter_map(|s| s.words.as_ref())
            .flatten()
    }
}

/// What a recognition call should produce.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RecognitionTask {
    /// Text in the spoken language.
    #[default]
    Transcribe,
    /// English text whatever the spoken language.
    Translate,
}

/// Parameters for one recognition call.
#[derive(Debug, Clone, Default)]
pub struct RecognitionRequest {
    pub task: RecognitionTask,
    pub language: Option<String>,
    pub word_timestamps: bool,
}

impl RecognitionRequest {
    pub fn transcribe(language: Option<String>) -> Self {
        Self {
            task: RecognitionTask::Transcribe,
            language,
            word_timestamps: false,
        }
    }

    pub fn with_word_timestamps(mut self) -> Self {
        self.word_timestamps = true;
        self
    }

    pub fn translate() -> Self {
        Self {
            task: RecognitionTask::Translate,
            language: None,
            word_timestamps: false,
        }
    }
}

/// Configuration for the whisper.cpp backend.
#[derive(Debug, Clone)]
pub struct WhisperCppConfig {
    /// Path to the whisper.cpp binary.
    pub binary: PathBuf,
    /// Directory holding `ggml-*.bin` weights.
    pub model_dir: PathBuf,
    /// Number of threads to use.
    pub threads: u32,
}

impl Default for WhisperCppConfig {
    fn default() -> Self {
        Self {
            binary: Self::find_whisper_binary(),
            model_dir: default_model_dir(),
            threads: num_cpus::get() as u32,
        }
    }
}

impl WhisperCppConfig {
    /// Search PATH for a whisper.cpp binary.
    pub fn find_whisper_binary() -> PathBuf {
        for name in &["whisper-cli", "whisper-cpp", "whisper", "main"] {
            if which::which(name).is_ok() {
                return PathBuf::from(name);
            }
        }
        PathBuf::from("whisper-cli")
    }
}

/// `<cache>/vedit/models`, or `./models` when no cache dir is known.
pub fn default_model_dir() -> PathBuf {
    dirs::cache_dir()
        .map(|d| d.join("vedit").join("models"))
        .unwrap_or_else(|| PathBuf::from("models"))
}

/// Loads whisper.cpp models from a directory of ggml weights.
#[derive(Debug, Clone)]
pub struct WhisperCppBackend {
    config: WhisperCppConfig,
}

impl WhisperCppBackend {
    pub fn new(config: WhisperCppConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &WhisperCppConfig {
        &self.config
    }

    /// Local path of the weights for `tier` (may not exist yet).
    pub fn model_path(&self, tier: ModelTier) -> PathBuf {
        self.config.model_dir.join(tier.filename())
    }

    fn binary_resolves(&self) -> bool {
        let binary = &self.config.binary;
        if binary.components().count() > 1 {
            binary.is_file()
        } else {
            which::which(binary).is_ok()
        }
    }
}

impl RecognitionBackend for WhisperCppBackend {
    fn load(&self, tier: ModelTier, cancel: &CancelFlag) -> AiResult<Box<dyn SpeechModel>> {
        if cancel.is_cancelled() {
            return Err(AiError::Cancelled);
        }
        let model_path = self.model_path(tier);
        let size = match std::fs::metadata(&model_path) {
            Ok(meta) => meta.len(),
            Err(_) => {
                return Err(AiError::ModelNotFound {
                    model_id: format!("{tier} ({})", model_path.display()),
                })
            }
        };
        if size == 0 {
            return Err(AiError::LoadFailed(format!(
                "model file is empty: {}",
                model_path.display()
            )));
        }
        if !self.binary_resolves() {
            return Err(AiError::LoadFailed(format!(
                "whisper.cpp binary not found: {}",
                self.config.binary.display()
            )));
        }

        info!(%tier, model = %model_path.display(), bytes = size, "whisper model ready");
        Ok(Box::new(WhisperCppModel {
            binary: self.config.binary.clone(),
            model_path,
            threads: self.config.threads.max(1),
        }))
    }
}

/// A whisper.cpp model bound to its weights file.
#[derive(Debug)]
pub struct WhisperCppModel {
    binary: PathBuf,
    model_path: PathBuf,
    threads: u32,
}

/// Removes whisper's JSON output on drop.
struct ScratchFile(PathBuf);

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if self.0.exists() {
            if let Err(e) = std::fs::remove_file(&self.0) {
                debug!(path = %self.0.display(), error = %e, "failed to remove scratch file");
            }
        }
    }
}

impl WhisperCppModel {
    fn command(&self, audio: &Path, prefix: &Path, request: &RecognitionRequest) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("-m")
            .arg(&self.model_path)
            .arg("-f")
            .arg(audio)
            .arg("-ojf")
            .arg("-of")
            .arg(prefix)
            .arg("-np")
            .arg("-t")
            .arg(self.threads.to_string())
            .arg("-l")
            .arg(request.language.as_deref().unwrap_or("auto"));
        if request.task == RecognitionTask::Translate {
            cmd.arg("-tr");
        }
        cmd
    }
}

impl SpeechModel for WhisperCppModel {
    fn recognize(
        &mut self,
        audio: &Path,
        request: &RecognitionRequest,
        cancel: &CancelFlag,
    ) -> AiResult<RecognitionResult> {
        if !audio.is_file() {
            return Err(AiError::AudioNotFound(audio.display().to_string()));
        }

        let prefix = std::env::temp_dir().join(format!("vedit-whisper-{}", Uuid::new_v4()));
        let scratch = ScratchFile(prefix.with_extension("json"));

        info!(
            audio = %audio.display(),
            model = %self.model_path.display(),
            task = ?request.task,
            "Starting recognition"
        );
        let mut cmd = self.command(audio, &prefix, request);
        let output = run_supervised(&mut cmd, "whisper.cpp", cancel).map_err(|e| match e {
            _ if cancel.is_cancelled() => AiError::Cancelled,
            VeditError::Engine(msg) => AiError::RecognitionFailed(msg),
            other => AiError::RecognitionFailed(other.to_string()),
        })?;

        if !output.success() {
            let detail = output.stderr_tail(500);
            warn!(stderr = %detail, "whisper.cpp failed");
            return Err(AiError::RecognitionFailed(format!(
                "whisper.cpp exited with status {}: {detail}",
                output.status
            )));
        }

        let json = std::fs::read_to_string(&scratch.0).map_err(|e| {
            AiError::InvalidOutput(format!("whisper.cpp produced no JSON output: {e}"))
        })?;
        debug!(json_len = json.len(), "Parsing whisper output");

        let mut result = parse_whisper_json(&json, request.word_timestamps)?;
        if result.language.is_empty() {
            result.language = request.language.clone().unwrap_or_else(|| "unknown".into());
        }
        Ok(result)
    }
}

// ── whisper.cpp JSON ────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct WhisperOutput {
    #[serde(default)]
    result: Option<WhisperMeta>,
    #[serde(default)]
    transcription: Vec<WhisperSegment>,
}

#[derive(Debug, Deserialize)]
struct WhisperMeta {
    #[serde(default)]
    language: String,
}

#[derive(Debug, Deserialize)]
struct WhisperSegment {
    offsets: WhisperOffsets,
    #[serde(default)]
    text: String,
    #[serde(default)]
    tokens: Vec<WhisperToken>,
}

#[derive(Debug, Deserialize)]
struct WhisperOffsets {
    from: i64,
    to: i64,
}

#[derive(Debug, Deserialize)]
struct WhisperToken {
    #[serde(default)]
    text: String,
    offsets: Option<WhisperOffsets>,
    #[serde(default)]
    p: f32,
}

fn ms_to_secs(ms: i64) -> f64 {
    ms.max(0) as f64 / 1000.0
}

/// Join sub-word tokens into words. A token with leading whitespace starts a
/// new word; special tokens (`[_BEG_]`, `[_TT_..]`) are dropped.
fn collect_words(tokens: &[WhisperToken]) -> Vec<Word> {
    let mut words: Vec<Word> = Vec::new();
    for token in tokens {
        if token.text.starts_with("[_") || token.text.trim().is_empty() {
            continue;
        }
        let (start, end) = token
            .offsets
            .as_ref()
            .map(|o| (ms_to_secs(o.from), ms_to_secs(o.to)))
            .unwrap_or((0.0, 0.0));

        let starts_word = token.text.starts_with(char::is_whitespace);
        match words.last_mut() {
            Some(word) if !starts_word => {
                word.text.push_str(&token.text);
                word.end = word.end.max(end);
                word.probability = word.probability.min(token.p);
            }
            _ => words.push(Word {
                text: token.text.trim_start().to_string(),
                start,
                end,
                probability: token.p,
            }),
        }
    }
    words
}

/// Parse whisper.cpp `-ojf` output into a [`RecognitionResult`].
pub fn parse_whisper_json(json: &str, word_timestamps: bool) -> AiResult<RecognitionResult> {
    let output: WhisperOutput = serde_json::from_str(json)
        .map_err(|e| AiError::InvalidOutput(format!("Failed to parse whisper JSON: {e}")))?;

    let segments: Vec<Segment> = output
        .transcription
        .into_iter()
        .filter(|s| !s.text.trim().is_empty())
        .map(|s| Segment {
            start: ms_to_secs(s.offsets.from),
            end: ms_to_secs(s.offsets.to),
            words: word_timestamps.then(|| collect_words(&s.tokens)),
            text: s.text,
        })
        .collect();

    let text = segments
        .iter()
        .map(|s| s.text.as_str())
        .collect::<String>()
        .trim()
        .to_string();

    Ok(RecognitionResult {
        text,
        language: output.result.map(|r| r.language).unwrap_or_default(),
        segments,
    })
}
