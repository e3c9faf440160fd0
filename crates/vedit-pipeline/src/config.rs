//! Pipeline configuration.
//!
//! Defaults, then an optional JSON file, then `VEDIT_*` environment
//! variables, each layer overriding the one before.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;
use vedit_ai::{default_model_dir, ModelTier, WhisperCppConfig};
use vedit_core::{Result, Timeouts, VeditError};

/// Runtime configuration for the orchestrator and its engines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Holds `uploads/`, `processed/` and `temp/`.
    pub storage_root: PathBuf,
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
    pub whisper_binary: PathBuf,
    /// Directory of `ggml-*.bin` recognition weights.
    pub model_dir: PathBuf,
    /// Threads per recognition call.
    pub threads: u32,
    /// Tier used when a request does not name one.
    pub default_tier: ModelTier,
    /// Maximum concurrent engine calls.
    pub workers: usize,
    pub timeouts: Timeouts,
}

fn locate(name: &str) -> PathBuf {
    which::which(name).unwrap_or_else(|_| PathBuf::from(name))
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            storage_root: PathBuf::from("storage"),
            ffmpeg_path: locate("ffmpeg"),
            ffprobe_path: locate("ffprobe"),
            whisper_binary: WhisperCppConfig::find_whisper_binary(),
            model_dir: default_model_dir(),
            threads: num_cpus::get() as u32,
            default_tier: ModelTier::default(),
            workers: num_cpus::get(),
            timeouts: Timeouts::default(),
        }
    }
}

fn parse_var<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| VeditError::validation(format!("{key}: cannot parse '{value}'")))
}

impl PipelineConfig {
    /// Parse a JSON document; missing fields keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| VeditError::Serialization(e.to_string()))
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            VeditError::not_found(format!("config file {}: {e}", path.display()))
        })?;
        Self::from_json_str(&text)
    }

    /// Defaults, overlaid by `path` (if any) and then by the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_json_file(p)?,
            None => Self::default(),
        };
        config.apply_env_from(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `VEDIT_*` overrides read through `lookup`.
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let get = |key: &str| {
            let value = lookup(key).filter(|v| !v.trim().is_empty());
            if value.is_some() {
                debug!(key, "config override from environment");
            }
            value
        };

        if let Some(v) = get("VEDIT_STORAGE_ROOT") {
            self.storage_root = PathBuf::from(v);
        }
        if let Some(v) = get("VEDIT_FFMPEG") {
            self.ffmpeg_path = PathBuf::from(v);
        }
        if let Some(v) = get("VEDIT_FFPROBE") {
            self.ffprobe_path = PathBuf::from(v);
        }
        if let Some(v) = get("VEDIT_WHISPER_BINARY") {
            self.whisper_binary = PathBuf::from(v);
        }
        if let Some(v) = get("VEDIT_MODEL_DIR") {
            self.model_dir = PathBuf::from(v);
        }
        if let Some(v) = get("VEDIT_THREADS") {
            self.threads = parse_var("VEDIT_THREADS", &v)?;
        }
        if let Some(v) = get("VEDIT_DEFAULT_TIER") {
            self.default_tier = parse_var("VEDIT_DEFAULT_TIER", &v)?;
        }
        if let Some(v) = get("VEDIT_WORKERS") {
            self.workers = parse_var("VEDIT_WORKERS", &v)?;
        }
        if let Some(v) = get("VEDIT_TIMEOUT_PROBE") {
            self.timeouts.probe = parse_var("VEDIT_TIMEOUT_PROBE", &v)?;
        }
        if let Some(v) = get("VEDIT_TIMEOUT_TRANSFORM") {
            self.timeouts.transform = parse_var("VEDIT_TIMEOUT_TRANSFORM", &v)?;
        }
        if let Some(v) = get("VEDIT_TIMEOUT_MODEL_LOAD") {
            self.timeouts.model_load = parse_var("VEDIT_TIMEOUT_MODEL_LOAD", &v)?;
        }
        if let Some(v) = get("VEDIT_TIMEOUT_RECOGNITION") {
            self.timeouts.recognition = parse_var("VEDIT_TIMEOUT_RECOGNITION", &v)?;
        }
        Ok(())
    }

    /// Settings for the whisper.cpp backend.
    pub fn whisper(&self) -> WhisperCppConfig {
        WhisperCppConfig {
            binary: self.whisper_binary.clone(),
            model_dir: self.model_dir.clone(),
            threads: self.threads.max(1),
        }
    }
}
