//! VEdit - media transformation and captioning backend
//!
//! Command-line driver over the orchestrator. Every command prints a JSON
//! envelope (`success`, `message`, `data`, `error`) on stdout; logs go to
//! stderr.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;
use vedit_ai::ModelTier;
use vedit_core::Mount;
use vedit_media::DEFAULT_CRF;
use vedit_pipeline::{Envelope, OperationResult, Orchestrator, PipelineConfig, TransformRequest};

#[derive(Parser)]
#[command(name = "vedit", version, about = "Video transformation and captioning backend")]
struct Cli {
    /// JSON configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Storage root (overrides config and VEDIT_STORAGE_ROOT).
    #[arg(long, global = true)]
    storage: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum MountArg {
    Uploads,
    Processed,
}

impl From<MountArg> for Mount {
    fn from(arg: MountArg) -> Self {
        match arg {
            MountArg::Uploads => Mount::Uploads,
            MountArg::Processed => Mount::Processed,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Copy local files into the uploads area.
    Import { files: Vec<PathBuf> },
    /// List stored artifacts, newest first.
    List {
        #[arg(long, value_enum, default_value = "processed")]
        mount: MountArg,
    },
    /// Show stream metadata.
    Probe { input: String },
    /// Keep the span [start, end).
    Trim {
        input: String,
        #[arg(long)]
        start: f64,
        #[arg(long)]
        end: f64,
    },
    /// Concatenate clips in the given order.
    Merge {
        #[arg(required = true, num_args = 2..)]
        inputs: Vec<String>,
    },
    /// Change playback speed (audio pitch follows).
    Speed {
        input: String,
        #[arg(long)]
        factor: f64,
    },
    /// Scale audio amplitude.
    Volume {
        input: String,
        #[arg(long)]
        factor: f64,
    },
    /// Fade in and/or out; zero skips a fade.
    Fade {
        input: String,
        #[arg(long, default_value_t = 0.0)]
        fade_in: f64,
        #[arg(long, default_value_t = 0.0)]
        fade_out: f64,
    },
    /// Force exact output dimensions.
    Resize {
        input: String,
        #[arg(long)]
        width: u32,
        #[arg(long)]
        height: u32,
    },
    /// Extract the audio track as MP3.
    ExtractAudio { input: String },
    /// Re-encode into another container.
    Convert {
        input: String,
        #[arg(long)]
        format: String,
    },
    /// Constant-quality re-encode (lower crf = higher quality).
    Compress {
        input: String,
        #[arg(long, default_value_t = DEFAULT_CRF)]
        crf: u32,
    },
    /// Run a transform described as JSON, e.g. '{"operation":"trim",...}'.
    Run { request: String },
    /// Transcribe speech.
    Transcribe {
        input: String,
        #[arg(short, long)]
        model: Option<ModelTier>,
        #[arg(short, long)]
        language: Option<String>,
    },
    /// Generate timed captions.
    Captions {
        input: String,
        #[arg(short, long)]
        model: Option<ModelTier>,
        #[arg(short, long)]
        language: Option<String>,
    },
    /// Generate an SRT subtitle artifact.
    Subtitles {
        input: String,
        #[arg(short, long)]
        model: Option<ModelTier>,
        #[arg(short, long)]
        language: Option<String>,
    },
    /// Translate speech to English.
    Translate {
        input: String,
        #[arg(short, long)]
        model: Option<ModelTier>,
    },
    /// Show the model catalog and per-tier state; optionally load a tier.
    Models {
        #[arg(long)]
        load: Option<ModelTier>,
    },
}

fn print<T: Serialize>(envelope: &Envelope<T>) -> Result<bool> {
    println!("{}", serde_json::to_string_pretty(envelope)?);
    Ok(envelope.success)
}

fn report<T: Serialize>(message: &str, result: OperationResult<T>) -> Result<bool> {
    print(&Envelope::from_result(message, result))
}

/// Accept a stored artifact reference as-is; import a local file first.
fn reference(orchestrator: &Orchestrator, input: &str) -> Result<String> {
    if orchestrator.store().resolve(input).is_ok() || !Path::new(input).is_file() {
        return Ok(input.to_string());
    }
    let artifact = orchestrator
        .store()
        .import(Path::new(input))
        .with_context(|| format!("importing {input}"))?;
    info!(source = input, url = %artifact.url, "imported local input");
    Ok(artifact.url)
}

fn references(orchestrator: &Orchestrator, inputs: &[String]) -> Result<Vec<String>> {
    inputs.iter().map(|i| reference(orchestrator, i)).collect()
}

/// The transform a command describes, if it is a transform command.
fn transform_of(
    orchestrator: &Orchestrator,
    command: &Command,
) -> Result<Option<TransformRequest>> {
    let input = |i: &str| reference(orchestrator, i);
    Ok(Some(match command {
        Command::Trim { input: i, start, end } => TransformRequest::Trim {
            input: input(i)?,
            start: *start,
            end: *end,
        },
        Command::Merge { inputs } => TransformRequest::Merge {
            inputs: references(orchestrator, inputs)?,
        },
        Command::Speed { input: i, factor } => TransformRequest::ChangeSpeed {
            input: input(i)?,
            factor: *factor,
        },
        Command::Volume { input: i, factor } => TransformRequest::AdjustVolume {
            input: input(i)?,
            factor: *factor,
        },
        Command::Fade {
            input: i,
            fade_in,
            fade_out,
        } => TransformRequest::AddFade {
            input: input(i)?,
            fade_in: *fade_in,
            fade_out: *fade_out,
        },
        Command::Resize {
            input: i,
            width,
            height,
        } => TransformRequest::Resize {
            input: input(i)?,
            width: *width,
            height: *height,
        },
        Command::ExtractAudio { input: i } => TransformRequest::ExtractAudio { input: input(i)? },
        Command::Convert { input: i, format } => TransformRequest::ConvertFormat {
            input: input(i)?,
            format: format.clone(),
        },
        Command::Compress { input: i, crf } => TransformRequest::Compress {
            input: input(i)?,
            crf: *crf,
        },
        Command::Run { request } => {
            serde_json::from_str(request).context("parsing transform request JSON")?
        }
        _ => return Ok(None),
    }))
}

#[derive(Serialize)]
struct ModelsReport {
    /// Present when the command was asked to load a tier.
    #[serde(skip_serializing_if = "Option::is_none")]
    loaded: Option<vedit_ai::TierStatus>,
    catalog: &'static [vedit_ai::TierInfo],
    status: Vec<vedit_ai::TierStatus>,
}

/// Catalog and tier states, after loading `load` if given.
async fn models_report(
    orchestrator: &Orchestrator,
    load: Option<ModelTier>,
) -> OperationResult<ModelsReport> {
    let loaded = match load {
        Some(tier) => Some(orchestrator.load_model(tier).await?),
        None => None,
    };
    Ok(ModelsReport {
        loaded,
        catalog: orchestrator.model_catalog(),
        status: orchestrator.model_status(),
    })
}

async fn dispatch(orchestrator: &Orchestrator, command: Command) -> Result<bool> {
    if let Some(request) = transform_of(orchestrator, &command)? {
        let message = format!("{} completed successfully", request.name());
        let result = orchestrator.execute(request).await;
        return report(&message, result);
    }

    match command {
        Command::Import { files } => {
            let batch = orchestrator.import(files.as_slice());
            let message = format!(
                "Imported {} of {} file(s)",
                batch.imported().count(),
                batch.items.len()
            );
            print(&Envelope::ok(message, batch))
        }
        Command::List { mount } => {
            let artifacts = orchestrator.store().list(mount.into());
            print(&Envelope::ok(format!("{} artifact(s)", artifacts.len()), artifacts))
        }
        Command::Probe { input } => {
            let input = reference(orchestrator, &input)?;
            report("Media info", orchestrator.probe(&input).await)
        }
        Command::Transcribe {
            input,
            model,
            language,
        } => {
            let input = reference(orchestrator, &input)?;
            let result = orchestrator.transcribe(&input, model, language).await;
            report("Transcription completed", result)
        }
        Command::Captions {
            input,
            model,
            language,
        } => {
            let input = reference(orchestrator, &input)?;
            let result = orchestrator.generate_captions(&input, model, language).await;
            report("Captions generated", result)
        }
        Command::Subtitles {
            input,
            model,
            language,
        } => {
            let input = reference(orchestrator, &input)?;
            let result = orchestrator.generate_subtitles(&input, model, language).await;
            report("Subtitles generated", result)
        }
        Command::Translate { input, model } => {
            let input = reference(orchestrator, &input)?;
            report("Translation completed", orchestrator.translate(&input, model).await)
        }
        Command::Models { load } => {
            let message = if load.is_some() { "Model loaded" } else { "Available models" };
            report(message, models_report(orchestrator, load).await)
        }
        _ => Ok(true),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut config =
        PipelineConfig::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(storage) = cli.storage {
        config.storage_root = storage;
    }
    info!(storage = %config.storage_root.display(), "VEdit starting");

    let orchestrator = Orchestrator::from_config(&config).context("opening storage")?;
    if !dispatch(&orchestrator, cli.command).await? {
        std::process::exit(1);
    }
    Ok(())
}
