//! Transform operations and their FFmpeg argument lists.
//!
//! Operations here are already validated; the orchestrator checks parameter
//! domains and probes inputs before a [`TransformJob`] is built. Probed
//! [`MediaInfo`] travels with each input so filter graphs can account for
//! missing audio streams and source durations.

use crate::codec::{
    AudioCodec, CodecPair, COMPRESS_PRESET, DEFAULT_VIDEO_CONTAINER, EXTRACT_AUDIO_BITRATE_KBPS,
    SPEECH_CHANNELS, SPEECH_SAMPLE_RATE,
};
use crate::probe::MediaInfo;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use vedit_core::FrameRate;

/// Sample rate used when concatenating or re-timing audio of unknown rate.
const FALLBACK_SAMPLE_RATE: u32 = 44_100;

/// A single engine operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TransformOp {
    /// Keep `[start, end)`.
    Trim { start: f64, end: f64 },
    /// Concatenate all inputs in order.
    Merge,
    /// Duration scales by `1 / factor`; audio pitch follows the speed.
    ChangeSpeed { factor: f64 },
    /// Linear amplitude scaling.
    AdjustVolume { factor: f64 },
    /// Linear ramps at start and end; zero skips a ramp.
    AddFade { fade_in: f64, fade_out: f64 },
    /// Exact output dimensions, aspect ratio not preserved.
    Resize { width: u32, height: u32 },
    /// Audio-only MP3 at a fixed bitrate.
    ExtractAudio,
    /// Re-encode into another container with the default codec pair.
    ConvertFormat { container: String },
    /// Constant-quality re-encode.
    Compress { crf: u32 },
    /// 16 kHz mono PCM for the recognition engine.
    SpeechAudio,
}

impl TransformOp {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Trim { .. } => "trim",
            Self::Merge => "merge",
            Self::ChangeSpeed { .. } => "change_speed",
            Self::AdjustVolume { .. } => "adjust_volume",
            Self::AddFade { .. } => "add_fade",
            Self::Resize { .. } => "resize",
            Self::ExtractAudio => "extract_audio",
            Self::ConvertFormat { .. } => "convert_format",
            Self::Compress { .. } => "compress",
            Self::SpeechAudio => "speech_audio",
        }
    }

    /// Extension of the file this operation writes.
    pub fn output_extension(&self) -> String {
        match self {
            Self::ExtractAudio => AudioCodec::Mp3.extension().to_string(),
            Self::SpeechAudio => AudioCodec::Pcm.extension().to_string(),
            Self::ConvertFormat { container } => container.to_ascii_lowercase(),
            _ => DEFAULT_VIDEO_CONTAINER.to_string(),
        }
    }
}

/// An input file, with probe data when the operation needed it.
#[derive(Debug, Clone)]
pub struct TransformInput {
    pub path: PathBuf,
    pub info: Option<MediaInfo>,
}

impl TransformInput {
    pub fn new(path: impl Into<PathBuf>, info: Option<MediaInfo>) -> Self {
        Self {
            path: path.into(),
            info,
        }
    }

    /// Unknown counts as present; FFmpeg ignores audio options when there is none.
    fn has_audio(&self) -> bool {
        self.info.as_ref().map_or(true, |i| i.has_audio)
    }

    fn duration(&self) -> f64 {
        self.info.as_ref().map_or(0.0, |i| i.duration)
    }
}

/// A fully specified engine invocation.
#[derive(Debug, Clone)]
pub struct TransformJob {
    pub op: TransformOp,
    pub inputs: Vec<TransformInput>,
    pub output: PathBuf,
    pub codecs: CodecPair,
}

fn secs(value: f64) -> String {
    format!("{value}")
}

fn even_up(value: u32) -> u32 {
    value + value % 2
}

impl TransformJob {
    pub fn new(op: TransformOp, inputs: Vec<TransformInput>, output: impl Into<PathBuf>) -> Self {
        Self {
            op,
            inputs,
            output: output.into(),
            codecs: CodecPair::DEFAULT,
        }
    }

    fn primary(&self) -> Option<&TransformInput> {
        self.inputs.first()
    }

    fn push_input(args: &mut Vec<String>, input: &TransformInput) {
        args.push("-i".into());
        args.push(input.path.to_string_lossy().into_owned());
    }

    /// Frame size the encoder will see, when it is known up front.
    fn output_dimensions(&self) -> Option<(u32, u32)> {
        match &self.op {
            TransformOp::Resize { width, height } => Some((*width, *height)),
            // The merge canvas is always even.
            TransformOp::Merge => None,
            _ => self
                .primary()
                .and_then(|i| i.info.as_ref())
                .map(|i| (i.width, i.height)),
        }
    }

    fn push_video_codec(&self, args: &mut Vec<String>) {
        let (width, height) = self.output_dimensions().unwrap_or((2, 2));
        args.extend_from_slice(&[
            "-c:v".into(),
            self.codecs.video.ffmpeg_encoder().into(),
            "-pix_fmt".into(),
            self.codecs.video.pixel_format(width, height).into(),
        ]);
    }

    fn push_audio_codec(&self, args: &mut Vec<String>) {
        args.extend_from_slice(&["-c:a".into(), self.codecs.audio.ffmpeg_encoder().into()]);
    }

    /// Build the FFmpeg command arguments.
    pub fn ffmpeg_args(&self) -> Vec<String> {
        let mut args: Vec<String> = vec!["-hide_banner".into(), "-nostdin".into(), "-y".into()];
        let primary = self.primary();
        let has_audio = primary.map_or(true, TransformInput::has_audio);

        match &self.op {
            TransformOp::Trim { start, end } => {
                args.extend_from_slice(&["-ss".into(), secs(*start)]);
                if let Some(input) = primary {
                    Self::push_input(&mut args, input);
                }
                args.extend_from_slice(&["-t".into(), secs(end - start)]);
                self.push_video_codec(&mut args);
                self.push_audio_codec(&mut args);
            }
            TransformOp::Merge => {
                for input in &self.inputs {
                    Self::push_input(&mut args, input);
                }
                let (graph, with_audio) = self.merge_filter_graph();
                args.extend_from_slice(&["-filter_complex".into(), graph]);
                args.extend_from_slice(&["-map".into(), "[outv]".into()]);
                if with_audio {
                    args.extend_from_slice(&["-map".into(), "[outa]".into()]);
                }
                self.push_video_codec(&mut args);
                if with_audio {
                    self.push_audio_codec(&mut args);
                }
            }
            TransformOp::ChangeSpeed { factor } => {
                if let Some(input) = primary {
                    Self::push_input(&mut args, input);
                }
                args.extend_from_slice(&[
                    "-filter:v".into(),
                    format!("setpts=PTS/{}", secs(*factor)),
                ]);
                if has_audio {
                    // Resampling rather than atempo keeps pitch tied to speed.
                    let rate = primary
                        .and_then(|i| i.info.as_ref())
                        .and_then(|i| i.audio_sample_rate)
                        .unwrap_or(FALLBACK_SAMPLE_RATE);
                    let shifted = (rate as f64 * factor).round().max(1.0) as u64;
                    args.extend_from_slice(&[
                        "-filter:a".into(),
                        format!("asetrate={shifted},aresample={rate}"),
                    ]);
                }
                self.push_video_codec(&mut args);
                self.push_audio_codec(&mut args);
            }
            TransformOp::AdjustVolume { factor } => {
                if let Some(input) = primary {
                    Self::push_input(&mut args, input);
                }
                args.extend_from_slice(&[
                    "-filter:a".into(),
                    format!("volume={}", secs(*factor)),
                ]);
                self.push_video_codec(&mut args);
                self.push_audio_codec(&mut args);
            }
            TransformOp::AddFade { fade_in, fade_out } => {
                if let Some(input) = primary {
                    Self::push_input(&mut args, input);
                }
                let duration = primary.map_or(0.0, TransformInput::duration);
                let (video, audio) = fade_filters(*fade_in, *fade_out, duration);
                if !video.is_empty() {
                    args.extend_from_slice(&["-filter:v".into(), video]);
                }
                if has_audio && !audio.is_empty() {
                    args.extend_from_slice(&["-filter:a".into(), audio]);
                }
                self.push_video_codec(&mut args);
                self.push_audio_codec(&mut args);
            }
            TransformOp::Resize { width, height } => {
                if let Some(input) = primary {
                    Self::push_input(&mut args, input);
                }
                args.extend_from_slice(&[
                    "-vf".into(),
                    format!("scale={width}:{height},setsar=1"),
                ]);
                self.push_video_codec(&mut args);
                self.push_audio_codec(&mut args);
            }
            TransformOp::ExtractAudio => {
                if let Some(input) = primary {
                    Self::push_input(&mut args, input);
                }
                args.extend_from_slice(&[
                    "-vn".into(),
                    "-c:a".into(),
                    AudioCodec::Mp3.ffmpeg_encoder().into(),
                    "-b:a".into(),
                    format!("{EXTRACT_AUDIO_BITRATE_KBPS}k"),
                ]);
            }
            TransformOp::ConvertFormat { .. } => {
                if let Some(input) = primary {
                    Self::push_input(&mut args, input);
                }
                self.push_video_codec(&mut args);
                self.push_audio_codec(&mut args);
            }
            TransformOp::Compress { crf } => {
                if let Some(input) = primary {
                    Self::push_input(&mut args, input);
                }
                self.push_video_codec(&mut args);
                args.extend_from_slice(&[
                    "-crf".into(),
                    crf.to_string(),
                    "-preset".into(),
                    COMPRESS_PRESET.into(),
                ]);
                self.push_audio_codec(&mut args);
            }
            TransformOp::SpeechAudio => {
                if let Some(input) = primary {
                    Self::push_input(&mut args, input);
                }
                args.extend_from_slice(&[
                    "-vn".into(),
                    "-ar".into(),
                    SPEECH_SAMPLE_RATE.to_string(),
                    "-ac".into(),
                    SPEECH_CHANNELS.to_string(),
                    "-c:a".into(),
                    AudioCodec::Pcm.ffmpeg_encoder().into(),
                ]);
            }
        }

        if matches!(self.op.output_extension().as_str(), "mp4" | "mov" | "m4v") {
            args.extend_from_slice(&["-movflags".into(), "+faststart".into()]);
        }
        args.push(self.output.to_string_lossy().into_owned());
        args
    }

    /// Composition graph for concatenating clips of differing dimensions.
    ///
    /// Every clip is letterboxed onto a canvas as large as the largest input
    /// and resampled to the first clip's frame rate. Clips without audio get
    /// silence of their own length so audio stays aligned with video.
    /// Returns the graph and whether it produces an `[outa]` pad.
    pub fn merge_filter_graph(&self) -> (String, bool) {
        let infos: Vec<Option<&MediaInfo>> = self.inputs.iter().map(|i| i.info.as_ref()).collect();
        let width = even_up(infos.iter().flatten().map(|i| i.width).max().unwrap_or(0).max(2));
        let height = even_up(infos.iter().flatten().map(|i| i.height).max().unwrap_or(0).max(2));
        let rate = infos
            .iter()
            .flatten()
            .map(|i| i.frame_rate)
            .find(|r| r.to_fps_f64() > 0.0)
            .unwrap_or(FrameRate::FPS_30);
        let with_audio = self.inputs.iter().any(TransformInput::has_audio);

        let mut chains = Vec::new();
        let mut pads = String::new();
        for (i, input) in self.inputs.iter().enumerate() {
            chains.push(format!(
                "[{i}:v:0]scale={width}:{height}:force_original_aspect_ratio=decrease,\
                 pad={width}:{height}:(ow-iw)/2:(oh-ih)/2,setsar=1,\
                 fps={}/{},format=yuv420p[v{i}]",
                rate.numerator, rate.denominator
            ));
            pads.push_str(&format!("[v{i}]"));
            if with_audio {
                if input.has_audio() {
                    chains.push(format!(
                        "[{i}:a:0]aresample={FALLBACK_SAMPLE_RATE},\
                         aformat=sample_fmts=fltp:channel_layouts=stereo[a{i}]"
                    ));
                } else {
                    chains.push(format!(
                        "anullsrc=channel_layout=stereo:sample_rate={FALLBACK_SAMPLE_RATE},\
                         atrim=duration={},aformat=sample_fmts=fltp[a{i}]",
                        secs(input.duration())
                    ));
                }
                pads.push_str(&format!("[a{i}]"));
            }
        }

        let n = self.inputs.len();
        if with_audio {
            chains.push(format!("{pads}concat=n={n}:v=1:a=1[outv][outa]"));
        } else {
            chains.push(format!("{pads}concat=n={n}:v=1:a=0[outv]"));
        }
        (chains.join(";"), with_audio)
    }
}

/// Video and audio fade filter chains; empty strings when both ramps are zero.
fn fade_filters(fade_in: f64, fade_out: f64, duration: f64) -> (String, String) {
    let mut video = Vec::new();
    let mut audio = Vec::new();
    if fade_in > 0.0 {
        video.push(format!("fade=t=in:st=0:d={}", secs(fade_in)));
        audio.push(format!("afade=t=in:st=0:d={}", secs(fade_in)));
    }
    if fade_out > 0.0 {
        let start = (duration - fade_out).max(0.0);
        video.push(format!("fade=t=out:st={}:d={}", secs(start), secs(fade_out)));
        audio.push(format!("afade=t=out:st={}:d={}", secs(start), secs(fade_out)));
    }
    (video.join(","), audio.join(","))
}
