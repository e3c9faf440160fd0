//! Artifact descriptors.
//!
//! An artifact is any file accepted or produced by the backend. Artifacts are
//! immutable once written; deleting one while a transform is still reading it
//! is the caller's responsibility to avoid.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::SystemTime;
use uuid::Uuid;

/// Opaque, unguessable artifact identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactId(Uuid);

impl ArtifactId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ArtifactId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ArtifactId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// What an artifact contains, derived from its container extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Video,
    Audio,
    Subtitle,
    Image,
}

impl ArtifactKind {
    /// Classify by file extension. Unknown extensions are treated as video,
    /// since every transform except audio extraction writes a video container.
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "mp3" | "wav" | "aac" | "m4a" | "flac" | "ogg" | "opus" => Self::Audio,
            "srt" | "vtt" => Self::Subtitle,
            "png" | "jpg" | "jpeg" | "gif" | "webp" => Self::Image,
            _ => Self::Video,
        }
    }

    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|e| e.to_str())
            .map(Self::from_extension)
            .unwrap_or(Self::Video)
    }
}

/// The two public mount points artifacts are served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mount {
    /// Originally uploaded media.
    Uploads,
    /// Output of a transform or recognition operation.
    Processed,
}

impl Mount {
    /// Directory name under the storage root, also the URL prefix.
    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Uploads => "uploads",
            Self::Processed => "processed",
        }
    }

    pub const ALL: [Mount; 2] = [Mount::Uploads, Mount::Processed];
}

/// Descriptor for a stored artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub id: ArtifactId,
    pub kind: ArtifactKind,
    pub mount: Mount,
    /// Location on disk.
    pub path: PathBuf,
    /// Stable public path, e.g. `/processed/<id>.mp4`.
    pub url: String,
    pub size_bytes: u64,
    /// Recorded at registration rather than read back from the filesystem.
    pub created_at: SystemTime,
}

impl Artifact {
    /// File name component (`<id>.<ext>`).
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Public URL for a file name under a mount.
pub fn artifact_url(mount: Mount, file_name: &str) -> String {
    format!("/{}/{}", mount.dir_name(), file_name)
}
