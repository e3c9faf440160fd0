//! Filesystem-backed artifact store.
//!
//! Layout under the storage root:
//!
//! ```text
//! uploads/<id>.<ext>     imported media, served as /uploads/<file>
//! processed/<id>.<ext>   operation output, served as /processed/<file>
//! temp/<id>.<ext>        staged output and scratch files
//! ```
//!
//! Output is written to `temp/` first and renamed into `processed/` only once
//! the producing operation has succeeded, so a failed operation never leaves
//! a registered artifact behind.

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info, warn};
use vedit_core::{artifact_url, Artifact, ArtifactId, ArtifactKind, Mount, Result, VeditError};

const TEMP_DIR: &str = "temp";

/// An output file being written. Removed on drop unless committed.
#[derive(Debug)]
pub struct StagedOutput {
    id: ArtifactId,
    path: PathBuf,
    committed: bool,
}

impl StagedOutput {
    pub fn id(&self) -> ArtifactId {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StagedOutput {
    fn drop(&mut self) {
        if self.committed || !self.path.exists() {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "discarded staged output"),
            Err(e) => warn!(path = %self.path.display(), error = %e, "failed to discard staged output"),
        }
    }
}

/// Outcome of importing one file in a batch.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ImportOutcome {
    Imported { artifact: Artifact },
    Failed { error: String },
}

/// Per-item result of an import batch.
#[derive(Debug, Serialize)]
pub struct BatchItem {
    pub source: PathBuf,
    #[serde(flatten)]
    pub outcome: ImportOutcome,
}

/// Result of [`ArtifactStore::import_batch`].
#[derive(Debug, Default, Serialize)]
pub struct BatchReport {
    pub items: Vec<BatchItem>,
}

impl BatchReport {
    /// Artifacts that were imported, in input order.
    pub fn imported(&self) -> impl Iterator<Item = &Artifact> {
        self.items.iter().filter_map(|item| match &item.outcome {
            ImportOutcome::Imported { artifact } => Some(artifact),
            ImportOutcome::Failed { .. } => None,
        })
    }

    pub fn failed_count(&self) -> usize {
        self.items
            .iter()
            .filter(|item| matches!(item.outcome, ImportOutcome::Failed { .. }))
            .count()
    }
}

/// Owner of every artifact the pipeline accepts or produces.
#[derive(Debug)]
pub struct ArtifactStore {
    root: PathBuf,
    artifacts: RwLock<HashMap<ArtifactId, Artifact>>,
}

fn safe_extension(ext: &str) -> Result<String> {
    let ext = ext.trim_start_matches('.').to_ascii_lowercase();
    if ext.is_empty() || ext.len() > 8 || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(VeditError::validation(format!("unsupported file extension '{ext}'")));
    }
    Ok(ext)
}

fn id_of(path: &Path) -> Option<ArtifactId> {
    path.file_stem()?.to_str()?.parse().ok()
}

impl ArtifactStore {
    /// Open (creating if needed) a store rooted at `root` and index the
    /// artifacts already in it.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        for dir in Mount::ALL.iter().map(|m| m.dir_name()).chain([TEMP_DIR]) {
            std::fs::create_dir_all(root.join(dir))?;
        }
        let root = root.canonicalize()?;

        let store = Self {
            root,
            artifacts: RwLock::new(HashMap::new()),
        };
        let indexed = store.reindex()?;
        info!(root = %store.root.display(), artifacts = indexed, "artifact store opened");
        Ok(store)
    }

    fn reindex(&self) -> Result<usize> {
        let mut found = Vec::new();
        for mount in Mount::ALL {
            for entry in std::fs::read_dir(self.dir(mount))? {
                let path = entry?.path();
                if !path.is_file() {
                    continue;
                }
                let Some(id) = id_of(&path) else {
                    continue;
                };
                let meta = std::fs::metadata(&path)?;
                let created_at = meta
                    .created()
                    .or_else(|_| meta.modified())
                    .unwrap_or_else(|_| SystemTime::now());
                found.push(self.describe(id, mount, path, meta.len(), created_at));
            }
        }
        let count = found.len();
        let mut artifacts = self.artifacts.write();
        for artifact in found {
            artifacts.insert(artifact.id, artifact);
        }
        Ok(count)
    }

    fn describe(
        &self,
        id: ArtifactId,
        mount: Mount,
        path: PathBuf,
        size_bytes: u64,
        created_at: SystemTime,
    ) -> Artifact {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Artifact {
            id,
            kind: ArtifactKind::from_path(&path),
            mount,
            url: artifact_url(mount, &file_name),
            path,
            size_bytes,
            created_at,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory backing a mount point.
    pub fn dir(&self, mount: Mount) -> PathBuf {
        self.root.join(mount.dir_name())
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.root.join(TEMP_DIR)
    }

    /// Map an input reference to a file on disk.
    ///
    /// Accepts an artifact URL (`/uploads/<file>`, `/processed/<file>`) or a
    /// path to a file directly inside one of those two directories. Anything
    /// else is `NotFound`.
    pub fn resolve(&self, reference: &str) -> Result<PathBuf> {
        let missing = || VeditError::not_found(format!("File not found: {reference}"));

        for mount in Mount::ALL {
            let prefix = format!("/{}/", mount.dir_name());
            if let Some(name) = reference.strip_prefix(&prefix) {
                let name_path = Path::new(name);
                let mut components = name_path.components();
                let single = matches!(
                    (components.next(), components.next()),
                    (Some(Component::Normal(_)), None)
                );
                if !single {
                    return Err(missing());
                }
                let path = self.dir(mount).join(name_path);
                return if path.is_file() { Ok(path) } else { Err(missing()) };
            }
        }

        // Staged outputs under temp/ are never valid inputs.
        let path = Path::new(reference).canonicalize().map_err(|_| missing())?;
        let mounted = Mount::ALL
            .into_iter()
            .any(|mount| path.parent() == Some(self.dir(mount).as_path()));
        if mounted && path.is_file() {
            Ok(path)
        } else {
            Err(missing())
        }
    }

    /// Reserve a fresh output file in `temp/`.
    pub fn stage(&self, extension: &str) -> Result<StagedOutput> {
        let ext = safe_extension(extension)?;
        let id = ArtifactId::new();
        let path = self.temp_dir().join(format!("{id}.{ext}"));
        Ok(StagedOutput {
            id,
            path,
            committed: false,
        })
    }

    /// Move a finished staged file into `processed/` and register it.
    pub fn commit(&self, mut staged: StagedOutput) -> Result<Artifact> {
        let meta = std::fs::metadata(&staged.path).map_err(|_| {
            VeditError::Internal(format!("staged output missing: {}", staged.path.display()))
        })?;
        let file_name = staged
            .path
            .file_name()
            .ok_or_else(|| VeditError::Internal("staged output has no file name".into()))?;
        let target = self.dir(Mount::Processed).join(file_name);
        std::fs::rename(&staged.path, &target)?;
        staged.committed = true;

        let artifact = self.describe(
            staged.id,
            Mount::Processed,
            target,
            meta.len(),
            SystemTime::now(),
        );
        self.register(artifact.clone());
        info!(id = %artifact.id, url = %artifact.url, bytes = artifact.size_bytes, "artifact committed");
        Ok(artifact)
    }

    /// Write `contents` as a new processed artifact.
    pub fn write_text(&self, extension: &str, contents: &str) -> Result<Artifact> {
        let staged = self.stage(extension)?;
        std::fs::write(staged.path(), contents)?;
        self.commit(staged)
    }

    /// Copy an external file into `uploads/`.
    pub fn import(&self, source: &Path) -> Result<Artifact> {
        if !source.is_file() {
            return Err(VeditError::not_found(format!(
                "File not found: {}",
                source.display()
            )));
        }
        let ext = source
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| {
                VeditError::validation(format!("{} has no file extension", source.display()))
            })?;
        let staged = self.stage(ext)?;
        std::fs::copy(source, staged.path())?;

        let file_name = staged
            .path
            .file_name()
            .ok_or_else(|| VeditError::Internal("staged import has no file name".into()))?
            .to_owned();
        let target = self.dir(Mount::Uploads).join(file_name);
        let size = std::fs::metadata(staged.path())?.len();
        std::fs::rename(staged.path(), &target)?;
        let mut staged = staged;
        staged.committed = true;

        let artifact = self.describe(staged.id, Mount::Uploads, target, size, SystemTime::now());
        self.register(artifact.clone());
        info!(source = %source.display(), url = %artifact.url, "imported upload");
        Ok(artifact)
    }

    /// Import each source independently; one failure does not stop the rest.
    pub fn import_batch<P: AsRef<Path>>(&self, sources: &[P]) -> BatchReport {
        let items = sources
            .iter()
            .map(|source| {
                let source = source.as_ref();
                let outcome = match self.import(source) {
                    Ok(artifact) => ImportOutcome::Imported { artifact },
                    Err(e) => {
                        warn!(source = %source.display(), error = %e, "import failed");
                        ImportOutcome::Failed {
                            error: e.to_string(),
                        }
                    }
                };
                BatchItem {
                    source: source.to_path_buf(),
                    outcome,
                }
            })
            .collect();
        BatchReport { items }
    }

    fn register(&self, artifact: Artifact) {
        self.artifacts.write().insert(artifact.id, artifact);
    }

    pub fn get(&self, id: ArtifactId) -> Option<Artifact> {
        self.artifacts.read().get(&id).cloned()
    }

    /// Artifacts under `mount`, newest first.
    pub fn list(&self, mount: Mount) -> Vec<Artifact> {
        let mut artifacts: Vec<Artifact> = self
            .artifacts
            .read()
            .values()
            .filter(|a| a.mount == mount)
            .cloned()
            .collect();
        artifacts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        artifacts
    }

    pub fn len(&self) -> usize {
        self.artifacts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
