//! Scratch directory lifecycle for per-page artifacts.
//!
//! A run owns exactly one [`Workspace`], handed out by a
//! [`WorkspaceManager`] as an `Arc` that every page job holds. Each job only
//! touches paths built by [`Workspace::artifact`] for its own page number, so
//! concurrent jobs never share a file and no locking is needed.
//!
//! Two flavours:
//!
//! * **ephemeral** (default): a fresh `pdftt-XXXXXX` directory under the
//!   system temp dir.
//! * **persistent**: a fresh `pdftt-XXXXXX` directory inside a
//!   caller-supplied cache directory. The cache directory is created if
//!   missing and is never modified otherwise, so files already in it (the
//!   source PDF included) are safe whatever their names.
//!
//! Either way the run directory is removed with everything in it on release.
//! Its `TempDir` guard also removes it if the process unwinds before release.

use crate::error::PdfttError;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{debug, info, warn};

const ARTIFACT_PREFIX: &str = "page-";
const RUN_DIR_PREFIX: &str = "pdftt-";

/// The three intermediate files a page goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    /// Grayscale bitmap written by the rasteriser.
    Raster,
    /// Single-page searchable PDF written by the OCR engine.
    Searchable,
    /// Layout text written by the extractor.
    Text,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 3] = [
        ArtifactKind::Raster,
        ArtifactKind::Searchable,
        ArtifactKind::Text,
    ];

    pub fn extension(self) -> &'static str {
        match self {
            ArtifactKind::Raster => "pgm",
            ArtifactKind::Searchable => "pdf",
            ArtifactKind::Text => "txt",
        }
    }
}

/// Zero-padded page naming sized to the last page of the run.
///
/// With `last_page = 120` page 7 becomes `page-007`, so a plain `ls` of the
/// workspace lists pages in document order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArtifactNaming {
    width: usize,
}

impl ArtifactNaming {
    pub fn for_last_page(last_page: u32) -> Self {
        Self {
            width: digit_count(last_page),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// File stem shared by all artifacts of `page`.
    pub fn stem(&self, page: u32) -> String {
        format!("{}{:0width$}", ARTIFACT_PREFIX, page, width = self.width)
    }

    pub fn file_name(&self, page: u32, kind: ArtifactKind) -> String {
        format!("{}.{}", self.stem(page), kind.extension())
    }
}

fn digit_count(n: u32) -> usize {
    n.checked_ilog10().map_or(1, |d| d as usize + 1)
}

/// Whether `name` could have been produced by [`ArtifactNaming::file_name`].
fn is_artifact_name(name: &str) -> bool {
    let Some(rest) = name.strip_prefix(ARTIFACT_PREFIX) else {
        return false;
    };
    let Some((digits, ext)) = rest.rsplit_once('.') else {
        return false;
    };
    !digits.is_empty()
        && digits.bytes().all(|b| b.is_ascii_digit())
        && ArtifactKind::ALL.iter().any(|k| k.extension() == ext)
}

/// A live scratch directory owned by one run.
///
/// The directory is always freshly created, so nothing in it predates the
/// run and the whole of it can be removed on release.
#[derive(Debug)]
pub struct Workspace {
    /// The run directory. Removes itself if the process unwinds before
    /// release.
    root: TempDir,
    /// Caller-supplied directory the run directory was created in.
    cache: Option<PathBuf>,
}

impl Workspace {
    fn ephemeral() -> Result<Self, PdfttError> {
        let dir = tempfile::Builder::new()
            .prefix(RUN_DIR_PREFIX)
            .tempdir()
            .map_err(|e| PdfttError::WorkspaceFailed {
                path: std::env::temp_dir(),
                source: e,
            })?;
        Ok(Self {
            root: dir,
            cache: None,
        })
    }

    fn persistent(cache: &Path) -> Result<Self, PdfttError> {
        let failed = |e| PdfttError::WorkspaceFailed {
            path: cache.to_path_buf(),
            source: e,
        };
        std::fs::create_dir_all(cache).map_err(failed)?;
        let dir = tempfile::Builder::new()
            .prefix(RUN_DIR_PREFIX)
            .tempdir_in(cache)
            .map_err(failed)?;
        Ok(Self {
            root: dir,
            cache: Some(cache.to_path_buf()),
        })
    }

    /// The run directory every artifact lives in.
    pub fn path(&self) -> &Path {
        self.root.path()
    }

    /// The caller-supplied directory holding the run directory, if any.
    pub fn cache_dir(&self) -> Option<&Path> {
        self.cache.as_deref()
    }

    pub fn is_ephemeral(&self) -> bool {
        self.cache.is_none()
    }

    /// Path of `page`'s artifact of the given kind.
    pub fn artifact(&self, naming: &ArtifactNaming, page: u32, kind: ArtifactKind) -> PathBuf {
        self.path().join(naming.file_name(page, kind))
    }

    /// Page artifacts currently on disk, sorted by name.
    pub fn artifacts(&self) -> io::Result<Vec<PathBuf>> {
        let mut found = Vec::new();
        for entry in std::fs::read_dir(self.path())? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if entry.file_name().to_str().is_some_and(is_artifact_name) {
                found.push(entry.path());
            }
        }
        found.sort();
        Ok(found)
    }

    fn teardown(&self) -> io::Result<()> {
        match std::fs::remove_dir_all(self.path()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Owns the single live [`Workspace`] of a run.
///
/// Dropping the manager releases the workspace, so every exit path of a run,
/// `?` and panics included, tears it down.
#[derive(Debug, Default)]
pub struct WorkspaceManager {
    live: Option<Arc<Workspace>>,
}

impl WorkspaceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the workspace for a run.
    ///
    /// `preferred` names a cache directory to create the run directory in;
    /// `None` uses the system temp dir. A workspace still live from an earlier acquire is
    /// released first.
    pub fn acquire(&mut self, preferred: Option<&Path>) -> Result<Arc<Workspace>, PdfttError> {
        if let Some(stale) = &self.live {
            warn!("releasing stale workspace {}", stale.path().display());
            if let Err(e) = self.release() {
                warn!("failed to release stale workspace: {}", e);
            }
        }

        let workspace = match preferred {
            Some(path) => Workspace::persistent(path)?,
            None => Workspace::ephemeral()?,
        };
        match workspace.cache_dir() {
            Some(cache) => info!(
                "workspace: {} (in cache dir {})",
                workspace.path().display(),
                cache.display()
            ),
            None => info!("workspace: {} (ephemeral)", workspace.path().display()),
        }

        let workspace = Arc::new(workspace);
        self.live = Some(Arc::clone(&workspace));
        Ok(workspace)
    }

    /// The live workspace, if any.
    pub fn live(&self) -> Option<&Arc<Workspace>> {
        self.live.as_ref()
    }

    /// Tear down the live workspace. A no-op when nothing is live.
    pub fn release(&mut self) -> io::Result<()> {
        match self.live.take() {
            Some(workspace) => {
                debug!("releasing workspace {}", workspace.path().display());
                workspace.teardown()
            }
            None => Ok(()),
        }
    }
}

impl Drop for WorkspaceManager {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!("failed to release workspace: {}", e);
        }
    }
}
