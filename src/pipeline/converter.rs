//! The per-page conversion state machine.
//!
//! ```text
//!            rasterize            ocr               extract
//! (start) ───────────▶ Rasterized ────▶ Ocred ─────────▶ TextExtracted ──▶ (merger) Merged
//!    │                     │              │
//!    └─────────────────────┴──────────────┴──────────▶ Failed(stage)
//! ```
//!
//! Each transition deletes the artifact that is no longer needed: the raster
//! after OCR, the searchable PDF after extraction. A page in flight therefore
//! holds at most two artifacts at a time. A failing page deletes whatever it
//! had written before reporting the failure.

use crate::config::Toolchain;
use crate::error::PageError;
use crate::output::{PageJob, PageResult, PageState, Stage};
use crate::pipeline::process::ToolError;
use crate::pipeline::stages;
use crate::pipeline::workspace::{ArtifactKind, ArtifactNaming, Workspace};
use crate::progress::ProgressCallback;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Converts one page into a text artifact.
///
/// The scheduler only sees this trait, so tests can drive it with
/// in-process converters.
#[async_trait]
pub trait PageConverter: Send + Sync {
    async fn convert_page(&self, job: &PageJob) -> Result<PageResult, PageError>;
}

/// [`PageConverter`] backed by pdftoppm, tesseract and pdftotext.
pub struct ToolchainConverter {
    tools: Toolchain,
    workspace: Arc<Workspace>,
    naming: ArtifactNaming,
    progress: Option<ProgressCallback>,
}

impl ToolchainConverter {
    pub fn new(tools: Toolchain, workspace: Arc<Workspace>, naming: ArtifactNaming) -> Self {
        Self {
            tools,
            workspace,
            naming,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: Option<ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    fn transition(&self, page: u32, state: PageState) {
        debug!("page {}: {:?}", page, state);
        if let Some(cb) = &self.progress {
            cb.on_page_state(page, state);
        }
    }

    async fn run_stages(&self, job: &PageJob) -> Result<u64, (Stage, ToolError)> {
        let page = job.page;
        let raster = self.workspace.artifact(&self.naming, page, ArtifactKind::Raster);
        let searchable = self
            .workspace
            .artifact(&self.naming, page, ArtifactKind::Searchable);
        let text = self.workspace.artifact(&self.naming, page, ArtifactKind::Text);

        let raster_bytes = stages::rasterize(&self.tools, &job.source, page, &raster)
            .await
            .map_err(|e| (Stage::Rasterize, e))?;
        debug!("page {}: raster {} bytes", page, raster_bytes);
        self.transition(page, PageState::Rasterized);

        stages::ocr(&self.tools, &raster, &searchable)
            .await
            .map_err(|e| (Stage::Ocr, e))?;
        remove_artifact(&raster).await;
        self.transition(page, PageState::Ocred);

        stages::extract(&self.tools, &searchable, &text)
            .await
            .map_err(|e| (Stage::Extract, e))?;
        remove_artifact(&searchable).await;

        let text_bytes = tokio::fs::metadata(&text)
            .await
            .map(|m| m.len())
            .map_err(|e| {
                (
                    Stage::Extract,
                    ToolError::Io {
                        program: self.tools.pdftotext.display().to_string(),
                        source: e,
                    },
                )
            })?;
        self.transition(page, PageState::TextExtracted);
        Ok(text_bytes)
    }

    async fn discard_artifacts(&self, page: u32) {
        for kind in ArtifactKind::ALL {
            remove_artifact(&self.workspace.artifact(&self.naming, page, kind)).await;
        }
    }
}

#[async_trait]
impl PageConverter for ToolchainConverter {
    async fn convert_page(&self, job: &PageJob) -> Result<PageResult, PageError> {
        let start = Instant::now();
        match self.run_stages(job).await {
            Ok(text_bytes) => Ok(PageResult {
                page_num: job.page,
                text_path: self
                    .workspace
                    .artifact(&self.naming, job.page, ArtifactKind::Text),
                text_bytes,
                duration_ms: start.elapsed().as_millis() as u64,
            }),
            Err((stage, e)) => {
                self.discard_artifacts(job.page).await;
                self.transition(job.page, PageState::Failed(stage));
                Err(PageError::StageFailed {
                    page: job.page,
                    stage,
                    detail: e.to_string(),
                })
            }
        }
    }
}

/// Delete a consumed artifact. A leftover is swept at workspace release,
/// so failure here only warrants a warning.
pub(crate) async fn remove_artifact(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("could not delete {}: {}", path.display(), e),
    }
}
