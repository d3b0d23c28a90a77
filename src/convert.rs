//! Run orchestration: probe, schedule, merge, clean up.
//!
//! ```text
//! resolve_source ─▶ probe ─▶ page_range ─▶ truncate destination
//!      ─▶ acquire workspace ─▶ Scheduler::run ─▶ failure policy
//!      ─▶ merge_pages ─▶ release workspace ─▶ ConversionStats
//! ```
//!
//! The workspace is owned by a [`WorkspaceManager`] living on this stack
//! frame, so every early return releases it. Once the destination has been
//! truncated, any failure removes it again.

use crate::config::{ConversionConfig, FailurePolicy};
use crate::error::PdfttError;
use crate::merge::merge_pages;
use crate::output::{ConversionOutput, ConversionStats, PageJob};
use crate::pipeline::converter::{PageConverter, ToolchainConverter};
use crate::pipeline::input;
use crate::pipeline::probe::{self, DocumentInfo};
use crate::pipeline::workspace::{ArtifactNaming, WorkspaceManager};
use crate::scheduler::Scheduler;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

pub use crate::pipeline::input::default_output_path;

/// Convert `source` and write the transcript to `output`.
///
/// This is the primary entry point for the library. `output` is created or
/// truncated before any page work starts.
///
/// # Errors
/// Every error is fatal and leaves no file at `output`:
/// - source missing, unreadable or not a PDF
/// - `pdfinfo` failed, or the page range selects nothing
/// - `output` is the source file itself
/// - workspace or output not writable
/// - a page failed (unless the policy is [`FailurePolicy::SkipPage`])
pub async fn convert_to_file(
    source: impl AsRef<Path>,
    output: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionStats, PdfttError> {
    run(source.as_ref(), output.as_ref(), config)
        .await
        .map(|(_, stats)| stats)
}

/// Convert `source` and return the transcript in memory.
///
/// The merge goes through a managed [`tempfile`] that is removed on return.
pub async fn convert(
    source: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, PdfttError> {
    let tmp = tempfile::Builder::new()
        .prefix("pdftt-out-")
        .suffix(".txt")
        .tempfile()
        .map_err(|e| PdfttError::Internal(format!("tempfile: {e}")))?;

    let (info, stats) = run(source.as_ref(), tmp.path(), config).await?;
    let bytes = tokio::fs::read(tmp.path())
        .await
        .map_err(|e| PdfttError::OutputWriteFailed {
            path: tmp.path().to_path_buf(),
            source: e,
        })?;

    Ok(ConversionOutput {
        text: String::from_utf8_lossy(&bytes).into_owned(),
        info,
        stats,
    })
}

/// Convert PDF bytes held in memory.
///
/// The bytes are written to a managed [`tempfile`] that is deleted on
/// return or panic.
pub async fn convert_from_bytes(
    bytes: &[u8],
    config: &ConversionConfig,
) -> Result<ConversionOutput, PdfttError> {
    let mut tmp = tempfile::Builder::new()
        .prefix("pdftt-in-")
        .suffix(".pdf")
        .tempfile()
        .map_err(|e| PdfttError::Internal(format!("tempfile: {e}")))?;
    tmp.write_all(bytes)
        .and_then(|()| tmp.flush())
        .map_err(|e| PdfttError::Internal(format!("tempfile write: {e}")))?;
    convert(tmp.path(), config).await
}

/// Synchronous wrapper around [`convert_to_file`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    source: impl AsRef<Path>,
    output: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionStats, PdfttError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| PdfttError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert_to_file(source, output, config))
}

/// Probe `source` without converting any page.
pub async fn inspect(
    source: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<DocumentInfo, PdfttError> {
    let source = input::resolve_source(source.as_ref())?;
    probe::probe(&source, &config.tools).await
}

async fn run(
    source: &Path,
    destination: &Path,
    config: &ConversionConfig,
) -> Result<(DocumentInfo, ConversionStats), PdfttError> {
    let total_start = Instant::now();
    info!("Starting conversion: {}", source.display());

    // ── Step 1: Validate and probe ───────────────────────────────────────
    let source = input::resolve_source(source)?;
    let info = probe::probe(&source, &config.tools).await?;
    let document_pages = info.page_count();
    let (first, last) = config.page_range(document_pages)?;
    info!(
        "PDF has {} pages, converting {}..={}",
        document_pages, first, last
    );

    // ── Step 2: Truncate destination ─────────────────────────────────────
    ensure_distinct(&source, destination)?;
    prepare_destination(destination).await?;

    // ── Step 3: Convert and merge ────────────────────────────────────────
    match convert_pages(&source, destination, first, last, config).await {
        Ok(mut stats) => {
            stats.document_pages = document_pages;
            stats.total_duration_ms = total_start.elapsed().as_millis() as u64;
            info!(
                "Conversion complete: {}/{} pages, {} bytes, {}ms total",
                stats.converted_pages,
                stats.selected_pages(),
                stats.output_bytes,
                stats.total_duration_ms
            );
            Ok((info, stats))
        }
        Err(e) => {
            discard_destination(destination).await;
            Err(e)
        }
    }
}

async fn convert_pages(
    source: &Path,
    destination: &Path,
    first: u32,
    last: u32,
    config: &ConversionConfig,
) -> Result<ConversionStats, PdfttError> {
    let mut manager = WorkspaceManager::new();
    let workspace = manager.acquire(config.workspace_dir.as_deref())?;
    let naming = ArtifactNaming::for_last_page(last);

    let converter: Arc<dyn PageConverter> = Arc::new(
        ToolchainConverter::new(config.tools.clone(), Arc::clone(&workspace), naming)
            .with_progress(config.progress_callback.clone()),
    );
    let jobs = PageJob::for_range(Arc::new(source.to_path_buf()), first, last);
    let selected = jobs.len();

    if let Some(ref cb) = config.progress_callback {
        cb.on_conversion_start(selected);
    }

    // ── Schedule ─────────────────────────────────────────────────────────
    let convert_start = Instant::now();
    let report = Scheduler::new(config.workers, config.failure_policy)
        .run(jobs, converter, config.progress_callback.clone())
        .await;
    let convert_duration_ms = convert_start.elapsed().as_millis() as u64;

    if let Some(ref cb) = config.progress_callback {
        cb.on_conversion_complete(selected, report.completed.len());
    }

    // ── Apply failure policy ─────────────────────────────────────────────
    match config.failure_policy {
        FailurePolicy::Drain | FailurePolicy::FailFast => {
            if let Some(e) = report.first_failure() {
                return Err(PdfttError::PageFailed(e.clone()));
            }
        }
        FailurePolicy::SkipPage => {
            if report.completed.is_empty() {
                let first_error = report
                    .first_failure()
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "Unknown error".to_string());
                return Err(PdfttError::AllPagesFailed {
                    total: selected,
                    first_error,
                });
            }
            for e in &report.failed {
                warn!("Skipped {}", e);
            }
        }
    }
    if !report.not_dispatched.is_empty() {
        return Err(PdfttError::Internal(format!(
            "{} pages were never dispatched",
            report.not_dispatched.len()
        )));
    }

    // ── Merge ────────────────────────────────────────────────────────────
    let merge_start = Instant::now();
    let converted_pages = report.completed.len();
    let output_bytes = merge_pages(
        report.completed,
        destination,
        config.progress_callback.as_ref(),
    )
    .await?;
    let merge_duration_ms = merge_start.elapsed().as_millis() as u64;

    let workspace_path = workspace.path().to_path_buf();
    drop(workspace);
    if let Err(e) = manager.release() {
        warn!(
            "failed to release workspace {}: {}",
            workspace_path.display(),
            e
        );
    }

    Ok(ConversionStats {
        first_page: first,
        last_page: last,
        converted_pages,
        failed_pages: report.failed.len(),
        undispatched_pages: report.not_dispatched.len(),
        output_bytes,
        workspace: workspace_path,
        convert_duration_ms,
        merge_duration_ms,
        ..Default::default()
    })
}

/// Refuse a destination that names the source file, through any relative
/// path or symlink.
fn ensure_distinct(source: &Path, destination: &Path) -> Result<(), PdfttError> {
    let same = match (std::fs::canonicalize(source), canonical_destination(destination)) {
        (Ok(src), Some(dst)) => src == dst,
        _ => false,
    };
    if same {
        return Err(PdfttError::OutputIsSource {
            path: destination.to_path_buf(),
        });
    }
    Ok(())
}

/// Canonical form of a path that may not exist yet.
fn canonical_destination(destination: &Path) -> Option<PathBuf> {
    if let Ok(path) = std::fs::canonicalize(destination) {
        return Some(path);
    }
    let name = destination.file_name()?;
    let parent = match destination.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::canonicalize(parent).ok().map(|p| p.join(name))
}

async fn prepare_destination(destination: &Path) -> Result<(), PdfttError> {
    let write_err = |source| PdfttError::OutputWriteFailed {
        path: destination.to_path_buf(),
        source,
    };
    if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }
    tokio::fs::File::create(destination)
        .await
        .map_err(write_err)?;
    debug!("truncated {}", destination.display());
    Ok(())
}

async fn discard_destination(destination: &Path) {
    match tokio::fs::remove_file(destination).await {
        Ok(()) => debug!("removed partial output {}", destination.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(
            "could not remove partial output {}: {}",
            destination.display(),
            e
        ),
    }
}
