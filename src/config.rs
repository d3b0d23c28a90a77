//! Configuration types for PDF-to-text conversion.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. Rendering resolution, OCR languages
//! and segmentation mode are deliberately *not* here: they are fixed
//! constants of the stage adapters in [`crate::pipeline::stages`].

use crate::error::PdfttError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Configuration for a PDF-to-text conversion.
///
/// # Example
/// ```rust
/// use pdftt::{ConversionConfig, FailurePolicy};
///
/// let config = ConversionConfig::builder()
///     .workers(4)
///     .first_page(2)
///     .last_page(10)
///     .failure_policy(FailurePolicy::SkipPage)
///     .build()
///     .unwrap();
/// assert_eq!(config.workers, 4);
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Number of pages converted concurrently. Default: 2.
    ///
    /// Every in-flight page runs up to three heavyweight external processes
    /// one after another, so this bound is what keeps process-table and
    /// file-descriptor pressure in check. Tesseract is itself multi-threaded;
    /// raising this past the number of cores rarely helps.
    pub workers: usize,

    /// First page to convert (1-indexed, inclusive). Default: 1.
    pub first_page: u32,

    /// Last page to convert (1-indexed, inclusive). Default: last page.
    ///
    /// Values beyond the document's page count are clamped to it.
    pub last_page: Option<u32>,

    /// Scratch directory for per-page artifacts. Default: a fresh temp dir.
    ///
    /// A caller-supplied directory is created if missing and never removed.
    /// Each run works in its own `pdftt-XXXXXX` subdirectory of it, which is
    /// removed when the run ends; nothing else in the directory is touched.
    pub workspace_dir: Option<PathBuf>,

    /// What the scheduler does when a page fails. Default: [`FailurePolicy::Drain`].
    pub failure_policy: FailurePolicy,

    /// Programs invoked for each pipeline stage.
    pub tools: Toolchain,

    /// Optional observer for per-page progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            first_page: 1,
            last_page: None,
            workspace_dir: None,
            failure_policy: FailurePolicy::default(),
            tools: Toolchain::default(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("workers", &self.workers)
            .field("first_page", &self.first_page)
            .field("last_page", &self.last_page)
            .field("workspace_dir", &self.workspace_dir)
            .field("failure_policy", &self.failure_policy)
            .field("tools", &self.tools)
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn ConversionProgressCallback>"),
            )
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Resolve the configured range against the document's page count.
    ///
    /// Returns the inclusive `(first, last)` pair. `last_page` is clamped to
    /// `total`; a range that selects nothing is an error.
    pub fn page_range(&self, total: u32) -> Result<(u32, u32), PdfttError> {
        let first = self.first_page;
        let last = self.last_page.map_or(total, |l| l.min(total));
        if first == 0 || first > last {
            return Err(PdfttError::PageOutOfRange { first, last, total });
        }
        Ok((first, last))
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn workers(mut self, n: usize) -> Self {
        self.config.workers = n.max(1);
        self
    }

    pub fn first_page(mut self, page: u32) -> Self {
        self.config.first_page = page;
        self
    }

    pub fn last_page(mut self, page: u32) -> Self {
        self.config.last_page = Some(page);
        self
    }

    pub fn workspace_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.workspace_dir = Some(dir.into());
        self
    }

    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.config.failure_policy = policy;
        self
    }

    pub fn tools(mut self, tools: Toolchain) -> Self {
        self.config.tools = tools;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, PdfttError> {
        let c = &self.config;
        if c.workers == 0 {
            return Err(PdfttError::InvalidConfig("Workers must be ≥ 1".into()));
        }
        if c.first_page == 0 {
            return Err(PdfttError::InvalidConfig(
                "Pages are 1-indexed, first page must be ≥ 1".into(),
            ));
        }
        if let Some(last) = c.last_page {
            if last < c.first_page {
                return Err(PdfttError::InvalidConfig(format!(
                    "Last page {} is before first page {}",
                    last, c.first_page
                )));
            }
        }
        c.tools.validate()?;
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Scheduler reaction to the first page that reaches `Failed`.
///
/// | Policy | Undispatched pages | In-flight pages | Run outcome |
/// |--------|--------------------|-----------------|-------------|
/// | `Drain` | dropped | awaited | error (default) |
/// | `FailFast` | dropped | killed | error |
/// | `SkipPage` | dispatched | awaited | success with the page omitted |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FailurePolicy {
    /// Stop dispatching, wait for in-flight pages, then fail the run.
    #[default]
    Drain,
    /// Stop dispatching and kill in-flight tool processes immediately.
    FailFast,
    /// Keep going; failed pages are left out of the output and reported.
    SkipPage,
}

impl FailurePolicy {
    /// Whether a failed page stops further dispatch.
    pub fn halts_dispatch(self) -> bool {
        !matches!(self, FailurePolicy::SkipPage)
    }
}

/// External programs used by the pipeline.
///
/// Each field is a program name resolved through `PATH` or an absolute path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Toolchain {
    /// Metadata probe (poppler `pdfinfo`).
    pub pdfinfo: PathBuf,
    /// Rasteriser (poppler `pdftoppm`).
    pub pdftoppm: PathBuf,
    /// OCR engine (`tesseract`).
    pub tesseract: PathBuf,
    /// Text extractor (poppler `pdftotext`).
    pub pdftotext: PathBuf,
}

impl Default for Toolchain {
    fn default() -> Self {
        Self {
            pdfinfo: PathBuf::from("pdfinfo"),
            pdftoppm: PathBuf::from("pdftoppm"),
            tesseract: PathBuf::from("tesseract"),
            pdftotext: PathBuf::from("pdftotext"),
        }
    }
}

impl Toolchain {
    fn validate(&self) -> Result<(), PdfttError> {
        for (name, program) in [
            ("pdfinfo", &self.pdfinfo),
            ("pdftoppm", &self.pdftoppm),
            ("tesseract", &self.tesseract),
            ("pdftotext", &self.pdftotext),
        ] {
            if program.as_os_str().is_empty() {
                return Err(PdfttError::InvalidConfig(format!(
                    "Program for {name} must not be empty"
                )));
            }
        }
        Ok(())
    }
}
