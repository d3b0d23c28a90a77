//! Error types for the pdftt library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`PdfttError`] is **fatal**: the run cannot produce a transcript (bad
//!   input file, probe tool missing, workspace or output not writable, or a
//!   page failed under an aborting [`crate::config::FailurePolicy`]).
//!   Returned as `Err(PdfttError)` from the top-level `convert*` functions.
//!
//! * [`PageError`]: a single page's conversion failed at one stage. The
//!   scheduler collects these per page; whether one of them ends the run is
//!   decided by the configured failure policy.

use crate::output::Stage;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the pdftt library.
#[derive(Debug, Error)]
pub enum PdfttError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── Document errors ───────────────────────────────────────────────────
    /// The probe tool could not be started or exited abnormally.
    #[error("Could not read page count of '{path}': {detail}\nIs poppler-utils (pdfinfo) installed?")]
    ProbeFailed { path: PathBuf, detail: String },

    /// The requested page range selects no pages of the document.
    #[error("Page range {first}..={last} selects no pages (document has {total} pages)")]
    PageOutOfRange { first: u32, last: u32, total: u32 },

    // ── Pipeline errors ───────────────────────────────────────────────────
    /// The scratch directory could not be created or prepared.
    #[error("Failed to prepare workspace '{path}': {source}")]
    WorkspaceFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A page failed and the failure policy aborts the run.
    #[error("{0}")]
    PageFailed(#[from] PageError),

    /// Every selected page failed under the skip-page policy.
    #[error("All {total} pages failed.\nFirst error: {first_error}")]
    AllPagesFailed { total: usize, first_error: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create, truncate or append to the output text file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The output path resolves to the source PDF itself.
    #[error("Output file '{path}' is the input PDF; choose a different output path")]
    OutputIsSource { path: PathBuf },

    /// A page's text artifact could not be read back during the merge.
    #[error("Failed to merge text of page {page} from '{path}': {source}")]
    MergeFailed {
        page: u32,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A failure of one page's conversion.
///
/// Always names the page and the stage, so the diagnostic printed for a
/// failed run tells the user exactly where to look.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// An external tool failed to launch, exited non-zero, or produced no artifact.
    #[error("Page {page}: {stage} stage failed: {detail}")]
    StageFailed {
        page: u32,
        stage: Stage,
        detail: String,
    },
}

impl PageError {
    /// The page this error belongs to.
    pub fn page(&self) -> u32 {
        match self {
            PageError::StageFailed { page, .. } => *page,
        }
    }

    /// The stage that failed.
    pub fn stage(&self) -> Stage {
        match self {
            PageError::StageFailed { stage, .. } => *stage,
        }
    }
}
