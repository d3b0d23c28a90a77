//! # pdftt
//!
//! Convert scanned PDF documents to plain text by running OCR on every page
//! in parallel.
//!
//! ## Why this crate?
//!
//! `pdftotext` alone returns nothing for a scan: there is no text layer to
//! extract. This crate renders each page to a grayscale bitmap, lets
//! tesseract build a searchable single-page PDF from it, and extracts that
//! page's layout text. Pages run concurrently on a fixed number of workers
//! and are merged back in page order.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Probe     page count and metadata (pdfinfo)
//!  ├─ 2. Workspace scratch directory for per-page artifacts
//!  ├─ 3. Convert   per page: pdftoppm → tesseract → pdftotext
//!  ├─ 4. Schedule  at most N pages in flight, completion in any order
//!  └─ 5. Merge     delimiter + page text, ascending page order
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdftt::{convert_to_file, ConversionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConversionConfig::builder().workers(4).build()?;
//!     let stats = convert_to_file("scan.pdf", "scan.txt", &config).await?;
//!     eprintln!("{} pages in {}ms", stats.converted_pages, stats.total_duration_ms);
//!     Ok(())
//! }
//! ```
//!
//! ## External Tools
//!
//! `pdfinfo`, `pdftoppm` and `pdftotext` come from poppler-utils; `tesseract`
//! needs the `eng`, `ind` and `jav` language data. Paths can be overridden
//! with [`Toolchain`].
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdftt` binary and its CLI-only dependencies |
//!
//! ```toml
//! pdftt = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod merge;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod scheduler;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ConversionConfig, ConversionConfigBuilder, FailurePolicy, Toolchain};
pub use convert::{
    convert, convert_from_bytes, convert_sync, convert_to_file, default_output_path, inspect,
};
pub use error::{PageError, PdfttError};
pub use merge::{merge_pages, PAGE_DELIMITER};
pub use output::{ConversionOutput, ConversionStats, PageJob, PageResult, PageState, Stage};
pub use pipeline::converter::{PageConverter, ToolchainConverter};
pub use pipeline::probe::{probe, DocumentInfo, InfoValue};
pub use pipeline::workspace::{ArtifactKind, ArtifactNaming, Workspace, WorkspaceManager};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use scheduler::{ScheduleReport, Scheduler};
