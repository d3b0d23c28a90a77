//! Value types that flow through a conversion run.
//!
//! ```text
//! PageJob ──▶ PageConverter ──▶ PageResult ──▶ merge ──▶ output file
//!            (PageState transitions)                 └──▶ ConversionStats
//! ```

use crate::pipeline::probe::DocumentInfo;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// One of the three external-tool stages of a page conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Page → grayscale bitmap (pdftoppm).
    Rasterize,
    /// Bitmap → searchable single-page PDF (tesseract).
    Ocr,
    /// Searchable PDF → layout text (pdftotext).
    Extract,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Rasterize => "rasterize",
            Stage::Ocr => "ocr",
            Stage::Extract => "extract",
        })
    }
}

/// Lifecycle of a single page.
///
/// `Rasterized → Ocred → TextExtracted → Merged`, with `Failed` reachable from
/// every state before `Merged`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageState {
    Rasterized,
    Ocred,
    TextExtracted,
    Merged,
    Failed(Stage),
}

impl PageState {
    /// `true` for `Merged` and `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, PageState::Merged | PageState::Failed(_))
    }
}

/// The unit of scheduled work: one page of one document.
#[derive(Debug, Clone)]
pub struct PageJob {
    /// 1-indexed page number.
    pub page: u32,
    /// The source PDF, shared by every job of the run.
    pub source: Arc<PathBuf>,
}

impl PageJob {
    /// One job per page in `first..=last`, ascending, no gaps.
    pub fn for_range(source: Arc<PathBuf>, first: u32, last: u32) -> Vec<PageJob> {
        (first..=last)
            .map(|page| PageJob {
                page,
                source: Arc::clone(&source),
            })
            .collect()
    }
}

/// A page that reached `TextExtracted`; consumed exactly once by the merger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageResult {
    /// 1-indexed page number.
    pub page_num: u32,
    /// Text artifact inside the workspace. Deleted by the merger.
    pub text_path: PathBuf,
    /// Size of the text artifact in bytes.
    pub text_bytes: u64,
    /// Wall-clock time of the three stages.
    pub duration_ms: u64,
}

/// Aggregate statistics for a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversionStats {
    /// Page count reported by the prober.
    pub document_pages: u32,
    /// First page converted (1-indexed, inclusive).
    pub first_page: u32,
    /// Last page converted (1-indexed, inclusive).
    pub last_page: u32,
    /// Pages that reached the output.
    pub converted_pages: usize,
    /// Pages that failed at some stage (only non-zero under the skip policy).
    pub failed_pages: usize,
    /// Pages never dispatched.
    pub undispatched_pages: usize,
    /// Bytes written to the output file.
    pub output_bytes: u64,
    /// Run directory the artifacts were written to. Removed before the stats
    /// are returned.
    pub workspace: PathBuf,
    pub total_duration_ms: u64,
    /// Time spent in the scheduler (all page pipelines).
    pub convert_duration_ms: u64,
    /// Time spent merging page text into the output.
    pub merge_duration_ms: u64,
}

impl ConversionStats {
    /// Pages selected by the configured range.
    pub fn selected_pages(&self) -> usize {
        if self.last_page < self.first_page {
            0
        } else {
            (self.last_page - self.first_page + 1) as usize
        }
    }
}

/// Result of [`crate::convert::convert`]: the merged text held in memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionOutput {
    /// Merged transcript, delimiter lines included.
    pub text: String,
    /// Metadata reported by the prober.
    pub info: DocumentInfo,
    pub stats: ConversionStats,
}
