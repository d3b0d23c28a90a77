//! Ordered concatenation of page text into the destination file.
//!
//! Pages complete in any order; the merger runs once the scheduler is done
//! and appends them strictly by ascending page number. Every page section is
//! a [`PAGE_DELIMITER`] line followed by the page's text artifact, streamed in
//! [`CHUNK_SIZE`](crate::pipeline::process::CHUNK_SIZE) pieces. A merged
//! artifact is deleted immediately.

use crate::error::PdfttError;
use crate::output::{PageResult, PageState};
use crate::pipeline::converter::remove_artifact;
use crate::pipeline::process::copy_chunked;
use crate::progress::ProgressCallback;
use std::path::Path;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info};

/// Line written before every page, the first included.
pub const PAGE_DELIMITER: &str = "==================================================================================\n";

/// Append `results` to `destination` in page order.
///
/// `destination` must already exist (the run truncates it up front).
/// Returns the number of bytes appended.
pub async fn merge_pages(
    mut results: Vec<PageResult>,
    destination: &Path,
    progress: Option<&ProgressCallback>,
) -> Result<u64, PdfttError> {
    results.sort_by_key(|r| r.page_num);

    let write_err = |source| PdfttError::OutputWriteFailed {
        path: destination.to_path_buf(),
        source,
    };

    let file = tokio::fs::OpenOptions::new()
        .append(true)
        .open(destination)
        .await
        .map_err(write_err)?;
    let mut out = BufWriter::new(file);
    let mut written = 0u64;

    for result in &results {
        out.write_all(PAGE_DELIMITER.as_bytes())
            .await
            .map_err(write_err)?;
        written += PAGE_DELIMITER.len() as u64;

        let text = tokio::fs::File::open(&result.text_path)
            .await
            .map_err(|source| PdfttError::MergeFailed {
                page: result.page_num,
                path: result.text_path.clone(),
                source,
            })?;
        // copy_chunked flushes the writer; a read error and a write error
        // are indistinguishable here, so both are attributed to the page.
        written += copy_chunked(text, &mut out)
            .await
            .map_err(|source| PdfttError::MergeFailed {
                page: result.page_num,
                path: result.text_path.clone(),
                source,
            })?;

        remove_artifact(&result.text_path).await;
        debug!("page {}: merged", result.page_num);
        if let Some(cb) = progress {
            cb.on_page_state(result.page_num, PageState::Merged);
        }
    }

    out.flush().await.map_err(write_err)?;
    out.into_inner().sync_all().await.map_err(write_err)?;

    info!(
        "Merged {} pages ({} bytes) into {}",
        results.len(),
        written,
        destination.display()
    );
    Ok(written)
}
