//! Adapters for the three per-page tools.
//!
//! The tool settings are constants, not configuration: every page of every
//! run is rendered, recognised and extracted the same way.
//!
//! | Stage | Program | Input | Output |
//! |-------|---------|-------|--------|
//! | rasterize | `pdftoppm` | source PDF, one page | graymap on stdout → `page-N.pgm` |
//! | ocr | `tesseract` | `page-N.pgm` | `page-N.pdf` (searchable) |
//! | extract | `pdftotext` | `page-N.pdf` | `page-N.txt` |

use crate::config::Toolchain;
use crate::pipeline::process::{ToolCommand, ToolError};
use std::path::{Path, PathBuf};

/// Rendering resolution.
pub const RASTER_DPI: u32 = 150;

/// pdftoppm flags: anti-aliasing on, annotations hidden, grayscale,
/// crop box instead of media box, quiet.
pub const RASTER_FLAGS: [&str; 6] = [
    "-aa",
    "yes",
    "-hide-annotations",
    "-gray",
    "-cropbox",
    "-q",
];

/// Recognition languages: English plus Indonesian and Javanese.
pub const OCR_LANGUAGES: &str = "eng+ind+jav";

/// Page segmentation mode 6: a single uniform block of text.
pub const OCR_PAGE_SEGMENTATION: u32 = 6;

/// pdftotext flags: keep layout, no form feeds between pages, quiet.
pub const EXTRACT_FLAGS: [&str; 3] = ["-layout", "-nopgbrk", "-q"];

pub fn rasterize_command(tools: &Toolchain, source: &Path, page: u32) -> ToolCommand {
    let page = page.to_string();
    ToolCommand::new(&tools.pdftoppm)
        .arg("-r")
        .arg(RASTER_DPI.to_string())
        .args(RASTER_FLAGS)
        .args(["-f", page.as_str(), "-l", page.as_str()])
        .arg(source)
}

/// tesseract appends `.pdf` itself, so it is given the artifact path minus
/// its extension.
pub fn ocr_command(tools: &Toolchain, raster: &Path, searchable: &Path) -> ToolCommand {
    ToolCommand::new(&tools.tesseract)
        .arg(raster)
        .arg(output_base(searchable))
        .args(["-l", OCR_LANGUAGES, "--psm"])
        .arg(OCR_PAGE_SEGMENTATION.to_string())
        .arg("pdf")
}

pub fn extract_command(tools: &Toolchain, searchable: &Path, text: &Path) -> ToolCommand {
    ToolCommand::new(&tools.pdftotext)
        .args(EXTRACT_FLAGS)
        .arg(searchable)
        .arg(text)
}

fn output_base(searchable: &Path) -> PathBuf {
    searchable.with_extension("")
}

/// Render `page` of `source` into `raster`.
pub async fn rasterize(
    tools: &Toolchain,
    source: &Path,
    page: u32,
    raster: &Path,
) -> Result<u64, ToolError> {
    let cmd = rasterize_command(tools, source, page);
    let written = cmd.run_to_file(raster).await?;
    if written == 0 {
        return Err(ToolError::MissingOutput {
            program: cmd.program_name(),
            path: raster.to_path_buf(),
        });
    }
    Ok(written)
}

/// Recognise `raster` into the searchable PDF `searchable`.
pub async fn ocr(tools: &Toolchain, raster: &Path, searchable: &Path) -> Result<(), ToolError> {
    let cmd = ocr_command(tools, raster, searchable);
    cmd.run().await?;
    ensure_written(&cmd, searchable).await
}

/// Extract layout text of `searchable` into `text`.
pub async fn extract(tools: &Toolchain, searchable: &Path, text: &Path) -> Result<(), ToolError> {
    let cmd = extract_command(tools, searchable, text);
    cmd.run().await?;
    ensure_written(&cmd, text).await
}

async fn ensure_written(cmd: &ToolCommand, artifact: &Path) -> Result<(), ToolError> {
    match tokio::fs::metadata(artifact).await {
        Ok(meta) if meta.is_file() => Ok(()),
        _ => Err(ToolError::MissingOutput {
            program: cmd.program_name(),
            path: artifact.to_path_buf(),
        }),
    }
}
