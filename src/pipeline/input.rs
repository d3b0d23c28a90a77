//! Source validation before any tool is spawned.
//!
//! The poppler tools report a missing or non-PDF input with a generic
//! non-zero exit. Checking existence, readability and the `%PDF` magic up
//! front turns those into precise [`PdfttError`] variants.

use crate::error::PdfttError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Validate that `path` names a readable PDF file.
pub fn resolve_source(path: &Path) -> Result<PathBuf, PdfttError> {
    if !path.is_file() {
        return Err(PdfttError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    match std::fs::File::open(path) {
        Ok(mut f) => {
            let mut magic = [0u8; 4];
            if f.read_exact(&mut magic).is_ok() && &magic != b"%PDF" {
                return Err(PdfttError::NotAPdf {
                    path: path.to_path_buf(),
                    magic,
                });
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(PdfttError::PermissionDenied {
                path: path.to_path_buf(),
            });
        }
        Err(_) => {
            return Err(PdfttError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
    }

    debug!("Resolved local PDF: {}", path.display());
    Ok(path.to_path_buf())
}

/// Output path used when none is given: the source with its last extension
/// replaced by `.txt`.
///
/// `scan.v2.pdf` becomes `scan.v2.txt`; `scan` becomes `scan.txt`.
pub fn default_output_path(source: &Path) -> PathBuf {
    source.with_extension("txt")
}
