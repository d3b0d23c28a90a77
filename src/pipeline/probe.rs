//! Document probing via `pdfinfo`.
//!
//! `pdfinfo` prints one `Key: Value` pair per line. Values made only of
//! ASCII digits become integers; everything else stays text. Only `Pages`
//! is needed by the pipeline, the rest is surfaced by `--inspect-only`.

use crate::config::Toolchain;
use crate::error::PdfttError;
use crate::pipeline::process::ToolCommand;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use tracing::{debug, warn};

/// Key under which the probe reports the page count.
pub const PAGES_KEY: &str = "Pages";

/// A single metadata value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InfoValue {
    Int(i64),
    Text(String),
}

impl InfoValue {
    fn parse(raw: &str) -> Self {
        if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(n) = raw.parse() {
                return InfoValue::Int(n);
            }
        }
        InfoValue::Text(raw.to_string())
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            InfoValue::Int(n) => Some(*n),
            InfoValue::Text(_) => None,
        }
    }
}

impl fmt::Display for InfoValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InfoValue::Int(n) => write!(f, "{n}"),
            InfoValue::Text(s) => f.write_str(s),
        }
    }
}

/// Metadata reported for a document, keyed as the probe prints it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub fields: BTreeMap<String, InfoValue>,
}

impl DocumentInfo {
    /// Parse probe output. Lines without a `:` are ignored; a repeated key
    /// keeps its last value.
    pub fn parse<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut fields = BTreeMap::new();
        for line in lines {
            let line = line.as_ref();
            let Some((key, value)) = line.split_once(':') else {
                if !line.trim().is_empty() {
                    debug!("probe: ignoring line without key: {:?}", line);
                }
                continue;
            };
            let key = key.trim();
            if key.is_empty() {
                continue;
            }
            fields.insert(key.to_string(), InfoValue::parse(value.trim()));
        }
        Self { fields }
    }

    pub fn get(&self, key: &str) -> Option<&InfoValue> {
        self.fields.get(key)
    }

    /// Page count; `1` when the probe did not report an integer `Pages`.
    pub fn page_count(&self) -> u32 {
        match self.get(PAGES_KEY).and_then(InfoValue::as_int) {
            Some(n) => u32::try_from(n).unwrap_or(u32::MAX),
            None => {
                warn!("probe reported no integer '{}' field, assuming 1 page", PAGES_KEY);
                1
            }
        }
    }
}

/// Run the probe tool on `source`.
///
/// A probe that cannot start or exits non-zero is fatal: without a page
/// count there is nothing to schedule.
pub async fn probe(source: &Path, tools: &Toolchain) -> Result<DocumentInfo, PdfttError> {
    let lines = ToolCommand::new(&tools.pdfinfo)
        .arg(source)
        .run_capture_lines()
        .await
        .map_err(|e| PdfttError::ProbeFailed {
            path: source.to_path_buf(),
            detail: e.to_string(),
        })?;

    let info = DocumentInfo::parse(lines);
    debug!("probe: {} fields for {}", info.fields.len(), source.display());
    Ok(info)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PDFINFO_OUTPUT: &str = "\
Title:          Laporan Tahunan
Producer:       GPL Ghostscript 9.50
Tagged:         no
Pages:          42
Encrypted:      no
Page size:      595 x 842 pts (A4)
File size:      1234567 bytes
PDF version:    1.4";

    #[test]
    fn parses_pdfinfo_output() {
        let info = DocumentInfo::parse(PDFINFO_OUTPUT.lines());
        assert_eq!(info.page_count(), 42);
        assert_eq!(
            info.get("Title"),
            Some(&InfoValue::Text("Laporan Tahunan".into()))
        );
        assert_eq!(
            info.get("Page size"),
            Some(&InfoValue::Text("595 x 842 pts (A4)".into()))
        );
        assert_eq!(
            info.get("File size"),
            Some(&InfoValue::Text("1234567 bytes".into()))
        );
        assert_eq!(info.get("PDF version"), Some(&InfoValue::Text("1.4".into())));
    }

    #[test]
    fn value_keeps_colons_after_the_first() {
        let info = DocumentInfo::parse(["CreationDate:   Mon Jan  1 10:20:30 2024"]);
        assert_eq!(
            info.get("CreationDate"),
            Some(&InfoValue::Text("Mon Jan  1 10:20:30 2024".into()))
        );
    }

    #[test]
    fn missing_pages_defaults_to_one() {
        let info = DocumentInfo::parse(["Title: untitled"]);
        assert_eq!(info.page_count(), 1);
    }

    #[test]
    fn non_numeric_pages_defaults_to_one() {
        let info = DocumentInfo::parse(["Pages: many"]);
        assert_eq!(info.page_count(), 1);
    }

    #[test]
    fn zero_pages_is_reported_as_zero() {
        let info = DocumentInfo::parse(["Pages: 0"]);
        assert_eq!(info.page_count(), 0);
    }

    #[test]
    fn ignores_lines_without_separator() {
        let info = DocumentInfo::parse(["", "garbage", ": no key", "Pages: 2"]);
        assert_eq!(info.fields.len(), 1);
        assert_eq!(info.page_count(), 2);
    }

    #[test]
    fn negative_numbers_stay_text() {
        assert_eq!(InfoValue::parse("-1"), InfoValue::Text("-1".into()));
        assert_eq!(InfoValue::parse("007"), InfoValue::Int(7));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn missing_probe_tool_is_fatal() {
        let tools = Toolchain {
            pdfinfo: "/definitely/not/pdfinfo".into(),
            ..Toolchain::default()
        };
        let err = probe(Path::new("doc.pdf"), &tools).await.unwrap_err();
        assert!(matches!(err, PdfttError::ProbeFailed { .. }), "got {err:?}");
    }
}
