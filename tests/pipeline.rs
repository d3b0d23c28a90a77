//! Integration tests for the full conversion pipeline.
//!
//! The four external tools are replaced by small shell scripts that honour
//! the same argument layout as poppler and tesseract:
//!
//! - `pdfinfo` reads `pages=N` from the "PDF" and prints `Pages: N`
//! - `pdftoppm` prints `raster page N` to stdout
//! - `tesseract` copies that line into `<base>.pdf`, or fails when the
//!   raster carries the `FAIL` marker
//! - `pdftotext` rewrites it to `text of page N`
//!
//! The source file drives the scripts: `pages=N` sets the page count,
//! `fail=N` makes the OCR stage of page N fail and `log=PATH` makes the OCR
//! stage append the directory it works in to PATH. Lower pages OCR more
//! slowly, so pages finish in reverse order whenever they overlap.
//!
//! Run with:
//!   cargo test --test pipeline

#![cfg(unix)]

use pdftt::{
    convert, convert_to_file, default_output_path, inspect, ConversionConfig,
    ConversionProgressCallback, FailurePolicy, PageState, PdfttError, ProgressCallback, Stage,
    Toolchain, PAGE_DELIMITER,
};
use std::collections::HashMap;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};
use tempfile::TempDir;

// ── Fake toolchain ───────────────────────────────────────────────────────────

const PDFINFO: &str = r#"#!/bin/sh
n=$(sed -n 's/^pages=//p' "$1")
echo "Title:          Fake scan"
echo "Producer:       pdftt tests"
if [ -n "$n" ]; then echo "Pages:          $n"; fi
echo "Encrypted:      no"
"#;

// -r 150 -aa yes -hide-annotations -gray -cropbox -q -f N -l N SOURCE
const PDFTOPPM: &str = r#"#!/bin/sh
[ "$2" = "150" ] || { echo "bad dpi $2" >&2; exit 2; }
page="${10}"
src="${13}"
fail=$(sed -n 's/^fail=//p' "$src")
if [ "$page" = "$fail" ]; then
  echo "raster page $page FAIL"
else
  echo "raster page $page"
fi
log=$(sed -n 's/^log=//p' "$src")
if [ -n "$log" ]; then echo "log=$log"; fi
"#;

// RASTER BASE -l eng+ind+jav --psm 6 pdf
const TESSERACT: &str = r#"#!/bin/sh
[ "$4" = "eng+ind+jav" ] || { echo "bad languages $4" >&2; exit 2; }
[ "$6" = "6" ] || { echo "bad psm $6" >&2; exit 2; }
[ "$7" = "pdf" ] || { echo "bad config $7" >&2; exit 2; }
log=$(sed -n 's/^log=//p' "$1")
if [ -n "$log" ]; then dirname "$1" >> "$log"; fi
line=$(head -n 1 "$1")
case "$line" in
  *FAIL) echo "Error: injected OCR failure" >&2; exit 1 ;;
esac
n=$(echo "$line" | sed 's/^raster page \([0-9]*\).*/\1/')
sleep "0.0$(( 10 - n % 10 ))"
echo "$line" > "$2.pdf"
"#;

// -layout -nopgbrk -q IN OUT
const PDFTOTEXT: &str = r#"#!/bin/sh
sed 's/^raster page/text of page/' "$4" > "$5"
"#;

/// Scripts are written once per test binary so no test forks while another
/// still holds a script open for writing.
fn fake_tools() -> &'static Toolchain {
    static TOOLS: OnceLock<(TempDir, Toolchain)> = OnceLock::new();
    &TOOLS
        .get_or_init(|| {
            let dir = tempfile::Builder::new()
                .prefix("pdftt-fake-tools-")
                .tempdir()
                .unwrap();
            let script = |name: &str, body: &str| -> PathBuf {
                let path = dir.path().join(name);
                std::fs::write(&path, body).unwrap();
                std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
                path
            };
            let tools = Toolchain {
                pdfinfo: script("pdfinfo", PDFINFO),
                pdftoppm: script("pdftoppm", PDFTOPPM),
                tesseract: script("tesseract", TESSERACT),
                pdftotext: script("pdftotext", PDFTOTEXT),
            };
            (dir, tools)
        })
        .1
}

fn fake_pdf(dir: &Path, pages: Option<u32>, fail: Option<u32>) -> PathBuf {
    let path = dir.join("scan.pdf");
    write_fake_pdf(&path, pages, fail, None);
    path
}

fn write_fake_pdf(path: &Path, pages: Option<u32>, fail: Option<u32>, log: Option<&Path>) {
    let mut body = String::from("%PDF-1.4\n");
    if let Some(n) = pages {
        body.push_str(&format!("pages={n}\n"));
    }
    if let Some(n) = fail {
        body.push_str(&format!("fail={n}\n"));
    }
    if let Some(log) = log {
        body.push_str(&format!("log={}\n", log.display()));
    }
    std::fs::write(path, body).unwrap();
}

/// Directories the OCR stage ran in, one line per page.
fn logged_dirs(log: &Path) -> Vec<PathBuf> {
    std::fs::read_to_string(log)
        .unwrap()
        .lines()
        .map(PathBuf::from)
        .collect()
}

fn config() -> pdftt::ConversionConfigBuilder {
    ConversionConfig::builder().tools(fake_tools().clone())
}

fn expected(pages: impl IntoIterator<Item = u32>) -> String {
    pages
        .into_iter()
        .map(|n| format!("{PAGE_DELIMITER}text of page {n}\n"))
        .collect()
}

/// Page artifacts and run directories left in `dir`.
fn scratch_in(dir: &Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|n| n.starts_with("page-") || n.starts_with("pdftt-"))
        .collect()
}

/// Records every state transition per page.
#[derive(Default)]
struct StateRecorder {
    states: Mutex<HashMap<u32, Vec<PageState>>>,
    started: Mutex<Vec<u32>>,
}

impl StateRecorder {
    fn count(&self, state: PageState) -> usize {
        self.states
            .lock()
            .unwrap()
            .values()
            .filter(|v| v.contains(&state))
            .count()
    }
}

impl ConversionProgressCallback for StateRecorder {
    fn on_page_start(&self, page_num: u32, _total: usize) {
        self.started.lock().unwrap().push(page_num);
    }

    fn on_page_state(&self, page_num: u32, state: PageState) {
        self.states
            .lock()
            .unwrap()
            .entry(page_num)
            .or_default()
            .push(state);
    }
}

// ── Output shape ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn three_page_document_exact_output() {
    let dir = tempfile::tempdir().unwrap();
    let src = fake_pdf(dir.path(), Some(3), None);
    let out = dir.path().join("scan.txt");

    let stats = convert_to_file(&src, &out, &config().workers(3).build().unwrap())
        .await
        .unwrap();

    assert_eq!(std::fs::read_to_string(&out).unwrap(), expected(1..=3));
    assert_eq!(stats.document_pages, 3);
    assert_eq!(stats.converted_pages, 3);
    assert_eq!(stats.failed_pages, 0);
    assert_eq!(stats.output_bytes, std::fs::metadata(&out).unwrap().len());
}

#[tokio::test]
async fn section_count_matches_pages_for_any_worker_count() {
    for workers in [1, 2, 8] {
        let dir = tempfile::tempdir().unwrap();
        let src = fake_pdf(dir.path(), Some(7), None);
        let out = dir.path().join("scan.txt");

        convert_to_file(&src, &out, &config().workers(workers).build().unwrap())
            .await
            .unwrap();

        let text = std::fs::read_to_string(&out).unwrap();
        assert_eq!(text.matches(PAGE_DELIMITER).count(), 7, "workers={workers}");
        assert_eq!(text, expected(1..=7), "workers={workers}");
    }
}

#[tokio::test]
async fn single_page_document() {
    let dir = tempfile::tempdir().unwrap();
    let src = fake_pdf(dir.path(), Some(1), None);
    let out = dir.path().join("scan.txt");

    convert_to_file(&src, &out, &config().workers(4).build().unwrap())
        .await
        .unwrap();

    assert_eq!(
        std::fs::read_to_string(&out).unwrap(),
        format!("{PAGE_DELIMITER}text of page 1\n")
    );
}

#[tokio::test]
async fn conversion_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let src = fake_pdf(dir.path(), Some(5), None);
    let out = dir.path().join("scan.txt");
    let cfg = config().workers(3).build().unwrap();

    convert_to_file(&src, &out, &cfg).await.unwrap();
    let first = std::fs::read(&out).unwrap();
    convert_to_file(&src, &out, &cfg).await.unwrap();
    let second = std::fs::read(&out).unwrap();

    assert_eq!(first, second);
}

#[tokio::test]
async fn page_range_is_respected_and_last_page_clamped() {
    let dir = tempfile::tempdir().unwrap();
    let src = fake_pdf(dir.path(), Some(5), None);
    let out = dir.path().join("scan.txt");

    let stats = convert_to_file(
        &src,
        &out,
        &config().first_page(3).last_page(99).build().unwrap(),
    )
    .await
    .unwrap();

    assert_eq!(std::fs::read_to_string(&out).unwrap(), expected(3..=5));
    assert_eq!((stats.first_page, stats.last_page), (3, 5));
    assert_eq!(stats.selected_pages(), 3);
}

#[tokio::test]
async fn first_page_past_end_is_rejected_before_any_work() {
    let dir = tempfile::tempdir().unwrap();
    let src = fake_pdf(dir.path(), Some(2), None);
    let out = dir.path().join("scan.txt");

    let err = convert_to_file(&src, &out, &config().first_page(4).build().unwrap())
        .await
        .unwrap_err();

    assert!(
        matches!(err, PdfttError::PageOutOfRange { first: 4, total: 2, .. }),
        "got {err:?}"
    );
    assert!(!out.exists());
}

#[tokio::test]
async fn missing_page_count_defaults_to_one_page() {
    let dir = tempfile::tempdir().unwrap();
    let src = fake_pdf(dir.path(), None, None);

    let output = convert(&src, &config().build().unwrap()).await.unwrap();

    assert_eq!(output.text, expected(1..=1));
    assert_eq!(output.stats.document_pages, 1);
}

#[tokio::test]
async fn in_memory_conversion_returns_text_and_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let src = fake_pdf(dir.path(), Some(2), None);

    let output = convert(&src, &config().build().unwrap()).await.unwrap();

    assert_eq!(output.text, expected(1..=2));
    assert_eq!(
        output.info.get("Title").map(|v| v.to_string()).as_deref(),
        Some("Fake scan")
    );
}

#[tokio::test]
async fn inspect_reports_probe_fields() {
    let dir = tempfile::tempdir().unwrap();
    let src = fake_pdf(dir.path(), Some(12), None);

    let info = inspect(&src, &config().build().unwrap()).await.unwrap();

    assert_eq!(info.page_count(), 12);
    assert_eq!(info.get("Encrypted").map(|v| v.to_string()).as_deref(), Some("no"));
}

// ── Workspace lifecycle ──────────────────────────────────────────────────────

#[tokio::test]
async fn ephemeral_workspace_is_removed() {
    let dir = tempfile::tempdir().unwrap();
    let src = fake_pdf(dir.path(), Some(3), None);
    let out = dir.path().join("scan.txt");

    let stats = convert_to_file(&src, &out, &config().build().unwrap())
        .await
        .unwrap();

    assert!(!stats.workspace.as_os_str().is_empty());
    assert!(!stats.workspace.exists());
}

#[tokio::test]
async fn persistent_workspace_keeps_unrelated_files() {
    let dir = tempfile::tempdir().unwrap();
    let src = fake_pdf(dir.path(), Some(3), None);
    let out = dir.path().join("scan.txt");
    let cache = dir.path().join("cache");
    std::fs::create_dir(&cache).unwrap();
    std::fs::write(cache.join("notes.md"), "keep me").unwrap();

    convert_to_file(
        &src,
        &out,
        &config().workspace_dir(&cache).build().unwrap(),
    )
    .await
    .unwrap();

    assert!(cache.is_dir());
    assert!(cache.join("notes.md").exists());
    assert!(scratch_in(&cache).is_empty(), "{:?}", scratch_in(&cache));
}

#[tokio::test]
async fn source_inside_cache_dir_survives_artifact_like_name() {
    let dir = tempfile::tempdir().unwrap();
    let cache = dir.path().join("cache");
    std::fs::create_dir(&cache).unwrap();
    let src = cache.join("page-1.pdf");
    write_fake_pdf(&src, Some(1), None, None);
    let before = std::fs::read(&src).unwrap();
    let out = dir.path().join("scan.txt");

    convert_to_file(
        &src,
        &out,
        &config().workspace_dir(&cache).build().unwrap(),
    )
    .await
    .unwrap();

    assert_eq!(std::fs::read_to_string(&out).unwrap(), expected(1..=1));
    assert_eq!(std::fs::read(&src).unwrap(), before);
    assert_eq!(scratch_in(&cache), vec!["page-1.pdf".to_string()]);
}

#[tokio::test]
async fn cache_dir_files_outside_the_run_survive() {
    let dir = tempfile::tempdir().unwrap();
    let src = fake_pdf(dir.path(), Some(50), None);
    let out = dir.path().join("scan.txt");
    let cache = dir.path().join("cache");
    std::fs::create_dir(&cache).unwrap();
    let mut keep = vec!["page-42.pdf", "page-1.txt", "page-2.pgm"];
    for name in &keep {
        std::fs::write(cache.join(name), "keep me").unwrap();
    }

    let stats = convert_to_file(
        &src,
        &out,
        &config().last_page(2).workspace_dir(&cache).build().unwrap(),
    )
    .await
    .unwrap();

    assert_eq!(std::fs::read_to_string(&out).unwrap(), expected(1..=2));
    assert_eq!(stats.workspace.parent(), Some(cache.as_path()));
    assert!(!stats.workspace.exists());
    let mut left = scratch_in(&cache);
    left.sort();
    keep.sort();
    assert_eq!(left, keep);
    for name in &keep {
        assert_eq!(std::fs::read_to_string(cache.join(name)).unwrap(), "keep me");
    }
}

#[tokio::test]
async fn ephemeral_workspace_is_removed_after_a_drained_failure() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("ocr-dirs.log");
    let src = dir.path().join("scan.pdf");
    write_fake_pdf(&src, Some(5), Some(3), Some(&log));
    let out = dir.path().join("scan.txt");

    let err = convert_to_file(&src, &out, &config().workers(8).build().unwrap())
        .await
        .unwrap_err();

    match &err {
        PdfttError::PageFailed(e) => assert_eq!(e.page(), 3),
        other => panic!("expected PageFailed, got {other:?}"),
    }
    let dirs = logged_dirs(&log);
    assert_eq!(dirs.len(), 5, "{dirs:?}");
    assert!(dirs.iter().all(|d| d == &dirs[0]), "one workspace per run: {dirs:?}");
    assert!(!dirs[0].starts_with(dir.path()));
    assert!(!dirs[0].exists(), "{} left behind", dirs[0].display());
    assert!(!out.exists());
}

#[tokio::test]
async fn output_path_naming_the_source_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("scan.txt");
    write_fake_pdf(&src, Some(2), None, None);
    let before = std::fs::read(&src).unwrap();

    let out = default_output_path(&src);
    assert_eq!(out, src);

    let err = convert_to_file(&src, &out, &config().build().unwrap())
        .await
        .unwrap_err();

    assert!(matches!(err, PdfttError::OutputIsSource { .. }), "got {err:?}");
    assert_eq!(std::fs::read(&src).unwrap(), before);
}

// ── Failure policies ─────────────────────────────────────────────────────────

#[tokio::test]
async fn ocr_failure_drains_in_flight_pages_and_fails_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let src = fake_pdf(dir.path(), Some(5), Some(3));
    let out = dir.path().join("scan.txt");
    let cache = dir.path().join("cache");
    let recorder = Arc::new(StateRecorder::default());
    let cb: ProgressCallback = recorder.clone();

    let err = convert_to_file(
        &src,
        &out,
        &config()
            .workers(8)
            .workspace_dir(&cache)
            .progress_callback(cb)
            .build()
            .unwrap(),
    )
    .await
    .unwrap_err();

    match &err {
        PdfttError::PageFailed(e) => {
            assert_eq!(e.page(), 3);
            assert_eq!(e.stage(), Stage::Ocr);
            assert!(e.to_string().contains("injected OCR failure"), "{e}");
        }
        other => panic!("expected PageFailed, got {other:?}"),
    }
    // Every page was in flight; the other four finished their pipeline.
    assert_eq!(recorder.count(PageState::TextExtracted), 4);
    assert_eq!(recorder.count(PageState::Failed(Stage::Ocr)), 1);
    assert_eq!(recorder.count(PageState::Merged), 0);
    assert!(!out.exists(), "a failed run must not leave a transcript");
    assert!(scratch_in(&cache).is_empty(), "{:?}", scratch_in(&cache));
}

#[tokio::test]
async fn ocr_failure_stops_dispatch_with_one_worker() {
    let dir = tempfile::tempdir().unwrap();
    let src = fake_pdf(dir.path(), Some(5), Some(2));
    let out = dir.path().join("scan.txt");
    let recorder = Arc::new(StateRecorder::default());
    let cb: ProgressCallback = recorder.clone();

    let err = convert_to_file(
        &src,
        &out,
        &config().workers(1).progress_callback(cb).build().unwrap(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, PdfttError::PageFailed(_)), "got {err:?}");
    assert_eq!(*recorder.started.lock().unwrap(), vec![1, 2]);
    assert!(!out.exists());
}

#[tokio::test]
async fn fail_fast_abandons_in_flight_pages() {
    let dir = tempfile::tempdir().unwrap();
    let src = fake_pdf(dir.path(), Some(5), Some(3));
    let out = dir.path().join("scan.txt");
    let cache = dir.path().join("cache");

    let err = convert_to_file(
        &src,
        &out,
        &config()
            .workers(8)
            .workspace_dir(&cache)
            .failure_policy(FailurePolicy::FailFast)
            .build()
            .unwrap(),
    )
    .await
    .unwrap_err();

    match err {
        PdfttError::PageFailed(e) => assert_eq!(e.page(), 3),
        other => panic!("expected PageFailed, got {other:?}"),
    }
    assert!(!out.exists());
    assert!(scratch_in(&cache).is_empty(), "{:?}", scratch_in(&cache));
}

#[tokio::test]
async fn skip_page_omits_failed_page() {
    let dir = tempfile::tempdir().unwrap();
    let src = fake_pdf(dir.path(), Some(5), Some(3));
    let out = dir.path().join("scan.txt");

    let stats = convert_to_file(
        &src,
        &out,
        &config()
            .workers(2)
            .failure_policy(FailurePolicy::SkipPage)
            .build()
            .unwrap(),
    )
    .await
    .unwrap();

    assert_eq!(
        std::fs::read_to_string(&out).unwrap(),
        expected([1, 2, 4, 5])
    );
    assert_eq!(stats.converted_pages, 4);
    assert_eq!(stats.failed_pages, 1);
}

#[tokio::test]
async fn skip_page_with_every_page_failing_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let src = fake_pdf(dir.path(), Some(1), Some(1));
    let out = dir.path().join("scan.txt");

    let err = convert_to_file(
        &src,
        &out,
        &config()
            .failure_policy(FailurePolicy::SkipPage)
            .build()
            .unwrap(),
    )
    .await
    .unwrap_err();

    assert!(
        matches!(err, PdfttError::AllPagesFailed { total: 1, .. }),
        "got {err:?}"
    );
    assert!(!out.exists());
}

#[tokio::test]
async fn missing_ocr_engine_names_page_and_stage() {
    let dir = tempfile::tempdir().unwrap();
    let src = fake_pdf(dir.path(), Some(2), None);
    let out = dir.path().join("scan.txt");
    let tools = Toolchain {
        tesseract: dir.path().join("no-such-tesseract"),
        ..fake_tools().clone()
    };

    let err = convert_to_file(
        &src,
        &out,
        &ConversionConfig::builder()
            .workers(1)
            .tools(tools)
            .build()
            .unwrap(),
    )
    .await
    .unwrap_err();

    let msg = err.to_string();
    assert!(msg.contains("Page 1"), "{msg}");
    assert!(msg.contains("ocr stage failed"), "{msg}");
    assert!(msg.contains("failed to launch"), "{msg}");
}
