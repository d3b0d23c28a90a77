//! CLI binary for pdftt.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ConversionConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pdftt::pipeline::probe::PAGES_KEY;
use pdftt::{
    convert, convert_to_file, default_output_path, inspect, ConversionConfig,
    ConversionProgressCallback, DocumentInfo, FailurePolicy, PageState, ProgressCallback,
    Toolchain,
};
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a live progress bar plus one log line per
/// page. Pages complete out of order, so per-page state is keyed by number.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<u32, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    /// The bar starts as a spinner; `on_conversion_start` gives it a length.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Probing PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Converting");
        self.bar.reset_eta();
    }

    fn elapsed_secs(&self, page_num: u32) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&page_num))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_conversion_start(&self, total_pages: usize) {
        self.activate_bar(total_pages);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Starting OCR of {total_pages} pages…"))
        ));
    }

    fn on_page_start(&self, page_num: u32, _total: usize) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(page_num, Instant::now());
        }
    }

    fn on_page_state(&self, page_num: u32, state: PageState) {
        match state {
            PageState::Rasterized => self.bar.set_message(format!("page {page_num}: ocr")),
            PageState::Ocred => self.bar.set_message(format!("page {page_num}: extract")),
            _ => {}
        }
    }

    fn on_page_complete(&self, page_num: u32, total: usize, text_bytes: u64) {
        let elapsed = self.elapsed_secs(page_num);
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {:<8}  {}",
            green("✓"),
            page_num,
            total,
            dim(&format!("{text_bytes:>6} bytes")),
            dim(&format!("{elapsed:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_num: u32, total: usize, error: &str) {
        let elapsed = self.elapsed_secs(page_num);
        self.errors.fetch_add(1, Ordering::SeqCst);

        // Keep the line short; the full diagnostic is in the final error.
        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            red("✗"),
            page_num,
            total,
            red(&msg),
            dim(&format!("{elapsed:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_conversion_complete(&self, total_pages: usize, success_count: usize) {
        let failed = self.errors.load(Ordering::SeqCst);
        self.bar.finish_and_clear();

        if success_count == total_pages {
            eprintln!(
                "{} {} pages recognised",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} pages recognised  ({} failed)",
                if success_count == 0 {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&success_count.to_string()),
                total_pages,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert a scan; writes scan.txt next to it
  pdftt scan.pdf

  # Pages 3 to 10, four pages at a time
  pdftt -f 3 -l 10 -t 4 scan.pdf -o excerpt.txt

  # Print the transcript to stdout
  pdftt scan.pdf -o -

  # Keep going when a page fails to OCR
  pdftt --on-error skip scan.pdf

  # Inspect PDF metadata only
  pdftt --inspect-only --json scan.pdf

OUTPUT FORMAT:
  Every page is preceded by a line of 82 '=' characters, the first page
  included. Pages appear in ascending order.

REQUIRED TOOLS:
  pdfinfo, pdftoppm, pdftotext   poppler-utils
  tesseract                      with eng, ind and jav language data

ENVIRONMENT VARIABLES:
  RUST_LOG                Override the log filter (e.g. pdftt=debug)
  PDFTT_*                 Every flag, e.g. PDFTT_THREADS=8, PDFTT_CACHE_DIR=/tmp/ocr
"#;

/// OCR scanned PDF files to plain text, page-parallel.
#[derive(Parser, Debug)]
#[command(
    name = "pdftt",
    version,
    about = "OCR scanned PDF files to plain text, page-parallel",
    long_about = "Convert scanned PDF documents to plain text. Each page is rasterised with \
pdftoppm, recognised by tesseract into a searchable PDF and extracted with pdftotext; pages run \
concurrently and are merged in page order.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// PDF file to convert.
    pdf: PathBuf,

    /// Output text file ('-' for stdout). Default: input with a .txt extension.
    #[arg(short, long, env = "PDFTT_OUTFILE")]
    outfile: Option<PathBuf>,

    /// First page to convert (1-indexed).
    #[arg(short = 'f', long, env = "PDFTT_MINPAGE", default_value_t = 1,
          value_parser = clap::value_parser!(u32).range(1..))]
    minpage: u32,

    /// Last page to convert. Default: last page of the document.
    #[arg(short = 'l', long, env = "PDFTT_MAXPAGE",
          value_parser = clap::value_parser!(u32).range(1..))]
    maxpage: Option<u32>,

    /// Number of pages converted concurrently.
    #[arg(short, long, env = "PDFTT_THREADS", default_value_t = 2)]
    threads: usize,

    /// Directory to create each run's scratch directory in. Default: the system temp dir.
    #[arg(long, env = "PDFTT_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    /// What to do when a page fails.
    #[arg(long, env = "PDFTT_ON_ERROR", value_enum, default_value = "drain")]
    on_error: OnErrorArg,

    /// pdfinfo program.
    #[arg(long, env = "PDFTT_PDFINFO", default_value = "pdfinfo")]
    pdfinfo: PathBuf,

    /// pdftoppm program.
    #[arg(long, env = "PDFTT_PDFTOPPM", default_value = "pdftoppm")]
    pdftoppm: PathBuf,

    /// tesseract program.
    #[arg(long, env = "PDFTT_TESSERACT", default_value = "tesseract")]
    tesseract: PathBuf,

    /// pdftotext program.
    #[arg(long, env = "PDFTT_PDFTOTEXT", default_value = "pdftotext")]
    pdftotext: PathBuf,

    /// Output run statistics (or metadata with --inspect-only) as JSON.
    #[arg(long, env = "PDFTT_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDFTT_NO_PROGRESS")]
    no_progress: bool,

    /// Print PDF metadata only, no conversion.
    #[arg(long)]
    inspect_only: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDFTT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDFTT_QUIET")]
    quiet: bool,
}

impl Cli {
    fn writes_to_stdout(&self) -> bool {
        self.outfile.as_deref() == Some(Path::new("-"))
    }

    /// Stdout output, `--json`, `--inspect-only` and `--quiet` all disable the
    /// progress bar.
    fn shows_progress(&self) -> bool {
        !self.quiet
            && !self.no_progress
            && !self.json
            && !self.inspect_only
            && !self.writes_to_stdout()
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum OnErrorArg {
    /// Finish pages already running, start no new ones, then fail.
    Drain,
    /// Kill running pages and fail immediately.
    FailFast,
    /// Leave failed pages out of the output.
    Skip,
}

impl From<OnErrorArg> for FailurePolicy {
    fn from(v: OnErrorArg) -> Self {
        match v {
            OnErrorArg::Drain => FailurePolicy::Drain,
            OnErrorArg::FailFast => FailurePolicy::FailFast,
            OnErrorArg::Skip => FailurePolicy::SkipPage,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let to_stdout = cli.writes_to_stdout();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs.
    let show_progress = cli.shows_progress();
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn ConversionProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb)?;

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let info = inspect(&cli.pdf, &config)
            .await
            .context("Failed to inspect PDF")?;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&info).context("Failed to serialize metadata")?
            );
        } else {
            print_info(&cli.pdf, &info);
        }
        return Ok(());
    }

    // ── Run conversion ───────────────────────────────────────────────────
    if to_stdout {
        let output = convert(&cli.pdf, &config)
            .await
            .context("Conversion failed")?;
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle
            .write_all(output.text.as_bytes())
            .and_then(|()| handle.flush())
            .context("Failed to write to stdout")?;
        if cli.json {
            eprintln!(
                "{}",
                serde_json::to_string_pretty(&output.stats).context("Failed to serialise stats")?
            );
        }
        return Ok(());
    }

    let output_path = cli
        .outfile
        .clone()
        .unwrap_or_else(|| default_output_path(&cli.pdf));
    let stats = convert_to_file(&cli.pdf, &output_path, &config)
        .await
        .with_context(|| format!("Conversion of {} failed", cli.pdf.display()))?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&stats).context("Failed to serialise stats")?
        );
    } else if !cli.quiet {
        eprintln!(
            "{}  {}/{} pages  {}ms  →  {}",
            if stats.failed_pages == 0 {
                green("✔")
            } else {
                cyan("⚠")
            },
            stats.converted_pages,
            stats.selected_pages(),
            stats.total_duration_ms,
            bold(&output_path.display().to_string()),
        );
        if stats.failed_pages > 0 {
            eprintln!("   {} pages skipped after errors", red(&stats.failed_pages.to_string()));
        }
    }

    Ok(())
}

/// Map CLI args to `ConversionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ConversionConfig> {
    let mut builder = ConversionConfig::builder()
        .workers(cli.threads)
        .first_page(cli.minpage)
        .failure_policy(cli.on_error.into())
        .tools(Toolchain {
            pdfinfo: cli.pdfinfo.clone(),
            pdftoppm: cli.pdftoppm.clone(),
            tesseract: cli.tesseract.clone(),
            pdftotext: cli.pdftotext.clone(),
        });

    if let Some(last) = cli.maxpage {
        builder = builder.last_page(last);
    }
    if let Some(ref dir) = cli.cache_dir {
        builder = builder.workspace_dir(dir);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn print_info(path: &Path, info: &DocumentInfo) {
    println!("{:<16}{}", "File:", path.display());
    for (key, value) in &info.fields {
        println!("{:<16}{}", format!("{key}:"), value);
    }
    if info.get(PAGES_KEY).is_none() {
        println!("{:<16}{} {}", "Pages:", info.page_count(), dim("(assumed)"));
    }
}
