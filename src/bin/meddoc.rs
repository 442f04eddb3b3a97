//! CLI binary for meddoc-audit.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `AnalysisConfig`, analyses the given files and prints one report per file.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use meddoc_audit::{
    render_report, AnalysisConfig, AnalysisProgressCallback, AnalysisResult, Analyzer,
    FileReport, ProgressCallback, UploadLimits, UploadedDocument,
};
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
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

/// Terminal progress callback: one bar for the batch and one log line per
/// finished document. Documents finish out of order, so start times are
/// tracked per index.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  \
                 [{bar:42.green/238}] {pos:>2}/{len} documents  ⏱ {elapsed_precise}  {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(TICKS),
        );
        bar.set_prefix("Auditing");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn elapsed_secs(&self, index: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut times| times.remove(&index))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl AnalysisProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_documents: usize) {
        self.bar.set_length(total_documents as u64);
        self.bar.reset_eta();
    }

    fn on_document_start(&self, index: usize, file: &str) {
        if let Ok(mut times) = self.start_times.lock() {
            times.insert(index, Instant::now());
        }
        self.bar.set_message(file.to_string());
    }

    fn on_document_complete(&self, index: usize, file: &str, result: &AnalysisResult) {
        let elapsed = self.elapsed_secs(index);
        let mark = if result.is_valid() {
            green("✓ VALID ")
        } else {
            red("✗ FAILED")
        };
        self.bar.println(format!(
            "  {}  {:<40}  {}",
            mark,
            file,
            dim(&format!("{elapsed:.1}s"))
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total_documents: usize, valid_count: usize) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} {}/{} documents passed the compliance audit",
            if valid_count == total_documents {
                green("✔")
            } else {
                cyan("⚠")
            },
            bold(&valid_count.to_string()),
            total_documents
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Audit one prescription photo
  meddoc prescription.jpg

  # Several documents, JSON array output
  meddoc --json discharge.pdf rx1.png rx2.jpg > results.json

  # Apply the upload limits (5 files, 3 PDFs, 5 images, 5 MB/image, 10 MB/PDF)
  meddoc --enforce-limits *.pdf

  # Another provider and model
  meddoc --provider openai --model gpt-4.1-mini report.pdf

CHECKLIST:
  A document is VALID only when all four items are present:
  patient name, date, medication with dosage, physician signature or stamp.

ENVIRONMENT VARIABLES:
  OPENROUTER_API_KEY      Model credential for the default provider (openrouter)
  OPENAI_API_KEY          Model credential for --provider openai
  ANTHROPIC_API_KEY       Model credential for --provider anthropic
  GEMINI_API_KEY          Model credential for --provider gemini
  LLAMA_API_KEY           LlamaParse OCR credential (OCR is skipped without it)
  PDFIUM_LIB_PATH         Path to an existing libpdfium; skips auto-download
  PDFIUM_AUTO_CACHE_DIR   Override the default pdfium cache directory

  A .env file in the working directory is loaded first.
"#;

/// Audit medical documents for compliance with a vision-language model.
#[derive(Parser, Debug)]
#[command(
    name = "meddoc",
    version,
    about = "Audit medical documents (PDF, PNG, JPEG) for compliance with a vision model",
    long_about = "Extract text with a hosted OCR service, send the document images and text \
to a vision-language model, and report whether patient name, date, medication and physician \
signature are present. Valid documents get a patient-friendly summary.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Documents to audit (.pdf, .png, .jpg, .jpeg).
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Vision model ID.
    #[arg(long, env = "MEDDOC_MODEL", default_value = meddoc_audit::config::DEFAULT_MODEL)]
    model: String,

    /// Model provider: openrouter, openai, anthropic, gemini, ollama.
    #[arg(long, env = "MEDDOC_PROVIDER", default_value = meddoc_audit::config::DEFAULT_PROVIDER)]
    provider: String,

    /// LlamaParse API key.
    #[arg(long, env = "LLAMA_API_KEY", hide_env_values = true)]
    ocr_api_key: Option<String>,

    /// LlamaParse base URL.
    #[arg(long, env = "MEDDOC_OCR_BASE_URL", default_value = meddoc_audit::config::DEFAULT_OCR_BASE_URL)]
    ocr_base_url: String,

    /// Maximum concurrent OCR calls.
    #[arg(long, env = "MEDDOC_OCR_CONCURRENCY", default_value_t = 5)]
    ocr_concurrency: usize,

    /// Maximum documents analysed at once.
    #[arg(short, long, env = "MEDDOC_CONCURRENCY", default_value_t = 5)]
    concurrency: usize,

    /// PDF rendering DPI (72–600).
    #[arg(long, env = "MEDDOC_DPI", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// Directory receiving rendered PDF pages.
    #[arg(long, env = "MEDDOC_IMAGE_DIR", default_value = "uploads/images")]
    image_dir: PathBuf,

    /// Path to a text file containing a custom audit prompt.
    #[arg(long, env = "MEDDOC_PROMPT_FILE")]
    prompt_file: Option<PathBuf>,

    /// Max model output tokens.
    #[arg(long, env = "MEDDOC_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// Model temperature (0.0–2.0).
    #[arg(long, env = "MEDDOC_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Apply the upload count and size limits to the given files.
    #[arg(long, env = "MEDDOC_ENFORCE_LIMITS")]
    enforce_limits: bool,

    /// Output a JSON array of {file, analysis} instead of Markdown reports.
    #[arg(long, env = "MEDDOC_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "MEDDOC_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "MEDDOC_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "MEDDOC_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Ignore a missing .env; variables may come from the environment.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
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

    // ── Ensure PDFium engine is available ────────────────────────────────
    // Only PDFs need it. On the first run the library (~30 MB) is downloaded
    // and cached; later runs only check the cached path.
    let has_pdf = cli
        .files
        .iter()
        .any(|p| meddoc_audit::pipeline::validate::extension_of(p) == ".pdf");
    if has_pdf && !pdfium_auto::is_pdfium_cached() {
        ensure_pdfium(cli.quiet)?;
    }

    // ── Build analyzer ───────────────────────────────────────────────────
    let config = build_config(&cli).await?;
    let mut analyzer = Analyzer::new(config);
    if show_progress {
        analyzer = analyzer.with_progress(CliProgressCallback::new() as ProgressCallback);
    }

    // ── Run analysis ─────────────────────────────────────────────────────
    let reports = if cli.enforce_limits {
        let docs = read_uploads(&cli.files).await?;
        analyzer
            .analyze_batch(docs)
            .await
            .context("Upload rejected")?
    } else {
        analyzer.analyze_paths(&cli.files).await
    };

    print_reports(&reports, cli.json)?;

    if !cli.quiet && !show_progress && !cli.json {
        let valid = reports.iter().filter(|r| r.analysis.is_valid()).count();
        eprintln!("{}/{} documents valid", valid, reports.len());
    }

    // Failed documents are results, not errors: exit 0.
    Ok(())
}

fn ensure_pdfium(quiet: bool) -> Result<()> {
    if quiet {
        // Quiet mode: download silently; errors still propagate.
        tokio::task::block_in_place(|| pdfium_auto::ensure_pdfium_library(None))
            .context("Failed to download PDFium engine")?;
        return Ok(());
    }

    let dl_bar = ProgressBar::new(0);
    dl_bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {bytes}/{total_bytes}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS),
    );
    dl_bar.set_prefix("PDF engine");
    dl_bar.set_message("Connecting…");
    dl_bar.enable_steady_tick(Duration::from_millis(80));

    let bar = dl_bar.clone();
    tokio::task::block_in_place(|| {
        pdfium_auto::ensure_pdfium_library(Some(&|downloaded, total| {
            if let Some(t) = total {
                if bar.length().unwrap_or(0) != t {
                    bar.set_length(t);
                }
            }
            bar.set_position(downloaded);
        }))
    })
    .context("Failed to download PDFium engine")?;

    dl_bar.finish_with_message("ready ✓");
    Ok(())
}

/// Map CLI args to `AnalysisConfig`.
async fn build_config(cli: &Cli) -> Result<AnalysisConfig> {
    let mut builder = AnalysisConfig::builder()
        .provider_name(cli.provider.as_str())
        .model(cli.model.as_str())
        .ocr_base_url(cli.ocr_base_url.as_str())
        .ocr_concurrency(cli.ocr_concurrency)
        .document_concurrency(cli.concurrency)
        .dpi(cli.dpi)
        .image_dir(cli.image_dir.clone())
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .limits(UploadLimits::default());

    if let Some(ref key) = cli.ocr_api_key {
        builder = builder.ocr_api_key(key.as_str());
    }

    if let Some(ref path) = cli.prompt_file {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read prompt from {:?}", path))?;
        builder = builder.prompt(prompt);
    }

    builder.build().context("Invalid configuration")
}

/// Read files into memory so the upload limits can be applied to them.
async fn read_uploads(paths: &[PathBuf]) -> Result<Vec<UploadedDocument>> {
    let mut docs = Vec::with_capacity(paths.len());
    for path in paths {
        let content = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        docs.push(UploadedDocument::new(file_name(path), content));
    }
    Ok(docs)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

fn print_reports(reports: &[FileReport], json: bool) -> Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();

    if json {
        let json = serde_json::to_string_pretty(reports).context("Failed to serialise results")?;
        writeln!(handle, "{json}").context("Failed to write to stdout")?;
        return Ok(());
    }

    for (i, report) in reports.iter().enumerate() {
        if i > 0 {
            writeln!(handle, "---\n").context("Failed to write to stdout")?;
        }
        handle
            .write_all(render_report(report).as_bytes())
            .context("Failed to write to stdout")?;
        writeln!(handle).context("Failed to write to stdout")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_defaults() {
        let cli = Cli::try_parse_from(["meddoc", "rx.jpg", "report.pdf"]).unwrap();
        assert_eq!(cli.files.len(), 2);
        assert_eq!(cli.dpi, 300);
        assert_eq!(cli.ocr_concurrency, 5);
        assert!(!cli.enforce_limits);
    }

    #[test]
    fn cli_rejects_out_of_range_dpi() {
        assert!(Cli::try_parse_from(["meddoc", "--dpi", "1200", "rx.jpg"]).is_err());
    }

    #[test]
    fn cli_requires_files() {
        assert!(Cli::try_parse_from(["meddoc"]).is_err());
    }
}
