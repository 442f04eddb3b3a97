//! # meddoc-audit
//!
//! Compliance audit of medical documents (prescriptions, discharge summaries,
//! lab and hospital reports) with a hosted OCR service and a vision-language
//! model.
//!
//! ## Why images *and* OCR text?
//!
//! OCR alone loses what matters most for an audit: stamps, handwritten
//! signatures, dosages squeezed into table cells. The model therefore always
//! receives the document as images (PDFs are rasterised page by page), with
//! the OCR text appended as a hint when extraction succeeded. An OCR failure
//! never aborts the analysis.
//!
//! ## Pipeline Overview
//!
//! ```text
//! file
//!  │
//!  ├─ 1. Validate  extension, size, readability
//!  ├─ 2. OCR       LlamaParse, bounded concurrency, best effort
//!  ├─ 3. Render    PDF pages → PNG via pdfium (spawn_blocking)
//!  ├─ 4. Assemble  audit prompt + OCR text + page images
//!  ├─ 5. Model     one multimodal chat call, low temperature
//!  └─ 6. Parse     JSON span → VALID / FAILED verdict
//! ```
//!
//! The model runs the four-item compliance checklist (patient name, date,
//! medication with dosage, physician signature). One missing item fails the
//! document.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use meddoc_audit::{AnalysisConfig, Analyzer, UploadedDocument};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Model credential from OPENROUTER_API_KEY, OCR credential passed in.
//!     let config = AnalysisConfig::builder()
//!         .ocr_api_key(std::env::var("LLAMA_API_KEY").unwrap_or_default())
//!         .build()?;
//!     let analyzer = Analyzer::new(config);
//!
//!     let upload = UploadedDocument::new("rx.jpg", std::fs::read("rx.jpg")?);
//!     for report in analyzer.analyze_batch(vec![upload]).await? {
//!         println!("{}", meddoc_audit::render_report(&report));
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `meddoc` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! meddoc-audit = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod analyze;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod report;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use analyze::{check_document_limits, check_request_limits, Analyzer};
pub use config::{AnalysisConfig, AnalysisConfigBuilder, OcrSettings, UploadLimits};
pub use error::{AnalysisError, OcrError, ValidationError};
pub use output::{
    AnalysisResult, CheckStatus, ChecklistItem, ComplianceSummary, FileReport, PatientData,
    UploadedDocument,
};
pub use pipeline::assemble::ModelRequest;
pub use pipeline::llm::VisionModel;
pub use pipeline::ocr::OcrClient;
pub use progress::{AnalysisProgressCallback, NoopProgressCallback, ProgressCallback};
pub use report::render_report;
