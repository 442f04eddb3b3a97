//! Error types for the meddoc-audit library.
//!
//! Two distinct families reflect two distinct failure modes:
//!
//! * [`AnalysisError`] is **document-fatal**: the analysis of one document
//!   cannot produce a model verdict (missing credential, PDF cannot be
//!   rasterised, provider rejected the request, model output unparseable).
//!   The [`crate::analyze::Analyzer`] converts it into a
//!   [`crate::output::AnalysisResult::Failed`] at the document boundary, so a
//!   batch never fails because one of its documents did.
//!
//! * [`ValidationError`] and [`OcrError`] are **non-fatal**: text extraction
//!   was skipped or failed. They are logged and swallowed inside
//!   [`crate::pipeline::ocr::TextExtractor`]; the pipeline carries on with an
//!   empty OCR text because the vision model can still read the images.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort the analysis of a single document.
#[derive(Debug, Error)]
pub enum AnalysisError {
    // ── Configuration ─────────────────────────────────────────────────────
    /// A required credential or setting is missing or invalid. Not retryable.
    #[error("Configuration error: {0}")]
    Configuration(String),

    // ── PDF errors ────────────────────────────────────────────────────────
    /// The PDF could not be opened, or one of its pages could not be rendered.
    #[error("Rasterisation failed for '{path}': {detail}")]
    Rasterization { path: PathBuf, detail: String },

    // ── Model errors ──────────────────────────────────────────────────────
    /// The vision model provider rejected or failed the request.
    ///
    /// `status` carries the provider's HTTP status when one could be
    /// identified (401/403 permission, 429 rate limit, 5xx).
    #[error("Model API error ({}): {message}", status_label(*.status))]
    ModelInvocation { status: Option<u16>, message: String },

    /// The model answered, but no valid JSON object could be found in the answer.
    #[error("Malformed model output: {0}")]
    MalformedOutput(String),

    // ── Batch errors ──────────────────────────────────────────────────────
    /// The upload request as a whole violates the configured limits.
    #[error("Upload rejected: {0}")]
    UploadRejected(String),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Reading an input file or writing a page image failed.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AnalysisError {
    /// Wrap an [`std::io::Error`] with the path it occurred on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// True when the error stems from configuration rather than the document
    /// or the provider.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

fn status_label(status: Option<u16>) -> String {
    match status {
        Some(code) => code.to_string(),
        None => "unknown".to_string(),
    }
}

/// Reasons a file is rejected before any OCR work is attempted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("File not found")]
    NotFound,

    #[error("Unsupported file type: {0}")]
    UnsupportedExtension(String),

    #[error("File too small ({size} bytes)")]
    TooSmall { size: u64 },

    #[error("File too large ({size} bytes)")]
    TooLarge { size: u64 },

    #[error("File not readable: {0}")]
    Unreadable(String),
}

/// Failures of the external OCR service.
#[derive(Debug, Error)]
pub enum OcrError {
    /// No API key configured for the OCR provider.
    #[error("OCR credential missing (set LLAMA_API_KEY)")]
    MissingCredential,

    /// Transport-level failure talking to the provider.
    #[error("OCR request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Provider answered with a non-success HTTP status.
    #[error("OCR provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Provider reported the parsing job as failed.
    #[error("OCR job {job_id} ended with status {status}")]
    JobFailed { job_id: String, status: String },

    /// The job did not finish within the configured number of polls.
    #[error("OCR job {job_id} still pending after {polls} polls")]
    Timeout { job_id: String, polls: u32 },

    /// The input file could not be read.
    #[error("OCR input unreadable: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_invocation_display_with_status() {
        let e = AnalysisError::ModelInvocation {
            status: Some(403),
            message: "permission denied".into(),
        };
        assert_eq!(e.to_string(), "Model API error (403): permission denied");
    }

    #[test]
    fn model_invocation_display_without_status() {
        let e = AnalysisError::ModelInvocation {
            status: None,
            message: "connection reset".into(),
        };
        assert!(e.to_string().contains("(unknown)"), "got: {e}");
    }

    #[test]
    fn configuration_is_distinguishable() {
        let config = AnalysisError::Configuration("OPENROUTER_API_KEY is not set".into());
        let provider = AnalysisError::ModelInvocation {
            status: Some(429),
            message: "rate limited".into(),
        };
        assert!(config.is_configuration());
        assert!(!provider.is_configuration());
    }

    #[test]
    fn validation_display() {
        assert_eq!(
            ValidationError::UnsupportedExtension(".txt".into()).to_string(),
            "Unsupported file type: .txt"
        );
        assert!(ValidationError::TooSmall { size: 12 }
            .to_string()
            .contains("12 bytes"));
    }
}
