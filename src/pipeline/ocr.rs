//! Text extraction through a hosted OCR service.
//!
//! The OCR provider is an external collaborator behind the [`OcrClient`]
//! trait. [`TextExtractor`] owns one long-lived client plus a semaphore that
//! caps the number of provider calls in flight across every document the
//! process is analysing. Extraction is best-effort: validation failures and
//! provider errors are logged and turned into an empty string, because the
//! vision model can still read the document from its images.

use crate::config::OcrSettings;
use crate::error::OcrError;
use crate::pipeline::validate::{self, extension_of};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

/// A hosted OCR backend.
#[async_trait]
pub trait OcrClient: Send + Sync {
    /// Extract the plain text of an image or PDF file.
    async fn extract_text(&self, path: &Path) -> Result<String, OcrError>;
}

// ── Bounded extractor ────────────────────────────────────────────────────

/// Shared OCR entry point with a process-wide concurrency bound.
#[derive(Clone)]
pub struct TextExtractor {
    client: Arc<dyn OcrClient>,
    permits: Arc<Semaphore>,
}

impl TextExtractor {
    /// Wrap `client`, allowing at most `max_in_flight` concurrent calls.
    pub fn new(client: Arc<dyn OcrClient>, max_in_flight: usize) -> Self {
        Self {
            client,
            permits: Arc::new(Semaphore::new(max_in_flight.max(1))),
        }
    }

    /// Extract text from a validated file, or return an empty string.
    ///
    /// Never fails: calls beyond the concurrency cap wait for a free slot,
    /// and every failure is logged and swallowed.
    pub async fn extract(&self, path: &Path) -> String {
        let name = display_name(path);

        if let Err(e) = validate::validate_file(path) {
            warn!("File validation failed for {}: {}", name, e);
            return String::new();
        }

        let _permit = match self.permits.acquire().await {
            Ok(permit) => permit,
            Err(_) => {
                warn!("OCR limiter closed; skipping extraction for {}", name);
                return String::new();
            }
        };

        info!("OCR extraction: {}", name);
        match self.client.extract_text(path).await {
            Ok(text) => {
                let text = text.trim().to_string();
                if text.is_empty() {
                    warn!("No text extracted from {}", name);
                } else {
                    info!("OCR success: {} ({} chars)", name, text.chars().count());
                }
                text
            }
            Err(e) => {
                warn!("OCR failed for {}: {}", name, e);
                String::new()
            }
        }
    }

    /// Number of free slots; mostly useful for diagnostics.
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

// ── LlamaParse client ────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct JobResponse {
    id: String,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TextResult {
    #[serde(default)]
    text: String,
}

/// [`OcrClient`] backed by the LlamaParse REST API.
///
/// Upload → poll job status → fetch the text result.
pub struct LlamaParseClient {
    http: Client,
    settings: OcrSettings,
}

impl LlamaParseClient {
    pub fn new(settings: OcrSettings) -> Self {
        let http = Client::builder()
            .user_agent(concat!("meddoc-audit/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|e| {
                warn!("Falling back to default HTTP client: {}", e);
                Client::new()
            });
        Self { http, settings }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.settings.base_url.trim_end_matches('/'), path)
    }

    fn api_key(&self) -> Result<&str, OcrError> {
        self.settings
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or(OcrError::MissingCredential)
    }

    async fn upload(&self, path: &Path, key: &str) -> Result<String, OcrError> {
        let bytes = tokio::fs::read(path).await?;
        let mime = match extension_of(path).as_str() {
            ".pdf" => "application/pdf",
            ".jpg" | ".jpeg" => "image/jpeg",
            _ => "image/png",
        };
        let part = Part::bytes(bytes)
            .file_name(display_name(path))
            .mime_str(mime)?;
        let form = Form::new().part("file", part);

        let response = self
            .http
            .post(self.endpoint("/api/parsing/upload"))
            .bearer_auth(key)
            .multipart(form)
            .send()
            .await?;
        let job: JobResponse = check_status(response).await?.json().await?;
        debug!("OCR job {} created (status {:?})", job.id, job.status);
        Ok(job.id)
    }

    async fn wait_for_job(&self, job_id: &str, key: &str) -> Result<(), OcrError> {
        let interval = Duration::from_millis(self.settings.poll_interval_ms);
        for poll in 0..self.settings.max_polls {
            if poll > 0 {
                sleep(interval).await;
            }
            let response = self
                .http
                .get(self.endpoint(&format!("/api/parsing/job/{job_id}")))
                .bearer_auth(key)
                .send()
                .await?;
            let job: JobResponse = check_status(response).await?.json().await?;
            let status = job.status.unwrap_or_default().to_uppercase();
            match status.as_str() {
                "SUCCESS" => return Ok(()),
                "ERROR" | "CANCELED" | "CANCELLED" => {
                    return Err(OcrError::JobFailed {
                        job_id: job_id.to_string(),
                        status,
                    })
                }
                _ => debug!("OCR job {} pending (poll {})", job_id, poll + 1),
            }
        }
        Err(OcrError::Timeout {
            job_id: job_id.to_string(),
            polls: self.settings.max_polls,
        })
    }

    async fn fetch_text(&self, job_id: &str, key: &str) -> Result<String, OcrError> {
        let response = self
            .http
            .get(self.endpoint(&format!("/api/parsing/job/{job_id}/result/text")))
            .bearer_auth(key)
            .send()
            .await?;
        let result: TextResult = check_status(response).await?.json().await?;
        Ok(result.text)
    }
}

#[async_trait]
impl OcrClient for LlamaParseClient {
    async fn extract_text(&self, path: &Path) -> Result<String, OcrError> {
        let key = self.api_key()?;
        let job_id = self.upload(path, key).await?;
        self.wait_for_job(&job_id, key).await?;
        self.fetch_text(&job_id, key).await
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, OcrError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(OcrError::Status {
        status: status.as_u16(),
        body,
    })
}
