//! Configuration types for medical document analysis.
//!
//! All analysis behaviour is controlled through [`AnalysisConfig`], built via
//! its [`AnalysisConfigBuilder`]. One struct for every knob makes it easy to
//! share the configuration between the batch handler and the long-lived
//! clients it constructs, and to log it without leaking credentials.

use crate::error::AnalysisError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Default vision model served through OpenRouter.
pub const DEFAULT_MODEL: &str = "nvidia/nemotron-nano-12b-v2-vl:free";

/// Default provider name understood by `edgequake_llm::ProviderFactory`.
pub const DEFAULT_PROVIDER: &str = "openrouter";

/// Default LlamaParse endpoint.
pub const DEFAULT_OCR_BASE_URL: &str = "https://api.cloud.llamaindex.ai";

const MIB: u64 = 1024 * 1024;

/// Configuration for the document analysis pipeline.
///
/// Built via [`AnalysisConfig::builder()`] or using
/// [`AnalysisConfig::default()`].
///
/// # Example
/// ```rust
/// use meddoc_audit::AnalysisConfig;
///
/// let config = AnalysisConfig::builder()
///     .dpi(200)
///     .ocr_concurrency(3)
///     .model("gpt-4.1-mini")
///     .build()
///     .unwrap();
/// assert_eq!(config.ocr_concurrency, 3);
/// ```
#[derive(Clone)]
pub struct AnalysisConfig {
    /// Maximum number of OCR calls in flight across the whole process. Default: 5.
    ///
    /// The bound protects the OCR provider's rate limits; it is shared by
    /// every document of every batch handled by one [`crate::Analyzer`].
    pub ocr_concurrency: usize,

    /// Maximum number of document pipelines running at once in a batch. Default: 5.
    pub document_concurrency: usize,

    /// Rendering DPI used when rasterising PDF pages. Range: 72–600. Default: 300.
    pub dpi: u32,

    /// Safety cap on either edge of a rendered page, in pixels. Default: 6000.
    pub max_rendered_pixels: u32,

    /// Directory receiving `{pdf_stem}/page_{n}.png` renders. Default: `uploads/images`.
    pub image_dir: PathBuf,

    /// Provider name passed to `edgequake_llm::ProviderFactory`. Default: `openrouter`.
    pub provider_name: String,

    /// Vision model identifier. Default: [`DEFAULT_MODEL`].
    pub model: String,

    /// Sampling temperature. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens the model may generate. Default: 4096.
    pub max_tokens: usize,

    /// Custom audit prompt. If None, uses [`crate::prompts::AUDIT_PROMPT`].
    pub prompt: Option<String>,

    /// Upload count and size limits applied by the batch handler.
    pub limits: UploadLimits,

    /// OCR provider settings.
    pub ocr: OcrSettings,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            ocr_concurrency: 5,
            document_concurrency: 5,
            dpi: 300,
            max_rendered_pixels: 6000,
            image_dir: PathBuf::from("uploads/images"),
            provider_name: DEFAULT_PROVIDER.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.1,
            max_tokens: 4096,
            prompt: None,
            limits: UploadLimits::default(),
            ocr: OcrSettings::default(),
        }
    }
}

impl fmt::Debug for AnalysisConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisConfig")
            .field("ocr_concurrency", &self.ocr_concurrency)
            .field("document_concurrency", &self.document_concurrency)
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("image_dir", &self.image_dir)
            .field("provider_name", &self.provider_name)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("prompt", &self.prompt.as_ref().map(|_| "<custom>"))
            .field("limits", &self.limits)
            .field("ocr", &self.ocr)
            .finish()
    }
}

impl AnalysisConfig {
    /// Create a new builder for `AnalysisConfig`.
    pub fn builder() -> AnalysisConfigBuilder {
        AnalysisConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`AnalysisConfig`].
#[derive(Debug)]
pub struct AnalysisConfigBuilder {
    config: AnalysisConfig,
}

impl AnalysisConfigBuilder {
    pub fn ocr_concurrency(mut self, n: usize) -> Self {
        self.config.ocr_concurrency = n.max(1);
        self
    }

    pub fn document_concurrency(mut self, n: usize) -> Self {
        self.config.document_concurrency = n.max(1);
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 600);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn image_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.image_dir = dir.into();
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = name.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.prompt = Some(prompt.into());
        self
    }

    pub fn limits(mut self, limits: UploadLimits) -> Self {
        self.config.limits = limits;
        self
    }

    pub fn ocr_api_key(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.config.ocr.api_key = if key.trim().is_empty() { None } else { Some(key) };
        self
    }

    pub fn ocr_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.ocr.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn ocr_poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.ocr.poll_interval_ms = ms;
        self
    }

    pub fn ocr_max_polls(mut self, n: u32) -> Self {
        self.config.ocr.max_polls = n.max(1);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<AnalysisConfig, AnalysisError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 600 {
            return Err(AnalysisError::Configuration(format!(
                "DPI must be 72–600, got {}",
                c.dpi
            )));
        }
        if c.ocr_concurrency == 0 || c.document_concurrency == 0 {
            return Err(AnalysisError::Configuration(
                "Concurrency limits must be ≥ 1".into(),
            ));
        }
        if c.model.trim().is_empty() {
            return Err(AnalysisError::Configuration(
                "Model identifier must not be empty".into(),
            ));
        }
        if c.provider_name.trim().is_empty() {
            return Err(AnalysisError::Configuration(
                "Provider name must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Sub-configurations ───────────────────────────────────────────────────

/// Count and size limits for one upload request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadLimits {
    /// Maximum number of files per request. Default: 5.
    pub max_files: usize,
    /// Maximum number of PDFs per request. Default: 3.
    pub max_pdfs: usize,
    /// Maximum number of images per request. Default: 5.
    pub max_images: usize,
    /// Maximum size of one image, in bytes. Default: 5 MiB.
    pub max_image_bytes: u64,
    /// Maximum size of one PDF, in bytes. Default: 10 MiB.
    pub max_pdf_bytes: u64,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_files: 5,
            max_pdfs: 3,
            max_images: 5,
            max_image_bytes: 5 * MIB,
            max_pdf_bytes: 10 * MIB,
        }
    }
}

/// Settings for the hosted OCR provider.
#[derive(Clone)]
pub struct OcrSettings {
    /// LlamaParse API key. Extraction is skipped (empty text) when absent.
    pub api_key: Option<String>,
    /// Base URL of the LlamaParse API.
    pub base_url: String,
    /// Delay between job status polls, in milliseconds. Default: 1000.
    pub poll_interval_ms: u64,
    /// Number of status polls before the job is abandoned. Default: 120.
    pub max_polls: u32,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_OCR_BASE_URL.to_string(),
            poll_interval_ms: 1000,
            max_polls: 120,
        }
    }
}

impl fmt::Debug for OcrSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OcrSettings")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("max_polls", &self.max_polls)
            .finish()
    }
}
