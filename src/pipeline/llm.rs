//! Vision model invocation.
//!
//! The model is an external collaborator behind the [`VisionModel`] trait so
//! the orchestration can be exercised with stubs. [`ProviderVisionModel`] is
//! the production implementation on top of `edgequake-llm`: one provider is
//! created up front and reused by every document.
//!
//! ## No retry
//!
//! A provider error is mapped once to [`AnalysisError::ModelInvocation`] and
//! returned. There is no backoff loop and no timeout; the caller turns the
//! error into a failed result for that document.

use crate::config::AnalysisConfig;
use crate::error::AnalysisError;
use crate::pipeline::assemble::ModelRequest;
use crate::pipeline::encode::ImageAttachment;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// A hosted vision-language model.
#[async_trait]
pub trait VisionModel: Send + Sync {
    /// Fail fast when the model cannot be called at all (missing credential).
    ///
    /// Checked before any OCR or rendering work is started for a document.
    fn ensure_ready(&self) -> Result<(), AnalysisError> {
        Ok(())
    }

    /// Send the request and return the model's raw text answer.
    async fn complete(&self, request: &ModelRequest) -> Result<String, AnalysisError>;
}

/// Environment variable holding the credential of a named provider, if any.
pub fn credential_env_var(provider_name: &str) -> Option<&'static str> {
    match provider_name.to_ascii_lowercase().as_str() {
        "openrouter" => Some("OPENROUTER_API_KEY"),
        "openai" => Some("OPENAI_API_KEY"),
        "anthropic" => Some("ANTHROPIC_API_KEY"),
        "gemini" => Some("GEMINI_API_KEY"),
        _ => None,
    }
}

/// [`VisionModel`] backed by an `edgequake-llm` provider.
pub struct ProviderVisionModel {
    provider: Result<Arc<dyn LLMProvider>, String>,
    provider_name: String,
    model: String,
    temperature: f32,
    max_tokens: usize,
}

impl ProviderVisionModel {
    /// Create the provider named in the configuration.
    ///
    /// Never fails: a missing credential or unknown provider is remembered and
    /// reported by [`VisionModel::ensure_ready`] for each document, so the
    /// batch still produces one result per file.
    pub fn from_config(config: &AnalysisConfig) -> Self {
        let provider = create_provider(&config.provider_name, &config.model);
        if let Err(ref e) = provider {
            warn!("Vision model not available: {}", e);
        }
        Self {
            provider,
            provider_name: config.provider_name.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    /// Wrap a caller-built provider (custom middleware, tests).
    pub fn with_provider(provider: Arc<dyn LLMProvider>, config: &AnalysisConfig) -> Self {
        Self {
            provider: Ok(provider),
            provider_name: config.provider_name.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    fn provider(&self) -> Result<&Arc<dyn LLMProvider>, AnalysisError> {
        self.provider
            .as_ref()
            .map_err(|e| AnalysisError::Configuration(e.clone()))
    }

    fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        }
    }
}

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, String> {
    if let Some(var) = credential_env_var(provider_name) {
        let present = std::env::var(var)
            .map(|v| !v.trim().is_empty())
            .unwrap_or(false);
        if !present {
            return Err(format!(
                "{} is not set (required by provider '{}')",
                var, provider_name
            ));
        }
    }
    ProviderFactory::create_llm_provider(provider_name, model)
        .map_err(|e| format!("provider '{}' could not be created: {}", provider_name, e))
}

#[async_trait]
impl VisionModel for ProviderVisionModel {
    fn ensure_ready(&self) -> Result<(), AnalysisError> {
        self.provider().map(|_| ())
    }

    async fn complete(&self, request: &ModelRequest) -> Result<String, AnalysisError> {
        let provider = self.provider()?;
        let images: Vec<ImageData> = request.images.iter().map(image_data).collect();

        let messages = vec![ChatMessage::user_with_images(&request.text, images)];
        let options = self.options();

        info!(
            "Calling {}/{} with {} image(s)",
            self.provider_name,
            self.model,
            request.images.len()
        );
        let start = Instant::now();

        match provider.chat(&messages, Some(&options)).await {
            Ok(response) => {
                debug!(
                    "Model answered: {} input tokens, {} output tokens, {:?}",
                    response.prompt_tokens,
                    response.completion_tokens,
                    start.elapsed()
                );
                Ok(response.content)
            }
            Err(e) => {
                let message = e.to_string();
                let status = provider_status(&message);
                warn!("Model call failed ({:?}): {}", status, message);
                Err(AnalysisError::ModelInvocation { status, message })
            }
        }
    }
}

/// Provider attachment for one image. High detail keeps fine print such as
/// dosages and signatures legible to the model.
fn image_data(image: &ImageAttachment) -> ImageData {
    ImageData::new(image.data.clone(), image.mime_type.clone()).with_detail("high")
}

/// A 4xx/5xx code only counts when it follows a status-like word
/// (`status 429`, `HTTP/1.1 502`, `error: 403`) or precedes a standard
/// reason phrase (`503 Service Unavailable`).
static STATUS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:status(?:\s+code)?|http(?:/[\d.]+)?|error|code)\s*[:=(]?\s*([45]\d\d)\b|\b([45]\d\d)\s+(?:bad request|unauthorized|payment required|forbidden|not found|too many requests|internal server error|bad gateway|service unavailable|gateway timeout)",
    )
    .expect("valid regex")
});

/// Best-effort HTTP status code found in a provider error message.
pub fn provider_status(message: &str) -> Option<u16> {
    STATUS_RE
        .captures(message)
        .and_then(|c| c.get(1).or_else(|| c.get(2)))
        .and_then(|m| m.as_str().parse().ok())
}
