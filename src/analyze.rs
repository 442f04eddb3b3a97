//! Analysis entry points: one document, a batch of uploads, a list of paths.
//!
//! ## Isolation
//!
//! Every error raised while processing a document stays inside that
//! document's [`FileReport`]: a missing credential, an unreadable PDF or a
//! provider rejection all become [`AnalysisResult::Failed`]. The only error a
//! batch call returns is [`AnalysisError::UploadRejected`], raised by the
//! request-level count checks before any document is touched.
//!
//! ## Concurrency
//!
//! Up to `document_concurrency` documents run at once. Results are collected
//! with `buffered`, which yields them in input order regardless of which
//! document finishes first. OCR calls are additionally bounded by the
//! extractor's semaphore, shared across all documents handled by one
//! [`Analyzer`].

use crate::config::{AnalysisConfig, UploadLimits};
use crate::error::AnalysisError;
use crate::output::{AnalysisResult, FileReport, UploadedDocument};
use crate::pipeline::assemble::assemble;
use crate::pipeline::encode::{encode_bytes, encode_file, ImageAttachment};
use crate::pipeline::llm::{ProviderVisionModel, VisionModel};
use crate::pipeline::ocr::{LlamaParseClient, OcrClient, TextExtractor};
use crate::pipeline::parse::parse_analysis;
use crate::pipeline::render::Rasterizer;
use crate::pipeline::validate::{extension_of, DocumentKind};
use crate::progress::{NoopProgressCallback, ProgressCallback};
use crate::prompts::AUDIT_PROMPT;
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

const MIB: f64 = 1024.0 * 1024.0;

/// The document analysis pipeline.
///
/// Construct once and reuse: the OCR client, its concurrency limiter and the
/// model provider are created here and shared by every call.
///
/// # Example
///
/// ```rust,no_run
/// use meddoc_audit::{Analyzer, AnalysisConfig};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = AnalysisConfig::builder()
///         .ocr_api_key(std::env::var("LLAMA_API_KEY").unwrap_or_default())
///         .build()?;
///     let analyzer = Analyzer::new(config);
///     let report = analyzer.analyze_file("prescription.jpg").await;
///     println!("{}: {}", report.file, report.analysis.status_label());
///     Ok(())
/// }
/// ```
pub struct Analyzer {
    config: AnalysisConfig,
    extractor: TextExtractor,
    rasterizer: Rasterizer,
    model: Arc<dyn VisionModel>,
    progress: ProgressCallback,
}

impl Analyzer {
    /// Build the production pipeline: LlamaParse OCR and the configured
    /// `edgequake-llm` provider.
    pub fn new(config: AnalysisConfig) -> Self {
        let ocr = Arc::new(LlamaParseClient::new(config.ocr.clone()));
        let model = Arc::new(ProviderVisionModel::from_config(&config));
        Self::with_components(config, ocr, model)
    }

    /// Build the pipeline around caller-supplied OCR and model clients.
    pub fn with_components(
        config: AnalysisConfig,
        ocr: Arc<dyn OcrClient>,
        model: Arc<dyn VisionModel>,
    ) -> Self {
        let extractor = TextExtractor::new(ocr, config.ocr_concurrency);
        let rasterizer = Rasterizer::new(
            config.dpi,
            config.max_rendered_pixels,
            config.image_dir.clone(),
        );
        Self {
            config,
            extractor,
            rasterizer,
            model,
            progress: Arc::new(NoopProgressCallback),
        }
    }

    /// Receive per-document events during batch calls.
    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = progress;
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    // ── Single document ──────────────────────────────────────────────────

    /// Run the full pipeline on a local file.
    ///
    /// Unparseable model output is not an error here: it yields the fixed
    /// "could not be verified" result. Every other failure is returned.
    pub async fn analyze_path(&self, path: &Path) -> Result<AnalysisResult, AnalysisError> {
        let start = Instant::now();
        self.model.ensure_ready()?;

        let kind = DocumentKind::from_path(path);
        if kind == DocumentKind::Unsupported {
            return Err(AnalysisError::UploadRejected(format!(
                "Unsupported file type '{}'",
                extension_of(path)
            )));
        }

        // OCR and page rendering are independent; run them side by side.
        let (ocr_text, attachments) =
            tokio::join!(self.extractor.extract(path), self.attachments(path, kind));
        let attachments = attachments?;
        debug!(
            "{}: {} OCR chars, {} attachment(s)",
            path.display(),
            ocr_text.len(),
            attachments.len()
        );

        let prompt = self.config.prompt.as_deref().unwrap_or(AUDIT_PROMPT);
        let request = assemble(prompt, &ocr_text, attachments);
        let answer = self.model.complete(&request).await?;

        let result = match parse_analysis(&answer) {
            Ok(result) => result,
            Err(e) => {
                warn!("{}: {}", path.display(), e);
                AnalysisResult::unverifiable()
            }
        };
        info!(
            "{}: {} in {:?}",
            path.display(),
            result.status_label(),
            start.elapsed()
        );
        Ok(result)
    }

    /// Run the pipeline on a local file; failures become a `Failed` verdict.
    pub async fn analyze_file(&self, path: impl AsRef<Path>) -> FileReport {
        let path = path.as_ref();
        let analysis = self.analyze_path(path).await.unwrap_or_else(|e| {
            warn!("{}: {}", path.display(), e);
            AnalysisResult::system_error(&e)
        });
        FileReport {
            file: display_name(path),
            analysis,
        }
    }

    /// Run the pipeline on an uploaded document.
    ///
    /// The per-document type and size limits are checked first, then the bytes
    /// are staged in a temporary directory removed once the analysis is done.
    pub async fn analyze_upload(&self, doc: &UploadedDocument) -> AnalysisResult {
        match self.analyze_staged(doc).await {
            Ok(result) => result,
            Err(e) => {
                warn!("{}: {}", doc.filename, e);
                AnalysisResult::system_error(&e)
            }
        }
    }

    async fn analyze_staged(&self, doc: &UploadedDocument) -> Result<AnalysisResult, AnalysisError> {
        check_document_limits(doc, &self.config.limits)?;

        let staging = tempfile::TempDir::new()
            .map_err(|e| AnalysisError::Internal(format!("tempdir: {e}")))?;
        let staged = staging.path().join(sanitize_filename(&doc.filename));
        tokio::fs::write(&staged, &doc.content)
            .await
            .map_err(|e| AnalysisError::io(&staged, e))?;

        // `staging` is dropped (and the directory deleted) on return
        self.analyze_path(&staged).await
    }

    async fn attachments(
        &self,
        path: &Path,
        kind: DocumentKind,
    ) -> Result<Vec<ImageAttachment>, AnalysisError> {
        match kind {
            DocumentKind::Pdf => {
                let pages = self.rasterizer.rasterize(path).await?.pages;
                if pages.is_empty() {
                    return Err(AnalysisError::Rasterization {
                        path: path.to_path_buf(),
                        detail: "document has no pages".into(),
                    });
                }
                Ok(pages
                    .iter()
                    .map(|page| encode_bytes(&page.png, "image/png"))
                    .collect())
            }
            _ => {
                let mime = DocumentKind::attachment_mime(path);
                Ok(vec![encode_file(path, mime).await?])
            }
        }
    }

    // ── Batches ──────────────────────────────────────────────────────────

    /// Analyse a batch of uploads, returning one report per document in
    /// input order.
    ///
    /// # Errors
    /// Only [`AnalysisError::UploadRejected`], when the request as a whole
    /// breaks the count limits. Nothing is processed in that case.
    pub async fn analyze_batch(
        &self,
        docs: Vec<UploadedDocument>,
    ) -> Result<Vec<FileReport>, AnalysisError> {
        check_request_limits(&docs, &self.config.limits)?;

        let total = docs.len();
        info!("Analysing batch of {} document(s)", total);
        self.progress.on_batch_start(total);

        let reports: Vec<FileReport> = stream::iter(docs.into_iter().enumerate())
            .map(|(index, doc)| self.run_upload(index, doc))
            .buffered(self.config.document_concurrency)
            .collect()
            .await;

        self.finish_batch(&reports);
        Ok(reports)
    }

    /// Analyse local files, returning one report per path in input order.
    ///
    /// Upload limits are not applied; read the files into
    /// [`UploadedDocument`]s and use [`Analyzer::analyze_batch`] for that.
    pub async fn analyze_paths(&self, paths: &[PathBuf]) -> Vec<FileReport> {
        let total = paths.len();
        info!("Analysing {} file(s)", total);
        self.progress.on_batch_start(total);

        let reports: Vec<FileReport> = stream::iter(paths.iter().enumerate())
            .map(|(index, path)| self.run_path(index, path))
            .buffered(self.config.document_concurrency)
            .collect()
            .await;

        self.finish_batch(&reports);
        reports
    }

    async fn run_upload(&self, index: usize, doc: UploadedDocument) -> FileReport {
        self.progress.on_document_start(index, &doc.filename);
        let analysis = self.analyze_upload(&doc).await;
        self.progress
            .on_document_complete(index, &doc.filename, &analysis);
        FileReport {
            file: doc.filename,
            analysis,
        }
    }

    async fn run_path(&self, index: usize, path: &Path) -> FileReport {
        let name = display_name(path);
        self.progress.on_document_start(index, &name);
        let report = self.analyze_file(path).await;
        self.progress
            .on_document_complete(index, &name, &report.analysis);
        report
    }

    fn finish_batch(&self, reports: &[FileReport]) {
        let valid = reports.iter().filter(|r| r.analysis.is_valid()).count();
        info!("Batch done: {}/{} valid", valid, reports.len());
        self.progress.on_batch_complete(reports.len(), valid);
    }
}

// ── Upload policy ────────────────────────────────────────────────────────

/// Request-level count limits. Unsupported files count towards the total
/// only; they are rejected individually by [`check_document_limits`].
pub fn check_request_limits(
    docs: &[UploadedDocument],
    limits: &UploadLimits,
) -> Result<(), AnalysisError> {
    if docs.is_empty() {
        return Err(AnalysisError::UploadRejected("No files uploaded".into()));
    }
    if docs.len() > limits.max_files {
        return Err(AnalysisError::UploadRejected(format!(
            "Too many files: {} (max {})",
            docs.len(),
            limits.max_files
        )));
    }

    let pdfs = docs.iter().filter(|d| d.kind() == DocumentKind::Pdf).count();
    if pdfs > limits.max_pdfs {
        return Err(AnalysisError::UploadRejected(format!(
            "Too many PDFs: {} (max {})",
            pdfs, limits.max_pdfs
        )));
    }

    let images = docs
        .iter()
        .filter(|d| d.kind() == DocumentKind::Image)
        .count();
    if images > limits.max_images {
        return Err(AnalysisError::UploadRejected(format!(
            "Too many images: {} (max {})",
            images, limits.max_images
        )));
    }
    Ok(())
}

/// Per-document type and size limits.
pub fn check_document_limits(
    doc: &UploadedDocument,
    limits: &UploadLimits,
) -> Result<(), AnalysisError> {
    let (max_bytes, what) = match doc.kind() {
        DocumentKind::Pdf => (limits.max_pdf_bytes, "PDF"),
        DocumentKind::Image => (limits.max_image_bytes, "image"),
        DocumentKind::Unsupported => {
            return Err(AnalysisError::UploadRejected(format!(
                "Unsupported file type '{}'",
                extension_of(Path::new(&doc.filename))
            )))
        }
    };
    if doc.size() > max_bytes {
        return Err(AnalysisError::UploadRejected(format!(
            "{} is {:.1} MB, above the {:.0} MB {} limit",
            doc.filename,
            doc.size() as f64 / MIB,
            max_bytes as f64 / MIB,
            what
        )));
    }
    Ok(())
}

/// File name safe to create inside the staging directory: directory parts
/// are dropped and anything outside `[A-Za-z0-9._ -]` becomes `_`.
pub fn sanitize_filename(name: &str) -> String {
    let base = Path::new(name)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | ' ') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.trim_matches(|c| c == '.' || c == ' ').is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(name: &str, size: usize) -> UploadedDocument {
        UploadedDocument::new(name, vec![0u8; size])
    }

    #[test]
    fn request_limits() {
        let limits = UploadLimits::default();
        assert!(check_request_limits(&[], &limits).is_err());

        let four_pdfs: Vec<_> = (0..4).map(|i| doc(&format!("{i}.pdf"), 10)).collect();
        let err = check_request_limits(&four_pdfs, &limits).unwrap_err();
        assert!(err.to_string().contains("Too many PDFs: 4 (max 3)"), "got: {err}");

        let six: Vec<_> = (0..6).map(|i| doc(&format!("{i}.png"), 10)).collect();
        let err = check_request_limits(&six, &limits).unwrap_err();
        assert!(err.to_string().contains("Too many files"), "got: {err}");

        let mixed = vec![doc("a.pdf", 10), doc("b.jpg", 10), doc("c.txt", 10)];
        assert!(check_request_limits(&mixed, &limits).is_ok());
    }

    #[test]
    fn image_limit_counts_only_images() {
        let limits = UploadLimits {
            max_images: 2,
            ..UploadLimits::default()
        };
        let docs = vec![doc("a.png", 1), doc("b.jpeg", 1), doc("c.pdf", 1)];
        assert!(check_request_limits(&docs, &limits).is_ok());

        let docs = vec![doc("a.png", 1), doc("b.jpeg", 1), doc("c.jpg", 1)];
        assert!(check_request_limits(&docs, &limits).is_err());
    }

    #[test]
    fn document_size_limits_depend_on_kind() {
        let limits = UploadLimits::default();
        let six_mib = 6 * 1024 * 1024;
        assert!(check_document_limits(&doc("scan.png", six_mib), &limits).is_err());
        assert!(check_document_limits(&doc("scan.pdf", six_mib), &limits).is_ok());

        let err = check_document_limits(&doc("notes.docx", 10), &limits).unwrap_err();
        assert!(err.to_string().contains(".docx"), "got: {err}");
    }

    #[test]
    fn sanitize_strips_directories_and_odd_characters() {
        assert_eq!(sanitize_filename("../../etc/passwd.png"), "passwd.png");
        assert_eq!(sanitize_filename("rx (1)/scan #2.pdf"), "scan _2.pdf");
        assert_eq!(sanitize_filename("ordonnance-été.jpg"), "ordonnance-_t_.jpg");
        assert_eq!(sanitize_filename(".."), "upload");
        assert_eq!(sanitize_filename(""), "upload");
    }
}
