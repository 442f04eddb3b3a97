//! Progress-callback trait for per-document analysis events.
//!
//! Attach an [`Arc<dyn AnalysisProgressCallback>`] with
//! [`crate::Analyzer::with_progress`] to receive events as a batch is
//! processed. The callback approach keeps the library unaware of how the host
//! reports progress: a terminal bar, a log line, a WebSocket message.
//!
//! # Example
//!
//! ```rust
//! use meddoc_audit::{AnalysisProgressCallback, AnalysisResult};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct ValidCounter(AtomicUsize);
//!
//! impl AnalysisProgressCallback for ValidCounter {
//!     fn on_document_complete(&self, _index: usize, file: &str, result: &AnalysisResult) {
//!         if result.is_valid() {
//!             self.0.fetch_add(1, Ordering::SeqCst);
//!         }
//!         eprintln!("{file}: {}", result.status_label());
//!     }
//! }
//! ```

use crate::output::AnalysisResult;
use std::sync::Arc;

/// Called by the batch handler as it processes each document.
///
/// Documents run concurrently, so `on_document_start` and
/// `on_document_complete` may be called from different tasks at once and in
/// any order. `index` is the 0-based position of the document in the batch.
/// All methods default to no-ops.
pub trait AnalysisProgressCallback: Send + Sync {
    /// Called once, after the request-level limits passed.
    fn on_batch_start(&self, total_documents: usize) {
        let _ = total_documents;
    }

    fn on_document_start(&self, index: usize, file: &str) {
        let _ = (index, file);
    }

    /// Called with the final verdict of a document, failures included.
    fn on_document_complete(&self, index: usize, file: &str, result: &AnalysisResult) {
        let _ = (index, file, result);
    }

    /// Called once after every document has a result.
    fn on_batch_complete(&self, total_documents: usize, valid_count: usize) {
        let _ = (total_documents, valid_count);
    }
}

/// Default callback when none is configured.
pub struct NoopProgressCallback;

impl AnalysisProgressCallback for NoopProgressCallback {}

/// Shared callback handle as stored by [`crate::Analyzer`].
pub type ProgressCallback = Arc<dyn AnalysisProgressCallback>;
