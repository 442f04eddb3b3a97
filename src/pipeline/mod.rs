//! Pipeline stages for medical document analysis.
//!
//! Each submodule implements exactly one step, so every stage can be tested
//! alone and the two external collaborators (OCR, vision model) can be
//! replaced by stubs.
//!
//! ## Data Flow
//!
//! ```text
//! validate ──▶ ocr ─────────────┐
//!                                ├──▶ assemble ──▶ llm ──▶ parse
//! render ──▶ encode (PDF pages) ─┘
//!            encode (images)
//! ```
//!
//! 1. [`validate`]   extension, size and readability checks before OCR
//! 2. [`ocr`]        hosted OCR behind a process-wide semaphore; best effort
//! 3. [`render`]     PDF pages to `page_{n}.png`; runs in `spawn_blocking`
//!    because pdfium is not async-safe
//! 4. [`encode`]     base64 attachments for the multimodal request
//! 5. [`assemble`]   audit prompt + OCR text + ordered images
//! 6. [`llm`]        the vision model call; the only stage whose errors
//!    carry a provider status
//! 7. [`parse`]      JSON span extraction and verdict decoding

pub mod assemble;
pub mod encode;
pub mod llm;
pub mod ocr;
pub mod parse;
pub mod render;
pub mod validate;
