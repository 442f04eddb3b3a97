//! Prompt assembly: instructions + OCR text + ordered image attachments.

use crate::pipeline::encode::ImageAttachment;
use crate::prompts;

/// A single multimodal user message for the vision model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRequest {
    /// Instruction text, followed by the OCR section when there is one.
    pub text: String,
    /// Attachments in presentation order (ascending page order for PDFs).
    pub images: Vec<ImageAttachment>,
}

/// Build the model request.
///
/// The OCR section is left out entirely when `ocr_text` is blank, so an empty
/// extraction never adds a dangling heading. Attachment order is kept as given.
pub fn assemble(prompt: &str, ocr_text: &str, images: Vec<ImageAttachment>) -> ModelRequest {
    let mut text = prompt.to_string();
    if let Some(section) = prompts::ocr_section(ocr_text) {
        text.push_str(&section);
    }
    ModelRequest { text, images }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::encode::encode_bytes;

    #[test]
    fn appends_ocr_text_after_prompt() {
        let req = assemble("AUDIT", "Patient: Jane Roe", vec![]);
        assert_eq!(req.text, "AUDIT\n\nEXTRACTED DOCUMENT TEXT:\nPatient: Jane Roe");
    }

    #[test]
    fn empty_ocr_leaves_prompt_untouched() {
        let img = encode_bytes(b"jpeg-bytes", "image/jpeg");
        let req = assemble("AUDIT", "", vec![img.clone()]);
        assert_eq!(req.text, "AUDIT");
        assert_eq!(req.images, vec![img]);
    }

    #[test]
    fn page_order_is_preserved() {
        let pages: Vec<_> = (1..=12)
            .map(|n| encode_bytes(format!("page {n}").as_bytes(), "image/png"))
            .collect();
        let req = assemble("AUDIT", "text", pages.clone());
        assert_eq!(req.images, pages);
    }
}
