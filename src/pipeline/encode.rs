//! Image encoding: page renders and uploaded images → base64 attachments.
//!
//! Vision model APIs accept images as base64 payloads embedded in the JSON
//! request body. Rendered PDF pages are encoded as PNG because it is
//! lossless: the fine print on a prescription (dosages, signatures) matters
//! far more than payload size. Uploaded images keep their original bytes and
//! MIME type.

use crate::error::AnalysisError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::DynamicImage;
use std::io::Cursor;
use std::path::Path;
use tracing::debug;

/// One image attached to the model request.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageAttachment {
    /// `image/png` or `image/jpeg`.
    pub mime_type: String,
    /// Standard base64 of the raw image bytes.
    pub data: String,
}

impl ImageAttachment {
    /// `data:` URI form, as used by OpenAI-compatible APIs.
    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}

impl std::fmt::Debug for ImageAttachment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageAttachment")
            .field("mime_type", &self.mime_type)
            .field("data", &format_args!("<{} chars>", self.data.len()))
            .finish()
    }
}

/// Base64-wrap raw image bytes.
pub fn encode_bytes(bytes: &[u8], mime_type: &str) -> ImageAttachment {
    let data = STANDARD.encode(bytes);
    debug!("Encoded {} bytes → {} chars base64", bytes.len(), data.len());
    ImageAttachment {
        mime_type: mime_type.to_string(),
        data,
    }
}

/// Read an image from disk and base64-wrap it.
pub async fn encode_file(path: &Path, mime_type: &str) -> Result<ImageAttachment, AnalysisError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| AnalysisError::io(path, e))?;
    Ok(encode_bytes(&bytes, mime_type))
}

/// Encode a rendered page as PNG bytes.
pub fn png_bytes(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn png_encoding_roundtrips_through_base64() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255])));
        let png = png_bytes(&img).expect("encode should succeed");
        assert_eq!(&png[..4], b"\x89PNG");

        let att = encode_bytes(&png, "image/png");
        assert_eq!(att.mime_type, "image/png");
        let decoded = STANDARD.decode(&att.data).expect("valid base64");
        assert_eq!(decoded, png);
    }

    #[test]
    fn data_uri_prefix() {
        let att = encode_bytes(b"abc", "image/jpeg");
        assert_eq!(att.data_uri(), "data:image/jpeg;base64,YWJj");
    }

    #[test]
    fn debug_hides_payload() {
        let att = encode_bytes(&[1u8; 300], "image/png");
        let dbg = format!("{att:?}");
        assert!(!dbg.contains(&att.data));
        assert!(dbg.contains("chars"));
    }

    #[tokio::test]
    async fn encode_missing_file_is_io_error() {
        let err = encode_file(Path::new("/no/such/page.png"), "image/png")
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::Io { .. }));
    }
}
