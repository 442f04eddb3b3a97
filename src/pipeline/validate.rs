//! File validation: cheap, read-only checks run before any expensive work.
//!
//! Checks run in a fixed order and stop at the first failure: existence,
//! extension, size bounds, readability. A rejected file is not an error for
//! the document as a whole; the extractor simply skips OCR for it.

use crate::error::ValidationError;
use std::path::Path;
use tracing::debug;

/// Extensions accepted by the pipeline (lower-case, with the leading dot).
pub const ALLOWED_EXTENSIONS: [&str; 4] = [".png", ".jpg", ".jpeg", ".pdf"];

/// Smallest accepted file: 1 KiB.
pub const MIN_FILE_SIZE: u64 = 1024;

/// Largest accepted file: 100 MiB.
pub const MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// How a document is routed through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    /// Rasterised page by page before being sent to the model.
    Pdf,
    /// Sent to the model as a single attachment.
    Image,
    Unsupported,
}

impl DocumentKind {
    pub fn from_path(path: &Path) -> Self {
        match extension_of(path).as_str() {
            ".pdf" => DocumentKind::Pdf,
            ".png" | ".jpg" | ".jpeg" => DocumentKind::Image,
            _ => DocumentKind::Unsupported,
        }
    }

    /// MIME type used for the model attachment. PDFs are attached as PNG renders.
    pub fn attachment_mime(path: &Path) -> &'static str {
        match extension_of(path).as_str() {
            ".jpg" | ".jpeg" => "image/jpeg",
            _ => "image/png",
        }
    }
}

/// Lower-cased extension including the leading dot, or `""` when absent.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

/// Validate a file before OCR.
pub fn validate_file(path: &Path) -> Result<(), ValidationError> {
    let metadata = match std::fs::metadata(path) {
        Ok(m) if m.is_file() => m,
        _ => return Err(ValidationError::NotFound),
    };

    let ext = extension_of(path);
    if !ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
        return Err(ValidationError::UnsupportedExtension(ext));
    }

    let size = metadata.len();
    if size < MIN_FILE_SIZE {
        return Err(ValidationError::TooSmall { size });
    }
    if size > MAX_FILE_SIZE {
        return Err(ValidationError::TooLarge { size });
    }

    if let Err(e) = std::fs::File::open(path) {
        return Err(ValidationError::Unreadable(e.to_string()));
    }

    debug!("Validated {} ({} bytes)", path.display(), size);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn write_file(dir: &TempDir, name: &str, size: usize) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, vec![0u8; size]).unwrap();
        path
    }

    #[test]
    fn accepts_every_supported_extension_within_bounds() {
        let dir = TempDir::new().unwrap();
        for name in ["a.png", "b.jpg", "c.jpeg", "d.pdf", "E.PDF"] {
            let path = write_file(&dir, name, 4096);
            assert_eq!(validate_file(&path), Ok(()), "{name}");
        }
    }

    #[test]
    fn size_bounds_are_inclusive() {
        let dir = TempDir::new().unwrap();
        let at_min = write_file(&dir, "min.png", MIN_FILE_SIZE as usize);
        assert_eq!(validate_file(&at_min), Ok(()));

        let below = write_file(&dir, "below.png", MIN_FILE_SIZE as usize - 1);
        assert_eq!(
            validate_file(&below),
            Err(ValidationError::TooSmall {
                size: MIN_FILE_SIZE - 1
            })
        );
    }

    #[test]
    fn rejects_oversized_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("huge.pdf");
        let file = std::fs::File::create(&path).unwrap();
        // Sparse file: no need to actually write 100 MiB.
        file.set_len(MAX_FILE_SIZE + 1).unwrap();
        assert_eq!(
            validate_file(&path),
            Err(ValidationError::TooLarge {
                size: MAX_FILE_SIZE + 1
            })
        );
    }

    #[test]
    fn extension_checked_before_size() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "notes.txt", 10);
        assert_eq!(
            validate_file(&path),
            Err(ValidationError::UnsupportedExtension(".txt".into()))
        );
    }

    #[test]
    fn missing_file_is_not_found() {
        assert_eq!(
            validate_file(Path::new("/definitely/not/here.png")),
            Err(ValidationError::NotFound)
        );
    }

    #[test]
    fn directory_is_not_a_file() {
        let dir = TempDir::new().unwrap();
        assert_eq!(validate_file(dir.path()), Err(ValidationError::NotFound));
    }

    #[test]
    fn document_kind_routing() {
        assert_eq!(DocumentKind::from_path(Path::new("x.PDF")), DocumentKind::Pdf);
        assert_eq!(DocumentKind::from_path(Path::new("x.jpeg")), DocumentKind::Image);
        assert_eq!(DocumentKind::from_path(Path::new("x")), DocumentKind::Unsupported);
        assert_eq!(DocumentKind::attachment_mime(Path::new("x.JPG")), "image/jpeg");
        assert_eq!(DocumentKind::attachment_mime(Path::new("x.png")), "image/png");
    }
}
