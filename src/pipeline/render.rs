//! PDF rasterisation: render every page to `{base_dir}/{stem}/page_{n}.png`.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which uses
//! thread-local state internally and is not safe to call from async contexts.
//! Rendering and PNG encoding are also CPU-heavy. `spawn_blocking` moves the
//! work onto the blocking pool so sibling document pipelines keep running.
//!
//! ## Why no graceful degradation?
//!
//! Without page images a PDF analysis has no visual grounding, so any open or
//! render failure is fatal for the document and surfaces as
//! [`AnalysisError::Rasterization`].
//!
//! ## Same-stem documents
//!
//! Two PDFs named alike share one output folder. Renders into the same
//! folder take turns, and each caller gets back the pages it rendered
//! itself rather than whatever the folder holds once it is done.

use crate::error::AnalysisError;
use crate::pipeline::encode::png_bytes;
use pdfium_render::prelude::*;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// One rendered page.
#[derive(Clone, PartialEq, Eq)]
pub struct PageImage {
    /// 1-based page number.
    pub page_num: usize,
    pub png: Vec<u8>,
}

impl std::fmt::Debug for PageImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageImage")
            .field("page_num", &self.page_num)
            .field("png", &format_args!("<{} bytes>", self.png.len()))
            .finish()
    }
}

/// Result of rasterising one PDF.
#[derive(Debug, Clone)]
pub struct RenderedPdf {
    /// PDF stem, also the output folder name under the base directory.
    pub stem: String,
    /// Every page in ascending page order.
    pub pages: Vec<PageImage>,
}

type DirLocks = Arc<Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>>;

/// Renders PDFs page by page into a per-document folder.
#[derive(Debug, Clone)]
pub struct Rasterizer {
    dpi: u32,
    max_pixels: u32,
    base_dir: PathBuf,
    dir_locks: DirLocks,
}

impl Rasterizer {
    pub fn new(dpi: u32, max_pixels: u32, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            dpi,
            max_pixels,
            base_dir: base_dir.into(),
            dir_locks: DirLocks::default(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Folder the pages of the PDF identified by `stem` are written to.
    pub fn output_dir(&self, stem: &str) -> PathBuf {
        self.base_dir.join(stem)
    }

    /// Render every page of `pdf_path` into `{base_dir}/{stem}` and return
    /// the stem together with the rendered pages.
    pub async fn rasterize(&self, pdf_path: &Path) -> Result<RenderedPdf, AnalysisError> {
        let path = pdf_path.to_path_buf();
        let stem = pdf_stem(pdf_path);
        let out_dir = self.output_dir(&stem);
        let dpi = self.dpi;
        let max_pixels = self.max_pixels;

        let _turn = self.dir_lock(&out_dir).lock_owned().await;
        let pages = tokio::task::spawn_blocking(move || {
            render_pages_blocking(&path, &out_dir, dpi, max_pixels)
        })
        .await
        .map_err(|e| AnalysisError::Internal(format!("Render task panicked: {}", e)))??;

        info!("Rasterised {} ({} pages)", pdf_path.display(), pages.len());
        Ok(RenderedPdf { stem, pages })
    }

    /// Lock serialising renders into `dir`, shared by clones of this rasterizer.
    fn dir_lock(&self, dir: &Path) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .dir_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.entry(dir.to_path_buf()).or_default().clone()
    }
}

/// File stem of a PDF, used as its output folder name.
pub fn pdf_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "document".to_string())
}

fn rasterization_error(path: &Path, detail: impl ToString) -> AnalysisError {
    AnalysisError::Rasterization {
        path: path.to_path_buf(),
        detail: detail.to_string(),
    }
}

/// Bind to pdfium: the pdfium-auto cache (or `PDFIUM_LIB_PATH`) first, then
/// the system library. Never downloads; the binary takes care of that.
fn bind_pdfium(pdf_path: &Path) -> Result<Pdfium, AnalysisError> {
    if let Some(lib) = pdfium_auto::cached_pdfium_path() {
        return pdfium_auto::bind_pdfium_from_path(&lib)
            .map_err(|e| rasterization_error(pdf_path, e));
    }
    Pdfium::bind_to_system_library()
        .map(Pdfium::new)
        .map_err(|e| {
            rasterization_error(pdf_path, format!("pdfium library not available: {:?}", e))
        })
}

/// Blocking implementation of page rendering. Returns the pages in order.
fn render_pages_blocking(
    pdf_path: &Path,
    out_dir: &Path,
    dpi: u32,
    max_pixels: u32,
) -> Result<Vec<PageImage>, AnalysisError> {
    let pdfium = bind_pdfium(pdf_path)?;

    std::fs::create_dir_all(out_dir).map_err(|e| AnalysisError::io(out_dir, e))?;
    remove_stale_pages(out_dir);

    let render_config = PdfRenderConfig::new()
        .scale_page_by_factor(dpi as f32 / 72.0)
        .set_maximum_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    // The document handle is dropped at the end of this block, before the
    // bindings, whatever the outcome.
    let rendered = {
        let document = pdfium
            .load_pdf_from_file(pdf_path, None)
            .map_err(|e| rasterization_error(pdf_path, format!("{:?}", e)))?;

        let pages = document.pages();
        let total = pages.len() as usize;
        debug!("PDF loaded: {} pages", total);

        let mut images = Vec::with_capacity(total);
        for (idx, page) in pages.iter().enumerate() {
            let page_num = idx + 1;
            let bitmap = page.render_with_config(&render_config).map_err(|e| {
                rasterization_error(pdf_path, format!("page {}: {:?}", page_num, e))
            })?;

            let image = bitmap.as_image();
            let png = png_bytes(&image).map_err(|e| {
                rasterization_error(pdf_path, format!("page {}: {}", page_num, e))
            })?;

            let target = out_dir.join(format!("page_{}.png", page_num));
            std::fs::write(&target, &png).map_err(|e| AnalysisError::io(&target, e))?;
            debug!(
                "Rendered page {} → {}x{} px",
                page_num,
                image.width(),
                image.height()
            );
            images.push(PageImage { page_num, png });
        }
        images
    };

    Ok(rendered)
}

/// Drop renders left over from an earlier PDF with the same stem, so the
/// folder only ever holds the pages of the current document.
fn remove_stale_pages(dir: &Path) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if page_number(&path).is_some() {
            if let Err(e) = std::fs::remove_file(&path) {
                warn!("Could not remove stale render {}: {}", path.display(), e);
            }
        }
    }
}

/// Page number encoded in a `page_{n}.png` file name.
fn page_number(path: &Path) -> Option<usize> {
    if path.extension()?.to_str()? != "png" {
        return None;
    }
    path.file_stem()?
        .to_str()?
        .strip_prefix("page_")?
        .parse()
        .ok()
}

/// Read back the rendered pages of `dir`, in ascending numeric page order.
///
/// Only meaningful once no render into `dir` is in flight.
pub async fn page_images(dir: &Path) -> Result<Vec<PageImage>, AnalysisError> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| AnalysisError::io(dir, e))?;

    let mut numbered = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| AnalysisError::io(dir, e))?
    {
        let path = entry.path();
        if let Some(n) = page_number(&path) {
            numbered.push((n, path));
        }
    }
    numbered.sort_by_key(|(n, _)| *n);

    let mut pages = Vec::with_capacity(numbered.len());
    for (page_num, path) in numbered {
        let png = tokio::fs::read(&path)
            .await
            .map_err(|e| AnalysisError::io(&path, e))?;
        pages.push(PageImage { page_num, png });
    }
    Ok(pages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    macro_rules! skip_without_pdfium {
        () => {
            if std::env::var("MEDDOC_PDFIUM_TESTS").as_deref() != Ok("1") {
                eprintln!("SKIP: set MEDDOC_PDFIUM_TESTS=1 to run pdfium rendering tests");
                return;
            }
        };
    }

    #[test]
    fn page_number_parsing() {
        assert_eq!(page_number(Path::new("x/page_1.png")), Some(1));
        assert_eq!(page_number(Path::new("x/page_12.png")), Some(12));
        assert_eq!(page_number(Path::new("x/page_a.png")), None);
        assert_eq!(page_number(Path::new("x/page_3.jpg")), None);
        assert_eq!(page_number(Path::new("x/cover.png")), None);
    }

    #[test]
    fn stem_is_output_folder_name() {
        assert_eq!(pdf_stem(Path::new("/tmp/rx scan.pdf")), "rx scan");
        let r = Rasterizer::new(300, 6000, "uploads/images");
        assert_eq!(r.output_dir("rx"), PathBuf::from("uploads/images/rx"));
    }

    #[tokio::test]
    async fn page_images_sort_numerically() {
        let dir = TempDir::new().unwrap();
        for n in [10, 2, 1, 11, 3] {
            std::fs::write(dir.path().join(format!("page_{n}.png")), vec![n as u8]).unwrap();
        }
        std::fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

        let pages = page_images(dir.path()).await.unwrap();
        let order: Vec<usize> = pages.iter().map(|p| p.page_num).collect();
        assert_eq!(order, vec![1, 2, 3, 10, 11]);
        assert_eq!(pages[3].png, vec![10u8]);
    }

    #[tokio::test]
    async fn garbage_pdf_is_a_rasterization_error() {
        let dir = TempDir::new().unwrap();
        let pdf = dir.path().join("broken.pdf");
        std::fs::write(&pdf, vec![b'x'; 4096]).unwrap();

        let r = Rasterizer::new(150, 2000, dir.path().join("images"));
        let err = r.rasterize(&pdf).await.unwrap_err();
        assert!(
            matches!(err, AnalysisError::Rasterization { ref path, .. } if path == &pdf),
            "got {err:?}"
        );
    }

    fn write_blank_pdf(path: &Path, pages: usize) {
        let pdfium = bind_pdfium(path).expect("pdfium available");
        let mut doc = pdfium.create_new_pdf().unwrap();
        for _ in 0..pages {
            doc.pages_mut()
                .create_page_at_end(PdfPagePaperSize::a4())
                .unwrap();
        }
        doc.save_to_file(path).unwrap();
    }

    #[test]
    fn same_folder_shares_one_lock() {
        let r = Rasterizer::new(72, 1000, "images");
        let clone = r.clone();
        let a = r.dir_lock(&r.output_dir("scan"));
        let b = clone.dir_lock(&clone.output_dir("scan"));
        let c = r.dir_lock(&r.output_dir("other"));
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[tokio::test]
    async fn renders_one_png_per_page() {
        skip_without_pdfium!();

        let dir = TempDir::new().unwrap();
        let pdf = dir.path().join("three_pages.pdf");
        write_blank_pdf(&pdf, 3);

        let base = dir.path().join("images");
        let r = Rasterizer::new(72, 1000, &base);
        let rendered = r.rasterize(&pdf).await.unwrap();
        assert_eq!(rendered.stem, "three_pages");
        assert_eq!(
            rendered.pages.iter().map(|p| p.page_num).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert!(rendered.pages.iter().all(|p| p.png.starts_with(b"\x89PNG")));

        let on_disk = page_images(&base.join(&rendered.stem)).await.unwrap();
        assert_eq!(on_disk, rendered.pages);
    }

    #[tokio::test]
    async fn same_stem_pdfs_keep_their_own_pages() {
        skip_without_pdfium!();

        let dir = TempDir::new().unwrap();
        for (sub, pages) in [("a", 3), ("b", 1)] {
            std::fs::create_dir_all(dir.path().join(sub)).unwrap();
            write_blank_pdf(&dir.path().join(sub).join("scan.pdf"), pages);
        }

        let r = Rasterizer::new(72, 1000, dir.path().join("images"));
        let a_path = dir.path().join("a/scan.pdf");
        let b_path = dir.path().join("b/scan.pdf");
        let (a, b) = tokio::join!(r.rasterize(&a_path), r.rasterize(&b_path));
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(a.stem, b.stem);
        assert_eq!(a.pages.len(), 3);
        assert_eq!(b.pages.len(), 1);

        // The folder holds exactly one complete render, never a mix.
        let on_disk = page_images(&r.output_dir("scan")).await.unwrap();
        assert!(on_disk == a.pages || on_disk == b.pages, "mixed pages: {on_disk:?}");
    }
}
