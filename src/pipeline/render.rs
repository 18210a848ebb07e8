//! PDF rasterisation through pdfium (feature `pdfium`).
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which keeps thread-local
//! state and blocks while it renders. Each call therefore runs on Tokio's
//! blocking pool, so concurrent page tasks never stall the async workers.
//!
//! ## Why cap pixels, not DPI?
//!
//! Page sizes vary wildly: an A0 poster at 150 DPI is a 12,000 × 17,000 px
//! bitmap. `max_rendered_pixels` caps the longest edge regardless of the
//! physical size, and the DPI reported on [`RenderedPage`] is the effective
//! resolution that cap produced.

use crate::error::ScanError;
use crate::output::RenderedPage;
use crate::pipeline::encode;
use crate::source::DocumentSource;
use async_trait::async_trait;
use pdfium_render::prelude::*;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Default cap for the longest rendered edge, in pixels.
pub const DEFAULT_MAX_RENDERED_PIXELS: u32 = 2000;

/// A [`DocumentSource`] backed by a PDF file rendered with pdfium.
pub struct PdfiumSource {
    path: PathBuf,
    source_id: String,
    password: Option<String>,
    max_rendered_pixels: u32,
    // Keeps the temp copy made by `from_bytes` alive as long as the source.
    _temp: Option<tempfile::NamedTempFile>,
}

impl PdfiumSource {
    /// Open a PDF on disk. The path is used as the source identifier.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ScanError> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(ScanError::SourceUnavailable {
                source_id: path.display().to_string(),
                detail: "file not found".into(),
            });
        }
        Ok(Self {
            source_id: path.display().to_string(),
            path,
            password: None,
            max_rendered_pixels: DEFAULT_MAX_RENDERED_PIXELS,
            _temp: None,
        })
    }

    /// Scan PDF bytes held in memory.
    ///
    /// pdfium needs a file path, so the bytes are written to a managed temp
    /// file that is deleted when the source is dropped. `source_id` should
    /// identify the content (e.g. a hash or the original URL).
    pub fn from_bytes(bytes: &[u8], source_id: impl Into<String>) -> Result<Self, ScanError> {
        let source_id = source_id.into();
        let unavailable = |e: std::io::Error| ScanError::SourceUnavailable {
            source_id: source_id.clone(),
            detail: format!("tempfile: {e}"),
        };
        let mut tmp = tempfile::NamedTempFile::new().map_err(unavailable)?;
        tmp.write_all(bytes).map_err(unavailable)?;
        tmp.flush().map_err(unavailable)?;

        Ok(Self {
            path: tmp.path().to_path_buf(),
            source_id,
            password: None,
            max_rendered_pixels: DEFAULT_MAX_RENDERED_PIXELS,
            _temp: Some(tmp),
        })
    }

    /// PDF user password for encrypted documents.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.max_rendered_pixels = px.max(100);
        self
    }
}

#[async_trait]
impl DocumentSource for PdfiumSource {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    async fn page_count(&self) -> Result<usize, ScanError> {
        let path = self.path.clone();
        let password = self.password.clone();
        tokio::task::spawn_blocking(move || page_count_blocking(&path, password.as_deref()))
            .await
            .map_err(|e| ScanError::Internal(format!("Page-count task panicked: {}", e)))?
    }

    async fn render_page(&self, page_num: usize) -> Result<RenderedPage, ScanError> {
        let path = self.path.clone();
        let password = self.password.clone();
        let max_pixels = self.max_rendered_pixels;
        tokio::task::spawn_blocking(move || {
            render_page_blocking(&path, password.as_deref(), max_pixels, page_num)
        })
        .await
        .map_err(|e| ScanError::Internal(format!("Render task panicked: {}", e)))?
    }
}

fn load_document<'a>(
    pdfium: &'a Pdfium,
    pdf_path: &Path,
    password: Option<&str>,
) -> Result<PdfDocument<'a>, ScanError> {
    pdfium.load_pdf_from_file(pdf_path, password).map_err(|e| {
        let err_str = format!("{:?}", e);
        let detail = if err_str.contains("Password") || err_str.contains("password") {
            if password.is_some() {
                "wrong password".to_string()
            } else {
                "document is encrypted and requires a password".to_string()
            }
        } else {
            format!("corrupt PDF: {err_str}")
        };
        ScanError::SourceUnavailable {
            source_id: pdf_path.display().to_string(),
            detail,
        }
    })
}

fn page_count_blocking(pdf_path: &Path, password: Option<&str>) -> Result<usize, ScanError> {
    let pdfium = Pdfium::default();
    let document = load_document(&pdfium, pdf_path, password)?;
    let total = document.pages().len() as usize;
    info!("PDF loaded: {} pages", total);
    Ok(total)
}

fn render_page_blocking(
    pdf_path: &Path,
    password: Option<&str>,
    max_pixels: u32,
    page_num: usize,
) -> Result<RenderedPage, ScanError> {
    let pdfium = Pdfium::default();
    let document = load_document(&pdfium, pdf_path, password)?;
    let pages = document.pages();
    let total = pages.len() as usize;

    if page_num == 0 || page_num > total {
        return Err(ScanError::PageOutOfRange {
            page: page_num,
            total,
        });
    }

    let page = pages
        .get((page_num - 1) as u16)
        .map_err(|e| ScanError::Render {
            page: page_num,
            detail: format!("{:?}", e),
        })?;

    let render_config = PdfRenderConfig::new()
        .set_target_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let bitmap = page
        .render_with_config(&render_config)
        .map_err(|e| ScanError::Render {
            page: page_num,
            detail: format!("{:?}", e),
        })?;

    let image = bitmap.as_image();
    let width_points = page.width().value;
    let dpi = if width_points > 0.0 {
        image.width() as f32 * 72.0 / width_points
    } else {
        72.0
    };
    debug!(
        "Rendered page {} → {}x{} px ({:.0} dpi)",
        page_num,
        image.width(),
        image.height(),
        dpi
    );

    encode::rendered_page(page_num, &image, dpi)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_unavailable() {
        let err = PdfiumSource::open("/definitely/not/a/real/file.pdf")
            .err()
            .expect("open should fail");
        assert!(matches!(err, ScanError::SourceUnavailable { .. }), "got: {err:?}");
    }

    #[test]
    fn from_bytes_keeps_a_temp_copy() {
        let src = PdfiumSource::from_bytes(b"%PDF-1.4\n", "mem:1").unwrap();
        assert_eq!(src.source_id(), "mem:1");
        assert!(src.path.exists());
    }
}
