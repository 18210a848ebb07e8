//! In-memory image sequence as a document source.
//!
//! Useful when the pages are already pixels (photographed pages, frames
//! decoded elsewhere) and in tests that need a real raster source without a
//! PDF engine.

use crate::error::ScanError;
use crate::output::RenderedPage;
use crate::pipeline::encode;
use crate::source::DocumentSource;
use async_trait::async_trait;
use image::DynamicImage;
use std::sync::Arc;

/// A [`DocumentSource`] over a fixed list of images, one per page.
pub struct ImageSequenceSource {
    id: String,
    pages: Arc<Vec<DynamicImage>>,
    dpi: f32,
}

impl ImageSequenceSource {
    /// `id` must identify the image list stably; it is part of the job
    /// identity.
    pub fn new(id: impl Into<String>, pages: Vec<DynamicImage>, dpi: f32) -> Self {
        Self {
            id: id.into(),
            pages: Arc::new(pages),
            dpi,
        }
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

#[async_trait]
impl DocumentSource for ImageSequenceSource {
    fn source_id(&self) -> &str {
        &self.id
    }

    async fn page_count(&self) -> Result<usize, ScanError> {
        Ok(self.pages.len())
    }

    async fn render_page(&self, page_num: usize) -> Result<RenderedPage, ScanError> {
        let total = self.pages.len();
        if page_num == 0 || page_num > total {
            return Err(ScanError::PageOutOfRange {
                page: page_num,
                total,
            });
        }

        // PNG encoding is CPU-bound; keep it off the async worker threads.
        let pages = Arc::clone(&self.pages);
        let dpi = self.dpi;
        tokio::task::spawn_blocking(move || {
            encode::rendered_page(page_num, &pages[page_num - 1], dpi)
        })
        .await
        .map_err(|e| ScanError::Internal(format!("Render task panicked: {}", e)))?
    }
}
