//! Collaborator interfaces: where pages come from and where they go.
//!
//! The scan pipeline only orchestrates. Rendering a page to pixels and
//! encoding the final document are delegated to implementations of
//! [`DocumentSource`] and [`DocumentAssembler`]. With the `pdfium` feature
//! enabled, [`crate::pipeline::render::PdfiumSource`] provides a ready-made
//! source.

use crate::cancel::CancellationSignal;
use crate::error::ScanError;
use crate::output::{Document, RenderedPage, ScannedPage};
use async_trait::async_trait;

/// A multi-page input document.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Stable identifier of the document (path, URL, content hash, …).
    ///
    /// Two sources with the same identifier are assumed to render identical
    /// pages; the identifier is part of the job identity.
    fn source_id(&self) -> &str;

    /// Total number of pages.
    async fn page_count(&self) -> Result<usize, ScanError>;

    /// Rasterise one page (1-indexed).
    async fn render_page(&self, page_num: usize) -> Result<RenderedPage, ScanError>;
}

/// Builds the output document from processed pages.
#[async_trait]
pub trait DocumentAssembler: Send + Sync {
    /// Assemble `pages`, supplied in strict page order.
    ///
    /// Long-running assemblers should watch `signal` and return
    /// [`ScanError::Cancelled`] when it fires.
    async fn assemble(
        &self,
        pages: &[ScannedPage],
        signal: &CancellationSignal,
    ) -> Result<Document, ScanError>;
}
