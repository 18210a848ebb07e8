//! # pdfscan
//!
//! Turn a multi-page document into a sequence of processed page images and
//! reassemble them into an output document, e.g. to make a PDF look like it
//! went through a scanner.
//!
//! The crate is the orchestration layer only. Rendering pages, the pixel
//! transform itself and encoding the output document are supplied by the
//! caller through three narrow interfaces:
//!
//! * [`DocumentSource`] — page count and page rendering
//! * [`PageTransform`] — the per-page pixel transform
//! * [`DocumentAssembler`] — builds the output document from ordered pages
//!
//! ## Pipeline Overview
//!
//! ```text
//! document
//!  │
//!  ├─ 1. Count   ask the source for its page count
//!  ├─ 2. Render  rasterise each page (≤ concurrency pages in flight)
//!  ├─ 3. Cache   reuse a page already processed by this job
//!  ├─ 4. Worker  transform on a dedicated per-call thread (inline fallback)
//!  ├─ 5. Order   restore page order regardless of completion order
//!  └─ 6. Output  assemble, cache on the job, return
//! ```
//!
//! A single [`CancellationSignal`] reaches every page task and worker:
//! not-yet-started pages fail immediately, in-flight workers are terminated,
//! and the assembler is never called once the signal is up.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdfscan::pipeline::worker::from_fn;
//! use pdfscan::{
//!     CancellationSignal, Document, DocumentAssembler, ImageSequenceSource, PageTransform,
//!     ScanError, ScanJob, ScannedPage,
//! };
//! use std::sync::Arc;
//!
//! struct ConcatAssembler;
//!
//! #[async_trait::async_trait]
//! impl DocumentAssembler for ConcatAssembler {
//!     async fn assemble(
//!         &self,
//!         pages: &[ScannedPage],
//!         _signal: &CancellationSignal,
//!     ) -> Result<Document, ScanError> {
//!         let bytes: Vec<u8> = pages.iter().flat_map(|p| p.image.as_bytes().to_vec()).collect();
//!         Ok(Document::new(bytes, "application/octet-stream"))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let source = Arc::new(ImageSequenceSource::new("demo", vec![], 150.0));
//!     let transform: Arc<dyn PageTransform<serde_json::Value>> =
//!         Arc::new(from_fn(|buf: Vec<u8>, _cfg: &serde_json::Value| Ok(buf)));
//!     let config = serde_json::json!({ "rotate": 1.5, "colorspace": "gray" });
//!
//!     let job = ScanJob::new(source, Arc::new(ConcatAssembler), transform, &config, None)?;
//!     let document = job.produce_document(None, Some(4)).await?;
//!     eprintln!("{} bytes", document.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `pdfium` | off     | [`pipeline::render::PdfiumSource`], a pdfium-backed [`DocumentSource`] |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod cancel;
pub mod config;
pub mod error;
pub mod job;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod registry;
pub mod scan;
pub mod source;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use cancel::{CancelToken, CancellationSignal, NeverCancel};
pub use config::{
    resolve_concurrency, DispatchMode, ScanOptions, ScanOptionsBuilder, CONSTRAINED_CONCURRENCY,
    DEFAULT_CONCURRENCY, UNBOUNDED_CONCURRENCY,
};
pub use error::ScanError;
pub use job::{ScanJob, ScanJobBuilder};
pub use output::{Document, PageImage, RenderedPage, ScanStats, ScannedPage};
pub use pipeline::identity::JobId;
pub use pipeline::images::ImageSequenceSource;
pub use pipeline::worker::{PageTransform, TransformBridge, TransformFault};
pub use progress::{NoopProgressCallback, ProgressCallback, ScanProgressCallback};
pub use registry::JobRegistry;
pub use scan::{scan, scan_sync, scan_to_file};
pub use source::{DocumentAssembler, DocumentSource};
pub use stream::{scan_stream, PageStream};

#[cfg(feature = "pdfium")]
pub use pipeline::render::PdfiumSource;
