//! Progress-callback trait for per-page scan events.
//!
//! Pass a [`ProgressCallback`] to [`crate::job::ScanJob::produce_document`]
//! to be told as pages finish. Callers always observe exactly one
//! [`ScanProgressCallback::on_page_scanned`] per page, whether the document
//! is computed or replayed from the job's cache.
//!
//! # Example
//!
//! ```rust
//! use pdfscan::{ProgressCallback, ScanProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! let done = Arc::new(AtomicUsize::new(0));
//! let counter = Arc::clone(&done);
//! let cb: ProgressCallback = Arc::new(move |_index: usize, _total: usize| {
//!     counter.fetch_add(1, Ordering::SeqCst);
//! });
//! cb.on_page_scanned(0, 3);
//! assert_eq!(done.load(Ordering::SeqCst), 1);
//! ```

use std::sync::Arc;

/// Called by the scan pipeline as it processes each page.
///
/// Pages are processed concurrently, so `on_page_scanned` may be called from
/// several tasks at once and in completion order rather than page order.
/// All methods default to no-ops.
pub trait ScanProgressCallback: Send + Sync {
    /// Called once before any page task is scheduled on a computed run.
    fn on_scan_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called once per completed page.
    ///
    /// # Arguments
    /// * `page_index`  — 0-indexed page position, in `0..total_pages`
    /// * `total_pages` — total pages in the document
    fn on_page_scanned(&self, page_index: usize, total_pages: usize) {
        let _ = (page_index, total_pages);
    }

    /// Called once after the document has been assembled on a computed run.
    fn on_scan_complete(&self, total_pages: usize) {
        let _ = total_pages;
    }
}

impl<F> ScanProgressCallback for F
where
    F: Fn(usize, usize) + Send + Sync,
{
    fn on_page_scanned(&self, page_index: usize, total_pages: usize) {
        self(page_index, total_pages)
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ScanProgressCallback for NoopProgressCallback {}

/// Shared, thread-safe progress callback.
pub type ProgressCallback = Arc<dyn ScanProgressCallback>;
