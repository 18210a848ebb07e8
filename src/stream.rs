//! Streaming API: emit processed pages as they complete.
//!
//! Unlike [`crate::job::ScanJob::produce_document`], which returns only
//! after every page is done and the document is assembled, [`scan_stream`]
//! yields each [`ScannedPage`] as soon as its task finishes. Pages arrive in
//! completion order; sort by `page_num` if order matters.
//!
//! The stream shares the job's page cache and cancellation signal. Once the
//! signal is raised, every page not yet finished is yielded as
//! [`ScanError::Cancelled`]. Drain the stream after cancelling if the
//! workers must have exited; dropping it early leaves them to stop at their
//! transform's next cancellation poll.

use crate::error::ScanError;
use crate::job::ScanJob;
use crate::output::ScannedPage;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::Stream;
use tracing::info;

/// A boxed stream of page results.
pub type PageStream = Pin<Box<dyn Stream<Item = Result<ScannedPage, ScanError>> + Send>>;

/// Stream every page of `job` with at most `max_concurrency` in flight
/// (clamped by hardware parallelism; `None` means no extra cap).
///
/// # Errors
/// Returns `Err` only if the page count cannot be read; per-page failures
/// are items of the stream.
pub async fn scan_stream<C>(
    job: Arc<ScanJob<C>>,
    max_concurrency: Option<usize>,
) -> Result<PageStream, ScanError>
where
    C: Serialize + Clone + Send + Sync + 'static,
{
    let total_pages = job.page_count().await?;
    let concurrency = job.options().effective_concurrency(max_concurrency);
    info!(
        "Streaming {} pages of {} ({} at a time)",
        total_pages,
        job.source_id(),
        concurrency
    );

    let s = stream::iter(1..=total_pages)
        .map(move |page_num| {
            let job = Arc::clone(&job);
            async move { job.scan_page(page_num, total_pages, job.signal(), None).await }
        })
        .buffer_unordered(concurrency);

    Ok(Box::pin(s))
}
