//! Scan jobs: one document under one transform configuration.
//!
//! A [`ScanJob`] owns everything that makes repeated requests cheap:
//!
//! * a page cache, so a page is rendered and transformed once per job;
//! * the cancellation signal shared by all of its tasks and workers;
//! * the assembled document, once it has been produced.
//!
//! ## Pipeline
//!
//! ```text
//! page_count ──▶ page tasks (≤ concurrency at once) ──▶ sort by page ──▶ assemble
//!                  │
//!                  ├─ cancelled? fail fast
//!                  ├─ page cache hit ─────────────┐
//!                  └─ render ──▶ worker bridge ───┴─▶ progress callback
//! ```
//!
//! Page tasks complete in any order. The first task to fail raises the
//! run's own child signal: pages not yet started are skipped and in-flight
//! workers are terminated. The run still awaits every task, so no worker is
//! left running once it returns.

use crate::cancel::CancellationSignal;
use crate::config::ScanOptions;
use crate::error::ScanError;
use crate::output::{Document, PageImage, RenderedPage, ScanStats, ScannedPage};
use crate::pipeline::cache::{CachedPage, PageCache};
use crate::pipeline::identity::JobId;
use crate::pipeline::worker::{PageTransform, TransformBridge};
use crate::progress::ProgressCallback;
use crate::source::{DocumentAssembler, DocumentSource};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// The assembled document together with the page total it was built from,
/// so cached replays can fire one callback per page without asking the
/// source again.
struct CachedDocument {
    document: Arc<Document>,
    total_pages: usize,
}

/// One logical request to scan every page of a document.
pub struct ScanJob<C> {
    id: JobId,
    source: Arc<dyn DocumentSource>,
    assembler: Arc<dyn DocumentAssembler>,
    config: C,
    options: ScanOptions,
    bridge: TransformBridge<C>,
    pages: PageCache,
    signal: CancellationSignal,
    document: OnceCell<CachedDocument>,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    assemblies: AtomicU64,
}

impl<C> ScanJob<C>
where
    C: Serialize + Clone + Send + Sync + 'static,
{
    /// Build a job with default [`ScanOptions`].
    ///
    /// `config` is copied into the job; later changes to the caller's value
    /// do not affect it. Without a `signal` the job gets a private one that
    /// can still be raised through [`ScanJob::cancel`].
    ///
    /// # Errors
    /// [`ScanError::InvalidConfig`] if `config` cannot be serialised.
    pub fn new(
        source: Arc<dyn DocumentSource>,
        assembler: Arc<dyn DocumentAssembler>,
        transform: Arc<dyn PageTransform<C>>,
        config: &C,
        signal: Option<CancellationSignal>,
    ) -> Result<Self, ScanError> {
        let mut builder = Self::builder(source, assembler, transform, config);
        if let Some(signal) = signal {
            builder = builder.signal(signal);
        }
        builder.build()
    }

    /// Start building a job.
    pub fn builder(
        source: Arc<dyn DocumentSource>,
        assembler: Arc<dyn DocumentAssembler>,
        transform: Arc<dyn PageTransform<C>>,
        config: &C,
    ) -> ScanJobBuilder<C> {
        ScanJobBuilder {
            source,
            assembler,
            transform,
            config: config.clone(),
            signal: None,
            options: ScanOptions::default(),
        }
    }

    // ── Accessors ────────────────────────────────────────────────────────

    /// Identity derived from the source id and the transform configuration.
    pub fn id(&self) -> &JobId {
        &self.id
    }

    /// The job's private copy of the transform configuration.
    pub fn config(&self) -> &C {
        &self.config
    }

    /// Scheduling and dispatch options the job was built with.
    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    /// Identifier reported by the document source.
    pub fn source_id(&self) -> &str {
        self.source.source_id()
    }

    /// The cancellation signal observed by every task of this job.
    pub fn signal(&self) -> &CancellationSignal {
        &self.signal
    }

    /// Raise the job's cancellation signal. Returns `false` if it was
    /// already raised.
    pub fn cancel(&self) -> bool {
        self.signal.cancel()
    }

    /// Whether the job's signal has been raised.
    pub fn is_cancelled(&self) -> bool {
        self.signal.is_cancelled()
    }

    /// The assembled document, if a previous run produced one.
    pub fn cached_document(&self) -> Option<Arc<Document>> {
        self.document.get().map(|c| Arc::clone(&c.document))
    }

    /// Number of pages currently held in the page cache.
    pub fn cached_pages(&self) -> usize {
        self.pages.len()
    }

    /// Snapshot of the job's cache and dispatch counters.
    pub fn stats(&self) -> ScanStats {
        ScanStats {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            worker_dispatches: self.bridge.worker_dispatches(),
            inline_transforms: self.bridge.inline_runs(),
            assemblies: self.assemblies.load(Ordering::Relaxed),
        }
    }

    /// Total pages reported by the source.
    pub async fn page_count(&self) -> Result<usize, ScanError> {
        self.source.page_count().await
    }

    // ── Page accessor ────────────────────────────────────────────────────

    /// Processed image for one page (1-indexed).
    ///
    /// A cached page is returned as-is, even if the job has since been
    /// cancelled. On a miss the page is rendered, transformed through the
    /// worker bridge and cached; a cancelled job fails the miss before any
    /// rendering.
    pub async fn get_page(&self, page_num: usize) -> Result<PageImage, ScanError> {
        self.page_entry(page_num, &self.signal)
            .await
            .map(|page| page.image)
    }

    async fn page_entry(
        &self,
        page_num: usize,
        signal: &CancellationSignal,
    ) -> Result<CachedPage, ScanError> {
        if page_num == 0 {
            let total = self.source.page_count().await?;
            return Err(ScanError::PageOutOfRange { page: 0, total });
        }

        if let Some(hit) = self.pages.get(page_num) {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(hit);
        }
        self.cache_misses.fetch_add(1, Ordering::Relaxed);

        if signal.is_cancelled() {
            return Err(ScanError::Cancelled);
        }
        let RenderedPage {
            data,
            width,
            height,
            dpi,
        } = self.source.render_page(page_num).await?;
        let processed = self
            .bridge
            .transform(page_num, data, &self.config, Some(signal))
            .await?;

        let page = CachedPage {
            image: PageImage::new(processed, self.options.image_mime_type.as_str()),
            width,
            height,
            dpi,
        };
        Ok(self.pages.insert(page_num, page))
    }

    // ── Document pipeline ────────────────────────────────────────────────

    /// Produce the assembled document.
    ///
    /// `max_concurrency` caps how many pages are processed at once; the cap
    /// is further clamped by hardware parallelism, and `None` means no cap
    /// beyond it.
    ///
    /// The document is cached on the job. Later calls return the same
    /// `Arc<Document>` regardless of their arguments, and replay
    /// `on_page_scanned` once per page so callers always observe one event
    /// per page. Concurrent calls share a single run.
    ///
    /// # Errors
    /// * [`ScanError::Cancelled`] — the signal was raised before assembly
    /// * any render, transform or assembly error of the first failing page;
    ///   nothing is cached and a later call starts over
    pub async fn produce_document(
        &self,
        progress: Option<ProgressCallback>,
        max_concurrency: Option<usize>,
    ) -> Result<Arc<Document>, ScanError> {
        let mut computed = false;
        let cached = self
            .document
            .get_or_try_init(|| {
                computed = true;
                self.run_pipeline(progress.clone(), max_concurrency)
            })
            .await?;

        if !computed {
            info!("Return cached document for {}", self.source_id());
            if let Some(ref cb) = progress {
                for index in 0..cached.total_pages {
                    cb.on_page_scanned(index, cached.total_pages);
                }
            }
        }

        Ok(Arc::clone(&cached.document))
    }

    /// Start producing the document in the background with the configured
    /// default concurrency. Later [`ScanJob::produce_document`] calls share
    /// the result.
    ///
    /// # Errors
    /// [`ScanError::Internal`] when called outside a Tokio runtime.
    pub fn prefetch(
        self: &Arc<Self>,
    ) -> Result<JoinHandle<Result<Arc<Document>, ScanError>>, ScanError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| ScanError::Internal(format!("prefetch needs a Tokio runtime: {e}")))?;
        let job = Arc::clone(self);
        let cap = self.options.max_concurrency;
        debug!("Prefetching {} with concurrency cap {:?}", job.id, cap);
        Ok(runtime.spawn(async move { job.produce_document(None, cap).await }))
    }

    async fn run_pipeline(
        &self,
        progress: Option<ProgressCallback>,
        max_concurrency: Option<usize>,
    ) -> Result<CachedDocument, ScanError> {
        let start = Instant::now();
        let total_pages = self.source.page_count().await?;
        let concurrency = self.options.effective_concurrency(max_concurrency);
        info!(
            "Scanning {} pages of {} ({} at a time)",
            total_pages,
            self.source_id(),
            concurrency
        );

        if let Some(ref cb) = progress {
            cb.on_scan_start(total_pages);
        }

        let run = self.signal.child();
        let mut tasks = stream::iter(1..=total_pages)
            .map(|page_num| self.scan_page(page_num, total_pages, &run, progress.as_ref()))
            .buffer_unordered(concurrency);

        let mut pages = Vec::with_capacity(total_pages);
        let mut failure: Option<ScanError> = None;
        while let Some(result) = tasks.next().await {
            match result {
                Ok(page) => pages.push(page),
                Err(e) => {
                    if failure.is_none() {
                        debug!("Aborting scan of {}: {}", self.source_id(), e);
                        run.cancel();
                        failure = Some(e);
                    }
                }
            }
        }
        if let Some(e) = failure {
            return Err(e);
        }
        pages.sort_by_key(|p| p.page_num);
        let scan_ms = start.elapsed().as_millis() as u64;

        if self.signal.is_cancelled() {
            info!("Scan of {} cancelled before assembly", self.source_id());
            return Err(ScanError::Cancelled);
        }

        let assemble_start = Instant::now();
        self.assemblies.fetch_add(1, Ordering::Relaxed);
        let document = self.assembler.assemble(&pages, &self.signal).await?;
        info!(
            "Scan complete: {} pages in {}ms, assembled {} bytes in {}ms",
            total_pages,
            scan_ms,
            document.len(),
            assemble_start.elapsed().as_millis()
        );

        if let Some(ref cb) = progress {
            cb.on_scan_complete(total_pages);
        }

        Ok(CachedDocument {
            document: Arc::new(document),
            total_pages,
        })
    }

    /// One page task: fail fast on cancellation, fetch the processed page,
    /// report progress.
    pub(crate) async fn scan_page(
        &self,
        page_num: usize,
        total_pages: usize,
        signal: &CancellationSignal,
        progress: Option<&ProgressCallback>,
    ) -> Result<ScannedPage, ScanError> {
        if signal.is_cancelled() {
            debug!("Page {}/{} skipped: cancelled", page_num, total_pages);
            return Err(ScanError::Cancelled);
        }

        let page = self.page_entry(page_num, signal).await?;
        debug!("Page {}/{} scanned", page_num, total_pages);
        if let Some(cb) = progress {
            cb.on_page_scanned(page_num - 1, total_pages);
        }

        Ok(ScannedPage {
            page_num,
            image: page.image,
            width: page.width,
            height: page.height,
            dpi: page.dpi,
        })
    }
}

impl<C> fmt::Debug for ScanJob<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanJob")
            .field("id", &self.id)
            .field("options", &self.options)
            .field("dispatch", &self.bridge.mode())
            .field("cached_pages", &self.pages.len())
            .field("has_document", &self.document.initialized())
            .field("cancelled", &self.signal.is_cancelled())
            .finish()
    }
}

/// Builder for [`ScanJob`].
pub struct ScanJobBuilder<C> {
    source: Arc<dyn DocumentSource>,
    assembler: Arc<dyn DocumentAssembler>,
    transform: Arc<dyn PageTransform<C>>,
    config: C,
    signal: Option<CancellationSignal>,
    options: ScanOptions,
}

impl<C> ScanJobBuilder<C>
where
    C: Serialize + Clone + Send + Sync + 'static,
{
    pub fn signal(mut self, signal: CancellationSignal) -> Self {
        self.signal = Some(signal);
        self
    }

    pub fn options(mut self, options: ScanOptions) -> Self {
        self.options = options;
        self
    }

    pub fn build(self) -> Result<ScanJob<C>, ScanError> {
        let id = JobId::derive(self.source.source_id(), &self.config)?;
        let bridge = TransformBridge::new(
            self.transform,
            self.options.dispatch,
            self.options.worker_name_prefix.as_str(),
        );
        debug!("Created scan job {} ({:?} dispatch)", id, bridge.mode());

        Ok(ScanJob {
            id,
            source: self.source,
            assembler: self.assembler,
            config: self.config,
            options: self.options,
            bridge,
            pages: PageCache::new(),
            signal: self.signal.unwrap_or_default(),
            document: OnceCell::new(),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            assemblies: AtomicU64::new(0),
        })
    }
}
