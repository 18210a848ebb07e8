//! Shared in-memory collaborators for the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use pdfscan::{
    CancelToken, CancellationSignal, DispatchMode, Document, DocumentAssembler, DocumentSource,
    PageTransform, RenderedPage, ScanError, ScanOptions, ScannedPage, TransformFault,
};
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Install a tracing subscriber once; honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

// ── Transform configuration ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct TestConfig {
    /// Byte every pixel is XOR-ed with.
    pub xor: u8,
    /// Fail the transform for this page.
    pub fail_page: Option<usize>,
    /// How long each transform takes.
    pub delay_ms: u64,
}

impl TestConfig {
    pub fn new(xor: u8) -> Self {
        Self {
            xor,
            fail_page: None,
            delay_ms: 0,
        }
    }

    pub fn delay_ms(mut self, ms: u64) -> Self {
        self.delay_ms = ms;
        self
    }

    pub fn fail_page(mut self, page: usize) -> Self {
        self.fail_page = Some(page);
        self
    }
}

// ── Source ───────────────────────────────────────────────────────────────

/// Renders page N as the bytes of `"page-N"`.
pub struct MockSource {
    id: String,
    pages: usize,
    fail_page: Option<usize>,
    pub renders: AtomicUsize,
    pub count_queries: AtomicUsize,
}

impl MockSource {
    pub fn new(id: &str, pages: usize) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            pages,
            fail_page: None,
            renders: AtomicUsize::new(0),
            count_queries: AtomicUsize::new(0),
        })
    }

    pub fn failing(id: &str, pages: usize, fail_page: usize) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            pages,
            fail_page: Some(fail_page),
            renders: AtomicUsize::new(0),
            count_queries: AtomicUsize::new(0),
        })
    }

    pub fn renders(&self) -> usize {
        self.renders.load(Ordering::SeqCst)
    }
}

pub fn raw_page(page_num: usize) -> Vec<u8> {
    format!("page-{page_num}").into_bytes()
}

pub fn processed_page(page_num: usize, xor: u8) -> Vec<u8> {
    raw_page(page_num).into_iter().map(|b| b ^ xor).collect()
}

#[async_trait]
impl DocumentSource for MockSource {
    fn source_id(&self) -> &str {
        &self.id
    }

    async fn page_count(&self) -> Result<usize, ScanError> {
        self.count_queries.fetch_add(1, Ordering::SeqCst);
        Ok(self.pages)
    }

    async fn render_page(&self, page_num: usize) -> Result<RenderedPage, ScanError> {
        self.renders.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        if Some(page_num) == self.fail_page {
            return Err(ScanError::Render {
                page: page_num,
                detail: "damaged content stream".into(),
            });
        }
        Ok(RenderedPage {
            data: raw_page(page_num),
            width: 100 + page_num as u32,
            height: 200,
            dpi: 150.0,
        })
    }
}

// ── Transform ────────────────────────────────────────────────────────────

/// XOR transform that tracks how many calls run at the same time.
///
/// The failing page fails at once. Otherwise the configured delay is spent
/// in short slices so the transform gives up as soon as its token fires; an
/// interrupted call does not count as completed.
#[derive(Default)]
pub struct CountingTransform {
    pub calls: AtomicUsize,
    pub completed: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl CountingTransform {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

impl PageTransform<TestConfig> for CountingTransform {
    fn apply(
        &self,
        buffer: Vec<u8>,
        config: &TestConfig,
        cancel: &dyn CancelToken,
    ) -> Result<Vec<u8>, TransformFault> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(p) = config.fail_page.filter(|&p| buffer == raw_page(p)) {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.completed.fetch_add(1, Ordering::SeqCst);
            return Err(format!("cannot process page {p}").into());
        }

        let deadline = Instant::now() + Duration::from_millis(config.delay_ms);
        while Instant::now() < deadline {
            if cancel.is_cancelled() {
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                return Err("interrupted".into());
            }
            std::thread::sleep(Duration::from_millis(2));
        }

        let processed = buffer.into_iter().map(|b| b ^ config.xor).collect();
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(processed)
    }
}

// ── Assembler ────────────────────────────────────────────────────────────

/// Joins page images with `|` and records the page order it was given.
#[derive(Default)]
pub struct MockAssembler {
    pub calls: AtomicUsize,
    pub order: Mutex<Vec<usize>>,
}

impl MockAssembler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn order(&self) -> Vec<usize> {
        self.order.lock().unwrap().clone()
    }
}

#[async_trait]
impl DocumentAssembler for MockAssembler {
    async fn assemble(
        &self,
        pages: &[ScannedPage],
        signal: &CancellationSignal,
    ) -> Result<Document, ScanError> {
        if signal.is_cancelled() {
            return Err(ScanError::Cancelled);
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.order.lock().unwrap() = pages.iter().map(|p| p.page_num).collect();
        let bytes = pages
            .iter()
            .map(|p| p.image.as_bytes().to_vec())
            .collect::<Vec<_>>()
            .join(&b'|');
        Ok(Document::new(bytes, "application/x-test"))
    }
}

// ── Options ──────────────────────────────────────────────────────────────

pub fn worker_options() -> ScanOptions {
    ScanOptions::builder()
        .available_parallelism(8)
        .dispatch(DispatchMode::Worker)
        .build()
        .unwrap()
}

pub fn inline_options() -> ScanOptions {
    ScanOptions::builder()
        .available_parallelism(8)
        .dispatch(DispatchMode::Inline)
        .build()
        .unwrap()
}
