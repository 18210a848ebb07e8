//! Transform worker bridge: run one page's transform off the async runtime.
//!
//! ## Worker per call
//!
//! Every call to [`TransformBridge::transform`] spawns a fresh, named OS
//! thread, posts it a single message carrying the raw buffer and a copy of
//! the configuration, and awaits a single reply. The buffer is moved into the
//! message, never copied.
//!
//! The thread is owned by a [`Worker`] guard. Terminating it raises the
//! worker's [`CancelToken`], which the transform polls, and the call does not
//! return until the thread has exited. A worker therefore never outlives its
//! call and never competes with later dispatches for a concurrency slot.
//!
//! If the calling future is dropped instead of awaited, the guard still
//! raises the token but cannot wait; the thread exits at the transform's next
//! poll. The scan pipeline always awaits its page tasks for this reason.
//!
//! ## Inline fallback
//!
//! When the platform has no threads (or [`DispatchMode::Inline`] is chosen),
//! the same [`PageTransform`] runs synchronously on the calling task. If a
//! worker thread cannot be spawned at runtime the bridge falls back to the
//! inline path for that call.

use crate::cancel::{CancelToken, CancellationSignal, NeverCancel};
use crate::config::DispatchMode;
use crate::error::ScanError;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Error type transforms may return.
pub type TransformFault = Box<dyn std::error::Error + Send + Sync>;

/// The pixel transform applied to each rendered page.
///
/// Implementations must be pure with respect to `config`: the same buffer
/// and the same serialised configuration always produce the same output.
/// The scan pipeline relies on this when it reuses cached pages and
/// documents.
///
/// Long transforms should poll `cancel` between rows, tiles or passes and
/// return early once it fires. Whatever they return after that is discarded.
pub trait PageTransform<C>: Send + Sync + 'static {
    fn apply(
        &self,
        buffer: Vec<u8>,
        config: &C,
        cancel: &dyn CancelToken,
    ) -> Result<Vec<u8>, TransformFault>;
}

/// Adapter turning a closure into a [`PageTransform`]; see [`from_fn`].
pub struct FnTransform<F>(F);

impl<C, F> PageTransform<C> for FnTransform<F>
where
    F: Fn(Vec<u8>, &C) -> Result<Vec<u8>, TransformFault> + Send + Sync + 'static,
{
    fn apply(
        &self,
        buffer: Vec<u8>,
        config: &C,
        _cancel: &dyn CancelToken,
    ) -> Result<Vec<u8>, TransformFault> {
        (self.0)(buffer, config)
    }
}

/// Wrap a closure as a [`PageTransform`].
///
/// The closure cannot observe cancellation, so keep it short; implement
/// [`PageTransform`] directly for transforms that take long enough to be
/// worth interrupting.
///
/// ```rust
/// use pdfscan::pipeline::worker::{from_fn, PageTransform};
/// use pdfscan::NeverCancel;
///
/// let invert = from_fn(|mut buf: Vec<u8>, _cfg: &()| {
///     buf.iter_mut().for_each(|b| *b = !*b);
///     Ok(buf)
/// });
/// assert_eq!(invert.apply(vec![0x0f], &(), &NeverCancel).unwrap(), vec![0xf0]);
/// ```
pub fn from_fn<C, F>(f: F) -> FnTransform<F>
where
    F: Fn(Vec<u8>, &C) -> Result<Vec<u8>, TransformFault> + Send + Sync + 'static,
{
    FnTransform(f)
}

// ── Messages ─────────────────────────────────────────────────────────────

/// The single message posted to a worker.
struct ToWorker<C> {
    buffer: Vec<u8>,
    config: C,
}

/// The single reply a worker sends back.
type FromWorker = Result<Vec<u8>, String>;

// ── Worker guard ─────────────────────────────────────────────────────────

/// What a worker's transform polls: its own termination flag, plus the
/// caller's signal when there is one.
struct WorkerToken {
    terminated: Arc<AtomicBool>,
    signal: Option<CancellationSignal>,
}

impl CancelToken for WorkerToken {
    fn is_cancelled(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
            || self.signal.as_ref().is_some_and(CancellationSignal::is_cancelled)
    }
}

/// A dedicated transform thread, alive for exactly one call.
///
/// [`Worker::shutdown`] terminates the worker and waits for its thread.
/// Dropping the guard only terminates it.
struct Worker {
    name: String,
    terminated: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    fn spawn<C>(
        name: String,
        transform: Arc<dyn PageTransform<C>>,
        signal: Option<CancellationSignal>,
        inbox: mpsc::Receiver<ToWorker<C>>,
        outbox: oneshot::Sender<FromWorker>,
    ) -> std::io::Result<Self>
    where
        C: Send + 'static,
    {
        let terminated = Arc::new(AtomicBool::new(false));
        let token = WorkerToken {
            terminated: Arc::clone(&terminated),
            signal,
        };

        let handle = std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                let Ok(ToWorker { buffer, config }) = inbox.recv() else {
                    return;
                };
                if token.is_cancelled() {
                    return;
                }
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                    transform.apply(buffer, &config, &token)
                }));
                if token.is_cancelled() {
                    // Late reply from a terminated worker.
                    return;
                }
                let reply = match outcome {
                    Ok(Ok(processed)) => Ok(processed),
                    Ok(Err(fault)) => Err(fault.to_string()),
                    Err(payload) => Err(panic_message(payload)),
                };
                let _ = outbox.send(reply);
            })?;

        Ok(Self {
            name,
            terminated,
            handle: Some(handle),
        })
    }

    /// Raise the worker's token and wait for its thread to exit.
    ///
    /// The join runs on the blocking pool so async workers never stall on
    /// a transform that is slow to notice.
    async fn shutdown(&mut self) {
        self.terminated.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let start = Instant::now();
            if let Err(e) = tokio::task::spawn_blocking(move || handle.join()).await {
                warn!("Join of worker {} failed: {}", self.name, e);
            }
            debug!("Worker {} exited after {:?}", self.name, start.elapsed());
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        if self.handle.take().is_some() {
            self.terminated.store(true, Ordering::Release);
            debug!("Terminated worker {} without waiting", self.name);
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("transform panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("transform panicked: {s}")
    } else {
        "transform panicked".to_string()
    }
}

// ── Bridge ───────────────────────────────────────────────────────────────

/// Dispatches page transforms to per-call workers or runs them inline.
///
/// The strategy is fixed when the bridge is built; both strategies honour the
/// same contract so the pipeline never needs to know which one is active.
pub struct TransformBridge<C> {
    transform: Arc<dyn PageTransform<C>>,
    mode: DispatchMode,
    name_prefix: String,
    worker_dispatches: AtomicU64,
    inline_runs: AtomicU64,
}

impl<C> TransformBridge<C> {
    /// The resolved strategy: [`DispatchMode::Worker`] or [`DispatchMode::Inline`].
    pub fn mode(&self) -> DispatchMode {
        self.mode
    }

    pub fn worker_dispatches(&self) -> u64 {
        self.worker_dispatches.load(Ordering::Relaxed)
    }

    pub fn inline_runs(&self) -> u64 {
        self.inline_runs.load(Ordering::Relaxed)
    }
}

impl<C> TransformBridge<C>
where
    C: Clone + Send + Sync + 'static,
{
    /// Build a bridge. [`DispatchMode::Auto`] is resolved here, once.
    pub fn new(
        transform: Arc<dyn PageTransform<C>>,
        mode: DispatchMode,
        name_prefix: impl Into<String>,
    ) -> Self {
        let mode = mode.resolve();
        if mode == DispatchMode::Inline {
            debug!("Worker threads unavailable or disabled, transforms run inline");
        }
        Self {
            transform,
            mode,
            name_prefix: name_prefix.into(),
            worker_dispatches: AtomicU64::new(0),
            inline_runs: AtomicU64::new(0),
        }
    }

    /// Transform one page's raw buffer.
    ///
    /// `page_num` is only used for worker naming and error attribution.
    ///
    /// # Errors
    /// * [`ScanError::Cancelled`] — `signal` was set before or during the call
    /// * [`ScanError::Transform`] — the transform failed, panicked, or its
    ///   worker exited without replying
    pub async fn transform(
        &self,
        page_num: usize,
        buffer: Vec<u8>,
        config: &C,
        signal: Option<&CancellationSignal>,
    ) -> Result<Vec<u8>, ScanError> {
        if signal.is_some_and(CancellationSignal::is_cancelled) {
            return Err(ScanError::Cancelled);
        }
        match self.mode {
            DispatchMode::Inline => self.run_inline(page_num, buffer, config, signal),
            _ => self.run_worker(page_num, buffer, config, signal).await,
        }
    }

    fn run_inline(
        &self,
        page_num: usize,
        buffer: Vec<u8>,
        config: &C,
        signal: Option<&CancellationSignal>,
    ) -> Result<Vec<u8>, ScanError> {
        self.inline_runs.fetch_add(1, Ordering::Relaxed);
        let token: &dyn CancelToken = match signal {
            Some(signal) => signal,
            None => &NeverCancel,
        };
        let start = Instant::now();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.transform.apply(buffer, config, token)
        }));
        debug!("Page {}: inline transform took {:?}", page_num, start.elapsed());
        if token.is_cancelled() {
            return Err(ScanError::Cancelled);
        }
        match outcome {
            Ok(Ok(processed)) => Ok(processed),
            Ok(Err(fault)) => Err(ScanError::Transform {
                page: page_num,
                detail: fault.to_string(),
            }),
            Err(payload) => Err(ScanError::Transform {
                page: page_num,
                detail: panic_message(payload),
            }),
        }
    }

    async fn run_worker(
        &self,
        page_num: usize,
        buffer: Vec<u8>,
        config: &C,
        signal: Option<&CancellationSignal>,
    ) -> Result<Vec<u8>, ScanError> {
        let (to_worker, inbox) = mpsc::channel::<ToWorker<C>>();
        let (outbox, reply) = oneshot::channel::<FromWorker>();
        let name = format!("{}-p{}", self.name_prefix, page_num);

        let spawned = Worker::spawn(
            name,
            Arc::clone(&self.transform),
            signal.cloned(),
            inbox,
            outbox,
        );
        let mut worker = match spawned {
            Ok(worker) => worker,
            Err(e) => {
                warn!(
                    "Page {}: could not start worker ({}), falling back to inline transform",
                    page_num, e
                );
                return self.run_inline(page_num, buffer, config, signal);
            }
        };
        self.worker_dispatches.fetch_add(1, Ordering::Relaxed);
        debug!("Started worker {}", worker.name);

        let start = Instant::now();
        let message = ToWorker {
            buffer,
            config: config.clone(),
        };
        if to_worker.send(message).is_err() {
            worker.shutdown().await;
            return Err(ScanError::Transform {
                page: page_num,
                detail: "worker exited before receiving the page".into(),
            });
        }
        debug!("Sent page {} to worker {}", page_num, worker.name);

        let received = match signal {
            Some(signal) => tokio::select! {
                biased;
                _ = signal.cancelled() => {
                    debug!("Abort signal received, terminating worker {}", worker.name);
                    worker.shutdown().await;
                    return Err(ScanError::Cancelled);
                }
                received = reply => received,
            },
            None => reply.await,
        };
        worker.shutdown().await;

        match received {
            Ok(Ok(processed)) => {
                debug!(
                    "Page {}: got image from worker after {:?}",
                    page_num,
                    start.elapsed()
                );
                Ok(processed)
            }
            Ok(Err(detail)) => Err(ScanError::Transform {
                page: page_num,
                detail,
            }),
            Err(_) if signal.is_some_and(CancellationSignal::is_cancelled) => {
                Err(ScanError::Cancelled)
            }
            Err(_) => Err(ScanError::Transform {
                page: page_num,
                detail: "worker exited without a response".into(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct Invert;

    impl PageTransform<u8> for Invert {
        fn apply(
            &self,
            mut buffer: Vec<u8>,
            xor: &u8,
            _cancel: &dyn CancelToken,
        ) -> Result<Vec<u8>, TransformFault> {
            buffer.iter_mut().for_each(|b| *b ^= *xor);
            Ok(buffer)
        }
    }

    struct Failing;

    impl PageTransform<u8> for Failing {
        fn apply(&self, _: Vec<u8>, _: &u8, _: &dyn CancelToken) -> Result<Vec<u8>, TransformFault> {
            Err("unsupported colorspace".into())
        }
    }

    struct Panicking;

    impl PageTransform<u8> for Panicking {
        fn apply(&self, _: Vec<u8>, _: &u8, _: &dyn CancelToken) -> Result<Vec<u8>, TransformFault> {
            panic!("kernel exploded")
        }
    }

    /// Sleeps in short slices, polling the token, and counts how many times
    /// it ran to completion.
    struct Slow {
        delay: Duration,
        finished: Arc<AtomicUsize>,
    }

    impl PageTransform<u8> for Slow {
        fn apply(
            &self,
            buffer: Vec<u8>,
            _cfg: &u8,
            cancel: &dyn CancelToken,
        ) -> Result<Vec<u8>, TransformFault> {
            let deadline = Instant::now() + self.delay;
            while Instant::now() < deadline {
                if cancel.is_cancelled() {
                    return Err("interrupted".into());
                }
                std::thread::sleep(Duration::from_millis(2));
            }
            self.finished.fetch_add(1, Ordering::SeqCst);
            Ok(buffer)
        }
    }

    fn bridge<T: PageTransform<u8>>(t: T, mode: DispatchMode) -> TransformBridge<u8> {
        TransformBridge::new(Arc::new(t), mode, "test-worker")
    }

    #[tokio::test]
    async fn worker_and_inline_agree() {
        let worker = bridge(Invert, DispatchMode::Worker);
        let inline = bridge(Invert, DispatchMode::Inline);

        let a = worker.transform(1, vec![0x00, 0xff], &0xff, None).await.unwrap();
        let b = inline.transform(1, vec![0x00, 0xff], &0xff, None).await.unwrap();
        assert_eq!(a, vec![0xff, 0x00]);
        assert_eq!(a, b);

        assert_eq!(worker.worker_dispatches(), 1);
        assert_eq!(worker.inline_runs(), 0);
        assert_eq!(inline.worker_dispatches(), 0);
        assert_eq!(inline.inline_runs(), 1);
    }

    #[tokio::test]
    async fn transform_fault_is_not_cancellation() {
        for mode in [DispatchMode::Worker, DispatchMode::Inline] {
            let err = bridge(Failing, mode)
                .transform(4, vec![1], &0, None)
                .await
                .unwrap_err();
            assert!(!err.is_cancellation());
            assert!(
                matches!(err, ScanError::Transform { page: 4, ref detail } if detail.contains("colorspace")),
                "got: {err:?}"
            );
        }
    }

    #[tokio::test]
    async fn panics_surface_as_transform_errors() {
        for mode in [DispatchMode::Worker, DispatchMode::Inline] {
            let err = bridge(Panicking, mode)
                .transform(2, vec![1], &0, None)
                .await
                .unwrap_err();
            assert!(
                matches!(err, ScanError::Transform { ref detail, .. } if detail.contains("kernel exploded")),
                "got: {err:?}"
            );
        }
    }

    #[tokio::test]
    async fn already_cancelled_signal_skips_work() {
        let finished = Arc::new(AtomicUsize::new(0));
        let b = bridge(
            Slow {
                delay: Duration::from_millis(1),
                finished: Arc::clone(&finished),
            },
            DispatchMode::Worker,
        );
        let signal = CancellationSignal::new();
        signal.cancel();

        let err = b.transform(1, vec![1], &0, Some(&signal)).await.unwrap_err();
        assert!(err.is_cancellation());
        assert_eq!(b.worker_dispatches(), 0);
        assert_eq!(finished.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cancellation_terminates_in_flight_worker() {
        let finished = Arc::new(AtomicUsize::new(0));
        let b = bridge(
            Slow {
                delay: Duration::from_millis(300),
                finished: Arc::clone(&finished),
            },
            DispatchMode::Worker,
        );
        let signal = CancellationSignal::new();

        let canceller = {
            let s = signal.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(30)).await;
                s.cancel();
            })
        };

        let start = Instant::now();
        let err = b.transform(1, vec![1], &0, Some(&signal)).await.unwrap_err();
        canceller.await.unwrap();

        assert!(err.is_cancellation(), "got: {err:?}");
        assert!(
            start.elapsed() < Duration::from_millis(250),
            "call should not wait for the transform to finish"
        );
        assert_eq!(b.worker_dispatches(), 1);
        // The worker thread has been joined: nothing can finish later.
        assert_eq!(finished.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_millis(350)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn inline_transform_sees_the_signal() {
        let finished = Arc::new(AtomicUsize::new(0));
        let b = bridge(
            Slow {
                delay: Duration::from_millis(300),
                finished: Arc::clone(&finished),
            },
            DispatchMode::Inline,
        );
        let signal = CancellationSignal::new();
        let s = signal.clone();
        let canceller = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            s.cancel();
        });

        let err = b.transform(1, vec![1], &0, Some(&signal)).await.unwrap_err();
        canceller.join().unwrap();

        assert!(err.is_cancellation(), "got: {err:?}");
        assert_eq!(finished.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn closure_transforms() {
        let t = from_fn(|buf: Vec<u8>, n: &usize| Ok(buf.into_iter().take(*n).collect()));
        assert_eq!(t.apply(vec![1, 2, 3], &2, &NeverCancel).unwrap(), vec![1, 2]);
    }
}
