//! Cooperative cancellation shared by every task of a scan.
//!
//! A [`CancellationSignal`] is a cheap, clonable handle to one shared flag.
//! It can be set exactly once and observed any number of times, either by
//! polling [`CancellationSignal::is_cancelled`] or by awaiting
//! [`CancellationSignal::cancelled`]. All clones observe the same flag, so
//! the caller keeps one clone to abort with and hands the others to the job.
//!
//! [`CancellationSignal::child`] derives a signal that also fires when its
//! parent does, without being able to cancel the parent. A scan run uses one
//! to stop its own page tasks on the first failure while leaving the job's
//! signal untouched.
//!
//! Long-running transforms see cancellation through the [`CancelToken`]
//! trait and are expected to poll it between units of work.

use futures::future::select_all;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

/// Cancellation hook polled inside long-running work.
pub trait CancelToken: Send + Sync {
    fn is_cancelled(&self) -> bool;
}

/// Token that never fires.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverCancel;

impl CancelToken for NeverCancel {
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// A set-once cancellation flag shared across page tasks and workers.
#[derive(Debug, Clone)]
pub struct CancellationSignal {
    // Own flag first, then every ancestor's.
    chain: Vec<Arc<watch::Sender<bool>>>,
}

impl CancellationSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            chain: vec![Arc::new(tx)],
        }
    }

    /// A new signal that is cancelled when either it or `self` is.
    ///
    /// Cancelling the child never affects `self`.
    pub fn child(&self) -> Self {
        let (tx, _rx) = watch::channel(false);
        let mut chain = Vec::with_capacity(self.chain.len() + 1);
        chain.push(Arc::new(tx));
        chain.extend(self.chain.iter().cloned());
        Self { chain }
    }

    /// Set the flag. Returns `true` for the call that actually flipped it;
    /// subsequent calls are no-ops and return `false`.
    pub fn cancel(&self) -> bool {
        let flipped = self.chain[0].send_if_modified(|aborted| {
            if *aborted {
                false
            } else {
                *aborted = true;
                true
            }
        });
        if flipped {
            debug!("Cancellation signal raised");
        }
        flipped
    }

    pub fn is_cancelled(&self) -> bool {
        self.chain.iter().any(|tx| *tx.borrow())
    }

    /// Resolve once the flag (or an ancestor's) is set. Resolves
    /// immediately if it already is.
    pub async fn cancelled(&self) {
        let mut receivers: Vec<_> = self.chain.iter().map(|tx| tx.subscribe()).collect();
        // Every sender lives as long as `self`, so `wait_for` cannot observe
        // a closed channel here.
        let waits = receivers
            .iter_mut()
            .map(|rx| Box::pin(rx.wait_for(|aborted| *aborted)));
        let _ = select_all(waits).await;
    }

    /// `true` when both handles share the same underlying flag.
    pub fn same_as(&self, other: &CancellationSignal) -> bool {
        Arc::ptr_eq(&self.chain[0], &other.chain[0])
    }
}

impl Default for CancellationSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken for CancellationSignal {
    fn is_cancelled(&self) -> bool {
        CancellationSignal::is_cancelled(self)
    }
}
