//! Options controlling how a scan job schedules and dispatches its work.
//!
//! The transform configuration itself (what the pixel transform does) is an
//! opaque, caller-defined value; see [`crate::job::ScanJob::new`]. The
//! [`ScanOptions`] here only cover orchestration: how many pages run at once,
//! where the transform runs, and how processed images are labelled.
//!
//! Build options through [`ScanOptions::builder()`] or start from
//! [`ScanOptions::default()`].

use crate::error::ScanError;
use serde::{Deserialize, Serialize};

/// Concurrency used when a caller passes no cap at all.
///
/// Effectively "as many pages as the hardware allows" once clamped by
/// available parallelism.
pub const UNBOUNDED_CONCURRENCY: usize = 1024;

/// Default per-job concurrency cap on desktop-class machines.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Concurrency cap for memory- or battery-constrained devices.
pub const CONSTRAINED_CONCURRENCY: usize = 2;

/// Default mime type stamped on processed page images.
pub const DEFAULT_IMAGE_MIME_TYPE: &str = "image/png";

/// Options for a [`crate::job::ScanJob`].
///
/// # Example
/// ```rust
/// use pdfscan::{DispatchMode, ScanOptions};
///
/// let options = ScanOptions::builder()
///     .max_concurrency(2)
///     .dispatch(DispatchMode::Inline)
///     .build()
///     .unwrap();
/// assert_eq!(options.max_concurrency, Some(2));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanOptions {
    /// Concurrency cap used by [`crate::job::ScanJob::prefetch`] and the
    /// one-shot [`crate::scan::scan`] helpers. Default: `Some(4)`.
    ///
    /// `None` means "no cap beyond hardware parallelism". The effective
    /// concurrency is always `min(available_parallelism, cap)`. Explicit
    /// calls to [`crate::job::ScanJob::produce_document`] pass their own cap.
    pub max_concurrency: Option<usize>,

    /// Override for the number of hardware threads. Default: `None`, which
    /// asks [`std::thread::available_parallelism`].
    ///
    /// Tests inject a fixed value here so the concurrency clamp does not
    /// depend on the machine running them.
    pub available_parallelism: Option<usize>,

    /// Where page transforms execute. Default: [`DispatchMode::Auto`].
    pub dispatch: DispatchMode,

    /// Mime type attached to processed page images. Default: `image/png`.
    pub image_mime_type: String,

    /// Thread-name prefix for transform workers. Default: `pdfscan-worker`.
    pub worker_name_prefix: String,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            max_concurrency: Some(DEFAULT_CONCURRENCY),
            available_parallelism: None,
            dispatch: DispatchMode::default(),
            image_mime_type: DEFAULT_IMAGE_MIME_TYPE.to_string(),
            worker_name_prefix: "pdfscan-worker".to_string(),
        }
    }
}

impl ScanOptions {
    /// Create a new builder for `ScanOptions`.
    pub fn builder() -> ScanOptionsBuilder {
        ScanOptionsBuilder {
            options: Self::default(),
        }
    }

    /// Options tuned for constrained devices (phones, small containers).
    pub fn constrained() -> Self {
        Self {
            max_concurrency: Some(CONSTRAINED_CONCURRENCY),
            ..Self::default()
        }
    }

    /// Hardware parallelism, honouring the injected override.
    pub fn parallelism(&self) -> usize {
        self.available_parallelism.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }

    /// Clamp a caller-supplied cap against hardware parallelism.
    ///
    /// `None` falls back to [`UNBOUNDED_CONCURRENCY`]. The result is never 0.
    pub fn effective_concurrency(&self, cap: Option<usize>) -> usize {
        resolve_concurrency(self.parallelism(), cap)
    }
}

/// `min(parallelism, cap ?? UNBOUNDED_CONCURRENCY)`, at least 1.
pub fn resolve_concurrency(parallelism: usize, cap: Option<usize>) -> usize {
    parallelism
        .min(cap.unwrap_or(UNBOUNDED_CONCURRENCY))
        .max(1)
}

/// Builder for [`ScanOptions`].
#[derive(Debug)]
pub struct ScanOptionsBuilder {
    options: ScanOptions,
}

impl ScanOptionsBuilder {
    pub fn max_concurrency(mut self, n: usize) -> Self {
        self.options.max_concurrency = Some(n);
        self
    }

    pub fn unbounded(mut self) -> Self {
        self.options.max_concurrency = None;
        self
    }

    pub fn available_parallelism(mut self, n: usize) -> Self {
        self.options.available_parallelism = Some(n);
        self
    }

    pub fn dispatch(mut self, mode: DispatchMode) -> Self {
        self.options.dispatch = mode;
        self
    }

    pub fn image_mime_type(mut self, mime: impl Into<String>) -> Self {
        self.options.image_mime_type = mime.into();
        self
    }

    pub fn worker_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.options.worker_name_prefix = prefix.into();
        self
    }

    /// Build the options, validating constraints.
    pub fn build(self) -> Result<ScanOptions, ScanError> {
        let o = &self.options;
        if o.max_concurrency == Some(0) {
            return Err(ScanError::InvalidConfig(
                "max_concurrency must be ≥ 1".into(),
            ));
        }
        if o.available_parallelism == Some(0) {
            return Err(ScanError::InvalidConfig(
                "available_parallelism must be ≥ 1".into(),
            ));
        }
        if o.image_mime_type.trim().is_empty() {
            return Err(ScanError::InvalidConfig(
                "image_mime_type must not be empty".into(),
            ));
        }
        Ok(self.options)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Where a page transform runs.
///
/// Both strategies implement the same contract; they differ only in
/// isolation and in how cancellation takes effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DispatchMode {
    /// Worker threads when the target supports them, inline otherwise. (default)
    #[default]
    Auto,
    /// Always run each transform on its own dedicated worker thread.
    Worker,
    /// Run the transform synchronously on the calling task.
    Inline,
}

impl DispatchMode {
    /// Resolve [`DispatchMode::Auto`] against the current target.
    pub fn resolve(self) -> DispatchMode {
        match self {
            DispatchMode::Auto if threads_available() => DispatchMode::Worker,
            DispatchMode::Auto => DispatchMode::Inline,
            other => other,
        }
    }
}

fn threads_available() -> bool {
    !cfg!(all(target_family = "wasm", not(target_feature = "atomics")))
}
