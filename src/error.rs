//! Error types for the pdfscan library.
//!
//! Every failure of a scan surfaces as a [`ScanError`]. There is no
//! partial-success result: a single page that fails to render or transform
//! aborts the whole pipeline invocation, so the error that reaches the caller
//! is always the first one observed.
//!
//! Cancellation is a variant of its own ([`ScanError::Cancelled`]) and is
//! never folded into a processing error. Callers driving a UI can check
//! [`ScanError::is_cancellation`] to suppress error states when the user
//! aborted the job themselves.

use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the pdfscan library.
#[derive(Debug, Error)]
pub enum ScanError {
    // ── Cancellation ──────────────────────────────────────────────────────
    /// The job's cancellation signal fired before the operation completed.
    #[error("Scan was cancelled")]
    Cancelled,

    // ── Source errors ─────────────────────────────────────────────────────
    /// The document could not be opened at all (missing file, bad password).
    #[error("Document source '{source_id}' is unavailable: {detail}")]
    SourceUnavailable { source_id: String, detail: String },

    /// The document source could not report its page count.
    #[error("Failed to read page count: {detail}")]
    PageCount { detail: String },

    /// The document source failed to render a page.
    #[error("Rendering failed for page {page}: {detail}")]
    Render { page: usize, detail: String },

    /// Requested page number is outside `1..=total`.
    #[error("Page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    // ── Transform errors ──────────────────────────────────────────────────
    /// The worker or the inline fallback failed to transform a page.
    #[error("Transform failed for page {page}: {detail}")]
    Transform { page: usize, detail: String },

    // ── Assembly errors ───────────────────────────────────────────────────
    /// The document assembler could not build the output document.
    #[error("Document assembly failed: {detail}")]
    Assembly { detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output document file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Options or transform configuration failed validation.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ScanError {
    /// `true` when the error was caused by the cancellation signal rather
    /// than by a processing fault.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, ScanError::Cancelled)
    }

    /// The 1-indexed page the error is attributed to, if any.
    pub fn page(&self) -> Option<usize> {
        match self {
            ScanError::Render { page, .. }
            | ScanError::Transform { page, .. }
            | ScanError::PageOutOfRange { page, .. } => Some(*page),
            _ => None,
        }
    }
}
