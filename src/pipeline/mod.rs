//! Building blocks of the scan pipeline.
//!
//! ## Data Flow
//!
//! ```text
//! source ──▶ cache? ──▶ worker ──▶ cache ──▶ assembler
//! (render)   (hit)      (transform)  (store)
//! ```
//!
//! 1. [`identity`] — derive the job key from source id + transform config
//! 2. [`cache`]    — per-job memo of processed pages
//! 3. [`worker`]   — run the transform on a per-call worker thread, or inline
//! 4. [`encode`]   — PNG helpers shared by the bundled sources
//! 5. [`images`]   — in-memory image sequence source
//! 6. [`render`]   — pdfium-backed source (feature `pdfium`)

pub mod cache;
pub mod encode;
pub mod identity;
pub mod images;
#[cfg(feature = "pdfium")]
pub mod render;
pub mod worker;
