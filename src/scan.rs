//! One-shot entry points.
//!
//! These build a throwaway [`ScanJob`] (or reuse the caller's) and return
//! the assembled document. Use [`ScanJob`] directly when you need per-page
//! access, progress callbacks or cross-request caching.

use crate::config::ScanOptions;
use crate::error::ScanError;
use crate::job::ScanJob;
use crate::output::{Document, ScanStats};
use crate::pipeline::worker::PageTransform;
use crate::progress::ProgressCallback;
use crate::source::{DocumentAssembler, DocumentSource};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Scan a document and return the assembled output.
///
/// Runs with `options.max_concurrency` pages in flight.
pub async fn scan<C>(
    source: Arc<dyn DocumentSource>,
    assembler: Arc<dyn DocumentAssembler>,
    transform: Arc<dyn PageTransform<C>>,
    config: &C,
    options: &ScanOptions,
) -> Result<Arc<Document>, ScanError>
where
    C: Serialize + Clone + Send + Sync + 'static,
{
    let job = ScanJob::builder(source, assembler, transform, config)
        .options(options.clone())
        .build()?;
    job.produce_document(None, options.max_concurrency).await
}

/// Synchronous wrapper around [`scan`].
///
/// Creates a temporary tokio runtime internally; do not call it from
/// inside an async context.
pub fn scan_sync<C>(
    source: Arc<dyn DocumentSource>,
    assembler: Arc<dyn DocumentAssembler>,
    transform: Arc<dyn PageTransform<C>>,
    config: &C,
    options: &ScanOptions,
) -> Result<Arc<Document>, ScanError>
where
    C: Serialize + Clone + Send + Sync + 'static,
{
    tokio::runtime::Runtime::new()
        .map_err(|e| ScanError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(scan(source, assembler, transform, config, options))
}

/// Produce `job`'s document and write it to `output_path`.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub async fn scan_to_file<C>(
    job: &ScanJob<C>,
    output_path: impl AsRef<Path>,
    progress: Option<ProgressCallback>,
) -> Result<ScanStats, ScanError>
where
    C: Serialize + Clone + Send + Sync + 'static,
{
    let document = job
        .produce_document(progress, job.options().max_concurrency)
        .await?;
    let path = output_path.as_ref();
    let write_err = |source| ScanError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }
    }

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = Path::new(&tmp_name);
    tokio::fs::write(tmp_path, document.as_bytes())
        .await
        .map_err(write_err)?;
    tokio::fs::rename(tmp_path, path).await.map_err(write_err)?;

    info!("Wrote {} bytes to {}", document.len(), path.display());
    Ok(job.stats())
}
