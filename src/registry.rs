//! Identity-keyed reuse of scan jobs across requests.
//!
//! Callers that re-issue the same logical request (same document, same
//! transform configuration) should get the job that already holds the
//! cached pages and document instead of a fresh one. [`JobRegistry`] keys
//! jobs by [`JobId`] and hands back the existing job whenever the identity
//! matches, unless that job was cancelled, in which case it is replaced.
//!
//! The registry does not own its jobs. It keeps weak handles, so a job and
//! its caches are freed once the last caller drops it.

use crate::cancel::CancellationSignal;
use crate::config::ScanOptions;
use crate::error::ScanError;
use crate::job::ScanJob;
use crate::pipeline::identity::JobId;
use crate::pipeline::worker::PageTransform;
use crate::source::{DocumentAssembler, DocumentSource};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tracing::debug;

/// A map from job identity to live scan jobs.
pub struct JobRegistry<C> {
    jobs: Mutex<HashMap<JobId, Weak<ScanJob<C>>>>,
    options: ScanOptions,
}

impl<C> JobRegistry<C>
where
    C: Serialize + Clone + Send + Sync + 'static,
{
    /// Registry whose new jobs are built with `options`.
    pub fn new(options: ScanOptions) -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            options,
        }
    }

    /// Return the live job for `(source, config)`, creating it if needed.
    ///
    /// An existing job is reused only if it is not cancelled and `signal` is
    /// either `None` or the job's own signal. A caller with a different
    /// signal gets a fresh job observing that signal, which then becomes the
    /// registered job for the identity; holders of the previous job keep it.
    ///
    /// On reuse, `source`, `assembler` and `transform` are ignored: the job
    /// keeps the collaborators of the caller that created it. Equal identity
    /// means equal output, given a pure transform.
    pub fn get_or_create(
        &self,
        source: Arc<dyn DocumentSource>,
        assembler: Arc<dyn DocumentAssembler>,
        transform: Arc<dyn PageTransform<C>>,
        config: &C,
        signal: Option<CancellationSignal>,
    ) -> Result<Arc<ScanJob<C>>, ScanError> {
        let id = JobId::derive(source.source_id(), config)?;
        let mut jobs = self.lock();
        jobs.retain(|_, job| job.strong_count() > 0);

        if let Some(existing) = jobs.get(&id).and_then(Weak::upgrade) {
            let same_signal = signal
                .as_ref()
                .is_none_or(|s| s.same_as(existing.signal()));
            if existing.is_cancelled() {
                debug!("Replacing cancelled scan job {}", id);
            } else if !same_signal {
                debug!("Caller brought its own signal, not reusing scan job {}", id);
            } else {
                debug!("Reusing scan job {}", id);
                return Ok(existing);
            }
        }

        let mut builder =
            ScanJob::builder(source, assembler, transform, config).options(self.options.clone());
        if let Some(signal) = signal {
            builder = builder.signal(signal);
        }
        let job = Arc::new(builder.build()?);
        jobs.insert(id, Arc::downgrade(&job));
        Ok(job)
    }

    /// The registered job for `id`, if some caller still holds it.
    pub fn get(&self, id: &JobId) -> Option<Arc<ScanJob<C>>> {
        self.lock().get(id).and_then(Weak::upgrade)
    }

    /// Forget a job. Callers still holding it keep a working job.
    pub fn remove(&self, id: &JobId) -> Option<Arc<ScanJob<C>>> {
        self.lock().remove(id).and_then(|job| job.upgrade())
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Number of registered jobs still held by some caller.
    pub fn len(&self) -> usize {
        self.lock()
            .values()
            .filter(|job| job.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<JobId, Weak<ScanJob<C>>>> {
        self.jobs.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl<C> Default for JobRegistry<C>
where
    C: Serialize + Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(ScanOptions::default())
    }
}
