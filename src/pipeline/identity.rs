//! Job identity: a deterministic key for "this document under this config".
//!
//! The identity is the source identifier joined to the JSON serialisation of
//! the transform configuration. Equal inputs always produce equal keys, so a
//! [`crate::registry::JobRegistry`] can hand back an already-computed job
//! instead of scanning the same document twice.

use crate::error::ScanError;
use serde::Serialize;
use std::fmt;

/// Identity of a scan job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(String);

impl JobId {
    /// Derive the identity of `source_id` processed with `config`.
    ///
    /// Fails only if `config` cannot be serialised (e.g. a map with
    /// non-string keys).
    pub fn derive<C: Serialize + ?Sized>(source_id: &str, config: &C) -> Result<Self, ScanError> {
        let serialized = serde_json::to_string(config).map_err(|e| {
            ScanError::InvalidConfig(format!("transform configuration is not serialisable: {e}"))
        })?;
        Ok(Self(format!("{source_id}-{serialized}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
