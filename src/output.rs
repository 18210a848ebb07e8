//! Values flowing through the scan pipeline.
//!
//! Image and document payloads are held in `Arc<[u8]>` so that cache hits,
//! replays and clones hand out the same bytes without copying them.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A page as produced by a [`crate::source::DocumentSource`], before the
/// transform runs.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedPage {
    /// Encoded raster image (PNG as produced by the bundled sources).
    pub data: Vec<u8>,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Effective rendering resolution in dots per inch.
    pub dpi: f32,
}

/// Processed image bytes for one page, tagged with their mime type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageImage {
    pub data: Arc<[u8]>,
    pub mime_type: String,
}

impl PageImage {
    pub fn new(data: impl Into<Arc<[u8]>>, mime_type: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            mime_type: mime_type.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// `true` when both images share the same allocation.
    pub fn ptr_eq(&self, other: &PageImage) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

/// The composed result of one page task, handed to the assembler.
#[derive(Debug, Clone, PartialEq)]
pub struct ScannedPage {
    /// 1-indexed page number.
    pub page_num: usize,
    pub image: PageImage,
    pub width: u32,
    pub height: u32,
    pub dpi: f32,
}

/// The final assembled output document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub data: Arc<[u8]>,
    pub mime_type: String,
}

impl Document {
    pub fn new(data: impl Into<Arc<[u8]>>, mime_type: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            mime_type: mime_type.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

/// Diagnostic counters for one job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStats {
    /// Page lookups served from the page cache.
    pub cache_hits: u64,
    /// Page lookups that had to render and transform.
    pub cache_misses: u64,
    /// Transforms dispatched to a dedicated worker thread.
    pub worker_dispatches: u64,
    /// Transforms executed inline on the calling task.
    pub inline_transforms: u64,
    /// Times the assembler was invoked.
    pub assemblies: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_image_clones_share_bytes() {
        let img = PageImage::new(vec![1u8, 2, 3], "image/png");
        let copy = img.clone();
        assert!(img.ptr_eq(&copy));
        assert_eq!(copy.as_bytes(), &[1, 2, 3]);
        assert_eq!(copy.len(), 3);

        let other = PageImage::new(vec![1u8, 2, 3], "image/png");
        assert_eq!(img, other);
        assert!(!img.ptr_eq(&other));
    }

    #[test]
    fn stats_serialise() {
        let stats = ScanStats {
            cache_hits: 2,
            cache_misses: 3,
            ..Default::default()
        };
        let json = serde_json::to_string(&stats).unwrap();
        assert!(json.contains("\"cache_hits\":2"));
    }
}
