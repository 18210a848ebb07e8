//! Per-job memo of processed pages.
//!
//! One entry per 1-indexed page number, written at most once and never
//! evicted while the job lives. The lock is held only for the map access
//! itself, never across an await, so concurrent page tasks do not serialise
//! on it. Two tasks missing the same page at the same time both compute it;
//! the first insert wins and later ones are dropped.

use crate::output::PageImage;
use std::collections::HashMap;
use std::sync::Mutex;

/// A processed page plus the render metadata it came with.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedPage {
    pub image: PageImage,
    pub width: u32,
    pub height: u32,
    pub dpi: f32,
}

#[derive(Debug, Default)]
pub struct PageCache {
    entries: Mutex<HashMap<usize, CachedPage>>,
}

impl PageCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, page_num: usize) -> Option<CachedPage> {
        self.lock().get(&page_num).cloned()
    }

    /// Insert `page` unless an entry already exists; returns the entry that
    /// ends up cached so every caller observes the same bytes.
    pub fn insert(&self, page_num: usize, page: CachedPage) -> CachedPage {
        self.lock().entry(page_num).or_insert(page).clone()
    }

    pub fn contains(&self, page_num: usize) -> bool {
        self.lock().contains_key(&page_num)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<usize, CachedPage>> {
        // A panic while holding the guard cannot leave the map half-written
        // (every operation is a single call), so recover from poisoning.
        self.entries.lock().unwrap_or_else(|p| p.into_inner())
    }
}
