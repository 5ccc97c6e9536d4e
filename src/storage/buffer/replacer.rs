use crate::storage::page::PageId;
use std::fmt::Debug;

/// Page replacement policy for the buffer pool.
pub trait Replacer: Debug {
    /// Record that a cached page was touched, making it the most recently used.
    fn record_access(&mut self, page_id: PageId);

    /// Page that should be evicted next, without forgetting it.
    /// Returns None if nothing is tracked.
    fn victim(&self) -> Option<PageId>;

    /// Stop tracking a page.
    fn remove(&mut self, page_id: PageId);

    /// Forget every page.
    fn clear(&mut self);

    /// Get the number of tracked pages.
    fn size(&self) -> usize;

    /// Tracked pages, most recently used first.
    fn order(&self) -> Vec<PageId>;
}
