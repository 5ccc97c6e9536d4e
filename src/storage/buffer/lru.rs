use super::replacer::Replacer;
use crate::storage::page::PageId;
use std::collections::{HashMap, VecDeque};

#[derive(Debug, Default)]
pub struct LruReplacer {
    /// Queue of cached pages (least recently used at front)
    lru_list: VecDeque<PageId>,
    /// Map to track position in LRU list for O(1) lookup
    page_map: HashMap<PageId, usize>,
}

impl LruReplacer {
    pub fn new() -> Self {
        Self::default()
    }

    fn update_indices(&mut self) {
        // Update all indices in the map after modification
        for (idx, &page_id) in self.lru_list.iter().enumerate() {
            self.page_map.insert(page_id, idx);
        }
    }

    fn unlink(&mut self, page_id: PageId) -> bool {
        match self.page_map.remove(&page_id) {
            Some(idx) => {
                self.lru_list.remove(idx);
                self.update_indices();
                true
            }
            None => false,
        }
    }
}

impl Replacer for LruReplacer {
    fn record_access(&mut self, page_id: PageId) {
        if self.lru_list.back() == Some(&page_id) {
            return;
        }
        self.unlink(page_id);
        self.lru_list.push_back(page_id);
        self.page_map.insert(page_id, self.lru_list.len() - 1);
    }

    fn victim(&self) -> Option<PageId> {
        self.lru_list.front().copied()
    }

    fn remove(&mut self, page_id: PageId) {
        self.unlink(page_id);
    }

    fn clear(&mut self) {
        self.lru_list.clear();
        self.page_map.clear();
    }

    fn size(&self) -> usize {
        self.lru_list.len()
    }

    fn order(&self) -> Vec<PageId> {
        self.lru_list.iter().rev().copied().collect()
    }
}
