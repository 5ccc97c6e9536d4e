pub mod lru;
pub mod replacer;

use crate::storage::config::StorageConfig;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::{PageBuf, PageId};
use crate::storage::{PageFile, PAGE_SIZE};
use log::{debug, info, warn};
use lru::LruReplacer;
use replacer::Replacer;
use std::collections::BTreeMap;
use std::path::Path;

/// A cached page and its dirty bit.
struct BufferDescriptor {
    data: Box<PageBuf>,
    dirty: bool,
}

/// Bounded page cache with LRU replacement and write-back on eviction.
///
/// Pages handed out by [`read`](BufferManager::read) borrow the manager
/// mutably, so a page reference can never be held across another call that
/// might evict it.
pub struct BufferManager {
    page_file: PageFile,
    replacer: Box<dyn Replacer>,
    pool: BTreeMap<PageId, BufferDescriptor>,
    capacity: usize,
    num_dirty: usize,
    initialized: bool,
}

impl BufferManager {
    /// Create an uninitialized manager over `page_file`.
    pub fn new(page_file: PageFile, replacer: Box<dyn Replacer>) -> Self {
        Self {
            page_file,
            replacer,
            pool: BTreeMap::new(),
            capacity: 0,
            num_dirty: 0,
            initialized: false,
        }
    }

    /// Open an existing page file with an LRU pool of `config.pool_size` pages.
    pub fn open(path: &Path, config: &StorageConfig) -> StorageResult<Self> {
        let mut page_file = PageFile::open(path)?;
        page_file.set_sync_on_write(config.sync_on_write);
        let mut buffer = Self::new(page_file, Box::new(LruReplacer::new()));
        buffer.initialize(config.pool_size)?;
        Ok(buffer)
    }

    pub fn initialize(&mut self, capacity: usize) -> StorageResult<()> {
        // Dirty pages must be written back before the pool is reset
        if self.num_dirty != 0 {
            return Err(StorageError::DirtyPagesOutstanding(self.num_dirty));
        }
        if capacity == 0 {
            return Err(StorageError::InvalidPoolSize);
        }

        self.pool.clear();
        self.replacer.clear();
        self.capacity = capacity;
        self.initialized = true;
        info!("buffer pool initialized with {} pages", capacity);
        Ok(())
    }

    /// Return the cached image of `page_id`, loading it from disk if needed.
    pub fn read(&mut self, page_id: PageId) -> StorageResult<&mut PageBuf> {
        if !self.initialized {
            return Err(StorageError::BufferNotInitialized);
        }

        if !self.pool.contains_key(&page_id) {
            self.fault_in(page_id)?;
        }
        self.replacer.record_access(page_id);
        debug_assert_eq!(self.replacer.size(), self.pool.len());

        let descriptor = self
            .pool
            .get_mut(&page_id)
            .ok_or(StorageError::PageNotCached(page_id))?;
        Ok(&mut *descriptor.data)
    }

    /// Mark a cached page as modified. The page is written back on flush or
    /// eviction.
    pub fn write(&mut self, page_id: PageId) -> StorageResult<()> {
        let descriptor = self
            .pool
            .get_mut(&page_id)
            .ok_or(StorageError::PageNotCached(page_id))?;

        if !descriptor.dirty {
            descriptor.dirty = true;
            self.num_dirty += 1;
        }
        self.replacer.record_access(page_id);
        Ok(())
    }

    /// Write a cached page back to disk if it is dirty.
    pub fn flush(&mut self, page_id: PageId) -> StorageResult<()> {
        let descriptor = self
            .pool
            .get_mut(&page_id)
            .ok_or(StorageError::PageNotCached(page_id))?;

        if descriptor.dirty {
            self.page_file.write_page(page_id, &descriptor.data)?;
            descriptor.dirty = false;
            self.num_dirty -= 1;
            debug!("flushed page {}", page_id);
        }
        Ok(())
    }

    /// Write back every dirty page, in page id order.
    pub fn flush_all(&mut self) -> StorageResult<()> {
        for (&page_id, descriptor) in self.pool.iter_mut() {
            if descriptor.dirty {
                self.page_file.write_page(page_id, &descriptor.data)?;
                descriptor.dirty = false;
                self.num_dirty -= 1;
            }
        }
        debug!("flushed all dirty pages");
        Ok(())
    }

    /// Flush everything and drop the cache.
    pub fn shutdown(&mut self) -> StorageResult<()> {
        self.flush_all()?;
        self.pool.clear();
        self.replacer.clear();
        self.initialized = false;
        info!("buffer pool shut down");
        Ok(())
    }

    pub fn full(&self) -> bool {
        self.pool.len() == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of cached pages.
    pub fn len(&self) -> usize {
        self.pool.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }

    pub fn num_dirty(&self) -> usize {
        self.num_dirty
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn is_cached(&self, page_id: PageId) -> bool {
        self.pool.contains_key(&page_id)
    }

    pub fn is_dirty(&self, page_id: PageId) -> bool {
        self.pool.get(&page_id).is_some_and(|d| d.dirty)
    }

    /// Cached pages, most recently used first.
    pub fn lru_order(&self) -> Vec<PageId> {
        self.replacer.order()
    }

    pub fn page_file(&self) -> &PageFile {
        &self.page_file
    }

    fn fault_in(&mut self, page_id: PageId) -> StorageResult<()> {
        // Reject bad ids before anything is evicted for them
        let page_count = self.page_file.page_count();
        if page_id.0 >= page_count {
            return Err(StorageError::PageOutOfRange {
                page_id,
                page_count,
            });
        }

        let mut data = if self.pool.len() >= self.capacity {
            self.evict()?
        } else {
            Box::new([0u8; PAGE_SIZE])
        };
        self.page_file.read_page(page_id, &mut data)?;
        self.pool.insert(page_id, BufferDescriptor { data, dirty: false });
        Ok(())
    }

    /// Remove the least recently used page, writing it back first if dirty,
    /// and hand its buffer over for reuse.
    fn evict(&mut self) -> StorageResult<Box<PageBuf>> {
        let victim = self
            .replacer
            .victim()
            .ok_or(StorageError::NoEvictionCandidate)?;
        self.flush(victim)?;

        self.replacer.remove(victim);
        let descriptor = self
            .pool
            .remove(&victim)
            .ok_or(StorageError::PageNotCached(victim))?;
        debug!("evicted page {}", victim);
        Ok(descriptor.data)
    }
}

impl Drop for BufferManager {
    fn drop(&mut self) {
        if self.num_dirty > 0 {
            warn!(
                "buffer pool dropped with {} dirty pages not written back",
                self.num_dirty
            );
        }
    }
}
