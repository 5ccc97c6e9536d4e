//! Storage configuration.

/// Default number of pages kept in the buffer pool.
pub const DEFAULT_POOL_SIZE: usize = 64;

/// Settings used when opening a page file through the buffer manager.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Maximum number of pages cached in memory.
    pub pool_size: usize,
    /// Whether every page write is synced to disk before returning.
    pub sync_on_write: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            pool_size: DEFAULT_POOL_SIZE,
            sync_on_write: true,
        }
    }
}
