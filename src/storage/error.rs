//! Storage layer error types.

use crate::storage::page::PageId;
use crate::storage::record::FieldType;
use thiserror::Error;

/// Errors that can occur in the storage layer.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Invalid page count {count}: pages 0-3 are reserved, need more than 4")]
    InvalidPageCount { count: u16 },

    #[error("Page is full: requires {required} bytes but only {available} available")]
    PageFull { required: usize, available: usize },

    #[error("Slot {slot_id} has been deleted")]
    SlotTombstoned { slot_id: u16 },

    #[error("Invalid slot ID: {slot_id} (directory size: {dir_size})")]
    SlotOutOfRange { slot_id: u16, dir_size: u16 },

    #[error("String field of {len} bytes does not fit in a field tag")]
    FieldTooLarge { len: usize },

    #[error("Record of {len} bytes exceeds the maximum record length")]
    RecordTooLarge { len: usize },

    #[error("Type mismatch: expected {expected}, found tag {found}")]
    TypeMismatch { expected: FieldType, found: u16 },

    #[error("Unknown field tag {tag} at offset {offset}")]
    UnknownFieldTag { tag: u16, offset: usize },

    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    #[error("Page {0} is not in the buffer pool")]
    PageNotCached(PageId),

    #[error("Buffer pool still has {0} dirty pages that were not written back")]
    DirtyPagesOutstanding(usize),

    #[error("Buffer pool is not initialized")]
    BufferNotInitialized,

    #[error("Buffer pool size must be at least 1")]
    InvalidPoolSize,

    #[error("Buffer pool is full and has no page to evict")]
    NoEvictionCandidate,

    #[error("No free pages available")]
    NoFreePages,

    #[error("Free page list is full")]
    FreeListFull,

    #[error("Page {page_id} is out of range (page count: {page_count})")]
    PageOutOfRange { page_id: PageId, page_count: u16 },

    #[error("Page file holds {len} bytes, too short for {page_count} pages")]
    FileTooShort { page_count: u16, len: u64 },

    #[error("Corrupt page: directory of {dir_size} slots and {free_bytes} free bytes exceed the page")]
    CorruptPage { dir_size: u16, free_bytes: u16 },

    #[error("Invalid page file signature: {0:?}")]
    InvalidSignature([u8; 4]),

    #[error("Cannot seek to page {page_id}: {source}")]
    Seek {
        page_id: PageId,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
