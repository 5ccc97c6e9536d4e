//! Page storage for eagledb.
//!
//! A page file is a sequence of fixed-size (16KB) pages:
//!
//! - **Page 0**: header with the `EAGL` signature and the page count
//! - **Pages 1, 2**: reserved catalog pages, formatted as slotted pages
//! - **Page 3**: the free-page stack
//! - **Pages 4..**: slotted data pages holding encoded records
//!
//! [`PageFile`] does the raw I/O, [`BufferManager`] caches pages in memory
//! with LRU replacement, and [`SlottedPage`] and [`record`] interpret page
//! contents.

pub mod buffer;
pub mod config;
pub mod disk;
pub mod error;
pub mod page;
pub mod record;

pub use buffer::BufferManager;
pub use config::StorageConfig;
pub use disk::{PageFile, PAGE_SIZE};
pub use error::{StorageError, StorageResult};
pub use page::{ModifyOutcome, PageBuf, PageId, Rid, SlottedPage};
