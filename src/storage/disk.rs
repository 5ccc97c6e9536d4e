//! Page file: fixed-size pages at fixed offsets in a single file.

pub mod page_file;

pub use page_file::{PageFile, PAGE_SIZE, SIGNATURE};
