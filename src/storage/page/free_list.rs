//! Free-page stack.
//!
//! Page 3 of every page file is a LIFO stack of unallocated page ids:
//!
//! ```text
//! | size: u16 | id[0] | id[1] | ... | id[size - 1] (top) | unused ... |
//! ```
//!
//! The stack page is accessed through the buffer manager like any other page
//! so that it takes part in caching and write-back.

use crate::storage::buffer::BufferManager;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::{PageBuf, PageId};
use crate::storage::PAGE_SIZE;
use byteorder::{ByteOrder, LittleEndian};
use log::debug;

const SIZE_OFFSET: usize = 0;
const ENTRIES_OFFSET: usize = 2;
const ENTRY_SIZE: usize = 2;

/// Maximum number of page ids the stack page can hold.
pub const FREE_LIST_CAPACITY: usize = PAGE_SIZE / ENTRY_SIZE - 1;

pub struct FreePageStack<'a> {
    data: &'a mut PageBuf,
}

impl<'a> FreePageStack<'a> {
    /// Format the stack for a fresh file of `page_count` pages. Every data
    /// page is free and the lowest id sits on top.
    pub fn init(data: &'a mut PageBuf, page_count: u16) -> StorageResult<Self> {
        data.fill(0);
        let mut stack = Self { data };
        for page_id in (PageId::FIRST_DATA.0..page_count).rev() {
            stack.push(PageId(page_id))?;
        }
        Ok(stack)
    }

    pub fn from_data(data: &'a mut PageBuf) -> Self {
        Self { data }
    }

    pub fn len(&self) -> usize {
        LittleEndian::read_u16(&self.data[SIZE_OFFSET..]) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Next page id `pop` would return.
    pub fn peek(&self) -> Option<PageId> {
        self.len().checked_sub(1).map(|top| self.entry(top))
    }

    pub fn pop(&mut self) -> Option<PageId> {
        let top = self.len().checked_sub(1)?;
        let page_id = self.entry(top);
        self.set_len(top);
        Some(page_id)
    }

    pub fn push(&mut self, page_id: PageId) -> StorageResult<()> {
        let len = self.len();
        if len >= FREE_LIST_CAPACITY {
            return Err(StorageError::FreeListFull);
        }
        let pos = ENTRIES_OFFSET + len * ENTRY_SIZE;
        LittleEndian::write_u16(&mut self.data[pos..], page_id.0);
        self.set_len(len + 1);
        Ok(())
    }

    /// Free page ids from the top of the stack down.
    pub fn iter(&self) -> impl Iterator<Item = PageId> + '_ {
        (0..self.len()).rev().map(move |idx| self.entry(idx))
    }

    fn entry(&self, idx: usize) -> PageId {
        PageId(LittleEndian::read_u16(
            &self.data[ENTRIES_OFFSET + idx * ENTRY_SIZE..],
        ))
    }

    fn set_len(&mut self, len: usize) {
        LittleEndian::write_u16(&mut self.data[SIZE_OFFSET..], len as u16);
    }
}

/// Take a page id off the free-page stack.
pub fn pop_free_page(buffer: &mut BufferManager) -> StorageResult<PageId> {
    let data = buffer.read(PageId::FREE_LIST)?;
    let page_id = FreePageStack::from_data(data)
        .pop()
        .ok_or(StorageError::NoFreePages)?;
    buffer.write(PageId::FREE_LIST)?;
    debug!("allocated free page {}", page_id);
    Ok(page_id)
}

/// Return a data page to the free-page stack.
pub fn push_free_page(buffer: &mut BufferManager, page_id: PageId) -> StorageResult<()> {
    let page_count = buffer.page_file().page_count();
    if page_id.is_reserved() || page_id.0 >= page_count {
        return Err(StorageError::PageOutOfRange {
            page_id,
            page_count,
        });
    }
    let data = buffer.read(PageId::FREE_LIST)?;
    FreePageStack::from_data(data).push(page_id)?;
    buffer.write(PageId::FREE_LIST)?;
    debug!("released page {}", page_id);
    Ok(())
}
