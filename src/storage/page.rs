pub mod free_list;
pub mod slotted_page;

use crate::storage::PAGE_SIZE;
use std::fmt;

/// Raw in-memory image of one page.
pub type PageBuf = [u8; PAGE_SIZE];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PageId(pub u16);

impl PageId {
    /// Page 0 holds the file header.
    pub const HEADER: PageId = PageId(0);
    /// Page 3 holds the free-page stack.
    pub const FREE_LIST: PageId = PageId(3);
    /// First page id that may be handed out to tables.
    pub const FIRST_DATA: PageId = PageId(4);

    pub fn is_reserved(self) -> bool {
        self < Self::FIRST_DATA
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a record within the page file
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Rid {
    pub page_id: PageId,
    pub slot_id: u16,
}

impl Rid {
    pub fn new(page_id: PageId, slot_id: u16) -> Self {
        Self { page_id, slot_id }
    }
}

pub use free_list::FreePageStack;
pub use slotted_page::{ModifyOutcome, SlottedPage};
