use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::PageBuf;
use crate::storage::record::{self, RECORD_HEADER_SIZE};
use crate::storage::PAGE_SIZE;
use byteorder::{ByteOrder, LittleEndian};
use std::fmt;

// Footer: | directory ... | dir_size: u16 | free_bytes: u16 |
const DIR_SIZE_OFFSET: usize = PAGE_SIZE - 4;
const FREE_BYTES_OFFSET: usize = PAGE_SIZE - 2;
const FOOTER_SIZE: usize = 4;

// One directory entry is a 2-byte record offset
const SLOT_SIZE: usize = 2;

/// Directory value of a deleted slot.
pub const TOMBSTONE: u16 = u16::MAX;

/// Free bytes of a freshly formatted page.
pub const INITIAL_FREE_BYTES: u16 = (PAGE_SIZE - FOOTER_SIZE) as u16;

/// Result of [`SlottedPage::modify_record`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModifyOutcome {
    /// The new record is in place.
    Applied,
    /// The page is `shortfall` bytes short of holding the grown record and
    /// was left untouched. The caller has to move the record elsewhere.
    Overflow { shortfall: u16 },
}

/// Slotted-page view over a page buffer.
///
/// ```text
/// | rec0 | rec1 | ... free ... | slot0 | slot1 | ... | dir_size | free_bytes |
/// ```
///
/// Records are packed from the start of the page (after an optional opaque
/// prefix owned by the caller). The directory sits right before the footer
/// and holds one absolute offset per slot, lowest slot id first. The end of
/// the record area is always `directory_start - free_bytes`.
pub struct SlottedPage<'a> {
    data: &'a mut PageBuf,
}

impl<'a> SlottedPage<'a> {
    /// Format `data` as an empty page.
    pub fn init(data: &'a mut PageBuf) -> Self {
        data.fill(0);
        let mut page = Self { data };
        page.set_dir_size(0);
        page.set_free_bytes(INITIAL_FREE_BYTES);
        page
    }

    /// Format `data` as an empty page whose first `prefix_len` bytes are
    /// never used for records.
    pub fn init_with_prefix(data: &'a mut PageBuf, prefix_len: u16) -> StorageResult<Self> {
        if prefix_len > INITIAL_FREE_BYTES {
            return Err(StorageError::PageFull {
                required: prefix_len as usize,
                available: INITIAL_FREE_BYTES as usize,
            });
        }
        let mut page = Self::init(data);
        page.set_free_bytes(INITIAL_FREE_BYTES - prefix_len);
        Ok(page)
    }

    /// View an already formatted page. Fails if the footer counters
    /// describe more bytes than the page holds.
    pub fn from_data(data: &'a mut PageBuf) -> StorageResult<Self> {
        let page = Self { data };
        let dir_size = page.dir_size();
        let free_bytes = page.free_bytes();
        if dir_size as usize * SLOT_SIZE + free_bytes as usize > INITIAL_FREE_BYTES as usize {
            return Err(StorageError::CorruptPage {
                dir_size,
                free_bytes,
            });
        }
        Ok(page)
    }

    pub fn data(&self) -> &PageBuf {
        self.data
    }

    /// Number of directory slots, tombstones included.
    pub fn dir_size(&self) -> u16 {
        LittleEndian::read_u16(&self.data[DIR_SIZE_OFFSET..])
    }

    pub fn free_bytes(&self) -> u16 {
        LittleEndian::read_u16(&self.data[FREE_BYTES_OFFSET..])
    }

    /// Number of slots that still hold a record.
    pub fn live_records(&self) -> usize {
        self.records().count()
    }

    pub fn is_empty(&self) -> bool {
        self.live_records() == 0
    }

    /// Append a pre-formatted record and return its slot id.
    pub fn add_record(&mut self, record: &[u8]) -> StorageResult<u16> {
        Self::validate(record)?;

        let required = record.len() + SLOT_SIZE;
        let available = self.free_bytes() as usize;
        if available < required {
            return Err(StorageError::PageFull {
                required,
                available,
            });
        }

        let dest = self.record_area_end();
        self.data[dest..dest + record.len()].copy_from_slice(record);

        // Grow the directory by one entry at its low end
        let dir_size = self.dir_size();
        let dir_start = self.directory_start();
        self.data
            .copy_within(dir_start..DIR_SIZE_OFFSET, dir_start - SLOT_SIZE);
        self.set_dir_size(dir_size + 1);
        self.set_slot_offset(dir_size, dest as u16);
        self.set_free_bytes((available - required) as u16);

        Ok(dir_size)
    }

    pub fn get_record(&self, slot_id: u16) -> StorageResult<&[u8]> {
        let offset = self.live_offset(slot_id)?;
        let len = self.record_len_at(offset);
        Ok(&self.data[offset..offset + len])
    }

    /// Remove a record, compacting the bytes behind it. The slot stays
    /// allocated as a tombstone.
    pub fn delete_record(&mut self, slot_id: u16) -> StorageResult<()> {
        let offset = self.live_offset(slot_id)?;
        let len = self.record_len_at(offset);

        self.compact(offset + len, len);
        self.fix_up_directory(offset, -(len as isize));
        self.set_slot_offset(slot_id, TOMBSTONE);
        self.set_free_bytes(self.free_bytes() + len as u16);

        Ok(())
    }

    /// Replace the record in `slot_id`, shifting the records behind it.
    pub fn modify_record(&mut self, slot_id: u16, record: &[u8]) -> StorageResult<ModifyOutcome> {
        Self::validate(record)?;
        let offset = self.live_offset(slot_id)?;
        let old_len = self.record_len_at(offset);
        let new_len = record.len();

        if new_len < old_len {
            let shrink = old_len - new_len;
            self.compact(offset + old_len, shrink);
            self.fix_up_directory(offset, -(shrink as isize));
            self.set_free_bytes(self.free_bytes() + shrink as u16);
        } else if new_len > old_len {
            let grow = new_len - old_len;
            let free = self.free_bytes() as usize;
            if free < grow {
                return Ok(ModifyOutcome::Overflow {
                    shortfall: (grow - free) as u16,
                });
            }
            self.push_down(offset + old_len, grow);
            self.fix_up_directory(offset, grow as isize);
            self.set_free_bytes((free - grow) as u16);
        }

        self.data[offset..offset + new_len].copy_from_slice(record);
        Ok(ModifyOutcome::Applied)
    }

    /// Live records in slot order.
    pub fn records(&self) -> impl Iterator<Item = (u16, &[u8])> + '_ {
        (0..self.dir_size())
            .filter_map(move |slot_id| self.get_record(slot_id).ok().map(|r| (slot_id, r)))
    }

    fn validate(record: &[u8]) -> StorageResult<()> {
        let embedded = record::record_len(record)? as usize;
        if embedded != record.len() || embedded < RECORD_HEADER_SIZE {
            return Err(StorageError::MalformedRecord(format!(
                "embedded length {} does not match {} supplied bytes",
                embedded,
                record.len()
            )));
        }
        Ok(())
    }

    fn directory_start(&self) -> usize {
        DIR_SIZE_OFFSET - self.dir_size() as usize * SLOT_SIZE
    }

    fn record_area_end(&self) -> usize {
        self.directory_start() - self.free_bytes() as usize
    }

    fn slot_position(&self, slot_id: u16) -> usize {
        self.directory_start() + slot_id as usize * SLOT_SIZE
    }

    fn slot_offset(&self, slot_id: u16) -> u16 {
        LittleEndian::read_u16(&self.data[self.slot_position(slot_id)..])
    }

    fn set_slot_offset(&mut self, slot_id: u16, offset: u16) {
        let pos = self.slot_position(slot_id);
        LittleEndian::write_u16(&mut self.data[pos..], offset);
    }

    fn live_offset(&self, slot_id: u16) -> StorageResult<usize> {
        let dir_size = self.dir_size();
        if slot_id >= dir_size {
            return Err(StorageError::SlotOutOfRange { slot_id, dir_size });
        }
        let offset = match self.slot_offset(slot_id) {
            TOMBSTONE => return Err(StorageError::SlotTombstoned { slot_id }),
            offset => offset as usize,
        };

        let area_end = self.record_area_end();
        if offset + RECORD_HEADER_SIZE > area_end
            || self.record_len_at(offset) < RECORD_HEADER_SIZE
            || offset + self.record_len_at(offset) > area_end
        {
            return Err(StorageError::MalformedRecord(format!(
                "slot {} points at offset {} outside the record area",
                slot_id, offset
            )));
        }
        Ok(offset)
    }

    fn record_len_at(&self, offset: usize) -> usize {
        LittleEndian::read_u16(&self.data[offset..]) as usize
    }

    /// Move `[start, record_area_end)` back by `num_bytes` and zero the tail.
    fn compact(&mut self, start: usize, num_bytes: usize) {
        let end = self.record_area_end();
        self.data.copy_within(start..end, start - num_bytes);
        self.data[end - num_bytes..end].fill(0);
    }

    /// Move `[start, record_area_end)` forward by `num_bytes`. The caller has
    /// checked that `num_bytes` fits in the free area.
    fn push_down(&mut self, start: usize, num_bytes: usize) {
        let end = self.record_area_end();
        self.data.copy_within(start..end, start + num_bytes);
    }

    /// Shift every live offset past `pivot` by `delta`.
    fn fix_up_directory(&mut self, pivot: usize, delta: isize) {
        for slot_id in 0..self.dir_size() {
            let offset = self.slot_offset(slot_id);
            if offset != TOMBSTONE && offset as usize > pivot {
                self.set_slot_offset(slot_id, (offset as isize + delta) as u16);
            }
        }
    }

    fn set_dir_size(&mut self, dir_size: u16) {
        LittleEndian::write_u16(&mut self.data[DIR_SIZE_OFFSET..], dir_size);
    }

    fn set_free_bytes(&mut self, free_bytes: u16) {
        LittleEndian::write_u16(&mut self.data[FREE_BYTES_OFFSET..], free_bytes);
    }
}

impl fmt::Display for SlottedPage<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Bytes free = {}, Entries = {}, records: ",
            self.free_bytes(),
            self.dir_size()
        )?;
        for slot_id in 0..self.dir_size() {
            write!(f, "\n   id = {}, ", slot_id)?;
            let record = match self.get_record(slot_id) {
                Ok(record) => record,
                Err(_) => {
                    write!(f, "UNUSED")?;
                    continue;
                }
            };
            write!(f, "size = {}", record.len())?;
            match record::decode_values(record) {
                Ok(values) => {
                    for value in values {
                        write!(f, ", {}", value)?;
                    }
                }
                Err(e) => write!(f, ", <{}>", e)?,
            }
        }
        Ok(())
    }
}
