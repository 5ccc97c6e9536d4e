use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::free_list::FREE_LIST_CAPACITY;
use crate::storage::page::{FreePageStack, PageBuf, PageId, SlottedPage};
use byteorder::{ByteOrder, LittleEndian};
use log::{debug, info, warn};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

pub const PAGE_SIZE: usize = 16384;

/// Magic bytes at the start of the header page.
pub const SIGNATURE: [u8; 4] = *b"EAGL";

// Header page: | "EAGL" | page_count: u16 | zero padding |
const SIGNATURE_OFFSET: usize = 0;
const PAGE_COUNT_OFFSET: usize = 4;
const HEADER_SIZE: usize = 6;

pub struct PageFile {
    file: File,
    path: PathBuf,
    page_count: u16,
    sync_on_write: bool,
    pages_read: u64,
    pages_written: u64,
}

impl PageFile {
    /// Write a fresh page file of `page_count` pages: the header, empty
    /// slotted pages and the free-page stack on page 3.
    pub fn format(path: &Path, page_count: u16) -> StorageResult<()> {
        // pages 0 (header), 1 (master), 2 (columns) and 3 (free list) are reserved
        if page_count <= PageId::FIRST_DATA.0 {
            return Err(StorageError::InvalidPageCount { count: page_count });
        }
        // Every data page starts out on the free-page stack
        if (page_count - PageId::FIRST_DATA.0) as usize > FREE_LIST_CAPACITY {
            return Err(StorageError::FreeListFull);
        }

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        let mut out = BufWriter::new(file);

        let mut page: Box<PageBuf> = Box::new([0u8; PAGE_SIZE]);
        page[SIGNATURE_OFFSET..SIGNATURE_OFFSET + 4].copy_from_slice(&SIGNATURE);
        LittleEndian::write_u16(&mut page[PAGE_COUNT_OFFSET..], page_count);
        out.write_all(&page[..])?;

        for page_id in 1..page_count {
            if page_id == PageId::FREE_LIST.0 {
                FreePageStack::init(&mut page, page_count)?;
            } else {
                SlottedPage::init(&mut page);
            }
            out.write_all(&page[..])?;
        }

        out.flush()?;
        out.get_ref().sync_all()?;
        info!("formatted page file {:?} with {} pages", path, page_count);
        Ok(())
    }

    /// Open a formatted page file.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;

        let mut header = [0u8; HEADER_SIZE];
        file.read_exact(&mut header)?;
        let mut signature = [0u8; 4];
        signature.copy_from_slice(&header[SIGNATURE_OFFSET..SIGNATURE_OFFSET + 4]);
        if signature != SIGNATURE {
            return Err(StorageError::InvalidSignature(signature));
        }
        let page_count = LittleEndian::read_u16(&header[PAGE_COUNT_OFFSET..]);
        let len = file.metadata()?.len();
        if len < page_count as u64 * PAGE_SIZE as u64 {
            return Err(StorageError::FileTooShort { page_count, len });
        }
        debug!("opened page file {:?} ({} pages)", path, page_count);

        Ok(Self {
            file,
            path: path.to_path_buf(),
            page_count,
            sync_on_write: true,
            pages_read: 0,
            pages_written: 0,
        })
    }

    /// Format a new page file and open it.
    pub fn create(path: &Path, page_count: u16) -> StorageResult<Self> {
        Self::format(path, page_count)?;
        Self::open(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn page_count(&self) -> u16 {
        self.page_count
    }

    /// Pages read since the file was opened.
    pub fn pages_read(&self) -> u64 {
        self.pages_read
    }

    /// Pages written since the file was opened.
    pub fn pages_written(&self) -> u64 {
        self.pages_written
    }

    pub fn set_sync_on_write(&mut self, sync_on_write: bool) {
        self.sync_on_write = sync_on_write;
    }

    pub fn read_page(&mut self, page_id: PageId, buf: &mut PageBuf) -> StorageResult<()> {
        self.seek_to(page_id)?;
        self.file.read_exact(buf)?;
        self.pages_read += 1;
        debug!("read page {}", page_id);
        Ok(())
    }

    pub fn write_page(&mut self, page_id: PageId, buf: &PageBuf) -> StorageResult<()> {
        self.seek_to(page_id)?;
        self.file.write_all(buf)?;
        if self.sync_on_write {
            self.file.sync_data()?;
        }
        self.pages_written += 1;
        debug!("wrote page {}", page_id);
        Ok(())
    }

    /// Print every data page with its decoded records. Runs of empty pages
    /// are collapsed into one line and damaged pages are reported in place.
    pub fn dump<W: Write>(&mut self, out: &mut W) -> StorageResult<()> {
        writeln!(out, "PAGE FILE: {:?}, {} pages", self.path, self.page_count)?;

        let mut buf: Box<PageBuf> = Box::new([0u8; PAGE_SIZE]);
        let mut empty_from: Option<u16> = None;
        for page_id in 1..self.page_count {
            self.read_page(PageId(page_id), &mut buf)?;

            if page_id == PageId::FREE_LIST.0 {
                Self::end_empty_run(out, &mut empty_from, page_id)?;
                let stack = FreePageStack::from_data(&mut buf);
                writeln!(out, "PAGE: {}: free pages = {}", page_id, stack.len())?;
                continue;
            }

            let page = match SlottedPage::from_data(&mut buf) {
                Ok(page) => page,
                Err(e) => {
                    Self::end_empty_run(out, &mut empty_from, page_id)?;
                    warn!("page {} is damaged: {}", page_id, e);
                    writeln!(out, "PAGE: {}: <{}>", page_id, e)?;
                    continue;
                }
            };
            if page.dir_size() == 0 {
                empty_from.get_or_insert(page_id);
                continue;
            }
            Self::end_empty_run(out, &mut empty_from, page_id)?;
            writeln!(out, "PAGE: {}: {}", page_id, page)?;
        }
        Self::end_empty_run(out, &mut empty_from, self.page_count)?;
        Ok(())
    }

    fn end_empty_run<W: Write>(
        out: &mut W,
        empty_from: &mut Option<u16>,
        next_page: u16,
    ) -> StorageResult<()> {
        if let Some(start) = empty_from.take() {
            writeln!(out, "PAGE: {}-{} *empty*", start, next_page - 1)?;
        }
        Ok(())
    }

    fn seek_to(&mut self, page_id: PageId) -> StorageResult<()> {
        if page_id.0 >= self.page_count {
            return Err(StorageError::PageOutOfRange {
                page_id,
                page_count: self.page_count,
            });
        }
        let offset = page_id.0 as u64 * PAGE_SIZE as u64;
        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(|source| StorageError::Seek { page_id, source })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::page::slotted_page::INITIAL_FREE_BYTES;
    use crate::storage::record::RecordBuilder;
    use anyhow::Result;
    use tempfile::tempdir;

    #[test]
    fn test_format_rejects_small_files() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("test.db");

        for count in [0, 1, 4] {
            let result = PageFile::format(&file_path, count);
            assert!(matches!(
                result,
                Err(StorageError::InvalidPageCount { .. })
            ));
        }
        assert!(PageFile::format(&file_path, 5).is_ok());
        Ok(())
    }

    #[test]
    fn test_format_rejects_files_beyond_free_list() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("test.db");

        let result = PageFile::format(&file_path, 9000);
        assert!(matches!(result, Err(StorageError::FreeListFull)));
        // Nothing was created
        assert!(!file_path.exists());

        let largest = PageId::FIRST_DATA.0 + FREE_LIST_CAPACITY as u16;
        assert!(matches!(
            PageFile::format(&file_path, largest + 1),
            Err(StorageError::FreeListFull)
        ));
        assert!(!file_path.exists());
        Ok(())
    }

    #[test]
    fn test_open_rejects_truncated_file() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("test.db");
        PageFile::format(&file_path, 8)?;

        let file = OpenOptions::new().write(true).open(&file_path)?;
        file.set_len(3 * PAGE_SIZE as u64)?;
        drop(file);

        let result = PageFile::open(&file_path);
        assert!(matches!(
            result,
            Err(StorageError::FileTooShort { page_count: 8, len }) if len == 3 * PAGE_SIZE as u64
        ));
        Ok(())
    }

    #[test]
    fn test_format_layout() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("test.db");
        PageFile::format(&file_path, 6)?;

        let bytes = std::fs::read(&file_path)?;
        assert_eq!(bytes.len(), 6 * PAGE_SIZE);
        assert_eq!(&bytes[0..4], b"EAGL");
        assert_eq!(&bytes[4..6], &6u16.to_le_bytes());
        assert!(bytes[6..PAGE_SIZE].iter().all(|&b| b == 0));

        // Page 1: empty slotted page
        let page1 = &bytes[PAGE_SIZE..2 * PAGE_SIZE];
        assert_eq!(&page1[PAGE_SIZE - 4..PAGE_SIZE - 2], &0u16.to_le_bytes());
        assert_eq!(&page1[PAGE_SIZE - 2..], &INITIAL_FREE_BYTES.to_le_bytes());

        // Page 3: free-page stack | 2 | 5 | 4 |
        let page3 = &bytes[3 * PAGE_SIZE..4 * PAGE_SIZE];
        assert_eq!(&page3[0..6], &[2, 0, 5, 0, 4, 0]);
        Ok(())
    }

    #[test]
    fn test_create_and_open() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("test.db");

        {
            let pf = PageFile::create(&file_path, 8)?;
            assert_eq!(pf.page_count(), 8);
            assert_eq!(pf.path(), file_path.as_path());
        }

        {
            let pf = PageFile::open(&file_path)?;
            assert_eq!(pf.page_count(), 8);
        }

        Ok(())
    }

    #[test]
    fn test_open_nonexistent_file() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("nonexistent.db");

        let result = PageFile::open(&file_path);
        assert!(matches!(result, Err(StorageError::Io(_))));

        Ok(())
    }

    #[test]
    fn test_open_rejects_bad_signature() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("bogus.db");
        std::fs::write(&file_path, vec![b'X'; PAGE_SIZE])?;

        let result = PageFile::open(&file_path);
        assert!(matches!(
            result,
            Err(StorageError::InvalidSignature(sig)) if &sig == b"XXXX"
        ));
        Ok(())
    }

    #[test]
    fn test_write_and_read_page() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("test.db");
        let mut pf = PageFile::create(&file_path, 6)?;

        let mut write_buf = Box::new([0u8; PAGE_SIZE]);
        write_buf[0] = 42;
        write_buf[PAGE_SIZE - 1] = 24;
        pf.write_page(PageId(4), &write_buf)?;

        let mut read_buf = Box::new([0u8; PAGE_SIZE]);
        pf.read_page(PageId(4), &mut read_buf)?;

        assert_eq!(pf.pages_written(), 1);
        assert_eq!(pf.pages_read(), 1);
        assert_eq!(read_buf[0], 42);
        assert_eq!(read_buf[PAGE_SIZE - 1], 24);

        Ok(())
    }

    #[test]
    fn test_page_boundary() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("test.db");
        let mut pf = PageFile::create(&file_path, 7)?;

        pf.write_page(PageId(4), &[1u8; PAGE_SIZE])?;
        pf.write_page(PageId(5), &[2u8; PAGE_SIZE])?;

        let mut read_buf = Box::new([0u8; PAGE_SIZE]);
        pf.read_page(PageId(4), &mut read_buf)?;
        assert!(read_buf.iter().all(|&b| b == 1));

        pf.read_page(PageId(5), &mut read_buf)?;
        assert!(read_buf.iter().all(|&b| b == 2));

        // Neighbours untouched
        pf.read_page(PageId(6), &mut read_buf)?;
        assert_eq!(
            LittleEndian::read_u16(&read_buf[PAGE_SIZE - 2..]),
            INITIAL_FREE_BYTES
        );

        Ok(())
    }

    #[test]
    fn test_read_out_of_range_page() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("test.db");
        let mut pf = PageFile::create(&file_path, 6)?;

        let mut buf = Box::new([0u8; PAGE_SIZE]);
        let result = pf.read_page(PageId(6), &mut buf);
        assert!(matches!(
            result,
            Err(StorageError::PageOutOfRange { page_count: 6, .. })
        ));
        let result = pf.write_page(PageId(100), &buf);
        assert!(matches!(result, Err(StorageError::PageOutOfRange { .. })));

        Ok(())
    }

    #[test]
    fn test_persistence() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("test.db");

        {
            let mut pf = PageFile::create(&file_path, 5)?;
            pf.set_sync_on_write(false);
            pf.write_page(PageId(4), &[99u8; PAGE_SIZE])?;
        }

        {
            let mut pf = PageFile::open(&file_path)?;
            let mut buf = Box::new([0u8; PAGE_SIZE]);
            pf.read_page(PageId(4), &mut buf)?;
            assert_eq!(buf[0], 99);
        }

        Ok(())
    }

    #[test]
    fn test_dump() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("test.db");
        let mut pf = PageFile::create(&file_path, 10)?;

        let mut buf = Box::new([0u8; PAGE_SIZE]);
        pf.read_page(PageId(5), &mut buf)?;
        {
            let mut page = SlottedPage::from_data(&mut buf)?;
            let mut builder = RecordBuilder::begin();
            builder.pack_int(24).pack_string("Hello world")?;
            page.add_record(&builder.finish()?)?;
        }
        pf.write_page(PageId(5), &buf)?;

        let mut out = Vec::new();
        pf.dump(&mut out)?;
        let text = String::from_utf8(out)?;

        assert!(text.contains("10 pages"));
        assert!(text.contains("PAGE: 1-2 *empty*"));
        assert!(text.contains("PAGE: 3: free pages = 6"));
        assert!(text.contains("PAGE: 4-4 *empty*"));
        assert!(text.contains("PAGE: 5: Bytes free"));
        assert!(text.contains("int32 (24), String11 (Hello world)"));
        assert!(text.contains("PAGE: 6-9 *empty*"));
        Ok(())
    }

    #[test]
    fn test_dump_reports_damaged_page() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("test.db");
        let mut pf = PageFile::create(&file_path, 8)?;

        // Footer claims more free bytes than the page holds
        let mut buf = Box::new([0u8; PAGE_SIZE]);
        LittleEndian::write_u16(&mut buf[PAGE_SIZE - 4..], 10);
        LittleEndian::write_u16(&mut buf[PAGE_SIZE - 2..], INITIAL_FREE_BYTES);
        pf.write_page(PageId(5), &buf)?;

        let mut out = Vec::new();
        pf.dump(&mut out)?;
        let text = String::from_utf8(out)?;

        assert!(text.contains("PAGE: 4-4 *empty*"));
        assert!(text.contains("PAGE: 5: <Corrupt page"));
        assert!(text.contains("PAGE: 6-7 *empty*"));
        Ok(())
    }
}
