//! Heap file: the base relation the index is built over.
//!
//! Records append to the last page until it fills, then a new page is
//! allocated. All page access goes through the pager so the buffer pool's
//! pin discipline applies here as everywhere else.

use crate::heap::page::HeapPage;
use crate::pager::Pager;
use bytes::Bytes;
use marten_common::page::{PageId, RecordId};
use marten_common::Result;
use std::sync::Arc;

/// A fixed-format heap relation stored in one paged file.
pub struct HeapFile {
    /// Pager for all page I/O.
    pager: Arc<Pager>,
    /// Relation name; doubles as the file name.
    name: String,
    /// File ID assigned by the disk manager.
    file_id: u32,
}

impl HeapFile {
    /// Creates the relation file (or opens it if it already exists).
    pub fn create(pager: Arc<Pager>, name: &str) -> Result<Self> {
        let file_id = pager.disk().create_file(name)?;
        Ok(Self {
            pager,
            name: name.to_string(),
            file_id,
        })
    }

    /// Opens an existing relation file.
    pub fn open(pager: Arc<Pager>, name: &str) -> Result<Self> {
        let file_id = pager.disk().open_file(name)?;
        Ok(Self {
            pager,
            name: name.to_string(),
            file_id,
        })
    }

    /// Returns the relation name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the file ID of the relation.
    pub fn file_id(&self) -> u32 {
        self.file_id
    }

    /// Returns the number of pages in the relation.
    pub fn num_pages(&self) -> Result<u32> {
        self.pager.disk().num_pages(self.file_id)
    }

    /// Appends a record, returning its record ID.
    pub fn append(&self, record: &[u8]) -> Result<RecordId> {
        let num_pages = self.num_pages()?;

        // Try the last page first
        if num_pages > 0 {
            let page_id = PageId::new(self.file_id, num_pages - 1);
            let buf = self.pager.read_page(page_id)?;
            let mut page = HeapPage::from_bytes(buf);

            if page.can_fit(record.len()) {
                let slot_no = page.insert_record(record)?;
                self.pager.write_page(page_id, page.as_bytes())?;
                self.pager.unpin_page(page_id, true);
                return Ok(RecordId::new(page_id.page_no, slot_no));
            }
            self.pager.unpin_page(page_id, false);
        }

        // Extend the file with a fresh page
        let (page_id, buf) = self.pager.alloc_page(self.file_id)?;
        let mut page = HeapPage::from_bytes(buf);
        let slot_no = page.insert_record(record)?;
        self.pager.write_page(page_id, page.as_bytes())?;
        self.pager.unpin_page(page_id, true);
        Ok(RecordId::new(page_id.page_no, slot_no))
    }

    /// Flushes the relation file to disk.
    pub fn flush(&self) -> Result<()> {
        self.pager.flush_file(self.file_id)
    }

    /// Opens a sequential scan over the relation.
    pub fn scan(&self) -> Result<HeapScan> {
        Ok(HeapScan {
            pager: Arc::clone(&self.pager),
            file_id: self.file_id,
            num_pages: self.num_pages()?,
            next_page_no: 0,
            current_page: None,
            next_slot: 0,
            current_record: Bytes::new(),
        })
    }
}

/// Sequential scanner over a heap relation.
///
/// Yields record IDs in (page, slot) order; `record` returns the bytes of
/// the record most recently produced by `next_record`.
pub struct HeapScan {
    pager: Arc<Pager>,
    file_id: u32,
    num_pages: u32,
    next_page_no: u32,
    current_page: Option<(u32, HeapPage)>,
    next_slot: u16,
    current_record: Bytes,
}

impl HeapScan {
    /// Advances to the next record.
    ///
    /// Returns `Ok(None)` once the relation is exhausted.
    pub fn next_record(&mut self) -> Result<Option<RecordId>> {
        loop {
            if let Some((page_no, page)) = &self.current_page {
                if let Some(record) = page.record(self.next_slot) {
                    let rid = RecordId::new(*page_no, self.next_slot);
                    self.current_record = Bytes::copy_from_slice(record);
                    self.next_slot += 1;
                    return Ok(Some(rid));
                }
            }

            // No current page, or the current page is exhausted
            self.current_page = None;
            if self.next_page_no >= self.num_pages {
                return Ok(None);
            }

            // Copy the page contents out and release the pin right away;
            // the scanner iterates over its own snapshot.
            let page_id = PageId::new(self.file_id, self.next_page_no);
            let buf = self.pager.read_page(page_id)?;
            self.pager.unpin_page(page_id, false);

            self.current_page = Some((self.next_page_no, HeapPage::from_bytes(buf)));
            self.next_slot = 0;
            self.next_page_no += 1;
        }
    }

    /// Returns the bytes of the current record.
    pub fn record(&self) -> &[u8] {
        &self.current_record
    }
}
