//! Pager: the pin-level page access contract over disk manager and buffer
//! pool.
//!
//! Every `read_page`/`alloc_page` pins the page in the pool and hands the
//! caller a copy of its bytes; the caller mutates the copy, `write_page`s it
//! back into the pinned frame, and `unpin_page`s with the dirty flag. The
//! frame remains the authoritative backing store; dirty pages reach disk
//! when evicted or flushed.

use crate::disk::DiskManager;
use marten_buffer::BufferPool;
use marten_common::page::{zeroed_page, PageBuf, PageId};
use marten_common::{MartenError, Result};
use std::sync::Arc;

/// Page access layer combining the disk manager and the buffer pool.
pub struct Pager {
    disk: Arc<DiskManager>,
    pool: Arc<BufferPool>,
}

impl Pager {
    /// Creates a pager over the given disk manager and buffer pool.
    pub fn new(disk: Arc<DiskManager>, pool: Arc<BufferPool>) -> Self {
        Self { disk, pool }
    }

    /// Returns the underlying disk manager.
    pub fn disk(&self) -> &Arc<DiskManager> {
        &self.disk
    }

    /// Returns the underlying buffer pool.
    pub fn pool(&self) -> &Arc<BufferPool> {
        &self.pool
    }

    /// Pins a page and returns a copy of its bytes.
    ///
    /// The page stays pinned until the caller invokes `unpin_page`.
    pub fn read_page(&self, page_id: PageId) -> Result<PageBuf> {
        let mut buf = zeroed_page();

        if let Some(frame) = self.pool.fetch_page(page_id) {
            frame.copy_to(&mut *buf);
            return Ok(buf);
        }

        // Miss: load from disk into the pool (pinned)
        let disk_data = self.disk.read_page(page_id)?;
        let (frame, evicted) = self.pool.load_page(page_id, &disk_data)?;
        if let Some(evicted_page) = evicted {
            self.disk.write_page(evicted_page.page_id, &evicted_page.data)?;
        }

        frame.copy_to(&mut *buf);
        Ok(buf)
    }

    /// Allocates a fresh page at the end of the file and pins it.
    ///
    /// Returns the new page's ID together with a zeroed buffer for it. The
    /// page stays pinned until the caller invokes `unpin_page`.
    pub fn alloc_page(&self, file_id: u32) -> Result<(PageId, PageBuf)> {
        let page_id = self.disk.allocate_page(file_id)?;
        let (_, evicted) = self.pool.new_page(page_id)?;
        if let Some(evicted_page) = evicted {
            self.disk.write_page(evicted_page.page_id, &evicted_page.data)?;
        }
        Ok((page_id, zeroed_page()))
    }

    /// Copies modified page bytes back into the pinned frame.
    ///
    /// The page must currently be resident (i.e. pinned by this caller).
    pub fn write_page(&self, page_id: PageId, data: &PageBuf) -> Result<()> {
        match self.pool.fetch_page(page_id) {
            Some(frame) => {
                frame.copy_from(&**data);
                self.pool.unpin_page(page_id, false);
                Ok(())
            }
            None => Err(MartenError::PageNotFound { page_id }),
        }
    }

    /// Releases one pin on a page, marking it dirty if it was modified.
    pub fn unpin_page(&self, page_id: PageId, dirty: bool) {
        self.pool.unpin_page(page_id, dirty);
    }

    /// Writes every dirty page of the file back to disk and syncs it.
    pub fn flush_file(&self, file_id: u32) -> Result<()> {
        self.pool
            .flush_file(file_id, |pid, data| {
                let mut page = [0u8; marten_common::page::PAGE_SIZE];
                page.copy_from_slice(data);
                self.disk.write_page(pid, &page)
            })?;
        self.disk.flush_file(file_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::DiskManagerConfig;
    use marten_buffer::BufferPoolConfig;
    use tempfile::tempdir;

    fn create_test_pager(frames: usize) -> (Pager, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let disk = Arc::new(
            DiskManager::new(DiskManagerConfig {
                data_dir: dir.path().to_path_buf(),
                fsync_enabled: false,
            })
            .unwrap(),
        );
        let pool = Arc::new(BufferPool::new(BufferPoolConfig { num_frames: frames }));
        (Pager::new(disk, pool), dir)
    }

    #[test]
    fn test_pager_alloc_write_read() {
        let (pager, _dir) = create_test_pager(8);
        let file_id = pager.disk().create_file("t").unwrap();

        let (page_id, mut buf) = pager.alloc_page(file_id).unwrap();
        buf[0] = 0xAA;
        buf[10] = 0xBB;
        pager.write_page(page_id, &buf).unwrap();
        pager.unpin_page(page_id, true);

        let read = pager.read_page(page_id).unwrap();
        assert_eq!(read[0], 0xAA);
        assert_eq!(read[10], 0xBB);
        pager.unpin_page(page_id, false);
    }

    #[test]
    fn test_pager_pins_are_held() {
        let (pager, _dir) = create_test_pager(8);
        let file_id = pager.disk().create_file("t").unwrap();

        let (page_id, _) = pager.alloc_page(file_id).unwrap();
        assert_eq!(pager.pool().stats().pin_count_total, 1);

        pager.unpin_page(page_id, false);
        assert_eq!(pager.pool().stats().pin_count_total, 0);

        pager.read_page(page_id).unwrap();
        pager.read_page(page_id).unwrap();
        assert_eq!(pager.pool().stats().pin_count_total, 2);

        pager.unpin_page(page_id, false);
        pager.unpin_page(page_id, false);
        assert_eq!(pager.pool().stats().pin_count_total, 0);
    }

    #[test]
    fn test_pager_survives_eviction() {
        let (pager, _dir) = create_test_pager(2);
        let file_id = pager.disk().create_file("t").unwrap();

        // Dirty a page, unpin it, then force it out of the tiny pool
        let (first, mut buf) = pager.alloc_page(file_id).unwrap();
        buf[0] = 0x77;
        pager.write_page(first, &buf).unwrap();
        pager.unpin_page(first, true);

        for _ in 0..4 {
            let (pid, _) = pager.alloc_page(file_id).unwrap();
            pager.unpin_page(pid, false);
        }

        // The evicted dirty page must come back intact from disk
        let read = pager.read_page(first).unwrap();
        assert_eq!(read[0], 0x77);
        pager.unpin_page(first, false);
    }

    #[test]
    fn test_pager_write_page_not_resident() {
        let (pager, _dir) = create_test_pager(8);
        let file_id = pager.disk().create_file("t").unwrap();

        let (page_id, buf) = pager.alloc_page(file_id).unwrap();
        pager.unpin_page(page_id, false);
        pager.pool().delete_page(page_id);

        let result = pager.write_page(page_id, &buf);
        assert!(matches!(result, Err(MartenError::PageNotFound { .. })));
    }

    #[test]
    fn test_pager_flush_file_persists() {
        let dir = tempdir().unwrap();
        let page_id;

        {
            let disk = Arc::new(
                DiskManager::new(DiskManagerConfig {
                    data_dir: dir.path().to_path_buf(),
                    fsync_enabled: false,
                })
                .unwrap(),
            );
            let pool = Arc::new(BufferPool::new(BufferPoolConfig { num_frames: 8 }));
            let pager = Pager::new(disk, pool);
            let file_id = pager.disk().create_file("t").unwrap();

            let (pid, mut buf) = pager.alloc_page(file_id).unwrap();
            buf[0] = 0x42;
            pager.write_page(pid, &buf).unwrap();
            pager.unpin_page(pid, true);
            pager.flush_file(file_id).unwrap();
            page_id = pid.page_no;
        }

        {
            let disk = Arc::new(
                DiskManager::new(DiskManagerConfig {
                    data_dir: dir.path().to_path_buf(),
                    fsync_enabled: false,
                })
                .unwrap(),
            );
            let pool = Arc::new(BufferPool::new(BufferPoolConfig { num_frames: 8 }));
            let pager = Pager::new(disk, pool);
            let file_id = pager.disk().open_file("t").unwrap();

            let read = pager.read_page(PageId::new(file_id, page_id)).unwrap();
            assert_eq!(read[0], 0x42);
            pager.unpin_page(PageId::new(file_id, page_id), false);
        }
    }
}
