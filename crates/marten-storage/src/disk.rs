//! Disk manager for page-level file I/O.
//!
//! Files are addressed by name (relative to the data directory) when opened
//! or created, and by the returned file ID afterwards. The index file name
//! carries meaning ("<relation>.<offset>"), so names are caller-supplied
//! rather than derived from the file ID.

use marten_common::page::{PageId, PAGE_SIZE};
use marten_common::{MartenError, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Configuration for the disk manager.
#[derive(Debug, Clone)]
pub struct DiskManagerConfig {
    /// Base directory for data files.
    pub data_dir: PathBuf,
    /// Enable fsync after writes.
    pub fsync_enabled: bool,
}

impl Default for DiskManagerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            fsync_enabled: true,
        }
    }
}

/// Handle for an open data file.
struct FileHandle {
    /// The file handle.
    file: File,
    /// Name the file was opened under.
    name: String,
    /// Number of pages in the file.
    num_pages: u32,
}

/// Registry of open files, keyed both ways.
#[derive(Default)]
struct FileRegistry {
    by_id: HashMap<u32, FileHandle>,
    by_name: HashMap<String, u32>,
    next_id: u32,
}

/// Manages reading and writing pages in named disk files.
pub struct DiskManager {
    /// Configuration.
    config: DiskManagerConfig,
    /// Open file handles.
    files: Mutex<FileRegistry>,
}

impl DiskManager {
    /// Creates a new disk manager, creating the data directory if needed.
    pub fn new(config: DiskManagerConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;

        Ok(Self {
            config,
            files: Mutex::new(FileRegistry::default()),
        })
    }

    /// Returns the data directory path.
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Returns the on-disk path for a file name.
    pub fn file_path(&self, name: &str) -> PathBuf {
        self.config.data_dir.join(name)
    }

    /// Returns true if a file with the given name exists on disk.
    pub fn file_exists(&self, name: &str) -> bool {
        self.files.lock().by_name.contains_key(name) || self.file_path(name).exists()
    }

    fn register(&self, name: &str, file: File) -> Result<u32> {
        let file_size = file.metadata()?.len();
        let num_pages = (file_size / PAGE_SIZE as u64) as u32;

        let mut files = self.files.lock();
        let file_id = files.next_id;
        files.next_id += 1;
        files.by_id.insert(
            file_id,
            FileHandle {
                file,
                name: name.to_string(),
                num_pages,
            },
        );
        files.by_name.insert(name.to_string(), file_id);
        Ok(file_id)
    }

    /// Opens an existing file, returning its file ID.
    ///
    /// Fails with FileNotFound if no such file exists on disk.
    pub fn open_file(&self, name: &str) -> Result<u32> {
        if let Some(&file_id) = self.files.lock().by_name.get(name) {
            return Ok(file_id);
        }

        let path = self.file_path(name);
        if !path.exists() {
            return Err(MartenError::FileNotFound(name.to_string()));
        }

        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        self.register(name, file)
    }

    /// Creates a new file (or truncates an existing one), returning its ID.
    pub fn create_file(&self, name: &str) -> Result<u32> {
        if let Some(&file_id) = self.files.lock().by_name.get(name) {
            return Ok(file_id);
        }

        let path = self.file_path(name);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        self.register(name, file)
    }

    /// Reads a page from disk.
    pub fn read_page(&self, page_id: PageId) -> Result<[u8; PAGE_SIZE]> {
        let mut files = self.files.lock();
        let handle = files
            .by_id
            .get_mut(&page_id.file_id)
            .ok_or(MartenError::PageNotFound { page_id })?;

        if page_id.page_no >= handle.num_pages {
            return Err(MartenError::PageNotFound { page_id });
        }

        let offset = (page_id.page_no as u64) * (PAGE_SIZE as u64);
        handle.file.seek(SeekFrom::Start(offset))?;

        let mut buffer = [0u8; PAGE_SIZE];
        handle.file.read_exact(&mut buffer)?;

        Ok(buffer)
    }

    /// Writes a page to disk.
    pub fn write_page(&self, page_id: PageId, data: &[u8; PAGE_SIZE]) -> Result<()> {
        let mut files = self.files.lock();
        let handle = files
            .by_id
            .get_mut(&page_id.file_id)
            .ok_or(MartenError::PageNotFound { page_id })?;

        let offset = (page_id.page_no as u64) * (PAGE_SIZE as u64);
        handle.file.seek(SeekFrom::Start(offset))?;
        handle.file.write_all(data)?;

        if self.config.fsync_enabled {
            handle.file.sync_all()?;
        }

        if page_id.page_no >= handle.num_pages {
            handle.num_pages = page_id.page_no + 1;
        }

        Ok(())
    }

    /// Allocates a new zeroed page at the end of the file.
    pub fn allocate_page(&self, file_id: u32) -> Result<PageId> {
        let mut files = self.files.lock();
        let handle = files.by_id.get_mut(&file_id).ok_or_else(|| {
            MartenError::PageNotFound {
                page_id: PageId::new(file_id, 0),
            }
        })?;

        let page_no = handle.num_pages;
        let page_id = PageId::new(file_id, page_no);

        let offset = (page_no as u64) * (PAGE_SIZE as u64);
        handle.file.seek(SeekFrom::Start(offset))?;
        handle.file.write_all(&[0u8; PAGE_SIZE])?;

        if self.config.fsync_enabled {
            handle.file.sync_all()?;
        }

        handle.num_pages = page_no + 1;

        Ok(page_id)
    }

    /// Returns the number of pages in a file.
    pub fn num_pages(&self, file_id: u32) -> Result<u32> {
        let files = self.files.lock();
        let handle = files.by_id.get(&file_id).ok_or_else(|| {
            MartenError::PageNotFound {
                page_id: PageId::new(file_id, 0),
            }
        })?;
        Ok(handle.num_pages)
    }

    /// Syncs a single file's pending writes to disk.
    pub fn flush_file(&self, file_id: u32) -> Result<()> {
        let files = self.files.lock();
        if let Some(handle) = files.by_id.get(&file_id) {
            handle.file.sync_all()?;
        }
        Ok(())
    }

    /// Flushes all pending writes to disk.
    pub fn flush(&self) -> Result<()> {
        let files = self.files.lock();
        for handle in files.by_id.values() {
            handle.file.sync_all()?;
        }
        Ok(())
    }

    /// Closes a file, syncing it first.
    pub fn close_file(&self, file_id: u32) -> Result<()> {
        let mut files = self.files.lock();
        if let Some(handle) = files.by_id.remove(&file_id) {
            files.by_name.remove(&handle.name);
            handle.file.sync_all()?;
        }
        Ok(())
    }

    /// Closes all open files.
    pub fn close_all(&self) -> Result<()> {
        let mut files = self.files.lock();
        files.by_name.clear();
        for (_, handle) in files.by_id.drain() {
            handle.file.sync_all()?;
        }
        Ok(())
    }

    /// Deletes a file from disk.
    pub fn delete_file(&self, name: &str) -> Result<()> {
        let file_id = {
            let files = self.files.lock();
            files.by_name.get(name).copied()
        };
        if let Some(file_id) = file_id {
            self.close_file(file_id)?;
        }
        let path = self.file_path(name);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

impl Drop for DiskManager {
    fn drop(&mut self) {
        let _ = self.close_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn create_test_disk_manager() -> (DiskManager, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let config = DiskManagerConfig {
            data_dir: dir.path().to_path_buf(),
            fsync_enabled: false,
        };
        let dm = DiskManager::new(config).unwrap();
        (dm, dir)
    }

    #[test]
    fn test_disk_manager_new() {
        let (dm, _dir) = create_test_disk_manager();
        assert!(dm.data_dir().exists());
    }

    #[test]
    fn test_disk_manager_create_and_allocate() {
        let (dm, _dir) = create_test_disk_manager();

        let file_id = dm.create_file("relation").unwrap();

        let page1 = dm.allocate_page(file_id).unwrap();
        assert_eq!(page1.file_id, file_id);
        assert_eq!(page1.page_no, 0);

        let page2 = dm.allocate_page(file_id).unwrap();
        assert_eq!(page2.page_no, 1);

        assert_eq!(dm.num_pages(file_id).unwrap(), 2);
    }

    #[test]
    fn test_disk_manager_open_nonexistent() {
        let (dm, _dir) = create_test_disk_manager();
        let result = dm.open_file("missing");
        assert!(matches!(result, Err(MartenError::FileNotFound(_))));
    }

    #[test]
    fn test_disk_manager_file_exists() {
        let (dm, _dir) = create_test_disk_manager();

        assert!(!dm.file_exists("relation"));
        dm.create_file("relation").unwrap();
        assert!(dm.file_exists("relation"));
    }

    #[test]
    fn test_disk_manager_write_read() {
        let (dm, _dir) = create_test_disk_manager();
        let file_id = dm.create_file("relation").unwrap();
        let page_id = dm.allocate_page(file_id).unwrap();

        let mut data = [0u8; PAGE_SIZE];
        data[0] = 0xAB;
        data[100] = 0xCD;
        data[PAGE_SIZE - 1] = 0xEF;
        dm.write_page(page_id, &data).unwrap();

        let read_data = dm.read_page(page_id).unwrap();
        assert_eq!(read_data[0], 0xAB);
        assert_eq!(read_data[100], 0xCD);
        assert_eq!(read_data[PAGE_SIZE - 1], 0xEF);
    }

    #[test]
    fn test_disk_manager_multiple_files() {
        let (dm, _dir) = create_test_disk_manager();

        let f0 = dm.create_file("alpha").unwrap();
        let f1 = dm.create_file("beta").unwrap();
        assert_ne!(f0, f1);

        let p0 = dm.allocate_page(f0).unwrap();
        let p1 = dm.allocate_page(f1).unwrap();

        let mut data0 = [0u8; PAGE_SIZE];
        data0[0] = 0x11;
        dm.write_page(p0, &data0).unwrap();

        let mut data1 = [0u8; PAGE_SIZE];
        data1[0] = 0x22;
        dm.write_page(p1, &data1).unwrap();

        assert_eq!(dm.read_page(p0).unwrap()[0], 0x11);
        assert_eq!(dm.read_page(p1).unwrap()[0], 0x22);
    }

    #[test]
    fn test_disk_manager_read_nonexistent_page() {
        let (dm, _dir) = create_test_disk_manager();
        let file_id = dm.create_file("relation").unwrap();
        dm.allocate_page(file_id).unwrap();

        let result = dm.read_page(PageId::new(file_id, 99));
        assert!(matches!(result, Err(MartenError::PageNotFound { .. })));
    }

    #[test]
    fn test_disk_manager_reopen_keeps_id() {
        let (dm, _dir) = create_test_disk_manager();

        let id1 = dm.create_file("relation").unwrap();
        let id2 = dm.open_file("relation").unwrap();
        assert_eq!(id1, id2);
    }

    #[test]
    fn test_disk_manager_persistence() {
        let dir = tempdir().unwrap();
        let page_no;

        {
            let config = DiskManagerConfig {
                data_dir: dir.path().to_path_buf(),
                fsync_enabled: true,
            };
            let dm = DiskManager::new(config).unwrap();
            let file_id = dm.create_file("relation").unwrap();
            let page_id = dm.allocate_page(file_id).unwrap();
            page_no = page_id.page_no;

            let mut data = [0u8; PAGE_SIZE];
            data[0] = 0xFF;
            dm.write_page(page_id, &data).unwrap();
        }

        {
            let config = DiskManagerConfig {
                data_dir: dir.path().to_path_buf(),
                fsync_enabled: true,
            };
            let dm = DiskManager::new(config).unwrap();
            let file_id = dm.open_file("relation").unwrap();
            assert_eq!(dm.num_pages(file_id).unwrap(), 1);

            let read_data = dm.read_page(PageId::new(file_id, page_no)).unwrap();
            assert_eq!(read_data[0], 0xFF);
        }
    }

    #[test]
    fn test_disk_manager_delete_file() {
        let (dm, dir) = create_test_disk_manager();

        let file_id = dm.create_file("relation").unwrap();
        dm.allocate_page(file_id).unwrap();
        let file_path = dir.path().join("relation");
        assert!(file_path.exists());

        dm.delete_file("relation").unwrap();
        assert!(!file_path.exists());
    }

    #[test]
    fn test_disk_manager_close_file() {
        let (dm, _dir) = create_test_disk_manager();

        let file_id = dm.create_file("relation").unwrap();
        dm.allocate_page(file_id).unwrap();
        dm.close_file(file_id).unwrap();

        // Reopening assigns a fresh ID but sees the same pages
        let file_id = dm.open_file("relation").unwrap();
        assert_eq!(dm.num_pages(file_id).unwrap(), 1);
    }

    #[test]
    fn test_disk_manager_flush() {
        let (dm, _dir) = create_test_disk_manager();

        let file_id = dm.create_file("relation").unwrap();
        dm.allocate_page(file_id).unwrap();

        dm.flush_file(file_id).unwrap();
        dm.flush().unwrap();
    }
}
