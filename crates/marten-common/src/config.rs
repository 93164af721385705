//! Configuration structures for Marten.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Storage configuration for the index and its base relation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory for data files.
    pub data_dir: PathBuf,
    /// Enable fsync after writes.
    pub fsync_enabled: bool,
    /// Buffer pool size in number of frames.
    pub buffer_pool_frames: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            fsync_enabled: true,
            buffer_pool_frames: 1024, // 4 MB with 4 KB pages
        }
    }
}

impl StorageConfig {
    /// Returns the total buffer pool size in bytes.
    pub fn buffer_pool_size_bytes(&self) -> usize {
        self.buffer_pool_frames * crate::page::PAGE_SIZE
    }
}
