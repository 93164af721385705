//! Page table mapping resident page IDs to buffer frames.

use crate::frame::FrameId;
use marten_common::page::PageId;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Maps PageId to the FrameId currently holding that page.
///
/// Reads vastly outnumber writes here, so the map sits behind a read-write
/// lock rather than a plain mutex.
pub struct PageTable {
    map: RwLock<HashMap<PageId, FrameId>>,
}

impl PageTable {
    /// Creates a new page table sized for the given number of frames.
    pub fn new(capacity: usize) -> Self {
        Self {
            map: RwLock::new(HashMap::with_capacity(capacity)),
        }
    }

    /// Looks up the frame holding a page.
    #[inline]
    pub fn get(&self, page_id: PageId) -> Option<FrameId> {
        self.map.read().get(&page_id).copied()
    }

    /// Returns true if the page is resident.
    #[inline]
    pub fn contains(&self, page_id: PageId) -> bool {
        self.map.read().contains_key(&page_id)
    }

    /// Maps a page to a frame.
    #[inline]
    pub fn insert(&self, page_id: PageId, frame_id: FrameId) {
        self.map.write().insert(page_id, frame_id);
    }

    /// Removes a page mapping, returning the frame it occupied.
    #[inline]
    pub fn remove(&self, page_id: PageId) -> Option<FrameId> {
        self.map.write().remove(&page_id)
    }

    /// Returns the number of resident pages.
    #[inline]
    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    /// Returns true if no pages are resident.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }

    /// Visits every (page, frame) mapping. The callback returns false to
    /// stop iteration early.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(PageId, FrameId) -> bool,
    {
        for (&page_id, &frame_id) in self.map.read().iter() {
            if !f(page_id, frame_id) {
                break;
            }
        }
    }
}
