//! Buffer frames: the pool slots that cache pages in memory.

use marten_common::page::{PageId, PAGE_SIZE};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Index of a frame within the pool's frame array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId(pub u32);

/// One pool slot: a page-sized byte buffer plus the bookkeeping the pool
/// needs to decide when the slot may be recycled.
///
/// A frame with a nonzero pin count must not be evicted. The dirty flag
/// records that the buffered bytes diverge from disk; the pool clears it
/// once the page has been written back. Which page occupies the frame is
/// tracked here as well, so eviction can name the page it displaces.
pub struct BufferFrame {
    /// The page currently buffered in this frame, if any.
    occupant: Mutex<Option<PageId>>,
    /// Number of callers currently holding the page pinned.
    pin_count: AtomicU32,
    /// Whether the buffered bytes carry unflushed modifications.
    dirty: AtomicBool,
    /// The buffered page bytes.
    data: RwLock<Box<[u8; PAGE_SIZE]>>,
}

impl BufferFrame {
    /// Creates an unoccupied frame.
    pub fn new() -> Self {
        Self {
            occupant: Mutex::new(None),
            pin_count: AtomicU32::new(0),
            dirty: AtomicBool::new(false),
            data: RwLock::new(Box::new([0u8; PAGE_SIZE])),
        }
    }

    /// Returns the page occupying this frame, if any.
    pub fn occupant(&self) -> Option<PageId> {
        *self.occupant.lock()
    }

    /// Records which page occupies this frame.
    pub fn set_occupant(&self, page_id: Option<PageId>) {
        *self.occupant.lock() = page_id;
    }

    /// Returns true if a page occupies this frame.
    pub fn is_occupied(&self) -> bool {
        self.occupant.lock().is_some()
    }

    /// Takes one pin on the page in this frame.
    pub fn pin(&self) {
        self.pin_count.fetch_add(1, Ordering::AcqRel);
    }

    /// Releases one pin. A release with no pins outstanding is ignored
    /// rather than wrapping the count around.
    pub fn unpin(&self) {
        let _ = self
            .pin_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }

    /// Returns the number of pins currently held.
    pub fn pin_count(&self) -> u32 {
        self.pin_count.load(Ordering::Acquire)
    }

    /// Returns true if any pin is held.
    pub fn is_pinned(&self) -> bool {
        self.pin_count() > 0
    }

    /// Returns true if the buffered bytes have unflushed modifications.
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Marks the buffered bytes as modified or clean.
    pub fn set_dirty(&self, dirty: bool) {
        self.dirty.store(dirty, Ordering::Release);
    }

    /// Overwrites the start of the buffer with `src` (at most one page).
    pub fn copy_from(&self, src: &[u8]) {
        let mut data = self.data.write();
        let len = src.len().min(PAGE_SIZE);
        data[..len].copy_from_slice(&src[..len]);
    }

    /// Fills `dst` from the start of the buffer (at most one page).
    pub fn copy_to(&self, dst: &mut [u8]) {
        let data = self.data.read();
        let len = dst.len().min(PAGE_SIZE);
        dst[..len].copy_from_slice(&data[..len]);
    }

    /// Runs `f` over the buffered bytes without copying them out.
    pub fn with_data<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        let data = self.data.read();
        f(&data[..])
    }

    /// Returns the frame to its unoccupied state: no page, no pins, clean,
    /// zeroed bytes.
    pub fn reset(&self) {
        self.set_occupant(None);
        self.pin_count.store(0, Ordering::Release);
        self.dirty.store(false, Ordering::Release);
        self.data.write().fill(0);
    }
}

impl Default for BufferFrame {
    fn default() -> Self {
        Self::new()
    }
}
