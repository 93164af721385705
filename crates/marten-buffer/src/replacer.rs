//! Page replacement policies for the buffer pool.

use crate::frame::FrameId;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// Trait for page replacement algorithms.
pub trait Replacer: Send + Sync {
    /// Records that the given frame was accessed.
    fn record_access(&self, frame_id: FrameId);

    /// Selects a victim frame for eviction. The `is_evictable` predicate
    /// decides whether a candidate frame may be evicted (typically: its pin
    /// count is zero). Returns None if no frame qualifies.
    fn evict(&self, is_evictable: &dyn Fn(FrameId) -> bool) -> Option<FrameId>;

    /// Removes a frame from the replacer's consideration.
    fn remove(&self, frame_id: FrameId);
}

/// Clock (second-chance) replacement algorithm.
///
/// Reference bits are atomic so access recording never takes the lock;
/// only the clock hand itself is mutex-protected.
pub struct ClockReplacer {
    /// Number of frames.
    num_frames: usize,
    /// Reference bits for each frame.
    reference_bits: Vec<AtomicBool>,
    /// Current clock hand position.
    clock_hand: Mutex<usize>,
}

impl ClockReplacer {
    /// Creates a new clock replacer with the given number of frames.
    pub fn new(num_frames: usize) -> Self {
        let reference_bits: Vec<AtomicBool> =
            (0..num_frames).map(|_| AtomicBool::new(false)).collect();

        Self {
            num_frames,
            reference_bits,
            clock_hand: Mutex::new(0),
        }
    }

    /// Returns the total capacity.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.num_frames
    }
}

impl Replacer for ClockReplacer {
    #[inline]
    fn record_access(&self, frame_id: FrameId) {
        let idx = frame_id.0 as usize;
        if idx < self.num_frames {
            self.reference_bits[idx].store(true, Ordering::Relaxed);
        }
    }

    fn evict(&self, is_evictable: &dyn Fn(FrameId) -> bool) -> Option<FrameId> {
        let mut hand = self.clock_hand.lock();

        // Two sweeps: the first clears reference bits, the second picks up
        // frames whose bits were cleared in the first.
        for _ in 0..(self.num_frames * 2) {
            let idx = *hand;
            *hand = (*hand + 1) % self.num_frames;

            let frame_id = FrameId(idx as u32);
            if !is_evictable(frame_id) {
                continue;
            }

            if self.reference_bits[idx].swap(false, Ordering::Relaxed) {
                // Second chance
                continue;
            }

            return Some(frame_id);
        }

        None
    }

    #[inline]
    fn remove(&self, frame_id: FrameId) {
        let idx = frame_id.0 as usize;
        if idx < self.num_frames {
            self.reference_bits[idx].store(false, Ordering::Relaxed);
        }
    }
}
