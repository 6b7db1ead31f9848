//! The frame ring: a fixed-size array of [`Frame`]s indexed by two
//! independent monotonic counters, one for allocation, one for eviction.

use std::sync::atomic::{AtomicU32, Ordering};

use super::frame::Frame;

pub(crate) struct Ring {
    frames: Vec<Frame>,
    alloc_head: AtomicU32,
    evict_head: AtomicU32,
}

impl Ring {
    pub(crate) fn new(capacity: u32, page_size: u16) -> Self {
        let frames = (0..capacity).map(|_| Frame::new(page_size)).collect();
        Ring {
            frames,
            alloc_head: AtomicU32::new(0),
            evict_head: AtomicU32::new(0),
        }
    }

    pub(crate) fn capacity(&self) -> u32 {
        self.frames.len() as u32
    }

    pub(crate) fn frame(&self, index: u32) -> &Frame {
        &self.frames[index as usize]
    }

    /// Spin over the ring from the current allocation head until a frame
    /// with `id == 0` is claimed for `id` via CAS, returning its index.
    pub(crate) fn claim_empty_frame(&self, id: u32) -> u32 {
        let capacity = self.capacity();
        loop {
            let index = self.alloc_head.fetch_add(1, Ordering::Relaxed) % capacity;
            let frame = self.frame(index);
            if frame
                .id
                .compare_exchange(0, id, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                return index;
            }
        }
    }

    pub(crate) fn next_evict_index(&self) -> u32 {
        self.evict_head.fetch_add(1, Ordering::Relaxed) % self.capacity()
    }
}
