//! A single ring slot: the page id it currently backs, its latch, and its
//! data buffer.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU32, AtomicU8};

use crate::latch::Latch;

pub(crate) const FLAG_DIRTY: u8 = 1 << 1;
pub(crate) const FLAG_REF: u8 = 1 << 2;
pub(crate) const FLAG_EXCLUSIVE: u8 = 1 << 3;

/// One frame of `page_size` bytes plus its header. The frame's address is
/// stable for the life of the pager; its identity (which page id it
/// backs) changes every time it is evicted and reallocated.
pub(crate) struct Frame {
    pub(crate) id: AtomicU32,
    pub(crate) flags: AtomicU8,
    pub(crate) latch: Latch,
    data: UnsafeCell<Box<[u8]>>,
}

// Access to `data` is governed entirely by `latch`, never by the type
// system: a shared `&Frame` must still serialize writers through the
// latch's exclusive mode before calling `data_mut`.
unsafe impl Sync for Frame {}

impl Frame {
    pub(crate) fn new(page_size: u16) -> Self {
        Frame {
            id: AtomicU32::new(0),
            flags: AtomicU8::new(0),
            latch: Latch::new(),
            data: UnsafeCell::new(vec![0u8; page_size as usize].into_boxed_slice()),
        }
    }

    /// # Safety
    /// Caller must hold `latch` in shared or exclusive mode for the
    /// duration of the returned borrow.
    pub(crate) unsafe fn data(&self) -> &[u8] {
        &*self.data.get()
    }

    /// # Safety
    /// Caller must hold `latch` in exclusive mode for the duration of the
    /// returned borrow.
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn data_mut(&self) -> &mut [u8] {
        &mut *self.data.get()
    }
}
