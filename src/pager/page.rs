//! The RAII handle returned by [`Pager::fix`](super::Pager::fix) and
//! [`Pager::next`](super::Pager::next).

use std::sync::atomic::Ordering;

use super::frame::{FLAG_DIRTY, FLAG_EXCLUSIVE, FLAG_REF};
use super::Pager;
use crate::common::PageId;

/// A pinned, latched page. Dropping it unpins the frame and releases the
/// latch — there is no separate `unfix` call to forget.
pub struct Page<'a> {
    pub(super) pager: &'a Pager,
    pub(super) id: PageId,
    pub(super) frame_index: u32,
    pub(super) exclusive: bool,
}

impl<'a> Page<'a> {
    /// The page id this handle is fixed on.
    pub fn id(&self) -> PageId {
        self.id
    }

    /// Whether this handle holds the frame's latch exclusively.
    pub fn is_exclusive(&self) -> bool {
        self.exclusive
    }

    /// Read-only view of the page's bytes.
    pub fn data(&self) -> &[u8] {
        // SAFETY: the frame's latch is held (shared or exclusive) for the
        // lifetime of this `Page`.
        unsafe { self.pager.ring.frame(self.frame_index).data() }
    }

    /// Mutable view of the page's bytes.
    ///
    /// # Panics
    /// Panics if this handle was not fixed exclusively — writing through a
    /// shared fix would alias other readers' borrows, a precondition
    /// violation the pager's contract treats as fatal.
    pub fn data_mut(&mut self) -> &mut [u8] {
        assert!(self.exclusive, "data_mut called on a page fixed in shared mode");
        // SAFETY: exclusive fix guarantees no other borrow of this frame
        // exists for as long as this `Page` is alive.
        unsafe { self.pager.ring.frame(self.frame_index).data_mut() }
    }
}

impl Drop for Page<'_> {
    fn drop(&mut self) {
        let frame = self.pager.ring.frame(self.frame_index);

        if self.exclusive {
            // Latch guarantees exclusive access; a non-atomic write is safe.
            frame.flags.store(FLAG_DIRTY | FLAG_REF, Ordering::Relaxed);
            frame.latch.release_write();
        } else {
            frame.flags.fetch_or(FLAG_REF, Ordering::SeqCst);
            frame.latch.release_read();
        }

        self.pager.fixed_count.fetch_sub(1, Ordering::AcqRel);
    }
}
