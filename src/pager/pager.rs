//! The concurrent, fixed-capacity buffer pool.

use std::sync::atomic::{AtomicU32, Ordering};

use super::directory::{self, Bucket};
use super::frame::{FLAG_DIRTY, FLAG_REF};
use super::page::Page;
use super::ring::Ring;
use crate::common::config::{DIRECTORY_LOAD_FACTOR, MIN_PAGE_SIZE};
use crate::common::error::{Error, Result};
use crate::common::PageId;
use crate::traced;

/// A pluggable writeback callback: `(page_id, frame_bytes)`.
///
/// This spec's `evict` never calls one — pages here are anonymous memory,
/// not backed by a file, and writeback is explicitly out of scope (spec
/// §1 Non-goals). The hook exists purely as the extension point a durable
/// implementation would use: it is invoked, if registered, on every dirty
/// frame `evict` reclaims, just before the ring slot's `page_id` is
/// zeroed, which is the last point at which the frame's bytes are still
/// valid for that id.
pub type WritebackHook = Box<dyn Fn(u32, &[u8]) + Send + Sync>;

/// A concurrent, fixed-capacity page cache.
///
/// Maps page ids to pinned frames using a latched hash directory and a
/// CLOCK-style ring of frames. Every frame carries its own reader/writer
/// [`crate::latch::Latch`], so unrelated pages never contend with each
/// other; only same-bucket lookups and the eviction sweep contend on the
/// directory.
pub struct Pager {
    page_size: u16,
    mask: u32,
    pub(super) ring: Ring,
    directory: Vec<Bucket>,
    page_count: AtomicU32,
    pub(super) fixed_count: AtomicU32,
    next_id: AtomicU32,
    writeback: Option<WritebackHook>,
}

impl Pager {
    /// Open a pager with room for `directory_size` hash buckets (a power
    /// of two) and a ring sized to `floor(directory_size * 0.7)` frames of
    /// `page_size` bytes each.
    pub fn open(page_size: u16, directory_size: u32) -> Result<Pager> {
        Self::open_with_writeback(page_size, directory_size, None)
    }

    /// Like [`open`](Self::open), but registers a [`WritebackHook`] called
    /// on every dirty frame `evict` reclaims. See [`WritebackHook`] for why
    /// this spec's own `evict` never needs one.
    pub fn open_with_writeback(page_size: u16, directory_size: u32, writeback: Option<WritebackHook>) -> Result<Pager> {
        if page_size < MIN_PAGE_SIZE {
            return Err(traced!(Error::InvalidArgument(format!(
                "page_size {page_size} below minimum {MIN_PAGE_SIZE}"
            ))));
        }
        if directory_size == 0 || (directory_size & (directory_size - 1)) != 0 {
            return Err(traced!(Error::InvalidArgument(format!(
                "directory_size {directory_size} is not a power of two"
            ))));
        }

        let capacity = (directory_size as f64 * DIRECTORY_LOAD_FACTOR) as u32;

        Ok(Pager {
            page_size,
            mask: directory_size - 1,
            ring: Ring::new(capacity, page_size),
            directory: directory::new_directory(directory_size),
            page_count: AtomicU32::new(0),
            fixed_count: AtomicU32::new(0),
            next_id: AtomicU32::new(1),
            writeback,
        })
    }

    /// The page size this pager was opened with.
    pub fn get_page_size(&self) -> u16 {
        self.page_size
    }

    /// Number of frames the ring can hold.
    pub fn capacity(&self) -> u32 {
        self.ring.capacity()
    }

    /// Number of ring slots currently mapped to a page id.
    ///
    /// Used by the spec's quiescence invariant (§8): at rest, this equals
    /// the count of ring slots with a nonzero `page_id`.
    pub fn page_count(&self) -> u32 {
        self.page_count.load(Ordering::Acquire)
    }

    fn bucket(&self, id: u32) -> &Bucket {
        &self.directory[directory::hash(id, self.mask) as usize]
    }

    /// Pin `id` into the cache, creating a mapping if one doesn't already
    /// exist, and latch its frame in shared or exclusive mode.
    ///
    /// Follows spec §4.4's step order precisely: the fast path only ever
    /// holds the bucket's read latch; capacity reservation and `evict`
    /// (step 2) run with *no* bucket latch held at all, since `evict`
    /// itself acquires bucket latches of its own and a bucket write latch
    /// is non-reentrant (spec §4.3: "`evict`, called without holding any
    /// bucket latch"). Only after that does `fix` acquire the destination
    /// bucket's write latch (step 3) to re-lookup and, if still absent,
    /// create.
    pub fn fix(&self, id: u32, exclusive: bool) -> Result<Page<'_>> {
        if id == 0 {
            return Err(traced!(Error::InvalidPageId(id)));
        }

        let bucket = self.bucket(id);

        // Fast path: an existing mapping only needs the bucket's read
        // latch, and the frame latch is acquired before it is released.
        {
            let _guard = bucket.latch.read_guard();
            // SAFETY: `_guard` holds the bucket latch.
            if let Some(frame_index) = unsafe { bucket.lookup(id) } {
                return Ok(self.finish_fix(id, frame_index, exclusive));
            }
        }

        // No mapping yet. Reserve capacity or evict a victim with no
        // bucket latch held, before ever touching this id's bucket.
        let mut reserved = false;
        let mut count = self.page_count.load(Ordering::Relaxed);
        loop {
            if count >= self.ring.capacity() {
                self.evict()?;
                break;
            }
            match self.page_count.compare_exchange_weak(
                count,
                count + 1,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    reserved = true;
                    break;
                }
                Err(actual) => count = actual,
            }
        }

        let _guard = bucket.latch.write_guard();

        // Re-lookup: another thread may have inserted this id while we
        // were reserving capacity or evicting.
        // SAFETY: `_guard` holds the bucket latch exclusively.
        if let Some(frame_index) = unsafe { bucket.lookup(id) } {
            if reserved {
                self.page_count.fetch_sub(1, Ordering::AcqRel);
            }
            return Ok(self.finish_fix(id, frame_index, exclusive));
        }

        let frame_index = self.ring.claim_empty_frame(id);
        let frame = self.ring.frame(frame_index);
        frame.flags.store(0, Ordering::Relaxed);

        // SAFETY: `_guard` holds the bucket latch exclusively.
        unsafe { bucket.insert(id, frame_index) };

        Ok(self.finish_fix(id, frame_index, exclusive))
    }

    /// Acquire the target frame's latch and build the `Page` handle.
    ///
    /// Callers invoke this while still holding the destination bucket's
    /// latch (shared on the fast path, exclusive on the slow path), so the
    /// frame latch is always acquired before the bucket latch is released
    /// — otherwise a concurrent `evict` could reclaim this exact frame in
    /// the gap between releasing the bucket latch and acquiring the frame
    /// latch, handing back a `Page` that no longer backs `id`.
    fn finish_fix(&self, id: u32, frame_index: u32, exclusive: bool) -> Page<'_> {
        let frame = self.ring.frame(frame_index);
        frame.latch.acquire(exclusive);
        if exclusive {
            frame.flags.fetch_or(super::frame::FLAG_EXCLUSIVE, Ordering::Relaxed);
        }

        self.fixed_count.fetch_add(1, Ordering::AcqRel);

        Page {
            pager: self,
            id: PageId::new(id),
            frame_index,
            exclusive,
        }
    }

    /// Allocate a fresh, never-before-used page id and fix it exclusively.
    ///
    /// The returned page's data is zero-initialized: a freshly created
    /// frame already starts zeroed, but a frame reused from a prior
    /// eviction carries the old occupant's bytes until we clear them here.
    pub fn next(&self) -> Result<Page<'_>> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut page = self.fix(id, true)?;
        page.data_mut().fill(0);
        Ok(page)
    }

    /// Sweep the ring for a frame to reclaim: clear its `REF` bit if set
    /// (giving it a second chance), otherwise reclaim it if its latch is
    /// free. Scans at most twice around the ring before giving up.
    ///
    /// Called with no bucket latch held (spec §4.3). An empty slot is
    /// skipped before touching any bucket latch at all, and once this
    /// slot's bucket latch is acquired, the slot is re-checked against the
    /// id observed before acquiring it — it may have been evicted and
    /// reallocated to a different id, possibly hashing to a different
    /// bucket, in the gap between the load and the latch acquisition
    /// (spec §4.3 step 3; §5 eviction-correctness invariant (b)).
    fn evict(&self) -> Result<()> {
        let attempts = self.ring.capacity() as u64 * 2;

        for _ in 0..attempts {
            let index = self.ring.next_evict_index();
            let frame = self.ring.frame(index);
            let id = frame.id.load(Ordering::Relaxed);

            if id == 0 {
                continue;
            }

            let bucket = self.bucket(id);
            let _guard = bucket.latch.write_guard();

            if frame.id.load(Ordering::Relaxed) != id {
                continue;
            }

            if !frame.latch.available() {
                continue;
            }

            let flags = frame.flags.load(Ordering::Relaxed);
            if flags & FLAG_REF != 0 {
                frame.flags.fetch_and(!FLAG_REF, Ordering::Relaxed);
                continue;
            }

            if flags & FLAG_DIRTY != 0 {
                if let Some(hook) = &self.writeback {
                    // SAFETY: `_guard` holds the bucket latch exclusively,
                    // and `frame.latch.available()` guarantees no
                    // outstanding `Page` aliases this frame's data.
                    hook(id, unsafe { frame.data() });
                }
            }

            // SAFETY: `_guard` holds the bucket latch exclusively, and
            // `frame.latch.available()` guarantees no outstanding `Page`
            // aliases this frame's data.
            unsafe { bucket.remove(id) };
            frame.id.store(0, Ordering::Relaxed);
            frame.flags.store(0, Ordering::Relaxed);
            return Ok(());
        }

        Err(traced!(Error::NoMemory))
    }

    /// Close the pager, freeing every frame and directory bucket.
    ///
    /// Taking `self` by value is the precondition enforcement: a `Page<'_>`
    /// borrows `&Pager`, so the borrow checker refuses to compile a `close`
    /// call while any page from this pager is still fixed.
    pub fn close(self) -> Result<()> {
        debug_assert_eq!(self.fixed_count.load(Ordering::Acquire), 0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_rejects_non_power_of_two_directory() {
        assert!(Pager::open(256, 100).is_err());
    }

    #[test]
    fn open_rejects_small_page_size() {
        assert!(Pager::open(32, 64).is_err());
    }

    #[test]
    fn capacity_is_seventy_percent_floored() {
        let pager = Pager::open(124, 64).unwrap();
        assert_eq!(pager.capacity(), 44);
    }

    /// A ring entirely made of empty (`page_id == 0`) slots has nothing
    /// evictable. `evict` must skip those slots rather than treat the `0`
    /// sentinel as a real page id to "successfully" reclaim.
    #[test]
    fn evict_on_an_empty_ring_finds_nothing_to_reclaim() {
        let pager = Pager::open(124, 64).unwrap();
        assert!(matches!(pager.evict(), Err(Error::NoMemory)));
    }

    #[test]
    fn single_fix_unfix_cycle() {
        let pager = Pager::open(124, 64).unwrap();
        {
            let page = pager.fix(3, false).unwrap();
            assert!(!page.is_exclusive());
        }
        {
            let page = pager.fix(3, true).unwrap();
            assert!(page.is_exclusive());
        }
        pager.close().unwrap();
    }

    #[test]
    fn fixing_the_same_id_twice_aliases() {
        let pager = Pager::open(124, 64).unwrap();
        let first = pager.fix(3, false).unwrap();
        let second = pager.fix(3, false).unwrap();
        assert_eq!(first.data().as_ptr(), second.data().as_ptr());
        drop(first);
        drop(second);
        pager.close().unwrap();
    }

    #[test]
    fn fixing_distinct_ids_is_disjoint() {
        let pager = Pager::open(124, 64).unwrap();
        let first = pager.fix(3, false).unwrap();
        let second = pager.fix(4, false).unwrap();
        assert_ne!(first.data().as_ptr(), second.data().as_ptr());
    }

    #[test]
    fn fixing_zero_is_invalid() {
        let pager = Pager::open(124, 64).unwrap();
        assert!(matches!(pager.fix(0, false), Err(Error::InvalidPageId(0))));
    }

    #[test]
    fn fill_pager_then_enomem() {
        let pager = Pager::open(124, 64).unwrap();
        let capacity = pager.capacity();
        let mut held = Vec::new();
        for id in 1..=capacity {
            held.push(pager.fix(id, false).unwrap());
        }
        assert!(matches!(pager.fix(capacity + 1, false), Err(Error::NoMemory)));
    }

    #[test]
    fn unfix_then_new_distinct_fix_succeeds() {
        let pager = Pager::open(124, 64).unwrap();
        let capacity = pager.capacity();
        let mut held = Vec::new();
        for id in 1..=capacity {
            held.push(pager.fix(id, false).unwrap());
        }
        held.truncate(0);

        let fixed = pager.fix(capacity + 1, false);
        assert!(fixed.is_ok());
    }

    /// Regression test: `evict`'s victim can hash to the very bucket `fix`
    /// is about to insert the new id into. `fix` must never hold that
    /// bucket's latch while `evict` runs — doing so would have this same
    /// thread spin forever trying to re-acquire its own non-reentrant
    /// latch. A small directory makes a same-bucket collision between the
    /// new id and an evictable existing one easy to find deterministically.
    #[test]
    fn eviction_victim_sharing_the_new_ids_bucket_does_not_deadlock() {
        let pager = Pager::open(256, 4).unwrap();
        let capacity = pager.capacity();

        let mut held = Vec::new();
        for id in 1..=capacity {
            held.push(pager.fix(id, false).unwrap());
        }
        held.clear();

        let mask = 3u32;
        let colliding_id = (capacity + 1..)
            .find(|&candidate| (1..=capacity).any(|existing| directory::hash(existing, mask) == directory::hash(candidate, mask)))
            .unwrap();

        let page = pager.fix(colliding_id, false).unwrap();
        assert_eq!(page.id(), PageId::new(colliding_id));
    }

    #[test]
    fn data_mut_panics_on_shared_fix() {
        let pager = Pager::open(124, 64).unwrap();
        let mut page = pager.fix(3, false).unwrap();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            page.data_mut();
        }));
        assert!(result.is_err());
    }

    #[test]
    fn next_allocates_fresh_ids() {
        let pager = Pager::open(124, 64).unwrap();
        let a = pager.next().unwrap();
        let b = pager.next().unwrap();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn next_zero_initializes_a_reused_frame() {
        let pager = Pager::open(124, 4).unwrap();
        let capacity = pager.capacity();

        {
            let mut first = pager.fix(1, true).unwrap();
            first.data_mut().fill(0xAB);
        }
        for id in 2..=capacity {
            pager.fix(id, false).unwrap();
        }

        let fresh = pager.next().unwrap();
        assert!(fresh.data().iter().all(|&b| b == 0));
    }

    #[test]
    fn writeback_hook_runs_for_dirty_frames_on_eviction() {
        use std::sync::{Arc, Mutex};

        let seen: Arc<Mutex<Vec<u32>>> = Arc::new(Mutex::new(Vec::new()));
        let hook_seen = Arc::clone(&seen);
        let pager = Pager::open_with_writeback(
            124,
            4,
            Some(Box::new(move |id, _data| hook_seen.lock().unwrap().push(id))),
        )
        .unwrap();
        let capacity = pager.capacity();

        {
            let mut page = pager.fix(1, true).unwrap();
            page.data_mut()[0] = 1;
        }
        for id in 2..=capacity {
            pager.fix(id, false).unwrap().id();
        }
        drop(pager.fix(capacity + 1, false));

        assert_eq!(*seen.lock().unwrap(), vec![1]);
    }

    #[test]
    fn parallel_fix_unfix_exclusive() {
        use std::sync::Arc;
        use std::thread;

        let pager = Arc::new(Pager::open(124, 64).unwrap());
        let capacity = pager.capacity();
        let mut handles = Vec::new();

        for _ in 0..8 {
            let pager = Arc::clone(&pager);
            handles.push(thread::spawn(move || {
                for id in 1..=capacity {
                    let page = pager.fix(id, true).unwrap();
                    drop(page);
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn parallel_fill_then_enomem_under_contention() {
        use std::sync::Arc;
        use std::thread;

        let pager = Arc::new(Pager::open(124, 64).unwrap());
        let capacity = pager.capacity();
        let mut handles = Vec::new();

        for _ in 0..8 {
            let pager = Arc::clone(&pager);
            handles.push(thread::spawn(move || {
                let mut held = Vec::new();
                for id in 1..=capacity {
                    if let Ok(page) = pager.fix(id, false) {
                        held.push(page);
                    }
                }
                held.len()
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }
    }
}
