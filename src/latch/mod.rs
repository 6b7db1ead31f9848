//! A non-reentrant, non-blocking reader/writer latch.
//!
//! [`Latch`] is the one synchronization primitive the pager is built from:
//! every bucket, every frame, gets exactly one. It is a single signed
//! 32-bit atomic counter — `0` free, `n > 0` `n` concurrent readers, `-1`
//! one writer — acquired and released by spinning, never by blocking on an
//! OS primitive. Critical sections protected by a `Latch` are always
//! O(bucket scan) or O(single page cell scan): microseconds, not
//! milliseconds. There is no fairness, no recursion, and no timeout;
//! writers can starve under continuous readers, which is acceptable at
//! this granularity.

use std::sync::atomic::{AtomicI32, Ordering};

/// A spinning reader/writer latch backed by one `AtomicI32`.
#[derive(Debug)]
pub struct Latch {
    state: AtomicI32,
}

impl Latch {
    /// A new, unlocked latch.
    pub const fn new() -> Self {
        Latch {
            state: AtomicI32::new(0),
        }
    }

    /// Spin until a shared hold is acquired.
    pub fn acquire_read(&self) {
        let mut value = self.state.load(Ordering::Relaxed);
        loop {
            if value >= 0 {
                match self.state.compare_exchange_weak(
                    value,
                    value + 1,
                    Ordering::Acquire,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => return,
                    Err(actual) => value = actual,
                }
            } else {
                value = self.state.load(Ordering::Relaxed);
            }
        }
    }

    /// Try once to acquire a shared hold without spinning.
    pub fn try_acquire_read(&self) -> bool {
        let mut value = self.state.load(Ordering::Relaxed);
        loop {
            if value < 0 {
                return false;
            }
            match self.state.compare_exchange_weak(
                value,
                value + 1,
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(actual) => value = actual,
            }
        }
    }

    /// Spin until the exclusive hold is acquired.
    pub fn acquire_write(&self) {
        let mut value = self.state.load(Ordering::Relaxed);
        loop {
            if value == 0 {
                match self.state.compare_exchange_weak(0, -1, Ordering::Acquire, Ordering::Relaxed) {
                    Ok(_) => return,
                    Err(actual) => value = actual,
                }
            } else {
                value = self.state.load(Ordering::Relaxed);
            }
        }
    }

    /// Try once to acquire the exclusive hold without spinning.
    pub fn try_acquire_write(&self) -> bool {
        self.state
            .compare_exchange(0, -1, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Acquire in shared or exclusive mode depending on `exclusive`.
    pub fn acquire(&self, exclusive: bool) {
        if exclusive {
            self.acquire_write();
        } else {
            self.acquire_read();
        }
    }

    /// Release one shared hold.
    ///
    /// # Panics
    /// In debug builds, panics if the latch was not held in shared mode —
    /// this is a caller bug, not a recoverable condition (spec §7: "Fatal
    /// (aborts in debug): violation of preconditions").
    pub fn release_read(&self) {
        let previous = self.state.fetch_sub(1, Ordering::Release);
        debug_assert!(previous > 0, "release_read on a latch with no readers");
    }

    /// Release the exclusive hold.
    ///
    /// # Panics
    /// In debug builds, panics if the latch was not held in exclusive mode.
    pub fn release_write(&self) {
        debug_assert_eq!(self.state.load(Ordering::Relaxed), -1, "release_write on a latch not held for write");
        self.state.store(0, Ordering::Release);
    }

    /// Release in shared or exclusive mode depending on `exclusive`.
    pub fn release(&self, exclusive: bool) {
        if exclusive {
            self.release_write();
        } else {
            self.release_read();
        }
    }

    /// `true` iff the latch is currently free.
    pub fn available(&self) -> bool {
        self.state.load(Ordering::Acquire) == 0
    }

    /// Acquire a shared hold, releasing it automatically when the guard
    /// drops. Prefer this over bare `acquire_read`/`release_read` in any
    /// scope with more than one exit path.
    pub fn read_guard(&self) -> ReadGuard<'_> {
        self.acquire_read();
        ReadGuard { latch: self }
    }

    /// Acquire the exclusive hold, releasing it automatically when the
    /// guard drops.
    pub fn write_guard(&self) -> WriteGuard<'_> {
        self.acquire_write();
        WriteGuard { latch: self }
    }
}

impl Default for Latch {
    fn default() -> Self {
        Self::new()
    }
}

/// Releases a shared hold on drop.
pub struct ReadGuard<'a> {
    latch: &'a Latch,
}

impl Drop for ReadGuard<'_> {
    fn drop(&mut self) {
        self.latch.release_read();
    }
}

/// Releases the exclusive hold on drop.
pub struct WriteGuard<'a> {
    latch: &'a Latch,
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        self.latch.release_write();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn starts_available() {
        let latch = Latch::new();
        assert!(latch.available());
    }

    #[test]
    fn multiple_readers() {
        let latch = Latch::new();
        latch.acquire_read();
        latch.acquire_read();
        latch.acquire_read();
        assert!(!latch.available());
        latch.release_read();
        latch.release_read();
        assert!(!latch.available());
        latch.release_read();
        assert!(latch.available());
    }

    #[test]
    fn exclusive_excludes_everyone() {
        let latch = Latch::new();
        latch.acquire_write();
        assert!(!latch.try_acquire_read());
        assert!(!latch.try_acquire_write());
        latch.release_write();
        assert!(latch.available());
    }

    #[test]
    fn try_read_fails_under_writer() {
        let latch = Latch::new();
        latch.acquire_write();
        assert!(!latch.try_acquire_read());
        latch.release_write();
    }

    #[test]
    fn try_write_fails_under_reader() {
        let latch = Latch::new();
        latch.acquire_read();
        assert!(!latch.try_acquire_write());
        latch.release_read();
    }

    #[test]
    #[should_panic]
    fn release_read_without_hold_panics_in_debug() {
        let latch = Latch::new();
        latch.release_read();
    }

    #[test]
    #[should_panic]
    fn release_write_without_hold_panics_in_debug() {
        let latch = Latch::new();
        latch.release_write();
    }

    #[test]
    fn concurrent_readers_never_see_a_writer() {
        let latch = Arc::new(Latch::new());
        let mut handles = Vec::new();

        for _ in 0..8 {
            let latch = Arc::clone(&latch);
            handles.push(thread::spawn(move || {
                for _ in 0..2000 {
                    latch.acquire_read();
                    assert!(latch.state.load(Ordering::SeqCst) > 0);
                    latch.release_read();
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert!(latch.available());
    }

    #[test]
    fn guards_release_on_drop() {
        let latch = Latch::new();
        {
            let _guard = latch.write_guard();
            assert!(!latch.available());
        }
        assert!(latch.available());

        {
            let _a = latch.read_guard();
            let _b = latch.read_guard();
            assert!(!latch.try_acquire_write());
        }
        assert!(latch.available());
    }

    #[test]
    fn writers_are_mutually_exclusive() {
        use std::sync::atomic::AtomicUsize;

        let latch = Arc::new(Latch::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();

        for _ in 0..8 {
            let latch = Arc::clone(&latch);
            let inside = Arc::clone(&inside);
            handles.push(thread::spawn(move || {
                for _ in 0..500 {
                    latch.acquire_write();
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    assert_eq!(now, 1);
                    inside.fetch_sub(1, Ordering::SeqCst);
                    latch.release_write();
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }
    }
}
