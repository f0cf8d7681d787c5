//! Single-flight latch for the reconciliation sweep.

use std::sync::atomic::{AtomicBool, Ordering};

/// At most one sweep runs at a time; a tick that finds the latch held is
/// skipped, not queued.
#[derive(Default)]
pub struct SweepLatch {
    held: AtomicBool,
}

impl SweepLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the latch, or `None` if a sweep is already in flight.
    ///
    /// The latch is released when the returned guard is dropped, including
    /// on early return and unwinding.
    pub fn try_acquire(&self) -> Option<SweepGuard<'_>> {
        self.held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SweepGuard { latch: self })
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }
}

/// Holds the [`SweepLatch`] until dropped.
pub struct SweepGuard<'a> {
    latch: &'a SweepLatch,
}

impl Drop for SweepGuard<'_> {
    fn drop(&mut self) {
        self.latch.held.store(false, Ordering::Release);
    }
}
