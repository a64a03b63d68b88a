use std::fmt;

use crossbeam_epoch::{Collector, Guard, Shared};

/// Epoch-based reclamation scoped to a single collection.
///
/// Each manager has its own collector rather than using the process-wide one.
/// Garbage retired to a private collector is destroyed at the latest when the
/// collector itself is dropped, so the element types of a collection do not
/// have to be `'static`.
pub struct EpochManager {
    collector: Collector,
}

impl EpochManager {
    pub fn new() -> Self {
        EpochManager {
            collector: Collector::new(),
        }
    }

    /// Pins the current thread. Records loaded through the returned guard stay
    /// allocated until it is dropped.
    pub fn pin(&self) -> Guard {
        self.collector.register().pin()
    }

    /// Retires a record that has been unlinked from its structure.
    ///
    /// # Safety
    /// `record` must have been unlinked while `guard` was pinned, must not be
    /// reachable by threads that pin afterwards, and must not be retired twice.
    pub unsafe fn retire<T>(&self, guard: &Guard, record: Shared<'_, T>) {
        guard.defer_destroy(record);
    }

    /// Runs `f` once no pinned thread can observe the records it cleans up.
    ///
    /// # Safety
    /// Same contract as [`retire`](EpochManager::retire) for every record `f`
    /// touches.
    pub unsafe fn retire_with<F: FnOnce()>(&self, guard: &Guard, f: F) {
        guard.defer_unchecked(f);
    }
}

impl Default for EpochManager {
    fn default() -> Self {
        EpochManager::new()
    }
}

impl fmt::Debug for EpochManager {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "EpochManager {{ .. }}")
    }
}
