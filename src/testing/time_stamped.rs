use std::sync::atomic::{AtomicU64, Ordering};

/// Logical clock shared by every thread of one run. Stamps are unique.
pub struct Clock {
    now: AtomicU64,
}

impl Clock {
    pub fn new() -> Self {
        Clock {
            now: AtomicU64::new(0),
        }
    }

    pub fn tick(&self) -> u64 {
        self.now.fetch_add(1, Ordering::SeqCst)
    }
}

/// One completed operation of the concurrent object.
#[derive(Debug, Clone)]
pub struct TimeStamped<Op, Ret> {
    pub thread: usize,
    pub op: Op,
    pub ret: Ret,
    pub invoked: u64,
    pub returned: u64,
}

impl<Op, Ret> TimeStamped<Op, Ret> {
    /// True if this operation returned before `other` was invoked, so it must
    /// be linearized first.
    pub fn precedes(&self, other: &Self) -> bool {
        self.returned < other.invoked
    }
}
