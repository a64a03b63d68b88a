//! Per-slot handshake between the thread that moves a value out of a shared
//! slot and snapshot readers that clone it in place.
//!
//! The word packs a `WRITTEN` flag (the value has been published), a `TAKEN`
//! flag (ownership of the value has left the slot) and a count of readers that
//! are currently looking at the value.

use std::sync::atomic::{AtomicUsize, Ordering};

use super::Backoff;

const WRITTEN: usize = 0b01;
const TAKEN: usize = 0b10;
const READER: usize = 0b100;

pub(crate) struct SlotState {
    state: AtomicUsize,
}

impl SlotState {
    /// A slot that has been reserved but not written yet.
    pub(crate) fn empty() -> Self {
        SlotState {
            state: AtomicUsize::new(0),
        }
    }

    /// A slot whose value is published before the slot becomes shared.
    pub(crate) fn written() -> Self {
        SlotState {
            state: AtomicUsize::new(WRITTEN),
        }
    }

    pub(crate) fn mark_written(&self) {
        self.state.fetch_or(WRITTEN, Ordering::Release);
    }

    pub(crate) fn is_written(&self) -> bool {
        self.state.load(Ordering::Acquire) & WRITTEN != 0
    }

    /// Spins until the reserving thread has published the value.
    pub(crate) fn wait_written(&self) {
        let mut backoff = Backoff::new();
        while !self.is_written() {
            backoff.spin_once();
        }
    }

    /// Runs `f` while registered as a reader, unless the value has already
    /// been taken. The slot must be written.
    pub(crate) fn read_with<R, F: FnOnce() -> R>(&self, f: F) -> Option<R> {
        let prev = self.state.fetch_add(READER, Ordering::Acquire);
        let _reader = ReaderGuard(&self.state);
        if prev & TAKEN != 0 {
            return None;
        }
        Some(f())
    }

    /// Marks the value as taken and waits until no reader is looking at it.
    /// Afterwards the caller has exclusive access to the value.
    pub(crate) fn take(&self) {
        let prev = self.state.fetch_or(TAKEN, Ordering::AcqRel);
        debug_assert!(prev & TAKEN == 0, "slot taken twice");
        if prev >= READER {
            let mut backoff = Backoff::new();
            while self.state.load(Ordering::Acquire) >= READER {
                backoff.spin_once();
            }
        }
    }

    pub(crate) fn is_taken(&self) -> bool {
        self.state.load(Ordering::Acquire) & TAKEN != 0
    }
}

/// Deregisters a reader even if the read panicked.
struct ReaderGuard<'a>(&'a AtomicUsize);

impl<'a> Drop for ReaderGuard<'a> {
    fn drop(&mut self) {
        self.0.fetch_sub(READER, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::SlotState;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_read_until_taken() {
        let slot = SlotState::written();
        assert_eq!(slot.read_with(|| 7), Some(7));
        assert!(!slot.is_taken());
        slot.take();
        assert!(slot.is_taken());
        assert_eq!(slot.read_with(|| 7), None);
    }

    #[test]
    fn test_written_flag() {
        let slot = SlotState::empty();
        assert!(!slot.is_written());
        slot.mark_written();
        assert!(slot.is_written());
        slot.wait_written();
    }

    #[test]
    fn test_take_waits_for_reader() {
        let slot = Arc::new(SlotState::written());
        let reading = Arc::new(AtomicBool::new(false));
        let finished = Arc::new(AtomicBool::new(false));

        let reader = {
            let slot = slot.clone();
            let reading = reading.clone();
            let finished = finished.clone();
            thread::spawn(move || {
                slot.read_with(|| {
                    reading.store(true, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(50));
                    finished.store(true, Ordering::SeqCst);
                })
            })
        };

        while !reading.load(Ordering::SeqCst) {
            thread::yield_now();
        }
        slot.take();
        assert!(finished.load(Ordering::SeqCst));
        assert_eq!(reader.join().unwrap(), Some(()));
    }
}
