use std::cell::UnsafeCell;
use std::cmp;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicIsize, AtomicUsize, Ordering};

use crossbeam_epoch::Atomic;
use crossbeam_utils::CachePadded;

use crate::structures::utils::{Backoff, SlotState};
use crate::telemetry::{RetrySite, TelemetryHandle};

pub(crate) const SEGMENT_SIZE: usize = 32;

struct Slot<T> {
    value: UnsafeCell<MaybeUninit<T>>,
    state: SlotState,
}

impl<T> Slot<T> {
    fn new() -> Self {
        Slot {
            value: UnsafeCell::new(MaybeUninit::uninit()),
            state: SlotState::empty(),
        }
    }
}

/// A fixed-size chunk of the queue.
///
/// Enqueuers reserve slots by bumping `high` and dequeuers claim them by moving
/// `low` forward with a CAS, so `low > high` means the segment holds nothing.
/// `high` keeps counting past the last slot once the segment is full; readers
/// always clamp it.
pub(crate) struct Segment<T> {
    slots: [Slot<T>; SEGMENT_SIZE],
    pub(crate) next: Atomic<Segment<T>>,
    pub(crate) index: u64,
    low: CachePadded<AtomicUsize>,
    high: CachePadded<AtomicIsize>,
}

impl<T> Segment<T> {
    pub(crate) fn new(index: u64) -> Self {
        Segment {
            slots: [(); SEGMENT_SIZE].map(|_| Slot::new()),
            next: Atomic::null(),
            index,
            low: CachePadded::new(AtomicUsize::new(0)),
            high: CachePadded::new(AtomicIsize::new(-1)),
        }
    }

    /// Index of the first slot that has not been claimed, at most `SEGMENT_SIZE`.
    pub(crate) fn low(&self) -> usize {
        cmp::min(self.low.load(Ordering::SeqCst), SEGMENT_SIZE)
    }

    /// Index of the last reserved slot, at most `SEGMENT_SIZE - 1`.
    pub(crate) fn high(&self) -> isize {
        cmp::min(self.high.load(Ordering::SeqCst), SEGMENT_SIZE as isize - 1)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.low() as isize > self.high()
    }

    /// Reserves the next free slot, or returns None if the segment is full.
    pub(crate) fn try_reserve(&self) -> Option<usize> {
        if self.high.load(Ordering::SeqCst) >= SEGMENT_SIZE as isize - 1 {
            return None;
        }
        let index = self.high.fetch_add(1, Ordering::SeqCst) + 1;
        if index < SEGMENT_SIZE as isize {
            Some(index as usize)
        } else {
            None
        }
    }

    /// Publishes `value` into a slot reserved by this thread.
    ///
    /// # Safety
    /// `index` must come from `try_reserve` and be written exactly once.
    pub(crate) unsafe fn write(&self, index: usize, value: T) {
        let slot = &self.slots[index];
        (*slot.value.get()).write(value);
        slot.state.mark_written();
    }

    /// Claims the oldest unclaimed slot and moves its value out.
    ///
    /// With no snapshot taker registered the value is read straight away.
    /// Otherwise the slot is marked taken first, which waits for any reader
    /// that is cloning it. Returns the value and whether it came from the last
    /// slot, in which case the caller must move the queue head on.
    pub(crate) fn try_remove(
        &self,
        snapshot_takers: &AtomicUsize,
        telemetry: &TelemetryHandle,
    ) -> Option<(T, bool)> {
        let mut backoff = Backoff::new();
        let mut low = self.low();
        let mut high = self.high();
        while (low as isize) <= high {
            if self
                .low
                .compare_exchange(low, low + 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                let slot = &self.slots[low];
                slot.state.wait_written();
                if snapshot_takers.load(Ordering::SeqCst) != 0 {
                    slot.state.take();
                }
                let value = unsafe { (*slot.value.get()).assume_init_read() };
                return Some((value, low + 1 == SEGMENT_SIZE));
            }
            telemetry.cas_retry(RetrySite::QueueDequeue);
            backoff.spin_once();
            low = self.low();
            high = self.high();
        }
        None
    }

    /// Runs `f` on the value in slot `index` unless it has already been moved
    /// out. Waits for the value if the slot is reserved but not yet written.
    ///
    /// # Safety
    /// `index` must have been reserved, and the caller must be registered as a
    /// snapshot taker since before it last observed `low`.
    pub(crate) unsafe fn read_with<R, F: FnOnce(&T) -> R>(&self, index: usize, f: F) -> Option<R> {
        let slot = &self.slots[index];
        slot.state.wait_written();
        slot.state.read_with(|| f((*slot.value.get()).assume_init_ref()))
    }

    /// Drops every value that has been written but not claimed.
    ///
    /// # Safety
    /// No other thread may be using the segment.
    pub(crate) unsafe fn drop_remaining(&mut self) {
        let high = self.high();
        for index in self.low()..SEGMENT_SIZE {
            if index as isize > high {
                break;
            }
            (*self.slots[index].value.get()).assume_init_drop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Segment, SEGMENT_SIZE};
    use crate::telemetry::TelemetryHandle;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_fill_and_drain() {
        let takers = AtomicUsize::new(0);
        let telemetry = TelemetryHandle::default();
        let segment: Segment<usize> = Segment::new(0);
        assert!(segment.is_empty());
        assert_eq!(segment.try_remove(&takers, &telemetry), None);

        for i in 0..SEGMENT_SIZE {
            let index = segment.try_reserve().unwrap();
            assert_eq!(index, i);
            unsafe { segment.write(index, i * 10) };
        }
        assert_eq!(segment.try_reserve(), None);
        assert_eq!(segment.high(), SEGMENT_SIZE as isize - 1);

        for i in 0..SEGMENT_SIZE {
            let (value, last) = segment.try_remove(&takers, &telemetry).unwrap();
            assert_eq!(value, i * 10);
            assert_eq!(last, i == SEGMENT_SIZE - 1);
        }
        assert!(segment.is_empty());
        assert_eq!(segment.low(), SEGMENT_SIZE);
    }

    #[test]
    fn test_taken_slot_not_readable() {
        let takers = AtomicUsize::new(1);
        let telemetry = TelemetryHandle::default();
        let segment: Segment<String> = Segment::new(3);
        let index = segment.try_reserve().unwrap();
        unsafe { segment.write(index, "a".to_owned()) };
        assert_eq!(unsafe { segment.read_with(index, |v| v.clone()) }, Some("a".to_owned()));
        let (value, _) = segment.try_remove(&takers, &telemetry).unwrap();
        assert_eq!(value, "a");
        assert_eq!(unsafe { segment.read_with(index, |v| v.clone()) }, None);
    }

    #[test]
    fn test_drop_remaining() {
        let takers = AtomicUsize::new(0);
        let telemetry = TelemetryHandle::default();
        let mut segment: Segment<Vec<u8>> = Segment::new(0);
        for _ in 0..5 {
            let index = segment.try_reserve().unwrap();
            unsafe { segment.write(index, vec![1, 2, 3]) };
        }
        segment.try_remove(&takers, &telemetry).unwrap();
        assert_eq!(segment.low(), 1);
        unsafe { segment.drop_remaining() };
    }
}
