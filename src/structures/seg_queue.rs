use std::fmt;
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_epoch::{self as epoch, Atomic, Guard, Owned, Shared};
use crossbeam_utils::CachePadded;
use tracing::trace;

use self::segment::{Segment, SEGMENT_SIZE};
use crate::memory::EpochManager;
use crate::structures::collection::ProducerConsumer;
use crate::structures::utils::Backoff;
use crate::telemetry::{RetrySite, Telemetry, TelemetryHandle};

mod segment;

/// A lock-free, unbounded FIFO queue built from a chain of fixed-size segments.
///
/// Enqueuers reserve a slot in the tail segment with a single `fetch_add`, and
/// dequeuers claim the oldest slot of the head segment with a CAS. The thread
/// that reserves the last slot of a segment links the next one, and the thread
/// that claims it retires the segment once the head has moved on.
///
/// Snapshots (`iter`, `to_vec`, `try_peek`) run concurrently with dequeuers;
/// while any snapshot is in progress, dequeuers wait for readers of the slot
/// they claimed before moving the value out.
///
/// # Examples
/// ```
/// use concurrent_collections::structures::SegQueue;
///
/// let queue = SegQueue::new();
/// queue.enqueue(1);
/// queue.enqueue(2);
/// assert_eq!(queue.try_dequeue(), Some(1));
/// assert_eq!(queue.try_dequeue(), Some(2));
/// assert_eq!(queue.try_dequeue(), None);
/// ```
pub struct SegQueue<T> {
    head: CachePadded<Atomic<Segment<T>>>,
    tail: CachePadded<Atomic<Segment<T>>>,
    snapshot_takers: AtomicUsize,
    manager: EpochManager,
    telemetry: TelemetryHandle,
}

unsafe impl<T: Send> Send for SegQueue<T> {}
unsafe impl<T: Send + Sync> Sync for SegQueue<T> {}

/// A consistent view of both ends of the queue.
struct Positions<'g, T> {
    head: Shared<'g, Segment<T>>,
    tail: Shared<'g, Segment<T>>,
    head_low: usize,
    tail_high: isize,
}

/// Registration as a snapshot taker, dropped when the snapshot is done.
struct SnapshotToken<'a>(&'a AtomicUsize);

impl<'a> SnapshotToken<'a> {
    fn new(takers: &'a AtomicUsize) -> Self {
        takers.fetch_add(1, Ordering::SeqCst);
        SnapshotToken(takers)
    }
}

impl<'a> Drop for SnapshotToken<'a> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl<T> SegQueue<T> {
    pub fn new() -> Self {
        Self::with_handle(TelemetryHandle::default())
    }

    /// Create a new, empty queue reporting retries and segment growth to
    /// `sink`.
    pub fn with_telemetry(sink: Arc<dyn Telemetry>) -> Self {
        Self::with_handle(TelemetryHandle::new(Some(sink)))
    }

    fn with_handle(telemetry: TelemetryHandle) -> Self {
        let first = Owned::new(Segment::new(0)).into_shared(unsafe { epoch::unprotected() });
        SegQueue {
            head: CachePadded::new(Atomic::from(first)),
            tail: CachePadded::new(Atomic::from(first)),
            snapshot_takers: AtomicUsize::new(0),
            manager: EpochManager::new(),
            telemetry,
        }
    }

    /// Add a value to the tail of the queue. Never fails.
    pub fn enqueue(&self, value: T) {
        let guard = self.manager.pin();
        let mut backoff = Backoff::new();
        loop {
            let tail = self.tail.load(Ordering::Acquire, &guard);
            let segment = unsafe { tail.deref() };
            if let Some(index) = segment.try_reserve() {
                unsafe { segment.write(index, value) };
                if index == SEGMENT_SIZE - 1 {
                    self.grow(segment, &guard);
                }
                return;
            }
            // The segment is full and the thread that filled it has not swung
            // the tail yet.
            self.telemetry.cas_retry(RetrySite::QueueEnqueue);
            backoff.spin_once();
        }
    }

    /// Links a fresh segment after the full `segment` and makes it the tail.
    fn grow(&self, segment: &Segment<T>, guard: &Guard) {
        let index = segment.index + 1;
        let next = Owned::new(Segment::new(index)).into_shared(guard);
        segment.next.store(next, Ordering::Release);
        self.tail.store(next, Ordering::Release);
        self.telemetry.segment_grown(index);
        trace!(index, "queue segment appended");
    }

    /// Take the value at the head of the queue, or return None if it is empty.
    pub fn try_dequeue(&self) -> Option<T> {
        let guard = self.manager.pin();
        let mut backoff = Backoff::new();
        loop {
            let head = self.head.load(Ordering::Acquire, &guard);
            let segment = unsafe { head.deref() };
            if let Some((value, exhausted)) = segment.try_remove(&self.snapshot_takers, &self.telemetry) {
                if exhausted {
                    self.advance_head(head, &guard);
                }
                return Some(value);
            }
            if segment.next.load(Ordering::Acquire, &guard).is_null() {
                return None;
            }
            // Drained but the head has not moved on yet.
            backoff.spin_once();
        }
    }

    /// Moves the head past `head`, whose last slot this thread just claimed,
    /// and retires it.
    fn advance_head<'g>(&self, head: Shared<'g, Segment<T>>, guard: &'g Guard) {
        let segment = unsafe { head.deref() };
        let mut backoff = Backoff::new();
        let next = loop {
            let next = segment.next.load(Ordering::Acquire, guard);
            // The tail is swung right after `next` is linked; wait for both so
            // no thread can reach the segment once it is retired.
            if !next.is_null() && self.tail.load(Ordering::Acquire, guard) != head {
                break next;
            }
            backoff.spin_once();
        };
        self.head.store(next, Ordering::Release);
        unsafe { self.manager.retire(guard, head) };
    }

    /// Return a copy of the value at the head of the queue without removing it.
    pub fn try_peek(&self) -> Option<T>
    where
        T: Clone,
    {
        let _token = SnapshotToken::new(&self.snapshot_takers);
        let guard = self.manager.pin();
        let mut backoff = Backoff::new();
        loop {
            let segment = unsafe { self.head.load(Ordering::Acquire, &guard).deref() };
            let low = segment.low();
            if low as isize <= segment.high() {
                if let Some(value) = unsafe { segment.read_with(low, T::clone) } {
                    return Some(value);
                }
                // Dequeued under our feet; look again.
                continue;
            }
            if segment.next.load(Ordering::Acquire, &guard).is_null() {
                return None;
            }
            backoff.spin_once();
        }
    }

    pub fn is_empty(&self) -> bool {
        let guard = self.manager.pin();
        let mut backoff = Backoff::new();
        loop {
            let segment = unsafe { self.head.load(Ordering::Acquire, &guard).deref() };
            if !segment.is_empty() {
                return false;
            }
            if segment.next.load(Ordering::Acquire, &guard).is_null() {
                return true;
            }
            backoff.spin_once();
        }
    }

    /// Reads the head segment, the tail segment and their cursors until two
    /// passes agree.
    fn positions<'g>(&self, guard: &'g Guard) -> Positions<'g, T> {
        let mut backoff = Backoff::new();
        loop {
            let head = self.head.load(Ordering::Acquire, guard);
            let tail = self.tail.load(Ordering::Acquire, guard);
            let (head_segment, tail_segment) = unsafe { (head.deref(), tail.deref()) };
            let head_low = head_segment.low();
            let tail_high = tail_segment.high();
            if head == self.head.load(Ordering::Acquire, guard)
                && tail == self.tail.load(Ordering::Acquire, guard)
                && head_low == head_segment.low()
                && tail_high == tail_segment.high()
                && head_segment.index <= tail_segment.index
            {
                return Positions {
                    head,
                    tail,
                    head_low,
                    tail_high,
                };
            }
            self.telemetry.cas_retry(RetrySite::QueueSnapshot);
            backoff.spin_once();
        }
    }

    /// Number of values in the queue at some point during the call.
    pub fn len(&self) -> usize {
        let guard = self.manager.pin();
        let positions = self.positions(&guard);
        let (head, tail) = unsafe { (positions.head.deref(), positions.tail.deref()) };
        if positions.head == positions.tail {
            let count = positions.tail_high - positions.head_low as isize + 1;
            return if count > 0 { count as usize } else { 0 };
        }
        let full_segments = (tail.index - head.index - 1) as usize;
        (SEGMENT_SIZE - positions.head_low) + SEGMENT_SIZE * full_segments + (positions.tail_high + 1) as usize
    }

    fn snapshot(&self) -> Snapshot<'_, T> {
        let token = SnapshotToken::new(&self.snapshot_takers);
        let guard = self.manager.pin();
        let positions = self.positions(&guard);
        let segment = positions.head.as_raw();
        let tail = positions.tail.as_raw();
        let index = positions.head_low;
        let tail_high = positions.tail_high;
        Snapshot {
            _token: token,
            guard,
            segment,
            tail,
            index,
            tail_high,
        }
    }

    /// A snapshot iterator over the values, head first.
    ///
    /// The extent of the queue is fixed when the iterator is created. Values
    /// enqueued afterwards are not visited and values dequeued in the meantime
    /// are skipped. Until the iterator is dropped, dequeuers coordinate with it
    /// on every slot.
    pub fn iter(&self) -> Iter<'_, T>
    where
        T: Clone,
    {
        Iter {
            snapshot: self.snapshot(),
        }
    }

    /// Copy the values into a Vec, head first.
    pub fn to_vec(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.iter().collect()
    }
}

/// Walks the slots between the captured head and tail positions.
struct Snapshot<'a, T> {
    _token: SnapshotToken<'a>,
    guard: Guard,
    segment: *const Segment<T>,
    tail: *const Segment<T>,
    index: usize,
    tail_high: isize,
}

impl<'a, T> Snapshot<'a, T> {
    fn next_with<R, F: FnMut(&T) -> R>(&mut self, mut f: F) -> Option<R> {
        loop {
            let segment = unsafe { self.segment.as_ref() }?;
            let last = if ptr::eq(segment, self.tail) {
                self.tail_high
            } else {
                SEGMENT_SIZE as isize - 1
            };
            if self.index as isize <= last {
                let index = self.index;
                self.index += 1;
                if let Some(result) = unsafe { segment.read_with(index, &mut f) } {
                    return Some(result);
                }
                continue;
            }
            if ptr::eq(segment, self.tail) {
                self.segment = ptr::null();
                return None;
            }
            self.segment = segment.next.load(Ordering::Acquire, &self.guard).as_raw();
            self.index = 0;
        }
    }
}

/// Snapshot iterator returned by [`SegQueue::iter`].
pub struct Iter<'a, T> {
    snapshot: Snapshot<'a, T>,
}

impl<'a, T: Clone> Iterator for Iter<'a, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.snapshot.next_with(T::clone)
    }
}

/// Draining iterator returned by `SegQueue::into_iter`.
pub struct IntoIter<T> {
    queue: SegQueue<T>,
}

impl<T> Iterator for IntoIter<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.queue.try_dequeue()
    }
}

impl<T> IntoIterator for SegQueue<T> {
    type Item = T;
    type IntoIter = IntoIter<T>;

    fn into_iter(self) -> IntoIter<T> {
        IntoIter { queue: self }
    }
}

impl<T> Drop for SegQueue<T> {
    fn drop(&mut self) {
        unsafe {
            let guard = epoch::unprotected();
            let mut current = self.head.load(Ordering::Relaxed, guard);
            while !current.is_null() {
                let mut segment = current.into_owned();
                current = segment.next.load(Ordering::Relaxed, guard);
                segment.drop_remaining();
            }
        }
    }
}

impl<T> Default for SegQueue<T> {
    fn default() -> Self {
        SegQueue::new()
    }
}

impl<T> FromIterator<T> for SegQueue<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let queue = SegQueue::new();
        for value in iter {
            queue.enqueue(value);
        }
        queue
    }
}

impl<T> Extend<T> for SegQueue<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for value in iter {
            self.enqueue(value);
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for SegQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut list = f.debug_list();
        let mut snapshot = self.snapshot();
        while snapshot
            .next_with(|value| {
                list.entry(value);
            })
            .is_some()
        {}
        list.finish()
    }
}

impl<T: Clone> ProducerConsumer<T> for SegQueue<T> {
    fn try_add(&self, item: T) -> Result<(), T> {
        self.enqueue(item);
        Ok(())
    }

    fn try_take(&self) -> Option<T> {
        self.try_dequeue()
    }

    fn to_vec(&self) -> Vec<T> {
        SegQueue::to_vec(self)
    }

    fn len(&self) -> usize {
        SegQueue::len(self)
    }
}
