use std::fmt;
use std::marker::PhantomData;
use std::mem::ManuallyDrop;
use std::ptr;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crossbeam_epoch::{self as epoch, Atomic, Guard, Owned, Shared};
use tracing::trace;

use crate::error;
use crate::memory::EpochManager;
use crate::structures::collection::ProducerConsumer;
use crate::structures::utils::{Backoff, ContentionBackoff, SlotState};
use crate::telemetry::{RetrySite, Telemetry, TelemetryHandle};

/// A lock-free LIFO stack.
///
/// The stack is a singly-linked list of immutable nodes whose head is swung with
/// compare-and-swap. Ranges are pushed by building a private chain first and
/// publishing it with a single CAS, and popped by moving the head `count` links
/// down in a single CAS, so no other push or pop can interleave inside a range.
///
/// Nodes are freshly allocated on every push and retired to an epoch collector
/// when popped, so a CAS can never succeed against a recycled head.
///
/// # Examples
/// ```
/// use concurrent_collections::structures::Stack;
///
/// let stack = Stack::new();
/// stack.push_range(vec![1, 2, 3]);
/// assert_eq!(stack.try_pop(), Some(3));
/// assert_eq!(stack.len(), 2);
/// ```
pub struct Stack<T> {
    head: Atomic<Node<T>>,
    manager: EpochManager,
    telemetry: TelemetryHandle,
}

unsafe impl<T: Send> Send for Stack<T> {}
unsafe impl<T: Send + Sync> Sync for Stack<T> {}

struct Node<T> {
    value: ManuallyDrop<T>,
    next: Atomic<Node<T>>,
    state: SlotState,
}

impl<T> Node<T> {
    fn new(value: T) -> Self {
        Node {
            value: ManuallyDrop::new(value),
            next: Atomic::null(),
            state: SlotState::written(),
        }
    }

    fn read(&self) -> Option<T>
    where
        T: Clone,
    {
        self.state.read_with(|| (*self.value).clone())
    }

    /// Moves the value out.
    ///
    /// # Safety
    /// The node must have been unlinked by the caller and not taken before.
    unsafe fn take(&self) -> T {
        self.state.take();
        ptr::read(&*self.value)
    }
}

impl<T> Stack<T> {
    /// Create a new, empty Stack.
    pub fn new() -> Self {
        Stack {
            head: Atomic::null(),
            manager: EpochManager::new(),
            telemetry: TelemetryHandle::default(),
        }
    }

    /// Create a new, empty Stack reporting CAS retries to `sink`.
    pub fn with_telemetry(sink: Arc<dyn Telemetry>) -> Self {
        Stack {
            head: Atomic::null(),
            manager: EpochManager::new(),
            telemetry: TelemetryHandle::new(Some(sink)),
        }
    }

    /// Push a value onto the top of the stack.
    pub fn push(&self, value: T) {
        let guard = self.manager.pin();
        let node = Owned::new(Node::new(value)).into_shared(&guard);
        self.push_core(node, node, &guard);
    }

    /// Push every item of `items` as one atomic unit. The last item ends up on
    /// top.
    pub fn push_range<I: IntoIterator<Item = T>>(&self, items: I) {
        let guard = self.manager.pin();
        let mut items = items.into_iter();
        let first = match items.next() {
            Some(value) => value,
            None => return,
        };
        let bottom = Owned::new(Node::new(first)).into_shared(&guard);
        let mut top = bottom;
        for value in items {
            let node = Owned::new(Node::new(value));
            node.next.store(top, Ordering::Relaxed);
            top = node.into_shared(&guard);
        }
        self.push_core(top, bottom, &guard);
    }

    /// Push `count` items of `items` starting at `start` as one atomic unit.
    pub fn push_slice(&self, items: &[T], start: usize, count: usize) -> error::Result<()>
    where
        T: Clone,
    {
        error::check_range(start, count, items.len())?;
        self.push_range(items[start..start + count].iter().cloned());
        Ok(())
    }

    /// Links the private chain `top..=bottom` above the current head.
    fn push_core<'g>(&self, top: Shared<'g, Node<T>>, bottom: Shared<'g, Node<T>>, guard: &'g Guard) {
        let mut backoff = Backoff::new();
        loop {
            let head = self.head.load(Ordering::Relaxed, guard);
            unsafe { bottom.deref() }.next.store(head, Ordering::Relaxed);
            match self
                .head
                .compare_exchange(head, top, Ordering::Release, Ordering::Relaxed, guard)
            {
                Ok(_) => return,
                Err(_) => {
                    self.telemetry.cas_retry(RetrySite::StackPush);
                    backoff.spin_once();
                }
            }
        }
    }

    /// Take the value on top of the stack, or return None if it is empty.
    pub fn try_pop(&self) -> Option<T> {
        let guard = self.manager.pin();
        let (popped, first) = self.try_pop_core(1, &guard);
        if popped == 0 {
            return None;
        }
        let mut result = None;
        unsafe { self.drain_unlinked(first, popped, &guard, |value| result = Some(value)) };
        result
    }

    /// Pop up to `count` values as one atomic unit, top first.
    pub fn try_pop_range(&self, count: usize) -> Vec<T> {
        if count == 0 {
            return Vec::new();
        }
        let guard = self.manager.pin();
        let (popped, first) = self.try_pop_core(count, &guard);
        let mut values = Vec::with_capacity(popped);
        unsafe { self.drain_unlinked(first, popped, &guard, |value| values.push(value)) };
        values
    }

    /// Pop up to `count` values as one atomic unit into `buffer[start..]`, top
    /// first, returning how many were popped. Slots past the returned count are
    /// left untouched.
    pub fn try_pop_range_into(&self, buffer: &mut [T], start: usize, count: usize) -> error::Result<usize> {
        error::check_range(start, count, buffer.len())?;
        if count == 0 {
            return Ok(0);
        }
        let guard = self.manager.pin();
        let (popped, first) = self.try_pop_core(count, &guard);
        let mut slots = buffer[start..].iter_mut();
        unsafe {
            self.drain_unlinked(first, popped, &guard, |value| {
                if let Some(slot) = slots.next() {
                    *slot = value;
                }
            })
        };
        Ok(popped)
    }

    /// Unlinks up to `count` nodes from the top with one CAS. Returns how many
    /// were unlinked and the first of them; the rest follow through `next`.
    fn try_pop_core<'g>(&self, count: usize, guard: &'g Guard) -> (usize, Shared<'g, Node<T>>) {
        let mut backoff = ContentionBackoff::new();
        loop {
            let head = self.head.load(Ordering::Acquire, guard);
            let mut last = match unsafe { head.as_ref() } {
                Some(node) => node,
                None => return (0, Shared::null()),
            };
            let mut popped = 1;
            while popped < count {
                match unsafe { last.next.load(Ordering::Acquire, guard).as_ref() } {
                    Some(next) => {
                        last = next;
                        popped += 1;
                    }
                    None => break,
                }
            }
            let new_head = last.next.load(Ordering::Acquire, guard);
            if self
                .head
                .compare_exchange(head, new_head, Ordering::AcqRel, Ordering::Acquire, guard)
                .is_ok()
            {
                return (popped, head);
            }

            self.telemetry.cas_retry(RetrySite::StackPop);
            if backoff.is_yielding() {
                trace!(rounds = backoff.rounds(), "stack pop backing off");
            }
            backoff.wait();
        }
    }

    /// Moves the values out of `count` nodes unlinked by `try_pop_core`, in pop
    /// order, and retires the nodes.
    unsafe fn drain_unlinked<'g, F: FnMut(T)>(
        &self,
        first: Shared<'g, Node<T>>,
        count: usize,
        guard: &'g Guard,
        mut sink: F,
    ) {
        let mut current = first;
        for _ in 0..count {
            let node = current.deref();
            let next = node.next.load(Ordering::Acquire, guard);
            sink(node.take());
            self.manager.retire(guard, current);
            current = next;
        }
    }

    /// Return a copy of the value on top of the stack without removing it.
    pub fn try_peek(&self) -> Option<T>
    where
        T: Clone,
    {
        let guard = self.manager.pin();
        loop {
            let head = self.head.load(Ordering::Acquire, &guard);
            let node = unsafe { head.as_ref() }?;
            // A taken node has already been unlinked; look at the new top.
            if let Some(value) = node.read() {
                return Some(value);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        let guard = self.manager.pin();
        self.head.load(Ordering::Acquire, &guard).is_null()
    }

    /// Number of values on the stack. This walks the whole chain from the head
    /// observed at the start of the call.
    pub fn len(&self) -> usize {
        let guard = self.manager.pin();
        let mut count = 0;
        let mut current = self.head.load(Ordering::Acquire, &guard);
        while let Some(node) = unsafe { current.as_ref() } {
            count += 1;
            current = node.next.load(Ordering::Acquire, &guard);
        }
        count
    }

    /// Remove every value. The detached chain is dropped once no thread can be
    /// reading it any more.
    pub fn clear(&self) {
        let guard = self.manager.pin();
        let head = self.head.swap(Shared::null(), Ordering::AcqRel, &guard);
        if head.is_null() {
            return;
        }
        let chain = head.as_raw();
        unsafe { self.manager.retire_with(&guard, move || free_chain(chain)) };
    }

    /// A snapshot iterator over the values, top first.
    ///
    /// The head is captured once when the iterator is created; values popped
    /// while the iteration is in progress are skipped. The iterator keeps this
    /// thread pinned until it is dropped.
    pub fn iter(&self) -> Iter<'_, T>
    where
        T: Clone,
    {
        let guard = self.manager.pin();
        let current = self.head.load(Ordering::Acquire, &guard).as_raw();
        Iter {
            guard,
            current,
            _marker: PhantomData,
        }
    }

    /// Copy the values into a Vec, top first.
    pub fn to_vec(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.iter().collect()
    }
}

/// Frees a chain of nodes that no thread can reach, dropping their values.
unsafe fn free_chain<T>(mut current: *const Node<T>) {
    while !current.is_null() {
        let mut node = Box::from_raw(current as *mut Node<T>);
        current = node.next.load(Ordering::Relaxed, epoch::unprotected()).as_raw();
        ManuallyDrop::drop(&mut node.value);
    }
}

impl<T> Drop for Stack<T> {
    fn drop(&mut self) {
        unsafe {
            let head = self.head.load(Ordering::Relaxed, epoch::unprotected());
            free_chain(head.as_raw());
        }
    }
}

impl<T> Default for Stack<T> {
    fn default() -> Self {
        Stack::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for Stack<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let guard = self.manager.pin();
        let mut list = f.debug_list();
        let mut current = self.head.load(Ordering::Acquire, &guard);
        while let Some(node) = unsafe { current.as_ref() } {
            node.state.read_with(|| {
                list.entry(&*node.value);
            });
            current = node.next.load(Ordering::Acquire, &guard);
        }
        list.finish()
    }
}

/// Snapshot iterator returned by [`Stack::iter`].
pub struct Iter<'a, T> {
    guard: Guard,
    current: *const Node<T>,
    _marker: PhantomData<&'a Stack<T>>,
}

impl<'a, T: Clone> Iterator for Iter<'a, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        loop {
            let node = unsafe { self.current.as_ref() }?;
            self.current = node.next.load(Ordering::Acquire, &self.guard).as_raw();
            if let Some(value) = node.read() {
                return Some(value);
            }
        }
    }
}

/// Draining iterator returned by `Stack::into_iter`.
pub struct IntoIter<T> {
    stack: Stack<T>,
}

impl<T> Iterator for IntoIter<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.stack.try_pop()
    }
}

impl<T> IntoIterator for Stack<T> {
    type Item = T;
    type IntoIter = IntoIter<T>;

    fn into_iter(self) -> IntoIter<T> {
        IntoIter { stack: self }
    }
}

impl<T> FromIterator<T> for Stack<T> {
    /// Pushes the items in order, so the last item ends up on top.
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let stack = Stack::new();
        stack.push_range(iter);
        stack
    }
}

impl<T> Extend<T> for Stack<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        self.push_range(iter);
    }
}

impl<T: Clone> ProducerConsumer<T> for Stack<T> {
    fn try_add(&self, item: T) -> Result<(), T> {
        self.push(item);
        Ok(())
    }

    fn try_take(&self) -> Option<T> {
        self.try_pop()
    }

    fn to_vec(&self) -> Vec<T> {
        Stack::to_vec(self)
    }

    fn len(&self) -> usize {
        Stack::len(self)
    }
}
