use std::borrow::Borrow;
use std::collections::hash_map::RandomState;
use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::marker::PhantomData;
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_epoch::{self as epoch, Atomic, Guard, Owned, Shared};
use parking_lot::MutexGuard;
use rand::Rng;
use tracing::debug;

pub use self::config::{default_concurrency_level, MapConfig, ResizePolicy, DEFAULT_CAPACITY};
pub use self::data_guard::DataGuard;
use self::table::{new_locks, Hashing, Node, Table};
use crate::error::{CollectionError, Result};
use crate::memory::EpochManager;
use crate::structures::collection::ProducerConsumer;
use crate::telemetry::{RetrySite, TelemetryHandle};

mod config;
mod data_guard;
mod table;

/// A concurrent hash map with striped locking and lock-free reads.
///
/// Buckets are partitioned over a set of stripe locks; a mutation takes only
/// the lock of its key's stripe, while lookups and iteration take no lock at
/// all. When a stripe holds more entries than its budget the table grows,
/// which takes every lock in ascending order and installs a new table with a
/// single store. Whole-map operations (`len`, `to_vec`, `clear`, ...) also
/// take every lock.
///
/// Entries are never mutated in place: updates link a new node and retire the
/// old one, so references handed out through [`DataGuard`] stay valid.
///
/// # Examples
/// ```
/// use concurrent_collections::structures::HashMap;
///
/// let map = HashMap::new();
/// assert!(map.try_add(1, "a"));
/// assert!(!map.try_add(1, "b"));
/// assert_eq!(map.get_value(&1), Ok("a"));
/// ```
pub struct HashMap<K, V, S = RandomState> {
    table: Atomic<Table<K, V>>,
    budget: AtomicUsize,
    /// Number of collision-triggered rehashes so far.
    rehashes: AtomicUsize,
    hash_builder: S,
    grow_lock_array: bool,
    policy: ResizePolicy,
    manager: EpochManager,
    telemetry: TelemetryHandle,
}

/// A table with one of its stripes locked.
struct LockedStripe<'g, K, V> {
    table_ptr: Shared<'g, Table<K, V>>,
    table: &'g Table<K, V>,
    hash: u64,
    bucket: usize,
    stripe: usize,
    _lock: MutexGuard<'g, ()>,
}

/// The current table with every stripe locked.
struct LockedTable<'g, K, V> {
    table_ptr: Shared<'g, Table<K, V>>,
    table: &'g Table<K, V>,
    _locks: Vec<MutexGuard<'g, ()>>,
}

/// A link found by [`search`] together with the node it points to.
type Found<'g, K, V> = (&'g Atomic<Node<K, V>>, Shared<'g, Node<K, V>>);

/// Walks the chain of `bucket` looking for `key`. Returns the match, if any,
/// and how many other nodes were passed on the way.
fn search<'g, K, V, Q>(
    table: &'g Table<K, V>,
    bucket: usize,
    hash: u64,
    key: &Q,
    guard: &'g Guard,
) -> (Option<Found<'g, K, V>>, usize)
where
    K: Borrow<Q>,
    Q: Eq + ?Sized,
{
    let mut link = &table.buckets[bucket];
    let mut passed = 0;
    loop {
        let current = link.load(Ordering::Acquire, guard);
        let node = match unsafe { current.as_ref() } {
            Some(node) => node,
            None => return (None, passed),
        };
        if node.hash == hash && node.key.borrow() == key {
            return (Some((link, current)), passed);
        }
        link = &node.next;
        passed += 1;
    }
}

impl<K, V> HashMap<K, V, RandomState> {
    /// Creates an empty map with the default capacity and concurrency level.
    pub fn new() -> Self {
        Self::with_capacity_and_hasher(DEFAULT_CAPACITY, RandomState::new())
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, RandomState::new())
    }
}

impl<K, V, S> HashMap<K, V, S> {
    pub fn with_hasher(hash_builder: S) -> Self {
        Self::with_capacity_and_hasher(DEFAULT_CAPACITY, hash_builder)
    }

    pub fn with_capacity_and_hasher(capacity: usize, hash_builder: S) -> Self {
        Self::build(MapConfig::default().capacity(capacity), hash_builder)
    }

    /// Creates an empty map from an explicit configuration.
    ///
    /// Fails with [`CollectionError::InvalidConcurrencyLevel`] if the
    /// configured concurrency level is zero.
    pub fn with_config(config: MapConfig, hash_builder: S) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config, hash_builder))
    }

    fn build(config: MapConfig, hash_builder: S) -> Self {
        let buckets = config.initial_buckets();
        let table = Table::with_fresh_locks(buckets, config.concurrency_level);
        HashMap {
            table: Atomic::new(table),
            budget: AtomicUsize::new((buckets / config.concurrency_level).max(1)),
            rehashes: AtomicUsize::new(0),
            hash_builder,
            grow_lock_array: config.grow_lock_array,
            policy: config.resize,
            manager: EpochManager::new(),
            telemetry: TelemetryHandle::new(config.telemetry),
        }
    }

    pub fn hasher(&self) -> &S {
        &self.hash_builder
    }
}

impl<K, V, S> HashMap<K, V, S>
where
    K: Hash + Eq + Clone,
    V: Clone,
    S: BuildHasher,
{
    fn find<'g, Q>(&self, key: &Q, guard: &'g Guard) -> Option<&'g Node<K, V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let table = unsafe { self.table.load(Ordering::Acquire, guard).deref() };
        let hash = table.hashing.hash(&self.hash_builder, key);
        let bucket = table.bucket_index(hash);
        let (found, _) = search(table, bucket, hash, key, guard);
        found.map(|(_, node)| unsafe { node.deref() })
    }

    /// Locks the stripe that owns `key` in the current table.
    fn lock_key<'g, Q>(&self, key: &Q, guard: &'g Guard) -> LockedStripe<'g, K, V>
    where
        K: Borrow<Q>,
        Q: Hash + ?Sized,
    {
        loop {
            let table_ptr = self.table.load(Ordering::Acquire, guard);
            let table = unsafe { table_ptr.deref() };
            let hash = table.hashing.hash(&self.hash_builder, key);
            let bucket = table.bucket_index(hash);
            let stripe = table.lock_index(bucket);
            let lock = table.locks[stripe].lock();
            self.telemetry.lock_acquired(stripe);

            // If the table was replaced while we waited, the key may now live
            // under a lock we do not hold.
            if self.table.load(Ordering::Acquire, guard) == table_ptr {
                return LockedStripe {
                    table_ptr,
                    table,
                    hash,
                    bucket,
                    stripe,
                    _lock: lock,
                };
            }
            drop(lock);
            self.telemetry.cas_retry(RetrySite::MapStaleTable);
        }
    }

    /// Locks lock 0 first, then the rest of the current table's locks in
    /// order.
    fn lock_all<'g>(&self, guard: &'g Guard) -> LockedTable<'g, K, V> {
        let seen = unsafe { self.table.load(Ordering::Acquire, guard).deref() };
        let mut locks = Vec::with_capacity(seen.locks.len());
        locks.push(seen.locks[0].lock());
        self.telemetry.lock_acquired(0);

        // Tables are only replaced under lock 0, which every table shares.
        let table_ptr = self.table.load(Ordering::Acquire, guard);
        let table = unsafe { table_ptr.deref() };
        for (stripe, lock) in table.locks.iter().enumerate().skip(1) {
            locks.push(lock.lock());
            self.telemetry.lock_acquired(stripe);
        }
        LockedTable {
            table_ptr,
            table,
            _locks: locks,
        }
    }

    /// Replaces the node behind `link` with one holding `value`. The caller
    /// holds the stripe lock.
    fn replace<'g>(
        &self,
        link: &'g Atomic<Node<K, V>>,
        current: Shared<'g, Node<K, V>>,
        key: K,
        value: V,
        hash: u64,
        guard: &'g Guard,
    ) -> &'g V {
        let old = unsafe { current.deref() };
        let replacement = Owned::new(Node {
            key,
            value,
            hash,
            next: Atomic::from(old.next.load(Ordering::Acquire, guard)),
        })
        .into_shared(guard);
        link.store(replacement, Ordering::Release);
        unsafe {
            self.manager.retire(guard, current);
            &replacement.deref().value
        }
    }

    /// Adds `key` unless it is present, in which case the entry is replaced if
    /// `update` is set and left alone otherwise. Returns whether a new entry
    /// was added and the value stored for the key afterwards.
    fn insert<'g>(&self, key: K, value: V, update: bool, guard: &'g Guard) -> (bool, &'g V)
    where
        K: 'g,
        V: 'g,
    {
        let locked = self.lock_key(&key, guard);
        let (found, passed) = search(locked.table, locked.bucket, locked.hash, &key, guard);
        if let Some((link, current)) = found {
            if update {
                return (false, self.replace(link, current, key, value, locked.hash, guard));
            }
            return (false, unsafe { &current.deref().value });
        }

        let head = &locked.table.buckets[locked.bucket];
        let node = Owned::new(Node {
            key,
            value,
            hash: locked.hash,
            next: Atomic::from(head.load(Ordering::Acquire, guard)),
        })
        .into_shared(guard);
        head.store(node, Ordering::Release);

        let count = locked.table.increment(locked.stripe);
        let over_budget = count > self.budget.load(Ordering::SeqCst);
        let rehash = if passed > self.policy.collision_threshold && locked.table.hashing.salt.is_none() {
            Some(self.rehashes.load(Ordering::SeqCst))
        } else {
            None
        };
        let table_ptr = locked.table_ptr;
        drop(locked);

        // Growing takes every lock, so it has to wait until ours is released.
        if over_budget || rehash.is_some() {
            self.grow_table(table_ptr, rehash, guard);
        }
        (true, unsafe { &node.deref().value })
    }

    /// Grows `seen`, or rehashes it with a fresh salt if `rehash` carries the
    /// current rehash count. Does nothing if another thread got there first.
    fn grow_table<'g>(&self, seen: Shared<'g, Table<K, V>>, rehash: Option<usize>, guard: &'g Guard) {
        let seen_table = unsafe { seen.deref() };
        let _first = seen_table.locks[0].lock();
        self.telemetry.lock_acquired(0);

        let regenerate = rehash.map_or(false, |count| count == self.rehashes.load(Ordering::SeqCst));
        let table_ptr = self.table.load(Ordering::Acquire, guard);
        if !regenerate {
            if table_ptr != seen {
                return;
            }
            let entries = seen_table.total();
            if self.policy.is_sparse(entries, seen_table.buckets.len()) {
                let budget = self.budget.load(Ordering::SeqCst).saturating_mul(2);
                self.budget.store(budget, Ordering::SeqCst);
                debug!(budget, entries, "map is sparse, doubled the resize budget");
                return;
            }
        }

        let table = unsafe { table_ptr.deref() };
        let (mut bucket_len, capped) = self.policy.next_bucket_len(table.buckets.len());
        if capped {
            bucket_len = bucket_len.max(table.buckets.len());
        }
        let mut held = Vec::with_capacity(table.locks.len());
        for (stripe, lock) in table.locks.iter().enumerate().skip(1) {
            held.push(lock.lock());
            self.telemetry.lock_acquired(stripe);
        }

        let lock_len = self.policy.next_lock_len(table.locks.len(), self.grow_lock_array);
        let hashing = if regenerate {
            Hashing::salted(rand::thread_rng().gen())
        } else {
            table.hashing
        };
        let grown = Table::new(bucket_len, new_locks(table.locks.to_vec(), lock_len), hashing);
        for bucket in table.buckets.iter() {
            let mut current = bucket.load(Ordering::Acquire, guard);
            while let Some(node) = unsafe { current.as_ref() } {
                let hash = if regenerate {
                    hashing.hash(&self.hash_builder, &node.key)
                } else {
                    node.hash
                };
                let index = grown.bucket_index(hash);
                let head = &grown.buckets[index];
                head.store(
                    Owned::new(Node {
                        key: node.key.clone(),
                        value: node.value.clone(),
                        hash,
                        next: Atomic::from(head.load(Ordering::Relaxed, guard)),
                    }),
                    Ordering::Relaxed,
                );
                grown.increment(grown.lock_index(index));
                current = node.next.load(Ordering::Acquire, guard);
            }
        }

        let budget = if capped {
            usize::MAX
        } else {
            (bucket_len / lock_len).max(1)
        };
        self.budget.store(budget, Ordering::SeqCst);
        self.table.store(Owned::new(grown), Ordering::Release);
        if regenerate {
            self.rehashes.fetch_add(1, Ordering::SeqCst);
        }
        unsafe { self.manager.retire(guard, table_ptr) };

        self.telemetry.table_resized(bucket_len, lock_len);
        debug!(
            buckets = bucket_len,
            locks = lock_len,
            rehashed = regenerate,
            "map table resized"
        );
    }

    /// Removes the entry for `key` if `condition` accepts its value.
    fn remove_if<'g, Q, F>(&self, key: &Q, condition: F, guard: &'g Guard) -> Option<&'g V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        F: FnOnce(&V) -> bool,
        K: 'g,
        V: 'g,
    {
        let locked = self.lock_key(key, guard);
        let (found, _) = search(locked.table, locked.bucket, locked.hash, key, guard);
        let (link, current) = found?;
        let node = unsafe { current.deref() };
        if !condition(&node.value) {
            return None;
        }
        link.store(node.next.load(Ordering::Acquire, guard), Ordering::Release);
        locked.table.decrement(locked.stripe);
        unsafe { self.manager.retire(guard, current) };
        Some(&node.value)
    }

    /// Replaces the entry for `key` with `value` if `condition` accepts the
    /// current node.
    fn replace_if<'g, F>(&self, key: K, value: V, condition: F, guard: &'g Guard) -> Option<&'g V>
    where
        F: FnOnce(&Node<K, V>) -> bool,
        K: 'g,
        V: 'g,
    {
        let locked = self.lock_key(&key, guard);
        let (found, _) = search(locked.table, locked.bucket, locked.hash, &key, guard);
        let (link, current) = found?;
        if !condition(unsafe { current.deref() }) {
            return None;
        }
        Some(self.replace(link, current, key, value, locked.hash, guard))
    }

    /// Adds the entry if `key` is not present yet.
    pub fn try_add(&self, key: K, value: V) -> bool {
        let guard = self.manager.pin();
        self.insert(key, value, false, &guard).0
    }

    /// Adds the entry, failing with [`CollectionError::DuplicateKey`] if the
    /// key is already present.
    pub fn add(&self, key: K, value: V) -> Result<()> {
        if self.try_add(key, value) {
            Ok(())
        } else {
            Err(CollectionError::DuplicateKey)
        }
    }

    /// Inserts or overwrites the entry for `key`.
    pub fn set(&self, key: K, value: V) {
        let guard = self.manager.pin();
        self.insert(key, value, true, &guard);
    }

    /// A copy of the value for `key`. Takes no lock.
    pub fn try_get_value<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let guard = self.manager.pin();
        self.find(key, &guard).map(|node| node.value.clone())
    }

    /// Like [`try_get_value`](HashMap::try_get_value) but fails with
    /// [`CollectionError::KeyNotFound`] for a missing key.
    pub fn get_value<Q>(&self, key: &Q) -> Result<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.try_get_value(key).ok_or(CollectionError::KeyNotFound)
    }

    /// Borrows the entry for `key` without cloning it. Takes no lock.
    pub fn get<Q>(&self, key: &Q) -> Option<DataGuard<'_, K, V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let guard = self.manager.pin();
        let node = self.find(key, &guard).map(|node| node as *const Node<K, V>)?;
        Some(unsafe { DataGuard::new(node, guard) })
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let guard = self.manager.pin();
        self.find(key, &guard).is_some()
    }

    /// Removes the entry for `key`, returning its value.
    pub fn try_remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let guard = self.manager.pin();
        self.remove_if(key, |_| true, &guard).cloned()
    }

    /// Removes the entry for `key` only if its value equals `value`.
    pub fn try_remove_if_eq<Q>(&self, key: &Q, value: &V) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: PartialEq,
    {
        let guard = self.manager.pin();
        self.remove_if(key, |current| current == value, &guard).is_some()
    }

    /// Sets the value for `key` to `value` if it currently equals
    /// `comparison`.
    pub fn try_update(&self, key: K, value: V, comparison: &V) -> bool
    where
        V: PartialEq,
    {
        let guard = self.manager.pin();
        self.replace_if(key, value, |node| node.value == *comparison, &guard)
            .is_some()
    }

    /// Returns the value for `key`, adding `value` first if the key is missing.
    pub fn get_or_add(&self, key: K, value: V) -> V {
        let guard = self.manager.pin();
        if let Some(node) = self.find(&key, &guard) {
            return node.value.clone();
        }
        self.insert(key, value, false, &guard).1.clone()
    }

    /// Returns the value for `key`, adding the result of `factory` first if
    /// the key is missing. The factory runs without any lock held, so under
    /// contention it may run even though another thread's value wins.
    pub fn get_or_add_with<F>(&self, key: K, factory: F) -> V
    where
        F: FnOnce(&K) -> V,
    {
        let guard = self.manager.pin();
        if let Some(node) = self.find(&key, &guard) {
            return node.value.clone();
        }
        let value = factory(&key);
        self.insert(key, value, false, &guard).1.clone()
    }

    /// [`get_or_add_with`](HashMap::get_or_add_with) with an extra argument
    /// handed to the factory.
    pub fn get_or_add_with_arg<A, F>(&self, key: K, factory: F, arg: A) -> V
    where
        F: FnOnce(&K, A) -> V,
    {
        self.get_or_add_with(key, |key| factory(key, arg))
    }

    /// Adds `value` for a missing key, or replaces the current value with
    /// `update(key, current)`. Returns the value stored.
    pub fn add_or_update<F>(&self, key: K, value: V, update: F) -> V
    where
        F: FnMut(&K, &V) -> V,
    {
        self.add_or_update_with(key, |_| value.clone(), update)
    }

    /// Like [`add_or_update`](HashMap::add_or_update) with the added value
    /// produced by `add`. Both factories run without any lock held and may
    /// run more than once under contention.
    pub fn add_or_update_with<A, F>(&self, key: K, mut add: A, mut update: F) -> V
    where
        A: FnMut(&K) -> V,
        F: FnMut(&K, &V) -> V,
    {
        let guard = self.manager.pin();
        loop {
            match self.find(&key, &guard) {
                Some(node) => {
                    let value = update(&key, &node.value);
                    let expected: *const Node<K, V> = node;
                    let stored = self.replace_if(key.clone(), value, |current| ptr::eq(current, expected), &guard);
                    if let Some(stored) = stored {
                        return stored.clone();
                    }
                }
                None => {
                    let value = add(&key);
                    let (added, stored) = self.insert(key.clone(), value, false, &guard);
                    if added {
                        return stored.clone();
                    }
                }
            }
            self.telemetry.cas_retry(RetrySite::MapUpdate);
        }
    }

    /// Number of entries. Takes every stripe lock.
    ///
    /// The stripe counters are summed with wrapping arithmetic, so a map
    /// holding more than `usize::MAX` entries reports a wrapped count.
    pub fn len(&self) -> usize {
        let guard = self.manager.pin();
        let locked = self.lock_all(&guard);
        locked.table.total()
    }

    /// Takes every stripe lock.
    pub fn is_empty(&self) -> bool {
        let guard = self.manager.pin();
        let locked = self.lock_all(&guard);
        locked
            .table
            .counts
            .iter()
            .all(|count| count.load(Ordering::Relaxed) == 0)
    }

    /// Removes every entry by installing an empty table of the default
    /// capacity.
    pub fn clear(&self) {
        let guard = self.manager.pin();
        let locked = self.lock_all(&guard);
        let old = locked.table;
        let fresh = Table::new(DEFAULT_CAPACITY, old.locks.to_vec().into_boxed_slice(), old.hashing);
        let budget = (DEFAULT_CAPACITY / old.locks.len()).max(1);
        self.table.store(Owned::new(fresh), Ordering::Release);
        self.budget.store(budget, Ordering::SeqCst);
        unsafe { self.manager.retire(&guard, locked.table_ptr) };
        debug!(budget, "map cleared");
    }

    /// Visits every entry while holding every stripe lock.
    fn collect_locked<R, F: FnMut(&Node<K, V>) -> R>(&self, mut f: F) -> Vec<R> {
        let guard = self.manager.pin();
        let locked = self.lock_all(&guard);
        let mut items = Vec::with_capacity(locked.table.total());
        for bucket in locked.table.buckets.iter() {
            let mut current = bucket.load(Ordering::Acquire, &guard);
            while let Some(node) = unsafe { current.as_ref() } {
                items.push(f(node));
                current = node.next.load(Ordering::Acquire, &guard);
            }
        }
        items
    }

    /// A point-in-time copy of every entry. Takes every stripe lock.
    pub fn to_vec(&self) -> Vec<(K, V)> {
        self.collect_locked(|node| (node.key.clone(), node.value.clone()))
    }

    /// Takes every stripe lock.
    pub fn keys(&self) -> Vec<K> {
        self.collect_locked(|node| node.key.clone())
    }

    /// Takes every stripe lock.
    pub fn values(&self) -> Vec<V> {
        self.collect_locked(|node| node.value.clone())
    }

    /// Iterates over copies of the entries without taking any lock.
    ///
    /// The iterator walks the table that was current when it was created.
    /// Entries changed during the walk may or may not be seen, and entries
    /// moved by a resize that starts afterwards are not seen again. The
    /// iterator keeps this thread pinned until dropped.
    pub fn iter(&self) -> Iter<'_, K, V> {
        let guard = self.manager.pin();
        let table = self.table.load(Ordering::Acquire, &guard).as_raw();
        Iter {
            guard,
            table,
            bucket: 0,
            node: ptr::null(),
            _marker: PhantomData,
        }
    }
}

/// Lock-free iterator returned by [`HashMap::iter`].
pub struct Iter<'a, K, V> {
    guard: Guard,
    table: *const Table<K, V>,
    bucket: usize,
    node: *const Node<K, V>,
    _marker: PhantomData<(&'a K, &'a V)>,
}

impl<'a, K: Clone, V: Clone> Iterator for Iter<'a, K, V> {
    type Item = (K, V);

    fn next(&mut self) -> Option<(K, V)> {
        loop {
            if let Some(node) = unsafe { self.node.as_ref() } {
                self.node = node.next.load(Ordering::Acquire, &self.guard).as_raw();
                return Some((node.key.clone(), node.value.clone()));
            }
            let table = unsafe { &*self.table };
            let bucket = table.buckets.get(self.bucket)?;
            self.node = bucket.load(Ordering::Acquire, &self.guard).as_raw();
            self.bucket += 1;
        }
    }
}

impl<K, V, S> Drop for HashMap<K, V, S> {
    fn drop(&mut self) {
        unsafe {
            let table = self.table.load(Ordering::Relaxed, epoch::unprotected());
            drop(table.into_owned());
        }
    }
}

impl<K, V, S: Default> Default for HashMap<K, V, S> {
    fn default() -> Self {
        HashMap::with_hasher(S::default())
    }
}

impl<K, V, S> FromIterator<(K, V)> for HashMap<K, V, S>
where
    K: Hash + Eq + Clone,
    V: Clone,
    S: BuildHasher + Default,
{
    /// Later values overwrite earlier ones for the same key.
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let map = HashMap::with_hasher(S::default());
        for (key, value) in iter {
            map.set(key, value);
        }
        map
    }
}

impl<K, V, S> Extend<(K, V)> for HashMap<K, V, S>
where
    K: Hash + Eq + Clone,
    V: Clone,
    S: BuildHasher,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.set(key, value);
        }
    }
}

impl<K, V, S> fmt::Debug for HashMap<K, V, S>
where
    K: Hash + Eq + Clone + fmt::Debug,
    V: Clone + fmt::Debug,
    S: BuildHasher,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K, V, S> ProducerConsumer<(K, V)> for HashMap<K, V, S>
where
    K: Hash + Eq + Clone,
    V: Clone,
    S: BuildHasher,
{
    fn try_add(&self, item: (K, V)) -> std::result::Result<(), (K, V)> {
        let (key, value) = item;
        if HashMap::try_add(self, key.clone(), value.clone()) {
            Ok(())
        } else {
            Err((key, value))
        }
    }

    /// Removes some entry; which one is unspecified.
    fn try_take(&self) -> Option<(K, V)> {
        loop {
            let (key, _) = self.iter().next()?;
            if let Some(value) = self.try_remove(&key) {
                return Some((key, value));
            }
        }
    }

    fn to_vec(&self) -> Vec<(K, V)> {
        HashMap::to_vec(self)
    }

    fn len(&self) -> usize {
        HashMap::len(self)
    }
}
