use std::hash::{BuildHasher, Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_epoch::{self as epoch, Atomic};
use parking_lot::Mutex;

pub(crate) struct Node<K, V> {
    pub(crate) key: K,
    pub(crate) value: V,
    pub(crate) hash: u64,
    pub(crate) next: Atomic<Node<K, V>>,
}

/// How a table turns keys into hashes. A salted table mixes a random word into
/// every hash, which breaks up chains built from keys that collide under the
/// plain hasher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Hashing {
    pub(crate) salt: Option<u64>,
}

impl Hashing {
    pub(crate) fn plain() -> Self {
        Hashing { salt: None }
    }

    pub(crate) fn salted(salt: u64) -> Self {
        Hashing { salt: Some(salt) }
    }

    pub(crate) fn hash<Q, S>(&self, hash_builder: &S, key: &Q) -> u64
    where
        Q: Hash + ?Sized,
        S: BuildHasher,
    {
        let mut hasher = hash_builder.build_hasher();
        if let Some(salt) = self.salt {
            hasher.write_u64(salt);
        }
        key.hash(&mut hasher);
        hasher.finish()
    }
}

/// One generation of the map's storage.
///
/// The arrays of a table never change once it is installed; growing, rehashing
/// and clearing all build a new table and swap it in. Lock objects outlive the
/// table that created them because every later table shares them.
pub(crate) struct Table<K, V> {
    pub(crate) buckets: Box<[Atomic<Node<K, V>>]>,
    pub(crate) locks: Box<[Arc<Mutex<()>>]>,
    /// Entries per stripe. Only written while holding the stripe's lock.
    pub(crate) counts: Box<[AtomicUsize]>,
    pub(crate) hashing: Hashing,
}

impl<K, V> Table<K, V> {
    pub(crate) fn new(buckets: usize, locks: Box<[Arc<Mutex<()>>]>, hashing: Hashing) -> Self {
        let counts = locks.iter().map(|_| AtomicUsize::new(0)).collect();
        Table {
            buckets: std::iter::repeat_with(Atomic::null).take(buckets).collect(),
            locks,
            counts,
            hashing,
        }
    }

    pub(crate) fn with_fresh_locks(buckets: usize, locks: usize) -> Self {
        Self::new(buckets, new_locks(Vec::new(), locks), Hashing::plain())
    }

    pub(crate) fn bucket_index(&self, hash: u64) -> usize {
        (hash % self.buckets.len() as u64) as usize
    }

    pub(crate) fn lock_index(&self, bucket: usize) -> usize {
        bucket % self.locks.len()
    }

    /// Adds one to the count of `stripe`, whose lock the caller holds, and
    /// returns the new count.
    pub(crate) fn increment(&self, stripe: usize) -> usize {
        let count = match self.counts[stripe].load(Ordering::Relaxed).checked_add(1) {
            Some(count) => count,
            None => panic!("entry count of stripe {} overflowed", stripe),
        };
        self.counts[stripe].store(count, Ordering::Relaxed);
        count
    }

    /// Subtracts one from the count of `stripe`, whose lock the caller holds.
    pub(crate) fn decrement(&self, stripe: usize) {
        let count = self.counts[stripe].load(Ordering::Relaxed);
        debug_assert!(count > 0, "entry count of stripe {} underflowed", stripe);
        self.counts[stripe].store(count.wrapping_sub(1), Ordering::Relaxed);
    }

    /// Sum of the stripe counts. Exact only while every stripe lock is held.
    pub(crate) fn total(&self) -> usize {
        self.counts
            .iter()
            .fold(0usize, |sum, count| sum.wrapping_add(count.load(Ordering::Relaxed)))
    }
}

impl<K, V> Drop for Table<K, V> {
    fn drop(&mut self) {
        // Nodes still linked into a dropped table belong to it alone: removed
        // nodes were unlinked before being retired and resizes copy entries.
        unsafe {
            let guard = epoch::unprotected();
            for bucket in self.buckets.iter() {
                let mut current = bucket.load(Ordering::Relaxed, guard);
                while !current.is_null() {
                    let node = current.into_owned();
                    current = node.next.load(Ordering::Relaxed, guard);
                }
            }
        }
    }
}

/// Extends `existing` with fresh locks up to `len` of them.
pub(crate) fn new_locks(mut existing: Vec<Arc<Mutex<()>>>, len: usize) -> Box<[Arc<Mutex<()>>]> {
    while existing.len() < len {
        existing.push(Arc::new(Mutex::new(())));
    }
    existing.into_boxed_slice()
}
