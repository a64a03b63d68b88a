use std::fmt;
use std::sync::Arc;

use crate::error::{CollectionError, Result};
use crate::telemetry::Telemetry;

/// Buckets in a map built without an explicit capacity, and in a map that
/// has just been cleared.
pub const DEFAULT_CAPACITY: usize = 31;

const CONCURRENCY_MULTIPLIER: usize = 4;

/// The number of stripe locks a map gets by default on a machine with
/// `available_parallelism` hardware threads.
pub fn default_concurrency_level(available_parallelism: usize) -> usize {
    CONCURRENCY_MULTIPLIER.saturating_mul(available_parallelism.max(1))
}

/// Tuning of the resize heuristics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResizePolicy {
    /// A table holding fewer than `buckets / sparse_divisor` entries doubles
    /// the per-stripe budget instead of growing.
    pub sparse_divisor: usize,
    /// New bucket counts are bumped until none of these divide them.
    pub avoided_divisors: Vec<usize>,
    /// Upper bound on the bucket count. Once reached, the budget is pinned to
    /// `usize::MAX` and the table never grows again.
    pub max_buckets: usize,
    /// The lock array stops doubling once it has at least this many locks.
    pub max_locks: usize,
    /// Chain length that makes the next resize rehash with a random salt.
    pub collision_threshold: usize,
}

impl Default for ResizePolicy {
    fn default() -> Self {
        ResizePolicy {
            sparse_divisor: 4,
            avoided_divisors: vec![3, 5, 7],
            max_buckets: 0x7FEF_FFFF,
            max_locks: 1024,
            collision_threshold: 100,
        }
    }
}

impl ResizePolicy {
    /// Whether a table of `buckets` buckets holding about `count` entries is
    /// too empty to be worth growing.
    pub(crate) fn is_sparse(&self, count: usize, buckets: usize) -> bool {
        count < buckets.checked_div(self.sparse_divisor).unwrap_or(0)
    }

    /// The bucket count that follows `buckets`: the smallest value of at least
    /// `2 * buckets + 1` that none of the avoided divisors divide. The second
    /// element is true when the result had to be capped at `max_buckets`.
    pub fn next_bucket_len(&self, buckets: usize) -> (usize, bool) {
        let grown = buckets.checked_mul(2).and_then(|len| len.checked_add(1)).and_then(|mut len| {
            while self.avoided_divisors.iter().any(|&d| d > 1 && len % d == 0) {
                len = len.checked_add(2)?;
            }
            Some(len)
        });
        match grown {
            Some(len) if len <= self.max_buckets => (len, false),
            _ => (self.max_buckets, true),
        }
    }

    /// The stripe count after a resize of a table with `locks` stripes.
    pub(crate) fn next_lock_len(&self, locks: usize, grow_lock_array: bool) -> usize {
        if grow_lock_array && locks < self.max_locks {
            locks.saturating_mul(2)
        } else {
            locks
        }
    }
}

/// Construction parameters for a [`HashMap`](crate::structures::HashMap).
///
/// # Examples
/// ```
/// use concurrent_collections::structures::hash_map::MapConfig;
/// use concurrent_collections::structures::HashMap;
/// use std::collections::hash_map::RandomState;
///
/// let config = MapConfig::default().capacity(1024).concurrency_level(16);
/// let map: HashMap<u32, u32> = HashMap::with_config(config, RandomState::new()).unwrap();
/// assert!(map.try_add(1, 1));
/// ```
#[derive(Clone)]
pub struct MapConfig {
    pub(crate) capacity: usize,
    pub(crate) concurrency_level: usize,
    pub(crate) grow_lock_array: bool,
    pub(crate) resize: ResizePolicy,
    pub(crate) telemetry: Option<Arc<dyn Telemetry>>,
}

impl Default for MapConfig {
    fn default() -> Self {
        MapConfig {
            capacity: DEFAULT_CAPACITY,
            concurrency_level: default_concurrency_level(num_cpus::get()),
            grow_lock_array: true,
            resize: ResizePolicy::default(),
            telemetry: None,
        }
    }
}

impl MapConfig {
    /// Initial number of buckets. Raised to the concurrency level if lower.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Initial number of stripe locks. Must be at least 1.
    pub fn concurrency_level(mut self, concurrency_level: usize) -> Self {
        self.concurrency_level = concurrency_level;
        self
    }

    pub fn grow_lock_array(mut self, grow: bool) -> Self {
        self.grow_lock_array = grow;
        self
    }

    pub fn resize_policy(mut self, policy: ResizePolicy) -> Self {
        self.resize = policy;
        self
    }

    pub fn telemetry(mut self, sink: Arc<dyn Telemetry>) -> Self {
        self.telemetry = Some(sink);
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.concurrency_level == 0 {
            return Err(CollectionError::InvalidConcurrencyLevel);
        }
        Ok(())
    }

    /// Bucket count of the first table.
    pub(crate) fn initial_buckets(&self) -> usize {
        self.capacity.max(self.concurrency_level)
    }
}

impl fmt::Debug for MapConfig {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("MapConfig")
            .field("capacity", &self.capacity)
            .field("concurrency_level", &self.concurrency_level)
            .field("grow_lock_array", &self.grow_lock_array)
            .field("resize", &self.resize)
            .field("telemetry", &self.telemetry.is_some())
            .finish()
    }
}
