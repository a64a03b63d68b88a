//! Optional contention telemetry.
//!
//! Collections never report anything unless a [`Telemetry`] sink is injected at
//! construction. [`CountingTelemetry`] is a ready-made sink that keeps one set
//! of counters per thread, so reporting from a hot retry loop never contends on
//! a shared cache line.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use thread_local::ThreadLocal;

/// The retry loop that lost a race.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetrySite {
    StackPush,
    StackPop,
    QueueEnqueue,
    QueueDequeue,
    QueueSnapshot,
    MapStaleTable,
    /// `add_or_update` lost the entry it read to another writer.
    MapUpdate,
}

impl RetrySite {
    const COUNT: usize = 7;

    pub const ALL: [RetrySite; RetrySite::COUNT] = [
        RetrySite::StackPush,
        RetrySite::StackPop,
        RetrySite::QueueEnqueue,
        RetrySite::QueueDequeue,
        RetrySite::QueueSnapshot,
        RetrySite::MapStaleTable,
        RetrySite::MapUpdate,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

/// Sink for contention events. Every method defaults to doing nothing.
pub trait Telemetry: Send + Sync {
    /// A map mutator acquired stripe lock `stripe`.
    fn lock_acquired(&self, _stripe: usize) {}

    /// A compare-and-swap or snapshot validation failed and will be retried.
    fn cas_retry(&self, _site: RetrySite) {}

    /// A map installed a new table.
    fn table_resized(&self, _buckets: usize, _locks: usize) {}

    /// A queue linked a new segment.
    fn segment_grown(&self, _index: u64) {}
}

/// The sink as held by a collection.
#[derive(Clone, Default)]
pub(crate) struct TelemetryHandle(Option<Arc<dyn Telemetry>>);

impl TelemetryHandle {
    pub(crate) fn new(sink: Option<Arc<dyn Telemetry>>) -> Self {
        TelemetryHandle(sink)
    }

    #[inline]
    pub(crate) fn lock_acquired(&self, stripe: usize) {
        if let Some(sink) = &self.0 {
            sink.lock_acquired(stripe);
        }
    }

    #[inline]
    pub(crate) fn cas_retry(&self, site: RetrySite) {
        if let Some(sink) = &self.0 {
            sink.cas_retry(site);
        }
    }

    #[inline]
    pub(crate) fn table_resized(&self, buckets: usize, locks: usize) {
        if let Some(sink) = &self.0 {
            sink.table_resized(buckets, locks);
        }
    }

    #[inline]
    pub(crate) fn segment_grown(&self, index: u64) {
        if let Some(sink) = &self.0 {
            sink.segment_grown(index);
        }
    }
}

impl fmt::Debug for TelemetryHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.0 {
            Some(_) => write!(f, "TelemetryHandle(Some(..))"),
            None => write!(f, "TelemetryHandle(None)"),
        }
    }
}

#[derive(Default)]
struct LocalCounters {
    locks: AtomicU64,
    retries: [AtomicU64; RetrySite::COUNT],
    resizes: AtomicU64,
    segments: AtomicU64,
}

/// Counts every event, sharded per thread.
#[derive(Default)]
pub struct CountingTelemetry {
    counters: ThreadLocal<LocalCounters>,
}

impl CountingTelemetry {
    pub fn new() -> Self {
        CountingTelemetry {
            counters: ThreadLocal::new(),
        }
    }

    fn local(&self) -> &LocalCounters {
        self.counters.get_or_default()
    }

    fn sum<F: Fn(&LocalCounters) -> u64>(&self, f: F) -> u64 {
        self.counters.iter().map(f).sum()
    }

    pub fn lock_acquisitions(&self) -> u64 {
        self.sum(|c| c.locks.load(Ordering::Relaxed))
    }

    pub fn retries(&self, site: RetrySite) -> u64 {
        self.sum(|c| c.retries[site.index()].load(Ordering::Relaxed))
    }

    pub fn total_retries(&self) -> u64 {
        RetrySite::ALL.iter().map(|site| self.retries(*site)).sum()
    }

    pub fn resizes(&self) -> u64 {
        self.sum(|c| c.resizes.load(Ordering::Relaxed))
    }

    pub fn segments_grown(&self) -> u64 {
        self.sum(|c| c.segments.load(Ordering::Relaxed))
    }
}

impl Telemetry for CountingTelemetry {
    fn lock_acquired(&self, _stripe: usize) {
        self.local().locks.fetch_add(1, Ordering::Relaxed);
    }

    fn cas_retry(&self, site: RetrySite) {
        self.local().retries[site.index()].fetch_add(1, Ordering::Relaxed);
    }

    fn table_resized(&self, _buckets: usize, _locks: usize) {
        self.local().resizes.fetch_add(1, Ordering::Relaxed);
    }

    fn segment_grown(&self, _index: u64) {
        self.local().segments.fetch_add(1, Ordering::Relaxed);
    }
}

impl fmt::Debug for CountingTelemetry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("CountingTelemetry")
            .field("lock_acquisitions", &self.lock_acquisitions())
            .field("total_retries", &self.total_retries())
            .field("resizes", &self.resizes())
            .field("segments_grown", &self.segments_grown())
            .finish()
    }
}
