//! Concurrent collections for Rust.
//!
//! The crate provides a lock-free stack, a lock-free segmented queue and a
//! hash map with striped locking and lock-free reads, all under
//! [`structures`]. Each collection reclaims memory through its own
//! [`memory::EpochManager`], so nodes unlinked by one thread are only freed
//! once no other thread can still be reading them.
//!
//! Contention and resizing can be observed by plugging a
//! [`telemetry::Telemetry`] sink into a collection; resizes and queue growth
//! are also reported through `tracing` at debug level.

pub mod error;
pub mod memory;
pub mod structures;
pub mod telemetry;

#[cfg(test)]
mod testing;
