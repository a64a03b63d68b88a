//! Memory reclamation for the lock-free structures.
//!
//! Lock-free readers may still hold a pointer to a node after another thread
//! has unlinked it, so nothing can be freed the moment it is unlinked. Every
//! collection owns an [`EpochManager`]: threads pin it for the duration of an
//! operation, unlinked records are retired to it, and a retired record is only
//! destroyed once every thread that could have seen it has unpinned. Because
//! records are never freed early they are also never reused early, which rules
//! out the [ABA problem](https://en.wikipedia.org/wiki/ABA_problem) for the
//! compare-and-swap loops built on top.

pub use self::epoch::EpochManager;

mod epoch;
