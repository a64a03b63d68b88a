//! The concurrent collections.
//!
//! [`Stack`] and [`SegQueue`] are lock-free. [`HashMap`] locks one stripe per
//! mutation and reads without locking. All three implement
//! [`ProducerConsumer`].

pub use self::collection::ProducerConsumer;
pub use self::hash_map::HashMap;
pub use self::seg_queue::SegQueue;
pub use self::stack::Stack;

pub mod hash_map;
pub mod seg_queue;
pub mod stack;
pub mod utils;
mod collection;
