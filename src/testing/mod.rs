//! Utilities for testing linearizability of the concurrent structures, following the
//! strategy described by Lowe in [Testing for Linearizability](http://www.cs.ox.ac.uk/people/gavin.lowe/LinearizabiltyTesting/paper.pdf).
//!
//! A run drives the concurrent object from several threads, stamping every operation
//! with a logical invocation and return time. The recorded history is then searched
//! for a sequential ordering that respects real time and replays on a persistent
//! sequential model (an `im` collection) with identical results.
//!
//! # Example
//! ```text
//! #[derive(Clone, PartialEq, Eq, Hash)]
//! struct StackModel(Vector<u32>);
//!
//! impl Sequential for StackModel {
//!     type Op = StackOp;
//!     type Ret = Option<u32>;
//!     fn apply(&self, op: &StackOp) -> (Self, Option<u32>) { .. }
//! }
//!
//! let stack: Stack<u32> = Stack::new();
//! let result = LinearizabilityTester::new(4, 100).run(
//!     &stack,
//!     StackModel(Vector::new()),
//!     |_thread, rng| if rng.gen_bool(0.5) { StackOp::Push(rng.gen()) } else { StackOp::Pop },
//!     |stack, op| match op { .. },
//! );
//! assert!(result.is_success(), "{:?}", result);
//! ```

pub use self::linearizability_tester::{LinearizabilityResult, LinearizabilityTester, Sequential};

pub mod linearizability_tester;
mod time_stamped;

/// Installs a test-writer tracing subscriber once per test binary.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}
