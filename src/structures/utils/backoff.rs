//! Spin-then-yield backoff used by every retry loop in the crate.
//!
//! [`Backoff`] spins for an exponentially growing number of iterations and then
//! starts yielding the thread. [`ContentionBackoff`] runs several rounds of
//! [`Backoff`] per failed attempt, doubling the number of rounds until spinning
//! would yield anyway, and from then on picks a random number of rounds so that
//! threads that collided once do not keep colliding in lock step.

use std::hint;
use std::sync::OnceLock;
use std::thread;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// Spinning is capped at `1 << SPIN_LIMIT` iterations per call.
const SPIN_LIMIT: u32 = 6;
/// After this many calls the backoff yields instead of spinning.
const YIELD_THRESHOLD: u32 = 10;
/// Upper bound (exclusive) on the randomized rounds of [`ContentionBackoff`].
pub const BACKOFF_MAX_YIELDS: u32 = 8;

static SINGLE_CORE: OnceLock<bool> = OnceLock::new();

fn single_core() -> bool {
    *SINGLE_CORE.get_or_init(|| num_cpus::get() <= 1)
}

/// Bounded exponential spin, then yield.
#[derive(Debug)]
pub struct Backoff {
    step: u32,
    single_core: bool,
}

impl Backoff {
    pub fn new() -> Self {
        Backoff {
            step: 0,
            single_core: single_core(),
        }
    }

    /// Builds a backoff that behaves as if the machine had `parallelism`
    /// hardware threads.
    pub fn with_parallelism(parallelism: usize) -> Self {
        Backoff {
            step: 0,
            single_core: parallelism <= 1,
        }
    }

    /// Number of times `spin_once` has been called since the last reset.
    pub fn count(&self) -> u32 {
        self.step
    }

    pub fn reset(&mut self) {
        self.step = 0;
    }

    /// Whether the next call to `spin_once` will give up the CPU. Spinning on a
    /// single hardware thread only delays the thread we are waiting for, so
    /// there it always yields.
    pub fn next_spin_will_yield(&self) -> bool {
        self.single_core || self.step >= YIELD_THRESHOLD
    }

    pub fn spin_once(&mut self) {
        if self.next_spin_will_yield() {
            thread::yield_now();
        } else {
            for _ in 0..(1u32 << self.step.min(SPIN_LIMIT)) {
                hint::spin_loop();
            }
        }
        self.step = self.step.saturating_add(1);
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::new()
    }
}

/// Backoff for hot compare-and-swap loops under heavy contention.
#[derive(Debug)]
pub struct ContentionBackoff {
    spin: Backoff,
    rounds: u32,
    rng: Option<SmallRng>,
}

impl ContentionBackoff {
    pub fn new() -> Self {
        Self::from_backoff(Backoff::new())
    }

    pub fn from_backoff(spin: Backoff) -> Self {
        ContentionBackoff {
            spin,
            rounds: 1,
            rng: None,
        }
    }

    /// Rounds of spinning the next `wait` will perform.
    pub fn rounds(&self) -> u32 {
        self.rounds
    }

    /// True once the backoff has switched to randomized rounds.
    pub fn is_yielding(&self) -> bool {
        self.spin.next_spin_will_yield()
    }

    /// Waits after a failed attempt and adjusts the next wait.
    pub fn wait(&mut self) {
        for _ in 0..self.rounds {
            self.spin.spin_once();
        }
        self.rounds = if self.spin.next_spin_will_yield() {
            // Seeded lazily: most retry loops never get this far.
            let rng = self.rng.get_or_insert_with(SmallRng::from_entropy);
            rng.gen_range(1..BACKOFF_MAX_YIELDS)
        } else {
            self.rounds.saturating_mul(2)
        };
    }
}

impl Default for ContentionBackoff {
    fn default() -> Self {
        ContentionBackoff::new()
    }
}
