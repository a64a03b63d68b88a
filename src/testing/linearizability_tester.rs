use std::collections::HashSet;
use std::fmt::{self, Debug};
use std::hash::Hash;

use rand::rngs::SmallRng;
use rand::SeedableRng;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;

use super::time_stamped::{Clock, TimeStamped};

/// A sequential model of the object under test.
pub trait Sequential: Clone + Eq + Hash {
    type Op: Clone + Debug + Send + Sync;
    type Ret: PartialEq + Debug + Send + Sync;

    /// Applies `op` to a copy of the model, returning the new model and the
    /// result a correct concurrent object would have produced.
    fn apply(&self, op: &Self::Op) -> (Self, Self::Ret);
}

pub enum LinearizabilityResult<Op, Ret> {
    Success,
    Failure(Vec<Vec<TimeStamped<Op, Ret>>>),
}

impl<Op, Ret> LinearizabilityResult<Op, Ret> {
    pub fn is_success(&self) -> bool {
        match self {
            LinearizabilityResult::Success => true,
            LinearizabilityResult::Failure(_) => false,
        }
    }
}

impl<Op: Debug, Ret: Debug> Debug for LinearizabilityResult<Op, Ret> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LinearizabilityResult::Success => write!(f, "Success"),
            LinearizabilityResult::Failure(logs) => {
                writeln!(f, "Failure, no linearization of:")?;
                for log in logs {
                    for event in log {
                        writeln!(
                            f,
                            "  thread {} [{}, {}] {:?} -> {:?}",
                            event.thread, event.invoked, event.returned, event.op, event.ret
                        )?;
                    }
                }
                Ok(())
            }
        }
    }
}

pub struct LinearizabilityTester {
    num_threads: usize,
    ops_per_thread: usize,
    seed: u64,
}

impl LinearizabilityTester {
    pub fn new(num_threads: usize, ops_per_thread: usize) -> Self {
        LinearizabilityTester {
            num_threads,
            ops_per_thread,
            seed: 0x5eed,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Runs `ops_per_thread` operations produced by `generate` on each of
    /// `num_threads` threads against `concurrent`, then checks the history
    /// against `initial`.
    pub fn run<C, S, G, A>(
        &self,
        concurrent: &C,
        initial: S,
        generate: G,
        apply: A,
    ) -> LinearizabilityResult<S::Op, S::Ret>
    where
        C: Sync,
        S: Sequential,
        G: Fn(usize, &mut SmallRng) -> S::Op + Sync,
        A: Fn(&C, &S::Op) -> S::Ret + Sync,
    {
        let clock = Clock::new();
        let pool = ThreadPoolBuilder::new()
            .num_threads(self.num_threads)
            .build()
            .expect("failed to build the tester's thread pool");

        let logs: Vec<Vec<TimeStamped<S::Op, S::Ret>>> = pool.install(|| {
            (0..self.num_threads)
                .into_par_iter()
                .map(|thread| {
                    let mut rng = SmallRng::seed_from_u64(self.seed ^ (thread as u64).wrapping_mul(0x9e37_79b9));
                    let mut log = Vec::with_capacity(self.ops_per_thread);
                    for _ in 0..self.ops_per_thread {
                        let op = generate(thread, &mut rng);
                        let invoked = clock.tick();
                        let ret = apply(concurrent, &op);
                        let returned = clock.tick();
                        log.push(TimeStamped {
                            thread,
                            op,
                            ret,
                            invoked,
                            returned,
                        });
                    }
                    log
                })
                .collect()
        });

        if check(&logs, initial) {
            LinearizabilityResult::Success
        } else {
            LinearizabilityResult::Failure(logs)
        }
    }
}

/// Wing & Gong search with memoization of failed (progress, model) pairs.
/// Each thread's log is sequential, so only the first pending operation of
/// each thread is ever a candidate.
fn check<S: Sequential>(logs: &[Vec<TimeStamped<S::Op, S::Ret>>], initial: S) -> bool {
    let mut positions = vec![0usize; logs.len()];
    let mut failed: HashSet<(Vec<usize>, S)> = HashSet::new();
    search(logs, &initial, &mut positions, &mut failed)
}

fn search<S: Sequential>(
    logs: &[Vec<TimeStamped<S::Op, S::Ret>>],
    model: &S,
    positions: &mut Vec<usize>,
    failed: &mut HashSet<(Vec<usize>, S)>,
) -> bool {
    let pending: Vec<usize> = (0..logs.len())
        .filter(|&t| positions[t] < logs[t].len())
        .collect();
    if pending.is_empty() {
        return true;
    }
    if failed.contains(&(positions.clone(), model.clone())) {
        return false;
    }

    for &t in &pending {
        let candidate = &logs[t][positions[t]];
        let blocked = pending
            .iter()
            .any(|&other| other != t && logs[other][positions[other]].precedes(candidate));
        if blocked {
            continue;
        }
        let (next, ret) = model.apply(&candidate.op);
        if ret != candidate.ret {
            continue;
        }
        positions[t] += 1;
        if search(logs, &next, positions, failed) {
            return true;
        }
        positions[t] -= 1;
    }

    failed.insert((positions.clone(), model.clone()));
    false
}

#[cfg(test)]
mod tests {
    use super::{check, Sequential};
    use super::super::time_stamped::TimeStamped;

    #[derive(Clone, PartialEq, Eq, Hash)]
    struct Register(u32);

    #[derive(Clone, Debug)]
    enum RegisterOp {
        Write(u32),
        Read,
    }

    impl Sequential for Register {
        type Op = RegisterOp;
        type Ret = Option<u32>;

        fn apply(&self, op: &RegisterOp) -> (Self, Option<u32>) {
            match op {
                RegisterOp::Write(v) => (Register(*v), None),
                RegisterOp::Read => (self.clone(), Some(self.0)),
            }
        }
    }

    fn event(thread: usize, op: RegisterOp, ret: Option<u32>, invoked: u64, returned: u64) -> TimeStamped<RegisterOp, Option<u32>> {
        TimeStamped { thread, op, ret, invoked, returned }
    }

    #[test]
    fn test_overlapping_history_linearizes() {
        // The read overlaps the write, so it may observe either value.
        let logs = vec![
            vec![event(0, RegisterOp::Write(1), None, 0, 3)],
            vec![event(1, RegisterOp::Read, Some(1), 1, 2)],
        ];
        assert!(check(&logs, Register(0)));
    }

    #[test]
    fn test_stale_read_rejected() {
        // The read starts after the write returned, so it must see 1.
        let logs = vec![
            vec![event(0, RegisterOp::Write(1), None, 0, 1)],
            vec![event(1, RegisterOp::Read, Some(0), 2, 3)],
        ];
        assert!(!check(&logs, Register(0)));
    }
}
