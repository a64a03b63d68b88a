use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use concurrent_collections::structures::SegQueue;
use crossbeam::queue::SegQueue as CrossbeamSegQueue;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::thread;
use std::thread::JoinHandle;

const TOTAL_OPS: usize = 100_000;

fn bench_equal(num_threads: usize) {
    let queue = Arc::new(SegQueue::new());
    let mut wait_vec: Vec<JoinHandle<()>> = Vec::new();

    for _ in 0..num_threads / 2 {
        let queue_clone = queue.clone();
        wait_vec.push(thread::spawn(move || {
            for i in 0..TOTAL_OPS / num_threads {
                queue_clone.enqueue(i);
            }
        }));
    }

    for _ in 0..num_threads / 2 {
        let queue_clone = queue.clone();
        wait_vec.push(thread::spawn(move || {
            for _ in 0..TOTAL_OPS / num_threads {
                while queue_clone.try_dequeue().is_none() {}
            }
        }));
    }

    for handle in wait_vec {
        handle.join().unwrap();
    }
}

fn bench_equal_with_snapshots(num_threads: usize) {
    let queue = Arc::new(SegQueue::new());
    let mut wait_vec: Vec<JoinHandle<()>> = Vec::new();

    for _ in 0..num_threads / 2 {
        let queue_clone = queue.clone();
        wait_vec.push(thread::spawn(move || {
            for i in 0..TOTAL_OPS / num_threads {
                queue_clone.enqueue(i);
                if i % 1000 == 0 {
                    queue_clone.len();
                }
            }
        }));
    }

    for _ in 0..num_threads / 2 {
        let queue_clone = queue.clone();
        wait_vec.push(thread::spawn(move || {
            for _ in 0..TOTAL_OPS / num_threads {
                while queue_clone.try_dequeue().is_none() {}
            }
        }));
    }

    for handle in wait_vec {
        handle.join().unwrap();
    }
}

fn bench_equal_crossbeam(num_threads: usize) {
    let queue = Arc::new(CrossbeamSegQueue::new());
    let mut wait_vec: Vec<JoinHandle<()>> = Vec::new();

    for _ in 0..num_threads / 2 {
        let queue_clone = queue.clone();
        wait_vec.push(thread::spawn(move || {
            for i in 0..TOTAL_OPS / num_threads {
                queue_clone.push(i);
            }
        }));
    }

    for _ in 0..num_threads / 2 {
        let queue_clone = queue.clone();
        wait_vec.push(thread::spawn(move || {
            for _ in 0..TOTAL_OPS / num_threads {
                while queue_clone.pop().is_none() {}
            }
        }));
    }

    for handle in wait_vec {
        handle.join().unwrap();
    }
}

fn bench_equal_lock(num_threads: usize) {
    let queue = Arc::new(Mutex::new(VecDeque::new()));
    let mut wait_vec: Vec<JoinHandle<()>> = Vec::new();

    for _ in 0..num_threads / 2 {
        let queue_clone = queue.clone();
        wait_vec.push(thread::spawn(move || {
            for i in 0..TOTAL_OPS / num_threads {
                queue_clone.lock().unwrap().push_back(i);
            }
        }));
    }

    for _ in 0..num_threads / 2 {
        let queue_clone = queue.clone();
        wait_vec.push(thread::spawn(move || {
            for _ in 0..TOTAL_OPS / num_threads {
                while queue_clone.lock().unwrap().pop_front().is_none() {}
            }
        }));
    }

    for handle in wait_vec {
        handle.join().unwrap();
    }
}

fn bench_queue(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue");
    group.sample_size(20);
    for threads in [2, 4, 8] {
        group.bench_with_input(BenchmarkId::new("seg_queue", threads), &threads, |b, &n| {
            b.iter(|| bench_equal(n))
        });
        group.bench_with_input(BenchmarkId::new("seg_queue_len", threads), &threads, |b, &n| {
            b.iter(|| bench_equal_with_snapshots(n))
        });
        group.bench_with_input(BenchmarkId::new("crossbeam", threads), &threads, |b, &n| {
            b.iter(|| bench_equal_crossbeam(n))
        });
        group.bench_with_input(BenchmarkId::new("mutex_vecdeque", threads), &threads, |b, &n| {
            b.iter(|| bench_equal_lock(n))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_queue);
criterion_main!(benches);
