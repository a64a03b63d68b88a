use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use concurrent_collections::structures::Stack;

use std::sync::{Arc, Mutex};
use std::thread;
use std::thread::JoinHandle;

const OPS_PER_THREAD: u32 = 10000;

fn bench_lock_free_stack(num_threads: usize) {
    let stack: Arc<Stack<u32>> = Arc::new(Stack::new());
    let mut wait_vec: Vec<JoinHandle<()>> = Vec::new();
    for _ in 0..num_threads {
        let s = stack.clone();
        wait_vec.push(thread::spawn(move || {
            for n in 0..OPS_PER_THREAD {
                s.push(n);
            }
        }));
    }
    for _ in 0..num_threads {
        let s = stack.clone();
        wait_vec.push(thread::spawn(move || {
            for _ in 0..OPS_PER_THREAD {
                while s.try_pop().is_none() {}
            }
        }));
    }

    for handle in wait_vec {
        handle.join().unwrap();
    }
}

fn bench_ranged_stack(num_threads: usize) {
    let stack: Arc<Stack<u32>> = Arc::new(Stack::new());
    let mut wait_vec: Vec<JoinHandle<()>> = Vec::new();
    for _ in 0..num_threads {
        let s = stack.clone();
        wait_vec.push(thread::spawn(move || {
            for n in 0..OPS_PER_THREAD / 10 {
                s.push_range((0..10).map(|i| n * 10 + i));
            }
        }));
    }
    for _ in 0..num_threads {
        let s = stack.clone();
        wait_vec.push(thread::spawn(move || {
            let mut taken = 0;
            while taken < OPS_PER_THREAD as usize {
                taken += s.try_pop_range(10).len();
            }
        }));
    }

    for handle in wait_vec {
        handle.join().unwrap();
    }
}

fn bench_locked_stack(num_threads: usize) {
    let stack: Arc<Mutex<Vec<u32>>> = Arc::new(Mutex::new(Vec::new()));
    let mut wait_vec: Vec<JoinHandle<()>> = Vec::new();
    for _ in 0..num_threads {
        let s = stack.clone();
        wait_vec.push(thread::spawn(move || {
            for n in 0..OPS_PER_THREAD {
                s.lock().unwrap().push(n);
            }
        }));
    }
    for _ in 0..num_threads {
        let s = stack.clone();
        wait_vec.push(thread::spawn(move || {
            for _ in 0..OPS_PER_THREAD {
                while s.lock().unwrap().pop().is_none() {}
            }
        }));
    }

    for handle in wait_vec {
        handle.join().unwrap();
    }
}

fn bench_stack(c: &mut Criterion) {
    let mut group = c.benchmark_group("stack");
    group.sample_size(20);
    for threads in [2, 4, 8] {
        group.bench_with_input(BenchmarkId::new("lock_free", threads), &threads, |b, &n| {
            b.iter(|| bench_lock_free_stack(n))
        });
        group.bench_with_input(BenchmarkId::new("ranged", threads), &threads, |b, &n| {
            b.iter(|| bench_ranged_stack(n))
        });
        group.bench_with_input(BenchmarkId::new("mutex_vec", threads), &threads, |b, &n| {
            b.iter(|| bench_locked_stack(n))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_stack);
criterion_main!(benches);
