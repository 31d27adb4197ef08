// Copyright (c) The Spindle Project Authors.
// Licensed under the MIT License.

#![expect(missing_docs, reason = "Benchmark code")]

//! Benchmark to assess posting overhead. The scenarios:
//! * Post a batch of immediate tasks and wait for the queue to drain
//! * One round-trip: post a task and block until it has run

use std::sync::mpsc;

use criterion::{Criterion, criterion_group, criterion_main};
use spindle::{Task, TaskQueue, ThreadedTaskQueue};

const BATCH: usize = 100;

fn criterion_benchmark(c: &mut Criterion) {
    post_batch(c);
    round_trip(c);
}

fn post_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue_post");

    let queue = ThreadedTaskQueue::builder("bench").spawn().expect("spawn must succeed");

    group.bench_function("post_100_and_drain", |b| {
        b.iter(|| {
            for _ in 0..BATCH {
                queue.post(Task::new(|| {}));
            }
            drain(&queue);
        });
    });

    group.finish();
}

fn round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue_round_trip");

    let queue = ThreadedTaskQueue::builder("bench").spawn().expect("spawn must succeed");

    group.bench_function("post_and_wait", |b| {
        b.iter(|| drain(&queue));
    });

    group.finish();
}

/// Blocks until everything posted so far has run.
fn drain(queue: &ThreadedTaskQueue) {
    let (sender, receiver) = mpsc::channel();
    queue.post(Task::new(move || sender.send(()).expect("receiver is alive")));
    receiver.recv().expect("queue worker is alive");
}

criterion_group! {
    name = benches;
    config = Criterion::default();
    targets = criterion_benchmark
}

criterion_main!(benches);
