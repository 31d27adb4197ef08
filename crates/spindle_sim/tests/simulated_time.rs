// Copyright (c) The Spindle Project Authors.
// Licensed under the MIT License.

//! End-to-end scenarios mixing queues, repeating tasks and safety flags under virtual
//! time.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chime::Timestamp;
use spindle::{RepeatingTaskHandle, SafetyFlag, ScopedSafety, SequenceChecker, Task, TaskQueue};
use spindle_sim::SimulatedTimeController;

#[test]
fn delayed_tasks_interleave_across_queues_by_due_time() {
    let controller = SimulatedTimeController::default();
    let audio = controller.create_task_queue();
    let video = controller.create_task_queue();
    let log = Arc::new(Mutex::new(Vec::new()));

    let record = |label: &'static str| {
        let log = Arc::clone(&log);
        Task::new(move || log.lock().unwrap().push(label))
    };

    audio.post_delayed(record("audio@100"), Duration::from_millis(100));
    video.post_delayed(record("video@50"), Duration::from_millis(50));
    audio.post_delayed(record("audio@50"), Duration::from_millis(50));
    video.post(record("video@0"));

    controller.advance(Duration::from_millis(100));

    // Ties at the same instant resolve by queue creation order, deterministically.
    assert_eq!(
        *log.lock().unwrap(),
        vec!["video@0", "audio@50", "video@50", "audio@100"]
    );
}

#[test]
fn stepwise_advance_runs_each_task_exactly_once_at_its_due_time() {
    let controller = SimulatedTimeController::default();
    let queue = controller.create_task_queue();
    let a_runs = Arc::new(AtomicUsize::new(0));
    let b_runs = Arc::new(AtomicUsize::new(0));

    {
        let a_runs = Arc::clone(&a_runs);
        queue.post_delayed(
            Task::new(move || {
                a_runs.fetch_add(1, Ordering::SeqCst);
            }),
            Duration::from_millis(100),
        );
    }
    {
        let b_runs = Arc::clone(&b_runs);
        queue.post_delayed(
            Task::new(move || {
                b_runs.fetch_add(1, Ordering::SeqCst);
            }),
            Duration::from_millis(50),
        );
    }

    controller.advance(Duration::from_millis(50));
    assert_eq!(a_runs.load(Ordering::SeqCst), 0);
    assert_eq!(b_runs.load(Ordering::SeqCst), 1);

    controller.advance(Duration::from_millis(50));
    assert_eq!(a_runs.load(Ordering::SeqCst), 1);
    assert_eq!(b_runs.load(Ordering::SeqCst), 1);
}

#[test]
fn repeating_task_fires_once_per_period() {
    let controller = SimulatedTimeController::default();
    let queue = controller.create_task_queue();
    let count = Arc::new(AtomicUsize::new(0));

    let _handle = {
        let count = Arc::clone(&count);
        RepeatingTaskHandle::builder(&queue)
            .clock(&controller.clock())
            .start(move || {
                count.fetch_add(1, Ordering::SeqCst);
                Duration::from_millis(100)
            })
    };

    // Immediate first run, then one per period: 1 + 10 invocations in a second.
    controller.advance(Duration::from_secs(1));
    assert_eq!(count.load(Ordering::SeqCst), 11);

    controller.advance(Duration::from_secs(1));
    assert_eq!(count.load(Ordering::SeqCst), 21);
}

#[test]
fn repeating_task_invocations_stay_on_the_ideal_grid() {
    let controller = SimulatedTimeController::default();
    let queue = controller.create_task_queue();
    let instants = Arc::new(Mutex::new(Vec::new()));

    let _handle = {
        let instants = Arc::clone(&instants);
        let clock = controller.clock();
        RepeatingTaskHandle::builder(&queue)
            .clock(&controller.clock())
            .first_delay(Duration::from_millis(25))
            .start(move || {
                instants.lock().unwrap().push(clock.now());
                Duration::from_millis(25)
            })
    };

    controller.advance(Duration::from_millis(100));

    let expected: Vec<Timestamp> = (1..=4).map(|i| Timestamp::from_micros(i * 25_000)).collect();
    assert_eq!(*instants.lock().unwrap(), expected);
}

#[test]
fn stopping_a_repeating_task_prevents_further_runs() {
    let controller = SimulatedTimeController::default();
    let queue = controller.create_task_queue();
    let count = Arc::new(AtomicUsize::new(0));

    let handle = {
        let count = Arc::clone(&count);
        RepeatingTaskHandle::builder(&queue)
            .clock(&controller.clock())
            .start(move || {
                count.fetch_add(1, Ordering::SeqCst);
                Duration::from_millis(10)
            })
    };
    let handle = Arc::new(Mutex::new(handle));

    controller.advance(Duration::from_millis(50));
    let after_fifty = count.load(Ordering::SeqCst);
    assert_eq!(after_fifty, 6);

    // Stop must happen on the owning queue.
    {
        let handle = Arc::clone(&handle);
        queue.post(Task::new(move || handle.lock().unwrap().stop()));
    }
    controller.advance(Duration::from_secs(1));

    assert!(!handle.lock().unwrap().is_running());
    assert_eq!(count.load(Ordering::SeqCst), after_fifty);
}

#[test]
fn repeating_task_can_stop_itself_reentrantly() {
    let controller = SimulatedTimeController::default();
    let queue = controller.create_task_queue();
    let count = Arc::new(AtomicUsize::new(0));
    let handle: Arc<Mutex<RepeatingTaskHandle>> = Arc::new(Mutex::new(RepeatingTaskHandle::default()));

    *handle.lock().unwrap() = {
        let count = Arc::clone(&count);
        let handle = Arc::clone(&handle);
        RepeatingTaskHandle::builder(&queue)
            .clock(&controller.clock())
            .start(move || {
                if count.fetch_add(1, Ordering::SeqCst) == 2 {
                    handle.lock().unwrap().stop();
                }
                Duration::from_millis(10)
            })
    };

    controller.advance(Duration::from_secs(1));

    // The stopping invocation finished normally; nothing ran after it.
    assert_eq!(count.load(Ordering::SeqCst), 3);
    assert!(!handle.lock().unwrap().is_running());
}

#[test]
fn dropping_the_handle_does_not_stop_the_task() {
    let controller = SimulatedTimeController::default();
    let queue = controller.create_task_queue();
    let count = Arc::new(AtomicUsize::new(0));

    {
        let count = Arc::clone(&count);
        let handle = RepeatingTaskHandle::builder(&queue)
            .clock(&controller.clock())
            .start(move || {
                count.fetch_add(1, Ordering::SeqCst);
                Duration::from_millis(10)
            });
        drop(handle);
    }

    controller.advance(Duration::from_millis(30));
    assert!(count.load(Ordering::SeqCst) > 1);
}

#[test]
fn guarded_tasks_skip_once_their_owner_is_gone() {
    let controller = SimulatedTimeController::default();
    let queue = controller.create_task_queue();
    let count = Arc::new(AtomicUsize::new(0));

    // An "owner" object whose pending work must not outlive it.
    struct Owner {
        safety: ScopedSafety,
        count: Arc<AtomicUsize>,
    }

    impl Owner {
        fn schedule(&self, queue: &Arc<impl TaskQueue>, delay: Duration) {
            let count = Arc::clone(&self.count);
            queue.post_delayed(
                Task::guarded(&self.safety.flag(), move || {
                    count.fetch_add(1, Ordering::SeqCst);
                }),
                delay,
            );
        }
    }

    let owner = Owner {
        safety: ScopedSafety::default(),
        count: Arc::clone(&count),
    };

    owner.schedule(&queue, Duration::from_millis(10));
    owner.schedule(&queue, Duration::from_millis(30));

    controller.advance(Duration::from_millis(20));
    assert_eq!(count.load(Ordering::SeqCst), 1);

    // Dropping the owner invalidates the flag; the 30 ms task is skipped.
    drop(owner);
    controller.advance(Duration::from_millis(20));
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[test]
fn safety_flag_mutations_are_owned_by_the_queue() {
    let controller = SimulatedTimeController::default();
    let queue = controller.create_task_queue();

    let flag = SafetyFlag::create_detached();

    // First mutation on the queue attaches the flag there.
    {
        let flag = Arc::clone(&flag);
        queue.post(Task::new(move || flag.set_not_alive()));
    }
    controller.advance(Duration::ZERO);

    assert!(!flag.is_alive());
}

#[test]
fn sequence_checker_follows_queue_identity() {
    let controller = SimulatedTimeController::default();
    let queue = controller.create_task_queue();
    let checker = Arc::new(SequenceChecker::new());

    // Attached here, on the driving thread outside any queue.
    assert!(checker.is_current());

    let observed = Arc::new(Mutex::new(None));
    {
        let checker = Arc::clone(&checker);
        let observed = Arc::clone(&observed);
        queue.post(Task::new(move || {
            *observed.lock().unwrap() = Some(checker.is_current());
        }));
    }
    controller.advance(Duration::ZERO);

    // Inside the queue's task the context differs even though the OS thread is the same.
    assert_eq!(*observed.lock().unwrap(), Some(false));

    checker.detach();
    let reattached = Arc::new(Mutex::new(None));
    {
        let checker = Arc::clone(&checker);
        let reattached = Arc::clone(&reattached);
        queue.post(Task::new(move || {
            *reattached.lock().unwrap() = Some(checker.is_current());
        }));
    }
    controller.advance(Duration::ZERO);

    assert_eq!(*reattached.lock().unwrap(), Some(true));
    assert!(!checker.is_current());
}

#[test]
fn cancelling_by_id_works_under_virtual_time() {
    let controller = SimulatedTimeController::default();
    let queue = controller.create_task_queue();
    let count = Arc::new(AtomicUsize::new(0));

    let keep = {
        let count = Arc::clone(&count);
        Task::new(move || {
            count.fetch_add(1, Ordering::SeqCst);
        })
    };
    let cancel = Task::new(|| panic!("cancelled task must not run"));
    let cancel_id = cancel.id();

    queue.post_delayed(keep, Duration::from_millis(10));
    queue.post_delayed(cancel, Duration::from_millis(10));
    assert!(queue.cancel(cancel_id));

    controller.advance(Duration::from_millis(20));
    assert_eq!(count.load(Ordering::SeqCst), 1);
}
