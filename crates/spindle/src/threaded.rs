// Copyright (c) The Spindle Project Authors.
// Licensed under the MIT License.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chime::{Clock, Timestamp};
use tracing::{debug, error, trace};

use crate::{CurrentQueueGuard, Error, QueueId, Task, TaskId, TaskQueue};

/// Posting order tag. Shared between the immediate FIFO and the delayed map so that a due
/// delayed task and an immediate task can be sequenced by who was posted first.
type OrderId = u64;

/// A [`TaskQueue`] backed by one dedicated OS worker thread.
///
/// This is the production execution engine. Immediate tasks go into a FIFO; delayed tasks
/// into a map ordered by (due-time, posting order). The worker runs whichever pending task
/// comes first in posting order among those that are due, and otherwise sleeps on a
/// condition variable until the nearest due-time or the next post.
///
/// # Destruction
///
/// Dropping the queue is the sole destruction path. It refuses new work, wakes the worker,
/// and joins it; the worker drops (does not run) everything still pending, with the
/// current-queue marker installed so that task destructors observing
/// [`current_queue`][crate::current_queue] see this queue. Drop returns only once the
/// worker is gone, so no task body executes after the queue's memory is released.
///
/// Dropping from inside one of the queue's own tasks would self-join and therefore panics.
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
///
/// use spindle::{Task, TaskQueue, ThreadedTaskQueue};
///
/// let queue = ThreadedTaskQueue::builder("encoder").spawn()?;
///
/// queue.post(Task::new(|| println!("right away")));
/// queue.post_delayed(Task::new(|| println!("a bit later")), Duration::from_millis(20));
/// # Ok::<(), spindle::Error>(())
/// ```
#[derive(Debug)]
pub struct ThreadedTaskQueue {
    id: QueueId,
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

/// Builder for [`ThreadedTaskQueue`].
///
/// The name becomes the worker thread's name; the clock defaults to [`Clock::system`] and
/// is substituted in tests that want delayed-task due-times computed against controlled
/// time.
#[derive(Debug)]
pub struct ThreadedTaskQueueBuilder {
    name: String,
    clock: Clock,
}

impl ThreadedTaskQueueBuilder {
    /// Uses `clock` for delayed-task due-time computation.
    #[must_use]
    pub fn clock(mut self, clock: &Clock) -> Self {
        self.clock = clock.clone();
        self
    }

    /// Spawns the worker thread and returns the running queue.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Spawn`] when the OS refuses to create the worker thread.
    pub fn spawn(self) -> Result<Arc<ThreadedTaskQueue>, Error> {
        let id = QueueId::new();
        let shared = Arc::new(Shared {
            clock: self.clock,
            state: Mutex::new(State::default()),
            wake: Condvar::new(),
        });

        let worker = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name(self.name.clone())
                .spawn(move || shared.process_tasks(id))?
        };

        debug!(queue = ?id, name = %self.name, "task queue worker started");

        Ok(Arc::new(ThreadedTaskQueue {
            id,
            shared,
            worker: Some(worker),
        }))
    }
}

impl ThreadedTaskQueue {
    /// Starts building a queue whose worker thread carries `name`.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> ThreadedTaskQueueBuilder {
        ThreadedTaskQueueBuilder {
            name: name.into(),
            clock: Clock::system(),
        }
    }
}

impl TaskQueue for ThreadedTaskQueue {
    fn id(&self) -> QueueId {
        self.id
    }

    fn post(&self, task: Task) {
        {
            let mut state = self.shared.lock();
            if state.quitting {
                trace!(queue = ?self.id, task = ?task.id(), "dropping task posted during teardown");
                return;
            }
            state.next_order += 1;
            let order = state.next_order;
            state.immediate.push_back((order, task));
        }
        self.shared.wake.notify_one();
    }

    fn post_delayed(&self, task: Task, delay: Duration) {
        let due = self.shared.clock.now().saturating_add(delay);
        {
            let mut state = self.shared.lock();
            if state.quitting {
                trace!(queue = ?self.id, task = ?task.id(), "dropping task posted during teardown");
                return;
            }
            state.next_order += 1;
            let order = state.next_order;
            state.delayed.insert((due, order), task);
        }
        self.shared.wake.notify_one();
    }

    fn cancel(&self, task: TaskId) -> bool {
        let mut state = self.shared.lock();

        if let Some(index) = state.immediate.iter().position(|(_, pending)| pending.id() == task) {
            drop(state.immediate.remove(index));
            return true;
        }

        if let Some(key) = state
            .delayed
            .iter()
            .find(|(_, pending)| pending.id() == task)
            .map(|(key, _)| *key)
        {
            drop(state.delayed.remove(&key));
            return true;
        }

        false
    }
}

impl Drop for ThreadedTaskQueue {
    fn drop(&mut self) {
        assert!(
            !self.is_current(),
            "a task queue must not be destroyed from one of its own tasks"
        );

        {
            let mut state = self.shared.lock();
            state.quitting = true;
        }
        self.shared.wake.notify_one();

        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            // A task body panicked and killed the worker. The panic already unwound there;
            // all we can do here is record that the queue died unclean.
            error!(queue = ?self.id, "task queue worker terminated by a panicking task");
        }

        debug!(queue = ?self.id, "task queue destroyed");
    }
}

#[derive(Debug)]
struct Shared {
    clock: Clock,
    state: Mutex<State>,
    wake: Condvar,
}

#[derive(Debug, Default)]
struct State {
    quitting: bool,
    next_order: OrderId,
    immediate: VecDeque<(OrderId, Task)>,
    delayed: BTreeMap<(Timestamp, OrderId), Task>,
}

/// What the worker should do next: run a task, sleep for a bounded time, sleep until
/// posted, or shut down.
enum NextTask {
    Run(Task),
    SleepFor(Duration),
    Sleep,
    Quit,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("acquiring the queue lock must always succeed")
    }

    /// The worker loop. Runs with the current-queue marker installed for its entire
    /// lifetime, including the final drain-and-drop of pending tasks.
    #[cfg_attr(test, mutants::skip)] // Mutating the loop hangs the worker instead of failing.
    fn process_tasks(&self, id: QueueId) {
        let _current = CurrentQueueGuard::new(id);

        // The decision to sleep and the sleep itself share one critical section: a post
        // cannot land between observing the queue empty and parking on the condition
        // variable, so its wake-up is never lost.
        let mut state = self.lock();
        loop {
            match self.next_task(&mut state) {
                NextTask::Run(task) => {
                    drop(state);
                    trace!(queue = ?id, task = ?task.id(), location = %task.location(), "running task");
                    task.run();
                    state = self.lock();
                }
                NextTask::SleepFor(timeout) => {
                    // Sleep until the nearest due-time or a wake-up; spurious wake-ups
                    // just re-evaluate.
                    state = self
                        .wake
                        .wait_timeout(state, timeout)
                        .expect("acquiring the queue lock must always succeed")
                        .0;
                }
                NextTask::Sleep => {
                    state = self
                        .wake
                        .wait(state)
                        .expect("acquiring the queue lock must always succeed");
                }
                NextTask::Quit => break,
            }
        }

        // Drop remaining tasks while this queue is still "current", so their destructors
        // can consult the marker.
        let immediate = std::mem::take(&mut state.immediate);
        let delayed = std::mem::take(&mut state.delayed);
        drop(state);
        let discarded = immediate.len() + delayed.len();
        if discarded > 0 {
            debug!(queue = ?id, discarded, "discarding pending tasks on teardown");
        }
        drop(immediate);
        drop(delayed);
    }

    fn next_task(&self, state: &mut State) -> NextTask {
        let now = self.clock.now();

        if state.quitting {
            return NextTask::Quit;
        }

        if let Some((&(due, delayed_order), _)) = state.delayed.first_key_value() {
            if due <= now {
                // The delayed task is due; run whichever of it and the head immediate
                // task was posted first.
                if let Some(&(immediate_order, _)) = state.immediate.front()
                    && immediate_order < delayed_order
                {
                    let (_, task) = state.immediate.pop_front().expect("front was just observed");
                    return NextTask::Run(task);
                }

                let task = state
                    .delayed
                    .remove(&(due, delayed_order))
                    .expect("first entry was just observed");
                return NextTask::Run(task);
            }

            if state.immediate.is_empty() {
                return NextTask::SleepFor(due.saturating_duration_since(now));
            }
        }

        match state.immediate.pop_front() {
            Some((_, task)) => NextTask::Run(task),
            None => NextTask::Sleep,
        }
    }
}
