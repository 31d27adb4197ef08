// Copyright (c) The Spindle Project Authors.
// Licensed under the MIT License.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chime::Timestamp;
use spindle::{CurrentQueueGuard, QueueId, Task, TaskId, TaskQueue};
use tracing::trace;

use crate::controller::ControllerCore;
use crate::runner::{NextRunTime, SimulatedRunner};

/// The simulated-time twin of [`ThreadedTaskQueue`](https://docs.rs/spindle): same
/// [`TaskQueue`] contract, no worker thread.
///
/// Tasks do not run when posted; they run when the owning
/// [`SimulatedTimeController`][crate::SimulatedTimeController] advances far enough, on the
/// thread driving the controller, with this queue installed as
/// [`current_queue`][spindle::current_queue] for the duration of each task.
///
/// Created via [`SimulatedTimeController::create_task_queue`][crate::SimulatedTimeController::create_task_queue].
/// Dropping the last handle removes the queue from its controller; pending tasks are
/// dropped unrun.
#[derive(Debug)]
pub struct SimulatedTaskQueue {
    id: QueueId,
    core: Arc<ControllerCore>,
    state: Mutex<SimState>,
}

#[derive(Debug)]
struct SimState {
    next_order: u64,
    /// Runnable now, in promotion/posting order.
    ready: VecDeque<Task>,
    /// Not yet due, ordered by (due time, posting order).
    delayed: BTreeMap<(Timestamp, u64), Task>,
    /// Cached so the controller can poll without touching the task collections' innards.
    next_run_time: NextRunTime,
}

impl SimState {
    /// Recomputes the cached bound from the task collections. Must be called whenever a
    /// task leaves the queue by a path other than running.
    fn refresh_next_run_time(&mut self) {
        self.next_run_time = if self.ready.is_empty() {
            match self.delayed.first_key_value() {
                Some((&(due, _), _)) => NextRunTime::At(due),
                None => NextRunTime::Never,
            }
        } else {
            NextRunTime::Ready
        };
    }
}

impl SimulatedTaskQueue {
    pub(crate) fn create(core: Arc<ControllerCore>) -> Arc<Self> {
        let queue = Arc::new(Self::new(core));
        let runner = Arc::clone(&queue);
        let runner: Arc<dyn SimulatedRunner> = runner;
        queue.core.register(queue.id, Arc::downgrade(&runner));
        queue
    }

    pub(crate) fn new(core: Arc<ControllerCore>) -> Self {
        Self {
            id: QueueId::new(),
            core,
            state: Mutex::new(SimState {
                next_order: 0,
                ready: VecDeque::new(),
                delayed: BTreeMap::new(),
                next_run_time: NextRunTime::Never,
            }),
        }
    }

    pub(crate) fn core(&self) -> &Arc<ControllerCore> {
        &self.core
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().expect("acquiring the queue lock must always succeed")
    }

    /// Runs ready tasks until the FIFO is empty. The lock is released around each task
    /// body, so tasks can post freely, including to this queue.
    pub(crate) fn run_ready_tasks(&self, now: Timestamp) {
        let _current = CurrentQueueGuard::new(self.id);

        let mut state = self.lock();
        // Promote everything that has come due, in (due time, posting order).
        while let Some((&key, _)) = state.delayed.first_key_value() {
            if key.0 > now {
                break;
            }
            let task = state.delayed.remove(&key).expect("first entry was just observed");
            state.ready.push_back(task);
        }

        while let Some(task) = state.ready.pop_front() {
            drop(state);
            trace!(queue = ?self.id, task = ?task.id(), "running simulated task");
            task.run();
            state = self.lock();
        }

        state.refresh_next_run_time();
    }
}

impl TaskQueue for SimulatedTaskQueue {
    fn id(&self) -> QueueId {
        self.id
    }

    fn post(&self, task: Task) {
        let mut state = self.lock();
        state.ready.push_back(task);
        state.next_run_time = NextRunTime::Ready;
    }

    fn post_delayed(&self, task: Task, delay: Duration) {
        let due = self.core.now().saturating_add(delay);
        let mut state = self.lock();
        state.next_order += 1;
        let order = state.next_order;
        state.delayed.insert((due, order), task);
        state.next_run_time = state.next_run_time.min(NextRunTime::At(due));
    }

    fn cancel(&self, task: TaskId) -> bool {
        let mut state = self.lock();

        if let Some(index) = state.ready.iter().position(|pending| pending.id() == task) {
            drop(state.ready.remove(index));
            state.refresh_next_run_time();
            return true;
        }

        if let Some(key) = state
            .delayed
            .iter()
            .find(|(_, pending)| pending.id() == task)
            .map(|(key, _)| *key)
        {
            drop(state.delayed.remove(&key));
            state.refresh_next_run_time();
            return true;
        }

        false
    }
}

impl SimulatedRunner for SimulatedTaskQueue {
    fn next_run_time(&self) -> NextRunTime {
        self.lock().next_run_time
    }

    fn run_ready(&self, now: Timestamp) {
        self.run_ready_tasks(now);
    }
}

impl Drop for SimulatedTaskQueue {
    fn drop(&mut self) {
        self.core.unregister(self.id);
    }
}
