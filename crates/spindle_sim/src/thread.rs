// Copyright (c) The Spindle Project Authors.
// Licensed under the MIT License.

use std::sync::Arc;
use std::time::Duration;

use chime::Timestamp;
use spindle::{CurrentQueueGuard, QueueId, Task, TaskId, TaskQueue, current_queue};
use tracing::trace;

use crate::controller::ControllerCore;
use crate::queue::SimulatedTaskQueue;
use crate::runner::{NextRunTime, SimulatedRunner};

/// A simulated queue that additionally supports synchronous calls, the way a real thread
/// supports sending a closure over and blocking on the result.
///
/// Created via [`SimulatedTimeController::create_thread`][crate::SimulatedTimeController::create_thread].
#[derive(Debug)]
pub struct SimulatedThread {
    inner: SimulatedTaskQueue,
}

impl SimulatedThread {
    pub(crate) fn create(core: Arc<ControllerCore>) -> Arc<Self> {
        let thread = Arc::new(Self {
            inner: SimulatedTaskQueue::new(core),
        });
        let runner = Arc::clone(&thread);
        let runner: Arc<dyn SimulatedRunner> = runner;
        thread.inner.core().register(thread.id(), Arc::downgrade(&runner));
        thread
    }

    /// Runs `work` "on" this thread and returns its result.
    ///
    /// Called from one of this thread's own tasks, `work` simply runs inline. Called from
    /// anywhere else, the calling context yields: this thread's already-due tasks run
    /// first (they would have run before the call on a real thread), then `work` runs with
    /// this thread installed as [`current_queue`], and only then does the caller resume.
    /// Yielding is what keeps a blocking call from deadlocking two simulated threads that
    /// call into each other.
    pub fn blocking_call<F, R>(&self, work: F) -> R
    where
        F: FnOnce() -> R,
    {
        if self.is_current() {
            return work();
        }

        let caller = current_queue();
        trace!(thread = ?self.id(), ?caller, "blocking call");
        self.inner.core().start_yield(caller);
        self.inner.run_ready_tasks(self.inner.core().now());
        let result = {
            let _current = CurrentQueueGuard::new(self.id());
            work()
        };
        self.inner.core().stop_yield(caller);
        result
    }
}

impl TaskQueue for SimulatedThread {
    fn id(&self) -> QueueId {
        self.inner.id()
    }

    fn post(&self, task: Task) {
        self.inner.post(task);
    }

    fn post_delayed(&self, task: Task, delay: Duration) {
        self.inner.post_delayed(task, delay);
    }

    fn cancel(&self, task: TaskId) -> bool {
        self.inner.cancel(task)
    }
}

impl SimulatedRunner for SimulatedThread {
    fn next_run_time(&self) -> NextRunTime {
        self.inner.next_run_time()
    }

    fn run_ready(&self, now: Timestamp) {
        self.inner.run_ready(now);
    }
}
