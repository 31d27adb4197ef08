// Copyright (c) The Spindle Project Authors.
// Licensed under the MIT License.

use std::sync::Arc;
use std::sync::mpsc;
use std::time::Duration;

use crate::{Error, QueueId, Task, TaskId, TaskQueue, ThreadedTaskQueue};

/// A [`ThreadedTaskQueue`] wrapper with the blocking helpers tests want.
///
/// Production code only ever posts; tests additionally need to run a closure on the queue
/// and wait for it, or to wait for everything already posted to settle before asserting.
/// Requires the `test-util` feature.
///
/// # Examples
///
/// ```
/// use spindle::{TaskQueue, TestQueue};
///
/// let queue = TestQueue::new("unit-test")?;
///
/// let on_queue = queue.send({
///     let probe = std::sync::Arc::clone(queue.queue());
///     move || probe.is_current()
/// });
/// assert!(on_queue);
/// # Ok::<(), spindle::Error>(())
/// ```
#[derive(Debug)]
pub struct TestQueue {
    queue: Arc<ThreadedTaskQueue>,
}

impl TestQueue {
    /// Spawns a queue whose worker thread carries `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Spawn`] when the worker thread cannot be created.
    pub fn new(name: impl Into<String>) -> Result<Self, Error> {
        Ok(Self {
            queue: ThreadedTaskQueue::builder(name).spawn()?,
        })
    }

    /// The wrapped queue, for handing to code under test.
    #[must_use]
    pub fn queue(&self) -> &Arc<ThreadedTaskQueue> {
        &self.queue
    }

    /// Runs `work` on the queue and blocks until it returns, yielding its result.
    ///
    /// # Panics
    ///
    /// Panics when the queue is torn down before `work` ran.
    pub fn send<F, R>(&self, work: F) -> R
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (sender, receiver) = mpsc::channel();
        self.queue.post(Task::new(move || {
            // A send failure means the caller gave up waiting; nothing to do with it.
            drop(sender.send(work()));
        }));
        receiver
            .recv()
            .expect("queue was torn down before the sent closure ran")
    }

    /// Blocks until every task posted before this call has finished.
    ///
    /// Later-posted tasks, including delayed tasks not yet due, are not waited for.
    pub fn wait_for_posted_tasks(&self) {
        self.send(|| {});
    }
}

impl TaskQueue for TestQueue {
    fn id(&self) -> QueueId {
        self.queue.id()
    }

    fn post(&self, task: Task) {
        self.queue.post(task);
    }

    fn post_delayed(&self, task: Task, delay: Duration) {
        self.queue.post_delayed(task, delay);
    }

    fn cancel(&self, task: TaskId) -> bool {
        self.queue.cancel(task)
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use std::fmt::Debug;
    use std::sync::Mutex;

    use super::*;

    #[test]
    fn assert_types() {
        static_assertions::assert_impl_all!(TestQueue: Debug, Send, Sync);
    }

    #[test]
    fn send_returns_the_closure_result() {
        let queue = TestQueue::new("send").unwrap();
        assert_eq!(queue.send(|| 6 * 7), 42);
    }

    #[test]
    fn send_runs_on_the_queue() {
        let queue = TestQueue::new("send-current").unwrap();
        let probe = Arc::clone(queue.queue());
        assert!(queue.send(move || probe.is_current()));
    }

    #[test]
    fn wait_for_posted_tasks_is_a_barrier() {
        let queue = TestQueue::new("barrier").unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));

        for i in 0..10 {
            let log = Arc::clone(&log);
            queue.post(Task::new(move || log.lock().unwrap().push(i)));
        }
        queue.wait_for_posted_tasks();

        assert_eq!(log.lock().unwrap().len(), 10);
    }
}
