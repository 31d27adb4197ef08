// Copyright (c) The Spindle Project Authors.
// Licensed under the MIT License.

use std::cell::Cell;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::{Task, TaskId};

/// Identifies one logical task queue for the lifetime of the process.
///
/// Queue identity underpins [`TaskQueue::is_current`] and
/// [`SequenceChecker`][crate::SequenceChecker]: two queues never share an id, and an id is
/// never reused even after its queue is destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueueId(u64);

impl QueueId {
    /// Allocates a fresh queue identity.
    ///
    /// Called by queue implementations at construction. Ids are process-unique.
    #[must_use]
    pub fn new() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for QueueId {
    fn default() -> Self {
        Self::new()
    }
}

thread_local! {
    /// The queue whose worker is presently draining on this thread, if any.
    static CURRENT_QUEUE: Cell<Option<QueueId>> = const { Cell::new(None) };
}

/// Returns the identity of the queue currently executing on this thread, if any.
///
/// This is `Some` exactly while a queue's worker is draining tasks on the calling thread
/// (the marker is installed for the worker's whole lifetime on thread-backed queues, and
/// around each drain on simulated ones).
#[must_use]
pub fn current_queue() -> Option<QueueId> {
    CURRENT_QUEUE.with(Cell::get)
}

/// Installs a queue identity as "current" on this thread for the guard's lifetime.
///
/// Queue implementations wrap task execution in one of these so that
/// [`TaskQueue::is_current`] and sequence checkers observe the right identity. The previous
/// marker is restored on drop, which makes nested drains (a simulated controller stepping a
/// queue from inside another queue's blocking call) come out right.
pub struct CurrentQueueGuard {
    previous: Option<QueueId>,
    /// The marker is thread-local; moving the guard to another thread would unwind the
    /// wrong slot.
    _not_send: PhantomData<*const ()>,
}

impl CurrentQueueGuard {
    /// Marks `id` as the queue executing on this thread.
    #[must_use]
    pub fn new(id: QueueId) -> Self {
        Self {
            previous: CURRENT_QUEUE.with(|current| current.replace(Some(id))),
            _not_send: PhantomData,
        }
    }

    /// Clears the current-queue marker for the guard's lifetime.
    ///
    /// Used when execution temporarily leaves a queue (yielding), so checkers do not
    /// mistake controller work for queue work.
    #[must_use]
    pub fn cleared() -> Self {
        Self {
            previous: CURRENT_QUEUE.with(|current| current.replace(None)),
            _not_send: PhantomData,
        }
    }
}

impl Drop for CurrentQueueGuard {
    fn drop(&mut self) {
        CURRENT_QUEUE.with(|current| current.set(self.previous));
    }
}

impl fmt::Debug for CurrentQueueGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CurrentQueueGuard").field("previous", &self.previous).finish()
    }
}

/// One logical, single-writer execution context.
///
/// At most one task from a given queue executes at any instant, and always on the queue's
/// own logical worker. Posting never blocks the caller. Within one queue, immediate tasks
/// run in posting order and delayed tasks run in non-decreasing due-time order with ties
/// broken by posting order; across distinct queues no ordering is guaranteed.
///
/// Destroying a queue (dropping the concrete type) discards still-pending tasks without
/// running them and does not return until no task from the queue is executing anywhere.
///
/// A task body that panics is not caught by the queue; the panic propagates on the worker.
pub trait TaskQueue: Send + Sync {
    /// Returns this queue's process-unique identity.
    fn id(&self) -> QueueId;

    /// Enqueues `task` for execution as soon as the worker gets to it.
    ///
    /// Tasks posted from the same thread run in posting order relative to each other.
    fn post(&self, task: Task);

    /// Enqueues `task` for execution no earlier than `delay` from now.
    ///
    /// There is no real-time precision guarantee beyond "no earlier than"; among delayed
    /// tasks from the same queue, earlier due-times always run first.
    fn post_delayed(&self, task: Task, delay: Duration);

    /// Best-effort removal of a not-yet-started task.
    ///
    /// Returns `true` if the task was found pending and removed, `false` if it already
    /// ran, is currently running, or was never posted here.
    fn cancel(&self, task: TaskId) -> bool;

    /// Returns `true` iff called from within work currently being executed by this queue.
    fn is_current(&self) -> bool {
        current_queue() == Some(self.id())
    }
}
