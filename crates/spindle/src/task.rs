// Copyright (c) The Spindle Project Authors.
// Licensed under the MIT License.

use std::fmt;
use std::panic::Location;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::SafetyFlag;

/// Identifies one posted [`Task`] for the lifetime of the process.
///
/// Capture the id before posting to [`cancel`][crate::TaskQueue::cancel] the task later:
///
/// ```
/// use spindle::Task;
///
/// let task = Task::new(|| println!("hello"));
/// let id = task.id();
/// # let _ = (task, id);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

impl TaskId {
    fn next() -> Self {
        /// Ids only need to be unique, not dense; a relaxed counter is sufficient.
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// One owned unit of deferred work.
///
/// A task is created by the poster, handed by unique ownership to a queue, and then either
/// executed exactly once or dropped exactly once (on queue teardown or cancellation).
/// Ownership does the bookkeeping the original raw-pointer "auto-delete" interop needed;
/// there is no non-owning mode.
///
/// The source location of the constructing call site is recorded via `#[track_caller]` and
/// shows up in queue diagnostics.
pub struct Task {
    id: TaskId,
    location: &'static Location<'static>,
    body: Box<dyn FnOnce() + Send>,
}

impl Task {
    /// Creates a task from a closure.
    #[must_use]
    #[track_caller]
    pub fn new(body: impl FnOnce() + Send + 'static) -> Self {
        Self {
            id: TaskId::next(),
            location: Location::caller(),
            body: Box::new(body),
        }
    }

    /// Creates a task whose body is skipped when `flag` is no longer alive.
    ///
    /// This makes the safety-flag check automatic: the returned task reads the flag at the
    /// start of execution and silently does nothing if [`SafetyFlag::set_not_alive`] has
    /// been called in the meantime. This is best-effort cancellation, not mutual
    /// exclusion: a body already running when the flag flips completes normally.
    ///
    /// ```
    /// use spindle::{SafetyFlag, Task};
    ///
    /// let flag = SafetyFlag::create_detached();
    /// let task = Task::guarded(&flag, || unreachable!("owner is gone"));
    ///
    /// flag.set_not_alive();
    /// task.run(); // body skipped
    /// ```
    #[must_use]
    #[track_caller]
    pub fn guarded(flag: &Arc<SafetyFlag>, body: impl FnOnce() + Send + 'static) -> Self {
        let flag = Arc::clone(flag);
        Self::new(move || {
            if flag.is_alive() {
                body();
            }
        })
    }

    /// Returns the process-unique identity of this task.
    #[must_use]
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Returns the source location of the call that constructed this task.
    #[must_use]
    pub fn location(&self) -> &'static Location<'static> {
        self.location
    }

    /// Consumes the task and executes its body.
    ///
    /// A panicking body propagates to the caller; queues deliberately do not catch it.
    pub fn run(self) {
        (self.body)();
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("location", &format_args!("{}", self.location))
            .finish_non_exhaustive()
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use std::fmt::Debug;
    use std::sync::atomic::AtomicBool;

    use super::*;

    #[test]
    fn assert_types() {
        static_assertions::assert_impl_all!(Task: Debug, Send);
        static_assertions::assert_impl_all!(TaskId: Debug, Send, Sync, Copy);
    }

    #[test]
    fn ids_are_unique() {
        let a = Task::new(|| {});
        let b = Task::new(|| {});

        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn run_executes_body_once() {
        let ran = Arc::new(AtomicBool::new(false));
        let task = {
            let ran = Arc::clone(&ran);
            Task::new(move || ran.store(true, Ordering::SeqCst))
        };

        task.run();

        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn location_points_at_construction_site() {
        let task = Task::new(|| {});
        assert!(task.location().file().ends_with("task.rs"));
    }

    #[test]
    fn guarded_runs_while_alive() {
        let flag = SafetyFlag::create_detached();
        let ran = Arc::new(AtomicBool::new(false));
        let task = {
            let ran = Arc::clone(&ran);
            Task::guarded(&flag, move || ran.store(true, Ordering::SeqCst))
        };

        task.run();

        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn guarded_skips_when_dead() {
        let flag = SafetyFlag::create_detached();
        let task = Task::guarded(&flag, || panic!("must not run"));

        flag.set_not_alive();
        task.run();
    }

    #[test]
    fn dropping_without_running_is_fine() {
        let task = Task::new(|| panic!("must not run"));
        drop(task);
    }
}
