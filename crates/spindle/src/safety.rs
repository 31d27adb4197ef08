// Copyright (c) The Spindle Project Authors.
// Licensed under the MIT License.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::{QueueId, SequenceChecker, debug_assert_run_on};

/// A shared liveness token that lets posted tasks detect a destroyed owner.
///
/// The flag addresses the situation where a task scheduled for later references state that
/// may no longer exist by the time the task runs. The owner keeps one reference and clears
/// the flag when it is torn down; every posted closure captures another reference and
/// checks [`is_alive`][Self::is_alive] before touching the owner. No universal reference
/// counting of the owner is needed.
///
/// [`Task::guarded`][crate::Task::guarded] performs the check automatically:
///
/// ```
/// use spindle::{SafetyFlag, Task};
///
/// struct Example {
///     flag: std::sync::Arc<SafetyFlag>,
/// }
///
/// impl Example {
///     fn schedule(&self, queue: &dyn spindle::TaskQueue) {
///         queue.post(Task::guarded(&self.flag, || {
///             // Runs only if the flag is still alive by then.
///         }));
///     }
/// }
///
/// impl Drop for Example {
///     fn drop(&mut self) {
///         self.flag.set_not_alive();
///     }
/// }
/// ```
///
/// This is best-effort cancellation: clearing the flag prevents *future* executions but
/// cannot interrupt a body that already started. Callers that need a hard guarantee must
/// synchronize through the owning queue instead (clear the flag on the queue itself).
///
/// # Threading
///
/// The alive bit is an atomic with acquire/release ordering: a task that reads the flag
/// after it was cleared on another thread is guaranteed to observe the clear. Mutations,
/// however, belong to the flag's owning sequence and are debug-checked against it;
/// flags created with [`create`][Self::create] attach at construction, while
/// [`create_detached`][Self::create_detached] flags attach at the first mutation.
pub struct SafetyFlag {
    alive: AtomicBool,
    /// Guards mutations, not reads. Reads are deliberately free-threaded.
    owning_sequence: SequenceChecker,
}

impl SafetyFlag {
    /// Creates an alive flag attached to the calling sequence.
    #[must_use]
    pub fn create() -> Arc<Self> {
        Arc::new(Self {
            alive: AtomicBool::new(true),
            owning_sequence: SequenceChecker::new(),
        })
    }

    /// Creates an alive flag with its sequence initially detached.
    ///
    /// Use this when the flag is constructed on a different sequence than the one that
    /// will own it; the first mutation attaches it there.
    #[must_use]
    pub fn create_detached() -> Arc<Self> {
        Arc::new(Self {
            alive: AtomicBool::new(true),
            owning_sequence: SequenceChecker::detached(),
        })
    }

    /// Same as [`create_detached`][Self::create_detached], except the returned flag starts
    /// not alive. Supports start/stop/restart owners that begin stopped.
    #[must_use]
    pub fn create_detached_inactive() -> Arc<Self> {
        Arc::new(Self {
            alive: AtomicBool::new(false),
            owning_sequence: SequenceChecker::detached(),
        })
    }

    /// Creates a flag attached to the given queue with the given initial state.
    #[must_use]
    pub fn create_attached_to_queue(alive: bool, queue: QueueId) -> Arc<Self> {
        Arc::new(Self {
            alive: AtomicBool::new(alive),
            owning_sequence: SequenceChecker::for_queue(queue),
        })
    }

    /// Returns whether the owner is still alive.
    ///
    /// Callable from any thread; pairs with [`set_not_alive`][Self::set_not_alive] via
    /// acquire/release ordering.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Marks the owner as gone. Tasks guarded by this flag will skip their bodies.
    ///
    /// Monotonic in practice: nothing flips the flag back except an explicit
    /// [`set_alive`][Self::set_alive] by the owner on the owning sequence.
    pub fn set_not_alive(&self) {
        debug_assert_run_on!(&self.owning_sequence);
        self.alive.store(false, Ordering::Release);
    }

    /// Re-marks the owner as alive, supporting start/stop/restart use cases.
    ///
    /// Subtlety inherited from the contract: any task posted before
    /// [`set_not_alive`][Self::set_not_alive] and still pending is resurrected and will
    /// run. Owners that must not see stale tasks should drop the flag and create a fresh
    /// one instead.
    pub fn set_alive(&self) {
        debug_assert_run_on!(&self.owning_sequence);
        self.alive.store(true, Ordering::Release);
    }
}

impl fmt::Debug for SafetyFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SafetyFlag")
            .field("alive", &self.is_alive())
            .finish_non_exhaustive()
    }
}

/// Owns a [`SafetyFlag`] and clears it on drop.
///
/// Embed one of these in the object whose tasks must be dropped after destruction; the
/// flag is created and cleared automatically with the object's lifetime. Construct and
/// drop it on the same sequence the guarded tasks run on (use
/// [`detached`][Self::detached] when construction happens elsewhere).
#[derive(Debug)]
pub struct ScopedSafety {
    flag: Arc<SafetyFlag>,
}

impl ScopedSafety {
    /// Creates a scope with a fresh flag attached to the calling sequence.
    #[must_use]
    pub fn new() -> Self {
        Self { flag: SafetyFlag::create() }
    }

    /// Creates a scope whose flag attaches to the sequence that first mutates it.
    #[must_use]
    pub fn detached() -> Self {
        Self {
            flag: SafetyFlag::create_detached(),
        }
    }

    /// Returns a new reference to the safety flag.
    #[must_use]
    pub fn flag(&self) -> Arc<SafetyFlag> {
        Arc::clone(&self.flag)
    }

    /// Marks the current flag as not alive and adopts `new_flag` in its place.
    pub fn reset(&mut self, new_flag: Arc<SafetyFlag>) {
        self.flag.set_not_alive();
        self.flag = new_flag;
    }
}

impl Default for ScopedSafety {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ScopedSafety {
    fn drop(&mut self) {
        self.flag.set_not_alive();
    }
}
