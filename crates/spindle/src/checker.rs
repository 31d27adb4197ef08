// Copyright (c) The Spindle Project Authors.
// Licensed under the MIT License.

use std::fmt;
use std::sync::Mutex;
use std::thread::{self, ThreadId};

use crate::{QueueId, current_queue};

/// The identity a checker is bound to: a queue when one was executing at attach time,
/// otherwise the bare OS thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SequenceBound {
    queue: Option<QueueId>,
    thread: ThreadId,
}

impl SequenceBound {
    fn capture() -> Self {
        Self {
            queue: current_queue(),
            thread: thread::current().id(),
        }
    }

    fn matches_calling_context(self) -> bool {
        match self.queue {
            // Queue identity wins: any thread draining that queue is "the sequence".
            Some(queue) => current_queue() == Some(queue),
            None => current_queue().is_none() && thread::current().id() == self.thread,
        }
    }
}

/// Verifies at runtime that code executes on the expected queue or thread.
///
/// Embed one of these in an object whose methods must all run on a single sequence, and
/// check it at each entry point — typically through
/// [`debug_assert_run_on!`][crate::debug_assert_run_on]. This is a diagnostic safety net,
/// not an enforcement mechanism: a mismatch indicates a bug in the caller, and the macro
/// reports it fatally rather than recovering.
///
/// A checker is either *attached* to a captured identity or *detached*. While attached,
/// [`is_current`][Self::is_current] compares the calling context against the captured
/// identity. A detached checker attaches to whatever context performs the next check (and
/// that check succeeds), which is how objects constructed on one thread and used on another
/// express "first use decides".
///
/// # Examples
///
/// ```
/// use spindle::SequenceChecker;
///
/// let checker = SequenceChecker::new();
/// assert!(checker.is_current());
///
/// checker.detach();
/// // The next check, wherever it happens, re-attaches.
/// assert!(checker.is_current());
/// ```
pub struct SequenceChecker {
    bound: Mutex<Option<SequenceBound>>,
}

impl SequenceChecker {
    /// Creates a checker attached to the calling context.
    #[must_use]
    pub fn new() -> Self {
        Self {
            bound: Mutex::new(Some(SequenceBound::capture())),
        }
    }

    /// Creates a detached checker; the first [`is_current`][Self::is_current] attaches it.
    #[must_use]
    pub fn detached() -> Self {
        Self { bound: Mutex::new(None) }
    }

    /// Creates a checker attached to the given queue, regardless of where the constructor
    /// itself runs.
    #[must_use]
    pub fn for_queue(queue: QueueId) -> Self {
        Self {
            bound: Mutex::new(Some(SequenceBound {
                queue: Some(queue),
                thread: thread::current().id(),
            })),
        }
    }

    /// Returns `true` if the calling context matches the attached identity.
    ///
    /// A detached checker attaches to the calling context and returns `true`. An attached
    /// checker does not auto-correct on mismatch; it keeps its identity and returns
    /// `false`.
    #[must_use]
    pub fn is_current(&self) -> bool {
        let mut bound = self.lock();
        match *bound {
            Some(bound) => bound.matches_calling_context(),
            None => {
                *bound = Some(SequenceBound::capture());
                true
            }
        }
    }

    /// Detaches the checker from its current identity.
    ///
    /// The next [`is_current`][Self::is_current] call re-attaches to whichever context
    /// performs it.
    pub fn detach(&self) {
        *self.lock() = None;
    }

    /// Renders the expected-versus-actual identities for a failed check.
    ///
    /// Meant for the message of a fatal assertion; the format is diagnostic output, not an
    /// API contract.
    #[must_use]
    pub fn expectation(&self) -> String {
        let bound = self.lock();
        let actual = SequenceBound::capture();
        match *bound {
            Some(expected) => format!(
                "expected to run on {expected:?}, but running on {actual:?}"
            ),
            None => format!("checker is detached; running on {actual:?}"),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<SequenceBound>> {
        self.bound.lock().expect("acquiring the checker lock must always succeed")
    }
}

impl Default for SequenceChecker {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SequenceChecker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SequenceChecker").field("bound", &*self.lock()).finish()
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use std::fmt::Debug;
    use std::sync::Arc;

    use crate::CurrentQueueGuard;

    use super::*;

    #[test]
    fn assert_types() {
        static_assertions::assert_impl_all!(SequenceChecker: Debug, Send, Sync, Default);
    }

    #[test]
    fn attached_checker_accepts_same_thread() {
        let checker = SequenceChecker::new();
        assert!(checker.is_current());
        assert!(checker.is_current());
    }

    #[test]
    fn attached_checker_rejects_other_thread() {
        let checker = Arc::new(SequenceChecker::new());
        let remote = Arc::clone(&checker);

        thread::spawn(move || assert!(!remote.is_current()))
            .join()
            .unwrap();

        assert!(checker.is_current());
    }

    #[test]
    fn detach_then_check_reattaches_to_the_caller() {
        let checker = Arc::new(SequenceChecker::new());
        checker.detach();

        let remote = Arc::clone(&checker);
        thread::spawn(move || assert!(remote.is_current()))
            .join()
            .unwrap();

        // Now bound to the other (dead) thread, so this thread mismatches.
        assert!(!checker.is_current());
    }

    #[test]
    fn detached_constructor_attaches_on_first_check() {
        let checker = SequenceChecker::detached();
        assert!(checker.is_current());
    }

    #[test]
    fn queue_identity_wins_over_thread_identity() {
        let queue = QueueId::new();
        let checker = {
            let _guard = CurrentQueueGuard::new(queue);
            SequenceChecker::new()
        };

        // Same thread, but no longer on the queue.
        assert!(!checker.is_current());

        let _guard = CurrentQueueGuard::new(queue);
        assert!(checker.is_current());
    }

    #[test]
    fn for_queue_binds_without_running_on_it() {
        let queue = QueueId::new();
        let checker = SequenceChecker::for_queue(queue);

        assert!(!checker.is_current());

        let _guard = CurrentQueueGuard::new(queue);
        assert!(checker.is_current());
    }

    #[test]
    fn expectation_mentions_both_sides() {
        let checker = SequenceChecker::new();
        let text = checker.expectation();

        assert!(text.contains("expected to run on"));
        assert!(text.contains("running on"));

        checker.detach();
        assert!(checker.expectation().contains("detached"));
    }
}
