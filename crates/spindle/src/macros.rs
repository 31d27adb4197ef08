// Copyright (c) The Spindle Project Authors.
// Licensed under the MIT License.

/// Asserts, in debug builds, that the current code runs on the expected sequence.
///
/// Accepts anything with an `is_current()` and `expectation()` pair — a
/// [`SequenceChecker`][crate::SequenceChecker] — or any
/// [`TaskQueue`][crate::TaskQueue] via the `queue` form, and panics with the
/// expected-versus-actual identities on mismatch. Compiles to nothing in release builds,
/// matching its role as a diagnostic safety net rather than an enforcement mechanism.
///
/// ```
/// use spindle::{SequenceChecker, debug_assert_run_on};
///
/// struct Counter {
///     sequence: SequenceChecker,
///     value: u64,
/// }
///
/// impl Counter {
///     fn bump(&mut self) {
///         debug_assert_run_on!(&self.sequence);
///         self.value += 1;
///     }
/// }
/// # let mut counter = Counter { sequence: SequenceChecker::new(), value: 0 };
/// # counter.bump();
/// ```
#[macro_export]
macro_rules! debug_assert_run_on {
    ($checker:expr) => {
        debug_assert!(($checker).is_current(), "{}", ($checker).expectation());
    };
    (queue: $queue:expr) => {
        debug_assert!(
            $crate::TaskQueue::is_current($queue),
            "expected to run on queue {:?}, but running on {:?}",
            $crate::TaskQueue::id($queue),
            $crate::current_queue(),
        );
    };
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use crate::SequenceChecker;

    #[test]
    fn passes_on_the_attached_sequence() {
        let checker = SequenceChecker::new();
        debug_assert_run_on!(&checker);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "expected to run on")]
    fn fails_off_the_attached_sequence() {
        let checker = std::thread::spawn(SequenceChecker::new).join().unwrap();
        debug_assert_run_on!(&checker);
    }
}
