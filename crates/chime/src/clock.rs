// Copyright (c) The Spindle Project Authors.
// Licensed under the MIT License.

use std::sync::{Arc, OnceLock};
use std::time::Instant;

use crate::Timestamp;

/// Provides an abstraction for reading the current time.
///
/// Task queues, repeating timers and everything else that needs to know "now" takes a
/// `Clock` rather than calling an OS time function directly. This is what makes the whole
/// toolkit testable: in tests the clock is backed by a
/// [`ClockControl`][crate::ClockControl] (available with the `test-util` feature) and time
/// moves only when the test says so.
///
/// # Cloning and shared state
///
/// Cloning a clock is inexpensive (just an `Arc` clone) and every clone shares the same
/// underlying time source. A clone of a controlled clock observes every manual advance
/// performed through the originating control.
///
/// # System clocks
///
/// [`Clock::system`] reads the monotonic OS clock against a single process-wide epoch that
/// is anchored the first time any system clock is read. All system clocks therefore agree
/// with each other, and their timestamps can be compared freely. The epoch anchor is the
/// explicit, process-owned stand-in for a "real time clock" singleton.
///
/// # Examples
///
/// ```
/// use chime::Clock;
///
/// let clock = Clock::system();
///
/// let t1 = clock.now();
/// let t2 = clock.now();
///
/// assert!(t2 >= t1);
/// ```
#[derive(Debug, Clone)]
pub struct Clock(Arc<ClockState>);

#[derive(Debug)]
enum ClockState {
    System,
    #[cfg(any(feature = "test-util", test))]
    Control(crate::ClockControl),
}

/// The instant all system clocks measure from. Anchored lazily on first read and never
/// torn down; it holds no resources besides the `Instant` itself.
static SYSTEM_EPOCH: OnceLock<Instant> = OnceLock::new();

impl Clock {
    /// Creates a clock that reads the monotonic OS clock.
    ///
    /// All system clocks share one process-wide epoch, so timestamps produced by distinct
    /// system clocks are mutually comparable.
    #[must_use]
    pub fn system() -> Self {
        Self(Arc::new(ClockState::System))
    }

    /// Creates a clock whose time never moves.
    ///
    /// This is a convenience method equivalent to `ClockControl::new().to_clock()`. Useful
    /// when a component demands a clock but the test never lets time pass.
    #[cfg(any(feature = "test-util", test))]
    #[must_use]
    pub fn new_frozen() -> Self {
        crate::ClockControl::new().to_clock()
    }

    /// Retrieves the current time on this clock's timeline.
    ///
    /// Reads cannot fail. For a system clock the result is monotonic; for a controlled
    /// clock it changes only through the owning [`ClockControl`][crate::ClockControl].
    #[must_use]
    pub fn now(&self) -> Timestamp {
        match self.0.as_ref() {
            ClockState::System => {
                let epoch = *SYSTEM_EPOCH.get_or_init(Instant::now);
                Timestamp::from_offset(Instant::now().saturating_duration_since(epoch))
            }
            #[cfg(any(feature = "test-util", test))]
            ClockState::Control(control) => control.now(),
        }
    }

    #[cfg(any(feature = "test-util", test))]
    pub(crate) fn with_control(control: &crate::ClockControl) -> Self {
        Self(Arc::new(ClockState::Control(control.clone())))
    }
}

impl AsRef<Self> for Clock {
    fn as_ref(&self) -> &Self {
        self
    }
}
