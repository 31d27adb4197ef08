// Copyright (c) The Spindle Project Authors.
// Licensed under the MIT License.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::{Clock, Timestamp};

/// Controls the flow of time in tests.
///
/// `ClockControl` is available when the `test-util` feature is enabled. It backs a
/// [`Clock`] whose time starts at [`Timestamp::ZERO`] and moves only through the
/// [`advance`][Self::advance] family of methods. A simulated-time controller advances one
/// of these in lock-step with the virtual due-times of its task queues.
///
/// Time never flows backwards: [`advance_to`][Self::advance_to] panics on regression.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use chime::ClockControl;
///
/// let control = ClockControl::new();
/// let clock = control.to_clock();
///
/// let now = clock.now();
/// control.advance(Duration::from_secs(1));
///
/// assert_eq!(clock.now().checked_duration_since(now), Some(Duration::from_secs(1)));
/// ```
///
/// # Production code and `ClockControl`
///
/// Never enable the `test-util` feature in production code. Always ensure it is only
/// enabled for `dev-dependencies`:
///
/// ```toml
/// chime = { version = "*", features = ["test-util"] }
/// ```
#[derive(Debug, Clone, Default)]
pub struct ClockControl {
    /// Controlled time is read and advanced from multiple threads (posters compute
    /// due-times while the controller steps), so the cell lives behind a mutex. Ordering
    /// between the clock and dependent queue state is provided by the queues' own locks.
    state: Arc<Mutex<Timestamp>>,
}

impl ClockControl {
    /// Creates a new control with time at [`Timestamp::ZERO`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new control with time at the given timestamp.
    #[must_use]
    pub fn new_at(start: Timestamp) -> Self {
        Self {
            state: Arc::new(Mutex::new(start)),
        }
    }

    /// Creates a [`Clock`] backed by this control.
    ///
    /// Every clock created from the same control (and every clone of such a clock)
    /// observes the same manually driven time.
    #[must_use]
    pub fn to_clock(&self) -> Clock {
        Clock::with_control(self)
    }

    /// Returns the current controlled time.
    #[must_use]
    pub fn now(&self) -> Timestamp {
        *self.lock()
    }

    /// Advances the clock by the specified duration.
    pub fn advance(&self, duration: Duration) {
        let mut now = self.lock();
        *now = now.saturating_add(duration);
    }

    /// Advances the clock by the specified number of microseconds.
    pub fn advance_micros(&self, micros: u64) {
        self.advance(Duration::from_micros(micros));
    }

    /// Advances the clock to the specified timestamp.
    ///
    /// # Panics
    ///
    /// Panics if `target` is earlier than the current time. Controlled time is
    /// monotonic; a regression indicates a bug in the caller's stepping logic.
    pub fn advance_to(&self, target: Timestamp) {
        let mut now = self.lock();
        assert!(target >= *now, "controlled time must not move backwards ({target:?} < {:?})", *now);
        *now = target;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Timestamp> {
        self.state.lock().expect("acquiring the clock lock must always succeed")
    }
}

impl From<ClockControl> for Clock {
    fn from(control: ClockControl) -> Self {
        control.to_clock()
    }
}

impl From<&ClockControl> for Clock {
    fn from(control: &ClockControl) -> Self {
        control.to_clock()
    }
}
