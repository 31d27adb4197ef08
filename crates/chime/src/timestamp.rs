// Copyright (c) The Spindle Project Authors.
// Licensed under the MIT License.

use std::fmt;
use std::ops::Add;
use std::time::Duration;

/// A point on a [`Clock`][crate::Clock]'s timeline.
///
/// A timestamp is an offset from the epoch of the clock that produced it. It is opaque and
/// monotonic: later reads from the same clock (or from clocks sharing an epoch, such as all
/// system clocks) compare greater or equal.
///
/// Timestamps carry no calendar meaning. They exist to order deferred work, which is why the
/// API is limited to comparisons and `Duration` arithmetic.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use chime::Timestamp;
///
/// let due = Timestamp::ZERO + Duration::from_millis(250);
///
/// assert!(due > Timestamp::ZERO);
/// assert_eq!(due.saturating_duration_since(Timestamp::ZERO), Duration::from_millis(250));
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(Duration);

impl Timestamp {
    /// The epoch itself: the instant a controlled clock starts at.
    pub const ZERO: Self = Self(Duration::ZERO);

    /// The latest representable timestamp.
    pub const MAX: Self = Self(Duration::MAX);

    /// Creates a timestamp `micros` microseconds past the epoch.
    #[must_use]
    pub const fn from_micros(micros: u64) -> Self {
        Self(Duration::from_micros(micros))
    }

    /// Returns the offset from the epoch in whole microseconds.
    #[must_use]
    pub const fn as_micros(&self) -> u128 {
        self.0.as_micros()
    }

    /// Returns `self + duration`, or `None` on overflow.
    #[must_use]
    pub fn checked_add(self, duration: Duration) -> Option<Self> {
        self.0.checked_add(duration).map(Self)
    }

    /// Returns `self + duration`, clamping at [`Timestamp::MAX`] on overflow.
    #[must_use]
    pub fn saturating_add(self, duration: Duration) -> Self {
        Self(self.0.saturating_add(duration))
    }

    /// Returns the amount of time elapsed from `earlier` to `self`, or `None` if `earlier`
    /// is actually later.
    #[must_use]
    pub fn checked_duration_since(self, earlier: Self) -> Option<Duration> {
        self.0.checked_sub(earlier.0)
    }

    /// Returns the amount of time elapsed from `earlier` to `self`, or [`Duration::ZERO`]
    /// if `earlier` is actually later.
    #[must_use]
    pub fn saturating_duration_since(self, earlier: Self) -> Duration {
        self.0.saturating_sub(earlier.0)
    }

    pub(crate) const fn from_offset(offset: Duration) -> Self {
        Self(offset)
    }
}

impl Add<Duration> for Timestamp {
    type Output = Self;

    /// # Panics
    ///
    /// Panics when the result would overflow the representable range. With a controlled
    /// clock this only happens if a test deliberately jumps absurdly far into the future.
    fn add(self, duration: Duration) -> Self {
        self.checked_add(duration)
            .expect("timestamp arithmetic overflowed the representable time range")
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({:?})", self.0)
    }
}
