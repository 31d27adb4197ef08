// Copyright (c) The Spindle Project Authors.
// Licensed under the MIT License.

//! Time primitives for the spindle task-queue toolkit.
//!
//! Working with time is notoriously difficult to test and control. This crate provides the
//! [`Clock`] abstraction that task queues and timers read time from, so that the passage of
//! time can be substituted in tests. Production code uses [`Clock::system`], which reads the
//! monotonic OS clock. Tests enable the `test-util` feature and drive a [`ClockControl`]
//! manually, jumping forward in time without real sleeps.
//!
//! Time is expressed as a [`Timestamp`], an opaque offset from the owning clock's epoch.
//! Timestamps read from clocks created by [`Clock::system`] are mutually comparable because
//! all system clocks share one process-wide epoch.

mod clock;
mod timestamp;

pub use clock::Clock;
pub use timestamp::Timestamp;

#[cfg(any(feature = "test-util", test))]
mod clock_control;

#[cfg(any(feature = "test-util", test))]
pub use clock_control::ClockControl;
