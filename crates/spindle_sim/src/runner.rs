// Copyright (c) The Spindle Project Authors.
// Licensed under the MIT License.

use chime::Timestamp;

/// When a runner next has work, as seen by the controller's advance loop.
///
/// The variant order is meaningful: `Ready` sorts before any `At`, which sorts before
/// `Never`, so the minimum over runners is the next thing to happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum NextRunTime {
    /// Work is ready right now; no time needs to pass.
    Ready,
    /// Nothing ready, but a delayed task is due at this instant.
    At(Timestamp),
    /// No pending work at all.
    Never,
}

/// A participant in simulated time.
///
/// The controller polls [`next_run_time`][Self::next_run_time] to decide how far virtual
/// time may jump and calls [`run_ready`][Self::run_ready] to let the runner execute
/// everything due at the new time. Implemented by [`SimulatedTaskQueue`][crate::SimulatedTaskQueue]
/// and [`SimulatedThread`][crate::SimulatedThread]; implement it yourself to hook a custom
/// component into the controller's clock.
pub trait SimulatedRunner: Send + Sync {
    /// When this runner next has something to do.
    fn next_run_time(&self) -> NextRunTime;

    /// Runs every task that is due at `now`, including tasks that become due while
    /// running (a task posting an immediate follow-up sees it run in the same call).
    fn run_ready(&self, now: Timestamp);
}
