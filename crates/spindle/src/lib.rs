// Copyright (c) The Spindle Project Authors.
// Licensed under the MIT License.

//! Deterministic task-queue core.
//!
//! This crate provides the single-writer execution model the rest of the spindle toolkit is
//! built on. A [`TaskQueue`] is one logical execution context: work posted to it runs one
//! task at a time, on one logical worker, in a deterministic order. That guarantee is what
//! makes lock-free designs in consumers sound.
//!
//! The pieces:
//!
//! - [`Task`] — one owned, at-most-once-executed unit of work, tagged with the posting
//!   location for diagnostics.
//! - [`SafetyFlag`] / [`ScopedSafety`] — a shared liveness token that lets posted tasks
//!   detect that their owner is gone before they touch it.
//! - [`TaskQueue`] — the queue contract: immediate and delayed posting, best-effort
//!   cancellation, and a thread-local "current queue" identity.
//! - [`ThreadedTaskQueue`] — the production implementation, backed by one OS worker thread.
//! - [`RepeatingTaskHandle`] — periodic execution built strictly out of delayed single-shot
//!   tasks plus a safety flag.
//! - [`SequenceChecker`] — runtime assertions that code runs on the expected queue or
//!   thread, with detach/reattach support.
//! - [`ThreadPool`] — the cheap fire-and-forget engine for work that needs no queue
//!   identity, delays or cancellation.
//!
//! The simulated-time twin of [`ThreadedTaskQueue`] lives in the `spindle_sim` crate; both
//! satisfy the same [`TaskQueue`] contract, which is what lets the same consumer code run
//! under real and virtual time.

mod checker;
mod error;
mod pool;
mod queue;
mod repeating;
mod safety;
mod task;
mod threaded;

pub use checker::SequenceChecker;
pub use error::Error;
pub use pool::ThreadPool;
pub use queue::{CurrentQueueGuard, QueueId, TaskQueue, current_queue};
pub use repeating::RepeatingTaskHandle;
pub use safety::{SafetyFlag, ScopedSafety};
pub use task::{Task, TaskId};
pub use threaded::{ThreadedTaskQueue, ThreadedTaskQueueBuilder};

mod macros;

#[cfg(any(feature = "test-util", test))]
mod test_queue;

#[cfg(any(feature = "test-util", test))]
pub use test_queue::TestQueue;
