// Copyright (c) The Spindle Project Authors.
// Licensed under the MIT License.

//! Simulated-time execution for the spindle task-queue toolkit.
//!
//! A [`SimulatedTimeController`] owns a piece of virtual time and a set of simulated
//! queues. Nothing runs on its own: time only moves when the test calls
//! [`advance`][SimulatedTimeController::advance], and every task due within the advanced
//! window runs to completion, deterministically, on the calling thread. A test over hours
//! of virtual traffic finishes in milliseconds and produces the same interleaving every
//! run.
//!
//! The simulated queues satisfy the same [`TaskQueue`][spindle::TaskQueue] contract as the
//! thread-backed production queues, so the code under test cannot tell which world it is
//! running in.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::time::Duration;
//!
//! use spindle::{Task, TaskQueue};
//! use spindle_sim::SimulatedTimeController;
//!
//! let controller = SimulatedTimeController::default();
//! let queue = controller.create_task_queue();
//!
//! let count = Arc::new(AtomicUsize::new(0));
//! {
//!     let count = Arc::clone(&count);
//!     queue.post_delayed(
//!         Task::new(move || {
//!             count.fetch_add(1, Ordering::SeqCst);
//!         }),
//!         Duration::from_secs(3600),
//!     );
//! }
//!
//! controller.advance(Duration::from_secs(3599));
//! assert_eq!(count.load(Ordering::SeqCst), 0);
//!
//! controller.advance(Duration::from_secs(1));
//! assert_eq!(count.load(Ordering::SeqCst), 1);
//! ```

mod controller;
mod queue;
mod runner;
mod thread;

pub use controller::SimulatedTimeController;
pub use queue::SimulatedTaskQueue;
pub use runner::{NextRunTime, SimulatedRunner};
pub use thread::SimulatedThread;
