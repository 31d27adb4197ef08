// Copyright (c) The Spindle Project Authors.
// Licensed under the MIT License.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use chime::{Clock, ClockControl, Timestamp};
use spindle::{QueueId, SequenceChecker, debug_assert_run_on};
use tracing::{debug, trace};

use crate::queue::SimulatedTaskQueue;
use crate::runner::{NextRunTime, SimulatedRunner};
use crate::thread::SimulatedThread;

/// Owner of a piece of virtual time and of the simulated queues living in it.
///
/// Time is frozen between calls. [`advance`](Self::advance) moves the clock forward in
/// hops, stopping at every instant where some queue has work due and running that work to
/// completion before moving on; when it returns, virtual time has moved by exactly the
/// requested amount and everything due in the window has run. All of it happens on the
/// calling thread, so a test reads as straight-line code.
///
/// `advance` and [`skip_forward`](Self::skip_forward) must stay on the thread (or queue)
/// that first used the controller; queues created by it can be handed to anyone.
///
/// # Examples
///
/// See the crate-level docs.
#[derive(Debug)]
pub struct SimulatedTimeController {
    core: Arc<ControllerCore>,
    checker: SequenceChecker,
}

impl SimulatedTimeController {
    /// Creates a controller whose clock starts at `start`.
    #[must_use]
    pub fn new(start: Timestamp) -> Self {
        debug!(?start, "simulated time controller created");
        Self {
            core: Arc::new(ControllerCore {
                clock: ClockControl::new_at(start),
                state: Mutex::new(CoreState {
                    runners: Vec::new(),
                    yielding: HashSet::new(),
                }),
            }),
            checker: SequenceChecker::new(),
        }
    }

    /// A [`Clock`] that reads this controller's virtual time.
    #[must_use]
    pub fn clock(&self) -> Clock {
        self.core.clock.to_clock()
    }

    /// The current virtual time.
    #[must_use]
    pub fn now(&self) -> Timestamp {
        self.core.now()
    }

    /// Creates a simulated queue driven by this controller.
    #[must_use]
    pub fn create_task_queue(&self) -> Arc<SimulatedTaskQueue> {
        SimulatedTaskQueue::create(Arc::clone(&self.core))
    }

    /// Creates a simulated thread driven by this controller.
    ///
    /// A [`SimulatedThread`] is a queue that additionally supports
    /// [`blocking_call`][SimulatedThread::blocking_call].
    #[must_use]
    pub fn create_thread(&self) -> Arc<SimulatedThread> {
        SimulatedThread::create(Arc::clone(&self.core))
    }

    /// Moves virtual time forward by `duration`, running every task due in the window.
    ///
    /// Due tasks run at exactly their due time: the clock stops at each instant with work,
    /// runs it (and whatever immediate follow-ups it posts), and only then moves on.
    pub fn advance(&self, duration: Duration) {
        debug_assert_run_on!(&self.checker);
        let target = self.core.now().saturating_add(duration);
        trace!(?target, "advancing virtual time");

        self.core.run_ready_runners();
        loop {
            let now = self.core.now();
            if now >= target {
                break;
            }
            let next = match self.core.next_run_time() {
                NextRunTime::Ready => now,
                NextRunTime::At(at) => at.clamp(now, target),
                NextRunTime::Never => target,
            };
            self.core.advance_to(next);
            self.core.run_ready_runners();
        }
    }

    /// Moves virtual time forward by `duration` WITHOUT running anything.
    ///
    /// Tasks that fall due inside the skipped window run at the start of the next
    /// [`advance`](Self::advance), all at once, at the later time. Useful to fast-forward
    /// over a window whose work is deliberately irrelevant to the test.
    pub fn skip_forward(&self, duration: Duration) {
        debug_assert_run_on!(&self.checker);
        self.core.advance_to(self.core.now().saturating_add(duration));
    }

    /// When the next pending task anywhere is due, or `None` if nothing is pending.
    ///
    /// Never earlier than [`now`](Self::now): work that is already runnable reports the
    /// current time.
    #[must_use]
    pub fn next_run_time(&self) -> Option<Timestamp> {
        let now = self.core.now();
        match self.core.next_run_time() {
            NextRunTime::Ready => Some(now),
            NextRunTime::At(at) => Some(at.max(now)),
            NextRunTime::Never => None,
        }
    }
}

impl Default for SimulatedTimeController {
    /// A controller starting at [`Timestamp::ZERO`].
    fn default() -> Self {
        Self::new(Timestamp::ZERO)
    }
}

/// State shared between a controller and its runners.
#[derive(Debug)]
pub(crate) struct ControllerCore {
    clock: ClockControl,
    state: Mutex<CoreState>,
}

#[derive(Debug)]
struct CoreState {
    /// Registration order; kept stable so that ties between runners resolve the same way
    /// every run.
    runners: Vec<(QueueId, Weak<dyn SimulatedRunner>)>,
    /// Execution contexts currently inside a blocking call; their queues are skipped by
    /// [`ControllerCore::run_ready_runners`]. `None` is a plain thread.
    yielding: HashSet<Option<QueueId>>,
}

impl ControllerCore {
    fn lock(&self) -> MutexGuard<'_, CoreState> {
        self.state.lock().expect("acquiring the controller lock must always succeed")
    }

    pub(crate) fn now(&self) -> Timestamp {
        self.clock.now()
    }

    pub(crate) fn advance_to(&self, time: Timestamp) {
        self.clock.advance_to(time);
    }

    pub(crate) fn register(&self, id: QueueId, runner: Weak<dyn SimulatedRunner>) {
        self.lock().runners.push((id, runner));
    }

    pub(crate) fn unregister(&self, id: QueueId) {
        self.lock().runners.retain(|(runner_id, _)| *runner_id != id);
    }

    /// Runs every non-yielding runner with due work, repeating until none is left; work
    /// posted by the executed tasks is picked up in the same call.
    #[cfg_attr(test, mutants::skip)] // Mutating the loop condition spins forever.
    pub(crate) fn run_ready_runners(&self) {
        loop {
            let now = self.now();
            let ready: Vec<Arc<dyn SimulatedRunner>> = {
                let mut state = self.lock();
                state.runners.retain(|(_, runner)| runner.strong_count() > 0);
                let yielding = &state.yielding;
                state
                    .runners
                    .iter()
                    .filter(|(id, _)| !yielding.contains(&Some(*id)))
                    .filter_map(|(_, runner)| runner.upgrade())
                    .filter(|runner| runner.next_run_time() <= NextRunTime::At(now))
                    .collect()
            };
            if ready.is_empty() {
                break;
            }
            // The lock is not held while tasks run; they may post, create queues or drop
            // them.
            for runner in ready {
                runner.run_ready(now);
            }
        }
    }

    /// Minimum next-run-time over every registered runner, yielding or not.
    pub(crate) fn next_run_time(&self) -> NextRunTime {
        self.lock()
            .runners
            .iter()
            .filter_map(|(_, runner)| runner.upgrade())
            .map(|runner| runner.next_run_time())
            .min()
            .unwrap_or(NextRunTime::Never)
    }

    pub(crate) fn start_yield(&self, context: Option<QueueId>) {
        let inserted = self.lock().yielding.insert(context);
        debug_assert!(inserted, "an execution context cannot yield twice");
    }

    pub(crate) fn stop_yield(&self, context: Option<QueueId>) {
        let removed = self.lock().yielding.remove(&context);
        debug_assert!(removed, "stop_yield without a matching start_yield");
    }
}
