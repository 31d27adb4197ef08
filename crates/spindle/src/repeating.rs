// Copyright (c) The Spindle Project Authors.
// Licensed under the MIT License.

use std::sync::{Arc, Weak};
use std::time::Duration;

use chime::{Clock, Timestamp};
use tracing::trace;

use crate::{SafetyFlag, Task, TaskQueue};

/// Handle to a periodically repeating task built out of delayed single-shot posts.
///
/// Each invocation of the closure returns the delay until the next one; returning
/// [`Duration::MAX`] ends the repetition from inside the closure. The schedule compensates
/// for drift: if an invocation starts late (the queue was busy), the next delay is
/// shortened by the lost time so that invocations stay anchored to the ideal grid rather
/// than sliding.
///
/// The handle borrows nothing from the queue; if the queue is destroyed first, the
/// repetition simply stops. Dropping the handle does NOT stop the task — call
/// [`stop`](Self::stop), on the owning queue, to end it.
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
///
/// use spindle::{RepeatingTaskHandle, ThreadedTaskQueue};
///
/// let queue = ThreadedTaskQueue::builder("stats").spawn()?;
///
/// let _handle = RepeatingTaskHandle::builder(&queue).start(|| {
///     println!("tick");
///     Duration::from_secs(1)
/// });
/// # Ok::<(), spindle::Error>(())
/// ```
#[derive(Debug, Default)]
pub struct RepeatingTaskHandle {
    flag: Option<Arc<SafetyFlag>>,
}

/// Builder for [`RepeatingTaskHandle`]; see [`RepeatingTaskHandle::builder`].
pub struct RepeatingTaskBuilder {
    queue: Weak<dyn TaskQueue>,
    queue_strong: Arc<dyn TaskQueue>,
    clock: Clock,
    first_delay: Duration,
}

impl std::fmt::Debug for RepeatingTaskBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepeatingTaskBuilder")
            .field("queue", &self.queue_strong.id())
            .field("clock", &self.clock)
            .field("first_delay", &self.first_delay)
            .finish()
    }
}

impl RepeatingTaskHandle {
    /// Starts building a repeating task on `queue`.
    ///
    /// By default the first invocation runs as soon as the queue gets to it and delays are
    /// measured against [`Clock::system`].
    #[must_use]
    pub fn builder<Q>(queue: &Arc<Q>) -> RepeatingTaskBuilder
    where
        Q: TaskQueue + 'static,
    {
        let queue_strong = Arc::clone(queue);
        let queue_strong: Arc<dyn TaskQueue> = queue_strong;
        RepeatingTaskBuilder {
            queue: Arc::downgrade(&queue_strong),
            queue_strong,
            clock: Clock::system(),
            first_delay: Duration::ZERO,
        }
    }

    /// Whether the task is still scheduled to repeat.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.flag.as_ref().is_some_and(|flag| flag.is_alive())
    }

    /// Stops the repetition. Must be called on the owning queue.
    ///
    /// A currently executing invocation finishes normally; no further invocation starts.
    /// Stopping an already stopped handle is a no-op, which makes it safe to call
    /// unconditionally during teardown (on the right queue).
    pub fn stop(&mut self) {
        if let Some(flag) = self.flag.take() {
            flag.set_not_alive();
            trace!("repeating task stopped");
        }
    }
}

impl RepeatingTaskBuilder {
    /// Measures delays against `clock` instead of system time.
    #[must_use]
    pub fn clock(mut self, clock: &Clock) -> Self {
        self.clock = clock.clone();
        self
    }

    /// Waits `delay` before the first invocation instead of running it right away.
    #[must_use]
    pub fn first_delay(mut self, delay: Duration) -> Self {
        self.first_delay = delay;
        self
    }

    /// Posts the first invocation and returns the running handle.
    ///
    /// `interval` runs on the queue; its return value is the delay until the next
    /// invocation, or [`Duration::MAX`] to end the repetition.
    pub fn start<F>(self, interval: F) -> RepeatingTaskHandle
    where
        F: FnMut() -> Duration + Send + 'static,
    {
        let flag = SafetyFlag::create_attached_to_queue(true, self.queue_strong.id());
        let mut state = Box::new(RepeatingState {
            queue: self.queue,
            clock: self.clock,
            flag: Arc::clone(&flag),
            interval,
            next_run_time: Timestamp::ZERO,
        });
        state.next_run_time = state.clock.now().saturating_add(self.first_delay);

        let guard = Arc::clone(&flag);
        if self.first_delay.is_zero() {
            self.queue_strong.post(Task::guarded(&guard, move || state.run()));
        } else {
            self.queue_strong
                .post_delayed(Task::guarded(&guard, move || state.run()), self.first_delay);
        }

        RepeatingTaskHandle { flag: Some(flag) }
    }
}

struct RepeatingState<F> {
    queue: Weak<dyn TaskQueue>,
    clock: Clock,
    flag: Arc<SafetyFlag>,
    interval: F,
    /// The instant this invocation was meant to start; the anchor for drift compensation.
    next_run_time: Timestamp,
}

impl<F> RepeatingState<F>
where
    F: FnMut() -> Duration + Send + 'static,
{
    fn run(mut self: Box<Self>) {
        let delay = (self.interval)();

        if delay == Duration::MAX {
            // The closure ended the repetition itself.
            self.flag.set_not_alive();
            return;
        }

        // The queue may have been destroyed while this invocation waited; then there is
        // nowhere to repost and the repetition ends here.
        let Some(queue) = self.queue.upgrade() else {
            return;
        };

        // Shorten the next delay by however late this invocation started, so invocations
        // stay anchored to the ideal grid. A delay is never negative; a chronically
        // overloaded queue degrades to back-to-back runs.
        let lost_time = self.clock.now().saturating_duration_since(self.next_run_time);
        self.next_run_time = self.next_run_time.saturating_add(delay);
        let next_delay = delay.saturating_sub(lost_time);

        let guard = Arc::clone(&self.flag);
        queue.post_delayed(Task::guarded(&guard, move || self.run()), next_delay);
    }
}
