//! Schedulers - the only source of time for effects
//!
//! Effects never read a clock or sleep on their own. Time-based operators
//! ([`Effect::delay`](crate::effect::Effect::delay),
//! [`Effect::debounce`](crate::effect::Effect::debounce)) take a scheduler
//! from the environment, which lets tests swap the real clock for a
//! [`TestScheduler`] and control time explicitly.

use crate::subscription::Subscription;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Work item handed to a scheduler
pub type Work = Box<dyn FnOnce() + Send>;

/// Shared, type-erased scheduler as stored in environments
pub type AnyScheduler = Arc<dyn Scheduler>;

/// Something that can run work after a delay.
pub trait Scheduler: Send + Sync {
    /// Time elapsed since the scheduler was created
    fn now(&self) -> Duration;

    /// Run `work` once `delay` has elapsed.
    ///
    /// Cancelling the returned subscription before the work runs guarantees
    /// it never runs.
    fn schedule_after(&self, delay: Duration, work: Work) -> Subscription;
}

/// Runs all work synchronously, ignoring the requested delay.
///
/// Useful for previews and for tests that do not care about timing.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImmediateScheduler;

impl ImmediateScheduler {
    /// Type-erased handle to an immediate scheduler
    #[must_use]
    pub fn any() -> AnyScheduler {
        Arc::new(Self)
    }
}

impl Scheduler for ImmediateScheduler {
    fn now(&self) -> Duration {
        Duration::ZERO
    }

    fn schedule_after(&self, _delay: Duration, work: Work) -> Subscription {
        work();
        Subscription::new()
    }
}

/// Deterministic, manually driven scheduler.
///
/// Time only moves when [`advance`](Self::advance) or [`run`](Self::run) is
/// called. Work due at the same instant runs in the order it was scheduled.
///
/// ```
/// use composable_arch_core::scheduler::{Scheduler, TestScheduler};
/// use std::sync::{Arc, Mutex};
/// use std::time::Duration;
///
/// let scheduler = TestScheduler::new();
/// let fired = Arc::new(Mutex::new(Vec::new()));
///
/// let log = Arc::clone(&fired);
/// scheduler.schedule_after(Duration::from_secs(1), Box::new(move || log.lock().unwrap().push("a")));
///
/// scheduler.advance(Duration::from_millis(999));
/// assert!(fired.lock().unwrap().is_empty());
///
/// scheduler.advance(Duration::from_millis(1));
/// assert_eq!(*fired.lock().unwrap(), vec!["a"]);
/// ```
#[derive(Clone, Default)]
pub struct TestScheduler {
    queue: Arc<Mutex<Queue>>,
}

#[derive(Default)]
struct Queue {
    now: Duration,
    next_sequence: u64,
    pending: BTreeMap<(Duration, u64), Work>,
}

impl TestScheduler {
    /// Create a scheduler whose clock starts at zero
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Type-erased handle sharing this scheduler's clock and queue
    #[must_use]
    pub fn any(&self) -> AnyScheduler {
        Arc::new(self.clone())
    }

    /// Current virtual time
    #[must_use]
    pub fn now(&self) -> Duration {
        self.queue.lock().now
    }

    /// Number of work items waiting to run
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.lock().pending.len()
    }

    /// Move the clock forward by `by`, running everything that becomes due.
    pub fn advance(&self, by: Duration) {
        let target = self.now() + by;
        self.advance_to(target);
    }

    /// Move the clock forward to `instant`, running everything due at or
    /// before it in `(time, scheduling order)` order.
    ///
    /// Work scheduled while advancing runs within the same call if it falls
    /// due before `instant`. Moving backwards is a no-op.
    pub fn advance_to(&self, instant: Duration) {
        loop {
            let next = {
                let mut queue = self.queue.lock();
                let due = queue
                    .pending
                    .first_key_value()
                    .is_some_and(|(&(at, _), _)| at <= instant);

                if due {
                    queue.pending.pop_first().map(|((at, _), work)| {
                        queue.now = queue.now.max(at);
                        work
                    })
                } else {
                    queue.now = queue.now.max(instant);
                    None
                }
            };

            match next {
                Some(work) => work(),
                None => break,
            }
        }
    }

    /// Run every pending work item, moving the clock to each one's due time,
    /// until nothing is left.
    pub fn run(&self) {
        loop {
            let next = {
                let mut queue = self.queue.lock();
                queue.pending.pop_first().map(|((at, _), work)| {
                    queue.now = queue.now.max(at);
                    work
                })
            };

            match next {
                Some(work) => work(),
                None => break,
            }
        }
    }
}

impl Scheduler for TestScheduler {
    fn now(&self) -> Duration {
        Self::now(self)
    }

    fn schedule_after(&self, delay: Duration, work: Work) -> Subscription {
        let key = {
            let mut queue = self.queue.lock();
            let key = (queue.now + delay, queue.next_sequence);
            queue.next_sequence += 1;
            queue.pending.insert(key, work);
            key
        };

        let queue: Weak<Mutex<Queue>> = Arc::downgrade(&self.queue);
        let subscription = Subscription::new();
        subscription.on_cancel(move || {
            if let Some(queue) = queue.upgrade() {
                let removed = queue.lock().pending.remove(&key);
                drop(removed);
            }
        });
        subscription
    }
}

impl std::fmt::Debug for TestScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let queue = self.queue.lock();
        f.debug_struct("TestScheduler")
            .field("now", &queue.now)
            .field("pending", &queue.pending.len())
            .finish()
    }
}
