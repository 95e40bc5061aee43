//! Subscriptions and subscribers
//!
//! An effect is cold: nothing happens until it is subscribed. Subscribing
//! hands the effect a [`Subscriber`] (where its output goes) and returns a
//! [`Subscription`] (how to stop it).
//!
//! A [`Subscription`] is a cancellation token. Anything that needs to be torn
//! down when the effect stops (pending timers, spawned tasks, child
//! subscriptions) registers a hook with [`Subscription::on_cancel`].

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

type CancelHook = Box<dyn FnOnce() + Send>;

/// Handle to a running effect.
///
/// Cloning a subscription yields another handle to the same token.
#[derive(Clone)]
pub struct Subscription {
    inner: Arc<SubscriptionInner>,
}

struct SubscriptionInner {
    cancelled: AtomicBool,
    hooks: Mutex<Vec<CancelHook>>,
}

impl Subscription {
    /// Create a new, live subscription with no cancellation hooks
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SubscriptionInner {
                cancelled: AtomicBool::new(false),
                hooks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Register work to run when this subscription is cancelled.
    ///
    /// If the subscription is already cancelled the hook runs immediately.
    pub fn on_cancel(&self, hook: impl FnOnce() + Send + 'static) {
        let mut hooks = self.inner.hooks.lock();
        if self.inner.cancelled.load(Ordering::Acquire) {
            drop(hooks);
            hook();
            return;
        }
        hooks.push(Box::new(hook));
    }

    /// Cancel the subscription, running every registered hook once.
    ///
    /// Hooks run outside the internal lock, so a hook may freely touch other
    /// subscriptions (or this one). Cancelling twice is a no-op.
    pub fn cancel(&self) {
        let hooks = {
            let mut hooks = self.inner.hooks.lock();
            if self.inner.cancelled.swap(true, Ordering::AcqRel) {
                return;
            }
            std::mem::take(&mut *hooks)
        };

        for hook in hooks {
            hook();
        }
    }

    /// Whether [`cancel`](Self::cancel) has been called
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Drop all hooks without running them.
    ///
    /// Used once an effect has finished on its own so that finished effects
    /// do not keep their upstream alive.
    pub(crate) fn release(&self) {
        let hooks = std::mem::take(&mut *self.inner.hooks.lock());
        drop(hooks);
    }

    /// Whether two handles refer to the same token
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for Subscription {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Receiving end of an effect.
///
/// Values are forwarded to the `send` callback until the subscriber is
/// completed; completion is delivered at most once.
pub struct Subscriber<A> {
    send: Arc<dyn Fn(A) + Send + Sync>,
    complete: Arc<dyn Fn() + Send + Sync>,
    completed: Arc<AtomicBool>,
}

impl<A> Subscriber<A> {
    /// Create a subscriber from a value callback and a completion callback
    #[must_use]
    pub fn new(
        send: impl Fn(A) + Send + Sync + 'static,
        complete: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        Self {
            send: Arc::new(send),
            complete: Arc::new(complete),
            completed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Deliver a value. Ignored once the subscriber has completed.
    pub fn send(&self, value: A) {
        if !self.completed.load(Ordering::Acquire) {
            (self.send)(value);
        }
    }

    /// Signal termination. Only the first call has an effect.
    pub fn complete(&self) {
        if !self.completed.swap(true, Ordering::AcqRel) {
            (self.complete)();
        }
    }

    /// Whether [`complete`](Self::complete) has been called
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }
}

impl<A> Clone for Subscriber<A> {
    fn clone(&self) -> Self {
        Self {
            send: Arc::clone(&self.send),
            complete: Arc::clone(&self.complete),
            completed: Arc::clone(&self.completed),
        }
    }
}

impl<A> std::fmt::Debug for Subscriber<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriber")
            .field("completed", &self.is_completed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_cancel_runs_hooks_once() {
        let subscription = Subscription::new();
        let count = Arc::new(AtomicUsize::new(0));

        let hook_count = Arc::clone(&count);
        subscription.on_cancel(move || {
            hook_count.fetch_add(1, Ordering::SeqCst);
        });

        subscription.cancel();
        subscription.cancel();

        assert!(subscription.is_cancelled());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_on_cancel_after_cancel_runs_immediately() {
        let subscription = Subscription::new();
        subscription.cancel();

        let ran = Arc::new(AtomicBool::new(false));
        let hook_ran = Arc::clone(&ran);
        subscription.on_cancel(move || hook_ran.store(true, Ordering::SeqCst));

        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_released_hooks_never_run() {
        let subscription = Subscription::new();
        let ran = Arc::new(AtomicBool::new(false));
        let hook_ran = Arc::clone(&ran);
        subscription.on_cancel(move || hook_ran.store(true, Ordering::SeqCst));

        subscription.release();
        subscription.cancel();

        assert!(!ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_subscriber_completes_once_and_drops_late_values() {
        let values = Arc::new(Mutex::new(Vec::new()));
        let completions = Arc::new(AtomicUsize::new(0));

        let sink = Arc::clone(&values);
        let done = Arc::clone(&completions);
        let subscriber = Subscriber::new(
            move |v: i32| sink.lock().push(v),
            move || {
                done.fetch_add(1, Ordering::SeqCst);
            },
        );

        subscriber.send(1);
        subscriber.clone().complete();
        subscriber.complete();
        subscriber.send(2);

        assert_eq!(*values.lock(), vec![1]);
        assert_eq!(completions.load(Ordering::SeqCst), 1);
    }
}
