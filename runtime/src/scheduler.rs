//! Production scheduler backed by tokio timers.

use crate::error::StoreError;
use composable_arch_core::scheduler::{AnyScheduler, Scheduler, Work};
use composable_arch_core::subscription::Subscription;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::time::Instant;

/// Scheduler that runs work on a tokio runtime after a real delay.
///
/// Time is read from tokio's clock, so tests using
/// `#[tokio::test(start_paused = true)]` can still control it.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: Handle,
    started: Instant,
}

impl TokioScheduler {
    /// Scheduler spawning onto `handle`
    #[must_use]
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            started: Instant::now(),
        }
    }

    /// Scheduler for the runtime of the calling thread
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NoRuntime`] when called outside a tokio runtime.
    pub fn try_current() -> Result<Self, StoreError> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|_| StoreError::NoRuntime)
    }

    /// Type-erased handle
    #[must_use]
    pub fn any(self) -> AnyScheduler {
        Arc::new(self)
    }
}

impl Scheduler for TokioScheduler {
    fn now(&self) -> Duration {
        self.started.elapsed()
    }

    fn schedule_after(&self, delay: Duration, work: Work) -> Subscription {
        let task = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            work();
        });

        let subscription = Subscription::new();
        subscription.on_cancel(move || task.abort());
        subscription
    }
}
