//! # Composable Arch Runtime
//!
//! Runtime implementation for the Composable Arch architecture.
//!
//! This crate provides the Store runtime that coordinates reducer execution
//! and effect handling.
//!
//! ## Core Components
//!
//! - **Store**: Owns state, runs the reducer for each action, subscribes to
//!   the returned effects and feeds their output back in
//! - **Dispatch Queue**: Guarantees one action is fully reduced before the
//!   next starts, even when actions arrive from effects on other threads
//! - **`ViewStore`**: Read-only observer of state changes that can send actions
//! - **`TokioScheduler`**: Production scheduler for time-based effects
//!
//! ## Example
//!
//! ```
//! use composable_arch_core::{Effect, reducer_fn};
//! use composable_arch_runtime::Store;
//!
//! #[derive(Debug, Clone, PartialEq)]
//! enum Action {
//!     Increment,
//!     Reset,
//! }
//!
//! let store = Store::new(
//!     0_i64,
//!     reducer_fn(|count: &mut i64, action: Action, _env: &()| match action {
//!         Action::Increment if *count >= 2 => Effect::send(Action::Reset),
//!         Action::Increment => {
//!             *count += 1;
//!             Effect::none()
//!         },
//!         Action::Reset => {
//!             *count = 0;
//!             Effect::none()
//!         },
//!     }),
//!     (),
//! );
//!
//! store.send(Action::Increment);
//! store.send(Action::Increment);
//! assert_eq!(store.state(|count| *count), 2);
//!
//! store.send(Action::Increment);
//! assert_eq!(store.state(|count| *count), 0);
//! ```

use composable_arch_core::cancellation::CancellationRegistry;
use composable_arch_core::effect::{Effect, EffectContext};
use composable_arch_core::reducer::Reducer;
use std::sync::Arc;
use std::time::Duration;

/// Prometheus metrics for observability
pub mod metrics;

/// Tokio-backed scheduler
pub mod scheduler;

pub use scheduler::TokioScheduler;

/// Error types for the Store runtime
pub mod error {
    use thiserror::Error;

    /// Errors that can occur during Store operations
    #[derive(Error, Debug)]
    pub enum StoreError {
        /// Timeout waiting for terminal action
        ///
        /// Returned by `send_and_wait_for` when the timeout expires before
        /// a matching action is received.
        #[error("Timeout waiting for action")]
        Timeout,

        /// Action broadcast channel closed
        ///
        /// The store was dropped while an observer was waiting.
        #[error("Action broadcast channel closed")]
        ChannelClosed,

        /// No tokio runtime is available
        ///
        /// Async effects and the tokio scheduler need a runtime to spawn on.
        #[error("No tokio runtime available")]
        NoRuntime,
    }
}

pub use error::StoreError;

/// Which cancellation registry a store's effects register with
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RegistryScope {
    /// The process-wide registry: `Effect::cancel(id)` from any store stops
    /// effects started under `id` by any other store
    #[default]
    Shared,

    /// A registry private to this store
    Isolated,
}

/// Configuration for Store instances
///
/// # Example
///
/// ```
/// use composable_arch_runtime::{RegistryScope, StoreConfig};
///
/// let config = StoreConfig::default()
///     .with_broadcast_capacity(256)
///     .with_registry(RegistryScope::Isolated);
///
/// assert_eq!(config.broadcast_capacity, 256);
/// ```
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Capacity of the channel returned by `subscribe_actions`
    pub broadcast_capacity: usize,
    /// Registry used by cancellable effects
    pub registry: RegistryScope,
    /// Runtime for `Effect::Future` / `Effect::Stream`; defaults to the
    /// runtime of the thread creating the store
    pub runtime: Option<tokio::runtime::Handle>,
}

impl StoreConfig {
    /// Set the action broadcast capacity
    #[must_use]
    pub const fn with_broadcast_capacity(mut self, capacity: usize) -> Self {
        self.broadcast_capacity = capacity;
        self
    }

    /// Set the cancellation registry scope
    #[must_use]
    pub const fn with_registry(mut self, registry: RegistryScope) -> Self {
        self.registry = registry;
        self
    }

    /// Set the runtime async effects are spawned on
    #[must_use]
    pub fn with_runtime(mut self, runtime: tokio::runtime::Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    fn effect_context(&self) -> EffectContext {
        let registry = match self.registry {
            RegistryScope::Shared => CancellationRegistry::shared(),
            RegistryScope::Isolated => Arc::new(CancellationRegistry::new()),
        };
        let context = EffectContext::new(registry);
        match &self.runtime {
            Some(runtime) => context.with_runtime(Some(runtime.clone())),
            None => context,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            broadcast_capacity: 16,
            registry: RegistryScope::Shared,
            runtime: None,
        }
    }
}

/// Store module - The runtime for reducers
pub mod store {
    use super::{Arc, Duration, Effect, EffectContext, Reducer, StoreConfig, StoreError};
    use crate::metrics::StoreMetrics;
    use composable_arch_core::subscription::{Subscriber, Subscription};
    use parking_lot::Mutex;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Weak;
    use std::sync::atomic::{AtomicU64, Ordering};
    use tokio::sync::{broadcast, watch};

    /// The Store - runtime coordinator for a reducer
    ///
    /// The Store manages:
    /// 1. State (behind a mutex, touched only by the reducer)
    /// 2. Reducer (business logic)
    /// 3. Environment (injected dependencies)
    /// 4. Effect execution (with feedback loop)
    ///
    /// Cloning a store yields another handle to the same state. When the
    /// last handle is dropped every in-flight effect is cancelled.
    ///
    /// # Type Parameters
    ///
    /// - `S`: State type
    /// - `A`: Action type
    /// - `E`: Environment type
    /// - `R`: Reducer implementation
    pub struct Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        inner: Arc<StoreInner<S, A, E, R>>,
    }

    struct StoreInner<S, A, E, R> {
        state: Mutex<S>,
        reducer: R,
        environment: E,
        dispatch: Mutex<Dispatch<A>>,
        effects: Mutex<HashMap<u64, Option<Subscription>>>,
        next_effect_id: AtomicU64,
        context: EffectContext,
        /// Every action produced by an effect, for observers
        action_broadcast: broadcast::Sender<A>,
        state_publisher: Mutex<Option<StatePublisher<S>>>,
    }

    struct Dispatch<A> {
        queue: VecDeque<A>,
        sending: bool,
    }

    /// Clears the `sending` flag if the reducer panics mid-drain, so the
    /// next `send` picks up the queue instead of parking behind a dead drainer.
    struct DrainGuard<'a, A> {
        dispatch: &'a Mutex<Dispatch<A>>,
    }

    impl<A> Drop for DrainGuard<'_, A> {
        fn drop(&mut self) {
            if std::thread::panicking() {
                tracing::error!("Reducer panicked, store dispatch reset");
                self.dispatch.lock().sending = false;
            }
        }
    }

    struct StatePublisher<S> {
        sender: watch::Sender<S>,
        publish: fn(&watch::Sender<S>, &S),
    }

    impl<S, A, E, R> Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Send + Sync + 'static,
        A: Send + Clone + 'static,
        S: Send + Sync + 'static,
        E: Send + Sync + 'static,
    {
        /// Create a new store with initial state, reducer, and environment
        ///
        /// Uses the default [`StoreConfig`]: broadcast capacity 16, the
        /// process-wide cancellation registry and the current tokio runtime
        /// if there is one.
        #[must_use]
        pub fn new(initial_state: S, reducer: R, environment: E) -> Self {
            Self::with_config(initial_state, reducer, environment, StoreConfig::default())
        }

        /// Create a new Store with custom configuration
        #[must_use]
        pub fn with_config(
            initial_state: S,
            reducer: R,
            environment: E,
            config: StoreConfig,
        ) -> Self {
            let (action_broadcast, _) = broadcast::channel(config.broadcast_capacity.max(1));

            Self {
                inner: Arc::new(StoreInner {
                    state: Mutex::new(initial_state),
                    reducer,
                    environment,
                    dispatch: Mutex::new(Dispatch {
                        queue: VecDeque::new(),
                        sending: false,
                    }),
                    effects: Mutex::new(HashMap::new()),
                    next_effect_id: AtomicU64::new(0),
                    context: config.effect_context(),
                    action_broadcast,
                    state_publisher: Mutex::new(None),
                }),
            }
        }

        /// Send an action to the store
        ///
        /// The reducer runs synchronously on the calling thread. If the store
        /// is already processing an action (for example, this call comes from
        /// an effect's synchronous output) the action is queued and handled
        /// by the caller that is already draining the queue, after the current
        /// action completes.
        #[tracing::instrument(skip(self, action), name = "store_send")]
        pub fn send(&self, action: A) {
            StoreInner::send(&self.inner, action);
        }

        /// Send an action and wait for a matching result action
        ///
        /// Subscribes to the action broadcast before sending, then returns
        /// the first effect-produced action matching `predicate`.
        ///
        /// # Errors
        ///
        /// - [`StoreError::Timeout`]: Timeout expired before matching action received
        /// - [`StoreError::ChannelClosed`]: Action broadcast channel closed
        ///
        /// # Notes
        ///
        /// - Only actions produced by effects are broadcast (not the initial action)
        /// - If the channel lags and drops actions, continues waiting (timeout catches it)
        pub async fn send_and_wait_for<F>(
            &self,
            action: A,
            predicate: F,
            timeout: Duration,
        ) -> Result<A, StoreError>
        where
            F: Fn(&A) -> bool,
        {
            // Subscribe BEFORE sending to avoid race condition
            let mut rx = self.inner.action_broadcast.subscribe();

            self.send(action);

            tokio::time::timeout(timeout, async {
                loop {
                    match rx.recv().await {
                        Ok(action) if predicate(&action) => return Ok(action),
                        Ok(_) => {},
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "Action observer lagged, {} actions skipped", skipped);
                        },
                        Err(broadcast::error::RecvError::Closed) => {
                            return Err(StoreError::ChannelClosed);
                        },
                    }
                }
            })
            .await
            .map_err(|_| StoreError::Timeout)?
        }

        /// Subscribe to all actions produced by this store's effects
        ///
        /// Actions sent through [`send`](Self::send) are not broadcast.
        #[must_use]
        pub fn subscribe_actions(&self) -> broadcast::Receiver<A> {
            self.inner.action_broadcast.subscribe()
        }

        /// Read current state via a closure
        ///
        /// ```ignore
        /// let todo_count = store.state(|s| s.todos.len());
        /// ```
        pub fn state<F, T>(&self, f: F) -> T
        where
            F: FnOnce(&S) -> T,
        {
            f(&self.inner.state.lock())
        }

        /// Number of effects that have been started and have not finished
        #[must_use]
        pub fn in_flight_effects(&self) -> usize {
            self.inner.effects.lock().len()
        }

        /// Cancel every in-flight effect of this store
        pub fn cancel_effects(&self) {
            self.inner.cancel_effects();
        }

        /// Observe state changes from outside the store
        #[must_use]
        pub fn view_store(&self) -> ViewStore<S, A>
        where
            S: Clone,
        {
            let receiver = {
                let state = self.inner.state.lock();
                let mut publisher = self.inner.state_publisher.lock();
                match &*publisher {
                    Some(existing) => existing.sender.subscribe(),
                    None => {
                        let (sender, receiver) = watch::channel(state.clone());
                        *publisher = Some(StatePublisher {
                            sender,
                            publish: |sender, state| {
                                sender.send_replace(state.clone());
                            },
                        });
                        receiver
                    },
                }
            };

            let store = Arc::downgrade(&self.inner);
            ViewStore {
                state: receiver,
                send: Arc::new(move |action| match store.upgrade() {
                    Some(inner) => StoreInner::send(&inner, action),
                    None => tracing::warn!("Action sent through a view of a dropped store"),
                }),
            }
        }
    }

    impl<S, A, E, R> StoreInner<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Send + Sync + 'static,
        A: Send + Clone + 'static,
        S: Send + Sync + 'static,
        E: Send + Sync + 'static,
    {
        fn send(this: &Arc<Self>, action: A) {
            {
                let mut dispatch = this.dispatch.lock();
                dispatch.queue.push_back(action);
                if dispatch.sending {
                    tracing::trace!(queued = dispatch.queue.len(), "Store busy, action queued");
                    return;
                }
                dispatch.sending = true;
            }

            let _drain = DrainGuard {
                dispatch: &this.dispatch,
            };
            loop {
                let next = {
                    let mut dispatch = this.dispatch.lock();
                    let next = dispatch.queue.pop_front();
                    if next.is_none() {
                        dispatch.sending = false;
                    }
                    next
                };
                match next {
                    Some(action) => Self::process(this, action),
                    None => break,
                }
            }
        }

        fn process(this: &Arc<Self>, action: A) {
            tracing::debug!("Processing action");
            StoreMetrics::record_action();

            let effect = {
                let mut state = this.state.lock();
                let span = tracing::debug_span!("reducer_execution");
                let effect = span.in_scope(|| this.reducer.reduce(&mut state, action, &this.environment));

                if let Some(publisher) = &*this.state_publisher.lock() {
                    if publisher.sender.receiver_count() > 0 {
                        (publisher.publish)(&publisher.sender, &state);
                    }
                }
                effect
            };

            if effect.is_none() {
                return;
            }
            Self::run_effect(this, effect);
        }

        fn run_effect(this: &Arc<Self>, effect: Effect<A>) {
            let id = this.next_effect_id.fetch_add(1, Ordering::Relaxed);
            {
                let mut effects = this.effects.lock();
                effects.insert(id, None);
                StoreMetrics::record_in_flight(effects.len());
            }
            StoreMetrics::record_effect_started();
            tracing::trace!(effect_id = id, "Subscribing to effect");

            let output: Weak<Self> = Arc::downgrade(this);
            let finished: Weak<Self> = Arc::downgrade(this);

            let subscription = effect.subscribe(
                &this.context,
                Subscriber::new(
                    move |action: A| {
                        if let Some(store) = output.upgrade() {
                            // No receivers is fine
                            let _ = store.action_broadcast.send(action.clone());
                            Self::send(&store, action);
                        }
                    },
                    move || {
                        if let Some(store) = finished.upgrade() {
                            let mut effects = store.effects.lock();
                            effects.remove(&id);
                            StoreMetrics::record_in_flight(effects.len());
                            tracing::trace!(effect_id = id, "Effect finished");
                        }
                    },
                ),
            );

            if let Some(slot) = this.effects.lock().get_mut(&id) {
                *slot = Some(subscription);
            }
        }
    }

    impl<S, A, E, R> StoreInner<S, A, E, R> {
        fn cancel_effects(&self) {
            let running: Vec<Subscription> = self.effects.lock().drain().filter_map(|(_, s)| s).collect();
            if !running.is_empty() {
                tracing::debug!(count = running.len(), "Cancelling in-flight effects");
            }
            for subscription in running {
                subscription.cancel();
            }
        }
    }

    impl<S, A, E, R> Drop for StoreInner<S, A, E, R> {
        fn drop(&mut self) {
            self.cancel_effects();
        }
    }

    impl<S, A, E, R> Clone for Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        fn clone(&self) -> Self {
            Self {
                inner: Arc::clone(&self.inner),
            }
        }
    }

    impl<S, A, E, R> std::fmt::Debug for Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
        S: std::fmt::Debug,
    {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("Store")
                .field("state", &*self.inner.state.lock())
                .field("in_flight_effects", &self.inner.effects.lock().len())
                .finish_non_exhaustive()
        }
    }

    /// Observer of a store's state
    ///
    /// Created by [`Store::view_store`]. Holds the latest state published
    /// after each reduce and forwards actions to the store. A view does not
    /// keep its store alive; once the store is gone, sends are dropped and
    /// [`changed`](Self::changed) fails.
    pub struct ViewStore<S, A> {
        state: watch::Receiver<S>,
        send: Arc<dyn Fn(A) + Send + Sync>,
    }

    impl<S: Clone, A> ViewStore<S, A> {
        /// Latest published state
        #[must_use]
        pub fn state(&self) -> S {
            self.state.borrow().clone()
        }

        /// Wait until the state changes
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ChannelClosed`] once the store is gone.
        pub async fn changed(&mut self) -> Result<(), StoreError> {
            self.state
                .changed()
                .await
                .map_err(|_| StoreError::ChannelClosed)
        }

        /// Send an action to the underlying store
        pub fn send(&self, action: A) {
            (self.send)(action);
        }
    }

    impl<S, A> Clone for ViewStore<S, A> {
        fn clone(&self) -> Self {
            Self {
                state: self.state.clone(),
                send: Arc::clone(&self.send),
            }
        }
    }
}

// Re-export for convenience
pub use store::{Store, ViewStore};
