//! Effects - cold, cancellable descriptions of work
//!
//! A reducer never performs I/O, reads a clock or sleeps. It returns an
//! [`Effect`] describing that work, and the store subscribes to it. Every
//! value the effect emits is fed back into the store as an action.
//!
//! Effects are **cold**: building one does nothing. Work starts when
//! [`Effect::subscribe`] is called, and a new subscription starts the work
//! again from scratch.
//!
//! Effects have no error channel. An effect that can fail should emit an
//! action describing the failure (for example `Action::Failed(String)`).
//!
//! # Example
//!
//! ```
//! use composable_arch_core::effect::Effect;
//! use composable_arch_core::scheduler::TestScheduler;
//! use std::time::Duration;
//!
//! #[derive(Debug, Clone, PartialEq)]
//! enum Action {
//!     QueryChanged(String),
//!     Search(String),
//! }
//!
//! #[derive(Debug, Hash, PartialEq, Eq)]
//! struct SearchId;
//!
//! let scheduler = TestScheduler::new();
//! let effect = Effect::send(Action::Search("rust".into()))
//!     .debounce(SearchId, Duration::from_millis(300), scheduler.any());
//! # let _ = effect;
//! ```

use crate::cancellation::{CancelId, CancelKey, CancellationRegistry};
use crate::scheduler::AnyScheduler;
use crate::subscription::{Subscriber, Subscription};
use futures::{Stream, StreamExt};
use parking_lot::{Mutex, ReentrantMutex};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Custom publisher: receives the subscriber and the execution context and
/// returns the subscription controlling the work it started.
pub type Publisher<A> = Box<dyn FnOnce(Subscriber<A>, &EffectContext) -> Subscription + Send>;

/// Everything an effect needs from the outside world while it runs
#[derive(Clone, Debug)]
pub struct EffectContext {
    registry: Arc<CancellationRegistry>,
    runtime: Option<tokio::runtime::Handle>,
}

impl EffectContext {
    /// Context using `registry` and the tokio runtime of the calling thread,
    /// if there is one
    #[must_use]
    pub fn new(registry: Arc<CancellationRegistry>) -> Self {
        Self {
            registry,
            runtime: tokio::runtime::Handle::try_current().ok(),
        }
    }

    /// Context with a fresh registry that no other store shares
    #[must_use]
    pub fn isolated() -> Self {
        Self::new(Arc::new(CancellationRegistry::new()))
    }

    /// Replace the runtime used for `Future` and `Stream` effects
    #[must_use]
    pub fn with_runtime(mut self, runtime: Option<tokio::runtime::Handle>) -> Self {
        self.runtime = runtime;
        self
    }

    /// The cancellation registry effects register with
    #[must_use]
    pub const fn registry(&self) -> &Arc<CancellationRegistry> {
        &self.registry
    }

    /// The runtime async effects are spawned on
    #[must_use]
    pub const fn runtime(&self) -> Option<&tokio::runtime::Handle> {
        self.runtime.as_ref()
    }
}

impl Default for EffectContext {
    fn default() -> Self {
        Self::new(CancellationRegistry::shared())
    }
}

/// Effect type - describes work to perform and the actions it produces
///
/// Prefer the constructor functions and operators over building variants by
/// hand; they keep trivial cases (`merge` of nothing, etc.) collapsed to
/// [`Effect::None`].
pub enum Effect<A> {
    /// Completes immediately without output
    None,

    /// Emits one value synchronously, then completes
    Send(A),

    /// Runs all effects concurrently; outputs interleave as they happen
    Merge(Vec<Effect<A>>),

    /// Runs effects one after another
    Concatenate(Vec<Effect<A>>),

    /// Runs a side effect on subscription and completes without output
    FireAndForget(Box<dyn FnOnce() + Send>),

    /// Builds the effect at subscription time
    Deferred(Box<dyn FnOnce() -> Effect<A> + Send>),

    /// Async computation on the tokio runtime; `Some` is fed back as an action
    Future(Pin<Box<dyn Future<Output = Option<A>> + Send>>),

    /// Async stream of actions on the tokio runtime
    Stream(Pin<Box<dyn Stream<Item = A> + Send>>),

    /// Subscribes to `effect` only after `duration` has elapsed on `scheduler`
    Delay {
        /// How long to wait
        duration: Duration,
        /// Time source
        scheduler: AnyScheduler,
        /// Effect to start after the delay
        effect: Box<Effect<A>>,
    },

    /// Registers `effect` under `id` so it can be cancelled
    Cancellable {
        /// Cancellation identity
        id: CancelId,
        /// Cancel anything already running under `id` first
        cancel_in_flight: bool,
        /// Effect to run
        effect: Box<Effect<A>>,
    },

    /// Cancels everything running under the id, then completes
    Cancel(CancelId),

    /// Custom publisher
    Run(Publisher<A>),
}

impl<A> std::fmt::Debug for Effect<A>
where
    A: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "Effect::None"),
            Self::Send(value) => f.debug_tuple("Effect::Send").field(value).finish(),
            Self::Merge(effects) => f.debug_tuple("Effect::Merge").field(effects).finish(),
            Self::Concatenate(effects) => {
                f.debug_tuple("Effect::Concatenate").field(effects).finish()
            },
            Self::FireAndForget(_) => write!(f, "Effect::FireAndForget(<work>)"),
            Self::Deferred(_) => write!(f, "Effect::Deferred(<factory>)"),
            Self::Future(_) => write!(f, "Effect::Future(<future>)"),
            Self::Stream(_) => write!(f, "Effect::Stream(<stream>)"),
            Self::Delay {
                duration, effect, ..
            } => f
                .debug_struct("Effect::Delay")
                .field("duration", duration)
                .field("effect", effect)
                .finish_non_exhaustive(),
            Self::Cancellable {
                id,
                cancel_in_flight,
                effect,
            } => f
                .debug_struct("Effect::Cancellable")
                .field("id", id)
                .field("cancel_in_flight", cancel_in_flight)
                .field("effect", effect)
                .finish(),
            Self::Cancel(id) => f.debug_tuple("Effect::Cancel").field(id).finish(),
            Self::Run(_) => write!(f, "Effect::Run(<publisher>)"),
        }
    }
}

impl<A> Effect<A> {
    /// An effect that does nothing and completes immediately
    #[must_use]
    pub const fn none() -> Self {
        Self::None
    }

    /// An effect that synchronously emits `value` and completes
    #[must_use]
    pub const fn send(value: A) -> Self {
        Self::Send(value)
    }

    /// Whether this is [`Effect::None`]
    #[must_use]
    pub const fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Run all `effects` concurrently.
    ///
    /// Outputs are delivered in the order they are emitted, not in argument
    /// order: a fast effect's output arrives before a slow one completes.
    #[must_use]
    pub fn merge(effects: impl IntoIterator<Item = Self>) -> Self {
        let mut effects: Vec<Self> = effects.into_iter().filter(|e| !e.is_none()).collect();
        match effects.len() {
            0 => Self::None,
            1 => effects.pop().unwrap_or(Self::None),
            _ => Self::Merge(effects),
        }
    }

    /// Run `effects` in sequence, each starting when the previous completes
    #[must_use]
    pub fn concatenate(effects: impl IntoIterator<Item = Self>) -> Self {
        let mut effects: Vec<Self> = effects.into_iter().filter(|e| !e.is_none()).collect();
        match effects.len() {
            0 => Self::None,
            1 => effects.pop().unwrap_or(Self::None),
            _ => Self::Concatenate(effects),
        }
    }

    /// Merge with one more effect
    #[must_use]
    pub fn merge_with(self, other: Self) -> Self {
        Self::merge([self, other])
    }

    /// Run `work` when subscribed and complete without emitting.
    ///
    /// Panics inside `work` are not caught.
    #[must_use]
    pub fn fire_and_forget(work: impl FnOnce() + Send + 'static) -> Self {
        Self::FireAndForget(Box::new(work))
    }

    /// Call `factory` at subscription time and run the effect it returns
    #[must_use]
    pub fn deferred(factory: impl FnOnce() -> Self + Send + 'static) -> Self {
        Self::Deferred(Box::new(factory))
    }

    /// Run an async computation; `Some(action)` is emitted, `None` is not
    #[must_use]
    pub fn future(future: impl Future<Output = Option<A>> + Send + 'static) -> Self {
        Self::Future(Box::pin(future))
    }

    /// Emit every item of an async stream
    #[must_use]
    pub fn stream(stream: impl Stream<Item = A> + Send + 'static) -> Self {
        Self::Stream(Box::pin(stream))
    }

    /// Build an effect from a custom publisher
    #[must_use]
    pub fn run(
        publisher: impl FnOnce(Subscriber<A>, &EffectContext) -> Subscription + Send + 'static,
    ) -> Self {
        Self::Run(Box::new(publisher))
    }

    /// Cancel every effect currently running under `id`
    #[must_use]
    pub fn cancel(id: impl CancelKey) -> Self {
        Self::Cancel(CancelId::new(id))
    }

    /// Cancel every effect running under any of `ids`
    #[must_use]
    pub fn cancel_all(ids: impl IntoIterator<Item = CancelId>) -> Self {
        Self::merge(ids.into_iter().map(Self::Cancel))
    }

    /// Start this effect only after `duration` has elapsed on `scheduler`.
    ///
    /// Effects are cold, so deferring the subscription shifts every emission
    /// by exactly `duration` and leaves their order and count unchanged.
    #[must_use]
    pub fn delay(self, duration: Duration, scheduler: AnyScheduler) -> Self {
        Self::Delay {
            duration,
            scheduler,
            effect: Box::new(self),
        }
    }

    /// Make this effect cancellable under `id`.
    ///
    /// With `cancel_in_flight`, anything already running under `id` is
    /// cancelled before this effect starts.
    #[must_use]
    pub fn cancellable(self, id: impl CancelKey, cancel_in_flight: bool) -> Self {
        Self::Cancellable {
            id: CancelId::new(id),
            cancel_in_flight,
            effect: Box::new(self),
        }
    }

    /// Delay this effect by `interval` and cancel any previous effect that
    /// was debounced under the same `id` and has not started yet.
    ///
    /// Only the last effect of a burst runs, `interval` after it was
    /// returned; earlier ones never start.
    #[must_use]
    pub fn debounce(self, id: impl CancelKey, interval: Duration, scheduler: AnyScheduler) -> Self {
        self.delay(interval, scheduler).cancellable(id, true)
    }
}

impl<A: Send + 'static> Effect<A> {
    /// Transform every emitted value
    #[must_use]
    pub fn map<B, F>(self, f: F) -> Effect<B>
    where
        B: Send + 'static,
        F: Fn(A) -> B + Send + Sync + 'static,
    {
        self.map_shared(Arc::new(f))
    }

    fn map_shared<B: Send + 'static>(self, f: Arc<dyn Fn(A) -> B + Send + Sync>) -> Effect<B> {
        match self {
            Self::None => Effect::None,
            Self::Send(value) => Effect::Send(f(value)),
            Self::Merge(effects) => Effect::Merge(
                effects
                    .into_iter()
                    .map(|e| e.map_shared(Arc::clone(&f)))
                    .collect(),
            ),
            Self::Concatenate(effects) => Effect::Concatenate(
                effects
                    .into_iter()
                    .map(|e| e.map_shared(Arc::clone(&f)))
                    .collect(),
            ),
            Self::FireAndForget(work) => Effect::FireAndForget(work),
            Self::Deferred(factory) => Effect::Deferred(Box::new(move || factory().map_shared(f))),
            Self::Future(future) => {
                Effect::Future(Box::pin(async move { future.await.map(|value| f(value)) }))
            },
            Self::Stream(stream) => Effect::Stream(Box::pin(stream.map(move |value| f(value)))),
            Self::Delay {
                duration,
                scheduler,
                effect,
            } => Effect::Delay {
                duration,
                scheduler,
                effect: Box::new(effect.map_shared(f)),
            },
            Self::Cancellable {
                id,
                cancel_in_flight,
                effect,
            } => Effect::Cancellable {
                id,
                cancel_in_flight,
                effect: Box::new(effect.map_shared(f)),
            },
            Self::Cancel(id) => Effect::Cancel(id),
            Self::Run(publisher) => Effect::Run(Box::new(move |subscriber: Subscriber<B>, context: &EffectContext| {
                let finished = subscriber.clone();
                publisher(
                    Subscriber::new(move |value| subscriber.send(f(value)), move || finished.complete()),
                    context,
                )
            })),
        }
    }

    /// Start the effect.
    ///
    /// Values go to `subscriber`; the subscriber is completed when the effect
    /// finishes or, for cancellable effects, when it is cancelled. The
    /// returned subscription stops the effect.
    pub fn subscribe(self, context: &EffectContext, subscriber: Subscriber<A>) -> Subscription {
        match self {
            Self::None => {
                subscriber.complete();
                Subscription::new()
            },
            Self::Send(value) => {
                subscriber.send(value);
                subscriber.complete();
                Subscription::new()
            },
            Self::FireAndForget(work) => {
                work();
                subscriber.complete();
                Subscription::new()
            },
            Self::Deferred(factory) => factory().subscribe(context, subscriber),
            Self::Merge(effects) => subscribe_merged(effects, context, subscriber),
            Self::Concatenate(effects) => {
                let subscription = Subscription::new();
                subscribe_concatenated(
                    effects.into(),
                    context.clone(),
                    subscriber,
                    subscription.clone(),
                );
                subscription
            },
            Self::Future(future) => spawn_future(future, context, subscriber),
            Self::Stream(stream) => spawn_stream(stream, context, subscriber),
            Self::Delay {
                duration,
                scheduler,
                effect,
            } => subscribe_delayed(*effect, duration, &scheduler, context, subscriber),
            Self::Cancellable {
                id,
                cancel_in_flight,
                effect,
            } => subscribe_cancellable(*effect, id, cancel_in_flight, context, subscriber),
            Self::Cancel(id) => {
                context.registry().cancel(&id);
                subscriber.complete();
                Subscription::new()
            },
            Self::Run(publisher) => publisher(subscriber, context),
        }
    }
}

fn subscribe_merged<A: Send + 'static>(
    effects: Vec<Effect<A>>,
    context: &EffectContext,
    subscriber: Subscriber<A>,
) -> Subscription {
    let subscription = Subscription::new();
    if effects.is_empty() {
        subscriber.complete();
        return subscription;
    }

    let remaining = Arc::new(AtomicUsize::new(effects.len()));
    for effect in effects {
        let downstream = subscriber.clone();
        let finished = subscriber.clone();
        let remaining = Arc::clone(&remaining);

        let child = effect.subscribe(
            context,
            Subscriber::new(
                move |value| downstream.send(value),
                move || {
                    if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                        finished.complete();
                    }
                },
            ),
        );
        subscription.on_cancel(move || child.cancel());
    }
    subscription
}

fn subscribe_concatenated<A: Send + 'static>(
    mut effects: VecDeque<Effect<A>>,
    context: EffectContext,
    subscriber: Subscriber<A>,
    subscription: Subscription,
) {
    if subscription.is_cancelled() {
        return;
    }
    let Some(effect) = effects.pop_front() else {
        subscriber.complete();
        return;
    };

    let rest = Arc::new(Mutex::new(Some(effects)));
    let downstream = subscriber.clone();
    let next_context = context.clone();
    let parent = subscription.clone();

    let child = effect.subscribe(
        &context,
        Subscriber::new(
            move |value| downstream.send(value),
            move || {
                let remaining = rest.lock().take();
                if let Some(rest) = remaining {
                    subscribe_concatenated(
                        rest,
                        next_context.clone(),
                        subscriber.clone(),
                        parent.clone(),
                    );
                }
            },
        ),
    );
    subscription.on_cancel(move || child.cancel());
}

fn subscribe_delayed<A: Send + 'static>(
    effect: Effect<A>,
    duration: Duration,
    scheduler: &AnyScheduler,
    context: &EffectContext,
    subscriber: Subscriber<A>,
) -> Subscription {
    let subscription = Subscription::new();
    let gate = subscription.clone();
    let context = context.clone();

    let task = scheduler.schedule_after(
        duration,
        Box::new(move || {
            if gate.is_cancelled() {
                return;
            }
            let inner = effect.subscribe(&context, subscriber);
            gate.on_cancel(move || inner.cancel());
        }),
    );
    subscription.on_cancel(move || task.cancel());
    subscription
}

fn subscribe_cancellable<A: Send + 'static>(
    effect: Effect<A>,
    id: CancelId,
    cancel_in_flight: bool,
    context: &EffectContext,
    subscriber: Subscriber<A>,
) -> Subscription {
    let token = Subscription::new();
    let registry = Arc::clone(context.registry());
    registry.insert(id.clone(), token.clone(), cancel_in_flight);

    // Held across the cancelled check and the delivery; cancelling waits on
    // it, so no value can land after `cancel` returns. Reentrant because a
    // delivery may synchronously cancel its own id.
    let delivery = Arc::new(ReentrantMutex::new(()));
    let gate = token.clone();
    let downstream = subscriber.clone();
    let finished = subscriber.clone();
    let cleanup = (Arc::clone(&registry), id.clone(), token.clone());
    let serial = Arc::clone(&delivery);

    let inner = effect.subscribe(
        context,
        Subscriber::new(
            move |value| {
                let _delivering = serial.lock();
                if !gate.is_cancelled() {
                    downstream.send(value);
                }
            },
            move || {
                let (registry, id, token) = &cleanup;
                registry.remove(id, token);
                token.release();
                finished.complete();
            },
        ),
    );

    if subscriber.is_completed() {
        return token;
    }

    let hook_token = token.clone();
    token.on_cancel(move || {
        drop(delivery.lock());
        inner.cancel();
        registry.remove(&id, &hook_token);
        subscriber.complete();
    });
    token
}

fn spawn_future<A: Send + 'static>(
    future: Pin<Box<dyn Future<Output = Option<A>> + Send>>,
    context: &EffectContext,
    subscriber: Subscriber<A>,
) -> Subscription {
    let subscription = Subscription::new();
    let Some(runtime) = context.runtime() else {
        tracing::error!("Effect::Future subscribed outside a tokio runtime, completing without output");
        subscriber.complete();
        return subscription;
    };

    let gate = subscription.clone();
    let task = runtime.spawn(async move {
        if let Some(value) = future.await {
            if gate.is_cancelled() {
                return;
            }
            tracing::trace!("Effect::Future produced an action");
            subscriber.send(value);
        }
        subscriber.complete();
    });
    subscription.on_cancel(move || task.abort());
    subscription
}

fn spawn_stream<A: Send + 'static>(
    mut stream: Pin<Box<dyn Stream<Item = A> + Send>>,
    context: &EffectContext,
    subscriber: Subscriber<A>,
) -> Subscription {
    let subscription = Subscription::new();
    let Some(runtime) = context.runtime() else {
        tracing::error!("Effect::Stream subscribed outside a tokio runtime, completing without output");
        subscriber.complete();
        return subscription;
    };

    let gate = subscription.clone();
    let task = runtime.spawn(async move {
        while let Some(value) = stream.next().await {
            if gate.is_cancelled() {
                return;
            }
            subscriber.send(value);
        }
        subscriber.complete();
    });
    subscription.on_cancel(move || task.abort());
    subscription
}
