//! Exhaustive step-by-step testing of a reducer and its effects.
//!
//! A [`TestStore`] runs the reducer for real and subscribes to every effect
//! it returns, but instead of feeding effect output back in automatically it
//! queues it. Each queued action must then be acknowledged with
//! [`receive`](TestStore::receive), together with the state change it is
//! expected to cause. Time-based effects are driven with a
//! [`TestScheduler`](composable_arch_core::scheduler::TestScheduler) from a
//! [`perform`](TestStore::perform) step.
//!
//! # Example
//!
//! ```
//! use composable_arch_core::{Effect, reducer_fn};
//! use composable_arch_core::scheduler::TestScheduler;
//! use composable_arch_testing::TestStore;
//! use std::time::Duration;
//!
//! #[derive(Debug, Clone, PartialEq)]
//! enum Action {
//!     Start,
//!     Tick,
//! }
//!
//! let scheduler = TestScheduler::new();
//! let timer = scheduler.any();
//!
//! let mut store = TestStore::new(
//!     0_u32,
//!     reducer_fn(move |ticks: &mut u32, action: Action, _env: &()| match action {
//!         Action::Start => Effect::send(Action::Tick).delay(Duration::from_secs(1), timer.clone()),
//!         Action::Tick => {
//!             *ticks += 1;
//!             Effect::none()
//!         },
//!     }),
//!     (),
//! );
//!
//! store.send(Action::Start, |_| {});
//! store.perform(|| scheduler.advance(Duration::from_secs(1)));
//! store.receive(Action::Tick, |ticks| *ticks = 1);
//! ```

use composable_arch_core::diff;
use composable_arch_core::effect::{Effect, EffectContext};
use composable_arch_core::reducer::Reducer;
use composable_arch_core::subscription::{Subscriber, Subscription};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::fmt::{Debug, Write};
use std::sync::Arc;

type Update<S> = Box<dyn FnOnce(&mut S)>;

/// One step of a [`TestStore::assert`] script
pub enum Step<S, A> {
    /// Send an action and describe the expected state change
    Send(A, Update<S>),
    /// Receive the next effect-produced action and describe the expected change
    Receive(A, Update<S>),
    /// Run arbitrary code, typically advancing a scheduler
    Perform(Box<dyn FnOnce()>),
}

impl<S, A> Step<S, A> {
    /// Send `action`; `update` turns the previous state into the expected one
    pub fn send(action: A, update: impl FnOnce(&mut S) + 'static) -> Self {
        Self::Send(action, Box::new(update))
    }

    /// Receive `action`; `update` turns the previous state into the expected one
    pub fn receive(action: A, update: impl FnOnce(&mut S) + 'static) -> Self {
        Self::Receive(action, Box::new(update))
    }

    /// Run `work` between assertions
    pub fn perform(work: impl FnOnce() + 'static) -> Self {
        Self::Perform(Box::new(work))
    }
}

impl<S, A: Debug> Debug for Step<S, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Send(action, _) => f.debug_tuple("Send").field(action).finish(),
            Self::Receive(action, _) => f.debug_tuple("Receive").field(action).finish(),
            Self::Perform(_) => f.write_str("Perform"),
        }
    }
}

/// Store for testing reducers exhaustively.
///
/// Every action produced by an effect must be received, and every effect
/// must have finished by the time the store is finished or dropped.
/// Cancellation ids are resolved in a registry private to this store, so
/// tests running in parallel never cancel each other's effects.
pub struct TestStore<R: Reducer> {
    reducer: R,
    state: R::State,
    environment: R::Environment,
    context: EffectContext,
    received: Arc<Mutex<VecDeque<R::Action>>>,
    in_flight: Arc<Mutex<HashMap<u64, Option<Subscription>>>>,
    next_effect_id: u64,
    finished: bool,
}

impl<R> TestStore<R>
where
    R: Reducer,
    R::State: Clone + PartialEq + Debug,
    R::Action: PartialEq + Debug + Send + 'static,
{
    /// Create a test store
    pub fn new(initial_state: R::State, reducer: R, environment: R::Environment) -> Self {
        Self {
            reducer,
            state: initial_state,
            environment,
            context: EffectContext::isolated(),
            received: Arc::new(Mutex::new(VecDeque::new())),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            next_effect_id: 0,
            finished: false,
        }
    }

    /// Current state
    pub const fn state(&self) -> &R::State {
        &self.state
    }

    /// Environment handed to the reducer
    pub const fn environment(&self) -> &R::Environment {
        &self.environment
    }

    /// Number of effects that have not finished
    #[must_use]
    pub fn in_flight_effects(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// Number of effect-produced actions waiting to be received
    #[must_use]
    pub fn pending_actions(&self) -> usize {
        self.received.lock().len()
    }

    /// Send an action and assert the resulting state.
    ///
    /// # Panics
    ///
    /// Panics if effect-produced actions are still waiting to be received,
    /// or if the state after reducing differs from `update` applied to the
    /// state before.
    #[allow(clippy::panic)] // Test assertion
    pub fn send(&mut self, action: R::Action, update: impl FnOnce(&mut R::State)) {
        {
            let received = self.received.lock();
            if !received.is_empty() {
                panic!(
                    "Must handle {} received action(s) before sending {action:?}:\n{}",
                    received.len(),
                    list_actions(received.iter())
                );
            }
        }

        self.reduce_and_assert(action, update);
    }

    /// Receive the next effect-produced action and assert the resulting state.
    ///
    /// # Panics
    ///
    /// Panics if no action is waiting, if the next action differs from
    /// `expected`, or if the resulting state does not match.
    #[allow(clippy::panic)] // Test assertion
    pub fn receive(&mut self, expected: R::Action, update: impl FnOnce(&mut R::State)) {
        let Some(action) = self.received.lock().pop_front() else {
            panic!("Expected to receive {expected:?}, but no action was received");
        };

        if action != expected {
            panic!(
                "Received unexpected action: \u{2026}\n{}\n\n(Expected: \u{2212}, Received: +)",
                diff::render(&format!("{expected:#?}"), &format!("{action:#?}"))
            );
        }

        self.reduce_and_assert(action, update);
    }

    /// Run arbitrary synchronous work, such as advancing a scheduler.
    pub fn perform(&mut self, work: impl FnOnce()) {
        work();
    }

    /// Run a script of steps in order.
    ///
    /// # Panics
    ///
    /// Panics on the first step that fails.
    pub fn assert(&mut self, steps: Vec<Step<R::State, R::Action>>) {
        for step in steps {
            tracing::trace!(?step, "Running test store step");
            match step {
                Step::Send(action, update) => self.send(action, update),
                Step::Receive(action, update) => self.receive(action, update),
                Step::Perform(work) => self.perform(work),
            }
        }
    }

    /// Assert nothing is left over.
    ///
    /// Runs automatically when the store is dropped, unless the thread is
    /// already panicking.
    ///
    /// # Panics
    ///
    /// Panics if received actions were never asserted, or if effects are
    /// still running.
    #[allow(clippy::panic)] // Test assertion
    pub fn finish(&mut self) {
        self.finished = true;

        {
            let received = self.received.lock();
            if !received.is_empty() {
                panic!(
                    "The store received {} unexpected action(s) after this one:\n{}",
                    received.len(),
                    list_actions(received.iter())
                );
            }
        }

        let running = self.in_flight.lock().len();
        if running > 0 {
            panic!(
                "{running} effect(s) still in flight. Advance the scheduler until they \
                 finish, or cancel them from the reducer."
            );
        }
    }

    #[allow(clippy::panic)] // Test assertion
    fn reduce_and_assert(&mut self, action: R::Action, update: impl FnOnce(&mut R::State)) {
        let mut expected = self.state.clone();
        update(&mut expected);

        let effect = self
            .reducer
            .reduce(&mut self.state, action, &self.environment);
        self.subscribe(effect);

        if expected != self.state {
            panic!(
                "State change does not match expectation: \u{2026}\n{}\n\n(Expected: \u{2212}, Actual: +)",
                diff::render(&format!("{expected:#?}"), &format!("{:#?}", self.state))
            );
        }
    }

    fn subscribe(&mut self, effect: Effect<R::Action>) {
        if effect.is_none() {
            return;
        }

        let id = self.next_effect_id;
        self.next_effect_id += 1;
        self.in_flight.lock().insert(id, None);

        let received = Arc::clone(&self.received);
        let in_flight = Arc::clone(&self.in_flight);
        let subscription = effect.subscribe(
            &self.context,
            Subscriber::new(
                move |action| received.lock().push_back(action),
                move || {
                    in_flight.lock().remove(&id);
                },
            ),
        );

        if let Some(slot) = self.in_flight.lock().get_mut(&id) {
            *slot = Some(subscription);
        }
    }
}

impl<R: Reducer> Drop for TestStore<R> {
    #[allow(clippy::panic)] // Test assertion
    fn drop(&mut self) {
        if self.finished || std::thread::panicking() {
            return;
        }

        let received = self.received.lock().len();
        let running = self.in_flight.lock().len();
        if received > 0 || running > 0 {
            panic!(
                "TestStore dropped with {received} unreceived action(s) and {running} \
                 effect(s) still in flight"
            );
        }
    }
}

fn list_actions<'a, A: Debug + 'a>(actions: impl Iterator<Item = &'a A>) -> String {
    let mut out = String::new();
    for action in actions {
        let _ = writeln!(out, "  {action:?}");
    }
    out
}
