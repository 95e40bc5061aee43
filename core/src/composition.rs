//! Reducer composition utilities
//!
//! This module provides utilities for composing reducers in various ways:
//! - **`combine_reducers`**: Run multiple reducers on the same state/action
//! - **`combined_with`**: Two-reducer combine, left operand first
//! - **`pullback`**: Focus a child reducer on a part of the parent state
//! - **`for_each`**: Run a child reducer on one element of a collection
//! - **`optional`**: Run a child reducer on optional state when it is present
//! - **`debug`** / **`signpost`**: Instrument a reducer
//!
//! Combined reducers run in order on the same mutable state and their effects
//! are **merged**, never concatenated.
//!
//! # Examples
//!
//! ## Combining Reducers
//!
//! ```
//! use composable_arch_core::{Effect, Reducer, reducer_fn};
//! use composable_arch_core::composition::ReducerExt;
//!
//! #[derive(Clone, Debug, Default)]
//! struct AppState {
//!     count: i32,
//!     name: String,
//! }
//!
//! #[derive(Clone, Debug)]
//! enum AppAction {
//!     Increment,
//!     SetName(String),
//! }
//!
//! let counter = reducer_fn(|state: &mut AppState, action: AppAction, _env: &()| {
//!     if matches!(action, AppAction::Increment) {
//!         state.count += 1;
//!     }
//!     Effect::none()
//! });
//!
//! let name = reducer_fn(|state: &mut AppState, action: AppAction, _env: &()| {
//!     if let AppAction::SetName(name) = action {
//!         state.name = name;
//!     }
//!     Effect::none()
//! });
//!
//! let app = counter.combined_with(name);
//! let mut state = AppState::default();
//! let _ = app.reduce(&mut state, AppAction::SetName("Ada".into()), &());
//! let _ = app.reduce(&mut state, AppAction::Increment, &());
//! assert_eq!((state.count, state.name.as_str()), (1, "Ada"));
//! ```

use crate::debug::{DebugEnvironment, DebugReducer};
use crate::effect::Effect;
use crate::reducer::Reducer;
use crate::signpost::{AnyTracer, SignpostReducer};
use std::fmt::Debug;

/// Type-erased reducer, as accepted by [`combine_reducers`]
pub type BoxedReducer<S, A, E> = Box<dyn Reducer<State = S, Action = A, Environment = E> + Send + Sync>;

/// Combines multiple reducers that operate on the same state and action types.
///
/// Each reducer runs in order and sees the state as left by the previous one.
/// Their effects are merged, so a fast effect from a later reducer is not held
/// back by a slow one from an earlier reducer.
///
/// # Examples
///
/// ```
/// use composable_arch_core::{Effect, Reducer, reducer_fn};
/// use composable_arch_core::composition::combine_reducers;
///
/// let double = reducer_fn(|n: &mut i32, _: (), _: &()| {
///     *n *= 2;
///     Effect::none()
/// });
/// let add_one = reducer_fn(|n: &mut i32, _: (), _: &()| {
///     *n += 1;
///     Effect::none()
/// });
///
/// let combined = combine_reducers(vec![Box::new(double), Box::new(add_one)]);
///
/// let mut n = 3;
/// let _ = combined.reduce(&mut n, (), &());
/// assert_eq!(n, 7);
/// ```
#[must_use]
pub fn combine_reducers<S, A, E>(reducers: Vec<BoxedReducer<S, A, E>>) -> CombinedReducer<S, A, E>
where
    A: Clone,
{
    CombinedReducer { reducers }
}

/// A combined reducer that runs multiple reducers in sequence.
///
/// Created by [`combine_reducers`].
pub struct CombinedReducer<S, A, E> {
    reducers: Vec<BoxedReducer<S, A, E>>,
}

impl<S, A, E> Reducer for CombinedReducer<S, A, E>
where
    A: Clone,
{
    type State = S;
    type Action = A;
    type Environment = E;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> Effect<Self::Action> {
        let mut effects = Vec::with_capacity(self.reducers.len());
        for reducer in &self.reducers {
            effects.push(reducer.reduce(state, action.clone(), env));
        }
        Effect::merge(effects)
    }
}

/// Two reducers combined. Created by [`ReducerExt::combined_with`].
pub struct Combined<L, R> {
    first: L,
    second: R,
}

impl<L, R> Reducer for Combined<L, R>
where
    L: Reducer,
    L::Action: Clone,
    R: Reducer<State = L::State, Action = L::Action, Environment = L::Environment>,
{
    type State = L::State;
    type Action = L::Action;
    type Environment = L::Environment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> Effect<Self::Action> {
        let first = self.first.reduce(state, action.clone(), env);
        let second = self.second.reduce(state, action, env);
        Effect::merge([first, second])
    }
}

/// A child reducer focused on part of a parent's state.
///
/// Created by [`ReducerExt::pullback`].
pub struct Pullback<R: Reducer, S, A, E> {
    child: R,
    state: fn(&mut S) -> &mut R::State,
    extract: fn(A) -> Option<R::Action>,
    embed: fn(R::Action) -> A,
    environment: fn(&E) -> &R::Environment,
}

impl<R, S, A, E> Reducer for Pullback<R, S, A, E>
where
    R: Reducer,
    R::Action: Send + 'static,
    A: Send + 'static,
{
    type State = S;
    type Action = A;
    type Environment = E;

    fn reduce(&self, state: &mut S, action: A, env: &E) -> Effect<A> {
        let Some(child_action) = (self.extract)(action) else {
            return Effect::none();
        };
        self.child
            .reduce((self.state)(state), child_action, (self.environment)(env))
            .map(self.embed)
    }
}

/// What a [`ForEach`] reducer does with an action addressed to an index that
/// is not in the collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutOfBounds {
    /// Treat it as a programming error: fail a debug assertion in debug
    /// builds, log an error and ignore the action in release builds
    #[default]
    Assert,

    /// Silently ignore the action.
    ///
    /// For collections that can shrink while child effects are in flight,
    /// e.g. a row removed while its delayed action is still scheduled.
    Ignore,
}

/// A child reducer lifted to work on one element of a collection.
///
/// Created by [`ReducerExt::for_each`] or [`for_each_reducer`].
pub struct ForEach<R: Reducer, S, A, E> {
    child: R,
    elements: fn(&mut S) -> &mut Vec<R::State>,
    extract: fn(A) -> Option<(usize, R::Action)>,
    embed: fn(usize, R::Action) -> A,
    environment: fn(&E) -> &R::Environment,
    out_of_bounds: OutOfBounds,
}

impl<R: Reducer, S, A, E> ForEach<R, S, A, E> {
    /// Choose what happens to actions addressed past the end of the collection
    #[must_use]
    pub const fn with_out_of_bounds(mut self, policy: OutOfBounds) -> Self {
        self.out_of_bounds = policy;
        self
    }
}

impl<R, S, A, E> Reducer for ForEach<R, S, A, E>
where
    R: Reducer,
    R::Action: Debug + Send + 'static,
    A: Send + 'static,
{
    type State = S;
    type Action = A;
    type Environment = E;

    fn reduce(&self, state: &mut S, action: A, env: &E) -> Effect<A> {
        let Some((index, child_action)) = (self.extract)(action) else {
            return Effect::none();
        };

        let elements = (self.elements)(state);
        let len = elements.len();
        let Some(element) = elements.get_mut(index) else {
            if self.out_of_bounds == OutOfBounds::Assert {
                tracing::error!(
                    index,
                    len,
                    action = ?child_action,
                    "Action sent to an element that no longer exists"
                );
                debug_assert!(
                    index < len,
                    "for_each received {child_action:?} for index {index}, but the collection has {len} elements"
                );
            }
            return Effect::none();
        };

        let embed = self.embed;
        self.child
            .reduce(element, child_action, (self.environment)(env))
            .map(move |child_action| embed(index, child_action))
    }
}

/// Lift `child` to run on the element of a collection addressed by an action.
///
/// - `elements` projects the parent state onto the collection
/// - `extract` pulls `(index, child action)` out of a parent action
/// - `embed` wraps a child action and its index back into a parent action;
///   actions emitted by the child's effects are re-tagged with the same index
/// - `environment` projects the parent environment onto the child's
#[must_use]
pub const fn for_each_reducer<R: Reducer, S, A, E>(
    child: R,
    elements: fn(&mut S) -> &mut Vec<R::State>,
    extract: fn(A) -> Option<(usize, R::Action)>,
    embed: fn(usize, R::Action) -> A,
    environment: fn(&E) -> &R::Environment,
) -> ForEach<R, S, A, E> {
    ForEach {
        child,
        elements,
        extract,
        embed,
        environment,
        out_of_bounds: OutOfBounds::Assert,
    }
}

/// A child reducer that runs only while optional state is present.
///
/// Created by [`ReducerExt::optional`].
pub struct Optional<R: Reducer, S, A, E> {
    child: R,
    state: fn(&mut S) -> &mut Option<R::State>,
    extract: fn(A) -> Option<R::Action>,
    embed: fn(R::Action) -> A,
    environment: fn(&E) -> &R::Environment,
}

impl<R, S, A, E> Reducer for Optional<R, S, A, E>
where
    R: Reducer,
    R::Action: Debug + Send + 'static,
    A: Send + 'static,
{
    type State = S;
    type Action = A;
    type Environment = E;

    fn reduce(&self, state: &mut S, action: A, env: &E) -> Effect<A> {
        let Some(child_action) = (self.extract)(action) else {
            return Effect::none();
        };
        let Some(child_state) = (self.state)(state).as_mut() else {
            tracing::warn!(action = ?child_action, "Action sent to absent optional state");
            return Effect::none();
        };
        self.child
            .reduce(child_state, child_action, (self.environment)(env))
            .map(self.embed)
    }
}

/// Combinators available on every reducer
pub trait ReducerExt: Reducer + Sized {
    /// Combine with `other`; `self` runs first and effects are merged
    fn combined_with<R>(self, other: R) -> Combined<Self, R>
    where
        R: Reducer<State = Self::State, Action = Self::Action, Environment = Self::Environment>,
    {
        Combined {
            first: self,
            second: other,
        }
    }

    /// Run this reducer on part of a larger state
    fn pullback<S, A, E>(
        self,
        state: fn(&mut S) -> &mut Self::State,
        extract: fn(A) -> Option<Self::Action>,
        embed: fn(Self::Action) -> A,
        environment: fn(&E) -> &Self::Environment,
    ) -> Pullback<Self, S, A, E> {
        Pullback {
            child: self,
            state,
            extract,
            embed,
            environment,
        }
    }

    /// Run this reducer on the element of a collection an action addresses.
    ///
    /// See [`for_each_reducer`].
    fn for_each<S, A, E>(
        self,
        elements: fn(&mut S) -> &mut Vec<Self::State>,
        extract: fn(A) -> Option<(usize, Self::Action)>,
        embed: fn(usize, Self::Action) -> A,
        environment: fn(&E) -> &Self::Environment,
    ) -> ForEach<Self, S, A, E> {
        for_each_reducer(self, elements, extract, embed, environment)
    }

    /// Run this reducer on optional state, ignoring actions while it is `None`
    fn optional<S, A, E>(
        self,
        state: fn(&mut S) -> &mut Option<Self::State>,
        extract: fn(A) -> Option<Self::Action>,
        embed: fn(Self::Action) -> A,
        environment: fn(&E) -> &Self::Environment,
    ) -> Optional<Self, S, A, E> {
        Optional {
            child: self,
            state,
            extract,
            embed,
            environment,
        }
    }

    /// Print every action and the state diff it caused.
    ///
    /// Output goes through `tracing` at debug level until a printer is
    /// supplied with [`DebugReducer::environment`].
    fn debug(self, prefix: impl Into<String>) -> DebugReducer<Self>
    where
        Self::State: Debug,
        Self::Action: Debug,
    {
        DebugReducer::new(self, prefix, |_| DebugEnvironment::default())
    }

    /// Emit begin/end trace markers around each reduce and each effect
    fn signpost(self, prefix: impl Into<String>, tracer: AnyTracer) -> SignpostReducer<Self>
    where
        Self::Action: Debug + Send + 'static,
    {
        SignpostReducer::new(self, prefix, tracer)
    }

    /// Erase the reducer's type
    fn boxed(self) -> BoxedReducer<Self::State, Self::Action, Self::Environment>
    where
        Self: Send + Sync + 'static,
    {
        Box::new(self)
    }
}

impl<R: Reducer> ReducerExt for R {}

impl<R: Reducer, S, A, E> Debug for Pullback<R, S, A, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pullback").finish_non_exhaustive()
    }
}

impl<R: Reducer, S, A, E> Debug for ForEach<R, S, A, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForEach")
            .field("out_of_bounds", &self.out_of_bounds)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::EffectContext;
    use crate::reducer::reducer_fn;
    use crate::scheduler::TestScheduler;
    use crate::subscription::Subscriber;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Clone, Debug, Default)]
    struct TestState {
        counter: i32,
        name: String,
    }

    #[derive(Clone, Debug)]
    enum TestAction {
        Increment,
        Decrement,
        SetName(String),
    }

    struct CounterReducer;

    impl Reducer for CounterReducer {
        type State = TestState;
        type Action = TestAction;
        type Environment = ();

        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            _env: &Self::Environment,
        ) -> Effect<Self::Action> {
            match action {
                TestAction::Increment => state.counter += 1,
                TestAction::Decrement => state.counter -= 1,
                TestAction::SetName(_) => {},
            }
            Effect::none()
        }
    }

    struct NameReducer;

    impl Reducer for NameReducer {
        type State = TestState;
        type Action = TestAction;
        type Environment = ();

        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            _env: &Self::Environment,
        ) -> Effect<Self::Action> {
            if let TestAction::SetName(name) = action {
                state.name = name;
            }
            Effect::none()
        }
    }

    #[test]
    fn test_combine_reducers() {
        let combined = combine_reducers(vec![Box::new(CounterReducer), Box::new(NameReducer)]);

        let mut state = TestState::default();

        // Test counter reducer
        let _ = combined.reduce(&mut state, TestAction::Increment, &());
        assert_eq!(state.counter, 1);

        // Test name reducer
        let _ = combined.reduce(&mut state, TestAction::SetName("Alice".to_string()), &());
        assert_eq!(state.name, "Alice");

        // Both reducers work
        let _ = combined.reduce(&mut state, TestAction::Decrement, &());
        assert_eq!(state.counter, 0);
        assert_eq!(state.name, "Alice");
    }

    #[test]
    fn test_combined_effects_are_merged() {
        let scheduler = TestScheduler::new();
        let fired = Arc::new(Mutex::new(Vec::new()));

        let after = |label: &'static str, secs: u64| {
            let scheduler = scheduler.clone();
            let fired = Arc::clone(&fired);
            reducer_fn(move |_: &mut (), _: (), _: &()| {
                let fired = Arc::clone(&fired);
                Effect::fire_and_forget(move || fired.lock().push(label))
                    .delay(Duration::from_secs(secs), scheduler.any())
            })
        };

        let combined = after("slow", 2).combined_with(after("fast", 1));
        combined
            .reduce(&mut (), (), &())
            .subscribe(&EffectContext::isolated(), Subscriber::new(|()| {}, || {}));

        scheduler.advance(Duration::from_secs(1));
        assert_eq!(*fired.lock(), vec!["fast"]);

        scheduler.advance(Duration::from_secs(1));
        assert_eq!(*fired.lock(), vec!["fast", "slow"]);
    }

    // Pullback tests
    #[derive(Clone, Debug, Default)]
    struct SubState {
        value: i32,
    }

    #[derive(Clone, Debug, PartialEq)]
    enum SubAction {
        Add(i32),
        Multiply(i32),
    }

    struct SubReducer;

    impl Reducer for SubReducer {
        type State = SubState;
        type Action = SubAction;
        type Environment = ();

        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            _env: &Self::Environment,
        ) -> Effect<Self::Action> {
            match action {
                SubAction::Add(n) => {
                    state.value += n;
                    Effect::none()
                },
                SubAction::Multiply(n) => {
                    state.value *= n;
                    Effect::send(SubAction::Add(1))
                },
            }
        }
    }

    #[derive(Clone, Debug, Default)]
    struct ParentState {
        sub: SubState,
        maybe: Option<SubState>,
        rows: Vec<SubState>,
        other: String,
    }

    #[derive(Clone, Debug, PartialEq)]
    enum ParentAction {
        Sub(SubAction),
        Maybe(SubAction),
        Row(usize, SubAction),
        Rename(String),
    }

    #[test]
    fn test_pullback() {
        let scoped = SubReducer.pullback(
            |parent: &mut ParentState| &mut parent.sub,
            |action| match action {
                ParentAction::Sub(action) => Some(action),
                _ => None,
            },
            ParentAction::Sub,
            |env: &()| env,
        );

        let mut state = ParentState {
            sub: SubState { value: 5 },
            other: "test".to_string(),
            ..ParentState::default()
        };

        let _ = scoped.reduce(&mut state, ParentAction::Sub(SubAction::Add(3)), &());
        assert_eq!(state.sub.value, 8);
        assert_eq!(state.other, "test"); // Other state unchanged

        let effect = scoped.reduce(&mut state, ParentAction::Sub(SubAction::Multiply(2)), &());
        assert_eq!(state.sub.value, 16);
        assert!(matches!(effect, Effect::Send(ParentAction::Sub(SubAction::Add(1)))));

        let effect = scoped.reduce(&mut state, ParentAction::Rename("x".into()), &());
        assert!(effect.is_none());
    }

    fn rows() -> ForEach<SubReducer, ParentState, ParentAction, ()> {
        SubReducer.for_each(
            |parent: &mut ParentState| &mut parent.rows,
            |action| match action {
                ParentAction::Row(index, action) => Some((index, action)),
                _ => None,
            },
            ParentAction::Row,
            |env: &()| env,
        )
    }

    #[test]
    fn test_for_each_reduces_addressed_element() {
        let reducer = rows();
        let mut state = ParentState {
            rows: vec![SubState { value: 1 }, SubState { value: 2 }],
            ..ParentState::default()
        };

        let effect = reducer.reduce(&mut state, ParentAction::Row(1, SubAction::Multiply(10)), &());

        assert_eq!(state.rows[0].value, 1);
        assert_eq!(state.rows[1].value, 20);
        assert!(matches!(effect, Effect::Send(ParentAction::Row(1, SubAction::Add(1)))));
    }

    #[test]
    fn test_for_each_ignores_out_of_bounds_when_relaxed() {
        let reducer = rows().with_out_of_bounds(OutOfBounds::Ignore);
        let mut state = ParentState {
            rows: vec![SubState { value: 1 }],
            ..ParentState::default()
        };

        let effect = reducer.reduce(&mut state, ParentAction::Row(5, SubAction::Multiply(10)), &());

        assert!(effect.is_none());
        assert_eq!(state.rows[0].value, 1);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "for index 3")]
    fn test_for_each_asserts_out_of_bounds_by_default() {
        let mut state = ParentState::default();
        let _ = rows().reduce(&mut state, ParentAction::Row(3, SubAction::Add(1)), &());
    }

    #[test]
    fn test_optional_skips_absent_state() {
        let reducer = SubReducer.optional(
            |parent: &mut ParentState| &mut parent.maybe,
            |action| match action {
                ParentAction::Maybe(action) => Some(action),
                _ => None,
            },
            ParentAction::Maybe,
            |env: &()| env,
        );

        let mut state = ParentState::default();
        let effect = reducer.reduce(&mut state, ParentAction::Maybe(SubAction::Add(1)), &());
        assert!(effect.is_none());
        assert!(state.maybe.is_none());

        state.maybe = Some(SubState { value: 1 });
        let _ = reducer.reduce(&mut state, ParentAction::Maybe(SubAction::Add(1)), &());
        assert_eq!(state.maybe.map(|s| s.value), Some(2));
    }
}
