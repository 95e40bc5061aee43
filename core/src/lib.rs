//! # Composable Arch Core
//!
//! Core traits and types for the Composable Arch architecture.
//!
//! This crate provides the building blocks of a unidirectional state
//! management architecture: state is changed only by pure reducers in
//! response to actions, and every externally observable piece of work is
//! returned from the reducer as a cancellable [`Effect`](effect::Effect).
//!
//! ## Core Concepts
//!
//! - **State**: Domain state for a feature, owned by one store
//! - **Action**: Everything that can happen to a feature
//! - **Reducer**: Pure function `(State, Action, Environment) → (State, Effect)`
//! - **Effect**: Cold description of deferred work that emits actions
//! - **Environment**: Injected dependencies (schedulers, services)
//! - **Scheduler**: The only source of time; virtual in tests
//!
//! ## Architecture Principles
//!
//! - Functional Core, Imperative Shell
//! - Unidirectional Data Flow
//! - Explicit Effects (no hidden I/O, no hidden clocks)
//! - Dependency Injection via Environment
//!
//! ## Example
//!
//! ```
//! use composable_arch_core::{Effect, Reducer};
//! use composable_arch_core::scheduler::{AnyScheduler, TestScheduler};
//! use std::time::Duration;
//!
//! #[derive(Debug, Clone, Default, PartialEq)]
//! struct SearchState {
//!     query: String,
//!     results: Vec<String>,
//! }
//!
//! #[derive(Debug, Clone, PartialEq)]
//! enum SearchAction {
//!     QueryChanged(String),
//!     Results(Vec<String>),
//! }
//!
//! struct SearchEnvironment {
//!     scheduler: AnyScheduler,
//! }
//!
//! #[derive(Debug, Hash, PartialEq, Eq)]
//! struct SearchId;
//!
//! struct SearchReducer;
//!
//! impl Reducer for SearchReducer {
//!     type State = SearchState;
//!     type Action = SearchAction;
//!     type Environment = SearchEnvironment;
//!
//!     fn reduce(
//!         &self,
//!         state: &mut SearchState,
//!         action: SearchAction,
//!         env: &SearchEnvironment,
//!     ) -> Effect<SearchAction> {
//!         match action {
//!             SearchAction::QueryChanged(query) => {
//!                 state.query = query.clone();
//!                 Effect::send(SearchAction::Results(vec![query]))
//!                     .debounce(SearchId, Duration::from_millis(300), env.scheduler.clone())
//!             },
//!             SearchAction::Results(results) => {
//!                 state.results = results;
//!                 Effect::none()
//!             },
//!         }
//!     }
//! }
//!
//! let env = SearchEnvironment { scheduler: TestScheduler::new().any() };
//! let mut state = SearchState::default();
//! let effect = SearchReducer.reduce(&mut state, SearchAction::QueryChanged("rust".into()), &env);
//! assert_eq!(state.query, "rust");
//! assert!(!effect.is_none());
//! ```

pub mod cancellation;
pub mod composition;
pub mod debug;
pub mod diff;
pub mod effect;
pub mod scheduler;
pub mod signpost;
pub mod subscription;

pub use cancellation::{CancelId, CancelKey, CancellationRegistry};
pub use effect::{Effect, EffectContext};
pub use reducer::{EmptyReducer, FnReducer, Reducer, reducer_fn};
pub use scheduler::{AnyScheduler, Scheduler};
pub use subscription::{Subscriber, Subscription};

/// Reducer module - The core trait for business logic
///
/// Reducers are pure functions: `(State, Action, Environment) → (State, Effect)`
///
/// They contain all business logic and are deterministic and testable. All
/// the ways of combining reducers live in [`composition`](crate::composition).
pub mod reducer {
    use super::effect::Effect;
    use std::marker::PhantomData;
    use std::sync::Arc;

    /// The Reducer trait - core abstraction for business logic
    ///
    /// # Type Parameters
    ///
    /// - `State`: The domain state this reducer operates on
    /// - `Action`: The action type this reducer processes
    /// - `Environment`: The injected dependencies this reducer needs
    ///
    /// # Example
    ///
    /// ```
    /// use composable_arch_core::{Effect, Reducer};
    ///
    /// struct CounterReducer;
    ///
    /// impl Reducer for CounterReducer {
    ///     type State = i64;
    ///     type Action = i64;
    ///     type Environment = ();
    ///
    ///     fn reduce(&self, state: &mut i64, delta: i64, _env: &()) -> Effect<i64> {
    ///         *state += delta;
    ///         Effect::none()
    ///     }
    /// }
    ///
    /// let mut count = 0;
    /// let _ = CounterReducer.reduce(&mut count, 5, &());
    /// assert_eq!(count, 5);
    /// ```
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The action type this reducer processes
        type Action;

        /// The environment type with injected dependencies
        type Environment;

        /// Reduce an action into state changes and an effect
        ///
        /// This is a pure function that:
        /// 1. Updates state in place
        /// 2. Returns a description of the work to perform
        ///
        /// It must not block, sleep or read a clock; time comes from a
        /// scheduler in the environment and is used only inside effects.
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> Effect<Self::Action>;
    }

    impl<R: Reducer + ?Sized> Reducer for Box<R> {
        type State = R::State;
        type Action = R::Action;
        type Environment = R::Environment;

        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> Effect<Self::Action> {
            (**self).reduce(state, action, env)
        }
    }

    impl<R: Reducer + ?Sized> Reducer for Arc<R> {
        type State = R::State;
        type Action = R::Action;
        type Environment = R::Environment;

        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> Effect<Self::Action> {
            (**self).reduce(state, action, env)
        }
    }

    /// Reducer backed by a closure. Created by [`reducer_fn`].
    pub struct FnReducer<F, S, A, E> {
        f: F,
        _phantom: PhantomData<fn(&mut S, A, &E)>,
    }

    /// Build a reducer from a closure
    ///
    /// ```
    /// use composable_arch_core::{Effect, Reducer, reducer_fn};
    ///
    /// let toggle = reducer_fn(|on: &mut bool, _action: (), _env: &()| {
    ///     *on = !*on;
    ///     Effect::none()
    /// });
    ///
    /// let mut on = false;
    /// let _ = toggle.reduce(&mut on, (), &());
    /// assert!(on);
    /// ```
    pub const fn reducer_fn<F, S, A, E>(f: F) -> FnReducer<F, S, A, E>
    where
        F: Fn(&mut S, A, &E) -> Effect<A>,
    {
        FnReducer {
            f,
            _phantom: PhantomData,
        }
    }

    impl<F, S, A, E> Reducer for FnReducer<F, S, A, E>
    where
        F: Fn(&mut S, A, &E) -> Effect<A>,
    {
        type State = S;
        type Action = A;
        type Environment = E;

        fn reduce(&self, state: &mut S, action: A, env: &E) -> Effect<A> {
            (self.f)(state, action, env)
        }
    }

    /// Reducer that ignores every action
    pub struct EmptyReducer<S, A, E> {
        _phantom: PhantomData<fn(&mut S, A, &E)>,
    }

    impl<S, A, E> EmptyReducer<S, A, E> {
        /// Create an empty reducer
        #[must_use]
        pub const fn new() -> Self {
            Self {
                _phantom: PhantomData,
            }
        }
    }

    impl<S, A, E> Default for EmptyReducer<S, A, E> {
        fn default() -> Self {
            Self::new()
        }
    }

    impl<S, A, E> Reducer for EmptyReducer<S, A, E> {
        type State = S;
        type Action = A;
        type Environment = E;

        fn reduce(&self, _state: &mut S, _action: A, _env: &E) -> Effect<A> {
            Effect::none()
        }
    }
}
