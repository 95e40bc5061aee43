//! Profiling markers around reducers and their effects.
//!
//! A [`SignpostReducer`] brackets every reduce call with an `Action`
//! begin/end pair and every returned effect with an `Effect` begin/end pair
//! (plus an `Effect Output` event per emitted value). Markers are keyed by a
//! per-call id so overlapping effects can be told apart.
//!
//! When the tracer is disabled the wrapped reducer runs untouched.

use crate::debug::debug_case_labels;
use crate::effect::Effect;
use crate::reducer::Reducer;
use crate::subscription::{Subscriber, Subscription};
use std::fmt::Debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Target used for signpost events emitted through `tracing`
pub const SIGNPOST_TARGET: &str = "composable_arch::signpost";

/// Receiver of begin/end markers.
pub trait Tracer: Send + Sync {
    /// Whether markers should be produced at all
    fn is_enabled(&self) -> bool;

    /// An interval named `name` starts
    fn begin(&self, name: &'static str, id: u64, message: &str);

    /// The interval `name`/`id` ends
    fn end(&self, name: &'static str, id: u64, message: &str);

    /// A point event inside the interval `name`/`id`
    fn event(&self, name: &'static str, id: u64, message: &str);
}

/// Shared, type-erased tracer
pub type AnyTracer = Arc<dyn Tracer>;

/// Tracer emitting `tracing` events at trace level under [`SIGNPOST_TARGET`]
#[derive(Debug, Clone, Copy)]
pub struct TracingTracer {
    enabled: bool,
}

impl TracingTracer {
    /// An enabled tracer
    #[must_use]
    pub const fn new() -> Self {
        Self { enabled: true }
    }

    /// A tracer that produces nothing
    #[must_use]
    pub const fn disabled() -> Self {
        Self { enabled: false }
    }

    /// Type-erased handle
    #[must_use]
    pub fn any(self) -> AnyTracer {
        Arc::new(self)
    }
}

impl Default for TracingTracer {
    fn default() -> Self {
        Self::new()
    }
}

impl Tracer for TracingTracer {
    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn begin(&self, name: &'static str, id: u64, message: &str) {
        tracing::trace!(target: SIGNPOST_TARGET, name, id, detail = message, "begin");
    }

    fn end(&self, name: &'static str, id: u64, message: &str) {
        tracing::trace!(target: SIGNPOST_TARGET, name, id, detail = message, "end");
    }

    fn event(&self, name: &'static str, id: u64, message: &str) {
        tracing::trace!(target: SIGNPOST_TARGET, name, id, detail = message, "event");
    }
}

/// Reducer wrapper that emits signposts.
///
/// Created by [`ReducerExt::signpost`](crate::composition::ReducerExt::signpost).
pub struct SignpostReducer<R> {
    reducer: R,
    prefix: String,
    tracer: AnyTracer,
    next_id: AtomicU64,
}

impl<R> SignpostReducer<R> {
    /// Wrap `reducer`, labelling markers with `prefix`
    pub fn new(reducer: R, prefix: impl Into<String>, tracer: AnyTracer) -> Self {
        let prefix = prefix.into();
        Self {
            reducer,
            prefix: if prefix.is_empty() {
                prefix
            } else {
                format!("[{prefix}] ")
            },
            tracer,
            next_id: AtomicU64::new(0),
        }
    }
}

impl<R> Reducer for SignpostReducer<R>
where
    R: Reducer,
    R::Action: Debug + Send + 'static,
{
    type State = R::State;
    type Action = R::Action;
    type Environment = R::Environment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> Effect<Self::Action> {
        if !self.tracer.is_enabled() {
            return self.reducer.reduce(state, action, env);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let label = format!("{}{}", self.prefix, debug_case_labels(&action));

        self.tracer.begin("Action", id, &label);
        let effect = self.reducer.reduce(state, action, env);
        self.tracer.end("Action", id, &label);

        if effect.is_none() {
            return effect;
        }
        traced_effect(effect, Arc::clone(&self.tracer), id, label)
    }
}

fn traced_effect<A: Debug + Send + 'static>(
    effect: Effect<A>,
    tracer: AnyTracer,
    id: u64,
    label: String,
) -> Effect<A> {
    Effect::run(move |subscriber, context| {
        tracer.begin("Effect", id, &label);
        let ended = Arc::new(AtomicBool::new(false));

        let downstream = subscriber.clone();
        let output_tracer = Arc::clone(&tracer);
        let finish_tracer = Arc::clone(&tracer);
        let finish_ended = Arc::clone(&ended);

        let inner = effect.subscribe(
            context,
            Subscriber::new(
                move |value: A| {
                    output_tracer.event("Effect Output", id, &debug_case_labels(&value));
                    downstream.send(value);
                },
                move || {
                    if !finish_ended.swap(true, Ordering::AcqRel) {
                        finish_tracer.end("Effect", id, "Finished");
                    }
                    subscriber.complete();
                },
            ),
        );

        let subscription = Subscription::new();
        subscription.on_cancel(move || {
            if !ended.swap(true, Ordering::AcqRel) {
                tracer.end("Effect", id, "Cancelled");
            }
            inner.cancel();
        });
        subscription
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composition::ReducerExt;
    use crate::effect::EffectContext;
    use crate::reducer::reducer_fn;
    use crate::scheduler::TestScheduler;
    use parking_lot::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        enabled: bool,
        markers: Mutex<Vec<String>>,
    }

    impl Tracer for Recorder {
        fn is_enabled(&self) -> bool {
            self.enabled
        }

        fn begin(&self, name: &'static str, id: u64, message: &str) {
            self.markers.lock().push(format!("begin {name} #{id} {message}"));
        }

        fn end(&self, name: &'static str, id: u64, message: &str) {
            self.markers.lock().push(format!("end {name} #{id} {message}"));
        }

        fn event(&self, name: &'static str, id: u64, message: &str) {
            self.markers.lock().push(format!("event {name} #{id} {message}"));
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    enum Action {
        Start,
        Done(u32),
    }

    fn reducer(
        scheduler: &TestScheduler,
    ) -> impl Reducer<State = u32, Action = Action, Environment = ()> {
        let scheduler = scheduler.clone();
        reducer_fn(move |state: &mut u32, action: Action, _env: &()| match action {
            Action::Start => Effect::send(Action::Done(7)).delay(Duration::from_secs(1), scheduler.any()),
            Action::Done(value) => {
                *state = value;
                Effect::none()
            },
        })
    }

    #[test]
    fn test_markers_bracket_action_and_effect() {
        let scheduler = TestScheduler::new();
        let tracer = Arc::new(Recorder {
            enabled: true,
            ..Recorder::default()
        });
        let reducer = reducer(&scheduler).signpost("app", tracer.clone());

        let effect = reducer.reduce(&mut 0, Action::Start, &());
        effect.subscribe(&EffectContext::isolated(), Subscriber::new(|_| {}, || {}));
        scheduler.run();

        assert_eq!(
            *tracer.markers.lock(),
            vec![
                "begin Action #0 [app] Start",
                "end Action #0 [app] Start",
                "begin Effect #0 [app] Start",
                "event Effect Output #0 Done",
                "end Effect #0 Finished",
            ]
        );
    }

    #[test]
    fn test_cancelled_effect_ends_once() {
        let scheduler = TestScheduler::new();
        let tracer = Arc::new(Recorder {
            enabled: true,
            ..Recorder::default()
        });
        let reducer = reducer(&scheduler).signpost("", tracer.clone());

        let subscription = reducer
            .reduce(&mut 0, Action::Start, &())
            .subscribe(&EffectContext::isolated(), Subscriber::new(|_| {}, || {}));
        subscription.cancel();
        subscription.cancel();
        scheduler.run();

        let markers = tracer.markers.lock();
        assert_eq!(markers.last().map(String::as_str), Some("end Effect #0 Cancelled"));
        assert_eq!(markers.iter().filter(|m| m.starts_with("end Effect")).count(), 1);
    }

    #[test]
    fn test_disabled_tracer_is_transparent() {
        let scheduler = TestScheduler::new();
        let tracer = Arc::new(Recorder::default());
        let reducer = reducer(&scheduler).signpost("app", tracer.clone());

        let mut state = 0;
        let effect = reducer.reduce(&mut state, Action::Done(3), &());

        assert!(effect.is_none());
        assert_eq!(state, 3);
        assert!(tracer.markers.lock().is_empty());
    }
}
