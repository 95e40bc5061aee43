//! Store behaviour on a real tokio runtime.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use composable_arch_core::{Effect, Reducer, reducer_fn};
use composable_arch_runtime::{RegistryScope, Store, StoreConfig, StoreError, TokioScheduler};
use composable_arch_testing::init_tracing;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
enum Action {
    QueryChanged(u32),
    Search(u32),
    StartTimer,
    StopTimer,
    Tick,
    Spawn(u32),
    Landed(u32),
}

#[derive(Debug, Clone, Default, PartialEq)]
struct State {
    searched: Vec<u32>,
    ticks: u32,
    landed: Vec<u32>,
}

#[derive(Debug, Hash, PartialEq, Eq)]
struct SearchId;

#[derive(Debug, Hash, PartialEq, Eq)]
struct TimerId(&'static str);

fn reducer(
    scheduler: TokioScheduler,
    timer: &'static str,
) -> impl Reducer<State = State, Action = Action, Environment = ()> + Send + Sync + 'static {
    reducer_fn(move |state: &mut State, action: Action, _env: &()| match action {
        Action::QueryChanged(query) => Effect::send(Action::Search(query)).debounce(
            SearchId,
            Duration::from_millis(300),
            scheduler.clone().any(),
        ),
        Action::Search(query) => {
            state.searched.push(query);
            Effect::none()
        },
        Action::StartTimer => Effect::send(Action::Tick)
            .delay(Duration::from_secs(60), scheduler.clone().any())
            .cancellable(TimerId(timer), false),
        Action::StopTimer => Effect::cancel(TimerId(timer)),
        Action::Tick => {
            state.ticks += 1;
            Effect::none()
        },
        Action::Spawn(n) => Effect::merge((0..n).map(|i| {
            Effect::future(async move {
                tokio::task::spawn_blocking(move || i).await.ok().map(Action::Landed)
            })
        })),
        Action::Landed(i) => {
            state.landed.push(i);
            Effect::none()
        },
    })
}

fn store(
    timer: &'static str,
    registry: RegistryScope,
) -> Store<State, Action, (), impl Reducer<State = State, Action = Action, Environment = ()> + Send + Sync + 'static>
{
    init_tracing();
    Store::with_config(
        State::default(),
        reducer(TokioScheduler::try_current().unwrap(), timer),
        (),
        StoreConfig::default().with_registry(registry),
    )
}

#[tokio::test(start_paused = true)]
async fn debounce_on_tokio_time() {
    let store = store("debounce", RegistryScope::Isolated);

    store.send(Action::QueryChanged(1));
    tokio::time::sleep(Duration::from_millis(100)).await;
    store.send(Action::QueryChanged(2));
    tokio::time::sleep(Duration::from_millis(100)).await;
    store.send(Action::QueryChanged(3));

    tokio::time::sleep(Duration::from_millis(299)).await;
    assert!(store.state(|s| s.searched.is_empty()));

    tokio::time::sleep(Duration::from_millis(2)).await;
    assert_eq!(store.state(|s| s.searched.clone()), vec![3]);
    assert_eq!(store.in_flight_effects(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn outputs_from_many_threads_are_all_reduced() {
    let store = store("threads", RegistryScope::Isolated);

    store.send(Action::Spawn(32));

    tokio::time::timeout(Duration::from_secs(5), async {
        while store.state(|s| s.landed.len()) < 32 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("timed out waiting for effect output");

    let mut landed = store.state(|s| s.landed.clone());
    landed.sort_unstable();
    assert_eq!(landed, (0..32).collect::<Vec<_>>());
}

#[tokio::test(start_paused = true)]
async fn shared_registry_cancels_across_stores() {
    let first = store("shared", RegistryScope::Shared);
    let second = store("shared", RegistryScope::Shared);

    first.send(Action::StartTimer);
    assert_eq!(first.in_flight_effects(), 1);

    second.send(Action::StopTimer);
    assert_eq!(first.in_flight_effects(), 0);

    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(first.state(|s| s.ticks), 0);
}

#[tokio::test(start_paused = true)]
async fn isolated_registries_do_not_interfere() {
    let first = store("isolated", RegistryScope::Isolated);
    let second = store("isolated", RegistryScope::Isolated);

    first.send(Action::StartTimer);
    second.send(Action::StopTimer);

    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(first.state(|s| s.ticks), 1);
}

#[tokio::test]
async fn send_and_wait_for_returns_match_or_times_out() {
    let store = store("wait", RegistryScope::Isolated);

    let landed = store
        .send_and_wait_for(Action::Spawn(1), |a| matches!(a, Action::Landed(_)), Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(landed, Action::Landed(0));

    let missing = store
        .send_and_wait_for(Action::Tick, |a| matches!(a, Action::Landed(_)), Duration::from_millis(20))
        .await;
    assert!(matches!(missing, Err(StoreError::Timeout)));
}

#[tokio::test(start_paused = true)]
async fn view_store_follows_effect_driven_changes() {
    let store = store("view", RegistryScope::Isolated);
    let mut view = store.view_store();

    view.send(Action::QueryChanged(9));
    assert!(view.state().searched.is_empty());

    view.changed().await.unwrap();
    assert!(view.state().searched.is_empty());

    view.changed().await.unwrap();
    assert_eq!(view.state().searched, vec![9]);
}
