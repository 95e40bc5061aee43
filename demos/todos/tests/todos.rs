//! Todo list behaviour driven through the test store.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use composable_arch_testing::{TestScheduler, TestStore};
use std::time::Duration;
use todos::{AppAction, AppEnvironment, AppState, SORT_DELAY, Todo, TodoAction, app_reducer};

fn todo(id: u64, description: &str, is_complete: bool) -> Todo {
    Todo {
        id,
        description: description.to_owned(),
        is_complete,
    }
}

fn two_todos() -> AppState {
    AppState {
        todos: vec![todo(0, "Milk", false), todo(1, "Eggs", false)],
        next_id: 2,
    }
}

#[test]
fn add_and_edit_todo() {
    let scheduler = TestScheduler::new();
    let mut store = TestStore::new(AppState::default(), app_reducer(), AppEnvironment::new(scheduler.any()));

    store.send(AppAction::AddTodo, |state| {
        state.todos.push(todo(0, "", false));
        state.next_id = 1;
    });
    store.send(
        AppAction::Todo(0, TodoAction::TextFieldChanged("Milk".into())),
        |state| state.todos[0].description = "Milk".into(),
    );
}

#[test]
fn completing_a_todo_sorts_after_a_delay() {
    let scheduler = TestScheduler::new();
    let mut store = TestStore::new(two_todos(), app_reducer(), AppEnvironment::new(scheduler.any()));

    store.send(AppAction::Todo(0, TodoAction::CheckBoxToggled), |state| {
        state.todos[0].is_complete = true;
    });
    store.perform(|| scheduler.advance(SORT_DELAY));
    store.receive(AppAction::SortCompletedTodos, |state| {
        state.todos = vec![todo(1, "Eggs", false), todo(0, "Milk", true)];
    });
}

#[test]
fn quick_toggles_sort_once() {
    let scheduler = TestScheduler::new();
    let mut store = TestStore::new(two_todos(), app_reducer(), AppEnvironment::new(scheduler.any()));

    store.send(AppAction::Todo(0, TodoAction::CheckBoxToggled), |state| {
        state.todos[0].is_complete = true;
    });
    store.perform(|| scheduler.advance(Duration::from_millis(500)));
    store.send(AppAction::Todo(0, TodoAction::CheckBoxToggled), |state| {
        state.todos[0].is_complete = false;
    });
    store.perform(|| scheduler.advance(SORT_DELAY));
    store.receive(AppAction::SortCompletedTodos, |_| {});

    store.perform(|| scheduler.run());
    store.finish();
}

#[test]
fn clear_completed_and_delete() {
    let scheduler = TestScheduler::new();
    let mut store = TestStore::new(
        AppState {
            todos: vec![todo(0, "Milk", true), todo(1, "Eggs", false), todo(2, "Soap", true)],
            next_id: 3,
        },
        app_reducer(),
        AppEnvironment::new(scheduler.any()),
    );

    store.send(AppAction::ClearCompleted, |state| {
        state.todos = vec![todo(1, "Eggs", false)];
    });
    store.send(AppAction::Delete(0), |state| state.todos.clear());
}
