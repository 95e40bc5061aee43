//! # Todos Example
//!
//! A todo list built from two reducers:
//!
//! - a row reducer that knows nothing about the list, lifted onto every
//!   element of `AppState::todos` with `for_each`
//! - a list reducer that adds, deletes and clears rows, and re-sorts the list
//!   one second after the last checkbox toggle
//!
//! The sort is debounced: toggling several rows in quick succession sorts
//! the list once.
//!
//! ## Example
//!
//! ```
//! use composable_arch_core::scheduler::ImmediateScheduler;
//! use composable_arch_runtime::Store;
//! use todos::{AppAction, AppEnvironment, AppState, TodoAction, app_reducer};
//!
//! let store = Store::new(
//!     AppState::default(),
//!     app_reducer(),
//!     AppEnvironment::new(ImmediateScheduler::any()),
//! );
//!
//! store.send(AppAction::AddTodo);
//! store.send(AppAction::AddTodo);
//! store.send(AppAction::Todo(0, TodoAction::CheckBoxToggled));
//!
//! // Completed rows sink to the bottom
//! assert_eq!(store.state(|s| s.todos[1].id), 1);
//! assert!(store.state(|s| s.todos[1].is_complete));
//! ```

use composable_arch_core::composition::ReducerExt;
use composable_arch_core::scheduler::AnyScheduler;
use composable_arch_core::{Effect, Reducer, reducer_fn};
use std::time::Duration;

/// Delay between the last checkbox toggle and the sort
pub const SORT_DELAY: Duration = Duration::from_secs(1);

/// A single row
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Todo {
    /// Stable identity, assigned on creation
    pub id: u64,
    /// What needs doing
    pub description: String,
    /// Whether it is done
    pub is_complete: bool,
}

/// Row actions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TodoAction {
    /// The checkbox was tapped
    CheckBoxToggled,
    /// The text field was edited
    TextFieldChanged(String),
}

/// List state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppState {
    /// Rows in display order
    pub todos: Vec<Todo>,
    /// Id handed to the next new row
    pub next_id: u64,
}

/// List actions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppAction {
    /// Insert an empty row at the top
    AddTodo,
    /// Remove every completed row
    ClearCompleted,
    /// Remove the row at an index
    Delete(usize),
    /// Stable-sort completed rows below incomplete ones
    SortCompletedTodos,
    /// A row action, addressed by index
    Todo(usize, TodoAction),
}

/// Dependencies of the list
#[derive(Clone)]
pub struct AppEnvironment {
    /// Scheduler the debounced sort runs on
    pub main_queue: AnyScheduler,
}

impl AppEnvironment {
    /// Environment sorting on `main_queue`
    #[must_use]
    pub fn new(main_queue: AnyScheduler) -> Self {
        Self { main_queue }
    }
}

impl std::fmt::Debug for AppEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppEnvironment").finish_non_exhaustive()
    }
}

#[derive(Debug, Hash, PartialEq, Eq)]
struct TodoCompletionId;

/// Reducer for a single row
#[must_use]
pub fn todo_reducer() -> impl Reducer<State = Todo, Action = TodoAction, Environment = ()> + Send + Sync + 'static {
    reducer_fn(|todo: &mut Todo, action: TodoAction, _env: &()| {
        match action {
            TodoAction::CheckBoxToggled => todo.is_complete = !todo.is_complete,
            TodoAction::TextFieldChanged(text) => todo.description = text,
        }
        Effect::none()
    })
}

fn list_reducer(state: &mut AppState, action: AppAction, env: &AppEnvironment) -> Effect<AppAction> {
    match action {
        AppAction::AddTodo => {
            state.todos.insert(
                0,
                Todo {
                    id: state.next_id,
                    ..Todo::default()
                },
            );
            state.next_id += 1;
            Effect::none()
        },
        AppAction::ClearCompleted => {
            state.todos.retain(|todo| !todo.is_complete);
            Effect::none()
        },
        AppAction::Delete(index) => {
            if index < state.todos.len() {
                state.todos.remove(index);
            } else {
                tracing::warn!(index, "Delete for a row that does not exist");
            }
            Effect::none()
        },
        AppAction::SortCompletedTodos => {
            state.todos.sort_by_key(|todo| todo.is_complete);
            Effect::none()
        },
        AppAction::Todo(_, TodoAction::CheckBoxToggled) => Effect::send(AppAction::SortCompletedTodos)
            .debounce(TodoCompletionId, SORT_DELAY, env.main_queue.clone()),
        AppAction::Todo(_, TodoAction::TextFieldChanged(_)) => Effect::none(),
    }
}

/// Reducer for the whole list
#[must_use]
pub fn app_reducer()
-> impl Reducer<State = AppState, Action = AppAction, Environment = AppEnvironment> + Send + Sync + 'static {
    todo_reducer()
        .for_each(
            |state: &mut AppState| &mut state.todos,
            |action| match action {
                AppAction::Todo(index, action) => Some((index, action)),
                _ => None,
            },
            AppAction::Todo,
            |_: &AppEnvironment| &(),
        )
        .combined_with(reducer_fn(list_reducer))
}
