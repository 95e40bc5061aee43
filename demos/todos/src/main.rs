//! Todos example binary
//!
//! Runs the todo list on a tokio runtime with debug output, signposts and
//! Prometheus metrics enabled. Set `RUST_LOG=trace` to see signposts.

use composable_arch_core::composition::ReducerExt;
use composable_arch_core::signpost::TracingTracer;
use composable_arch_runtime::{Store, TokioScheduler, metrics};
use std::time::Duration;
use todos::{AppAction, AppEnvironment, AppState, SORT_DELAY, TodoAction, app_reducer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "todos=debug,composable_arch_runtime=debug,composable_arch_core=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let metrics = metrics::install_recorder()?;

    println!("=== Todos Example ===\n");

    let environment = AppEnvironment::new(TokioScheduler::try_current()?.any());
    let reducer = app_reducer()
        .signpost("todos", TracingTracer::new().any())
        .debug("todos");
    let store = Store::new(AppState::default(), reducer, environment);
    let mut view = store.view_store();

    for text in ["Milk", "Eggs", "Hand soap"] {
        view.send(AppAction::AddTodo);
        view.send(AppAction::Todo(0, TodoAction::TextFieldChanged(text.to_owned())));
    }

    // Tick two rows in quick succession; the list sorts once, a second later
    view.send(AppAction::Todo(0, TodoAction::CheckBoxToggled));
    tokio::time::sleep(Duration::from_millis(300)).await;
    view.send(AppAction::Todo(1, TodoAction::CheckBoxToggled));

    print_todos("Before sort", &view.state());

    tokio::time::sleep(SORT_DELAY + Duration::from_millis(100)).await;
    print_todos("After sort", &view.state());

    view.send(AppAction::ClearCompleted);
    print_todos("After clearing completed", &view.state());

    if let Some(rendered) = metrics.render() {
        println!("\n=== Metrics ===\n{rendered}");
    }

    Ok(())
}

fn print_todos(title: &str, state: &AppState) {
    println!("{title}:");
    for todo in &state.todos {
        let mark = if todo.is_complete { "x" } else { " " };
        println!("  [{mark}] {}", todo.description);
    }
    println!();
}
