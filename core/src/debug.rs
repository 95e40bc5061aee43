//! Reducer debugging: print each action and the state change it caused.
//!
//! ```text
//! todos: received action:
//!   Todo(
//!       0,
//!       CheckBoxToggled,
//!   )
//!   AppState {
//!       todos: [
//!           Todo {
//! -             is_complete: false,
//! +             is_complete: true,
//!   ...
//! ```

use crate::diff;
use crate::effect::Effect;
use crate::reducer::Reducer;
use std::fmt::{Debug, Write};
use std::sync::Arc;

/// How actions are rendered in debug output
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ActionFormat {
    /// The full pretty-printed action, payload included
    #[default]
    Prettified,

    /// Only the case names, payload values omitted.
    /// `Todo(0, TextFieldChanged("milk"))` renders as `Todo(TextFieldChanged)`.
    LabelsOnly,
}

/// Where debug output goes
#[derive(Clone)]
pub struct DebugEnvironment {
    printer: Arc<dyn Fn(&str) + Send + Sync>,
}

impl DebugEnvironment {
    /// Send output to `printer`
    pub fn new(printer: impl Fn(&str) + Send + Sync + 'static) -> Self {
        Self {
            printer: Arc::new(printer),
        }
    }

    /// Hand one rendered message to the printer
    pub fn print(&self, message: &str) {
        (self.printer)(message);
    }
}

impl Default for DebugEnvironment {
    fn default() -> Self {
        Self::new(|message| tracing::debug!("{message}"))
    }
}

impl Debug for DebugEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebugEnvironment").finish_non_exhaustive()
    }
}

type EnvironmentFactory<E> = Arc<dyn Fn(&E) -> DebugEnvironment + Send + Sync>;

/// Reducer wrapper that prints every action and state diff.
///
/// Created by [`ReducerExt::debug`](crate::composition::ReducerExt::debug).
pub struct DebugReducer<R: Reducer> {
    reducer: R,
    prefix: String,
    format: ActionFormat,
    environment: EnvironmentFactory<R::Environment>,
}

impl<R: Reducer> DebugReducer<R> {
    /// Wrap `reducer`; `environment` picks the printer from the reducer's
    /// environment on every call
    pub fn new(
        reducer: R,
        prefix: impl Into<String>,
        environment: impl Fn(&R::Environment) -> DebugEnvironment + Send + Sync + 'static,
    ) -> Self {
        Self {
            reducer,
            prefix: prefix.into(),
            format: ActionFormat::default(),
            environment: Arc::new(environment),
        }
    }

    /// Choose how actions are rendered
    #[must_use]
    pub fn action_format(mut self, format: ActionFormat) -> Self {
        self.format = format;
        self
    }

    /// Choose where output goes
    #[must_use]
    pub fn environment(
        mut self,
        environment: impl Fn(&R::Environment) -> DebugEnvironment + Send + Sync + 'static,
    ) -> Self {
        self.environment = Arc::new(environment);
        self
    }
}

impl<R> Reducer for DebugReducer<R>
where
    R: Reducer,
    R::State: Debug,
    R::Action: Debug,
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
        let rendered_action = match self.format {
            ActionFormat::Prettified => format!("{action:#?}"),
            ActionFormat::LabelsOnly => debug_case_labels(&action),
        };
        let before = format!("{state:#?}");

        let effect = self.reducer.reduce(state, action, env);

        let after = format!("{state:#?}");
        let message = render_message(&self.prefix, &rendered_action, &before, &after);
        (self.environment)(env).print(&message);
        effect
    }
}

fn render_message(prefix: &str, action: &str, before: &str, after: &str) -> String {
    let mut message = String::new();
    if !prefix.is_empty() {
        let _ = write!(message, "{prefix}: ");
    }
    message.push_str("received action:\n");
    for line in action.lines() {
        let _ = writeln!(message, "  {line}");
    }
    if before == after {
        message.push_str("  (No state changes)");
    } else {
        message.push_str(&diff::render(before, after));
    }
    message
}

/// Render only the case names found in a value's `Debug` output.
///
/// Identifiers starting with an uppercase letter are kept along with their
/// nesting; field names, literals and other payload values are dropped.
///
/// `Debug` output does not tell an enum case apart from a struct, so a
/// payload that is a struct keeps its type name: `Add(Item { .. })` renders
/// as `Add(Item)`. Float `NaN` is the one uppercase value that is dropped.
///
/// ```
/// use composable_arch_core::debug::debug_case_labels;
///
/// #[derive(Debug)]
/// enum TodoAction { CheckBoxToggled, TextFieldChanged(String) }
///
/// #[derive(Debug)]
/// enum AppAction { Todo(usize, TodoAction), AddTodo }
///
/// assert_eq!(debug_case_labels(&AppAction::AddTodo), "AddTodo");
/// assert_eq!(
///     debug_case_labels(&AppAction::Todo(3, TodoAction::TextFieldChanged("milk".into()))),
///     "Todo(TextFieldChanged)"
/// );
/// ```
pub fn debug_case_labels(value: &impl Debug) -> String {
    struct Group {
        labels: Vec<String>,
        owned: bool,
    }

    let rendered = format!("{value:?}");
    let mut chars = rendered.chars().peekable();
    let mut groups = vec![Group {
        labels: Vec::new(),
        owned: false,
    }];
    let mut after_label = false;

    while let Some(c) = chars.next() {
        match c {
            '"' | '\'' => {
                let mut escaped = false;
                for next in chars.by_ref() {
                    if escaped {
                        escaped = false;
                    } else if next == '\\' {
                        escaped = true;
                    } else if next == c {
                        break;
                    }
                }
                after_label = false;
            },
            '(' | '{' | '[' => {
                groups.push(Group {
                    labels: Vec::new(),
                    owned: after_label,
                });
                after_label = false;
            },
            ')' | '}' | ']' => {
                let closed = if groups.len() > 1 { groups.pop() } else { None };
                if let (Some(group), Some(parent)) = (closed, groups.last_mut()) {
                    match parent.labels.last_mut() {
                        Some(owner) if group.owned => {
                            if !group.labels.is_empty() {
                                let _ = write!(owner, "({})", group.labels.join(", "));
                            }
                        },
                        _ => parent.labels.extend(group.labels),
                    }
                }
                after_label = false;
            },
            c if c.is_alphabetic() || c == '_' => {
                let mut ident = String::from(c);
                while let Some(&next) = chars.peek() {
                    if !(next.is_alphanumeric() || next == '_') {
                        break;
                    }
                    ident.push(next);
                    chars.next();
                }
                after_label = ident.starts_with(char::is_uppercase) && ident != "NaN";
                if after_label {
                    if let Some(group) = groups.last_mut() {
                        group.labels.push(ident);
                    }
                }
            },
            c if c.is_whitespace() => {},
            _ => after_label = false,
        }
    }

    groups
        .into_iter()
        .flat_map(|group| group.labels)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composition::ReducerExt;
    use crate::reducer::reducer_fn;
    use parking_lot::Mutex;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Counter {
        count: i32,
        label: String,
    }

    #[derive(Debug, Clone, PartialEq)]
    enum CounterAction {
        Increment,
        Noop,
        Rename { label: String },
    }

    fn recording() -> (Arc<Mutex<Vec<String>>>, DebugEnvironment) {
        let messages = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&messages);
        let env = DebugEnvironment::new(move |message| sink.lock().push(message.to_string()));
        (messages, env)
    }

    fn counter() -> impl Reducer<State = Counter, Action = CounterAction, Environment = ()> {
        reducer_fn(|state: &mut Counter, action: CounterAction, _env: &()| {
            match action {
                CounterAction::Increment => state.count += 1,
                CounterAction::Noop => {},
                CounterAction::Rename { label } => state.label = label,
            }
            Effect::none()
        })
    }

    #[test]
    fn test_unchanged_state_prints_marker() {
        let (messages, env) = recording();
        let reducer = counter().debug("").environment(move |_| env.clone());

        let _ = reducer.reduce(&mut Counter::default(), CounterAction::Noop, &());

        assert_eq!(
            *messages.lock(),
            vec!["received action:\n  Noop\n  (No state changes)".to_string()]
        );
    }

    #[test]
    fn test_changed_state_prints_diff() {
        let (messages, env) = recording();
        let reducer = counter().debug("counter").environment(move |_| env.clone());

        let _ = reducer.reduce(&mut Counter::default(), CounterAction::Increment, &());

        let expected = [
            "counter: received action:",
            "  Increment",
            "  Counter {",
            "-     count: 0,",
            "+     count: 1,",
            "      label: \"\",",
            "  }",
        ]
        .join("\n");
        assert_eq!(*messages.lock(), vec![expected]);
    }

    #[test]
    fn test_labels_only_omits_payload() {
        let (messages, env) = recording();
        let reducer = counter()
            .debug("")
            .action_format(ActionFormat::LabelsOnly)
            .environment(move |_| env.clone());

        let _ = reducer.reduce(
            &mut Counter::default(),
            CounterAction::Rename {
                label: "Secret".into(),
            },
            &(),
        );

        let messages = messages.lock();
        let mut lines = messages[0].lines();
        assert_eq!(lines.next(), Some("received action:"));
        assert_eq!(lines.next(), Some("  Rename"));
        assert!(messages[0].contains("+     label: \"Secret\","));
    }

    #[test]
    fn test_case_labels_skip_strings_and_fields() {
        #[derive(Debug)]
        enum Inner {
            Named { id: u32, text: String },
            Pair(Option<u8>, bool),
        }

        assert_eq!(
            debug_case_labels(&Inner::Named {
                id: 1,
                text: "Has (Parens) and \"Quotes\"".into()
            }),
            "Named"
        );
        assert_eq!(debug_case_labels(&Inner::Pair(Some(1), true)), "Pair(Some)");
        assert_eq!(debug_case_labels(&Inner::Pair(None, false)), "Pair(None)");
        assert_eq!(debug_case_labels(&vec![1, 2]), "");
    }

    #[test]
    fn test_case_labels_drop_float_values() {
        #[derive(Debug)]
        enum Gauge {
            Set(f64),
        }

        assert_eq!(debug_case_labels(&Gauge::Set(f64::NAN)), "Set");
        assert_eq!(debug_case_labels(&Gauge::Set(f64::INFINITY)), "Set");
        assert_eq!(debug_case_labels(&Gauge::Set(-1.5e-3)), "Set");
    }
}
