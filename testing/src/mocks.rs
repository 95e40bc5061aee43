//! Recording collaborators for debug and signpost output.

use composable_arch_core::debug::DebugEnvironment;
use composable_arch_core::signpost::{AnyTracer, Tracer};
use parking_lot::Mutex;
use std::sync::Arc;

/// Printer that keeps every message it is handed
///
/// # Example
///
/// ```
/// use composable_arch_testing::mocks::RecordingPrinter;
///
/// let printer = RecordingPrinter::new();
/// printer.environment().print("hello");
/// assert_eq!(printer.messages(), vec!["hello".to_string()]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct RecordingPrinter {
    messages: Arc<Mutex<Vec<String>>>,
}

impl RecordingPrinter {
    /// Create an empty printer
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A debug environment printing into this recorder
    #[must_use]
    pub fn environment(&self) -> DebugEnvironment {
        let messages = Arc::clone(&self.messages);
        DebugEnvironment::new(move |message| messages.lock().push(message.to_owned()))
    }

    /// Everything printed so far
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }
}

/// One marker received by a [`RecordingTracer`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Marker {
    /// Interval start
    Begin {
        /// Interval name
        name: &'static str,
        /// Interval id
        id: u64,
        /// Attached message
        message: String,
    },
    /// Interval end
    End {
        /// Interval name
        name: &'static str,
        /// Interval id
        id: u64,
        /// Attached message
        message: String,
    },
    /// Point event
    Event {
        /// Interval name
        name: &'static str,
        /// Interval id
        id: u64,
        /// Attached message
        message: String,
    },
}

/// Tracer that records markers in order
#[derive(Debug, Clone)]
pub struct RecordingTracer {
    enabled: bool,
    markers: Arc<Mutex<Vec<Marker>>>,
}

impl RecordingTracer {
    /// An enabled recorder
    #[must_use]
    pub fn new() -> Self {
        Self {
            enabled: true,
            markers: Arc::default(),
        }
    }

    /// A recorder reporting itself as disabled
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            markers: Arc::default(),
        }
    }

    /// Type-erased handle sharing this recorder's markers
    #[must_use]
    pub fn any(&self) -> AnyTracer {
        Arc::new(self.clone())
    }

    /// Markers recorded so far
    #[must_use]
    pub fn markers(&self) -> Vec<Marker> {
        self.markers.lock().clone()
    }
}

impl Default for RecordingTracer {
    fn default() -> Self {
        Self::new()
    }
}

impl Tracer for RecordingTracer {
    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn begin(&self, name: &'static str, id: u64, message: &str) {
        self.markers.lock().push(Marker::Begin {
            name,
            id,
            message: message.to_owned(),
        });
    }

    fn end(&self, name: &'static str, id: u64, message: &str) {
        self.markers.lock().push(Marker::End {
            name,
            id,
            message: message.to_owned(),
        });
    }

    fn event(&self, name: &'static str, id: u64, message: &str) {
        self.markers.lock().push(Marker::Event {
            name,
            id,
            message: message.to_owned(),
        });
    }
}
