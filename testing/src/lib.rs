//! # Composable Arch Testing
//!
//! Testing utilities and helpers for the Composable Arch architecture.
//!
//! This crate provides:
//! - [`TestStore`]: exhaustive, step-by-step assertions on state and on every
//!   action effects feed back
//! - [`ReducerTest`]: Given-When-Then checks of a single reduce call
//! - Recording printer and tracer for debug and signpost output
//! - Test tracing setup
//!
//! Virtual time comes from
//! [`TestScheduler`](composable_arch_core::scheduler::TestScheduler), re-exported
//! here for convenience.

pub mod mocks;
pub mod test_store;

pub use composable_arch_core::scheduler::TestScheduler;
pub use mocks::{Marker, RecordingPrinter, RecordingTracer};
pub use reducer_test::{ReducerTest, assertions};
pub use test_store::{Step, TestStore};

use std::sync::Once;

static TRACING: Once = Once::new();

/// Install a `tracing` subscriber writing through the test harness.
///
/// Honours `RUST_LOG`; defaults to `debug` for the workspace crates. Safe to
/// call from every test.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::new(
                "composable_arch_core=debug,composable_arch_runtime=debug,composable_arch_testing=debug",
            )
        });

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}
