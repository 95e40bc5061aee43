//! Prometheus metrics for observability and monitoring.
//!
//! This module provides metric collection for the store runtime:
//! - Actions processed by stores
//! - Effects started and currently in flight
//! - Effects cancelled through the cancellation registry
//!
//! # Example
//!
//! ```rust,no_run
//! use composable_arch_runtime::metrics::install_recorder;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let metrics = install_recorder()?;
//!
//! // ... run stores ...
//!
//! if let Some(text) = metrics.render() {
//!     println!("{text}");
//! }
//! # Ok(())
//! # }
//! ```

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use thiserror::Error;

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus recorder for store metrics.
///
/// Renders the Prometheus text format on demand; serving it over HTTP is
/// left to the application.
#[derive(Default)]
pub struct PrometheusMetrics {
    handle: Option<PrometheusHandle>,
}

impl PrometheusMetrics {
    /// Create an uninstalled recorder.
    #[must_use]
    pub const fn new() -> Self {
        Self { handle: None }
    }

    /// Describe all store metrics and install the Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the metrics exporter cannot be installed.
    ///
    /// # Note
    ///
    /// If a metrics recorder is already installed (e.g., in tests), this
    /// succeeds without a handle and [`render`](Self::render) returns `None`.
    pub fn install(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!("Prometheus metrics recorder installed");
                Ok(())
            },
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            },
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if this instance did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Install the Prometheus recorder and return it.
///
/// # Errors
///
/// See [`PrometheusMetrics::install`].
pub fn install_recorder() -> Result<PrometheusMetrics, MetricsError> {
    let mut metrics = PrometheusMetrics::new();
    metrics.install()?;
    Ok(metrics)
}

/// Register all metric descriptions.
fn register_metrics() {
    describe_counter!(
        "store_actions_processed_total",
        "Total number of actions processed by stores"
    );
    describe_counter!(
        "store_effects_started_total",
        "Total number of non-empty effects subscribed by stores"
    );
    describe_gauge!(
        "store_effects_in_flight",
        "Number of effects currently running in a store"
    );
    describe_counter!(
        "effects_cancelled_total",
        "Total number of effect subscriptions cancelled by id"
    );
}

/// Store metrics recorder.
pub struct StoreMetrics;

impl StoreMetrics {
    /// Record an action processed.
    pub fn record_action() {
        counter!("store_actions_processed_total").increment(1);
    }

    /// Record an effect subscription.
    pub fn record_effect_started() {
        counter!("store_effects_started_total").increment(1);
    }

    /// Record the number of effects currently in flight.
    #[allow(clippy::cast_precision_loss)] // Effect counts stay far below 2^52
    pub fn record_in_flight(count: usize) {
        gauge!("store_effects_in_flight").set(count as f64);
    }
}
