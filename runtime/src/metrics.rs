//! Prometheus metrics for observability and monitoring.
//!
//! This module provides metric collection for:
//! - Store command throughput and reducer latency
//! - Effect execution
//! - Simulation event reconciliation and run outcomes
//!
//! # Example
//!
//! ```rust,no_run
//! use seatrace_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

// Re-export metrics macros for use in other modules
pub use metrics::{counter, gauge, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus metrics recorder.
///
/// Installs the global recorder; [`MetricsServer::render`] produces the
/// exposition text served at `addr` by the embedding process.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server.
    ///
    /// # Arguments
    ///
    /// * `addr` - Socket address to bind to (e.g., `0.0.0.0:9090`)
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Register metric descriptions and install the Prometheus exporter.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed.
    ///
    /// # Note
    ///
    /// If a metrics recorder is already installed (e.g., in tests), this logs a
    /// warning and leaves the existing recorder in place.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[
                    0.000_01, 0.000_05, 0.000_1, 0.000_5, 0.001, 0.005, 0.01, 0.05, 0.1,
                ],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!(
                    addr = %self.addr,
                    "Metrics recorder installed for http://{}/metrics",
                    self.addr
                );
                Ok(())
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if server hasn't been started.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    // Store Metrics
    describe_counter!(
        "store.commands.total",
        "Total number of actions sent to stores"
    );
    describe_histogram!(
        "store.reducer.duration_seconds",
        "Time taken to apply one action"
    );
    describe_counter!(
        "store.effects.executed",
        "Total number of effects executed, by type"
    );

    // Simulation Metrics
    describe_counter!(
        "simulation.events.applied",
        "Engine events applied to the canonical snapshot, by kind"
    );
    describe_counter!(
        "simulation.events.dropped",
        "Engine events ignored by the reconciler, by reason"
    );
    describe_counter!(
        "simulation.runs.finished",
        "Simulation runs that reached a terminal state, by outcome"
    );
    describe_gauge!(
        "simulation.progress",
        "Completed worker threads in the current run"
    );
    describe_histogram!(
        "simulation.run.duration_seconds",
        "Wall time of a simulation run"
    );
}

/// Simulation metrics recorder.
pub struct SimulationMetrics;

impl SimulationMetrics {
    /// Record an engine event applied to the snapshot.
    pub fn record_applied(kind: &'static str) {
        counter!("simulation.events.applied", "kind" => kind).increment(1);
    }

    /// Record an engine event the reconciler ignored.
    pub fn record_dropped(reason: &'static str) {
        counter!("simulation.events.dropped", "reason" => reason).increment(1);
    }

    /// Record a run reaching a terminal state.
    pub fn record_finished(outcome: &'static str) {
        counter!("simulation.runs.finished", "outcome" => outcome).increment(1);
    }

    /// Record current progress.
    #[allow(clippy::cast_precision_loss)] // progress never exceeds the worker count
    pub fn record_progress(completed: usize) {
        gauge!("simulation.progress").set(completed as f64);
    }

    /// Record how long a run took.
    pub fn record_duration(duration: Duration) {
        histogram!("simulation.run.duration_seconds").record(duration.as_secs_f64());
    }
}
