//! Configuration management for the simulation.
//!
//! Loads settings from `SEATRACE_*` environment variables with defaults
//! matching the classic demo: 100 seats, 1000 workers, safe mode.

use crate::model::{Mode, RunConfig, TOTAL_SEATS, TOTAL_THREADS};
use seatrace_engine::EngineConfig;
use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use thiserror::Error;

/// Errors from settings validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SettingsError {
    /// A value is out of its allowed range
    #[error("Invalid setting {key}: {reason}")]
    Invalid {
        /// Setting name
        key: &'static str,
        /// Why it was rejected
        reason: String,
    },
}

/// Simulation settings loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationSettings {
    /// Seats in the pool
    pub total_seats: usize,
    /// Competing worker threads
    pub total_threads: usize,
    /// Initial mode
    pub mode: Mode,
    /// Base delay of an unguarded claim, in milliseconds
    pub delay_ms: u64,
    /// Lock the seat before the popcorn in deadlock mode
    pub lock_order: bool,
    /// Pause between the two locks of a pair, in milliseconds
    pub lock_acquisition_delay_ms: u64,
    /// Second-lock timeout before a worker counts as stuck, in milliseconds
    pub deadlock_timeout_ms: u64,
    /// Interval between engine progress reports, in milliseconds
    pub progress_interval_ms: u64,
    /// Address for the Prometheus exporter, if metrics are wanted
    pub metrics_addr: Option<SocketAddr>,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            total_seats: TOTAL_SEATS,
            total_threads: TOTAL_THREADS,
            mode: Mode::Safe,
            delay_ms: 2,
            lock_order: false,
            lock_acquisition_delay_ms: 5,
            deadlock_timeout_ms: 5000,
            progress_interval_ms: 100,
            metrics_addr: None,
        }
    }
}

impl SimulationSettings {
    /// Load settings from environment variables.
    ///
    /// Unset variables take their default; malformed ones are logged and
    /// also take their default.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError`] if the resulting settings fail [`validate`](Self::validate).
    pub fn from_env() -> Result<Self, SettingsError> {
        let defaults = Self::default();
        let settings = Self {
            total_seats: var_or("SEATRACE_SEATS", defaults.total_seats),
            total_threads: var_or("SEATRACE_THREADS", defaults.total_threads),
            mode: var_or("SEATRACE_MODE", defaults.mode),
            delay_ms: var_or("SEATRACE_DELAY_MS", defaults.delay_ms),
            lock_order: var_or("SEATRACE_LOCK_ORDER", defaults.lock_order),
            lock_acquisition_delay_ms: var_or(
                "SEATRACE_LOCK_DELAY_MS",
                defaults.lock_acquisition_delay_ms,
            ),
            deadlock_timeout_ms: var_or(
                "SEATRACE_DEADLOCK_TIMEOUT_MS",
                defaults.deadlock_timeout_ms,
            ),
            progress_interval_ms: var_or(
                "SEATRACE_PROGRESS_INTERVAL_MS",
                defaults.progress_interval_ms,
            ),
            metrics_addr: env::var("SEATRACE_METRICS_ADDR")
                .ok()
                .and_then(|raw| parse_logged("SEATRACE_METRICS_ADDR", &raw)),
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Reject settings that cannot produce a run.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::Invalid`] for an empty pool, no workers, or a
    /// zero progress interval.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.total_seats == 0 {
            return Err(SettingsError::Invalid {
                key: "total_seats",
                reason: "must be at least 1".into(),
            });
        }
        if self.total_threads == 0 {
            return Err(SettingsError::Invalid {
                key: "total_threads",
                reason: "must be at least 1".into(),
            });
        }
        if self.progress_interval_ms == 0 {
            return Err(SettingsError::Invalid {
                key: "progress_interval_ms",
                reason: "must be at least 1ms".into(),
            });
        }
        Ok(())
    }

    /// The user-changeable part of the settings.
    #[must_use]
    pub const fn run_config(&self) -> RunConfig {
        RunConfig {
            delay_ms: self.delay_ms,
            lock_order: self.lock_order,
        }
    }

    /// Engine configuration for a run with `mode` and `config`.
    #[must_use]
    pub const fn engine_config(&self, mode: Mode, config: RunConfig) -> EngineConfig {
        EngineConfig {
            total_seats: self.total_seats,
            total_threads: self.total_threads,
            mode,
            lock_order: config.lock_order,
            delay_ms: config.delay_ms,
            lock_acquisition_delay_ms: self.lock_acquisition_delay_ms,
            deadlock_timeout_ms: self.deadlock_timeout_ms,
            progress_interval_ms: self.progress_interval_ms,
        }
    }
}

fn var_or<T: FromStr>(key: &'static str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|raw| parse_logged(key, &raw))
        .unwrap_or(default)
}

fn parse_logged<T: FromStr>(key: &'static str, raw: &str) -> Option<T> {
    let parsed = raw.trim().parse().ok();
    if parsed.is_none() {
        tracing::warn!(key, value = raw, "Ignoring malformed setting, using default");
    }
    parsed
}
