//! Engine configuration.

use crate::error::EngineError;
use crate::strategy::{Mode, Strategy};

/// Everything an engine needs to run one simulation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Seats (and popcorns) in the pool
    pub total_seats: usize,
    /// Competing worker threads
    pub total_threads: usize,
    /// Selected mode
    pub mode: Mode,
    /// Take the seat lock before the popcorn lock (deadlock mode only)
    pub lock_order: bool,
    /// Base delay before an unguarded claim, in milliseconds
    pub delay_ms: u64,
    /// Pause between taking the first and second lock of a pair, in milliseconds
    pub lock_acquisition_delay_ms: u64,
    /// How long a worker waits for the second lock before it is declared stuck
    pub deadlock_timeout_ms: u64,
    /// Interval between progress updates, in milliseconds
    pub progress_interval_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            total_seats: 100,
            total_threads: 1000,
            mode: Mode::Safe,
            lock_order: false,
            delay_ms: 2,
            lock_acquisition_delay_ms: 5,
            deadlock_timeout_ms: 5000,
            progress_interval_ms: 100,
        }
    }
}

impl EngineConfig {
    /// Default configuration for `mode`.
    #[must_use]
    pub fn for_mode(mode: Mode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    /// The strategy implied by mode and lock order.
    #[must_use]
    pub const fn strategy(&self) -> Strategy {
        Strategy::for_mode(self.mode, self.lock_order)
    }

    /// Set the pool size.
    #[must_use]
    pub const fn with_seats(mut self, total_seats: usize) -> Self {
        self.total_seats = total_seats;
        self
    }

    /// Set the worker count.
    #[must_use]
    pub const fn with_threads(mut self, total_threads: usize) -> Self {
        self.total_threads = total_threads;
        self
    }

    /// Set the lock-order flag.
    #[must_use]
    pub const fn with_lock_order(mut self, lock_order: bool) -> Self {
        self.lock_order = lock_order;
        self
    }

    /// Set the unguarded-claim delay.
    #[must_use]
    pub const fn with_delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    /// Set the pause between the two locks of a pair.
    #[must_use]
    pub const fn with_lock_acquisition_delay_ms(mut self, delay_ms: u64) -> Self {
        self.lock_acquisition_delay_ms = delay_ms;
        self
    }

    /// Set the second-lock timeout.
    #[must_use]
    pub const fn with_deadlock_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.deadlock_timeout_ms = timeout_ms;
        self
    }

    /// Set the progress interval.
    #[must_use]
    pub const fn with_progress_interval_ms(mut self, interval_ms: u64) -> Self {
        self.progress_interval_ms = interval_ms;
        self
    }

    /// Reject configurations that cannot run.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConfig`] for an empty pool, no workers,
    /// or a zero progress interval.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.total_seats == 0 {
            return Err(EngineError::InvalidConfig("total_seats must be > 0".into()));
        }
        if self.total_threads == 0 {
            return Err(EngineError::InvalidConfig("total_threads must be > 0".into()));
        }
        if self.progress_interval_ms == 0 {
            return Err(EngineError::InvalidConfig(
                "progress_interval_ms must be > 0".into(),
            ));
        }
        Ok(())
    }
}
