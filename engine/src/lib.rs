//! # Seatrace Engine
//!
//! A thread-per-worker seat booking engine.
//!
//! Each run spawns `total_threads` OS threads that compete for a pool of
//! seats (and, in deadlock mode, a paired popcorn per seat) under one of four
//! [`Strategy`] disciplines. Everything the workers do is reported through
//! the [`BookingObserver`] contract; the engine itself keeps no history.
//!
//! ## Example
//!
//! ```no_run
//! use seatrace_engine::{BookingEngine, EngineConfig, Mode, ThreadedEngine};
//!
//! # fn example() -> Result<(), seatrace_engine::EngineError> {
//! let engine = ThreadedEngine::new(EngineConfig::for_mode(Mode::Unsafe))?;
//! let stats = engine.run()?;
//! println!("{} claims for {} seats", stats.claims, stats.total_seats);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod model;
pub mod observer;
pub mod stats;
pub mod strategy;
pub mod system;
pub mod thread_manager;

pub use config::EngineConfig;
pub use error::EngineError;
pub use model::{Popcorn, PopcornSnapshot, Seat, SeatSnapshot, WorkerId};
pub use observer::{BookingObserver, Observers};
pub use stats::FinalStats;
pub use strategy::{Mode, Strategy};
pub use system::BookingSystem;
pub use thread_manager::ThreadManager;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Control surface of a booking engine.
///
/// `run` blocks the calling thread until the run ends, so callers put it on
/// a dedicated or blocking-pool thread. Every other method returns promptly.
pub trait BookingEngine: Send + Sync {
    /// Register an observer. Observers added after `run` started may miss events.
    fn add_observer(&self, observer: Box<dyn BookingObserver>);

    /// Execute the run: spawn and join every worker.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Cancelled`] if [`stop_all_threads`](Self::stop_all_threads)
    /// was called, or another [`EngineError`] if the run itself failed.
    fn run(&self) -> Result<FinalStats, EngineError>;

    /// Ask every worker to stop at its next checkpoint. Does not wait.
    fn stop_all_threads(&self);

    /// Copies of the seat pool.
    fn seats(&self) -> Vec<SeatSnapshot>;

    /// Copies of the popcorn pool.
    fn popcorns(&self) -> Vec<PopcornSnapshot>;

    /// Popcorns currently reserved.
    fn popcorns_reserved(&self) -> usize {
        self.popcorns().iter().filter(|p| p.reserved).count()
    }
}

/// Creates engines for the orchestrator, one per run.
pub trait EngineFactory: Send + Sync {
    /// Build an engine for `config`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConfig`] if `config` cannot run.
    fn create(&self, config: EngineConfig) -> Result<Arc<dyn BookingEngine>, EngineError>;
}

/// The real engine: one OS thread per worker.
#[derive(Debug)]
pub struct ThreadedEngine {
    system: Arc<BookingSystem>,
    observers: Arc<Observers>,
    started: AtomicBool,
}

impl ThreadedEngine {
    /// Build an engine with a fresh seat pool.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConfig`] if `config` fails validation.
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let observers = Arc::new(Observers::default());
        Ok(Self {
            system: Arc::new(BookingSystem::new(config, Arc::clone(&observers))),
            observers,
            started: AtomicBool::new(false),
        })
    }

    /// The shared pool.
    #[must_use]
    pub fn system(&self) -> &BookingSystem {
        &self.system
    }
}

impl BookingEngine for ThreadedEngine {
    fn add_observer(&self, observer: Box<dyn BookingObserver>) {
        self.observers.add(observer);
    }

    fn run(&self) -> Result<FinalStats, EngineError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(EngineError::AlreadyRunning);
        }
        ThreadManager::new(Arc::clone(&self.system)).run()
    }

    fn stop_all_threads(&self) {
        tracing::debug!("Stop requested for all booking threads");
        self.system.stop();
    }

    fn seats(&self) -> Vec<SeatSnapshot> {
        self.system.seat_snapshots()
    }

    fn popcorns(&self) -> Vec<PopcornSnapshot> {
        self.system.popcorn_snapshots()
    }
}

/// Factory for [`ThreadedEngine`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadedEngineFactory;

impl EngineFactory for ThreadedEngineFactory {
    fn create(&self, config: EngineConfig) -> Result<Arc<dyn BookingEngine>, EngineError> {
        Ok(Arc::new(ThreadedEngine::new(config)?))
    }
}
