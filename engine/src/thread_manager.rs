//! Spawns, monitors and joins the worker threads of one run.

use crate::error::EngineError;
use crate::stats::FinalStats;
use crate::system::BookingSystem;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Counts a worker as finished even if its attempt panics.
struct FinishGuard<'a>(&'a AtomicUsize);

impl Drop for FinishGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// Drives one run of a [`BookingSystem`] to completion.
pub struct ThreadManager {
    system: Arc<BookingSystem>,
    finished: Arc<AtomicUsize>,
}

impl ThreadManager {
    /// Create a manager for `system`.
    #[must_use]
    pub fn new(system: Arc<BookingSystem>) -> Self {
        Self {
            system,
            finished: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Run every worker and block until all have been joined.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Spawn`] if a worker or the monitor cannot be spawned
    /// - [`EngineError::WorkerPanicked`] if any worker panicked
    /// - [`EngineError::Cancelled`] if a stop was requested during the run
    pub fn run(&self) -> Result<FinalStats, EngineError> {
        let config = self.system.config().clone();
        let total = config.total_threads;
        let strategy = config.strategy();

        tracing::info!(total, %strategy, seats = config.total_seats, "Starting booking run");
        self.system.observers().simulation_started(total, strategy);

        let monitor_done = Arc::new(AtomicBool::new(false));
        let monitor = self.spawn_monitor(Arc::clone(&monitor_done), config.progress_interval_ms)?;

        let mut workers = Vec::with_capacity(total);
        let mut spawn_error = None;
        for worker in 0..total {
            match self.spawn_worker(worker) {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    self.system.stop();
                    spawn_error = Some(EngineError::Spawn(e.to_string()));
                    break;
                }
            }
        }

        let panicked = workers
            .into_iter()
            .map(JoinHandle::join)
            .filter(Result::is_err)
            .count();

        monitor_done.store(true, Ordering::SeqCst);
        if monitor.join().is_err() {
            tracing::warn!("Progress monitor panicked");
        }

        if let Some(error) = spawn_error {
            return Err(error);
        }
        if panicked > 0 {
            tracing::error!(panicked, "Worker threads panicked");
            return Err(EngineError::WorkerPanicked(panicked));
        }
        if self.system.is_stopped() {
            tracing::info!(
                finished = self.finished.load(Ordering::SeqCst),
                total,
                "Booking run cancelled"
            );
            return Err(EngineError::Cancelled);
        }

        self.system.observers().progress_update(0, total, total);

        let stats = self.system.final_stats();
        tracing::info!(
            seats_booked = stats.seats_booked,
            collisions = stats.collisions,
            deadlocks = stats.deadlocks,
            "Booking run completed"
        );
        self.system.observers().simulation_completed(&stats);
        Ok(stats)
    }

    fn spawn_worker(&self, worker: usize) -> std::io::Result<JoinHandle<()>> {
        let system = Arc::clone(&self.system);
        let finished = Arc::clone(&self.finished);
        thread::Builder::new()
            .name(format!("booking-thread-{worker}"))
            .spawn(move || {
                let _finish = FinishGuard(&finished);
                if system.is_stopped() {
                    return;
                }
                system.observers().thread_started(worker);
                system.config().strategy().execute(&system, worker);
                system.observers().thread_completed(worker);
            })
    }

    fn spawn_monitor(
        &self,
        done: Arc<AtomicBool>,
        interval_ms: u64,
    ) -> Result<JoinHandle<()>, EngineError> {
        let system = Arc::clone(&self.system);
        let finished = Arc::clone(&self.finished);
        let total = system.config().total_threads;
        let interval = Duration::from_millis(interval_ms);

        thread::Builder::new()
            .name("booking-progress".into())
            .spawn(move || {
                while !done.load(Ordering::SeqCst) && !system.is_stopped() {
                    let completed = finished.load(Ordering::SeqCst).min(total);
                    system.observers().progress_update(total - completed, completed, total);
                    if !system.pause(interval) {
                        break;
                    }
                }
            })
            .map_err(|e| EngineError::Spawn(e.to_string()))
    }
}
