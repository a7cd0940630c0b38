//! Shared state every worker of one run sees.

use crate::config::EngineConfig;
use crate::model::{Popcorn, PopcornSnapshot, Seat, SeatSnapshot, WorkerId};
use crate::observer::Observers;
use crate::stats::FinalStats;
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Longest uninterrupted sleep or lock wait; bounds how late a stop is seen.
const SLICE: Duration = Duration::from_millis(10);

/// Outcome of waiting for a pair lock.
pub(crate) enum Acquired<'a> {
    Held(MutexGuard<'a, ()>),
    TimedOut,
    Interrupted,
}

/// Seats, popcorns, their locks and the run-wide counters.
#[derive(Debug)]
pub struct BookingSystem {
    config: EngineConfig,
    seats: Vec<Seat>,
    popcorns: Vec<Popcorn>,
    seat_locks: Vec<Mutex<()>>,
    popcorn_locks: Vec<Mutex<()>>,
    booking_lock: Mutex<()>,
    claims: AtomicUsize,
    failed: AtomicUsize,
    stopped: AtomicBool,
    observers: Arc<Observers>,
}

impl BookingSystem {
    /// Build a fresh pool for `config`.
    #[must_use]
    pub fn new(config: EngineConfig, observers: Arc<Observers>) -> Self {
        let n = config.total_seats;
        Self {
            seats: (0..n).map(Seat::new).collect(),
            popcorns: (0..n).map(Popcorn::new).collect(),
            seat_locks: (0..n).map(|_| Mutex::new(())).collect(),
            popcorn_locks: (0..n).map(|_| Mutex::new(())).collect(),
            booking_lock: Mutex::new(()),
            claims: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            stopped: AtomicBool::new(false),
            config,
            observers,
        }
    }

    /// Run configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Live seats.
    #[must_use]
    pub fn seats(&self) -> &[Seat] {
        &self.seats
    }

    /// Live popcorns.
    #[must_use]
    pub fn popcorns(&self) -> &[Popcorn] {
        &self.popcorns
    }

    /// Point-in-time copies of every seat.
    #[must_use]
    pub fn seat_snapshots(&self) -> Vec<SeatSnapshot> {
        self.seats.iter().map(Seat::snapshot).collect()
    }

    /// Point-in-time copies of every popcorn.
    #[must_use]
    pub fn popcorn_snapshots(&self) -> Vec<PopcornSnapshot> {
        self.popcorns.iter().map(Popcorn::snapshot).collect()
    }

    /// Ask every worker to give up at its next checkpoint.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    /// Whether a stop was requested.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// The engine's account of the pool right now.
    #[must_use]
    pub fn final_stats(&self) -> FinalStats {
        FinalStats::compute(
            self.config.strategy(),
            self.config.total_threads,
            &self.seat_snapshots(),
            &self.popcorn_snapshots(),
            self.claims.load(Ordering::SeqCst),
            self.failed.load(Ordering::SeqCst),
        )
    }

    pub(crate) fn observers(&self) -> &Observers {
        &self.observers
    }

    pub(crate) fn booking_lock(&self) -> MutexGuard<'_, ()> {
        self.booking_lock.lock()
    }

    pub(crate) fn seat_lock(&self, index: usize) -> &Mutex<()> {
        &self.seat_locks[index]
    }

    pub(crate) fn popcorn_lock(&self, index: usize) -> &Mutex<()> {
        &self.popcorn_locks[index]
    }

    pub(crate) fn record_claim(&self) {
        self.claims.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn booking_failed(&self, worker: WorkerId) {
        self.failed.fetch_add(1, Ordering::SeqCst);
        self.observers.booking_failed(worker);
    }

    /// Sleep for `duration` in slices; `false` if a stop arrived meanwhile.
    pub(crate) fn pause(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_stopped() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep((deadline - now).min(SLICE));
        }
    }

    /// Wait for `lock` until `deadline` (forever when `None`) or a stop.
    pub(crate) fn acquire<'a>(&self, lock: &'a Mutex<()>, deadline: Option<Instant>) -> Acquired<'a> {
        loop {
            if self.is_stopped() {
                return Acquired::Interrupted;
            }
            let slice = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Acquired::TimedOut;
                    }
                    (deadline - now).min(SLICE)
                }
                None => SLICE,
            };
            if let Some(guard) = lock.try_lock_for(slice) {
                return Acquired::Held(guard);
            }
        }
    }
}
