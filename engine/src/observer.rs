//! Observer contract between the engine and whoever watches it.
//!
//! Callbacks arrive on worker threads, possibly many at once. The engine
//! never holds a seat or popcorn data lock while notifying, so an observer
//! may call [`Seat::snapshot`] from inside a callback.

use crate::model::{Popcorn, Seat, WorkerId};
use crate::stats::FinalStats;
use crate::strategy::Strategy;
use parking_lot::RwLock;

/// Receives engine events.
///
/// Implementations must return quickly; the calling worker is blocked for
/// the duration of the callback.
pub trait BookingObserver: Send + Sync {
    /// A run is about to spawn `total_threads` workers.
    fn on_simulation_started(&self, total_threads: usize, strategy: Strategy);

    /// `worker` claimed `seat`.
    fn on_seat_booked(&self, seat: &Seat, worker: WorkerId);

    /// `seat` was claimed by more than one worker.
    fn on_collision_detected(&self, seat: &Seat);

    /// `worker` found nothing to book.
    fn on_booking_failed(&self, worker: WorkerId);

    /// `worker` began its attempt.
    fn on_thread_started(&self, worker: WorkerId);

    /// `worker` finished its attempt.
    fn on_thread_completed(&self, worker: WorkerId);

    /// Periodic progress from the monitor thread.
    fn on_progress_update(&self, active: usize, completed: usize, total: usize);

    /// Every worker finished; `stats` is the engine's own count.
    fn on_simulation_completed(&self, stats: &FinalStats);

    /// `worker` timed out waiting for the second lock of a pair.
    fn on_deadlock_detected(&self, _seat: &Seat, _popcorn: &Popcorn, _worker: WorkerId) {}

    /// `worker` holds both the seat and its popcorn.
    fn on_pair_complete(&self, _seat: &Seat, _popcorn: &Popcorn, _worker: WorkerId) {}

    /// `worker` waited `wait_ms` before giving up.
    fn on_thread_stuck(&self, _worker: WorkerId, _wait_ms: u64) {}
}

/// Registered observers, notified in registration order.
#[derive(Default)]
pub struct Observers {
    observers: RwLock<Vec<Box<dyn BookingObserver>>>,
}

impl std::fmt::Debug for Observers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observers")
            .field("count", &self.observers.read().len())
            .finish()
    }
}

impl Observers {
    /// Register an observer.
    pub fn add(&self, observer: Box<dyn BookingObserver>) {
        self.observers.write().push(observer);
    }

    /// Number of registered observers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.observers.read().len()
    }

    /// Whether no observer is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observers.read().is_empty()
    }

    fn each(&self, f: impl Fn(&dyn BookingObserver)) {
        for observer in self.observers.read().iter() {
            f(observer.as_ref());
        }
    }

    pub(crate) fn simulation_started(&self, total_threads: usize, strategy: Strategy) {
        self.each(|o| o.on_simulation_started(total_threads, strategy));
    }

    pub(crate) fn seat_booked(&self, seat: &Seat, worker: WorkerId) {
        self.each(|o| o.on_seat_booked(seat, worker));
    }

    pub(crate) fn collision_detected(&self, seat: &Seat) {
        self.each(|o| o.on_collision_detected(seat));
    }

    pub(crate) fn booking_failed(&self, worker: WorkerId) {
        self.each(|o| o.on_booking_failed(worker));
    }

    pub(crate) fn thread_started(&self, worker: WorkerId) {
        self.each(|o| o.on_thread_started(worker));
    }

    pub(crate) fn thread_completed(&self, worker: WorkerId) {
        self.each(|o| o.on_thread_completed(worker));
    }

    pub(crate) fn progress_update(&self, active: usize, completed: usize, total: usize) {
        self.each(|o| o.on_progress_update(active, completed, total));
    }

    pub(crate) fn simulation_completed(&self, stats: &FinalStats) {
        self.each(|o| o.on_simulation_completed(stats));
    }

    pub(crate) fn deadlock_detected(&self, seat: &Seat, popcorn: &Popcorn, worker: WorkerId) {
        self.each(|o| o.on_deadlock_detected(seat, popcorn, worker));
    }

    pub(crate) fn pair_complete(&self, seat: &Seat, popcorn: &Popcorn, worker: WorkerId) {
        self.each(|o| o.on_pair_complete(seat, popcorn, worker));
    }

    pub(crate) fn thread_stuck(&self, worker: WorkerId, wait_ms: u64) {
        self.each(|o| o.on_thread_stuck(worker, wait_ms));
    }
}
