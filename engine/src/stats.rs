//! Final statistics computed by the engine at the end of a run.

use crate::model::{PopcornSnapshot, SeatSnapshot};
use crate::strategy::Strategy;
use serde::{Deserialize, Serialize};

/// The engine's own account of a finished run.
///
/// Seat counters come from the final seat pool; `claims` and `failed` are
/// counted by the workers as they go, so `oversold` reflects every claim the
/// engine handed out, including ones the seat pool alone cannot show.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalStats {
    /// Strategy the run used
    pub strategy: Option<Strategy>,
    /// Seats in the pool
    pub total_seats: usize,
    /// Workers spawned
    pub total_threads: usize,
    /// Seats claimed at least once
    pub seats_booked: usize,
    /// Seats claimed by exactly one worker
    pub successful_bookings: usize,
    /// Seats claimed by more than one worker
    pub collisions: usize,
    /// Claims handed out to workers
    pub claims: usize,
    /// Claims beyond the number of seats actually booked
    pub oversold: usize,
    /// Failed attempts
    pub failed: usize,
    /// Seat + popcorn pairs completed
    pub pairs_complete: usize,
    /// Pairs that ended deadlocked
    pub deadlocks: usize,
    /// Workers stuck on deadlocked pairs
    pub threads_stuck: usize,
    /// Popcorns reserved
    pub popcorns_reserved: usize,
}

impl FinalStats {
    /// Compute the final account from the pool and the worker counters.
    #[must_use]
    pub fn compute(
        strategy: Strategy,
        total_threads: usize,
        seats: &[SeatSnapshot],
        popcorns: &[PopcornSnapshot],
        claims: usize,
        failed: usize,
    ) -> Self {
        let seats_booked = seats.iter().filter(|s| s.booked).count();
        let deadlocked: Vec<&SeatSnapshot> = seats.iter().filter(|s| s.deadlocked).collect();

        Self {
            strategy: Some(strategy),
            total_seats: seats.len(),
            total_threads,
            seats_booked,
            successful_bookings: seats
                .iter()
                .filter(|s| s.booked && !s.collision && !s.deadlocked)
                .count(),
            collisions: seats.iter().filter(|s| s.collision).count(),
            claims,
            oversold: claims.saturating_sub(seats_booked),
            failed,
            pairs_complete: seats.iter().filter(|s| s.booked && !s.deadlocked).count(),
            deadlocks: deadlocked.len(),
            threads_stuck: deadlocked.iter().map(|s| s.thread_ids.len()).sum(),
            popcorns_reserved: popcorns.iter().filter(|p| p.reserved).count(),
        }
    }
}
