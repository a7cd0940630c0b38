//! Booking strategies.
//!
//! A [`Strategy`] is the concurrency discipline every worker applies when it
//! tries to claim a seat. The engine selects one per run from the user-facing
//! [`Mode`] and the lock-order flag.

use crate::model::WorkerId;
use crate::system::{Acquired, BookingSystem};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

/// User-facing simulation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Mutually exclusive booking; never double-books
    #[default]
    Safe,
    /// Unsynchronized booking; double-booking is expected
    Unsafe,
    /// Seat + popcorn pairs locked in two steps
    Deadlock,
}

impl Mode {
    /// All modes in display order.
    pub const ALL: [Self; 3] = [Self::Safe, Self::Unsafe, Self::Deadlock];

    /// Whether this mode reports pair/deadlock counters instead of booking counters.
    #[must_use]
    pub const fn is_deadlock(self) -> bool {
        matches!(self, Self::Deadlock)
    }

    /// Lowercase name, as accepted on the command line and in the environment.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Safe => "safe",
            Self::Unsafe => "unsafe",
            Self::Deadlock => "deadlock",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "safe" | "synchronized" => Ok(Self::Safe),
            "unsafe" | "race" => Ok(Self::Unsafe),
            "deadlock" => Ok(Self::Deadlock),
            other => Err(format!("unknown mode '{other}'")),
        }
    }
}

/// Concurrency discipline applied by each worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// One global booking lock; first empty seat wins
    Synchronized,
    /// Random empty seat, claimed after an unguarded delay
    RaceCondition,
    /// Seat and popcorn locked in random order with a timeout on the second
    Deadlock,
    /// Seat and popcorn locked in global order (seat first)
    DeadlockPrevention,
}

impl Strategy {
    /// Select the strategy for a mode.
    ///
    /// `lock_order` only matters in [`Mode::Deadlock`].
    #[must_use]
    pub const fn for_mode(mode: Mode, lock_order: bool) -> Self {
        match mode {
            Mode::Safe => Self::Synchronized,
            Mode::Unsafe => Self::RaceCondition,
            Mode::Deadlock if lock_order => Self::DeadlockPrevention,
            Mode::Deadlock => Self::Deadlock,
        }
    }

    /// The mode this strategy belongs to.
    #[must_use]
    pub const fn mode(self) -> Mode {
        match self {
            Self::Synchronized => Mode::Safe,
            Self::RaceCondition => Mode::Unsafe,
            Self::Deadlock | Self::DeadlockPrevention => Mode::Deadlock,
        }
    }

    /// Short human-readable label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Synchronized => "synchronized",
            Self::RaceCondition => "race condition",
            Self::Deadlock => "deadlock-prone",
            Self::DeadlockPrevention => "lock-ordered",
        }
    }

    /// Run one booking attempt for `worker`.
    pub(crate) fn execute(self, system: &BookingSystem, worker: WorkerId) {
        match self {
            Self::Synchronized => book_synchronized(system, worker),
            Self::RaceCondition => book_racing(system, worker),
            Self::Deadlock => book_pair(system, worker, rand::thread_rng().gen_bool(0.5)),
            Self::DeadlockPrevention => book_pair(system, worker, true),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ============================================================================
// Booking modes
// ============================================================================

fn book_synchronized(system: &BookingSystem, worker: WorkerId) {
    let claimed = {
        let _booking = system.booking_lock();
        system.seats().iter().find(|seat| seat.try_claim_empty(worker))
    };

    match claimed {
        Some(seat) => {
            system.record_claim();
            system.observers().seat_booked(seat, worker);
        }
        None => system.booking_failed(worker),
    }
}

fn book_racing(system: &BookingSystem, worker: WorkerId) {
    let empty: Vec<usize> = system
        .seats()
        .iter()
        .enumerate()
        .filter(|(_, seat)| !seat.is_booked())
        .map(|(index, _)| index)
        .collect();

    if empty.is_empty() {
        system.booking_failed(worker);
        return;
    }

    let (target, jitter) = {
        let mut rng = rand::thread_rng();
        (empty[rng.gen_range(0..empty.len())], rng.gen_range(0..2))
    };

    let delay = Duration::from_millis(system.config().delay_ms + jitter);
    if !system.pause(delay) {
        system.booking_failed(worker);
        return;
    }

    let seat = &system.seats()[target];
    let collided = seat.claim_unguarded(worker);
    system.record_claim();

    if collided {
        system.observers().collision_detected(seat);
    }
    system.observers().seat_booked(seat, worker);
}

// ============================================================================
// Deadlock modes
// ============================================================================

/// Seat + popcorn booking.
///
/// The deadlock-prone strategy picks `seat_first` at random, so two workers
/// on the same pair can each hold one lock and wait on the other. The
/// prevention strategy always passes `true`.
fn book_pair(system: &BookingSystem, worker: WorkerId, seat_first: bool) {
    let index = rand::thread_rng().gen_range(0..system.seats().len());
    let seat = &system.seats()[index];
    let popcorn = &system.popcorns()[index];

    if seat.is_deadlocked() || popcorn.is_deadlocked() || seat.is_booked() || popcorn.is_reserved() {
        system.booking_failed(worker);
        return;
    }

    let (first, second) = if seat_first {
        (system.seat_lock(index), system.popcorn_lock(index))
    } else {
        (system.popcorn_lock(index), system.seat_lock(index))
    };

    let started = Instant::now();

    let Acquired::Held(_first) = system.acquire(first, None) else {
        return;
    };

    if seat.is_deadlocked() || popcorn.is_deadlocked() {
        return;
    }
    // A booked pair is never marked deadlocked afterwards.
    if seat.is_booked() || popcorn.is_reserved() {
        system.booking_failed(worker);
        return;
    }
    let _holding_first = (!seat_first).then(|| popcorn.hold(worker));

    if !system.pause(Duration::from_millis(system.config().lock_acquisition_delay_ms)) {
        return;
    }

    let timeout = Duration::from_millis(system.config().deadlock_timeout_ms);
    match system.acquire(second, Some(started + timeout)) {
        Acquired::Held(_second) => {
            let _holding_second = seat_first.then(|| popcorn.hold(worker));

            if seat.is_deadlocked() || popcorn.is_deadlocked() {
                seat.mark_stuck(worker);
                system.observers().deadlock_detected(seat, popcorn, worker);
                system.observers().thread_stuck(worker, elapsed_ms(started));
                return;
            }

            if seat.is_booked() || popcorn.is_reserved() {
                system.booking_failed(worker);
                return;
            }

            seat.book_pair(worker);
            popcorn.reserve();
            system.record_claim();

            system.observers().pair_complete(seat, popcorn, worker);
            system.observers().seat_booked(seat, worker);
        }
        Acquired::TimedOut => {
            seat.mark_stuck(worker);
            popcorn.mark_deadlocked();

            tracing::debug!(worker, seat = index, "Second lock timed out, pair deadlocked");
            system.observers().deadlock_detected(seat, popcorn, worker);
            system.observers().thread_stuck(worker, elapsed_ms(started));
        }
        Acquired::Interrupted => {}
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_mode_mapping() {
        assert_eq!(Strategy::for_mode(Mode::Safe, true), Strategy::Synchronized);
        assert_eq!(Strategy::for_mode(Mode::Unsafe, false), Strategy::RaceCondition);
        assert_eq!(Strategy::for_mode(Mode::Deadlock, false), Strategy::Deadlock);
        assert_eq!(
            Strategy::for_mode(Mode::Deadlock, true),
            Strategy::DeadlockPrevention
        );
    }

    #[test]
    fn test_strategy_mode_round_trip() {
        for mode in Mode::ALL {
            for lock_order in [false, true] {
                assert_eq!(Strategy::for_mode(mode, lock_order).mode(), mode);
            }
        }
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("SAFE".parse::<Mode>(), Ok(Mode::Safe));
        assert_eq!(" unsafe ".parse::<Mode>(), Ok(Mode::Unsafe));
        assert_eq!("deadlock".parse::<Mode>(), Ok(Mode::Deadlock));
        assert!("prevention".parse::<Mode>().is_err());
    }
}
