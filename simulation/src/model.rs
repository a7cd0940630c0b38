//! Entity model: seats, stats, mode and status.
//!
//! Plain values. Everything derived (booking counts, rates) is computed from
//! stored data on demand so it cannot drift from it.

use seatrace_engine::{FinalStats, SeatSnapshot, WorkerId};
use serde::{Deserialize, Serialize};

pub use seatrace_engine::Mode;

/// Seats in the default pool.
pub const TOTAL_SEATS: usize = 100;

/// Competing workers in a default run.
pub const TOTAL_THREADS: usize = 1000;

// ============================================================================
// Seat
// ============================================================================

/// Display state of a seat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SeatState {
    /// Nobody touched the seat
    #[default]
    Empty,
    /// Exactly one worker holds the seat
    Booked,
    /// Several workers claimed the seat
    Collision,
    /// The seat's pair ended in a lock timeout
    Deadlocked,
}

impl SeatState {
    /// Derive the display state from engine flags and the number of workers
    /// that touched the seat.
    ///
    /// Precedence is Deadlocked, then Collision, then Booked. The engine's
    /// booked flag is not consulted: a seat is Empty exactly when it has no
    /// workers and no deadlock, so `booking_count` and the state can never
    /// disagree. Every engine sets `booked` exactly when it appends a worker
    /// to a live seat, so for well-formed engine copies both readings agree.
    #[must_use]
    pub const fn from_flags(collision: bool, deadlocked: bool, touched_by: usize) -> Self {
        if deadlocked {
            Self::Deadlocked
        } else if touched_by == 0 {
            Self::Empty
        } else if collision || touched_by > 1 {
            Self::Collision
        } else {
            Self::Booked
        }
    }
}

/// A seat as shown to readers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seat {
    /// Position in the pool, `0..total_seats`
    pub id: usize,
    /// Display state
    pub state: SeatState,
    /// Workers that touched the seat, in arrival order; the first is the winner
    pub thread_ids: Vec<WorkerId>,
}

impl Seat {
    /// An untouched seat.
    #[must_use]
    pub const fn empty(id: usize) -> Self {
        Self {
            id,
            state: SeatState::Empty,
            thread_ids: Vec::new(),
        }
    }

    /// Build a seat from an engine copy.
    #[must_use]
    pub fn from_engine(view: &SeatSnapshot) -> Self {
        Self {
            id: view.number,
            state: SeatState::from_flags(view.collision, view.deadlocked, view.thread_ids.len()),
            thread_ids: view.thread_ids.clone(),
        }
    }

    /// Number of distinct workers that touched the seat.
    #[must_use]
    pub fn booking_count(&self) -> usize {
        self.thread_ids.len()
    }

    /// The first worker to reach the seat.
    #[must_use]
    pub fn winner(&self) -> Option<WorkerId> {
        self.thread_ids.first().copied()
    }
}

/// A fresh pool of `total` empty seats.
#[must_use]
pub fn fresh_seats(total: usize) -> Vec<Seat> {
    (0..total).map(Seat::empty).collect()
}

// ============================================================================
// Stats
// ============================================================================

/// Counters meaningful in safe and unsafe mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BookingCounters {
    /// Seats not Empty
    pub seats_booked: usize,
    /// Seats held by exactly one worker
    pub successful_bookings: usize,
    /// Seats claimed by several workers
    pub collisions: usize,
    /// `max(0, Σ booking_count − total_seats)`
    pub oversold_by: usize,
}

/// Counters meaningful in deadlock mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeadlockCounters {
    /// Seat + popcorn pairs completed
    pub pairs_complete: usize,
    /// Pairs that deadlocked
    pub deadlocks_detected: usize,
    /// Workers stuck on deadlocked seats
    pub threads_stuck: usize,
    /// Popcorns reserved in the engine's pool
    pub popcorns_reserved: usize,
}

/// Mode-dependent counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "layout", rename_all = "snake_case")]
pub enum Counters {
    /// Safe / unsafe counters
    Booking(BookingCounters),
    /// Deadlock counters
    Deadlock(DeadlockCounters),
}

impl Counters {
    /// All-zero counters for `mode`.
    #[must_use]
    pub fn zeroed(mode: Mode) -> Self {
        if mode.is_deadlock() {
            Self::Deadlock(DeadlockCounters::default())
        } else {
            Self::Booking(BookingCounters::default())
        }
    }
}

/// Aggregate statistics of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    /// Seats in the pool
    pub total_seats: usize,
    /// Competing workers
    pub total_threads: usize,
    /// Counters for the run's mode
    pub counters: Counters,
    /// The engine's own final account, once the run completed
    pub engine_report: Option<FinalStats>,
}

impl Stats {
    /// Zeroed stats.
    #[must_use]
    pub fn zeroed(mode: Mode, total_seats: usize, total_threads: usize) -> Self {
        Self {
            total_seats,
            total_threads,
            counters: Counters::zeroed(mode),
            engine_report: None,
        }
    }

    /// Booking counters, if this is a safe/unsafe run.
    #[must_use]
    pub const fn booking(&self) -> Option<&BookingCounters> {
        match &self.counters {
            Counters::Booking(c) => Some(c),
            Counters::Deadlock(_) => None,
        }
    }

    /// Deadlock counters, if this is a deadlock run.
    #[must_use]
    pub const fn deadlock(&self) -> Option<&DeadlockCounters> {
        match &self.counters {
            Counters::Deadlock(c) => Some(c),
            Counters::Booking(_) => None,
        }
    }

    /// `successful / (successful + collisions) * 100`, 0 when nothing was booked.
    #[must_use]
    #[allow(clippy::cast_precision_loss)] // counts are bounded by the seat pool
    pub fn success_rate(&self) -> f64 {
        match self.booking() {
            Some(c) if c.successful_bookings + c.collisions > 0 => {
                c.successful_bookings as f64 / (c.successful_bookings + c.collisions) as f64 * 100.0
            }
            _ => 0.0,
        }
    }

    /// `pairs_complete / total_seats * 100`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)] // counts are bounded by the seat pool
    pub fn deadlock_completion_rate(&self) -> f64 {
        match self.deadlock() {
            Some(c) if self.total_seats > 0 => {
                c.pairs_complete as f64 / self.total_seats as f64 * 100.0
            }
            _ => 0.0,
        }
    }

    /// Oversold count to report.
    ///
    /// Once the run completed this is the engine's figure, which also counts
    /// claims the seat pool cannot show; until then the seat-derived one.
    #[must_use]
    pub fn oversold(&self) -> usize {
        match (&self.engine_report, self.booking()) {
            (Some(report), _) => report.oversold,
            (None, Some(c)) => c.oversold_by,
            (None, None) => 0,
        }
    }
}

// ============================================================================
// Status and activity
// ============================================================================

/// Lifecycle of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Status {
    /// Nothing has run since the last reset
    #[default]
    Idle,
    /// A run is in flight
    Running,
    /// The engine reported completion
    Completed,
    /// Stopped by the user or by an engine fault
    Stopped,
}

impl Status {
    /// Whether the run has ended.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Stopped)
    }
}

/// Worker activity seen during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Activity {
    /// `thread_started` events
    pub threads_started: usize,
    /// `thread_completed` events
    pub threads_completed: usize,
    /// `booking_failed` events
    pub failed_bookings: usize,
    /// `thread_stuck` events
    pub stuck_reports: usize,
    /// Longest reported stuck wait
    pub longest_wait_ms: u64,
}

/// Settings a user may change between runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Base delay of an unguarded claim, in milliseconds
    pub delay_ms: u64,
    /// Lock the seat before the popcorn in deadlock mode
    pub lock_order: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            delay_ms: 2,
            lock_order: false,
        }
    }
}
