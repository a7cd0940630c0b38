//! Everything the reconciler reacts to.

use crate::model::Mode;
use seatrace_engine::{FinalStats, PopcornSnapshot, SeatSnapshot, Strategy, WorkerId};

/// An engine callback, copied into owned data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// The engine is about to spawn its workers
    SimulationStarted {
        /// Workers to spawn
        total_threads: usize,
        /// Strategy in use
        strategy: Strategy,
    },
    /// A worker claimed a seat
    SeatBooked {
        /// Seat at event time
        seat: SeatSnapshot,
        /// Claiming worker
        worker: WorkerId,
    },
    /// A seat was claimed more than once
    CollisionDetected {
        /// Seat at event time
        seat: SeatSnapshot,
    },
    /// A worker found nothing to book
    BookingFailed {
        /// Failing worker
        worker: WorkerId,
    },
    /// A worker started
    ThreadStarted {
        /// Worker
        worker: WorkerId,
    },
    /// A worker finished
    ThreadCompleted {
        /// Worker
        worker: WorkerId,
    },
    /// Periodic progress
    Progress {
        /// Workers still running
        active: usize,
        /// Workers finished
        completed: usize,
        /// All workers
        total: usize,
    },
    /// The engine finished every worker
    SimulationCompleted {
        /// The engine's own account
        stats: FinalStats,
        /// Final seat pool, for the completion sweep
        seats: Vec<SeatSnapshot>,
        /// Reserved popcorns in the engine's pool
        popcorns_reserved: usize,
    },
    /// A worker timed out on the second lock of a pair
    DeadlockDetected {
        /// Seat at event time
        seat: SeatSnapshot,
        /// Popcorn at event time
        popcorn: PopcornSnapshot,
        /// Stuck worker
        worker: WorkerId,
    },
    /// A worker holds a seat and its popcorn
    PairComplete {
        /// Seat at event time
        seat: SeatSnapshot,
        /// Popcorn at event time
        popcorn: PopcornSnapshot,
        /// Booking worker
        worker: WorkerId,
    },
    /// A worker gave up after waiting
    ThreadStuck {
        /// Stuck worker
        worker: WorkerId,
        /// How long it waited
        wait_ms: u64,
    },
}

impl EngineEvent {
    /// Metric label for the event kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::SimulationStarted { .. } => "simulation_started",
            Self::SeatBooked { .. } => "seat_booked",
            Self::CollisionDetected { .. } => "collision_detected",
            Self::BookingFailed { .. } => "booking_failed",
            Self::ThreadStarted { .. } => "thread_started",
            Self::ThreadCompleted { .. } => "thread_completed",
            Self::Progress { .. } => "progress",
            Self::SimulationCompleted { .. } => "simulation_completed",
            Self::DeadlockDetected { .. } => "deadlock_detected",
            Self::PairComplete { .. } => "pair_complete",
            Self::ThreadStuck { .. } => "thread_stuck",
        }
    }
}

/// How a background run ended, from the orchestrator's point of view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The engine returned normally
    Completed,
    /// The run was stopped or superseded
    Cancelled,
    /// The engine failed or panicked
    Faulted(String),
}

impl RunOutcome {
    /// Metric label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Faulted(_) => "faulted",
        }
    }
}

/// A change to the configuration surface. `None` leaves a field as is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConfigChange {
    /// New mode
    pub mode: Option<Mode>,
    /// New unguarded-claim delay
    pub delay_ms: Option<u64>,
    /// New lock-order flag
    pub lock_order: Option<bool>,
}

impl ConfigChange {
    /// Change only the mode.
    #[must_use]
    pub const fn mode(mode: Mode) -> Self {
        Self {
            mode: Some(mode),
            delay_ms: None,
            lock_order: None,
        }
    }

    /// Also change the delay.
    #[must_use]
    pub const fn with_delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay_ms = Some(delay_ms);
        self
    }

    /// Also change the lock-order flag.
    #[must_use]
    pub const fn with_lock_order(mut self, lock_order: bool) -> Self {
        self.lock_order = Some(lock_order);
        self
    }
}

/// Inputs to the simulation reducer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimulationAction {
    /// Start a run unless one is in flight
    Run,
    /// Halt the current run
    Stop,
    /// Halt and clear everything back to Idle
    Reset,
    /// Change mode/delay/lock order (ignored while running)
    Configure(ConfigChange),
    /// An engine callback tagged with the run generation that produced it
    Engine {
        /// Generation of the emitting run
        generation: u64,
        /// The event
        event: EngineEvent,
    },
    /// The background run returned
    RunFinished {
        /// Generation of the run
        generation: u64,
        /// How it ended
        outcome: RunOutcome,
    },
}
