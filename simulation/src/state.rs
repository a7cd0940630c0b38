//! The canonical snapshot.

use crate::model::{Activity, Mode, RunConfig, Seat, Stats, Status, fresh_seats};
use crate::settings::SimulationSettings;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Everything a reader can see, published whole after every update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationState {
    /// The seat pool, indexed by seat id
    pub seats: Vec<Seat>,
    /// Aggregate statistics, always consistent with `seats`
    pub stats: Stats,
    /// Lifecycle status
    pub status: Status,
    /// Finished workers, monotone within a run
    pub progress: usize,
    /// Mode of the current (or next) run
    pub mode: Mode,
    /// Delay and lock order of the current (or next) run
    pub config: RunConfig,
    /// Bumped on every run and reset; events from older generations are ignored
    pub generation: u64,
    /// Workers still running, as last reported
    pub active_threads: usize,
    /// Worker activity counters
    pub activity: Activity,
    /// Description of the last engine fault, if any
    pub last_fault: Option<String>,
    /// When the current run started
    pub started_at: Option<DateTime<Utc>>,
    /// When the current run ended
    pub finished_at: Option<DateTime<Utc>>,
    /// Reserved flags of the engine's popcorn pool, as reported by events
    #[serde(skip)]
    pub(crate) popcorns: Vec<bool>,
}

impl SimulationState {
    /// Idle state for `settings`.
    #[must_use]
    pub fn new(settings: &SimulationSettings) -> Self {
        Self::idle(
            settings.mode,
            settings.run_config(),
            settings.total_seats,
            settings.total_threads,
        )
    }

    /// Idle state with an explicit mode, config and pool size.
    #[must_use]
    pub fn idle(mode: Mode, config: RunConfig, total_seats: usize, total_threads: usize) -> Self {
        Self {
            seats: fresh_seats(total_seats),
            stats: Stats::zeroed(mode, total_seats, total_threads),
            status: Status::Idle,
            progress: 0,
            mode,
            config,
            generation: 0,
            active_threads: 0,
            activity: Activity::default(),
            last_fault: None,
            started_at: None,
            finished_at: None,
            popcorns: vec![false; total_seats],
        }
    }

    /// Replace seats, stats, progress and activity with fresh values.
    ///
    /// Mode, config and generation are kept.
    pub(crate) fn clear_run(&mut self) {
        let total_seats = self.stats.total_seats;
        let total_threads = self.stats.total_threads;
        self.seats = fresh_seats(total_seats);
        self.stats = Stats::zeroed(self.mode, total_seats, total_threads);
        self.progress = 0;
        self.active_threads = 0;
        self.activity = Activity::default();
        self.last_fault = None;
        self.started_at = None;
        self.finished_at = None;
        self.popcorns = vec![false; total_seats];
    }

    /// Whether a run is in flight.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.status == Status::Running
    }

    /// Popcorns reserved according to the events seen so far.
    #[must_use]
    pub fn popcorns_reserved(&self) -> usize {
        self.popcorns.iter().filter(|r| **r).count()
    }
}

impl Default for SimulationState {
    fn default() -> Self {
        Self::new(&SimulationSettings::default())
    }
}
