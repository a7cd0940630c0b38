//! A booking engine that replays a fixed script of events.
//!
//! Used to drive the orchestrator deterministically: every event, the final
//! statistics, and how the run ends are chosen by the test.

use parking_lot::{Mutex, RwLock};
use seatrace_engine::{
    BookingEngine, BookingObserver, EngineConfig, EngineError, EngineFactory, FinalStats, Popcorn,
    PopcornSnapshot, Seat, SeatSnapshot, WorkerId,
};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// One scripted engine event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptStep {
    /// `seat_booked` with the seat as given
    Booked {
        /// Seat state reported with the event
        seat: SeatSnapshot,
        /// Booking worker
        worker: WorkerId,
    },
    /// `collision_detected`
    Collision {
        /// Seat state reported with the event
        seat: SeatSnapshot,
    },
    /// `booking_failed`
    Failed(WorkerId),
    /// `thread_started`
    ThreadStarted(WorkerId),
    /// `thread_completed`
    ThreadCompleted(WorkerId),
    /// `progress_update`
    Progress {
        /// Active workers
        active: usize,
        /// Finished workers
        completed: usize,
        /// All workers
        total: usize,
    },
    /// `deadlock_detected`
    Deadlock {
        /// Seat state reported with the event
        seat: SeatSnapshot,
        /// Stuck worker
        worker: WorkerId,
    },
    /// `pair_complete`
    Pair {
        /// Seat state reported with the event
        seat: SeatSnapshot,
        /// Booking worker
        worker: WorkerId,
    },
    /// `thread_stuck`
    Stuck {
        /// Stuck worker
        worker: WorkerId,
        /// Reported wait
        wait_ms: u64,
    },
    /// Sleep without emitting anything
    Pause(Duration),
}

/// How a scripted run ends after its steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptEnd {
    /// Final progress, then `simulation_completed`
    Complete,
    /// Return this error from `run`
    Fail(EngineError),
    /// Panic inside `run`
    Panic(String),
    /// Wait until `stop_all_threads`, then return `Cancelled`
    BlockUntilStopped,
}

/// An event script plus its ending.
#[derive(Debug, Clone)]
pub struct Script {
    steps: Vec<ScriptStep>,
    end: ScriptEnd,
    final_stats: Option<FinalStats>,
}

impl Default for Script {
    fn default() -> Self {
        Self::new()
    }
}

impl Script {
    /// Empty script that completes immediately.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            steps: Vec::new(),
            end: ScriptEnd::Complete,
            final_stats: None,
        }
    }

    /// Append a raw step.
    #[must_use]
    pub fn step(mut self, step: ScriptStep) -> Self {
        self.steps.push(step);
        self
    }

    /// `seat_booked` for `number` claimed by `ids` (the last id is the reporter).
    #[must_use]
    pub fn booked(self, number: usize, ids: &[WorkerId]) -> Self {
        let worker = ids.last().copied().unwrap_or_default();
        self.step(ScriptStep::Booked {
            seat: SeatSnapshot {
                number,
                booked: true,
                collision: ids.len() > 1,
                deadlocked: false,
                thread_ids: ids.to_vec(),
            },
            worker,
        })
    }

    /// `collision_detected` for `number` claimed by `ids`.
    #[must_use]
    pub fn collision(self, number: usize, ids: &[WorkerId]) -> Self {
        self.step(ScriptStep::Collision {
            seat: SeatSnapshot {
                number,
                booked: true,
                collision: true,
                deadlocked: false,
                thread_ids: ids.to_vec(),
            },
        })
    }

    /// `booking_failed` for `worker`.
    #[must_use]
    pub fn failed(self, worker: WorkerId) -> Self {
        self.step(ScriptStep::Failed(worker))
    }

    /// `thread_started` then `thread_completed` for `worker`.
    #[must_use]
    pub fn thread(self, worker: WorkerId) -> Self {
        self.step(ScriptStep::ThreadStarted(worker))
            .step(ScriptStep::ThreadCompleted(worker))
    }

    /// `progress_update`.
    #[must_use]
    pub fn progress(self, active: usize, completed: usize, total: usize) -> Self {
        self.step(ScriptStep::Progress {
            active,
            completed,
            total,
        })
    }

    /// `deadlock_detected` for `number` with `ids` stuck on it, reported by the last id.
    #[must_use]
    pub fn deadlock(self, number: usize, ids: &[WorkerId]) -> Self {
        let worker = ids.last().copied().unwrap_or_default();
        self.step(ScriptStep::Deadlock {
            seat: SeatSnapshot {
                number,
                booked: false,
                collision: false,
                deadlocked: true,
                thread_ids: ids.to_vec(),
            },
            worker,
        })
    }

    /// `pair_complete` then `seat_booked` for `number` booked by `worker`.
    #[must_use]
    pub fn pair(self, number: usize, worker: WorkerId) -> Self {
        let seat = SeatSnapshot {
            number,
            booked: true,
            collision: false,
            deadlocked: false,
            thread_ids: vec![worker],
        };
        self.step(ScriptStep::Pair {
            seat: seat.clone(),
            worker,
        })
        .step(ScriptStep::Booked { seat, worker })
    }

    /// `thread_stuck`.
    #[must_use]
    pub fn stuck(self, worker: WorkerId, wait_ms: u64) -> Self {
        self.step(ScriptStep::Stuck { worker, wait_ms })
    }

    /// Sleep between steps.
    #[must_use]
    pub fn pause(self, duration: Duration) -> Self {
        self.step(ScriptStep::Pause(duration))
    }

    /// Report `stats` at completion instead of computing them from the script.
    #[must_use]
    pub fn with_final_stats(mut self, stats: FinalStats) -> Self {
        self.final_stats = Some(stats);
        self
    }

    /// End with `simulation_completed`.
    #[must_use]
    pub fn then_complete(mut self) -> Self {
        self.end = ScriptEnd::Complete;
        self
    }

    /// End by returning `error`.
    #[must_use]
    pub fn then_fail(mut self, error: EngineError) -> Self {
        self.end = ScriptEnd::Fail(error);
        self
    }

    /// End by panicking.
    #[must_use]
    pub fn then_panic(mut self, message: impl Into<String>) -> Self {
        self.end = ScriptEnd::Panic(message.into());
        self
    }

    /// Hang until stopped.
    #[must_use]
    pub fn then_block(mut self) -> Self {
        self.end = ScriptEnd::BlockUntilStopped;
        self
    }
}

/// Engine that replays a [`Script`].
pub struct ScriptedEngine {
    config: EngineConfig,
    script: Script,
    observers: RwLock<Vec<Box<dyn BookingObserver>>>,
    seats: Mutex<Vec<SeatSnapshot>>,
    popcorns: Mutex<Vec<PopcornSnapshot>>,
    started: AtomicBool,
    stopped: AtomicBool,
}

impl std::fmt::Debug for ScriptedEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedEngine")
            .field("config", &self.config)
            .field("steps", &self.script.steps.len())
            .field("end", &self.script.end)
            .finish_non_exhaustive()
    }
}

impl ScriptedEngine {
    /// Create an engine for `config` that will replay `script`.
    #[must_use]
    pub fn new(config: EngineConfig, script: Script) -> Self {
        let n = config.total_seats;
        Self {
            seats: Mutex::new(
                (0..n)
                    .map(|number| SeatSnapshot {
                        number,
                        ..SeatSnapshot::default()
                    })
                    .collect(),
            ),
            popcorns: Mutex::new(
                (0..n)
                    .map(|number| PopcornSnapshot {
                        number,
                        ..PopcornSnapshot::default()
                    })
                    .collect(),
            ),
            config,
            script,
            observers: RwLock::new(Vec::new()),
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        }
    }

    /// The configuration this engine was created with.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Whether `stop_all_threads` was called.
    #[must_use]
    pub fn was_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Number of registered observers.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.observers.read().len()
    }

    fn each(&self, f: impl Fn(&dyn BookingObserver)) {
        for observer in self.observers.read().iter() {
            f(observer.as_ref());
        }
    }

    /// Record the seat's reported state and hand back a live copy for observers.
    fn track_seat(&self, seat: &SeatSnapshot) -> Seat {
        if let Some(slot) = self.seats.lock().get_mut(seat.number) {
            *slot = seat.clone();
        }
        Seat::from_snapshot(seat.clone())
    }

    fn track_popcorn(&self, number: usize, reserved: bool, deadlocked: bool) -> Popcorn {
        let snapshot = PopcornSnapshot {
            number,
            reserved,
            deadlocked,
            holder: None,
        };
        if let Some(slot) = self.popcorns.lock().get_mut(number) {
            *slot = snapshot.clone();
        }
        Popcorn::from_snapshot(snapshot)
    }

    fn replay(&self, step: &ScriptStep) {
        match step {
            ScriptStep::Booked { seat, worker } => {
                let seat = self.track_seat(seat);
                self.each(|o| o.on_seat_booked(&seat, *worker));
            }
            ScriptStep::Collision { seat } => {
                let seat = self.track_seat(seat);
                self.each(|o| o.on_collision_detected(&seat));
            }
            ScriptStep::Failed(worker) => self.each(|o| o.on_booking_failed(*worker)),
            ScriptStep::ThreadStarted(worker) => self.each(|o| o.on_thread_started(*worker)),
            ScriptStep::ThreadCompleted(worker) => self.each(|o| o.on_thread_completed(*worker)),
            ScriptStep::Progress {
                active,
                completed,
                total,
            } => self.each(|o| o.on_progress_update(*active, *completed, *total)),
            ScriptStep::Deadlock { seat, worker } => {
                let popcorn = self.track_popcorn(seat.number, false, true);
                let seat = self.track_seat(seat);
                self.each(|o| o.on_deadlock_detected(&seat, &popcorn, *worker));
            }
            ScriptStep::Pair { seat, worker } => {
                let popcorn = self.track_popcorn(seat.number, true, false);
                let seat = self.track_seat(seat);
                self.each(|o| o.on_pair_complete(&seat, &popcorn, *worker));
            }
            ScriptStep::Stuck { worker, wait_ms } => {
                self.each(|o| o.on_thread_stuck(*worker, *wait_ms));
            }
            ScriptStep::Pause(duration) => std::thread::sleep(*duration),
        }
    }

    fn final_stats(&self) -> FinalStats {
        if let Some(stats) = &self.script.final_stats {
            return stats.clone();
        }
        let seats = self.seats.lock().clone();
        let claims = seats
            .iter()
            .filter(|s| s.booked)
            .map(|s| s.thread_ids.len())
            .sum();
        let failed = self
            .script
            .steps
            .iter()
            .filter(|s| matches!(s, ScriptStep::Failed(_)))
            .count();
        FinalStats::compute(
            self.config.strategy(),
            self.config.total_threads,
            &seats,
            &self.popcorns.lock(),
            claims,
            failed,
        )
    }
}

impl BookingEngine for ScriptedEngine {
    fn add_observer(&self, observer: Box<dyn BookingObserver>) {
        self.observers.write().push(observer);
    }

    #[allow(clippy::panic)] // Panicking on demand is the point of `ScriptEnd::Panic`
    fn run(&self) -> Result<FinalStats, EngineError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(EngineError::AlreadyRunning);
        }

        let total = self.config.total_threads;
        let strategy = self.config.strategy();
        self.each(|o| o.on_simulation_started(total, strategy));

        for step in &self.script.steps {
            if self.was_stopped() {
                return Err(EngineError::Cancelled);
            }
            self.replay(step);
        }

        match &self.script.end {
            ScriptEnd::Complete => {
                if self.was_stopped() {
                    return Err(EngineError::Cancelled);
                }
                self.each(|o| o.on_progress_update(0, total, total));
                let stats = self.final_stats();
                self.each(|o| o.on_simulation_completed(&stats));
                Ok(stats)
            }
            ScriptEnd::Fail(error) => Err(error.clone()),
            ScriptEnd::Panic(message) => panic!("{message}"),
            ScriptEnd::BlockUntilStopped => {
                while !self.was_stopped() {
                    std::thread::sleep(Duration::from_millis(2));
                }
                Err(EngineError::Cancelled)
            }
        }
    }

    fn stop_all_threads(&self) {
        tracing::debug!("Scripted engine stop requested");
        self.stopped.store(true, Ordering::SeqCst);
    }

    fn seats(&self) -> Vec<SeatSnapshot> {
        self.seats.lock().clone()
    }

    fn popcorns(&self) -> Vec<PopcornSnapshot> {
        self.popcorns.lock().clone()
    }
}

/// Hands out [`ScriptedEngine`]s, one script per run.
///
/// Scripts are consumed in order; the last one is reused for any further runs.
#[derive(Debug)]
pub struct ScriptedEngineFactory {
    scripts: Mutex<VecDeque<Script>>,
    fallback: Mutex<Script>,
    created: Mutex<Vec<Arc<ScriptedEngine>>>,
}

impl ScriptedEngineFactory {
    /// Factory whose every run replays `script`.
    #[must_use]
    pub fn new(script: Script) -> Self {
        Self {
            scripts: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(script),
            created: Mutex::new(Vec::new()),
        }
    }

    /// Factory replaying `scripts` in order, then repeating the last.
    #[must_use]
    pub fn sequence(scripts: impl IntoIterator<Item = Script>) -> Self {
        let mut scripts: VecDeque<Script> = scripts.into_iter().collect();
        let fallback = scripts.pop_back().unwrap_or_default();
        Self {
            scripts: Mutex::new(scripts),
            fallback: Mutex::new(fallback),
            created: Mutex::new(Vec::new()),
        }
    }

    /// Engines created so far, oldest first.
    #[must_use]
    pub fn created(&self) -> Vec<Arc<ScriptedEngine>> {
        self.created.lock().clone()
    }

    /// Number of engines created so far.
    #[must_use]
    pub fn created_count(&self) -> usize {
        self.created.lock().len()
    }
}

impl EngineFactory for ScriptedEngineFactory {
    fn create(&self, config: EngineConfig) -> Result<Arc<dyn BookingEngine>, EngineError> {
        config.validate()?;
        let script = self
            .scripts
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback.lock().clone());
        let engine = Arc::new(ScriptedEngine::new(config, script));
        self.created.lock().push(Arc::clone(&engine));
        Ok(engine)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[derive(Clone, Default)]
    struct Log(Arc<Mutex<Vec<String>>>);

    impl BookingObserver for Log {
        fn on_simulation_started(&self, total_threads: usize, _strategy: seatrace_engine::Strategy) {
            self.0.lock().push(format!("started {total_threads}"));
        }
        fn on_seat_booked(&self, seat: &Seat, worker: WorkerId) {
            self.0.lock().push(format!("booked {} by {worker}", seat.number()));
        }
        fn on_collision_detected(&self, seat: &Seat) {
            self.0.lock().push(format!("collision {}", seat.number()));
        }
        fn on_booking_failed(&self, worker: WorkerId) {
            self.0.lock().push(format!("failed {worker}"));
        }
        fn on_thread_started(&self, _worker: WorkerId) {}
        fn on_thread_completed(&self, _worker: WorkerId) {}
        fn on_progress_update(&self, active: usize, completed: usize, total: usize) {
            self.0.lock().push(format!("progress {active}/{completed}/{total}"));
        }
        fn on_simulation_completed(&self, stats: &FinalStats) {
            self.0.lock().push(format!("completed {}", stats.seats_booked));
        }
    }

    fn config() -> EngineConfig {
        EngineConfig::default().with_seats(4).with_threads(10)
    }

    #[test]
    fn test_replays_in_order() {
        let engine = ScriptedEngine::new(
            config(),
            Script::new().booked(0, &[1]).collision(1, &[2, 3]).failed(4),
        );
        let log = Log::default();
        engine.add_observer(Box::new(log.clone()));

        let stats = engine.run().unwrap();

        assert_eq!(
            *log.0.lock(),
            vec![
                "started 10",
                "booked 0 by 1",
                "collision 1",
                "failed 4",
                "progress 0/10/10",
                "completed 2",
            ]
        );
        assert_eq!(stats.claims, 3);
        assert_eq!(stats.collisions, 1);
        assert_eq!(stats.failed, 1);
    }

    #[test]
    fn test_fail_and_block_endings() {
        let failing = ScriptedEngine::new(config(), Script::new().then_fail(EngineError::WorkerPanicked(2)));
        assert_eq!(failing.run(), Err(EngineError::WorkerPanicked(2)));

        let blocking = Arc::new(ScriptedEngine::new(config(), Script::new().then_block()));
        let runner = {
            let engine = Arc::clone(&blocking);
            std::thread::spawn(move || engine.run())
        };
        blocking.stop_all_threads();
        assert_eq!(runner.join().unwrap(), Err(EngineError::Cancelled));
    }

    #[test]
    fn test_factory_sequence() {
        let factory = ScriptedEngineFactory::sequence([
            Script::new().then_fail(EngineError::Cancelled),
            Script::new().booked(0, &[1]),
        ]);

        let first = factory.create(config()).unwrap();
        let second = factory.create(config()).unwrap();
        let third = factory.create(config()).unwrap();

        assert_eq!(first.run(), Err(EngineError::Cancelled));
        assert_eq!(second.run().unwrap().seats_booked, 1);
        assert_eq!(third.run().unwrap().seats_booked, 1);
        assert_eq!(factory.created_count(), 3);
    }
}
