//! State reconciler: the only writer of the canonical snapshot.
//!
//! Control commands and engine events all arrive here as
//! [`SimulationAction`]s and are applied one at a time by the Store. Events
//! from a superseded run, or arriving while no run is in flight, are dropped.

use crate::action::{ConfigChange, EngineEvent, RunOutcome, SimulationAction};
use crate::controller::{RunController, RunRequest};
use crate::model::{Seat, Status};
use crate::settings::SimulationSettings;
use crate::state::SimulationState;
use crate::stats::aggregate;
use seatrace_core::environment::Clock;
use seatrace_core::{SmallVec, effect::Effect, reducer::Reducer, smallvec};
use seatrace_engine::{FinalStats, PopcornSnapshot, SeatSnapshot};
use seatrace_runtime::metrics::SimulationMetrics;
use std::sync::Arc;

type Effects = SmallVec<[Effect<SimulationAction>; 4]>;

/// Injected dependencies of the reconciler.
#[derive(Clone)]
pub struct SimulationEnvironment {
    /// Launches and halts engines
    pub runner: Arc<RunController>,
    /// Timestamps for run start/end
    pub clock: Arc<dyn Clock>,
    /// Pool size and engine tuning
    pub settings: Arc<SimulationSettings>,
}

impl SimulationEnvironment {
    /// Bundle the dependencies.
    #[must_use]
    pub fn new(
        runner: Arc<RunController>,
        clock: Arc<dyn Clock>,
        settings: Arc<SimulationSettings>,
    ) -> Self {
        Self {
            runner,
            clock,
            settings,
        }
    }
}

/// Reducer for the simulation.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulationReducer;

impl SimulationReducer {
    /// Create a new reducer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn run(state: &mut SimulationState, env: &SimulationEnvironment) -> Effects {
        if state.is_running() {
            tracing::debug!(generation = state.generation, "Run ignored, already running");
            return smallvec![Effect::None];
        }

        state.generation += 1;
        state.clear_run();
        state.status = Status::Running;
        state.started_at = Some(env.clock.now());

        let request = RunRequest {
            generation: state.generation,
            config: env.settings.engine_config(state.mode, state.config),
        };
        tracing::info!(
            generation = state.generation,
            mode = %state.mode,
            delay_ms = state.config.delay_ms,
            lock_order = state.config.lock_order,
            "Simulation run started"
        );

        let runner = Arc::clone(&env.runner);
        smallvec![Effect::future(async move {
            runner.launch(request).await;
            None
        })]
    }

    fn stop(state: &mut SimulationState, env: &SimulationEnvironment) -> Effects {
        if !state.is_running() {
            tracing::debug!(status = ?state.status, "Stop ignored, nothing running");
            return smallvec![Effect::None];
        }

        state.status = Status::Stopped;
        state.finished_at = Some(env.clock.now());
        SimulationMetrics::record_finished("stopped");
        tracing::info!(
            generation = state.generation,
            progress = state.progress,
            "Simulation run stopped"
        );

        let generation = state.generation;
        let runner = Arc::clone(&env.runner);
        smallvec![Effect::future(async move {
            runner.halt(generation).await;
            None
        })]
    }

    fn reset(state: &mut SimulationState, env: &SimulationEnvironment) -> Effects {
        if state.is_running() {
            SimulationMetrics::record_finished("stopped");
        }
        state.generation += 1;
        state.clear_run();
        state.status = Status::Idle;
        tracing::debug!(generation = state.generation, "Simulation reset");

        let generation = state.generation;
        let runner = Arc::clone(&env.runner);
        smallvec![Effect::future(async move {
            runner.release(generation).await;
            None
        })]
    }

    fn configure(state: &mut SimulationState, change: ConfigChange) {
        if state.is_running() {
            tracing::warn!(?change, "Configuration change rejected while running");
            return;
        }

        if let Some(delay_ms) = change.delay_ms {
            state.config.delay_ms = delay_ms;
        }
        if let Some(lock_order) = change.lock_order {
            state.config.lock_order = lock_order;
        }
        if let Some(mode) = change.mode.filter(|mode| *mode != state.mode) {
            state.mode = mode;
            state.clear_run();
            state.status = Status::Idle;
        }
        tracing::debug!(mode = %state.mode, config = ?state.config, "Configuration updated");
    }

    // ========================================================================
    // Engine events
    // ========================================================================

    fn apply_event(
        state: &mut SimulationState,
        generation: u64,
        event: EngineEvent,
        env: &SimulationEnvironment,
    ) {
        if generation != state.generation {
            tracing::trace!(
                generation,
                current = state.generation,
                kind = event.kind(),
                "Dropping stale event"
            );
            SimulationMetrics::record_dropped("stale_generation");
            return;
        }
        if !state.is_running() {
            tracing::trace!(
                status = ?state.status,
                kind = event.kind(),
                "Dropping event, run not active"
            );
            SimulationMetrics::record_dropped("not_running");
            return;
        }

        let kind = event.kind();
        let applied = match event {
            EngineEvent::SimulationStarted {
                total_threads,
                strategy,
            } => {
                if total_threads != state.stats.total_threads {
                    tracing::warn!(
                        engine = total_threads,
                        expected = state.stats.total_threads,
                        "Engine reports a different worker count"
                    );
                }
                tracing::debug!(total_threads, %strategy, "Engine started");
                true
            }
            EngineEvent::SeatBooked { seat, worker } => {
                tracing::trace!(seat = seat.number, worker, "Seat booked");
                Self::apply_seat(state, &seat)
            }
            EngineEvent::CollisionDetected { seat } => {
                tracing::trace!(seat = seat.number, threads = ?seat.thread_ids, "Collision");
                Self::apply_seat(state, &seat)
            }
            EngineEvent::DeadlockDetected { seat, popcorn, worker } => {
                tracing::trace!(seat = seat.number, worker, "Deadlock");
                Self::apply_popcorn(state, &popcorn);
                Self::apply_seat(state, &seat)
            }
            EngineEvent::PairComplete { seat, popcorn, worker } => {
                tracing::trace!(seat = seat.number, worker, "Pair complete");
                Self::apply_popcorn(state, &popcorn);
                Self::apply_seat(state, &seat)
            }
            EngineEvent::BookingFailed { .. } => {
                state.activity.failed_bookings += 1;
                true
            }
            EngineEvent::ThreadStarted { .. } => {
                state.activity.threads_started += 1;
                true
            }
            EngineEvent::ThreadCompleted { .. } => {
                state.activity.threads_completed += 1;
                true
            }
            EngineEvent::ThreadStuck { worker, wait_ms } => {
                tracing::trace!(worker, wait_ms, "Thread stuck");
                state.activity.stuck_reports += 1;
                state.activity.longest_wait_ms = state.activity.longest_wait_ms.max(wait_ms);
                true
            }
            EngineEvent::Progress {
                active, completed, ..
            } => {
                let completed = completed.min(state.stats.total_threads);
                if completed > state.progress {
                    state.progress = completed;
                    SimulationMetrics::record_progress(completed);
                }
                state.active_threads = active;
                true
            }
            EngineEvent::SimulationCompleted {
                stats,
                seats,
                popcorns_reserved,
            } => {
                Self::complete(state, stats, &seats, popcorns_reserved, env);
                true
            }
        };

        if applied {
            SimulationMetrics::record_applied(kind);
        }
    }

    /// Replace one seat wholesale and recompute stats from the full pool.
    fn apply_seat(state: &mut SimulationState, view: &SeatSnapshot) -> bool {
        let Some(slot) = state.seats.get_mut(view.number) else {
            tracing::warn!(
                seat = view.number,
                total = state.seats.len(),
                "Ignoring event for a seat outside the pool"
            );
            SimulationMetrics::record_dropped("seat_out_of_range");
            return false;
        };
        *slot = Seat::from_engine(view);
        Self::recompute(state);
        true
    }

    fn apply_popcorn(state: &mut SimulationState, popcorn: &PopcornSnapshot) {
        if let Some(reserved) = state.popcorns.get_mut(popcorn.number) {
            *reserved = popcorn.reserved;
        }
    }

    fn recompute(state: &mut SimulationState) {
        state.stats = aggregate(
            &state.seats,
            state.mode,
            state.stats.total_threads,
            state.popcorns_reserved(),
        );
    }

    fn complete(
        state: &mut SimulationState,
        report: FinalStats,
        seats: &[SeatSnapshot],
        popcorns_reserved: usize,
        env: &SimulationEnvironment,
    ) {
        for view in seats {
            match state.seats.get_mut(view.number) {
                Some(slot) => *slot = Seat::from_engine(view),
                None => {
                    tracing::warn!(
                        seat = view.number,
                        "Final sweep skipped a seat outside the pool"
                    );
                    SimulationMetrics::record_dropped("seat_out_of_range");
                }
            }
        }

        let total_threads = state.stats.total_threads;
        state.stats = aggregate(&state.seats, state.mode, total_threads, popcorns_reserved);

        if let Some(derived) = state.stats.booking().map(|c| c.oversold_by) {
            if derived != report.oversold {
                tracing::warn!(
                    engine = report.oversold,
                    derived,
                    "Oversold counts differ, reporting the engine's"
                );
            }
        }
        state.stats.engine_report = Some(report);

        state.progress = total_threads;
        state.active_threads = 0;
        state.status = Status::Completed;
        state.finished_at = Some(env.clock.now());

        SimulationMetrics::record_progress(total_threads);
        SimulationMetrics::record_finished("completed");
        tracing::info!(
            generation = state.generation,
            mode = %state.mode,
            seats_booked = state.seats.iter().filter(|s| s.booking_count() > 0).count(),
            "Simulation run completed"
        );
    }

    fn finish(
        state: &mut SimulationState,
        generation: u64,
        outcome: RunOutcome,
        env: &SimulationEnvironment,
    ) {
        if generation != state.generation {
            tracing::debug!(
                generation,
                current = state.generation,
                "Ignoring outcome of a superseded run"
            );
            return;
        }

        match outcome {
            RunOutcome::Completed => {
                if state.is_running() {
                    tracing::warn!(generation, "Engine returned without reporting completion");
                    state.status = Status::Completed;
                    state.finished_at = Some(env.clock.now());
                    SimulationMetrics::record_finished("completed");
                }
            }
            RunOutcome::Cancelled => {
                if state.is_running() {
                    tracing::debug!(generation, "Engine cancelled the run");
                    state.status = Status::Stopped;
                    state.finished_at = Some(env.clock.now());
                    SimulationMetrics::record_finished("cancelled");
                }
            }
            RunOutcome::Faulted(fault) => {
                tracing::error!(generation, %fault, "Simulation run failed");
                SimulationMetrics::record_finished("faulted");
                if state.is_running() {
                    state.status = Status::Stopped;
                    state.finished_at = Some(env.clock.now());
                }
                state.last_fault = Some(fault);
            }
        }
    }
}

impl Reducer for SimulationReducer {
    type State = SimulationState;
    type Action = SimulationAction;
    type Environment = SimulationEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            SimulationAction::Run => Self::run(state, env),
            SimulationAction::Stop => Self::stop(state, env),
            SimulationAction::Reset => Self::reset(state, env),
            SimulationAction::Configure(change) => {
                Self::configure(state, change);
                smallvec![Effect::None]
            }
            SimulationAction::Engine { generation, event } => {
                Self::apply_event(state, generation, event, env);
                smallvec![Effect::None]
            }
            SimulationAction::RunFinished { generation, outcome } => {
                Self::finish(state, generation, outcome, env);
                smallvec![Effect::None]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Mode, SeatState};
    use seatrace_engine::Strategy;
    use seatrace_testing::{ReducerTest, Script, ScriptedEngineFactory, assertions, test_clock};
    use tokio::sync::mpsc;

    fn test_env() -> SimulationEnvironment {
        let (events, _rx) = mpsc::unbounded_channel();
        let factory = ScriptedEngineFactory::new(Script::new().then_complete());
        let settings = SimulationSettings {
            total_seats: 4,
            total_threads: 10,
            ..SimulationSettings::default()
        };
        SimulationEnvironment::new(
            Arc::new(RunController::new(Arc::new(factory), events)),
            Arc::new(test_clock()),
            Arc::new(settings),
        )
    }

    fn idle(mode: Mode) -> SimulationState {
        SimulationState::idle(mode, crate::model::RunConfig::default(), 4, 10)
    }

    fn running(mode: Mode) -> SimulationState {
        let mut state = idle(mode);
        state.generation = 1;
        state.status = Status::Running;
        state
    }

    fn seat(number: usize, ids: &[usize]) -> SeatSnapshot {
        SeatSnapshot {
            number,
            booked: !ids.is_empty(),
            collision: ids.len() > 1,
            deadlocked: false,
            thread_ids: ids.to_vec(),
        }
    }

    fn popcorn(number: usize, reserved: bool) -> PopcornSnapshot {
        PopcornSnapshot {
            number,
            reserved,
            deadlocked: !reserved,
            holder: None,
        }
    }

    fn event(generation: u64, event: EngineEvent) -> SimulationAction {
        SimulationAction::Engine { generation, event }
    }

    #[test]
    fn test_run_starts_new_generation() {
        ReducerTest::new(SimulationReducer::new())
            .with_env(test_env())
            .given_state(idle(Mode::Safe))
            .when_action(SimulationAction::Run)
            .then_state(|state| {
                assert_eq!(state.status, Status::Running);
                assert_eq!(state.generation, 1);
                assert_eq!(state.started_at, Some(test_clock().now()));
                assert!(state.seats.iter().all(|s| s.state == SeatState::Empty));
            })
            .then_effects(|effects| {
                assertions::assert_effects_count(effects, 1);
                assertions::assert_has_future_effect(effects);
            })
            .run();
    }

    #[test]
    fn test_run_while_running_is_ignored() {
        ReducerTest::new(SimulationReducer::new())
            .with_env(test_env())
            .given_state(idle(Mode::Unsafe))
            .when_actions([SimulationAction::Run, SimulationAction::Run])
            .then_state(|state| assert_eq!(state.generation, 1))
            .then_effects(|effects| {
                assertions::assert_effects_count(effects, 2);
                assert!(effects[1].is_none());
            })
            .run();
    }

    #[test]
    fn test_run_after_completion_clears_previous_results() {
        let mut state = running(Mode::Safe);
        state.status = Status::Completed;
        state.seats[0] = Seat::from_engine(&seat(0, &[3]));
        state.progress = 10;

        ReducerTest::new(SimulationReducer::new())
            .with_env(test_env())
            .given_state(state)
            .when_action(SimulationAction::Run)
            .then_state(|state| {
                assert_eq!(state.generation, 2);
                assert_eq!(state.progress, 0);
                assert_eq!(state.seats[0].state, SeatState::Empty);
                assert_eq!(state.stats.booking().map(|c| c.seats_booked), Some(0));
            })
            .run();
    }

    #[test]
    fn test_stop_only_affects_running() {
        ReducerTest::new(SimulationReducer::new())
            .with_env(test_env())
            .given_state(idle(Mode::Safe))
            .when_action(SimulationAction::Stop)
            .then_state(|state| assert_eq!(state.status, Status::Idle))
            .then_effects(assertions::assert_no_future_effect)
            .run();

        ReducerTest::new(SimulationReducer::new())
            .with_env(test_env())
            .given_state(running(Mode::Safe))
            .when_action(SimulationAction::Stop)
            .then_state(|state| {
                assert_eq!(state.status, Status::Stopped);
                assert_eq!(state.generation, 1);
                assert!(state.finished_at.is_some());
            })
            .then_effects(assertions::assert_has_future_effect)
            .run();
    }

    #[test]
    fn test_reset_bumps_generation_and_clears() {
        let mut state = running(Mode::Unsafe);
        state.seats[2] = Seat::from_engine(&seat(2, &[1, 2]));
        state.last_fault = Some("boom".to_string());

        ReducerTest::new(SimulationReducer::new())
            .with_env(test_env())
            .given_state(state)
            .when_action(SimulationAction::Reset)
            .then_state(|state| {
                assert_eq!(state.status, Status::Idle);
                assert_eq!(state.generation, 2);
                assert_eq!(state.mode, Mode::Unsafe);
                assert_eq!(state.seats[2].state, SeatState::Empty);
                assert!(state.last_fault.is_none());
            })
            .then_effects(assertions::assert_has_future_effect)
            .run();
    }

    #[test]
    fn test_configure_rejected_while_running() {
        ReducerTest::new(SimulationReducer::new())
            .with_env(test_env())
            .given_state(running(Mode::Safe))
            .when_action(SimulationAction::Configure(
                ConfigChange::mode(Mode::Deadlock).with_delay_ms(9),
            ))
            .then_state(|state| {
                assert_eq!(state.mode, Mode::Safe);
                assert_eq!(state.config.delay_ms, 2);
                assert_eq!(state.status, Status::Running);
            })
            .then_effects(assertions::assert_no_future_effect)
            .run();
    }

    #[test]
    fn test_configure_mode_change_resets_to_idle() {
        let mut state = idle(Mode::Safe);
        state.status = Status::Completed;
        state.generation = 3;
        state.seats[1] = Seat::from_engine(&seat(1, &[4]));

        ReducerTest::new(SimulationReducer::new())
            .with_env(test_env())
            .given_state(state)
            .when_action(SimulationAction::Configure(
                ConfigChange::mode(Mode::Deadlock).with_lock_order(true),
            ))
            .then_state(|state| {
                assert_eq!(state.mode, Mode::Deadlock);
                assert!(state.config.lock_order);
                assert_eq!(state.status, Status::Idle);
                assert_eq!(state.generation, 3);
                assert_eq!(state.seats[1].state, SeatState::Empty);
                assert!(state.stats.deadlock().is_some());
            })
            .run();
    }

    #[test]
    fn test_configure_same_mode_keeps_results() {
        let mut state = idle(Mode::Unsafe);
        state.status = Status::Completed;
        state.seats[1] = Seat::from_engine(&seat(1, &[4]));

        ReducerTest::new(SimulationReducer::new())
            .with_env(test_env())
            .given_state(state)
            .when_action(SimulationAction::Configure(
                ConfigChange::mode(Mode::Unsafe).with_delay_ms(0),
            ))
            .then_state(|state| {
                assert_eq!(state.config.delay_ms, 0);
                assert_eq!(state.status, Status::Completed);
                assert_eq!(state.seats[1].state, SeatState::Booked);
            })
            .run();
    }

    #[test]
    fn test_seat_events_update_seats_and_stats() {
        ReducerTest::new(SimulationReducer::new())
            .with_env(test_env())
            .given_state(running(Mode::Unsafe))
            .when_actions([
                event(1, EngineEvent::SeatBooked { seat: seat(0, &[5]), worker: 5 }),
                event(1, EngineEvent::SeatBooked { seat: seat(1, &[6]), worker: 6 }),
                event(1, EngineEvent::CollisionDetected { seat: seat(1, &[6, 7]) }),
            ])
            .then_state(|state| {
                assert_eq!(state.seats[0].state, SeatState::Booked);
                assert_eq!(state.seats[1].state, SeatState::Collision);
                assert_eq!(state.seats[1].thread_ids, vec![6, 7]);
                let counters = state.stats.booking().copied().unwrap_or_default();
                assert_eq!(counters.seats_booked, 2);
                assert_eq!(counters.successful_bookings, 1);
                assert_eq!(counters.collisions, 1);
                assert_eq!(counters.oversold_by, 1);
            })
            .then_effects(assertions::assert_no_future_effect)
            .run();
    }

    #[test]
    fn test_stale_and_idle_events_are_dropped() {
        let mut stale = running(Mode::Safe);
        stale.generation = 2;

        ReducerTest::new(SimulationReducer::new())
            .with_env(test_env())
            .given_state(stale)
            .when_action(event(1, EngineEvent::SeatBooked { seat: seat(0, &[1]), worker: 1 }))
            .then_state(|state| assert_eq!(state.seats[0].state, SeatState::Empty))
            .run();

        let mut stopped = running(Mode::Safe);
        stopped.status = Status::Stopped;

        ReducerTest::new(SimulationReducer::new())
            .with_env(test_env())
            .given_state(stopped)
            .when_action(event(1, EngineEvent::Progress { active: 1, completed: 9, total: 10 }))
            .then_state(|state| assert_eq!(state.progress, 0))
            .run();
    }

    #[test]
    fn test_out_of_range_seat_is_ignored() {
        ReducerTest::new(SimulationReducer::new())
            .with_env(test_env())
            .given_state(running(Mode::Safe))
            .when_action(event(1, EngineEvent::SeatBooked { seat: seat(99, &[1]), worker: 1 }))
            .then_state(|state| {
                assert_eq!(state.seats.len(), 4);
                assert!(state.seats.iter().all(|s| s.state == SeatState::Empty));
            })
            .run();
    }

    #[test]
    fn test_progress_is_monotone_and_clamped() {
        ReducerTest::new(SimulationReducer::new())
            .with_env(test_env())
            .given_state(running(Mode::Safe))
            .when_actions([
                event(1, EngineEvent::Progress { active: 4, completed: 6, total: 10 }),
                event(1, EngineEvent::Progress { active: 6, completed: 3, total: 10 }),
            ])
            .then_state(|state| {
                assert_eq!(state.progress, 6);
                assert_eq!(state.active_threads, 6);
            })
            .run();

        ReducerTest::new(SimulationReducer::new())
            .with_env(test_env())
            .given_state(running(Mode::Safe))
            .when_action(event(1, EngineEvent::Progress { active: 0, completed: 50, total: 50 }))
            .then_state(|state| assert_eq!(state.progress, 10))
            .run();
    }

    #[test]
    fn test_activity_counters() {
        ReducerTest::new(SimulationReducer::new())
            .with_env(test_env())
            .given_state(running(Mode::Deadlock))
            .when_actions([
                event(
                    1,
                    EngineEvent::SimulationStarted {
                        total_threads: 10,
                        strategy: Strategy::Deadlock,
                    },
                ),
                event(1, EngineEvent::ThreadStarted { worker: 0 }),
                event(1, EngineEvent::BookingFailed { worker: 0 }),
                event(1, EngineEvent::ThreadCompleted { worker: 0 }),
                event(1, EngineEvent::ThreadStuck { worker: 1, wait_ms: 40 }),
                event(1, EngineEvent::ThreadStuck { worker: 2, wait_ms: 25 }),
            ])
            .then_state(|state| {
                assert_eq!(state.activity.threads_started, 1);
                assert_eq!(state.activity.threads_completed, 1);
                assert_eq!(state.activity.failed_bookings, 1);
                assert_eq!(state.activity.stuck_reports, 2);
                assert_eq!(state.activity.longest_wait_ms, 40);
            })
            .run();
    }

    #[test]
    fn test_deadlock_events_track_popcorns() {
        let stuck = SeatSnapshot {
            number: 2,
            booked: false,
            collision: false,
            deadlocked: true,
            thread_ids: vec![3, 4],
        };

        ReducerTest::new(SimulationReducer::new())
            .with_env(test_env())
            .given_state(running(Mode::Deadlock))
            .when_actions([
                event(
                    1,
                    EngineEvent::PairComplete {
                        seat: seat(0, &[1]),
                        popcorn: popcorn(0, true),
                        worker: 1,
                    },
                ),
                event(
                    1,
                    EngineEvent::DeadlockDetected {
                        seat: stuck,
                        popcorn: popcorn(2, false),
                        worker: 4,
                    },
                ),
            ])
            .then_state(|state| {
                let counters = state.stats.deadlock().copied().unwrap_or_default();
                assert_eq!(counters.pairs_complete, 1);
                assert_eq!(counters.deadlocks_detected, 1);
                assert_eq!(counters.threads_stuck, 2);
                assert_eq!(counters.popcorns_reserved, 1);
                assert_eq!(state.seats[2].state, SeatState::Deadlocked);
            })
            .run();
    }

    #[test]
    fn test_completion_sweeps_and_keeps_engine_report() {
        let seats = vec![seat(0, &[1]), seat(1, &[2, 3]), seat(2, &[]), seat(3, &[])];
        let report = FinalStats {
            oversold: 2,
            ..FinalStats::default()
        };

        ReducerTest::new(SimulationReducer::new())
            .with_env(test_env())
            .given_state(running(Mode::Unsafe))
            .when_action(event(
                1,
                EngineEvent::SimulationCompleted {
                    stats: report,
                    seats,
                    popcorns_reserved: 0,
                },
            ))
            .then_state(|state| {
                assert_eq!(state.status, Status::Completed);
                assert_eq!(state.progress, 10);
                assert_eq!(state.active_threads, 0);
                assert_eq!(state.seats[1].state, SeatState::Collision);
                assert_eq!(state.stats.booking().map(|c| c.oversold_by), Some(1));
                assert_eq!(state.stats.oversold(), 2);
                assert_eq!(state.finished_at, Some(test_clock().now()));
            })
            .run();
    }

    #[test]
    fn test_run_finished_outcomes() {
        ReducerTest::new(SimulationReducer::new())
            .with_env(test_env())
            .given_state(running(Mode::Safe))
            .when_action(SimulationAction::RunFinished {
                generation: 1,
                outcome: RunOutcome::Faulted("disk on fire".to_string()),
            })
            .then_state(|state| {
                assert_eq!(state.status, Status::Stopped);
                assert_eq!(state.last_fault.as_deref(), Some("disk on fire"));
            })
            .run();

        ReducerTest::new(SimulationReducer::new())
            .with_env(test_env())
            .given_state(running(Mode::Safe))
            .when_action(SimulationAction::RunFinished {
                generation: 1,
                outcome: RunOutcome::Cancelled,
            })
            .then_state(|state| assert_eq!(state.status, Status::Stopped))
            .run();

        ReducerTest::new(SimulationReducer::new())
            .with_env(test_env())
            .given_state(running(Mode::Safe))
            .when_action(SimulationAction::RunFinished {
                generation: 1,
                outcome: RunOutcome::Completed,
            })
            .then_state(|state| assert_eq!(state.status, Status::Completed))
            .run();
    }

    #[test]
    fn test_stale_run_finished_is_ignored() {
        let mut state = running(Mode::Safe);
        state.generation = 4;

        ReducerTest::new(SimulationReducer::new())
            .with_env(test_env())
            .given_state(state)
            .when_action(SimulationAction::RunFinished {
                generation: 3,
                outcome: RunOutcome::Faulted("old".to_string()),
            })
            .then_state(|state| {
                assert_eq!(state.status, Status::Running);
                assert!(state.last_fault.is_none());
            })
            .run();
    }

    #[test]
    fn test_completed_is_not_downgraded_by_cancel() {
        let mut state = running(Mode::Safe);
        state.status = Status::Completed;

        ReducerTest::new(SimulationReducer::new())
            .with_env(test_env())
            .given_state(state)
            .when_action(SimulationAction::RunFinished {
                generation: 1,
                outcome: RunOutcome::Cancelled,
            })
            .then_state(|state| assert_eq!(state.status, Status::Completed))
            .run();
    }
}
