//! Property tests for the reconciler
//!
//! Arbitrary interleavings of engine events must leave every snapshot
//! internally consistent.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use proptest::prelude::*;
use seatrace::{
    EngineEvent, Mode, RunController, SeatState, SimulationAction, SimulationEnvironment,
    SimulationReducer, SimulationSettings, SimulationState, Status, aggregate,
};
use seatrace_core::reducer::Reducer;
use seatrace_engine::{PopcornSnapshot, SeatSnapshot};
use seatrace_testing::{Script, ScriptedEngineFactory, test_clock};
use std::sync::Arc;
use tokio::sync::mpsc;

const SEATS: usize = 8;
const THREADS: usize = 40;

fn env() -> SimulationEnvironment {
    let (events, _queue) = mpsc::unbounded_channel();
    let settings = SimulationSettings {
        total_seats: SEATS,
        total_threads: THREADS,
        ..SimulationSettings::default()
    };
    SimulationEnvironment::new(
        Arc::new(RunController::new(
            Arc::new(ScriptedEngineFactory::new(Script::new())),
            events,
        )),
        Arc::new(test_clock()),
        Arc::new(settings),
    )
}

fn mode() -> impl Strategy<Value = Mode> {
    prop_oneof![Just(Mode::Safe), Just(Mode::Unsafe), Just(Mode::Deadlock)]
}

fn seat() -> impl Strategy<Value = SeatSnapshot> {
    // Ids past the pool exercise the bound check.
    (
        0..SEATS + 2,
        any::<bool>(),
        prop::collection::vec(0..THREADS, 0..4),
    )
        .prop_map(|(number, deadlocked, thread_ids)| SeatSnapshot {
            number,
            booked: !thread_ids.is_empty() && !deadlocked,
            collision: thread_ids.len() > 1,
            deadlocked,
            thread_ids,
        })
}

fn event() -> impl Strategy<Value = EngineEvent> {
    prop_oneof![
        (seat(), 0..THREADS).prop_map(|(seat, worker)| EngineEvent::SeatBooked { seat, worker }),
        seat().prop_map(|seat| EngineEvent::CollisionDetected { seat }),
        (seat(), any::<bool>(), 0..THREADS).prop_map(|(seat, reserved, worker)| {
            let popcorn = PopcornSnapshot {
                number: seat.number,
                reserved,
                deadlocked: !reserved,
                holder: None,
            };
            if reserved {
                EngineEvent::PairComplete { seat, popcorn, worker }
            } else {
                EngineEvent::DeadlockDetected { seat, popcorn, worker }
            }
        }),
        (0..THREADS, 0..THREADS * 2).prop_map(|(active, completed)| EngineEvent::Progress {
            active,
            completed,
            total: THREADS,
        }),
        (0..THREADS, 0..500u64).prop_map(|(worker, wait_ms)| EngineEvent::ThreadStuck {
            worker,
            wait_ms
        }),
        (0..THREADS).prop_map(|worker| EngineEvent::BookingFailed { worker }),
    ]
}

fn step() -> impl Strategy<Value = SimulationAction> {
    prop_oneof![
        8 => (0..3u64, event()).prop_map(|(lag, event)| SimulationAction::Engine {
            // Generation is rewritten against the live state when applied.
            generation: lag,
            event,
        }),
        1 => Just(SimulationAction::Stop),
        1 => Just(SimulationAction::Run),
    ]
}

fn assert_consistent(state: &SimulationState) {
    assert_eq!(state.seats.len(), SEATS);
    for (id, seat) in state.seats.iter().enumerate() {
        assert_eq!(seat.id, id);
        assert_eq!(seat.booking_count(), seat.thread_ids.len());
        if seat.state != SeatState::Deadlocked {
            assert_eq!(seat.state == SeatState::Empty, seat.thread_ids.is_empty());
        }
    }

    let expected = aggregate(
        &state.seats,
        state.mode,
        state.stats.total_threads,
        state.popcorns_reserved(),
    );
    assert_eq!(state.stats.counters, expected.counters);

    let total: usize = state.seats.iter().map(|s| s.booking_count()).sum();
    if let Some(c) = state.stats.booking() {
        assert!(c.successful_bookings + c.collisions <= SEATS);
        assert_eq!(c.oversold_by, total.saturating_sub(SEATS));
    }
    if let Some(c) = state.stats.deadlock() {
        assert!(c.pairs_complete + c.deadlocks_detected <= SEATS);
    }
    assert!(state.progress <= THREADS);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_snapshots_stay_consistent(mode in mode(), steps in prop::collection::vec(step(), 1..80)) {
        let reducer = SimulationReducer::new();
        let env = env();
        let mut state = SimulationState::new(&SimulationSettings {
            total_seats: SEATS,
            total_threads: THREADS,
            mode,
            ..SimulationSettings::default()
        });
        let _ = reducer.reduce(&mut state, SimulationAction::Run, &env);

        let mut last_progress = state.progress;
        let mut last_generation = state.generation;
        for action in steps {
            let action = match action {
                SimulationAction::Engine { generation: lag, event } => SimulationAction::Engine {
                    generation: state.generation.saturating_sub(lag),
                    event,
                },
                other => other,
            };
            let was_running = state.status == Status::Running;
            let _ = reducer.reduce(&mut state, action, &env);

            assert_consistent(&state);
            prop_assert!(state.generation >= last_generation);
            if state.generation == last_generation {
                prop_assert!(state.progress >= last_progress);
                if !was_running {
                    prop_assert_eq!(state.progress, last_progress);
                }
            }
            last_progress = state.progress;
            last_generation = state.generation;
        }
    }

    #[test]
    fn prop_reset_always_restores_idle(mode in mode(), steps in prop::collection::vec(step(), 0..40)) {
        let reducer = SimulationReducer::new();
        let env = env();
        let mut state = SimulationState::idle(mode, seatrace::RunConfig::default(), SEATS, THREADS);
        let _ = reducer.reduce(&mut state, SimulationAction::Run, &env);
        for action in steps {
            let action = match action {
                SimulationAction::Engine { event, .. } => SimulationAction::Engine {
                    generation: state.generation,
                    event,
                },
                other => other,
            };
            let _ = reducer.reduce(&mut state, action, &env);
        }

        let _ = reducer.reduce(&mut state, SimulationAction::Reset, &env);

        prop_assert_eq!(state.status, Status::Idle);
        prop_assert_eq!(state.progress, 0);
        prop_assert_eq!(state.seats.len(), SEATS);
        prop_assert!(state.seats.iter().all(|s| s.state == SeatState::Empty));
        prop_assert_eq!(state.stats.clone(), seatrace::Stats::zeroed(mode, SEATS, THREADS));
        prop_assert_eq!(state.popcorns_reserved(), 0);
    }
}
