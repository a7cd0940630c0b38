//! Event adapter: the engine's observer, running on worker threads.
//!
//! Every callback copies what it needs out of the engine's live objects,
//! tags it with the run generation and pushes it onto an unbounded queue.
//! Nothing here touches the snapshot, and a push never blocks the worker.

use crate::action::{EngineEvent, SimulationAction};
use seatrace_engine::{
    BookingEngine, BookingObserver, FinalStats, Popcorn, Seat, Strategy, WorkerId,
};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc::UnboundedSender;

/// Forwards engine callbacks to the reconciler's queue.
pub struct EventAdapter {
    generation: u64,
    events: UnboundedSender<SimulationAction>,
    engine: Weak<dyn BookingEngine>,
}

impl std::fmt::Debug for EventAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventAdapter")
            .field("generation", &self.generation)
            .field("closed", &self.events.is_closed())
            .finish_non_exhaustive()
    }
}

impl EventAdapter {
    /// Adapter for the run `generation` of `engine`.
    ///
    /// Holds the engine weakly; the engine owns the adapter.
    #[must_use]
    pub fn new(
        generation: u64,
        events: UnboundedSender<SimulationAction>,
        engine: &Arc<dyn BookingEngine>,
    ) -> Self {
        Self {
            generation,
            events,
            engine: Arc::downgrade(engine),
        }
    }

    fn forward(&self, event: EngineEvent) {
        let action = SimulationAction::Engine {
            generation: self.generation,
            event,
        };
        if self.events.send(action).is_err() {
            tracing::trace!(generation = self.generation, "Event queue closed, dropping event");
        }
    }
}

impl BookingObserver for EventAdapter {
    fn on_simulation_started(&self, total_threads: usize, strategy: Strategy) {
        self.forward(EngineEvent::SimulationStarted {
            total_threads,
            strategy,
        });
    }

    fn on_seat_booked(&self, seat: &Seat, worker: WorkerId) {
        self.forward(EngineEvent::SeatBooked {
            seat: seat.snapshot(),
            worker,
        });
    }

    fn on_collision_detected(&self, seat: &Seat) {
        self.forward(EngineEvent::CollisionDetected {
            seat: seat.snapshot(),
        });
    }

    fn on_booking_failed(&self, worker: WorkerId) {
        self.forward(EngineEvent::BookingFailed { worker });
    }

    fn on_thread_started(&self, worker: WorkerId) {
        self.forward(EngineEvent::ThreadStarted { worker });
    }

    fn on_thread_completed(&self, worker: WorkerId) {
        self.forward(EngineEvent::ThreadCompleted { worker });
    }

    fn on_progress_update(&self, active: usize, completed: usize, total: usize) {
        self.forward(EngineEvent::Progress {
            active,
            completed,
            total,
        });
    }

    fn on_simulation_completed(&self, stats: &FinalStats) {
        let (seats, popcorns_reserved) = self
            .engine
            .upgrade()
            .map(|engine| (engine.seats(), engine.popcorns_reserved()))
            .unwrap_or_default();
        self.forward(EngineEvent::SimulationCompleted {
            stats: stats.clone(),
            seats,
            popcorns_reserved,
        });
    }

    fn on_deadlock_detected(&self, seat: &Seat, popcorn: &Popcorn, worker: WorkerId) {
        self.forward(EngineEvent::DeadlockDetected {
            seat: seat.snapshot(),
            popcorn: popcorn.snapshot(),
            worker,
        });
    }

    fn on_pair_complete(&self, seat: &Seat, popcorn: &Popcorn, worker: WorkerId) {
        self.forward(EngineEvent::PairComplete {
            seat: seat.snapshot(),
            popcorn: popcorn.snapshot(),
            worker,
        });
    }

    fn on_thread_stuck(&self, worker: WorkerId, wait_ms: u64) {
        self.forward(EngineEvent::ThreadStuck { worker, wait_ms });
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use seatrace_engine::{EngineConfig, ThreadedEngine};
    use tokio::sync::mpsc;

    fn engine() -> Arc<dyn BookingEngine> {
        Arc::new(ThreadedEngine::new(EngineConfig::default().with_seats(2).with_threads(1)).unwrap())
    }

    #[test]
    fn test_events_are_tagged_and_copied() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let engine = engine();
        let adapter = EventAdapter::new(7, tx, &engine);

        let seat = Seat::new(1);
        adapter.on_seat_booked(&seat, 3);
        drop(seat);

        let action = rx.try_recv().unwrap();
        let SimulationAction::Engine { generation, event } = action else {
            unreachable!("adapter only emits engine events");
        };
        assert_eq!(generation, 7);
        assert!(matches!(
            event,
            EngineEvent::SeatBooked { ref seat, worker: 3 } if seat.number == 1
        ));
    }

    #[test]
    fn test_forwarding_preserves_order_per_thread() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let engine = engine();
        let adapter = EventAdapter::new(1, tx, &engine);

        for worker in 0..50 {
            adapter.on_thread_started(worker);
        }

        for expected in 0..50 {
            let Ok(SimulationAction::Engine { event, .. }) = rx.try_recv() else {
                unreachable!("queue holds all events");
            };
            assert_eq!(event, EngineEvent::ThreadStarted { worker: expected });
        }
    }

    #[test]
    fn test_completion_carries_engine_pool() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let engine = engine();
        let adapter = EventAdapter::new(2, tx, &engine);

        adapter.on_simulation_completed(&FinalStats::default());

        let Ok(SimulationAction::Engine { event, .. }) = rx.try_recv() else {
            unreachable!("queue holds the completion");
        };
        let EngineEvent::SimulationCompleted { seats, .. } = event else {
            unreachable!("completion event");
        };
        assert_eq!(seats.len(), 2);
    }

    #[test]
    fn test_closed_queue_does_not_panic() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let engine = engine();
        let adapter = EventAdapter::new(1, tx, &engine);
        adapter.on_booking_failed(0);
        adapter.on_thread_stuck(0, 10);
    }
}
