//! Owns the engine of the current run and its background execution.
//!
//! At most one engine is registered at a time. Launch, halt and release are
//! serialized on one async mutex but may reach it in any order. A halt that
//! races a launch of the same generation always wins, and nothing aimed at an
//! older generation touches the engine of a newer one.

use crate::action::{RunOutcome, SimulationAction};
use crate::adapter::EventAdapter;
use seatrace_engine::{BookingEngine, EngineConfig, EngineError, EngineFactory};
use seatrace_runtime::metrics::SimulationMetrics;
use std::any::Any;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tokio::sync::mpsc::UnboundedSender;

/// What to launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    /// Generation the run belongs to
    pub generation: u64,
    /// Engine configuration
    pub config: EngineConfig,
}

struct ActiveRun {
    generation: u64,
    engine: Arc<dyn BookingEngine>,
}

#[derive(Default)]
struct RunSlot {
    current: Option<ActiveRun>,
    halted_through: u64,
    launched_through: u64,
}

/// Launches engines and routes their events into the reconciler's queue.
pub struct RunController {
    factory: Arc<dyn EngineFactory>,
    events: UnboundedSender<SimulationAction>,
    slot: Mutex<RunSlot>,
}

impl std::fmt::Debug for RunController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunController").finish_non_exhaustive()
    }
}

impl RunController {
    /// Controller creating engines with `factory` and queueing events on `events`.
    #[must_use]
    pub fn new(factory: Arc<dyn EngineFactory>, events: UnboundedSender<SimulationAction>) -> Self {
        Self {
            factory,
            events,
            slot: Mutex::new(RunSlot::default()),
        }
    }

    /// Create, register and run an engine; returns when the run has ended.
    ///
    /// The outcome is queued as [`SimulationAction::RunFinished`] behind every
    /// event the run emitted.
    pub async fn launch(&self, request: RunRequest) {
        let RunRequest { generation, config } = request;

        let engine = {
            let mut slot = self.slot.lock().await;

            if generation <= slot.halted_through {
                tracing::debug!(generation, "Run halted before launch");
                self.finish(generation, RunOutcome::Cancelled);
                return;
            }
            if generation <= slot.launched_through {
                tracing::debug!(
                    generation,
                    newest = slot.launched_through,
                    "Run superseded before launch"
                );
                self.finish(generation, RunOutcome::Cancelled);
                return;
            }
            slot.launched_through = generation;

            if let Some(previous) = slot.current.take() {
                tracing::debug!(
                    previous = previous.generation,
                    generation,
                    "Replacing previous engine"
                );
                previous.engine.stop_all_threads();
            }

            let engine = match self.factory.create(config) {
                Ok(engine) => engine,
                Err(error) => {
                    self.finish(generation, RunOutcome::Faulted(error.to_string()));
                    return;
                }
            };
            engine.add_observer(Box::new(EventAdapter::new(
                generation,
                self.events.clone(),
                &engine,
            )));
            slot.current = Some(ActiveRun {
                generation,
                engine: Arc::clone(&engine),
            });
            engine
        };

        let started = Instant::now();
        let result = tokio::task::spawn_blocking(move || engine.run()).await;
        SimulationMetrics::record_duration(started.elapsed());

        let outcome = match result {
            Ok(Ok(_)) => RunOutcome::Completed,
            Ok(Err(EngineError::Cancelled)) => RunOutcome::Cancelled,
            Ok(Err(error)) => RunOutcome::Faulted(error.to_string()),
            Err(join) if join.is_panic() => RunOutcome::Faulted(format!(
                "engine panicked: {}",
                panic_message(join.into_panic().as_ref())
            )),
            Err(join) => RunOutcome::Faulted(join.to_string()),
        };
        self.finish(generation, outcome);
    }

    /// Stop the engine of `generation` (or older) and keep later launches of
    /// those generations from starting. Does not wait for workers to exit.
    pub async fn halt(&self, generation: u64) {
        let mut slot = self.slot.lock().await;
        slot.halted_through = slot.halted_through.max(generation);
        if let Some(run) = slot.current.as_ref().filter(|run| run.generation <= generation) {
            tracing::debug!(generation = run.generation, "Halting engine");
            run.engine.stop_all_threads();
        }
    }

    /// Halt like [`halt`](Self::halt) and drop the engine.
    ///
    /// An engine launched for a later generation is left running: its launch
    /// may reach the slot before this release does.
    pub async fn release(&self, generation: u64) {
        let mut slot = self.slot.lock().await;
        slot.halted_through = slot.halted_through.max(generation);
        if slot.current.as_ref().is_some_and(|run| run.generation <= generation) {
            if let Some(run) = slot.current.take() {
                tracing::debug!(generation = run.generation, "Releasing engine");
                run.engine.stop_all_threads();
            }
        }
    }

    /// Best-effort synchronous stop, for teardown paths that cannot await.
    pub fn halt_now(&self) {
        if let Ok(slot) = self.slot.try_lock() {
            if let Some(run) = &slot.current {
                run.engine.stop_all_threads();
            }
        }
    }

    /// Generation of the registered engine, if any.
    pub async fn current_generation(&self) -> Option<u64> {
        self.slot.lock().await.current.as_ref().map(|run| run.generation)
    }

    fn finish(&self, generation: u64, outcome: RunOutcome) {
        if self
            .events
            .send(SimulationAction::RunFinished { generation, outcome })
            .is_err()
        {
            tracing::debug!(generation, "Event queue closed before run outcome was delivered");
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

    use super::*;
    use seatrace_testing::{Script, ScriptedEngineFactory};
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn blocking_runner() -> (
        Arc<RunController>,
        Arc<ScriptedEngineFactory>,
        mpsc::UnboundedReceiver<SimulationAction>,
    ) {
        let factory = Arc::new(ScriptedEngineFactory::new(Script::new().then_block()));
        let (events, queue) = mpsc::unbounded_channel();
        let runner = Arc::new(RunController::new(factory.clone(), events));
        (runner, factory, queue)
    }

    async fn launched(runner: &RunController, generation: u64) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while runner.current_generation().await != Some(generation) {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("engine registered");
    }

    async fn outcome(queue: &mut mpsc::UnboundedReceiver<SimulationAction>) -> (u64, RunOutcome) {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match queue.recv().await {
                    Some(SimulationAction::RunFinished { generation, outcome }) => {
                        return (generation, outcome);
                    }
                    Some(_) => {}
                    None => panic!("event queue closed"),
                }
            }
        })
        .await
        .expect("run finished")
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_release_of_older_generation_keeps_newer_engine() {
        let (runner, factory, mut queue) = blocking_runner();

        let launching = Arc::clone(&runner);
        let launch = tokio::spawn(async move {
            launching
                .launch(RunRequest {
                    generation: 3,
                    config: EngineConfig::default(),
                })
                .await;
        });
        launched(&runner, 3).await;

        // A reset issued before this run was started arrives late.
        runner.release(2).await;

        assert_eq!(runner.current_generation().await, Some(3));
        assert!(!factory.created()[0].was_stopped());

        runner.release(3).await;
        assert_eq!(runner.current_generation().await, None);
        assert!(factory.created()[0].was_stopped());

        launch.await.unwrap();
        assert_eq!(outcome(&mut queue).await, (3, RunOutcome::Cancelled));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_late_launch_of_older_generation_is_superseded() {
        let (runner, factory, mut queue) = blocking_runner();

        let launching = Arc::clone(&runner);
        let newest = tokio::spawn(async move {
            launching
                .launch(RunRequest {
                    generation: 3,
                    config: EngineConfig::default(),
                })
                .await;
        });
        launched(&runner, 3).await;

        runner
            .launch(RunRequest {
                generation: 1,
                config: EngineConfig::default(),
            })
            .await;

        assert_eq!(outcome(&mut queue).await, (1, RunOutcome::Cancelled));
        assert_eq!(factory.created_count(), 1);
        assert!(!factory.created()[0].was_stopped());
        assert_eq!(runner.current_generation().await, Some(3));

        runner.halt(3).await;
        newest.await.unwrap();
        assert_eq!(outcome(&mut queue).await, (3, RunOutcome::Cancelled));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_release_before_launch_cancels_that_generation() {
        let (runner, factory, mut queue) = blocking_runner();

        runner.release(2).await;
        runner
            .launch(RunRequest {
                generation: 1,
                config: EngineConfig::default(),
            })
            .await;

        assert_eq!(factory.created_count(), 0);
        assert_eq!(outcome(&mut queue).await, (1, RunOutcome::Cancelled));
    }

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "boom");

        let boxed: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(boxed.as_ref()), "bang");

        let boxed: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic payload");
    }
}
