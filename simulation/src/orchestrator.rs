//! Orchestrator: lifecycle control surface over the reconciler's Store.
//!
//! Owns the Store, the [`RunController`] and the pump task that drains the
//! engine event queue into the Store one action at a time. Readers get
//! immutable snapshots; writers only ever go through [`Orchestrator::run`],
//! [`Orchestrator::stop`], [`Orchestrator::reset`] and
//! [`Orchestrator::configure`].
//!
//! # Example
//!
//! ```ignore
//! let orchestrator = Orchestrator::new(settings, Arc::new(ThreadedEngineFactory));
//! orchestrator.run().await?;
//! let done = orchestrator.wait_until_finished(Duration::from_secs(30)).await?;
//! println!("{}", report::summary(&done));
//! ```

use crate::action::{ConfigChange, SimulationAction};
use crate::controller::RunController;
use crate::reducer::{SimulationEnvironment, SimulationReducer};
use crate::settings::SimulationSettings;
use crate::state::SimulationState;
use seatrace_core::environment::{Clock, SystemClock};
use seatrace_engine::EngineFactory;
use seatrace_runtime::{Store, StoreError};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// The Store type driving the simulation.
pub type SimulationStore = Store<SimulationReducer>;

/// Errors from the control surface.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    /// The Store rejected the action
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration is read-only while a run is in flight
    #[error("Configuration cannot change while a run is in progress")]
    ConfigurationLocked,

    /// The awaited condition did not hold in time
    #[error("Timed out waiting for the simulation")]
    Timeout,

    /// The snapshot channel closed
    #[error("Snapshot channel closed")]
    Closed,
}

/// Runs simulations and publishes their snapshots.
pub struct Orchestrator {
    store: SimulationStore,
    runner: Arc<RunController>,
    pump: JoinHandle<()>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("runner", &self.runner)
            .field("pending_effects", &self.store.pending_effects())
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Orchestrator using the wall clock.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn new(settings: SimulationSettings, factory: Arc<dyn EngineFactory>) -> Self {
        Self::with_clock(settings, factory, Arc::new(SystemClock))
    }

    /// Orchestrator with an injected clock.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn with_clock(
        settings: SimulationSettings,
        factory: Arc<dyn EngineFactory>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (events, mut queue) = mpsc::unbounded_channel();
        let runner = Arc::new(RunController::new(factory, events));

        let initial = SimulationState::new(&settings);
        let env = SimulationEnvironment::new(Arc::clone(&runner), clock, Arc::new(settings));
        let store = Store::new(initial, SimulationReducer::new(), env);

        let sink = store.clone();
        let pump = tokio::spawn(async move {
            while let Some(action) = queue.recv().await {
                if let Err(error) = sink.send(action).await {
                    tracing::debug!(%error, "Event pump stopping");
                    break;
                }
            }
        });

        Self {
            store,
            runner,
            pump,
        }
    }

    /// Start a run in the background. A no-op while a run is in flight.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::Store`] after shutdown.
    pub async fn run(&self) -> Result<(), OrchestratorError> {
        self.store.send(SimulationAction::Run).await?;
        Ok(())
    }

    /// Ask the current run to halt. Returns without waiting for workers.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::Store`] after shutdown.
    pub async fn stop(&self) -> Result<(), OrchestratorError> {
        self.store.send(SimulationAction::Stop).await?;
        Ok(())
    }

    /// Halt any run and clear everything back to Idle.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::Store`] after shutdown.
    pub async fn reset(&self) -> Result<(), OrchestratorError> {
        self.store.send(SimulationAction::Reset).await?;
        Ok(())
    }

    /// Change mode, delay or lock order for the next run.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::ConfigurationLocked`] while running, or
    /// [`OrchestratorError::Store`] after shutdown.
    pub async fn configure(&self, change: ConfigChange) -> Result<(), OrchestratorError> {
        // The reducer leaves a change unapplied exactly when a run is in
        // flight, so the snapshot it published tells whether this one landed.
        let published = self.store.send(SimulationAction::Configure(change)).await?;
        if published.is_running() {
            return Err(OrchestratorError::ConfigurationLocked);
        }
        Ok(())
    }

    /// Latest published snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<SimulationState> {
        self.store.snapshot()
    }

    /// Receiver notified on every published snapshot.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Arc<SimulationState>> {
        self.store.subscribe()
    }

    /// Wait for the first snapshot satisfying `predicate`, checking the
    /// current one first.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::Timeout`] if no snapshot matched in time.
    pub async fn wait_for<F>(
        &self,
        mut predicate: F,
        timeout: Duration,
    ) -> Result<Arc<SimulationState>, OrchestratorError>
    where
        F: FnMut(&SimulationState) -> bool,
    {
        let mut snapshots = self.store.subscribe();
        let waited = tokio::time::timeout(timeout, snapshots.wait_for(|state| predicate(state))).await;
        match waited {
            Ok(Ok(state)) => Ok(Arc::clone(&*state)),
            Ok(Err(_)) => Err(OrchestratorError::Closed),
            Err(_) => Err(OrchestratorError::Timeout),
        }
    }

    /// Wait until the status is Completed or Stopped.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::Timeout`] if the run is still going.
    pub async fn wait_until_finished(
        &self,
        timeout: Duration,
    ) -> Result<Arc<SimulationState>, OrchestratorError> {
        self.wait_for(|state| state.status.is_terminal(), timeout).await
    }

    /// Halt everything, wait for background work and stop the event pump.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::Store`] if the engine did not wind down
    /// within `timeout`.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), OrchestratorError> {
        self.runner.halt(u64::MAX).await;
        let result = self.store.shutdown(timeout).await;
        self.pump.abort();
        result.map_err(OrchestratorError::from)
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.pump.abort();
        self.runner.halt_now();
    }
}
