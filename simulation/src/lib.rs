//! # Seatrace
//!
//! Orchestration and single-writer state reconciliation for a concurrent
//! seat booking simulation.
//!
//! A booking engine races up to a thousand worker threads over a pool of
//! seats using one of several locking disciplines. This crate turns the
//! engine's callbacks, fired concurrently from those workers, into a
//! consistent sequence of immutable snapshots:
//!
//! - [`adapter`]: the engine observer; copies each callback into an owned
//!   [`EngineEvent`] and enqueues it
//! - [`reducer`]: the only writer of [`SimulationState`], applying one
//!   action at a time
//! - [`stats`]: pure aggregation of seats into [`Stats`]
//! - [`orchestrator`]: the run/stop/reset/configure surface and snapshot
//!   subscription
//! - [`report`]: console formatting
//!
//! ## Example
//!
//! ```ignore
//! use seatrace::{Orchestrator, SimulationSettings};
//! use seatrace_engine::ThreadedEngineFactory;
//!
//! let orchestrator = Orchestrator::new(SimulationSettings::default(), Arc::new(ThreadedEngineFactory));
//! orchestrator.run().await?;
//! let finished = orchestrator.wait_until_finished(Duration::from_secs(60)).await?;
//! assert_eq!(finished.stats.oversold(), 0);
//! ```

pub mod action;
pub mod adapter;
pub mod controller;
pub mod model;
pub mod orchestrator;
pub mod reducer;
pub mod report;
pub mod settings;
pub mod state;
pub mod stats;

pub use action::{ConfigChange, EngineEvent, RunOutcome, SimulationAction};
pub use adapter::EventAdapter;
pub use controller::{RunController, RunRequest};
pub use model::{
    Activity, BookingCounters, Counters, DeadlockCounters, Mode, RunConfig, Seat, SeatState, Stats,
    Status, TOTAL_SEATS, TOTAL_THREADS,
};
pub use orchestrator::{Orchestrator, OrchestratorError, SimulationStore};
pub use reducer::{SimulationEnvironment, SimulationReducer};
pub use settings::{SettingsError, SimulationSettings};
pub use state::SimulationState;
pub use stats::aggregate;
