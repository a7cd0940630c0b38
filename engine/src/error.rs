//! Error types for the booking engine.

use thiserror::Error;

/// Errors that can occur while configuring or running the engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The run was halted through `stop_all_threads`
    #[error("Simulation was cancelled")]
    Cancelled,

    /// One or more worker threads panicked
    #[error("{0} worker thread(s) panicked")]
    WorkerPanicked(usize),

    /// The OS refused to spawn a thread
    #[error("Failed to spawn thread: {0}")]
    Spawn(String),

    /// `run` was called on an engine that has already been started
    #[error("Engine run already started")]
    AlreadyRunning,

    /// The configuration cannot produce a meaningful run
    #[error("Invalid engine configuration: {0}")]
    InvalidConfig(String),
}
