//! # Seatrace Runtime
//!
//! The Store: the single writer of a reducer's state.
//!
//! Actions may be sent from any number of tasks. The Store applies them one
//! at a time, publishes the resulting state as an immutable `Arc` snapshot,
//! and only then starts the effects the reducer asked for. Readers hold
//! snapshots, never the state itself, so they cannot observe an action
//! halfway through being applied.
//!
//! ## Example
//!
//! ```ignore
//! use seatrace_runtime::Store;
//!
//! let store = Store::new(SimulationState::default(), SimulationReducer::new(), env);
//!
//! let published = store.send(SimulationAction::Run).await?;
//! assert!(published.is_running());
//!
//! let mut snapshots = store.subscribe();
//! snapshots.changed().await?;
//! ```

use seatrace_core::{effect::Effect, reducer::Reducer};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, watch};

/// Prometheus metrics for observability
pub mod metrics;

/// Error types for the Store runtime
pub mod error {
    use thiserror::Error;

    /// Errors that can occur during Store operations
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum StoreError {
        /// `shutdown()` was called; no further actions are applied
        #[error("Store is shutting down")]
        ShutdownInProgress,

        /// Effects were still running when the shutdown timeout elapsed
        #[error("Shutdown timed out with {0} effects still running")]
        ShutdownTimeout(usize),
    }
}

pub use error::StoreError;

/// Holds one slot in the pending-effect count until dropped, including when
/// the effect's task panics.
struct PendingGuard(Arc<watch::Sender<usize>>);

impl PendingGuard {
    fn acquire(pending: &Arc<watch::Sender<usize>>) -> Self {
        pending.send_modify(|count| *count += 1);
        Self(Arc::clone(pending))
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.0.send_modify(|count| *count = count.saturating_sub(1));
    }
}

struct Shared<R: Reducer> {
    state: Mutex<R::State>,
    snapshots: watch::Sender<Arc<R::State>>,
    reducer: R,
    environment: R::Environment,
    closed: AtomicBool,
    pending: Arc<watch::Sender<usize>>,
}

/// Runtime coordinator for a reducer.
///
/// Cloning is cheap; every clone drives the same state.
pub struct Store<R: Reducer> {
    shared: Arc<Shared<R>>,
}

impl<R: Reducer> Clone for Store<R> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<R> Store<R>
where
    R: Reducer + Send + Sync + 'static,
    R::State: Clone + Send + Sync + 'static,
    R::Action: Send + 'static,
    R::Environment: Send + Sync + 'static,
{
    /// Create a store and publish `initial_state` as the first snapshot.
    #[must_use]
    pub fn new(initial_state: R::State, reducer: R, environment: R::Environment) -> Self {
        let (snapshots, _) = watch::channel(Arc::new(initial_state.clone()));
        let (pending, _) = watch::channel(0);

        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(initial_state),
                snapshots,
                reducer,
                environment,
                closed: AtomicBool::new(false),
                pending: Arc::new(pending),
            }),
        }
    }

    /// Apply `action` and return the snapshot it produced.
    ///
    /// The state lock is fair, so concurrent senders are applied in the order
    /// they queued on it. Effects start after the snapshot is published.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] after [`shutdown`](Self::shutdown).
    #[tracing::instrument(skip_all, name = "store_send")]
    pub async fn send(&self, action: R::Action) -> Result<Arc<R::State>, StoreError> {
        if self.shared.closed.load(Ordering::Acquire) {
            metrics::counter!("store.shutdown.rejected_actions").increment(1);
            return Err(StoreError::ShutdownInProgress);
        }
        metrics::counter!("store.commands.total").increment(1);

        let (published, effects) = {
            let mut state = self.shared.state.lock().await;

            let started = Instant::now();
            let effects = self
                .shared
                .reducer
                .reduce(&mut state, action, &self.shared.environment);
            metrics::histogram!("store.reducer.duration_seconds")
                .record(started.elapsed().as_secs_f64());

            let published = Arc::new(state.clone());
            self.shared.snapshots.send_replace(Arc::clone(&published));
            (published, effects)
        };

        tracing::trace!(effects = effects.len(), "Action applied");
        for effect in effects {
            self.execute(effect);
        }
        Ok(published)
    }

    /// Latest published snapshot. Never waits on the writer.
    #[must_use]
    pub fn snapshot(&self) -> Arc<R::State> {
        Arc::clone(&*self.shared.snapshots.borrow())
    }

    /// Receiver notified on every published snapshot.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Arc<R::State>> {
        self.shared.snapshots.subscribe()
    }

    /// Effects started and not yet finished.
    #[must_use]
    pub fn pending_effects(&self) -> usize {
        *self.shared.pending.borrow()
    }

    /// Stop accepting actions, then wait for running effects.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownTimeout`] if effects are still running
    /// after `timeout`.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
        self.shared.closed.store(true, Ordering::Release);
        metrics::counter!("store.shutdown.initiated").increment(1);

        let mut pending = self.shared.pending.subscribe();
        let drained = tokio::time::timeout(timeout, pending.wait_for(|count| *count == 0)).await;
        if drained.is_ok() {
            tracing::info!("Store shut down");
            return Ok(());
        }

        let remaining = self.pending_effects();
        tracing::error!(pending_effects = remaining, "Store shutdown timed out");
        metrics::counter!("store.shutdown.timeout").increment(1);
        Err(StoreError::ShutdownTimeout(remaining))
    }

    fn execute(&self, effect: Effect<R::Action>) {
        let Effect::Future(fut) = effect else {
            metrics::counter!("store.effects.executed", "type" => "none").increment(1);
            return;
        };
        metrics::counter!("store.effects.executed", "type" => "future").increment(1);

        let guard = PendingGuard::acquire(&self.shared.pending);
        let store = self.clone();
        tokio::spawn(async move {
            let _guard = guard;
            if let Some(action) = fut.await {
                if let Err(error) = store.send(action).await {
                    tracing::debug!(%error, "Effect feedback rejected");
                }
            }
        });
    }
}
