//! Seatrace console runner
//!
//! Drives the booking simulation through the [`Orchestrator`] and prints
//! progress, statistics and a verdict for each run.
//!
//! # Usage
//!
//! ```bash
//! # SAFE vs UNSAFE comparison (default)
//! seatrace
//!
//! # A single mode, optionally dumping the final snapshot as JSON
//! seatrace unsafe --json
//! seatrace deadlock
//! seatrace prevention
//! ```
//!
//! Settings come from `SEATRACE_*` environment variables (a `.env` file is
//! loaded first). Ctrl+C stops the current run.

use clap::{Parser, ValueEnum};
use seatrace::{
    ConfigChange, Mode, Orchestrator, OrchestratorError, SimulationSettings, SimulationState,
    Status, report,
};
use seatrace_engine::ThreadedEngineFactory;
use seatrace_runtime::metrics::MetricsServer;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const PROGRESS_WIDTH: usize = 40;

/// Run the seat booking race and report what happened to the seats.
#[derive(Parser, Debug)]
#[command(name = "seatrace")]
#[command(about = "Concurrent seat booking simulation", long_about = None)]
struct Cli {
    /// Which simulation to run
    #[arg(value_enum, ignore_case = true, default_value_t = Command::Compare)]
    command: Command,

    /// Print the final snapshot as JSON (single-mode runs)
    #[arg(long)]
    json: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Synchronized booking
    Safe,
    /// Unsynchronized booking with collisions
    Unsafe,
    /// Seat + popcorn pairs locked in random order
    Deadlock,
    /// Seat + popcorn pairs locked in a global order
    Prevention,
    /// SAFE run followed by an UNSAFE run, side by side
    Compare,
}

impl Command {
    /// Mode and lock-order flag of a single run; `None` for `compare`.
    const fn single(self) -> Option<(Mode, bool)> {
        match self {
            Self::Safe => Some((Mode::Safe, false)),
            Self::Unsafe => Some((Mode::Unsafe, false)),
            Self::Deadlock => Some((Mode::Deadlock, false)),
            Self::Prevention => Some((Mode::Deadlock, true)),
            Self::Compare => None,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "seatrace=info,seatrace_runtime=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = SimulationSettings::from_env()?;
    settings.validate()?;

    let mut metrics = settings.metrics_addr.map(MetricsServer::new);
    if let Some(server) = metrics.as_mut() {
        server.start()?;
    }

    let orchestrator = Arc::new(Orchestrator::new(settings, Arc::new(ThreadedEngineFactory)));

    let interrupt = Arc::clone(&orchestrator);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received Ctrl+C signal");
            if let Err(error) = interrupt.stop().await {
                tracing::warn!(%error, "Failed to stop the simulation");
            }
        }
    });

    match cli.command.single() {
        Some((mode, lock_order)) => {
            let finished = run_once(&orchestrator, mode, lock_order).await?;
            println!("{}", report::statistics(&finished));
            println!("\nVERDICT:\n{}", report::verdict(&finished));
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&*finished)?);
            }
        }
        None => {
            let rule = "=".repeat(62);
            println!("\n{rule}\nRUNNING COMPARISON: SAFE vs UNSAFE\n{rule}");

            println!("\nRunning SAFE MODE...");
            let safe = run_once(&orchestrator, Mode::Safe, false).await?;
            println!("{}", report::summary(&safe));

            if safe.status == Status::Completed {
                println!("\nRunning UNSAFE MODE...");
                let unsafe_run = run_once(&orchestrator, Mode::Unsafe, false).await?;
                println!("{}", report::summary(&unsafe_run));
                println!("\n{}", report::comparison(&safe, &unsafe_run));
            }
        }
    }

    if let Some(text) = metrics.as_ref().and_then(MetricsServer::render) {
        tracing::debug!(metrics = %text, "Final metrics");
    }

    orchestrator.shutdown(Duration::from_secs(10)).await?;
    Ok(())
}

/// Configure, run, and follow one simulation until it ends.
async fn run_once(
    orchestrator: &Orchestrator,
    mode: Mode,
    lock_order: bool,
) -> Result<Arc<SimulationState>, OrchestratorError> {
    orchestrator
        .configure(ConfigChange::mode(mode).with_lock_order(lock_order))
        .await?;
    orchestrator.run().await?;

    let mut snapshots = orchestrator.subscribe();
    let first = Arc::clone(&*snapshots.borrow_and_update());
    println!("\n{}", report::header(&first));

    let started = Instant::now();
    let step = (first.stats.total_threads / 10).max(1);
    let mut shown = 0;
    let finished = loop {
        let state = Arc::clone(&*snapshots.borrow_and_update());
        if state.status.is_terminal() {
            break state;
        }
        if state.progress >= shown + step {
            shown = state.progress;
            println!("{}", report::progress_bar(&state, PROGRESS_WIDTH));
        }
        if snapshots.changed().await.is_err() {
            return Err(OrchestratorError::Closed);
        }
    };

    let rule = "=".repeat(60);
    match finished.status {
        Status::Completed => println!(
            "{}\n\n{rule}\n  SIMULATION COMPLETE\n{rule}\nTime taken: {}ms\n",
            report::progress_bar(&finished, PROGRESS_WIDTH),
            started.elapsed().as_millis()
        ),
        _ => println!("\nSimulation interrupted!\n"),
    }
    Ok(finished)
}
