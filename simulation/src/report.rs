//! Console report formatting.
//!
//! Pure functions of a snapshot; the binary decides where the text goes.

use crate::model::{Counters, Mode, Status};
use crate::state::SimulationState;

const WIDE: usize = 62;
const NARROW: usize = 40;

fn rule(ch: char, width: usize) -> String {
    std::iter::repeat_n(ch, width).collect()
}

fn mode_title(state: &SimulationState) -> &'static str {
    match (state.mode, state.config.lock_order) {
        (Mode::Safe, _) => "SAFE",
        (Mode::Unsafe, _) => "UNSAFE",
        (Mode::Deadlock, false) => "DEADLOCK",
        (Mode::Deadlock, true) => "DEADLOCK PREVENTION",
    }
}

/// Banner printed before a run.
#[must_use]
pub fn header(state: &SimulationState) -> String {
    let title = mode_title(state);
    format!(
        "{rule}\n  Running {title} MODE Simulation\n{rule}\nSeats: {} | Threads: {} | Mode: {title}\n",
        state.stats.total_seats,
        state.stats.total_threads,
        rule = rule('=', WIDE),
    )
}

/// Progress line, e.g. `[#####.....]  512/1000`.
#[must_use]
pub fn progress_bar(state: &SimulationState, width: usize) -> String {
    let total = state.stats.total_threads.max(1);
    let filled = (state.progress.min(total) * width) / total;
    format!(
        "[{}{}] {:>5}/{}",
        rule('#', filled),
        rule('.', width - filled),
        state.progress,
        state.stats.total_threads
    )
}

/// The statistics block for the snapshot's mode.
#[must_use]
pub fn statistics(state: &SimulationState) -> String {
    let stats = &state.stats;
    let mut out = format!("STATISTICS:\n{}\n", rule('-', NARROW));
    out.push_str(&format!("  Total Seats:           {:>4}\n", stats.total_seats));
    out.push_str(&format!("  Total Threads:         {:>4}\n", stats.total_threads));
    match stats.counters {
        Counters::Booking(c) => {
            out.push_str(&format!("  Seats Booked:          {:>4}\n", c.seats_booked));
            out.push_str(&format!("  Successful Bookings:   {:>4}\n", c.successful_bookings));
            out.push_str(&format!("  Collisions:            {:>4}\n", c.collisions));
            out.push_str(&format!("  Oversold By:           {:>4}\n", stats.oversold()));
            out.push_str(&format!("  Success Rate:        {:>5.1}%\n", stats.success_rate()));
        }
        Counters::Deadlock(c) => {
            out.push_str(&format!("  Pairs Complete:        {:>4}\n", c.pairs_complete));
            out.push_str(&format!("  Deadlocks Detected:    {:>4}\n", c.deadlocks_detected));
            out.push_str(&format!("  Threads Stuck:         {:>4}\n", c.threads_stuck));
            out.push_str(&format!("  Popcorns Reserved:     {:>4}\n", c.popcorns_reserved));
            out.push_str(&format!(
                "  Completion Rate:     {:>5.1}%\n",
                stats.deadlock_completion_rate()
            ));
        }
    }
    out.push_str(&rule('-', NARROW));
    out
}

/// Multi-line verdict on the system's integrity.
#[must_use]
pub fn verdict(state: &SimulationState) -> String {
    let stats = &state.stats;
    let title = mode_title(state);
    match stats.counters {
        Counters::Booking(c) => {
            let intact = c.collisions == 0 && stats.oversold() == 0;
            if state.mode == Mode::Safe && intact {
                format!(
                    "{title} MODE\n{} seats booked safely.\nSystem integrity: INTACT",
                    c.seats_booked
                )
            } else {
                format!(
                    "{title} MODE\nActual Seats: {}\nClaimed Bookings: {}\nCollisions: {}\nSystem integrity: {}",
                    c.seats_booked,
                    c.seats_booked + stats.oversold(),
                    c.collisions,
                    if intact { "INTACT" } else { "COMPROMISED" }
                )
            }
        }
        Counters::Deadlock(c) => format!(
            "{title} MODE\nPairs Complete: {}\nDeadlocks: {}\nThreads Stuck: {}\nSystem integrity: {}",
            c.pairs_complete,
            c.deadlocks_detected,
            c.threads_stuck,
            if c.deadlocks_detected == 0 { "INTACT" } else { "STALLED" }
        ),
    }
}

/// One-line summary.
#[must_use]
pub fn summary(state: &SimulationState) -> String {
    let stats = &state.stats;
    let line = match stats.counters {
        Counters::Booking(c) if state.mode == Mode::Safe && c.collisions == 0 => format!(
            "[SAFE]   Seats: {}/{} (Perfect)",
            c.seats_booked, stats.total_seats
        ),
        Counters::Booking(c) => format!(
            "[{}] Seats: {}/{} | Claims: {} | Collisions: {}",
            state.mode.as_str().to_uppercase(),
            c.seats_booked,
            stats.total_seats,
            c.seats_booked + stats.oversold(),
            c.collisions
        ),
        Counters::Deadlock(c) => format!(
            "[DEADLOCK] Pairs: {}/{} | Deadlocks: {} | Stuck: {}",
            c.pairs_complete, stats.total_seats, c.deadlocks_detected, c.threads_stuck
        ),
    };
    match (state.status, &state.last_fault) {
        (_, Some(fault)) => format!("{line} | FAULT: {fault}"),
        (Status::Stopped, None) => format!("{line} | STOPPED"),
        _ => line,
    }
}

/// Side-by-side table of a safe and an unsafe run.
#[must_use]
pub fn comparison(safe: &SimulationState, unsafe_run: &SimulationState) -> String {
    let counters = |state: &SimulationState| state.stats.booking().copied().unwrap_or_default();
    let (s, u) = (counters(safe), counters(unsafe_run));

    let mut out = format!(
        "{rule}\nCOMPARISON RESULTS\n{rule}\n{:<30} {:>15} {:>15}\n{}\n",
        "Metric",
        "SAFE MODE",
        "UNSAFE MODE",
        rule('-', WIDE),
        rule = rule('=', WIDE),
    );
    let rows = [
        ("Seats Booked", s.seats_booked, u.seats_booked),
        ("Successful Bookings", s.successful_bookings, u.successful_bookings),
        ("Collisions", s.collisions, u.collisions),
        ("Oversold", safe.stats.oversold(), unsafe_run.stats.oversold()),
    ];
    for (metric, left, right) in rows {
        out.push_str(&format!("{metric:<30} {left:>15} {right:>15}\n"));
    }
    out.push_str(&rule('-', WIDE));

    if s.collisions == 0 && safe.stats.oversold() == 0 {
        out.push_str("\n\nSafe Mode: Perfect integrity - no race conditions");
    } else {
        out.push_str(&format!("\n\nSafe Mode: {} collisions detected", s.collisions));
    }
    out.push_str(&format!(
        "\nUnsafe Mode: System compromised - {} collisions detected",
        u.collisions
    ));
    out
}
