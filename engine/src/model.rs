//! Engine-side seats and popcorn.
//!
//! These are the live, concurrently mutated objects the workers fight over.
//! Observers receive references to them and must copy what they need with
//! [`Seat::snapshot`] / [`Popcorn::snapshot`]; a copy is a consistent
//! point-in-time view because every field sits behind one lock.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// Identifier of a booking worker (its spawn index).
pub type WorkerId = usize;

// ============================================================================
// Seat
// ============================================================================

/// Mutable seat data guarded by the seat's lock.
#[derive(Debug, Default)]
struct SeatInner {
    booked: bool,
    collision: bool,
    deadlocked: bool,
    thread_ids: Vec<WorkerId>,
}

/// A seat in the engine's pool.
#[derive(Debug)]
pub struct Seat {
    number: usize,
    inner: Mutex<SeatInner>,
}

/// Owned point-in-time copy of a [`Seat`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatSnapshot {
    /// Seat index
    pub number: usize,
    /// At least one worker claimed the seat
    pub booked: bool,
    /// More than one worker claimed the seat
    pub collision: bool,
    /// The seat's pair ended in a lock timeout
    pub deadlocked: bool,
    /// Workers that touched the seat, in arrival order
    pub thread_ids: Vec<WorkerId>,
}

impl Seat {
    /// Create an empty seat.
    #[must_use]
    pub fn new(number: usize) -> Self {
        Self {
            number,
            inner: Mutex::new(SeatInner::default()),
        }
    }

    /// Rebuild a seat from a copy, e.g. to replay recorded events.
    #[must_use]
    pub fn from_snapshot(snapshot: SeatSnapshot) -> Self {
        Self {
            number: snapshot.number,
            inner: Mutex::new(SeatInner {
                booked: snapshot.booked,
                collision: snapshot.collision,
                deadlocked: snapshot.deadlocked,
                thread_ids: snapshot.thread_ids,
            }),
        }
    }

    /// Seat index.
    #[must_use]
    pub const fn number(&self) -> usize {
        self.number
    }

    /// Copy the current state.
    #[must_use]
    pub fn snapshot(&self) -> SeatSnapshot {
        let inner = self.inner.lock();
        SeatSnapshot {
            number: self.number,
            booked: inner.booked,
            collision: inner.collision,
            deadlocked: inner.deadlocked,
            thread_ids: inner.thread_ids.clone(),
        }
    }

    /// Whether any worker has claimed the seat.
    #[must_use]
    pub fn is_booked(&self) -> bool {
        self.inner.lock().booked
    }

    /// Whether the seat's pair is deadlocked.
    #[must_use]
    pub fn is_deadlocked(&self) -> bool {
        self.inner.lock().deadlocked
    }

    /// Claim the seat only if nobody has; used under the global booking lock.
    pub(crate) fn try_claim_empty(&self, worker: WorkerId) -> bool {
        let mut inner = self.inner.lock();
        if inner.booked {
            return false;
        }
        inner.booked = true;
        inner.thread_ids.push(worker);
        true
    }

    /// Claim the seat without checking ownership first.
    ///
    /// Returns `true` when the claim collided with an earlier one.
    pub(crate) fn claim_unguarded(&self, worker: WorkerId) -> bool {
        let mut inner = self.inner.lock();
        let was_booked = inner.booked;
        inner.booked = true;
        inner.thread_ids.push(worker);
        if was_booked || inner.thread_ids.len() > 1 {
            inner.collision = true;
        }
        inner.collision
    }

    pub(crate) fn book_pair(&self, worker: WorkerId) {
        let mut inner = self.inner.lock();
        inner.booked = true;
        inner.thread_ids.push(worker);
    }

    /// Flag the seat deadlocked and record `worker` among the stuck threads.
    pub(crate) fn mark_stuck(&self, worker: WorkerId) {
        let mut inner = self.inner.lock();
        inner.deadlocked = true;
        inner.thread_ids.push(worker);
    }

    /// Tooltip text for the seat.
    #[must_use]
    pub fn describe(&self) -> String {
        self.snapshot().describe()
    }
}

impl SeatSnapshot {
    /// Tooltip text: who holds the seat, or who collided/got stuck on it.
    #[must_use]
    pub fn describe(&self) -> String {
        let Some(first) = self.thread_ids.first() else {
            return if self.deadlocked {
                "DEADLOCK!".to_string()
            } else {
                "Empty seat".to_string()
            };
        };

        if self.deadlocked {
            return format!("DEADLOCK!\nThreads stuck: {}", join_threads(&self.thread_ids));
        }
        if self.collision {
            return format!("COLLISION!\nBooked by threads: {}", join_threads(&self.thread_ids));
        }
        format!("Seat booked by Thread #{first}")
    }
}

/// `#1, #2 and #3`
fn join_threads(ids: &[WorkerId]) -> String {
    let mut out = String::new();
    for (i, id) in ids.iter().enumerate() {
        if i > 0 {
            out.push_str(if i == ids.len() - 1 { " and " } else { ", " });
        }
        let _ = write!(out, "#{id}");
    }
    out
}

// ============================================================================
// Popcorn
// ============================================================================

#[derive(Debug, Default)]
struct PopcornInner {
    reserved: bool,
    deadlocked: bool,
    holder: Option<WorkerId>,
}

/// The paired resource a deadlock-mode worker must hold together with its seat.
#[derive(Debug)]
pub struct Popcorn {
    number: usize,
    inner: Mutex<PopcornInner>,
}

/// Owned point-in-time copy of a [`Popcorn`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopcornSnapshot {
    /// Popcorn index (same as its seat)
    pub number: usize,
    /// Reserved together with its seat
    pub reserved: bool,
    /// Part of a deadlocked pair
    pub deadlocked: bool,
    /// Worker currently holding the popcorn lock
    pub holder: Option<WorkerId>,
}

/// Clears the popcorn holder when dropped.
pub(crate) struct Holding<'a>(&'a Popcorn);

impl Drop for Holding<'_> {
    fn drop(&mut self) {
        self.0.inner.lock().holder = None;
    }
}

impl Popcorn {
    /// Create a free popcorn.
    #[must_use]
    pub fn new(number: usize) -> Self {
        Self {
            number,
            inner: Mutex::new(PopcornInner::default()),
        }
    }

    /// Rebuild a popcorn from a copy.
    #[must_use]
    pub fn from_snapshot(snapshot: PopcornSnapshot) -> Self {
        Self {
            number: snapshot.number,
            inner: Mutex::new(PopcornInner {
                reserved: snapshot.reserved,
                deadlocked: snapshot.deadlocked,
                holder: snapshot.holder,
            }),
        }
    }

    /// Popcorn index.
    #[must_use]
    pub const fn number(&self) -> usize {
        self.number
    }

    /// Copy the current state.
    #[must_use]
    pub fn snapshot(&self) -> PopcornSnapshot {
        let inner = self.inner.lock();
        PopcornSnapshot {
            number: self.number,
            reserved: inner.reserved,
            deadlocked: inner.deadlocked,
            holder: inner.holder,
        }
    }

    /// Whether the popcorn has been reserved.
    #[must_use]
    pub fn is_reserved(&self) -> bool {
        self.inner.lock().reserved
    }

    /// Whether the popcorn is part of a deadlocked pair.
    #[must_use]
    pub fn is_deadlocked(&self) -> bool {
        self.inner.lock().deadlocked
    }

    pub(crate) fn hold(&self, worker: WorkerId) -> Holding<'_> {
        self.inner.lock().holder = Some(worker);
        Holding(self)
    }

    pub(crate) fn reserve(&self) {
        self.inner.lock().reserved = true;
    }

    pub(crate) fn mark_deadlocked(&self) {
        self.inner.lock().deadlocked = true;
    }
}
