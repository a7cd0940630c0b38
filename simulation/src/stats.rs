//! Stats aggregation.
//!
//! A pure function of the full seat list and the mode. Nothing here keeps
//! state between calls, so the reconciler can recompute after every seat
//! change and stats can never drift from seats.

use crate::model::{BookingCounters, Counters, DeadlockCounters, Mode, Seat, SeatState, Stats};

type CounterFn = fn(&[Seat], usize) -> Counters;

/// The counter function for each mode.
const fn counters_for(mode: Mode) -> CounterFn {
    match mode {
        Mode::Safe | Mode::Unsafe => booking_counters,
        Mode::Deadlock => deadlock_counters,
    }
}

/// Compute stats for `seats` under `mode`.
///
/// `popcorns_reserved` is the engine's paired-resource count and is only
/// reported in deadlock mode.
#[must_use]
pub fn aggregate(seats: &[Seat], mode: Mode, total_threads: usize, popcorns_reserved: usize) -> Stats {
    Stats {
        total_seats: seats.len(),
        total_threads,
        counters: counters_for(mode)(seats, popcorns_reserved),
        engine_report: None,
    }
}

fn count(seats: &[Seat], state: SeatState) -> usize {
    seats.iter().filter(|s| s.state == state).count()
}

fn booking_counters(seats: &[Seat], _popcorns_reserved: usize) -> Counters {
    let claims: usize = seats.iter().map(Seat::booking_count).sum();
    Counters::Booking(BookingCounters {
        seats_booked: seats.iter().filter(|s| s.state != SeatState::Empty).count(),
        successful_bookings: count(seats, SeatState::Booked),
        collisions: count(seats, SeatState::Collision),
        oversold_by: claims.saturating_sub(seats.len()),
    })
}

fn deadlock_counters(seats: &[Seat], popcorns_reserved: usize) -> Counters {
    Counters::Deadlock(DeadlockCounters {
        pairs_complete: count(seats, SeatState::Booked),
        deadlocks_detected: count(seats, SeatState::Deadlocked),
        threads_stuck: seats
            .iter()
            .filter(|s| s.state == SeatState::Deadlocked)
            .map(Seat::booking_count)
            .sum(),
        popcorns_reserved,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fresh_seats;
    use proptest::prelude::*;

    fn seat(id: usize, state: SeatState, ids: &[usize]) -> Seat {
        Seat {
            id,
            state,
            thread_ids: ids.to_vec(),
        }
    }

    #[test]
    fn test_empty_pool_is_zero() {
        let stats = aggregate(&fresh_seats(100), Mode::Safe, 1000, 0);
        assert_eq!(stats.total_seats, 100);
        assert_eq!(stats.total_threads, 1000);
        assert_eq!(stats.booking(), Some(&BookingCounters::default()));
    }

    #[test]
    fn test_booking_counts() {
        let mut seats = fresh_seats(3);
        seats[0] = seat(0, SeatState::Booked, &[1]);
        seats[1] = seat(1, SeatState::Collision, &[2, 3, 4, 5]);

        let stats = aggregate(&seats, Mode::Unsafe, 10, 0);
        let c = stats.booking().copied().unwrap_or_default();
        assert_eq!(c.seats_booked, 2);
        assert_eq!(c.successful_bookings, 1);
        assert_eq!(c.collisions, 1);
        // 5 claims over 3 seats
        assert_eq!(c.oversold_by, 2);
    }

    #[test]
    fn test_deadlock_counts() {
        let mut seats = fresh_seats(4);
        seats[0] = seat(0, SeatState::Booked, &[1]);
        seats[1] = seat(1, SeatState::Deadlocked, &[2, 3]);
        seats[2] = seat(2, SeatState::Deadlocked, &[4]);

        let stats = aggregate(&seats, Mode::Deadlock, 10, 7);
        let c = stats.deadlock().copied().unwrap_or_default();
        assert_eq!(c.pairs_complete, 1);
        assert_eq!(c.deadlocks_detected, 2);
        assert_eq!(c.threads_stuck, 3);
        assert_eq!(c.popcorns_reserved, 7);
        assert!(stats.booking().is_none());
    }

    fn arb_seat() -> impl Strategy<Value = (SeatState, Vec<usize>)> {
        prop_oneof![
            Just((SeatState::Empty, vec![])),
            (0..1000usize).prop_map(|id| (SeatState::Booked, vec![id])),
            proptest::collection::vec(0..1000usize, 2..6).prop_map(|ids| (SeatState::Collision, ids)),
            proptest::collection::vec(0..1000usize, 1..4).prop_map(|ids| (SeatState::Deadlocked, ids)),
        ]
    }

    fn arb_pool() -> impl Strategy<Value = Vec<Seat>> {
        proptest::collection::vec(arb_seat(), 1..120).prop_map(|raw| {
            raw.into_iter()
                .enumerate()
                .map(|(id, (state, thread_ids))| Seat { id, state, thread_ids })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn prop_booking_invariants(seats in arb_pool()) {
            let stats = aggregate(&seats, Mode::Unsafe, 1000, 0);
            let c = stats.booking().copied().unwrap_or_default();
            let claims: usize = seats.iter().map(Seat::booking_count).sum();

            prop_assert!(c.successful_bookings + c.collisions <= stats.total_seats);
            prop_assert_eq!(c.oversold_by, claims.saturating_sub(stats.total_seats));
        }

        #[test]
        fn prop_deadlock_invariants(seats in arb_pool(), reserved in 0..100usize) {
            let stats = aggregate(&seats, Mode::Deadlock, 1000, reserved);
            let c = stats.deadlock().copied().unwrap_or_default();
            let stuck: usize = seats
                .iter()
                .filter(|s| s.state == SeatState::Deadlocked)
                .map(|s| s.thread_ids.len())
                .sum();

            prop_assert!(c.pairs_complete + c.deadlocks_detected <= stats.total_seats);
            prop_assert_eq!(c.threads_stuck, stuck);
        }

        #[test]
        fn prop_aggregate_is_deterministic(seats in arb_pool()) {
            for mode in Mode::ALL {
                prop_assert_eq!(aggregate(&seats, mode, 1000, 3), aggregate(&seats, mode, 1000, 3));
            }
        }
    }
}
