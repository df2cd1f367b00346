use chrono::{NaiveDate, NaiveTime, TimeDelta};

use crate::model::*;

// ── Slot grid ─────────────────────────────────────────────────────

fn slot_width() -> TimeDelta {
    TimeDelta::minutes(SLOT_MINUTES)
}

/// Fixed-width slot sequence over `[open, close)`.
///
/// Pure function of its inputs: cloning a grid restarts it. A trailing partial slot
/// is dropped, so the grid yields exactly `floor((close - open) / 30min)` slots, and
/// nothing at all when `close <= open`.
#[derive(Debug, Clone)]
pub struct SlotGrid {
    next: Option<NaiveTime>,
    close: NaiveTime,
}

pub fn slot_grid(open: NaiveTime, close: NaiveTime) -> SlotGrid {
    SlotGrid {
        next: (open < close).then_some(open),
        close,
    }
}

impl Iterator for SlotGrid {
    type Item = Span;

    fn next(&mut self) -> Option<Span> {
        let start = self.next?;
        let (end, wrapped) = start.overflowing_add_signed(slot_width());
        // A slot that would run past midnight or past closing is never emitted.
        if wrapped != 0 || end > self.close {
            self.next = None;
            return None;
        }
        self.next = Some(end);
        Some(Span::new(start, end))
    }
}

// ── Classification ───────────────────────────────────────────────

/// Whether `span` on `date` is free of both active bookings and blocked windows.
///
/// Two independent existence checks; either hit makes the slot unavailable.
pub fn slot_available(state: &LocationState, date: NaiveDate, span: &Span) -> bool {
    let booked = state
        .overlapping(date, span)
        .any(|i| i.kind == IntervalKind::Booking);
    if booked {
        return false;
    }
    !state
        .overlapping(date, span)
        .any(|i| i.kind == IntervalKind::Blocked)
}

/// The full availability grid for a location on a date.
pub fn classify_slots(state: &LocationState, date: NaiveDate) -> Vec<TimeSlot> {
    let location = &state.location;
    slot_grid(location.hours_open, location.hours_close)
        .map(|span| TimeSlot {
            start: span.start,
            end: span.end,
            available: slot_available(state, date, &span),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
    }

    fn make_state(open: NaiveTime, close: NaiveTime, intervals: Vec<Interval>) -> LocationState {
        let mut ls = LocationState::new(Location {
            id: Ulid::new(),
            name: "Test".into(),
            address: String::new(),
            city: String::new(),
            state: String::new(),
            zip: String::new(),
            hours_open: open,
            hours_close: close,
            num_tables: 1,
        });
        for i in intervals {
            ls.insert_interval(day(), i);
        }
        ls
    }

    fn booking(start: NaiveTime, end: NaiveTime) -> Interval {
        Interval {
            id: Ulid::new(),
            span: Span::new(start, end),
            kind: IntervalKind::Booking,
        }
    }

    fn blocked(start: NaiveTime, end: NaiveTime) -> Interval {
        Interval {
            id: Ulid::new(),
            span: Span::new(start, end),
            kind: IntervalKind::Blocked,
        }
    }

    fn availability(slots: &[TimeSlot]) -> Vec<bool> {
        slots.iter().map(|s| s.available).collect()
    }

    // ── slot_grid ──────────────────────────────────────────

    #[test]
    fn grid_one_hour_two_slots() {
        let slots: Vec<_> = slot_grid(t(7, 0), t(8, 0)).collect();
        assert_eq!(
            slots,
            vec![Span::new(t(7, 0), t(7, 30)), Span::new(t(7, 30), t(8, 0))]
        );
    }

    #[test]
    fn grid_count_matches_floor() {
        for (open, close, expected) in [
            (t(7, 0), t(18, 0), 22),
            (t(7, 0), t(19, 0), 24),
            (t(7, 0), t(7, 30), 1),
            (t(7, 0), t(7, 29), 0),
            (t(9, 15), t(10, 50), 3),
        ] {
            let slots: Vec<_> = slot_grid(open, close).collect();
            assert_eq!(slots.len(), expected, "{open}..{close}");
            assert_eq!(slots.first().map(|s| s.start).unwrap_or(open), open);
        }
    }

    #[test]
    fn grid_truncates_partial_trailing_slot() {
        let slots: Vec<_> = slot_grid(t(7, 0), t(7, 45)).collect();
        assert_eq!(slots, vec![Span::new(t(7, 0), t(7, 30))]);
        assert!(slots.iter().all(|s| s.end <= t(7, 45)));
    }

    #[test]
    fn grid_slots_are_consecutive_and_disjoint() {
        let slots: Vec<_> = slot_grid(t(7, 0), t(19, 0)).collect();
        for pair in slots.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
            assert!(!pair[0].overlaps(&pair[1]));
            assert_eq!(pair[0].duration(), TimeDelta::minutes(30));
        }
    }

    #[test]
    fn grid_empty_when_close_not_after_open() {
        assert_eq!(slot_grid(t(8, 0), t(8, 0)).count(), 0);
        assert_eq!(slot_grid(t(18, 0), t(7, 0)).count(), 0);
    }

    #[test]
    fn grid_never_wraps_past_midnight() {
        let slots: Vec<_> = slot_grid(t(23, 0), t(23, 59)).collect();
        assert_eq!(slots, vec![Span::new(t(23, 0), t(23, 30))]);
    }

    #[test]
    fn grid_is_restartable() {
        let grid = slot_grid(t(7, 0), t(9, 0));
        let first: Vec<_> = grid.clone().collect();
        let second: Vec<_> = grid.collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 4);
    }

    // ── classify_slots ─────────────────────────────────────

    #[test]
    fn classify_no_occupancy_all_available() {
        let ls = make_state(t(7, 0), t(9, 0), vec![]);
        let slots = classify_slots(&ls, day());
        assert_eq!(availability(&slots), vec![true; 4]);
    }

    #[test]
    fn classify_booking_marks_only_its_slot() {
        let ls = make_state(t(7, 0), t(8, 0), vec![booking(t(7, 0), t(7, 30))]);
        let slots = classify_slots(&ls, day());
        assert_eq!(availability(&slots), vec![false, true]);
    }

    #[test]
    fn classify_block_straddling_two_slots() {
        let ls = make_state(
            t(7, 0),
            t(8, 0),
            vec![booking(t(7, 0), t(7, 30)), blocked(t(7, 15), t(7, 45))],
        );
        let slots = classify_slots(&ls, day());
        assert_eq!(availability(&slots), vec![false, false]);
    }

    #[test]
    fn classify_block_fully_containing_slots() {
        let ls = make_state(t(7, 0), t(10, 0), vec![blocked(t(8, 0), t(9, 0))]);
        let slots = classify_slots(&ls, day());
        assert_eq!(availability(&slots), vec![true, true, false, false, true, true]);
    }

    #[test]
    fn classify_adjacent_booking_does_not_spill() {
        let ls = make_state(t(7, 0), t(9, 0), vec![booking(t(7, 30), t(8, 0))]);
        let slots = classify_slots(&ls, day());
        assert_eq!(availability(&slots), vec![true, false, true, true]);
    }

    #[test]
    fn classify_off_grid_booking_blocks_both_touched_slots() {
        let ls = make_state(t(7, 0), t(8, 0), vec![booking(t(7, 20), t(7, 40))]);
        let slots = classify_slots(&ls, day());
        assert_eq!(availability(&slots), vec![false, false]);
    }

    #[test]
    fn classify_other_dates_unaffected() {
        let ls = make_state(t(7, 0), t(8, 0), vec![blocked(t(7, 0), t(8, 0))]);
        let other = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        let slots = classify_slots(&ls, other);
        assert_eq!(availability(&slots), vec![true, true]);
    }

    #[test]
    fn classify_inverted_hours_empty() {
        let ls = make_state(t(19, 0), t(7, 0), vec![]);
        assert!(classify_slots(&ls, day()).is_empty());
    }

    #[test]
    fn slot_available_matches_per_slot_evaluation() {
        let intervals = vec![
            booking(t(7, 30), t(8, 0)),
            blocked(t(9, 10), t(9, 20)),
            booking(t(10, 0), t(11, 0)),
        ];
        let all: Vec<Span> = intervals.iter().map(|i| i.span).collect();
        let ls = make_state(t(7, 0), t(12, 0), intervals);
        for slot in classify_slots(&ls, day()) {
            let expected = !all.iter().any(|s| s.overlaps(&slot.span()));
            assert_eq!(slot.available, expected, "{slot:?}");
        }
    }
}
