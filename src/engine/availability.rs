use chrono::{Datelike, NaiveDate, Weekday};

use crate::model::{CoachSchedule, Minutes, Slot, Span};

// ── Availability queries ─────────────────────────────────────────

/// The slot whose window fully contains the candidate span on `weekday`,
/// if any. Slots for one weekday never overlap, so at most one can contain
/// the whole span.
pub fn slot_covering<'a>(slots: &'a [Slot], weekday: Weekday, span: &Span) -> Option<&'a Slot> {
    slots
        .iter()
        .find(|s| s.weekday == weekday && s.span.contains_span(span))
}

/// Point query: the slot open at `minute` on `weekday`, if any.
pub fn slot_at(slots: &[Slot], weekday: Weekday, minute: Minutes) -> Option<&Slot> {
    slots
        .iter()
        .find(|s| s.weekday == weekday && s.span.contains_instant(minute))
}

/// First existing slot on `weekday` overlapping the candidate window.
/// Used by slot administration to keep per-weekday slots disjoint.
pub fn slot_overlapping<'a>(
    slots: &'a [Slot],
    weekday: Weekday,
    span: &Span,
) -> Option<&'a Slot> {
    slots
        .iter()
        .find(|s| s.weekday == weekday && s.span.overlaps(span))
}

/// Compute the free windows of a coach on `date`: the weekday's slots minus
/// the spans of non-cancelled appointments. Used for calendar rendering,
/// not by the booking path (which checks containment + conflict directly).
pub fn free_windows(
    schedule: &CoachSchedule,
    date: NaiveDate,
    min_duration: Option<Minutes>,
) -> Vec<Span> {
    let weekday = date.weekday();

    let mut open: Vec<Span> = schedule.slots_for(weekday).map(|s| s.span).collect();
    open.sort_by_key(|s| s.start);
    let open = merge_overlapping(&open);

    let mut busy: Vec<Span> = schedule
        .day(date)
        .iter()
        .filter(|a| a.is_active())
        .map(|a| a.span)
        .collect();
    busy.sort_by_key(|s| s.start);

    let mut free = if busy.is_empty() {
        open
    } else {
        subtract_intervals(&open, &busy)
    };

    if let Some(min_dur) = min_duration {
        free.retain(|span| span.duration_minutes() >= min_dur);
    }

    free
}

/// Merge sorted overlapping/adjacent intervals into disjoint intervals.
pub fn merge_overlapping(sorted: &[Span]) -> Vec<Span> {
    let mut merged: Vec<Span> = Vec::new();
    for &span in sorted {
        if let Some(last) = merged.last_mut()
            && span.start <= last.end {
                last.end = last.end.max(span.end);
                continue;
            }
        merged.push(span);
    }
    merged
}

/// Subtract a sorted set of intervals from a sorted base set.
pub fn subtract_intervals(base: &[Span], to_remove: &[Span]) -> Vec<Span> {
    let mut result = Vec::new();
    let mut ri = 0;

    for &b in base {
        let mut current_start = b.start;
        let current_end = b.end;

        while ri < to_remove.len() && to_remove[ri].end <= current_start {
            ri += 1;
        }

        let mut j = ri;
        while j < to_remove.len() && to_remove[j].start < current_end {
            let r = &to_remove[j];
            if r.start > current_start {
                result.push(Span::new(current_start, r.start));
            }
            current_start = current_start.max(r.end);
            j += 1;
        }

        if current_start < current_end {
            result.push(Span::new(current_start, current_end));
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Appointment, Status};
    use ulid::Ulid;

    const H: Minutes = 60;

    fn slot(weekday: Weekday, start: Minutes, end: Minutes) -> Slot {
        Slot {
            id: Ulid::new(),
            coach_id: Ulid::new(),
            weekday,
            span: Span::new(start, end),
        }
    }

    fn schedule_with(slots: Vec<Slot>, appointments: Vec<Appointment>) -> CoachSchedule {
        let mut sched = CoachSchedule::new(Ulid::new());
        for s in slots {
            sched.insert_slot(s);
        }
        for a in appointments {
            sched.insert_appointment(a);
        }
        sched
    }

    fn appt(date: NaiveDate, start: Minutes, end: Minutes, status: Status) -> Appointment {
        Appointment {
            id: Ulid::new(),
            coach_id: Ulid::new(),
            user_id: Ulid::new(),
            date,
            span: Span::new(start, end),
            status,
            notes: None,
            rating: None,
            review: None,
        }
    }

    // ── subtract_intervals ────────────────────────────────

    #[test]
    fn subtract_no_overlap() {
        let base = vec![Span::new(100, 200), Span::new(300, 400)];
        let remove = vec![Span::new(200, 300)];
        let result = subtract_intervals(&base, &remove);
        assert_eq!(result, base);
    }

    #[test]
    fn subtract_full_overlap() {
        let base = vec![Span::new(100, 200)];
        let remove = vec![Span::new(50, 250)];
        let result = subtract_intervals(&base, &remove);
        assert!(result.is_empty());
    }

    #[test]
    fn subtract_partial_left() {
        let base = vec![Span::new(100, 200)];
        let remove = vec![Span::new(50, 150)];
        let result = subtract_intervals(&base, &remove);
        assert_eq!(result, vec![Span::new(150, 200)]);
    }

    #[test]
    fn subtract_partial_right() {
        let base = vec![Span::new(100, 200)];
        let remove = vec![Span::new(150, 250)];
        let result = subtract_intervals(&base, &remove);
        assert_eq!(result, vec![Span::new(100, 150)]);
    }

    #[test]
    fn subtract_middle_punch() {
        let base = vec![Span::new(100, 300)];
        let remove = vec![Span::new(150, 200)];
        let result = subtract_intervals(&base, &remove);
        assert_eq!(result, vec![Span::new(100, 150), Span::new(200, 300)]);
    }

    #[test]
    fn subtract_multiple_punches() {
        let base = vec![Span::new(0, 1000)];
        let remove = vec![
            Span::new(100, 200),
            Span::new(400, 500),
            Span::new(800, 900),
        ];
        let result = subtract_intervals(&base, &remove);
        assert_eq!(
            result,
            vec![
                Span::new(0, 100),
                Span::new(200, 400),
                Span::new(500, 800),
                Span::new(900, 1000),
            ]
        );
    }

    // ── merge_overlapping ────────────────────────────────

    #[test]
    fn merge_overlapping_basic() {
        let spans = vec![
            Span::new(100, 300),
            Span::new(200, 400),
            Span::new(500, 600),
        ];
        let merged = merge_overlapping(&spans);
        assert_eq!(merged, vec![Span::new(100, 400), Span::new(500, 600)]);
    }

    #[test]
    fn merge_overlapping_adjacent() {
        let spans = vec![Span::new(100, 200), Span::new(200, 300)];
        let merged = merge_overlapping(&spans);
        assert_eq!(merged, vec![Span::new(100, 300)]);
    }

    // ── slot queries ─────────────────────────────────────

    #[test]
    fn slot_covering_requires_full_containment() {
        let slots = vec![slot(Weekday::Mon, 9 * H, 12 * H)];
        // Fully inside
        assert!(slot_covering(&slots, Weekday::Mon, &Span::new(9 * H, 10 * H)).is_some());
        // The whole window
        assert!(slot_covering(&slots, Weekday::Mon, &Span::new(9 * H, 12 * H)).is_some());
        // Spills past the end
        assert!(slot_covering(&slots, Weekday::Mon, &Span::new(11 * H, 13 * H)).is_none());
        // Wrong weekday
        assert!(slot_covering(&slots, Weekday::Tue, &Span::new(9 * H, 10 * H)).is_none());
    }

    #[test]
    fn slot_at_point_query() {
        let slots = vec![
            slot(Weekday::Mon, 9 * H, 12 * H),
            slot(Weekday::Mon, 14 * H, 16 * H),
        ];
        assert!(slot_at(&slots, Weekday::Mon, 9 * H).is_some());
        assert!(slot_at(&slots, Weekday::Mon, 12 * H).is_none()); // half-open end
        assert_eq!(
            slot_at(&slots, Weekday::Mon, 15 * H).unwrap().span.start,
            14 * H
        );
        assert!(slot_at(&slots, Weekday::Mon, 13 * H).is_none());
    }

    #[test]
    fn slot_overlapping_ignores_other_weekdays() {
        let slots = vec![slot(Weekday::Fri, 9 * H, 12 * H)];
        assert!(slot_overlapping(&slots, Weekday::Fri, &Span::new(11 * H, 13 * H)).is_some());
        assert!(slot_overlapping(&slots, Weekday::Fri, &Span::new(12 * H, 13 * H)).is_none());
        assert!(slot_overlapping(&slots, Weekday::Sat, &Span::new(9 * H, 12 * H)).is_none());
    }

    // ── free_windows ─────────────────────────────────────

    #[test]
    fn free_windows_punches_out_bookings() {
        // 2026-09-07 is a Monday.
        let monday = NaiveDate::from_ymd_opt(2026, 9, 7).unwrap();
        let sched = schedule_with(
            vec![slot(Weekday::Mon, 9 * H, 12 * H)],
            vec![appt(monday, 10 * H, 10 * H + 30, Status::Pending)],
        );

        let free = free_windows(&sched, monday, None);
        assert_eq!(
            free,
            vec![Span::new(9 * H, 10 * H), Span::new(10 * H + 30, 12 * H)]
        );
    }

    #[test]
    fn free_windows_ignores_cancelled() {
        let monday = NaiveDate::from_ymd_opt(2026, 9, 7).unwrap();
        let sched = schedule_with(
            vec![slot(Weekday::Mon, 9 * H, 12 * H)],
            vec![appt(monday, 10 * H, 11 * H, Status::Cancelled)],
        );

        let free = free_windows(&sched, monday, None);
        assert_eq!(free, vec![Span::new(9 * H, 12 * H)]);
    }

    #[test]
    fn free_windows_filters_min_duration() {
        let monday = NaiveDate::from_ymd_opt(2026, 9, 7).unwrap();
        let sched = schedule_with(
            vec![slot(Weekday::Mon, 9 * H, 12 * H)],
            vec![appt(monday, 9 * H + 45, 11 * H + 30, Status::Confirmed)],
        );

        // Remaining windows: [9:00, 9:45) and [11:30, 12:00).
        let free = free_windows(&sched, monday, Some(40));
        assert_eq!(free, vec![Span::new(9 * H, 9 * H + 45)]);
    }

    #[test]
    fn free_windows_empty_off_day() {
        let tuesday = NaiveDate::from_ymd_opt(2026, 9, 8).unwrap();
        let sched = schedule_with(vec![slot(Weekday::Mon, 9 * H, 12 * H)], vec![]);
        assert!(free_windows(&sched, tuesday, None).is_empty());
    }
}
