use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};

use crate::limits::*;
use crate::model::{AppointmentId, CoachSchedule, Minutes, Span, MINUTES_PER_DAY};

use super::EngineError;

/// Wall clock for the future-dated check. Naive: all scheduling values are
/// interpreted in the deployment's single storage timezone.
pub(crate) fn now_naive() -> NaiveDateTime {
    Utc::now().naive_utc()
}

fn start_instant(date: NaiveDate, start: Minutes) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN) + Duration::minutes(start)
}

/// Validate the time shape of a booking request and derive its span.
/// The same checks guard create and reschedule.
pub(crate) fn validate_booking(
    date: NaiveDate,
    start: Minutes,
    duration_minutes: Minutes,
    now: NaiveDateTime,
) -> Result<Span, EngineError> {
    if duration_minutes <= 0 {
        return Err(EngineError::Validation("duration must be positive"));
    }
    if duration_minutes > MAX_APPOINTMENT_MINUTES {
        return Err(EngineError::LimitExceeded("session too long"));
    }
    if start < 0 || start >= MINUTES_PER_DAY {
        return Err(EngineError::Validation("start time outside the day"));
    }
    let span = Span::from_start_duration(start, duration_minutes);
    if span.end > MINUTES_PER_DAY {
        // Slots are per-weekday windows, so a midnight-crossing session
        // could never satisfy containment anyway; fail it clearly here.
        return Err(EngineError::Validation("session must end within its day"));
    }
    if start_instant(date, start) <= now {
        return Err(EngineError::Validation("start time must be in the future"));
    }
    if date.signed_duration_since(now.date()).num_days() > MAX_BOOKING_HORIZON_DAYS {
        return Err(EngineError::LimitExceeded("booking too far ahead"));
    }
    Ok(span)
}

/// First non-cancelled appointment for the coach on `date` whose interval
/// overlaps the candidate, skipping `exclude` (the appointment being
/// rescheduled). Half-open semantics: touching endpoints do not conflict.
/// Must run while holding the coach's write lock so the check and the
/// subsequent insert are atomic.
pub(crate) fn find_conflict(
    schedule: &CoachSchedule,
    date: NaiveDate,
    span: &Span,
    exclude: Option<AppointmentId>,
) -> Option<AppointmentId> {
    schedule
        .overlapping(date, span)
        .filter(|a| a.is_active())
        .find(|a| exclude != Some(a.id))
        .map(|a| a.id)
}

/// Commit-time backstop mirroring a storage uniqueness constraint: re-scan
/// the day immediately before the insert is journalled. Under the coach
/// write lock this always agrees with `find_conflict`; it exists so a code
/// path that bypassed the lock still cannot commit an overlap. Violations
/// surface as `Conflict` and the caller re-validates once before giving up.
pub(crate) fn assert_insertable(
    schedule: &CoachSchedule,
    date: NaiveDate,
    span: &Span,
    exclude: Option<AppointmentId>,
) -> Result<(), AppointmentId> {
    match find_conflict(schedule, date, span, exclude) {
        Some(id) => Err(id),
        None => Ok(()),
    }
}
