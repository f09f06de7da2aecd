use std::collections::{BTreeMap, HashMap};

use chrono::{NaiveDate, NaiveTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

pub type CoachId = Ulid;
pub type UserId = Ulid;
pub type SlotId = Ulid;
pub type AppointmentId = Ulid;

/// Whole minutes since midnight — the only time-of-day unit.
pub type Minutes = i64;

pub const MINUTES_PER_DAY: Minutes = 24 * 60;

/// Convert a wall-clock time to whole minutes since midnight. Seconds truncate.
pub fn minute_of(t: NaiveTime) -> Minutes {
    (t.num_seconds_from_midnight() / 60) as Minutes
}

/// Half-open interval `[start, end)` in minutes since midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Minutes,
    pub end: Minutes,
}

impl Span {
    pub fn new(start: Minutes, end: Minutes) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn from_start_duration(start: Minutes, duration_minutes: Minutes) -> Self {
        Self::new(start, start + duration_minutes)
    }

    pub fn duration_minutes(&self) -> Minutes {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: Minutes) -> bool {
        self.start <= t && t < self.end
    }

    /// Returns true if `self` fully contains `other`.
    pub fn contains_span(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

/// Appointment lifecycle state. The transition table lives in `engine::lifecycle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Confirmed => "confirmed",
            Status::Completed => "completed",
            Status::Cancelled => "cancelled",
        }
    }

    /// No status transition leaves a terminal state. Completed still admits
    /// a rating write, which is not a transition.
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Completed | Status::Cancelled)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Status {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, ()> {
        match s {
            "pending" => Ok(Status::Pending),
            "confirmed" => Ok(Status::Confirmed),
            "completed" => Ok(Status::Completed),
            "cancelled" => Ok(Status::Cancelled),
            _ => Err(()),
        }
    }
}

/// A recurring weekly availability window for a coach.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub id: SlotId,
    pub coach_id: CoachId,
    pub weekday: Weekday,
    pub span: Span,
}

/// A booked coaching session. Never physically deleted — cancellation is a
/// status change, which frees the interval for future bookings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: AppointmentId,
    pub coach_id: CoachId,
    pub user_id: UserId,
    pub date: NaiveDate,
    pub span: Span,
    pub status: Status,
    pub notes: Option<String>,
    pub rating: Option<u8>,
    pub review: Option<String>,
}

impl Appointment {
    /// Whether this appointment still occupies its interval for conflict purposes.
    pub fn is_active(&self) -> bool {
        self.status != Status::Cancelled
    }
}

/// A rating plus optional review, keyed by (coach, user). A re-rate overwrites.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feedback {
    pub coach_id: CoachId,
    pub user_id: UserId,
    pub appointment_id: AppointmentId,
    pub rating: u8,
    pub review: Option<String>,
}

fn weekday_index(w: Weekday) -> u32 {
    w.num_days_from_monday()
}

/// Per-coach aggregate: weekly slots plus the appointment book, one sorted
/// list per date. All writers for a coach serialize on this value's lock.
#[derive(Debug, Clone)]
pub struct CoachSchedule {
    pub coach_id: CoachId,
    /// Sorted by (weekday, span.start).
    pub slots: Vec<Slot>,
    /// Appointments per date, each list sorted by `span.start`.
    pub days: BTreeMap<NaiveDate, Vec<Appointment>>,
    /// Which date each appointment currently sits on.
    appointment_dates: HashMap<AppointmentId, NaiveDate>,
    /// Latest feedback per user.
    pub feedback: HashMap<UserId, Feedback>,
}

impl CoachSchedule {
    pub fn new(coach_id: CoachId) -> Self {
        Self {
            coach_id,
            slots: Vec::new(),
            days: BTreeMap::new(),
            appointment_dates: HashMap::new(),
            feedback: HashMap::new(),
        }
    }

    /// Insert a slot maintaining (weekday, start) sort order.
    pub fn insert_slot(&mut self, slot: Slot) {
        let key = (weekday_index(slot.weekday), slot.span.start);
        let pos = self
            .slots
            .binary_search_by_key(&key, |s| (weekday_index(s.weekday), s.span.start))
            .unwrap_or_else(|e| e);
        self.slots.insert(pos, slot);
    }

    pub fn remove_slot(&mut self, id: SlotId) -> Option<Slot> {
        if let Some(pos) = self.slots.iter().position(|s| s.id == id) {
            Some(self.slots.remove(pos))
        } else {
            None
        }
    }

    pub fn slots_for(&self, weekday: Weekday) -> impl Iterator<Item = &Slot> {
        self.slots.iter().filter(move |s| s.weekday == weekday)
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Insert an appointment maintaining per-day sort order by span.start.
    pub fn insert_appointment(&mut self, appt: Appointment) {
        self.appointment_dates.insert(appt.id, appt.date);
        let day = self.days.entry(appt.date).or_default();
        let pos = day
            .binary_search_by_key(&appt.span.start, |a| a.span.start)
            .unwrap_or_else(|e| e);
        day.insert(pos, appt);
    }

    /// Remove and return an appointment (used when rescheduling).
    pub fn take_appointment(&mut self, id: AppointmentId) -> Option<Appointment> {
        let date = self.appointment_dates.remove(&id)?;
        let day = self.days.get_mut(&date)?;
        let pos = day.iter().position(|a| a.id == id)?;
        let appt = day.remove(pos);
        if day.is_empty() {
            self.days.remove(&date);
        }
        Some(appt)
    }

    pub fn appointment(&self, id: AppointmentId) -> Option<&Appointment> {
        let date = self.appointment_dates.get(&id)?;
        self.days.get(date)?.iter().find(|a| a.id == id)
    }

    pub fn appointment_mut(&mut self, id: AppointmentId) -> Option<&mut Appointment> {
        let date = self.appointment_dates.get(&id)?;
        self.days.get_mut(date)?.iter_mut().find(|a| a.id == id)
    }

    /// All appointments on a date, sorted by start. Empty slice if none.
    pub fn day(&self, date: NaiveDate) -> &[Appointment] {
        self.days.get(&date).map(Vec::as_slice).unwrap_or_default()
    }

    /// Appointments on `date` whose span overlaps the query window.
    /// Uses binary search to skip appointments starting at or after `query.end`.
    pub fn overlapping(&self, date: NaiveDate, query: &Span) -> impl Iterator<Item = &Appointment> {
        let day = self.day(date);
        // Everything at index >= right_bound starts at or after query.end → can't overlap.
        let right_bound = day.partition_point(|a| a.span.start < query.end);
        day[..right_bound]
            .iter()
            .filter(move |a| a.span.end > query.start)
    }
}

/// The event types — flat, no nesting. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    SlotAdded {
        id: SlotId,
        coach_id: CoachId,
        weekday: Weekday,
        span: Span,
    },
    SlotRemoved {
        id: SlotId,
        coach_id: CoachId,
    },
    AppointmentBooked {
        id: AppointmentId,
        coach_id: CoachId,
        user_id: UserId,
        date: NaiveDate,
        span: Span,
        notes: Option<String>,
    },
    /// Reschedule and/or notes change; carries the resulting values.
    AppointmentAmended {
        id: AppointmentId,
        coach_id: CoachId,
        date: NaiveDate,
        span: Span,
        notes: Option<String>,
    },
    StatusChanged {
        id: AppointmentId,
        coach_id: CoachId,
        status: Status,
    },
    FeedbackRecorded {
        appointment_id: AppointmentId,
        coach_id: CoachId,
        user_id: UserId,
        rating: u8,
        review: Option<String>,
    },
}

impl Event {
    /// The coach whose schedule this event mutates.
    pub fn coach_id(&self) -> CoachId {
        match self {
            Event::SlotAdded { coach_id, .. }
            | Event::SlotRemoved { coach_id, .. }
            | Event::AppointmentBooked { coach_id, .. }
            | Event::AppointmentAmended { coach_id, .. }
            | Event::StatusChanged { coach_id, .. }
            | Event::FeedbackRecorded { coach_id, .. } => *coach_id,
        }
    }
}
