use chrono::{NaiveDate, NaiveTime, Weekday};

use crate::model::*;

use super::availability::{free_windows, slot_at};
use super::conflict::find_conflict;
use super::{Engine, SharedCoachSchedule};

impl Engine {
    pub async fn get_appointment(&self, id: AppointmentId) -> Option<Appointment> {
        let coach_id = self.coach_of_entity(&id)?;
        let sched = self.schedule(&coach_id)?;
        let guard = sched.read().await;
        guard.appointment(id).cloned()
    }

    /// All appointments (any status) for a coach on a date, sorted by start.
    pub async fn appointments_on(&self, coach_id: CoachId, date: NaiveDate) -> Vec<Appointment> {
        match self.schedule(&coach_id) {
            Some(sched) => sched.read().await.day(date).to_vec(),
            None => Vec::new(),
        }
    }

    /// A user's appointments across all coaches, ordered by date then start.
    pub async fn appointments_of_user(&self, user_id: UserId) -> Vec<Appointment> {
        let schedules: Vec<SharedCoachSchedule> =
            self.state.iter().map(|e| e.value().clone()).collect();

        let mut out = Vec::new();
        for sched in schedules {
            let guard = sched.read().await;
            for day in guard.days.values() {
                out.extend(day.iter().filter(|a| a.user_id == user_id).cloned());
            }
        }
        out.sort_by_key(|a| (a.date, a.span.start));
        out
    }

    /// A coach's weekly slots, for calendar rendering. Sorted by
    /// (weekday, start); not consulted by conflict logic.
    pub async fn slots_of(&self, coach_id: CoachId) -> Vec<Slot> {
        match self.schedule(&coach_id) {
            Some(sched) => sched.read().await.slots.clone(),
            None => Vec::new(),
        }
    }

    /// The slot open at `time` on `weekday`, if any.
    pub async fn find_slot(
        &self,
        coach_id: CoachId,
        weekday: Weekday,
        time: NaiveTime,
    ) -> Option<Slot> {
        let sched = self.schedule(&coach_id)?;
        let guard = sched.read().await;
        slot_at(&guard.slots, weekday, minute_of(time)).cloned()
    }

    /// Free windows for a coach on a date: weekday slots minus non-cancelled
    /// appointments, optionally filtered to a minimum duration.
    pub async fn free_windows_on(
        &self,
        coach_id: CoachId,
        date: NaiveDate,
        min_duration: Option<Minutes>,
    ) -> Vec<Span> {
        match self.schedule(&coach_id) {
            Some(sched) => free_windows(&*sched.read().await, date, min_duration),
            None => Vec::new(),
        }
    }

    /// Would the candidate interval collide with a non-cancelled appointment?
    /// Advisory for UIs; the booking path re-checks under the coach lock.
    pub async fn has_conflict(
        &self,
        coach_id: CoachId,
        date: NaiveDate,
        start: NaiveTime,
        duration_minutes: Minutes,
        exclude: Option<AppointmentId>,
    ) -> bool {
        if duration_minutes <= 0 {
            return false;
        }
        let Some(sched) = self.schedule(&coach_id) else {
            return false;
        };
        let guard = sched.read().await;
        let span = Span::from_start_duration(minute_of(start), duration_minutes);
        find_conflict(&guard, date, &span, exclude).is_some()
    }

    /// Latest feedback per user for a coach, ordered by user id.
    pub async fn feedback_for(&self, coach_id: CoachId) -> Vec<Feedback> {
        match self.schedule(&coach_id) {
            Some(sched) => {
                let guard = sched.read().await;
                let mut out: Vec<Feedback> = guard.feedback.values().cloned().collect();
                out.sort_by_key(|f| f.user_id);
                out
            }
            None => Vec::new(),
        }
    }
}
