use chrono::{Datelike, NaiveDate, NaiveTime, Weekday};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability;

use super::availability::{slot_covering, slot_overlapping};
use super::conflict::{assert_insertable, find_conflict, now_naive, validate_booking};
use super::lifecycle;
use super::{Engine, EngineError};

impl Engine {
    // ── Slot administration ──────────────────────────────────

    pub async fn add_slot(
        &self,
        coach_id: CoachId,
        weekday: Weekday,
        start: NaiveTime,
        end: NaiveTime,
    ) -> Result<Slot, EngineError> {
        let start_min = minute_of(start);
        let end_min = minute_of(end);
        if start_min >= end_min {
            return Err(EngineError::Validation("slot start must be before its end"));
        }
        self.directory
            .find_coach(coach_id)
            .await
            .ok_or(EngineError::NotFound(coach_id))?;

        let span = Span::new(start_min, end_min);
        let sched = self.schedule_or_create(coach_id);
        let mut guard = sched.write_owned().await;
        if guard.slot_count() >= MAX_SLOTS_PER_COACH {
            return Err(EngineError::LimitExceeded("too many slots for coach"));
        }
        // Keep per-weekday slots disjoint so containment is unambiguous.
        if slot_overlapping(&guard.slots, weekday, &span).is_some() {
            return Err(EngineError::Validation(
                "slot overlaps an existing slot for this weekday",
            ));
        }

        let id = Ulid::new();
        let event = Event::SlotAdded {
            id,
            coach_id,
            weekday,
            span,
        };
        self.persist_and_apply(coach_id, &mut guard, &event).await?;
        Ok(guard
            .slots
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .expect("added slot present"))
    }

    /// Remove a slot. Existing appointments stand; future bookings simply
    /// stop fitting the removed window.
    pub async fn remove_slot(&self, id: SlotId) -> Result<Slot, EngineError> {
        let (coach_id, mut guard) = self.resolve_entity_write(&id).await?;
        let slot = guard
            .slots
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .ok_or(EngineError::NotFound(id))?;
        let event = Event::SlotRemoved { id, coach_id };
        self.persist_and_apply(coach_id, &mut guard, &event).await?;
        Ok(slot)
    }

    // ── Booking ──────────────────────────────────────────────

    /// Book a session. Identity checks, time validation, slot containment,
    /// and conflict detection run in order; the containment and conflict
    /// checks plus the journal append execute under the coach's write lock,
    /// so two racing requests for the same coach serialize.
    pub async fn create_appointment(
        &self,
        coach_id: CoachId,
        user_id: UserId,
        date: NaiveDate,
        start: NaiveTime,
        duration_minutes: Minutes,
        notes: Option<String>,
    ) -> Result<Appointment, EngineError> {
        self.directory
            .find_coach(coach_id)
            .await
            .ok_or(EngineError::NotFound(coach_id))?;
        self.directory
            .find_user(user_id)
            .await
            .ok_or(EngineError::NotFound(user_id))?;
        if let Some(ref n) = notes
            && n.len() > MAX_NOTES_LEN {
                return Err(EngineError::LimitExceeded("notes too long"));
            }

        let start_min = minute_of(start);
        let mut revalidated = false;

        loop {
            let span = validate_booking(date, start_min, duration_minutes, now_naive())?;

            // A coach without a schedule aggregate has no slots at all.
            let Some(sched) = self.schedule(&coach_id) else {
                metrics::counter!(observability::BOOKING_UNAVAILABLE_TOTAL).increment(1);
                return Err(EngineError::Unavailable { date, span });
            };
            let mut guard = sched.write_owned().await;

            if guard.day(date).len() >= MAX_APPOINTMENTS_PER_DAY {
                return Err(EngineError::LimitExceeded(
                    "too many appointments on this date",
                ));
            }
            if slot_covering(&guard.slots, date.weekday(), &span).is_none() {
                metrics::counter!(observability::BOOKING_UNAVAILABLE_TOTAL).increment(1);
                return Err(EngineError::Unavailable { date, span });
            }
            if let Some(existing) = find_conflict(&guard, date, &span, None) {
                metrics::counter!(observability::BOOKING_CONFLICTS_TOTAL).increment(1);
                return Err(EngineError::Conflict(existing));
            }
            // Commit-time backstop. Under this write lock it always agrees
            // with the check above; if it ever fires, re-validate once.
            if let Err(existing) = assert_insertable(&guard, date, &span, None) {
                if !revalidated {
                    revalidated = true;
                    drop(guard);
                    continue;
                }
                metrics::counter!(observability::BOOKING_CONFLICTS_TOTAL).increment(1);
                return Err(EngineError::Conflict(existing));
            }

            let id = Ulid::new();
            let event = Event::AppointmentBooked {
                id,
                coach_id,
                user_id,
                date,
                span,
                notes: notes.clone(),
            };
            self.persist_and_apply(coach_id, &mut guard, &event).await?;
            metrics::counter!(observability::BOOKINGS_TOTAL).increment(1);
            tracing::debug!("booked appointment {id} for coach {coach_id} on {date}");
            return Ok(guard
                .appointment(id)
                .cloned()
                .expect("booked appointment present"));
        }
    }

    /// Reschedule and/or amend notes. Any time change re-runs the full
    /// validation chain with the appointment itself excluded from conflict
    /// detection; a notes-only change skips re-validation.
    pub async fn update_appointment(
        &self,
        id: AppointmentId,
        new_date: Option<NaiveDate>,
        new_start: Option<NaiveTime>,
        new_duration: Option<Minutes>,
        notes: Option<String>,
    ) -> Result<Appointment, EngineError> {
        if let Some(ref n) = notes
            && n.len() > MAX_NOTES_LEN {
                return Err(EngineError::LimitExceeded("notes too long"));
            }

        let mut revalidated = false;

        loop {
            let (coach_id, mut guard) = self.resolve_entity_write(&id).await?;
            let current = guard
                .appointment(id)
                .cloned()
                .ok_or(EngineError::NotFound(id))?;

            if current.status == Status::Cancelled {
                return Err(EngineError::NotActionable {
                    status: current.status,
                    action: "update",
                });
            }

            let final_notes = notes.clone().or_else(|| current.notes.clone());
            let time_change =
                new_date.is_some() || new_start.is_some() || new_duration.is_some();

            if !time_change {
                let event = Event::AppointmentAmended {
                    id,
                    coach_id,
                    date: current.date,
                    span: current.span,
                    notes: final_notes,
                };
                self.persist_and_apply(coach_id, &mut guard, &event).await?;
                return Ok(guard
                    .appointment(id)
                    .cloned()
                    .expect("amended appointment present"));
            }

            let date = new_date.unwrap_or(current.date);
            let start_min = new_start.map(minute_of).unwrap_or(current.span.start);
            let duration = new_duration.unwrap_or_else(|| current.span.duration_minutes());

            let span = validate_booking(date, start_min, duration, now_naive())?;
            if date != current.date && guard.day(date).len() >= MAX_APPOINTMENTS_PER_DAY {
                return Err(EngineError::LimitExceeded(
                    "too many appointments on this date",
                ));
            }
            if slot_covering(&guard.slots, date.weekday(), &span).is_none() {
                metrics::counter!(observability::BOOKING_UNAVAILABLE_TOTAL).increment(1);
                return Err(EngineError::Unavailable { date, span });
            }
            if let Some(existing) = find_conflict(&guard, date, &span, Some(id)) {
                metrics::counter!(observability::BOOKING_CONFLICTS_TOTAL).increment(1);
                return Err(EngineError::Conflict(existing));
            }
            if let Err(existing) = assert_insertable(&guard, date, &span, Some(id)) {
                if !revalidated {
                    revalidated = true;
                    drop(guard);
                    continue;
                }
                metrics::counter!(observability::BOOKING_CONFLICTS_TOTAL).increment(1);
                return Err(EngineError::Conflict(existing));
            }

            let event = Event::AppointmentAmended {
                id,
                coach_id,
                date,
                span,
                notes: final_notes,
            };
            self.persist_and_apply(coach_id, &mut guard, &event).await?;
            tracing::debug!("rescheduled appointment {id} to {date}");
            return Ok(guard
                .appointment(id)
                .cloned()
                .expect("amended appointment present"));
        }
    }

    // ── Lifecycle ────────────────────────────────────────────

    /// Cancel, by either the booking user or the assigned coach. Frees the
    /// interval for future conflict checks.
    pub async fn cancel_appointment(
        &self,
        id: AppointmentId,
        requester: Ulid,
    ) -> Result<Appointment, EngineError> {
        let (coach_id, mut guard) = self.resolve_entity_write(&id).await?;
        let current = guard
            .appointment(id)
            .cloned()
            .ok_or(EngineError::NotFound(id))?;

        if requester != current.user_id && requester != current.coach_id {
            return Err(EngineError::Unauthorized(
                "only the booking user or the assigned coach may cancel",
            ));
        }
        lifecycle::check_transition(current.status, Status::Cancelled)?;

        let event = Event::StatusChanged {
            id,
            coach_id,
            status: Status::Cancelled,
        };
        self.persist_and_apply(coach_id, &mut guard, &event).await?;
        metrics::counter!(observability::CANCELLATIONS_TOTAL).increment(1);
        tracing::debug!("cancelled appointment {id}");
        Ok(guard
            .appointment(id)
            .cloned()
            .expect("cancelled appointment present"))
    }

    /// Coach-driven status change (confirm, complete, or cancel).
    pub async fn set_status(
        &self,
        id: AppointmentId,
        requester: Ulid,
        target: Status,
    ) -> Result<Appointment, EngineError> {
        let (coach_id, mut guard) = self.resolve_entity_write(&id).await?;
        let current = guard
            .appointment(id)
            .cloned()
            .ok_or(EngineError::NotFound(id))?;

        if requester != current.coach_id {
            return Err(EngineError::Unauthorized(
                "only the assigned coach may change appointment status",
            ));
        }
        lifecycle::check_transition(current.status, target)?;

        let event = Event::StatusChanged {
            id,
            coach_id,
            status: target,
        };
        self.persist_and_apply(coach_id, &mut guard, &event).await?;
        if target == Status::Cancelled {
            metrics::counter!(observability::CANCELLATIONS_TOTAL).increment(1);
        }
        Ok(guard
            .appointment(id)
            .cloned()
            .expect("transitioned appointment present"))
    }

    /// Attach a rating and optional review to a completed appointment.
    /// User-only; a repeat call overwrites the previous feedback.
    pub async fn rate_appointment(
        &self,
        id: AppointmentId,
        requester: UserId,
        rating: u8,
        review: Option<String>,
    ) -> Result<Feedback, EngineError> {
        let (coach_id, mut guard) = self.resolve_entity_write(&id).await?;
        let current = guard
            .appointment(id)
            .cloned()
            .ok_or(EngineError::NotFound(id))?;

        if requester != current.user_id {
            return Err(EngineError::Unauthorized("only the booking user may rate"));
        }
        if current.status != Status::Completed {
            return Err(EngineError::NotActionable {
                status: current.status,
                action: "rate",
            });
        }
        if !(1..=5).contains(&rating) {
            return Err(EngineError::Validation("rating must be between 1 and 5"));
        }
        if let Some(ref r) = review
            && r.len() > MAX_REVIEW_LEN {
                return Err(EngineError::LimitExceeded("review too long"));
            }

        let event = Event::FeedbackRecorded {
            appointment_id: id,
            coach_id,
            user_id: current.user_id,
            rating,
            review: review.clone(),
        };
        self.persist_and_apply(coach_id, &mut guard, &event).await?;
        metrics::counter!(observability::RATINGS_TOTAL).increment(1);
        Ok(guard
            .feedback
            .get(&current.user_id)
            .cloned()
            .expect("recorded feedback present"))
    }
}
