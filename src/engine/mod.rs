mod availability;
mod conflict;
mod error;
mod lifecycle;
mod mutations;
mod queries;

pub use availability::{
    free_windows, merge_overlapping, slot_at, slot_covering, subtract_intervals,
};
pub use error::{EngineError, ErrorTag};
pub use lifecycle::check_transition;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, RwLock};
use ulid::Ulid;

use crate::config::Config;
use crate::directory::IdentityDirectory;
use crate::maintenance;
use crate::model::*;
use crate::notify::ScheduleFeed;
use crate::wal::Wal;

pub type SharedCoachSchedule = Arc<RwLock<CoachSchedule>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond Ok to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];

                // Drain all immediately available appends
                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Flush current batch first, then handle the non-append command
                            flush_and_respond(&mut wal, &mut batch);
                            handle_non_append(&mut wal, other);
                            break;
                        }
                        Err(_) => break, // channel empty — flush batch
                    }
                }

                if !batch.is_empty() {
                    flush_and_respond(&mut wal, &mut batch);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_and_respond(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    respond_batch(batch, &result);
}

fn flush_batch(
    wal: &mut Wal,
    batch: &mut [(Event, oneshot::Sender<io::Result<()>>)],
) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch.iter() {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush — even on append error — so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn respond_batch(batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>, result: &io::Result<()>) {
    for (_, tx) in batch.drain(..) {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

/// The booking service. Holds every coach's schedule behind its own lock,
/// journals every mutation to the WAL before applying it, and publishes
/// applied events on the schedule feed.
pub struct Engine {
    pub(super) state: DashMap<CoachId, SharedCoachSchedule>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub feed: Arc<ScheduleFeed>,
    /// Reverse lookup: slot or appointment id → coach id.
    pub(super) entity_coach: DashMap<Ulid, CoachId>,
    pub(super) directory: Arc<dyn IdentityDirectory>,
}

/// Apply an event directly to a CoachSchedule (no locking — caller holds the lock).
fn apply_to_schedule(sched: &mut CoachSchedule, event: &Event, entity_map: &DashMap<Ulid, CoachId>) {
    match event {
        Event::SlotAdded {
            id,
            coach_id,
            weekday,
            span,
        } => {
            sched.insert_slot(Slot {
                id: *id,
                coach_id: *coach_id,
                weekday: *weekday,
                span: *span,
            });
            entity_map.insert(*id, *coach_id);
        }
        Event::SlotRemoved { id, .. } => {
            sched.remove_slot(*id);
            entity_map.remove(id);
        }
        Event::AppointmentBooked {
            id,
            coach_id,
            user_id,
            date,
            span,
            notes,
        } => {
            sched.insert_appointment(Appointment {
                id: *id,
                coach_id: *coach_id,
                user_id: *user_id,
                date: *date,
                span: *span,
                status: Status::Pending,
                notes: notes.clone(),
                rating: None,
                review: None,
            });
            entity_map.insert(*id, *coach_id);
        }
        Event::AppointmentAmended {
            id, date, span, notes, ..
        } => {
            if let Some(mut appt) = sched.take_appointment(*id) {
                appt.date = *date;
                appt.span = *span;
                appt.notes = notes.clone();
                sched.insert_appointment(appt);
            }
        }
        Event::StatusChanged { id, status, .. } => {
            if let Some(appt) = sched.appointment_mut(*id) {
                appt.status = *status;
            }
        }
        Event::FeedbackRecorded {
            appointment_id,
            coach_id,
            user_id,
            rating,
            review,
        } => {
            if let Some(appt) = sched.appointment_mut(*appointment_id) {
                appt.rating = Some(*rating);
                appt.review = review.clone();
            }
            sched.feedback.insert(
                *user_id,
                Feedback {
                    coach_id: *coach_id,
                    user_id: *user_id,
                    appointment_id: *appointment_id,
                    rating: *rating,
                    review: review.clone(),
                },
            );
        }
    }
}

impl Engine {
    pub fn new(
        wal_path: PathBuf,
        feed: Arc<ScheduleFeed>,
        directory: Arc<dyn IdentityDirectory>,
    ) -> std::io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            state: DashMap::new(),
            wal_tx,
            feed,
            entity_coach: DashMap::new(),
            directory,
        };

        // Replay events — we're the sole owner of these Arcs, so try_write
        // always succeeds instantly (no contention). Never use blocking_write
        // here because this may run inside an async context.
        for event in &events {
            let coach_id = event.coach_id();
            let sched_arc = engine
                .state
                .entry(coach_id)
                .or_insert_with(|| Arc::new(RwLock::new(CoachSchedule::new(coach_id))))
                .clone();
            let mut guard = sched_arc.try_write().expect("replay: uncontended write");
            apply_to_schedule(&mut guard, event, &engine.entity_coach);
        }
        metrics::gauge!(crate::observability::COACH_SCHEDULES_ACTIVE)
            .set(engine.state.len() as f64);

        Ok(engine)
    }

    /// Open the engine from configuration: ensure the data directory exists,
    /// replay the WAL, and spawn the background compactor.
    pub fn open(
        config: &Config,
        directory: Arc<dyn IdentityDirectory>,
    ) -> std::io::Result<Arc<Self>> {
        std::fs::create_dir_all(&config.data_dir)?;
        let feed = Arc::new(ScheduleFeed::new());
        let engine = Arc::new(Self::new(config.wal_path(), feed, directory)?);

        let compactor_engine = engine.clone();
        let threshold = config.compact_threshold;
        tokio::spawn(async move {
            maintenance::run_compactor(compactor_engine, threshold).await;
        });

        Ok(engine)
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub fn schedule(&self, coach_id: &CoachId) -> Option<SharedCoachSchedule> {
        self.state.get(coach_id).map(|e| e.value().clone())
    }

    /// Get or lazily create the schedule aggregate for a coach. Identity
    /// checks happen before this — a schedule only materializes for coaches
    /// the directory has confirmed.
    pub(super) fn schedule_or_create(&self, coach_id: CoachId) -> SharedCoachSchedule {
        let sched = self
            .state
            .entry(coach_id)
            .or_insert_with(|| Arc::new(RwLock::new(CoachSchedule::new(coach_id))))
            .clone();
        metrics::gauge!(crate::observability::COACH_SCHEDULES_ACTIVE)
            .set(self.state.len() as f64);
        sched
    }

    pub fn coach_of_entity(&self, entity_id: &Ulid) -> Option<CoachId> {
        self.entity_coach.get(entity_id).map(|e| *e.value())
    }

    /// WAL-append + apply + publish in one call. The append completes (fsync
    /// via group commit) before the in-memory schedule changes.
    pub(super) async fn persist_and_apply(
        &self,
        coach_id: CoachId,
        sched: &mut CoachSchedule,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_schedule(sched, event, &self.entity_coach);
        self.feed.send(coach_id, event);
        Ok(())
    }

    /// Lookup entity → coach, get the schedule, acquire its write lock.
    pub(super) async fn resolve_entity_write(
        &self,
        entity_id: &Ulid,
    ) -> Result<(CoachId, tokio::sync::OwnedRwLockWriteGuard<CoachSchedule>), EngineError> {
        let coach_id = self
            .coach_of_entity(entity_id)
            .ok_or(EngineError::NotFound(*entity_id))?;
        let sched = self
            .schedule(&coach_id)
            .ok_or(EngineError::NotFound(coach_id))?;
        let guard = sched.write_owned().await;
        Ok((coach_id, guard))
    }

    /// Compact the WAL by rewriting it with only the events needed to
    /// recreate the current schedules.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let mut events = Vec::new();

        let coach_ids: Vec<CoachId> = self.state.iter().map(|e| *e.key()).collect();
        for coach_id in coach_ids {
            let entry = match self.state.get(&coach_id) {
                Some(e) => e,
                None => continue,
            };
            let sched_arc = entry.value().clone();
            let guard = sched_arc.try_read().expect("compact: uncontended read");

            for slot in &guard.slots {
                events.push(Event::SlotAdded {
                    id: slot.id,
                    coach_id,
                    weekday: slot.weekday,
                    span: slot.span,
                });
            }
            for day in guard.days.values() {
                for appt in day {
                    events.push(Event::AppointmentBooked {
                        id: appt.id,
                        coach_id,
                        user_id: appt.user_id,
                        date: appt.date,
                        span: appt.span,
                        notes: appt.notes.clone(),
                    });
                    if appt.status != Status::Pending {
                        events.push(Event::StatusChanged {
                            id: appt.id,
                            coach_id,
                            status: appt.status,
                        });
                    }
                }
            }
            for fb in guard.feedback.values() {
                events.push(Event::FeedbackRecorded {
                    appointment_id: fb.appointment_id,
                    coach_id,
                    user_id: fb.user_id,
                    rating: fb.rating,
                    review: fb.review.clone(),
                });
            }
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact {
                events,
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
