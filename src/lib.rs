//! Appointment scheduling and conflict-resolution engine for a
//! smoking-cessation coaching platform.
//!
//! The engine owns coach availability (recurring weekly slots), the
//! appointment book, the booking lifecycle, and per-coach feedback. Every
//! mutation is journalled to an append-only WAL before it is applied, and
//! all writers for a coach serialize on that coach's schedule lock, so the
//! overlap check and the insert it guards are atomic.
//!
//! Identity (who is a coach, who is a user) belongs to a collaborator
//! behind [`directory::IdentityDirectory`]; transport, payments, and
//! messaging live outside this crate entirely.

pub mod config;
pub mod directory;
pub mod engine;
pub mod limits;
pub mod maintenance;
pub mod model;
pub mod notify;
pub mod observability;
pub mod wal;

pub use config::Config;
pub use directory::{CoachProfile, IdentityDirectory, InMemoryDirectory, UserProfile};
pub use engine::{Engine, EngineError, ErrorTag};
pub use model::{
    Appointment, AppointmentId, CoachId, Feedback, Minutes, Slot, SlotId, Span, Status, UserId,
};
