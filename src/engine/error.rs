use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::{AppointmentId, Span, Status};

#[derive(Debug)]
pub enum EngineError {
    /// Malformed or out-of-policy input.
    Validation(&'static str),
    /// Input exceeds a hard bound from `crate::limits`.
    LimitExceeded(&'static str),
    /// Coach, user, appointment, or slot does not exist.
    NotFound(Ulid),
    /// Requested interval lies outside every availability slot of the coach.
    Unavailable { date: NaiveDate, span: Span },
    /// Requested interval overlaps the named non-cancelled appointment.
    Conflict(AppointmentId),
    /// Requester lacks the required relationship to the appointment.
    Unauthorized(&'static str),
    /// Lifecycle transition not in the table.
    Transition { from: Status, to: Status },
    /// Operation requires a different lifecycle state (e.g. rating a
    /// non-completed appointment).
    NotActionable {
        status: Status,
        action: &'static str,
    },
    /// WAL append or compaction failure. Fatal for the request; the caller
    /// may retry the whole operation.
    WalError(String),
}

/// The coarse taxonomy a transport layer maps onto status codes. Variants
/// carry detail; tags decide the response class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorTag {
    Validation,
    NotFound,
    Availability,
    Conflict,
    Authorization,
    State,
    Storage,
}

impl EngineError {
    pub fn tag(&self) -> ErrorTag {
        match self {
            EngineError::Validation(_) | EngineError::LimitExceeded(_) => ErrorTag::Validation,
            EngineError::NotFound(_) => ErrorTag::NotFound,
            EngineError::Unavailable { .. } => ErrorTag::Availability,
            EngineError::Conflict(_) => ErrorTag::Conflict,
            EngineError::Unauthorized(_) => ErrorTag::Authorization,
            EngineError::Transition { .. } | EngineError::NotActionable { .. } => ErrorTag::State,
            EngineError::WalError(_) => ErrorTag::Storage,
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Validation(msg) => write!(f, "validation: {msg}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::Unavailable { date, span } => {
                write!(
                    f,
                    "no availability on {date} covering [{}, {})",
                    span.start, span.end
                )
            }
            EngineError::Conflict(id) => write!(f, "conflicts with appointment: {id}"),
            EngineError::Unauthorized(msg) => write!(f, "unauthorized: {msg}"),
            EngineError::Transition { from, to } => {
                write!(f, "illegal status transition: {from} -> {to}")
            }
            EngineError::NotActionable { status, action } => {
                write!(f, "cannot {action} an appointment while {status}")
            }
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
