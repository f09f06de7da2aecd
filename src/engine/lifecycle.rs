use crate::model::Status;

use super::EngineError;

/// The complete set of legal status transitions. Anything not listed is
/// rejected. There is no `Pending -> Completed` shortcut: a session must be
/// confirmed before it can be completed.
const TRANSITIONS: &[(Status, Status)] = &[
    (Status::Pending, Status::Confirmed),
    (Status::Confirmed, Status::Completed),
    (Status::Pending, Status::Cancelled),
    (Status::Confirmed, Status::Cancelled),
];

/// Check a requested transition against the table. On rejection the error
/// names both the current and the requested state; callers mutate nothing.
pub fn check_transition(from: Status, to: Status) -> Result<(), EngineError> {
    if TRANSITIONS.contains(&(from, to)) {
        Ok(())
    } else {
        Err(EngineError::Transition { from, to })
    }
}
