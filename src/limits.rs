//! Hard bounds on inputs the engine accepts. Exceeding any of these is a
//! request error, never a panic.

use crate::model::Minutes;

/// Weekly availability windows per coach.
pub const MAX_SLOTS_PER_COACH: usize = 64;

/// Non-cancelled or cancelled appointments held for one coach on one date.
pub const MAX_APPOINTMENTS_PER_DAY: usize = 96;

/// Longest single session.
pub const MAX_APPOINTMENT_MINUTES: Minutes = 8 * 60;

/// How far ahead a session may be booked.
pub const MAX_BOOKING_HORIZON_DAYS: i64 = 180;

pub const MAX_NOTES_LEN: usize = 2_000;

pub const MAX_REVIEW_LEN: usize = 4_000;
