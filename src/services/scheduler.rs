//! Room schedule rules.
//!
//! A screening occupies `[starts_at, starts_at + movie.length]` and two
//! windows in the same room conflict when they intersect, endpoints included.
//! Back-to-back screenings (one ends at the minute the next starts) therefore
//! conflict as well.

use chrono::{DateTime, Duration, Utc};

use crate::error::{BookingError, BookingResult, ValidationReason};
use crate::models::{Movie, ScheduledSlot};

/// End of the window starting at `starts_at`, or `None` past the last representable instant.
pub fn window_end(starts_at: DateTime<Utc>, movie_length: i32) -> Option<DateTime<Utc>> {
    starts_at.checked_add_signed(Duration::minutes(i64::from(movie_length)))
}

/// Number of slots intersecting the window that starts at `starts_at`.
pub fn count_overlaps(starts_at: DateTime<Utc>, movie_length: i32, slots: &[ScheduledSlot]) -> usize {
    let ends_at = window_end(starts_at, movie_length).unwrap_or(DateTime::<Utc>::MAX_UTC);
    slots
        .iter()
        .filter(|existing| existing.starts_at <= ends_at && starts_at <= existing.ends_at())
        .count()
}

/// `Ok` when the window is free, `OverlapConflict(count)` otherwise.
pub fn check_overlap(starts_at: DateTime<Utc>, movie_length: i32, slots: &[ScheduledSlot]) -> BookingResult<()> {
    match count_overlaps(starts_at, movie_length, slots) {
        0 => Ok(()),
        n => Err(BookingError::OverlapConflict(n)),
    }
}

/// A movie may only grow while nothing is scheduled for it; shrinking is always fine.
pub fn check_length_change(current: &Movie, new_length: i32, screening_count: i64) -> Result<(), ValidationReason> {
    if new_length > current.length && screening_count > 0 {
        return Err(ValidationReason::MovieLengthIncreaseBlocked);
    }
    Ok(())
}
