use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::{Movie, Room, Seat};

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Screening {
    pub id: i64,
    pub movie_id: i64,
    pub room_id: i64,
    pub starts_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewScreening {
    pub movie_id: i64,
    pub room_id: i64,
    pub starts_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// A screening together with everything the seat and reservation checks need.
#[derive(Debug, Clone)]
pub struct ScreeningDetail {
    pub screening: Screening,
    pub room: Room,
    pub movie: Movie,
    pub seats: Vec<Seat>,
}

/// One occupied window in a room's schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRow)]
pub struct ScheduledSlot {
    pub screening_id: i64,
    pub starts_at: DateTime<Utc>,
    pub length: i32,
}

impl ScheduledSlot {
    /// Saturates at the last representable instant.
    pub fn ends_at(&self) -> DateTime<Utc> {
        self.starts_at
            .checked_add_signed(Duration::minutes(i64::from(self.length)))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScreeningFilter {
    pub movie_id: Option<i64>,
    pub room_id: Option<i64>,
    pub starts_after: Option<DateTime<Utc>>,
    pub starts_before: Option<DateTime<Utc>>,
}

impl ScreeningFilter {
    pub fn matches(&self, screening: &Screening) -> bool {
        self.movie_id.is_none_or(|id| screening.movie_id == id)
            && self.room_id.is_none_or(|id| screening.room_id == id)
            && self.starts_after.is_none_or(|t| screening.starts_at >= t)
            && self.starts_before.is_none_or(|t| screening.starts_at <= t)
    }
}
