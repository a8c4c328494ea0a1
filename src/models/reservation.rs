use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::{Screening, Seat};

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Reservation {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub created_at: DateTime<Utc>,
    pub comment: Option<String>,
    pub owner_user_id: i64,
    pub screening_id: i64,
}

#[derive(Debug, Clone)]
pub struct NewReservation {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub owner_user_id: i64,
    pub screening_id: i64,
}

/// A reservation with the seats it owns and the screening they belong to.
#[derive(Debug, Clone, Serialize)]
pub struct ReservationWithSeats {
    #[serde(flatten)]
    pub reservation: Reservation,
    pub seats: Vec<Seat>,
    pub screening: Screening,
}
