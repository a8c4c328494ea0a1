use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, FromRow, Serialize, Deserialize)]
pub struct SeatPosition {
    #[sqlx(rename = "seat_row")]
    pub row: i32,
    #[sqlx(rename = "seat_column")]
    pub column: i32,
}

impl SeatPosition {
    pub fn new(row: i32, column: i32) -> Self {
        Self { row, column }
    }
}

impl fmt::Display for SeatPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}", self.row, self.column)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "seat_status", rename_all = "lowercase")]
#[serde(rename_all = "PascalCase")]
pub enum SeatStatus {
    Reserved,
    Sold,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Seat {
    pub id: i64,
    pub screening_id: i64,
    #[sqlx(flatten)]
    pub position: SeatPosition,
    pub status: SeatStatus,
    pub reservation_id: Option<i64>,
}

/// A seat that passed allocation but has not been written yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewSeat {
    pub screening_id: i64,
    pub position: SeatPosition,
    pub status: SeatStatus,
}
