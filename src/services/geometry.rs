//! Seat position bounds checks against a room's fixed grid.

use crate::error::ValidationReason;
use crate::models::{Room, SeatPosition};

/// Fails with `OutOfRange` when the position lies outside `[1, rows] x [1, columns]`.
pub fn validate(position: SeatPosition, room: &Room) -> Result<(), ValidationReason> {
    let row_ok = (1..=room.rows).contains(&position.row);
    let column_ok = (1..=room.columns).contains(&position.column);
    if row_ok && column_ok {
        Ok(())
    } else {
        Err(ValidationReason::OutOfRange(position))
    }
}
