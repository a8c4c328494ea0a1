//! Seat allocation for a loaded screening.
//!
//! These checks read the screening's current seats, so they are only a fast
//! path: the unique index on (screening, row, column) is what actually keeps
//! two bookings off the same position. Callers translate that index violation
//! with [`occupied_among`].

use std::collections::HashSet;

use super::geometry;
use crate::error::{BookingResult, ConflictReason, ValidationReason};
use crate::models::{NewSeat, ScreeningDetail, Seat, SeatPosition, SeatStatus};

/// Validates a reservation request and returns unlinked `Reserved` seat drafts.
pub fn reserve_seats(
    screening: &ScreeningDetail,
    positions: &[SeatPosition],
    max_seats_per_reservation: usize,
) -> BookingResult<Vec<NewSeat>> {
    check_selection(positions, max_seats_per_reservation)?;

    positions
        .iter()
        .map(|&position| allocate(screening, position, SeatStatus::Reserved))
        .collect()
}

/// Validates a direct sale and returns a `Sold` seat draft.
pub fn sell_seat(screening: &ScreeningDetail, position: SeatPosition) -> BookingResult<NewSeat> {
    allocate(screening, position, SeatStatus::Sold)
}

/// Count, emptiness and duplicate checks that need no screening data.
pub fn check_selection(positions: &[SeatPosition], max_seats_per_reservation: usize) -> Result<(), ValidationReason> {
    if positions.is_empty() {
        return Err(ValidationReason::EmptySelection);
    }
    if positions.len() > max_seats_per_reservation {
        return Err(ValidationReason::TooManySeats { max: max_seats_per_reservation });
    }
    let mut seen = HashSet::with_capacity(positions.len());
    if let Some(&dup) = positions.iter().find(|p| !seen.insert(**p)) {
        return Err(ValidationReason::DuplicatePosition(dup));
    }
    Ok(())
}

/// First requested position that is already taken in `seats`.
pub fn occupied_among(seats: &[Seat], positions: &[SeatPosition]) -> Option<SeatPosition> {
    let taken: HashSet<SeatPosition> = seats.iter().map(|s| s.position).collect();
    positions.iter().copied().find(|p| taken.contains(p))
}

fn allocate(screening: &ScreeningDetail, position: SeatPosition, status: SeatStatus) -> BookingResult<NewSeat> {
    geometry::validate(position, &screening.room)?;

    if screening.seats.iter().any(|s| s.position == position) {
        return Err(ConflictReason::AlreadyOccupied(position).into());
    }

    Ok(NewSeat { screening_id: screening.screening.id, position, status })
}
