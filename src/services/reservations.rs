//! Reservation lifecycle: create, read, cancel.

use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use validator::{Validate, ValidationError};

use super::notifications::{self, Mailer};
use super::{seats, Authorization};
use crate::error::{BookingError, BookingResult, ConflictReason, ValidationReason};
use crate::models::{NewReservation, ReservationWithSeats, SeatPosition};
use crate::store::{CinemaStore, SEAT_POSITION_CONSTRAINT};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ReservationRequest {
    pub screening_id: i64,
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[validate(custom(function = "validate_phone"))]
    pub phone: String,
    #[serde(default)]
    pub comment: Option<String>,
    #[validate(nested)]
    pub seats: Vec<SeatRequest>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SeatRequest {
    #[validate(range(min = 1))]
    pub row: i32,
    #[validate(range(min = 1))]
    pub column: i32,
    /// When present it must name the screening being booked.
    #[serde(default)]
    pub screening_id: Option<i64>,
}

fn validate_phone(phone: &str) -> Result<(), ValidationError> {
    let well_formed = (9..=15).contains(&phone.len())
        && phone.chars().all(|c| c.is_ascii_digit() || c == '+' || c == '-');
    if well_formed {
        Ok(())
    } else {
        Err(ValidationError::new("phone"))
    }
}

#[derive(Clone)]
pub struct ReservationService {
    store: Arc<dyn CinemaStore>,
    mailer: Arc<dyn Mailer>,
    max_seats_per_reservation: usize,
    subject_prefix: String,
}

impl ReservationService {
    pub fn new(
        store: Arc<dyn CinemaStore>,
        mailer: Arc<dyn Mailer>,
        max_seats_per_reservation: usize,
        subject_prefix: String,
    ) -> Self {
        Self { store, mailer, max_seats_per_reservation, subject_prefix }
    }

    pub async fn create(&self, caller: &dyn Authorization, request: ReservationRequest) -> BookingResult<ReservationWithSeats> {
        request.validate()?;
        let screening_id = request.screening_id;

        let detail = self
            .store
            .load_screening(screening_id)
            .await
            .map_err(BookingError::from_store("Failed to load screening"))?
            .ok_or(BookingError::NotFound("Screening"))?;

        if request.seats.iter().any(|s| s.screening_id.is_some_and(|id| id != screening_id)) {
            return Err(ValidationReason::ScreeningMismatch.into());
        }

        let positions: Vec<SeatPosition> = request.seats.iter().map(|s| SeatPosition::new(s.row, s.column)).collect();
        let drafts = seats::reserve_seats(&detail, &positions, self.max_seats_per_reservation).inspect_err(|e| {
            debug!("reservation for screening {} rejected: {}", screening_id, e);
        })?;

        let reservation = NewReservation {
            name: request.name,
            email: request.email,
            phone: request.phone,
            comment: request.comment,
            created_at: Utc::now(),
            owner_user_id: caller.current_user_id(),
            screening_id,
        };

        let created = match self.store.insert_reservation(reservation, &drafts).await {
            Ok(created) => created,
            Err(e) if e.is_unique_violation_of(SEAT_POSITION_CONSTRAINT) => {
                // Another booking committed one of these positions first.
                let taken = match self.store.list_seats(screening_id).await {
                    Ok(current) => seats::occupied_among(&current, &positions),
                    Err(lookup) => {
                        warn!("could not reload seats of screening {}: {}", screening_id, lookup);
                        None
                    }
                }
                .unwrap_or(positions[0]);
                debug!("reservation for screening {} lost seat {}", screening_id, taken);
                return Err(ConflictReason::AlreadyOccupied(taken).into());
            }
            Err(e) => return Err(BookingError::from_store("Failed to create reservation")(e)),
        };

        info!(
            reservation_id = created.reservation.id,
            screening_id,
            seats = created.seats.len(),
            "reservation created"
        );

        notifications::dispatch(
            self.mailer.clone(),
            created.reservation.email.clone(),
            notifications::reservation_subject(&self.subject_prefix),
            notifications::reservation_email_body(&detail, &created.seats),
        );

        Ok(created)
    }

    /// Owners see their own reservations, admins see all of them.
    pub async fn get_by_id(&self, caller: &dyn Authorization, id: i64) -> BookingResult<ReservationWithSeats> {
        let found = self
            .store
            .find_reservation(id)
            .await
            .map_err(BookingError::from_store("Failed to load reservation"))?
            .ok_or(BookingError::NotFound("Reservation"))?;

        if !caller.is_current_user_admin() && found.reservation.owner_user_id != caller.current_user_id() {
            return Err(BookingError::AccessDenied);
        }
        Ok(found)
    }

    pub async fn get_all(&self, caller: &dyn Authorization) -> BookingResult<Vec<ReservationWithSeats>> {
        let owner = (!caller.is_current_user_admin()).then(|| caller.current_user_id());
        self.store
            .list_reservations(owner)
            .await
            .map_err(BookingError::from_store("Failed to list reservations"))
    }

    pub async fn cancel(&self, caller: &dyn Authorization, id: i64) -> BookingResult<()> {
        let found = self.get_by_id(caller, id).await?;

        if found.screening.starts_at < Utc::now() {
            return Err(ValidationReason::CancelAfterStart.into());
        }

        let deleted = self
            .store
            .delete_reservation(id)
            .await
            .map_err(BookingError::from_store("Failed to cancel reservation"))?;
        if !deleted {
            return Err(BookingError::NotFound("Reservation"));
        }

        info!(reservation_id = id, seats = found.seats.len(), "reservation cancelled");
        Ok(())
    }
}
