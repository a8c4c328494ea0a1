use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};

use super::{scheduler, seats};
use crate::error::{BookingError, BookingResult, ConflictReason, ValidationReason};
use crate::models::{Movie, NewScreening, Room, Screening, ScreeningFilter, Seat, SeatPosition};
use crate::store::{CinemaStore, ScheduleGuard, SEAT_POSITION_CONSTRAINT, SEAT_SCREENING_FK};

#[derive(Debug, Clone, Deserialize)]
pub struct ScreeningRequest {
    pub movie_id: i64,
    pub room_id: i64,
    pub starts_at: Option<DateTime<Utc>>,
}

/// Screening schedule, seat map reads and direct sales.
#[derive(Clone)]
pub struct ScreeningService {
    store: Arc<dyn CinemaStore>,
}

impl ScreeningService {
    pub fn new(store: Arc<dyn CinemaStore>) -> Self {
        Self { store }
    }

    pub async fn get_screening(&self, id: i64) -> BookingResult<Screening> {
        self.store
            .find_screening(id)
            .await
            .map_err(BookingError::from_store("Failed to load screening"))?
            .ok_or(BookingError::NotFound("Screening"))
    }

    pub async fn list_screenings(&self, filter: &ScreeningFilter) -> BookingResult<Vec<Screening>> {
        self.store
            .list_screenings(filter)
            .await
            .map_err(BookingError::from_store("Failed to list screenings"))
    }

    /// Screenings starting on the given UTC calendar day.
    pub async fn list_for_date(&self, date: NaiveDate) -> BookingResult<Vec<Screening>> {
        let start = date.and_time(NaiveTime::MIN).and_utc();
        let next_day = date
            .checked_add_days(Days::new(1))
            .ok_or_else(|| ValidationReason::InvalidInput(format!("Date {} is out of range", date)))?;
        let mut screenings = self
            .list_screenings(&ScreeningFilter { starts_after: Some(start), ..Default::default() })
            .await?;
        let end = next_day.and_time(NaiveTime::MIN).and_utc();
        screenings.retain(|s| s.starts_at < end);
        Ok(screenings)
    }

    pub async fn get_seats_by_screening(&self, screening_id: i64) -> BookingResult<Vec<Seat>> {
        self.get_screening(screening_id).await?;
        self.store
            .list_seats(screening_id)
            .await
            .map_err(BookingError::from_store("Failed to load seats"))
    }

    /// Fails with the number of screenings in the room that the window collides with.
    pub async fn check_overlap(
        &self,
        room_id: i64,
        starts_at: DateTime<Utc>,
        movie_length: i32,
        exclude_id: Option<i64>,
    ) -> BookingResult<()> {
        let slots = self
            .store
            .room_schedule(room_id, exclude_id)
            .await
            .map_err(BookingError::from_store("Failed to load room schedule"))?;
        scheduler::check_overlap(starts_at, movie_length, &slots)
    }

    pub async fn create_screening(&self, request: ScreeningRequest) -> BookingResult<Screening> {
        let starts_at = require_start(&request)?;
        self.active_room(request.room_id).await?;
        let movie = self.active_movie(request.movie_id).await?;
        require_window(starts_at, &movie)?;

        let draft = NewScreening {
            movie_id: request.movie_id,
            room_id: request.room_id,
            starts_at,
            created_at: Utc::now(),
        };
        let guard: ScheduleGuard<'_> = &|length, slots| scheduler::check_overlap(starts_at, length, slots);
        let created = self
            .store
            .insert_screening(draft, guard)
            .await
            .map_err(BookingError::from_store("Failed to create screening"))
            .inspect_err(|e| debug!("screening in room {} at {} rejected: {}", request.room_id, starts_at, e))?;

        info!(screening_id = created.id, room_id = created.room_id, starts_at = %created.starts_at, "screening scheduled");
        Ok(created)
    }

    /// The schedule is only rechecked when the room or start time moves.
    pub async fn update_screening(&self, id: i64, request: ScreeningRequest) -> BookingResult<Screening> {
        let starts_at = require_start(&request)?;
        let existing = self.get_screening(id).await?;
        self.active_room(request.room_id).await?;
        let movie = self.active_movie(request.movie_id).await?;
        require_window(starts_at, &movie)?;

        let moved = existing.room_id != request.room_id || existing.starts_at != starts_at;
        let updated = Screening {
            movie_id: request.movie_id,
            room_id: request.room_id,
            starts_at,
            ..existing
        };

        let guard: ScheduleGuard<'_> = &|length, slots| scheduler::check_overlap(starts_at, length, slots);
        let found = self
            .store
            .update_screening(&updated, moved.then_some(guard))
            .await
            .map_err(BookingError::from_store("Failed to update screening"))?;
        if !found {
            return Err(BookingError::NotFound("Screening"));
        }

        info!(screening_id = id, room_id = updated.room_id, starts_at = %updated.starts_at, "screening updated");
        Ok(updated)
    }

    pub async fn delete_screening(&self, id: i64) -> BookingResult<()> {
        self.get_screening(id).await?;

        let seats = self
            .store
            .count_seats(id)
            .await
            .map_err(BookingError::from_store("Failed to count seats"))?;
        if seats > 0 {
            return Err(ConflictReason::ScreeningHasSeats.into());
        }

        let deleted = match self.store.delete_screening(id).await {
            Ok(deleted) => deleted,
            // a seat was booked after the count
            Err(e) if e.is_foreign_key_violation_of(SEAT_SCREENING_FK) => {
                return Err(ConflictReason::ScreeningHasSeats.into());
            }
            Err(e) => return Err(BookingError::from_store("Failed to delete screening")(e)),
        };
        if !deleted {
            return Err(BookingError::NotFound("Screening"));
        }

        info!(screening_id = id, "screening deleted");
        Ok(())
    }

    /// Sells one seat directly, without a reservation.
    pub async fn sell_seat(&self, screening_id: i64, position: SeatPosition) -> BookingResult<Seat> {
        let detail = self
            .store
            .load_screening(screening_id)
            .await
            .map_err(BookingError::from_store("Failed to load screening"))?
            .ok_or(BookingError::NotFound("Screening"))?;

        let draft = seats::sell_seat(&detail, position)?;

        let sold = match self.store.insert_sold_seat(draft).await {
            Ok(seat) => seat,
            Err(e) if e.is_unique_violation_of(SEAT_POSITION_CONSTRAINT) => {
                return Err(ConflictReason::AlreadyOccupied(position).into());
            }
            Err(e) if e.is_foreign_key_violation_of(SEAT_SCREENING_FK) => {
                return Err(BookingError::NotFound("Screening"));
            }
            Err(e) => return Err(BookingError::from_store("Failed to sell seat")(e)),
        };

        info!(screening_id, seat_id = sold.id, %position, "seat sold");
        Ok(sold)
    }

    async fn active_room(&self, id: i64) -> BookingResult<Room> {
        self.store
            .find_room(id)
            .await
            .map_err(BookingError::from_store("Failed to load room"))?
            .ok_or(BookingError::NotFound("Room"))
    }

    async fn active_movie(&self, id: i64) -> BookingResult<Movie> {
        self.store
            .find_movie(id)
            .await
            .map_err(BookingError::from_store("Failed to load movie"))?
            .ok_or(BookingError::NotFound("Movie"))
    }
}

fn require_start(request: &ScreeningRequest) -> Result<DateTime<Utc>, ValidationReason> {
    request
        .starts_at
        .ok_or_else(|| ValidationReason::InvalidInput("starts_at is required".into()))
}

fn require_window(starts_at: DateTime<Utc>, movie: &Movie) -> Result<(), ValidationReason> {
    scheduler::window_end(starts_at, movie.length)
        .map(|_| ())
        .ok_or_else(|| ValidationReason::InvalidInput(format!("starts_at {} is out of range", starts_at)))
}
