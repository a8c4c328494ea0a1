//! Persistence seam for the booking engine.
//!
//! Every multi-row write happens inside one store call so the backend can make
//! it atomic. Checks that must observe a consistent snapshot (room schedule,
//! movie screening count) are passed in as guards and run inside that same
//! unit of work.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::BookingError;
use crate::models::{
    Movie, NewMovie, NewReservation, NewRoom, NewScreening, NewSeat, ReservationWithSeats, Room,
    ScheduledSlot, Screening, ScreeningDetail, ScreeningFilter, Seat, User,
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Unique index that keeps one seat per position on a screening.
pub const SEAT_POSITION_CONSTRAINT: &str = "seats_screening_position_key";
/// Foreign key from seats to their screening.
pub const SEAT_SCREENING_FK: &str = "seats_screening_id_fkey";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("unique constraint `{constraint}` violated")]
    UniqueViolation { constraint: String },
    #[error("foreign key constraint `{constraint}` violated")]
    ForeignKeyViolation { constraint: String },
    /// A guard refused the write; the transaction was rolled back.
    #[error("{0}")]
    Rejected(Box<BookingError>),
    #[error("database error: {0}")]
    Database(sqlx::Error),
}

impl StoreError {
    pub fn is_unique_violation_of(&self, name: &str) -> bool {
        matches!(self, StoreError::UniqueViolation { constraint } if constraint == name)
    }

    pub fn is_foreign_key_violation_of(&self, name: &str) -> bool {
        matches!(self, StoreError::ForeignKeyViolation { constraint } if constraint == name)
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &e {
            let constraint = db_err.constraint().unwrap_or_default().to_string();
            if db_err.is_unique_violation() {
                return StoreError::UniqueViolation { constraint };
            }
            if db_err.is_foreign_key_violation() {
                return StoreError::ForeignKeyViolation { constraint };
            }
        }
        StoreError::Database(e)
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Runs against the room's schedule (the screening being updated already
/// excluded) and the length of the movie to be shown.
pub type ScheduleGuard<'a> = &'a (dyn Fn(i32, &[ScheduledSlot]) -> Result<(), BookingError> + Send + Sync);

/// Runs against the stored movie and its current screening count.
pub type MovieGuard<'a> = &'a (dyn Fn(&Movie, i64) -> Result<(), BookingError> + Send + Sync);

#[async_trait]
pub trait CinemaStore: Send + Sync {
    async fn find_active_user(&self, email: &str) -> StoreResult<Option<User>>;

    // Rooms. Lookups only ever return active rooms.
    async fn list_rooms(&self) -> StoreResult<Vec<Room>>;
    async fn find_room(&self, id: i64) -> StoreResult<Option<Room>>;
    async fn room_name_taken(&self, name: &str, exclude_id: Option<i64>) -> StoreResult<bool>;
    async fn insert_room(&self, room: NewRoom) -> StoreResult<Room>;
    async fn update_room(&self, room: &Room) -> StoreResult<bool>;
    async fn soft_delete_room(&self, id: i64, at: DateTime<Utc>) -> StoreResult<bool>;

    // Movies. Lookups only ever return active movies.
    async fn list_movies(&self, limit: Option<i64>) -> StoreResult<Vec<Movie>>;
    async fn find_movie(&self, id: i64) -> StoreResult<Option<Movie>>;
    async fn movie_title_taken(&self, title: &str, exclude_id: Option<i64>) -> StoreResult<bool>;
    async fn insert_movie(&self, movie: NewMovie) -> StoreResult<Movie>;
    async fn update_movie(&self, movie: &Movie, guard: MovieGuard<'_>) -> StoreResult<bool>;
    async fn soft_delete_movie(&self, id: i64, at: DateTime<Utc>) -> StoreResult<bool>;
    async fn count_screenings_for_movie(&self, movie_id: i64) -> StoreResult<i64>;

    // Screenings.
    async fn find_screening(&self, id: i64) -> StoreResult<Option<Screening>>;
    /// Loads the screening with its room, movie and seats. Room and movie are
    /// returned even when soft-deleted.
    async fn load_screening(&self, id: i64) -> StoreResult<Option<ScreeningDetail>>;
    async fn list_screenings(&self, filter: &ScreeningFilter) -> StoreResult<Vec<Screening>>;
    async fn room_schedule(&self, room_id: i64, exclude_id: Option<i64>) -> StoreResult<Vec<ScheduledSlot>>;
    async fn insert_screening(&self, screening: NewScreening, guard: ScheduleGuard<'_>) -> StoreResult<Screening>;
    /// `guard` is `None` when the schedule does not need rechecking.
    async fn update_screening(&self, screening: &Screening, guard: Option<ScheduleGuard<'_>>) -> StoreResult<bool>;
    async fn delete_screening(&self, id: i64) -> StoreResult<bool>;

    // Seats.
    async fn list_seats(&self, screening_id: i64) -> StoreResult<Vec<Seat>>;
    async fn count_seats(&self, screening_id: i64) -> StoreResult<i64>;
    async fn insert_sold_seat(&self, seat: NewSeat) -> StoreResult<Seat>;

    // Reservations. Seats are written and removed together with their reservation.
    async fn insert_reservation(&self, reservation: NewReservation, seats: &[NewSeat]) -> StoreResult<ReservationWithSeats>;
    async fn find_reservation(&self, id: i64) -> StoreResult<Option<ReservationWithSeats>>;
    /// `owner` of `None` lists every reservation.
    async fn list_reservations(&self, owner: Option<i64>) -> StoreResult<Vec<ReservationWithSeats>>;
    async fn delete_reservation(&self, id: i64) -> StoreResult<bool>;
}
