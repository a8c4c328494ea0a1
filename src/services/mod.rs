pub mod geometry;
pub mod movies;
pub mod notifications;
pub mod reservations;
pub mod rooms;
pub mod scheduler;
pub mod screenings;
pub mod seats;

pub use movies::{MovieRequest, MovieService};
pub use reservations::{ReservationRequest, ReservationService, SeatRequest};
pub use rooms::{RoomRequest, RoomService};
pub use screenings::{ScreeningRequest, ScreeningService};

/// Identity of whoever is making the call.
pub trait Authorization: Send + Sync {
    fn current_user_id(&self) -> i64;
    fn is_current_user_admin(&self) -> bool;
}
