pub mod room;
pub mod movie;
pub mod screening;
pub mod seat;
pub mod reservation;
pub mod user;

pub use room::{NewRoom, Room};
pub use movie::{Movie, NewMovie};
pub use screening::{NewScreening, ScheduledSlot, Screening, ScreeningDetail, ScreeningFilter};
pub use seat::{NewSeat, Seat, SeatPosition, SeatStatus};
pub use reservation::{NewReservation, Reservation, ReservationWithSeats};
pub use user::User;
