//! In-process store with the same constraints as the Postgres schema.
//!
//! One async mutex guards the whole state, so every call is a serializable
//! transaction. Used for local runs without a database and by the test suite.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tokio::sync::Mutex;

use super::{
    CinemaStore, MovieGuard, ScheduleGuard, StoreError, StoreResult, SEAT_POSITION_CONSTRAINT,
    SEAT_SCREENING_FK,
};
use crate::error::BookingError;
use crate::models::{
    Movie, NewMovie, NewReservation, NewRoom, NewScreening, NewSeat, Reservation,
    ReservationWithSeats, Room, ScheduledSlot, Screening, ScreeningDetail, ScreeningFilter, Seat,
    User,
};

#[derive(Default)]
struct State {
    users: BTreeMap<i64, User>,
    rooms: BTreeMap<i64, Room>,
    movies: BTreeMap<i64, Movie>,
    screenings: BTreeMap<i64, Screening>,
    seats: BTreeMap<i64, Seat>,
    reservations: BTreeMap<i64, Reservation>,
    next_id: i64,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn schedule(&self, room_id: i64, exclude_id: Option<i64>) -> Vec<ScheduledSlot> {
        let mut slots: Vec<ScheduledSlot> = self
            .screenings
            .values()
            .filter(|s| s.room_id == room_id && Some(s.id) != exclude_id)
            .filter_map(|s| {
                let movie = self.movies.get(&s.movie_id)?;
                Some(ScheduledSlot { screening_id: s.id, starts_at: s.starts_at, length: movie.length })
            })
            .collect();
        slots.sort_by_key(|slot| slot.starts_at);
        slots
    }

    fn run_schedule_guard(
        &self,
        room_id: i64,
        movie_id: i64,
        exclude_id: Option<i64>,
        guard: ScheduleGuard<'_>,
    ) -> StoreResult<()> {
        let length = self
            .movies
            .get(&movie_id)
            .map(|m| m.length)
            .ok_or_else(|| StoreError::Rejected(Box::new(BookingError::NotFound("Movie"))))?;
        guard(length, &self.schedule(room_id, exclude_id)).map_err(|e| StoreError::Rejected(Box::new(e)))
    }

    fn ensure_position_free(&self, seat: &NewSeat) -> StoreResult<()> {
        let taken = self
            .seats
            .values()
            .any(|s| s.screening_id == seat.screening_id && s.position == seat.position);
        if taken {
            return Err(StoreError::UniqueViolation { constraint: SEAT_POSITION_CONSTRAINT.to_string() });
        }
        Ok(())
    }

    fn with_seats(&self, reservation: &Reservation) -> Option<ReservationWithSeats> {
        let screening = self.screenings.get(&reservation.screening_id)?.clone();
        let mut seats: Vec<Seat> = self
            .seats
            .values()
            .filter(|s| s.reservation_id == Some(reservation.id))
            .cloned()
            .collect();
        seats.sort_by_key(|s| s.position);
        Some(ReservationWithSeats { reservation: reservation.clone(), seats, screening })
    }

    fn active_name_taken<'a>(
        mut names: impl Iterator<Item = (i64, &'a str, bool)>,
        name: &str,
        exclude_id: Option<i64>,
    ) -> bool {
        let wanted = name.to_lowercase();
        names.any(|(id, candidate, active)| active && Some(id) != exclude_id && candidate.to_lowercase() == wanted)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a user. `password_hash` must be a bcrypt hash.
    pub async fn add_user(&self, email: &str, password_hash: String, name: &str, is_admin: bool) -> StoreResult<User> {
        let mut state = self.state.lock().await;
        if state.users.values().any(|u| u.email == email) {
            return Err(StoreError::UniqueViolation { constraint: "users_email_key".to_string() });
        }
        let user = User {
            id: state.next_id(),
            email: email.to_string(),
            password_hash,
            name: name.to_string(),
            is_admin,
            is_active: true,
        };
        state.users.insert(user.id, user.clone());
        Ok(user)
    }
}

#[async_trait]
impl CinemaStore for MemoryStore {
    async fn find_active_user(&self, email: &str) -> StoreResult<Option<User>> {
        let state = self.state.lock().await;
        Ok(state.users.values().find(|u| u.email == email && u.is_active).cloned())
    }

    async fn list_rooms(&self) -> StoreResult<Vec<Room>> {
        let state = self.state.lock().await;
        let mut rooms: Vec<Room> = state.rooms.values().filter(|r| r.is_active()).cloned().collect();
        rooms.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rooms)
    }

    async fn find_room(&self, id: i64) -> StoreResult<Option<Room>> {
        let state = self.state.lock().await;
        Ok(state.rooms.get(&id).filter(|r| r.is_active()).cloned())
    }

    async fn room_name_taken(&self, name: &str, exclude_id: Option<i64>) -> StoreResult<bool> {
        let state = self.state.lock().await;
        let names = state.rooms.values().map(|r| (r.id, r.name.as_str(), r.is_active()));
        Ok(State::active_name_taken(names, name, exclude_id))
    }

    async fn insert_room(&self, room: NewRoom) -> StoreResult<Room> {
        let mut state = self.state.lock().await;
        let names = state.rooms.values().map(|r| (r.id, r.name.as_str(), r.is_active()));
        if State::active_name_taken(names, &room.name, None) {
            return Err(StoreError::UniqueViolation { constraint: "rooms_active_name_key".to_string() });
        }
        let room = Room {
            id: state.next_id(),
            name: room.name,
            rows: room.rows,
            columns: room.columns,
            created_at: room.created_at,
            deleted_at: None,
        };
        state.rooms.insert(room.id, room.clone());
        Ok(room)
    }

    async fn update_room(&self, room: &Room) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        let names = state.rooms.values().map(|r| (r.id, r.name.as_str(), r.is_active()));
        if State::active_name_taken(names, &room.name, Some(room.id)) {
            return Err(StoreError::UniqueViolation { constraint: "rooms_active_name_key".to_string() });
        }
        match state.rooms.get_mut(&room.id).filter(|r| r.is_active()) {
            Some(stored) => {
                stored.name = room.name.clone();
                stored.rows = room.rows;
                stored.columns = room.columns;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn soft_delete_room(&self, id: i64, at: DateTime<Utc>) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        match state.rooms.get_mut(&id).filter(|r| r.is_active()) {
            Some(room) => {
                room.deleted_at = Some(at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_movies(&self, limit: Option<i64>) -> StoreResult<Vec<Movie>> {
        let state = self.state.lock().await;
        let mut movies: Vec<Movie> = state.movies.values().filter(|m| m.is_active()).cloned().collect();
        movies.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        if let Some(limit) = limit {
            movies.truncate(usize::try_from(limit).unwrap_or(0));
        }
        Ok(movies)
    }

    async fn find_movie(&self, id: i64) -> StoreResult<Option<Movie>> {
        let state = self.state.lock().await;
        Ok(state.movies.get(&id).filter(|m| m.is_active()).cloned())
    }

    async fn movie_title_taken(&self, title: &str, exclude_id: Option<i64>) -> StoreResult<bool> {
        let state = self.state.lock().await;
        let titles = state.movies.values().map(|m| (m.id, m.title.as_str(), m.is_active()));
        Ok(State::active_name_taken(titles, title, exclude_id))
    }

    async fn insert_movie(&self, movie: NewMovie) -> StoreResult<Movie> {
        let mut state = self.state.lock().await;
        let titles = state.movies.values().map(|m| (m.id, m.title.as_str(), m.is_active()));
        if State::active_name_taken(titles, &movie.title, None) {
            return Err(StoreError::UniqueViolation { constraint: "movies_active_title_key".to_string() });
        }
        let movie = Movie {
            id: state.next_id(),
            title: movie.title,
            year: movie.year,
            director: movie.director,
            synopsis: movie.synopsis,
            length: movie.length,
            image: movie.image,
            created_at: movie.created_at,
            deleted_at: None,
        };
        state.movies.insert(movie.id, movie.clone());
        Ok(movie)
    }

    async fn update_movie(&self, movie: &Movie, guard: MovieGuard<'_>) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        let Some(current) = state.movies.get(&movie.id).filter(|m| m.is_active()).cloned() else {
            return Ok(false);
        };
        let screenings = state.screenings.values().filter(|s| s.movie_id == movie.id).count() as i64;
        guard(&current, screenings).map_err(|e| StoreError::Rejected(Box::new(e)))?;

        let titles = state.movies.values().map(|m| (m.id, m.title.as_str(), m.is_active()));
        if State::active_name_taken(titles, &movie.title, Some(movie.id)) {
            return Err(StoreError::UniqueViolation { constraint: "movies_active_title_key".to_string() });
        }
        if let Some(stored) = state.movies.get_mut(&movie.id) {
            stored.title = movie.title.clone();
            stored.year = movie.year;
            stored.director = movie.director.clone();
            stored.synopsis = movie.synopsis.clone();
            stored.length = movie.length;
            stored.image = movie.image.clone();
        }
        Ok(true)
    }

    async fn soft_delete_movie(&self, id: i64, at: DateTime<Utc>) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        match state.movies.get_mut(&id).filter(|m| m.is_active()) {
            Some(movie) => {
                movie.deleted_at = Some(at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn count_screenings_for_movie(&self, movie_id: i64) -> StoreResult<i64> {
        let state = self.state.lock().await;
        Ok(state.screenings.values().filter(|s| s.movie_id == movie_id).count() as i64)
    }

    async fn find_screening(&self, id: i64) -> StoreResult<Option<Screening>> {
        let state = self.state.lock().await;
        Ok(state.screenings.get(&id).cloned())
    }

    async fn load_screening(&self, id: i64) -> StoreResult<Option<ScreeningDetail>> {
        let state = self.state.lock().await;
        let Some(screening) = state.screenings.get(&id).cloned() else {
            return Ok(None);
        };
        let (Some(room), Some(movie)) = (
            state.rooms.get(&screening.room_id).cloned(),
            state.movies.get(&screening.movie_id).cloned(),
        ) else {
            return Ok(None);
        };
        let mut seats: Vec<Seat> = state.seats.values().filter(|s| s.screening_id == id).cloned().collect();
        seats.sort_by_key(|s| s.position);
        Ok(Some(ScreeningDetail { screening, room, movie, seats }))
    }

    async fn list_screenings(&self, filter: &ScreeningFilter) -> StoreResult<Vec<Screening>> {
        let state = self.state.lock().await;
        let mut screenings: Vec<Screening> =
            state.screenings.values().filter(|s| filter.matches(s)).cloned().collect();
        screenings.sort_by_key(|s| (s.starts_at, s.id));
        Ok(screenings)
    }

    async fn room_schedule(&self, room_id: i64, exclude_id: Option<i64>) -> StoreResult<Vec<ScheduledSlot>> {
        let state = self.state.lock().await;
        Ok(state.schedule(room_id, exclude_id))
    }

    async fn insert_screening(&self, screening: NewScreening, guard: ScheduleGuard<'_>) -> StoreResult<Screening> {
        let mut state = self.state.lock().await;
        state.run_schedule_guard(screening.room_id, screening.movie_id, None, guard)?;
        let created = Screening {
            id: state.next_id(),
            movie_id: screening.movie_id,
            room_id: screening.room_id,
            starts_at: screening.starts_at,
            created_at: screening.created_at,
        };
        state.screenings.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_screening(&self, screening: &Screening, guard: Option<ScheduleGuard<'_>>) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        if !state.screenings.contains_key(&screening.id) {
            return Ok(false);
        }
        if let Some(guard) = guard {
            state.run_schedule_guard(screening.room_id, screening.movie_id, Some(screening.id), guard)?;
        }
        if let Some(stored) = state.screenings.get_mut(&screening.id) {
            stored.movie_id = screening.movie_id;
            stored.room_id = screening.room_id;
            stored.starts_at = screening.starts_at;
        }
        Ok(true)
    }

    async fn delete_screening(&self, id: i64) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        if state.seats.values().any(|s| s.screening_id == id) {
            return Err(StoreError::ForeignKeyViolation { constraint: SEAT_SCREENING_FK.to_string() });
        }
        Ok(state.screenings.remove(&id).is_some())
    }

    async fn list_seats(&self, screening_id: i64) -> StoreResult<Vec<Seat>> {
        let state = self.state.lock().await;
        let mut seats: Vec<Seat> =
            state.seats.values().filter(|s| s.screening_id == screening_id).cloned().collect();
        seats.sort_by_key(|s| s.position);
        Ok(seats)
    }

    async fn count_seats(&self, screening_id: i64) -> StoreResult<i64> {
        let state = self.state.lock().await;
        Ok(state.seats.values().filter(|s| s.screening_id == screening_id).count() as i64)
    }

    async fn insert_sold_seat(&self, seat: NewSeat) -> StoreResult<Seat> {
        let mut state = self.state.lock().await;
        if !state.screenings.contains_key(&seat.screening_id) {
            return Err(StoreError::ForeignKeyViolation { constraint: SEAT_SCREENING_FK.to_string() });
        }
        state.ensure_position_free(&seat)?;
        let stored = Seat {
            id: state.next_id(),
            screening_id: seat.screening_id,
            position: seat.position,
            status: seat.status,
            reservation_id: None,
        };
        state.seats.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn insert_reservation(&self, reservation: NewReservation, seats: &[NewSeat]) -> StoreResult<ReservationWithSeats> {
        let mut state = self.state.lock().await;
        let Some(screening) = state.screenings.get(&reservation.screening_id).cloned() else {
            return Err(StoreError::ForeignKeyViolation { constraint: "reservations_screening_id_fkey".to_string() });
        };

        // Validate every seat before writing anything so a failure leaves no trace.
        for (i, seat) in seats.iter().enumerate() {
            state.ensure_position_free(seat)?;
            let repeated = seats[..i]
                .iter()
                .any(|s| s.screening_id == seat.screening_id && s.position == seat.position);
            if repeated {
                return Err(StoreError::UniqueViolation { constraint: SEAT_POSITION_CONSTRAINT.to_string() });
            }
        }

        let created = Reservation {
            id: state.next_id(),
            name: reservation.name,
            email: reservation.email,
            phone: reservation.phone,
            created_at: reservation.created_at,
            comment: reservation.comment,
            owner_user_id: reservation.owner_user_id,
            screening_id: reservation.screening_id,
        };
        state.reservations.insert(created.id, created.clone());

        let mut stored_seats = Vec::with_capacity(seats.len());
        for seat in seats {
            let stored = Seat {
                id: state.next_id(),
                screening_id: seat.screening_id,
                position: seat.position,
                status: seat.status,
                reservation_id: Some(created.id),
            };
            state.seats.insert(stored.id, stored.clone());
            stored_seats.push(stored);
        }

        Ok(ReservationWithSeats { reservation: created, seats: stored_seats, screening })
    }

    async fn find_reservation(&self, id: i64) -> StoreResult<Option<ReservationWithSeats>> {
        let state = self.state.lock().await;
        Ok(state.reservations.get(&id).and_then(|r| state.with_seats(r)))
    }

    async fn list_reservations(&self, owner: Option<i64>) -> StoreResult<Vec<ReservationWithSeats>> {
        let state = self.state.lock().await;
        let mut reservations: Vec<ReservationWithSeats> = state
            .reservations
            .values()
            .filter(|r| owner.is_none_or(|o| r.owner_user_id == o))
            .filter_map(|r| state.with_seats(r))
            .collect();
        reservations.sort_by(|a, b| {
            b.reservation
                .created_at
                .cmp(&a.reservation.created_at)
                .then(b.reservation.id.cmp(&a.reservation.id))
        });
        Ok(reservations)
    }

    async fn delete_reservation(&self, id: i64) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        if state.reservations.remove(&id).is_none() {
            return Ok(false);
        }
        state.seats.retain(|_, seat| seat.reservation_id != Some(id));
        Ok(true)
    }
}
