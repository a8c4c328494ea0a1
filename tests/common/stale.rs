use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use cinema_booking::models::{
    Movie, NewMovie, NewReservation, NewRoom, NewScreening, NewSeat, ReservationWithSeats, Room,
    ScheduledSlot, Screening, ScreeningDetail, ScreeningFilter, Seat, User,
};
use cinema_booking::store::{CinemaStore, MemoryStore, MovieGuard, ScheduleGuard, StoreError, StoreResult};

/// Serves frozen screening snapshots with an empty seat map, so writes made
/// after `freeze` are only seen by the storage constraints.
pub struct StaleStore {
    pub inner: Arc<MemoryStore>,
    frozen: Mutex<HashMap<i64, ScreeningDetail>>,
    fail_seat_reload: AtomicBool,
}

impl StaleStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self { inner, frozen: Mutex::default(), fail_seat_reload: AtomicBool::new(false) }
    }

    pub async fn freeze(&self, screening_id: i64) {
        let mut detail = self.inner.load_screening(screening_id).await.unwrap().unwrap();
        detail.seats.clear();
        self.frozen.lock().unwrap().insert(screening_id, detail);
    }

    pub fn fail_seat_reload(&self) {
        self.fail_seat_reload.store(true, Ordering::SeqCst);
    }

    fn is_frozen(&self, screening_id: i64) -> bool {
        self.frozen.lock().unwrap().contains_key(&screening_id)
    }
}

#[async_trait]
impl CinemaStore for StaleStore {
    async fn find_active_user(&self, email: &str) -> StoreResult<Option<User>> {
        self.inner.find_active_user(email).await
    }

    async fn list_rooms(&self) -> StoreResult<Vec<Room>> {
        self.inner.list_rooms().await
    }

    async fn find_room(&self, id: i64) -> StoreResult<Option<Room>> {
        self.inner.find_room(id).await
    }

    async fn room_name_taken(&self, name: &str, exclude_id: Option<i64>) -> StoreResult<bool> {
        self.inner.room_name_taken(name, exclude_id).await
    }

    async fn insert_room(&self, room: NewRoom) -> StoreResult<Room> {
        self.inner.insert_room(room).await
    }

    async fn update_room(&self, room: &Room) -> StoreResult<bool> {
        self.inner.update_room(room).await
    }

    async fn soft_delete_room(&self, id: i64, at: DateTime<Utc>) -> StoreResult<bool> {
        self.inner.soft_delete_room(id, at).await
    }

    async fn list_movies(&self, limit: Option<i64>) -> StoreResult<Vec<Movie>> {
        self.inner.list_movies(limit).await
    }

    async fn find_movie(&self, id: i64) -> StoreResult<Option<Movie>> {
        self.inner.find_movie(id).await
    }

    async fn movie_title_taken(&self, title: &str, exclude_id: Option<i64>) -> StoreResult<bool> {
        self.inner.movie_title_taken(title, exclude_id).await
    }

    async fn insert_movie(&self, movie: NewMovie) -> StoreResult<Movie> {
        self.inner.insert_movie(movie).await
    }

    async fn update_movie(&self, movie: &Movie, guard: MovieGuard<'_>) -> StoreResult<bool> {
        self.inner.update_movie(movie, guard).await
    }

    async fn soft_delete_movie(&self, id: i64, at: DateTime<Utc>) -> StoreResult<bool> {
        self.inner.soft_delete_movie(id, at).await
    }

    async fn count_screenings_for_movie(&self, movie_id: i64) -> StoreResult<i64> {
        self.inner.count_screenings_for_movie(movie_id).await
    }

    async fn find_screening(&self, id: i64) -> StoreResult<Option<Screening>> {
        let frozen = self.frozen.lock().unwrap().get(&id).map(|d| d.screening.clone());
        if frozen.is_some() {
            return Ok(frozen);
        }
        self.inner.find_screening(id).await
    }

    async fn load_screening(&self, id: i64) -> StoreResult<Option<ScreeningDetail>> {
        let frozen = self.frozen.lock().unwrap().get(&id).cloned();
        if frozen.is_some() {
            return Ok(frozen);
        }
        self.inner.load_screening(id).await
    }

    async fn list_screenings(&self, filter: &ScreeningFilter) -> StoreResult<Vec<Screening>> {
        self.inner.list_screenings(filter).await
    }

    async fn room_schedule(&self, room_id: i64, exclude_id: Option<i64>) -> StoreResult<Vec<ScheduledSlot>> {
        self.inner.room_schedule(room_id, exclude_id).await
    }

    async fn insert_screening(&self, screening: NewScreening, guard: ScheduleGuard<'_>) -> StoreResult<Screening> {
        self.inner.insert_screening(screening, guard).await
    }

    async fn update_screening(&self, screening: &Screening, guard: Option<ScheduleGuard<'_>>) -> StoreResult<bool> {
        self.inner.update_screening(screening, guard).await
    }

    async fn delete_screening(&self, id: i64) -> StoreResult<bool> {
        self.inner.delete_screening(id).await
    }

    async fn list_seats(&self, screening_id: i64) -> StoreResult<Vec<Seat>> {
        if self.fail_seat_reload.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        self.inner.list_seats(screening_id).await
    }

    async fn count_seats(&self, screening_id: i64) -> StoreResult<i64> {
        if self.is_frozen(screening_id) {
            return Ok(0);
        }
        self.inner.count_seats(screening_id).await
    }

    async fn insert_sold_seat(&self, seat: NewSeat) -> StoreResult<Seat> {
        self.inner.insert_sold_seat(seat).await
    }

    async fn insert_reservation(&self, reservation: NewReservation, seats: &[NewSeat]) -> StoreResult<ReservationWithSeats> {
        self.inner.insert_reservation(reservation, seats).await
    }

    async fn find_reservation(&self, id: i64) -> StoreResult<Option<ReservationWithSeats>> {
        self.inner.find_reservation(id).await
    }

    async fn list_reservations(&self, owner: Option<i64>) -> StoreResult<Vec<ReservationWithSeats>> {
        self.inner.list_reservations(owner).await
    }

    async fn delete_reservation(&self, id: i64) -> StoreResult<bool> {
        self.inner.delete_reservation(id).await
    }
}
