use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use std::collections::HashMap;

use super::{CinemaStore, MovieGuard, ScheduleGuard, StoreError, StoreResult};
use crate::database::Database;
use crate::error::BookingError;
use crate::models::{
    Movie, NewMovie, NewReservation, NewRoom, NewScreening, NewSeat, Reservation,
    ReservationWithSeats, Room, ScheduledSlot, Screening, ScreeningDetail, ScreeningFilter, Seat,
    User,
};

const ROOM_COLUMNS: &str = "id, name, rows, columns, created_at, deleted_at";
const MOVIE_COLUMNS: &str =
    "id, title, year, director, synopsis, length, image, created_at, deleted_at";
const SCREENING_COLUMNS: &str = "id, movie_id, room_id, starts_at, created_at";
const SEAT_COLUMNS: &str = "id, screening_id, seat_row, seat_column, status, reservation_id";
const RESERVATION_COLUMNS: &str =
    "id, name, email, phone, created_at, comment, owner_user_id, screening_id";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(db: &Database) -> Self {
        Self { pool: db.pool.clone() }
    }

    /// Serializes schedule changes for one room until the transaction ends.
    async fn lock_room_schedule(tx: &mut Transaction<'_, Postgres>, room_id: i64) -> StoreResult<()> {
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(room_id)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    /// Reads the movie length while blocking concurrent length updates.
    async fn movie_length_for_share(tx: &mut Transaction<'_, Postgres>, movie_id: i64) -> StoreResult<Option<i32>> {
        let length = sqlx::query_scalar::<_, i32>("SELECT length FROM movies WHERE id = $1 FOR SHARE")
            .bind(movie_id)
            .fetch_optional(&mut **tx)
            .await?;
        Ok(length)
    }

    async fn schedule_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        room_id: i64,
        exclude_id: Option<i64>,
    ) -> StoreResult<Vec<ScheduledSlot>> {
        let slots = sqlx::query_as::<_, ScheduledSlot>(
            r#"
            SELECT s.id AS screening_id, s.starts_at, m.length
            FROM screenings s
            JOIN movies m ON m.id = s.movie_id
            WHERE s.room_id = $1 AND ($2::BIGINT IS NULL OR s.id <> $2)
            ORDER BY s.starts_at
            "#,
        )
        .bind(room_id)
        .bind(exclude_id)
        .fetch_all(&mut **tx)
        .await?;
        Ok(slots)
    }

    async fn run_schedule_guard(
        tx: &mut Transaction<'_, Postgres>,
        room_id: i64,
        movie_id: i64,
        exclude_id: Option<i64>,
        guard: ScheduleGuard<'_>,
    ) -> StoreResult<()> {
        Self::lock_room_schedule(tx, room_id).await?;
        let length = Self::movie_length_for_share(tx, movie_id)
            .await?
            .ok_or_else(|| StoreError::Rejected(Box::new(BookingError::NotFound("Movie"))))?;
        let slots = Self::schedule_in_tx(tx, room_id, exclude_id).await?;
        guard(length, &slots).map_err(|e| StoreError::Rejected(Box::new(e)))
    }

    async fn attach_seats(&self, reservations: Vec<Reservation>) -> StoreResult<Vec<ReservationWithSeats>> {
        if reservations.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<i64> = reservations.iter().map(|r| r.id).collect();
        let screening_ids: Vec<i64> = reservations.iter().map(|r| r.screening_id).collect();

        let seats = sqlx::query_as::<_, Seat>(&format!(
            "SELECT {SEAT_COLUMNS} FROM seats WHERE reservation_id = ANY($1) ORDER BY seat_row, seat_column"
        ))
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let screenings = sqlx::query_as::<_, Screening>(&format!(
            "SELECT {SCREENING_COLUMNS} FROM screenings WHERE id = ANY($1)"
        ))
        .bind(&screening_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut seats_by_reservation: HashMap<i64, Vec<Seat>> = HashMap::new();
        for seat in seats {
            if let Some(rid) = seat.reservation_id {
                seats_by_reservation.entry(rid).or_default().push(seat);
            }
        }
        let screenings: HashMap<i64, Screening> = screenings.into_iter().map(|s| (s.id, s)).collect();

        Ok(reservations
            .into_iter()
            .filter_map(|reservation| {
                let screening = screenings.get(&reservation.screening_id)?.clone();
                let seats = seats_by_reservation.remove(&reservation.id).unwrap_or_default();
                Some(ReservationWithSeats { reservation, seats, screening })
            })
            .collect())
    }
}

#[async_trait]
impl CinemaStore for PgStore {
    async fn find_active_user(&self, email: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, email, password_hash, name, is_admin, is_active
             FROM users
             WHERE email = $1 AND is_active = true",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    /* ---------- rooms ---------- */

    async fn list_rooms(&self) -> StoreResult<Vec<Room>> {
        let rooms = sqlx::query_as::<_, Room>(&format!(
            "SELECT {ROOM_COLUMNS} FROM rooms WHERE deleted_at IS NULL ORDER BY name"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rooms)
    }

    async fn find_room(&self, id: i64) -> StoreResult<Option<Room>> {
        let room = sqlx::query_as::<_, Room>(&format!(
            "SELECT {ROOM_COLUMNS} FROM rooms WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(room)
    }

    async fn room_name_taken(&self, name: &str, exclude_id: Option<i64>) -> StoreResult<bool> {
        let taken = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(
               SELECT 1 FROM rooms
               WHERE lower(name) = lower($1) AND deleted_at IS NULL
                 AND ($2::BIGINT IS NULL OR id <> $2)
             )",
        )
        .bind(name)
        .bind(exclude_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(taken)
    }

    async fn insert_room(&self, room: NewRoom) -> StoreResult<Room> {
        let room = sqlx::query_as::<_, Room>(&format!(
            "INSERT INTO rooms (name, rows, columns, created_at)
             VALUES ($1, $2, $3, $4)
             RETURNING {ROOM_COLUMNS}"
        ))
        .bind(&room.name)
        .bind(room.rows)
        .bind(room.columns)
        .bind(room.created_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(room)
    }

    async fn update_room(&self, room: &Room) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE rooms SET name = $2, rows = $3, columns = $4
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(room.id)
        .bind(&room.name)
        .bind(room.rows)
        .bind(room.columns)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn soft_delete_room(&self, id: i64, at: DateTime<Utc>) -> StoreResult<bool> {
        let result = sqlx::query("UPDATE rooms SET deleted_at = $2 WHERE id = $1 AND deleted_at IS NULL")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /* ---------- movies ---------- */

    async fn list_movies(&self, limit: Option<i64>) -> StoreResult<Vec<Movie>> {
        let movies = sqlx::query_as::<_, Movie>(&format!(
            "SELECT {MOVIE_COLUMNS} FROM movies
             WHERE deleted_at IS NULL
             ORDER BY created_at DESC, id DESC
             LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(movies)
    }

    async fn find_movie(&self, id: i64) -> StoreResult<Option<Movie>> {
        let movie = sqlx::query_as::<_, Movie>(&format!(
            "SELECT {MOVIE_COLUMNS} FROM movies WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(movie)
    }

    async fn movie_title_taken(&self, title: &str, exclude_id: Option<i64>) -> StoreResult<bool> {
        let taken = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(
               SELECT 1 FROM movies
               WHERE lower(title) = lower($1) AND deleted_at IS NULL
                 AND ($2::BIGINT IS NULL OR id <> $2)
             )",
        )
        .bind(title)
        .bind(exclude_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(taken)
    }

    async fn insert_movie(&self, movie: NewMovie) -> StoreResult<Movie> {
        let movie = sqlx::query_as::<_, Movie>(&format!(
            "INSERT INTO movies (title, year, director, synopsis, length, image, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {MOVIE_COLUMNS}"
        ))
        .bind(&movie.title)
        .bind(movie.year)
        .bind(&movie.director)
        .bind(&movie.synopsis)
        .bind(movie.length)
        .bind(&movie.image)
        .bind(movie.created_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(movie)
    }

    async fn update_movie(&self, movie: &Movie, guard: MovieGuard<'_>) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;

        let current = sqlx::query_as::<_, Movie>(&format!(
            "SELECT {MOVIE_COLUMNS} FROM movies WHERE id = $1 AND deleted_at IS NULL FOR UPDATE"
        ))
        .bind(movie.id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(current) = current else {
            return Ok(false);
        };

        let screenings: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM screenings WHERE movie_id = $1")
            .bind(movie.id)
            .fetch_one(&mut *tx)
            .await?;

        // Dropping the transaction rolls it back.
        guard(&current, screenings).map_err(|e| StoreError::Rejected(Box::new(e)))?;

        sqlx::query(
            "UPDATE movies
             SET title = $2, year = $3, director = $4, synopsis = $5, length = $6, image = $7
             WHERE id = $1",
        )
        .bind(movie.id)
        .bind(&movie.title)
        .bind(movie.year)
        .bind(&movie.director)
        .bind(&movie.synopsis)
        .bind(movie.length)
        .bind(&movie.image)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn soft_delete_movie(&self, id: i64, at: DateTime<Utc>) -> StoreResult<bool> {
        let result = sqlx::query("UPDATE movies SET deleted_at = $2 WHERE id = $1 AND deleted_at IS NULL")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn count_screenings_for_movie(&self, movie_id: i64) -> StoreResult<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM screenings WHERE movie_id = $1")
            .bind(movie_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /* ---------- screenings ---------- */

    async fn find_screening(&self, id: i64) -> StoreResult<Option<Screening>> {
        let screening = sqlx::query_as::<_, Screening>(&format!(
            "SELECT {SCREENING_COLUMNS} FROM screenings WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(screening)
    }

    async fn load_screening(&self, id: i64) -> StoreResult<Option<ScreeningDetail>> {
        let Some(screening) = self.find_screening(id).await? else {
            return Ok(None);
        };

        let room = sqlx::query_as::<_, Room>(&format!("SELECT {ROOM_COLUMNS} FROM rooms WHERE id = $1"))
            .bind(screening.room_id)
            .fetch_one(&self.pool)
            .await?;
        let movie = sqlx::query_as::<_, Movie>(&format!("SELECT {MOVIE_COLUMNS} FROM movies WHERE id = $1"))
            .bind(screening.movie_id)
            .fetch_one(&self.pool)
            .await?;
        let seats = self.list_seats(id).await?;

        Ok(Some(ScreeningDetail { screening, room, movie, seats }))
    }

    async fn list_screenings(&self, filter: &ScreeningFilter) -> StoreResult<Vec<Screening>> {
        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {SCREENING_COLUMNS} FROM screenings WHERE TRUE"));
        if let Some(movie_id) = filter.movie_id {
            qb.push(" AND movie_id = ").push_bind(movie_id);
        }
        if let Some(room_id) = filter.room_id {
            qb.push(" AND room_id = ").push_bind(room_id);
        }
        if let Some(after) = filter.starts_after {
            qb.push(" AND starts_at >= ").push_bind(after);
        }
        if let Some(before) = filter.starts_before {
            qb.push(" AND starts_at <= ").push_bind(before);
        }
        qb.push(" ORDER BY starts_at, id");

        let screenings = qb.build_query_as::<Screening>().fetch_all(&self.pool).await?;
        Ok(screenings)
    }

    async fn room_schedule(&self, room_id: i64, exclude_id: Option<i64>) -> StoreResult<Vec<ScheduledSlot>> {
        let mut tx = self.pool.begin().await?;
        let slots = Self::schedule_in_tx(&mut tx, room_id, exclude_id).await?;
        tx.commit().await?;
        Ok(slots)
    }

    async fn insert_screening(&self, screening: NewScreening, guard: ScheduleGuard<'_>) -> StoreResult<Screening> {
        let mut tx = self.pool.begin().await?;

        Self::run_schedule_guard(&mut tx, screening.room_id, screening.movie_id, None, guard).await?;

        let created = sqlx::query_as::<_, Screening>(&format!(
            "INSERT INTO screenings (movie_id, room_id, starts_at, created_at)
             VALUES ($1, $2, $3, $4)
             RETURNING {SCREENING_COLUMNS}"
        ))
        .bind(screening.movie_id)
        .bind(screening.room_id)
        .bind(screening.starts_at)
        .bind(screening.created_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(created)
    }

    async fn update_screening(&self, screening: &Screening, guard: Option<ScheduleGuard<'_>>) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;

        if let Some(guard) = guard {
            Self::run_schedule_guard(&mut tx, screening.room_id, screening.movie_id, Some(screening.id), guard)
                .await?;
        }

        let result = sqlx::query(
            "UPDATE screenings SET movie_id = $2, room_id = $3, starts_at = $4 WHERE id = $1",
        )
        .bind(screening.id)
        .bind(screening.movie_id)
        .bind(screening.room_id)
        .bind(screening.starts_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_screening(&self, id: i64) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM screenings WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /* ---------- seats ---------- */

    async fn list_seats(&self, screening_id: i64) -> StoreResult<Vec<Seat>> {
        let seats = sqlx::query_as::<_, Seat>(&format!(
            "SELECT {SEAT_COLUMNS} FROM seats WHERE screening_id = $1 ORDER BY seat_row, seat_column"
        ))
        .bind(screening_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(seats)
    }

    async fn count_seats(&self, screening_id: i64) -> StoreResult<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM seats WHERE screening_id = $1")
            .bind(screening_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn insert_sold_seat(&self, seat: NewSeat) -> StoreResult<Seat> {
        let seat = sqlx::query_as::<_, Seat>(&format!(
            "INSERT INTO seats (screening_id, seat_row, seat_column, status, reservation_id)
             VALUES ($1, $2, $3, $4, NULL)
             RETURNING {SEAT_COLUMNS}"
        ))
        .bind(seat.screening_id)
        .bind(seat.position.row)
        .bind(seat.position.column)
        .bind(seat.status)
        .fetch_one(&self.pool)
        .await?;
        Ok(seat)
    }

    /* ---------- reservations ---------- */

    async fn insert_reservation(&self, reservation: NewReservation, seats: &[NewSeat]) -> StoreResult<ReservationWithSeats> {
        let mut tx = self.pool.begin().await?;

        let created = sqlx::query_as::<_, Reservation>(&format!(
            "INSERT INTO reservations (name, email, phone, created_at, comment, owner_user_id, screening_id)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {RESERVATION_COLUMNS}"
        ))
        .bind(&reservation.name)
        .bind(&reservation.email)
        .bind(&reservation.phone)
        .bind(reservation.created_at)
        .bind(&reservation.comment)
        .bind(reservation.owner_user_id)
        .bind(reservation.screening_id)
        .fetch_one(&mut *tx)
        .await?;

        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO seats (screening_id, seat_row, seat_column, status, reservation_id) ",
        );
        qb.push_values(seats, |mut b, seat| {
            b.push_bind(seat.screening_id)
                .push_bind(seat.position.row)
                .push_bind(seat.position.column)
                .push_bind(seat.status)
                .push_bind(created.id);
        });
        qb.push(format!(" RETURNING {SEAT_COLUMNS}"));

        // A concurrent booking of the same position fails here on the unique index.
        let stored_seats = qb.build_query_as::<Seat>().fetch_all(&mut *tx).await?;

        let screening = sqlx::query_as::<_, Screening>(&format!(
            "SELECT {SCREENING_COLUMNS} FROM screenings WHERE id = $1"
        ))
        .bind(created.screening_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(ReservationWithSeats { reservation: created, seats: stored_seats, screening })
    }

    async fn find_reservation(&self, id: i64) -> StoreResult<Option<ReservationWithSeats>> {
        let reservation = sqlx::query_as::<_, Reservation>(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match reservation {
            Some(r) => Ok(self.attach_seats(vec![r]).await?.into_iter().next()),
            None => Ok(None),
        }
    }

    async fn list_reservations(&self, owner: Option<i64>) -> StoreResult<Vec<ReservationWithSeats>> {
        let reservations = sqlx::query_as::<_, Reservation>(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations
             WHERE ($1::BIGINT IS NULL OR owner_user_id = $1)
             ORDER BY created_at DESC, id DESC"
        ))
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;
        self.attach_seats(reservations).await
    }

    async fn delete_reservation(&self, id: i64) -> StoreResult<bool> {
        // seats.reservation_id is ON DELETE CASCADE, so the seats go in the same statement
        let result = sqlx::query("DELETE FROM reservations WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
