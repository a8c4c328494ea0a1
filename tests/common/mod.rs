#![allow(dead_code)]

pub mod stale;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use fake::faker::internet::en::SafeEmail;
use fake::faker::name::en::Name;
use fake::Fake;
use std::sync::{Arc, Mutex};

use cinema_booking::config::Config;
use cinema_booking::models::{Movie, Room, Screening};
use cinema_booking::services::notifications::{MailError, Mailer};
use cinema_booking::services::{
    Authorization, MovieRequest, ReservationRequest, RoomRequest, ScreeningRequest, SeatRequest,
};
use cinema_booking::store::{CinemaStore, MemoryStore};
use cinema_booking::AppState;

pub struct Caller {
    pub id: i64,
    pub admin: bool,
}

impl Caller {
    pub fn user(id: i64) -> Self {
        Self { id, admin: false }
    }

    pub fn admin() -> Self {
        Self { id: 1_000, admin: true }
    }
}

impl Authorization for Caller {
    fn current_user_id(&self) -> i64 {
        self.id
    }

    fn is_current_user_admin(&self) -> bool {
        self.admin
    }
}

#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<(String, String, String)>>,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<(String, String, String)> {
        self.sent.lock().unwrap().clone()
    }

    /// Waits for the detached send task to run.
    pub async fn wait_for(&self, count: usize) -> Vec<(String, String, String)> {
        for _ in 0..200 {
            if self.sent.lock().unwrap().len() >= count {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        self.sent()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send_email(&self, to: &str, subject: &str, html_body: &str) -> Result<(), MailError> {
        self.sent.lock().unwrap().push((to.to_string(), subject.to_string(), html_body.to_string()));
        Ok(())
    }
}

pub struct FailingMailer;

#[async_trait]
impl Mailer for FailingMailer {
    async fn send_email(&self, _to: &str, _subject: &str, _html_body: &str) -> Result<(), MailError> {
        Err(MailError::Rejected(503))
    }
}

pub struct TestApp {
    pub store: Arc<MemoryStore>,
    pub mailer: Arc<RecordingMailer>,
    pub state: Arc<AppState>,
}

pub fn app() -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let mailer = Arc::new(RecordingMailer::default());
    let state = AppState::with_store(
        Config::in_memory(),
        store.clone() as Arc<dyn CinemaStore>,
        mailer.clone(),
    );
    TestApp { store, mailer, state }
}

pub fn app_with_mailer(mailer: Arc<dyn Mailer>) -> Arc<AppState> {
    AppState::with_store(Config::in_memory(), Arc::new(MemoryStore::new()), mailer)
}

/// 10:00 UTC, thirty days from now.
pub fn future_morning() -> DateTime<Utc> {
    let day = (Utc::now() + Duration::days(30)).date_naive();
    day.and_hms_opt(10, 0, 0).unwrap().and_utc()
}

pub async fn room(state: &AppState, name: &str, rows: i32, columns: i32) -> Room {
    state
        .rooms
        .create(RoomRequest { name: name.into(), rows, columns })
        .await
        .unwrap()
}

pub fn movie_request(title: &str, length: i32) -> MovieRequest {
    MovieRequest {
        title: title.into(),
        year: 2010,
        director: Name().fake(),
        synopsis: "A test feature.".into(),
        length,
        image: Vec::new(),
    }
}

pub async fn movie(state: &AppState, title: &str, length: i32) -> Movie {
    state.movies.create(movie_request(title, length)).await.unwrap()
}

pub async fn screening(state: &AppState, room: &Room, movie: &Movie, starts_at: DateTime<Utc>) -> Screening {
    state
        .screenings
        .create_screening(ScreeningRequest { movie_id: movie.id, room_id: room.id, starts_at: Some(starts_at) })
        .await
        .unwrap()
}

/// Room A (10x12) with a 120 minute movie showing 30 days from now.
pub async fn booked_setup(state: &AppState) -> Screening {
    let room = room(state, "A", 10, 12).await;
    let movie = movie(state, "Arrival", 120).await;
    screening(state, &room, &movie, future_morning()).await
}

pub fn reservation(screening_id: i64, seats: &[(i32, i32)]) -> ReservationRequest {
    ReservationRequest {
        screening_id,
        name: Name().fake(),
        email: SafeEmail().fake(),
        phone: "+7-700-555-0102".into(),
        comment: None,
        seats: seats
            .iter()
            .map(|&(row, column)| SeatRequest { row, column, screening_id: Some(screening_id) })
            .collect(),
    }
}
