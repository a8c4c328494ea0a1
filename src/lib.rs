pub mod config;
pub mod controllers;
pub mod database;
pub mod error;
pub mod middleware;
pub mod models;
pub mod services;
pub mod store;

use std::sync::Arc;

use config::{Config, StorageBackend};
use services::notifications::{self, Mailer};
use services::{MovieService, ReservationService, RoomService, ScreeningService};
use store::{CinemaStore, MemoryStore, PgStore};

pub type StartupError = Box<dyn std::error::Error + Send + Sync>;

// Shared state for the whole application
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn CinemaStore>,
    pub rooms: RoomService,
    pub movies: MovieService,
    pub screenings: ScreeningService,
    pub reservations: ReservationService,
}

impl AppState {
    /// Connects the configured backend and the mailer.
    pub async fn new(config: Config) -> Result<Arc<Self>, StartupError> {
        let store: Arc<dyn CinemaStore> = match config.database.backend {
            StorageBackend::Postgres => {
                let url = config.database.url.as_deref().ok_or("DATABASE_URL must be set")?;
                let db = database::Database::connect(url, config.database.pool_size).await?;
                db.migrate().await?;
                Arc::new(PgStore::new(&db))
            }
            StorageBackend::Memory => {
                let memory = MemoryStore::new();
                if let (Some(email), Some(password)) =
                    (&config.bootstrap.admin_email, &config.bootstrap.admin_password)
                {
                    let hash = bcrypt::hash(password, bcrypt::DEFAULT_COST)?;
                    memory.add_user(email, hash, "Administrator", true).await?;
                    tracing::info!("Bootstrap admin {} created", email);
                }
                tracing::warn!("Using in-memory storage; data is lost on restart");
                Arc::new(memory)
            }
        };

        let mailer = notifications::mailer_from_config(&config.email, &config.circuit_breaker)?;
        Ok(Self::with_store(config, store, mailer))
    }

    pub fn with_store(config: Config, store: Arc<dyn CinemaStore>, mailer: Arc<dyn Mailer>) -> Arc<Self> {
        let reservations = ReservationService::new(
            store.clone(),
            mailer,
            config.reservation.max_seats_per_reservation,
            config.email.subject_prefix.clone(),
        );
        Arc::new(Self {
            rooms: RoomService::new(store.clone()),
            movies: MovieService::new(store.clone()),
            screenings: ScreeningService::new(store.clone()),
            reservations,
            store,
            config,
        })
    }
}
