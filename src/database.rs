use sqlx::{postgres::PgPoolOptions, Pool, Postgres};
use std::time::Duration;
use tracing::info;

#[derive(Clone)]
pub struct Database {
    pub pool: Pool<Postgres>,
}

impl Database {
    pub async fn connect(database_url: &str, pool_size: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(pool_size)
            .acquire_timeout(Duration::from_secs(5))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await?;
        info!("Connected to Postgres (pool size {})", pool_size);
        Ok(Database { pool })
    }

    /// Applies the embedded schema migrations for rooms, movies, screenings,
    /// reservations and seats.
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Applying cinema schema migrations...");
        sqlx::migrate!("./src/migrations").run(&self.pool).await?;
        info!("Cinema schema up to date");
        Ok(())
    }
}
