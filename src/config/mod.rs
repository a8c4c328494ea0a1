use serde::Deserialize;
use std::env;
use std::str::FromStr;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{key} has an invalid value `{value}`")]
    Invalid { key: &'static str, value: String },
}

// Top-level configuration, one section per concern
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub reservation: ReservationConfig,
    pub email: EmailConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub bootstrap: BootstrapConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
    pub rust_log: String,
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Postgres,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StorageBackend::Postgres),
            "memory" => Ok(StorageBackend::Memory),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub backend: StorageBackend,
    /// Required for the Postgres backend.
    pub url: Option<String>,
    pub pool_size: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReservationConfig {
    pub max_seats_per_reservation: usize,
}

impl Default for ReservationConfig {
    fn default() -> Self {
        Self { max_seats_per_reservation: 6 }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    /// No relay means notifications are only logged.
    pub relay_url: Option<String>,
    pub from: String,
    pub subject_prefix: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub timeout_seconds: u64,
}

// Admin account created on startup by the memory backend
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BootstrapConfig {
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
}

fn var_or(key: &'static str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn optional_var(key: &'static str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T: FromStr>(key: &'static str, default: &str) -> Result<T, ConfigError> {
    let value = var_or(key, default);
    value.parse().map_err(|_| ConfigError::Invalid { key, value })
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let backend: StorageBackend = parse_var("STORAGE_BACKEND", "postgres")?;
        let url = optional_var("DATABASE_URL");
        if backend == StorageBackend::Postgres && url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        let max_seats: usize = parse_var("MAX_SEATS_PER_RESERVATION", "6")?;
        if max_seats == 0 {
            return Err(ConfigError::Invalid { key: "MAX_SEATS_PER_RESERVATION", value: "0".into() });
        }

        Ok(Config {
            app: AppConfig {
                host: var_or("HOST", "0.0.0.0"),
                port: parse_var("PORT", "8000")?,
                environment: var_or("ENVIRONMENT", "development"),
                rust_log: var_or("RUST_LOG", "cinema_booking=debug,tower_http=debug"),
                log_format: parse_var("LOG_FORMAT", "text")?,
            },
            database: DatabaseConfig {
                backend,
                url,
                pool_size: parse_var("DB_POOL_SIZE", "20")?,
            },
            reservation: ReservationConfig { max_seats_per_reservation: max_seats },
            email: EmailConfig {
                relay_url: optional_var("MAIL_RELAY_URL"),
                from: var_or("MAIL_FROM", "noreply@cinema.local"),
                subject_prefix: var_or("MAIL_SUBJECT_PREFIX", "[Cinema]"),
            },
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold: parse_var("CIRCUIT_BREAKER_FAILURE_THRESHOLD", "5")?,
                timeout_seconds: parse_var("CIRCUIT_BREAKER_TIMEOUT_SECONDS", "60")?,
            },
            bootstrap: BootstrapConfig {
                admin_email: optional_var("BOOTSTRAP_ADMIN_EMAIL"),
                admin_password: optional_var("BOOTSTRAP_ADMIN_PASSWORD"),
            },
        })
    }

    /// In-memory configuration with defaults, for tests and local tooling.
    pub fn in_memory() -> Self {
        Config {
            app: AppConfig {
                host: "127.0.0.1".into(),
                port: 0,
                environment: "test".into(),
                rust_log: "cinema_booking=debug".into(),
                log_format: LogFormat::Text,
            },
            database: DatabaseConfig { backend: StorageBackend::Memory, url: None, pool_size: 1 },
            reservation: ReservationConfig::default(),
            email: EmailConfig {
                relay_url: None,
                from: "noreply@cinema.local".into(),
                subject_prefix: "[Cinema]".into(),
            },
            circuit_breaker: CircuitBreakerConfig { failure_threshold: 5, timeout_seconds: 60 },
            bootstrap: BootstrapConfig::default(),
        }
    }
}
