//! Outbound booking notifications.
//!
//! Mail is handed to a relay over HTTP behind a circuit breaker. Delivery
//! never feeds back into the booking: [`dispatch`] spawns the send and only
//! logs the outcome.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::config::{CircuitBreakerConfig, EmailConfig};
use crate::models::{ScreeningDetail, Seat};

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("mail relay temporarily unavailable (circuit open)")]
    CircuitOpen,
    #[error("mail relay request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("mail relay answered {0}")]
    Rejected(u16),
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_email(&self, to: &str, subject: &str, html_body: &str) -> Result<(), MailError>;
}

/// Sends the message off without awaiting it. Failures are logged and dropped.
pub fn dispatch(mailer: Arc<dyn Mailer>, to: String, subject: String, html_body: String) -> JoinHandle<()> {
    tokio::spawn(async move {
        match mailer.send_email(&to, &subject, &html_body).await {
            Ok(()) => debug!("notification to {} sent", to),
            Err(e) => warn!("notification to {} failed: {}", to, e),
        }
    })
}

/* ---------- circuit breaker ---------- */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Requests flow normally.
    Closed,
    /// Too many consecutive failures; requests are refused until the timeout passes.
    Open,
    /// Timeout passed; the next request is a probe.
    HalfOpen,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    state: RwLock<(CircuitState, Option<Instant>)>,
    failure_count: AtomicU32,
    failure_threshold: u32,
    timeout: Duration,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, timeout: Duration) -> Self {
        Self {
            state: RwLock::new((CircuitState::Closed, None)),
            failure_count: AtomicU32::new(0),
            failure_threshold: failure_threshold.max(1),
            timeout,
        }
    }

    pub fn from_config(config: &CircuitBreakerConfig) -> Self {
        Self::new(config.failure_threshold, Duration::from_secs(config.timeout_seconds))
    }

    pub fn can_execute(&self) -> bool {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        let (current, opened_at) = *state;
        match current {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let expired = opened_at.is_none_or(|t| t.elapsed() >= self.timeout);
                if expired {
                    *state = (CircuitState::HalfOpen, opened_at);
                    info!("mail relay circuit half-open, probing");
                }
                expired
            }
        }
    }

    pub fn record_success(&self) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if state.0 == CircuitState::HalfOpen {
            info!("mail relay recovered, circuit closed");
        }
        *state = (CircuitState::Closed, None);
        self.failure_count.store(0, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        let failures = self.failure_count.fetch_add(1, Ordering::Relaxed) + 1;
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        match state.0 {
            CircuitState::Closed if failures >= self.failure_threshold => {
                *state = (CircuitState::Open, Some(Instant::now()));
                error!("mail relay circuit OPEN after {} failures", failures);
            }
            CircuitState::HalfOpen => {
                *state = (CircuitState::Open, Some(Instant::now()));
                warn!("mail relay probe failed, circuit open again");
            }
            _ => {}
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state.read().unwrap_or_else(|e| e.into_inner()).0
    }
}

/* ---------- mailers ---------- */

#[derive(Debug, Serialize)]
struct RelayMessage<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html: &'a str,
}

/// Posts messages as JSON to an HTTP mail relay.
pub struct RelayMailer {
    http_client: reqwest::Client,
    relay_url: String,
    from: String,
    circuit_breaker: CircuitBreaker,
}

impl RelayMailer {
    pub fn new(relay_url: String, from: String, circuit_breaker: CircuitBreaker) -> Result<Self, MailError> {
        let http_client = reqwest::Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self { http_client, relay_url, from, circuit_breaker })
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.circuit_breaker.state()
    }

    async fn post(&self, message: &RelayMessage<'_>) -> Result<(), MailError> {
        let response = self.http_client.post(&self.relay_url).json(message).send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(MailError::Rejected(status.as_u16()))
        }
    }
}

#[async_trait]
impl Mailer for RelayMailer {
    async fn send_email(&self, to: &str, subject: &str, html_body: &str) -> Result<(), MailError> {
        if !self.circuit_breaker.can_execute() {
            return Err(MailError::CircuitOpen);
        }
        let message = RelayMessage { from: &self.from, to, subject, html: html_body };
        match self.post(&message).await {
            Ok(()) => {
                self.circuit_breaker.record_success();
                Ok(())
            }
            Err(e) => {
                self.circuit_breaker.record_failure();
                Err(e)
            }
        }
    }
}

/// Writes messages to the log. Used when no relay is configured.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_email(&self, to: &str, subject: &str, html_body: &str) -> Result<(), MailError> {
        info!(to, subject, bytes = html_body.len(), "mail (log only)");
        Ok(())
    }
}

/// Picks the relay mailer when a relay URL is configured, the log mailer otherwise.
pub fn mailer_from_config(email: &EmailConfig, breaker: &CircuitBreakerConfig) -> Result<Arc<dyn Mailer>, MailError> {
    match &email.relay_url {
        Some(url) => Ok(Arc::new(RelayMailer::new(
            url.clone(),
            email.from.clone(),
            CircuitBreaker::from_config(breaker),
        )?)),
        None => Ok(Arc::new(LogMailer)),
    }
}

/* ---------- message bodies ---------- */

pub fn reservation_subject(prefix: &str) -> String {
    format!("{} New reservation", prefix)
}

pub fn reservation_email_body(screening: &ScreeningDetail, seats: &[Seat]) -> String {
    let seat_list = seats
        .iter()
        .map(|s| format!("(Row {}, Col {})", s.position.row, s.position.column))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        r#"<p>
    <b>Your reservation has been created successfully!</b>
</p>
<table>
    <tr><td><b>Movie:</b></td><td>{}</td></tr>
    <tr><td><b>Time:</b></td><td>{}</td></tr>
    <tr><td><b>Room:</b></td><td>{}</td></tr>
    <tr><td><b>Seats:</b></td><td>{}</td></tr>
</table>"#,
        escape_html(&screening.movie.title),
        screening.screening.starts_at.format("%Y-%m-%d %H:%M UTC"),
        escape_html(&screening.room.name),
        seat_list,
    )
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;").replace('"', "&quot;")
}
