use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use std::sync::Arc;

use super::{ApiJson, ApiPath};
use crate::error::BookingError;
use crate::middleware::AuthUser;
use crate::services::ReservationRequest;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/reservations", get(list_reservations).post(create_reservation))
        .route("/reservations/{id}", get(get_reservation).delete(cancel_reservation))
}

// GET /api/reservations
async fn list_reservations(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<impl IntoResponse, BookingError> {
    Ok(Json(state.reservations.get_all(&user).await?))
}

// GET /api/reservations/{id}
async fn get_reservation(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ApiPath(id): ApiPath<i64>,
) -> Result<impl IntoResponse, BookingError> {
    Ok(Json(state.reservations.get_by_id(&user, id).await?))
}

// POST /api/reservations
async fn create_reservation(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ApiJson(req): ApiJson<ReservationRequest>,
) -> Result<impl IntoResponse, BookingError> {
    let created = state.reservations.create(&user, req).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

// DELETE /api/reservations/{id}
async fn cancel_reservation(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ApiPath(id): ApiPath<i64>,
) -> Result<impl IntoResponse, BookingError> {
    state.reservations.cancel(&user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
