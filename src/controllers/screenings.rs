use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde::Deserialize;
use std::sync::Arc;

use super::{ApiJson, ApiPath, ApiQuery};
use crate::error::BookingError;
use crate::middleware::{AdminUser, AuthUser};
use crate::models::{ScreeningFilter, SeatPosition};
use crate::services::ScreeningRequest;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/screenings", get(list_screenings).post(create_screening))
        .route("/screenings/on/{date}", get(list_screenings_on))
        .route("/screenings/{id}", get(get_screening).put(update_screening).delete(delete_screening))
        .route("/screenings/{id}/seats", get(get_seats))
        .route("/screenings/{id}/seats/sell", post(sell_seat))
}

// GET /api/screenings?movie_id=&room_id=&starts_after=&starts_before=
async fn list_screenings(
    State(state): State<Arc<AppState>>,
    ApiQuery(filter): ApiQuery<ScreeningFilter>,
) -> Result<impl IntoResponse, BookingError> {
    Ok(Json(state.screenings.list_screenings(&filter).await?))
}

// GET /api/screenings/on/{YYYY-MM-DD}
async fn list_screenings_on(
    State(state): State<Arc<AppState>>,
    ApiPath(date): ApiPath<NaiveDate>,
) -> Result<impl IntoResponse, BookingError> {
    Ok(Json(state.screenings.list_for_date(date).await?))
}

// GET /api/screenings/{id}
async fn get_screening(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<i64>,
) -> Result<impl IntoResponse, BookingError> {
    Ok(Json(state.screenings.get_screening(id).await?))
}

// GET /api/screenings/{id}/seats
async fn get_seats(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<i64>,
) -> Result<impl IntoResponse, BookingError> {
    Ok(Json(state.screenings.get_seats_by_screening(id).await?))
}

// POST /api/screenings
async fn create_screening(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    ApiJson(req): ApiJson<ScreeningRequest>,
) -> Result<impl IntoResponse, BookingError> {
    let screening = state.screenings.create_screening(req).await?;
    Ok((StatusCode::CREATED, Json(screening)))
}

// PUT /api/screenings/{id}
async fn update_screening(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    ApiPath(id): ApiPath<i64>,
    ApiJson(req): ApiJson<ScreeningRequest>,
) -> Result<impl IntoResponse, BookingError> {
    Ok(Json(state.screenings.update_screening(id, req).await?))
}

// DELETE /api/screenings/{id}
async fn delete_screening(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    ApiPath(id): ApiPath<i64>,
) -> Result<impl IntoResponse, BookingError> {
    state.screenings.delete_screening(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct SellSeatRequest {
    row: i32,
    column: i32,
}

// POST /api/screenings/{id}/seats/sell
async fn sell_seat(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    ApiPath(id): ApiPath<i64>,
    ApiJson(req): ApiJson<SellSeatRequest>,
) -> Result<impl IntoResponse, BookingError> {
    let seat = state.screenings.sell_seat(id, SeatPosition::new(req.row, req.column)).await?;
    Ok((StatusCode::CREATED, Json(seat)))
}
