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
use crate::middleware::AdminUser;
use crate::services::RoomRequest;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/rooms", get(list_rooms).post(create_room))
        .route("/rooms/{id}", get(get_room).put(update_room).delete(delete_room))
}

// GET /api/rooms
async fn list_rooms(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, BookingError> {
    Ok(Json(state.rooms.list().await?))
}

// GET /api/rooms/{id}
async fn get_room(State(state): State<Arc<AppState>>, ApiPath(id): ApiPath<i64>) -> Result<impl IntoResponse, BookingError> {
    Ok(Json(state.rooms.get(id).await?))
}

// POST /api/rooms
async fn create_room(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    ApiJson(req): ApiJson<RoomRequest>,
) -> Result<impl IntoResponse, BookingError> {
    let room = state.rooms.create(req).await?;
    Ok((StatusCode::CREATED, Json(room)))
}

// PUT /api/rooms/{id}
async fn update_room(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    ApiPath(id): ApiPath<i64>,
    ApiJson(req): ApiJson<RoomRequest>,
) -> Result<impl IntoResponse, BookingError> {
    Ok(Json(state.rooms.update(id, req).await?))
}

// DELETE /api/rooms/{id}
async fn delete_room(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    ApiPath(id): ApiPath<i64>,
) -> Result<impl IntoResponse, BookingError> {
    state.rooms.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
