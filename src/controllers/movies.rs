use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;

use super::{ApiJson, ApiPath, ApiQuery};
use crate::error::BookingError;
use crate::middleware::AdminUser;
use crate::services::MovieRequest;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/movies", get(list_movies).post(create_movie))
        .route("/movies/{id}", get(get_movie).put(update_movie).delete(delete_movie))
}

#[derive(Debug, Deserialize)]
struct LatestQuery {
    count: Option<i64>,
}

// GET /api/movies?count=N
async fn list_movies(
    State(state): State<Arc<AppState>>,
    ApiQuery(q): ApiQuery<LatestQuery>,
) -> Result<impl IntoResponse, BookingError> {
    Ok(Json(state.movies.list_latest(q.count).await?))
}

// GET /api/movies/{id}
async fn get_movie(State(state): State<Arc<AppState>>, ApiPath(id): ApiPath<i64>) -> Result<impl IntoResponse, BookingError> {
    Ok(Json(state.movies.get(id).await?))
}

// POST /api/movies
async fn create_movie(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    ApiJson(req): ApiJson<MovieRequest>,
) -> Result<impl IntoResponse, BookingError> {
    let movie = state.movies.create(req).await?;
    Ok((StatusCode::CREATED, Json(movie)))
}

// PUT /api/movies/{id}
async fn update_movie(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    ApiPath(id): ApiPath<i64>,
    ApiJson(req): ApiJson<MovieRequest>,
) -> Result<impl IntoResponse, BookingError> {
    Ok(Json(state.movies.update(id, req).await?))
}

// DELETE /api/movies/{id}
async fn delete_movie(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    ApiPath(id): ApiPath<i64>,
) -> Result<impl IntoResponse, BookingError> {
    state.movies.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
