pub mod movies;
pub mod reservations;
pub mod rooms;
pub mod screenings;

use axum::{
    extract::{FromRequest, FromRequestParts},
    Router,
};
use std::sync::Arc;

use crate::error::BookingError;

/// `axum::Json` that rejects with a JSON error body.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(BookingError))]
pub struct ApiJson<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(BookingError))]
pub struct ApiPath<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(BookingError))]
pub struct ApiQuery<T>(pub T);

pub fn routes() -> Router<Arc<crate::AppState>> {
    Router::new()
        .merge(rooms::routes())
        .merge(movies::routes())
        .merge(screenings::routes())
        .merge(reservations::routes())
}
