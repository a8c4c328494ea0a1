use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::models::SeatPosition;
use crate::store::StoreError;

/// Why a request was rejected before touching the schedule or the seat map.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationReason {
    #[error("At least 1 seat must be selected.")]
    EmptySelection,
    #[error("Positions contains more items than {max}.")]
    TooManySeats { max: usize },
    #[error("Duplicate positions are not allowed: {0}.")]
    DuplicatePosition(SeatPosition),
    #[error("Invalid position: {0}.")]
    OutOfRange(SeatPosition),
    #[error("All seats must belong to the same screening.")]
    ScreeningMismatch,
    #[error("Movie length cannot be increased while it has screenings.")]
    MovieLengthIncreaseBlocked,
    #[error("Cannot cancel reservation for a past screening date.")]
    CancelAfterStart,
    #[error("{0}")]
    InvalidInput(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConflictReason {
    #[error("Position: {0} is already reserved or sold.")]
    AlreadyOccupied(SeatPosition),
    #[error("{entity} with the same name already exists")]
    DuplicateName { entity: &'static str },
    #[error("Screening has reserved or sold seats and cannot be deleted.")]
    ScreeningHasSeats,
}

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error(transparent)]
    Validation(#[from] ValidationReason),
    #[error(transparent)]
    Conflict(#[from] ConflictReason),
    #[error("Screening overlaps with {0} other screening(s) in the same room")]
    OverlapConflict(usize),
    #[error("Reservation is not accessible")]
    AccessDenied,
    #[error("{context}")]
    SaveFailed {
        context: &'static str,
        #[source]
        source: StoreError,
    },
}

impl BookingError {
    /// Maps a store failure, unwrapping guard rejections back into the
    /// error the guard produced.
    pub fn from_store(context: &'static str) -> impl FnOnce(StoreError) -> Self {
        move |source| match source {
            StoreError::Rejected(inner) => *inner,
            source => BookingError::SaveFailed { context, source },
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            BookingError::NotFound(_) => StatusCode::NOT_FOUND,
            BookingError::Validation(_) => StatusCode::BAD_REQUEST,
            BookingError::Conflict(_) | BookingError::OverlapConflict(_) => StatusCode::CONFLICT,
            BookingError::AccessDenied => StatusCode::FORBIDDEN,
            BookingError::SaveFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<validator::ValidationErrors> for BookingError {
    fn from(errors: validator::ValidationErrors) -> Self {
        BookingError::Validation(ValidationReason::InvalidInput(errors.to_string()))
    }
}

// Malformed bodies, paths and query strings are reported like any other invalid input.
impl From<JsonRejection> for BookingError {
    fn from(rejection: JsonRejection) -> Self {
        BookingError::Validation(ValidationReason::InvalidInput(rejection.body_text()))
    }
}

impl From<PathRejection> for BookingError {
    fn from(rejection: PathRejection) -> Self {
        BookingError::Validation(ValidationReason::InvalidInput(rejection.body_text()))
    }
}

impl From<QueryRejection> for BookingError {
    fn from(rejection: QueryRejection) -> Self {
        BookingError::Validation(ValidationReason::InvalidInput(rejection.body_text()))
    }
}

impl IntoResponse for BookingError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if let BookingError::SaveFailed { source, .. } = &self {
            tracing::error!("storage failure: {:?}", source);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub type BookingResult<T> = Result<T, BookingError>;
