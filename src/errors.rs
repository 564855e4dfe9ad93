use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};
use uuid::Uuid;

use crate::{
    auth::AuthError,
    geo::CoordinateError,
    status::{InvalidStatus, OrderStatus},
    store::StoreError,
};

/// Every failure a request can end in, with its HTTP mapping.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("restaurantId and userLocation with latitude and longitude are required")]
    MissingLocation,

    #[error("invalid coordinate: {0}")]
    InvalidCoordinate(#[from] CoordinateError),

    #[error("{0}")]
    InvalidStatus(#[from] InvalidStatus),

    #[error("cannot change status from {from} to {to}: {from} is final")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("invalid period `{0}`: expected today, week or month")]
    InvalidPeriod(String),

    #[error("unauthorized: {0}")]
    Unauthorized(AuthError),

    #[error("access denied: you do not own this restaurant")]
    AccessDenied,

    #[error("order not found")]
    OrderNotFound(Uuid),

    #[error("order has no associated restaurant")]
    NoAssociatedRestaurant,

    #[error("restaurant not found")]
    RestaurantNotFound,

    #[error("order was modified concurrently; re-read it and retry")]
    Conflict(Uuid),

    #[error("storage failure: {0}")]
    Store(StoreError),
}

/// Internal detail of a 500, stashed in the response extensions so the
/// router can choose to expose it.
#[derive(Debug, Clone)]
pub struct ErrorDetail(pub String);

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::VersionConflict { id, .. } => AppError::Conflict(id),
            StoreError::Missing(id) => AppError::OrderNotFound(id),
            StoreError::BadCursor => AppError::Validation("invalid cursor".into()),
            other => AppError::Store(other),
        }
    }
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_)
            | AppError::MissingLocation
            | AppError::InvalidCoordinate(_)
            | AppError::InvalidStatus(_)
            | AppError::InvalidTransition { .. }
            | AppError::InvalidPeriod(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::AccessDenied => StatusCode::FORBIDDEN,
            AppError::OrderNotFound(_) | AppError::NoAssociatedRestaurant | AppError::RestaurantNotFound => {
                StatusCode::NOT_FOUND
            }
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("request failed: {self}");
            let mut res = (status, Json(json!({ "error": "internal server error" }))).into_response();
            res.extensions_mut().insert(ErrorDetail(self.to_string()));
            return res;
        }
        if matches!(status, StatusCode::FORBIDDEN | StatusCode::CONFLICT) {
            warn!("request rejected: {self}");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
