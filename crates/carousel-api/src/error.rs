//! Maps `CarouselError` onto the HTTP status code each endpoint should
//! return for that failure.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use carousel_core::CarouselError;
use serde::Serialize;

pub struct ApiError(pub CarouselError);

impl From<CarouselError> for ApiError {
    fn from(err: CarouselError) -> Self {
        Self(err)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            CarouselError::Validation(_) => StatusCode::BAD_REQUEST,
            CarouselError::NotFound(_) => StatusCode::NOT_FOUND,
            CarouselError::Conflict { .. } => StatusCode::CONFLICT,
            CarouselError::UnknownJobType(_) => StatusCode::BAD_REQUEST,
            CarouselError::HandlerFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
            CarouselError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        let body = ErrorBody {
            error: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
