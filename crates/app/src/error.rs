use axum::Json;
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::{error, warn};
use turfbook_db::{BookingError, ImageError};
use turfbook_models::{CommissionRateError, SlotRuleError};
use turfbook_storage::KeyError;

pub type ApiResult<T> = Result<T, ApiError>;

/// Every handler failure, mapped onto an HTTP status in `into_response`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn not_found(what: &str) -> Self {
        Self::NotFound(format!("{what} not found"))
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::Internal(e) => {
                error!("{e:#}");
                "Internal server error".to_string()
            }
            rejected @ (ApiError::Forbidden(_) | ApiError::Conflict(_)) => {
                warn!("{status}: {rejected}");
                rejected.to_string()
            }
            other => other.to_string(),
        };
        let body = json!({
            "error": status.canonical_reason().unwrap_or("Error"),
            "message": message,
        });
        (status, Json(body)).into_response()
    }
}

impl From<BookingError> for ApiError {
    fn from(err: BookingError) -> Self {
        match err {
            BookingError::TurfNotFound(_) => ApiError::not_found("Turf"),
            BookingError::SlotNotFound(_) => ApiError::not_found("Slot"),
            BookingError::BookingNotFound(_) => ApiError::not_found("Booking"),
            BookingError::Unbookable(e) => ApiError::BadRequest(e.to_string()),
            e @ (BookingError::AlreadyBooked(_) | BookingError::NotCancellable(_)) => {
                ApiError::Conflict(e.to_string())
            }
            BookingError::Database(e) => ApiError::Internal(e.into()),
        }
    }
}

impl From<ImageError> for ApiError {
    fn from(err: ImageError) -> Self {
        match err {
            e @ ImageError::LimitReached { .. } => ApiError::Conflict(e.to_string()),
            ImageError::Database(e) => ApiError::Internal(e.into()),
        }
    }
}

impl From<SlotRuleError> for ApiError {
    fn from(err: SlotRuleError) -> Self {
        match err {
            e @ SlotRuleError::Overlaps { .. } => ApiError::Conflict(e.to_string()),
            e => ApiError::BadRequest(e.to_string()),
        }
    }
}

impl From<CommissionRateError> for ApiError {
    fn from(err: CommissionRateError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<KeyError> for ApiError {
    fn from(err: KeyError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        ApiError::BadRequest(err.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use chrono::NaiveDate;
    use turfbook_models::BookingStatus;

    async fn render(err: ApiError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn conflict_body_carries_message() {
        let date = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        let (status, body) = render(BookingError::AlreadyBooked(date).into()).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "Conflict");
        assert_eq!(body["message"], "this slot is already booked for 2026-10-19");
    }

    #[tokio::test]
    async fn internal_errors_are_not_leaked() {
        let (status, body) = render(anyhow::anyhow!("disk on fire").into()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "Internal server error");
    }

    #[tokio::test]
    async fn booking_errors_map_to_statuses() {
        let (status, _) = render(BookingError::NotCancellable(BookingStatus::Completed).into()).await;
        assert_eq!(status, StatusCode::CONFLICT);
        let (status, _) = render(BookingError::SlotNotFound(3).into()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = render(SlotRuleError::EmptyWindow.into()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, body) = render(ImageError::LimitReached { existing: 4 }.into()).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["message"], "a turf can have at most 5 photos (4 already uploaded)");
    }
}
