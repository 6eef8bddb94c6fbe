//! Error handling

use std::fmt;

use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;
use tracing::{error, info};

use crate::imaging::ImageError;
use crate::model::ModelError;

/// Request-level failures for the boardsmith service.
#[derive(Debug)]
pub enum AppError {
    /// Missing or malformed input
    BadRequest(String),
    /// The upload is not an image
    UnsupportedMediaType(String),
    /// The upload is over the body limit
    PayloadTooLarge(String),
    /// The upload claimed to be an image but could not be read
    ImageProcessing(String),
    /// The model call failed
    Model(ModelError),
    /// When an internal server error occurs
    InternalServerError(String),
}

impl AppError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::ImageProcessing(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Model(ModelError::Timeout) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Model(_) => StatusCode::BAD_GATEWAY,
            AppError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Logs the error at a level matching who is at fault.
    pub(crate) fn log(&self, session_id: &str) {
        if self.status().is_client_error() {
            info!("[{}] Rejected upload: {}", session_id, self);
        } else {
            error!("[{}] Build failed: {}", session_id, self);
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::BadRequest(message)
            | AppError::UnsupportedMediaType(message)
            | AppError::PayloadTooLarge(message)
            | AppError::InternalServerError(message) => write!(f, "{message}"),
            AppError::ImageProcessing(message) => write!(f, "Image processing failed: {message}"),
            AppError::Model(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalServerError(err.to_string())
    }
}

impl From<ModelError> for AppError {
    fn from(err: ModelError) -> Self {
        AppError::Model(err)
    }
}

impl From<ImageError> for AppError {
    fn from(err: ImageError) -> Self {
        match err {
            ImageError::Decode(message) => AppError::ImageProcessing(message),
            ImageError::Encode(message) => AppError::InternalServerError(message),
        }
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::InternalServerError(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let body = json!({"success": false, "error": self.to_string()});
        (self.status(), Json(body)).into_response()
    }
}

/// An [`AppError`] tagged with the session it ended.
#[derive(Debug)]
pub struct SessionFailure {
    /// Per-request id.
    pub session_id: String,
    /// What went wrong.
    pub error: AppError,
}

impl SessionFailure {
    /// Tags `error` with `session_id` and logs it.
    pub fn new(session_id: &str, error: AppError) -> Self {
        error.log(session_id);
        Self {
            session_id: session_id.to_string(),
            error,
        }
    }
}

impl IntoResponse for SessionFailure {
    fn into_response(self) -> axum::response::Response {
        let body = json!({
            "success": false,
            "sessionId": self.session_id,
            "error": self.error.to_string(),
        });
        (self.error.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_the_taxonomy() {
        assert_eq!(
            AppError::BadRequest("no file".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::from(ImageError::Decode("bad".into())).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            AppError::from(ModelError::Timeout).status(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            AppError::from(ModelError::EmptyResponse).status(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn provider_message_is_surfaced() {
        let err = AppError::from(ModelError::Api {
            status: 429,
            message: "Number of request tokens has exceeded your rate limit".into(),
        });
        assert!(err.to_string().contains("rate limit"));
    }
}
