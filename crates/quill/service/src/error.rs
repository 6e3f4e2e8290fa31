//! Error types for quilld

use crate::render::RenderError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use quill_review::{ErrorKind, ReviewError};
use serde::Serialize;
use thiserror::Error;

/// Service-level errors
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(#[from] quill_storage::StorageError),

    #[error("Server error: {0}")]
    Server(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// API-specific errors
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Review(#[from] ReviewError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Image rendering unavailable")]
    RenderUnavailable,

    #[error("Image rendering failed: {0}")]
    Render(String),
}

impl From<RenderError> for ApiError {
    fn from(err: RenderError) -> Self {
        match err {
            RenderError::NotConfigured => ApiError::RenderUnavailable,
            other => ApiError::Render(other.to_string()),
        }
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Review(err) => match err.kind() {
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::Forbidden => StatusCode::FORBIDDEN,
                ErrorKind::InvalidRequest | ErrorKind::InvalidState => StatusCode::BAD_REQUEST,
                ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::RenderUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Render(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::Review(err) => err.public_message(),
            other => other.to_string(),
        };
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

/// Result type alias for API operations
pub type ApiResult<T> = Result<T, ApiError>;

/// Result type alias for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;
    use quill_review::{ForbiddenReason, RequestReason, Subject};
    use quill_storage::ProposalStatus;

    #[test]
    fn review_failures_map_to_http_statuses() {
        let cases = [
            (
                ReviewError::NotFound(Subject::Proposal, "p".into()),
                StatusCode::NOT_FOUND,
            ),
            (
                ReviewError::Forbidden(ForbiddenReason::NotOwner),
                StatusCode::FORBIDDEN,
            ),
            (
                ReviewError::InvalidRequest(RequestReason::DuplicatePending),
                StatusCode::BAD_REQUEST,
            ),
            (
                ReviewError::InvalidState {
                    current: ProposalStatus::Rejected,
                },
                StatusCode::BAD_REQUEST,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).into_response().status(), status);
        }
    }

    #[test]
    fn missing_renderer_is_unavailable() {
        assert_eq!(
            ApiError::from(RenderError::NotConfigured)
                .into_response()
                .status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
