use axum::{Json, http::StatusCode, response::IntoResponse};
use serde_json::json;
use thiserror::Error;

use super::models::ErrorResponse;
use crate::resolver::{FailureStage, ReferenceError, ResolveError};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid video reference: {0}")]
    InvalidReference(String),
    #[error("signing keys unavailable: {0}")]
    KeysUnavailable(String),
    #[error("{0}")]
    ResolutionFailed(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidReference(_) => StatusCode::BAD_REQUEST,
            ApiError::KeysUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::ResolutionFailed(_) => StatusCode::BAD_GATEWAY,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidReference(_) => "INVALID_REFERENCE",
            ApiError::KeysUnavailable(_) => "KEY_FETCH_FAILED",
            ApiError::ResolutionFailed(_) => "RESOLUTION_FAILED",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let body = ErrorResponse {
            code: self.code(),
            message: self.to_string(),
        };

        (status, Json(json!(body))).into_response()
    }
}

impl From<ReferenceError> for ApiError {
    fn from(value: ReferenceError) -> Self {
        ApiError::InvalidReference(value.to_string())
    }
}

impl From<ResolveError> for ApiError {
    fn from(value: ResolveError) -> Self {
        match value {
            ResolveError::KeyFetchFailed(e) => ApiError::KeysUnavailable(e.to_string()),
            ResolveError::ResolutionFailed {
                stage: FailureStage::Reference,
                reason,
            } => ApiError::InvalidReference(reason),
            other => ApiError::ResolutionFailed(other.to_string()),
        }
    }
}
