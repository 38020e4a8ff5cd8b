//! Error types for bimdash-ui
//!
//! Every failure is answered with `{"error": {"code", "message"}}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use bimdash_common::Error as CommonError;
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use crate::ai::AiError;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// AI collaborator failed (502)
    #[error("AI service error: {0}")]
    Ai(#[from] AiError),

    /// bimdash-common error, status by kind
    #[error(transparent)]
    Common(#[from] CommonError),
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Ai(_) => (StatusCode::BAD_GATEWAY, "AI_UNAVAILABLE"),
            ApiError::Common(err) => match err {
                CommonError::Database(_) | CommonError::Io(_) => {
                    (StatusCode::SERVICE_UNAVAILABLE, "STORE_UNAVAILABLE")
                }
                CommonError::MalformedUpload(_) => (StatusCode::BAD_REQUEST, "MALFORMED_UPLOAD"),
                CommonError::DataShape(_) => (StatusCode::CONFLICT, "DATA_INCONSISTENCY"),
                CommonError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                CommonError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "INVALID_INPUT"),
                CommonError::Conflict(_) => (StatusCode::CONFLICT, "DUPLICATE"),
                CommonError::StaleRecordId { .. } => (StatusCode::CONFLICT, "STALE_RECORD_ID"),
                CommonError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR"),
                CommonError::Serialization(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "SERIALIZATION_ERROR")
                }
                CommonError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = self.parts();
        let message = self.to_string();

        if status.is_server_error() {
            error!(code = error_code, "{}", message);
        } else {
            warn!(code = error_code, "{}", message);
        }

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
