use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use crate::issuance::IssuanceError;
use crate::ledger::LedgerError;

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error: String,
    message: String,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    code: u16,
    timestamp: String,
}

impl ApiError {
    pub fn new(status: StatusCode, error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            error: error.into(),
            message: message.into(),
        }
    }

    pub fn bad_request(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, error, message)
    }

    pub fn not_found(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, error, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "LedgerUnavailable", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "InternalServerError", message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<IssuanceError> for ApiError {
    fn from(err: IssuanceError) -> Self {
        let message = err.to_string();
        match err {
            IssuanceError::Unauthorized { .. } => {
                Self::new(StatusCode::FORBIDDEN, "Unauthorized", message)
            }
            IssuanceError::LedgerOperationFailed(ref e) if e.is_retryable() => {
                Self::unavailable(message)
            }
            IssuanceError::LedgerOperationFailed(LedgerError::Storage { .. }) => {
                Self::internal(message)
            }
            IssuanceError::LedgerOperationFailed(_) => Self::new(
                StatusCode::UNPROCESSABLE_ENTITY,
                "LedgerOperationFailed",
                message,
            ),
            IssuanceError::UninitializedAccess { .. } => Self::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "UninitializedAccess",
                message,
            ),
        }
    }
}

/// Read-side ledger failures; write-side ones arrive as [`IssuanceError`].
impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        if err.is_retryable() {
            return Self::unavailable(err.to_string());
        }
        match err {
            LedgerError::UnknownUnit { token_id } => Self::not_found(
                "CertificateNotFound",
                format!("No certificate unit with id {}", token_id),
            ),
            LedgerError::InvalidParameter { .. } => {
                Self::bad_request("InvalidParameter", err.to_string())
            }
            other => Self::internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let payload = ErrorResponse {
            error: self.error,
            message: self.message,
            code: self.status.as_u16(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        };

        (self.status, Json(payload)).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
