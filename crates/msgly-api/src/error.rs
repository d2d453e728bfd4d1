use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use msgly_types::api::ErrorResponse;

/// Failures a request can end in. All are reported to the caller; none is
/// fatal to the process.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ApiError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("username already taken")]
    Conflict,

    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden")]
    Forbidden,

    #[error("store unavailable")]
    StoreUnavailable,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("internal server error")]
    Internal,
}

impl ApiError {
    /// Only a store outage is worth retrying; every other failure will
    /// repeat for the same input.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ApiError::StoreUnavailable)
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict => StatusCode::CONFLICT,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Store errors are logged here and never leak to the caller.
impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        error!("Store error: {:#}", e);
        ApiError::StoreUnavailable
    }
}

/// Malformed or incomplete JSON bodies.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            error: self.to_string(),
        });
        (self.status(), body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_store_outage_is_retryable() {
        assert!(ApiError::StoreUnavailable.is_retryable());
        assert!(!ApiError::Forbidden.is_retryable());
        assert!(!ApiError::NotFound("message").is_retryable());
    }

    #[test]
    fn store_errors_are_opaque() {
        let err: ApiError = anyhow::anyhow!("disk I/O error at /var/lib/msgly").into();
        assert_eq!(err, ApiError::StoreUnavailable);
        assert_eq!(err.to_string(), "store unavailable");
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
