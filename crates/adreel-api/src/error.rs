//! API error types.
//!
//! Every error response carries `{detail, code, correlation_id}`. The
//! correlation id is minted per response and logged, so a user-reported
//! failure can be matched against server logs.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};
use uuid::Uuid;

use adreel_engine::EngineError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Rate limited")]
    RateLimited { retry_after_secs: u64 },

    #[error("Upstream service error: {0}")]
    BadGateway(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Storage error: {0}")]
    Storage(#[from] adreel_storage::StorageError),
}

impl ApiError {
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) | ApiError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::Unauthorized(_) => "unauthorized",
            ApiError::Forbidden(_) => "forbidden",
            ApiError::NotFound(_) => "not_found",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Conflict(_) => "conflict",
            ApiError::RateLimited { .. } => "rate_limited",
            ApiError::BadGateway(_) => "upstream_error",
            ApiError::Internal(_) | ApiError::Storage(_) => "internal_error",
        }
    }

    /// Detail string shown to clients. Server-side failure detail is
    /// hidden in production.
    fn public_detail(&self, production: bool) -> String {
        match self {
            ApiError::Internal(_) | ApiError::Storage(_) | ApiError::BadGateway(_)
                if production =>
            {
                "An internal error occurred".to_string()
            }
            _ => self.to_string(),
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::Validation(e) => ApiError::BadRequest(e.to_string()),
            EngineError::NotFound(msg) => ApiError::NotFound(msg),
            EngineError::Forbidden(msg) => ApiError::Forbidden(msg),
            EngineError::Conflict(msg) => ApiError::Conflict(msg),
            EngineError::RateLimited { retry_after } => ApiError::RateLimited {
                retry_after_secs: retry_after.as_secs().max(1),
            },
            EngineError::External(e) => ApiError::BadGateway(e.to_string()),
            EngineError::Internal(msg) => ApiError::Internal(msg),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
    code: String,
    correlation_id: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let correlation_id = Uuid::new_v4().to_string();
        let production = std::env::var("ENVIRONMENT")
            .map(|v| v.to_lowercase() == "production")
            .unwrap_or(false);

        if status.is_server_error() {
            error!(correlation_id = %correlation_id, error = %self, "Request failed");
        } else {
            warn!(correlation_id = %correlation_id, error = %self, "Request rejected");
        }

        let body = ErrorResponse {
            detail: self.public_detail(production),
            code: self.code().to_string(),
            correlation_id,
        };

        match self {
            ApiError::RateLimited { retry_after_secs } => (
                status,
                [("Retry-After", retry_after_secs.to_string())],
                Json(body),
            )
                .into_response(),
            _ => (status, Json(body)).into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use adreel_engine::ExternalError;

    #[test]
    fn test_engine_error_mapping() {
        let cases = [
            (
                ApiError::from(EngineError::not_found("project p-1")),
                StatusCode::NOT_FOUND,
            ),
            (
                ApiError::from(EngineError::forbidden("not yours")),
                StatusCode::FORBIDDEN,
            ),
            (
                ApiError::from(EngineError::conflict("stale revision")),
                StatusCode::CONFLICT,
            ),
            (
                ApiError::from(EngineError::RateLimited {
                    retry_after: Duration::from_secs(12),
                }),
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (
                ApiError::from(EngineError::External(ExternalError::fatal(
                    "generator",
                    "boom",
                ))),
                StatusCode::BAD_GATEWAY,
            ),
            (
                ApiError::from(EngineError::internal("oops")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(err.status_code(), expected, "{:?}", err);
        }
    }

    #[test]
    fn test_rate_limited_keeps_retry_after() {
        let err = ApiError::from(EngineError::RateLimited {
            retry_after: Duration::from_millis(200),
        });
        match err {
            ApiError::RateLimited { retry_after_secs } => assert_eq!(retry_after_secs, 1),
            other => panic!("expected RateLimited, got {:?}", other),
        }
    }

    #[test]
    fn test_production_hides_server_detail() {
        let err = ApiError::internal("connection pool exhausted");
        assert_eq!(err.public_detail(true), "An internal error occurred");
        assert!(err.public_detail(false).contains("connection pool exhausted"));

        // Client errors keep their detail either way.
        let err = ApiError::bad_request("scene_id must match path");
        assert!(err.public_detail(true).contains("scene_id"));
    }
}
