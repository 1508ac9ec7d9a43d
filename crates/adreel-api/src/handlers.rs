//! Request handlers.

use axum::http::HeaderMap;

pub mod health;
pub mod projects;
pub mod renders;

pub use health::*;
pub use projects::*;
pub use renders::*;

/// Idempotency key from the `Idempotency-Key` header, if present.
pub(crate) fn idempotency_key(headers: &HeaderMap) -> Option<String> {
    headers
        .get("Idempotency-Key")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
