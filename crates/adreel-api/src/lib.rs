//! Axum HTTP API server.
//!
//! This crate provides:
//! - REST surface over the domain engine (plumbing only, no domain logic)
//! - Bearer-token session verification
//! - Security headers, request ids, CORS, body limits
//! - Prometheus metrics

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
