//! Background render worker.
//!
//! Consumes submitted render jobs from the in-process queue and drives
//! each one against the external renderer: fixed-interval polling,
//! progress persistence, and cancellation checked on every tick before
//! acting on renderer completion.

pub mod config;
pub mod error;
pub mod runner;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use runner::RenderWorker;
