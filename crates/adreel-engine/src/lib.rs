//! Core domain engine for the Adreel backend.
//!
//! This crate owns the behavior the rest of the system is built around:
//! - the checkpoint engine (immutable, branchable project history),
//! - the message timeline,
//! - the render job state machine (submission, cancellation, progress),
//! - the idempotency ledger,
//! - per-user-per-operation rate limiting,
//! - the collaborator traits for the content generator and renderer,
//!   with bounded retry around every external call.

pub mod checkpoints;
pub mod error;
pub mod generator;
pub mod idempotency;
pub mod queue;
pub mod ratelimit;
pub mod render;
pub mod renderer;
pub mod retry;
pub mod security;
pub mod service;
pub mod testing;
pub mod timeline;

pub use checkpoints::{CheckpointEngine, NewCheckpoint, RestoreOutcome};
pub use error::{EngineError, EngineResult, ExternalError};
pub use generator::{ContentGenerator, GenerateRequest, GeneratedContent};
pub use idempotency::{IdempotencyLedger, ResolvedResult};
pub use queue::{render_queue, RenderQueue, RenderQueueConsumer};
pub use ratelimit::{NoopGate, RateGate, RateLimitConfig, SlidingWindowLimiter};
pub use render::{RenderProgress, RenderService};
pub use renderer::{RenderHandle, RenderPoll, Renderer};
pub use retry::{with_retry, RetryConfig};
pub use service::{AdEngine, GenerateFromUrl};
pub use testing::{FakeGenerator, FakeRenderer};
pub use timeline::Timeline;
