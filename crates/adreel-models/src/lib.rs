//! Shared data models for the Adreel backend.
//!
//! This crate provides Serde-serializable types for:
//! - Projects, checkpoints and the message timeline
//! - Storyboards, scripts and brand kits
//! - Render jobs and their state machine
//! - Idempotency records
//! - Field-level validation errors

pub mod brand;
pub mod checkpoint;
pub mod id;
pub mod idempotency;
pub mod message;
pub mod project;
pub mod render;
pub mod script;
pub mod storyboard;
pub mod validation;

// Re-export common types
pub use brand::BrandKit;
pub use checkpoint::{Checkpoint, CheckpointReason};
pub use id::{CheckpointId, MessageId, ProjectId, RenderJobId};
pub use idempotency::{IdempotencyOperation, IdempotencyRecord, ResultRef};
pub use message::{
    ArtifactKind, ArtifactRef, Message, MessageContent, MessageRole, MessageType, RenderOutcome,
    MESSAGE_SCHEMA_VERSION,
};
pub use project::Project;
pub use render::{RenderJob, RenderStatus};
pub use script::{Script, ScriptLine};
pub use storyboard::{Scene, Storyboard, VideoFormat};
pub use validation::{FieldViolation, ValidationError, Violations};
