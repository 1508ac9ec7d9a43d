//! Persisted-state layer for the Adreel backend.
//!
//! Implements the logical tables `project`, `checkpoint`, `message`,
//! `render_job` and `idempotency_key` behind an async in-process store.
//! The storage-level guarantees the engine relies on live here:
//!
//! - the unique index on `(user_id, operation, key)` for idempotency,
//! - atomic checkpoint commits (checkpoint row + history message +
//!   active-pointer update as one unit),
//! - revision-checked compare-and-swap on the active pointer,
//! - append-only message ordering (`created_at` ascending, insertion
//!   order breaking ties).

pub mod error;
pub mod memory;

pub use error::{StoreError, StoreResult};
pub use memory::{CheckpointCommit, MemoryStore};
