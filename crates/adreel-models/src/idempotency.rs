//! Idempotency records.
//!
//! A caller-supplied key scopes at-most-once execution of a mutating
//! operation. Keys are unique on `(user_id, operation, key)`; the same key
//! string used for two different operations is two independent entries.

use std::fmt;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::id::{CheckpointId, MessageId, ProjectId, RenderJobId};

/// Operations guarded by the idempotency ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum IdempotencyOperation {
    Generate,
    RegenerateScene,
    GenerateAssets,
    Render,
}

impl IdempotencyOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdempotencyOperation::Generate => "generate",
            IdempotencyOperation::RegenerateScene => "regenerate_scene",
            IdempotencyOperation::GenerateAssets => "generate_assets",
            IdempotencyOperation::Render => "render",
        }
    }
}

impl fmt::Display for IdempotencyOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Pointer to the entity a guarded operation produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum ResultRef {
    Checkpoint(CheckpointId),
    RenderJob(RenderJobId),
    Message(MessageId),
}

/// One ledger entry.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct IdempotencyRecord {
    pub user_id: String,
    pub project_id: ProjectId,
    pub operation: IdempotencyOperation,
    pub key: String,
    pub result: ResultRef,
    pub created_at: DateTime<Utc>,
}

impl IdempotencyRecord {
    pub fn new(
        user_id: impl Into<String>,
        project_id: ProjectId,
        operation: IdempotencyOperation,
        key: impl Into<String>,
        result: ResultRef,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            project_id,
            operation,
            key: key.into(),
            result,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_ref_serde() {
        let r = ResultRef::RenderJob(RenderJobId::from("rj-1"));
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["type"], "render_job");
        assert_eq!(json["id"], "rj-1");
    }
}
