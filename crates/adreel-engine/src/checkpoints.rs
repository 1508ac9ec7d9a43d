//! Checkpoint engine.
//!
//! Checkpoints are immutable snapshots of {storyboard, script, brand kit}
//! linked into a tree by `parent_checkpoint_id`. Creation validates the
//! full snapshot first, then commits the row, its `checkpoint_created`
//! message and the active-pointer move as one atomic unit. Restoration
//! moves the pointer to an existing row and appends `checkpoint_applied`;
//! it never writes a new checkpoint.

use std::sync::Arc;

use tracing::info;

use adreel_models::{
    ArtifactRef, BrandKit, Checkpoint, CheckpointId, CheckpointReason, FieldViolation, Message,
    MessageContent, MessageId, MessageRole, Project, Script, Storyboard, ValidationError,
    MESSAGE_SCHEMA_VERSION,
};
use adreel_store::{CheckpointCommit, MemoryStore};

use crate::error::{EngineError, EngineResult};

/// Result of a restore: the checkpoint now active plus the id the
/// active pointer moved away from.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RestoreOutcome {
    pub checkpoint: Checkpoint,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_checkpoint_id: Option<CheckpointId>,
}

/// Everything needed to create one checkpoint.
#[derive(Debug, Clone)]
pub struct NewCheckpoint {
    pub name: String,
    /// Timeline message that triggered this checkpoint.
    pub source_message_id: MessageId,
    pub parent_checkpoint_id: Option<CheckpointId>,
    pub reason: CheckpointReason,
    pub storyboard: Storyboard,
    pub script: Script,
    pub brand_kit: BrandKit,
}

/// Validate the full snapshot, prefixing violations with the payload they
/// belong to so a single response names every offending field.
fn validate_snapshot(
    storyboard: &Storyboard,
    script: &Script,
    brand_kit: &BrandKit,
) -> Result<(), ValidationError> {
    let mut violations: Vec<FieldViolation> = Vec::new();
    let parts = [
        ("storyboard", storyboard.validate()),
        ("script", script.validate()),
        ("brand_kit", brand_kit.validate()),
    ];
    for (prefix, result) in parts {
        if let Err(e) = result {
            violations.extend(e.violations.into_iter().map(|v| FieldViolation {
                field: format!("{}.{}", prefix, v.field),
                message: v.message,
            }));
        }
    }
    if violations.is_empty() {
        Ok(())
    } else {
        Err(ValidationError { violations })
    }
}

#[derive(Clone)]
pub struct CheckpointEngine {
    store: Arc<MemoryStore>,
}

impl CheckpointEngine {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }

    pub async fn get(&self, id: &CheckpointId) -> EngineResult<Checkpoint> {
        Ok(self.store.get_checkpoint(id).await?)
    }

    /// Create a checkpoint and make it active.
    ///
    /// `project` is the caller's read snapshot; its revision guards the
    /// commit, so a concurrent mutation surfaces as `Conflict` with
    /// nothing written.
    pub async fn create(
        &self,
        project: &Project,
        new: NewCheckpoint,
    ) -> EngineResult<(Checkpoint, Project)> {
        if new.name.trim().is_empty() {
            return Err(ValidationError::single("name", "must be non-empty").into());
        }
        validate_snapshot(&new.storyboard, &new.script, &new.brand_kit)?;

        let checkpoint = Checkpoint::new(
            project.id.clone(),
            new.name,
            new.source_message_id,
            new.parent_checkpoint_id,
            new.reason,
            new.storyboard,
            new.script,
            new.brand_kit,
        );
        let history = Message::new(
            project.id.clone(),
            MessageRole::Assistant,
            MessageContent::CheckpointCreated {
                version: MESSAGE_SCHEMA_VERSION.to_string(),
                artifact_refs: vec![ArtifactRef::checkpoint(&checkpoint.id)],
                name: checkpoint.name.clone(),
                reason: checkpoint.reason,
            },
        );
        history.content.validate()?;

        let updated = self
            .store
            .commit_checkpoint(CheckpointCommit {
                checkpoint: checkpoint.clone(),
                history_message: history,
                expected_revision: project.revision,
            })
            .await?;

        info!(
            project_id = %updated.id,
            checkpoint_id = %checkpoint.id,
            reason = %checkpoint.reason,
            "Created checkpoint"
        );
        Ok((checkpoint, updated))
    }

    /// Restore an existing checkpoint as the active one.
    ///
    /// Appends `checkpoint_applied` recording both the restored and the
    /// previously active checkpoint. The restored row is untouched.
    pub async fn restore(
        &self,
        project: &Project,
        checkpoint_id: &CheckpointId,
    ) -> EngineResult<(Checkpoint, Project)> {
        let checkpoint = self.store.get_checkpoint(checkpoint_id).await?;
        if checkpoint.project_id != project.id {
            return Err(EngineError::not_found(format!(
                "checkpoint {} in project {}",
                checkpoint_id, project.id
            )));
        }

        let applied = Message::new(
            project.id.clone(),
            MessageRole::System,
            MessageContent::CheckpointApplied {
                version: MESSAGE_SCHEMA_VERSION.to_string(),
                artifact_refs: vec![ArtifactRef::checkpoint(checkpoint_id)],
                restored_checkpoint_id: checkpoint_id.clone(),
                previous_checkpoint_id: project.active_checkpoint_id.clone(),
            },
        );
        applied.content.validate()?;

        let updated = self
            .store
            .restore_checkpoint(&project.id, checkpoint_id, applied, project.revision)
            .await?;

        info!(
            project_id = %updated.id,
            checkpoint_id = %checkpoint_id,
            "Restored checkpoint"
        );
        Ok((checkpoint, updated))
    }
}
