//! Checkpoint model.

use std::fmt;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::brand::BrandKit;
use crate::id::{CheckpointId, MessageId, ProjectId};
use crate::script::Script;
use crate::storyboard::Storyboard;

/// Why a checkpoint was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointReason {
    /// Initial or repeated full generation from a product URL
    Generation,
    /// User edited a scene by hand
    ManualEdit,
    /// A single scene was regenerated
    SceneRegeneration,
    /// Asset suggestions were refreshed
    AssetGeneration,
    /// The brand kit was updated
    BrandKitUpdate,
}

impl CheckpointReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckpointReason::Generation => "generation",
            CheckpointReason::ManualEdit => "manual_edit",
            CheckpointReason::SceneRegeneration => "scene_regeneration",
            CheckpointReason::AssetGeneration => "asset_generation",
            CheckpointReason::BrandKitUpdate => "brand_kit_update",
        }
    }
}

impl fmt::Display for CheckpointReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An immutable snapshot of {storyboard, script, brand kit}.
///
/// Checkpoints are never mutated or deleted; edits always produce a new
/// checkpoint whose `parent_checkpoint_id` links back to the one that was
/// edited, forming a tree rooted at the first generation checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Checkpoint {
    /// Unique checkpoint ID
    pub id: CheckpointId,

    /// Owning project
    pub project_id: ProjectId,

    /// Display name (e.g. "Generated from URL", "Edited scene 2")
    pub name: String,

    /// The timeline message that triggered this checkpoint
    pub source_message_id: MessageId,

    /// Parent checkpoint, `None` for the first generation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_checkpoint_id: Option<CheckpointId>,

    /// Why this checkpoint exists
    pub reason: CheckpointReason,

    /// Storyboard snapshot
    pub storyboard: Storyboard,

    /// Script snapshot
    pub script: Script,

    /// Brand kit snapshot
    pub brand_kit: BrandKit,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Checkpoint {
    /// Create a checkpoint snapshot. Callers validate the payloads first.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        project_id: ProjectId,
        name: impl Into<String>,
        source_message_id: MessageId,
        parent_checkpoint_id: Option<CheckpointId>,
        reason: CheckpointReason,
        storyboard: Storyboard,
        script: Script,
        brand_kit: BrandKit,
    ) -> Self {
        Self {
            id: CheckpointId::new(),
            project_id,
            name: name.into(),
            source_message_id,
            parent_checkpoint_id,
            reason,
            storyboard,
            script,
            brand_kit,
            created_at: Utc::now(),
        }
    }
}
