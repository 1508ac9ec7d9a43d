//! Timeline message models.
//!
//! Every checkpoint-affecting or render-affecting action is recorded as a
//! typed, immutable message in the project's append-only timeline. Payloads
//! are a tagged union keyed by `type`; every variant carries a `version`
//! and a list of artifact references.

use std::fmt;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::checkpoint::CheckpointReason;
use crate::id::{CheckpointId, MessageId, ProjectId, RenderJobId};
use crate::storyboard::VideoFormat;
use crate::validation::{require_version, ValidationError, Violations};

/// Who produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

/// Discriminant of a message payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    UrlSubmitted,
    GenerationProgress,
    GenerationResult,
    CheckpointCreated,
    CheckpointApplied,
    SceneRegenerated,
    RenderRequested,
    RenderProgress,
    RenderCompleted,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::UrlSubmitted => "url_submitted",
            MessageType::GenerationProgress => "generation_progress",
            MessageType::GenerationResult => "generation_result",
            MessageType::CheckpointCreated => "checkpoint_created",
            MessageType::CheckpointApplied => "checkpoint_applied",
            MessageType::SceneRegenerated => "scene_regenerated",
            MessageType::RenderRequested => "render_requested",
            MessageType::RenderProgress => "render_progress",
            MessageType::RenderCompleted => "render_completed",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of durable entity an artifact reference points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Checkpoint,
    RenderJob,
}

/// A typed pointer from a message to the durable entity it announces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ArtifactRef {
    #[serde(rename = "type")]
    pub kind: ArtifactKind,
    pub id: String,
}

impl ArtifactRef {
    pub fn checkpoint(id: &CheckpointId) -> Self {
        Self {
            kind: ArtifactKind::Checkpoint,
            id: id.to_string(),
        }
    }

    pub fn render_job(id: &RenderJobId) -> Self {
        Self {
            kind: ArtifactKind::RenderJob,
            id: id.to_string(),
        }
    }
}

/// Terminal outcome reported in a `render_completed` message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RenderOutcome {
    Completed,
    Failed,
    Cancelled,
}

/// Current payload schema version for newly written messages.
pub const MESSAGE_SCHEMA_VERSION: &str = "1";

/// Message payload, discriminated by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    /// User submitted a product URL for generation
    UrlSubmitted {
        version: String,
        #[serde(default)]
        artifact_refs: Vec<ArtifactRef>,
        url: String,
        format: VideoFormat,
        #[serde(skip_serializing_if = "Option::is_none")]
        tone: Option<String>,
    },

    /// Generation is underway
    GenerationProgress {
        version: String,
        #[serde(default)]
        artifact_refs: Vec<ArtifactRef>,
        /// 0-100
        progress: u8,
        stage: String,
    },

    /// Generation finished; refs point at the produced checkpoint
    GenerationResult {
        version: String,
        artifact_refs: Vec<ArtifactRef>,
        summary: String,
    },

    /// A new checkpoint was created
    CheckpointCreated {
        version: String,
        artifact_refs: Vec<ArtifactRef>,
        name: String,
        reason: CheckpointReason,
    },

    /// An existing checkpoint was restored as active
    CheckpointApplied {
        version: String,
        artifact_refs: Vec<ArtifactRef>,
        restored_checkpoint_id: CheckpointId,
        #[serde(skip_serializing_if = "Option::is_none")]
        previous_checkpoint_id: Option<CheckpointId>,
    },

    /// A single scene was regenerated
    SceneRegenerated {
        version: String,
        artifact_refs: Vec<ArtifactRef>,
        scene_id: String,
    },

    /// A render was requested
    RenderRequested {
        version: String,
        artifact_refs: Vec<ArtifactRef>,
        format: VideoFormat,
    },

    /// Render progress observed from the renderer
    RenderProgress {
        version: String,
        artifact_refs: Vec<ArtifactRef>,
        /// 0-100
        progress: u8,
    },

    /// Render reached a terminal state
    RenderCompleted {
        version: String,
        artifact_refs: Vec<ArtifactRef>,
        status: RenderOutcome,
        #[serde(skip_serializing_if = "Option::is_none")]
        output_key: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl MessageContent {
    /// Discriminant of this payload.
    pub fn message_type(&self) -> MessageType {
        match self {
            MessageContent::UrlSubmitted { .. } => MessageType::UrlSubmitted,
            MessageContent::GenerationProgress { .. } => MessageType::GenerationProgress,
            MessageContent::GenerationResult { .. } => MessageType::GenerationResult,
            MessageContent::CheckpointCreated { .. } => MessageType::CheckpointCreated,
            MessageContent::CheckpointApplied { .. } => MessageType::CheckpointApplied,
            MessageContent::SceneRegenerated { .. } => MessageType::SceneRegenerated,
            MessageContent::RenderRequested { .. } => MessageType::RenderRequested,
            MessageContent::RenderProgress { .. } => MessageType::RenderProgress,
            MessageContent::RenderCompleted { .. } => MessageType::RenderCompleted,
        }
    }

    /// Payload schema version.
    pub fn version(&self) -> &str {
        match self {
            MessageContent::UrlSubmitted { version, .. }
            | MessageContent::GenerationProgress { version, .. }
            | MessageContent::GenerationResult { version, .. }
            | MessageContent::CheckpointCreated { version, .. }
            | MessageContent::CheckpointApplied { version, .. }
            | MessageContent::SceneRegenerated { version, .. }
            | MessageContent::RenderRequested { version, .. }
            | MessageContent::RenderProgress { version, .. }
            | MessageContent::RenderCompleted { version, .. } => version,
        }
    }

    /// Artifact references carried by the payload.
    pub fn artifact_refs(&self) -> &[ArtifactRef] {
        match self {
            MessageContent::UrlSubmitted { artifact_refs, .. }
            | MessageContent::GenerationProgress { artifact_refs, .. }
            | MessageContent::GenerationResult { artifact_refs, .. }
            | MessageContent::CheckpointCreated { artifact_refs, .. }
            | MessageContent::CheckpointApplied { artifact_refs, .. }
            | MessageContent::SceneRegenerated { artifact_refs, .. }
            | MessageContent::RenderRequested { artifact_refs, .. }
            | MessageContent::RenderProgress { artifact_refs, .. }
            | MessageContent::RenderCompleted { artifact_refs, .. } => artifact_refs,
        }
    }

    /// Artifact kind this message type is required to reference, if any.
    pub fn required_artifact_kind(&self) -> Option<ArtifactKind> {
        match self.message_type() {
            MessageType::GenerationResult
            | MessageType::CheckpointCreated
            | MessageType::CheckpointApplied => Some(ArtifactKind::Checkpoint),
            MessageType::RenderRequested
            | MessageType::RenderProgress
            | MessageType::RenderCompleted => Some(ArtifactKind::RenderJob),
            MessageType::UrlSubmitted
            | MessageType::GenerationProgress
            | MessageType::SceneRegenerated => None,
        }
    }

    /// Validate the payload against its variant schema.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut v = Violations::new();
        require_version(&mut v, self.version());

        for (i, r) in self.artifact_refs().iter().enumerate() {
            v.check(
                !r.id.trim().is_empty(),
                format!("artifact_refs[{}].id", i),
                "must be non-empty",
            );
        }

        if let Some(kind) = self.required_artifact_kind() {
            v.check(
                self.artifact_refs().iter().any(|r| r.kind == kind),
                "artifact_refs",
                format!("must carry at least one {:?} reference", kind),
            );
        }

        match self {
            MessageContent::UrlSubmitted { url, .. } => {
                v.check(!url.trim().is_empty(), "url", "must be non-empty");
            }
            MessageContent::GenerationProgress { progress, .. }
            | MessageContent::RenderProgress { progress, .. } => {
                v.check(*progress <= 100, "progress", "must be between 0 and 100");
            }
            MessageContent::CheckpointCreated { name, .. } => {
                v.check(!name.trim().is_empty(), "name", "must be non-empty");
            }
            MessageContent::SceneRegenerated { scene_id, .. } => {
                v.check(!scene_id.trim().is_empty(), "scene_id", "must be non-empty");
            }
            MessageContent::RenderCompleted { status, output_key, error, .. } => {
                if *status == RenderOutcome::Completed {
                    v.check(output_key.is_some(), "output_key", "required on completion");
                }
                if *status == RenderOutcome::Failed {
                    v.check(error.is_some(), "error", "required on failure");
                }
            }
            MessageContent::GenerationResult { .. }
            | MessageContent::CheckpointApplied { .. }
            | MessageContent::RenderRequested { .. } => {}
        }

        v.finish()
    }
}

/// An immutable, typed, timestamped event in a project's history.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Message {
    /// Unique message ID
    pub id: MessageId,

    /// Owning project
    pub project_id: ProjectId,

    /// Who produced it
    pub role: MessageRole,

    /// Typed payload
    pub content: MessageContent,

    /// Creation timestamp; timeline order is ascending `created_at`,
    /// ties broken by insertion order
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Create a new message. Callers validate `content` before persisting.
    pub fn new(project_id: ProjectId, role: MessageRole, content: MessageContent) -> Self {
        Self {
            id: MessageId::new(),
            project_id,
            role,
            content,
            created_at: Utc::now(),
        }
    }

    pub fn message_type(&self) -> MessageType {
        self.content.message_type()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_tagged_by_type() {
        let content = MessageContent::RenderRequested {
            version: MESSAGE_SCHEMA_VERSION.to_string(),
            artifact_refs: vec![ArtifactRef::render_job(&RenderJobId::from("rj-1"))],
            format: VideoFormat::Vertical,
        };
        let json = serde_json::to_value(&content).unwrap();
        assert_eq!(json["type"], "render_requested");
        assert_eq!(json["format"], "9:16");
        assert_eq!(json["artifact_refs"][0]["type"], "render_job");

        let back: MessageContent = serde_json::from_value(json).unwrap();
        assert_eq!(back.message_type(), MessageType::RenderRequested);
    }

    #[test]
    fn test_missing_version_is_hard_failure() {
        let content = MessageContent::SceneRegenerated {
            version: "".to_string(),
            artifact_refs: vec![],
            scene_id: "s2".to_string(),
        };
        let err = content.validate().unwrap_err();
        assert!(err.violations.iter().any(|v| v.field == "version"));
    }

    #[test]
    fn test_unknown_type_rejected_by_serde() {
        let json = serde_json::json!({
            "type": "telemetry_blob",
            "version": "1",
            "artifact_refs": []
        });
        assert!(serde_json::from_value::<MessageContent>(json).is_err());
    }

    #[test]
    fn test_artifact_kind_requirements() {
        let missing = MessageContent::CheckpointCreated {
            version: "1".to_string(),
            artifact_refs: vec![],
            name: "Generated".to_string(),
            reason: CheckpointReason::Generation,
        };
        assert!(missing.validate().is_err());

        let wrong_kind = MessageContent::RenderCompleted {
            version: "1".to_string(),
            artifact_refs: vec![ArtifactRef::checkpoint(&CheckpointId::from("cp-1"))],
            status: RenderOutcome::Cancelled,
            output_key: None,
            error: None,
        };
        assert!(wrong_kind.validate().is_err());

        let ok = MessageContent::RenderCompleted {
            version: "1".to_string(),
            artifact_refs: vec![ArtifactRef::render_job(&RenderJobId::from("rj-1"))],
            status: RenderOutcome::Completed,
            output_key: Some("renders/rj-1.mp4".to_string()),
            error: None,
        };
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn test_completed_render_requires_output_key() {
        let content = MessageContent::RenderCompleted {
            version: "1".to_string(),
            artifact_refs: vec![ArtifactRef::render_job(&RenderJobId::from("rj-1"))],
            status: RenderOutcome::Completed,
            output_key: None,
            error: None,
        };
        assert!(content.validate().is_err());
    }
}
