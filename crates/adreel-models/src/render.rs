//! Render job model and state machine.

use std::fmt;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::id::{CheckpointId, MessageId, ProjectId, RenderJobId};
use crate::storyboard::VideoFormat;

/// Render job lifecycle status.
///
/// `pending -> rendering -> {completed | failed | cancelled}`, with the
/// transitional `cancel_requested` entered from `pending` or `rendering`.
/// Terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum RenderStatus {
    /// Waiting for the worker
    #[default]
    Pending,
    /// Worker is driving the external renderer
    Rendering,
    /// Cancellation requested, worker has not yet confirmed
    CancelRequested,
    /// Render finished, output stored
    Completed,
    /// Renderer reported a fatal error
    Failed,
    /// Cancelled before completion
    Cancelled,
}

impl RenderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderStatus::Pending => "pending",
            RenderStatus::Rendering => "rendering",
            RenderStatus::CancelRequested => "cancel_requested",
            RenderStatus::Completed => "completed",
            RenderStatus::Failed => "failed",
            RenderStatus::Cancelled => "cancelled",
        }
    }

    /// No transition leaves a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RenderStatus::Completed | RenderStatus::Failed | RenderStatus::Cancelled
        )
    }

    /// Cancellation is only legal from `pending` or `rendering`.
    pub fn can_cancel(&self) -> bool {
        matches!(self, RenderStatus::Pending | RenderStatus::Rendering)
    }
}

impl fmt::Display for RenderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The durable record of one render request's lifecycle.
///
/// Exactly one row exists per render request; `format` is fixed at creation
/// and `cancel_requested` is a one-way latch.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RenderJob {
    /// Unique render job ID
    pub id: RenderJobId,

    /// Owning project
    pub project_id: ProjectId,

    /// Checkpoint being rendered
    pub source_checkpoint_id: CheckpointId,

    /// The `render_requested` message that announced this job
    pub source_message_id: MessageId,

    /// Output aspect ratio, fixed at creation
    pub format: VideoFormat,

    /// Lifecycle status
    #[serde(default)]
    pub status: RenderStatus,

    /// Progress percentage (0-100)
    #[serde(default)]
    pub progress: u8,

    /// One-way cancellation latch, observed by the worker on each poll tick
    #[serde(default)]
    pub cancel_requested: bool,

    /// First fatal error reported by the renderer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,

    /// Blob-store key of the finished MP4
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_s3_key: Option<String>,

    /// Correlation identifier for tracing user-reported failures
    pub correlation_id: String,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl RenderJob {
    /// Create a new job in `pending`.
    pub fn new(
        project_id: ProjectId,
        source_checkpoint_id: CheckpointId,
        source_message_id: MessageId,
        format: VideoFormat,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: RenderJobId::new(),
            project_id,
            source_checkpoint_id,
            source_message_id,
            format,
            status: RenderStatus::Pending,
            progress: 0,
            cancel_requested: false,
            last_error: None,
            output_s3_key: None,
            correlation_id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Conventional blob-store key for this job's output.
    pub fn output_key(&self) -> String {
        format!("renders/{}.mp4", self.id)
    }

    /// Transition `pending -> rendering`.
    ///
    /// Returns the current status when the transition is illegal (the
    /// worker skips jobs that were cancelled while still queued).
    pub fn start(&mut self) -> Result<(), RenderStatus> {
        match self.status {
            RenderStatus::Pending => {
                self.status = RenderStatus::Rendering;
                self.updated_at = Utc::now();
                Ok(())
            }
            other => Err(other),
        }
    }

    /// Record renderer-reported progress (clamped to 0-100).
    ///
    /// Monotonicity is not enforced; the renderer is trusted.
    pub fn set_progress(&mut self, progress: u8) {
        self.progress = progress.min(100);
        self.updated_at = Utc::now();
    }

    /// Latch cancellation. Legal only from `pending` or `rendering`;
    /// returns the current status otherwise.
    pub fn request_cancel(&mut self) -> Result<(), RenderStatus> {
        if !self.status.can_cancel() {
            return Err(self.status);
        }
        self.cancel_requested = true;
        self.status = RenderStatus::CancelRequested;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Terminal: render finished, output stored.
    pub fn complete(&mut self, output_key: impl Into<String>) -> Result<(), RenderStatus> {
        if self.status.is_terminal() {
            return Err(self.status);
        }
        self.status = RenderStatus::Completed;
        self.progress = 100;
        self.output_s3_key = Some(output_key.into());
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Terminal: renderer reported a fatal error. Keeps the first error.
    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), RenderStatus> {
        if self.status.is_terminal() {
            return Err(self.status);
        }
        self.status = RenderStatus::Failed;
        if self.last_error.is_none() {
            self.last_error = Some(error.into());
        }
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Terminal: cancellation confirmed by the worker.
    pub fn cancelled(&mut self) -> Result<(), RenderStatus> {
        if self.status.is_terminal() {
            return Err(self.status);
        }
        self.status = RenderStatus::Cancelled;
        self.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> RenderJob {
        RenderJob::new(
            ProjectId::from("p-1"),
            CheckpointId::from("cp-1"),
            MessageId::from("m-1"),
            VideoFormat::Vertical,
        )
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut j = job();
        assert_eq!(j.status, RenderStatus::Pending);
        j.start().unwrap();
        assert_eq!(j.status, RenderStatus::Rendering);
        j.set_progress(40);
        assert_eq!(j.progress, 40);
        j.complete(j.output_key()).unwrap();
        assert_eq!(j.status, RenderStatus::Completed);
        assert_eq!(j.progress, 100);
        assert_eq!(j.output_s3_key.as_deref(), Some(&*format!("renders/{}.mp4", j.id)));
    }

    #[test]
    fn test_cancel_is_one_way_latch() {
        let mut j = job();
        j.request_cancel().unwrap();
        assert!(j.cancel_requested);
        assert_eq!(j.status, RenderStatus::CancelRequested);

        // Second cancel is a conflict naming the current status.
        assert_eq!(j.request_cancel(), Err(RenderStatus::CancelRequested));

        j.cancelled().unwrap();
        assert_eq!(j.status, RenderStatus::Cancelled);
        assert!(j.cancel_requested);
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut j = job();
        j.start().unwrap();
        j.fail("renderer exploded").unwrap();
        assert_eq!(j.status, RenderStatus::Failed);
        assert_eq!(j.complete("renders/x.mp4"), Err(RenderStatus::Failed));
        assert_eq!(j.cancelled(), Err(RenderStatus::Failed));
        assert_eq!(j.request_cancel(), Err(RenderStatus::Failed));
    }

    #[test]
    fn test_fail_keeps_first_error() {
        let mut j = job();
        j.start().unwrap();
        j.fail("first").unwrap();
        assert_eq!(j.fail("second"), Err(RenderStatus::Failed));
        assert_eq!(j.last_error.as_deref(), Some("first"));
    }

    #[test]
    fn test_progress_clamped() {
        let mut j = job();
        j.start().unwrap();
        j.set_progress(250);
        assert_eq!(j.progress, 100);
    }
}
