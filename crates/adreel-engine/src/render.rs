//! Render submission, cancellation and progress reads.
//!
//! One `RenderJob` row per request. Submission inserts the row together
//! with its `render_requested` message, then wakes the worker over the
//! in-process queue. Cancellation latches `cancel_requested`; the worker
//! observes the latch on its next poll tick and finalizes the job.

use std::sync::Arc;

use tracing::info;

use adreel_models::{
    ArtifactRef, Checkpoint, Message, MessageContent, MessageId, MessageRole, Project, RenderJob,
    RenderJobId, RenderStatus, VideoFormat, MESSAGE_SCHEMA_VERSION,
};
use adreel_store::MemoryStore;

use crate::error::{EngineError, EngineResult};
use crate::queue::RenderQueue;

/// Point-in-time view of a render job for polling clients.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RenderProgress {
    pub job_id: RenderJobId,
    pub status: RenderStatus,
    /// 0-100
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&RenderJob> for RenderProgress {
    fn from(job: &RenderJob) -> Self {
        Self {
            job_id: job.id.clone(),
            status: job.status,
            progress: job.progress,
            output_key: job.output_s3_key.clone(),
            error: job.last_error.clone(),
        }
    }
}

#[derive(Clone)]
pub struct RenderService {
    store: Arc<MemoryStore>,
    queue: RenderQueue,
}

impl RenderService {
    pub fn new(store: Arc<MemoryStore>, queue: RenderQueue) -> Self {
        Self { store, queue }
    }

    pub async fn get(&self, job_id: &RenderJobId) -> EngineResult<RenderJob> {
        Ok(self.store.get_render_job(job_id).await?)
    }

    /// Create the job row and its `render_requested` message, then hand the
    /// job to the worker. Renders never touch checkpoints or the active
    /// pointer, so no revision guard is involved.
    pub async fn submit(
        &self,
        project: &Project,
        checkpoint: &Checkpoint,
        format: VideoFormat,
    ) -> EngineResult<RenderJob> {
        self.submit_with_id(project, checkpoint, format, RenderJobId::new())
            .await
    }

    /// Like [`submit`](Self::submit), but with a caller-chosen job id.
    ///
    /// Idempotent submission reserves the ledger entry before the row
    /// exists, so the id must be known up front.
    pub async fn submit_with_id(
        &self,
        project: &Project,
        checkpoint: &Checkpoint,
        format: VideoFormat,
        job_id: RenderJobId,
    ) -> EngineResult<RenderJob> {
        let request_id = MessageId::new();
        let mut job = RenderJob::new(
            project.id.clone(),
            checkpoint.id.clone(),
            request_id.clone(),
            format,
        );
        job.id = job_id;
        let mut request = Message::new(
            project.id.clone(),
            MessageRole::User,
            MessageContent::RenderRequested {
                version: MESSAGE_SCHEMA_VERSION.to_string(),
                artifact_refs: vec![ArtifactRef::render_job(&job.id)],
                format,
            },
        );
        request.id = request_id;
        request.content.validate()?;

        let job = self.store.insert_render_job(job, request).await?;
        self.queue.enqueue(job.id.clone());
        info!(
            render_job_id = %job.id,
            project_id = %project.id,
            checkpoint_id = %checkpoint.id,
            format = %format,
            "Submitted render job"
        );
        Ok(job)
    }

    /// Latch cancellation on a job.
    ///
    /// Legal only from `pending` or `rendering`; anything else is a
    /// conflict naming the current status. The worker confirms the
    /// cancellation on its next tick; this call does not wait for it.
    pub async fn cancel(&self, job_id: &RenderJobId) -> EngineResult<RenderJob> {
        let (outcome, job) = self
            .store
            .update_render_job(job_id, |j| {
                let outcome = j.request_cancel();
                Ok((outcome, j.clone()))
            })
            .await?;
        match outcome {
            Ok(()) => {
                info!(render_job_id = %job.id, "Cancellation requested");
                Ok(job)
            }
            Err(status) => Err(EngineError::conflict(format!(
                "render job {} cannot be cancelled in status {}",
                job_id, status
            ))),
        }
    }

    /// Pure read; never mutates the job.
    pub async fn get_progress(&self, job_id: &RenderJobId) -> EngineResult<RenderProgress> {
        let job = self.store.get_render_job(job_id).await?;
        Ok(RenderProgress::from(&job))
    }
}
