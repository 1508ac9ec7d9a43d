//! Render job runner.
//!
//! The worker owns every transition out of `pending`: it claims the job,
//! submits the checkpoint snapshot to the renderer, then polls on a fixed
//! interval until the job reaches a terminal state. The `cancel_requested`
//! latch is re-read on every tick and checked before acting on anything
//! the renderer reported, so an observed cancellation always beats a
//! completion that raced it.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use adreel_engine::{with_retry, RenderHandle, RenderQueueConsumer, Renderer, Timeline};
use adreel_models::{
    ArtifactRef, MessageContent, MessageRole, RenderJob, RenderJobId, RenderOutcome, RenderStatus,
    MESSAGE_SCHEMA_VERSION,
};
use adreel_store::MemoryStore;

use crate::config::WorkerConfig;
use crate::error::WorkerResult;

/// Drives render jobs from `pending` to a terminal state.
pub struct RenderWorker {
    store: Arc<MemoryStore>,
    timeline: Timeline,
    renderer: Arc<dyn Renderer>,
    config: WorkerConfig,
}

impl RenderWorker {
    pub fn new(
        store: Arc<MemoryStore>,
        renderer: Arc<dyn Renderer>,
        config: WorkerConfig,
    ) -> Self {
        let timeline = Timeline::new(Arc::clone(&store));
        Self {
            store,
            timeline,
            renderer,
            config,
        }
    }

    /// Consume the queue until all producers are dropped.
    ///
    /// A failure while driving one job is logged and does not take the
    /// worker down; the job row keeps whatever state it last reached.
    pub async fn run(self, mut queue: RenderQueueConsumer) {
        info!("Render worker started");
        while let Some(job_id) = queue.recv().await {
            if let Err(e) = self.process_job(&job_id).await {
                error!(render_job_id = %job_id, error = %e, "Failed to process render job");
            }
        }
        info!("Render queue closed, worker exiting");
    }

    /// Drive a single job to a terminal state.
    pub async fn process_job(&self, job_id: &RenderJobId) -> WorkerResult<()> {
        let job = self.store.get_render_job(job_id).await?;

        // Cancelled while still queued: never touch the renderer.
        if job.cancel_requested {
            return self.finalize_cancelled(&job).await;
        }

        match self
            .store
            .update_render_job(job_id, |j| Ok(j.start()))
            .await?
        {
            Ok(()) => {}
            Err(RenderStatus::CancelRequested) => {
                return self.finalize_cancelled(&job).await;
            }
            Err(status) => {
                warn!(render_job_id = %job_id, status = %status, "Skipping job not in pending");
                return Ok(());
            }
        }

        let checkpoint = self.store.get_checkpoint(&job.source_checkpoint_id).await?;
        info!(
            render_job_id = %job.id,
            checkpoint_id = %checkpoint.id,
            format = %job.format,
            correlation_id = %job.correlation_id,
            "Render started"
        );

        let handle = match with_retry(&self.config.retry, "renderer.submit", || {
            self.renderer
                .submit(&checkpoint.storyboard, &checkpoint.brand_kit, job.format)
        })
        .await
        {
            Ok(handle) => handle,
            Err(e) => return self.finalize_failed(&job, &e.to_string()).await,
        };

        self.poll_until_terminal(&job, &handle).await
    }

    async fn poll_until_terminal(
        &self,
        job: &RenderJob,
        handle: &RenderHandle,
    ) -> WorkerResult<()> {
        let mut interval = tokio::time::interval(self.config.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut last_progress = 0u8;

        loop {
            interval.tick().await;

            let current = self.store.get_render_job(&job.id).await?;
            if current.cancel_requested {
                return self.finalize_cancelled(job).await;
            }

            let poll = match with_retry(&self.config.retry, "renderer.poll", || {
                self.renderer.poll(handle)
            })
            .await
            {
                Ok(poll) => poll,
                Err(e) => return self.finalize_failed(job, &e.to_string()).await,
            };

            // The latch may have flipped while we were polling. It is
            // checked again before any renderer result is acted on, so a
            // cancel that landed during the poll still wins over a
            // completion reported by that same poll.
            let current = self.store.get_render_job(&job.id).await?;
            if current.cancel_requested {
                return self.finalize_cancelled(job).await;
            }

            if let Some(fatal) = poll.fatal_error {
                return self.finalize_failed(job, &fatal).await;
            }

            if poll.done {
                return self.finalize_completed(job).await;
            }

            let progress = (poll.overall_progress.clamp(0.0, 1.0) * 100.0) as u8;
            if progress != last_progress {
                last_progress = progress;
                self.store
                    .update_render_job(&job.id, |j| {
                        j.set_progress(progress);
                        Ok(())
                    })
                    .await?;
                self.timeline
                    .append(
                        job.project_id.clone(),
                        MessageRole::Assistant,
                        MessageContent::RenderProgress {
                            version: MESSAGE_SCHEMA_VERSION.to_string(),
                            artifact_refs: vec![ArtifactRef::render_job(&job.id)],
                            progress,
                        },
                    )
                    .await?;
                debug!(render_job_id = %job.id, progress, "Render progress");
            }
        }
    }

    async fn finalize_completed(&self, job: &RenderJob) -> WorkerResult<()> {
        let output_key = job.output_key();
        let transitioned = self
            .store
            .update_render_job(&job.id, |j| Ok(j.complete(output_key.as_str())))
            .await?;
        if let Err(status) = transitioned {
            warn!(render_job_id = %job.id, status = %status, "Job already terminal, not completing");
            return Ok(());
        }
        info!(render_job_id = %job.id, output_key = %output_key, "Render completed");
        metrics::counter!("adreel_renders_completed_total").increment(1);
        self.append_outcome(job, RenderOutcome::Completed, Some(output_key), None)
            .await
    }

    async fn finalize_failed(&self, job: &RenderJob, error: &str) -> WorkerResult<()> {
        let transitioned = self
            .store
            .update_render_job(&job.id, |j| Ok(j.fail(error)))
            .await?;
        if let Err(status) = transitioned {
            warn!(render_job_id = %job.id, status = %status, "Job already terminal, not failing");
            return Ok(());
        }
        warn!(
            render_job_id = %job.id,
            correlation_id = %job.correlation_id,
            error,
            "Render failed"
        );
        metrics::counter!("adreel_renders_failed_total").increment(1);
        self.append_outcome(job, RenderOutcome::Failed, None, Some(error.to_string()))
            .await
    }

    async fn finalize_cancelled(&self, job: &RenderJob) -> WorkerResult<()> {
        let transitioned = self
            .store
            .update_render_job(&job.id, |j| Ok(j.cancelled()))
            .await?;
        if transitioned.is_err() {
            // Another path already finalized the job and wrote its message.
            return Ok(());
        }
        info!(render_job_id = %job.id, "Render cancelled");
        metrics::counter!("adreel_renders_cancelled_total").increment(1);
        self.append_outcome(job, RenderOutcome::Cancelled, None, None)
            .await
    }

    async fn append_outcome(
        &self,
        job: &RenderJob,
        status: RenderOutcome,
        output_key: Option<String>,
        error: Option<String>,
    ) -> WorkerResult<()> {
        self.timeline
            .append(
                job.project_id.clone(),
                MessageRole::Assistant,
                MessageContent::RenderCompleted {
                    version: MESSAGE_SCHEMA_VERSION.to_string(),
                    artifact_refs: vec![ArtifactRef::render_job(&job.id)],
                    status,
                    output_key,
                    error,
                },
            )
            .await?;
        Ok(())
    }
}
