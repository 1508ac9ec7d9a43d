//! In-process render job queue.
//!
//! Submissions hand a job id to the background render worker over an
//! unbounded channel. The job row in the store is the source of truth;
//! the channel only wakes the worker, so a lost message is recoverable
//! by rescanning pending jobs.

use tokio::sync::mpsc;

use adreel_models::RenderJobId;

/// Producer half held by the engine.
#[derive(Debug, Clone)]
pub struct RenderQueue {
    tx: mpsc::UnboundedSender<RenderJobId>,
}

impl RenderQueue {
    /// Hand a job to the worker. Returns false if the worker is gone.
    pub fn enqueue(&self, job_id: RenderJobId) -> bool {
        self.tx.send(job_id).is_ok()
    }
}

/// Consumer half held by the render worker.
#[derive(Debug)]
pub struct RenderQueueConsumer {
    rx: mpsc::UnboundedReceiver<RenderJobId>,
}

impl RenderQueueConsumer {
    /// Wait for the next submitted job. `None` once all producers dropped.
    pub async fn recv(&mut self) -> Option<RenderJobId> {
        self.rx.recv().await
    }

    /// Non-blocking receive; `None` when the channel is currently empty.
    pub fn try_recv(&mut self) -> Option<RenderJobId> {
        self.rx.try_recv().ok()
    }
}

/// Create a connected producer/consumer pair.
pub fn render_queue() -> (RenderQueue, RenderQueueConsumer) {
    let (tx, rx) = mpsc::unbounded_channel();
    (RenderQueue { tx }, RenderQueueConsumer { rx })
}
