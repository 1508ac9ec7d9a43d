//! In-process store implementation.
//!
//! One `RwLock` over all tables; multi-row operations (checkpoint commits,
//! render submissions) run under a single write guard so their effects are
//! atomic as a unit.

use std::collections::HashMap;

use tokio::sync::RwLock;
use tracing::debug;

use adreel_models::{
    ArtifactKind, Checkpoint, CheckpointId, IdempotencyOperation, IdempotencyRecord, Message,
    MessageId, Project, ProjectId, RenderJob, RenderJobId,
};

use crate::error::{StoreError, StoreResult};

/// A checkpoint write with everything that must land atomically:
/// the checkpoint row, its history message, and the active-pointer update.
#[derive(Debug, Clone)]
pub struct CheckpointCommit {
    pub checkpoint: Checkpoint,
    /// `checkpoint_created` message announcing the new checkpoint.
    pub history_message: Message,
    /// Project revision observed when the mutation was computed.
    /// A mismatch at commit time fails with `RevisionConflict`.
    pub expected_revision: u64,
}

#[derive(Default)]
struct Tables {
    projects: HashMap<ProjectId, Project>,
    checkpoints: HashMap<CheckpointId, Checkpoint>,
    /// Message rows with their insertion sequence (tie-breaker for ordering).
    messages: HashMap<MessageId, (u64, Message)>,
    message_seq: u64,
    render_jobs: HashMap<RenderJobId, RenderJob>,
    /// Unique index on `(user_id, operation, key)`.
    idempotency: HashMap<(String, &'static str, String), IdempotencyRecord>,
}

impl Tables {
    fn verify_artifact_refs(&self, message: &Message) -> StoreResult<()> {
        for r in message.content.artifact_refs() {
            let exists = match r.kind {
                ArtifactKind::Checkpoint => self
                    .checkpoints
                    .contains_key(&CheckpointId::from(r.id.as_str())),
                ArtifactKind::RenderJob => self
                    .render_jobs
                    .contains_key(&RenderJobId::from(r.id.as_str())),
            };
            if !exists {
                return Err(StoreError::integrity(format!(
                    "message {} references missing {:?} {}",
                    message.id, r.kind, r.id
                )));
            }
        }
        Ok(())
    }

    fn insert_message(&mut self, message: Message) -> StoreResult<Message> {
        self.verify_artifact_refs(&message)?;
        if !self.projects.contains_key(&message.project_id) {
            return Err(StoreError::not_found(format!(
                "project {}",
                message.project_id
            )));
        }
        self.message_seq += 1;
        self.messages
            .insert(message.id.clone(), (self.message_seq, message.clone()));
        Ok(message)
    }
}

/// In-process store over all five tables.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Projects
    // ------------------------------------------------------------------

    pub async fn insert_project(&self, project: Project) -> StoreResult<Project> {
        let mut t = self.inner.write().await;
        if t.projects.contains_key(&project.id) {
            return Err(StoreError::already_exists(format!("project {}", project.id)));
        }
        t.projects.insert(project.id.clone(), project.clone());
        Ok(project)
    }

    pub async fn get_project(&self, id: &ProjectId) -> StoreResult<Project> {
        self.inner
            .read()
            .await
            .projects
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(format!("project {}", id)))
    }

    pub async fn list_projects_for_user(&self, user_id: &str) -> Vec<Project> {
        let t = self.inner.read().await;
        let mut projects: Vec<Project> = t
            .projects
            .values()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect();
        projects.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        projects
    }

    // ------------------------------------------------------------------
    // Checkpoints
    // ------------------------------------------------------------------

    pub async fn get_checkpoint(&self, id: &CheckpointId) -> StoreResult<Checkpoint> {
        self.inner
            .read()
            .await
            .checkpoints
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(format!("checkpoint {}", id)))
    }

    /// Commit a checkpoint atomically: insert the row, append its history
    /// message, move the active pointer and bump the project revision.
    ///
    /// Preconditions checked under the write guard:
    /// - the project exists and its revision equals `expected_revision`,
    /// - `source_message_id` references an existing message,
    /// - the parent checkpoint (if any) exists.
    ///
    /// On any failure nothing is written.
    pub async fn commit_checkpoint(&self, commit: CheckpointCommit) -> StoreResult<Project> {
        let CheckpointCommit {
            checkpoint,
            history_message,
            expected_revision,
        } = commit;

        let mut t = self.inner.write().await;

        let project = t
            .projects
            .get(&checkpoint.project_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(format!("project {}", checkpoint.project_id)))?;

        if project.revision != expected_revision {
            return Err(StoreError::RevisionConflict(format!(
                "project {} is at revision {}, commit expected {}",
                project.id, project.revision, expected_revision
            )));
        }

        if !t.messages.contains_key(&checkpoint.source_message_id) {
            return Err(StoreError::integrity(format!(
                "checkpoint {} references missing source message {}",
                checkpoint.id, checkpoint.source_message_id
            )));
        }

        if let Some(parent) = &checkpoint.parent_checkpoint_id {
            if !t.checkpoints.contains_key(parent) {
                return Err(StoreError::integrity(format!(
                    "checkpoint {} references missing parent {}",
                    checkpoint.id, parent
                )));
            }
        }

        // Checkpoint row first so the history message's refs resolve.
        let checkpoint_id = checkpoint.id.clone();
        t.checkpoints.insert(checkpoint_id.clone(), checkpoint.clone());

        if let Err(e) = t.insert_message(history_message) {
            t.checkpoints.remove(&checkpoint_id);
            return Err(e);
        }

        let project = t
            .projects
            .get_mut(&checkpoint.project_id)
            .expect("checked above");
        project.active_checkpoint_id = Some(checkpoint_id.clone());
        project.revision += 1;
        project.updated_at = chrono::Utc::now();

        debug!(
            project_id = %project.id,
            checkpoint_id = %checkpoint_id,
            revision = project.revision,
            "Committed checkpoint"
        );
        Ok(project.clone())
    }

    /// Restore an existing checkpoint as active, appending the
    /// `checkpoint_applied` message in the same unit. No new checkpoint row
    /// is created. Revision-guarded like `commit_checkpoint`.
    pub async fn restore_checkpoint(
        &self,
        project_id: &ProjectId,
        checkpoint_id: &CheckpointId,
        history_message: Message,
        expected_revision: u64,
    ) -> StoreResult<Project> {
        let mut t = self.inner.write().await;

        let project = t
            .projects
            .get(project_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(format!("project {}", project_id)))?;

        if project.revision != expected_revision {
            return Err(StoreError::RevisionConflict(format!(
                "project {} is at revision {}, restore expected {}",
                project.id, project.revision, expected_revision
            )));
        }

        let checkpoint = t
            .checkpoints
            .get(checkpoint_id)
            .ok_or_else(|| StoreError::not_found(format!("checkpoint {}", checkpoint_id)))?;
        if &checkpoint.project_id != project_id {
            return Err(StoreError::integrity(format!(
                "checkpoint {} does not belong to project {}",
                checkpoint_id, project_id
            )));
        }

        t.insert_message(history_message)?;

        let project = t.projects.get_mut(project_id).expect("checked above");
        project.active_checkpoint_id = Some(checkpoint_id.clone());
        project.revision += 1;
        project.updated_at = chrono::Utc::now();
        Ok(project.clone())
    }

    // ------------------------------------------------------------------
    // Messages
    // ------------------------------------------------------------------

    /// Append one message. Artifact references must resolve to existing
    /// entities of the matching kind.
    pub async fn append_message(&self, message: Message) -> StoreResult<Message> {
        let mut t = self.inner.write().await;
        t.insert_message(message)
    }

    pub async fn get_message(&self, id: &MessageId) -> StoreResult<Message> {
        self.inner
            .read()
            .await
            .messages
            .get(id)
            .map(|(_, m)| m.clone())
            .ok_or_else(|| StoreError::not_found(format!("message {}", id)))
    }

    /// All messages for a project, ascending by `created_at`, ties broken
    /// by insertion order.
    pub async fn list_messages(&self, project_id: &ProjectId) -> Vec<Message> {
        let t = self.inner.read().await;
        let mut rows: Vec<(u64, Message)> = t
            .messages
            .values()
            .filter(|(_, m)| &m.project_id == project_id)
            .cloned()
            .collect();
        rows.sort_by(|(seq_a, a), (seq_b, b)| {
            a.created_at.cmp(&b.created_at).then(seq_a.cmp(seq_b))
        });
        rows.into_iter().map(|(_, m)| m).collect()
    }

    // ------------------------------------------------------------------
    // Render jobs
    // ------------------------------------------------------------------

    /// Insert a render job together with its `render_requested` message.
    pub async fn insert_render_job(
        &self,
        job: RenderJob,
        request_message: Message,
    ) -> StoreResult<RenderJob> {
        let mut t = self.inner.write().await;
        if t.render_jobs.contains_key(&job.id) {
            return Err(StoreError::already_exists(format!("render job {}", job.id)));
        }
        if !t.projects.contains_key(&job.project_id) {
            return Err(StoreError::not_found(format!("project {}", job.project_id)));
        }
        if !t.checkpoints.contains_key(&job.source_checkpoint_id) {
            return Err(StoreError::integrity(format!(
                "render job {} references missing checkpoint {}",
                job.id, job.source_checkpoint_id
            )));
        }

        let job_id = job.id.clone();
        t.render_jobs.insert(job_id.clone(), job.clone());
        if let Err(e) = t.insert_message(request_message) {
            t.render_jobs.remove(&job_id);
            return Err(e);
        }
        Ok(job)
    }

    pub async fn get_render_job(&self, id: &RenderJobId) -> StoreResult<RenderJob> {
        self.inner
            .read()
            .await
            .render_jobs
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(format!("render job {}", id)))
    }

    /// Mutate a render job in place under the write guard.
    ///
    /// The closure sees the latest persisted row; whatever it returns is
    /// handed back, and its error aborts the update.
    pub async fn update_render_job<R>(
        &self,
        id: &RenderJobId,
        f: impl FnOnce(&mut RenderJob) -> StoreResult<R>,
    ) -> StoreResult<R> {
        let mut t = self.inner.write().await;
        let job = t
            .render_jobs
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found(format!("render job {}", id)))?;
        let snapshot = job.clone();
        match f(job) {
            Ok(r) => Ok(r),
            Err(e) => {
                *t.render_jobs.get_mut(id).expect("present above") = snapshot;
                Err(e)
            }
        }
    }

    // ------------------------------------------------------------------
    // Idempotency ledger
    // ------------------------------------------------------------------

    /// Insert a ledger entry. Fails with `AlreadyExists` when another
    /// writer already holds `(user_id, operation, key)` in the unique
    /// index.
    pub async fn insert_idempotency(&self, record: IdempotencyRecord) -> StoreResult<()> {
        let mut t = self.inner.write().await;
        let index_key = (
            record.user_id.clone(),
            record.operation.as_str(),
            record.key.clone(),
        );
        if t.idempotency.contains_key(&index_key) {
            return Err(StoreError::already_exists(format!(
                "idempotency key '{}' for {} by {}",
                record.key, record.operation, record.user_id
            )));
        }
        t.idempotency.insert(index_key, record);
        Ok(())
    }

    pub async fn get_idempotency(
        &self,
        user_id: &str,
        operation: IdempotencyOperation,
        key: &str,
    ) -> Option<IdempotencyRecord> {
        self.inner
            .read()
            .await
            .idempotency
            .get(&(user_id.to_string(), operation.as_str(), key.to_string()))
            .cloned()
    }

    /// Remove a ledger entry, freeing `(user_id, operation, key)` for a
    /// later insert. Removing an absent entry is a no-op.
    pub async fn remove_idempotency(
        &self,
        user_id: &str,
        operation: IdempotencyOperation,
        key: &str,
    ) {
        self.inner
            .write()
            .await
            .idempotency
            .remove(&(user_id.to_string(), operation.as_str(), key.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adreel_models::{
        ArtifactRef, BrandKit, CheckpointReason, MessageContent, MessageRole, RenderOutcome,
        RenderStatus, ResultRef, Scene, Script, Storyboard, VideoFormat, MESSAGE_SCHEMA_VERSION,
    };

    fn storyboard() -> Storyboard {
        Storyboard {
            version: "1".to_string(),
            format: VideoFormat::Vertical,
            total_duration: 3.0,
            scenes: vec![Scene {
                id: "s1".to_string(),
                duration: 3.0,
                on_screen_text: "Hook".to_string(),
                voiceover_text: "Hook VO".to_string(),
                asset_suggestions: vec![],
            }],
        }
    }

    fn script() -> Script {
        Script {
            version: "1".to_string(),
            tone: None,
            lines: vec![],
        }
    }

    fn brand_kit() -> BrandKit {
        BrandKit {
            version: "1".to_string(),
            product_name: "Evercold".to_string(),
            tagline: None,
            palette: vec![],
            font: "Inter".to_string(),
            logo_key: None,
        }
    }

    async fn seed_project(store: &MemoryStore) -> Project {
        store
            .insert_project(Project::new("user-1", "Test project"))
            .await
            .unwrap()
    }

    async fn seed_checkpoint(store: &MemoryStore, project: &Project) -> Checkpoint {
        let trigger = store
            .append_message(Message::new(
                project.id.clone(),
                MessageRole::User,
                MessageContent::UrlSubmitted {
                    version: MESSAGE_SCHEMA_VERSION.to_string(),
                    artifact_refs: vec![],
                    url: "https://shop.example/evercold".to_string(),
                    format: VideoFormat::Vertical,
                    tone: None,
                },
            ))
            .await
            .unwrap();

        let checkpoint = Checkpoint::new(
            project.id.clone(),
            "Generated from URL",
            trigger.id.clone(),
            None,
            CheckpointReason::Generation,
            storyboard(),
            script(),
            brand_kit(),
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
        store
            .commit_checkpoint(CheckpointCommit {
                checkpoint: checkpoint.clone(),
                history_message: history,
                expected_revision: project.revision,
            })
            .await
            .unwrap();
        checkpoint
    }

    #[tokio::test]
    async fn test_commit_checkpoint_updates_active_pointer() {
        let store = MemoryStore::new();
        let project = seed_project(&store).await;
        let checkpoint = seed_checkpoint(&store, &project).await;

        let reloaded = store.get_project(&project.id).await.unwrap();
        assert_eq!(reloaded.active_checkpoint_id, Some(checkpoint.id.clone()));
        assert_eq!(reloaded.revision, 1);

        let messages = store.list_messages(&project.id).await;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].message_type().as_str(), "checkpoint_created");
    }

    #[tokio::test]
    async fn test_stale_revision_commit_writes_nothing() {
        let store = MemoryStore::new();
        let project = seed_project(&store).await;
        let first = seed_checkpoint(&store, &project).await;

        // A second writer computed against revision 0, which is now stale.
        let trigger = store.list_messages(&project.id).await[0].clone();
        let stale = Checkpoint::new(
            project.id.clone(),
            "Stale edit",
            trigger.id,
            Some(first.id.clone()),
            CheckpointReason::ManualEdit,
            storyboard(),
            script(),
            brand_kit(),
        );
        let history = Message::new(
            project.id.clone(),
            MessageRole::Assistant,
            MessageContent::CheckpointCreated {
                version: MESSAGE_SCHEMA_VERSION.to_string(),
                artifact_refs: vec![ArtifactRef::checkpoint(&stale.id)],
                name: "Stale edit".to_string(),
                reason: CheckpointReason::ManualEdit,
            },
        );

        let err = store
            .commit_checkpoint(CheckpointCommit {
                checkpoint: stale.clone(),
                history_message: history,
                expected_revision: 0,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::RevisionConflict(_)));

        // Nothing landed: no checkpoint row, no extra message, pointer intact.
        assert!(store.get_checkpoint(&stale.id).await.is_err());
        assert_eq!(store.list_messages(&project.id).await.len(), 2);
        let reloaded = store.get_project(&project.id).await.unwrap();
        assert_eq!(reloaded.active_checkpoint_id, Some(first.id));
    }

    #[tokio::test]
    async fn test_message_refs_must_resolve() {
        let store = MemoryStore::new();
        let project = seed_project(&store).await;

        let dangling = Message::new(
            project.id.clone(),
            MessageRole::System,
            MessageContent::RenderProgress {
                version: MESSAGE_SCHEMA_VERSION.to_string(),
                artifact_refs: vec![ArtifactRef::render_job(&RenderJobId::from("ghost"))],
                progress: 10,
            },
        );
        let err = store.append_message(dangling).await.unwrap_err();
        assert!(matches!(err, StoreError::IntegrityViolation(_)));
    }

    #[tokio::test]
    async fn test_message_order_ties_broken_by_insertion() {
        let store = MemoryStore::new();
        let project = seed_project(&store).await;

        let now = chrono::Utc::now();
        for i in 0u8..5 {
            let mut m = Message::new(
                project.id.clone(),
                MessageRole::System,
                MessageContent::GenerationProgress {
                    version: MESSAGE_SCHEMA_VERSION.to_string(),
                    artifact_refs: vec![],
                    progress: i * 10,
                    stage: format!("stage-{}", i),
                },
            );
            m.created_at = now; // identical timestamps
            store.append_message(m).await.unwrap();
        }

        let messages = store.list_messages(&project.id).await;
        assert_eq!(messages.len(), 5);
        for (i, m) in messages.iter().enumerate() {
            match &m.content {
                MessageContent::GenerationProgress { stage, .. } => {
                    assert_eq!(stage, &format!("stage-{}", i));
                }
                other => panic!("unexpected message {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_idempotency_unique_index() {
        let store = MemoryStore::new();
        let project = seed_project(&store).await;

        let record = IdempotencyRecord::new(
            "user-1",
            project.id.clone(),
            IdempotencyOperation::Render,
            "key-1",
            ResultRef::RenderJob(RenderJobId::from("rj-1")),
        );
        store.insert_idempotency(record.clone()).await.unwrap();

        let losing = IdempotencyRecord::new(
            "user-1",
            project.id.clone(),
            IdempotencyOperation::Render,
            "key-1",
            ResultRef::RenderJob(RenderJobId::from("rj-2")),
        );
        let err = store.insert_idempotency(losing).await.unwrap_err();
        assert!(err.is_already_exists());

        // Same key under a different operation is an independent entry.
        let other_op = IdempotencyRecord::new(
            "user-1",
            project.id.clone(),
            IdempotencyOperation::Generate,
            "key-1",
            ResultRef::Checkpoint(CheckpointId::from("cp-1")),
        );
        store.insert_idempotency(other_op).await.unwrap();

        let found = store
            .get_idempotency("user-1", IdempotencyOperation::Render, "key-1")
            .await
            .unwrap();
        assert_eq!(found.result, ResultRef::RenderJob(RenderJobId::from("rj-1")));
    }

    #[tokio::test]
    async fn test_render_job_update_rolls_back_on_error() {
        let store = MemoryStore::new();
        let project = seed_project(&store).await;
        let checkpoint = seed_checkpoint(&store, &project).await;

        let job = RenderJob::new(
            project.id.clone(),
            checkpoint.id.clone(),
            checkpoint.source_message_id.clone(),
            VideoFormat::Vertical,
        );
        let request = Message::new(
            project.id.clone(),
            MessageRole::User,
            MessageContent::RenderRequested {
                version: MESSAGE_SCHEMA_VERSION.to_string(),
                artifact_refs: vec![ArtifactRef::render_job(&job.id)],
                format: job.format,
            },
        );
        store.insert_render_job(job.clone(), request).await.unwrap();

        // Transition that errors must not leave partial mutation behind.
        let err = store
            .update_render_job(&job.id, |j| {
                j.set_progress(55);
                Err::<(), _>(StoreError::integrity("forced"))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::IntegrityViolation(_)));

        let reloaded = store.get_render_job(&job.id).await.unwrap();
        assert_eq!(reloaded.progress, 0);
        assert_eq!(reloaded.status, RenderStatus::Pending);
    }

    #[tokio::test]
    async fn test_restore_checkpoint_moves_pointer_without_new_row() {
        let store = MemoryStore::new();
        let project = seed_project(&store).await;
        let first = seed_checkpoint(&store, &project).await;
        let project = store.get_project(&project.id).await.unwrap();

        let applied = Message::new(
            project.id.clone(),
            MessageRole::System,
            MessageContent::CheckpointApplied {
                version: MESSAGE_SCHEMA_VERSION.to_string(),
                artifact_refs: vec![ArtifactRef::checkpoint(&first.id)],
                restored_checkpoint_id: first.id.clone(),
                previous_checkpoint_id: project.active_checkpoint_id.clone(),
            },
        );
        let updated = store
            .restore_checkpoint(&project.id, &first.id, applied, project.revision)
            .await
            .unwrap();

        assert_eq!(updated.active_checkpoint_id, Some(first.id));
        assert_eq!(updated.revision, project.revision + 1);
        let messages = store.list_messages(&project.id).await;
        assert_eq!(
            messages.last().unwrap().message_type().as_str(),
            "checkpoint_applied"
        );
    }

    #[tokio::test]
    async fn test_render_completed_message_after_job_exists() {
        let store = MemoryStore::new();
        let project = seed_project(&store).await;
        let checkpoint = seed_checkpoint(&store, &project).await;

        let job = RenderJob::new(
            project.id.clone(),
            checkpoint.id.clone(),
            checkpoint.source_message_id.clone(),
            VideoFormat::Square,
        );
        let request = Message::new(
            project.id.clone(),
            MessageRole::User,
            MessageContent::RenderRequested {
                version: MESSAGE_SCHEMA_VERSION.to_string(),
                artifact_refs: vec![ArtifactRef::render_job(&job.id)],
                format: job.format,
            },
        );
        store.insert_render_job(job.clone(), request).await.unwrap();

        let done = Message::new(
            project.id.clone(),
            MessageRole::System,
            MessageContent::RenderCompleted {
                version: MESSAGE_SCHEMA_VERSION.to_string(),
                artifact_refs: vec![ArtifactRef::render_job(&job.id)],
                status: RenderOutcome::Completed,
                output_key: Some(job.output_key()),
                error: None,
            },
        );
        store.append_message(done).await.unwrap();
        assert_eq!(store.list_messages(&project.id).await.len(), 4);
    }
}
