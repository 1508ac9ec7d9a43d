//! The engine facade.
//!
//! `AdEngine` ties the checkpoint engine, timeline, idempotency ledger,
//! rate gate and render service together into the operations the HTTP
//! layer exposes. Ownership is enforced here: every operation takes the
//! calling user and refuses cross-user access.

use std::sync::Arc;

use tracing::{info, warn};

use adreel_models::{
    BrandKit, Checkpoint, CheckpointId, CheckpointReason, IdempotencyOperation, IdempotencyRecord,
    Message, MessageContent, MessageRole, Project, ProjectId, RenderJob, RenderJobId, ResultRef,
    Scene, ValidationError, VideoFormat, MESSAGE_SCHEMA_VERSION,
};
use adreel_store::MemoryStore;

use crate::checkpoints::{CheckpointEngine, NewCheckpoint, RestoreOutcome};
use crate::error::{EngineError, EngineResult};
use crate::generator::{ContentGenerator, GenerateRequest};
use crate::idempotency::{IdempotencyLedger, ResolvedResult};
use crate::queue::RenderQueue;
use crate::ratelimit::RateGate;
use crate::render::{RenderProgress, RenderService};
use crate::retry::{with_retry, RetryConfig};
use crate::security::{sanitize_title, validate_product_url};
use crate::timeline::Timeline;

/// Parameters for a full generation from a product URL.
#[derive(Debug, Clone)]
pub struct GenerateFromUrl {
    pub project_id: ProjectId,
    pub url: String,
    pub format: VideoFormat,
    pub tone: Option<String>,
    pub idempotency_key: Option<String>,
}

pub struct AdEngine {
    store: Arc<MemoryStore>,
    checkpoints: CheckpointEngine,
    timeline: Timeline,
    ledger: IdempotencyLedger,
    renders: RenderService,
    generator: Arc<dyn ContentGenerator>,
    gate: Arc<dyn RateGate>,
    retry: RetryConfig,
}

impl AdEngine {
    pub fn new(
        store: Arc<MemoryStore>,
        generator: Arc<dyn ContentGenerator>,
        gate: Arc<dyn RateGate>,
        queue: RenderQueue,
        retry: RetryConfig,
    ) -> Self {
        Self {
            checkpoints: CheckpointEngine::new(Arc::clone(&store)),
            timeline: Timeline::new(Arc::clone(&store)),
            ledger: IdempotencyLedger::new(Arc::clone(&store)),
            renders: RenderService::new(Arc::clone(&store), queue),
            store,
            generator,
            gate,
            retry,
        }
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    // ------------------------------------------------------------------
    // Projects
    // ------------------------------------------------------------------

    pub async fn create_project(&self, user_id: &str, title: &str) -> EngineResult<Project> {
        let title = sanitize_title(title);
        if title.is_empty() {
            return Err(ValidationError::single("title", "must be non-empty").into());
        }
        Ok(self.store.insert_project(Project::new(user_id, title)).await?)
    }

    pub async fn get_project(&self, user_id: &str, project_id: &ProjectId) -> EngineResult<Project> {
        self.owned_project(user_id, project_id).await
    }

    pub async fn list_projects(&self, user_id: &str) -> Vec<Project> {
        self.store.list_projects_for_user(user_id).await
    }

    pub async fn list_messages(
        &self,
        user_id: &str,
        project_id: &ProjectId,
    ) -> EngineResult<Vec<Message>> {
        self.owned_project(user_id, project_id).await?;
        self.timeline.list(project_id).await
    }

    // ------------------------------------------------------------------
    // Generation
    // ------------------------------------------------------------------

    /// Generate storyboard, script and brand kit from a product URL and
    /// commit the result as a new checkpoint.
    pub async fn generate_from_url(
        &self,
        user_id: &str,
        request: GenerateFromUrl,
    ) -> EngineResult<Checkpoint> {
        let project = self.owned_project(user_id, &request.project_id).await?;

        let key = request.idempotency_key.as_deref();
        if let Some(hit) = self
            .ledger
            .check(user_id, IdempotencyOperation::Generate, key)
            .await?
        {
            return replayed_checkpoint(hit);
        }

        self.admit(user_id, IdempotencyOperation::Generate).await?;

        let url = validate_product_url(&request.url)
            .into_result()
            .map_err(|msg| ValidationError::single("url", msg))?;

        let submitted = self
            .timeline
            .append(
                project.id.clone(),
                MessageRole::User,
                MessageContent::UrlSubmitted {
                    version: MESSAGE_SCHEMA_VERSION.to_string(),
                    artifact_refs: vec![],
                    url: url.clone(),
                    format: request.format,
                    tone: request.tone.clone(),
                },
            )
            .await?;
        self.timeline
            .append(
                project.id.clone(),
                MessageRole::System,
                MessageContent::GenerationProgress {
                    version: MESSAGE_SCHEMA_VERSION.to_string(),
                    artifact_refs: vec![],
                    progress: 10,
                    stage: "analyzing_product_page".to_string(),
                },
            )
            .await?;

        let generate_request = GenerateRequest {
            source_url: url,
            format: request.format,
            tone: request.tone.clone(),
        };
        let generated = with_retry(&self.retry, "generate", || {
            self.generator.generate(&generate_request)
        })
        .await?;

        let created = self
            .checkpoints
            .create(
                &project,
                NewCheckpoint {
                    name: "Generated from URL".to_string(),
                    source_message_id: submitted.id.clone(),
                    parent_checkpoint_id: project.active_checkpoint_id.clone(),
                    reason: CheckpointReason::Generation,
                    storyboard: generated.storyboard,
                    script: generated.script,
                    brand_kit: generated.brand_kit,
                },
            )
            .await;
        let (checkpoint, project) = match created {
            Ok(pair) => pair,
            Err(EngineError::Conflict(msg)) => {
                // A concurrent same-key call may have won the commit.
                if let Some(hit) = self
                    .ledger
                    .check(user_id, IdempotencyOperation::Generate, key)
                    .await?
                {
                    return replayed_checkpoint(hit);
                }
                return Err(EngineError::Conflict(msg));
            }
            Err(e) => return Err(e),
        };

        self.timeline
            .append(
                project.id.clone(),
                MessageRole::Assistant,
                MessageContent::GenerationResult {
                    version: MESSAGE_SCHEMA_VERSION.to_string(),
                    artifact_refs: vec![adreel_models::ArtifactRef::checkpoint(&checkpoint.id)],
                    summary: generated.summary,
                },
            )
            .await?;

        if let Some(key) = key {
            self.ledger
                .store(IdempotencyRecord::new(
                    user_id,
                    project.id.clone(),
                    IdempotencyOperation::Generate,
                    key,
                    ResultRef::Checkpoint(checkpoint.id.clone()),
                ))
                .await;
        }
        Ok(checkpoint)
    }

    // ------------------------------------------------------------------
    // Checkpoint-producing mutations
    // ------------------------------------------------------------------

    /// Replace one scene by hand. Every other scene is untouched and
    /// `total_duration` is recomputed before the snapshot revalidates.
    pub async fn update_scene(
        &self,
        user_id: &str,
        project_id: &ProjectId,
        scene: Scene,
    ) -> EngineResult<Checkpoint> {
        let project = self.owned_project(user_id, project_id).await?;
        let active = self.active_checkpoint(&project).await?;

        let scene_id = scene.id.clone();
        let storyboard = active
            .storyboard
            .with_scene_replaced(scene)
            .ok_or_else(|| EngineError::not_found(format!("scene {}", scene_id)))?;

        let (checkpoint, _) = self
            .checkpoints
            .create(
                &project,
                NewCheckpoint {
                    name: format!("Edited scene {}", scene_id),
                    source_message_id: active.source_message_id.clone(),
                    parent_checkpoint_id: Some(active.id.clone()),
                    reason: CheckpointReason::ManualEdit,
                    storyboard,
                    script: active.script.clone(),
                    brand_kit: active.brand_kit.clone(),
                },
            )
            .await?;
        Ok(checkpoint)
    }

    /// Regenerate one scene through the content generator.
    pub async fn regenerate_scene(
        &self,
        user_id: &str,
        project_id: &ProjectId,
        scene_id: &str,
        idempotency_key: Option<&str>,
    ) -> EngineResult<Checkpoint> {
        let project = self.owned_project(user_id, project_id).await?;

        if let Some(hit) = self
            .ledger
            .check(user_id, IdempotencyOperation::RegenerateScene, idempotency_key)
            .await?
        {
            return replayed_checkpoint(hit);
        }

        self.admit(user_id, IdempotencyOperation::RegenerateScene)
            .await?;

        let active = self.active_checkpoint(&project).await?;
        let scene = active
            .storyboard
            .scene(scene_id)
            .cloned()
            .ok_or_else(|| EngineError::not_found(format!("scene {}", scene_id)))?;

        let trigger = self
            .timeline
            .append(
                project.id.clone(),
                MessageRole::User,
                MessageContent::SceneRegenerated {
                    version: MESSAGE_SCHEMA_VERSION.to_string(),
                    artifact_refs: vec![],
                    scene_id: scene_id.to_string(),
                },
            )
            .await?;

        let mut regenerated = with_retry(&self.retry, "regenerate_scene", || {
            self.generator
                .regenerate_scene(&active.storyboard, &active.script, &scene)
        })
        .await?;
        // The generator does not get to rename the scene.
        regenerated.id = scene_id.to_string();

        let storyboard = active
            .storyboard
            .with_scene_replaced(regenerated)
            .ok_or_else(|| EngineError::internal("regenerated scene id vanished"))?;

        let created = self
            .checkpoints
            .create(
                &project,
                NewCheckpoint {
                    name: format!("Regenerated scene {}", scene_id),
                    source_message_id: trigger.id.clone(),
                    parent_checkpoint_id: Some(active.id.clone()),
                    reason: CheckpointReason::SceneRegeneration,
                    storyboard,
                    script: active.script.clone(),
                    brand_kit: active.brand_kit.clone(),
                },
            )
            .await;
        let checkpoint = match created {
            Ok((checkpoint, _)) => checkpoint,
            Err(EngineError::Conflict(msg)) => {
                if let Some(hit) = self
                    .ledger
                    .check(user_id, IdempotencyOperation::RegenerateScene, idempotency_key)
                    .await?
                {
                    return replayed_checkpoint(hit);
                }
                return Err(EngineError::Conflict(msg));
            }
            Err(e) => return Err(e),
        };

        if let Some(key) = idempotency_key {
            self.ledger
                .store(IdempotencyRecord::new(
                    user_id,
                    project.id.clone(),
                    IdempotencyOperation::RegenerateScene,
                    key,
                    ResultRef::Checkpoint(checkpoint.id.clone()),
                ))
                .await;
        }
        Ok(checkpoint)
    }

    /// Refresh asset suggestions for every scene of the active checkpoint.
    pub async fn generate_assets(
        &self,
        user_id: &str,
        project_id: &ProjectId,
        idempotency_key: Option<&str>,
    ) -> EngineResult<Checkpoint> {
        let project = self.owned_project(user_id, project_id).await?;

        if let Some(hit) = self
            .ledger
            .check(user_id, IdempotencyOperation::GenerateAssets, idempotency_key)
            .await?
        {
            return replayed_checkpoint(hit);
        }

        self.admit(user_id, IdempotencyOperation::GenerateAssets)
            .await?;

        let active = self.active_checkpoint(&project).await?;
        let suggestions = with_retry(&self.retry, "generate_assets", || {
            self.generator
                .suggest_assets(&active.storyboard, &active.brand_kit)
        })
        .await?;

        let mut storyboard = active.storyboard.clone();
        for scene in storyboard.scenes.iter_mut() {
            if let Some(assets) = suggestions.get(&scene.id) {
                scene.asset_suggestions = assets.clone();
            }
        }

        let created = self
            .checkpoints
            .create(
                &project,
                NewCheckpoint {
                    name: "Refreshed asset suggestions".to_string(),
                    source_message_id: active.source_message_id.clone(),
                    parent_checkpoint_id: Some(active.id.clone()),
                    reason: CheckpointReason::AssetGeneration,
                    storyboard,
                    script: active.script.clone(),
                    brand_kit: active.brand_kit.clone(),
                },
            )
            .await;
        let checkpoint = match created {
            Ok((checkpoint, _)) => checkpoint,
            Err(EngineError::Conflict(msg)) => {
                if let Some(hit) = self
                    .ledger
                    .check(user_id, IdempotencyOperation::GenerateAssets, idempotency_key)
                    .await?
                {
                    return replayed_checkpoint(hit);
                }
                return Err(EngineError::Conflict(msg));
            }
            Err(e) => return Err(e),
        };

        if let Some(key) = idempotency_key {
            self.ledger
                .store(IdempotencyRecord::new(
                    user_id,
                    project.id.clone(),
                    IdempotencyOperation::GenerateAssets,
                    key,
                    ResultRef::Checkpoint(checkpoint.id.clone()),
                ))
                .await;
        }
        Ok(checkpoint)
    }

    /// Replace the brand kit; storyboard and script carry over unchanged.
    pub async fn update_brand_kit(
        &self,
        user_id: &str,
        project_id: &ProjectId,
        brand_kit: BrandKit,
    ) -> EngineResult<Checkpoint> {
        let project = self.owned_project(user_id, project_id).await?;
        let active = self.active_checkpoint(&project).await?;

        let (checkpoint, _) = self
            .checkpoints
            .create(
                &project,
                NewCheckpoint {
                    name: "Updated brand kit".to_string(),
                    source_message_id: active.source_message_id.clone(),
                    parent_checkpoint_id: Some(active.id.clone()),
                    reason: CheckpointReason::BrandKitUpdate,
                    storyboard: active.storyboard.clone(),
                    script: active.script.clone(),
                    brand_kit,
                },
            )
            .await?;
        Ok(checkpoint)
    }

    pub async fn get_checkpoint(
        &self,
        user_id: &str,
        checkpoint_id: &CheckpointId,
    ) -> EngineResult<Checkpoint> {
        let checkpoint = self.checkpoints.get(checkpoint_id).await?;
        self.owned_project(user_id, &checkpoint.project_id).await?;
        Ok(checkpoint)
    }

    /// Restore a prior checkpoint as active.
    ///
    /// Returns the restored checkpoint together with the checkpoint id the
    /// active pointer moved away from.
    pub async fn restore_checkpoint(
        &self,
        user_id: &str,
        project_id: &ProjectId,
        checkpoint_id: &CheckpointId,
    ) -> EngineResult<RestoreOutcome> {
        let project = self.owned_project(user_id, project_id).await?;
        let previous_checkpoint_id = project.active_checkpoint_id.clone();
        let (checkpoint, _) = self.checkpoints.restore(&project, checkpoint_id).await?;
        Ok(RestoreOutcome {
            checkpoint,
            previous_checkpoint_id,
        })
    }

    // ------------------------------------------------------------------
    // Renders
    // ------------------------------------------------------------------

    /// Submit a render of the active checkpoint.
    ///
    /// `format` defaults to the storyboard's format. With an idempotency
    /// key, the ledger entry is reserved after admission but before the
    /// job row is written, so a same-key race yields exactly one job and
    /// a refused or failed submit leaves no claim behind.
    pub async fn submit_render(
        &self,
        user_id: &str,
        project_id: &ProjectId,
        format: Option<VideoFormat>,
        idempotency_key: Option<&str>,
    ) -> EngineResult<RenderJob> {
        let project = self.owned_project(user_id, project_id).await?;
        let checkpoint = self.active_checkpoint(&project).await?;
        let format = format.unwrap_or(checkpoint.storyboard.format);

        let Some(key) = idempotency_key else {
            self.admit(user_id, IdempotencyOperation::Render).await?;
            return self.renders.submit(&project, &checkpoint, format).await;
        };

        // A duplicate of a finished submit replays without consuming
        // budget; the limiter only meters calls that do new work.
        if let Some(hit) = self
            .ledger
            .check(user_id, IdempotencyOperation::Render, Some(key))
            .await?
        {
            info!(user_id = %user_id, key = %key, "Render submission replayed from ledger");
            return replayed_render_job(hit);
        }

        self.admit(user_id, IdempotencyOperation::Render).await?;

        let job_id = RenderJobId::new();
        let reservation = self
            .ledger
            .reserve(IdempotencyRecord::new(
                user_id,
                project.id.clone(),
                IdempotencyOperation::Render,
                key,
                ResultRef::RenderJob(job_id.clone()),
            ))
            .await?;
        if let Some(winner) = reservation {
            info!(user_id = %user_id, key = %key, "Render submission replayed from ledger");
            return replayed_render_job(self.ledger.resolve(&winner.result).await?);
        }

        match self
            .renders
            .submit_with_id(&project, &checkpoint, format, job_id)
            .await
        {
            Ok(job) => Ok(job),
            Err(e) => {
                // The claim must not outlive a submit that produced no job;
                // a retry under the same key runs fresh.
                self.ledger
                    .release(user_id, IdempotencyOperation::Render, key)
                    .await;
                Err(e)
            }
        }
    }

    pub async fn cancel_render(
        &self,
        user_id: &str,
        job_id: &RenderJobId,
    ) -> EngineResult<RenderJob> {
        self.owned_render_job(user_id, job_id).await?;
        self.renders.cancel(job_id).await
    }

    pub async fn get_render_job(
        &self,
        user_id: &str,
        job_id: &RenderJobId,
    ) -> EngineResult<RenderJob> {
        self.owned_render_job(user_id, job_id).await
    }

    pub async fn get_render_progress(
        &self,
        user_id: &str,
        job_id: &RenderJobId,
    ) -> EngineResult<RenderProgress> {
        self.owned_render_job(user_id, job_id).await?;
        self.renders.get_progress(job_id).await
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    async fn owned_project(&self, user_id: &str, project_id: &ProjectId) -> EngineResult<Project> {
        let project = self.store.get_project(project_id).await?;
        if !project.is_owned_by(user_id) {
            warn!(user_id = %user_id, project_id = %project_id, "Cross-user project access refused");
            return Err(EngineError::forbidden(format!(
                "project {} belongs to another user",
                project_id
            )));
        }
        Ok(project)
    }

    async fn owned_render_job(
        &self,
        user_id: &str,
        job_id: &RenderJobId,
    ) -> EngineResult<RenderJob> {
        let job = self.renders.get(job_id).await?;
        self.owned_project(user_id, &job.project_id).await?;
        Ok(job)
    }

    async fn active_checkpoint(&self, project: &Project) -> EngineResult<Checkpoint> {
        let id = project.active_checkpoint_id.as_ref().ok_or_else(|| {
            EngineError::conflict(format!(
                "project {} has no active checkpoint yet",
                project.id
            ))
        })?;
        Ok(self.store.get_checkpoint(id).await?)
    }

    async fn admit(&self, user_id: &str, operation: IdempotencyOperation) -> EngineResult<()> {
        self.gate
            .allow(user_id, operation)
            .await
            .map_err(|retry_after| EngineError::RateLimited { retry_after })
    }
}

fn replayed_checkpoint(hit: ResolvedResult) -> EngineResult<Checkpoint> {
    hit.into_checkpoint()
        .ok_or_else(|| EngineError::internal("idempotency record resolved to non-checkpoint entity"))
}

fn replayed_render_job(hit: ResolvedResult) -> EngineResult<RenderJob> {
    hit.into_render_job()
        .ok_or_else(|| EngineError::internal("render idempotency record resolved to non-job entity"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::render_queue;
    use crate::ratelimit::{NoopGate, RateLimitConfig, SlidingWindowLimiter};
    use crate::testing::FakeGenerator;
    use adreel_models::RenderStatus;

    fn quick_retry() -> RetryConfig {
        RetryConfig {
            max_retries: 2,
            base_delay_ms: 1,
            max_delay_ms: 1,
        }
    }

    fn engine_with(
        generator: FakeGenerator,
        gate: Arc<dyn RateGate>,
    ) -> (AdEngine, Arc<MemoryStore>, crate::queue::RenderQueueConsumer) {
        let store = Arc::new(MemoryStore::new());
        let (queue, consumer) = render_queue();
        let engine = AdEngine::new(
            Arc::clone(&store),
            Arc::new(generator),
            gate,
            queue,
            quick_retry(),
        );
        (engine, store, consumer)
    }

    fn engine() -> (AdEngine, Arc<MemoryStore>, crate::queue::RenderQueueConsumer) {
        engine_with(FakeGenerator::new(), Arc::new(NoopGate))
    }

    async fn generated_project(engine: &AdEngine) -> (Project, Checkpoint) {
        let project = engine.create_project("u1", "Evercold ad").await.unwrap();
        let checkpoint = engine
            .generate_from_url(
                "u1",
                GenerateFromUrl {
                    project_id: project.id.clone(),
                    url: "https://shop.example/evercold".to_string(),
                    format: VideoFormat::Vertical,
                    tone: Some("energetic".to_string()),
                    idempotency_key: None,
                },
            )
            .await
            .unwrap();
        let project = engine.get_project("u1", &project.id).await.unwrap();
        (project, checkpoint)
    }

    #[tokio::test]
    async fn test_generate_writes_full_timeline_and_checkpoint() {
        let (engine, store, _consumer) = engine();
        let (project, checkpoint) = generated_project(&engine).await;

        assert_eq!(project.active_checkpoint_id, Some(checkpoint.id.clone()));
        assert!(checkpoint.parent_checkpoint_id.is_none());
        assert_eq!(checkpoint.reason, CheckpointReason::Generation);

        let types: Vec<&str> = store
            .list_messages(&project.id)
            .await
            .iter()
            .map(|m| m.message_type().as_str())
            .collect();
        assert_eq!(
            types,
            vec![
                "url_submitted",
                "generation_progress",
                "checkpoint_created",
                "generation_result",
            ]
        );
    }

    #[tokio::test]
    async fn test_generate_is_idempotent_per_key() {
        let (engine, store, _consumer) = engine();
        let project = engine.create_project("u1", "Evercold ad").await.unwrap();

        let request = GenerateFromUrl {
            project_id: project.id.clone(),
            url: "https://shop.example/evercold".to_string(),
            format: VideoFormat::Vertical,
            tone: None,
            idempotency_key: Some("gen-1".to_string()),
        };
        let first = engine
            .generate_from_url("u1", request.clone())
            .await
            .unwrap();
        let message_count = store.list_messages(&project.id).await.len();

        let second = engine.generate_from_url("u1", request).await.unwrap();
        assert_eq!(second.id, first.id);
        // Replay writes nothing new.
        assert_eq!(store.list_messages(&project.id).await.len(), message_count);
    }

    #[tokio::test]
    async fn test_generate_retries_transient_generator_failures() {
        let (engine, _, _consumer) = engine_with(FakeGenerator::failing_first(2), Arc::new(NoopGate));
        let project = engine.create_project("u1", "Evercold ad").await.unwrap();
        let checkpoint = engine
            .generate_from_url(
                "u1",
                GenerateFromUrl {
                    project_id: project.id.clone(),
                    url: "https://shop.example/evercold".to_string(),
                    format: VideoFormat::Vertical,
                    tone: None,
                    idempotency_key: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(checkpoint.reason, CheckpointReason::Generation);
    }

    #[tokio::test]
    async fn test_generate_rejects_internal_url() {
        let (engine, _, _consumer) = engine();
        let project = engine.create_project("u1", "Evercold ad").await.unwrap();
        let err = engine
            .generate_from_url(
                "u1",
                GenerateFromUrl {
                    project_id: project.id.clone(),
                    url: "http://169.254.169.254/latest/meta-data/".to_string(),
                    format: VideoFormat::Vertical,
                    tone: None,
                    idempotency_key: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn test_rate_limit_rejects_with_retry_after() {
        let gate = SlidingWindowLimiter::new(RateLimitConfig {
            generate_per_minute: 1,
            ..RateLimitConfig::default()
        });
        let (engine, _, _consumer) = engine_with(FakeGenerator::new(), Arc::new(gate));
        let project = engine.create_project("u1", "Evercold ad").await.unwrap();

        let request = GenerateFromUrl {
            project_id: project.id.clone(),
            url: "https://shop.example/evercold".to_string(),
            format: VideoFormat::Vertical,
            tone: None,
            idempotency_key: None,
        };
        engine
            .generate_from_url("u1", request.clone())
            .await
            .unwrap();
        let err = engine.generate_from_url("u1", request).await.unwrap_err();
        assert!(matches!(err, EngineError::RateLimited { .. }));
    }

    #[tokio::test]
    async fn test_update_scene_isolates_untouched_scenes() {
        let (engine, _, _consumer) = engine();
        let (project, before) = generated_project(&engine).await;

        let mut edited = before.storyboard.scenes[0].clone();
        edited.duration = 4.5;
        edited.on_screen_text = "New hook".to_string();

        let after = engine
            .update_scene("u1", &project.id, edited.clone())
            .await
            .unwrap();
        assert_eq!(after.reason, CheckpointReason::ManualEdit);
        assert_eq!(after.parent_checkpoint_id, Some(before.id.clone()));
        assert_eq!(after.storyboard.scenes[0], edited);
        assert_eq!(after.storyboard.scenes[1], before.storyboard.scenes[1]);
        let expected: f64 = after.storyboard.scenes.iter().map(|s| s.duration).sum();
        assert!((after.storyboard.total_duration - expected).abs() < 1e-9);

        // The edited checkpoint itself is untouched.
        let original = engine.get_checkpoint("u1", &before.id).await.unwrap();
        assert_eq!(original.storyboard, before.storyboard);
    }

    #[tokio::test]
    async fn test_update_unknown_scene_is_not_found() {
        let (engine, _, _consumer) = engine();
        let (project, before) = generated_project(&engine).await;
        let mut ghost = before.storyboard.scenes[0].clone();
        ghost.id = "scene-99".to_string();
        let err = engine.update_scene("u1", &project.id, ghost).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_regenerate_scene_pins_id_and_links_trigger() {
        let (engine, store, _consumer) = engine();
        let (project, before) = generated_project(&engine).await;

        let checkpoint = engine
            .regenerate_scene("u1", &project.id, "scene-2", None)
            .await
            .unwrap();
        assert_eq!(checkpoint.reason, CheckpointReason::SceneRegeneration);
        assert_eq!(checkpoint.parent_checkpoint_id, Some(before.id));
        assert!(checkpoint.storyboard.scene("scene-2").is_some());
        assert_eq!(checkpoint.storyboard.scenes[0], before.storyboard.scenes[0]);

        // Trigger message precedes the checkpoint and is its source.
        let trigger = store
            .get_message(&checkpoint.source_message_id)
            .await
            .unwrap();
        assert_eq!(trigger.message_type().as_str(), "scene_regenerated");
    }

    #[tokio::test]
    async fn test_generate_assets_creates_checkpoint_with_suggestions() {
        let (engine, _, _consumer) = engine();
        let (project, before) = generated_project(&engine).await;

        let checkpoint = engine
            .generate_assets("u1", &project.id, Some("assets-1"))
            .await
            .unwrap();
        assert_eq!(checkpoint.reason, CheckpointReason::AssetGeneration);
        for scene in &checkpoint.storyboard.scenes {
            assert!(scene
                .asset_suggestions
                .iter()
                .any(|a| a.starts_with("stock/")));
        }

        // Replay under the same key returns the same checkpoint.
        let replay = engine
            .generate_assets("u1", &project.id, Some("assets-1"))
            .await
            .unwrap();
        assert_eq!(replay.id, checkpoint.id);
        assert_ne!(checkpoint.id, before.id);
    }

    #[tokio::test]
    async fn test_update_brand_kit_keeps_storyboard() {
        let (engine, _, _consumer) = engine();
        let (project, before) = generated_project(&engine).await;

        let kit = BrandKit {
            version: "1".to_string(),
            product_name: "Evercold Pro".to_string(),
            tagline: Some("Colder, longer.".to_string()),
            palette: vec!["#004488".to_string()],
            font: "Inter".to_string(),
            logo_key: None,
        };
        let checkpoint = engine
            .update_brand_kit("u1", &project.id, kit.clone())
            .await
            .unwrap();
        assert_eq!(checkpoint.reason, CheckpointReason::BrandKitUpdate);
        assert_eq!(checkpoint.brand_kit, kit);
        assert_eq!(checkpoint.storyboard, before.storyboard);
    }

    #[tokio::test]
    async fn test_restore_rewinds_active_pointer() {
        let (engine, _, _consumer) = engine();
        let (project, first) = generated_project(&engine).await;
        let second = engine
            .regenerate_scene("u1", &project.id, "scene-1", None)
            .await
            .unwrap();

        let restored = engine
            .restore_checkpoint("u1", &project.id, &first.id)
            .await
            .unwrap();
        assert_eq!(restored.checkpoint.id, first.id);
        // The caller learns what the pointer moved away from.
        assert_eq!(restored.previous_checkpoint_id, Some(second.id.clone()));

        let project = engine.get_project("u1", &project.id).await.unwrap();
        assert_eq!(project.active_checkpoint_id, Some(first.id.clone()));

        // Mutations now branch from the restored checkpoint.
        let branched = engine
            .regenerate_scene("u1", &project.id, "scene-1", None)
            .await
            .unwrap();
        assert_eq!(branched.parent_checkpoint_id, Some(first.id));
        assert_ne!(branched.parent_checkpoint_id, Some(second.id));
    }

    #[tokio::test]
    async fn test_submit_render_requires_active_checkpoint() {
        let (engine, _, _consumer) = engine();
        let project = engine.create_project("u1", "Empty").await.unwrap();
        let err = engine
            .submit_render("u1", &project.id, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_submit_render_idempotent_yields_one_job() {
        let (engine, store, mut consumer) = engine();
        let (project, checkpoint) = generated_project(&engine).await;

        let first = engine
            .submit_render("u1", &project.id, None, Some("render-1"))
            .await
            .unwrap();
        let second = engine
            .submit_render("u1", &project.id, None, Some("render-1"))
            .await
            .unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(first.source_checkpoint_id, checkpoint.id);

        // Exactly one wake-up reached the worker.
        assert_eq!(consumer.recv().await, Some(first.id.clone()));
        assert!(consumer.try_recv().is_none());

        // And exactly one render_requested message exists.
        let requested = store
            .list_messages(&project.id)
            .await
            .iter()
            .filter(|m| m.message_type().as_str() == "render_requested")
            .count();
        assert_eq!(requested, 1);
    }

    /// Test gate that meters render admissions and admits everything else.
    struct RenderBudgetGate {
        remaining: std::sync::atomic::AtomicU32,
    }

    #[async_trait::async_trait]
    impl RateGate for RenderBudgetGate {
        async fn allow(
            &self,
            _user_id: &str,
            operation: IdempotencyOperation,
        ) -> Result<(), std::time::Duration> {
            use std::sync::atomic::Ordering;
            if operation != IdempotencyOperation::Render {
                return Ok(());
            }
            self.remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .map(|_| ())
                .map_err(|_| std::time::Duration::from_secs(30))
        }
    }

    #[tokio::test]
    async fn test_refused_keyed_submit_leaves_key_reusable() {
        let gate = Arc::new(RenderBudgetGate {
            remaining: std::sync::atomic::AtomicU32::new(0),
        });
        let gate_dyn: Arc<dyn RateGate> = gate.clone();
        let (engine, _, mut consumer) = engine_with(FakeGenerator::new(), gate_dyn);
        let (project, _) = generated_project(&engine).await;

        let err = engine
            .submit_render("u1", &project.id, None, Some("render-k"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::RateLimited { .. }));

        // The refusal left no ledger claim behind; once the budget allows
        // it the same key submits a fresh job.
        gate.remaining
            .store(1, std::sync::atomic::Ordering::SeqCst);
        let job = engine
            .submit_render("u1", &project.id, None, Some("render-k"))
            .await
            .unwrap();

        // The budget is spent again, but a replay never consumes it.
        let replay = engine
            .submit_render("u1", &project.id, None, Some("render-k"))
            .await
            .unwrap();
        assert_eq!(replay.id, job.id);
        assert_eq!(consumer.recv().await, Some(job.id.clone()));
        assert!(consumer.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_cross_user_access_is_forbidden() {
        let (engine, _, _consumer) = engine();
        let (project, checkpoint) = generated_project(&engine).await;

        assert!(matches!(
            engine.get_project("u2", &project.id).await.unwrap_err(),
            EngineError::Forbidden(_)
        ));
        assert!(matches!(
            engine
                .restore_checkpoint("u2", &project.id, &checkpoint.id)
                .await
                .unwrap_err(),
            EngineError::Forbidden(_)
        ));

        let job = engine
            .submit_render("u1", &project.id, None, None)
            .await
            .unwrap();
        assert!(matches!(
            engine.cancel_render("u2", &job.id).await.unwrap_err(),
            EngineError::Forbidden(_)
        ));
        // The job is untouched.
        let reloaded = engine.get_render_job("u1", &job.id).await.unwrap();
        assert_eq!(reloaded.status, RenderStatus::Pending);
    }

    #[tokio::test]
    async fn test_cancel_then_cancel_again_conflicts() {
        let (engine, _, _consumer) = engine();
        let (project, _) = generated_project(&engine).await;
        let job = engine
            .submit_render("u1", &project.id, None, None)
            .await
            .unwrap();

        let cancelled = engine.cancel_render("u1", &job.id).await.unwrap();
        assert_eq!(cancelled.status, RenderStatus::CancelRequested);
        assert!(matches!(
            engine.cancel_render("u1", &job.id).await.unwrap_err(),
            EngineError::Conflict(_)
        ));
    }
}
