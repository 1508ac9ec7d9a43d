//! Project, checkpoint and timeline handlers.
//!
//! Thin plumbing over the engine: extract the session user, hand the
//! request through, map errors. All ownership and invariant checks live
//! in `adreel-engine`.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::Validate;

use adreel_engine::{EngineError, GenerateFromUrl, RestoreOutcome};
use adreel_models::{
    BrandKit, Checkpoint, CheckpointId, Message, Project, ProjectId, Scene, ValidationError,
    VideoFormat,
};

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::handlers::idempotency_key;
use crate::state::AppState;

/// Request to generate an ad from a product URL.
#[derive(Debug, Deserialize, Validate)]
pub struct GenerateRequest {
    /// Existing project to generate into; a new one is created if absent
    #[serde(default)]
    pub project_id: Option<String>,
    /// Title for a newly created project
    #[serde(default)]
    #[validate(length(max = 200, message = "must be at most 200 characters"))]
    pub title: Option<String>,
    /// Product page URL
    #[validate(
        url(message = "must be a valid URL"),
        length(max = 2048, message = "must be at most 2048 characters")
    )]
    pub url: String,
    /// Output aspect ratio
    pub format: VideoFormat,
    /// Optional tone hint for the script
    #[serde(default)]
    #[validate(length(max = 100, message = "must be at most 100 characters"))]
    pub tone: Option<String>,
}

#[derive(Serialize)]
pub struct GenerateResponse {
    pub project: Project,
    pub checkpoint: Checkpoint,
}

/// Generate storyboard, script and brand kit from a product URL.
pub async fn generate(
    State(state): State<AppState>,
    user: AuthUser,
    headers: HeaderMap,
    Json(request): Json<GenerateRequest>,
) -> ApiResult<Json<GenerateResponse>> {
    request
        .validate()
        .map_err(|e| EngineError::from(ValidationError::from(e)))?;

    let project = match &request.project_id {
        Some(id) => {
            state
                .engine
                .get_project(&user.uid, &ProjectId::from(id.as_str()))
                .await?
        }
        None => {
            let title = request.title.as_deref().unwrap_or("Untitled ad");
            state.engine.create_project(&user.uid, title).await?
        }
    };

    let checkpoint = state
        .engine
        .generate_from_url(
            &user.uid,
            GenerateFromUrl {
                project_id: project.id.clone(),
                url: request.url,
                format: request.format,
                tone: request.tone,
                idempotency_key: idempotency_key(&headers),
            },
        )
        .await?;

    info!(project_id = %project.id, checkpoint_id = %checkpoint.id, "Generation finished");

    // Reload for the updated active pointer.
    let project = state.engine.get_project(&user.uid, &project.id).await?;
    Ok(Json(GenerateResponse {
        project,
        checkpoint,
    }))
}

/// List the caller's projects.
pub async fn list_projects(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<Vec<Project>>> {
    Ok(Json(state.engine.list_projects(&user.uid).await))
}

#[derive(Serialize)]
pub struct ProjectResponse {
    pub project: Project,
    /// Snapshot the active pointer currently selects
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_checkpoint: Option<Checkpoint>,
}

/// Get a project with its active checkpoint snapshot.
pub async fn get_project(
    State(state): State<AppState>,
    user: AuthUser,
    Path(project_id): Path<String>,
) -> ApiResult<Json<ProjectResponse>> {
    let project = state
        .engine
        .get_project(&user.uid, &ProjectId::from(project_id.as_str()))
        .await?;
    let active_checkpoint = match &project.active_checkpoint_id {
        Some(id) => Some(state.engine.get_checkpoint(&user.uid, id).await?),
        None => None,
    };
    Ok(Json(ProjectResponse {
        project,
        active_checkpoint,
    }))
}

/// List a project's message timeline, oldest first.
pub async fn list_messages(
    State(state): State<AppState>,
    user: AuthUser,
    Path(project_id): Path<String>,
) -> ApiResult<Json<Vec<Message>>> {
    let messages = state
        .engine
        .list_messages(&user.uid, &ProjectId::from(project_id.as_str()))
        .await?;
    Ok(Json(messages))
}

/// Replace one scene with an edited version; produces a new checkpoint.
pub async fn edit_scene(
    State(state): State<AppState>,
    user: AuthUser,
    Path((project_id, scene_id)): Path<(String, String)>,
    Json(scene): Json<Scene>,
) -> ApiResult<Json<Checkpoint>> {
    if scene.id != scene_id {
        return Err(ApiError::bad_request(
            "scene id in body must match the path",
        ));
    }
    let checkpoint = state
        .engine
        .update_scene(&user.uid, &ProjectId::from(project_id.as_str()), scene)
        .await?;
    Ok(Json(checkpoint))
}

/// Regenerate one scene with the content generator.
pub async fn regenerate_scene(
    State(state): State<AppState>,
    user: AuthUser,
    Path((project_id, scene_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> ApiResult<Json<Checkpoint>> {
    let checkpoint = state
        .engine
        .regenerate_scene(
            &user.uid,
            &ProjectId::from(project_id.as_str()),
            &scene_id,
            idempotency_key(&headers).as_deref(),
        )
        .await?;
    Ok(Json(checkpoint))
}

/// Replace the brand kit; produces a new checkpoint.
pub async fn update_brand_kit(
    State(state): State<AppState>,
    user: AuthUser,
    Path(project_id): Path<String>,
    Json(brand_kit): Json<BrandKit>,
) -> ApiResult<Json<Checkpoint>> {
    let checkpoint = state
        .engine
        .update_brand_kit(&user.uid, &ProjectId::from(project_id.as_str()), brand_kit)
        .await?;
    Ok(Json(checkpoint))
}

/// Refresh asset suggestions for every scene; produces a new checkpoint.
pub async fn generate_assets(
    State(state): State<AppState>,
    user: AuthUser,
    Path(project_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<Checkpoint>> {
    let checkpoint = state
        .engine
        .generate_assets(
            &user.uid,
            &ProjectId::from(project_id.as_str()),
            idempotency_key(&headers).as_deref(),
        )
        .await?;
    Ok(Json(checkpoint))
}

/// Point the project back at an earlier checkpoint.
///
/// The response carries the restored checkpoint and the checkpoint id the
/// active pointer moved away from.
pub async fn restore_checkpoint(
    State(state): State<AppState>,
    user: AuthUser,
    Path((project_id, checkpoint_id)): Path<(String, String)>,
) -> ApiResult<Json<RestoreOutcome>> {
    let outcome = state
        .engine
        .restore_checkpoint(
            &user.uid,
            &ProjectId::from(project_id.as_str()),
            &CheckpointId::from(checkpoint_id.as_str()),
        )
        .await?;
    Ok(Json(outcome))
}
