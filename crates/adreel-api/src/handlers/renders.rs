//! Render submission, polling, cancellation and delivery handlers.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use tracing::info;

use adreel_engine::RenderProgress;
use adreel_models::{ProjectId, RenderJob, RenderJobId, RenderStatus, VideoFormat};
use adreel_storage::DeliveryUrl;

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::handlers::idempotency_key;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct SubmitRenderRequest {
    /// Output aspect ratio; defaults to the storyboard's format
    #[serde(default)]
    pub format: Option<VideoFormat>,
}

/// Submit a render of the project's active checkpoint.
pub async fn submit_render(
    State(state): State<AppState>,
    user: AuthUser,
    Path(project_id): Path<String>,
    headers: HeaderMap,
    body: Option<Json<SubmitRenderRequest>>,
) -> ApiResult<Json<RenderJob>> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let job = state
        .engine
        .submit_render(
            &user.uid,
            &ProjectId::from(project_id.as_str()),
            request.format,
            idempotency_key(&headers).as_deref(),
        )
        .await?;
    info!(render_job_id = %job.id, project_id = %job.project_id, "Render submitted");
    Ok(Json(job))
}

/// Poll a render job's status and progress.
pub async fn get_render(
    State(state): State<AppState>,
    user: AuthUser,
    Path(render_id): Path<String>,
) -> ApiResult<Json<RenderProgress>> {
    let progress = state
        .engine
        .get_render_progress(&user.uid, &RenderJobId::from(render_id.as_str()))
        .await?;
    Ok(Json(progress))
}

/// Request cancellation; the worker confirms it on its next poll tick.
pub async fn cancel_render(
    State(state): State<AppState>,
    user: AuthUser,
    Path(render_id): Path<String>,
) -> ApiResult<Json<RenderProgress>> {
    let job = state
        .engine
        .cancel_render(&user.uid, &RenderJobId::from(render_id.as_str()))
        .await?;
    Ok(Json(RenderProgress::from(&job)))
}

/// Mint a short-lived signed download URL for a finished render.
pub async fn get_download_url(
    State(state): State<AppState>,
    user: AuthUser,
    Path(render_id): Path<String>,
) -> ApiResult<Json<DeliveryUrl>> {
    let job = state
        .engine
        .get_render_job(&user.uid, &RenderJobId::from(render_id.as_str()))
        .await?;

    if job.status != RenderStatus::Completed {
        return Err(ApiError::Conflict(format!(
            "render job {} is not completed (status {})",
            job.id, job.status
        )));
    }
    let output_key = job
        .output_s3_key
        .as_deref()
        .ok_or_else(|| ApiError::internal("completed render job has no output key"))?;

    let delivery = state
        .delivery
        .as_ref()
        .ok_or_else(|| ApiError::internal("blob storage is not configured"))?;

    let filename = format!("adreel-{}.mp4", job.id);
    let url = delivery.download_url(output_key, Some(&filename)).await?;
    Ok(Json(url))
}
