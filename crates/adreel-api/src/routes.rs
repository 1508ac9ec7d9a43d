//! API routes.

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;

use crate::handlers::{health, ready};
use crate::handlers::projects::{
    edit_scene, generate, generate_assets, get_project, list_messages, list_projects,
    regenerate_scene, restore_checkpoint, update_brand_kit,
};
use crate::handlers::renders::{cancel_render, get_download_url, get_render, submit_render};
use crate::metrics::metrics_middleware;
use crate::middleware::{cors_layer, request_id, request_logging, security_headers};
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let project_routes = Router::new()
        .route("/projects", get(list_projects))
        .route("/projects/generate", post(generate))
        .route("/projects/:project_id", get(get_project))
        .route("/projects/:project_id/messages", get(list_messages))
        .route("/projects/:project_id/scenes/:scene_id", post(edit_scene))
        .route(
            "/projects/:project_id/scenes/:scene_id/regenerate",
            post(regenerate_scene),
        )
        .route("/projects/:project_id/brand-kit", post(update_brand_kit))
        .route("/projects/:project_id/assets/generate", post(generate_assets))
        .route(
            "/projects/:project_id/checkpoints/:checkpoint_id/restore",
            post(restore_checkpoint),
        )
        .route("/projects/:project_id/renders", post(submit_render));

    let render_routes = Router::new()
        .route("/renders/:render_id", get(get_render))
        .route("/renders/:render_id/cancel", post(cancel_render))
        .route("/renders/:render_id/download-url", get(get_download_url));

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready));

    // Metrics endpoint (if enabled)
    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    Router::new()
        .nest("/api", project_routes.merge(render_routes))
        .merge(health_routes)
        .merge(metrics_routes)
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(request_id))
        .layer(middleware::from_fn(request_logging))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}
