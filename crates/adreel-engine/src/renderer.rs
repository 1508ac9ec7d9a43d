//! Renderer collaborator.
//!
//! The compositing engine is out of scope; the worker drives it through
//! this trait, one poll at a time.

use async_trait::async_trait;

use adreel_models::{BrandKit, Storyboard, VideoFormat};

use crate::error::ExternalError;

/// Opaque handle to an in-flight render on the external renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderHandle(pub String);

/// One observation of render progress.
#[derive(Debug, Clone)]
pub struct RenderPoll {
    /// 0.0 ..= 1.0
    pub overall_progress: f32,
    pub done: bool,
    /// Set when the renderer gave up; terminal.
    pub fatal_error: Option<String>,
}

/// Opaque video renderer.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Submit a storyboard for rendering; returns a handle to poll.
    async fn submit(
        &self,
        storyboard: &Storyboard,
        brand_kit: &BrandKit,
        format: VideoFormat,
    ) -> Result<RenderHandle, ExternalError>;

    /// Poll progress for a previously submitted render.
    async fn poll(&self, handle: &RenderHandle) -> Result<RenderPoll, ExternalError>;
}
