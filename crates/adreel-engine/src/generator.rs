//! Content generator collaborator.
//!
//! The AI calls themselves are out of scope; the engine only depends on
//! this trait and wraps every call in bounded retry.

use std::collections::HashMap;

use async_trait::async_trait;

use adreel_models::{BrandKit, Scene, Script, Storyboard, VideoFormat};

use crate::error::ExternalError;

/// Input to a full generation from a product URL.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub source_url: String,
    pub format: VideoFormat,
    pub tone: Option<String>,
}

/// Output of a full generation.
#[derive(Debug, Clone)]
pub struct GeneratedContent {
    pub storyboard: Storyboard,
    pub script: Script,
    pub brand_kit: BrandKit,
    /// One-line description for the `generation_result` message
    pub summary: String,
}

/// Opaque producer of storyboards, scripts and brand kits.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// Generate a full storyboard/script/brand-kit from a product URL.
    async fn generate(&self, request: &GenerateRequest) -> Result<GeneratedContent, ExternalError>;

    /// Regenerate a single scene in place. The returned scene replaces the
    /// target; the engine pins its id and leaves every other scene intact.
    async fn regenerate_scene(
        &self,
        storyboard: &Storyboard,
        script: &Script,
        scene: &Scene,
    ) -> Result<Scene, ExternalError>;

    /// Suggest assets per scene id for the given storyboard.
    async fn suggest_assets(
        &self,
        storyboard: &Storyboard,
        brand_kit: &BrandKit,
    ) -> Result<HashMap<String, Vec<String>>, ExternalError>;
}
