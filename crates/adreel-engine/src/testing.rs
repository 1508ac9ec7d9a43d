//! Deterministic collaborator fakes shared by engine and worker tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use adreel_models::{BrandKit, Scene, Script, ScriptLine, Storyboard, VideoFormat};

use crate::error::ExternalError;
use crate::generator::{ContentGenerator, GenerateRequest, GeneratedContent};
use crate::renderer::{RenderHandle, RenderPoll, Renderer};

/// Scripted content generator.
///
/// Produces the same two-scene storyboard for every request. Can be told
/// to fail its first N calls with a retryable error to exercise backoff.
pub struct FakeGenerator {
    retryable_failures: AtomicU32,
    calls: AtomicU32,
}

impl Default for FakeGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeGenerator {
    pub fn new() -> Self {
        Self {
            retryable_failures: AtomicU32::new(0),
            calls: AtomicU32::new(0),
        }
    }

    /// Fail the first `n` generator calls with a retryable error.
    pub fn failing_first(n: u32) -> Self {
        Self {
            retryable_failures: AtomicU32::new(n),
            calls: AtomicU32::new(0),
        }
    }

    /// Total calls across all trait methods.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn maybe_fail(&self) -> Result<(), ExternalError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.retryable_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.retryable_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(ExternalError::retryable("generator", "simulated timeout"));
        }
        Ok(())
    }

    fn storyboard(format: VideoFormat) -> Storyboard {
        Storyboard {
            version: "1".to_string(),
            format,
            total_duration: 8.0,
            scenes: vec![
                Scene {
                    id: "scene-1".to_string(),
                    duration: 3.0,
                    on_screen_text: "Meet your product".to_string(),
                    voiceover_text: "The product you have been waiting for.".to_string(),
                    asset_suggestions: vec!["product-hero-shot".to_string()],
                },
                Scene {
                    id: "scene-2".to_string(),
                    duration: 5.0,
                    on_screen_text: "Order today".to_string(),
                    voiceover_text: "Order today and see the difference.".to_string(),
                    asset_suggestions: vec!["lifestyle-clip".to_string()],
                },
            ],
        }
    }
}

#[async_trait]
impl ContentGenerator for FakeGenerator {
    async fn generate(&self, request: &GenerateRequest) -> Result<GeneratedContent, ExternalError> {
        self.maybe_fail()?;
        let storyboard = Self::storyboard(request.format);
        let script = Script {
            version: "1".to_string(),
            tone: request.tone.clone(),
            lines: storyboard
                .scenes
                .iter()
                .map(|s| ScriptLine {
                    scene_id: s.id.clone(),
                    voiceover: s.voiceover_text.clone(),
                })
                .collect(),
        };
        let brand_kit = BrandKit {
            version: "1".to_string(),
            product_name: "Fake Product".to_string(),
            tagline: Some("Tested daily.".to_string()),
            palette: vec!["#112233".to_string()],
            font: "Inter".to_string(),
            logo_key: None,
        };
        Ok(GeneratedContent {
            storyboard,
            script,
            brand_kit,
            summary: format!("Generated a {}-scene ad from {}", 2, request.source_url),
        })
    }

    async fn regenerate_scene(
        &self,
        _storyboard: &Storyboard,
        _script: &Script,
        scene: &Scene,
    ) -> Result<Scene, ExternalError> {
        self.maybe_fail()?;
        Ok(Scene {
            id: scene.id.clone(),
            duration: scene.duration,
            on_screen_text: format!("{} (take 2)", scene.on_screen_text),
            voiceover_text: format!("{} Again, but better.", scene.voiceover_text),
            asset_suggestions: scene.asset_suggestions.clone(),
        })
    }

    async fn suggest_assets(
        &self,
        storyboard: &Storyboard,
        _brand_kit: &BrandKit,
    ) -> Result<HashMap<String, Vec<String>>, ExternalError> {
        self.maybe_fail()?;
        Ok(storyboard
            .scenes
            .iter()
            .map(|s| {
                (
                    s.id.clone(),
                    vec![format!("stock/{}-a.mp4", s.id), format!("stock/{}-b.mp4", s.id)],
                )
            })
            .collect())
    }
}

/// Scripted renderer.
///
/// Each poll advances progress by a fixed share until `ticks_to_complete`
/// polls have been observed; `failing_at` injects a fatal error on the
/// given poll instead.
pub struct FakeRenderer {
    ticks_to_complete: u32,
    fatal_at: Option<u32>,
    polls: Mutex<HashMap<String, u32>>,
    submissions: AtomicU32,
}

impl FakeRenderer {
    pub fn completing_after(ticks: u32) -> Self {
        Self {
            ticks_to_complete: ticks.max(1),
            fatal_at: None,
            polls: Mutex::new(HashMap::new()),
            submissions: AtomicU32::new(0),
        }
    }

    pub fn failing_at(tick: u32) -> Self {
        Self {
            ticks_to_complete: u32::MAX,
            fatal_at: Some(tick.max(1)),
            polls: Mutex::new(HashMap::new()),
            submissions: AtomicU32::new(0),
        }
    }

    pub fn submissions(&self) -> u32 {
        self.submissions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Renderer for FakeRenderer {
    async fn submit(
        &self,
        _storyboard: &Storyboard,
        _brand_kit: &BrandKit,
        _format: VideoFormat,
    ) -> Result<RenderHandle, ExternalError> {
        let n = self.submissions.fetch_add(1, Ordering::SeqCst);
        Ok(RenderHandle(format!("fake-render-{}", n)))
    }

    async fn poll(&self, handle: &RenderHandle) -> Result<RenderPoll, ExternalError> {
        let mut polls = self.polls.lock().unwrap_or_else(|e| e.into_inner());
        let count = polls.entry(handle.0.clone()).or_insert(0);
        *count += 1;
        let count = *count;
        drop(polls);

        if self.fatal_at.is_some_and(|at| count >= at) {
            return Ok(RenderPoll {
                overall_progress: 0.0,
                done: false,
                fatal_error: Some("simulated renderer failure".to_string()),
            });
        }

        let done = count >= self.ticks_to_complete;
        let progress = if done {
            1.0
        } else {
            count as f32 / self.ticks_to_complete as f32
        };
        Ok(RenderPoll {
            overall_progress: progress,
            done,
            fatal_error: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fake_generator_output_validates() {
        let generator = FakeGenerator::new();
        let content = generator
            .generate(&GenerateRequest {
                source_url: "https://shop.example/x".to_string(),
                format: VideoFormat::Vertical,
                tone: Some("energetic".to_string()),
            })
            .await
            .unwrap();
        assert!(content.storyboard.validate().is_ok());
        assert!(content.script.validate().is_ok());
        assert!(content.brand_kit.validate().is_ok());
    }

    #[tokio::test]
    async fn test_fake_renderer_completes() {
        let renderer = FakeRenderer::completing_after(2);
        let handle = renderer
            .submit(
                &FakeGenerator::storyboard(VideoFormat::Vertical),
                &BrandKit {
                    version: "1".to_string(),
                    product_name: "X".to_string(),
                    tagline: None,
                    palette: vec![],
                    font: "Inter".to_string(),
                    logo_key: None,
                },
                VideoFormat::Vertical,
            )
            .await
            .unwrap();
        let first = renderer.poll(&handle).await.unwrap();
        assert!(!first.done);
        let second = renderer.poll(&handle).await.unwrap();
        assert!(second.done);
        assert_eq!(second.overall_progress, 1.0);
    }
}
