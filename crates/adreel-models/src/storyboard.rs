//! Storyboard and scene models.
//!
//! A storyboard is the format-agnostic structured plan of scenes for a
//! generated video ad. The duration-sum invariant
//! (`total_duration == sum(scenes[].duration)`) is enforced at write time.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::validation::{require_version, ValidationError, Violations};

/// Tolerance for comparing floating-point second totals.
const DURATION_EPSILON: f64 = 1e-6;

/// Output aspect ratio for a render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
pub enum VideoFormat {
    /// Square (feed placements)
    #[serde(rename = "1:1")]
    Square,
    /// Vertical (stories, reels, shorts)
    #[default]
    #[serde(rename = "9:16")]
    Vertical,
    /// Widescreen
    #[serde(rename = "16:9")]
    Widescreen,
}

impl VideoFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoFormat::Square => "1:1",
            VideoFormat::Vertical => "9:16",
            VideoFormat::Widescreen => "16:9",
        }
    }
}

impl fmt::Display for VideoFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for VideoFormat {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1:1" => Ok(VideoFormat::Square),
            "9:16" => Ok(VideoFormat::Vertical),
            "16:9" => Ok(VideoFormat::Widescreen),
            other => Err(ValidationError::single(
                "format",
                format!("unsupported format '{}', expected 1:1, 9:16 or 16:9", other),
            )),
        }
    }
}

/// A single scene of a storyboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Scene {
    /// Stable scene identifier, unique within the storyboard
    pub id: String,

    /// Scene duration in seconds (must be > 0)
    pub duration: f64,

    /// Text overlaid on screen
    pub on_screen_text: String,

    /// Voiceover line for the scene
    pub voiceover_text: String,

    /// Suggested assets (stock clips, product shots, etc.)
    #[serde(default)]
    pub asset_suggestions: Vec<String>,
}

/// The structured plan of scenes for a generated video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Storyboard {
    /// Payload schema version
    pub version: String,

    /// Target aspect ratio
    pub format: VideoFormat,

    /// Total duration in seconds; must equal the sum of scene durations
    pub total_duration: f64,

    /// Ordered scenes
    pub scenes: Vec<Scene>,
}

impl Storyboard {
    /// Sum of the scene durations.
    pub fn scene_duration_sum(&self) -> f64 {
        self.scenes.iter().map(|s| s.duration).sum()
    }

    /// Recompute `total_duration` from the scenes.
    pub fn recompute_total(&mut self) {
        self.total_duration = self.scene_duration_sum();
    }

    /// Look up a scene by id.
    pub fn scene(&self, scene_id: &str) -> Option<&Scene> {
        self.scenes.iter().find(|s| s.id == scene_id)
    }

    /// Produce a new storyboard with exactly one scene replaced by id.
    ///
    /// Every other scene is left untouched (order, id and all fields) and
    /// `total_duration` is recomputed. Returns `None` when no scene has the
    /// given id.
    pub fn with_scene_replaced(&self, updated: Scene) -> Option<Storyboard> {
        if self.scene(&updated.id).is_none() {
            return None;
        }
        let mut next = self.clone();
        for slot in next.scenes.iter_mut() {
            if slot.id == updated.id {
                *slot = updated;
                break;
            }
        }
        next.recompute_total();
        Some(next)
    }

    /// Validate the storyboard, reporting every offending field.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut v = Violations::new();
        require_version(&mut v, &self.version);
        v.check(!self.scenes.is_empty(), "scenes", "must not be empty");

        let mut seen = HashSet::new();
        for (i, scene) in self.scenes.iter().enumerate() {
            let path = |field: &str| format!("scenes[{}].{}", i, field);
            v.check(!scene.id.trim().is_empty(), path("id"), "must be non-empty");
            v.check(
                scene.duration.is_finite() && scene.duration > 0.0,
                path("duration"),
                "must be greater than zero",
            );
            if !seen.insert(scene.id.clone()) {
                v.push(path("id"), format!("duplicate scene id '{}'", scene.id));
            }
        }

        let sum = self.scene_duration_sum();
        v.check(
            (self.total_duration - sum).abs() <= DURATION_EPSILON,
            "total_duration",
            format!("must equal sum of scene durations ({:.3})", sum),
        );

        v.finish()
    }
}
