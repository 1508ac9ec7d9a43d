//! Ad script model.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::validation::{require_version, ValidationError, Violations};

/// One voiceover line, tied to a storyboard scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ScriptLine {
    /// Scene this line belongs to
    pub scene_id: String,
    /// Voiceover copy
    pub voiceover: String,
}

/// The generated ad script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Script {
    /// Payload schema version
    pub version: String,

    /// Overall tone (e.g. "energetic", "premium")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tone: Option<String>,

    /// Lines in scene order
    pub lines: Vec<ScriptLine>,
}

impl Script {
    /// Validate the script, reporting every offending field.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut v = Violations::new();
        require_version(&mut v, &self.version);
        for (i, line) in self.lines.iter().enumerate() {
            v.check(
                !line.scene_id.trim().is_empty(),
                format!("lines[{}].scene_id", i),
                "must be non-empty",
            );
        }
        v.finish()
    }
}
