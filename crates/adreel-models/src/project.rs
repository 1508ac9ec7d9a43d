//! Project model.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::id::{CheckpointId, ProjectId};

/// A user's ad project.
///
/// `active_checkpoint_id` always points at the most recently
/// created-or-restored checkpoint; render events never move it.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Project {
    /// Unique project ID
    pub id: ProjectId,

    /// Owning user
    pub user_id: String,

    /// Display title
    pub title: String,

    /// Checkpoint the project currently treats as "current"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_checkpoint_id: Option<CheckpointId>,

    /// Optimistic-concurrency stamp, bumped on every active-pointer change
    #[serde(default)]
    pub revision: u64,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Project {
    /// Create a new project owned by `user_id`.
    pub fn new(user_id: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: ProjectId::new(),
            user_id: user_id.into(),
            title: title.into(),
            active_checkpoint_id: None,
            revision: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check ownership.
    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.user_id == user_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_project_has_no_active_checkpoint() {
        let p = Project::new("user-1", "Evercold launch");
        assert!(p.active_checkpoint_id.is_none());
        assert_eq!(p.revision, 0);
        assert!(p.is_owned_by("user-1"));
        assert!(!p.is_owned_by("user-2"));
    }
}
