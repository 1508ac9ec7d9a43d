//! Append-only message timeline.

use std::sync::Arc;

use tracing::debug;

use adreel_models::{Message, MessageContent, MessageRole, ProjectId};
use adreel_store::MemoryStore;

use crate::error::EngineResult;

/// Append/list access to a project's history.
///
/// Every payload is validated against its variant schema before it is
/// persisted; an unknown or missing `version` is a hard failure.
#[derive(Clone)]
pub struct Timeline {
    store: Arc<MemoryStore>,
}

impl Timeline {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }

    /// Validate and append one message.
    pub async fn append(
        &self,
        project_id: ProjectId,
        role: MessageRole,
        content: MessageContent,
    ) -> EngineResult<Message> {
        content.validate()?;
        let message = Message::new(project_id, role, content);
        let message = self.store.append_message(message).await?;
        debug!(
            message_id = %message.id,
            project_id = %message.project_id,
            message_type = %message.message_type(),
            "Appended timeline message"
        );
        Ok(message)
    }

    /// All messages for a project, ascending by `created_at`, ties broken
    /// by insertion order. Fails if the project does not exist.
    pub async fn list(&self, project_id: &ProjectId) -> EngineResult<Vec<Message>> {
        self.store.get_project(project_id).await?;
        Ok(self.store.list_messages(project_id).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adreel_models::{Project, VideoFormat, MESSAGE_SCHEMA_VERSION};

    #[tokio::test]
    async fn test_append_rejects_invalid_payload() {
        let store = Arc::new(MemoryStore::new());
        let project = store
            .insert_project(Project::new("u1", "Test"))
            .await
            .unwrap();
        let timeline = Timeline::new(store);

        let err = timeline
            .append(
                project.id.clone(),
                MessageRole::User,
                MessageContent::UrlSubmitted {
                    version: "".to_string(),
                    artifact_refs: vec![],
                    url: "https://shop.example/x".to_string(),
                    format: VideoFormat::Vertical,
                    tone: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, crate::EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn test_append_and_list() {
        let store = Arc::new(MemoryStore::new());
        let project = store
            .insert_project(Project::new("u1", "Test"))
            .await
            .unwrap();
        let timeline = Timeline::new(store);

        timeline
            .append(
                project.id.clone(),
                MessageRole::User,
                MessageContent::UrlSubmitted {
                    version: MESSAGE_SCHEMA_VERSION.to_string(),
                    artifact_refs: vec![],
                    url: "https://shop.example/x".to_string(),
                    format: VideoFormat::Vertical,
                    tone: None,
                },
            )
            .await
            .unwrap();

        let messages = timeline.list(&project.id).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].message_type().as_str(), "url_submitted");
    }

    #[tokio::test]
    async fn test_list_unknown_project_fails() {
        let timeline = Timeline::new(Arc::new(MemoryStore::new()));
        assert!(timeline.list(&ProjectId::from("ghost")).await.is_err());
    }
}
