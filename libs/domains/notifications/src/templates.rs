//! Template Registry: keyed store of reusable message content.
//!
//! Templates are only read when a notification is created. Their content is
//! copied onto the notification, so editing or deleting a template never
//! changes notifications that already exist.

use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::error::{NotificationError, NotificationResult};
use crate::models::{CreateTemplate, NotificationTemplate, UpdateTemplate};
use crate::repository::TemplateRepository;

/// Validating front for a `TemplateRepository`
pub struct TemplateRegistry<T: TemplateRepository> {
    repository: Arc<T>,
}

impl<T: TemplateRepository> Clone for TemplateRegistry<T> {
    fn clone(&self) -> Self {
        Self {
            repository: Arc::clone(&self.repository),
        }
    }
}

impl<T: TemplateRepository> TemplateRegistry<T> {
    pub fn new(repository: T) -> Self {
        Self::from_arc(Arc::new(repository))
    }

    pub fn from_arc(repository: Arc<T>) -> Self {
        Self { repository }
    }

    /// Create a template. Fails with `Conflict` if the key exists.
    pub async fn create_template(
        &self,
        input: CreateTemplate,
    ) -> NotificationResult<NotificationTemplate> {
        input.validate()?;
        if input.key.trim().is_empty() {
            return Err(NotificationError::Validation("key must not be blank".to_string()));
        }
        if input.body.trim().is_empty() {
            return Err(NotificationError::Validation("body must not be blank".to_string()));
        }

        self.repository.create(input).await
    }

    pub async fn update_template(
        &self,
        id: Uuid,
        input: UpdateTemplate,
    ) -> NotificationResult<NotificationTemplate> {
        input.validate()?;
        if input.body.as_deref().is_some_and(|b| b.trim().is_empty()) {
            return Err(NotificationError::Validation("body must not be blank".to_string()));
        }

        self.repository.update(id, input).await
    }

    /// Snapshot of all templates, ordered by key
    pub async fn list_templates(&self) -> NotificationResult<Vec<NotificationTemplate>> {
        self.repository.list().await
    }

    /// Delete a template. Notifications created from it are left alone.
    pub async fn delete_template(&self, id: Uuid) -> NotificationResult<()> {
        if !self.repository.delete(id).await? {
            return Err(NotificationError::TemplateNotFound(id.to_string()));
        }
        Ok(())
    }

    pub async fn get_template(&self, id: Uuid) -> NotificationResult<NotificationTemplate> {
        self.repository
            .get_by_id(id)
            .await?
            .ok_or_else(|| NotificationError::TemplateNotFound(id.to_string()))
    }

    pub async fn get_template_by_key(&self, key: &str) -> NotificationResult<NotificationTemplate> {
        self.repository
            .get_by_key(key)
            .await?
            .ok_or_else(|| NotificationError::TemplateNotFound(key.to_string()))
    }
}
