use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{NotificationError, NotificationResult};
use crate::models::{
    CreateTemplate, NewNotification, Notification, NotificationTemplate, NotificationUpdate,
    UpdateTemplate,
};

/// Repository trait for Notification persistence
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    /// Persist a new notification in the queued state
    async fn create(&self, input: NewNotification) -> NotificationResult<Notification>;

    /// Get a notification by ID
    async fn get_by_id(&self, id: Uuid) -> NotificationResult<Option<Notification>>;

    /// Apply a partial update to the outcome fields
    async fn update(&self, id: Uuid, update: NotificationUpdate)
    -> NotificationResult<Notification>;

    /// Atomically add one to `attempt_count`, never exceeding `max_attempts`
    async fn increment_attempt(&self, id: Uuid) -> NotificationResult<Notification>;
}

/// Repository trait for NotificationTemplate persistence
#[async_trait]
pub trait TemplateRepository: Send + Sync {
    /// Create a template; fails with `Conflict` when the key is taken
    async fn create(&self, input: CreateTemplate) -> NotificationResult<NotificationTemplate>;

    async fn get_by_id(&self, id: Uuid) -> NotificationResult<Option<NotificationTemplate>>;

    async fn get_by_key(&self, key: &str) -> NotificationResult<Option<NotificationTemplate>>;

    /// All templates ordered by key
    async fn list(&self) -> NotificationResult<Vec<NotificationTemplate>>;

    async fn update(
        &self,
        id: Uuid,
        input: UpdateTemplate,
    ) -> NotificationResult<NotificationTemplate>;

    /// Returns `false` when nothing was deleted
    async fn delete(&self, id: Uuid) -> NotificationResult<bool>;
}

/// In-memory implementation of NotificationRepository (for development/testing)
#[derive(Debug, Default, Clone)]
pub struct InMemoryNotificationRepository {
    notifications: Arc<RwLock<HashMap<Uuid, Notification>>>,
}

impl InMemoryNotificationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored notification, oldest first
    pub async fn all(&self) -> Vec<Notification> {
        let notifications = self.notifications.read().await;
        let mut result: Vec<Notification> = notifications.values().cloned().collect();
        result.sort_by_key(|n| n.id);
        result
    }
}

#[async_trait]
impl NotificationRepository for InMemoryNotificationRepository {
    async fn create(&self, input: NewNotification) -> NotificationResult<Notification> {
        let notification = Notification::new(input);
        self.notifications
            .write()
            .await
            .insert(notification.id, notification.clone());

        tracing::debug!(notification_id = %notification.id, "Created notification");
        Ok(notification)
    }

    async fn get_by_id(&self, id: Uuid) -> NotificationResult<Option<Notification>> {
        let notifications = self.notifications.read().await;
        Ok(notifications.get(&id).cloned())
    }

    async fn update(
        &self,
        id: Uuid,
        update: NotificationUpdate,
    ) -> NotificationResult<Notification> {
        let mut notifications = self.notifications.write().await;
        let notification = notifications
            .get_mut(&id)
            .ok_or(NotificationError::NotificationNotFound(id))?;

        notification.apply_update(update);
        Ok(notification.clone())
    }

    async fn increment_attempt(&self, id: Uuid) -> NotificationResult<Notification> {
        let mut notifications = self.notifications.write().await;
        let notification = notifications
            .get_mut(&id)
            .ok_or(NotificationError::NotificationNotFound(id))?;

        notification.increment_attempt();
        Ok(notification.clone())
    }
}

/// In-memory implementation of TemplateRepository (for development/testing)
#[derive(Debug, Default, Clone)]
pub struct InMemoryTemplateRepository {
    templates: Arc<RwLock<HashMap<Uuid, NotificationTemplate>>>,
}

impl InMemoryTemplateRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TemplateRepository for InMemoryTemplateRepository {
    async fn create(&self, input: CreateTemplate) -> NotificationResult<NotificationTemplate> {
        // Checked under the write lock so concurrent creates with one key yield one winner
        let mut templates = self.templates.write().await;

        if templates.values().any(|t| t.key == input.key) {
            return Err(NotificationError::Conflict(format!(
                "Template with key '{}' already exists",
                input.key
            )));
        }

        let template = NotificationTemplate::new(input);
        templates.insert(template.id, template.clone());

        tracing::info!(template_id = %template.id, key = %template.key, "Created template");
        Ok(template)
    }

    async fn get_by_id(&self, id: Uuid) -> NotificationResult<Option<NotificationTemplate>> {
        let templates = self.templates.read().await;
        Ok(templates.get(&id).cloned())
    }

    async fn get_by_key(&self, key: &str) -> NotificationResult<Option<NotificationTemplate>> {
        let templates = self.templates.read().await;
        Ok(templates.values().find(|t| t.key == key).cloned())
    }

    async fn list(&self) -> NotificationResult<Vec<NotificationTemplate>> {
        let templates = self.templates.read().await;
        let mut result: Vec<NotificationTemplate> = templates.values().cloned().collect();
        result.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(result)
    }

    async fn update(
        &self,
        id: Uuid,
        input: UpdateTemplate,
    ) -> NotificationResult<NotificationTemplate> {
        let mut templates = self.templates.write().await;
        let template = templates
            .get_mut(&id)
            .ok_or_else(|| NotificationError::TemplateNotFound(id.to_string()))?;

        template.apply_update(input);

        tracing::info!(template_id = %id, "Updated template");
        Ok(template.clone())
    }

    async fn delete(&self, id: Uuid) -> NotificationResult<bool> {
        let mut templates = self.templates.write().await;

        if templates.remove(&id).is_some() {
            tracing::info!(template_id = %id, "Deleted template");
            Ok(true)
        } else {
            Ok(false)
        }
    }
}
