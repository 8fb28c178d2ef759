use async_trait::async_trait;
use chrono::Utc;
use sea_orm::ActiveValue::Set;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    SqlErr,
};
use uuid::Uuid;

use crate::{
    entity::{notification, template},
    error::{NotificationError, NotificationResult},
    models::{
        CreateTemplate, NewNotification, Notification, NotificationTemplate, NotificationUpdate,
        UpdateTemplate,
    },
    repository::{NotificationRepository, TemplateRepository},
};

pub struct PgNotificationRepository {
    db: DatabaseConnection,
}

impl PgNotificationRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    async fn fetch(&self, id: Uuid) -> NotificationResult<Notification> {
        notification::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .map(Into::into)
            .ok_or(NotificationError::NotificationNotFound(id))
    }
}

#[async_trait]
impl NotificationRepository for PgNotificationRepository {
    async fn create(&self, input: NewNotification) -> NotificationResult<Notification> {
        let active_model: notification::ActiveModel = input.into();
        let model = active_model.insert(&self.db).await?;

        tracing::debug!(notification_id = %model.id, "Created notification");
        Ok(model.into())
    }

    async fn get_by_id(&self, id: Uuid) -> NotificationResult<Option<Notification>> {
        let model = notification::Entity::find_by_id(id).one(&self.db).await?;
        Ok(model.map(Into::into))
    }

    async fn update(
        &self,
        id: Uuid,
        update: NotificationUpdate,
    ) -> NotificationResult<Notification> {
        let mut query = notification::Entity::update_many()
            .col_expr(notification::Column::UpdatedAt, Expr::current_timestamp())
            .filter(notification::Column::Id.eq(id));

        if let Some(status) = update.status {
            query = query.col_expr(notification::Column::Status, Expr::value(status.to_string()));
        }
        if let Some(error) = update.error {
            query = query.col_expr(notification::Column::Error, Expr::value(error));
        }
        if let Some(sent_at) = update.sent_at {
            query = query.col_expr(notification::Column::SentAt, Expr::value(sent_at));
        }

        let result = query.exec(&self.db).await?;
        if result.rows_affected == 0 {
            return Err(NotificationError::NotificationNotFound(id));
        }

        self.fetch(id).await
    }

    async fn increment_attempt(&self, id: Uuid) -> NotificationResult<Notification> {
        // Single statement so concurrent increments cannot pass max_attempts
        let result = notification::Entity::update_many()
            .col_expr(
                notification::Column::AttemptCount,
                Expr::cust("LEAST(attempt_count + 1, max_attempts)"),
            )
            .col_expr(notification::Column::UpdatedAt, Expr::current_timestamp())
            .filter(notification::Column::Id.eq(id))
            .exec(&self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(NotificationError::NotificationNotFound(id));
        }

        self.fetch(id).await
    }
}

pub struct PgTemplateRepository {
    db: DatabaseConnection,
}

impl PgTemplateRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TemplateRepository for PgTemplateRepository {
    async fn create(&self, input: CreateTemplate) -> NotificationResult<NotificationTemplate> {
        let key = input.key.clone();
        let active_model: template::ActiveModel = input.into();

        let model = active_model.insert(&self.db).await.map_err(|e| {
            if let Some(SqlErr::UniqueConstraintViolation(_)) = e.sql_err() {
                NotificationError::Conflict(format!("Template with key '{}' already exists", key))
            } else {
                NotificationError::from(e)
            }
        })?;

        tracing::info!(template_id = %model.id, key = %model.key, "Created template");
        Ok(model.into())
    }

    async fn get_by_id(&self, id: Uuid) -> NotificationResult<Option<NotificationTemplate>> {
        let model = template::Entity::find_by_id(id).one(&self.db).await?;
        Ok(model.map(Into::into))
    }

    async fn get_by_key(&self, key: &str) -> NotificationResult<Option<NotificationTemplate>> {
        let model = template::Entity::find()
            .filter(template::Column::Key.eq(key))
            .one(&self.db)
            .await?;
        Ok(model.map(Into::into))
    }

    async fn list(&self) -> NotificationResult<Vec<NotificationTemplate>> {
        let models = template::Entity::find()
            .order_by_asc(template::Column::Key)
            .all(&self.db)
            .await?;

        Ok(models.into_iter().map(Into::into).collect())
    }

    async fn update(
        &self,
        id: Uuid,
        input: UpdateTemplate,
    ) -> NotificationResult<NotificationTemplate> {
        let model = template::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or_else(|| NotificationError::TemplateNotFound(id.to_string()))?;

        let mut active_model: template::ActiveModel = model.into();
        if let Some(channel) = input.channel {
            active_model.channel = Set(channel);
        }
        if let Some(subject) = input.subject {
            active_model.subject = Set(Some(subject));
        }
        if let Some(body) = input.body {
            active_model.body = Set(body);
        }
        if let Some(description) = input.description {
            active_model.description = Set(Some(description));
        }
        active_model.updated_at = Set(Utc::now().into());

        let updated = active_model.update(&self.db).await?;

        tracing::info!(template_id = %id, "Updated template");
        Ok(updated.into())
    }

    async fn delete(&self, id: Uuid) -> NotificationResult<bool> {
        let result = template::Entity::delete_by_id(id).exec(&self.db).await?;

        if result.rows_affected > 0 {
            tracing::info!(template_id = %id, "Deleted template");
            Ok(true)
        } else {
            Ok(false)
        }
    }
}
