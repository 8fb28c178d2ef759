use crate::models::{Channel, NewNotification, Notification, NotificationStatus, OpaquePayload};
use sea_orm::ActiveValue::Set;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Sea-ORM Entity for the notifications table
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "notifications")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub template_id: Option<Uuid>,
    pub channel: Channel,
    pub recipient: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub subject: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub body: Option<String>,
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub payload: Option<Json>,
    pub status: NotificationStatus,
    #[sea_orm(column_type = "Text", nullable)]
    pub error: Option<String>,
    pub attempt_count: i32,
    pub max_attempts: i32,
    pub scheduled_for: DateTimeWithTimeZone,
    pub sent_at: Option<DateTimeWithTimeZone>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for Notification {
    fn from(model: Model) -> Self {
        Self {
            id: model.id,
            template_id: model.template_id,
            channel: model.channel,
            recipient: model.recipient,
            subject: model.subject,
            body: model.body,
            payload: model.payload.map(OpaquePayload::new),
            status: model.status,
            error: model.error,
            attempt_count: model.attempt_count.max(0) as u32,
            max_attempts: model.max_attempts.max(0) as u32,
            scheduled_for: model.scheduled_for.into(),
            sent_at: model.sent_at.map(Into::into),
            created_at: model.created_at.into(),
            updated_at: model.updated_at.into(),
        }
    }
}

impl From<NewNotification> for ActiveModel {
    fn from(input: NewNotification) -> Self {
        let now = chrono::Utc::now();

        ActiveModel {
            id: Set(Uuid::now_v7()),
            template_id: Set(input.template_id),
            channel: Set(input.channel),
            recipient: Set(input.recipient),
            subject: Set(input.subject),
            body: Set(input.body),
            payload: Set(input.payload.map(OpaquePayload::into_value)),
            status: Set(NotificationStatus::Queued),
            error: Set(None),
            attempt_count: Set(0),
            max_attempts: Set(input.max_attempts as i32),
            scheduled_for: Set(input.scheduled_for.into()),
            sent_at: Set(None),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        }
    }
}
