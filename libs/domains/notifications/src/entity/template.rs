use crate::models::{Channel, CreateTemplate, NotificationTemplate};
use sea_orm::ActiveValue::Set;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Sea-ORM Entity for the notification_templates table
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "notification_templates")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub key: String,
    pub channel: Channel,
    #[sea_orm(column_type = "Text", nullable)]
    pub subject: Option<String>,
    #[sea_orm(column_type = "Text")]
    pub body: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for NotificationTemplate {
    fn from(model: Model) -> Self {
        Self {
            id: model.id,
            key: model.key,
            channel: model.channel,
            subject: model.subject,
            body: model.body,
            description: model.description,
            created_at: model.created_at.into(),
            updated_at: model.updated_at.into(),
        }
    }
}

impl From<CreateTemplate> for ActiveModel {
    fn from(input: CreateTemplate) -> Self {
        let now = chrono::Utc::now();

        ActiveModel {
            id: Set(Uuid::now_v7()),
            key: Set(input.key),
            channel: Set(input.channel),
            subject: Set(input.subject),
            body: Set(input.body),
            description: Set(input.description),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        }
    }
}
