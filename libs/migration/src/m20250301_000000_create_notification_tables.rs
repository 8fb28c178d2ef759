use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(NotificationTemplates::Table)
                    .if_not_exists()
                    .col(pk_uuid(NotificationTemplates::Id))
                    .col(
                        ColumnDef::new(NotificationTemplates::Key)
                            .string_len(128)
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(NotificationTemplates::Channel)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(text_null(NotificationTemplates::Subject))
                    .col(text(NotificationTemplates::Body))
                    .col(text_null(NotificationTemplates::Description))
                    .col(
                        timestamp_with_time_zone(NotificationTemplates::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(NotificationTemplates::UpdatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // template_id is a weak reference: deleting a template keeps its notifications
        manager
            .create_table(
                Table::create()
                    .table(Notifications::Table)
                    .if_not_exists()
                    .col(pk_uuid(Notifications::Id))
                    .col(uuid_null(Notifications::TemplateId))
                    .col(
                        ColumnDef::new(Notifications::Channel)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Notifications::Recipient)
                            .string_len(320)
                            .not_null(),
                    )
                    .col(text_null(Notifications::Subject))
                    .col(text_null(Notifications::Body))
                    .col(json_binary_null(Notifications::Payload))
                    .col(
                        ColumnDef::new(Notifications::Status)
                            .string_len(32)
                            .not_null()
                            .default("queued"),
                    )
                    .col(text_null(Notifications::Error))
                    .col(
                        ColumnDef::new(Notifications::AttemptCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Notifications::MaxAttempts)
                            .integer()
                            .not_null()
                            .default(3),
                    )
                    .col(
                        timestamp_with_time_zone(Notifications::ScheduledFor)
                            .default(Expr::current_timestamp()),
                    )
                    .col(timestamp_with_time_zone_null(Notifications::SentAt))
                    .col(
                        timestamp_with_time_zone(Notifications::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(Notifications::UpdatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_notifications_status")
                    .table(Notifications::Table)
                    .col(Notifications::Status)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_notifications_template_id")
                    .table(Notifications::Table)
                    .col(Notifications::TemplateId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Notifications::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(NotificationTemplates::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum NotificationTemplates {
    Table,
    Id,
    Key,
    Channel,
    Subject,
    Body,
    Description,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Notifications {
    Table,
    Id,
    TemplateId,
    Channel,
    Recipient,
    Subject,
    Body,
    Payload,
    Status,
    Error,
    AttemptCount,
    MaxAttempts,
    ScheduledFor,
    SentAt,
    CreatedAt,
    UpdatedAt,
}
