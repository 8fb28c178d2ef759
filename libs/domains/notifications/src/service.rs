//! Notification service: validates requests, snapshots template content,
//! persists notifications and submits delivery jobs.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use stream_worker::{BackoffPolicy, JobOptions};
use tracing::{debug, info, warn};
use uuid::Uuid;
use validator::{Validate, ValidateEmail};

use crate::error::{NotificationError, NotificationResult};
use crate::models::{
    Channel, EnqueueNotification, NewNotification, Notification, NotificationJob,
    NotificationUpdate, delay_until,
};
use crate::queue::NotificationQueue;
use crate::repository::{NotificationRepository, TemplateRepository};
use crate::templates::TemplateRegistry;

/// Default base unit of the exponential retry backoff.
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(1);

/// Service layer for notification lifecycle
pub struct NotificationService<R: NotificationRepository, T: TemplateRepository> {
    notifications: Arc<R>,
    templates: TemplateRegistry<T>,
    queue: Arc<dyn NotificationQueue>,
    backoff_base: Duration,
}

impl<R: NotificationRepository, T: TemplateRepository> Clone for NotificationService<R, T> {
    fn clone(&self) -> Self {
        Self {
            notifications: Arc::clone(&self.notifications),
            templates: self.templates.clone(),
            queue: Arc::clone(&self.queue),
            backoff_base: self.backoff_base,
        }
    }
}

impl<R: NotificationRepository, T: TemplateRepository> NotificationService<R, T> {
    pub fn new(
        notifications: R,
        templates: TemplateRegistry<T>,
        queue: Arc<dyn NotificationQueue>,
    ) -> Self {
        Self {
            notifications: Arc::new(notifications),
            templates,
            queue,
            backoff_base: DEFAULT_BACKOFF_BASE,
        }
    }

    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    pub fn templates(&self) -> &TemplateRegistry<T> {
        &self.templates
    }

    /// Validate, resolve content, persist a queued notification and submit
    /// exactly one delivery job for it.
    ///
    /// If persisting succeeds but the queue rejects the job, the record stays
    /// queued and the queue error is returned.
    pub async fn enqueue(&self, input: EnqueueNotification) -> NotificationResult<Notification> {
        input.validate()?;
        Self::validate_recipient(input.channel, &input.recipient)?;

        let template = match input.template_key.as_deref() {
            Some(key) => Some(self.templates.get_template_by_key(key).await?),
            None => None,
        };

        let explicit_subject = non_blank(input.subject.clone());
        let explicit_body = non_blank(input.body.clone());

        let subject =
            explicit_subject.or_else(|| template.as_ref().and_then(|t| t.subject.clone()));
        let body = explicit_body.or_else(|| template.as_ref().map(|t| t.body.clone()));

        let Some(body) = body else {
            return Err(NotificationError::Validation(
                "either template_key or body is required".to_string(),
            ));
        };

        let max_attempts = input.effective_max_attempts();
        let scheduled_for = input.scheduled_for.unwrap_or_else(Utc::now);

        let notification = self
            .notifications
            .create(NewNotification {
                template_id: template.as_ref().map(|t| t.id),
                channel: input.channel,
                recipient: input.recipient.trim().to_string(),
                subject,
                body: Some(body),
                payload: input.payload,
                max_attempts,
                scheduled_for,
            })
            .await?;

        let opts = JobOptions::default()
            .with_delay(delay_until(scheduled_for, Utc::now()))
            .with_attempts(max_attempts)
            .with_backoff(BackoffPolicy::exponential(self.backoff_base))
            .with_remove_on_complete(true)
            .with_remove_on_fail(false);

        let job_id = self
            .queue
            .enqueue(NotificationJob::new(notification.id), opts)
            .await
            .inspect_err(|e| {
                warn!(
                    notification_id = %notification.id,
                    error = %e,
                    "Notification persisted but could not be queued"
                );
            })?;

        info!(
            notification_id = %notification.id,
            job_id = %job_id,
            channel = %notification.channel,
            max_attempts,
            scheduled_for = %notification.scheduled_for,
            "Queued notification"
        );

        Ok(notification)
    }

    /// Get a notification by ID
    pub async fn get_notification(&self, id: Uuid) -> NotificationResult<Notification> {
        self.notifications
            .get_by_id(id)
            .await?
            .ok_or(NotificationError::NotificationNotFound(id))
    }

    /// Count one delivery attempt, capped at `max_attempts`
    pub async fn increment_attempt(&self, id: Uuid) -> NotificationResult<Notification> {
        let notification = self.notifications.increment_attempt(id).await?;
        debug!(
            notification_id = %id,
            attempt = notification.attempt_count,
            max_attempts = notification.max_attempts,
            "Recorded delivery attempt"
        );
        Ok(notification)
    }

    pub async fn mark_as_delivered(&self, id: Uuid) -> NotificationResult<Notification> {
        let notification = self
            .notifications
            .update(id, NotificationUpdate::delivered(Utc::now()))
            .await?;
        info!(notification_id = %id, attempt = notification.attempt_count, "Notification delivered");
        Ok(notification)
    }

    pub async fn mark_as_failed(&self, id: Uuid, message: &str) -> NotificationResult<Notification> {
        let notification = self
            .notifications
            .update(id, NotificationUpdate::failed(message))
            .await?;
        warn!(
            notification_id = %id,
            attempt = notification.attempt_count,
            max_attempts = notification.max_attempts,
            error = %message,
            "Notification delivery failed"
        );
        Ok(notification)
    }

    fn validate_recipient(channel: Channel, recipient: &str) -> NotificationResult<()> {
        let recipient = recipient.trim();
        if recipient.is_empty() {
            return Err(NotificationError::Validation(
                "recipient must not be empty".to_string(),
            ));
        }

        match channel {
            Channel::Email if !recipient.validate_email() => Err(NotificationError::Validation(
                format!("'{}' is not a valid email address", recipient),
            )),
            Channel::Email => Ok(()),
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
