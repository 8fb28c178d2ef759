//! Delivery processor for the dispatch stream.
//!
//! `DeliveryProcessor` implements `StreamProcessor<NotificationJob>`: it drives
//! one delivery attempt per job and records the outcome on the notification.
//! Retry timing belongs to the queue, which only sees a retryable error.

use crate::error::{NotificationError, NotificationResult};
use crate::models::{Notification, NotificationJob};
use crate::providers::{OutboundMessage, ProviderRegistry, SendReceipt};
use crate::repository::{NotificationRepository, TemplateRepository};
use crate::service::NotificationService;
use async_trait::async_trait;
use std::sync::Arc;
use stream_worker::{StreamError, StreamProcessor};
use tracing::{debug, error, info, warn};

/// Sends notifications through the provider registered for their channel.
pub struct DeliveryProcessor<R: NotificationRepository, T: TemplateRepository> {
    service: Arc<NotificationService<R, T>>,
    providers: Arc<ProviderRegistry>,
}

impl<R: NotificationRepository, T: TemplateRepository> DeliveryProcessor<R, T> {
    pub fn new(service: Arc<NotificationService<R, T>>, providers: ProviderRegistry) -> Self {
        Self {
            service,
            providers: Arc::new(providers),
        }
    }

    async fn deliver(&self, notification: &Notification) -> NotificationResult<SendReceipt> {
        let provider = self
            .providers
            .get(notification.channel)
            .ok_or(NotificationError::UnsupportedChannel(notification.channel))?;

        let message = OutboundMessage::new(&notification.recipient, notification.subject.clone())
            .with_content(notification.resolved_content());

        provider.send(&message).await
    }
}

impl<R: NotificationRepository, T: TemplateRepository> Clone for DeliveryProcessor<R, T> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            providers: Arc::clone(&self.providers),
        }
    }
}

#[async_trait]
impl<R, T> StreamProcessor<NotificationJob> for DeliveryProcessor<R, T>
where
    R: NotificationRepository + 'static,
    T: TemplateRepository + 'static,
{
    async fn process(&self, job: &NotificationJob) -> Result<(), StreamError> {
        let id = job.notification_id;

        let notification = match self.service.get_notification(id).await {
            Ok(notification) => notification,
            Err(NotificationError::NotificationNotFound(_)) => {
                warn!(notification_id = %id, "Notification not found, dropping job");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        if notification.is_terminal() {
            warn!(
                notification_id = %id,
                status = %notification.status,
                attempt_count = notification.attempt_count,
                max_attempts = notification.max_attempts,
                "Notification already in a terminal state, skipping"
            );
            return Ok(());
        }

        let notification = self.service.increment_attempt(id).await?;
        let attempt = notification.attempt_count;

        debug!(
            notification_id = %id,
            attempt,
            max_attempts = notification.max_attempts,
            channel = %notification.channel,
            "Attempting delivery"
        );

        match self.deliver(&notification).await {
            Ok(receipt) => {
                self.service.mark_as_delivered(id).await?;
                info!(
                    notification_id = %id,
                    attempt,
                    message_id = ?receipt.message_id,
                    "Delivery succeeded"
                );
                Ok(())
            }
            Err(e) => {
                let message = e.to_string();
                match self.service.mark_as_failed(id, &message).await {
                    Ok(_) => Err(StreamError::transient(message)),
                    Err(record_err) => {
                        error!(
                            notification_id = %id,
                            attempt,
                            error = %record_err,
                            "Failed to record delivery failure"
                        );
                        Err(StreamError::transient(format!(
                            "{message}; failure not recorded: {record_err}"
                        )))
                    }
                }
            }
        }
    }

    fn name(&self) -> &'static str {
        "DeliveryProcessor"
    }

    async fn health_check(&self) -> Result<bool, StreamError> {
        let mut healthy = !self.providers.is_empty();
        for provider in self.providers.iter() {
            match provider.health_check().await {
                Ok(true) => {}
                Ok(false) => healthy = false,
                Err(e) => {
                    warn!(provider = provider.name(), error = %e, "Provider health check failed");
                    healthy = false;
                }
            }
        }
        Ok(healthy)
    }
}

/// Infrastructure failures while processing are retried by the queue.
impl From<NotificationError> for StreamError {
    fn from(e: NotificationError) -> Self {
        StreamError::transient(e.to_string())
    }
}
