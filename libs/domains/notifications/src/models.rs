//! Data models for the notifications domain.

use chrono::{DateTime, Utc};
use sea_orm::sea_query::StringLen;
use sea_orm::{DeriveActiveEnum, EnumIter};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use stream_worker::StreamJob;
use strum::{Display, EnumString};
use uuid::Uuid;
use validator::Validate;

/// Default delivery attempts when the caller does not ask for a number.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Lower bound for `max_attempts`.
pub const MIN_ATTEMPTS: u32 = 1;
/// Upper bound for `max_attempts`.
pub const MAX_ATTEMPTS: u32 = 10;

/// Delivery medium for a notification
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    DeriveActiveEnum,
    EnumIter,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Channel {
    #[sea_orm(string_value = "email")]
    Email,
}

/// Lifecycle status of a notification
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    Default,
    DeriveActiveEnum,
    EnumIter,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum NotificationStatus {
    /// Waiting for (another) delivery attempt
    #[default]
    #[sea_orm(string_value = "queued")]
    Queued,
    /// Accepted by the channel provider
    #[sea_orm(string_value = "delivered")]
    Delivered,
    /// Last attempt failed; terminal once attempts are exhausted
    #[sea_orm(string_value = "failed")]
    Failed,
}

/// Structured data attached to a notification.
///
/// Only body resolution looks inside it, and only when no body was stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OpaquePayload(serde_json::Value);

impl OpaquePayload {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    pub fn into_value(self) -> serde_json::Value {
        self.0
    }

    /// Render the payload as message content. Strings are used verbatim,
    /// anything else is serialized as JSON.
    pub fn to_content(&self) -> String {
        match &self.0 {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

impl From<serde_json::Value> for OpaquePayload {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}

/// A single request to notify a recipient over a channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    /// Template the content was copied from. Not a foreign key.
    pub template_id: Option<Uuid>,
    pub channel: Channel,
    pub recipient: String,
    pub subject: Option<String>,
    /// Content snapshotted at creation
    pub body: Option<String>,
    pub payload: Option<OpaquePayload>,
    pub status: NotificationStatus,
    /// Message of the most recent failed attempt
    pub error: Option<String>,
    pub attempt_count: u32,
    pub max_attempts: u32,
    pub scheduled_for: DateTime<Utc>,
    /// Set exactly when status is `Delivered`
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Notification {
    /// Create a queued notification from resolved input
    pub fn new(input: NewNotification) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            template_id: input.template_id,
            channel: input.channel,
            recipient: input.recipient,
            subject: input.subject,
            body: input.body,
            payload: input.payload,
            status: NotificationStatus::Queued,
            error: None,
            attempt_count: 0,
            max_attempts: input.max_attempts,
            scheduled_for: input.scheduled_for,
            sent_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Content to hand to the provider: the stored body, else the payload.
    pub fn resolved_content(&self) -> Option<String> {
        self.body
            .clone()
            .or_else(|| self.payload.as_ref().map(OpaquePayload::to_content))
    }

    pub fn has_attempts_remaining(&self) -> bool {
        self.attempt_count < self.max_attempts
    }

    /// Delivered, or failed with no attempts left
    pub fn is_terminal(&self) -> bool {
        match self.status {
            NotificationStatus::Delivered => true,
            NotificationStatus::Failed => !self.has_attempts_remaining(),
            NotificationStatus::Queued => false,
        }
    }

    /// Apply a partial update
    pub fn apply_update(&mut self, update: NotificationUpdate) {
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(error) = update.error {
            self.error = Some(error);
        }
        if let Some(sent_at) = update.sent_at {
            self.sent_at = Some(sent_at);
        }
        self.updated_at = Utc::now();
    }

    /// Bump the attempt counter without passing `max_attempts`
    pub fn increment_attempt(&mut self) {
        self.attempt_count = (self.attempt_count + 1).min(self.max_attempts);
        self.updated_at = Utc::now();
    }
}

/// Request accepted by `NotificationService::enqueue`
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct EnqueueNotification {
    pub channel: Channel,
    #[validate(length(min = 1, max = 320))]
    pub recipient: String,
    pub template_key: Option<String>,
    pub subject: Option<String>,
    pub body: Option<String>,
    pub payload: Option<OpaquePayload>,
    /// Clamped to 1..=10, defaults to 3
    pub max_attempts: Option<u32>,
    /// Defaults to now
    pub scheduled_for: Option<DateTime<Utc>>,
}

impl EnqueueNotification {
    /// Email with an explicit body
    pub fn email(recipient: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            channel: Channel::Email,
            recipient: recipient.into(),
            template_key: None,
            subject: None,
            body: Some(body.into()),
            payload: None,
            max_attempts: None,
            scheduled_for: None,
        }
    }

    /// Email whose content comes from a template
    pub fn from_template(
        channel: Channel,
        recipient: impl Into<String>,
        template_key: impl Into<String>,
    ) -> Self {
        Self {
            channel,
            recipient: recipient.into(),
            template_key: Some(template_key.into()),
            subject: None,
            body: None,
            payload: None,
            max_attempts: None,
            scheduled_for: None,
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(OpaquePayload::new(payload));
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    pub fn scheduled_for(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_for = Some(at);
        self
    }

    /// Effective attempt budget
    pub fn effective_max_attempts(&self) -> u32 {
        self.max_attempts
            .unwrap_or(DEFAULT_MAX_ATTEMPTS)
            .clamp(MIN_ATTEMPTS, MAX_ATTEMPTS)
    }
}

/// Fully resolved notification ready to persist
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub template_id: Option<Uuid>,
    pub channel: Channel,
    pub recipient: String,
    pub subject: Option<String>,
    pub body: Option<String>,
    pub payload: Option<OpaquePayload>,
    pub max_attempts: u32,
    pub scheduled_for: DateTime<Utc>,
}

/// Partial update of a notification's outcome fields
#[derive(Debug, Clone, Default)]
pub struct NotificationUpdate {
    pub status: Option<NotificationStatus>,
    pub error: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
}

impl NotificationUpdate {
    pub fn delivered(at: DateTime<Utc>) -> Self {
        Self {
            status: Some(NotificationStatus::Delivered),
            sent_at: Some(at),
            ..Default::default()
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: Some(NotificationStatus::Failed),
            error: Some(message.into()),
            ..Default::default()
        }
    }
}

/// Reusable, key-addressed message content
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationTemplate {
    pub id: Uuid,
    /// Unique and immutable
    pub key: String,
    pub channel: Channel,
    pub subject: Option<String>,
    pub body: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NotificationTemplate {
    pub fn new(input: CreateTemplate) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            key: input.key,
            channel: input.channel,
            subject: input.subject,
            body: input.body,
            description: input.description,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply updates. The key is never changed.
    pub fn apply_update(&mut self, update: UpdateTemplate) {
        if let Some(channel) = update.channel {
            self.channel = channel;
        }
        if let Some(subject) = update.subject {
            self.subject = Some(subject);
        }
        if let Some(body) = update.body {
            self.body = body;
        }
        if let Some(description) = update.description {
            self.description = Some(description);
        }
        self.updated_at = Utc::now();
    }
}

/// DTO for creating a template
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateTemplate {
    #[validate(length(min = 1, max = 128))]
    pub key: String,
    pub channel: Channel,
    pub subject: Option<String>,
    #[validate(length(min = 1))]
    pub body: String,
    pub description: Option<String>,
}

impl CreateTemplate {
    pub fn new(key: impl Into<String>, channel: Channel, body: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            channel,
            subject: None,
            body: body.into(),
            description: None,
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// DTO for updating a template
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateTemplate {
    pub channel: Option<Channel>,
    pub subject: Option<String>,
    #[validate(length(min = 1))]
    pub body: Option<String>,
    pub description: Option<String>,
}

/// Queue job carrying only the notification id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationJob {
    pub notification_id: Uuid,
}

impl NotificationJob {
    pub fn new(notification_id: Uuid) -> Self {
        Self { notification_id }
    }
}

impl StreamJob for NotificationJob {
    fn job_id(&self) -> String {
        self.notification_id.to_string()
    }
}

/// Delay before a notification scheduled for `at` becomes due
pub fn delay_until(at: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (at - now).to_std().unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn new_notification(body: Option<&str>, payload: Option<serde_json::Value>) -> Notification {
        Notification::new(NewNotification {
            template_id: None,
            channel: Channel::Email,
            recipient: "a@b.com".to_string(),
            subject: None,
            body: body.map(str::to_string),
            payload: payload.map(OpaquePayload::new),
            max_attempts: 3,
            scheduled_for: Utc::now(),
        })
    }

    #[test]
    fn test_new_notification_is_queued() {
        let n = new_notification(Some("hi"), None);
        assert_eq!(n.status, NotificationStatus::Queued);
        assert_eq!(n.attempt_count, 0);
        assert!(n.sent_at.is_none());
        assert!(!n.is_terminal());
    }

    #[test]
    fn test_resolved_content_prefers_body() {
        let n = new_notification(Some("hi"), Some(json!({"k": "v"})));
        assert_eq!(n.resolved_content().as_deref(), Some("hi"));
    }

    #[test]
    fn test_resolved_content_falls_back_to_payload() {
        let n = new_notification(None, Some(json!({"k": "v"})));
        assert_eq!(n.resolved_content().as_deref(), Some(r#"{"k":"v"}"#));

        let n = new_notification(None, Some(json!("plain text")));
        assert_eq!(n.resolved_content().as_deref(), Some("plain text"));

        let n = new_notification(None, None);
        assert!(n.resolved_content().is_none());
    }

    #[test]
    fn test_increment_attempt_is_capped() {
        let mut n = new_notification(Some("hi"), None);
        for _ in 0..5 {
            n.increment_attempt();
        }
        assert_eq!(n.attempt_count, 3);
        assert!(!n.has_attempts_remaining());
    }

    #[test]
    fn test_failed_is_terminal_only_when_exhausted() {
        let mut n = new_notification(Some("hi"), None);
        n.increment_attempt();
        n.apply_update(NotificationUpdate::failed("boom"));
        assert!(!n.is_terminal());

        n.increment_attempt();
        n.increment_attempt();
        assert!(n.is_terminal());
        assert_eq!(n.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_delivered_update_sets_sent_at() {
        let mut n = new_notification(Some("hi"), None);
        n.apply_update(NotificationUpdate::delivered(Utc::now()));
        assert_eq!(n.status, NotificationStatus::Delivered);
        assert!(n.sent_at.is_some());
        assert!(n.is_terminal());
    }

    #[test]
    fn test_effective_max_attempts_clamped() {
        let req = EnqueueNotification::email("a@b.com", "hi");
        assert_eq!(req.effective_max_attempts(), 3);
        assert_eq!(req.clone().with_max_attempts(0).effective_max_attempts(), 1);
        assert_eq!(req.clone().with_max_attempts(50).effective_max_attempts(), 10);
        assert_eq!(req.with_max_attempts(7).effective_max_attempts(), 7);
    }

    #[test]
    fn test_template_update_keeps_key() {
        let mut template = NotificationTemplate::new(
            CreateTemplate::new("welcome", Channel::Email, "Hello").with_subject("Hi"),
        );
        template.apply_update(UpdateTemplate {
            body: Some("Hello again".to_string()),
            ..Default::default()
        });
        assert_eq!(template.key, "welcome");
        assert_eq!(template.body, "Hello again");
        assert_eq!(template.subject.as_deref(), Some("Hi"));
    }

    #[test]
    fn test_delay_until() {
        let now = Utc::now();
        assert_eq!(delay_until(now - chrono::Duration::seconds(5), now), Duration::ZERO);
        assert_eq!(
            delay_until(now + chrono::Duration::milliseconds(1500), now),
            Duration::from_millis(1500)
        );
    }

    #[test]
    fn test_channel_string_forms() {
        assert_eq!(Channel::Email.to_string(), "email");
        assert_eq!("email".parse::<Channel>().unwrap(), Channel::Email);
        assert_eq!(serde_json::to_value(NotificationStatus::Failed).unwrap(), json!("failed"));
    }
}
