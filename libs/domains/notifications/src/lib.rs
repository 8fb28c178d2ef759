//! Notifications Domain
//!
//! Transactional notification dispatch: accept a request to notify a
//! recipient over a channel, persist it, and deliver it asynchronously with
//! bounded retries.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │ NotificationService │  ← Validates, snapshots template content
//! └──────────┬──────────┘
//!            │ create (queued) + enqueue job{notification_id}
//! ┌──────────▼──────────┐
//! │   Dispatch Queue    │  ← notifications:dispatch stream + delayed set
//! └──────────┬──────────┘
//!            │
//! ┌──────────▼──────────┐
//! │  DeliveryProcessor  │  ← increment attempt, send, record outcome
//! └──────────┬──────────┘
//!            │
//! ┌──────────▼──────────┐
//! │   ChannelProvider   │  ← SMTP for email
//! └─────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use domain_notifications::{
//!     EnqueueNotification, NotificationService, NotificationStream, PgNotificationRepository,
//!     PgTemplateRepository, TemplateRegistry,
//! };
//!
//! let producer = queue.producer::<NotificationStream>()?;
//! let service = NotificationService::new(
//!     PgNotificationRepository::new(db.clone()),
//!     TemplateRegistry::new(PgTemplateRepository::new(db)),
//!     Arc::new(producer),
//! );
//!
//! service
//!     .enqueue(EnqueueNotification::email("buyer@example.com", "Your order shipped"))
//!     .await?;
//! ```

pub mod config;
pub mod entity;
pub mod error;
pub mod models;
pub mod postgres;
pub mod processor;
pub mod providers;
pub mod queue;
pub mod repository;
pub mod service;
pub mod streams;
pub mod templates;

// Re-export commonly used types
pub use config::{DispatchSettings, SmtpConfig};
pub use error::{NotificationError, NotificationResult};
pub use models::{
    Channel, CreateTemplate, EnqueueNotification, NewNotification, Notification, NotificationJob,
    NotificationStatus, NotificationTemplate, NotificationUpdate, OpaquePayload, UpdateTemplate,
};
pub use postgres::{PgNotificationRepository, PgTemplateRepository};
pub use processor::DeliveryProcessor;
pub use providers::{ChannelProvider, OutboundMessage, ProviderRegistry, SendReceipt, SmtpProvider};
pub use queue::NotificationQueue;
pub use repository::{
    InMemoryNotificationRepository, InMemoryTemplateRepository, NotificationRepository,
    TemplateRepository,
};
pub use service::NotificationService;
pub use streams::NotificationStream;
pub use templates::TemplateRegistry;
