//! Channel provider implementations.
//!
//! This module contains the `ChannelProvider` trait, the registry that maps a
//! channel to its provider, and the SMTP provider for email.

mod smtp;

pub use smtp::SmtpProvider;

use crate::error::NotificationResult;
use crate::models::Channel;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Provider acknowledgement of a sent message.
#[derive(Debug, Clone, Default)]
pub struct SendReceipt {
    /// Provider-specific message ID for tracking.
    pub message_id: Option<String>,
}

/// Message ready for transport.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutboundMessage {
    /// Recipient address.
    pub to: String,
    pub subject: Option<String>,
    pub html: Option<String>,
    pub text: Option<String>,
}

impl OutboundMessage {
    pub fn new(to: impl Into<String>, subject: Option<String>) -> Self {
        Self {
            to: to.into(),
            subject,
            ..Default::default()
        }
    }

    /// Attach resolved content, as HTML when it starts with markup and as
    /// plain text otherwise.
    pub fn with_content(mut self, content: Option<String>) -> Self {
        match content {
            Some(c) if c.trim_start().starts_with('<') => self.html = Some(c),
            other => self.text = other,
        }
        self
    }
}

/// Transport for one channel.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChannelProvider: Send + Sync {
    /// Channel this provider delivers on.
    fn channel(&self) -> Channel;

    /// Send a message. Transport and auth failures map to `Delivery`.
    async fn send(&self, message: &OutboundMessage) -> NotificationResult<SendReceipt>;

    /// Get the provider name for logging.
    fn name(&self) -> &'static str;

    /// Check if the provider can reach its backend.
    async fn health_check(&self) -> NotificationResult<bool>;
}

/// One provider per channel.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<Channel, Arc<dyn ChannelProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under its channel, replacing any previous one.
    pub fn register(mut self, provider: Arc<dyn ChannelProvider>) -> Self {
        self.providers.insert(provider.channel(), provider);
        self
    }

    pub fn get(&self, channel: Channel) -> Option<&Arc<dyn ChannelProvider>> {
        self.providers.get(&channel)
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn ChannelProvider>> {
        self.providers.values()
    }
}
