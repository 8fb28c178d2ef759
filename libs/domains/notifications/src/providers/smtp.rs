//! SMTP email provider implementation using lettre.

use super::{ChannelProvider, OutboundMessage, SendReceipt};
use crate::config::SmtpConfig;
use crate::error::{NotificationError, NotificationResult};
use crate::models::Channel;
use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, MultiPart, SinglePart, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use tracing::{debug, error, info};

/// Port for implicit TLS; every other TLS port negotiates STARTTLS.
const IMPLICIT_TLS_PORT: u16 = 465;

/// SMTP email provider.
pub struct SmtpProvider {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    config: SmtpConfig,
}

impl SmtpProvider {
    /// Create a new SMTP provider. Fails with `Config` when any required
    /// setting is missing or malformed.
    pub fn new(config: SmtpConfig) -> NotificationResult<Self> {
        let from = Self::validate(&config)?;
        let transport = Self::build_transport(&config)?;

        info!(
            host = %config.host,
            port = config.port,
            use_tls = config.use_tls,
            timeout_ms = config.timeout.as_millis() as u64,
            "SMTP provider configured"
        );

        Ok(Self {
            transport,
            from,
            config,
        })
    }

    fn validate(config: &SmtpConfig) -> NotificationResult<Mailbox> {
        let missing = [
            ("SMTP host", config.host.trim().is_empty()),
            ("SMTP port", config.port == 0),
            ("SMTP username", config.username.is_empty()),
            ("SMTP password", config.password.is_empty()),
            ("sender address", config.from_email.trim().is_empty()),
            ("SMTP timeout", config.timeout.is_zero()),
        ];
        if let Some((name, _)) = missing.iter().find(|(_, is_missing)| *is_missing) {
            return Err(NotificationError::Config(format!("{} is required", name)));
        }

        let from = match &config.from_name {
            Some(name) => format!("{} <{}>", name, config.from_email),
            None => config.from_email.clone(),
        };
        from.parse()
            .map_err(|e| NotificationError::Config(format!("Invalid sender address: {}", e)))
    }

    fn build_transport(
        config: &SmtpConfig,
    ) -> NotificationResult<AsyncSmtpTransport<Tokio1Executor>> {
        let credentials = Credentials::new(config.username.clone(), config.password.clone());

        let transport = if config.use_tls {
            let builder = if config.port == IMPLICIT_TLS_PORT {
                AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
            } else {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            }
            .map_err(|e| NotificationError::Config(format!("Failed to create SMTP relay: {}", e)))?;

            builder
                .port(config.port)
                .credentials(credentials)
                .timeout(Some(config.timeout))
                .build()
        } else {
            // Plain transport for local dev servers like Mailpit
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
                .port(config.port)
                .credentials(credentials)
                .timeout(Some(config.timeout))
                .build()
        };

        Ok(transport)
    }

    /// Build a lettre Message from an OutboundMessage.
    fn build_message(&self, message: &OutboundMessage) -> NotificationResult<Message> {
        let to: Mailbox = message
            .to
            .parse()
            .map_err(|e| NotificationError::Delivery(format!("Invalid recipient address: {}", e)))?;

        let mut builder = Message::builder().from(self.from.clone()).to(to);
        if let Some(subject) = &message.subject {
            builder = builder.subject(subject);
        }

        let text = |body: &str| {
            SinglePart::builder()
                .header(ContentType::TEXT_PLAIN)
                .body(body.to_string())
        };
        let html = |body: &str| {
            SinglePart::builder()
                .header(ContentType::TEXT_HTML)
                .body(body.to_string())
        };

        let built = match (&message.text, &message.html) {
            (Some(t), Some(h)) => {
                builder.multipart(MultiPart::alternative().singlepart(text(t)).singlepart(html(h)))
            }
            (None, Some(h)) => builder.singlepart(html(h)),
            (Some(t), None) => builder.singlepart(text(t)),
            (None, None) => builder.singlepart(text("")),
        };

        built.map_err(|e| NotificationError::Delivery(format!("Failed to build email message: {}", e)))
    }
}

#[async_trait]
impl ChannelProvider for SmtpProvider {
    fn channel(&self) -> Channel {
        Channel::Email
    }

    async fn send(&self, message: &OutboundMessage) -> NotificationResult<SendReceipt> {
        debug!(
            to = %message.to,
            subject = ?message.subject,
            host = %self.config.host,
            port = %self.config.port,
            "Sending email via SMTP"
        );

        let email = self.build_message(message)?;

        // Bounds the whole exchange; the transport timeout is per command
        let response = tokio::time::timeout(self.config.timeout, self.transport.send(email))
            .await
            .map_err(|_| {
                error!(
                    to = %message.to,
                    timeout_ms = self.config.timeout.as_millis() as u64,
                    "SMTP send timed out"
                );
                NotificationError::Delivery(format!(
                    "SMTP send timed out after {}ms",
                    self.config.timeout.as_millis()
                ))
            })?
            .map_err(|e| {
                error!(to = %message.to, error = %e, "Failed to send email via SMTP");
                NotificationError::Delivery(format!("SMTP send failed: {}", e))
            })?;

        let message_id = response.message().next().map(|s| s.to_string());

        info!(to = %message.to, message_id = ?message_id, "Email sent via SMTP");

        Ok(SendReceipt { message_id })
    }

    fn name(&self) -> &'static str {
        "SMTP"
    }

    async fn health_check(&self) -> NotificationResult<bool> {
        self.transport
            .test_connection()
            .await
            .map_err(|e| NotificationError::Delivery(format!("SMTP health check failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config() -> SmtpConfig {
        SmtpConfig::new(
            "smtp.example.com",
            587,
            "mailer",
            "secret",
            "noreply@example.com",
        )
        .with_from_name("Marketplace")
    }

    #[tokio::test]
    async fn test_provider_builds_with_valid_config() {
        let provider = SmtpProvider::new(config()).unwrap();
        assert_eq!(provider.channel(), Channel::Email);
        assert_eq!(provider.name(), "SMTP");
        assert_eq!(provider.from.email.to_string(), "noreply@example.com");
    }

    #[tokio::test]
    async fn test_provider_rejects_missing_host() {
        let mut config = config();
        config.host = String::new();

        let err = SmtpProvider::new(config).err().unwrap();
        assert!(matches!(err, NotificationError::Config(ref msg) if msg.contains("host")));
    }

    #[tokio::test]
    async fn test_provider_rejects_missing_credentials() {
        let mut config = config();
        config.password = String::new();

        let err = SmtpProvider::new(config).err().unwrap();
        assert!(matches!(err, NotificationError::Config(ref msg) if msg.contains("password")));
    }

    #[tokio::test]
    async fn test_provider_rejects_bad_sender() {
        let mut config = config();
        config.from_email = "not an address".to_string();

        let err = SmtpProvider::new(config).err().unwrap();
        assert!(matches!(err, NotificationError::Config(_)));
    }

    #[tokio::test]
    async fn test_provider_rejects_zero_timeout() {
        let config = config().with_timeout(Duration::ZERO);

        let err = SmtpProvider::new(config).err().unwrap();
        assert!(matches!(err, NotificationError::Config(ref msg) if msg.contains("timeout")));
    }

    #[tokio::test]
    async fn test_send_bounded_by_timeout() {
        // Accepts connections but never sends the SMTP greeting
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let config = SmtpConfig::new("127.0.0.1", port, "mailer", "secret", "noreply@example.com")
            .with_tls(false)
            .with_timeout(Duration::from_millis(200));
        let provider = SmtpProvider::new(config).unwrap();
        let message = OutboundMessage::new("a@b.com", Some("Hi".to_string()))
            .with_content(Some("hello".to_string()));

        let start = std::time::Instant::now();
        let result = provider.send(&message).await;
        let elapsed = start.elapsed();
        server.abort();

        assert!(matches!(result, Err(NotificationError::Delivery(_))));
        assert!(elapsed < Duration::from_secs(2), "send took {elapsed:?}");
    }

    #[tokio::test]
    async fn test_build_message_variants() {
        let provider = SmtpProvider::new(config().with_tls(false)).unwrap();

        let plain = OutboundMessage::new("a@b.com", Some("Hi".to_string()))
            .with_content(Some("hello".to_string()));
        assert!(provider.build_message(&plain).is_ok());

        let both = OutboundMessage {
            to: "a@b.com".to_string(),
            subject: None,
            html: Some("<p>hello</p>".to_string()),
            text: Some("hello".to_string()),
        };
        assert!(provider.build_message(&both).is_ok());

        let bad = OutboundMessage::new("nope", None);
        assert!(matches!(
            provider.build_message(&bad),
            Err(NotificationError::Delivery(_))
        ));
    }
}
