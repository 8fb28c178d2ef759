//! Environment-driven configuration for delivery.

use core_config::{ConfigError, FromEnv, env_or_default, env_parse, env_parse_required, env_required};
use std::time::Duration;

/// Upper bound for one SMTP send, connection included.
pub const DEFAULT_SMTP_TIMEOUT: Duration = Duration::from_secs(10);

/// SMTP configuration.
///
/// Host, port, credentials and sender address are required.
#[derive(Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Sender email address.
    pub from_email: String,
    /// Sender display name.
    pub from_name: Option<String>,
    /// Whether to use TLS (false for local dev servers).
    pub use_tls: bool,
    /// Bound on a whole send and on each SMTP command within it.
    pub timeout: Duration,
}

impl SmtpConfig {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
        from_email: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            password: password.into(),
            from_email: from_email.into(),
            from_name: None,
            use_tls: true,
            timeout: DEFAULT_SMTP_TIMEOUT,
        }
    }

    pub fn with_from_name(mut self, name: impl Into<String>) -> Self {
        self.from_name = Some(name.into());
        self
    }

    pub fn with_tls(mut self, use_tls: bool) -> Self {
        self.use_tls = use_tls;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

// Password stays out of logs
impl std::fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"***")
            .field("from_email", &self.from_email)
            .field("from_name", &self.from_name)
            .field("use_tls", &self.use_tls)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl FromEnv for SmtpConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let from_name = env_or_default("SMTP_FROM_NAME", "");
        let use_tls = env_or_default("SMTP_USE_TLS", "true");
        let timeout_ms = env_parse("SMTP_TIMEOUT_MS", DEFAULT_SMTP_TIMEOUT.as_millis() as u64)?;

        Ok(Self {
            host: env_required("SMTP_HOST")?,
            port: env_parse_required("SMTP_PORT")?,
            username: env_required("SMTP_USERNAME")?,
            password: env_required("SMTP_PASSWORD")?,
            from_email: env_required("SMTP_FROM_EMAIL")?,
            from_name: (!from_name.trim().is_empty()).then_some(from_name),
            use_tls: matches!(use_tls.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes"),
            timeout: Duration::from_millis(timeout_ms),
        })
    }
}

/// Worker pool and retry timing.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    /// Jobs processed in parallel per worker.
    pub max_concurrency: usize,
    /// Base unit of the exponential retry backoff.
    pub backoff_base_ms: u64,
    /// How long one blocking queue read may wait.
    pub block_ms: u64,
    /// Idle time after which a pending job is taken over by another worker.
    pub claim_timeout_ms: u64,
}

impl DispatchSettings {
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn claim_timeout(&self) -> Duration {
        Duration::from_millis(self.claim_timeout_ms)
    }
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            max_concurrency: 5,
            backoff_base_ms: 1000,
            block_ms: 1000,
            claim_timeout_ms: 60_000,
        }
    }
}

impl FromEnv for DispatchSettings {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        Ok(Self {
            max_concurrency: env_parse("NOTIFICATION_MAX_CONCURRENCY", defaults.max_concurrency)?
                .max(1),
            backoff_base_ms: env_parse("NOTIFICATION_BACKOFF_BASE_MS", defaults.backoff_base_ms)?,
            block_ms: env_parse("NOTIFICATION_BLOCK_MS", defaults.block_ms)?,
            claim_timeout_ms: env_parse(
                "NOTIFICATION_CLAIM_TIMEOUT_MS",
                defaults.claim_timeout_ms,
            )?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SMTP_VARS: [(&str, Option<&str>); 8] = [
        ("SMTP_HOST", Some("smtp.example.com")),
        ("SMTP_PORT", Some("587")),
        ("SMTP_USERNAME", Some("mailer")),
        ("SMTP_PASSWORD", Some("secret")),
        ("SMTP_FROM_EMAIL", Some("noreply@example.com")),
        ("SMTP_FROM_NAME", None),
        ("SMTP_USE_TLS", None),
        ("SMTP_TIMEOUT_MS", None),
    ];

    #[test]
    fn test_smtp_config_from_env() {
        temp_env::with_vars(SMTP_VARS, || {
            let config = SmtpConfig::from_env().unwrap();
            assert_eq!(config.host, "smtp.example.com");
            assert_eq!(config.port, 587);
            assert_eq!(config.from_email, "noreply@example.com");
            assert!(config.from_name.is_none());
            assert!(config.use_tls);
            assert_eq!(config.timeout, DEFAULT_SMTP_TIMEOUT);
        });
    }

    #[test]
    fn test_smtp_config_optional_values() {
        let mut vars = SMTP_VARS;
        vars[5] = ("SMTP_FROM_NAME", Some("Marketplace"));
        vars[6] = ("SMTP_USE_TLS", Some("false"));
        vars[7] = ("SMTP_TIMEOUT_MS", Some("2500"));

        temp_env::with_vars(vars, || {
            let config = SmtpConfig::from_env().unwrap();
            assert_eq!(config.from_name.as_deref(), Some("Marketplace"));
            assert!(!config.use_tls);
            assert_eq!(config.timeout, Duration::from_millis(2500));
        });
    }

    #[test]
    fn test_smtp_config_missing_password() {
        let mut vars = SMTP_VARS;
        vars[3] = ("SMTP_PASSWORD", None);

        temp_env::with_vars(vars, || {
            let err = SmtpConfig::from_env().unwrap_err();
            assert!(matches!(err, ConfigError::MissingEnvVar(ref key) if key == "SMTP_PASSWORD"));
        });
    }

    #[test]
    fn test_smtp_config_debug_hides_password() {
        let config = SmtpConfig::new("h", 25, "u", "hunter2", "a@b.com");
        assert!(!format!("{config:?}").contains("hunter2"));
    }

    #[test]
    fn test_dispatch_settings_defaults() {
        temp_env::with_vars_unset(
            [
                "NOTIFICATION_MAX_CONCURRENCY",
                "NOTIFICATION_BACKOFF_BASE_MS",
                "NOTIFICATION_BLOCK_MS",
                "NOTIFICATION_CLAIM_TIMEOUT_MS",
            ],
            || {
                let settings = DispatchSettings::from_env().unwrap();
                assert_eq!(settings.max_concurrency, 5);
                assert_eq!(settings.backoff_base(), Duration::from_secs(1));
                assert_eq!(settings.block_ms, 1000);
                assert_eq!(settings.claim_timeout(), Duration::from_secs(60));
            },
        );
    }

    #[test]
    fn test_dispatch_settings_overrides() {
        temp_env::with_vars(
            [
                ("NOTIFICATION_MAX_CONCURRENCY", Some("0")),
                ("NOTIFICATION_BACKOFF_BASE_MS", Some("250")),
                ("NOTIFICATION_BLOCK_MS", Some("50")),
                ("NOTIFICATION_CLAIM_TIMEOUT_MS", Some("90000")),
            ],
            || {
                let settings = DispatchSettings::from_env().unwrap();
                assert_eq!(settings.max_concurrency, 1);
                assert_eq!(settings.backoff_base_ms, 250);
                assert_eq!(settings.block_ms, 50);
                assert_eq!(settings.claim_timeout_ms, 90_000);
            },
        );
    }
}
