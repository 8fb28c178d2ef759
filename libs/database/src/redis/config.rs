#[cfg(feature = "config")]
use core_config::{ConfigError, FromEnv};

/// Redis connection configuration
#[derive(Clone, Debug)]
pub struct RedisConfig {
    /// Redis connection URL
    pub url: String,

    /// Logical database selected by appending `/<db>` to the URL
    pub database: Option<u8>,
}

impl RedisConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            database: None,
        }
    }

    pub fn with_database(mut self, database: u8) -> Self {
        self.database = Some(database);
        self
    }

    /// Connection URL including the database selector, if any
    pub fn build_url(&self) -> String {
        match self.database {
            Some(db) => format!("{}/{}", self.url.trim_end_matches('/'), db),
            None => self.url.clone(),
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self::new("redis://127.0.0.1:6379")
    }
}

/// Environment variables:
/// - `REDIS_URL` or `REDIS_HOST` (required)
/// - `REDIS_DATABASE` (optional, 0-15)
#[cfg(feature = "config")]
impl FromEnv for RedisConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let url = std::env::var("REDIS_URL")
            .or_else(|_| std::env::var("REDIS_HOST"))
            .map_err(|_| ConfigError::MissingEnvVar("REDIS_URL or REDIS_HOST".to_string()))?;

        let database = match std::env::var("REDIS_DATABASE") {
            Ok(raw) => Some(raw.parse().map_err(|e| ConfigError::ParseError {
                key: "REDIS_DATABASE".to_string(),
                details: format!("{}", e),
            })?),
            Err(_) => None,
        };

        Ok(Self { url, database })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_url_without_database() {
        let config = RedisConfig::new("redis://cache:6379");
        assert_eq!(config.build_url(), "redis://cache:6379");
    }

    #[test]
    fn test_build_url_with_database() {
        let config = RedisConfig::new("redis://cache:6379/").with_database(3);
        assert_eq!(config.build_url(), "redis://cache:6379/3");
    }

    #[cfg(feature = "config")]
    #[test]
    fn test_from_env_falls_back_to_redis_host() {
        temp_env::with_vars(
            [
                ("REDIS_URL", None),
                ("REDIS_HOST", Some("redis://queue:6379")),
                ("REDIS_DATABASE", None),
            ],
            || {
                let config = RedisConfig::from_env().unwrap();
                assert_eq!(config.url, "redis://queue:6379");
                assert_eq!(config.database, None);
            },
        );
    }

    #[cfg(feature = "config")]
    #[test]
    fn test_from_env_missing() {
        temp_env::with_vars_unset(["REDIS_URL", "REDIS_HOST"], || {
            let err = RedisConfig::from_env().unwrap_err();
            assert!(err.to_string().contains("REDIS_URL"));
        });
    }

    #[cfg(feature = "config")]
    #[test]
    fn test_from_env_invalid_database() {
        temp_env::with_vars(
            [
                ("REDIS_URL", Some("redis://queue:6379")),
                ("REDIS_DATABASE", Some("sixteen")),
            ],
            || {
                let err = RedisConfig::from_env().unwrap_err();
                assert!(err.to_string().contains("REDIS_DATABASE"));
            },
        );
    }
}
