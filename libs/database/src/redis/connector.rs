use redis::Client;
use redis::aio::ConnectionManager;
use tracing::info;

use crate::common::{RetryConfig, retry_with_backoff};

/// Connect to Redis and verify the connection with PING
///
/// The returned ConnectionManager reconnects on its own after failures.
pub async fn connect(url: &str) -> redis::RedisResult<ConnectionManager> {
    let client = Client::open(url)?;
    let manager = ConnectionManager::new(client).await?;

    let mut conn = manager.clone();
    let _: String = redis::cmd("PING").query_async(&mut conn).await?;

    info!("Connected to Redis");
    Ok(manager)
}

/// Connect with exponential backoff while Redis is unreachable
pub async fn connect_with_retry(
    url: &str,
    retry_config: RetryConfig,
) -> redis::RedisResult<ConnectionManager> {
    retry_with_backoff("redis", || connect(url), retry_config).await
}
