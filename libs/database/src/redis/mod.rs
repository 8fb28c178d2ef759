//! Redis connection helpers

mod config;
mod connector;

pub use config::RedisConfig;
pub use connector::{connect, connect_with_retry};

pub use redis::RedisResult;
pub use redis::aio::ConnectionManager;
