//! Connectors for the stores behind notification dispatch: PostgreSQL for
//! notification records and templates, Redis for the dispatch queue.
//!
//! # Features
//!
//! - `postgres` (default) - PostgreSQL support with SeaORM
//! - `redis` (default) - Redis support
//! - `config` - `core_config::FromEnv` for the connection configs
//!
//! # Examples
//!
//! ```ignore
//! use database::postgres::{self, PostgresConfig};
//! use database::common::RetryConfig;
//! use migration::Migrator;
//!
//! let db = postgres::connect_with_retry(PostgresConfig::from_env()?, RetryConfig::default()).await?;
//! postgres::run_migrations::<Migrator>(&db, "notification-worker").await?;
//!
//! let redis = database::redis::connect_with_retry(&redis_url, RetryConfig::default()).await?;
//! ```

pub mod common;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "redis")]
pub mod redis;

pub use common::{DatabaseError, DatabaseResult};
