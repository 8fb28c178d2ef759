//! Notification Worker Service
//!
//! Consumes delivery jobs from the dispatch stream and sends them through the
//! configured channel providers.
//!
//! ## Architecture
//!
//! ```text
//! Redis Stream (notifications:dispatch)
//!   ↓ (Consumer Group: notification_workers)
//! StreamWorker<NotificationJob, DeliveryProcessor>
//!   ↓ (attempt bookkeeping, outcome recording)
//! NotificationService<PgNotificationRepository, PgTemplateRepository>
//!   ↓
//! SmtpProvider → SMTP relay
//! ```
//!
//! ## Environment
//!
//! - `DATABASE_URL` and the other `PostgresConfig` variables
//! - `REDIS_URL` or `REDIS_HOST`
//! - `SMTP_HOST`, `SMTP_PORT`, `SMTP_USERNAME`, `SMTP_PASSWORD`, `SMTP_FROM_EMAIL`
//! - `SMTP_TIMEOUT_MS` (default 10000)
//! - `NOTIFICATION_MAX_CONCURRENCY`, `NOTIFICATION_BACKOFF_BASE_MS`, `NOTIFICATION_BLOCK_MS`,
//!   `NOTIFICATION_CLAIM_TIMEOUT_MS` (default 60000, must cover two worst-case attempts)
//! - `METRICS_PORT` (default 9090)

use core_config::{Environment, FromEnv, env_parse};
use database::{
    common::RetryConfig,
    postgres::{self, PostgresConfig},
    redis::{self, RedisConfig},
};
use domain_notifications::{
    DeliveryProcessor, DispatchSettings, NotificationService, NotificationStream,
    PgNotificationRepository, PgTemplateRepository, ProviderRegistry, SmtpConfig, SmtpProvider,
    TemplateRegistry,
};
use eyre::{Result, WrapErr};
use migration::Migrator;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use stream_worker::{DispatchQueue, WorkerConfig, init_metrics};
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

const DEFAULT_METRICS_PORT: u16 = 9090;

/// The claim window must cover this many worst-case attempts.
const CLAIM_WINDOW_FACTOR: u32 = 2;

/// Everything the worker reads from the environment at startup
#[derive(Debug)]
pub struct WorkerSettings {
    pub postgres: PostgresConfig,
    pub redis: RedisConfig,
    pub smtp: SmtpConfig,
    pub dispatch: DispatchSettings,
    pub metrics_port: u16,
}

impl WorkerSettings {
    pub fn from_env() -> Result<Self> {
        let settings = Self {
            postgres: PostgresConfig::from_env()
                .wrap_err("Failed to load PostgreSQL configuration")?,
            redis: RedisConfig::from_env().wrap_err("Failed to load Redis configuration")?,
            smtp: SmtpConfig::from_env().wrap_err("Failed to load SMTP configuration")?,
            dispatch: DispatchSettings::from_env()
                .wrap_err("Failed to load dispatch settings")?,
            metrics_port: env_parse("METRICS_PORT", DEFAULT_METRICS_PORT)
                .wrap_err("Failed to parse METRICS_PORT")?,
        };
        settings.check_claim_window()?;
        Ok(settings)
    }

    /// Expected upper bound of one delivery attempt: a bounded send plus one
    /// wait for a pooled database connection
    pub fn max_attempt_duration(&self) -> Duration {
        self.smtp.timeout + Duration::from_secs(self.postgres.acquire_timeout_secs)
    }

    /// A pending job must not be reclaimed while its attempt may still be running.
    pub fn check_claim_window(&self) -> Result<()> {
        let required = self.max_attempt_duration() * CLAIM_WINDOW_FACTOR;
        eyre::ensure!(
            self.dispatch.claim_timeout() >= required,
            "NOTIFICATION_CLAIM_TIMEOUT_MS ({}ms) must be at least {}ms for SMTP_TIMEOUT_MS={}ms",
            self.dispatch.claim_timeout_ms,
            required.as_millis(),
            self.smtp.timeout.as_millis()
        );
        Ok(())
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig::from_stream_def::<NotificationStream>()
            .with_blocking(Some(self.dispatch.block_ms))
            .with_max_concurrent_jobs(self.dispatch.max_concurrency)
            .with_claim_timeout_ms(self.dispatch.claim_timeout_ms)
    }
}

/// Run the notification worker until SIGINT or SIGTERM
///
/// # Errors
///
/// Returns an error if configuration is incomplete, a backing store stays
/// unreachable after retrying, migrations fail, or the SMTP settings are
/// rejected by the provider.
pub async fn run() -> Result<()> {
    core_config::tracing::install_color_eyre();
    let environment = Environment::from_env();
    core_config::tracing::init_tracing(&environment);

    info!(
        name = env!("CARGO_PKG_NAME"),
        version = env!("CARGO_PKG_VERSION"),
        ?environment,
        "Starting notification worker"
    );

    let settings = WorkerSettings::from_env()?;
    info!(smtp = ?settings.smtp, dispatch = ?settings.dispatch, "Configuration loaded");

    init_metrics(SocketAddr::from(([0, 0, 0, 0], settings.metrics_port)))
        .wrap_err("Failed to start metrics exporter")?;

    let db = postgres::connect_with_retry(settings.postgres.clone(), RetryConfig::new())
        .await
        .wrap_err("Failed to connect to PostgreSQL")?;
    postgres::run_migrations::<Migrator>(&db, env!("CARGO_PKG_NAME"))
        .await
        .wrap_err("Failed to run migrations")?;

    let redis = redis::connect_with_retry(&settings.redis.build_url(), RetryConfig::new())
        .await
        .wrap_err("Failed to connect to Redis")?;
    let queue = DispatchQueue::from_connection(redis);

    // Bad SMTP settings should stop the worker before it consumes anything.
    let smtp = SmtpProvider::new(settings.smtp.clone()).wrap_err("Invalid SMTP configuration")?;

    let producer = queue
        .producer::<NotificationStream>()
        .wrap_err("Failed to create dispatch producer")?;
    let service = NotificationService::new(
        PgNotificationRepository::new(db.clone()),
        TemplateRegistry::new(PgTemplateRepository::new(db)),
        Arc::new(producer),
    )
    .with_backoff_base(settings.dispatch.backoff_base());

    let processor = DeliveryProcessor::new(
        Arc::new(service),
        ProviderRegistry::new().register(Arc::new(smtp)),
    );

    let worker_config = settings.worker_config();
    info!(
        stream = %worker_config.stream_name,
        consumer_group = %worker_config.consumer_group,
        consumer_id = %worker_config.consumer_id,
        max_concurrent_jobs = worker_config.max_concurrent_jobs,
        "Worker configuration loaded"
    );

    let worker = queue
        .worker(Arc::new(processor), worker_config)
        .wrap_err("Failed to create stream worker")?;

    match worker.consumer().stream_info().await {
        Ok(backlog) => info!(
            stream = %backlog.stream_name,
            length = backlog.length,
            pending = backlog.pending_count,
            delayed = backlog.delayed_count,
            failed = backlog.failed_count,
            "Dispatch backlog"
        ),
        Err(e) => warn!(error = %e, "Failed to read dispatch stream info"),
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        let _ = shutdown_tx.send(true);
    });

    let outcome = worker.run(shutdown_rx).await;
    queue.close();
    outcome.wrap_err("Stream worker failed")?;

    info!("Notification worker stopped");
    Ok(())
}

/// Wait for SIGINT or SIGTERM
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())
            .wrap_err("Failed to install SIGTERM handler")?;

        tokio::select! {
            result = signal::ctrl_c() => {
                result.wrap_err("Failed to listen for Ctrl+C")?;
                info!("Received Ctrl+C, initiating shutdown...");
            }
            _ = terminate.recv() => {
                info!("Received SIGTERM, initiating shutdown...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c()
            .await
            .wrap_err("Failed to listen for Ctrl+C")?;
        info!("Received Ctrl+C, initiating shutdown...");
    }

    Ok(())
}
