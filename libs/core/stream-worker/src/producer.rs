//! Stream producer for job enqueuing
//!
//! Wraps payloads in a [`QueuedJob`] envelope. Jobs without a delay go straight
//! into the stream; delayed jobs wait in the stream's sorted set until a worker
//! promotes them.
//!
//! # Example
//!
//! ```rust,ignore
//! use stream_worker::{JobOptions, StreamProducer};
//!
//! let producer = queue.producer::<NotificationStream>()?;
//! let job_id = producer
//!     .send(job, JobOptions::default().with_delay(Duration::from_secs(30)))
//!     .await?;
//! ```

use crate::error::StreamError;
use crate::job::{JobOptions, QueuedJob};
use crate::registry::{delayed_set_for, StreamDef, StreamJob};
use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Generic stream producer for enqueuing jobs.
#[derive(Clone)]
pub struct StreamProducer {
    redis: Arc<ConnectionManager>,
    stream_name: String,
    delayed_set: String,
    max_length: i64,
    open: Arc<AtomicBool>,
}

impl StreamProducer {
    /// Producer for the stream described by `S`, sharing the queue's
    /// connection and open/closed state.
    pub(crate) fn for_stream_def<S: StreamDef>(
        redis: Arc<ConnectionManager>,
        open: Arc<AtomicBool>,
    ) -> Self {
        Self {
            redis,
            stream_name: S::STREAM_NAME.to_string(),
            delayed_set: delayed_set_for(S::STREAM_NAME),
            max_length: S::MAX_LENGTH,
            open,
        }
    }

    /// Get the stream name.
    pub fn stream_name(&self) -> &str {
        &self.stream_name
    }

    /// Enqueue a payload with the given options.
    ///
    /// Returns the queue-level job ID.
    pub async fn send<J: StreamJob>(&self, data: J, opts: JobOptions) -> Result<String, StreamError> {
        let job = QueuedJob::new(data, opts);
        self.push(&job).await?;
        Ok(job.id)
    }

    /// Write an existing envelope to the stream or, when delayed, to the delayed set.
    pub async fn push<J: StreamJob>(&self, job: &QueuedJob<J>) -> Result<(), StreamError> {
        if !self.open.load(Ordering::Acquire) {
            return Err(StreamError::Closed);
        }

        let mut conn = (*self.redis).clone();
        let job_json = serde_json::to_string(job)?;

        if job.opts.delay_ms > 0 {
            let due_at = Utc::now()
                .timestamp_millis()
                .saturating_add(i64::try_from(job.opts.delay_ms).unwrap_or(i64::MAX));

            redis::cmd("ZADD")
                .arg(&self.delayed_set)
                .arg(due_at)
                .arg(&job_json)
                .query_async::<()>(&mut conn)
                .await?;

            debug!(
                stream = %self.stream_name,
                job_id = %job.id,
                payload_id = %job.data.job_id(),
                delay_ms = job.opts.delay_ms,
                "Scheduled delayed job"
            );
            return Ok(());
        }

        // Use XADD with MAXLEN ~ for approximate trimming
        let stream_id: String = redis::cmd("XADD")
            .arg(&self.stream_name)
            .arg("MAXLEN")
            .arg("~")
            .arg(self.max_length)
            .arg("*")
            .arg("job")
            .arg(&job_json)
            .query_async(&mut conn)
            .await?;

        debug!(
            stream = %self.stream_name,
            stream_id = %stream_id,
            job_id = %job.id,
            payload_id = %job.data.job_id(),
            "Enqueued job"
        );

        Ok(())
    }

    /// Get the current stream length.
    pub async fn stream_length(&self) -> Result<i64, StreamError> {
        let mut conn = (*self.redis).clone();
        let len: i64 = conn.xlen(&self.stream_name).await?;
        Ok(len)
    }

    /// Number of jobs waiting in the delayed set.
    pub async fn delayed_count(&self) -> Result<i64, StreamError> {
        let mut conn = (*self.redis).clone();
        let count: i64 = conn.zcard(&self.delayed_set).await?;
        Ok(count)
    }
}
