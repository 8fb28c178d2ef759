//! Stream definitions and the job/processor traits.
//!
//! This module provides:
//! - `StreamDef` trait for domain-specific stream definitions
//! - `StreamJob` trait for job payloads carried inside a `QueuedJob` envelope
//! - `StreamProcessor` trait for job handlers

use crate::error::StreamError;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

/// Stream definition trait.
///
/// Each domain implements this trait to define its queue layout.
///
/// # Example
///
/// ```rust,ignore
/// use stream_worker::StreamDef;
///
/// pub struct NotificationStream;
///
/// impl StreamDef for NotificationStream {
///     const STREAM_NAME: &'static str = "notifications:dispatch";
///     const CONSUMER_GROUP: &'static str = "notification_workers";
///     const DLQ_STREAM: &'static str = "notifications:failed";
/// }
/// ```
pub trait StreamDef: Send + Sync {
    /// The Redis stream name (e.g., "notifications:dispatch").
    const STREAM_NAME: &'static str;

    /// The consumer group name for this stream.
    const CONSUMER_GROUP: &'static str;

    /// Stream that retains jobs which exhausted their attempts.
    const DLQ_STREAM: &'static str;

    /// Maximum stream length before auto-trim (MAXLEN).
    const MAX_LENGTH: i64 = 100_000;

    /// Poll interval when blocking reads are disabled.
    const POLL_INTERVAL_MS: u64 = 1000;

    /// Entries read per XREADGROUP call.
    const BATCH_SIZE: usize = 10;

    /// Idle time after which another consumer's pending entry may be claimed.
    const CLAIM_TIMEOUT_MS: u64 = 60_000;

    /// Get the stream name.
    fn stream_name() -> &'static str {
        Self::STREAM_NAME
    }

    /// Get the consumer group name.
    fn consumer_group() -> &'static str {
        Self::CONSUMER_GROUP
    }

    /// Get the failed-jobs stream name.
    fn dlq_stream() -> &'static str {
        Self::DLQ_STREAM
    }

    /// Sorted set holding delayed jobs, scored by due time in epoch ms.
    fn delayed_set() -> String {
        delayed_set_for(Self::STREAM_NAME)
    }
}

pub(crate) fn delayed_set_for(stream_name: &str) -> String {
    format!("{}:delayed", stream_name)
}

/// Trait for job payloads.
///
/// Attempt counting and retry options live on the `QueuedJob` envelope, so a
/// payload only needs a stable identifier for logging.
pub trait StreamJob: Serialize + DeserializeOwned + Send + Sync + Clone + 'static {
    /// Returns the job ID for logging and tracking.
    fn job_id(&self) -> String;
}

/// Trait for job processors.
///
/// Return `Ok(())` to complete the job. A transient error lets the queue
/// schedule another attempt while the job has attempts left; a permanent
/// error fails the job immediately.
#[async_trait]
pub trait StreamProcessor<J: StreamJob>: Send + Sync {
    /// Process a single job.
    async fn process(&self, job: &J) -> Result<(), StreamError>;

    /// Get the processor name for logging.
    fn name(&self) -> &'static str;

    /// Health check for the processor.
    async fn health_check(&self) -> Result<bool, StreamError> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestStream;

    impl StreamDef for TestStream {
        const STREAM_NAME: &'static str = "test:jobs";
        const CONSUMER_GROUP: &'static str = "test_workers";
        const DLQ_STREAM: &'static str = "test:failed";
    }

    #[test]
    fn test_stream_def_defaults() {
        assert_eq!(TestStream::stream_name(), "test:jobs");
        assert_eq!(TestStream::consumer_group(), "test_workers");
        assert_eq!(TestStream::dlq_stream(), "test:failed");
        assert_eq!(TestStream::delayed_set(), "test:jobs:delayed");
        assert_eq!(TestStream::MAX_LENGTH, 100_000);
        assert_eq!(TestStream::BATCH_SIZE, 10);
    }
}
