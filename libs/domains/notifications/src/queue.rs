//! Submission side of the dispatch queue.

use async_trait::async_trait;
use stream_worker::{JobOptions, StreamProducer};

use crate::error::NotificationResult;
use crate::models::NotificationJob;

/// Anything that can accept delivery jobs
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationQueue: Send + Sync {
    /// Submit one job. Returns the queue's job id.
    async fn enqueue(&self, job: NotificationJob, opts: JobOptions) -> NotificationResult<String>;
}

#[async_trait]
impl NotificationQueue for StreamProducer {
    async fn enqueue(&self, job: NotificationJob, opts: JobOptions) -> NotificationResult<String> {
        Ok(self.send(job, opts).await?)
    }
}
