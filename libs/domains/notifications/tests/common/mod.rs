//! Test doubles shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use domain_notifications::{
    Channel, ChannelProvider, NotificationError, NotificationJob, NotificationQueue,
    NotificationResult, OutboundMessage, SendReceipt,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use stream_worker::JobOptions;
use tokio::sync::Mutex;

/// Email provider that records every send and fails the first `fail_first` of them
pub struct RecordingProvider {
    sent: Arc<Mutex<Vec<OutboundMessage>>>,
    calls: AtomicU32,
    fail_first: u32,
}

impl RecordingProvider {
    pub fn new() -> Self {
        Self::failing_first(0)
    }

    pub fn failing_first(fail_first: u32) -> Self {
        Self {
            sent: Arc::new(Mutex::new(Vec::new())),
            calls: AtomicU32::new(0),
            fail_first,
        }
    }

    pub fn always_failing() -> Self {
        Self::failing_first(u32::MAX)
    }

    /// Send calls, successful or not
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Messages that were accepted
    pub async fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl ChannelProvider for RecordingProvider {
    fn channel(&self) -> Channel {
        Channel::Email
    }

    async fn send(&self, message: &OutboundMessage) -> NotificationResult<SendReceipt> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.fail_first {
            return Err(NotificationError::Delivery(format!(
                "SMTP send failed: attempt {call} refused"
            )));
        }

        self.sent.lock().await.push(message.clone());
        Ok(SendReceipt {
            message_id: Some(format!("msg-{call}")),
        })
    }

    fn name(&self) -> &'static str {
        "recording"
    }

    async fn health_check(&self) -> NotificationResult<bool> {
        Ok(true)
    }
}

/// Queue that keeps submitted jobs in memory
#[derive(Default)]
pub struct RecordingQueue {
    jobs: Mutex<Vec<(NotificationJob, JobOptions)>>,
}

impl RecordingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn jobs(&self) -> Vec<(NotificationJob, JobOptions)> {
        self.jobs.lock().await.clone()
    }
}

#[async_trait]
impl NotificationQueue for RecordingQueue {
    async fn enqueue(&self, job: NotificationJob, opts: JobOptions) -> NotificationResult<String> {
        let mut jobs = self.jobs.lock().await;
        jobs.push((job.clone(), opts));
        Ok(format!("job-{}", jobs.len()))
    }
}
