//! Prometheus metrics for stream workers
//!
//! Provides observability into job outcomes, retries and queue depth.

use crate::error::{ErrorCategory, StreamError};
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::OnceCell;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::info;

static METRICS_INSTALLED: OnceCell<()> = OnceCell::new();

/// Install the Prometheus recorder with an HTTP scrape listener.
///
/// Must run inside a Tokio runtime. Subsequent calls are no-ops.
pub fn init_metrics(listen_addr: SocketAddr) -> Result<(), StreamError> {
    if METRICS_INSTALLED.get().is_some() {
        return Ok(());
    }

    PrometheusBuilder::new()
        .with_http_listener(listen_addr)
        .install()
        .map_err(|e| StreamError::Config(format!("failed to install Prometheus exporter: {e}")))?;

    let _ = METRICS_INSTALLED.set(());
    info!(%listen_addr, "Prometheus metrics exporter listening");
    Ok(())
}

/// Stream worker metrics helper
#[derive(Clone)]
pub struct StreamMetrics {
    /// Stream name for labeling
    stream_name: String,
    /// Processor name for labeling
    processor_name: String,
}

impl StreamMetrics {
    pub fn new(stream_name: impl Into<String>, processor_name: impl Into<String>) -> Self {
        Self {
            stream_name: stream_name.into(),
            processor_name: processor_name.into(),
        }
    }

    /// Record a job being picked up for an attempt
    pub fn job_received(&self) {
        counter!(
            "stream_worker_jobs_received_total",
            "stream" => self.stream_name.clone(),
            "processor" => self.processor_name.clone()
        )
        .increment(1);
    }

    /// Record a job completing successfully
    pub fn job_processed(&self, duration: Duration) {
        counter!(
            "stream_worker_jobs_processed_total",
            "stream" => self.stream_name.clone(),
            "processor" => self.processor_name.clone(),
            "status" => "success"
        )
        .increment(1);

        self.record_duration(duration);
    }

    /// Record a failed attempt
    pub fn job_failed(&self, category: ErrorCategory, duration: Duration) {
        counter!(
            "stream_worker_jobs_processed_total",
            "stream" => self.stream_name.clone(),
            "processor" => self.processor_name.clone(),
            "status" => "failed"
        )
        .increment(1);

        counter!(
            "stream_worker_job_errors_total",
            "stream" => self.stream_name.clone(),
            "processor" => self.processor_name.clone(),
            "category" => category.as_str()
        )
        .increment(1);

        self.record_duration(duration);
    }

    /// Record a job being rescheduled for another attempt
    pub fn job_retried(&self) {
        counter!(
            "stream_worker_jobs_retried_total",
            "stream" => self.stream_name.clone(),
            "processor" => self.processor_name.clone()
        )
        .increment(1);
    }

    /// Record a job that will not be attempted again
    pub fn job_moved_to_dlq(&self) {
        counter!(
            "stream_worker_jobs_dlq_total",
            "stream" => self.stream_name.clone(),
            "processor" => self.processor_name.clone()
        )
        .increment(1);
    }

    /// Update the in-flight jobs gauge
    pub fn in_flight(&self, count: usize) {
        gauge!(
            "stream_worker_in_flight_jobs",
            "stream" => self.stream_name.clone(),
            "processor" => self.processor_name.clone()
        )
        .set(count as f64);
    }

    /// Record delayed jobs promoted into the stream
    pub fn delayed_promoted(&self, count: usize) {
        counter!(
            "stream_worker_delayed_promoted_total",
            "stream" => self.stream_name.clone()
        )
        .increment(count as u64);
    }

    /// Record messages claimed from abandoned consumers
    pub fn messages_claimed(&self, count: usize) {
        counter!(
            "stream_worker_messages_claimed_total",
            "stream" => self.stream_name.clone(),
            "processor" => self.processor_name.clone()
        )
        .increment(count as u64);
    }

    fn record_duration(&self, duration: Duration) {
        histogram!(
            "stream_worker_job_duration_seconds",
            "stream" => self.stream_name.clone(),
            "processor" => self.processor_name.clone()
        )
        .record(duration.as_secs_f64());
    }
}
