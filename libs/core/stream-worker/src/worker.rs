//! The generic StreamWorker implementation.
//!
//! Each loop iteration promotes due delayed jobs, reclaims abandoned entries,
//! reads a batch and runs it through the processor with bounded concurrency.
//! The outcome of every attempt is written back before the worker moves on, so
//! a retry is only scheduled once the previous attempt has finished.

use crate::config::WorkerConfig;
use crate::consumer::StreamConsumer;
use crate::error::StreamError;
use crate::event::StreamEvent;
use crate::metrics::StreamMetrics;
use crate::registry::{StreamJob, StreamProcessor};
use redis::aio::ConnectionManager;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

const MAX_BACKOFF_SECS: u64 = 30;

/// Generic stream worker that processes jobs using a processor.
///
/// # Concurrency
///
/// Jobs of one batch run in parallel, at most `max_concurrent_jobs` at a time:
///
/// ```rust,ignore
/// let config = WorkerConfig::from_stream_def::<NotificationStream>()
///     .with_max_concurrent_jobs(5);
/// let worker = StreamWorker::new(redis, processor, config);
/// worker.run(shutdown_rx).await?;
/// ```
pub struct StreamWorker<J, P>
where
    J: StreamJob,
    P: StreamProcessor<J>,
{
    consumer: Arc<StreamConsumer>,
    processor: Arc<P>,
    config: WorkerConfig,
    metrics: StreamMetrics,
    concurrency_semaphore: Arc<Semaphore>,
    in_flight: Arc<AtomicUsize>,
    _phantom: PhantomData<J>,
}

impl<J, P> StreamWorker<J, P>
where
    J: StreamJob,
    P: StreamProcessor<J> + 'static,
{
    /// Create a new stream worker.
    pub fn new(redis: ConnectionManager, processor: P, config: WorkerConfig) -> Self {
        Self::with_arc_processor(redis, Arc::new(processor), config)
    }

    /// Create a new stream worker with an Arc processor.
    pub fn with_arc_processor(
        redis: ConnectionManager,
        processor: Arc<P>,
        config: WorkerConfig,
    ) -> Self {
        let consumer = Arc::new(StreamConsumer::new(Arc::new(redis), config.clone()));
        let concurrency_semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs));
        let metrics = StreamMetrics::new(&config.stream_name, processor.name());

        Self {
            consumer,
            processor,
            config,
            metrics,
            concurrency_semaphore,
            in_flight: Arc::new(AtomicUsize::new(0)),
            _phantom: PhantomData,
        }
    }

    /// Shared handle to the consumer, usable for inspection while the worker runs.
    pub fn consumer(&self) -> Arc<StreamConsumer> {
        Arc::clone(&self.consumer)
    }

    /// Run the worker loop until the shutdown flag flips to `true`.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), StreamError> {
        info!(
            consumer_id = %self.config.consumer_id,
            stream = %self.config.stream_name,
            group = %self.config.consumer_group,
            processor = %self.processor.name(),
            max_concurrent_jobs = self.config.max_concurrent_jobs,
            batch_size = self.config.batch_size,
            blocking = self.consumer.is_blocking(),
            "Starting stream worker"
        );

        self.consumer.init_consumer_group().await?;

        match self.processor.health_check().await {
            Ok(true) => debug!(processor = %self.processor.name(), "Processor healthy"),
            Ok(false) => warn!(processor = %self.processor.name(), "Processor reported unhealthy"),
            Err(e) => warn!(processor = %self.processor.name(), error = %e, "Processor health check failed"),
        }

        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        let claim_interval = Duration::from_millis(self.config.claim_timeout_ms);
        let mut last_claim: Option<Instant> = None;
        let mut consecutive_errors: u32 = 0;

        loop {
            if *shutdown.borrow() {
                info!("Received shutdown signal, stopping worker");
                break;
            }

            let claim_due = last_claim.is_none_or(|at| at.elapsed() >= claim_interval);

            match self.process_batch(claim_due).await {
                Ok(processed) => {
                    if claim_due {
                        last_claim = Some(Instant::now());
                    }
                    if consecutive_errors > 0 {
                        info!(consecutive_errors, "Connection recovered");
                        consecutive_errors = 0;
                    }
                    if processed > 0 || self.consumer.is_blocking() {
                        continue;
                    }
                    if Self::sleep_or_shutdown(&mut shutdown, poll_interval).await {
                        break;
                    }
                }
                Err(e) => {
                    consecutive_errors = consecutive_errors.saturating_add(1);

                    let backoff = if e.is_nogroup_error() {
                        warn!("Consumer group missing, recreating");
                        if let Err(create_err) = self.consumer.init_consumer_group().await {
                            error!(error = %create_err, "Failed to recreate consumer group");
                        }
                        Duration::from_secs(1)
                    } else if e.is_connection_error() {
                        let secs = 2u64.pow(consecutive_errors.min(5)).min(MAX_BACKOFF_SECS);
                        warn!(
                            error = %e,
                            consecutive_errors,
                            backoff_secs = secs,
                            "Redis connection error, backing off"
                        );
                        Duration::from_secs(secs)
                    } else {
                        error!(error = %e, "Error processing batch");
                        Duration::from_secs(1)
                    };

                    if Self::sleep_or_shutdown(&mut shutdown, backoff).await {
                        break;
                    }
                }
            }
        }

        info!("Stream worker stopped");
        Ok(())
    }

    /// Returns `true` when shutdown was requested while waiting.
    async fn sleep_or_shutdown(shutdown: &mut watch::Receiver<bool>, wait: Duration) -> bool {
        tokio::select! {
            changed = shutdown.changed() => {
                // A dropped sender also means stop.
                changed.is_err() || *shutdown.borrow()
            }
            _ = tokio::time::sleep(wait) => false,
        }
    }

    /// Promote, read and process one batch. Returns the number of jobs processed.
    async fn process_batch(&self, claim_abandoned: bool) -> Result<usize, StreamError> {
        let promoted = self.consumer.promote_due().await?;
        if promoted > 0 {
            self.metrics.delayed_promoted(promoted);
        }

        let batch_size = self.config.batch_size;
        let mut events: Vec<StreamEvent<J>> = self.consumer.read_pending(batch_size).await?;

        if claim_abandoned {
            let claimed = self.consumer.claim_abandoned::<J>(batch_size).await?;
            if !claimed.is_empty() {
                self.metrics.messages_claimed(claimed.len());
            }
            events.extend(claimed);
        }

        if events.is_empty() {
            events = self.consumer.read_new(batch_size).await?;
        }

        let total = events.len();
        if total == 0 {
            return Ok(0);
        }

        let mut join_set: JoinSet<()> = JoinSet::new();

        for event in events {
            let permit = Arc::clone(&self.concurrency_semaphore)
                .acquire_owned()
                .await
                .map_err(|_| StreamError::Internal("worker semaphore closed".to_string()))?;

            let consumer = Arc::clone(&self.consumer);
            let processor = Arc::clone(&self.processor);
            let metrics = self.metrics.clone();
            let in_flight = Arc::clone(&self.in_flight);

            join_set.spawn(async move {
                let _permit = permit;
                metrics.in_flight(in_flight.fetch_add(1, Ordering::SeqCst) + 1);

                Self::process_event(&consumer, processor.as_ref(), &metrics, event).await;

                metrics.in_flight(in_flight.fetch_sub(1, Ordering::SeqCst).saturating_sub(1));
            });
        }

        while let Some(joined) = join_set.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Job task panicked");
            }
        }

        Ok(total)
    }

    /// Run one attempt and record its outcome on the queue.
    async fn process_event(
        consumer: &StreamConsumer,
        processor: &P,
        metrics: &StreamMetrics,
        event: StreamEvent<J>,
    ) {
        let StreamEvent {
            stream_id, mut job, ..
        } = event;
        let attempt = job.begin_attempt();
        let payload_id = job.data.job_id();

        debug!(
            stream_id = %stream_id,
            job_id = %job.id,
            payload_id = %payload_id,
            attempt,
            max_attempts = job.opts.attempts,
            "Processing job"
        );

        metrics.job_received();
        let start = Instant::now();
        let outcome = processor.process(&job.data).await;
        let elapsed = start.elapsed();

        let recorded = match outcome {
            Ok(()) => {
                metrics.job_processed(elapsed);
                debug!(job_id = %job.id, payload_id = %payload_id, attempt, "Job completed");
                consumer
                    .complete(&stream_id, job.opts.remove_on_complete)
                    .await
            }
            Err(e) => {
                let category = e.category();
                metrics.job_failed(category, elapsed);

                match job.next_retry_delay().filter(|_| e.should_retry()) {
                    Some(delay) => {
                        warn!(
                            job_id = %job.id,
                            payload_id = %payload_id,
                            attempt,
                            max_attempts = job.opts.attempts,
                            delay_ms = %delay.as_millis(),
                            error = %e,
                            "Job attempt failed, scheduling retry"
                        );
                        metrics.job_retried();
                        consumer.reschedule(&stream_id, &job, delay).await
                    }
                    None => {
                        error!(
                            job_id = %job.id,
                            payload_id = %payload_id,
                            attempt,
                            max_attempts = job.opts.attempts,
                            error = %e,
                            error_category = ?category,
                            "Job failed, no attempts left"
                        );
                        metrics.job_moved_to_dlq();
                        consumer.fail(&stream_id, &job, &e.to_string()).await
                    }
                }
            }
        };

        if let Err(e) = recorded {
            error!(
                stream_id = %stream_id,
                job_id = %job.id,
                error = %e,
                "Failed to record job outcome, entry stays pending"
            );
        }
    }
}
