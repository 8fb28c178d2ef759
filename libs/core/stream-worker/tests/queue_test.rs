//! Integration tests for the dispatch queue against a real Redis.
//!
//! Run with: cargo test -p stream-worker --test queue_test

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use stream_worker::{
    BackoffPolicy, DispatchQueue, JobOptions, StreamDef, StreamError, StreamJob, StreamProcessor,
    StreamWorker, WorkerConfig,
};
use test_utils::TestRedis;
use tokio::sync::watch;

struct TestStream;

impl StreamDef for TestStream {
    const STREAM_NAME: &'static str = "test:dispatch";
    const CONSUMER_GROUP: &'static str = "test_workers";
    const DLQ_STREAM: &'static str = "test:failed";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PingJob {
    id: String,
}

impl StreamJob for PingJob {
    fn job_id(&self) -> String {
        self.id.clone()
    }
}

/// Fails the first `fail_times` calls, then succeeds.
struct FlakyProcessor {
    calls: AtomicU32,
    fail_times: u32,
    permanent: bool,
}

impl FlakyProcessor {
    fn new(fail_times: u32) -> Self {
        Self {
            calls: AtomicU32::new(0),
            fail_times,
            permanent: false,
        }
    }

    fn permanent() -> Self {
        Self {
            calls: AtomicU32::new(0),
            fail_times: u32::MAX,
            permanent: true,
        }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StreamProcessor<PingJob> for FlakyProcessor {
    async fn process(&self, _job: &PingJob) -> Result<(), StreamError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.fail_times {
            if self.permanent {
                return Err(StreamError::permanent("rejected"));
            }
            return Err(StreamError::transient(format!("failure {call}")));
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "flaky"
    }
}

fn test_config() -> WorkerConfig {
    WorkerConfig::from_stream_def::<TestStream>()
        .with_blocking(Some(50))
        .with_poll_interval_ms(20)
        .with_max_concurrent_jobs(2)
}

fn fast_retry(attempts: u32) -> JobOptions {
    JobOptions::default()
        .with_attempts(attempts)
        .with_backoff(BackoffPolicy::fixed(Duration::from_millis(20)))
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("condition not met within 5s");
}

fn spawn_worker(
    worker: StreamWorker<PingJob, FlakyProcessor>,
) -> (watch::Sender<bool>, tokio::task::JoinHandle<Result<(), StreamError>>) {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(async move { worker.run(shutdown_rx).await });
    (shutdown_tx, handle)
}

#[tokio::test]
async fn test_job_retried_until_success() {
    let redis = TestRedis::new().await;
    let queue = DispatchQueue::open(redis.connection_string()).await.unwrap();
    let processor = Arc::new(FlakyProcessor::new(1));

    let producer = queue.producer::<TestStream>().unwrap();
    producer
        .send(PingJob { id: "a".into() }, fast_retry(3))
        .await
        .unwrap();

    let worker = queue.worker(processor.clone(), test_config()).unwrap();
    assert_eq!(worker.consumer().stream_name(), "test:dispatch");
    let (shutdown, handle) = spawn_worker(worker);

    wait_until(|| processor.calls() >= 2).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    shutdown.send(true).unwrap();
    handle.await.unwrap().unwrap();

    assert_eq!(processor.calls(), 2);
    assert_eq!(producer.delayed_count().await.unwrap(), 0);
    // remove_on_complete deletes the entry
    assert_eq!(producer.stream_length().await.unwrap(), 0);
}

#[tokio::test]
async fn test_exhausted_job_retained_in_failed_stream() {
    let redis = TestRedis::new().await;
    let queue = DispatchQueue::open(redis.connection_string()).await.unwrap();
    let processor = Arc::new(FlakyProcessor::new(u32::MAX));

    let producer = queue.producer::<TestStream>().unwrap();
    producer
        .send(PingJob { id: "b".into() }, fast_retry(3))
        .await
        .unwrap();

    let worker = queue.worker(processor.clone(), test_config()).unwrap();
    let consumer = worker.consumer();
    let (shutdown, handle) = spawn_worker(worker);

    wait_until(|| processor.calls() >= 3).await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    shutdown.send(true).unwrap();
    handle.await.unwrap().unwrap();

    assert_eq!(processor.calls(), 3);

    let info = consumer.stream_info().await.unwrap();
    assert_eq!(info.stream_name, "test:dispatch");
    // remove_on_fail is off, so the job is kept in the failed stream
    assert_eq!(info.failed_count, 1);
    assert_eq!(info.delayed_count, 0);
    assert_eq!(info.pending_count, 0);
    assert_eq!(info.length, 0);
    assert_eq!(producer.delayed_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_permanent_error_is_not_retried() {
    let redis = TestRedis::new().await;
    let queue = DispatchQueue::open(redis.connection_string()).await.unwrap();
    let processor = Arc::new(FlakyProcessor::permanent());

    let producer = queue.producer::<TestStream>().unwrap();
    producer
        .send(PingJob { id: "c".into() }, fast_retry(5))
        .await
        .unwrap();

    let worker = queue.worker(processor.clone(), test_config()).unwrap();
    let (shutdown, handle) = spawn_worker(worker);

    wait_until(|| processor.calls() >= 1).await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    shutdown.send(true).unwrap();
    handle.await.unwrap().unwrap();

    assert_eq!(processor.calls(), 1);
    assert_eq!(producer.delayed_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_delayed_job_waits_until_due() {
    let redis = TestRedis::new().await;
    let queue = DispatchQueue::open(redis.connection_string()).await.unwrap();
    let processor = Arc::new(FlakyProcessor::new(0));

    let producer = queue.producer::<TestStream>().unwrap();
    producer
        .send(
            PingJob { id: "d".into() },
            JobOptions::default().with_delay(Duration::from_millis(600)),
        )
        .await
        .unwrap();
    assert_eq!(producer.delayed_count().await.unwrap(), 1);
    assert_eq!(producer.stream_length().await.unwrap(), 0);

    let worker = queue.worker(processor.clone(), test_config()).unwrap();
    worker.consumer().init_consumer_group().await.unwrap();
    let info = worker.consumer().stream_info().await.unwrap();
    assert_eq!(info.delayed_count, 1);
    assert_eq!(info.length, 0);
    assert_eq!(info.pending_count, 0);
    let (shutdown, handle) = spawn_worker(worker);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(processor.calls(), 0);

    wait_until(|| processor.calls() == 1).await;

    shutdown.send(true).unwrap();
    handle.await.unwrap().unwrap();

    assert_eq!(producer.delayed_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_closed_queue_rejects_jobs() {
    let redis = TestRedis::new().await;
    let queue = DispatchQueue::open(redis.connection_string()).await.unwrap();
    let producer = queue.producer::<TestStream>().unwrap();

    queue.close();

    assert!(!queue.is_open());
    let result = producer
        .send(PingJob { id: "e".into() }, JobOptions::default())
        .await;
    assert!(matches!(result, Err(StreamError::Closed)));
    assert!(matches!(
        queue.producer::<TestStream>(),
        Err(StreamError::Closed)
    ));
}
