//! Stream Worker Framework
//!
//! A Redis Streams job queue with delayed scheduling, bounded retries and
//! backoff, used to dispatch background work.
//!
//! ## Features
//!
//! - **Job envelopes**: `QueuedJob<J>` carries `JobOptions` and the attempt count
//! - **Delayed jobs**: a sorted set per stream, promoted atomically by a Lua script
//! - **Retries**: fixed or exponential `BackoffPolicy`, rescheduled in one MULTI/EXEC
//! - **Failed retention**: exhausted jobs land in the stream's failed stream
//! - **Consumer groups**: horizontal scaling and reclaim of abandoned entries
//! - **Prometheus metrics**: job outcomes, durations and queue activity
//!
//! ## Example
//!
//! ```ignore
//! use stream_worker::{DispatchQueue, JobOptions, StreamDef, WorkerConfig};
//!
//! let queue = DispatchQueue::open("redis://127.0.0.1:6379").await?;
//!
//! let producer = queue.producer::<MyStream>()?;
//! producer.send(MyJob { .. }, JobOptions::default().with_attempts(3)).await?;
//!
//! let config = WorkerConfig::from_stream_def::<MyStream>().with_max_concurrent_jobs(5);
//! let worker = queue.worker(Arc::new(processor), config)?;
//! worker.run(shutdown_rx).await?;
//!
//! queue.close();
//! ```

mod config;
mod consumer;
mod error;
mod event;
mod job;
pub mod metrics;
mod producer;
mod queue;
mod registry;
mod worker;

// Re-export main types
pub use config::WorkerConfig;
pub use consumer::{StreamConsumer, StreamInfo};
pub use error::{ErrorCategory, StreamError};
pub use event::StreamEvent;
pub use job::{BackoffPolicy, JobOptions, QueuedJob};
pub use metrics::{init_metrics, StreamMetrics};
pub use producer::StreamProducer;
pub use queue::DispatchQueue;
pub use registry::{StreamDef, StreamJob, StreamProcessor};
pub use worker::StreamWorker;
