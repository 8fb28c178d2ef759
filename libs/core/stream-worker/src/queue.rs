//! Explicitly opened queue client.
//!
//! `DispatchQueue` owns the Redis connection shared by producers and workers.
//! Closing it rejects further enqueues from every producer it handed out.

use crate::config::WorkerConfig;
use crate::error::StreamError;
use crate::producer::StreamProducer;
use crate::registry::{StreamDef, StreamJob, StreamProcessor};
use crate::worker::StreamWorker;
use redis::aio::ConnectionManager;
use redis::Client;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

/// Connection handle for one or more job streams.
pub struct DispatchQueue {
    redis: Arc<ConnectionManager>,
    open: Arc<AtomicBool>,
}

impl DispatchQueue {
    /// Connect to Redis and verify the connection with PING.
    pub async fn open(url: &str) -> Result<Self, StreamError> {
        let client = Client::open(url)?;
        let manager = ConnectionManager::new(client).await?;
        let queue = Self::from_connection(manager);
        queue.ping().await?;

        info!("Dispatch queue opened");
        Ok(queue)
    }

    /// Wrap an existing connection.
    pub fn from_connection(redis: ConnectionManager) -> Self {
        Self {
            redis: Arc::new(redis),
            open: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Producer for the stream described by `S`.
    pub fn producer<S: StreamDef>(&self) -> Result<StreamProducer, StreamError> {
        if !self.is_open() {
            return Err(StreamError::Closed);
        }
        Ok(StreamProducer::for_stream_def::<S>(
            Arc::clone(&self.redis),
            Arc::clone(&self.open),
        ))
    }

    /// Worker consuming the stream named in `config`.
    pub fn worker<J, P>(
        &self,
        processor: Arc<P>,
        config: WorkerConfig,
    ) -> Result<StreamWorker<J, P>, StreamError>
    where
        J: StreamJob,
        P: StreamProcessor<J> + 'static,
    {
        if !self.is_open() {
            return Err(StreamError::Closed);
        }
        Ok(StreamWorker::with_arc_processor(
            (*self.redis).clone(),
            processor,
            config,
        ))
    }

    pub async fn ping(&self) -> Result<(), StreamError> {
        let mut conn = (*self.redis).clone();
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }

    /// Stop accepting jobs. The connection is released once the last producer
    /// and worker holding it are dropped.
    pub fn close(&self) {
        if self.open.swap(false, Ordering::AcqRel) {
            info!("Dispatch queue closed");
        }
    }
}
