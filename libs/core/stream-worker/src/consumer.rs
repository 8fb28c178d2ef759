//! Stream consumer for Redis operations
//!
//! Reads job envelopes through a consumer group and applies job outcomes:
//! completion, rescheduling with backoff, and failure retention. Delayed jobs
//! are promoted from the sorted set into the stream by an atomic Lua script.

use crate::config::WorkerConfig;
use crate::error::StreamError;
use crate::event::StreamEvent;
use crate::job::QueuedJob;
use crate::registry::StreamJob;
use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisResult};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Moves every due member of the delayed set into the stream.
///
/// KEYS[1] delayed set, KEYS[2] stream.
/// ARGV[1] now (ms), ARGV[2] limit, ARGV[3] stream MAXLEN.
const PROMOTE_DUE_SCRIPT: &str = r"
local due = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1], 'LIMIT', 0, ARGV[2])
for _, job in ipairs(due) do
  redis.call('ZREM', KEYS[1], job)
  redis.call('XADD', KEYS[2], 'MAXLEN', '~', ARGV[3], '*', 'job', job)
end
return #due
";

type StreamEntries = Vec<(String, Vec<(String, String)>)>;
type StreamReadReply = Vec<(String, StreamEntries)>;

/// Stream consumer for Redis operations
pub struct StreamConsumer {
    redis: Arc<ConnectionManager>,
    config: WorkerConfig,
    promote_script: redis::Script,
}

impl StreamConsumer {
    /// Create a new StreamConsumer
    pub fn new(redis: Arc<ConnectionManager>, config: WorkerConfig) -> Self {
        Self {
            redis,
            config,
            promote_script: redis::Script::new(PROMOTE_DUE_SCRIPT),
        }
    }

    /// Get the stream name
    pub fn stream_name(&self) -> &str {
        &self.config.stream_name
    }

    /// Whether reads block on Redis instead of polling
    pub fn is_blocking(&self) -> bool {
        self.config.blocking_timeout_ms.is_some()
    }

    /// Initialize the consumer group if it doesn't exist
    pub async fn init_consumer_group(&self) -> Result<(), StreamError> {
        let mut conn = (*self.redis).clone();

        let result: RedisResult<()> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => {
                info!(
                    stream = %self.config.stream_name,
                    group = %self.config.consumer_group,
                    "Created consumer group"
                );
            }
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!(
                    stream = %self.config.stream_name,
                    group = %self.config.consumer_group,
                    "Consumer group already exists"
                );
            }
            Err(e) => return Err(StreamError::Redis(e)),
        }

        Ok(())
    }

    /// Move due delayed jobs into the stream. Returns how many were promoted.
    pub async fn promote_due(&self) -> Result<usize, StreamError> {
        let mut conn = (*self.redis).clone();

        let promoted: i64 = self
            .promote_script
            .key(&self.config.delayed_set)
            .key(&self.config.stream_name)
            .arg(Utc::now().timestamp_millis())
            .arg(self.config.promote_batch_size)
            .arg(self.config.max_length)
            .invoke_async(&mut conn)
            .await?;

        if promoted > 0 {
            debug!(
                stream = %self.config.stream_name,
                promoted,
                "Promoted delayed jobs"
            );
        }

        Ok(usize::try_from(promoted).unwrap_or(0))
    }

    /// Read entries delivered to this consumer but never acknowledged
    pub async fn read_pending<J: StreamJob>(
        &self,
        count: usize,
    ) -> Result<Vec<StreamEvent<J>>, StreamError> {
        let mut conn = (*self.redis).clone();

        let result: RedisResult<StreamReadReply> = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(&self.config.consumer_id)
            .arg("COUNT")
            .arg(count)
            .arg("STREAMS")
            .arg(&self.config.stream_name)
            .arg("0")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(streams) => self.parse_stream_response(streams).await,
            Err(e) => Err(StreamError::Redis(e)),
        }
    }

    /// Read new entries from the stream
    pub async fn read_new<J: StreamJob>(
        &self,
        count: usize,
    ) -> Result<Vec<StreamEvent<J>>, StreamError> {
        let mut conn = (*self.redis).clone();

        let mut cmd = redis::cmd("XREADGROUP");
        cmd.arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(&self.config.consumer_id);

        if let Some(timeout) = self.config.blocking_timeout_ms {
            cmd.arg("BLOCK").arg(timeout);
        }

        cmd.arg("COUNT")
            .arg(count)
            .arg("STREAMS")
            .arg(&self.config.stream_name)
            .arg(">");

        let result: RedisResult<Option<StreamReadReply>> = cmd.query_async(&mut conn).await;

        match result {
            Ok(Some(streams)) => self.parse_stream_response(streams).await,
            Ok(None) => Ok(vec![]),
            Err(e) => Err(StreamError::Redis(e)),
        }
    }

    /// Acknowledge a completed entry, deleting it when `remove` is set
    pub async fn complete(&self, stream_id: &str, remove: bool) -> Result<(), StreamError> {
        let mut conn = (*self.redis).clone();
        let mut pipe = redis::pipe();
        pipe.atomic();

        pipe.cmd("XACK")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(stream_id)
            .ignore();
        if remove {
            pipe.cmd("XDEL")
                .arg(&self.config.stream_name)
                .arg(stream_id)
                .ignore();
        }

        pipe.query_async::<()>(&mut conn).await?;

        debug!(stream_id = %stream_id, removed = remove, "Completed job");
        Ok(())
    }

    /// Put the envelope back into the delayed set and retire the current entry.
    ///
    /// Runs as one MULTI/EXEC so the job is never both pending and scheduled.
    pub async fn reschedule<J: StreamJob>(
        &self,
        stream_id: &str,
        job: &QueuedJob<J>,
        delay: Duration,
    ) -> Result<(), StreamError> {
        let mut conn = (*self.redis).clone();
        let job_json = serde_json::to_string(job)?;
        let delay_ms = i64::try_from(delay.as_millis()).unwrap_or(i64::MAX);
        let due_at = Utc::now().timestamp_millis().saturating_add(delay_ms);

        redis::pipe()
            .atomic()
            .cmd("ZADD")
            .arg(&self.config.delayed_set)
            .arg(due_at)
            .arg(&job_json)
            .ignore()
            .cmd("XACK")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(stream_id)
            .ignore()
            .cmd("XDEL")
            .arg(&self.config.stream_name)
            .arg(stream_id)
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;

        debug!(
            stream_id = %stream_id,
            job_id = %job.id,
            attempts_made = job.attempts_made,
            delay_ms,
            "Rescheduled job"
        );
        Ok(())
    }

    /// Retire a failed entry, retaining it in the failed stream unless `remove_on_fail`
    pub async fn fail<J: StreamJob>(
        &self,
        stream_id: &str,
        job: &QueuedJob<J>,
        error: &str,
    ) -> Result<(), StreamError> {
        let mut conn = (*self.redis).clone();
        let mut pipe = redis::pipe();
        pipe.atomic();

        if !job.opts.remove_on_fail {
            let job_json = serde_json::to_string(job)?;
            pipe.cmd("XADD")
                .arg(&self.config.dlq_stream)
                .arg("MAXLEN")
                .arg("~")
                .arg(self.config.max_length)
                .arg("*")
                .arg("job")
                .arg(&job_json)
                .arg("error")
                .arg(error)
                .arg("failed_at")
                .arg(Utc::now().to_rfc3339())
                .ignore();
        }

        pipe.cmd("XACK")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(stream_id)
            .ignore()
            .cmd("XDEL")
            .arg(&self.config.stream_name)
            .arg(stream_id)
            .ignore();

        pipe.query_async::<()>(&mut conn).await?;

        debug!(
            stream_id = %stream_id,
            job_id = %job.id,
            retained = !job.opts.remove_on_fail,
            "Failed job retired"
        );
        Ok(())
    }

    /// Claim entries abandoned by other consumers (crashed workers)
    pub async fn claim_abandoned<J: StreamJob>(
        &self,
        count: usize,
    ) -> Result<Vec<StreamEvent<J>>, StreamError> {
        let mut conn = (*self.redis).clone();

        let pending: Vec<(String, String, i64, i64)> = redis::cmd("XPENDING")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("IDLE")
            .arg(self.config.claim_timeout_ms)
            .arg("-")
            .arg("+")
            .arg(count)
            .query_async(&mut conn)
            .await?;

        let claim_ids: Vec<String> = pending
            .into_iter()
            .filter(|(_, consumer, _, _)| consumer != &self.config.consumer_id)
            .map(|(id, _, _, _)| id)
            .collect();

        if claim_ids.is_empty() {
            return Ok(vec![]);
        }

        let mut cmd = redis::cmd("XCLAIM");
        cmd.arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(&self.config.consumer_id)
            .arg(self.config.claim_timeout_ms);

        for id in &claim_ids {
            cmd.arg(id);
        }

        let entries: StreamEntries = cmd.query_async(&mut conn).await?;
        let events = self.parse_entries(entries).await?;
        if !events.is_empty() {
            warn!(count = events.len(), "Claimed abandoned messages");
        }
        Ok(events)
    }

    /// Get stream info (length, pending, delayed, failed)
    pub async fn stream_info(&self) -> Result<StreamInfo, StreamError> {
        let mut conn = (*self.redis).clone();

        let length: i64 = conn.xlen(&self.config.stream_name).await?;
        let delayed_count: i64 = conn.zcard(&self.config.delayed_set).await?;
        let failed_count: i64 = conn.xlen(&self.config.dlq_stream).await?;

        let pending: RedisResult<(i64, Option<String>, Option<String>, Option<Vec<(String, String)>>)> =
            redis::cmd("XPENDING")
                .arg(&self.config.stream_name)
                .arg(&self.config.consumer_group)
                .query_async(&mut conn)
                .await;

        let pending_count = pending.map(|(count, _, _, _)| count).unwrap_or(0);

        Ok(StreamInfo {
            stream_name: self.config.stream_name.clone(),
            length,
            pending_count,
            delayed_count,
            failed_count,
        })
    }

    async fn parse_stream_response<J: StreamJob>(
        &self,
        streams: StreamReadReply,
    ) -> Result<Vec<StreamEvent<J>>, StreamError> {
        let mut events = Vec::new();
        for (_stream_name, entries) in streams {
            events.extend(self.parse_entries(entries).await?);
        }
        Ok(events)
    }

    /// Parse entries; unreadable ones are acknowledged and deleted so they are
    /// not redelivered forever
    async fn parse_entries<J: StreamJob>(
        &self,
        entries: StreamEntries,
    ) -> Result<Vec<StreamEvent<J>>, StreamError> {
        let mut events = Vec::new();
        let mut malformed = Vec::new();

        for (stream_id, fields) in entries {
            let job_data = fields
                .iter()
                .find(|(k, _)| k == "job")
                .map(|(_, v)| v.as_str());

            match job_data.map(serde_json::from_str::<QueuedJob<J>>) {
                Some(Ok(job)) => events.push(StreamEvent::new(stream_id, job)),
                Some(Err(e)) => {
                    warn!(stream_id = %stream_id, error = %e, "Failed to parse job, discarding");
                    malformed.push(stream_id);
                }
                None => {
                    warn!(
                        stream_id = %stream_id,
                        fields = ?fields.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>(),
                        "Missing 'job' field in message, discarding"
                    );
                    malformed.push(stream_id);
                }
            }
        }

        for stream_id in malformed {
            self.complete(&stream_id, true).await?;
        }

        Ok(events)
    }
}

/// Stream information
#[derive(Debug, Clone)]
pub struct StreamInfo {
    pub stream_name: String,
    pub length: i64,
    pub pending_count: i64,
    pub delayed_count: i64,
    pub failed_count: i64,
}
