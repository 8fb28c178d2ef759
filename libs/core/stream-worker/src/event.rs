//! Stream event wrapper
//!
//! Pairs a job envelope with the stream entry it was read from.

use crate::job::QueuedJob;
use chrono::{DateTime, Utc};

/// A job read from the stream together with its entry metadata
#[derive(Debug, Clone)]
pub struct StreamEvent<J> {
    /// Redis stream entry ID (e.g., "1234567890123-0")
    pub stream_id: String,

    /// The job envelope
    pub job: QueuedJob<J>,

    /// When the entry was added (parsed from the stream ID)
    pub timestamp: DateTime<Utc>,
}

impl<J> StreamEvent<J> {
    pub fn new(stream_id: String, job: QueuedJob<J>) -> Self {
        let timestamp = Self::parse_timestamp(&stream_id);
        Self {
            stream_id,
            job,
            timestamp,
        }
    }

    /// Stream IDs are in format "timestamp_ms-sequence"
    fn parse_timestamp(stream_id: &str) -> DateTime<Utc> {
        stream_id
            .split('-')
            .next()
            .and_then(|ms| ms.parse::<i64>().ok())
            .and_then(DateTime::from_timestamp_millis)
            .unwrap_or_else(Utc::now)
    }
}
