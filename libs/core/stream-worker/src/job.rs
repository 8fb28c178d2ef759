//! Job envelope and per-job queue options.
//!
//! Every payload travels inside a [`QueuedJob`], which carries the options it was
//! enqueued with and how many attempts were already made. The worker reads those
//! fields to decide between completing, rescheduling and failing the job.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Largest exponent applied by exponential backoff.
const MAX_BACKOFF_EXPONENT: u32 = 20;

/// Delay policy between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackoffPolicy {
    /// Same delay before every retry.
    Fixed { delay_ms: u64 },
    /// `base_ms * 2^(attempts_made - 1)`.
    Exponential { base_ms: u64 },
}

impl BackoffPolicy {
    pub fn fixed(delay: Duration) -> Self {
        BackoffPolicy::Fixed {
            delay_ms: duration_ms(delay),
        }
    }

    pub fn exponential(base: Duration) -> Self {
        BackoffPolicy::Exponential {
            base_ms: duration_ms(base),
        }
    }

    /// Delay before the next attempt once `attempts_made` attempts have run.
    pub fn delay_for(&self, attempts_made: u32) -> Duration {
        match *self {
            BackoffPolicy::Fixed { delay_ms } => Duration::from_millis(delay_ms),
            BackoffPolicy::Exponential { base_ms } => {
                let exponent = attempts_made.saturating_sub(1).min(MAX_BACKOFF_EXPONENT);
                Duration::from_millis(base_ms.saturating_mul(1u64 << exponent))
            }
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        BackoffPolicy::Exponential { base_ms: 1000 }
    }
}

/// Options a job is enqueued with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOptions {
    /// Delay before the first attempt.
    pub delay_ms: u64,
    /// Total attempts allowed, including the first one.
    pub attempts: u32,
    pub backoff: BackoffPolicy,
    /// Delete the stream entry once the job completes.
    pub remove_on_complete: bool,
    /// Drop the job instead of retaining it in the failed stream.
    pub remove_on_fail: bool,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            delay_ms: 0,
            attempts: 1,
            backoff: BackoffPolicy::default(),
            remove_on_complete: true,
            remove_on_fail: false,
        }
    }
}

impl JobOptions {
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay_ms = duration_ms(delay);
        self
    }

    /// Set the attempt budget (at least one).
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_remove_on_complete(mut self, remove: bool) -> Self {
        self.remove_on_complete = remove;
        self
    }

    pub fn with_remove_on_fail(mut self, remove: bool) -> Self {
        self.remove_on_fail = remove;
        self
    }
}

/// A payload plus its queue bookkeeping, serialized into the stream's `job` field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedJob<J> {
    /// Queue-level identifier, stable across retries.
    pub id: String,
    pub data: J,
    pub opts: JobOptions,
    /// Attempts started so far.
    pub attempts_made: u32,
    pub enqueued_at: DateTime<Utc>,
}

impl<J> QueuedJob<J> {
    pub fn new(data: J, opts: JobOptions) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            data,
            opts,
            attempts_made: 0,
            enqueued_at: Utc::now(),
        }
    }

    /// Record the start of an attempt and return its 1-based number.
    pub fn begin_attempt(&mut self) -> u32 {
        self.attempts_made = self.attempts_made.saturating_add(1);
        self.attempts_made
    }

    pub fn has_attempts_remaining(&self) -> bool {
        self.attempts_made < self.opts.attempts
    }

    /// Backoff before the next attempt, or `None` when the budget is spent.
    pub fn next_retry_delay(&self) -> Option<Duration> {
        self.has_attempts_remaining()
            .then(|| self.opts.backoff.delay_for(self.attempts_made))
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
