//! Stream definitions for the notifications domain.

use stream_worker::StreamDef;

/// Delivery jobs stream definition.
///
/// Consumed by the notification-worker.
pub struct NotificationStream;

impl StreamDef for NotificationStream {
    const STREAM_NAME: &'static str = "notifications:dispatch";

    const CONSUMER_GROUP: &'static str = "notification_workers";

    /// Jobs that ran out of attempts, kept for inspection
    const DLQ_STREAM: &'static str = "notifications:failed";

    const MAX_LENGTH: i64 = 100_000;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_stream_def() {
        assert_eq!(NotificationStream::stream_name(), "notifications:dispatch");
        assert_eq!(NotificationStream::consumer_group(), "notification_workers");
        assert_eq!(NotificationStream::dlq_stream(), "notifications:failed");
        assert_eq!(NotificationStream::delayed_set(), "notifications:dispatch:delayed");
    }
}
