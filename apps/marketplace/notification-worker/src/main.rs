//! Notification Worker - Entry Point
//!
//! Background worker that delivers queued notifications from the Redis stream.

#[tokio::main]
async fn main() -> eyre::Result<()> {
    notification_worker::run().await
}
