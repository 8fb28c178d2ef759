//! End-to-end dispatch through a real Redis queue.
//!
//! Run with: cargo test -p domain_notifications --test dispatch_test

mod common;

use common::RecordingProvider;
use domain_notifications::*;
use std::sync::Arc;
use std::time::Duration;
use stream_worker::{DispatchQueue, WorkerConfig};
use test_utils::TestRedis;
use tokio::sync::watch;

type Service = NotificationService<InMemoryNotificationRepository, InMemoryTemplateRepository>;

async fn wait_for_status(service: &Service, id: uuid::Uuid, status: NotificationStatus) -> Notification {
    for _ in 0..200 {
        let current = service.get_notification(id).await.unwrap();
        if current.status == status {
            return current;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("notification {id} never reached {status}");
}

#[tokio::test]
async fn test_failed_send_is_retried_by_the_queue() {
    let redis = TestRedis::new().await;
    let queue = DispatchQueue::open(redis.connection_string()).await.unwrap();
    let producer = Arc::new(queue.producer::<NotificationStream>().unwrap());

    let service = Arc::new(
        NotificationService::new(
            InMemoryNotificationRepository::new(),
            TemplateRegistry::new(InMemoryTemplateRepository::new()),
            producer,
        )
        .with_backoff_base(Duration::from_millis(20)),
    );
    let provider = Arc::new(RecordingProvider::failing_first(1));
    let processor = DeliveryProcessor::new(
        service.clone(),
        ProviderRegistry::new().register(provider.clone()),
    );

    let worker = queue
        .worker(
            Arc::new(processor),
            WorkerConfig::from_stream_def::<NotificationStream>()
                .with_blocking(Some(50))
                .with_max_concurrent_jobs(5),
        )
        .unwrap();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(async move { worker.run(shutdown_rx).await });

    let created = service
        .enqueue(EnqueueNotification::email("buyer@example.com", "Your order shipped"))
        .await
        .unwrap();

    let delivered = wait_for_status(&service, created.id, NotificationStatus::Delivered).await;

    shutdown_tx.send(true).unwrap();
    handle.await.unwrap().unwrap();
    queue.close();

    assert_eq!(delivered.attempt_count, 2);
    assert!(delivered.sent_at.is_some());
    assert_eq!(provider.calls(), 2);
    assert_eq!(provider.sent().await.len(), 1);
}

#[tokio::test]
async fn test_enqueue_after_close_keeps_record_and_reports_queue_error() {
    let redis = TestRedis::new().await;
    let queue = DispatchQueue::open(redis.connection_string()).await.unwrap();
    let producer = Arc::new(queue.producer::<NotificationStream>().unwrap());
    let repository = InMemoryNotificationRepository::new();

    let service = NotificationService::new(
        repository.clone(),
        TemplateRegistry::new(InMemoryTemplateRepository::new()),
        producer,
    );

    queue.close();

    let result = service
        .enqueue(EnqueueNotification::email("a@b.com", "hi"))
        .await;

    assert!(matches!(result, Err(NotificationError::Queue(_))));
    let stored = repository.all().await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].status, NotificationStatus::Queued);
}
