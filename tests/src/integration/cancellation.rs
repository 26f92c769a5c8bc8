//! # Cancellation Integration Tests
//!
//! A token cancelled before the call aborts before any I/O with a
//! cancellation error; cancellation is distinct from failure and is
//! never converted into a retry.

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use serde::{Deserialize, Serialize};
    use tokio_util::sync::CancellationToken;
    use warden_messaging::config::AmqpSettings;
    use warden_messaging::{
        handler_fn, Handler, MemoryMessaging, MessagingError, MessagingFactory, Publisher,
        Subscriber,
    };
    use warden_messaging_amqp::AmqpMessaging;

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    struct AuditEvent {
        action: String,
    }

    fn cancelled() -> CancellationToken {
        let token = CancellationToken::new();
        token.cancel();
        token
    }

    #[tokio::test]
    async fn test_pre_cancelled_memory_publish_is_rejected_without_io() {
        let factory = MemoryMessaging::new();
        let publisher = factory.topic_publisher::<AuditEvent>();

        let result = publisher.publish(&AuditEvent::default(), &cancelled()).await;
        assert!(matches!(result, Err(MessagingError::Cancelled)));
        assert_eq!(factory.broker().published_count(), 0);
    }

    #[tokio::test]
    async fn test_pre_cancelled_amqp_publish_is_rejected_without_io() {
        // Settings carry no connection string: if the publisher touched
        // configuration or the network before checking the token, this
        // would surface MissingConnectionString instead of Cancelled.
        let factory = AmqpMessaging::new(AmqpSettings::default());
        let publisher = factory.topic_publisher::<AuditEvent>();

        let result = publisher.publish(&AuditEvent::default(), &cancelled()).await;
        assert!(matches!(result, Err(MessagingError::Cancelled)));
        assert_eq!(factory.connection().dial_count(), 0);
    }

    #[tokio::test]
    async fn test_pre_cancelled_subscribe_is_rejected() {
        let factory = MemoryMessaging::new();
        let subscriber = factory.topic_subscriber::<AuditEvent>();

        let handler: Handler<AuditEvent> =
            handler_fn(|_event: AuditEvent, _delivery| async { Ok(()) });
        let result = subscriber.subscribe(handler, &cancelled()).await;
        assert!(matches!(result, Err(MessagingError::Cancelled)));
    }

    #[tokio::test]
    async fn test_cancelling_the_subscription_stops_the_loop() {
        let factory = MemoryMessaging::new();
        let cancel = CancellationToken::new();

        let received = Arc::new(AtomicU32::new(0));
        let counter = received.clone();
        let handler: Handler<AuditEvent> = handler_fn(move |_event: AuditEvent, _delivery| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        let subscriber = factory.topic_subscriber::<AuditEvent>();
        subscriber.subscribe(handler, &cancel).await.unwrap();

        cancel.cancel();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let publisher = factory.topic_publisher::<AuditEvent>();
        // The loop is gone; publishing with a fresh token must not
        // reach the dead handler.
        let fresh = CancellationToken::new();
        publisher
            .publish(&AuditEvent::default(), &fresh)
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(received.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_connection_string_still_surfaces_without_cancellation() {
        // Same setup as the pre-cancelled AMQP test, live token: the
        // configuration error is the one that must surface now.
        let factory = AmqpMessaging::new(AmqpSettings::default());
        let publisher = factory.topic_publisher::<AuditEvent>();
        let cancel = CancellationToken::new();

        let result = publisher.publish(&AuditEvent::default(), &cancel).await;
        assert!(matches!(
            result,
            Err(MessagingError::MissingConnectionString)
        ));
    }
}
