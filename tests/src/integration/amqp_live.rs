//! # Live-Broker Integration Tests
//!
//! Exercise the AMQP transport against a real broker. All tests here are
//! ignored by default; run them with a RabbitMQ instance on
//! `amqp://localhost:5672`:
//!
//! ```bash
//! cargo test -p warden-tests -- --ignored
//! ```

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use serde::{Deserialize, Serialize};
    use tokio::time::timeout;
    use tokio_util::sync::CancellationToken;
    use warden_messaging::config::AmqpSettings;
    use warden_messaging::{
        handler_fn, permanent_failure_fn, FailurePolicy, Handler, MessagingFactory, Publisher,
        Subscriber,
    };
    use warden_messaging_amqp::AmqpMessaging;

    const BROKER_URL: &str = "amqp://localhost:5672";

    // Unique payload marker per test run: destinations are durable and
    // shared between runs, so handlers filter out leftovers.
    fn run_marker() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    struct AuditEvent {
        run: String,
        action: String,
    }

    fn settings() -> AmqpSettings {
        AmqpSettings {
            url: BROKER_URL.to_string(),
            ..AmqpSettings::default()
        }
    }

    async fn wait_for(counter: &AtomicU32, expected: u32) {
        timeout(Duration::from_secs(5), async {
            while counter.load(Ordering::SeqCst) < expected {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("expected deliveries did not arrive in time");
    }

    fn marked_handler(run: String, counter: Arc<AtomicU32>) -> Handler<AuditEvent> {
        handler_fn(move |event: AuditEvent, _delivery| {
            let counter = counter.clone();
            let run = run.clone();
            async move {
                if event.run == run {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
                Ok(())
            }
        })
    }

    #[tokio::test]
    #[ignore = "requires a live broker at amqp://localhost:5672"]
    async fn test_topic_round_trip() {
        let factory = AmqpMessaging::new(settings());
        let cancel = CancellationToken::new();
        let run = run_marker();

        let received = Arc::new(AtomicU32::new(0));
        let subscriber = factory.topic_subscriber::<AuditEvent>();
        subscriber
            .subscribe(marked_handler(run.clone(), received.clone()), &cancel)
            .await
            .unwrap();

        let publisher = factory.topic_publisher::<AuditEvent>();
        for i in 0..3 {
            publisher
                .publish(
                    &AuditEvent {
                        run: run.clone(),
                        action: format!("login-{i}"),
                    },
                    &cancel,
                )
                .await
                .unwrap();
        }

        wait_for(&received, 3).await;
        subscriber.unsubscribe(&cancel).await.unwrap();
        factory.close().await.unwrap();
    }

    #[tokio::test]
    #[ignore = "requires a live broker at amqp://localhost:5672"]
    async fn test_failure_budget_over_the_wire() {
        const MAX_FAILURES: u32 = 2;

        let factory = AmqpMessaging::new(settings());
        let cancel = CancellationToken::new();
        let run = run_marker();

        let attempts = Arc::new(AtomicU32::new(0));
        let hook_fires = Arc::new(AtomicU32::new(0));

        let attempt_counter = attempts.clone();
        let handler_run = run.clone();
        let handler: Handler<AuditEvent> = handler_fn(move |event: AuditEvent, _delivery| {
            let attempt_counter = attempt_counter.clone();
            let handler_run = handler_run.clone();
            async move {
                if event.run == handler_run {
                    attempt_counter.fetch_add(1, Ordering::SeqCst);
                    anyhow::bail!("audit store unavailable")
                }
                Ok(())
            }
        });

        let hook_counter = hook_fires.clone();
        let policy = FailurePolicy::new(MAX_FAILURES).with_permanent_failure(
            permanent_failure_fn(move |_event: AuditEvent, _err, _delivery| {
                let hook_counter = hook_counter.clone();
                async move {
                    hook_counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }),
        );

        // The retry republish carries the incremented envelope header
        // across the broker, so the budget holds even though each
        // delivery re-deserializes a fresh payload.
        let subscriber = factory.queue_subscriber::<AuditEvent>();
        subscriber
            .subscribe_with(handler, policy, &cancel)
            .await
            .unwrap();

        let publisher = factory.queue_publisher::<AuditEvent>();
        publisher
            .publish(
                &AuditEvent {
                    run,
                    action: "forward".to_string(),
                },
                &cancel,
            )
            .await
            .unwrap();

        wait_for(&hook_fires, 1).await;
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), MAX_FAILURES + 1);
        assert_eq!(hook_fires.load(Ordering::SeqCst), 1);

        subscriber.unsubscribe(&cancel).await.unwrap();
        factory.close().await.unwrap();
    }

    #[tokio::test]
    #[ignore = "requires a live broker at amqp://localhost:5672"]
    async fn test_concurrent_first_use_dials_once() {
        let factory = AmqpMessaging::new(settings());
        let manager = factory.connection().clone();

        let (a, b, c) = tokio::join!(
            manager.create_channel(),
            manager.create_channel(),
            manager.create_channel()
        );
        a.unwrap();
        b.unwrap();
        c.unwrap();

        assert_eq!(manager.dial_count(), 1);
        factory.close().await.unwrap();
    }
}
