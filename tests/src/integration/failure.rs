//! # Failure Policy Integration Tests
//!
//! The retry budget observed end-to-end through a transport, not just
//! against the policy in isolation: an always-failing handler runs at
//! most `max + 1` times before the permanent-failure callback fires
//! exactly once, and a success mid-chain resets the counter.

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use serde::{Deserialize, Serialize};
    use tokio::time::timeout;
    use tokio_util::sync::CancellationToken;
    use warden_messaging::{
        handler_fn, permanent_failure_fn, FailurePolicy, Handler, MemoryMessaging,
        MessagingFactory, Publisher, Subscriber,
    };

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    struct LogForwardingEvent {
        line: String,
    }

    async fn wait_for(counter: &AtomicU32, expected: u32) {
        timeout(Duration::from_secs(2), async {
            while counter.load(Ordering::SeqCst) < expected {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("expected count not reached in time");
    }

    #[tokio::test]
    async fn test_always_failing_handler_runs_max_plus_one_times() {
        const MAX_FAILURES: u32 = 3;

        let factory = MemoryMessaging::new();
        let cancel = CancellationToken::new();

        let attempts = Arc::new(AtomicU32::new(0));
        let hook_fires = Arc::new(AtomicU32::new(0));

        let attempt_counter = attempts.clone();
        let handler: Handler<LogForwardingEvent> =
            handler_fn(move |_event: LogForwardingEvent, _delivery| {
                let attempt_counter = attempt_counter.clone();
                async move {
                    attempt_counter.fetch_add(1, Ordering::SeqCst);
                    anyhow::bail!("sink unavailable")
                }
            });

        let hook_counter = hook_fires.clone();
        let policy = FailurePolicy::new(MAX_FAILURES).with_permanent_failure(
            permanent_failure_fn(move |_event: LogForwardingEvent, _err, _delivery| {
                let hook_counter = hook_counter.clone();
                async move {
                    hook_counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }),
        );

        let subscriber = factory.queue_subscriber::<LogForwardingEvent>();
        subscriber
            .subscribe_with(handler, policy, &cancel)
            .await
            .unwrap();

        let publisher = factory.queue_publisher::<LogForwardingEvent>();
        publisher
            .publish(&LogForwardingEvent::default(), &cancel)
            .await
            .unwrap();

        wait_for(&hook_fires, 1).await;
        // No redelivery after permanent failure.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), MAX_FAILURES + 1);
        assert_eq!(hook_fires.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_success_after_partial_failure_resets_the_counter() {
        let factory = MemoryMessaging::new();
        let cancel = CancellationToken::new();

        // Fails twice, then succeeds, for each published message.
        let attempts = Arc::new(AtomicU32::new(0));
        let counts_seen = Arc::new(tokio::sync::Mutex::new(Vec::new()));
        let hook_fires = Arc::new(AtomicU32::new(0));

        let attempt_counter = attempts.clone();
        let seen = counts_seen.clone();
        let handler: Handler<LogForwardingEvent> =
            handler_fn(move |_event: LogForwardingEvent, delivery| {
                let attempt_counter = attempt_counter.clone();
                let seen = seen.clone();
                async move {
                    let attempt = attempt_counter.fetch_add(1, Ordering::SeqCst) + 1;
                    seen.lock().await.push(delivery.envelope.failure_count);
                    if attempt % 3 == 0 {
                        Ok(())
                    } else {
                        anyhow::bail!("transient")
                    }
                }
            });

        let hook_counter = hook_fires.clone();
        let policy = FailurePolicy::new(3).with_permanent_failure(permanent_failure_fn(
            move |_event: LogForwardingEvent, _err, _delivery| {
                let hook_counter = hook_counter.clone();
                async move {
                    hook_counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            },
        ));

        let subscriber = factory.queue_subscriber::<LogForwardingEvent>();
        subscriber
            .subscribe_with(handler, policy, &cancel)
            .await
            .unwrap();

        let publisher = factory.queue_publisher::<LogForwardingEvent>();
        publisher
            .publish(&LogForwardingEvent::default(), &cancel)
            .await
            .unwrap();
        wait_for(&attempts, 3).await;

        // Second logical message: counting must restart from zero, not
        // continue where the first chain left off.
        publisher
            .publish(&LogForwardingEvent::default(), &cancel)
            .await
            .unwrap();
        wait_for(&attempts, 6).await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(hook_fires.load(Ordering::SeqCst), 0);
        assert_eq!(*counts_seen.lock().await, vec![0, 1, 2, 0, 1, 2]);
    }

    #[tokio::test]
    async fn test_hook_panic_free_error_does_not_kill_the_loop() {
        let factory = MemoryMessaging::new();
        let cancel = CancellationToken::new();

        let attempts = Arc::new(AtomicU32::new(0));
        let attempt_counter = attempts.clone();
        let handler: Handler<LogForwardingEvent> =
            handler_fn(move |_event: LogForwardingEvent, _delivery| {
                let attempt_counter = attempt_counter.clone();
                async move {
                    attempt_counter.fetch_add(1, Ordering::SeqCst);
                    anyhow::bail!("always fails")
                }
            });

        let policy = FailurePolicy::new(0).with_permanent_failure(permanent_failure_fn(
            |_event: LogForwardingEvent, _err, _delivery| async {
                anyhow::bail!("callback itself fails")
            },
        ));

        let subscriber = factory.queue_subscriber::<LogForwardingEvent>();
        subscriber
            .subscribe_with(handler, policy, &cancel)
            .await
            .unwrap();

        let publisher = factory.queue_publisher::<LogForwardingEvent>();
        publisher
            .publish(&LogForwardingEvent::default(), &cancel)
            .await
            .unwrap();
        wait_for(&attempts, 1).await;

        // The loop must survive the failing callback and keep consuming.
        publisher
            .publish(&LogForwardingEvent::default(), &cancel)
            .await
            .unwrap();
        wait_for(&attempts, 2).await;
    }
}
