//! # Failure Handling
//!
//! The retry-or-give-up policy applied to every delivered message,
//! independent of transport. Transient failures are logged at warning
//! severity and redelivered; once a message fails more often than the
//! budget allows it is logged at error severity, the optional
//! permanent-failure callback is notified, and the message is discarded.
//!
//! The policy mutates the delivery's envelope in place; the transport is
//! responsible for acting on the [`Verdict`] and, on retry, for carrying
//! the updated envelope with the redelivered message.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{error, warn};

use crate::message::{Delivery, Handler, Message};
use crate::DEFAULT_MAX_FAILURE_COUNT;

/// Callback invoked when a message exhausts its retry budget.
///
/// Receives the message, the final handler error, and the delivery
/// context. Errors from the callback are logged and swallowed; they
/// never reach the transport.
pub type PermanentFailureHook<M> =
    Arc<dyn Fn(M, anyhow::Error, Delivery) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Adapt an async closure into a [`PermanentFailureHook`].
pub fn permanent_failure_fn<M, F, Fut>(f: F) -> PermanentFailureHook<M>
where
    M: Message,
    F: Fn(M, anyhow::Error, Delivery) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(
        move |message, err, delivery| -> BoxFuture<'static, anyhow::Result<()>> {
            Box::pin(f(message, err, delivery))
        },
    )
}

/// Outcome of one delivery attempt, for the transport to act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Handler succeeded; acknowledge and consume the message.
    Completed,
    /// Transient failure; redeliver with the updated envelope.
    Retry,
    /// Permanent failure or undecodable payload; acknowledge and drop.
    Discarded,
}

/// Retry policy for one subscription.
pub struct FailurePolicy<M: Message> {
    /// Failures tolerated before the message is permanently discarded.
    pub max_failure_count: u32,

    /// Invoked once when a message is permanently discarded.
    pub on_permanent_failure: Option<PermanentFailureHook<M>>,
}

impl<M: Message> Default for FailurePolicy<M> {
    fn default() -> Self {
        Self {
            max_failure_count: DEFAULT_MAX_FAILURE_COUNT,
            on_permanent_failure: None,
        }
    }
}

impl<M: Message> Clone for FailurePolicy<M> {
    fn clone(&self) -> Self {
        Self {
            max_failure_count: self.max_failure_count,
            on_permanent_failure: self.on_permanent_failure.clone(),
        }
    }
}

impl<M: Message> FailurePolicy<M> {
    /// Policy with an explicit retry budget and no callback.
    #[must_use]
    pub fn new(max_failure_count: u32) -> Self {
        Self {
            max_failure_count,
            on_permanent_failure: None,
        }
    }

    /// Attach a permanent-failure callback.
    #[must_use]
    pub fn with_permanent_failure(mut self, hook: PermanentFailureHook<M>) -> Self {
        self.on_permanent_failure = Some(hook);
        self
    }

    /// Run one delivery attempt through the policy.
    ///
    /// Decodes the payload, invokes the handler, and updates
    /// `delivery.envelope.failure_count`: reset to 0 on success,
    /// incremented on failure. A payload that does not decode can never
    /// succeed and is discarded immediately without invoking the
    /// callback (there is no message instance to hand it).
    pub async fn process(
        &self,
        payload: &[u8],
        delivery: &mut Delivery,
        handler: &Handler<M>,
    ) -> Verdict {
        let message: M = match serde_json::from_slice(payload) {
            Ok(message) => message,
            Err(e) => {
                error!(
                    message_id = %delivery.envelope.message_id,
                    error = %e,
                    "Discarding undecodable message"
                );
                return Verdict::Discarded;
            }
        };

        match (handler)(message, delivery.clone()).await {
            Ok(()) => {
                if delivery.envelope.failure_count > 0 {
                    delivery.envelope.failure_count = 0;
                }
                Verdict::Completed
            }
            Err(e) => {
                delivery.envelope.failure_count =
                    delivery.envelope.failure_count.saturating_add(1);

                if delivery.envelope.failure_count > self.max_failure_count {
                    error!(
                        message_id = %delivery.envelope.message_id,
                        failures = delivery.envelope.failure_count,
                        error = %e,
                        "Message exceeded its failure budget, discarding permanently"
                    );
                    self.notify_permanent_failure(payload, e, delivery).await;
                    Verdict::Discarded
                } else {
                    warn!(
                        message_id = %delivery.envelope.message_id,
                        failures = delivery.envelope.failure_count,
                        max_failures = self.max_failure_count,
                        error = %e,
                        "Message handler failed, scheduling retry"
                    );
                    Verdict::Retry
                }
            }
        }
    }

    /// Invoke the permanent-failure callback, if any, with a fresh
    /// instance of the message. Callback errors are logged and swallowed
    /// so they can never crash the subscription loop.
    async fn notify_permanent_failure(
        &self,
        payload: &[u8],
        cause: anyhow::Error,
        delivery: &Delivery,
    ) {
        let Some(hook) = &self.on_permanent_failure else {
            return;
        };
        // The handler consumed its copy; decode a fresh instance.
        let Ok(message) = serde_json::from_slice::<M>(payload) else {
            return;
        };
        if let Err(hook_err) = (hook)(message, cause, delivery.clone()).await {
            error!(
                message_id = %delivery.envelope.message_id,
                error = %hook_err,
                "Permanent-failure callback failed"
            );
        }
    }
}
