//! # Subscriber Contract
//!
//! Consuming side of the bus. A subscription associates one handler with
//! one destination and one transport channel; deliveries run through the
//! shared failure policy so handler errors become retries or permanent
//! discards instead of reaching the transport.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::MessagingError;
use crate::failure::FailurePolicy;
use crate::message::{Handler, Message};

/// Lifecycle of a subscription.
///
/// `Unsubscribed → Subscribing → Subscribed → Unsubscribing →
/// Unsubscribed`; the terminal state is reached on explicit unsubscribe
/// or unrecoverable channel failure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SubscriptionState {
    /// No consumer registered.
    #[default]
    Unsubscribed,
    /// Consumer registration in progress.
    Subscribing,
    /// Consumer registered; the delivery loop is running.
    Subscribed,
    /// Teardown in progress.
    Unsubscribing,
}

/// Consumes messages of type `M` from one destination.
#[async_trait]
pub trait Subscriber<M: Message>: Send + Sync {
    /// Subscribe with the default failure policy.
    ///
    /// # Errors
    ///
    /// See [`subscribe_with`](Self::subscribe_with).
    async fn subscribe(
        &self,
        handler: Handler<M>,
        cancel: &CancellationToken,
    ) -> Result<(), MessagingError> {
        self.subscribe_with(handler, FailurePolicy::default(), cancel)
            .await
    }

    /// Subscribe with an explicit failure policy.
    ///
    /// `handler` is invoked once per delivered message on a dedicated
    /// delivery loop; `cancel` stops that loop (and the loop's own
    /// teardown) when tripped.
    ///
    /// # Errors
    ///
    /// [`MessagingError::AlreadySubscribed`] if a consumer is active,
    /// plus connectivity and cancellation errors.
    async fn subscribe_with(
        &self,
        handler: Handler<M>,
        policy: FailurePolicy<M>,
        cancel: &CancellationToken,
    ) -> Result<(), MessagingError>;

    /// Tear down the consumer registration.
    ///
    /// # Errors
    ///
    /// [`MessagingError::NotSubscribed`] without an active subscription,
    /// plus connectivity and cancellation errors.
    async fn unsubscribe(&self, cancel: &CancellationToken) -> Result<(), MessagingError>;
}
