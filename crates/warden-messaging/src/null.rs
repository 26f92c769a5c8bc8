//! # Null Transport
//!
//! No-op publisher/subscriber pair for environments without a configured
//! broker (local development, unit tests). Satisfies the same contracts
//! as the real transports so producers and consumers need no conditional
//! code.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::MessagingError;
use crate::factory::MessagingFactory;
use crate::failure::FailurePolicy;
use crate::message::{Envelope, Handler, Message, Metadata};
use crate::publisher::Publisher;
use crate::subscriber::Subscriber;

/// Publisher that drops every message.
pub struct NullPublisher<M: Message> {
    _marker: PhantomData<fn() -> M>,
}

impl<M: Message> NullPublisher<M> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<M: Message> Default for NullPublisher<M> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<M: Message> Publisher<M> for NullPublisher<M> {
    // Always completes: with no I/O to abort, even a cancelled token
    // does not turn this into an error.
    async fn publish_with(
        &self,
        _message: &M,
        envelope: Envelope,
        _metadata: Metadata,
        _cancel: &CancellationToken,
    ) -> Result<(), MessagingError> {
        debug!(message_id = %envelope.message_id, "Null transport dropped published message");
        Ok(())
    }
}

/// Subscriber that registers nothing; its handler is never invoked.
pub struct NullSubscriber<M: Message> {
    _marker: PhantomData<fn() -> M>,
}

impl<M: Message> NullSubscriber<M> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<M: Message> Default for NullSubscriber<M> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<M: Message> Subscriber<M> for NullSubscriber<M> {
    async fn subscribe_with(
        &self,
        _handler: Handler<M>,
        _policy: FailurePolicy<M>,
        _cancel: &CancellationToken,
    ) -> Result<(), MessagingError> {
        debug!("Null transport ignored subscription");
        Ok(())
    }

    async fn unsubscribe(&self, _cancel: &CancellationToken) -> Result<(), MessagingError> {
        Ok(())
    }
}

/// Factory handing out null publishers and subscribers.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullMessaging;

impl NullMessaging {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl MessagingFactory for NullMessaging {
    fn topic_publisher<M: Message>(&self) -> Arc<dyn Publisher<M>> {
        Arc::new(NullPublisher::new())
    }

    fn queue_publisher<M: Message>(&self) -> Arc<dyn Publisher<M>> {
        Arc::new(NullPublisher::new())
    }

    fn topic_subscriber<M: Message>(&self) -> Arc<dyn Subscriber<M>> {
        Arc::new(NullSubscriber::new())
    }

    fn queue_subscriber<M: Message>(&self) -> Arc<dyn Subscriber<M>> {
        Arc::new(NullSubscriber::new())
    }
}
