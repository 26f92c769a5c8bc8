//! # AMQP Publishers
//!
//! One publisher per message type and destination kind. The destination
//! name is resolved and sanitized once at construction; every publish
//! opens its own channel, declares the destination (declaration is
//! idempotent on the broker), and sends the JSON payload with the
//! envelope mapped to headers.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use lapin::options::{BasicPublishOptions, ExchangeDeclareOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::{Channel, ExchangeKind};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use warden_messaging::error::MessagingError;
use warden_messaging::message::{Envelope, Message, Metadata};
use warden_messaging::naming::NameResolver;
use warden_messaging::publisher::Publisher;

use crate::connection::ConnectionManager;
use crate::wire;

fn publish_error(destination: &str, e: lapin::Error) -> MessagingError {
    MessagingError::Publish {
        destination: destination.to_string(),
        source: Box::new(e),
    }
}

/// Open a channel, aborting promptly if the token trips while the
/// connection is being (re)established.
async fn open_channel(
    manager: &ConnectionManager,
    cancel: &CancellationToken,
) -> Result<Channel, MessagingError> {
    tokio::select! {
        () = cancel.cancelled() => Err(MessagingError::Cancelled),
        channel = manager.create_channel() => channel,
    }
}

/// Publishes `M` to a broadcast topic (durable fanout exchange).
pub struct AmqpTopicPublisher<M: Message> {
    manager: Arc<ConnectionManager>,
    destination: String,
    _marker: PhantomData<fn() -> M>,
}

impl<M: Message> AmqpTopicPublisher<M> {
    #[must_use]
    pub fn new(manager: Arc<ConnectionManager>, resolver: &NameResolver) -> Self {
        Self {
            manager,
            destination: resolver.sanitized_topic_name::<M>(),
            _marker: PhantomData,
        }
    }

    /// Destination this publisher resolved for `M`.
    #[must_use]
    pub fn destination(&self) -> &str {
        &self.destination
    }
}

#[async_trait]
impl<M: Message> Publisher<M> for AmqpTopicPublisher<M> {
    async fn publish_with(
        &self,
        message: &M,
        envelope: Envelope,
        metadata: Metadata,
        cancel: &CancellationToken,
    ) -> Result<(), MessagingError> {
        if cancel.is_cancelled() {
            return Err(MessagingError::Cancelled);
        }

        let payload = serde_json::to_vec(message)?;
        let properties = wire::encode_properties(&envelope, &metadata);
        let channel = open_channel(&self.manager, cancel).await?;

        let declare = channel.exchange_declare(
            &self.destination,
            ExchangeKind::Fanout,
            ExchangeDeclareOptions {
                durable: true,
                ..ExchangeDeclareOptions::default()
            },
            FieldTable::default(),
        );
        tokio::select! {
            () = cancel.cancelled() => return Err(MessagingError::Cancelled),
            result = declare => result.map_err(|e| publish_error(&self.destination, e))?,
        }

        let publish = channel.basic_publish(
            &self.destination,
            "",
            BasicPublishOptions::default(),
            &payload,
            properties,
        );
        tokio::select! {
            () = cancel.cancelled() => return Err(MessagingError::Cancelled),
            result = publish => {
                result.map_err(|e| publish_error(&self.destination, e))?;
            }
        }

        debug!(
            destination = %self.destination,
            message_id = %envelope.message_id,
            "Published topic message"
        );
        Ok(())
    }
}

/// Publishes `M` to a competing-consumer queue (default exchange).
pub struct AmqpQueuePublisher<M: Message> {
    manager: Arc<ConnectionManager>,
    destination: String,
    _marker: PhantomData<fn() -> M>,
}

impl<M: Message> AmqpQueuePublisher<M> {
    #[must_use]
    pub fn new(manager: Arc<ConnectionManager>, resolver: &NameResolver) -> Self {
        Self {
            manager,
            destination: resolver.sanitized_queue_name::<M>(),
            _marker: PhantomData,
        }
    }

    /// Destination this publisher resolved for `M`.
    #[must_use]
    pub fn destination(&self) -> &str {
        &self.destination
    }
}

#[async_trait]
impl<M: Message> Publisher<M> for AmqpQueuePublisher<M> {
    async fn publish_with(
        &self,
        message: &M,
        envelope: Envelope,
        metadata: Metadata,
        cancel: &CancellationToken,
    ) -> Result<(), MessagingError> {
        if cancel.is_cancelled() {
            return Err(MessagingError::Cancelled);
        }

        let payload = serde_json::to_vec(message)?;
        let properties = wire::encode_properties(&envelope, &metadata);
        let channel = open_channel(&self.manager, cancel).await?;

        let declare = channel.queue_declare(
            &self.destination,
            QueueDeclareOptions {
                durable: true,
                ..QueueDeclareOptions::default()
            },
            FieldTable::default(),
        );
        tokio::select! {
            () = cancel.cancelled() => return Err(MessagingError::Cancelled),
            result = declare => {
                result.map_err(|e| publish_error(&self.destination, e))?;
            }
        }

        let publish = channel.basic_publish(
            "",
            &self.destination,
            BasicPublishOptions::default(),
            &payload,
            properties,
        );
        tokio::select! {
            () = cancel.cancelled() => return Err(MessagingError::Cancelled),
            result = publish => {
                result.map_err(|e| publish_error(&self.destination, e))?;
            }
        }

        debug!(
            destination = %self.destination,
            message_id = %envelope.message_id,
            "Published queue message"
        );
        Ok(())
    }
}
