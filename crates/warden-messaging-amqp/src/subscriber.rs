//! # AMQP Subscribers
//!
//! Each subscription owns a dedicated channel and a spawned delivery
//! loop. Deliveries run through the shared failure policy; the verdict
//! decides between acknowledge, permanent discard, and retry.
//!
//! Retry does not use a broker requeue: a plain nack-requeue would
//! resurrect the stale envelope headers and lose the incremented failure
//! count. Instead the loop republishes the payload to the subscription's
//! own source queue with the updated envelope, then acknowledges the
//! original delivery.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicCancelOptions, BasicConsumeOptions, BasicNackOptions,
    BasicPublishOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{Channel, Consumer, ExchangeKind};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use warden_messaging::error::MessagingError;
use warden_messaging::failure::{FailurePolicy, Verdict};
use warden_messaging::message::{Delivery, Handler, Message};
use warden_messaging::naming::NameResolver;
use warden_messaging::subscriber::{Subscriber, SubscriptionState};

use crate::connection::ConnectionManager;
use crate::wire;

fn subscribe_error(destination: &str, e: lapin::Error) -> MessagingError {
    MessagingError::Subscribe {
        destination: destination.to_string(),
        source: Box::new(e),
    }
}

/// Broker-side wiring for one destination kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Topology {
    /// Durable fanout exchange; each subscriber binds an exclusive
    /// server-named queue.
    Topic,
    /// Durable shared queue; consumers compete.
    Queue,
}

/// Resources owned by an active subscription.
struct ActiveSubscription {
    channel: Channel,
    consumer_tag: String,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Per-subscription lifecycle record.
struct Life {
    state: SubscriptionState,
    active: Option<ActiveSubscription>,
}

/// Common implementation behind the topic and queue subscribers.
///
/// `life` is shared with the delivery loop so an unrecoverable channel
/// failure can drive the subscription to its terminal state.
struct AmqpSubscriber<M: Message> {
    manager: Arc<ConnectionManager>,
    destination: String,
    topology: Topology,
    life: Arc<Mutex<Life>>,
    _marker: PhantomData<fn() -> M>,
}

impl<M: Message> AmqpSubscriber<M> {
    fn new(manager: Arc<ConnectionManager>, destination: String, topology: Topology) -> Self {
        Self {
            manager,
            destination,
            topology,
            life: Arc::new(Mutex::new(Life {
                state: SubscriptionState::Unsubscribed,
                active: None,
            })),
            _marker: PhantomData,
        }
    }

    async fn subscribe_with(
        &self,
        handler: Handler<M>,
        policy: FailurePolicy<M>,
        cancel: &CancellationToken,
    ) -> Result<(), MessagingError> {
        let mut life = self.life.lock().await;
        if life.state != SubscriptionState::Unsubscribed {
            return Err(MessagingError::AlreadySubscribed);
        }
        if cancel.is_cancelled() {
            return Err(MessagingError::Cancelled);
        }
        life.state = SubscriptionState::Subscribing;

        match self.register(handler, policy, cancel).await {
            Ok(active) => {
                life.active = Some(active);
                life.state = SubscriptionState::Subscribed;
                Ok(())
            }
            Err(e) => {
                life.state = SubscriptionState::Unsubscribed;
                Err(e)
            }
        }
    }

    /// Declare the destination, register the consumer and spawn the
    /// delivery loop.
    async fn register(
        &self,
        handler: Handler<M>,
        policy: FailurePolicy<M>,
        cancel: &CancellationToken,
    ) -> Result<ActiveSubscription, MessagingError> {
        let channel = tokio::select! {
            () = cancel.cancelled() => return Err(MessagingError::Cancelled),
            channel = self.manager.create_channel() => channel?,
        };

        let setup = self.declare_source(&channel);
        let source_queue = tokio::select! {
            () = cancel.cancelled() => return Err(MessagingError::Cancelled),
            queue = setup => queue?,
        };

        let consume = channel.basic_consume(
            &source_queue,
            "",
            BasicConsumeOptions::default(),
            FieldTable::default(),
        );
        let consumer = tokio::select! {
            () = cancel.cancelled() => return Err(MessagingError::Cancelled),
            consumer = consume => consumer.map_err(|e| subscribe_error(&self.destination, e))?,
        };
        let consumer_tag = consumer.tag().as_str().to_string();

        let loop_cancel = cancel.child_token();
        let task = tokio::spawn(delivery_loop::<M>(
            channel.clone(),
            consumer,
            source_queue,
            self.destination.clone(),
            handler,
            policy,
            loop_cancel.clone(),
            self.life.clone(),
        ));

        Ok(ActiveSubscription {
            channel,
            consumer_tag,
            cancel: loop_cancel,
            task,
        })
    }

    /// Declare broker objects for this topology and return the queue the
    /// consumer reads from.
    async fn declare_source(&self, channel: &Channel) -> Result<String, MessagingError> {
        match self.topology {
            Topology::Topic => {
                channel
                    .exchange_declare(
                        &self.destination,
                        ExchangeKind::Fanout,
                        ExchangeDeclareOptions {
                            durable: true,
                            ..ExchangeDeclareOptions::default()
                        },
                        FieldTable::default(),
                    )
                    .await
                    .map_err(|e| subscribe_error(&self.destination, e))?;

                let queue = channel
                    .queue_declare(
                        "",
                        QueueDeclareOptions {
                            exclusive: true,
                            auto_delete: true,
                            ..QueueDeclareOptions::default()
                        },
                        FieldTable::default(),
                    )
                    .await
                    .map_err(|e| subscribe_error(&self.destination, e))?;

                channel
                    .queue_bind(
                        queue.name().as_str(),
                        &self.destination,
                        "",
                        QueueBindOptions::default(),
                        FieldTable::default(),
                    )
                    .await
                    .map_err(|e| subscribe_error(&self.destination, e))?;

                Ok(queue.name().as_str().to_string())
            }
            Topology::Queue => {
                channel
                    .queue_declare(
                        &self.destination,
                        QueueDeclareOptions {
                            durable: true,
                            ..QueueDeclareOptions::default()
                        },
                        FieldTable::default(),
                    )
                    .await
                    .map_err(|e| subscribe_error(&self.destination, e))?;
                Ok(self.destination.clone())
            }
        }
    }

    async fn unsubscribe(&self, cancel: &CancellationToken) -> Result<(), MessagingError> {
        // Take the active record and release the lock before waiting on
        // the loop: the loop takes the same lock on its failure path.
        let active = {
            let mut life = self.life.lock().await;
            if life.state != SubscriptionState::Subscribed {
                return Err(MessagingError::NotSubscribed);
            }
            life.state = SubscriptionState::Unsubscribing;
            life.active.take()
        };

        let Some(active) = active else {
            self.life.lock().await.state = SubscriptionState::Unsubscribed;
            return Err(MessagingError::NotSubscribed);
        };

        // Stop the loop first so in-flight work drains before the
        // channel goes away.
        active.cancel.cancel();
        let _ = active.task.await;

        let teardown = async {
            active
                .channel
                .basic_cancel(&active.consumer_tag, BasicCancelOptions::default())
                .await
                .map_err(|e| subscribe_error(&self.destination, e))?;
            if let Err(e) = active.channel.close(200, "unsubscribed").await {
                warn!(destination = %self.destination, error = %e, "Error closing channel");
            }
            Ok(())
        };
        let result = tokio::select! {
            () = cancel.cancelled() => Err(MessagingError::Cancelled),
            result = teardown => result,
        };

        self.life.lock().await.state = SubscriptionState::Unsubscribed;
        result
    }

    async fn state(&self) -> SubscriptionState {
        self.life.lock().await.state
    }
}

/// Consume deliveries until cancellation or channel failure, applying
/// the failure policy to each. A channel failure (as opposed to
/// cancellation) drives the subscription to its terminal state.
#[allow(clippy::too_many_arguments)]
async fn delivery_loop<M: Message>(
    channel: Channel,
    mut consumer: Consumer,
    source_queue: String,
    destination: String,
    handler: Handler<M>,
    policy: FailurePolicy<M>,
    cancel: CancellationToken,
    life: Arc<Mutex<Life>>,
) {
    debug!(destination = %destination, queue = %source_queue, "Subscription loop started");
    let mut channel_failed = false;

    loop {
        let delivery = tokio::select! {
            () = cancel.cancelled() => break,
            next = consumer.next() => match next {
                Some(Ok(delivery)) => delivery,
                Some(Err(e)) => {
                    error!(
                        destination = %destination,
                        error = %e,
                        "Consumer stream failed, ending subscription"
                    );
                    channel_failed = true;
                    break;
                }
                None => {
                    debug!(destination = %destination, "Consumer stream closed");
                    channel_failed = true;
                    break;
                }
            },
        };

        let (envelope, metadata) = wire::decode_properties(&delivery.properties);
        let mut context = Delivery::new(envelope, metadata, cancel.clone());
        let verdict = policy.process(&delivery.data, &mut context, &handler).await;

        match verdict {
            Verdict::Completed | Verdict::Discarded => {
                if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
                    warn!(destination = %destination, error = %e, "Failed to acknowledge delivery");
                }
            }
            Verdict::Retry => {
                // Republish to this subscription's own source queue via
                // the default exchange: the updated envelope rides along
                // and, for topics, other subscribers are not re-notified.
                let properties = wire::encode_properties(&context.envelope, &context.metadata);
                let republish = channel
                    .basic_publish(
                        "",
                        &source_queue,
                        BasicPublishOptions::default(),
                        &delivery.data,
                        properties,
                    )
                    .await;

                match republish {
                    Ok(_) => {
                        if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
                            warn!(destination = %destination, error = %e, "Failed to acknowledge delivery");
                        }
                    }
                    Err(e) => {
                        error!(
                            destination = %destination,
                            error = %e,
                            "Retry republish failed, returning delivery to the broker"
                        );
                        let nack = BasicNackOptions {
                            requeue: true,
                            ..BasicNackOptions::default()
                        };
                        if let Err(e) = delivery.nack(nack).await {
                            warn!(destination = %destination, error = %e, "Failed to nack delivery");
                        }
                    }
                }
            }
        }
    }

    if channel_failed {
        let mut life = life.lock().await;
        if life.state == SubscriptionState::Subscribed {
            life.state = SubscriptionState::Unsubscribed;
            life.active = None;
        }
    }

    debug!(destination = %destination, "Subscription loop ended");
}

/// Subscribes `M` handlers to a broadcast topic.
pub struct AmqpTopicSubscriber<M: Message> {
    inner: AmqpSubscriber<M>,
}

impl<M: Message> AmqpTopicSubscriber<M> {
    #[must_use]
    pub fn new(manager: Arc<ConnectionManager>, resolver: &NameResolver) -> Self {
        Self {
            inner: AmqpSubscriber::new(
                manager,
                resolver.sanitized_topic_name::<M>(),
                Topology::Topic,
            ),
        }
    }

    /// Destination this subscriber resolved for `M`.
    #[must_use]
    pub fn destination(&self) -> &str {
        &self.inner.destination
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> SubscriptionState {
        self.inner.state().await
    }
}

#[async_trait]
impl<M: Message> Subscriber<M> for AmqpTopicSubscriber<M> {
    async fn subscribe_with(
        &self,
        handler: Handler<M>,
        policy: FailurePolicy<M>,
        cancel: &CancellationToken,
    ) -> Result<(), MessagingError> {
        self.inner.subscribe_with(handler, policy, cancel).await
    }

    async fn unsubscribe(&self, cancel: &CancellationToken) -> Result<(), MessagingError> {
        self.inner.unsubscribe(cancel).await
    }
}

/// Subscribes `M` handlers to a competing-consumer queue.
pub struct AmqpQueueSubscriber<M: Message> {
    inner: AmqpSubscriber<M>,
}

impl<M: Message> AmqpQueueSubscriber<M> {
    #[must_use]
    pub fn new(manager: Arc<ConnectionManager>, resolver: &NameResolver) -> Self {
        Self {
            inner: AmqpSubscriber::new(
                manager,
                resolver.sanitized_queue_name::<M>(),
                Topology::Queue,
            ),
        }
    }

    /// Destination this subscriber resolved for `M`.
    #[must_use]
    pub fn destination(&self) -> &str {
        &self.inner.destination
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> SubscriptionState {
        self.inner.state().await
    }
}

#[async_trait]
impl<M: Message> Subscriber<M> for AmqpQueueSubscriber<M> {
    async fn subscribe_with(
        &self,
        handler: Handler<M>,
        policy: FailurePolicy<M>,
        cancel: &CancellationToken,
    ) -> Result<(), MessagingError> {
        self.inner.subscribe_with(handler, policy, cancel).await
    }

    async fn unsubscribe(&self, cancel: &CancellationToken) -> Result<(), MessagingError> {
        self.inner.unsubscribe(cancel).await
    }
}
