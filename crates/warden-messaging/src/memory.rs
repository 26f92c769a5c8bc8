//! # In-Memory Transport
//!
//! A brokerless transport with the same semantics the AMQP transport
//! provides: topics fan a message out to every subscriber, queues deliver
//! each message to exactly one competing consumer. Frames carry the
//! envelope next to the payload bytes, so retry counting round-trips
//! across redelivery exactly as it does over a real broker.
//!
//! Intended for tests and single-process development; there is no
//! persistence and no delivery across processes.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::MessagingError;
use crate::factory::MessagingFactory;
use crate::failure::{FailurePolicy, Verdict};
use crate::message::{Delivery, Envelope, Handler, Message, Metadata};
use crate::naming::NameResolver;
use crate::publisher::Publisher;
use crate::subscriber::{Subscriber, SubscriptionState};

/// Frames buffered per destination before publishers feel backpressure.
const CHANNEL_CAPACITY: usize = 1000;

/// One message as it travels through the in-memory broker.
#[derive(Debug, Clone)]
struct Frame {
    envelope: Envelope,
    metadata: Metadata,
    payload: Vec<u8>,
}

/// A queue destination: one buffer, any number of competing consumers.
struct QueueDestination {
    sender: mpsc::Sender<Frame>,
    receiver: Arc<Mutex<mpsc::Receiver<Frame>>>,
}

/// Process-local broker shared by the in-memory publishers and
/// subscribers of one [`MemoryMessaging`] factory.
///
/// Topics and queues are separate namespaces, as they are on AMQP
/// (exchanges vs. queues), so one message type may use both.
pub struct MemoryBroker {
    topics: Mutex<HashMap<String, Vec<mpsc::Sender<Frame>>>>,
    queues: Mutex<HashMap<String, QueueDestination>>,
    published: AtomicU64,
}

impl MemoryBroker {
    #[must_use]
    pub fn new() -> Self {
        Self {
            topics: Mutex::new(HashMap::new()),
            queues: Mutex::new(HashMap::new()),
            published: AtomicU64::new(0),
        }
    }

    /// Total frames accepted for publication.
    #[must_use]
    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Number of distinct destinations (topics plus queues) created.
    pub async fn destination_count(&self) -> usize {
        self.topics.lock().await.len() + self.queues.lock().await.len()
    }

    /// Fan a frame out to every live topic subscriber.
    ///
    /// Like a fanout exchange with no bound queues, a topic without
    /// subscribers drops the frame.
    async fn publish_topic(&self, name: &str, frame: Frame) {
        self.published.fetch_add(1, Ordering::Relaxed);

        let senders: Vec<mpsc::Sender<Frame>> = {
            let mut topics = self.topics.lock().await;
            let senders = topics.entry(name.to_string()).or_default();
            senders.retain(|s| !s.is_closed());
            senders.clone()
        };

        if senders.is_empty() {
            debug!(destination = %name, "Topic frame dropped (no subscribers)");
            return;
        }

        for sender in senders {
            // A closed channel here means the subscriber unsubscribed
            // between the snapshot and the send.
            let _ = sender.send(frame.clone()).await;
        }
    }

    /// Enqueue a frame; it stays buffered until a consumer takes it.
    async fn publish_queue(&self, name: &str, frame: Frame) {
        self.published.fetch_add(1, Ordering::Relaxed);
        let (sender, _) = self.queue_endpoint(name).await;
        // The broker keeps the receiver alive, so the channel cannot be
        // closed; send only waits for buffer space.
        let _ = sender.send(frame).await;
    }

    /// Register a topic subscriber; the returned sender is the
    /// subscription's own requeue handle.
    async fn subscribe_topic(&self, name: &str) -> (mpsc::Sender<Frame>, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        self.topics
            .lock()
            .await
            .entry(name.to_string())
            .or_default()
            .push(tx.clone());
        (tx, rx)
    }

    /// Get or create the shared endpoint for a queue destination.
    async fn queue_endpoint(
        &self,
        name: &str,
    ) -> (mpsc::Sender<Frame>, Arc<Mutex<mpsc::Receiver<Frame>>>) {
        let mut queues = self.queues.lock().await;
        let entry = queues.entry(name.to_string()).or_insert_with(|| {
            let (sender, receiver) = mpsc::channel(CHANNEL_CAPACITY);
            QueueDestination {
                sender,
                receiver: Arc::new(Mutex::new(receiver)),
            }
        });
        (entry.sender.clone(), entry.receiver.clone())
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

/// Publishes `M` to an in-memory topic.
pub struct MemoryTopicPublisher<M: Message> {
    broker: Arc<MemoryBroker>,
    destination: String,
    _marker: PhantomData<fn() -> M>,
}

/// Publishes `M` to an in-memory queue.
pub struct MemoryQueuePublisher<M: Message> {
    broker: Arc<MemoryBroker>,
    destination: String,
    _marker: PhantomData<fn() -> M>,
}

#[async_trait]
impl<M: Message> Publisher<M> for MemoryTopicPublisher<M> {
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
        let frame = Frame {
            envelope,
            metadata,
            payload,
        };
        tokio::select! {
            () = cancel.cancelled() => Err(MessagingError::Cancelled),
            () = self.broker.publish_topic(&self.destination, frame) => Ok(()),
        }
    }
}

#[async_trait]
impl<M: Message> Publisher<M> for MemoryQueuePublisher<M> {
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
        let frame = Frame {
            envelope,
            metadata,
            payload,
        };
        tokio::select! {
            () = cancel.cancelled() => Err(MessagingError::Cancelled),
            () = self.broker.publish_queue(&self.destination, frame) => Ok(()),
        }
    }
}

/// State owned by an active subscription.
struct Life {
    state: SubscriptionState,
    cancel: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
}

impl Life {
    fn new() -> Self {
        Self {
            state: SubscriptionState::Unsubscribed,
            cancel: None,
            task: None,
        }
    }
}

/// Subscribes `M` handlers to an in-memory topic.
pub struct MemoryTopicSubscriber<M: Message> {
    broker: Arc<MemoryBroker>,
    destination: String,
    life: Mutex<Life>,
    _marker: PhantomData<fn() -> M>,
}

/// Subscribes `M` handlers to an in-memory queue (competing consumers).
pub struct MemoryQueueSubscriber<M: Message> {
    broker: Arc<MemoryBroker>,
    destination: String,
    life: Mutex<Life>,
    _marker: PhantomData<fn() -> M>,
}

#[async_trait]
impl<M: Message> Subscriber<M> for MemoryTopicSubscriber<M> {
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

        let (requeue, receiver) = self.broker.subscribe_topic(&self.destination).await;
        let child = cancel.child_token();
        let task = tokio::spawn(topic_loop(
            receiver,
            requeue,
            self.destination.clone(),
            handler,
            policy,
            child.clone(),
        ));

        life.cancel = Some(child);
        life.task = Some(task);
        life.state = SubscriptionState::Subscribed;
        Ok(())
    }

    async fn unsubscribe(&self, cancel: &CancellationToken) -> Result<(), MessagingError> {
        unsubscribe_life(&self.life, cancel).await
    }
}

#[async_trait]
impl<M: Message> Subscriber<M> for MemoryQueueSubscriber<M> {
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

        let (requeue, shared) = self.broker.queue_endpoint(&self.destination).await;
        let child = cancel.child_token();
        let task = tokio::spawn(queue_loop(
            shared,
            requeue,
            self.destination.clone(),
            handler,
            policy,
            child.clone(),
        ));

        life.cancel = Some(child);
        life.task = Some(task);
        life.state = SubscriptionState::Subscribed;
        Ok(())
    }

    async fn unsubscribe(&self, cancel: &CancellationToken) -> Result<(), MessagingError> {
        unsubscribe_life(&self.life, cancel).await
    }
}

/// Shared teardown: cancel the loop, wait for it to drain, reset state.
async fn unsubscribe_life(
    life: &Mutex<Life>,
    cancel: &CancellationToken,
) -> Result<(), MessagingError> {
    let mut life = life.lock().await;
    if life.state != SubscriptionState::Subscribed {
        return Err(MessagingError::NotSubscribed);
    }
    life.state = SubscriptionState::Unsubscribing;

    if let Some(token) = life.cancel.take() {
        token.cancel();
    }
    if let Some(task) = life.task.take() {
        tokio::select! {
            () = cancel.cancelled() => {
                // The loop token is already tripped; the task winds down
                // detached.
                life.state = SubscriptionState::Unsubscribed;
                return Err(MessagingError::Cancelled);
            }
            _ = task => {}
        }
    }
    life.state = SubscriptionState::Unsubscribed;
    Ok(())
}

/// Run one delivered frame through the failure policy and act on the
/// verdict. On retry the updated envelope rides with the re-enqueued
/// frame, so the count survives redelivery.
async fn dispatch_frame<M: Message>(
    frame: Frame,
    requeue: &mpsc::Sender<Frame>,
    destination: &str,
    handler: &Handler<M>,
    policy: &FailurePolicy<M>,
    cancel: &CancellationToken,
) {
    let mut delivery = Delivery::new(
        frame.envelope.clone(),
        frame.metadata.clone(),
        cancel.clone(),
    );

    match policy.process(&frame.payload, &mut delivery, handler).await {
        Verdict::Completed | Verdict::Discarded => {}
        Verdict::Retry => {
            let retry = Frame {
                envelope: delivery.envelope.clone(),
                metadata: frame.metadata,
                payload: frame.payload,
            };
            // try_send: awaiting our own full buffer would deadlock the
            // only consumer.
            if let Err(e) = requeue.try_send(retry) {
                warn!(
                    destination = %destination,
                    error = %e,
                    "Retry frame dropped"
                );
            }
        }
    }
}

async fn topic_loop<M: Message>(
    mut receiver: mpsc::Receiver<Frame>,
    requeue: mpsc::Sender<Frame>,
    destination: String,
    handler: Handler<M>,
    policy: FailurePolicy<M>,
    cancel: CancellationToken,
) {
    debug!(destination = %destination, "Topic subscription loop started");
    loop {
        let frame = tokio::select! {
            () = cancel.cancelled() => break,
            frame = receiver.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };
        dispatch_frame(frame, &requeue, &destination, &handler, &policy, &cancel).await;
    }
    debug!(destination = %destination, "Topic subscription loop ended");
}

async fn queue_loop<M: Message>(
    shared: Arc<Mutex<mpsc::Receiver<Frame>>>,
    requeue: mpsc::Sender<Frame>,
    destination: String,
    handler: Handler<M>,
    policy: FailurePolicy<M>,
    cancel: CancellationToken,
) {
    debug!(destination = %destination, "Queue subscription loop started");
    loop {
        let frame = tokio::select! {
            () = cancel.cancelled() => break,
            frame = async {
                let mut receiver = shared.lock().await;
                receiver.recv().await
            } => match frame {
                Some(frame) => frame,
                None => break,
            },
        };
        dispatch_frame(frame, &requeue, &destination, &handler, &policy, &cancel).await;
    }
    debug!(destination = %destination, "Queue subscription loop ended");
}

/// Factory for the in-memory transport.
///
/// Publishers and subscribers from the same factory share one broker;
/// separate factories are fully isolated.
pub struct MemoryMessaging {
    broker: Arc<MemoryBroker>,
    resolver: NameResolver,
}

impl MemoryMessaging {
    #[must_use]
    pub fn new() -> Self {
        Self::with_resolver(NameResolver::default())
    }

    /// Factory with an explicit naming strategy.
    #[must_use]
    pub fn with_resolver(resolver: NameResolver) -> Self {
        Self {
            broker: Arc::new(MemoryBroker::new()),
            resolver,
        }
    }

    /// The shared broker, for test introspection.
    #[must_use]
    pub fn broker(&self) -> &Arc<MemoryBroker> {
        &self.broker
    }
}

impl Default for MemoryMessaging {
    fn default() -> Self {
        Self::new()
    }
}

impl MessagingFactory for MemoryMessaging {
    fn topic_publisher<M: Message>(&self) -> Arc<dyn Publisher<M>> {
        Arc::new(MemoryTopicPublisher::<M> {
            broker: self.broker.clone(),
            destination: self.resolver.sanitized_topic_name::<M>(),
            _marker: PhantomData,
        })
    }

    fn queue_publisher<M: Message>(&self) -> Arc<dyn Publisher<M>> {
        Arc::new(MemoryQueuePublisher::<M> {
            broker: self.broker.clone(),
            destination: self.resolver.sanitized_queue_name::<M>(),
            _marker: PhantomData,
        })
    }

    fn topic_subscriber<M: Message>(&self) -> Arc<dyn Subscriber<M>> {
        Arc::new(MemoryTopicSubscriber::<M> {
            broker: self.broker.clone(),
            destination: self.resolver.sanitized_topic_name::<M>(),
            life: Mutex::new(Life::new()),
            _marker: PhantomData,
        })
    }

    fn queue_subscriber<M: Message>(&self) -> Arc<dyn Subscriber<M>> {
        Arc::new(MemoryQueueSubscriber::<M> {
            broker: self.broker.clone(),
            destination: self.resolver.sanitized_queue_name::<M>(),
            life: Mutex::new(Life::new()),
            _marker: PhantomData,
        })
    }
}
