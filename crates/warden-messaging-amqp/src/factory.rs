//! # AMQP Transport Factory
//!
//! Entry point services wire in at the composition root. Construction is
//! cheap and performs no I/O; the shared connection is dialed on the
//! first publish or subscribe.

use std::sync::Arc;

use warden_messaging::config::AmqpSettings;
use warden_messaging::error::MessagingError;
use warden_messaging::factory::MessagingFactory;
use warden_messaging::message::Message;
use warden_messaging::naming::NameResolver;
use warden_messaging::publisher::Publisher;
use warden_messaging::subscriber::Subscriber;

use crate::connection::ConnectionManager;
use crate::publisher::{AmqpQueuePublisher, AmqpTopicPublisher};
use crate::subscriber::{AmqpQueueSubscriber, AmqpTopicSubscriber};

/// Factory for the AMQP transport.
///
/// All publishers and subscribers created here share one
/// [`ConnectionManager`] and therefore one broker connection.
pub struct AmqpMessaging {
    manager: Arc<ConnectionManager>,
    resolver: NameResolver,
}

impl AmqpMessaging {
    /// Build from settings with the default naming strategy.
    #[must_use]
    pub fn new(settings: AmqpSettings) -> Self {
        Self::with_resolver(settings, NameResolver::default())
    }

    /// Build with an explicit naming strategy.
    #[must_use]
    pub fn with_resolver(settings: AmqpSettings, resolver: NameResolver) -> Self {
        Self {
            manager: Arc::new(ConnectionManager::new(settings)),
            resolver,
        }
    }

    /// The shared connection manager (e.g. for shutdown wiring).
    #[must_use]
    pub fn connection(&self) -> &Arc<ConnectionManager> {
        &self.manager
    }

    /// Close the shared broker connection.
    ///
    /// # Errors
    ///
    /// See [`ConnectionManager::close`].
    pub async fn close(&self) -> Result<(), MessagingError> {
        self.manager.close().await
    }
}

impl MessagingFactory for AmqpMessaging {
    fn topic_publisher<M: Message>(&self) -> Arc<dyn Publisher<M>> {
        Arc::new(AmqpTopicPublisher::new(self.manager.clone(), &self.resolver))
    }

    fn queue_publisher<M: Message>(&self) -> Arc<dyn Publisher<M>> {
        Arc::new(AmqpQueuePublisher::new(self.manager.clone(), &self.resolver))
    }

    fn topic_subscriber<M: Message>(&self) -> Arc<dyn Subscriber<M>> {
        Arc::new(AmqpTopicSubscriber::new(self.manager.clone(), &self.resolver))
    }

    fn queue_subscriber<M: Message>(&self) -> Arc<dyn Subscriber<M>> {
        Arc::new(AmqpQueueSubscriber::new(self.manager.clone(), &self.resolver))
    }
}
