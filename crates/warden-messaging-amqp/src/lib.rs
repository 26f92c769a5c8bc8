//! # Warden Messaging - AMQP Transport
//!
//! Broker-backed implementation of the `warden-messaging` contracts on
//! AMQP 0.9.1 (RabbitMQ).
//!
//! ## Topology
//!
//! - **Topic** destinations are durable fanout exchanges; every
//!   subscriber binds its own exclusive server-named queue, so each
//!   subscriber sees every message.
//! - **Queue** destinations are durable queues on the default exchange;
//!   consumers compete and each message reaches exactly one of them.
//!
//! One shared connection per process is managed by
//! [`ConnectionManager`]; every publish and every subscription opens its
//! own channel. Delivery is at-least-once: duplicates are possible on
//! redelivery, silent loss of an acknowledged publish is not.
//!
//! Handler failures never reach the broker as errors; they run through
//! the shared failure policy, and transient failures are republished to
//! the subscription's own queue with the updated envelope headers so the
//! retry count survives redelivery.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod connection;
pub mod factory;
pub mod publisher;
pub mod subscriber;
pub mod wire;

// Re-export main types
pub use connection::ConnectionManager;
pub use factory::AmqpMessaging;
pub use publisher::{AmqpQueuePublisher, AmqpTopicPublisher};
pub use subscriber::{AmqpQueueSubscriber, AmqpTopicSubscriber};
