//! # Transport Factory
//!
//! The seam where a service picks its transport once. Producers and
//! consumers receive [`Publisher`]/[`Subscriber`] trait objects and never
//! learn which transport is behind them, so environments without a broker
//! swap in the null transport with no conditional code downstream.

use std::sync::Arc;

use crate::message::Message;
use crate::publisher::Publisher;
use crate::subscriber::Subscriber;

/// Hands out publishers and subscribers for a concrete transport.
///
/// Construction is cheap and performs no I/O; connections are established
/// lazily on first publish/subscribe.
pub trait MessagingFactory {
    /// Publisher for the broadcast topic derived from `M`.
    fn topic_publisher<M: Message>(&self) -> Arc<dyn Publisher<M>>;

    /// Publisher for the competing-consumer queue derived from `M`.
    fn queue_publisher<M: Message>(&self) -> Arc<dyn Publisher<M>>;

    /// Subscriber for the broadcast topic derived from `M`.
    fn topic_subscriber<M: Message>(&self) -> Arc<dyn Subscriber<M>>;

    /// Subscriber for the competing-consumer queue derived from `M`.
    fn queue_subscriber<M: Message>(&self) -> Arc<dyn Subscriber<M>>;
}
