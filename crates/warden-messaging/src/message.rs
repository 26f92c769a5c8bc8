//! # Message Contract
//!
//! Defines what any transported object must satisfy and the envelope that
//! rides next to every payload.
//!
//! The envelope is deliberately separate from the payload: transports
//! persist it across redelivery (headers on AMQP, frame fields in the
//! in-memory broker), which is what makes `failure_count` meaningful
//! across retry attempts instead of being per-process state.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Contract for anything that can travel through the bus.
///
/// Payload fields are type-specific and opaque to this layer; the only
/// requirements are serializability and independent constructibility so a
/// generic deserializer can produce fresh instances on the consuming side.
pub trait Message: Serialize + DeserializeOwned + Default + Send + Sync + 'static {}

impl<T> Message for T where T: Serialize + DeserializeOwned + Default + Send + Sync + 'static {}

/// Transport metadata attached to a published message.
///
/// Mapped to broker headers by the concrete transport; values the
/// envelope does not claim arrive back in the consumer's [`Delivery`].
pub type Metadata = HashMap<String, String>;

/// Per-message envelope carried out-of-band from the payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Unique identifier for this message instance.
    pub message_id: Uuid,

    /// Opaque correlation identifier, if any.
    pub trace_id: Option<String>,

    /// Identifier linking related operations, if any.
    pub reference_id: Option<String>,

    /// Producer-side creation time, unix milliseconds.
    pub created_at: u64,

    /// Failed processing attempts in the current retry chain.
    ///
    /// Monotonically non-decreasing while a delivery chain is retried;
    /// reset to 0 on the first successful handling.
    pub failure_count: u32,
}

impl Envelope {
    /// Create a fresh envelope with a new id and the current timestamp.
    #[must_use]
    pub fn new() -> Self {
        Self {
            message_id: Uuid::new_v4(),
            trace_id: None,
            reference_id: None,
            created_at: now_millis(),
            failure_count: 0,
        }
    }

    /// Attach a correlation identifier.
    #[must_use]
    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    /// Attach a reference to a related operation.
    #[must_use]
    pub fn with_reference_id(mut self, reference_id: impl Into<String>) -> Self {
        self.reference_id = Some(reference_id.into());
        self
    }
}

impl Default for Envelope {
    fn default() -> Self {
        Self::new()
    }
}

/// Current unix timestamp in milliseconds.
fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// Everything a handler sees about a delivery besides the payload itself.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Envelope as received; `failure_count` reflects prior attempts.
    pub envelope: Envelope,

    /// Transport headers attached by the producer.
    pub metadata: Metadata,

    /// Cancelled when the owning subscription shuts down.
    pub cancel: CancellationToken,
}

impl Delivery {
    /// Build a delivery context for a received frame.
    #[must_use]
    pub fn new(envelope: Envelope, metadata: Metadata, cancel: CancellationToken) -> Self {
        Self {
            envelope,
            metadata,
            cancel,
        }
    }
}

/// A subscriber-side message handler.
///
/// Invoked once per delivered message. Errors never propagate to the
/// transport; they feed the retry-or-give-up policy of
/// [`FailurePolicy`](crate::failure::FailurePolicy).
pub type Handler<M> =
    Arc<dyn Fn(M, Delivery) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Adapt an async closure into a [`Handler`].
pub fn handler_fn<M, F, Fut>(f: F) -> Handler<M>
where
    M: Message,
    F: Fn(M, Delivery) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(
        move |message, delivery| -> BoxFuture<'static, anyhow::Result<()>> {
            Box::pin(f(message, delivery))
        },
    )
}
