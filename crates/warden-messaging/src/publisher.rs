//! # Publisher Contract
//!
//! Publishing side of the bus. Implementations resolve the destination
//! from the message type once, serialize the payload, and hand the bytes
//! to their transport. Publish failures propagate to the caller; retry is
//! a consumer-side concern.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::MessagingError;
use crate::message::{Envelope, Message, Metadata};

/// Publishes messages of type `M` to one destination.
#[async_trait]
pub trait Publisher<M: Message>: Send + Sync {
    /// Publish with a fresh envelope and no metadata.
    ///
    /// # Errors
    ///
    /// See [`publish_with`](Self::publish_with).
    async fn publish(
        &self,
        message: &M,
        cancel: &CancellationToken,
    ) -> Result<(), MessagingError> {
        self.publish_with(message, Envelope::new(), Metadata::new(), cancel)
            .await
    }

    /// Publish with an explicit envelope and transport metadata.
    ///
    /// A token that is already cancelled aborts with
    /// [`MessagingError::Cancelled`] before any I/O is attempted; a token
    /// tripped mid-operation aborts that operation with the same error.
    ///
    /// # Errors
    ///
    /// Serialization, connectivity and cancellation errors; no internal
    /// retry is performed at this layer.
    async fn publish_with(
        &self,
        message: &M,
        envelope: Envelope,
        metadata: Metadata,
        cancel: &CancellationToken,
    ) -> Result<(), MessagingError>;
}
