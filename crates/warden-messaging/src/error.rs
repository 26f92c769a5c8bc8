//! # Error Taxonomy
//!
//! Configuration errors are fatal at first use; connectivity errors
//! surface to the caller of publish/subscribe; cancellation is its own
//! variant and is never converted into a retry. Handler failures are
//! deliberately absent here: subscriber-side business errors feed the
//! failure policy and never surface through these variants.

use thiserror::Error;

use crate::config::CONNECTION_STRING_ENV;

/// Boxed transport-level error source.
///
/// Keeps client-library types (e.g. the AMQP crate's) out of the shared
/// contract so every transport reports through the same taxonomy.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced by messaging operations.
#[derive(Debug, Error)]
pub enum MessagingError {
    /// Neither the environment override nor configuration provides a
    /// broker connection string.
    #[error("no broker connection string: set {} or messaging.amqp.url", CONNECTION_STRING_ENV)]
    MissingConnectionString,

    /// Could not establish the broker connection.
    #[error("failed to connect to broker at {endpoint}")]
    Connect {
        endpoint: String,
        #[source]
        source: BoxError,
    },

    /// The (re)connect attempt exceeded the bounded recovery interval.
    #[error("connect to {endpoint} timed out after {secs}s")]
    ConnectTimeout { endpoint: String, secs: u64 },

    /// Could not open a channel on the active connection.
    #[error("failed to open a broker channel")]
    Channel {
        #[source]
        source: BoxError,
    },

    /// Publishing to a destination failed.
    #[error("failed to publish to {destination}")]
    Publish {
        destination: String,
        #[source]
        source: BoxError,
    },

    /// Registering or tearing down a consumer failed.
    #[error("failed to subscribe to {destination}")]
    Subscribe {
        destination: String,
        #[source]
        source: BoxError,
    },

    /// Payload serialization failed before any I/O was attempted.
    #[error("message serialization failed")]
    Serialization(#[from] serde_json::Error),

    /// The operation's cancellation token was tripped.
    #[error("operation cancelled")]
    Cancelled,

    /// The connection manager has been closed.
    #[error("messaging connection is closed")]
    Closed,

    /// `subscribe` was called while a subscription is already active.
    #[error("subscription is already active")]
    AlreadySubscribed,

    /// `unsubscribe` was called without an active subscription.
    #[error("no active subscription")]
    NotSubscribed,
}
