//! # Warden Messaging - Publish/Subscribe Contracts
//!
//! Transport-agnostic messaging layer used by platform services to emit and
//! consume domain events (audit events, log-forwarding events) without
//! coupling business code to a specific broker.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   publish()    ┌──────────────┐   deliver    ┌──────────────┐
//! │   Producer   │ ─────────────▶ │  Transport   │ ───────────▶ │  Subscriber  │
//! │ (service)    │                │ (AMQP/memory │              │ loop + retry │
//! └──────────────┘                │  /null)      │              └──────────────┘
//!                                 └──────────────┘
//! ```
//!
//! Destination names are derived from the message type alone (see
//! [`naming`] and [`sanitize`]), so independently deployed producer and
//! consumer processes agree without shared runtime state. Processing
//! failures on the consumer side run through one reusable retry-or-give-up
//! policy (see [`failure`]); after the retry budget is exhausted the
//! message is permanently discarded and an optional callback is notified.
//!
//! Concrete transports in this crate: [`memory`] (in-process broker for
//! tests and single-process development) and [`null`] (no-op stand-in for
//! environments without a broker). The AMQP transport lives in the
//! `warden-messaging-amqp` crate.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod config;
pub mod error;
pub mod factory;
pub mod failure;
pub mod memory;
pub mod message;
pub mod naming;
pub mod null;
pub mod publisher;
pub mod sanitize;
pub mod subscriber;

// Re-export main types
pub use config::{AmqpSettings, MessagingSettings, TransportKind, CONNECTION_STRING_ENV};
pub use error::MessagingError;
pub use factory::MessagingFactory;
pub use failure::{permanent_failure_fn, FailurePolicy, PermanentFailureHook, Verdict};
pub use memory::{MemoryBroker, MemoryMessaging};
pub use message::{handler_fn, Delivery, Envelope, Handler, Message, Metadata};
pub use naming::{NameResolver, NamingStrategy};
pub use null::{NullMessaging, NullPublisher, NullSubscriber};
pub use publisher::Publisher;
pub use sanitize::{is_valid, sanitize, NamingError};
pub use subscriber::{Subscriber, SubscriptionState};

/// Processing failures tolerated per message before it is permanently
/// discarded, unless a subscription overrides the budget.
pub const DEFAULT_MAX_FAILURE_COUNT: u32 = 3;
