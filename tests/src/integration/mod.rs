//! Cross-crate integration tests for the messaging core.

pub mod amqp_live;
pub mod cancellation;
pub mod failure;
pub mod naming;
