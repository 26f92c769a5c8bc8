//! # Warden Messaging Test Suite
//!
//! Unified test crate for the messaging core.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── naming.rs        # resolve + sanitize properties
//!     ├── delivery.rs      # round-trip, fan-out, competing consumers
//!     ├── failure.rs       # retry budget and reset laws
//!     ├── cancellation.rs  # pre-cancelled and mid-operation tokens
//!     └── amqp_live.rs     # live-broker tests (ignored by default)
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p warden-tests
//!
//! # Live-broker tests (need amqp://localhost:5672)
//! cargo test -p warden-tests -- --ignored
//! ```

#![allow(unused_imports)]
#![allow(dead_code)]

pub mod integration;
