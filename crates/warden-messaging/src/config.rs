//! # Messaging Configuration
//!
//! Transport selection and broker settings. A missing connection string
//! is a configuration error at first publish/subscribe, not at
//! registration time, so services without a broker can still construct
//! the messaging layer (and select the null transport).

use serde::Deserialize;

use crate::error::MessagingError;

/// Environment variable that overrides the configured connection string.
pub const CONNECTION_STRING_ENV: &str = "WARDEN_MESSAGING_URL";

/// Which transport the platform wires in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Null transport: publish/subscribe are no-ops (no broker configured).
    #[default]
    None,

    /// In-process broker, for tests and single-process development.
    Memory,

    /// AMQP broker.
    Amqp,
}

/// Top-level messaging configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MessagingSettings {
    /// Transport discriminator.
    pub transport: TransportKind,

    /// AMQP-specific settings.
    pub amqp: AmqpSettings,
}

/// AMQP connection settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AmqpSettings {
    /// Broker connection string; empty means "not configured here".
    pub url: String,

    /// Upper bound on a single (re)connect attempt, in seconds.
    pub recovery_interval_secs: u64,
}

impl Default for AmqpSettings {
    fn default() -> Self {
        Self {
            url: String::new(),
            recovery_interval_secs: 10,
        }
    }
}

impl AmqpSettings {
    /// Resolve the effective connection string.
    ///
    /// The [`CONNECTION_STRING_ENV`] environment variable takes priority
    /// over the configured `url`.
    ///
    /// # Errors
    ///
    /// [`MessagingError::MissingConnectionString`] when neither source
    /// provides a value.
    pub fn connection_string(&self) -> Result<String, MessagingError> {
        if let Ok(url) = std::env::var(CONNECTION_STRING_ENV) {
            if !url.is_empty() {
                return Ok(url);
            }
        }
        if self.url.is_empty() {
            return Err(MessagingError::MissingConnectionString);
        }
        Ok(self.url.clone())
    }
}
