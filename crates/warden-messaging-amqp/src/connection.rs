//! # Connection Manager
//!
//! Single source of truth for the broker connection. The connection is
//! dialed lazily on first use and shared process-wide; a connection the
//! client reports dead is discarded and re-dialed on the next call, with
//! each dial bounded by the configured recovery interval. Channels are
//! opened fresh per publish/subscribe and never pooled.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use lapin::{Channel, Connection, ConnectionProperties};
use tokio::sync::Mutex;
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};

use warden_messaging::config::AmqpSettings;
use warden_messaging::error::MessagingError;

/// Owns the shared AMQP connection and hands out channels.
pub struct ConnectionManager {
    settings: AmqpSettings,

    /// Fast-path cache; readers check connection health without
    /// serializing behind the dial lock.
    cached: RwLock<Option<Arc<Connection>>>,

    /// Serializes (re)connection and teardown so concurrent callers
    /// cannot dial twice.
    dial_lock: Mutex<()>,

    /// Set once by [`close`](Self::close); all later calls fail fast.
    closed: AtomicBool,

    /// Physical connections established over this manager's lifetime.
    dials: AtomicU64,
}

impl ConnectionManager {
    #[must_use]
    pub fn new(settings: AmqpSettings) -> Self {
        Self {
            settings,
            cached: RwLock::new(None),
            dial_lock: Mutex::new(()),
            closed: AtomicBool::new(false),
            dials: AtomicU64::new(0),
        }
    }

    /// Number of physical connections dialed so far.
    #[must_use]
    pub fn dial_count(&self) -> u64 {
        self.dials.load(Ordering::Relaxed)
    }

    /// Get the shared connection, dialing if none exists or the cached
    /// one is dead.
    ///
    /// Double-checked: the fast path returns a healthy cached connection
    /// without taking the dial lock; the slow path re-checks under the
    /// lock before dialing, so two concurrent callers produce exactly
    /// one physical connection.
    ///
    /// # Errors
    ///
    /// [`MessagingError::MissingConnectionString`] when neither the
    /// environment override nor configuration provides a URL,
    /// [`MessagingError::Connect`]/[`MessagingError::ConnectTimeout`] on
    /// dial failure, [`MessagingError::Closed`] after [`close`](Self::close).
    pub async fn get_connection(&self) -> Result<Arc<Connection>, MessagingError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(MessagingError::Closed);
        }

        if let Some(connection) = self.cached_healthy() {
            return Ok(connection);
        }

        let _guard = self.dial_lock.lock().await;

        if self.closed.load(Ordering::Acquire) {
            return Err(MessagingError::Closed);
        }
        // Re-check under the lock: another caller may have reconnected
        // while we waited.
        if let Some(connection) = self.cached_healthy() {
            return Ok(connection);
        }

        let endpoint = self.settings.connection_string()?;
        let secs = self.settings.recovery_interval_secs;
        debug!("Dialing broker");

        let dial = Connection::connect(&endpoint, ConnectionProperties::default());
        let connection = match timeout(Duration::from_secs(secs), dial).await {
            Ok(Ok(connection)) => Arc::new(connection),
            Ok(Err(e)) => {
                return Err(MessagingError::Connect {
                    endpoint,
                    source: Box::new(e),
                });
            }
            Err(_) => return Err(MessagingError::ConnectTimeout { endpoint, secs }),
        };

        self.dials.fetch_add(1, Ordering::Relaxed);
        info!("Broker connection established");
        self.store(Some(connection.clone()));
        Ok(connection)
    }

    /// Open a fresh channel scoped to the caller.
    ///
    /// Channels are independent once the connection is open, so creation
    /// is not serialized beyond the connection check itself.
    ///
    /// # Errors
    ///
    /// Everything [`get_connection`](Self::get_connection) raises, plus
    /// [`MessagingError::Channel`] if the channel cannot be opened.
    pub async fn create_channel(&self) -> Result<Channel, MessagingError> {
        let connection = self.get_connection().await?;
        connection
            .create_channel()
            .await
            .map_err(|e| MessagingError::Channel {
                source: Box::new(e),
            })
    }

    /// Close the underlying connection and refuse further use.
    ///
    /// Idempotent: guarded by the dial lock and the closed flag, so the
    /// connection is torn down at most once no matter how many callers
    /// race here.
    ///
    /// # Errors
    ///
    /// None currently; close failures on the broker side are logged and
    /// swallowed because the connection is unusable either way.
    pub async fn close(&self) -> Result<(), MessagingError> {
        let _guard = self.dial_lock.lock().await;
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let connection = {
            match self.cached.write() {
                Ok(mut cached) => cached.take(),
                Err(_) => None,
            }
        };
        if let Some(connection) = connection {
            if let Err(e) = connection.close(200, "shutting down").await {
                warn!(error = %e, "Error closing broker connection");
            }
        }
        debug!("Connection manager closed");
        Ok(())
    }

    fn cached_healthy(&self) -> Option<Arc<Connection>> {
        let cached = self.cached.read().ok()?;
        cached
            .as_ref()
            .filter(|connection| connection.status().connected())
            .cloned()
    }

    fn store(&self, connection: Option<Arc<Connection>>) {
        if let Ok(mut cached) = self.cached.write() {
            *cached = connection;
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        // Synchronous teardown path: mark closed; the client closes the
        // socket when the last Arc<Connection> is released.
        self.closed.store(true, Ordering::Release);
    }
}
