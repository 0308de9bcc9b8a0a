//! Errors raised by the transport binding.

use thiserror::Error;

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Failures of the underlying broker connection or subscription.
///
/// These are fatal for the listener instance that observes them. Recovery
/// (reconnect, resubscribe) belongs to whoever owns the process.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The connection to the broker is gone.
    #[error("connection to broker lost")]
    ConnectionLost,

    /// The subscription was closed and can no longer deliver or ack.
    #[error("subscription closed: {subject} / {queue_group}")]
    SubscriptionClosed { subject: String, queue_group: String },

    /// Internal broker state lock was poisoned.
    #[error("broker lock poisoned during {0}")]
    LockPoisoned(&'static str),

    /// Broker state could not be saved or restored.
    #[error("snapshot failed: {0}")]
    Snapshot(String),

    /// The broker refused the request.
    #[error("rejected by broker: {0}")]
    Rejected(String),
}

impl From<bitcode::Error> for TransportError {
    fn from(err: bitcode::Error) -> Self {
        TransportError::Snapshot(err.to_string())
    }
}
