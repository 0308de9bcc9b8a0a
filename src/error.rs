use thiserror::Error;

use crate::bus::TransportError;

/// Invalid listener configuration. Fatal at startup: the listener must not
/// subscribe with a configuration that failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("queue group name must not be empty")]
    EmptyQueueGroup,

    #[error("ack wait must be greater than zero")]
    ZeroAckWait,

    #[error("poll interval must be greater than zero")]
    ZeroPollInterval,

    #[error("invalid value for {key}: '{value}'")]
    InvalidEnv { key: &'static str, value: String },
}

/// Errors that end a listener's lifecycle.
///
/// Decode and handler failures never show up here: they are logged, the
/// message is left unacknowledged, and processing continues.
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The delivery thread unwound outside any contained handler call.
    #[error("delivery thread panicked: {0}")]
    Panicked(String),
}
