//! Listener configuration and the subscription configurer.

use std::fmt;
use std::ops::Deref;
use std::time::Duration;

use serde::Deserialize;

use crate::bus::{SubscriptionConfig, DEFAULT_ACK_WAIT};
use crate::error::ConfigError;

/// Environment variable overriding the ack-wait, in milliseconds.
pub const ACK_WAIT_ENV: &str = "LISTENER_ACK_WAIT_MS";
/// Environment variable overriding the poll interval, in milliseconds.
pub const POLL_INTERVAL_ENV: &str = "LISTENER_POLL_INTERVAL_MS";

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Name of a durable queue group.
///
/// Doubles as the durable subscription name, so one logical consumer group
/// maps to exactly one name per subject. Never empty.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct QueueGroupName(String);

impl QueueGroupName {
    pub fn new(name: impl Into<String>) -> Result<Self, ConfigError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ConfigError::EmptyQueueGroup);
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Deref for QueueGroupName {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueueGroupName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Process-level listener settings.
///
/// ## Example
///
/// ```
/// use std::time::Duration;
/// use durable_listener::ListenerConfig;
///
/// let config = ListenerConfig::default().with_ack_wait(Duration::from_secs(10));
/// assert_eq!(config.ack_wait, Duration::from_secs(10));
/// assert_eq!(ListenerConfig::default().ack_wait, Duration::from_millis(5_000));
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(from = "RawListenerConfig")]
pub struct ListenerConfig {
    /// Time the handler has to ack a delivery before it is redelivered.
    pub ack_wait: Duration,
    /// Upper bound on a single blocking pull from the subscription. Also how
    /// quickly a stop request is noticed.
    pub poll_interval: Duration,
}

#[derive(Deserialize)]
struct RawListenerConfig {
    #[serde(default = "default_ack_wait_ms")]
    ack_wait_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    poll_interval_ms: u64,
}

fn default_ack_wait_ms() -> u64 {
    DEFAULT_ACK_WAIT.as_millis() as u64
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL.as_millis() as u64
}

impl From<RawListenerConfig> for ListenerConfig {
    fn from(raw: RawListenerConfig) -> Self {
        Self {
            ack_wait: Duration::from_millis(raw.ack_wait_ms),
            poll_interval: Duration::from_millis(raw.poll_interval_ms),
        }
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            ack_wait: DEFAULT_ACK_WAIT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl ListenerConfig {
    pub fn with_ack_wait(mut self, ack_wait: Duration) -> Self {
        self.ack_wait = ack_wait;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Defaults overridden by `LISTENER_ACK_WAIT_MS` and
    /// `LISTENER_POLL_INTERVAL_MS` when set.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) with an explicit variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(ms) = read_millis(&lookup, ACK_WAIT_ENV)? {
            config.ack_wait = ms;
        }
        if let Some(ms) = read_millis(&lookup, POLL_INTERVAL_ENV)? {
            config.poll_interval = ms;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ack_wait.is_zero() {
            return Err(ConfigError::ZeroAckWait);
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::ZeroPollInterval);
        }
        Ok(())
    }
}

fn read_millis<F>(lookup: &F, key: &'static str) -> Result<Option<Duration>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse::<u64>()
            .map(|ms| Some(Duration::from_millis(ms)))
            .map_err(|_| ConfigError::InvalidEnv { key, value }),
    }
}

/// Build the subscription options for one listener.
///
/// Pure: replay all unacknowledged history, manual acks only, the given
/// ack-wait, and the queue group as the durable name so the broker keeps the
/// group's cursor across restarts.
pub fn subscription_config(
    queue_group: &str,
    ack_wait: Duration,
) -> Result<SubscriptionConfig, ConfigError> {
    let queue_group = QueueGroupName::new(queue_group)?;
    if ack_wait.is_zero() {
        return Err(ConfigError::ZeroAckWait);
    }

    Ok(SubscriptionConfig::new()
        .set_deliver_all_available()
        .set_manual_ack_mode(true)
        .set_ack_wait(ack_wait)
        .set_durable_name(queue_group.as_str()))
}
