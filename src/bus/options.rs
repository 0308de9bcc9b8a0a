//! Subscription options understood by the transport.

use std::time::Duration;

/// Default time a subscriber has to acknowledge a delivery.
pub const DEFAULT_ACK_WAIT: Duration = Duration::from_millis(5_000);

/// How a subscription should be established.
///
/// Computed once before subscribing and never changed afterwards. The
/// setters follow the broker client's option builder so call sites read the
/// same way:
///
/// ```
/// use std::time::Duration;
/// use durable_listener::bus::SubscriptionConfig;
///
/// let config = SubscriptionConfig::new()
///     .set_deliver_all_available()
///     .set_manual_ack_mode(true)
///     .set_ack_wait(Duration::from_secs(5))
///     .set_durable_name("payments-service");
///
/// assert!(config.replay_all_history);
/// assert_eq!(config.durable_name.as_deref(), Some("payments-service"));
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubscriptionConfig {
    /// Start a new group at the beginning of the channel instead of at the
    /// next published message.
    pub replay_all_history: bool,
    /// Deliveries are only settled by an explicit ack.
    pub manual_ack: bool,
    /// Time after a delivery before the broker hands the message out again.
    pub ack_wait: Duration,
    /// Name under which the broker persists the group's delivery cursor.
    pub durable_name: Option<String>,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriptionConfig {
    /// Broker defaults: new messages only, auto-ack, no durable cursor.
    pub fn new() -> Self {
        Self {
            replay_all_history: false,
            manual_ack: false,
            ack_wait: DEFAULT_ACK_WAIT,
            durable_name: None,
        }
    }

    pub fn set_deliver_all_available(mut self) -> Self {
        self.replay_all_history = true;
        self
    }

    pub fn set_manual_ack_mode(mut self, manual: bool) -> Self {
        self.manual_ack = manual;
        self
    }

    pub fn set_ack_wait(mut self, ack_wait: Duration) -> Self {
        self.ack_wait = ack_wait;
        self
    }

    pub fn set_durable_name(mut self, name: impl Into<String>) -> Self {
        self.durable_name = Some(name.into());
        self
    }

    /// Whether the broker keeps this group's cursor after all members leave.
    pub fn is_durable(&self) -> bool {
        self.durable_name.is_some()
    }
}
