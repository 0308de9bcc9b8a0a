//! Transport binding traits: publish, subscribe, pull deliveries.

use std::time::Duration;

use super::error::Result;
use super::message::Message;
use super::options::SubscriptionConfig;
use super::payload::Payload;

/// Publishes payloads to a subject.
///
/// Implementations might include:
/// - `InMemoryBroker` - For testing and single-process scenarios
/// - A NATS Streaming / JetStream client
/// - Any broker with at-least-once delivery and durable cursors
pub trait Publisher: Send + Sync {
    /// Publish a payload and return the sequence the broker assigned to it.
    fn publish(&self, subject: &str, payload: Payload) -> Result<u64>;

    /// Publish several payloads to the same subject.
    ///
    /// Default implementation publishes sequentially and stops at the first
    /// failure.
    fn publish_batch(&self, subject: &str, payloads: Vec<Payload>) -> Result<Vec<u64>> {
        payloads
            .into_iter()
            .map(|payload| self.publish(subject, payload))
            .collect()
    }
}

/// Establishes queue-group subscriptions.
pub trait Subscriber: Send + Sync {
    type Subscription: Subscription + 'static;

    /// Join `queue_group` on `subject` with the given options.
    ///
    /// Members of the same group share one delivery cursor, so each message
    /// goes to exactly one of them.
    fn subscribe(
        &self,
        subject: &str,
        queue_group: &str,
        config: &SubscriptionConfig,
    ) -> Result<Self::Subscription>;
}

/// One live membership in a queue group.
///
/// This is a pull-based interface: the owner asks for the next delivery and
/// blocks up to `timeout`.
pub trait Subscription: Send {
    /// Wait for the next delivery, returning `None` if the timeout elapses.
    fn next(&mut self, timeout: Duration) -> Result<Option<Message>>;

    /// Stop receiving. A durable cursor is kept so a later member with the
    /// same durable name resumes where the group left off.
    fn close(&mut self) -> Result<()>;

    /// Stop receiving and, if this was the last member, drop the durable
    /// cursor as well.
    fn unsubscribe(&mut self) -> Result<()>;

    fn is_closed(&self) -> bool;
}

/// Combined trait for a full transport binding.
pub trait Transport: Publisher + Subscriber {}

// Blanket implementation
impl<T: Publisher + Subscriber> Transport for T {}
