//! Inbound messages and their acknowledgment capability.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::error::Result;
use super::payload::Payload;

/// Identifies one delivery attempt to the broker when acknowledging it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Delivery {
    pub subject: String,
    pub queue_group: String,
    pub sequence: u64,
    pub attempt: u32,
}

/// Transport-side acknowledgment primitive.
///
/// Implementations mark the delivery as processed for its queue group. They
/// may be called concurrently for different deliveries.
pub trait Acker: Send + Sync {
    fn ack(&self, delivery: &Delivery) -> Result<()>;
}

/// A message delivered to a subscription.
///
/// Carries the raw payload plus a one-shot ack capability bound to this
/// specific delivery. Acking twice is a no-op: only the first successful
/// call reaches the broker.
pub struct Message {
    delivery: Delivery,
    payload: Payload,
    timestamp_ms: u64,
    acker: Arc<dyn Acker>,
    acked: AtomicBool,
}

impl Message {
    /// Create a first-attempt delivery.
    pub fn new(
        subject: impl Into<String>,
        queue_group: impl Into<String>,
        sequence: u64,
        payload: Payload,
        acker: Arc<dyn Acker>,
    ) -> Self {
        Self {
            delivery: Delivery {
                subject: subject.into(),
                queue_group: queue_group.into(),
                sequence,
                attempt: 1,
            },
            payload,
            timestamp_ms: 0,
            acker,
            acked: AtomicBool::new(false),
        }
    }

    /// Set the delivery attempt (1 for the first delivery).
    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.delivery.attempt = attempt.max(1);
        self
    }

    /// Set the publish timestamp in unix milliseconds.
    pub fn with_timestamp(mut self, timestamp_ms: u64) -> Self {
        self.timestamp_ms = timestamp_ms;
        self
    }

    pub fn subject(&self) -> &str {
        &self.delivery.subject
    }

    pub fn queue_group(&self) -> &str {
        &self.delivery.queue_group
    }

    /// Broker-assigned position of the message in its channel.
    pub fn sequence(&self) -> u64 {
        self.delivery.sequence
    }

    /// Raw message data.
    pub fn data(&self) -> &Payload {
        &self.payload
    }

    /// Publish time in unix milliseconds (0 if unknown).
    pub fn timestamp_ms(&self) -> u64 {
        self.timestamp_ms
    }

    pub fn attempt(&self) -> u32 {
        self.delivery.attempt
    }

    /// True if this message was handed out before and not acknowledged.
    pub fn redelivered(&self) -> bool {
        self.delivery.attempt > 1
    }

    pub fn delivery(&self) -> &Delivery {
        &self.delivery
    }

    pub fn is_acked(&self) -> bool {
        self.acked.load(Ordering::Acquire)
    }

    /// Acknowledge this delivery.
    ///
    /// Call only once the message's side effects are durable. Subsequent
    /// calls return `Ok(())` without contacting the broker. If the broker
    /// rejects the ack, the message stays unacknowledged and the call may be
    /// retried.
    pub fn ack(&self) -> Result<()> {
        if self
            .acked
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(());
        }

        if let Err(err) = self.acker.ack(&self.delivery) {
            self.acked.store(false, Ordering::Release);
            return Err(err);
        }
        Ok(())
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("subject", &self.delivery.subject)
            .field("queue_group", &self.delivery.queue_group)
            .field("sequence", &self.delivery.sequence)
            .field("attempt", &self.delivery.attempt)
            .field("payload", &self.payload.preview())
            .field("acked", &self.is_acked())
            .finish()
    }
}
