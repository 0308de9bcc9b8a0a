//! Transport binding - the broker primitives listeners are built on.
//!
//! This module provides traits for publishing, subscribing with queue-group
//! options, and acknowledging individual deliveries, plus an in-memory
//! broker that implements them.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 DurableListener (per subject)                │
//! │  - builds SubscriptionConfig, decodes, dispatches            │
//! └─────────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │             Transport = Publisher + Subscriber               │
//! │  Publisher:    publish(subject, payload) -> sequence         │
//! │  Subscriber:   subscribe(subject, group, config)             │
//! │  Subscription: next(timeout) / close() / unsubscribe()       │
//! │  Message:      data() / ack()                                │
//! └─────────────────────────────────────────────────────────────┘
//!          │                  │                     │
//!          ▼                  ▼                     ▼
//! ┌──────────────┐   ┌──────────────────┐   ┌──────────────────┐
//! │InMemoryBroker│   │ NATS Streaming   │   │ JetStream        │
//! │  (included)  │   │   (external)     │   │   (external)     │
//! └──────────────┘   └──────────────────┘   └──────────────────┘
//! ```
//!
//! Delivery is at-least-once. A message that is not acked within the
//! subscription's ack-wait is handed out again, to the same or another
//! member of the queue group.

mod clock;
mod error;
#[cfg(feature = "memory")]
mod in_memory;
mod message;
mod options;
mod payload;
mod transport;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Result, TransportError};
#[cfg(feature = "memory")]
pub use in_memory::{InMemoryBroker, InMemorySubscription};
pub use message::{Acker, Delivery, Message};
pub use options::{SubscriptionConfig, DEFAULT_ACK_WAIT};
pub use payload::Payload;
pub use transport::{Publisher, Subscriber, Subscription, Transport};
