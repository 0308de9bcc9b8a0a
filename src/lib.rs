//! Durable, queue-grouped message listeners.
//!
//! Services subscribe to a subject as members of a durable queue group: the
//! broker persists one delivery cursor per group, hands each message to one
//! member, and redelivers anything not acknowledged within the ack-wait.
//! Listeners decode JSON payloads into a type bound to the subject and
//! acknowledge explicitly once their side effects are durable.
//!
//! - [`bus`] - transport binding traits and an in-memory broker
//! - [`listener`] - subscription configuration, decoding, dispatch, lifecycle
//! - [`Subject`] / [`Event`] - channels and their payload types

pub mod bus;
mod error;
pub mod listener;
mod subject;

pub use error::{ConfigError, ListenerError};
pub use listener::{
    DurableListener, EventData, HandlerError, Listener, ListenerConfig, ListenerHandle,
    ListenerStats, QueueGroupName, SubscriptionState,
};
pub use subject::{Event, Subject, UnknownSubject};
