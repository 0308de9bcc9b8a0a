//! The extension point: what each concrete listener provides.

use std::error::Error;

use thiserror::Error;

use crate::bus::{Message, TransportError};
use crate::subject::{Event, Subject};

/// Failure inside a listener's business logic.
///
/// Never fatal to the listener: the delivery stays unacknowledged and the
/// broker redelivers it after the ack-wait.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Business logic rejected the event (validation, invariant violation).
    #[error("rejected: {0}")]
    Rejected(String),

    /// Something the event refers to does not exist (yet).
    #[error("not found: {0}")]
    NotFound(String),

    /// Acknowledging the delivery failed.
    #[error("ack failed: {0}")]
    Ack(#[from] TransportError),

    /// The handler panicked.
    #[error("handler panicked: {0}")]
    Panicked(String),

    #[error("handler error: {0}")]
    Other(Box<dyn Error + Send + Sync>),
}

impl HandlerError {
    /// Wrap any error as [`HandlerError::Other`].
    pub fn other(err: impl Into<Box<dyn Error + Send + Sync>>) -> Self {
        HandlerError::Other(err.into())
    }
}

/// Data type carried by a listener's subject.
pub type EventData<L> = <<L as Listener>::Event as Event>::Data;

/// Subject a listener consumes.
pub(crate) fn subject_of<L: Listener>() -> Subject {
    <L::Event as Event>::SUBJECT
}

/// A long-lived binding of one subject to one durable queue group.
///
/// Implementors declare the event they consume and their queue group, and
/// handle decoded data. The handler owns acknowledgment: call
/// [`Message::ack`] once side effects are durable. Returning without
/// acking, or returning an error, leaves the message for redelivery.
///
/// Deliveries for one listener are handled one at a time, but the same
/// message may arrive more than once, so handlers must be idempotent.
///
/// ## Example
///
/// ```
/// use serde::Deserialize;
/// use durable_listener::{Event, EventData, HandlerError, Listener, Subject};
/// use durable_listener::bus::Message;
///
/// #[derive(Deserialize)]
/// pub struct TicketCreatedData {
///     pub id: String,
///     pub title: String,
/// }
///
/// pub struct TicketCreated;
///
/// impl Event for TicketCreated {
///     const SUBJECT: Subject = Subject::TicketCreated;
///     type Data = TicketCreatedData;
/// }
///
/// pub struct TicketCreatedListener;
///
/// impl Listener for TicketCreatedListener {
///     type Event = TicketCreated;
///
///     fn queue_group_name(&self) -> &str {
///         "payments-service"
///     }
///
///     fn on_message(&self, data: TicketCreatedData, msg: &Message) -> Result<(), HandlerError> {
///         println!("ticket {} created: {}", data.id, data.title);
///         msg.ack()?;
///         Ok(())
///     }
/// }
/// ```
pub trait Listener: Send + Sync + 'static {
    /// The event consumed. Its `SUBJECT` is the subject subscribed to, and
    /// its `Data` is what deliveries decode into.
    type Event: Event;

    /// Durable queue group this listener belongs to.
    fn queue_group_name(&self) -> &str;

    /// Handle one decoded delivery.
    fn on_message(&self, data: EventData<Self>, msg: &Message) -> Result<(), HandlerError>;
}
