//! Durable queue-group listeners.
//!
//! A listener declares an [`Event`](crate::Event) (and so a subject), a
//! queue group, and a handler. [`DurableListener`] turns that into a
//! subscription that:
//! - joins the queue group under a durable name equal to the group name,
//! - replays history the group has not yet acknowledged,
//! - never acks on its own, leaving that to the handler,
//! - lets the broker redeliver anything not acked within the ack-wait.
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use durable_listener::{DurableListener, Listener, HandlerError};
//! use durable_listener::bus::{InMemoryBroker, Message};
//!
//! struct TicketCreatedListener { repo: TicketRepo }
//!
//! impl Listener for TicketCreatedListener {
//!     type Event = TicketCreated;
//!
//!     fn queue_group_name(&self) -> &str {
//!         "orders-service"
//!     }
//!
//!     fn on_message(&self, data: TicketCreatedData, msg: &Message) -> Result<(), HandlerError> {
//!         self.repo.insert(data.id, data.title, data.price)?;
//!         msg.ack()?;
//!         Ok(())
//!     }
//! }
//!
//! let broker = Arc::new(InMemoryBroker::new());
//! let handle = DurableListener::new(broker, TicketCreatedListener { repo }).listen()?;
//! ```
//!
//! ## Delivery model
//!
//! Each `DurableListener` pulls and handles deliveries one at a time on its
//! own thread. Separate listeners run in parallel.

mod config;
mod decoder;
mod dispatch;
mod handler;
mod runner;

pub use config::{
    subscription_config, ListenerConfig, QueueGroupName, ACK_WAIT_ENV, POLL_INTERVAL_ENV,
};
pub use decoder::{decode, normalize, DecodeError};
pub use dispatch::{dispatch, DispatchOutcome};
pub use handler::{EventData, HandlerError, Listener};
pub use runner::{DurableListener, ListenerHandle, ListenerStats, SubscriptionState};
