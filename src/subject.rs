//! Subjects (event channels) and the compile-time binding of a subject to
//! its payload type.

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Every event channel known to the system.
///
/// The wire name (`as_str`) is what the broker sees.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Subject {
    #[serde(rename = "ticket:created")]
    TicketCreated,
    #[serde(rename = "ticket:updated")]
    TicketUpdated,
    #[serde(rename = "order:created")]
    OrderCreated,
    #[serde(rename = "order:cancelled")]
    OrderCancelled,
    #[serde(rename = "expiration:complete")]
    ExpirationComplete,
    #[serde(rename = "payment:created")]
    PaymentCreated,
}

impl Subject {
    pub const ALL: [Subject; 6] = [
        Subject::TicketCreated,
        Subject::TicketUpdated,
        Subject::OrderCreated,
        Subject::OrderCancelled,
        Subject::ExpirationComplete,
        Subject::PaymentCreated,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Subject::TicketCreated => "ticket:created",
            Subject::TicketUpdated => "ticket:updated",
            Subject::OrderCreated => "order:created",
            Subject::OrderCancelled => "order:cancelled",
            Subject::ExpirationComplete => "expiration:complete",
            Subject::PaymentCreated => "payment:created",
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a wire name matches no known subject.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown subject: {0}")]
pub struct UnknownSubject(pub String);

impl FromStr for Subject {
    type Err = UnknownSubject;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Subject::ALL
            .iter()
            .copied()
            .find(|subject| subject.as_str() == s)
            .ok_or_else(|| UnknownSubject(s.to_string()))
    }
}

/// Binds a subject to the shape of the data published on it.
///
/// The data schema belongs to the business-event contract; this crate only
/// needs to know how to deserialize it.
///
/// ```
/// use serde::Deserialize;
/// use durable_listener::{Event, Subject};
///
/// #[derive(Deserialize)]
/// struct TicketCreatedData {
///     id: String,
///     title: String,
/// }
///
/// struct TicketCreated;
///
/// impl Event for TicketCreated {
///     const SUBJECT: Subject = Subject::TicketCreated;
///     type Data = TicketCreatedData;
/// }
/// ```
pub trait Event: Send + Sync + 'static {
    const SUBJECT: Subject;
    type Data: DeserializeOwned + Send;
}
