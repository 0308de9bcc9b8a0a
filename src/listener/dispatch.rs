//! Decode-then-handle for a single delivery.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::{debug, error, warn};

use super::decoder::{self, DecodeError};
use super::handler::{subject_of, EventData, HandlerError, Listener};
use crate::bus::Message;

/// What happened to one delivery.
///
/// Only `Handled` can have acked the message, and only if the handler did
/// so itself.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// The handler returned `Ok`. `acked` reports whether it acknowledged.
    Handled { acked: bool },
    /// The delivery arrived on a subject other than the listener's.
    Misrouted { subject: String },
    /// The payload was not valid JSON for the subject's data type.
    DecodeFailed(DecodeError),
    /// The handler returned an error or panicked.
    HandlerFailed(HandlerError),
}

impl DispatchOutcome {
    pub fn is_handled(&self) -> bool {
        matches!(self, DispatchOutcome::Handled { .. })
    }
}

/// Decode `msg` and pass it to the listener's handler.
///
/// Never acks on its own. Failures are logged and returned. Panics in the
/// data type's `Deserialize` impl or in the handler are caught here, so one
/// bad message cannot stop the listener.
pub fn dispatch<L: Listener>(listener: &L, msg: &Message) -> DispatchOutcome {
    let subject = subject_of::<L>();
    let queue_group = listener.queue_group_name();

    debug!(
        subject = %subject,
        queue_group,
        sequence = msg.sequence(),
        redelivered = msg.redelivered(),
        "Message received: {} / {}",
        subject,
        queue_group
    );

    if msg.subject() != subject.as_str() {
        error!(
            expected = %subject,
            actual = msg.subject(),
            queue_group,
            sequence = msg.sequence(),
            "delivery on unexpected subject; leaving unacknowledged"
        );
        return DispatchOutcome::Misrouted {
            subject: msg.subject().to_string(),
        };
    }

    let decoded = catch_unwind(AssertUnwindSafe(|| decoder::decode::<EventData<L>>(msg.data())))
        .unwrap_or_else(|panic| Err(DecodeError::Panicked(panic_message(panic.as_ref()))));

    let data = match decoded {
        Ok(data) => data,
        Err(err) => {
            warn!(
                subject = %subject,
                queue_group,
                sequence = msg.sequence(),
                attempt = msg.attempt(),
                payload = %msg.data().preview(),
                error = %err,
                "failed to decode message; leaving unacknowledged for redelivery"
            );
            return DispatchOutcome::DecodeFailed(err);
        }
    };

    match catch_unwind(AssertUnwindSafe(|| listener.on_message(data, msg))) {
        Ok(Ok(())) => {
            let acked = msg.is_acked();
            if !acked {
                debug!(
                    subject = %subject,
                    queue_group,
                    sequence = msg.sequence(),
                    "handler returned without acking; message will be redelivered"
                );
            }
            DispatchOutcome::Handled { acked }
        }
        Ok(Err(err)) => {
            warn!(
                subject = %subject,
                queue_group,
                sequence = msg.sequence(),
                attempt = msg.attempt(),
                error = %err,
                "handler failed; leaving unacknowledged for redelivery"
            );
            DispatchOutcome::HandlerFailed(err)
        }
        Err(panic) => {
            let reason = panic_message(panic.as_ref());
            error!(
                subject = %subject,
                queue_group,
                sequence = msg.sequence(),
                reason = %reason,
                "handler panicked; leaving unacknowledged for redelivery"
            );
            DispatchOutcome::HandlerFailed(HandlerError::Panicked(reason))
        }
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
