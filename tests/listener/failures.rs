//! Decode, handler and transport failures.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use durable_listener::bus::{
    InMemoryBroker, ManualClock, Message, Payload, Publisher, TransportError,
};
use durable_listener::{
    DurableListener, Event, HandlerError, Listener, ListenerError, Subject, SubscriptionState,
};
use serde::{Deserialize, Deserializer};

use crate::support::{
    init_tracing, listener_on, publish_ticket, Behavior, TicketCreatedListener, GROUP, SETTLE,
};

#[test]
fn malformed_payload_stays_pending_and_is_redelivered() {
    init_tracing();
    let clock = ManualClock::new(0);
    let broker = Arc::new(InMemoryBroker::with_clock(clock.clone()));
    let (listener, recorder) = TicketCreatedListener::new(Behavior::Ack);
    let handle = listener_on(&broker, listener).listen().unwrap();

    broker
        .publish("ticket:created", Payload::binary(b"not-json".to_vec()))
        .unwrap();

    assert!(handle.wait_for(SETTLE, |s| s.decode_failures == 1));
    assert!(recorder.seen().is_empty());
    assert_eq!(broker.pending("ticket:created", GROUP), vec![1]);

    clock.advance(Duration::from_millis(5_000));
    assert!(handle.wait_for(SETTLE, |s| s.decode_failures == 2));

    let stats = handle.stop().unwrap();
    assert_eq!(stats.redeliveries, 1);
    assert_eq!(stats.handled, 0);
    assert!(recorder.seen().is_empty());
    assert_eq!(broker.pending("ticket:created", GROUP), vec![1]);
}

#[test]
fn bad_message_does_not_block_the_next_one() {
    let broker = Arc::new(InMemoryBroker::new());
    let (listener, recorder) = TicketCreatedListener::new(Behavior::Ack);
    let handle = listener_on(&broker, listener).listen().unwrap();

    broker
        .publish("ticket:created", Payload::binary(b"{bad json".to_vec()))
        .unwrap();
    publish_ticket(&broker, "2", "Concert");

    assert!(handle.wait_for(SETTLE, |s| s.acked == 1 && s.decode_failures == 1));
    assert_eq!(recorder.titles(), vec!["Concert"]);
    assert_eq!(broker.pending("ticket:created", GROUP), vec![1]);
    handle.stop().unwrap();
}

/// Ticket data whose `Deserialize` impl panics on a `boom` field.
#[derive(Debug)]
struct Fragile {
    id: u64,
}

impl<'de> Deserialize<'de> for Fragile {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        if value.get("boom").is_some() {
            panic!("fragile decoder hit boom");
        }
        let id = value.get("ok").and_then(|v| v.as_u64()).unwrap_or_default();
        Ok(Fragile { id })
    }
}

struct FragileTicket;

impl Event for FragileTicket {
    const SUBJECT: Subject = Subject::TicketCreated;
    type Data = Fragile;
}

struct FragileListener {
    handled: Arc<Mutex<Vec<u64>>>,
}

impl Listener for FragileListener {
    type Event = FragileTicket;

    fn queue_group_name(&self) -> &str {
        GROUP
    }

    fn on_message(&self, data: Fragile, msg: &Message) -> Result<(), HandlerError> {
        self.handled.lock().unwrap().push(data.id);
        msg.ack()?;
        Ok(())
    }
}

#[test]
fn panicking_decoder_does_not_stop_the_listener() {
    init_tracing();
    let broker = Arc::new(InMemoryBroker::new());
    let handled = Arc::new(Mutex::new(Vec::new()));
    let listener = FragileListener {
        handled: Arc::clone(&handled),
    };
    let handle = DurableListener::new(Arc::clone(&broker), listener)
        .with_poll_interval(Duration::from_millis(5))
        .listen()
        .unwrap();

    broker
        .publish("ticket:created", Payload::text(r#"{"boom":1}"#))
        .unwrap();
    broker
        .publish("ticket:created", Payload::text(r#"{"ok":1}"#))
        .unwrap();

    assert!(handle.wait_for(SETTLE, |s| s.acked == 1 && s.decode_failures == 1));
    assert_eq!(handle.state(), SubscriptionState::Active);
    assert_eq!(*handled.lock().unwrap(), vec![1]);
    assert_eq!(broker.pending("ticket:created", GROUP), vec![1]);

    let stats = handle.stop().unwrap();
    assert_eq!(stats.received, 2);
    assert_eq!(stats.handled, 1);
}

#[test]
fn handler_error_is_retried_through_the_same_path() {
    let clock = ManualClock::new(0);
    let broker = Arc::new(InMemoryBroker::with_clock(clock.clone()));
    let (listener, recorder) = TicketCreatedListener::new(Behavior::FailTimes(1));
    let handle = listener_on(&broker, listener).listen().unwrap();

    publish_ticket(&broker, "42", "Concert");
    assert!(handle.wait_for(SETTLE, |s| s.handler_failures == 1));
    assert_eq!(broker.pending("ticket:created", GROUP), vec![1]);

    clock.advance(Duration::from_millis(5_000));
    assert!(handle.wait_for(SETTLE, |s| s.acked == 1));

    let attempts: Vec<u32> = recorder.seen().iter().map(|s| s.attempt).collect();
    assert_eq!(attempts, vec![1, 2]);
    assert!(broker.pending("ticket:created", GROUP).is_empty());
    handle.stop().unwrap();
}

#[test]
fn connection_loss_is_fatal_for_the_listener() {
    let broker = Arc::new(InMemoryBroker::new());
    let (listener, _recorder) = TicketCreatedListener::new(Behavior::Ack);
    let handle = listener_on(&broker, listener).listen().unwrap();

    broker.disconnect().unwrap();
    for _ in 0..2_000 {
        if handle.is_closed() {
            break;
        }
        thread::sleep(Duration::from_millis(1));
    }
    assert_eq!(handle.state(), SubscriptionState::Closed);

    assert!(matches!(
        handle.stop(),
        Err(ListenerError::Transport(TransportError::ConnectionLost))
    ));
}

#[test]
fn subscribing_while_disconnected_fails_fast() {
    let broker = Arc::new(InMemoryBroker::new());
    broker.disconnect().unwrap();

    let (listener, _recorder) = TicketCreatedListener::new(Behavior::Ack);
    assert!(matches!(
        listener_on(&broker, listener).listen(),
        Err(ListenerError::Transport(TransportError::ConnectionLost))
    ));
}

#[test]
fn empty_queue_group_never_subscribes() {
    let broker = Arc::new(InMemoryBroker::new());
    let (listener, _recorder) = TicketCreatedListener::in_group("", Behavior::Ack);

    assert!(matches!(
        listener_on(&broker, listener).listen(),
        Err(ListenerError::Configuration(_))
    ));
    assert_eq!(broker.members("ticket:created", ""), 0);
}
