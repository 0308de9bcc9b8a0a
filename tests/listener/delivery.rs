//! Happy path: decode, handle, ack.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use durable_listener::bus::{InMemoryBroker, ManualClock, Payload, Publisher};
use durable_listener::SubscriptionState;

use crate::support::{
    init_tracing, listener_on, publish_ticket, ticket, Behavior, Seen, TicketCreatedListener,
    GROUP, SETTLE,
};

#[test]
fn ticket_created_is_handled_once_and_not_redelivered() {
    init_tracing();
    let clock = ManualClock::new(0);
    let broker = Arc::new(InMemoryBroker::with_clock(clock.clone()));
    let (listener, recorder) = TicketCreatedListener::new(Behavior::Ack);
    let handle = listener_on(&broker, listener).listen().unwrap();
    assert_eq!(handle.state(), SubscriptionState::Active);

    broker
        .publish(
            "ticket:created",
            Payload::binary(r#"{"id":"42","title":"Concert"}"#.as_bytes().to_vec()),
        )
        .unwrap();

    assert!(handle.wait_for(SETTLE, |s| s.acked == 1));
    assert_eq!(
        recorder.seen(),
        vec![Seen {
            data: ticket("42", "Concert"),
            sequence: 1,
            attempt: 1,
        }]
    );

    clock.advance(Duration::from_millis(10_000));
    thread::sleep(Duration::from_millis(50));

    assert_eq!(recorder.seen().len(), 1);
    assert!(broker.pending("ticket:created", GROUP).is_empty());

    let stats = handle.stop().unwrap();
    assert_eq!(stats.received, 1);
    assert_eq!(stats.handled, 1);
    assert_eq!(stats.redeliveries, 0);
}

#[test]
fn text_and_binary_payloads_decode_alike() {
    let broker = Arc::new(InMemoryBroker::new());
    let (listener, recorder) = TicketCreatedListener::new(Behavior::Ack);
    let handle = listener_on(&broker, listener).listen().unwrap();

    broker
        .publish("ticket:created", Payload::text(r#"{"id":"1","title":"Opera"}"#))
        .unwrap();
    broker
        .publish(
            "ticket:created",
            Payload::binary(r#"{"id":"2","title":"Ballet"}"#.as_bytes().to_vec()),
        )
        .unwrap();

    assert!(handle.wait_for(SETTLE, |s| s.acked == 2));
    assert_eq!(recorder.titles(), vec!["Opera", "Ballet"]);
    handle.stop().unwrap();
}

#[test]
fn history_published_before_listening_is_replayed() {
    let broker = Arc::new(InMemoryBroker::new());
    publish_ticket(&broker, "1", "First");
    publish_ticket(&broker, "2", "Second");
    publish_ticket(&broker, "3", "Third");

    let (listener, recorder) = TicketCreatedListener::new(Behavior::Ack);
    let handle = listener_on(&broker, listener).listen().unwrap();

    assert!(handle.wait_for(SETTLE, |s| s.acked == 3));
    assert_eq!(recorder.titles(), vec!["First", "Second", "Third"]);
    handle.stop().unwrap();
}

#[test]
fn other_subjects_are_not_delivered() {
    let broker = Arc::new(InMemoryBroker::new());
    let (listener, recorder) = TicketCreatedListener::new(Behavior::Ack);
    let handle = listener_on(&broker, listener).listen().unwrap();

    broker
        .publish("order:created", Payload::text(r#"{"id":"9","title":"Nope"}"#))
        .unwrap();
    publish_ticket(&broker, "1", "Yes");

    assert!(handle.wait_for(SETTLE, |s| s.acked == 1));
    thread::sleep(Duration::from_millis(30));
    assert_eq!(recorder.titles(), vec!["Yes"]);

    let stats = handle.stop().unwrap();
    assert_eq!(stats.misrouted, 0);
}
