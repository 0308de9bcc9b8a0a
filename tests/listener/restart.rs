//! Durable cursors across listener and broker restarts.

use std::sync::Arc;
use std::time::Duration;

use durable_listener::bus::{InMemoryBroker, ManualClock, SystemClock};

use crate::support::{
    listener_on, publish_ticket, Behavior, TicketCreatedListener, GROUP, SETTLE,
};

#[test]
fn restarted_listener_resumes_from_durable_cursor() {
    let broker = Arc::new(InMemoryBroker::new());
    publish_ticket(&broker, "1", "Opera");
    publish_ticket(&broker, "2", "Ballet");

    let (listener, first_run) = TicketCreatedListener::new(Behavior::Ack);
    let handle = listener_on(&broker, listener).listen().unwrap();
    assert!(handle.wait_for(SETTLE, |s| s.acked == 2));
    handle.stop().unwrap();
    assert_eq!(first_run.titles(), vec!["Opera", "Ballet"]);

    publish_ticket(&broker, "3", "Circus");

    let (listener, second_run) = TicketCreatedListener::new(Behavior::Ack);
    let handle = listener_on(&broker, listener).listen().unwrap();
    assert!(handle.wait_for(SETTLE, |s| s.acked == 1));
    let stats = handle.stop().unwrap();

    assert_eq!(second_run.titles(), vec!["Circus"]);
    assert_eq!(stats.received, 1);
}

#[test]
fn unacked_work_from_previous_run_is_redelivered() {
    let clock = ManualClock::new(0);
    let broker = Arc::new(InMemoryBroker::with_clock(clock.clone()));
    publish_ticket(&broker, "1", "Opera");

    let (listener, _) = TicketCreatedListener::new(Behavior::Ignore);
    let handle = listener_on(&broker, listener).listen().unwrap();
    assert!(handle.wait_for(SETTLE, |s| s.handled == 1));
    handle.stop().unwrap();

    let (listener, second_run) = TicketCreatedListener::new(Behavior::Ack);
    let handle = listener_on(&broker, listener).listen().unwrap();
    clock.advance(Duration::from_millis(5_000));
    assert!(handle.wait_for(SETTLE, |s| s.acked == 1));
    handle.stop().unwrap();

    let seen = second_run.seen();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].sequence, 1);
    assert_eq!(seen[0].attempt, 2);
}

#[test]
fn unsubscribe_discards_the_cursor() {
    let broker = Arc::new(InMemoryBroker::new());
    publish_ticket(&broker, "1", "Opera");

    let (listener, _) = TicketCreatedListener::new(Behavior::Ack);
    let handle = listener_on(&broker, listener).listen().unwrap();
    assert!(handle.wait_for(SETTLE, |s| s.acked == 1));
    handle.unsubscribe().unwrap();
    assert!(!broker.has_group("ticket:created", GROUP));

    let (listener, second_run) = TicketCreatedListener::new(Behavior::Ack);
    let handle = listener_on(&broker, listener).listen().unwrap();
    assert!(handle.wait_for(SETTLE, |s| s.acked == 1));
    handle.stop().unwrap();
    assert_eq!(second_run.titles(), vec!["Opera"]);
}

#[test]
fn broker_restart_keeps_group_progress() {
    let broker = Arc::new(InMemoryBroker::new());
    publish_ticket(&broker, "1", "Opera");
    publish_ticket(&broker, "2", "Ballet");

    let (listener, _) = TicketCreatedListener::new(Behavior::Ack);
    let handle = listener_on(&broker, listener).listen().unwrap();
    assert!(handle.wait_for(SETTLE, |s| s.acked == 2));
    handle.stop().unwrap();

    let snapshot = broker.snapshot().unwrap();
    let restarted = Arc::new(InMemoryBroker::restore(&snapshot, SystemClock).unwrap());
    publish_ticket(&restarted, "3", "Circus");

    let (listener, after_restart) = TicketCreatedListener::new(Behavior::Ack);
    let handle = listener_on(&restarted, listener).listen().unwrap();
    assert!(handle.wait_for(SETTLE, |s| s.acked == 1));
    handle.stop().unwrap();

    assert_eq!(after_restart.titles(), vec!["Circus"]);
}
