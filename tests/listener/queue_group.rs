//! Queue group semantics across listener instances.

use std::collections::BTreeSet;
use std::sync::Arc;

use durable_listener::bus::InMemoryBroker;

use crate::support::{listener_on, publish_ticket, Behavior, TicketCreatedListener, SETTLE};

#[test]
fn replicas_in_one_group_share_the_work() {
    let broker = Arc::new(InMemoryBroker::new());
    let (first, first_seen) = TicketCreatedListener::new(Behavior::Ack);
    let (second, second_seen) = TicketCreatedListener::new(Behavior::Ack);
    let a = listener_on(&broker, first).listen().unwrap();
    let b = listener_on(&broker, second).listen().unwrap();
    assert_eq!(broker.members("ticket:created", "payments-service"), 2);

    for i in 0..20 {
        publish_ticket(&broker, &i.to_string(), "Concert");
    }

    assert!(a.wait_for(SETTLE, |_| {
        first_seen.seen().len() + second_seen.seen().len() == 20
    }));

    let mut sequences: Vec<u64> = first_seen
        .seen()
        .into_iter()
        .chain(second_seen.seen())
        .map(|s| s.sequence)
        .collect();
    sequences.sort_unstable();
    assert_eq!(sequences, (1..=20).collect::<Vec<u64>>());

    a.stop().unwrap();
    b.stop().unwrap();
}

#[test]
fn separate_groups_each_receive_every_message() {
    let broker = Arc::new(InMemoryBroker::new());
    let (payments, payments_seen) =
        TicketCreatedListener::in_group("payments-service", Behavior::Ack);
    let (orders, orders_seen) =
        TicketCreatedListener::in_group("orders-service", Behavior::Ack);
    let a = listener_on(&broker, payments).listen().unwrap();
    let b = listener_on(&broker, orders).listen().unwrap();

    publish_ticket(&broker, "1", "Opera");
    publish_ticket(&broker, "2", "Ballet");

    assert!(a.wait_for(SETTLE, |s| s.acked == 2));
    assert!(b.wait_for(SETTLE, |s| s.acked == 2));

    let payments: BTreeSet<String> = payments_seen.titles().into_iter().collect();
    let orders: BTreeSet<String> = orders_seen.titles().into_iter().collect();
    assert_eq!(payments, orders);

    a.stop().unwrap();
    b.stop().unwrap();
}
