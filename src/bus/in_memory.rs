//! In-memory broker for testing and single-process scenarios.
//!
//! This module provides a thread-safe broker that implements both
//! `Publisher` and `Subscriber` with the delivery guarantees the listener
//! layer relies on:
//! - Append-only channel per subject, sequences starting at 1
//! - Queue groups: members share one cursor, each message goes to one member
//! - Durable cursors that survive all members closing
//! - Manual ack with ack-wait redelivery, or auto-ack on delivery
//! - Replay from the start of the channel or from the next message
//! - Simulated connection loss and snapshot/restore of durable state

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::clock::{Clock, SystemClock};
use super::error::{Result, TransportError};
use super::message::{Acker, Delivery, Message};
use super::options::SubscriptionConfig;
use super::payload::Payload;
use super::transport::{Publisher, Subscriber, Subscription};

#[derive(Clone, Debug, Serialize, Deserialize)]
struct StoredMessage {
    sequence: u64,
    payload: Payload,
    timestamp_ms: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Pending {
    attempt: u32,
    deadline_ms: u64,
}

/// Cursor shared by every member of a queue group on one subject.
#[derive(Clone, Debug)]
struct GroupState {
    durable_name: Option<String>,
    manual_ack: bool,
    ack_wait_ms: u64,
    /// Next sequence never handed out to this group.
    next_sequence: u64,
    /// Delivered but not yet acknowledged.
    pending: BTreeMap<u64, Pending>,
    members: usize,
}

type GroupKey = (String, String);

#[derive(Default)]
struct BrokerState {
    connected: bool,
    channels: HashMap<String, Vec<StoredMessage>>,
    groups: HashMap<GroupKey, GroupState>,
}

impl BrokerState {
    fn ensure_connected(&self) -> Result<()> {
        if self.connected {
            Ok(())
        } else {
            Err(TransportError::ConnectionLost)
        }
    }
}

#[derive(Serialize, Deserialize)]
struct DurableSnapshot {
    subject: String,
    queue_group: String,
    durable_name: String,
    manual_ack: bool,
    ack_wait_ms: u64,
    next_sequence: u64,
    pending: Vec<(u64, u32)>,
}

#[derive(Serialize, Deserialize)]
struct BrokerSnapshot {
    channels: BTreeMap<String, Vec<StoredMessage>>,
    durables: Vec<DurableSnapshot>,
}

/// In-memory broker for testing and single-process scenarios.
///
/// Cloning yields another handle to the same broker.
///
/// ## Example
///
/// ```
/// use std::time::Duration;
/// use durable_listener::bus::{
///     InMemoryBroker, Payload, Publisher, Subscriber, Subscription, SubscriptionConfig,
/// };
///
/// let broker = InMemoryBroker::new();
/// broker.publish("ticket:created", Payload::text(r#"{"id":"1"}"#)).unwrap();
///
/// let config = SubscriptionConfig::new()
///     .set_deliver_all_available()
///     .set_manual_ack_mode(true)
///     .set_durable_name("payments-service");
/// let mut sub = broker.subscribe("ticket:created", "payments-service", &config).unwrap();
///
/// let msg = sub.next(Duration::from_millis(50)).unwrap().unwrap();
/// assert_eq!(msg.sequence(), 1);
/// msg.ack().unwrap();
/// assert!(broker.pending("ticket:created", "payments-service").is_empty());
/// ```
#[derive(Clone)]
pub struct InMemoryBroker {
    state: Arc<Mutex<BrokerState>>,
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBroker {
    /// Create a connected broker driven by the system clock.
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }

    /// Create a connected broker driven by the given clock.
    pub fn with_clock(clock: impl Clock + 'static) -> Self {
        Self {
            state: Arc::new(Mutex::new(BrokerState {
                connected: true,
                ..BrokerState::default()
            })),
            clock: Arc::new(clock),
        }
    }

    fn lock(&self, operation: &'static str) -> Result<MutexGuard<'_, BrokerState>> {
        self.state
            .lock()
            .map_err(|_| TransportError::LockPoisoned(operation))
    }

    /// Drop the connection. Every operation fails with `ConnectionLost`
    /// until [`reconnect`](Self::reconnect) is called.
    pub fn disconnect(&self) -> Result<()> {
        self.lock("disconnect")?.connected = false;
        info!("in-memory broker disconnected");
        Ok(())
    }

    pub fn reconnect(&self) -> Result<()> {
        self.lock("reconnect")?.connected = true;
        info!("in-memory broker reconnected");
        Ok(())
    }

    /// All payloads published on a subject, in sequence order.
    pub fn messages(&self, subject: &str) -> Result<Vec<Payload>> {
        let state = self.lock("messages")?;
        Ok(state
            .channels
            .get(subject)
            .map(|msgs| msgs.iter().map(|m| m.payload.clone()).collect())
            .unwrap_or_default())
    }

    /// Number of messages published on a subject.
    pub fn len(&self, subject: &str) -> usize {
        self.lock("len")
            .map(|state| state.channels.get(subject).map_or(0, Vec::len))
            .unwrap_or(0)
    }

    /// Sequences delivered to a group but not yet acknowledged.
    pub fn pending(&self, subject: &str, queue_group: &str) -> Vec<u64> {
        self.lock("pending")
            .ok()
            .and_then(|state| {
                state
                    .groups
                    .get(&group_key(subject, queue_group))
                    .map(|group| group.pending.keys().copied().collect())
            })
            .unwrap_or_default()
    }

    /// Whether the broker holds a cursor for this group.
    pub fn has_group(&self, subject: &str, queue_group: &str) -> bool {
        self.lock("has_group")
            .map(|state| state.groups.contains_key(&group_key(subject, queue_group)))
            .unwrap_or(false)
    }

    /// Number of open subscriptions in a group.
    pub fn members(&self, subject: &str, queue_group: &str) -> usize {
        self.lock("members")
            .ok()
            .and_then(|state| {
                state
                    .groups
                    .get(&group_key(subject, queue_group))
                    .map(|group| group.members)
            })
            .unwrap_or(0)
    }

    /// Serialize channels and durable cursors.
    ///
    /// Non-durable groups and open memberships are not part of the snapshot.
    pub fn snapshot(&self) -> Result<Vec<u8>> {
        let state = self.lock("snapshot")?;

        let channels = state
            .channels
            .iter()
            .map(|(subject, msgs)| (subject.clone(), msgs.clone()))
            .collect();

        let durables = state
            .groups
            .iter()
            .filter_map(|((subject, queue_group), group)| {
                group.durable_name.as_ref().map(|durable_name| DurableSnapshot {
                    subject: subject.clone(),
                    queue_group: queue_group.clone(),
                    durable_name: durable_name.clone(),
                    manual_ack: group.manual_ack,
                    ack_wait_ms: group.ack_wait_ms,
                    next_sequence: group.next_sequence,
                    pending: group
                        .pending
                        .iter()
                        .map(|(seq, p)| (*seq, p.attempt))
                        .collect(),
                })
            })
            .collect();

        Ok(bitcode::serialize(&BrokerSnapshot { channels, durables })?)
    }

    /// Rebuild a broker from a [`snapshot`](Self::snapshot).
    ///
    /// Deliveries that were pending at snapshot time are immediately
    /// eligible for redelivery.
    pub fn restore(bytes: &[u8], clock: impl Clock + 'static) -> Result<Self> {
        let snapshot: BrokerSnapshot = bitcode::deserialize(bytes)?;
        let broker = Self::with_clock(clock);

        {
            let mut state = broker.lock("restore")?;
            state.channels = snapshot.channels.into_iter().collect();
            for durable in snapshot.durables {
                let pending = durable
                    .pending
                    .into_iter()
                    .map(|(seq, attempt)| (seq, Pending { attempt, deadline_ms: 0 }))
                    .collect();
                state.groups.insert(
                    (durable.subject, durable.queue_group),
                    GroupState {
                        durable_name: Some(durable.durable_name),
                        manual_ack: durable.manual_ack,
                        ack_wait_ms: durable.ack_wait_ms,
                        next_sequence: durable.next_sequence,
                        pending,
                        members: 0,
                    },
                );
            }
            info!(
                channels = state.channels.len(),
                durables = state.groups.len(),
                "in-memory broker restored from snapshot"
            );
        }

        Ok(broker)
    }

    /// Hand out the next delivery for a group, if any is due.
    fn take_delivery(&self, subject: &str, queue_group: &str) -> Result<Option<Message>> {
        let now = self.clock.now_ms();
        let mut state = self.lock("next")?;
        state.ensure_connected()?;

        let BrokerState {
            channels, groups, ..
        } = &mut *state;

        let group = groups
            .get_mut(&group_key(subject, queue_group))
            .ok_or_else(|| TransportError::SubscriptionClosed {
                subject: subject.to_string(),
                queue_group: queue_group.to_string(),
            })?;
        let channel = channels.get(subject).map(Vec::as_slice).unwrap_or(&[]);

        let ack_wait_ms = group.ack_wait_ms;
        let redelivery = group
            .pending
            .iter_mut()
            .find(|(_, p)| p.deadline_ms <= now)
            .map(|(seq, p)| {
                p.attempt += 1;
                p.deadline_ms = now + ack_wait_ms;
                (*seq, p.attempt)
            });

        let (sequence, attempt) = match redelivery {
            Some((sequence, attempt)) => {
                debug!(subject, queue_group, sequence, attempt, "redelivering");
                (sequence, attempt)
            }
            None => {
                let sequence = group.next_sequence;
                if sequence > channel.len() as u64 {
                    return Ok(None);
                }
                group.next_sequence += 1;
                if group.manual_ack {
                    group.pending.insert(
                        sequence,
                        Pending {
                            attempt: 1,
                            deadline_ms: now + ack_wait_ms,
                        },
                    );
                }
                (sequence, 1)
            }
        };

        let Some(stored) = channel.get((sequence - 1) as usize) else {
            return Ok(None);
        };

        let acker = Arc::new(BrokerAcker {
            broker: self.clone(),
        });
        Ok(Some(
            Message::new(subject, queue_group, stored.sequence, stored.payload.clone(), acker)
                .with_attempt(attempt)
                .with_timestamp(stored.timestamp_ms),
        ))
    }

    fn leave(&self, subject: &str, queue_group: &str, drop_durable: bool) -> Result<()> {
        let mut state = self.lock("leave")?;
        let key = group_key(subject, queue_group);

        let remove = match state.groups.get_mut(&key) {
            Some(group) => {
                group.members = group.members.saturating_sub(1);
                group.members == 0 && (drop_durable || group.durable_name.is_none())
            }
            None => false,
        };

        if remove {
            state.groups.remove(&key);
            debug!(subject, queue_group, "group cursor removed");
        }
        Ok(())
    }
}

fn group_key(subject: &str, queue_group: &str) -> GroupKey {
    (subject.to_string(), queue_group.to_string())
}

impl Publisher for InMemoryBroker {
    fn publish(&self, subject: &str, payload: Payload) -> Result<u64> {
        let timestamp_ms = self.clock.now_ms();
        let mut state = self.lock("publish")?;
        state.ensure_connected()?;

        let channel = state.channels.entry(subject.to_string()).or_default();
        let sequence = channel.len() as u64 + 1;
        channel.push(StoredMessage {
            sequence,
            payload,
            timestamp_ms,
        });
        Ok(sequence)
    }
}

impl Subscriber for InMemoryBroker {
    type Subscription = InMemorySubscription;

    fn subscribe(
        &self,
        subject: &str,
        queue_group: &str,
        config: &SubscriptionConfig,
    ) -> Result<InMemorySubscription> {
        let mut state = self.lock("subscribe")?;
        state.ensure_connected()?;

        let head = state.channels.get(subject).map_or(0, Vec::len) as u64;
        let key = group_key(subject, queue_group);

        match state.groups.get_mut(&key) {
            Some(group) => {
                if group.durable_name != config.durable_name {
                    return Err(TransportError::Rejected(format!(
                        "queue group '{}' on '{}' is bound to durable {:?}, not {:?}",
                        queue_group, subject, group.durable_name, config.durable_name
                    )));
                }
                group.members += 1;
                debug!(subject, queue_group, members = group.members, "joined existing group");
            }
            None => {
                let next_sequence = if config.replay_all_history { 1 } else { head + 1 };
                state.groups.insert(
                    key,
                    GroupState {
                        durable_name: config.durable_name.clone(),
                        manual_ack: config.manual_ack,
                        ack_wait_ms: config.ack_wait.as_millis() as u64,
                        next_sequence,
                        pending: BTreeMap::new(),
                        members: 1,
                    },
                );
                debug!(subject, queue_group, next_sequence, "created group cursor");
            }
        }

        Ok(InMemorySubscription {
            broker: self.clone(),
            subject: subject.to_string(),
            queue_group: queue_group.to_string(),
            closed: false,
        })
    }
}

/// Acknowledges deliveries against the broker's group cursor.
struct BrokerAcker {
    broker: InMemoryBroker,
}

impl Acker for BrokerAcker {
    fn ack(&self, delivery: &Delivery) -> Result<()> {
        let mut state = self.broker.lock("ack")?;
        state.ensure_connected()?;

        let group = state
            .groups
            .get_mut(&group_key(&delivery.subject, &delivery.queue_group))
            .ok_or_else(|| TransportError::SubscriptionClosed {
                subject: delivery.subject.clone(),
                queue_group: delivery.queue_group.clone(),
            })?;
        group.pending.remove(&delivery.sequence);
        Ok(())
    }
}

/// A membership in an [`InMemoryBroker`] queue group.
pub struct InMemorySubscription {
    broker: InMemoryBroker,
    subject: String,
    queue_group: String,
    closed: bool,
}

impl InMemorySubscription {
    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(TransportError::SubscriptionClosed {
                subject: self.subject.clone(),
                queue_group: self.queue_group.clone(),
            })
        } else {
            Ok(())
        }
    }
}

impl Subscription for InMemorySubscription {
    fn next(&mut self, timeout: Duration) -> Result<Option<Message>> {
        self.ensure_open()?;
        let deadline = Instant::now() + timeout;

        loop {
            if let Some(msg) = self.broker.take_delivery(&self.subject, &self.queue_group)? {
                return Ok(Some(msg));
            }

            if Instant::now() >= deadline {
                return Ok(None);
            }

            // Small sleep to avoid busy-waiting
            thread::sleep(Duration::from_millis(1));
        }
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.broker.leave(&self.subject, &self.queue_group, false)
    }

    fn unsubscribe(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.broker.leave(&self.subject, &self.queue_group, true)
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for InMemorySubscription {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
