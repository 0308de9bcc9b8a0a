//! Subscription lifecycle: subscribe, pull deliveries on a background thread,
//! dispatch, shut down.
//!
//! ```text
//! Unsubscribed ──listen()──▶ Subscribing ──subscribed──▶ Active ──stop / fault──▶ Closed
//!                                 │
//!                                 └──config or transport error──▶ Closed
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{error, info};

use super::config::{subscription_config, ListenerConfig};
use super::dispatch::{dispatch, panic_message, DispatchOutcome};
use super::handler::{subject_of, Listener};
use crate::bus::{Subscription, SubscriptionConfig, Transport, TransportError};
use crate::error::{ConfigError, ListenerError};
use crate::subject::Subject;

/// Where a listener is in its lifecycle. `Closed` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubscriptionState {
    Unsubscribed,
    Subscribing,
    Active,
    Closed,
}

impl SubscriptionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SubscriptionState::Unsubscribed,
            1 => SubscriptionState::Subscribing,
            2 => SubscriptionState::Active,
            _ => SubscriptionState::Closed,
        }
    }
}

impl fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SubscriptionState::Unsubscribed => "unsubscribed",
            SubscriptionState::Subscribing => "subscribing",
            SubscriptionState::Active => "active",
            SubscriptionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Lifecycle state shared between the handle and the delivery thread.
struct StateCell {
    state: AtomicU8,
    subject: Subject,
    queue_group: String,
}

impl StateCell {
    fn new(subject: Subject, queue_group: &str) -> Self {
        Self {
            state: AtomicU8::new(SubscriptionState::Unsubscribed as u8),
            subject,
            queue_group: queue_group.to_string(),
        }
    }

    fn get(&self) -> SubscriptionState {
        SubscriptionState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set(&self, next: SubscriptionState) {
        let prev = SubscriptionState::from_u8(self.state.swap(next as u8, Ordering::AcqRel));
        if prev != next {
            info!(
                subject = %self.subject,
                queue_group = %self.queue_group,
                from = %prev,
                to = %next,
                "listener state changed"
            );
        }
    }
}

/// Statistics from a listener's delivery thread.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ListenerStats {
    /// Deliveries pulled from the subscription.
    pub received: usize,
    /// Deliveries whose handler returned `Ok`.
    pub handled: usize,
    /// Of `handled`, those the handler acknowledged.
    pub acked: usize,
    /// Deliveries left unacked because the payload did not decode.
    pub decode_failures: usize,
    /// Deliveries left unacked because the handler failed or panicked.
    pub handler_failures: usize,
    /// Deliveries that arrived on a subject other than the listener's.
    pub misrouted: usize,
    /// Deliveries that were redeliveries of an earlier attempt.
    pub redeliveries: usize,
    /// Number of pull cycles completed.
    pub polls: usize,
}

#[derive(Default)]
struct Counters {
    received: AtomicUsize,
    handled: AtomicUsize,
    acked: AtomicUsize,
    decode_failures: AtomicUsize,
    handler_failures: AtomicUsize,
    misrouted: AtomicUsize,
    redeliveries: AtomicUsize,
    polls: AtomicUsize,
}

impl Counters {
    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn record(&self, outcome: &DispatchOutcome) {
        match outcome {
            DispatchOutcome::Handled { acked } => {
                Self::bump(&self.handled);
                if *acked {
                    Self::bump(&self.acked);
                }
            }
            DispatchOutcome::Misrouted { .. } => Self::bump(&self.misrouted),
            DispatchOutcome::DecodeFailed(_) => Self::bump(&self.decode_failures),
            DispatchOutcome::HandlerFailed(_) => Self::bump(&self.handler_failures),
        }
    }

    fn snapshot(&self) -> ListenerStats {
        ListenerStats {
            received: self.received.load(Ordering::Relaxed),
            handled: self.handled.load(Ordering::Relaxed),
            acked: self.acked.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            handler_failures: self.handler_failures.load(Ordering::Relaxed),
            misrouted: self.misrouted.load(Ordering::Relaxed),
            redeliveries: self.redeliveries.load(Ordering::Relaxed),
            polls: self.polls.load(Ordering::Relaxed),
        }
    }
}

/// How the delivery thread should leave the queue group.
#[derive(Clone, Copy, Debug)]
enum StopMode {
    /// Keep the durable cursor.
    Close,
    /// Drop the durable cursor if this is the last member.
    Unsubscribe,
}

/// A listener bound to a transport, ready to subscribe.
///
/// Holds a shared handle to the transport and exclusively owns the listener
/// implementation. `listen` consumes it: a closed listener is never reused,
/// a fresh instance starts a new cycle.
///
/// ## Example
///
/// ```ignore
/// use std::sync::Arc;
/// use durable_listener::{DurableListener, ListenerConfig};
/// use durable_listener::bus::InMemoryBroker;
///
/// let broker = Arc::new(InMemoryBroker::new());
/// let handle = DurableListener::new(broker.clone(), TicketCreatedListener::default())
///     .with_config(ListenerConfig::from_env()?)
///     .listen()?;
///
/// // ... deliveries are handled on a background thread ...
///
/// let stats = handle.stop()?;
/// ```
pub struct DurableListener<L, T> {
    listener: Arc<L>,
    transport: Arc<T>,
    config: ListenerConfig,
}

impl<L, T> DurableListener<L, T>
where
    L: Listener,
    T: Transport + 'static,
{
    /// Bind `listener` to a shared transport with the default configuration.
    pub fn new(transport: Arc<T>, listener: L) -> Self {
        Self {
            listener: Arc::new(listener),
            transport,
            config: ListenerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ListenerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_ack_wait(mut self, ack_wait: Duration) -> Self {
        self.config.ack_wait = ack_wait;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.config.poll_interval = poll_interval;
        self
    }

    /// Subject the listener's event is published on.
    pub fn subject(&self) -> Subject {
        subject_of::<L>()
    }

    pub fn listener(&self) -> &L {
        &self.listener
    }

    pub fn config(&self) -> &ListenerConfig {
        &self.config
    }

    /// The options this listener will subscribe with.
    pub fn subscription_config(&self) -> Result<SubscriptionConfig, ConfigError> {
        self.config.validate()?;
        subscription_config(self.listener.queue_group_name(), self.config.ack_wait)
    }

    /// Subscribe and start handling deliveries on a background thread.
    ///
    /// Fails fast on an invalid configuration (nothing is subscribed) or if
    /// the transport refuses the subscription. Either way the listener ends
    /// up `Closed`.
    pub fn listen(self) -> Result<ListenerHandle, ListenerError> {
        let subject = self.subject();
        let queue_group = self.listener.queue_group_name().to_string();
        let state = Arc::new(StateCell::new(subject, &queue_group));

        state.set(SubscriptionState::Subscribing);

        let config = match self.subscription_config() {
            Ok(config) => config,
            Err(err) => {
                error!(
                    subject = %subject,
                    queue_group = %queue_group,
                    error = %err,
                    "invalid listener configuration"
                );
                state.set(SubscriptionState::Closed);
                return Err(err.into());
            }
        };

        let subscription = match self
            .transport
            .subscribe(subject.as_str(), &queue_group, &config)
        {
            Ok(subscription) => subscription,
            Err(err) => {
                error!(
                    subject = %subject,
                    queue_group = %queue_group,
                    error = %err,
                    "subscribe failed"
                );
                state.set(SubscriptionState::Closed);
                return Err(err.into());
            }
        };

        state.set(SubscriptionState::Active);

        let counters = Arc::new(Counters::default());
        let (stop_tx, stop_rx) = channel();

        let handle = {
            let listener = Arc::clone(&self.listener);
            let state = Arc::clone(&state);
            let counters = Arc::clone(&counters);
            let poll_interval = self.config.poll_interval;

            thread::spawn(move || {
                run_loop(
                    listener.as_ref(),
                    subscription,
                    stop_rx,
                    poll_interval,
                    &state,
                    &counters,
                )
            })
        };

        Ok(ListenerHandle {
            subject,
            queue_group,
            config,
            state,
            counters,
            stop_tx,
            handle: Some(handle),
        })
    }
}

/// Marks the listener `Closed` when the delivery thread exits, including by
/// unwinding.
struct CloseOnExit<'a>(&'a StateCell);

impl Drop for CloseOnExit<'_> {
    fn drop(&mut self) {
        self.0.set(SubscriptionState::Closed);
    }
}

fn run_loop<L, S>(
    listener: &L,
    mut subscription: S,
    stop_rx: Receiver<StopMode>,
    poll_interval: Duration,
    state: &StateCell,
    counters: &Counters,
) -> Option<TransportError>
where
    L: Listener,
    S: Subscription,
{
    let _closed = CloseOnExit(state);
    let mut fault = None;

    let mode = loop {
        match stop_rx.try_recv() {
            Ok(mode) => break mode,
            Err(TryRecvError::Disconnected) => break StopMode::Close,
            Err(TryRecvError::Empty) => {}
        }

        Counters::bump(&counters.polls);

        match subscription.next(poll_interval) {
            Ok(Some(msg)) => {
                Counters::bump(&counters.received);
                if msg.redelivered() {
                    Counters::bump(&counters.redeliveries);
                }
                let outcome = dispatch(listener, &msg);
                counters.record(&outcome);
            }
            Ok(None) => {}
            Err(err) => {
                error!(
                    subject = %state.subject,
                    queue_group = %state.queue_group,
                    error = %err,
                    "transport failure; closing listener"
                );
                fault = Some(err);
                break StopMode::Close;
            }
        }
    };

    let left = match mode {
        StopMode::Close => subscription.close(),
        StopMode::Unsubscribe => subscription.unsubscribe(),
    };
    if let Err(err) = left {
        if fault.is_none() {
            error!(
                subject = %state.subject,
                queue_group = %state.queue_group,
                error = %err,
                "failed to leave queue group"
            );
            fault = Some(err);
        }
    }

    fault
}

/// Handle to a listener's delivery thread. Drop or call `stop()` to shut down.
///
/// Stopping never interrupts a handler that is already running: the thread
/// finishes the current delivery, leaves the queue group, and exits.
pub struct ListenerHandle {
    subject: Subject,
    queue_group: String,
    config: SubscriptionConfig,
    state: Arc<StateCell>,
    counters: Arc<Counters>,
    stop_tx: Sender<StopMode>,
    handle: Option<JoinHandle<Option<TransportError>>>,
}

impl ListenerHandle {
    pub fn subject(&self) -> Subject {
        self.subject
    }

    pub fn queue_group(&self) -> &str {
        &self.queue_group
    }

    /// The options the subscription was established with.
    pub fn config(&self) -> &SubscriptionConfig {
        &self.config
    }

    pub fn state(&self) -> SubscriptionState {
        self.state.get()
    }

    /// True once the delivery thread has exited, whether stopped or faulted.
    pub fn is_closed(&self) -> bool {
        self.state() == SubscriptionState::Closed
    }

    /// Live statistics.
    pub fn stats(&self) -> ListenerStats {
        self.counters.snapshot()
    }

    /// Block until `predicate` holds for the live stats or `timeout` elapses.
    /// Returns whether the predicate was satisfied.
    pub fn wait_for<F>(&self, timeout: Duration, predicate: F) -> bool
    where
        F: Fn(&ListenerStats) -> bool,
    {
        let deadline = Instant::now() + timeout;
        loop {
            if predicate(&self.stats()) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(1));
        }
    }

    /// Signal stop without waiting. The durable cursor is kept.
    pub fn signal_stop(&self) {
        let _ = self.stop_tx.send(StopMode::Close);
    }

    /// Stop, keep the durable cursor, and wait for the thread to finish.
    ///
    /// Returns the final stats, or the transport error that closed the
    /// listener earlier, or `Panicked` if the delivery thread unwound.
    pub fn stop(self) -> Result<ListenerStats, ListenerError> {
        self.finish(Some(StopMode::Close))
    }

    /// Stop and drop the durable cursor (if this was the last member), so a
    /// later listener in the same group starts over.
    pub fn unsubscribe(self) -> Result<ListenerStats, ListenerError> {
        self.finish(Some(StopMode::Unsubscribe))
    }

    /// Wait for the thread to exit on its own (after a transport failure).
    pub fn join(self) -> Result<ListenerStats, ListenerError> {
        self.finish(None)
    }

    fn finish(mut self, mode: Option<StopMode>) -> Result<ListenerStats, ListenerError> {
        if let Some(mode) = mode {
            let _ = self.stop_tx.send(mode);
        }

        let joined = match self.handle.take() {
            Some(handle) => handle.join(),
            None => Ok(None),
        };

        match joined {
            Ok(None) => Ok(self.counters.snapshot()),
            Ok(Some(err)) => Err(ListenerError::Transport(err)),
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                error!(
                    subject = %self.subject,
                    queue_group = %self.queue_group,
                    reason = %reason,
                    "delivery thread panicked"
                );
                Err(ListenerError::Panicked(reason))
            }
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(StopMode::Close);
    }
}

impl fmt::Debug for ListenerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerHandle")
            .field("subject", &self.subject)
            .field("queue_group", &self.queue_group)
            .field("state", &self.state())
            .finish()
    }
}
