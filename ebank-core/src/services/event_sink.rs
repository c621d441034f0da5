//! Event sink - the single linearization point for session state
//!
//! Two uncoordinated producers feed the sink: the session's own
//! request/response flow and the push receiver, which runs on whatever
//! thread the remote service delivers on. `append` serializes them under one
//! mutex. Inside the critical section the event is given its sequence
//! number, added to the history, the balance is updated, and only then is
//! the event handed to subscribers. Subscribers therefore observe the same
//! total order as the history and never see an event before the state that
//! corresponds to it.
//!
//! Subscribers are hand-off points (channel senders), never work. Anything
//! slow, such as file I/O or rendering, happens on the thread that drains the
//! channel, which is how a presentation layer pinned to its own thread
//! receives push-originated events.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Mutex, MutexGuard};

use crate::domain::result::{Error, Result};
use crate::domain::{AccountId, RecordedEvent, TransactionEvent};

/// Receives every event appended to a sink, in append order
pub trait EventSubscriber: Send {
    /// Subscriber name (for diagnostics)
    fn name(&self) -> &str;

    /// Hand the event off without blocking
    ///
    /// Returns false once the subscriber can no longer receive; it is then
    /// dropped from the sink.
    fn publish(&self, event: &RecordedEvent) -> bool;
}

/// Subscriber that forwards events into an mpsc channel
///
/// `T` lets a consumer fold events into its own message type, e.g. a UI loop
/// that also receives user input on the same channel.
pub struct ChannelSubscriber<T> {
    name: String,
    tx: Sender<T>,
}

impl<T> ChannelSubscriber<T> {
    pub fn new(name: impl Into<String>, tx: Sender<T>) -> Self {
        Self {
            name: name.into(),
            tx,
        }
    }
}

impl<T> EventSubscriber for ChannelSubscriber<T>
where
    T: From<RecordedEvent> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn publish(&self, event: &RecordedEvent) -> bool {
        self.tx.send(T::from(event.clone())).is_ok()
    }
}

struct SinkState {
    history: Vec<RecordedEvent>,
    current_balance: Option<i64>,
    closed: bool,
    subscribers: Vec<Box<dyn EventSubscriber>>,
}

/// Ordered, append-only event history with the authoritative balance view
pub struct EventSink {
    state: Mutex<SinkState>,
}

impl Default for EventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SinkState {
                history: Vec::new(),
                current_balance: None,
                closed: false,
                subscribers: Vec::new(),
            }),
        }
    }

    // Poisoning is recovered: history and balance are updated together
    fn lock(&self) -> MutexGuard<'_, SinkState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append an event; callable from any thread
    ///
    /// Concurrent calls are applied one at a time in the order the lock is
    /// granted, not by `occurred_at`.
    ///
    /// An `Error` event never moves the balance. Once a balance is known it
    /// is stamped with that balance, whatever the caller passed, so a push
    /// landing between the caller's read and this append is not undone.
    /// Before that, the caller's placeholder is kept and the balance stays
    /// unknown.
    pub fn append(
        &self,
        account_id: Option<&AccountId>,
        mut event: TransactionEvent,
    ) -> Result<RecordedEvent> {
        let mut state = self.lock();
        if state.closed {
            return Err(Error::SessionClosed);
        }

        if event.is_error() {
            if let Some(balance) = state.current_balance {
                event.balance_after = balance;
            }
        } else {
            state.current_balance = Some(event.balance_after);
        }

        let recorded = RecordedEvent {
            sequence: state.history.len() as u64 + 1,
            account_id: account_id.cloned(),
            event,
        };
        state.history.push(recorded.clone());

        state.subscribers.retain(|s| s.publish(&recorded));

        Ok(recorded)
    }

    /// Register a subscriber and return the history it has not seen
    ///
    /// Registration and the snapshot happen under the same lock, so the
    /// subscriber receives every later event exactly once. A closed sink
    /// returns the history and drops the subscriber.
    pub fn subscribe(&self, subscriber: Box<dyn EventSubscriber>) -> Vec<RecordedEvent> {
        let mut state = self.lock();
        let backlog = state.history.clone();
        if !state.closed {
            state.subscribers.push(subscriber);
        }
        backlog
    }

    /// Subscribe through a fresh channel
    pub fn subscribe_channel(
        &self,
        name: impl Into<String>,
    ) -> (Vec<RecordedEvent>, Receiver<RecordedEvent>) {
        let (tx, rx) = mpsc::channel();
        let backlog = self.subscribe(Box::new(ChannelSubscriber::new(name, tx)));
        (backlog, rx)
    }

    /// Make the sink terminal
    ///
    /// Later appends fail with `SessionClosed`. History stays readable.
    /// Subscribers are released so their channels disconnect once drained.
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        state.subscribers.clear();
    }

    /// Balance after the last non-error event; `None` until one is appended
    pub fn current_balance(&self) -> Option<i64> {
        self.lock().current_balance
    }

    /// Snapshot of the history in append order
    pub fn history(&self) -> Vec<RecordedEvent> {
        self.lock().history.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn last(&self) -> Option<RecordedEvent> {
        self.lock().history.last().cloned()
    }
}
