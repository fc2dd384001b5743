#![forbid(unsafe_code)]

//! Ordered multicast dispatch.
//!
//! A [`Signal<V>`] delivers every value passed to [`Signal::send`] to the
//! sinks registered with [`Signal::connect`]. Senders may live on any thread
//! and may call back into the same signal from inside a sink.
//!
//! # Delivery rules
//!
//! 1. Only values explicitly sent are delivered.
//! 2. All values sent to one signal form a single total order.
//! 3. A ripe sink receives exactly the suffix of that order that starts at
//!    the value being delivered when it ripened: no reordering, no
//!    duplicates, no drops.
//! 4. A sink connected while a send is in flight starts at the first value
//!    whose delivery begins after the connect call.
//! 5. Disconnection takes effect before the disconnecting call returns.
//! 6. Values queued by one [`Signal::send_all`] call are adjacent in the
//!    order; a connect cannot fall between them.
//!
//! # Design
//!
//! One mutex guards the sink registry, the pending queue, and the `sending`
//! flag. It is held only for bookkeeping, never while a sink runs.
//!
//! At most one caller is the *active sender*. A caller that finds `sending`
//! already set appends its value and returns; the active sender drains the
//! queue, including that value, before its own `send` returns. Reentrant
//! sends from inside a sink are therefore deferred, but ordered.
//!
//! Connecting mid-send registers the sink as unripe and appends a ripen
//! marker behind every value already queued. Markers and values share the
//! one FIFO queue, so ripening can never overtake a value.
//!
//! # Lifecycle hooks
//!
//! [`SignalHooks`] observe the registry's empty→non-empty and
//! non-empty→empty transitions. Hooks run outside the state lock but under a
//! separate lifecycle lock, so `first_connected` and `last_disconnected`
//! strictly alternate. A hook must not connect to or disconnect from the
//! signal that invoked it.
//!
//! # Failure Modes
//!
//! - **Sink panics**: the unwind guard clears `sending`, so the signal stays
//!   usable. Values still queued are delivered by the next `send`.
//! - **Hooks dropped**: hooks are held weakly; a dead hook target is skipped.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Weak};

use ahash::AHashMap;
use parking_lot::Mutex;
use smallvec::SmallVec;
use tracing::trace;

use crate::connection::{Connection, ConnectionId, Disconnect};

/// A destination for delivered values.
pub type Sink<V> = Arc<dyn Fn(&V) + Send + Sync>;

/// Registry transition callbacks, used by lazily activated observers.
pub trait SignalHooks: Send + Sync {
    /// The first sink was connected.
    fn first_connected(&self);
    /// The last sink was disconnected.
    fn last_disconnected(&self);
}

/// One entry of the pending queue.
enum Pending<V> {
    Deliver(V),
    Ripen(ConnectionId),
}

struct SinkEntry<V> {
    sink: Sink<V>,
    ripe: bool,
}

struct State<V> {
    sinks: AHashMap<ConnectionId, SinkEntry<V>>,
    pending: VecDeque<Pending<V>>,
    sending: bool,
}

struct Shared<V> {
    state: Mutex<State<V>>,
    /// Serializes registry transitions with their hooks.
    lifecycle: Mutex<()>,
    hooks: Option<Weak<dyn SignalHooks>>,
}

impl<V> Shared<V> {
    fn hooks(&self) -> Option<Arc<dyn SignalHooks>> {
        self.hooks.as_ref().and_then(Weak::upgrade)
    }
}

impl<V: Send + 'static> Disconnect for Shared<V> {
    fn disconnect(&self, id: ConnectionId) {
        let _lifecycle = self.lifecycle.lock();
        let (removed, now_empty) = {
            let mut state = self.state.lock();
            let removed = state.sinks.remove(&id).is_some();
            (removed, state.sinks.is_empty())
        };
        if !removed {
            return;
        }
        trace!(connection = id.raw(), "signal.disconnect");
        if now_empty && let Some(hooks) = self.hooks() {
            hooks.last_disconnected();
        }
    }
}

/// Clears `sending` if a sink unwinds out of the drain loop.
struct SendingGuard<'a, V> {
    shared: &'a Shared<V>,
    armed: bool,
}

impl<V> Drop for SendingGuard<'_, V> {
    fn drop(&mut self) {
        if self.armed {
            self.shared.state.lock().sending = false;
        }
    }
}

/// A thread-safe multicast event hub with strict per-sink ordering.
///
/// Cloning a `Signal` creates a new handle to the **same** registry.
pub struct Signal<V> {
    shared: Arc<Shared<V>>,
}

impl<V> Clone for Signal<V> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<V: Send + 'static> Default for Signal<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> fmt::Debug for Signal<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("Signal")
            .field("sinks", &state.sinks.len())
            .field("pending", &state.pending.len())
            .field("sending", &state.sending)
            .finish()
    }
}

impl<V: Send + 'static> Signal<V> {
    /// Create a signal without lifecycle hooks.
    #[must_use]
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Create a signal that reports registry transitions to `hooks`.
    #[must_use]
    pub fn with_hooks(hooks: Weak<dyn SignalHooks>) -> Self {
        Self::build(Some(hooks))
    }

    fn build(hooks: Option<Weak<dyn SignalHooks>>) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    sinks: AHashMap::new(),
                    pending: VecDeque::new(),
                    sending: false,
                }),
                lifecycle: Mutex::new(()),
                hooks,
            }),
        }
    }

    /// Register `sink` and return its disconnect handle.
    ///
    /// If a send is in flight, the sink only sees values sent after this
    /// call.
    pub fn connect(&self, sink: Sink<V>) -> Connection {
        let id = ConnectionId::next();
        let _lifecycle = self.shared.lifecycle.lock();
        let (ripe, first) = {
            let mut state = self.shared.state.lock();
            let ripe = !state.sending;
            if !ripe {
                state.pending.push_back(Pending::Ripen(id));
            }
            state.sinks.insert(id, SinkEntry { sink, ripe });
            (ripe, state.sinks.len() == 1)
        };
        trace!(connection = id.raw(), deferred = !ripe, "signal.connect");
        if first && let Some(hooks) = self.shared.hooks() {
            hooks.first_connected();
        }
        Connection::new(id, Arc::downgrade(&self.shared) as Weak<dyn Disconnect>)
    }

    /// Register a closure as a sink.
    pub fn connect_fn(&self, sink: impl Fn(&V) + Send + Sync + 'static) -> Connection {
        self.connect(Arc::new(sink))
    }

    /// Send `value` to every ripe sink.
    ///
    /// If another caller is already delivering, the value is queued behind
    /// everything sent before it and this call returns immediately.
    pub fn send(&self, value: V) {
        self.send_all(std::iter::once(value));
    }

    /// Queue `values` back to back, then deliver them as [`send`](Self::send)
    /// does.
    ///
    /// A sink connected while one of them is being delivered sees none of
    /// them, so a source that changes its state and then sends the whole
    /// transaction this way never shows a late subscriber half of it.
    pub fn send_all(&self, values: impl IntoIterator<Item = V>) {
        {
            let mut state = self.shared.state.lock();
            let queued = state.pending.len();
            state.pending.extend(values.into_iter().map(Pending::Deliver));
            if state.sending || state.pending.len() == queued {
                return;
            }
            state.sending = true;
        }
        self.drain();
    }

    /// Number of registered sinks, ripe or not.
    #[must_use]
    pub fn sink_count(&self) -> usize {
        self.shared.state.lock().sinks.len()
    }

    /// Whether at least one sink is registered.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.sink_count() > 0
    }

    /// Whether a send is currently in flight.
    #[must_use]
    pub fn is_sending(&self) -> bool {
        self.shared.state.lock().sending
    }

    fn drain(&self) {
        let mut guard = SendingGuard {
            shared: &self.shared,
            armed: true,
        };
        loop {
            let (value, targets) = {
                let mut state = self.shared.state.lock();
                debug_assert!(state.sending, "drain loop running outside sending state");
                let Some(value) = Self::pop_value(&mut state) else {
                    state.sending = false;
                    guard.armed = false;
                    return;
                };
                let targets: SmallVec<[ConnectionId; 8]> = state
                    .sinks
                    .iter()
                    .filter(|(_, entry)| entry.ripe)
                    .map(|(id, _)| *id)
                    .collect();
                (value, targets)
            };
            for id in targets {
                // A sink earlier in this round may have disconnected this one.
                let sink = {
                    let state = self.shared.state.lock();
                    state
                        .sinks
                        .get(&id)
                        .filter(|entry| entry.ripe)
                        .map(|entry| Arc::clone(&entry.sink))
                };
                if let Some(sink) = sink {
                    sink(&value);
                }
            }
        }
    }

    /// Pop the next value, applying any ripen markers in front of it.
    fn pop_value(state: &mut State<V>) -> Option<V> {
        loop {
            match state.pending.pop_front()? {
                Pending::Deliver(value) => return Some(value),
                Pending::Ripen(id) => {
                    if let Some(entry) = state.sinks.get_mut(&id) {
                        debug_assert!(!entry.ripe, "sink {id} ripened twice");
                        entry.ripe = true;
                        trace!(connection = id.raw(), "signal.ripen");
                    }
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
