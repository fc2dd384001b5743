#![forbid(unsafe_code)]

//! Lazily activated derived sets.
//!
//! # Design
//!
//! [`DerivedSet<T, E>`] pairs a [`SetEngine`] strategy with the
//! [`Signal`] that carries its updates. The signal's lifecycle hooks drive a
//! two-state machine:
//!
//! - **Passive** (initial): no upstream subscriptions, no cache. Reads call
//!   [`SetEngine::compute`] and friends, which pull from the source on
//!   demand.
//! - **Active**: entered when the first observer connects. The engine
//!   rebuilds its cache and subscribes upstream; reads are answered from the
//!   cache. Left when the last observer disconnects: every upstream
//!   subscription is dropped and the cache discarded.
//!
//! Upstream sinks are created through a [`Link`]. A link handler runs with
//! the engine locked and writes outgoing updates into an [`Outbox`]; the
//! outbox is flushed onto the signal only after the lock is released, so
//! observers may read the derived set from inside their callbacks.
//!
//! # Invariants
//!
//! 1. Reads return the same result in both modes at every quiescent point.
//! 2. While passive, the engine holds no upstream connection.
//! 3. Upstream updates that arrive while passive are ignored.
//! 4. Lock order is downstream before upstream; no lock is held while an
//!    update is emitted.
//! 5. Everything one handler queues is emitted as a single batch, after the
//!    cache already reflects it. A subscriber that connects while part of
//!    the batch is being delivered reads the result and sees none of it.
//! 6. Markers reaching a handler are balanced per subscription: an end
//!    whose begin predates the subscription is dropped.

use std::collections::HashSet;
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tether_core::{
    Connection, ObservableSet, SetChange, SetElement, SetUpdate, Signal, SignalHooks, Sink, Update,
};
use tracing::debug;

/// The strategy behind a [`DerivedSet`].
pub trait SetEngine<T: SetElement>: Send + Sized + 'static {
    /// Short name used in log events.
    const KIND: &'static str;

    /// Rebuild cached state from upstream and subscribe to every stream the
    /// engine depends on.
    fn activate(&mut self, link: &Link<T, Self>);

    /// Disconnect every upstream subscription and drop cached state.
    fn deactivate(&mut self);

    /// Current value recomputed from upstream, ignoring any cache.
    fn compute(&self) -> HashSet<T>;

    /// Current value from cached state. Only called while active.
    fn cached(&self) -> HashSet<T>;

    /// Number of upstream subscriptions currently held.
    fn subscription_count(&self) -> usize;

    /// Passive `count`. Override when it can avoid building the set.
    fn compute_count(&self) -> usize {
        self.compute().len()
    }

    /// Passive `contains`.
    fn compute_contains(&self, element: &T) -> bool {
        self.compute().contains(element)
    }

    /// Active `count`, from the cache.
    fn cached_count(&self) -> usize {
        self.cached().len()
    }

    /// Active `contains`, from the cache.
    fn cached_contains(&self, element: &T) -> bool {
        self.cached().contains(element)
    }
}

/// Updates collected by an engine handler, emitted once the engine is
/// unlocked.
pub struct Outbox<T> {
    updates: Vec<SetUpdate<T>>,
}

impl<T: SetElement> Outbox<T> {
    fn new() -> Self {
        Self {
            updates: Vec::new(),
        }
    }

    /// Queue a `BeginTransaction` marker.
    pub fn begin(&mut self) {
        self.updates.push(Update::BeginTransaction);
    }

    /// Queue an `EndTransaction` marker.
    pub fn end(&mut self) {
        self.updates.push(Update::EndTransaction);
    }

    /// Queue `change` unless it is empty.
    pub fn change(&mut self, change: SetChange<T>) {
        if !change.is_empty() {
            self.updates.push(Update::Change(change));
        }
    }

    /// Queue `update` as-is, dropping empty changes.
    pub fn push(&mut self, update: SetUpdate<T>) {
        match update {
            Update::Change(change) => self.change(change),
            marker => self.updates.push(marker),
        }
    }

    /// Queue `change` wrapped in its own transaction, unless it is empty.
    pub fn transaction(&mut self, change: SetChange<T>) {
        if !change.is_empty() {
            self.begin();
            self.updates.push(Update::Change(change));
            self.end();
        }
    }

    /// Whether nothing has been queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    fn flush(self, signal: &Signal<SetUpdate<T>>) {
        signal.send_all(self.updates);
    }
}

/// Back-reference from upstream sinks to the derived set that owns them.
pub struct Link<T, E> {
    core: Weak<Core<T, E>>,
}

impl<T, E> Clone for Link<T, E> {
    fn clone(&self) -> Self {
        Self {
            core: Weak::clone(&self.core),
        }
    }
}

impl<T: SetElement, E: SetEngine<T>> Link<T, E> {
    /// Build an upstream sink that runs `handler` against the engine.
    ///
    /// The sink holds the derived set weakly and does nothing once it is
    /// gone or passive. An `EndTransaction` whose `BeginTransaction` was
    /// delivered before the sink connected never reaches `handler`.
    pub fn sink<C: 'static>(
        &self,
        handler: impl Fn(&mut E, &Link<T, E>, &Update<C>, &mut Outbox<T>) + Send + Sync + 'static,
    ) -> Sink<Update<C>> {
        let core = Weak::clone(&self.core);
        let transactions = Mutex::new(Transactions::default());
        Arc::new(move |update: &Update<C>| {
            if let Some(core) = core.upgrade() {
                core.handle(|engine, link, out| {
                    if transactions.lock().admit(update) {
                        handler(engine, link, update, out);
                    }
                });
            }
        })
    }
}

/// Transactions opened on one upstream subscription and not yet closed.
#[derive(Debug, Default)]
struct Transactions {
    open: usize,
}

impl Transactions {
    fn admit<C>(&mut self, update: &Update<C>) -> bool {
        match update {
            Update::BeginTransaction => {
                self.open += 1;
                true
            }
            Update::EndTransaction if self.open == 0 => false,
            Update::EndTransaction => {
                self.open -= 1;
                true
            }
            Update::Change(_) => true,
        }
    }
}

struct Controller<E> {
    engine: E,
    active: bool,
}

struct Core<T, E> {
    controller: Mutex<Controller<E>>,
    signal: Signal<SetUpdate<T>>,
    this: Weak<Core<T, E>>,
}

impl<T: SetElement, E: SetEngine<T>> Core<T, E> {
    fn link(&self) -> Link<T, E> {
        Link {
            core: Weak::clone(&self.this),
        }
    }

    fn handle(&self, f: impl FnOnce(&mut E, &Link<T, E>, &mut Outbox<T>)) {
        let mut out = Outbox::new();
        {
            let mut controller = self.controller.lock();
            if !controller.active {
                return;
            }
            f(&mut controller.engine, &self.link(), &mut out);
        }
        out.flush(&self.signal);
    }
}

impl<T: SetElement, E: SetEngine<T>> SignalHooks for Core<T, E> {
    fn first_connected(&self) {
        let link = self.link();
        let mut controller = self.controller.lock();
        debug_assert!(!controller.active, "derived set activated twice");
        controller.engine.activate(&link);
        controller.active = true;
        debug!(
            kind = E::KIND,
            elements = controller.engine.cached_count(),
            subscriptions = controller.engine.subscription_count(),
            "derived.activate"
        );
    }

    fn last_disconnected(&self) {
        let mut controller = self.controller.lock();
        debug_assert!(controller.active, "derived set deactivated while passive");
        controller.engine.deactivate();
        controller.active = false;
        debug_assert_eq!(controller.engine.subscription_count(), 0);
        debug!(kind = E::KIND, "derived.deactivate");
    }
}

/// A set derived from upstream observables by a [`SetEngine`].
///
/// Cloning a `DerivedSet` creates a new handle to the **same** state.
pub struct DerivedSet<T, E> {
    core: Arc<Core<T, E>>,
    _element: PhantomData<fn() -> T>,
}

impl<T, E> Clone for DerivedSet<T, E> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
            _element: PhantomData,
        }
    }
}

impl<T: SetElement, E: SetEngine<T>> fmt::Debug for DerivedSet<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let controller = self.core.controller.lock();
        f.debug_struct("DerivedSet")
            .field("kind", &E::KIND)
            .field("active", &controller.active)
            .field("subscriptions", &controller.engine.subscription_count())
            .finish()
    }
}

impl<T: SetElement, E: SetEngine<T>> DerivedSet<T, E> {
    /// Wrap `engine`. The new set starts passive.
    #[must_use]
    pub fn new(engine: E) -> Self {
        let core = Arc::new_cyclic(|this: &Weak<Core<T, E>>| {
            let hooks: Weak<dyn SignalHooks> = Weak::clone(this) as Weak<dyn SignalHooks>;
            Core {
                controller: Mutex::new(Controller {
                    engine,
                    active: false,
                }),
                signal: Signal::with_hooks(hooks),
                this: Weak::clone(this),
            }
        });
        Self {
            core,
            _element: PhantomData,
        }
    }

    /// Whether the set currently maintains a cache and upstream
    /// subscriptions.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.core.controller.lock().active
    }

    /// Number of upstream subscriptions currently held.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.core.controller.lock().engine.subscription_count()
    }

    /// Run `f` against the engine, then emit whatever it queued.
    ///
    /// Unlike upstream handlers, `f` also runs while the set is passive.
    pub fn modify<R>(&self, f: impl FnOnce(&mut E, &Link<T, E>, &mut Outbox<T>) -> R) -> R {
        let mut out = Outbox::new();
        let result = {
            let mut controller = self.core.controller.lock();
            f(&mut controller.engine, &self.core.link(), &mut out)
        };
        out.flush(&self.core.signal);
        result
    }

    /// Read the engine in whichever mode it is in.
    fn read<R>(&self, active: impl FnOnce(&E) -> R, passive: impl FnOnce(&E) -> R) -> R {
        let controller = self.core.controller.lock();
        if controller.active {
            active(&controller.engine)
        } else {
            passive(&controller.engine)
        }
    }
}

impl<T: SetElement, E: SetEngine<T>> ObservableSet<T> for DerivedSet<T, E> {
    fn value(&self) -> HashSet<T> {
        self.read(E::cached, E::compute)
    }

    fn subscribe(&self, sink: Sink<SetUpdate<T>>) -> Connection {
        self.core.signal.connect(sink)
    }

    fn count(&self) -> usize {
        self.read(E::cached_count, E::compute_count)
    }

    fn contains(&self, element: &T) -> bool {
        self.read(
            |engine| engine.cached_contains(element),
            |engine| engine.compute_contains(element),
        )
    }
}
