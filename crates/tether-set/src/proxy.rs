#![forbid(unsafe_code)]

//! A set that mirrors a replaceable source.
//!
//! Observers of a [`SetProxy`] keep their subscription when the source is
//! swapped with [`retarget`](DerivedSet::retarget); the swap itself shows up
//! as one transaction carrying the difference between the old and new
//! contents.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tether_core::{Connection, ObservableSet, SetChange, SetElement, SetUpdate, Sink, Update};
use tracing::debug;

use crate::derived::{DerivedSet, Link, Outbox, SetEngine};

/// A redirectable view of another set.
pub type SetProxy<T> = DerivedSet<T, ProxyEngine<T>>;

/// Forwards one source and can be pointed at another.
///
/// Also used as a building block by engines that switch between sources.
pub struct ProxyEngine<T: SetElement> {
    source: Arc<dyn ObservableSet<T>>,
    connection: Option<Connection>,
    /// Transactions forwarded from the current source and not yet ended.
    open: Arc<AtomicUsize>,
}

impl<T: SetElement> ProxyEngine<T> {
    pub fn new(source: Arc<dyn ObservableSet<T>>) -> Self {
        Self {
            source,
            connection: None,
            open: Arc::new(AtomicUsize::new(0)),
        }
    }

    #[must_use]
    pub fn source(&self) -> Arc<dyn ObservableSet<T>> {
        Arc::clone(&self.source)
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    fn forward<E: SetEngine<T>>(&mut self, link: &Link<T, E>) -> Sink<SetUpdate<T>> {
        let open = Arc::new(AtomicUsize::new(0));
        self.open = Arc::clone(&open);
        link.sink(move |_engine: &mut E, _link, update: &SetUpdate<T>, out: &mut Outbox<T>| {
            match update {
                Update::BeginTransaction => {
                    open.fetch_add(1, Ordering::Relaxed);
                }
                Update::EndTransaction => {
                    open.fetch_sub(1, Ordering::Relaxed);
                }
                Update::Change(_) => {}
            }
            out.push(update.clone());
        })
    }

    /// Subscribe to the current source on behalf of the engine behind
    /// `link`.
    pub fn connect<E: SetEngine<T>>(&mut self, link: &Link<T, E>) {
        debug_assert!(self.connection.is_none(), "proxy connected twice");
        let sink = self.forward(link);
        self.connection = Some(self.source.subscribe(sink));
    }

    pub fn disconnect(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            connection.disconnect();
        }
    }

    /// Point at `source`.
    ///
    /// While connected, the new source is subscribed before the old one is
    /// released, and the content difference is queued on `out` as one
    /// transaction. Nothing is queued when the contents match. Transactions
    /// the old source left open are ended first.
    pub fn retarget<E: SetEngine<T>>(
        &mut self,
        link: &Link<T, E>,
        source: Arc<dyn ObservableSet<T>>,
        out: &mut Outbox<T>,
    ) {
        let Some(mut old_connection) = self.connection.take() else {
            self.source = source;
            return;
        };
        let old_value = self.source.value();
        let old_open = Arc::clone(&self.open);
        self.source = source;
        let sink = self.forward(link);
        self.connection = Some(self.source.subscribe(sink));
        old_connection.disconnect();
        for _ in 0..old_open.load(Ordering::Relaxed) {
            out.end();
        }

        let diff = SetChange::from_diff(&old_value, &self.source.value());
        debug!(
            inserted = diff.inserted().len(),
            removed = diff.removed().len(),
            "proxy.retarget"
        );
        out.transaction(diff);
    }
}

impl<T: SetElement> SetEngine<T> for ProxyEngine<T> {
    const KIND: &'static str = "proxy";

    fn activate(&mut self, link: &Link<T, Self>) {
        self.connect(link);
    }

    fn deactivate(&mut self) {
        self.disconnect();
    }

    fn compute(&self) -> HashSet<T> {
        self.source.value()
    }

    fn cached(&self) -> HashSet<T> {
        self.source.value()
    }

    fn subscription_count(&self) -> usize {
        usize::from(self.connection.is_some())
    }

    fn compute_count(&self) -> usize {
        self.source.count()
    }

    fn compute_contains(&self, element: &T) -> bool {
        self.source.contains(element)
    }

    fn cached_count(&self) -> usize {
        self.source.count()
    }

    fn cached_contains(&self, element: &T) -> bool {
        self.source.contains(element)
    }
}

impl<T: SetElement> DerivedSet<T, ProxyEngine<T>> {
    /// A proxy initially mirroring `source`.
    #[must_use]
    pub fn proxy(source: impl ObservableSet<T> + 'static) -> Self {
        Self::new(ProxyEngine::new(Arc::new(source)))
    }

    /// The set currently being mirrored.
    #[must_use]
    pub fn source(&self) -> Arc<dyn ObservableSet<T>> {
        self.modify(|engine, _, _| engine.source())
    }

    /// Mirror `source` from now on.
    pub fn retarget(&self, source: impl ObservableSet<T> + 'static) {
        let source: Arc<dyn ObservableSet<T>> = Arc::new(source);
        self.modify(|engine, link, out| engine.retarget(link, source, out));
    }
}
