#![forbid(unsafe_code)]

//! Filtering by a predicate that can itself be replaced.
//!
//! A [`PredicateFilteredSet`] watches an `ObservableValue<Option<Predicate>>`.
//! `None` means "no filter": the parent is mirrored unchanged. Each new
//! predicate builds a fresh [`FilteredSet`] over the parent and the output
//! is retargeted to it through a [`ProxyEngine`], so observers see a single
//! diff transaction per switch rather than a teardown.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use tether_core::{
    Connection, ObservableSet, ObservableValue, SetElement, Update, ValueUpdate,
};

use crate::derived::{DerivedSet, Link, Outbox, SetEngine};
use crate::filter::{FilterEngine, FilteredSet, Test};
use crate::proxy::ProxyEngine;

/// A shareable membership test.
///
/// Two predicates are equal only if they are clones of the same closure.
pub struct Predicate<T>(Test<T>);

impl<T> Predicate<T> {
    pub fn new(test: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        Self(Arc::new(test))
    }

    #[must_use]
    pub fn test(&self, element: &T) -> bool {
        (self.0)(element)
    }
}

impl<T> Clone for Predicate<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T> PartialEq for Predicate<T> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl<T> fmt::Debug for Predicate<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Predicate")
            .field(&Arc::as_ptr(&self.0).cast::<()>())
            .finish()
    }
}

/// Elements of a parent set passing whichever predicate is current.
pub type PredicateFilteredSet<T> = DerivedSet<T, PredicateFilterEngine<T>>;

/// The observable holding the current predicate.
pub type PredicateSource<T> = Arc<dyn ObservableValue<Option<Predicate<T>>>>;

/// Engine behind [`PredicateFilteredSet`].
pub struct PredicateFilterEngine<T: SetElement> {
    parent: Arc<dyn ObservableSet<T>>,
    predicate: PredicateSource<T>,
    proxy: ProxyEngine<T>,
    predicate_connection: Option<Connection>,
}

impl<T: SetElement> PredicateFilterEngine<T> {
    pub fn new(parent: Arc<dyn ObservableSet<T>>, predicate: PredicateSource<T>) -> Self {
        let proxy = ProxyEngine::new(Arc::clone(&parent));
        Self {
            parent,
            predicate,
            proxy,
            predicate_connection: None,
        }
    }

    /// The set to mirror under `predicate`.
    fn view(&self, predicate: Option<Predicate<T>>) -> Arc<dyn ObservableSet<T>> {
        match predicate {
            None => Arc::clone(&self.parent),
            Some(predicate) => {
                let filtered: FilteredSet<T> = DerivedSet::new(FilterEngine::new(
                    Arc::clone(&self.parent),
                    predicate.0,
                ));
                Arc::new(filtered)
            }
        }
    }

    fn apply_predicate(
        &mut self,
        link: &Link<T, Self>,
        update: &ValueUpdate<Option<Predicate<T>>>,
        out: &mut Outbox<T>,
    ) {
        if let Update::Change(change) = update {
            let view = self.view(change.new.clone());
            self.proxy.retarget(link, view, out);
        }
    }
}

impl<T: SetElement> SetEngine<T> for PredicateFilterEngine<T> {
    const KIND: &'static str = "predicate_filter";

    fn activate(&mut self, link: &Link<T, Self>) {
        self.predicate_connection = Some(self.predicate.subscribe(link.sink(
            |engine: &mut Self, link, update: &ValueUpdate<Option<Predicate<T>>>, out| {
                engine.apply_predicate(link, update, out);
            },
        )));
        self.proxy = ProxyEngine::new(self.view(self.predicate.get()));
        self.proxy.connect(link);
    }

    fn deactivate(&mut self) {
        if let Some(mut connection) = self.predicate_connection.take() {
            connection.disconnect();
        }
        self.proxy.disconnect();
    }

    fn compute(&self) -> HashSet<T> {
        let values = self.parent.value();
        match self.predicate.get() {
            None => values,
            Some(predicate) => values
                .into_iter()
                .filter(|element| predicate.test(element))
                .collect(),
        }
    }

    fn cached(&self) -> HashSet<T> {
        self.proxy.source().value()
    }

    fn subscription_count(&self) -> usize {
        usize::from(self.predicate_connection.is_some()) + usize::from(self.proxy.is_connected())
    }

    fn compute_contains(&self, element: &T) -> bool {
        self.predicate
            .get()
            .is_none_or(|predicate| predicate.test(element))
            && self.parent.contains(element)
    }

    fn cached_count(&self) -> usize {
        self.proxy.source().count()
    }

    fn cached_contains(&self, element: &T) -> bool {
        self.proxy.source().contains(element)
    }
}
