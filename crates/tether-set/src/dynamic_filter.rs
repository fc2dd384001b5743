#![forbid(unsafe_code)]

//! Subset of a parent set selected by per-element observable predicates.
//!
//! Every parent element maps to its own `ObservableValue<bool>`. While the
//! derived set is active, one subscription is held per parent element so a
//! predicate flip moves that element in or out.
//!
//! # Invariants
//!
//! 1. Exactly one predicate subscription exists per current parent element.
//! 2. The cache equals `{ e in parent | predicate(e) }` at every quiescent
//!    point.
//! 3. Flips that do not change membership emit nothing.

use std::collections::HashSet;
use std::sync::Arc;

use ahash::AHashMap;
use tether_core::{
    Connection, ObservableSet, ObservableValue, SetChange, SetElement, SetUpdate, Update,
    ValueUpdate,
};

use crate::derived::{DerivedSet, Link, Outbox, SetEngine};

/// Elements of a parent set whose own predicate currently holds.
pub type DynamicFilteredSet<T> = DerivedSet<T, DynamicFilterEngine<T>>;

/// Maps an element to the observable deciding its membership.
pub type DynamicTest<T> = Arc<dyn Fn(&T) -> Arc<dyn ObservableValue<bool>> + Send + Sync>;

/// Engine behind [`DynamicFilteredSet`].
pub struct DynamicFilterEngine<T: SetElement> {
    parent: Arc<dyn ObservableSet<T>>,
    test: DynamicTest<T>,
    cache: HashSet<T>,
    parent_connection: Option<Connection>,
    element_connections: AHashMap<T, Connection>,
}

impl<T: SetElement> DynamicFilterEngine<T> {
    pub fn new(parent: Arc<dyn ObservableSet<T>>, test: DynamicTest<T>) -> Self {
        Self {
            parent,
            test,
            cache: HashSet::new(),
            parent_connection: None,
            element_connections: AHashMap::new(),
        }
    }

    /// Subscribe to `element`'s predicate and return its current value.
    fn watch(&mut self, link: &Link<T, Self>, element: &T) -> bool {
        let predicate = (self.test)(element);
        let key = element.clone();
        let connection = predicate.subscribe(link.sink(
            move |engine: &mut Self, _link, update: &ValueUpdate<bool>, out| {
                engine.apply_predicate(&key, update, out);
            },
        ));
        let current = predicate.get();
        if let Some(mut stale) = self.element_connections.insert(element.clone(), connection) {
            stale.disconnect();
        }
        current
    }

    fn unwatch(&mut self, element: &T) {
        if let Some(mut connection) = self.element_connections.remove(element) {
            connection.disconnect();
        }
    }

    fn apply_parent(&mut self, link: &Link<T, Self>, update: &SetUpdate<T>, out: &mut Outbox<T>) {
        match update {
            Update::BeginTransaction => out.begin(),
            Update::EndTransaction => out.end(),
            Update::Change(change) => {
                let mut result = SetChange::new();
                for element in change.removed() {
                    self.unwatch(element);
                    if self.cache.remove(element) {
                        result.remove(element.clone());
                    }
                }
                for element in change.inserted() {
                    if self.element_connections.contains_key(element) {
                        continue;
                    }
                    if self.watch(link, element) && self.cache.insert(element.clone()) {
                        result.insert(element.clone());
                    }
                }
                out.change(result);
            }
        }
    }

    /// A predicate flip is reported as its own transaction.
    fn apply_predicate(&mut self, element: &T, update: &ValueUpdate<bool>, out: &mut Outbox<T>) {
        let Update::Change(change) = update else {
            return;
        };
        if !self.element_connections.contains_key(element) {
            return;
        }
        if change.new {
            if self.cache.insert(element.clone()) {
                out.transaction(SetChange::inserting([element.clone()]));
            }
        } else if self.cache.remove(element) {
            out.transaction(SetChange::removing([element.clone()]));
        }
    }
}

impl<T: SetElement> SetEngine<T> for DynamicFilterEngine<T> {
    const KIND: &'static str = "dynamic_filter";

    fn activate(&mut self, link: &Link<T, Self>) {
        for element in self.parent.value() {
            if self.watch(link, &element) {
                self.cache.insert(element);
            }
        }
        self.parent_connection = Some(self.parent.subscribe(link.sink(
            |engine: &mut Self, link, update: &SetUpdate<T>, out| {
                engine.apply_parent(link, update, out);
            },
        )));
    }

    fn deactivate(&mut self) {
        if let Some(mut connection) = self.parent_connection.take() {
            connection.disconnect();
        }
        for (_, mut connection) in self.element_connections.drain() {
            connection.disconnect();
        }
        self.cache = HashSet::new();
    }

    fn compute(&self) -> HashSet<T> {
        self.parent
            .value()
            .into_iter()
            .filter(|element| (self.test)(element).get())
            .collect()
    }

    fn cached(&self) -> HashSet<T> {
        self.cache.clone()
    }

    fn subscription_count(&self) -> usize {
        usize::from(self.parent_connection.is_some()) + self.element_connections.len()
    }

    fn compute_contains(&self, element: &T) -> bool {
        self.parent.contains(element) && (self.test)(element).get()
    }

    fn cached_count(&self) -> usize {
        self.cache.len()
    }

    fn cached_contains(&self, element: &T) -> bool {
        self.cache.contains(element)
    }
}
