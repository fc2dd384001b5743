#![forbid(unsafe_code)]

//! Capability traits shared by primary and derived observables.
//!
//! Every observable offers a snapshot read plus a subscribable stream of
//! [`Update`](crate::change::Update)s. Derived operators accept any type
//! implementing these traits and produce another one.

use std::collections::HashSet;
use std::hash::Hash;
use std::sync::Arc;

use crate::array::ArrayUpdate;
use crate::change::{SetUpdate, ValueUpdate};
use crate::connection::Connection;
use crate::signal::Sink;

/// Bounds required of anything stored in an observable set.
pub trait SetElement: Eq + Hash + Clone + Send + Sync + 'static {}

impl<T> SetElement for T where T: Eq + Hash + Clone + Send + Sync + 'static {}

/// A set whose changes can be observed.
///
/// An implementation applies a change before queuing it and queues the whole
/// `Begin`/`Change`/`End` run at once, so a subscriber that reads the value
/// while part of that run is in flight never receives the change again.
pub trait ObservableSet<T: SetElement>: Send + Sync {
    /// Snapshot of the current members.
    fn value(&self) -> HashSet<T>;

    /// Subscribe to the change stream.
    fn subscribe(&self, sink: Sink<SetUpdate<T>>) -> Connection;

    fn count(&self) -> usize {
        self.value().len()
    }

    fn is_empty(&self) -> bool {
        self.count() == 0
    }

    fn contains(&self, element: &T) -> bool {
        self.value().contains(element)
    }

    /// Whether every member is also in `other`.
    fn is_subset(&self, other: &HashSet<T>) -> bool {
        self.count() <= other.len() && self.value().is_subset(other)
    }

    /// Whether every element of `other` is a member.
    fn is_superset(&self, other: &HashSet<T>) -> bool {
        other.iter().all(|element| self.contains(element))
    }
}

/// A scalar value whose changes can be observed.
pub trait ObservableValue<T>: Send + Sync {
    fn get(&self) -> T;

    fn subscribe(&self, sink: Sink<ValueUpdate<T>>) -> Connection;
}

/// An ordered collection whose changes can be observed.
pub trait ObservableArray<T>: Send + Sync {
    fn value(&self) -> Vec<T>;

    fn subscribe(&self, sink: Sink<ArrayUpdate<T>>) -> Connection;

    fn count(&self) -> usize {
        self.value().len()
    }
}

impl<T: SetElement, S: ObservableSet<T> + ?Sized> ObservableSet<T> for Arc<S> {
    fn value(&self) -> HashSet<T> {
        (**self).value()
    }

    fn subscribe(&self, sink: Sink<SetUpdate<T>>) -> Connection {
        (**self).subscribe(sink)
    }

    fn count(&self) -> usize {
        (**self).count()
    }

    fn is_empty(&self) -> bool {
        (**self).is_empty()
    }

    fn contains(&self, element: &T) -> bool {
        (**self).contains(element)
    }

    fn is_subset(&self, other: &HashSet<T>) -> bool {
        (**self).is_subset(other)
    }

    fn is_superset(&self, other: &HashSet<T>) -> bool {
        (**self).is_superset(other)
    }
}

impl<T, S: ObservableValue<T> + ?Sized> ObservableValue<T> for Arc<S> {
    fn get(&self) -> T {
        (**self).get()
    }

    fn subscribe(&self, sink: Sink<ValueUpdate<T>>) -> Connection {
        (**self).subscribe(sink)
    }
}

impl<T, S: ObservableArray<T> + ?Sized> ObservableArray<T> for Arc<S> {
    fn value(&self) -> Vec<T> {
        (**self).value()
    }

    fn subscribe(&self, sink: Sink<ArrayUpdate<T>>) -> Connection {
        (**self).subscribe(sink)
    }

    fn count(&self) -> usize {
        (**self).count()
    }
}
