#![forbid(unsafe_code)]

//! A primary, mutable observable set.
//!
//! Every effective mutation is reported as one transaction: a
//! `BeginTransaction`, a single non-empty `Change`, and an
//! `EndTransaction`. Mutations that change nothing emit nothing.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::change::{SetChange, SetUpdate, Update};
use crate::connection::Connection;
use crate::observable::{ObservableSet, SetElement};
use crate::signal::{Signal, Sink};

struct SetInner<T> {
    value: Mutex<HashSet<T>>,
    signal: Signal<SetUpdate<T>>,
}

/// A shared, observable `HashSet`.
///
/// Cloning a `SetVariable` creates a new handle to the **same** set.
pub struct SetVariable<T> {
    inner: Arc<SetInner<T>>,
}

impl<T> Clone for SetVariable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: SetElement + fmt::Debug> fmt::Debug for SetVariable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SetVariable")
            .field("value", &*self.inner.value.lock())
            .finish()
    }
}

impl<T: SetElement> Default for SetVariable<T> {
    fn default() -> Self {
        Self::new(HashSet::new())
    }
}

impl<T: SetElement> FromIterator<T> for SetVariable<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<T: SetElement> SetVariable<T> {
    #[must_use]
    pub fn new(value: HashSet<T>) -> Self {
        Self {
            inner: Arc::new(SetInner {
                value: Mutex::new(value),
                signal: Signal::new(),
            }),
        }
    }

    /// Insert `element`. Returns `true` if it was not already a member.
    pub fn insert(&self, element: T) -> bool {
        !self.apply(SetChange::inserting([element])).is_empty()
    }

    /// Remove `element`. Returns `true` if it was a member.
    pub fn remove(&self, element: &T) -> bool {
        !self.apply(SetChange::removing([element.clone()])).is_empty()
    }

    /// Replace the whole contents, reporting the difference.
    pub fn set_value(&self, value: HashSet<T>) {
        let change = {
            let mut current = self.inner.value.lock();
            let change = SetChange::from_diff(&current, &value);
            *current = value;
            change
        };
        self.emit(change);
    }

    /// Apply `change` and report the part of it that took effect.
    ///
    /// Removals of non-members and insertions of existing members are
    /// dropped from the reported change. Returns the effective change.
    pub fn apply(&self, change: SetChange<T>) -> SetChange<T> {
        let effective = {
            let mut current = self.inner.value.lock();
            let (inserted, removed) = change.into_parts();
            let mut effective = SetChange::new();
            for element in removed {
                if current.remove(&element) {
                    effective.remove(element);
                }
            }
            for element in inserted {
                if current.insert(element.clone()) {
                    effective.insert(element);
                }
            }
            effective
        };
        self.emit(effective.clone());
        effective
    }

    /// Whether anything is subscribed.
    #[must_use]
    pub fn is_observed(&self) -> bool {
        self.inner.signal.is_connected()
    }

    fn emit(&self, change: SetChange<T>) {
        if change.is_empty() {
            return;
        }
        self.inner.signal.send_all([
            Update::BeginTransaction,
            Update::Change(change),
            Update::EndTransaction,
        ]);
    }
}

impl<T: SetElement> ObservableSet<T> for SetVariable<T> {
    fn value(&self) -> HashSet<T> {
        self.inner.value.lock().clone()
    }

    fn subscribe(&self, sink: Sink<SetUpdate<T>>) -> Connection {
        self.inner.signal.connect(sink)
    }

    fn count(&self) -> usize {
        self.inner.value.lock().len()
    }

    fn contains(&self, element: &T) -> bool {
        self.inner.value.lock().contains(element)
    }
}
