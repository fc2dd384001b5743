#![forbid(unsafe_code)]

//! Change descriptions carried by observable streams.
//!
//! - [`Update`]: the transactional envelope every stream delivers. A
//!   transaction is `BeginTransaction`, zero or more `Change`s, then
//!   `EndTransaction`.
//! - [`SetChange`]: an atomic transition of a set.
//! - [`ValueChange`]: an atomic transition of a scalar value.
//!
//! # Invariants
//!
//! 1. A [`SetChange`] never holds the same element in both `inserted` and
//!    `removed`. Building through [`SetChange::insert`] and
//!    [`SetChange::remove`] cancels opposing entries instead.
//! 2. Observers never receive an empty `SetChange`.

use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;

/// One item of a transactional change stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Update<C> {
    /// A batch of related changes begins.
    BeginTransaction,
    /// One atomic change.
    Change(C),
    /// The batch opened by the matching `BeginTransaction` is complete.
    EndTransaction,
}

impl<C> Update<C> {
    /// The change carried by this update, if any.
    #[must_use]
    pub fn as_change(&self) -> Option<&C> {
        match self {
            Self::Change(change) => Some(change),
            _ => None,
        }
    }

    /// Transform the carried change, keeping transaction markers as-is.
    pub fn map<D>(self, f: impl FnOnce(C) -> D) -> Update<D> {
        match self {
            Self::BeginTransaction => Update::BeginTransaction,
            Self::Change(change) => Update::Change(f(change)),
            Self::EndTransaction => Update::EndTransaction,
        }
    }

    /// Whether this is a transaction marker rather than a change.
    #[must_use]
    pub fn is_marker(&self) -> bool {
        !matches!(self, Self::Change(_))
    }
}

/// Transition of a scalar value from `old` to `new`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueChange<T> {
    pub old: T,
    pub new: T,
}

impl<T> ValueChange<T> {
    #[must_use]
    pub fn new(old: T, new: T) -> Self {
        Self { old, new }
    }

    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> ValueChange<U> {
        ValueChange {
            old: f(self.old),
            new: f(self.new),
        }
    }
}

/// Transition of a set: elements that entered and elements that left.
#[derive(Clone)]
pub struct SetChange<T> {
    inserted: HashSet<T>,
    removed: HashSet<T>,
}

/// Update stream item of an observable set.
pub type SetUpdate<T> = Update<SetChange<T>>;

/// Update stream item of an observable value.
pub type ValueUpdate<T> = Update<ValueChange<T>>;

impl<T: Eq + Hash> Default for SetChange<T> {
    fn default() -> Self {
        Self {
            inserted: HashSet::new(),
            removed: HashSet::new(),
        }
    }
}

impl<T: Eq + Hash> PartialEq for SetChange<T> {
    fn eq(&self, other: &Self) -> bool {
        self.inserted == other.inserted && self.removed == other.removed
    }
}

impl<T: Eq + Hash> Eq for SetChange<T> {}

impl<T: fmt::Debug> fmt::Debug for SetChange<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SetChange")
            .field("inserted", &self.inserted)
            .field("removed", &self.removed)
            .finish()
    }
}

impl<T: Eq + Hash + Clone> SetChange<T> {
    /// An empty change.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a change from raw parts. Elements present in both sets cancel.
    #[must_use]
    pub fn from_parts(inserted: HashSet<T>, removed: HashSet<T>) -> Self {
        let mut change = Self {
            inserted,
            removed: HashSet::with_capacity(removed.len()),
        };
        for element in removed {
            change.remove(element);
        }
        change
    }

    /// A change that only inserts.
    #[must_use]
    pub fn inserting(elements: impl IntoIterator<Item = T>) -> Self {
        Self {
            inserted: elements.into_iter().collect(),
            removed: HashSet::new(),
        }
    }

    /// A change that only removes.
    #[must_use]
    pub fn removing(elements: impl IntoIterator<Item = T>) -> Self {
        Self {
            inserted: HashSet::new(),
            removed: elements.into_iter().collect(),
        }
    }

    /// The change that turns `old` into `new`.
    #[must_use]
    pub fn from_diff(old: &HashSet<T>, new: &HashSet<T>) -> Self {
        Self {
            inserted: new.difference(old).cloned().collect(),
            removed: old.difference(new).cloned().collect(),
        }
    }

    /// Record that `element` entered the set.
    ///
    /// If the same change already records `element` leaving, the two
    /// entries cancel.
    pub fn insert(&mut self, element: T) {
        if !self.removed.remove(&element) {
            self.inserted.insert(element);
        }
    }

    /// Record that `element` left the set.
    ///
    /// If the same change already records `element` entering, the two
    /// entries cancel.
    pub fn remove(&mut self, element: T) {
        if !self.inserted.remove(&element) {
            self.removed.insert(element);
        }
    }

    /// Append `next`, which must describe a transition starting where this
    /// change ends.
    pub fn merge(&mut self, next: Self) {
        for element in next.removed {
            self.remove(element);
        }
        for element in next.inserted {
            self.insert(element);
        }
    }

    /// Apply this change to `set`.
    pub fn apply_to(&self, set: &mut HashSet<T>) {
        for element in &self.removed {
            set.remove(element);
        }
        for element in &self.inserted {
            set.insert(element.clone());
        }
    }

    /// The change that undoes this one.
    #[must_use]
    pub fn reversed(self) -> Self {
        Self {
            inserted: self.removed,
            removed: self.inserted,
        }
    }

    #[must_use]
    pub fn inserted(&self) -> &HashSet<T> {
        &self.inserted
    }

    #[must_use]
    pub fn removed(&self) -> &HashSet<T> {
        &self.removed
    }

    #[must_use]
    pub fn into_parts(self) -> (HashSet<T>, HashSet<T>) {
        (self.inserted, self.removed)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.removed.is_empty()
    }

    /// Total number of recorded insertions and removals.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inserted.len() + self.removed.len()
    }
}
