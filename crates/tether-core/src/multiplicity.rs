#![forbid(unsafe_code)]

//! Counted set membership.
//!
//! When several sources can contribute the same element, membership has to
//! be counted rather than boolean. [`Multiplicity`] tracks a positive count
//! per element; an element is a member iff its count is at least one.
//!
//! # Invariants
//!
//! 1. No stored count is ever zero.
//! 2. [`insert`](Multiplicity::insert) reports `true` only for a 0→1
//!    transition, [`remove`](Multiplicity::remove) only for 1→0.

use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;

use ahash::AHashMap;

/// A multiset that reports membership transitions.
#[derive(Clone)]
pub struct Multiplicity<T> {
    counts: AHashMap<T, usize>,
}

impl<T: Eq + Hash> Default for Multiplicity<T> {
    fn default() -> Self {
        Self {
            counts: AHashMap::new(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Multiplicity<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.counts.iter()).finish()
    }
}

impl<T: Eq + Hash + Clone> Multiplicity<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one more occurrence. Returns `true` if `element` just became a
    /// member.
    pub fn insert(&mut self, element: T) -> bool {
        let count = self.counts.entry(element).or_insert(0);
        *count += 1;
        *count == 1
    }

    /// Count one fewer occurrence. Returns `true` if `element` just stopped
    /// being a member.
    ///
    /// Removing an element that is not a member is a contract violation; it
    /// is caught in debug builds and ignored otherwise.
    pub fn remove(&mut self, element: &T) -> bool {
        let Some(count) = self.counts.get_mut(element) else {
            debug_assert!(false, "multiplicity underflow");
            return false;
        };
        *count -= 1;
        if *count == 0 {
            self.counts.remove(element);
            true
        } else {
            false
        }
    }

    /// Number of occurrences of `element`.
    #[must_use]
    pub fn count(&self, element: &T) -> usize {
        self.counts.get(element).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn contains(&self, element: &T) -> bool {
        self.counts.contains_key(element)
    }

    /// Number of distinct members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Distinct members, in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.counts.keys()
    }

    /// Distinct members as a set.
    #[must_use]
    pub fn to_set(&self) -> HashSet<T> {
        self.counts.keys().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.counts.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_only_at_the_boundary() {
        let mut m = Multiplicity::new();
        assert!(m.insert('b'));
        assert!(!m.insert('b'));
        assert_eq!(m.count(&'b'), 2);

        assert!(!m.remove(&'b'));
        assert!(m.contains(&'b'));
        assert!(m.remove(&'b'));
        assert!(!m.contains(&'b'));
        assert_eq!(m.count(&'b'), 0);
    }

    #[test]
    fn len_counts_distinct_members() {
        let mut m = Multiplicity::new();
        for c in ['a', 'b', 'b', 'c'] {
            m.insert(c);
        }
        assert_eq!(m.len(), 3);
        assert_eq!(m.to_set(), ['a', 'b', 'c'].into_iter().collect());
        m.clear();
        assert!(m.is_empty());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "multiplicity underflow")]
    fn underflow_is_caught_in_debug() {
        let mut m: Multiplicity<u8> = Multiplicity::new();
        m.remove(&1);
    }
}
