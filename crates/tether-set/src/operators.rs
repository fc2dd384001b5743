#![forbid(unsafe_code)]

//! Method-call constructors for derived sets.

use std::sync::Arc;

use tether_core::{ObservableArray, ObservableSet, ObservableValue, SetElement};

use crate::derived::DerivedSet;
use crate::dynamic_filter::{DynamicFilterEngine, DynamicFilteredSet};
use crate::filter::{FilterEngine, FilteredSet};
use crate::flat_map::{FlatMapEngine, FlatMappedSet};
use crate::predicate::{Predicate, PredicateFilterEngine, PredicateFilteredSet};

/// Derived-set constructors available on every cloneable observable set.
///
/// Each operator captures a handle to `self`; the result is passive until
/// something subscribes to it.
///
/// ```
/// use tether_core::{ObservableSet, SetVariable};
/// use tether_set::SetOperators;
///
/// let numbers: SetVariable<u32> = (1..=6).collect();
/// let even = numbers.filter(|n| n % 2 == 0);
/// assert_eq!(even.count(), 3);
/// ```
pub trait SetOperators<T: SetElement>: ObservableSet<T> + Clone + Sized + 'static {
    /// Elements passing a fixed `test`.
    fn filter(&self, test: impl Fn(&T) -> bool + Send + Sync + 'static) -> FilteredSet<T> {
        DerivedSet::new(FilterEngine::new(Arc::new(self.clone()), Arc::new(test)))
    }

    /// Elements whose own observable predicate currently holds.
    fn filter_dynamic<B>(
        &self,
        test: impl Fn(&T) -> B + Send + Sync + 'static,
    ) -> DynamicFilteredSet<T>
    where
        B: ObservableValue<bool> + 'static,
    {
        DerivedSet::new(DynamicFilterEngine::new(
            Arc::new(self.clone()),
            Arc::new(move |element: &T| -> Arc<dyn ObservableValue<bool>> {
                Arc::new(test(element))
            }),
        ))
    }

    /// Elements passing whichever predicate `predicate` currently holds.
    ///
    /// `None` passes everything.
    fn filter_by(
        &self,
        predicate: impl ObservableValue<Option<Predicate<T>>> + 'static,
    ) -> PredicateFilteredSet<T> {
        DerivedSet::new(PredicateFilterEngine::new(
            Arc::new(self.clone()),
            Arc::new(predicate),
        ))
    }

    /// Distinct values of the array `field` across all elements.
    fn flat_map<U, A>(
        &self,
        field: impl Fn(&T) -> A + Send + Sync + 'static,
    ) -> FlatMappedSet<T, U>
    where
        U: SetElement,
        A: ObservableArray<U> + 'static,
    {
        DerivedSet::new(FlatMapEngine::new(
            Arc::new(self.clone()),
            Arc::new(move |element: &T| -> Arc<dyn ObservableArray<U>> {
                Arc::new(field(element))
            }),
        ))
    }
}

impl<T: SetElement, S: ObservableSet<T> + Clone + 'static> SetOperators<T> for S {}
