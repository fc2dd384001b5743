#![forbid(unsafe_code)]

//! Subset of a parent set selected by a fixed test.

use std::collections::HashSet;
use std::sync::Arc;

use tether_core::{Connection, ObservableSet, SetChange, SetElement, SetUpdate, Update};

use crate::derived::{DerivedSet, Link, Outbox, SetEngine};

/// Elements of a parent set that pass a fixed test.
pub type FilteredSet<T> = DerivedSet<T, FilterEngine<T>>;

/// Membership test shared by filter engines.
pub type Test<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// Engine behind [`FilteredSet`].
///
/// While active the engine caches the matching elements, so each parent
/// change costs one test per inserted element.
pub struct FilterEngine<T: SetElement> {
    parent: Arc<dyn ObservableSet<T>>,
    test: Test<T>,
    cache: HashSet<T>,
    connection: Option<Connection>,
}

impl<T: SetElement> FilterEngine<T> {
    pub fn new(parent: Arc<dyn ObservableSet<T>>, test: Test<T>) -> Self {
        Self {
            parent,
            test,
            cache: HashSet::new(),
            connection: None,
        }
    }

    fn apply(&mut self, update: &SetUpdate<T>, out: &mut Outbox<T>) {
        match update {
            Update::BeginTransaction => out.begin(),
            Update::EndTransaction => out.end(),
            Update::Change(change) => {
                let mut result = SetChange::new();
                for element in change.removed() {
                    if self.cache.remove(element) {
                        result.remove(element.clone());
                    }
                }
                for element in change.inserted() {
                    if (self.test)(element) && self.cache.insert(element.clone()) {
                        result.insert(element.clone());
                    }
                }
                out.change(result);
            }
        }
    }
}

impl<T: SetElement> SetEngine<T> for FilterEngine<T> {
    const KIND: &'static str = "filter";

    fn activate(&mut self, link: &Link<T, Self>) {
        self.cache = self.compute();
        self.connection = Some(self.parent.subscribe(link.sink(
            |engine: &mut Self, _link, update: &SetUpdate<T>, out| engine.apply(update, out),
        )));
    }

    fn deactivate(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            connection.disconnect();
        }
        self.cache = HashSet::new();
    }

    fn compute(&self) -> HashSet<T> {
        self.parent
            .value()
            .into_iter()
            .filter(|element| (self.test)(element))
            .collect()
    }

    fn cached(&self) -> HashSet<T> {
        self.cache.clone()
    }

    fn subscription_count(&self) -> usize {
        usize::from(self.connection.is_some())
    }

    fn compute_contains(&self, element: &T) -> bool {
        (self.test)(element) && self.parent.contains(element)
    }

    fn cached_count(&self) -> usize {
        self.cache.len()
    }

    fn cached_contains(&self, element: &T) -> bool {
        self.cache.contains(element)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SetOperators;
    use parking_lot::Mutex;
    use tether_core::SetVariable;

    fn set(values: &[i32]) -> HashSet<i32> {
        values.iter().copied().collect()
    }

    fn record(filtered: &FilteredSet<i32>) -> (Arc<Mutex<Vec<SetUpdate<i32>>>>, Connection) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink_log = Arc::clone(&log);
        let connection = filtered.subscribe(Arc::new(move |update: &SetUpdate<i32>| {
            sink_log.lock().push(update.clone());
        }));
        (log, connection)
    }

    #[test]
    fn passive_reads_follow_parent() {
        let parent: SetVariable<i32> = [1, 2, 3, 4].into_iter().collect();
        let even = parent.filter(|x| x % 2 == 0);

        assert_eq!(even.value(), set(&[2, 4]));
        parent.insert(6);
        assert_eq!(even.count(), 3);
        assert!(even.contains(&6));
        assert!(!even.contains(&3));
        assert!(!even.is_active());
    }

    #[test]
    fn evenness_filter_reports_only_matching_changes() {
        let parent: SetVariable<i32> = [1, 2, 3, 4].into_iter().collect();
        let even = parent.filter(|x| x % 2 == 0);
        let (log, _connection) = record(&even);

        let mut change = SetChange::new();
        change.insert(5);
        change.remove(2);
        parent.apply(change);

        assert_eq!(
            *log.lock(),
            vec![
                Update::BeginTransaction,
                Update::Change(SetChange::removing([2])),
                Update::EndTransaction,
            ]
        );
        assert_eq!(even.value(), set(&[4]));
    }

    #[test]
    fn non_matching_change_still_forwards_markers() {
        let parent: SetVariable<i32> = [2].into_iter().collect();
        let even = parent.filter(|x| x % 2 == 0);
        let (log, _connection) = record(&even);

        parent.insert(7);

        assert_eq!(
            *log.lock(),
            vec![Update::BeginTransaction, Update::EndTransaction]
        );
    }

    /// Records `target` from the first begin marker `trigger` delivers.
    fn subscribe_on_begin(
        trigger: &impl ObservableSet<i32>,
        target: &FilteredSet<i32>,
    ) -> (Arc<Mutex<Vec<SetUpdate<i32>>>>, Connection) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let watch = Arc::new(Mutex::new(None));
        let target = target.clone();
        let sink_log = Arc::clone(&log);
        let connection = trigger.subscribe(Arc::new(move |update: &SetUpdate<i32>| {
            let mut watch = watch.lock();
            if watch.is_none() && matches!(update, Update::BeginTransaction) {
                let sink_log = Arc::clone(&sink_log);
                *watch = Some(target.subscribe(Arc::new(move |u: &SetUpdate<i32>| {
                    sink_log.lock().push(u.clone());
                })));
            }
        }));
        (log, connection)
    }

    #[test]
    fn activation_inside_parent_begin_skips_that_transaction() {
        let parent: SetVariable<i32> = [2].into_iter().collect();
        let even = parent.filter(|x| x % 2 == 0);
        let (log, _trigger) = subscribe_on_begin(&parent, &even);

        parent.insert(4);
        assert!(even.is_active());
        assert!(log.lock().is_empty());
        assert_eq!(even.value(), set(&[2, 4]));

        parent.insert(6);
        assert_eq!(
            *log.lock(),
            vec![
                Update::BeginTransaction,
                Update::Change(SetChange::inserting([6])),
                Update::EndTransaction,
            ]
        );
    }

    #[test]
    fn activation_inside_upstream_begin_drops_the_unmatched_end() {
        let parent: SetVariable<i32> = [4].into_iter().collect();
        let even = parent.filter(|x| x % 2 == 0);
        let (_even_log, _even_connection) = record(&even);
        let by_four = even.filter(|x| x % 4 == 0);
        let (log, _trigger) = subscribe_on_begin(&even, &by_four);

        // `even` forwards the begin before the change reaches its cache, so
        // `by_four` starts from {4} and still receives the insertion.
        parent.insert(8);
        assert_eq!(*log.lock(), vec![Update::Change(SetChange::inserting([8]))]);
        assert_eq!(by_four.value(), set(&[4, 8]));

        log.lock().clear();
        parent.insert(12);
        assert_eq!(
            *log.lock(),
            vec![
                Update::BeginTransaction,
                Update::Change(SetChange::inserting([12])),
                Update::EndTransaction,
            ]
        );
    }

    #[test]
    fn deactivation_releases_parent() {
        let parent: SetVariable<i32> = [1, 2].into_iter().collect();
        let even = parent.filter(|x| x % 2 == 0);

        let (_log, connection) = record(&even);
        assert!(parent.is_observed());
        assert_eq!(even.subscription_count(), 1);

        drop(connection);
        assert!(!parent.is_observed());
        assert_eq!(even.subscription_count(), 0);

        parent.insert(8);
        assert_eq!(even.value(), set(&[2, 8]));
    }

    #[test]
    fn filters_compose() {
        let parent: SetVariable<i32> = (1..=12).collect();
        let even = parent.filter(|x| x % 2 == 0);
        let by_six = even.filter(|x| x % 3 == 0);
        let (log, _connection) = record(&by_six);

        assert!(even.is_active());
        assert_eq!(by_six.value(), set(&[6, 12]));

        parent.apply(SetChange::inserting([18, 20]));
        assert_eq!(by_six.value(), set(&[6, 12, 18]));
        assert!(
            log.lock()
                .iter()
                .any(|u| u.as_change() == Some(&SetChange::inserting([18])))
        );
    }
}
