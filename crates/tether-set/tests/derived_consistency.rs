#![forbid(unsafe_code)]

//! Consistency tests for derived sets.
//!
//! Validates, under random update streams:
//! 1. An observer replaying the emitted changes onto the initial value always
//!    holds the same set as a naive recomputation.
//! 2. `value()`, `count()`, `contains()`, `is_subset()`, and `is_superset()`
//!    agree with that recomputation while active and after returning to
//!    passive.
//! 3. Transaction markers stay balanced and properly nested.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use proptest::prelude::*;
use tether_core::{
    ArrayVariable, Connection, ObservableArray, ObservableSet, ObservableValue, SetChange, SetUpdate, SetVariable,
    Update, Variable,
};
use tether_set::SetOperators;

// ── Helpers ─────────────────────────────────────────────────────────────

/// Replays a derived set's update stream and tracks marker nesting.
struct Mirror {
    state: Arc<Mutex<MirrorState>>,
    _connection: Connection,
}

#[derive(Default)]
struct MirrorState {
    members: HashSet<u8>,
    depth: isize,
    min_depth: isize,
}

impl Mirror {
    fn attach(set: &impl ObservableSet<u8>) -> Self {
        let state = Arc::new(Mutex::new(MirrorState::default()));
        let sink_state = Arc::clone(&state);
        let connection = set.subscribe(Arc::new(move |update: &SetUpdate<u8>| {
            let mut state = sink_state.lock();
            match update {
                Update::BeginTransaction => state.depth += 1,
                Update::EndTransaction => {
                    state.depth -= 1;
                    state.min_depth = state.min_depth.min(state.depth);
                }
                Update::Change(change) => {
                    assert!(!change.is_empty(), "empty change emitted");
                    change.apply_to(&mut state.members);
                }
            }
        }));
        state.lock().members = set.value();
        Self {
            state,
            _connection: connection,
        }
    }

    fn members(&self) -> HashSet<u8> {
        self.state.lock().members.clone()
    }

    fn assert_balanced(&self) {
        let state = self.state.lock();
        assert_eq!(state.depth, 0, "unbalanced transaction markers");
        assert!(state.min_depth >= 0, "end marker before begin");
    }
}

fn assert_reads_match(set: &impl ObservableSet<u8>, expected: &HashSet<u8>) {
    assert_eq!(&set.value(), expected);
    assert_eq!(set.count(), expected.len());
    for element in 0u8..40 {
        assert_eq!(set.contains(&element), expected.contains(&element), "contains({element})");
    }
    assert!(set.is_subset(expected));
    assert!(set.is_superset(expected));

    // Strictly larger and strictly smaller neighbours.
    let mut larger = expected.clone();
    larger.insert(u8::MAX);
    assert!(set.is_subset(&larger));
    assert!(!set.is_superset(&larger));
    if let Some(&dropped) = expected.iter().next() {
        let mut smaller = expected.clone();
        smaller.remove(&dropped);
        assert!(!set.is_subset(&smaller));
        assert!(set.is_superset(&smaller));
    }
}

fn small_set() -> impl Strategy<Value = HashSet<u8>> {
    proptest::collection::hash_set(0u8..32, 0..12)
}

fn set_change() -> impl Strategy<Value = SetChange<u8>> {
    (small_set(), small_set()).prop_map(|(inserted, removed)| SetChange::from_parts(inserted, removed))
}

// ═════════════════════════════════════════════════════════════════════════
// Static filter
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn filter_cache_matches_naive(
        initial in small_set(),
        changes in proptest::collection::vec(set_change(), 0..40),
        modulus in 2u8..5,
    ) {
        let parent: SetVariable<u8> = initial.into_iter().collect();
        let filtered = parent.filter(move |x| x % modulus == 0);
        let naive = |parent: &SetVariable<u8>| -> HashSet<u8> {
            parent.value().into_iter().filter(|x| x % modulus == 0).collect()
        };

        // Passive reads first.
        assert_reads_match(&filtered, &naive(&parent));

        let mirror = Mirror::attach(&filtered);
        prop_assert!(filtered.is_active());
        for change in changes {
            parent.apply(change);
            let expected = naive(&parent);
            prop_assert_eq!(&mirror.members(), &expected);
            assert_reads_match(&filtered, &expected);
        }
        mirror.assert_balanced();

        drop(mirror);
        prop_assert!(!filtered.is_active());
        prop_assert!(!parent.is_observed());
        assert_reads_match(&filtered, &naive(&parent));
    }
}

// ═════════════════════════════════════════════════════════════════════════
// Dynamic filter
// ═════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
enum DynamicOp {
    Toggle(u8),
    Flip(u8),
}

fn dynamic_op() -> impl Strategy<Value = DynamicOp> {
    prop_oneof![
        (0u8..8).prop_map(DynamicOp::Toggle),
        (0u8..8).prop_map(DynamicOp::Flip),
    ]
}

proptest! {
    #[test]
    fn dynamic_filter_cache_matches_naive(
        members in proptest::collection::hash_set(0u8..8, 0..8),
        flags in proptest::collection::vec(any::<bool>(), 8),
        ops in proptest::collection::vec(dynamic_op(), 0..60),
    ) {
        let flags: Arc<Vec<Variable<bool>>> = Arc::new(flags.into_iter().map(Variable::new).collect());
        let parent: SetVariable<u8> = members.into_iter().collect();
        let lookup = Arc::clone(&flags);
        let visible = parent.filter_dynamic(move |x: &u8| lookup[usize::from(*x)].clone());
        let naive = |parent: &SetVariable<u8>| -> HashSet<u8> {
            parent.value().into_iter().filter(|x| flags[usize::from(*x)].get()).collect()
        };

        let mirror = Mirror::attach(&visible);
        for op in ops {
            match op {
                DynamicOp::Toggle(x) => {
                    if !parent.remove(&x) {
                        parent.insert(x);
                    }
                }
                DynamicOp::Flip(x) => flags[usize::from(x)].modify(|on| *on = !*on),
            }
            let expected = naive(&parent);
            prop_assert_eq!(&mirror.members(), &expected);
            assert_reads_match(&visible, &expected);
            prop_assert_eq!(visible.subscription_count(), 1 + parent.count());
        }
        mirror.assert_balanced();

        drop(mirror);
        for flag in flags.iter() {
            prop_assert!(!flag.is_observed());
        }
        assert_reads_match(&visible, &naive(&parent));
    }
}

// ═════════════════════════════════════════════════════════════════════════
// Flat-map
// ═════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
enum FieldOp {
    Toggle(u8),
    Push(u8, u8),
    Remove(u8, usize),
    Replace(u8, usize, u8),
}

fn field_op() -> impl Strategy<Value = FieldOp> {
    prop_oneof![
        2 => (0u8..6).prop_map(FieldOp::Toggle),
        2 => (0u8..6, 0u8..10).prop_map(|(p, v)| FieldOp::Push(p, v)),
        2 => (0u8..6, any::<usize>()).prop_map(|(p, i)| FieldOp::Remove(p, i)),
        1 => (0u8..6, any::<usize>(), 0u8..10).prop_map(|(p, i, v)| FieldOp::Replace(p, i, v)),
    ]
}

proptest! {
    #[test]
    fn flat_map_matches_naive_union(
        members in proptest::collection::hash_set(0u8..6, 0..6),
        contents in proptest::collection::vec(proptest::collection::vec(0u8..10, 0..5), 6),
        ops in proptest::collection::vec(field_op(), 0..60),
    ) {
        let fields: Arc<Vec<ArrayVariable<u8>>> =
            Arc::new(contents.into_iter().map(ArrayVariable::new).collect());
        let parent: SetVariable<u8> = members.into_iter().collect();
        let lookup = Arc::clone(&fields);
        let union = parent.flat_map(move |p: &u8| lookup[usize::from(*p)].clone());
        let naive = |parent: &SetVariable<u8>| -> HashSet<u8> {
            parent
                .value()
                .into_iter()
                .flat_map(|p| fields[usize::from(p)].value())
                .collect()
        };

        assert_reads_match(&union, &naive(&parent));

        let mirror = Mirror::attach(&union);
        for op in ops {
            match op {
                FieldOp::Toggle(p) => {
                    if !parent.remove(&p) {
                        parent.insert(p);
                    }
                }
                FieldOp::Push(p, v) => fields[usize::from(p)].push(v),
                FieldOp::Remove(p, i) => {
                    let field = &fields[usize::from(p)];
                    let len = field.count();
                    if len > 0 {
                        field.remove(i % len).expect("index in bounds");
                    }
                }
                FieldOp::Replace(p, i, v) => {
                    let field = &fields[usize::from(p)];
                    let len = field.count();
                    if len > 0 {
                        field.replace(i % len, v).expect("index in bounds");
                    }
                }
            }
            let expected = naive(&parent);
            prop_assert_eq!(&mirror.members(), &expected);
            assert_reads_match(&union, &expected);
        }
        mirror.assert_balanced();

        drop(mirror);
        prop_assert_eq!(union.subscription_count(), 0);
        assert_reads_match(&union, &naive(&parent));
    }
}

// ═════════════════════════════════════════════════════════════════════════
// Composition
// ═════════════════════════════════════════════════════════════════════════

#[test]
fn chained_operators_activate_and_release_together() {
    let parent: SetVariable<u8> = (0..10).collect();
    let even = parent.filter(|x| x % 2 == 0);
    let fields: Arc<Vec<ArrayVariable<u8>>> =
        Arc::new((0..10).map(|x| ArrayVariable::new(vec![x / 2])).collect());
    let lookup = Arc::clone(&fields);
    let halves = even.flat_map(move |x: &u8| lookup[usize::from(*x)].clone());

    assert!(!even.is_active());
    let mirror = Mirror::attach(&halves);
    assert!(even.is_active());
    assert_eq!(mirror.members(), (0..5).collect());

    parent.remove(&4);
    assert_eq!(mirror.members(), [0, 1, 3, 4].into_iter().collect());
    fields[6].push(9);
    assert!(halves.contains(&9));

    drop(mirror);
    assert!(!halves.is_active());
    assert!(!even.is_active());
    assert!(!parent.is_observed());
    assert!(fields.iter().all(|f| !f.is_observed()));
}
