#![forbid(unsafe_code)]

//! Derived observable sets.
//!
//! Every derived set starts **passive**: it keeps no cache and holds no
//! upstream subscriptions, answering reads by recomputing from its source.
//! The first observer makes it **active**; the last one leaving makes it
//! passive again. See [`derived`] for the state machine.
//!
//! | Operator | Type | Updates on |
//! |---|---|---|
//! | [`filter`](SetOperators::filter) | [`FilteredSet`] | parent changes |
//! | [`filter_dynamic`](SetOperators::filter_dynamic) | [`DynamicFilteredSet`] | parent changes, per-element predicate flips |
//! | [`filter_by`](SetOperators::filter_by) | [`PredicateFilteredSet`] | parent changes, predicate replacement |
//! | [`flat_map`](SetOperators::flat_map) | [`FlatMappedSet`] | parent changes, field edits |
//! | [`SetProxy::proxy`](DerivedSet::proxy) | [`SetProxy`] | source changes, [`retarget`](DerivedSet::retarget) |

pub mod derived;
pub mod dynamic_filter;
pub mod filter;
pub mod flat_map;
pub mod operators;
pub mod predicate;
pub mod proxy;

pub use derived::{DerivedSet, Link, Outbox, SetEngine};
pub use dynamic_filter::{DynamicFilterEngine, DynamicFilteredSet};
pub use filter::{FilterEngine, FilteredSet};
pub use flat_map::{FlatMapEngine, FlatMappedSet};
pub use operators::SetOperators;
pub use predicate::{Predicate, PredicateFilterEngine, PredicateFilteredSet};
pub use proxy::{ProxyEngine, SetProxy};
