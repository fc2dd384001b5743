#![forbid(unsafe_code)]

//! Tether public facade crate.
//!
//! This crate provides the stable, ergonomic surface area for users.
//! Derived sets live behind the `set` feature, which is on by default.

pub mod prelude {
    pub use tether_core as core;
    #[cfg(feature = "set")]
    pub use tether_set as set;

    pub use tether_core::{
        ArrayChange, ArrayModification, ArrayVariable, Connection, ObservableArray, ObservableSet,
        ObservableValue, SetChange, SetElement, SetUpdate, SetVariable, Signal, Update,
        ValueChange, Variable,
    };

    #[cfg(feature = "set")]
    pub use tether_set::{
        DynamicFilteredSet, FilteredSet, FlatMappedSet, Predicate, PredicateFilteredSet,
        SetOperators, SetProxy,
    };
}
