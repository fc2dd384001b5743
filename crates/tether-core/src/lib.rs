#![forbid(unsafe_code)]

//! Core: ordered multicast signals, connection handles, change types, and
//! the observable primitives that derived operators build on.
//!
//! - [`Signal`]: thread-safe, reentrancy-safe multicast dispatch.
//! - [`Connection`]: disconnect handle returned by every subscription.
//! - [`SetChange`] / [`Update`]: the diff and transaction vocabulary.
//! - [`ObservableSet`], [`ObservableValue`], [`ObservableArray`]: the
//!   capability traits, with [`SetVariable`], [`Variable`], and
//!   [`ArrayVariable`] as their primary mutable implementations.

pub mod array;
pub mod change;
pub mod connection;
pub mod error;
pub mod multiplicity;
pub mod observable;
pub mod set;
pub mod signal;
pub mod variable;

pub use array::{ArrayChange, ArrayEditor, ArrayModification, ArrayUpdate, ArrayVariable};
pub use change::{SetChange, SetUpdate, Update, ValueChange, ValueUpdate};
pub use connection::{Connection, ConnectionId};
pub use error::{Result, TetherError};
pub use multiplicity::Multiplicity;
pub use observable::{ObservableArray, ObservableSet, ObservableValue, SetElement};
pub use set::SetVariable;
pub use signal::{Signal, SignalHooks, Sink};
pub use variable::Variable;
