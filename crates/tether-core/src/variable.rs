#![forbid(unsafe_code)]

//! A shared scalar value with change notification.
//!
//! Setting a value equal to the current one is a no-op: no transaction is
//! emitted. Any other `set` emits `BeginTransaction`, one
//! [`ValueChange`], and `EndTransaction`.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::change::{Update, ValueChange, ValueUpdate};
use crate::connection::Connection;
use crate::observable::ObservableValue;
use crate::signal::{Signal, Sink};

struct VariableInner<T> {
    value: Mutex<T>,
    signal: Signal<ValueUpdate<T>>,
}

/// An observable value cell.
///
/// Cloning a `Variable` creates a new handle to the **same** value.
pub struct Variable<T> {
    inner: Arc<VariableInner<T>>,
}

impl<T> Clone for Variable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Variable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Variable")
            .field("value", &*self.inner.value.lock())
            .finish()
    }
}

impl<T> Variable<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(VariableInner {
                value: Mutex::new(value),
                signal: Signal::new(),
            }),
        }
    }

    /// Replace the value, notifying observers if it changed.
    pub fn set(&self, value: T) {
        let old = {
            let mut current = self.inner.value.lock();
            if *current == value {
                return;
            }
            std::mem::replace(&mut *current, value.clone())
        };
        self.emit(ValueChange::new(old, value));
    }

    /// Mutate the value in place, notifying observers if it changed.
    pub fn modify(&self, f: impl FnOnce(&mut T)) {
        let change = {
            let mut current = self.inner.value.lock();
            let old = current.clone();
            f(&mut current);
            if *current == old {
                return;
            }
            ValueChange::new(old, current.clone())
        };
        self.emit(change);
    }

    /// Whether anything is subscribed.
    #[must_use]
    pub fn is_observed(&self) -> bool {
        self.inner.signal.is_connected()
    }

    fn emit(&self, change: ValueChange<T>) {
        self.inner.signal.send_all([
            Update::BeginTransaction,
            Update::Change(change),
            Update::EndTransaction,
        ]);
    }
}

impl<T> ObservableValue<T> for Variable<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn get(&self) -> T {
        self.inner.value.lock().clone()
    }

    fn subscribe(&self, sink: Sink<ValueUpdate<T>>) -> Connection {
        self.inner.signal.connect(sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn changes(var: &Variable<i32>) -> (Arc<Mutex<Vec<ValueChange<i32>>>>, Connection) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink_log = Arc::clone(&log);
        let connection = var.subscribe(Arc::new(move |u: &ValueUpdate<i32>| {
            if let Some(change) = u.as_change() {
                sink_log.lock().push(*change);
            }
        }));
        (log, connection)
    }

    #[test]
    fn set_notifies_with_old_and_new() {
        let var = Variable::new(1);
        let (log, _c) = changes(&var);
        var.set(2);
        assert_eq!(var.get(), 2);
        assert_eq!(*log.lock(), vec![ValueChange::new(1, 2)]);
    }

    #[test]
    fn equal_set_is_silent() {
        let var = Variable::new(7);
        let (log, _c) = changes(&var);
        var.set(7);
        var.modify(|v| *v += 0);
        assert!(log.lock().is_empty());
    }

    #[test]
    fn modify_in_place() {
        let var = Variable::new(10);
        let (log, _c) = changes(&var);
        var.modify(|v| *v *= 3);
        assert_eq!(var.get(), 30);
        assert_eq!(*log.lock(), vec![ValueChange::new(10, 30)]);
    }

    #[test]
    fn clone_shares_state() {
        let a = Variable::new("x".to_string());
        let b = a.clone();
        b.set("y".to_string());
        assert_eq!(a.get(), "y");
    }
}
