#![forbid(unsafe_code)]

//! A primary, mutable observable array.
//!
//! Changes are reported as an ordered list of positional
//! [`ArrayModification`]s; each index refers to the array as it stands after
//! every earlier modification in the same change has been applied.
//!
//! Edits made inside one [`ArrayVariable::update`] call are reported as a
//! single transaction.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::change::Update;
use crate::connection::Connection;
use crate::error::{Result, TetherError};
use crate::observable::ObservableArray;
use crate::signal::{Signal, Sink};

/// One positional edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArrayModification<T> {
    Insert { index: usize, element: T },
    Remove { index: usize, element: T },
    Replace { index: usize, old: T, new: T },
}

impl<T> ArrayModification<T> {
    /// The element this edit takes out of the array, if any.
    #[must_use]
    pub fn old_element(&self) -> Option<&T> {
        match self {
            Self::Insert { .. } => None,
            Self::Remove { element, .. } => Some(element),
            Self::Replace { old, .. } => Some(old),
        }
    }

    /// The element this edit puts into the array, if any.
    #[must_use]
    pub fn new_element(&self) -> Option<&T> {
        match self {
            Self::Insert { element, .. } => Some(element),
            Self::Remove { .. } => None,
            Self::Replace { new, .. } => Some(new),
        }
    }

    #[must_use]
    pub fn index(&self) -> usize {
        match self {
            Self::Insert { index, .. } | Self::Remove { index, .. } | Self::Replace { index, .. } => {
                *index
            }
        }
    }
}

/// An atomic batch of positional edits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayChange<T> {
    /// Length of the array before the first modification.
    pub initial_count: usize,
    pub modifications: Vec<ArrayModification<T>>,
}

/// Update stream item of an observable array.
pub type ArrayUpdate<T> = Update<ArrayChange<T>>;

impl<T> ArrayChange<T> {
    /// Length of the array after every modification.
    #[must_use]
    pub fn final_count(&self) -> usize {
        self.modifications
            .iter()
            .fold(self.initial_count, |count, m| match m {
                ArrayModification::Insert { .. } => count + 1,
                ArrayModification::Remove { .. } => count - 1,
                ArrayModification::Replace { .. } => count,
            })
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modifications.is_empty()
    }

    /// Replay the modifications onto `target`.
    pub fn apply_to(&self, target: &mut Vec<T>)
    where
        T: Clone,
    {
        debug_assert_eq!(target.len(), self.initial_count, "array change applied out of order");
        for modification in &self.modifications {
            match modification {
                ArrayModification::Insert { index, element } => target.insert(*index, element.clone()),
                ArrayModification::Remove { index, .. } => {
                    target.remove(*index);
                }
                ArrayModification::Replace { index, new, .. } => target[*index] = new.clone(),
            }
        }
    }
}

/// Records edits made inside one [`ArrayVariable::update`] call.
pub struct ArrayEditor<'a, T> {
    items: &'a mut Vec<T>,
    modifications: Vec<ArrayModification<T>>,
}

impl<T: Clone> ArrayEditor<'_, T> {
    pub fn push(&mut self, element: T) {
        let index = self.items.len();
        self.items.push(element.clone());
        self.modifications
            .push(ArrayModification::Insert { index, element });
    }

    pub fn insert(&mut self, index: usize, element: T) -> Result<()> {
        if index > self.items.len() {
            return Err(TetherError::out_of_bounds(index, self.items.len()));
        }
        self.items.insert(index, element.clone());
        self.modifications
            .push(ArrayModification::Insert { index, element });
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> Result<T> {
        if index >= self.items.len() {
            return Err(TetherError::out_of_bounds(index, self.items.len()));
        }
        let element = self.items.remove(index);
        self.modifications.push(ArrayModification::Remove {
            index,
            element: element.clone(),
        });
        Ok(element)
    }

    pub fn replace(&mut self, index: usize, element: T) -> Result<T> {
        let len = self.items.len();
        let slot = self
            .items
            .get_mut(index)
            .ok_or(TetherError::out_of_bounds(index, len))?;
        let old = std::mem::replace(slot, element.clone());
        self.modifications.push(ArrayModification::Replace {
            index,
            old: old.clone(),
            new: element,
        });
        Ok(old)
    }

    /// Remove every element.
    pub fn clear(&mut self) {
        while let Some(element) = self.items.pop() {
            let index = self.items.len();
            self.modifications
                .push(ArrayModification::Remove { index, element });
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

struct ArrayInner<T> {
    items: Mutex<Vec<T>>,
    signal: Signal<ArrayUpdate<T>>,
}

/// A shared, observable `Vec`.
///
/// Cloning an `ArrayVariable` creates a new handle to the **same** array.
pub struct ArrayVariable<T> {
    inner: Arc<ArrayInner<T>>,
}

impl<T> Clone for ArrayVariable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for ArrayVariable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArrayVariable")
            .field("items", &*self.inner.items.lock())
            .finish()
    }
}

impl<T: Clone + Send + Sync + 'static> Default for ArrayVariable<T> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl<T: Clone + Send + Sync + 'static> ArrayVariable<T> {
    #[must_use]
    pub fn new(items: Vec<T>) -> Self {
        Self {
            inner: Arc::new(ArrayInner {
                items: Mutex::new(items),
                signal: Signal::new(),
            }),
        }
    }

    /// Run several edits and report them as one transaction.
    ///
    /// Edits that succeeded before an error is returned from `f` stay
    /// applied and are still reported.
    pub fn update<R>(&self, f: impl FnOnce(&mut ArrayEditor<'_, T>) -> R) -> R {
        let (result, change) = {
            let mut items = self.inner.items.lock();
            let initial_count = items.len();
            let mut editor = ArrayEditor {
                items: &mut items,
                modifications: Vec::new(),
            };
            let result = f(&mut editor);
            let change = ArrayChange {
                initial_count,
                modifications: editor.modifications,
            };
            (result, change)
        };
        if !change.is_empty() {
            self.inner.signal.send_all([
                Update::BeginTransaction,
                Update::Change(change),
                Update::EndTransaction,
            ]);
        }
        result
    }

    pub fn push(&self, element: T) {
        self.update(|editor| editor.push(element));
    }

    pub fn insert(&self, index: usize, element: T) -> Result<()> {
        self.update(|editor| editor.insert(index, element))
    }

    pub fn remove(&self, index: usize) -> Result<T> {
        self.update(|editor| editor.remove(index))
    }

    pub fn replace(&self, index: usize, element: T) -> Result<T> {
        self.update(|editor| editor.replace(index, element))
    }

    /// Whether anything is subscribed.
    #[must_use]
    pub fn is_observed(&self) -> bool {
        self.inner.signal.is_connected()
    }

    /// Replace the whole contents.
    pub fn set_value(&self, items: Vec<T>) {
        self.update(|editor| {
            editor.clear();
            for element in items {
                editor.push(element);
            }
        });
    }
}

impl<T: Clone + Send + Sync + 'static> ObservableArray<T> for ArrayVariable<T> {
    fn value(&self) -> Vec<T> {
        self.inner.items.lock().clone()
    }

    fn subscribe(&self, sink: Sink<ArrayUpdate<T>>) -> Connection {
        self.inner.signal.connect(sink)
    }

    fn count(&self) -> usize {
        self.inner.items.lock().len()
    }
}
