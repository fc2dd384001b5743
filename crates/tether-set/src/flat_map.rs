#![forbid(unsafe_code)]

//! Union of an array-valued field across every element of a parent set.
//!
//! The same value may be contributed by several parents, or several times by
//! one parent. A [`Multiplicity`] counts contributions; a value enters the
//! output when its count leaves zero and leaves when it returns to zero.
//!
//! # Invariants
//!
//! 1. One field subscription exists per current parent element.
//! 2. Each parent's mirror equals its field's contents at every quiescent
//!    point, so detaching a parent withdraws exactly what it contributed.
//! 3. `members` equals the multiset union of all mirrors.
//! 4. Transaction markers from the parent and from every field are forwarded
//!    one-to-one. A field detached inside an open transaction has that
//!    transaction closed on its behalf.

use std::collections::HashSet;
use std::sync::Arc;

use ahash::AHashMap;
use tether_core::{
    ArrayUpdate, Connection, Multiplicity, ObservableArray, ObservableSet, SetChange, SetElement,
    SetUpdate, Update,
};

use crate::derived::{DerivedSet, Link, Outbox, SetEngine};

/// Distinct values of an array field gathered across a parent set.
pub type FlatMappedSet<P, T> = DerivedSet<T, FlatMapEngine<P, T>>;

/// Maps a parent element to its array field.
pub type Field<P, T> = Arc<dyn Fn(&P) -> Arc<dyn ObservableArray<T>> + Send + Sync>;

struct FieldLink<T> {
    connection: Connection,
    mirror: Vec<T>,
    open_transactions: usize,
}

/// Engine behind [`FlatMappedSet`].
pub struct FlatMapEngine<P: SetElement, T: SetElement> {
    parent: Arc<dyn ObservableSet<P>>,
    field: Field<P, T>,
    members: Multiplicity<T>,
    parent_connection: Option<Connection>,
    fields: AHashMap<P, FieldLink<T>>,
}

impl<P: SetElement, T: SetElement> FlatMapEngine<P, T> {
    pub fn new(parent: Arc<dyn ObservableSet<P>>, field: Field<P, T>) -> Self {
        Self {
            parent,
            field,
            members: Multiplicity::new(),
            parent_connection: None,
            fields: AHashMap::new(),
        }
    }

    fn attach(&mut self, link: &Link<T, Self>, parent: &P, result: &mut SetChange<T>) {
        let field = (self.field)(parent);
        let key = parent.clone();
        let connection = field.subscribe(link.sink(
            move |engine: &mut Self, _link, update: &ArrayUpdate<T>, out| {
                engine.apply_field(&key, update, out);
            },
        ));
        let mirror = field.value();
        for value in &mirror {
            if self.members.insert(value.clone()) {
                result.insert(value.clone());
            }
        }
        self.fields.insert(
            parent.clone(),
            FieldLink {
                connection,
                mirror,
                open_transactions: 0,
            },
        );
    }

    fn detach(&mut self, parent: &P, result: &mut SetChange<T>, out: &mut Outbox<T>) {
        let Some(mut field) = self.fields.remove(parent) else {
            return;
        };
        field.connection.disconnect();
        for value in field.mirror {
            if self.members.remove(&value) {
                result.remove(value);
            }
        }
        for _ in 0..field.open_transactions {
            out.end();
        }
    }

    fn apply_parent(&mut self, link: &Link<T, Self>, update: &SetUpdate<P>, out: &mut Outbox<T>) {
        match update {
            Update::BeginTransaction => out.begin(),
            Update::EndTransaction => out.end(),
            Update::Change(change) => {
                let mut result = SetChange::new();
                for parent in change.removed() {
                    self.detach(parent, &mut result, out);
                }
                for parent in change.inserted() {
                    if !self.fields.contains_key(parent) {
                        self.attach(link, parent, &mut result);
                    }
                }
                out.change(result);
            }
        }
    }

    fn apply_field(&mut self, parent: &P, update: &ArrayUpdate<T>, out: &mut Outbox<T>) {
        let Some(field) = self.fields.get_mut(parent) else {
            return;
        };
        match update {
            Update::BeginTransaction => {
                field.open_transactions += 1;
                out.begin();
            }
            Update::EndTransaction => {
                if field.open_transactions > 0 {
                    field.open_transactions -= 1;
                    out.end();
                }
            }
            Update::Change(change) => {
                let mut result = SetChange::new();
                for modification in &change.modifications {
                    if let Some(old) = modification.old_element() {
                        if self.members.remove(old) {
                            result.remove(old.clone());
                        }
                    }
                    if let Some(new) = modification.new_element() {
                        if self.members.insert(new.clone()) {
                            result.insert(new.clone());
                        }
                    }
                }
                change.apply_to(&mut field.mirror);
                out.change(result);
            }
        }
    }
}

impl<P: SetElement, T: SetElement> SetEngine<T> for FlatMapEngine<P, T> {
    const KIND: &'static str = "flat_map";

    fn activate(&mut self, link: &Link<T, Self>) {
        let mut initial = SetChange::new();
        for parent in self.parent.value() {
            self.attach(link, &parent, &mut initial);
        }
        self.parent_connection = Some(self.parent.subscribe(link.sink(
            |engine: &mut Self, link, update: &SetUpdate<P>, out| {
                engine.apply_parent(link, update, out);
            },
        )));
    }

    fn deactivate(&mut self) {
        if let Some(mut connection) = self.parent_connection.take() {
            connection.disconnect();
        }
        for (_, mut field) in self.fields.drain() {
            field.connection.disconnect();
        }
        self.members.clear();
    }

    fn compute(&self) -> HashSet<T> {
        self.parent
            .value()
            .iter()
            .flat_map(|parent| (self.field)(parent).value())
            .collect()
    }

    fn cached(&self) -> HashSet<T> {
        self.members.to_set()
    }

    fn subscription_count(&self) -> usize {
        usize::from(self.parent_connection.is_some()) + self.fields.len()
    }

    fn compute_contains(&self, element: &T) -> bool {
        self.parent
            .value()
            .iter()
            .any(|parent| (self.field)(parent).value().contains(element))
    }

    fn cached_count(&self) -> usize {
        self.members.len()
    }

    fn cached_contains(&self, element: &T) -> bool {
        self.members.contains(element)
    }
}
