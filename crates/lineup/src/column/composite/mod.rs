//! Columns that own and combine child columns.
//!
//! A composite keeps its children in a [`CompositeBase`], forwards their
//! dirty and filter events and announces membership changes with
//! `addColumn`/`removeColumn`/`moveColumn`. Kinds:
//!
//! - [`StackColumn`]: weighted sum with the width cascade
//! - [`ReduceColumn`]: min/max/mean/median/quantile of the children
//! - [`NestedColumn`]: lexicographic comparison across children
//! - [`ImpositionColumn`]: a numeric child colored by a categorical one

mod imposition;
mod nested;
mod reduce;
mod stack;

use std::sync::Arc;

use lineup_core::{EventKind, Property, Subscription};
use parking_lot::RwLock;
use serde_json::{Map, Value};

use super::strategy::SortMethod;
use super::{ChildEntry, Column, ColumnBase, ColumnParent, ColumnRef, read_extra, same_column, write_extra};
use crate::events::EventPayload;
use crate::row::DataRow;

pub use imposition::ImpositionColumn;
pub use nested::NestedColumn;
pub use reduce::ReduceColumn;
pub use stack::StackColumn;

/// Child events re-emitted by the composite.
const FORWARDED: [EventKind; 5] = [
    EventKind::DirtyHeader,
    EventKind::DirtyValues,
    EventKind::DirtyCaches,
    EventKind::Dirty,
    EventKind::FilterChanged,
];

const MEMBERSHIP: [EventKind; 4] = [
    EventKind::DirtyHeader,
    EventKind::DirtyValues,
    EventKind::DirtyCaches,
    EventKind::Dirty,
];

/// Ordered children of a composite column.
#[derive(Default)]
pub struct CompositeBase {
    children: RwLock<Vec<ChildEntry>>,
}

impl CompositeBase {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh copy of the children.
    pub fn children(&self) -> Vec<ColumnRef> {
        self.children.read().iter().map(|e| e.column.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.children.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.read().is_empty()
    }

    pub fn at(&self, index: usize) -> Option<ColumnRef> {
        self.children.read().get(index).map(|e| e.column.clone())
    }

    pub fn index_of(&self, col: &ColumnRef) -> Option<usize> {
        self.children
            .read()
            .iter()
            .position(|e| same_column(&e.column, col))
    }

    /// Whether any child is filtered.
    pub fn is_filtered(&self) -> bool {
        self.children().iter().any(|c| c.is_filtered())
    }

    /// Whether `row` passes every child's filter.
    pub fn filter(&self, row: &DataRow) -> bool {
        self.children().iter().all(|c| c.filter(row))
    }

    /// Whether inserting `col` under `owner` would create a cycle.
    pub(crate) fn would_cycle(owner: &ColumnBase, col: &ColumnRef) -> bool {
        let owner_ptr = owner.me.as_ptr();
        col.flatten()
            .iter()
            .any(|c| std::ptr::addr_eq(Arc::as_ptr(c), owner_ptr))
    }

    /// Attach `col` at `index` (clamped), detaching it from any previous
    /// parent. `extra` subscriptions live as long as the child stays.
    pub(crate) fn insert_entry(
        &self,
        owner: &ColumnBase,
        col: ColumnRef,
        index: usize,
        extra: Vec<Subscription>,
    ) -> Option<ColumnRef> {
        if Self::would_cycle(owner, &col) {
            tracing::warn!(target: lineup_core::logging::targets::COLUMN, parent = %owner.id(), child = %col.id(), "refusing to insert a column into itself");
            return None;
        }
        if !matches!(col.base().parent(), ColumnParent::None) {
            col.base().remove_me();
        }
        let mut subscriptions = vec![owner.events().forward(col.events(), &FORWARDED)];
        subscriptions.extend(extra);
        col.base().attach(ColumnParent::Composite(owner.me.clone()));
        let index = {
            let mut children = self.children.write();
            let index = index.min(children.len());
            children.insert(index, ChildEntry::new(col.clone(), subscriptions));
            index
        };
        tracing::trace!(target: lineup_core::logging::targets::COLUMN, parent = %owner.id(), child = %col.id(), index, "child added");
        owner.events().emit(
            &with_primary(EventKind::AddColumn),
            EventPayload::Child {
                column: col.clone(),
                index,
                previous_index: None,
            },
        );
        Some(col)
    }

    pub(crate) fn remove_entry(&self, owner: &ColumnBase, col: &ColumnRef) -> Option<usize> {
        let (index, entry) = {
            let mut children = self.children.write();
            let index = children.iter().position(|e| same_column(&e.column, col))?;
            (index, children.remove(index))
        };
        drop(entry);
        col.base().detach();
        owner.events().emit(
            &with_primary(EventKind::RemoveColumn),
            EventPayload::Child {
                column: col.clone(),
                index,
                previous_index: None,
            },
        );
        Some(index)
    }

    /// Move `col` to `index`, counted before its removal.
    pub(crate) fn move_entry(&self, owner: &ColumnBase, col: &ColumnRef, index: usize) -> Option<ColumnRef> {
        let (previous, current) = {
            let mut children = self.children.write();
            let previous = children.iter().position(|e| same_column(&e.column, col))?;
            let target = if previous < index { index - 1 } else { index };
            let target = target.min(children.len() - 1);
            if target == previous {
                return Some(col.clone());
            }
            let entry = children.remove(previous);
            children.insert(target, entry);
            (previous, target)
        };
        owner.events().emit(
            &with_primary(EventKind::MoveColumn),
            EventPayload::Child {
                column: col.clone(),
                index: current,
                previous_index: Some(previous),
            },
        );
        Some(col.clone())
    }
}

fn with_primary(primary: EventKind) -> [EventKind; 5] {
    [
        primary,
        MEMBERSHIP[0],
        MEMBERSHIP[1],
        MEMBERSHIP[2],
        MEMBERSHIP[3],
    ]
}

/// A column owning child columns.
pub trait CompositeColumn: Column {
    fn composite(&self) -> &CompositeBase;

    /// Whether `col` may become a child.
    fn can_insert(&self, _col: &ColumnRef) -> bool {
        true
    }

    /// Insert `col` at `index`. Returns `None` when the child is rejected.
    fn insert(&self, col: ColumnRef, index: usize) -> Option<ColumnRef> {
        if !self.can_insert(&col) {
            return None;
        }
        self.composite().insert_entry(self.base(), col, index, Vec::new())
    }

    fn push(&self, col: ColumnRef) -> Option<ColumnRef> {
        let len = self.composite().len();
        self.insert(col, len)
    }

    fn insert_after(&self, col: ColumnRef, reference: &ColumnRef) -> Option<ColumnRef> {
        let index = self.composite().index_of(reference)?;
        self.insert(col, index + 1)
    }

    fn move_child(&self, col: &ColumnRef, index: usize) -> Option<ColumnRef> {
        self.composite().move_entry(self.base(), col, index)
    }

    fn remove(&self, col: &ColumnRef) -> bool {
        self.composite().remove_entry(self.base(), col).is_some()
    }

    fn children(&self) -> Vec<ColumnRef> {
        self.composite().children()
    }

    fn len(&self) -> usize {
        self.composite().len()
    }

    fn is_empty(&self) -> bool {
        self.composite().is_empty()
    }

    fn at(&self, index: usize) -> Option<ColumnRef> {
        self.composite().at(index)
    }

    fn index_of(&self, col: &ColumnRef) -> Option<usize> {
        self.composite().index_of(col)
    }
}

/// Settings shared by composites producing a number.
pub(crate) struct NumberSettings {
    missing_value: Property<f64>,
    sort_method: Property<SortMethod>,
}

impl NumberSettings {
    pub fn new() -> Self {
        Self {
            missing_value: Property::new(0.0),
            sort_method: Property::default(),
        }
    }

    pub fn missing_value(&self) -> f64 {
        self.missing_value.get()
    }

    pub fn set_missing_value(&self, base: &ColumnBase, value: f64) {
        if let Some(previous) = self.missing_value.replace(value) {
            base.events().emit(
                &[EventKind::DirtyValues, EventKind::Dirty],
                EventPayload::Value {
                    previous: previous.into(),
                    current: value.into(),
                },
            );
        }
    }

    /// `value`, or the missing value when it is NaN.
    pub fn substitute(&self, value: f64) -> f64 {
        if value.is_nan() { self.missing_value() } else { value }
    }

    pub fn sort_method(&self) -> SortMethod {
        self.sort_method.get()
    }

    pub fn set_sort_method(&self, base: &ColumnBase, method: SortMethod) {
        if let Some(previous) = self.sort_method.replace(method) {
            super::emit_value_change(
                base,
                EventKind::SortMethodChanged,
                Value::String(previous.as_str().to_string()),
                Value::String(method.as_str().to_string()),
            );
        }
    }

    pub fn dump_into(&self, extra: &mut Map<String, Value>) {
        write_extra(extra, "missingValue", &self.missing_value());
        write_extra(extra, "sortMethod", &self.sort_method());
    }

    pub fn restore_from(&self, extra: &Map<String, Value>) {
        if let Some(v) = read_extra::<f64>(extra, "missingValue") {
            self.missing_value.set_silent(v);
        }
        if let Some(m) = read_extra::<SortMethod>(extra, "sortMethod") {
            self.sort_method.set_silent(m);
        }
    }
}
