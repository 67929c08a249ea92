use std::any::Any;
use std::cmp::Ordering;
use std::sync::{Arc, Weak};

use lineup_core::{EventKind, Property};
use serde_json::{Map, Value};

use super::{CompositeBase, CompositeColumn, NumberSettings};
use crate::column::strategy::{self, SortMethod};
use crate::column::{
    Column, ColumnBase, ColumnDesc, ColumnRef, DEFAULT_WIDTH, NumberValued, read_extra, same_column,
    write_extra,
};
use crate::events::EventPayload;
use crate::group::{Group, GroupData};
use crate::row::DataRow;

/// Width of a collapsed stack.
pub const COLLAPSED_WIDTH: f64 = 20.0;

/// Weighted sum of numeric children.
///
/// A child's weight is its share of the stack's width, so the child widths
/// always add up to the stack width. Resizing one child rescales the others
/// to keep the total; resizing the stack rescales every child.
pub struct StackColumn {
    base: ColumnBase,
    composite: CompositeBase,
    number: NumberSettings,
    collapsed: Property<bool>,
}

impl StackColumn {
    pub fn create(id: impl Into<String>, desc: Arc<ColumnDesc>) -> Arc<Self> {
        let id = id.into();
        Arc::new_cyclic(|me: &Weak<Self>| {
            let me: Weak<dyn Column> = me.clone();
            Self {
                base: ColumnBase::new(id, desc, me),
                composite: CompositeBase::new(),
                number: NumberSettings::new(),
                collapsed: Property::new(false),
            }
        })
    }

    /// Insert `col` at `index`. With a `weight` in `(0, 1)` the child is
    /// resized to take that share of the grown stack.
    pub fn insert_weighted(&self, col: ColumnRef, index: usize, weight: Option<f64>) -> Option<ColumnRef> {
        if col.as_number().is_none() {
            return None;
        }
        let child_width = weight
            .filter(|w| *w > 0.0 && *w < 1.0)
            .map_or_else(|| col.width(), |w| w / (1.0 - w) * self.base.width());
        let width = if self.composite.is_empty() {
            child_width
        } else {
            self.base.width() + child_width
        };
        let child = Arc::downgrade(&col);
        let me = self.base.me.clone();
        let listener = col.events().subscribe(&[EventKind::WidthChanged], move |ctx| {
            if !ctx.is_local() {
                return;
            }
            let EventPayload::Width { previous, current } = &*ctx.payload else {
                return;
            };
            if let (Some(me), Some(child)) = (me.upgrade(), child.upgrade())
                && let Some(stack) = me.downcast_ref::<StackColumn>()
            {
                stack.adapt_width_change(&child, *previous, *current);
            }
        });
        // widths only change once the child is in
        let col = self.composite.insert_entry(&self.base, col, index, vec![listener])?;
        col.base().set_width_silent(child_width);
        self.base.apply_width(width);
        Some(col)
    }

    /// Child widths as fractions of the stack width.
    pub fn weights(&self) -> Vec<f64> {
        let width = self.base.width();
        self.composite
            .children()
            .iter()
            .map(|c| if width > 0.0 { c.width() / width } else { 0.0 })
            .collect()
    }

    /// Distribute the stack width by `weights`. Weights are normalized;
    /// missing trailing weights share the remainder to 1 (or to 100 when
    /// given as percentages) evenly.
    pub fn set_weights(&self, weights: &[f64]) {
        let children = self.composite.children();
        if children.is_empty() {
            return;
        }
        let previous = self.weights();
        let mut weights = weights.to_vec();
        let missing = children.len().saturating_sub(weights.len());
        if missing > 0 {
            let sum: f64 = weights.iter().sum();
            let total = if sum <= 1.0 { 1.0 } else { 100.0 };
            let fill = ((total - sum) / missing as f64).max(0.0);
            weights.extend(std::iter::repeat_n(fill, missing));
        }
        weights.truncate(children.len());
        let sum: f64 = weights.iter().sum();
        if sum <= 0.0 {
            return;
        }
        let width = self.base.width();
        for (child, weight) in children.iter().zip(&weights) {
            child.base().set_width_silent(weight / sum * width);
        }
        self.emit_weights(previous);
    }

    fn emit_weights(&self, previous: Vec<f64>) {
        self.base.events().emit(
            &[
                EventKind::WeightsChanged,
                EventKind::DirtyHeader,
                EventKind::DirtyValues,
                EventKind::Dirty,
            ],
            EventPayload::Weights {
                previous,
                current: self.weights(),
            },
        );
    }

    /// Rescale the siblings of `child` after it went from `previous` to
    /// `current` width.
    fn adapt_width_change(&self, child: &ColumnRef, previous: f64, current: f64) {
        let full = self.base.width();
        if full <= 0.0 {
            return;
        }
        let before = self.weights();
        let change = (current - previous) / full;
        let old_weight = previous / full;
        let factor = (1.0 - old_weight - change) / (1.0 - old_weight);
        let mut total = 0.0;
        for c in self.composite.children() {
            if same_column(&c, child) {
                total += current;
                continue;
            }
            let guess = c.width() * factor;
            let width = if guess.is_nan() || guess < 1.0 { 0.0 } else { guess };
            c.base().set_width_silent(width);
            total += width;
        }
        self.base.apply_width(total);
        self.emit_weights(before);
    }

    /// The weighted sum of `row`, NaN when every child is missing.
    pub fn compute(&self, row: &DataRow) -> f64 {
        let width = self.base.width();
        if width <= 0.0 {
            return f64::NAN;
        }
        let mut sum = 0.0;
        let mut any = false;
        for child in self.composite.children() {
            let Some(number) = child.as_number() else {
                continue;
            };
            let v = number.number(row);
            if v.is_nan() {
                continue;
            }
            any = true;
            sum += v * child.width() / width;
        }
        if any { sum } else { f64::NAN }
    }

    pub fn is_collapsed(&self) -> bool {
        self.collapsed.get()
    }

    pub fn set_collapsed(&self, collapsed: bool) {
        if let Some(previous) = self.collapsed.replace(collapsed) {
            self.base.events().emit(
                &[
                    EventKind::CollapseChanged,
                    EventKind::DirtyHeader,
                    EventKind::DirtyValues,
                    EventKind::Dirty,
                ],
                EventPayload::Flag {
                    previous,
                    current: collapsed,
                },
            );
        }
    }

    /// The width used for layout; weights are kept while collapsed.
    pub fn effective_width(&self) -> f64 {
        if self.is_collapsed() {
            COLLAPSED_WIDTH
        } else {
            self.base.width()
        }
    }

    pub fn missing_value(&self) -> f64 {
        self.number.missing_value()
    }

    pub fn set_missing_value(&self, value: f64) {
        self.number.set_missing_value(&self.base, value);
    }
}

impl NumberValued for StackColumn {
    fn number(&self, row: &DataRow) -> f64 {
        self.number.substitute(self.compute(row))
    }

    fn raw_number(&self, row: &DataRow) -> f64 {
        self.number(row)
    }

    fn sort_method(&self) -> SortMethod {
        self.number.sort_method()
    }

    fn set_sort_method(&self, method: SortMethod) {
        self.number.set_sort_method(&self.base, method);
    }
}

impl Column for StackColumn {
    fn base(&self) -> &ColumnBase {
        &self.base
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn value(&self, row: &DataRow) -> Value {
        let v = self.number(row);
        if v.is_nan() { Value::Null } else { v.into() }
    }

    fn compare(&self, a: &DataRow, b: &DataRow) -> Ordering {
        strategy::number_compare(self, a, b)
    }

    fn group_compare(&self, a: &GroupData, b: &GroupData) -> Ordering {
        strategy::number_group_compare(self, a, b)
    }

    fn group(&self, _row: &DataRow) -> Group {
        Group::default_group()
    }

    fn default_sort_ascending(&self) -> bool {
        false
    }

    fn is_filtered(&self) -> bool {
        self.composite.is_filtered()
    }

    fn filter(&self, row: &DataRow) -> bool {
        self.composite.filter(row)
    }

    fn as_number(&self) -> Option<&dyn NumberValued> {
        Some(self)
    }

    fn as_composite(&self) -> Option<&dyn CompositeColumn> {
        Some(self)
    }

    /// Resizing the stack rescales every child by the same factor.
    fn set_width(&self, width: f64) {
        let current = self.base.width();
        if current > 0.0 {
            let factor = width / current;
            for child in self.composite.children() {
                child.base().set_width_silent(child.width() * factor);
            }
        }
        self.base.apply_width(width);
    }

    fn dump_extra(&self, extra: &mut Map<String, Value>) {
        self.number.dump_into(extra);
        if self.is_collapsed() {
            write_extra(extra, "collapsed", &true);
        }
    }

    fn restore_extra(&self, extra: &Map<String, Value>) {
        self.number.restore_from(extra);
        self.collapsed
            .set_silent(read_extra(extra, "collapsed").unwrap_or(false));
    }

    fn debug_properties(&self) -> Vec<(String, String)> {
        let weights = self
            .weights()
            .iter()
            .map(|w| format!("{w:.2}"))
            .collect::<Vec<_>>()
            .join(", ");
        vec![("weights".to_string(), format!("[{weights}]"))]
    }
}

impl CompositeColumn for StackColumn {
    fn composite(&self) -> &CompositeBase {
        &self.composite
    }

    fn can_insert(&self, col: &ColumnRef) -> bool {
        col.as_number().is_some()
    }

    fn insert(&self, col: ColumnRef, index: usize) -> Option<ColumnRef> {
        self.insert_weighted(col, index, None)
    }

    fn remove(&self, col: &ColumnRef) -> bool {
        if self.composite.remove_entry(&self.base, col).is_none() {
            return false;
        }
        let width = if self.composite.is_empty() {
            DEFAULT_WIDTH
        } else {
            self.base.width() - col.width()
        };
        self.base.apply_width(width);
        true
    }
}
