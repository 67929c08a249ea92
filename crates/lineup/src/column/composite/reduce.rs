use std::any::Any;
use std::cmp::Ordering;
use std::sync::{Arc, Weak};

use lineup_core::{EventKind, Property};
use serde_json::{Map, Value};

use super::{CompositeBase, CompositeColumn, NumberSettings};
use crate::column::strategy::{self, SortMethod};
use crate::column::{
    Column, ColumnBase, ColumnDesc, ColumnRef, NumberValued, emit_value_change, read_extra,
    write_extra,
};
use crate::group::GroupData;
use crate::row::DataRow;

/// Combines its numeric children with one statistic.
///
/// The `min`, `max` and `mean` kinds have a fixed method; the `reduce`
/// kind lets the method change at runtime.
pub struct ReduceColumn {
    base: ColumnBase,
    composite: CompositeBase,
    number: NumberSettings,
    reduce: Property<SortMethod>,
    fixed: bool,
}

impl ReduceColumn {
    pub fn create(id: impl Into<String>, desc: Arc<ColumnDesc>) -> Arc<Self> {
        let (method, fixed) = match desc.kind.as_str() {
            "min" => (SortMethod::Min, true),
            "max" => (SortMethod::Max, true),
            "mean" => (SortMethod::Mean, true),
            _ => (SortMethod::Mean, false),
        };
        let id = id.into();
        Arc::new_cyclic(|me: &Weak<Self>| {
            let me: Weak<dyn Column> = me.clone();
            Self {
                base: ColumnBase::new(id, desc, me),
                composite: CompositeBase::new(),
                number: NumberSettings::new(),
                reduce: Property::new(method),
                fixed,
            }
        })
    }

    pub fn reduce(&self) -> SortMethod {
        self.reduce.get()
    }

    /// Change the statistic. Kinds with a fixed method refuse.
    pub fn set_reduce(&self, method: SortMethod) -> bool {
        if self.fixed {
            return false;
        }
        if let Some(previous) = self.reduce.replace(method) {
            emit_value_change(
                &self.base,
                EventKind::ReduceChanged,
                Value::String(previous.as_str().to_string()),
                Value::String(method.as_str().to_string()),
            );
        }
        true
    }

    /// The statistic over the children's numbers, NaN when all are missing.
    pub fn compute(&self, row: &DataRow) -> f64 {
        let children = self.composite.children();
        let values = children
            .iter()
            .filter_map(|c| c.as_number().map(|n| n.number(row)));
        strategy::statistic(values, self.reduce())
    }

    pub fn missing_value(&self) -> f64 {
        self.number.missing_value()
    }

    pub fn set_missing_value(&self, value: f64) {
        self.number.set_missing_value(&self.base, value);
    }
}

impl NumberValued for ReduceColumn {
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

impl Column for ReduceColumn {
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

    fn dump_extra(&self, extra: &mut Map<String, Value>) {
        self.number.dump_into(extra);
        if !self.fixed {
            write_extra(extra, "reduce", &self.reduce());
        }
    }

    fn restore_extra(&self, extra: &Map<String, Value>) {
        self.number.restore_from(extra);
        if !self.fixed
            && let Some(method) = read_extra::<SortMethod>(extra, "reduce")
        {
            self.reduce.set_silent(method);
        }
    }

    fn debug_properties(&self) -> Vec<(String, String)> {
        vec![("reduce".to_string(), self.reduce().as_str().to_string())]
    }
}

impl CompositeColumn for ReduceColumn {
    fn composite(&self) -> &CompositeBase {
        &self.composite
    }

    fn can_insert(&self, col: &ColumnRef) -> bool {
        col.as_number().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::NumberColumn;
    use crate::row::to_rows;
    use serde_json::json;

    fn reduce(kind: &str) -> Arc<ReduceColumn> {
        let col = ReduceColumn::create(kind, Arc::new(ColumnDesc::new(kind, kind)));
        for field in ["x", "y", "z"] {
            col.push(NumberColumn::create(
                field,
                Arc::new(ColumnDesc::data("number", field).with_domain([0.0, 10.0])),
            ));
        }
        col
    }

    #[test]
    fn test_fixed_kinds() {
        let rows = to_rows(vec![json!({"x": 2, "y": 8, "z": 5}), json!({"x": 4})]);
        let min = reduce("min");
        let max = reduce("max");
        let mean = reduce("mean");
        assert!((min.number(&rows[0]) - 0.2).abs() < 1e-9);
        assert!((max.number(&rows[0]) - 0.8).abs() < 1e-9);
        assert!((mean.number(&rows[0]) - 0.5).abs() < 1e-9);
        assert!((mean.number(&rows[1]) - 0.4).abs() < 1e-9);
        assert!(!min.set_reduce(SortMethod::Max));
        assert_eq!(min.reduce(), SortMethod::Min);
    }

    #[test]
    fn test_configurable_reduce() {
        let col = reduce("reduce");
        let rows = to_rows(vec![json!({"x": 2, "y": 8, "z": 5})]);
        assert!(col.set_reduce(SortMethod::Median));
        assert!((col.number(&rows[0]) - 0.5).abs() < 1e-9);

        let mut extra = Map::new();
        col.dump_extra(&mut extra);
        assert_eq!(extra.get("reduce"), Some(&json!("median")));

        let other = ReduceColumn::create("r2", Arc::new(ColumnDesc::new("reduce", "R")));
        other.restore_extra(&extra);
        assert_eq!(other.reduce(), SortMethod::Median);
    }

    #[test]
    fn test_missing_everywhere() {
        let col = reduce("max");
        let rows = to_rows(vec![json!({})]);
        assert!(col.compute(&rows[0]).is_nan());
        assert_eq!(col.value(&rows[0]), json!(0.0));
    }
}
