use std::any::Any;
use std::cmp::Ordering;
use std::sync::{Arc, Weak};

use lineup_core::{EventKind, Property};
use serde_json::{Map, Value, json};

use super::strategy::{self, BoxPlotData, SortMethod};
use super::{
    Column, ColumnBase, ColumnDesc, NumberValued, emit_value_change, read_extra, value_to_number,
    write_extra,
};
use crate::group::GroupData;
use crate::mapping::{MappingDump, MappingFunction};
use crate::row::DataRow;

/// A column holding a distribution per row.
///
/// A row value is either a ready summary object
/// (`{"min", "q1", "median", "q3", "max"}`, optional `"mean"`) or a list of
/// numbers summarized on access. The sort method picks the statistic rows
/// are compared and mapped by.
pub struct BoxPlotColumn {
    base: ColumnBase,
    mapping: Property<MappingFunction>,
    sort_method: Property<SortMethod>,
}

impl BoxPlotColumn {
    pub fn create(id: impl Into<String>, desc: Arc<ColumnDesc>) -> Arc<Self> {
        let mapping = MappingFunction::from_desc(
            desc.map.as_ref(),
            desc.domain.as_deref(),
            desc.range.as_deref(),
        );
        let id = id.into();
        Arc::new_cyclic(|me: &Weak<Self>| {
            let me: Weak<dyn Column> = me.clone();
            Self {
                base: ColumnBase::new(id, desc, me),
                mapping: Property::new(mapping),
                sort_method: Property::default(),
            }
        })
    }

    /// The summary of `row`, `None` when missing or malformed.
    pub fn box_plot(&self, row: &DataRow) -> Option<BoxPlotData> {
        match self.base.raw_value(row)? {
            Value::Array(items) => BoxPlotData::from_values(items.iter().map(value_to_number)),
            value @ Value::Object(_) => serde_json::from_value(value).ok(),
            _ => None,
        }
    }

    pub fn mapping(&self) -> MappingFunction {
        self.mapping.get()
    }

    pub fn set_mapping(&self, mapping: MappingFunction) {
        let previous = self.mapping.get();
        if previous.approx_eq(&mapping) {
            return;
        }
        self.mapping.set_silent(mapping.clone());
        emit_value_change(
            &self.base,
            EventKind::MappingChanged,
            mapping_json(&previous),
            mapping_json(&mapping),
        );
    }
}

fn mapping_json(mapping: &MappingFunction) -> Value {
    serde_json::to_value(mapping.dump()).unwrap_or(Value::Null)
}

impl NumberValued for BoxPlotColumn {
    fn number(&self, row: &DataRow) -> f64 {
        self.mapping.with(|m| m.apply(self.raw_number(row)))
    }

    fn raw_number(&self, row: &DataRow) -> f64 {
        let method = self.sort_method.get();
        self.box_plot(row).map_or(f64::NAN, |b| b.statistic(method))
    }

    fn sort_method(&self) -> SortMethod {
        self.sort_method.get()
    }

    fn set_sort_method(&self, method: SortMethod) {
        if let Some(previous) = self.sort_method.replace(method) {
            emit_value_change(
                &self.base,
                EventKind::SortMethodChanged,
                json!(previous),
                json!(method),
            );
        }
    }
}

impl Column for BoxPlotColumn {
    fn base(&self) -> &ColumnBase {
        &self.base
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn value(&self, row: &DataRow) -> Value {
        self.box_plot(row).map_or(Value::Null, |b| json!(b))
    }

    fn label_of(&self, row: &DataRow) -> String {
        let v = self.raw_number(row);
        if v.is_nan() { String::new() } else { v.to_string() }
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

    fn as_number(&self) -> Option<&dyn NumberValued> {
        Some(self)
    }

    fn dump_extra(&self, extra: &mut Map<String, Value>) {
        write_extra(extra, "map", &self.mapping.with(MappingFunction::dump));
        write_extra(extra, "sortMethod", &self.sort_method.get());
    }

    fn restore_extra(&self, extra: &Map<String, Value>) {
        if let Some(map) = read_extra::<MappingDump>(extra, "map") {
            self.mapping.set_silent(MappingFunction::restore(&map));
        }
        if let Some(method) = read_extra::<SortMethod>(extra, "sortMethod") {
            self.sort_method.set_silent(method);
        }
    }

    fn debug_properties(&self) -> Vec<(String, String)> {
        vec![("sortMethod".to_string(), self.sort_method.get().as_str().to_string())]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::DescRef;
    use crate::row::to_rows;

    fn column() -> Arc<BoxPlotColumn> {
        BoxPlotColumn::create(
            "b",
            Arc::new(ColumnDesc::data("boxplot", "dist").with_domain([0.0, 10.0])),
        )
    }

    fn rows() -> Vec<DataRow> {
        to_rows(vec![
            json!({"dist": {"min": 0, "q1": 2, "median": 5, "q3": 7, "max": 9}}),
            json!({"dist": [1, 2, 3, 4, 8]}),
            json!({"dist": "n/a"}),
        ])
    }

    #[test]
    fn test_summary_from_object_and_list() {
        let col = column();
        let rows = rows();
        assert_eq!(col.box_plot(&rows[0]).map(|b| b.median), Some(5.0));
        assert_eq!(col.box_plot(&rows[1]).map(|b| (b.min, b.median, b.max)), Some((1.0, 3.0, 8.0)));
        assert!(col.box_plot(&rows[2]).is_none());
        assert_eq!(col.value(&rows[2]), Value::Null);
        assert_eq!(col.number(&rows[0]), 0.5);
    }

    #[test]
    fn test_sort_method_picks_statistic() {
        let col = column();
        let rows = rows();
        assert_eq!(col.compare(&rows[0], &rows[1]), Ordering::Greater);
        assert_eq!(col.compare(&rows[2], &rows[1]), Ordering::Less);

        let changes = Arc::new(parking_lot::Mutex::new(0));
        let sink = changes.clone();
        let _sub = col.base().events().subscribe(&[EventKind::SortMethodChanged], move |_| {
            *sink.lock() += 1;
        });
        col.set_sort_method(SortMethod::Min);
        col.set_sort_method(SortMethod::Min);
        assert_eq!(*changes.lock(), 1);
        assert_eq!(col.compare(&rows[0], &rows[1]), Ordering::Less);
        // the summary object carries no mean; it falls back to the median
        col.set_sort_method(SortMethod::Mean);
        assert_eq!(col.raw_number(&rows[0]), 5.0);
        assert!((col.raw_number(&rows[1]) - 3.6).abs() < 1e-9);
    }

    #[test]
    fn test_dump_restore() {
        let col = column();
        col.set_sort_method(SortMethod::Q3);
        col.set_mapping(MappingFunction::linear([0.0, 20.0]));
        let dump = col.dump(&DescRef::of);

        let other = column();
        other.restore_extra(&dump.extra);
        assert_eq!(other.sort_method(), SortMethod::Q3);
        assert_eq!(other.dump(&DescRef::of), dump);
    }
}
