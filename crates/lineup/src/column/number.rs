use std::any::Any;
use std::cmp::Ordering;
use std::sync::{Arc, Weak};

use lineup_core::{EventKind, Property};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use super::strategy::{self, SortMethod};
use super::{
    Column, ColumnBase, ColumnDesc, NumberValued, emit_value_change, read_extra, value_to_number,
    write_extra,
};
use crate::group::{DEFAULT_COLOR, Group, GroupData};
use crate::mapping::{MappingDump, MappingFunction};
use crate::row::DataRow;

/// Range filter on raw values. Open bounds are `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NumberFilter {
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default)]
    pub filter_missing: bool,
}

impl NumberFilter {
    pub fn range(min: f64, max: f64) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
            filter_missing: false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.min.is_some() || self.max.is_some() || self.filter_missing
    }

    pub fn accepts(&self, value: f64) -> bool {
        if value.is_nan() {
            return !self.filter_missing;
        }
        self.min.is_none_or(|min| value >= min) && self.max.is_none_or(|max| value <= max)
    }
}

/// A numeric data column with a mapping function, a range filter and
/// optional grouping thresholds.
pub struct NumberColumn {
    base: ColumnBase,
    mapping: Property<MappingFunction>,
    filter: Property<NumberFilter>,
    sort_method: Property<SortMethod>,
    thresholds: Property<Vec<f64>>,
}

impl NumberColumn {
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
                filter: Property::default(),
                sort_method: Property::default(),
                thresholds: Property::default(),
            }
        })
    }

    /// A copy of the current mapping function.
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

    pub fn filter_state(&self) -> NumberFilter {
        self.filter.get()
    }

    pub fn set_filter(&self, filter: NumberFilter) {
        if let Some(previous) = self.filter.replace(filter) {
            emit_value_change(
                &self.base,
                EventKind::FilterChanged,
                json!(previous),
                json!(filter),
            );
        }
    }

    pub fn group_thresholds(&self) -> Vec<f64> {
        self.thresholds.get()
    }

    /// Group rows into bins split at `thresholds`. No thresholds means no
    /// grouping.
    pub fn set_group_thresholds(&self, mut thresholds: Vec<f64>) {
        thresholds.retain(|t| !t.is_nan());
        thresholds.sort_by(f64::total_cmp);
        if let Some(previous) = self.thresholds.replace(thresholds.clone()) {
            emit_value_change(
                &self.base,
                EventKind::GroupingChanged,
                json!(previous),
                json!(thresholds),
            );
        }
    }
}

fn mapping_json(mapping: &MappingFunction) -> Value {
    serde_json::to_value(mapping.dump()).unwrap_or(Value::Null)
}

/// Name of the threshold bin `value` falls into.
fn bin_name(thresholds: &[f64], value: f64) -> String {
    match thresholds.iter().position(|&t| value <= t) {
        Some(0) => format!("≤ {}", thresholds[0]),
        Some(i) => format!("{} - {}", thresholds[i - 1], thresholds[i]),
        None => format!("> {}", thresholds[thresholds.len() - 1]),
    }
}

impl NumberValued for NumberColumn {
    fn number(&self, row: &DataRow) -> f64 {
        self.mapping.with(|m| m.apply(self.raw_number(row)))
    }

    fn raw_number(&self, row: &DataRow) -> f64 {
        self.base
            .raw_value(row)
            .map_or(f64::NAN, |v| value_to_number(&v))
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

impl Column for NumberColumn {
    fn base(&self) -> &ColumnBase {
        &self.base
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn value(&self, row: &DataRow) -> Value {
        let v = self.raw_number(row);
        if v.is_nan() { Value::Null } else { json!(v) }
    }

    fn label_of(&self, row: &DataRow) -> String {
        let v = self.raw_number(row);
        if v.is_nan() { String::new() } else { v.to_string() }
    }

    fn compare(&self, a: &DataRow, b: &DataRow) -> Ordering {
        strategy::number_compare(self, a, b)
    }

    fn group(&self, row: &DataRow) -> Group {
        let thresholds = self.thresholds.get();
        if thresholds.is_empty() {
            return Group::default_group();
        }
        let v = self.raw_number(row);
        if v.is_nan() {
            return Group::missing();
        }
        Group::new(bin_name(&thresholds, v), DEFAULT_COLOR)
    }

    fn group_compare(&self, a: &GroupData, b: &GroupData) -> Ordering {
        strategy::number_group_compare(self, a, b)
    }

    fn default_sort_ascending(&self) -> bool {
        false
    }

    fn is_filtered(&self) -> bool {
        self.filter.with(NumberFilter::is_active)
    }

    fn filter(&self, row: &DataRow) -> bool {
        let filter = self.filter.get();
        !filter.is_active() || filter.accepts(self.raw_number(row))
    }

    fn as_number(&self) -> Option<&dyn NumberValued> {
        Some(self)
    }

    fn dump_extra(&self, extra: &mut Map<String, Value>) {
        write_extra(extra, "map", &self.mapping.with(MappingFunction::dump));
        let filter = self.filter.get();
        if filter.is_active() {
            write_extra(extra, "filter", &filter);
        }
        write_extra(extra, "sortMethod", &self.sort_method.get());
        let thresholds = self.thresholds.get();
        if !thresholds.is_empty() {
            write_extra(extra, "groupThresholds", &thresholds);
        }
    }

    fn restore_extra(&self, extra: &Map<String, Value>) {
        if let Some(map) = read_extra::<MappingDump>(extra, "map") {
            self.mapping.set_silent(MappingFunction::restore(&map));
        }
        if let Some(filter) = read_extra::<NumberFilter>(extra, "filter") {
            self.filter.set_silent(filter);
        }
        if let Some(method) = read_extra::<SortMethod>(extra, "sortMethod") {
            self.sort_method.set_silent(method);
        }
        if let Some(thresholds) = read_extra::<Vec<f64>>(extra, "groupThresholds") {
            self.thresholds.set_silent(thresholds);
        }
    }

    fn debug_properties(&self) -> Vec<(String, String)> {
        let mut props = vec![(
            "domain".to_string(),
            format!("{:?}", self.mapping.with(MappingFunction::domain)),
        )];
        if self.is_filtered() {
            props.push(("filter".to_string(), format!("{:?}", self.filter.get())));
        }
        props
    }
}
