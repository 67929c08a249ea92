use std::any::Any;
use std::cmp::Ordering;
use std::sync::{Arc, Weak};

use lineup_core::{EventKind, Property};
use serde_json::{Map, Value, json};

use super::{Column, ColumnBase, ColumnDesc, emit_value_change, read_extra, write_extra};
use crate::group::{DEFAULT_COLOR, Group};
use crate::row::DataRow;

/// A true/false column with an optional required-value filter.
pub struct BooleanColumn {
    base: ColumnBase,
    filter: Property<Option<bool>>,
}

impl BooleanColumn {
    pub fn create(id: impl Into<String>, desc: Arc<ColumnDesc>) -> Arc<Self> {
        let id = id.into();
        Arc::new_cyclic(|me: &Weak<Self>| {
            let me: Weak<dyn Column> = me.clone();
            Self {
                base: ColumnBase::new(id, desc, me),
                filter: Property::new(None),
            }
        })
    }

    /// The value of `row`. Strings `"true"`/`"false"` and numbers are
    /// accepted; anything else is missing.
    pub fn flag(&self, row: &DataRow) -> Option<bool> {
        match self.base.raw_value(row)? {
            Value::Bool(b) => Some(b),
            Value::Number(n) => n.as_f64().map(|v| v != 0.0),
            Value::String(s) => match s.trim().to_lowercase().as_str() {
                "true" | "yes" | "1" | "x" => Some(true),
                "false" | "no" | "0" | "" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn filter_state(&self) -> Option<bool> {
        self.filter.get()
    }

    pub fn set_filter(&self, filter: Option<bool>) {
        if let Some(previous) = self.filter.replace(filter) {
            emit_value_change(&self.base, EventKind::FilterChanged, json!(previous), json!(filter));
        }
    }
}

impl Column for BooleanColumn {
    fn base(&self) -> &ColumnBase {
        &self.base
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn value(&self, row: &DataRow) -> Value {
        self.flag(row).map_or(Value::Null, Value::Bool)
    }

    fn compare(&self, a: &DataRow, b: &DataRow) -> Ordering {
        self.flag(a).cmp(&self.flag(b))
    }

    fn group(&self, row: &DataRow) -> Group {
        match self.flag(row) {
            Some(b) => Group::new(b.to_string(), DEFAULT_COLOR),
            None => Group::missing(),
        }
    }

    fn default_sort_ascending(&self) -> bool {
        false
    }

    fn is_filtered(&self) -> bool {
        self.filter.get().is_some()
    }

    fn filter(&self, row: &DataRow) -> bool {
        match self.filter.get() {
            None => true,
            Some(required) => self.flag(row) == Some(required),
        }
    }

    fn dump_extra(&self, extra: &mut Map<String, Value>) {
        if let Some(filter) = self.filter.get() {
            write_extra(extra, "filter", &filter);
        }
    }

    fn restore_extra(&self, extra: &Map<String, Value>) {
        self.filter.set_silent(read_extra(extra, "filter"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::to_rows;

    #[test]
    fn test_flags_and_filter() {
        let col = BooleanColumn::create("b", Arc::new(ColumnDesc::data("boolean", "ok")));
        let rows = to_rows(vec![
            json!({"ok": true}),
            json!({"ok": "no"}),
            json!({"ok": 1}),
            json!({}),
        ]);
        assert_eq!(col.flag(&rows[1]), Some(false));
        assert_eq!(col.flag(&rows[2]), Some(true));
        assert_eq!(col.compare(&rows[1], &rows[0]), Ordering::Less);
        assert_eq!(col.group(&rows[3]).name, "Missing values");

        col.set_filter(Some(true));
        let passing: Vec<usize> = rows.iter().filter(|r| col.filter(r)).map(|r| r.index).collect();
        assert_eq!(passing, vec![0, 2]);
    }
}
