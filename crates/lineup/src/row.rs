//! Data rows as handed to columns.

use std::sync::Arc;

use serde_json::Value;

/// One row of the dataset: its index plus the raw record.
///
/// The record is shared, so cloning a row is cheap.
#[derive(Debug, Clone, PartialEq)]
pub struct DataRow {
    /// Position of the row in the dataset.
    pub index: usize,
    /// The raw record, usually a JSON object.
    pub value: Arc<Value>,
}

impl DataRow {
    /// Create a row.
    pub fn new(index: usize, value: Value) -> Self {
        Self {
            index,
            value: Arc::new(value),
        }
    }

    /// Look up a field of an object record. Dotted paths descend into
    /// nested objects, e.g. `"stats.mean"`.
    pub fn field(&self, path: &str) -> Option<&Value> {
        if let Some(v) = self.value.get(path) {
            return Some(v);
        }
        let mut current = self.value.as_ref();
        for part in path.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }
}

/// Wrap plain records as rows, indexed by position.
pub fn to_rows(records: impl IntoIterator<Item = Value>) -> Vec<DataRow> {
    records
        .into_iter()
        .enumerate()
        .map(|(index, value)| DataRow::new(index, value))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_field_lookup() {
        let row = DataRow::new(0, json!({"a": 1, "b.c": 2, "d": {"e": 3}}));
        assert_eq!(row.field("a"), Some(&json!(1)));
        assert_eq!(row.field("b.c"), Some(&json!(2)));
        assert_eq!(row.field("d.e"), Some(&json!(3)));
        assert_eq!(row.field("x"), None);
    }

    #[test]
    fn test_to_rows_indexes_by_position() {
        let rows = to_rows(vec![json!(1), json!(2)]);
        assert_eq!(rows[1].index, 1);
    }
}
