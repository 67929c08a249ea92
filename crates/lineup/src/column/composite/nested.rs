use std::any::Any;
use std::cmp::Ordering;
use std::sync::{Arc, Weak};

use serde_json::Value;

use super::{CompositeBase, CompositeColumn};
use crate::column::{Column, ColumnBase, ColumnDesc};
use crate::row::DataRow;

/// Orders rows by its children in turn: the first child decides, ties fall
/// through to the next one.
pub struct NestedColumn {
    base: ColumnBase,
    composite: CompositeBase,
}

impl NestedColumn {
    pub fn create(id: impl Into<String>, desc: Arc<ColumnDesc>) -> Arc<Self> {
        let id = id.into();
        Arc::new_cyclic(|me: &Weak<Self>| {
            let me: Weak<dyn Column> = me.clone();
            Self {
                base: ColumnBase::new(id, desc, me),
                composite: CompositeBase::new(),
            }
        })
    }
}

impl Column for NestedColumn {
    fn base(&self) -> &ColumnBase {
        &self.base
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    /// The child labels joined with `;`.
    fn value(&self, row: &DataRow) -> Value {
        Value::String(self.label_of(row))
    }

    fn label_of(&self, row: &DataRow) -> String {
        self.composite
            .children()
            .iter()
            .map(|c| c.label_of(row))
            .collect::<Vec<_>>()
            .join(";")
    }

    fn compare(&self, a: &DataRow, b: &DataRow) -> Ordering {
        self.composite
            .children()
            .iter()
            .map(|c| c.compare(a, b))
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
    }

    fn is_filtered(&self) -> bool {
        self.composite.is_filtered()
    }

    fn filter(&self, row: &DataRow) -> bool {
        self.composite.filter(row)
    }

    fn as_composite(&self) -> Option<&dyn CompositeColumn> {
        Some(self)
    }
}

impl CompositeColumn for NestedColumn {
    fn composite(&self) -> &CompositeBase {
        &self.composite
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::{NumberColumn, StringColumn};
    use crate::row::to_rows;
    use serde_json::json;

    #[test]
    fn test_lexicographic_compare() {
        let nested = NestedColumn::create("n", Arc::new(ColumnDesc::new("nested", "Nested")));
        nested.push(StringColumn::create("s", Arc::new(ColumnDesc::data("string", "name"))));
        nested.push(NumberColumn::create("v", Arc::new(ColumnDesc::data("number", "v"))));

        let rows = to_rows(vec![
            json!({"name": "b", "v": 1}),
            json!({"name": "a", "v": 9}),
            json!({"name": "a", "v": 3}),
        ]);
        assert_eq!(nested.compare(&rows[1], &rows[0]), Ordering::Less);
        assert_eq!(nested.compare(&rows[2], &rows[1]), Ordering::Less);
        assert_eq!(nested.compare(&rows[2], &rows[2]), Ordering::Equal);
        assert_eq!(nested.value(&rows[2]), json!("a;3"));
    }

    #[test]
    fn test_empty_nested_is_neutral() {
        let nested = NestedColumn::create("n", Arc::new(ColumnDesc::new("nested", "Nested")));
        let rows = to_rows(vec![json!({"v": 1}), json!({"v": 2})]);
        assert_eq!(nested.compare(&rows[0], &rows[1]), Ordering::Equal);
        assert_eq!(nested.label_of(&rows[0]), "");
        assert!(!nested.is_filtered());
    }
}
