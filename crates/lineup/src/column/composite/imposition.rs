use std::any::Any;
use std::cmp::Ordering;
use std::sync::{Arc, Weak};

use serde_json::Value;

use super::{CompositeBase, CompositeColumn};
use crate::column::strategy::{self, SortMethod};
use crate::column::{Column, ColumnBase, ColumnDesc, ColumnRef, NumberValued};
use crate::group::{DEFAULT_COLOR, Group, GroupData};
use crate::row::DataRow;

/// A numeric column colored by a categorical one.
///
/// Slot 0 holds the numeric child every value accessor delegates to; the
/// optional slot 1 holds a categorical child that only provides the color.
/// New children always go to the next free slot.
pub struct ImpositionColumn {
    base: ColumnBase,
    composite: CompositeBase,
}

impl ImpositionColumn {
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

    fn wrapped(&self) -> Option<ColumnRef> {
        self.composite.at(0)
    }

    /// Color of `row` from the categorical child, the default color without one.
    pub fn color_of(&self, row: &DataRow) -> String {
        self.composite
            .at(1)
            .and_then(|c| c.as_categorical().map(|cat| cat.color_of(row)))
            .unwrap_or_else(|| DEFAULT_COLOR.to_string())
    }
}

impl NumberValued for ImpositionColumn {
    fn number(&self, row: &DataRow) -> f64 {
        self.wrapped()
            .and_then(|c| c.as_number().map(|n| n.number(row)))
            .unwrap_or(f64::NAN)
    }

    fn raw_number(&self, row: &DataRow) -> f64 {
        self.wrapped()
            .and_then(|c| c.as_number().map(|n| n.raw_number(row)))
            .unwrap_or(f64::NAN)
    }

    fn sort_method(&self) -> SortMethod {
        self.wrapped()
            .and_then(|c| c.as_number().map(|n| n.sort_method()))
            .unwrap_or_default()
    }

    fn set_sort_method(&self, method: SortMethod) {
        if let Some(number) = self.wrapped().as_deref().and_then(|c| c.as_number()) {
            number.set_sort_method(method);
        }
    }
}

impl Column for ImpositionColumn {
    fn base(&self) -> &ColumnBase {
        &self.base
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn value(&self, row: &DataRow) -> Value {
        self.wrapped().map_or(Value::Null, |c| c.value(row))
    }

    fn label_of(&self, row: &DataRow) -> String {
        self.wrapped().map(|c| c.label_of(row)).unwrap_or_default()
    }

    fn compare(&self, a: &DataRow, b: &DataRow) -> Ordering {
        strategy::number_compare(self, a, b)
    }

    fn group(&self, row: &DataRow) -> Group {
        self.wrapped()
            .map_or_else(Group::default_group, |c| c.group(row))
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
}

impl CompositeColumn for ImpositionColumn {
    fn composite(&self) -> &CompositeBase {
        &self.composite
    }

    fn can_insert(&self, col: &ColumnRef) -> bool {
        match self.composite.len() {
            0 => col.as_number().is_some(),
            1 => col.as_categorical().is_some(),
            _ => false,
        }
    }

    fn insert(&self, col: ColumnRef, _index: usize) -> Option<ColumnRef> {
        if !self.can_insert(&col) {
            return None;
        }
        let len = self.composite.len();
        self.composite.insert_entry(&self.base, col, len, Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::{CategoricalColumn, NumberColumn, StringColumn};
    use crate::row::to_rows;
    use serde_json::json;

    fn imposition() -> Arc<ImpositionColumn> {
        ImpositionColumn::create("i", Arc::new(ColumnDesc::new("imposition", "Imposed")))
    }

    #[test]
    fn test_slots() {
        let col = imposition();
        let number = NumberColumn::create("v", Arc::new(ColumnDesc::data("number", "v")));
        let category = CategoricalColumn::create(
            "c",
            Arc::new(ColumnDesc::data("categorical", "c").with_categories(["a", "b"])),
        );
        let text = StringColumn::create("s", Arc::new(ColumnDesc::data("string", "s")));

        assert!(col.push(category.clone()).is_none());
        assert!(col.push(number).is_some());
        assert!(col.push(text).is_none());
        assert!(col.insert(category, 0).is_some());
        assert_eq!(col.children().iter().map(|c| c.id()).collect::<Vec<_>>(), vec!["v", "c"]);
        let extra = NumberColumn::create("w", Arc::new(ColumnDesc::data("number", "w")));
        assert!(col.push(extra).is_none());

        let rows = to_rows(vec![json!({"v": 0.5, "c": "b"}), json!({"v": 0.2})]);
        assert_eq!(col.raw_number(&rows[0]), 0.5);
        assert_eq!(col.color_of(&rows[0]), crate::column::CATEGORY_PALETTE[1]);
        assert_eq!(col.color_of(&rows[1]), DEFAULT_COLOR);
        assert_eq!(col.compare(&rows[1], &rows[0]), Ordering::Less);
    }

    #[test]
    fn test_box_plot_as_numeric_slot() {
        let col = imposition();
        let dist = crate::column::BoxPlotColumn::create("d", Arc::new(ColumnDesc::data("boxplot", "d")));
        assert!(col.push(dist).is_some());

        let rows = to_rows(vec![json!({"d": [1, 4, 2]})]);
        assert_eq!(col.raw_number(&rows[0]), 2.0);
        assert_eq!(col.sort_method(), SortMethod::Median);
    }

    #[test]
    fn test_neutral_without_children() {
        let col = imposition();
        let rows = to_rows(vec![json!({"v": 1})]);
        assert!(col.number(&rows[0]).is_nan());
        assert_eq!(col.value(&rows[0]), Value::Null);
        assert_eq!(col.label_of(&rows[0]), "");
        assert_eq!(col.color_of(&rows[0]), DEFAULT_COLOR);
        assert_eq!(col.sort_method(), SortMethod::Median);
    }
}
