use std::any::Any;
use std::cmp::Ordering;
use std::sync::{Arc, Weak};

use lineup_core::{EventKind, Property};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use super::strategy;
use super::{
    CategoricalValued, CategoryDesc, Column, ColumnBase, ColumnDesc, emit_value_change, read_extra,
    value_to_label, write_extra,
};
use crate::group::{Group, GroupData};
use crate::row::DataRow;

/// Colors assigned to categories without an explicit color, in order.
pub const CATEGORY_PALETTE: [&str; 10] = [
    "#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b", "#e377c2", "#7f7f7f",
    "#bcbd22", "#17becf",
];

/// One category of a categorical column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    pub label: String,
    pub color: String,
}

impl Category {
    pub(crate) fn from_desc(desc: &CategoryDesc, index: usize) -> Self {
        let palette = CATEGORY_PALETTE[index % CATEGORY_PALETTE.len()].to_string();
        match desc {
            CategoryDesc::Name(name) => Self {
                name: name.clone(),
                label: name.clone(),
                color: palette,
            },
            CategoryDesc::Full { name, label, color } => Self {
                name: name.clone(),
                label: label.clone().unwrap_or_else(|| name.clone()),
                color: color.clone().unwrap_or(palette),
            },
        }
    }
}

/// A column whose values are one of a fixed set of categories.
///
/// Values that are not among the declared categories become ad-hoc
/// categories with a palette color; they sort after declared ones.
pub struct CategoricalColumn {
    base: ColumnBase,
    categories: Vec<Category>,
    filter: Property<Option<Vec<String>>>,
}

impl CategoricalColumn {
    pub fn create(id: impl Into<String>, desc: Arc<ColumnDesc>) -> Arc<Self> {
        let categories = desc
            .categories
            .iter()
            .flatten()
            .enumerate()
            .map(|(i, c)| Category::from_desc(c, i))
            .collect();
        let id = id.into();
        Arc::new_cyclic(|me: &Weak<Self>| {
            let me: Weak<dyn Column> = me.clone();
            Self {
                base: ColumnBase::new(id, desc, me),
                categories,
                filter: Property::new(None),
            }
        })
    }

    /// The allowed category names, `None` when unfiltered.
    pub fn filter_state(&self) -> Option<Vec<String>> {
        self.filter.get()
    }

    pub fn set_filter(&self, filter: Option<Vec<String>>) {
        if let Some(previous) = self.filter.replace(filter.clone()) {
            emit_value_change(&self.base, EventKind::FilterChanged, json!(previous), json!(filter));
        }
    }
}

impl CategoricalValued for CategoricalColumn {
    fn categories(&self) -> Vec<Category> {
        self.categories.clone()
    }

    fn category(&self, row: &DataRow) -> Option<Category> {
        let name = value_to_label(&self.base.raw_value(row)?);
        if name.is_empty() {
            return None;
        }
        if let Some(known) = self.categories.iter().find(|c| c.name == name) {
            return Some(known.clone());
        }
        let index = self.categories.len();
        Some(Category::from_desc(&CategoryDesc::Name(name), index))
    }
}

impl Column for CategoricalColumn {
    fn base(&self) -> &ColumnBase {
        &self.base
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn value(&self, row: &DataRow) -> Value {
        self.category(row).map_or(Value::Null, |c| Value::String(c.name))
    }

    fn label_of(&self, row: &DataRow) -> String {
        self.category(row).map(|c| c.label).unwrap_or_default()
    }

    fn compare(&self, a: &DataRow, b: &DataRow) -> Ordering {
        // undeclared categories tie on rank; order them by name, missing last
        strategy::categorical_compare(self, a, b).then_with(|| {
            match (self.category(a), self.category(b)) {
                (Some(x), Some(y)) => x.name.cmp(&y.name),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            }
        })
    }

    fn group(&self, row: &DataRow) -> Group {
        match self.category(row) {
            Some(c) => Group::new(c.label, c.color),
            None => Group::missing(),
        }
    }

    fn group_compare(&self, a: &GroupData, b: &GroupData) -> Ordering {
        strategy::categorical_group_compare(self, a, b)
    }

    fn is_filtered(&self) -> bool {
        self.filter.with(Option::is_some)
    }

    fn filter(&self, row: &DataRow) -> bool {
        let Some(allowed) = self.filter.get() else {
            return true;
        };
        self.category(row).is_some_and(|c| allowed.contains(&c.name))
    }

    fn as_categorical(&self) -> Option<&dyn CategoricalValued> {
        Some(self)
    }

    fn dump_extra(&self, extra: &mut Map<String, Value>) {
        if let Some(filter) = self.filter.get() {
            write_extra(extra, "filter", &filter);
        }
    }

    fn restore_extra(&self, extra: &Map<String, Value>) {
        self.filter.set_silent(read_extra(extra, "filter"));
    }

    fn debug_properties(&self) -> Vec<(String, String)> {
        vec![("categories".to_string(), self.categories.len().to_string())]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::to_rows;

    fn column() -> Arc<CategoricalColumn> {
        let mut desc = ColumnDesc::data("categorical", "color").with_categories(["red", "green"]);
        if let Some(cats) = desc.categories.as_mut() {
            cats.push(CategoryDesc::Full {
                name: "blue".into(),
                label: Some("Blue".into()),
                color: Some("#0000ff".into()),
            });
        }
        CategoricalColumn::create("c", Arc::new(desc))
    }

    #[test]
    fn test_categories_and_colors() {
        let col = column();
        let cats = col.categories();
        assert_eq!(cats[0].color, CATEGORY_PALETTE[0]);
        assert_eq!(cats[2].label, "Blue");

        let rows = to_rows(vec![json!({"color": "blue"}), json!({"color": "pink"}), json!({})]);
        assert_eq!(col.color_of(&rows[0]), "#0000ff");
        assert_eq!(col.category(&rows[1]).map(|c| c.name), Some("pink".to_string()));
        assert_eq!(col.category(&rows[2]), None);
        assert_eq!(col.group(&rows[0]), Group::new("Blue", "#0000ff"));
    }

    #[test]
    fn test_compare_by_declaration_order() {
        let col = column();
        let rows = to_rows(vec![
            json!({"color": "green"}),
            json!({"color": "red"}),
            json!({"color": "pink"}),
            json!({}),
        ]);
        assert_eq!(col.compare(&rows[1], &rows[0]), Ordering::Less);
        assert_eq!(col.compare(&rows[0], &rows[2]), Ordering::Less);
        assert_eq!(col.compare(&rows[2], &rows[3]), Ordering::Less);
    }

    #[test]
    fn test_filter() {
        let col = column();
        let rows = to_rows(vec![json!({"color": "green"}), json!({"color": "red"}), json!({})]);
        col.set_filter(Some(vec!["red".into()]));
        assert!(col.is_filtered());
        assert!(!col.filter(&rows[0]));
        assert!(col.filter(&rows[1]));
        assert!(!col.filter(&rows[2]));
    }
}
