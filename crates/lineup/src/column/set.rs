use std::any::Any;
use std::cmp::Ordering;
use std::sync::{Arc, Weak};

use lineup_core::{EventKind, Property};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use super::{
    Category, CategoryDesc, Column, ColumnBase, ColumnDesc, emit_value_change, read_extra,
    value_to_label, write_extra,
};
use crate::group::{DEFAULT_COLOR, Group, GroupData};
use crate::row::DataRow;

/// Name of the group of rows that belong to no category.
pub const EMPTY_SET_GROUP_NAME: &str = "Empty";

/// How a set filter matches a row's members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SetMatch {
    /// At least one filtered category is a member.
    #[default]
    Some,
    /// Every filtered category is a member.
    Every,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SetFilter {
    pub categories: Vec<String>,
    #[serde(default)]
    pub mode: SetMatch,
}

impl SetFilter {
    pub fn some<I, S>(categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            categories: categories.into_iter().map(Into::into).collect(),
            mode: SetMatch::Some,
        }
    }

    pub fn every<I, S>(categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            mode: SetMatch::Every,
            ..Self::some(categories)
        }
    }
}

/// A column whose value is a subset of the declared categories.
///
/// Row values may be a list of category names, a list of 0/1 (or boolean)
/// flags aligned with the declared categories, or an object mapping names
/// to flags. Rows compare by member count first, then by which categories
/// they hold in declaration order.
pub struct SetColumn {
    base: ColumnBase,
    categories: Vec<Category>,
    filter: Property<Option<SetFilter>>,
}

impl SetColumn {
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

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    fn category_named(&self, name: &str) -> Category {
        match self.categories.iter().find(|c| c.name == name) {
            Some(c) => c.clone(),
            None => Category::from_desc(&CategoryDesc::Name(name.to_string()), self.categories.len()),
        }
    }

    /// Members of `row` in declaration order, undeclared ones last.
    /// `None` when the value is missing or not set-shaped.
    pub fn members(&self, row: &DataRow) -> Option<Vec<Category>> {
        let names: Vec<String> = match self.base.raw_value(row)? {
            Value::Array(items) if !items.is_empty() && items.iter().all(is_flag) => {
                if items.len() != self.categories.len() {
                    return None;
                }
                self.categories
                    .iter()
                    .zip(&items)
                    .filter(|(_, flag)| flag_set(flag))
                    .map(|(c, _)| c.name.clone())
                    .collect()
            }
            Value::Array(items) => items
                .iter()
                .map(value_to_label)
                .filter(|n| !n.is_empty())
                .collect(),
            Value::Object(map) => map
                .iter()
                .filter(|(_, flag)| flag_set(flag))
                .map(|(name, _)| name.clone())
                .collect(),
            _ => return None,
        };
        let mut members: Vec<Category> = self
            .categories
            .iter()
            .filter(|c| names.contains(&c.name))
            .cloned()
            .collect();
        let mut undeclared: Vec<&String> = names
            .iter()
            .filter(|n| !self.categories.iter().any(|c| &c.name == *n))
            .collect();
        undeclared.sort();
        undeclared.dedup();
        members.extend(undeclared.into_iter().map(|n| self.category_named(n)));
        Some(members)
    }

    /// Membership flags over the declared categories.
    fn flags(&self, members: &[Category]) -> Vec<bool> {
        self.categories
            .iter()
            .map(|c| members.iter().any(|m| m.name == c.name))
            .collect()
    }

    pub fn filter_state(&self) -> Option<SetFilter> {
        self.filter.get()
    }

    pub fn set_filter(&self, filter: Option<SetFilter>) {
        if let Some(previous) = self.filter.replace(filter.clone()) {
            emit_value_change(&self.base, EventKind::FilterChanged, json!(previous), json!(filter));
        }
    }
}

fn is_flag(value: &Value) -> bool {
    matches!(value, Value::Bool(_) | Value::Number(_))
}

fn flag_set(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        _ => false,
    }
}

impl Column for SetColumn {
    fn base(&self) -> &ColumnBase {
        &self.base
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn value(&self, row: &DataRow) -> Value {
        match self.members(row) {
            Some(members) => Value::Array(members.into_iter().map(|c| Value::String(c.name)).collect()),
            None => Value::Null,
        }
    }

    fn label_of(&self, row: &DataRow) -> String {
        self.members(row)
            .map(|m| m.iter().map(|c| c.label.as_str()).collect::<Vec<_>>().join(", "))
            .unwrap_or_default()
    }

    fn compare(&self, a: &DataRow, b: &DataRow) -> Ordering {
        match (self.members(a), self.members(b)) {
            (Some(x), Some(y)) => x
                .len()
                .cmp(&y.len())
                // holding an earlier category sorts first
                .then_with(|| self.flags(&y).cmp(&self.flags(&x))),
            (Some(_), None) => Ordering::Greater,
            (None, Some(_)) => Ordering::Less,
            (None, None) => Ordering::Equal,
        }
    }

    fn group(&self, row: &DataRow) -> Group {
        match self.members(row).as_deref() {
            None => Group::missing(),
            Some([]) => Group::new(EMPTY_SET_GROUP_NAME, DEFAULT_COLOR),
            Some([single]) => Group::new(single.label.clone(), single.color.clone()),
            Some(many) => Group::new(
                many.iter().map(|c| c.label.as_str()).collect::<Vec<_>>().join(", "),
                DEFAULT_COLOR,
            ),
        }
    }

    /// Groups order by set size, then by name.
    fn group_compare(&self, a: &GroupData, b: &GroupData) -> Ordering {
        let size = |g: &GroupData| {
            g.rows
                .first()
                .and_then(|r| self.members(r))
                .map_or(0, |m| m.len())
        };
        size(a)
            .cmp(&size(b))
            .then_with(|| super::strategy::compare_group_names(a, b))
    }

    fn is_filtered(&self) -> bool {
        self.filter.with(Option::is_some)
    }

    fn filter(&self, row: &DataRow) -> bool {
        let Some(filter) = self.filter.get() else {
            return true;
        };
        let Some(members) = self.members(row) else {
            return false;
        };
        let has = |name: &String| members.iter().any(|m| &m.name == name);
        match filter.mode {
            SetMatch::Some => filter.categories.iter().any(has),
            SetMatch::Every => filter.categories.iter().all(has),
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

    fn debug_properties(&self) -> Vec<(String, String)> {
        vec![("categories".to_string(), self.categories.len().to_string())]
    }
}
