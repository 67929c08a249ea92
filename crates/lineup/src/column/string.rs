use std::any::Any;
use std::cmp::Ordering;
use std::sync::{Arc, Weak};

use lineup_core::logging::targets;
use lineup_core::{EventKind, Property};
use regex::Regex;
use serde_json::{Map, Value};

use super::{Column, ColumnBase, ColumnDesc, emit_value_change, read_extra, write_extra};
use crate::group::{DEFAULT_COLOR, Group};
use crate::row::DataRow;

const REGEX_PREFIX: &str = "REGEX:";

/// Text filter of a string column.
#[derive(Debug, Clone)]
pub enum StringFilter {
    /// Case-insensitive substring match.
    Contains(String),
    Regex(Regex),
}

impl PartialEq for StringFilter {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Contains(a), Self::Contains(b)) => a == b,
            (Self::Regex(a), Self::Regex(b)) => a.as_str() == b.as_str(),
            _ => false,
        }
    }
}

impl StringFilter {
    /// Parse the dump form: `"REGEX:<pattern>"` or a plain substring.
    /// Invalid patterns are logged and dropped.
    pub fn parse(text: &str) -> Option<Self> {
        match text.strip_prefix(REGEX_PREFIX) {
            Some(pattern) => match Regex::new(pattern) {
                Ok(re) => Some(Self::Regex(re)),
                Err(e) => {
                    tracing::warn!(target: targets::COLUMN, pattern, error = %e, "invalid filter pattern");
                    None
                }
            },
            None => Some(Self::Contains(text.to_string())),
        }
    }

    /// The dump form.
    pub fn to_text(&self) -> String {
        match self {
            Self::Contains(s) => s.clone(),
            Self::Regex(re) => format!("{REGEX_PREFIX}{}", re.as_str()),
        }
    }

    pub fn accepts(&self, value: &str) -> bool {
        match self {
            Self::Contains(s) => value.to_lowercase().contains(&s.to_lowercase()),
            Self::Regex(re) => re.is_match(value),
        }
    }
}

/// A text data column.
pub struct StringColumn {
    base: ColumnBase,
    filter: Property<Option<StringFilter>>,
}

impl StringColumn {
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

    /// The text of `row`, `None` when missing or empty.
    pub fn text(&self, row: &DataRow) -> Option<String> {
        let text = match self.base.raw_value(row)? {
            Value::Null => return None,
            Value::String(s) => s,
            other => other.to_string(),
        };
        (!text.is_empty()).then_some(text)
    }

    pub fn filter_state(&self) -> Option<StringFilter> {
        self.filter.get()
    }

    pub fn set_filter(&self, filter: Option<StringFilter>) {
        if let Some(previous) = self.filter.replace(filter.clone()) {
            let text = |f: Option<StringFilter>| f.map_or(Value::Null, |f| Value::String(f.to_text()));
            emit_value_change(&self.base, EventKind::FilterChanged, text(previous), text(filter));
        }
    }
}

impl Column for StringColumn {
    fn base(&self) -> &ColumnBase {
        &self.base
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn value(&self, row: &DataRow) -> Value {
        self.text(row).map_or(Value::Null, Value::String)
    }

    /// Case-insensitive; missing values sort last.
    fn compare(&self, a: &DataRow, b: &DataRow) -> Ordering {
        match (self.text(a), self.text(b)) {
            (Some(x), Some(y)) => x.to_lowercase().cmp(&y.to_lowercase()),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    }

    fn group(&self, row: &DataRow) -> Group {
        match self.text(row) {
            Some(text) => Group::new(text, DEFAULT_COLOR),
            None => Group::missing(),
        }
    }

    fn is_filtered(&self) -> bool {
        self.filter.with(Option::is_some)
    }

    fn filter(&self, row: &DataRow) -> bool {
        self.filter.with(|f| match f {
            None => true,
            Some(f) => self.text(row).is_some_and(|t| f.accepts(&t)),
        })
    }

    fn dump_extra(&self, extra: &mut Map<String, Value>) {
        if let Some(filter) = self.filter.get() {
            write_extra(extra, "filter", &filter.to_text());
        }
    }

    fn restore_extra(&self, extra: &Map<String, Value>) {
        let filter = read_extra::<String>(extra, "filter").and_then(|t| StringFilter::parse(&t));
        self.filter.set_silent(filter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::to_rows;
    use serde_json::json;

    fn column() -> Arc<StringColumn> {
        StringColumn::create("s", Arc::new(ColumnDesc::data("string", "name")))
    }

    #[test]
    fn test_compare_case_insensitive_missing_last() {
        let col = column();
        let rows = to_rows(vec![json!({"name": "beta"}), json!({"name": "Alpha"}), json!({})]);
        assert_eq!(col.compare(&rows[1], &rows[0]), Ordering::Less);
        assert_eq!(col.compare(&rows[2], &rows[0]), Ordering::Greater);
        assert_eq!(col.group(&rows[2]).name, "Missing values");
    }

    #[test]
    fn test_filters() {
        let col = column();
        let rows = to_rows(vec![json!({"name": "Berlin"}), json!({"name": "Bern"}), json!({})]);

        col.set_filter(StringFilter::parse("ERL"));
        assert!(col.filter(&rows[0]));
        assert!(!col.filter(&rows[1]));
        assert!(!col.filter(&rows[2]));

        col.set_filter(StringFilter::parse("REGEX:^Ber"));
        assert!(col.filter(&rows[0]) && col.filter(&rows[1]));
        assert_eq!(col.filter_state().map(|f| f.to_text()).as_deref(), Some("REGEX:^Ber"));

        assert!(StringFilter::parse("REGEX:(").is_none());
    }
}
