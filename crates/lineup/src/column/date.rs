use std::any::Any;
use std::cmp::Ordering;
use std::sync::{Arc, Weak};

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;

use super::{Column, ColumnBase, ColumnDesc};
use crate::group::{DEFAULT_COLOR, Group};
use crate::row::DataRow;

/// A date column. Values are epoch milliseconds or RFC 3339 / `YYYY-MM-DD`
/// strings; rows are grouped by year.
pub struct DateColumn {
    base: ColumnBase,
}

impl DateColumn {
    pub fn create(id: impl Into<String>, desc: Arc<ColumnDesc>) -> Arc<Self> {
        let id = id.into();
        Arc::new_cyclic(|me: &Weak<Self>| {
            let me: Weak<dyn Column> = me.clone();
            Self {
                base: ColumnBase::new(id, desc, me),
            }
        })
    }

    pub fn date(&self, row: &DataRow) -> Option<DateTime<Utc>> {
        parse_date(&self.base.raw_value(row)?)
    }
}

fn parse_date(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => DateTime::from_timestamp_millis(n.as_i64()?),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
                return Some(dt.and_utc());
            }
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|dt| dt.and_utc())
        }
        _ => None,
    }
}

impl Column for DateColumn {
    fn base(&self) -> &ColumnBase {
        &self.base
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn value(&self, row: &DataRow) -> Value {
        self.date(row)
            .map_or(Value::Null, |d| Value::String(d.to_rfc3339()))
    }

    fn label_of(&self, row: &DataRow) -> String {
        self.date(row)
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_default()
    }

    /// Missing dates sort before every date.
    fn compare(&self, a: &DataRow, b: &DataRow) -> Ordering {
        self.date(a).cmp(&self.date(b))
    }

    fn group(&self, row: &DataRow) -> Group {
        match self.date(row) {
            Some(d) => Group::new(d.year().to_string(), DEFAULT_COLOR),
            None => Group::missing(),
        }
    }

    fn default_sort_ascending(&self) -> bool {
        false
    }
}
