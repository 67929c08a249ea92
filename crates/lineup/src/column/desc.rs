//! Static column descriptions and references to them.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::support::HostRef;
use crate::mapping::MappingDump;
use crate::row::DataRow;

/// Reads the raw value of a row for a column.
#[derive(Clone)]
pub struct Accessor(Arc<dyn Fn(&DataRow) -> Value + Send + Sync>);

impl Accessor {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&DataRow) -> Value + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn get(&self, row: &DataRow) -> Value {
        (self.0)(row)
    }
}

impl PartialEq for Accessor {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.0), Arc::as_ptr(&other.0))
    }
}

impl fmt::Debug for Accessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Accessor(..)")
    }
}

/// One category of a categorical description: a bare name or a full entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CategoryDesc {
    Name(String),
    Full {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        color: Option<String>,
    },
}

impl CategoryDesc {
    pub fn name(&self) -> &str {
        match self {
            Self::Name(name) | Self::Full { name, .. } => name,
        }
    }
}

/// The static configuration of a column.
///
/// `kind` is the registered type tag (`"number"`, `"stack"`, ...). Data
/// columns name the row field they read in `column`; composite columns
/// leave it empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDesc {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renderer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_renderer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map: Option<MappingDump>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<CategoryDesc>>,
    #[serde(skip)]
    pub accessor: Option<Accessor>,
    /// Selection and aggregation owner of support columns.
    #[serde(skip)]
    pub host: Option<HostRef>,
}

impl ColumnDesc {
    /// A description of `kind` with a label.
    pub fn new(kind: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            label: label.into(),
            ..Default::default()
        }
    }

    /// A data column description reading the row field `column`.
    pub fn data(kind: impl Into<String>, column: impl Into<String>) -> Self {
        let column = column.into();
        Self {
            kind: kind.into(),
            label: column.clone(),
            column: Some(column),
            ..Default::default()
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_domain(mut self, domain: [f64; 2]) -> Self {
        self.domain = Some(domain.to_vec());
        self
    }

    pub fn with_categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categories = Some(
            categories
                .into_iter()
                .map(|c| CategoryDesc::Name(c.into()))
                .collect(),
        );
        self
    }

    pub fn with_accessor(mut self, accessor: Accessor) -> Self {
        self.accessor = Some(accessor);
        self
    }

    /// Whether `other` describes the same column: same type, field and label.
    pub fn matches(&self, other: &ColumnDesc) -> bool {
        self.kind == other.kind && self.column == other.column && self.label == other.label
    }
}

/// How a dump refers to its description: `"<type>@<column>"`, a bare type,
/// or the full description inline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DescRef {
    Ref(String),
    Inline(ColumnDesc),
}

impl DescRef {
    /// The reference used when dumping `desc`.
    pub fn of(desc: &ColumnDesc) -> Self {
        match &desc.column {
            Some(column) => Self::Ref(format!("{}@{}", desc.kind, column)),
            None => Self::Inline(desc.clone()),
        }
    }

    /// Split a string reference into its type and optional column.
    pub fn parts(reference: &str) -> (&str, Option<&str>) {
        match reference.split_once('@') {
            Some((kind, column)) => (kind, Some(column)),
            None => (reference, None),
        }
    }
}
