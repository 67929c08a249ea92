//! Comparison and statistics shared by number-valued and categorical columns.
//!
//! Wrapper columns (impositions, composites) call these directly with the
//! column they delegate to.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use super::{CategoricalValued, NumberValued};
use crate::group::GroupData;
use crate::row::DataRow;

/// Summary statistic used to compare groups or to reduce child values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortMethod {
    Min,
    Max,
    #[default]
    Median,
    Mean,
    Q1,
    Q3,
}

impl SortMethod {
    pub const ALL: [SortMethod; 6] = [
        SortMethod::Min,
        SortMethod::Max,
        SortMethod::Median,
        SortMethod::Mean,
        SortMethod::Q1,
        SortMethod::Q3,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Min => "min",
            Self::Max => "max",
            Self::Median => "median",
            Self::Mean => "mean",
            Self::Q1 => "q1",
            Self::Q3 => "q3",
        }
    }
}

/// Ascending comparison of two numbers; NaN sorts before every number.
pub fn compare_numbers(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.total_cmp(&b),
    }
}

/// The statistic of `values`, ignoring NaN. NaN when nothing is left.
///
/// Quantiles interpolate linearly between the closest ranks.
pub fn statistic(values: impl IntoIterator<Item = f64>, method: SortMethod) -> f64 {
    let mut values: Vec<f64> = values.into_iter().filter(|v| !v.is_nan()).collect();
    if values.is_empty() {
        return f64::NAN;
    }
    match method {
        SortMethod::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
        SortMethod::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        SortMethod::Mean => values.iter().sum::<f64>() / values.len() as f64,
        SortMethod::Median => quantile(&mut values, 0.5),
        SortMethod::Q1 => quantile(&mut values, 0.25),
        SortMethod::Q3 => quantile(&mut values, 0.75),
    }
}

fn quantile(values: &mut [f64], p: f64) -> f64 {
    values.sort_by(f64::total_cmp);
    let h = (values.len() - 1) as f64 * p;
    let lo = h.floor() as usize;
    let hi = (lo + 1).min(values.len() - 1);
    values[lo] + (h - lo as f64) * (values[hi] - values[lo])
}

/// Five-number summary of a row's values, optionally with the mean.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoxPlotData {
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mean: Option<f64>,
}

impl BoxPlotData {
    /// The summary of `values`, ignoring NaN. `None` when nothing is left.
    pub fn from_values(values: impl IntoIterator<Item = f64>) -> Option<Self> {
        let values: Vec<f64> = values.into_iter().filter(|v| !v.is_nan()).collect();
        if values.is_empty() {
            return None;
        }
        let stat = |method| statistic(values.iter().copied(), method);
        Some(Self {
            min: stat(SortMethod::Min),
            q1: stat(SortMethod::Q1),
            median: stat(SortMethod::Median),
            q3: stat(SortMethod::Q3),
            max: stat(SortMethod::Max),
            mean: Some(stat(SortMethod::Mean)),
        })
    }

    /// The statistic picked by `method`. A summary without a mean falls
    /// back to the median.
    pub fn statistic(&self, method: SortMethod) -> f64 {
        match method {
            SortMethod::Min => self.min,
            SortMethod::Max => self.max,
            SortMethod::Median => self.median,
            SortMethod::Mean => self.mean.unwrap_or(self.median),
            SortMethod::Q1 => self.q1,
            SortMethod::Q3 => self.q3,
        }
    }
}

/// Case-insensitive comparison of group names.
pub fn compare_group_names(a: &GroupData, b: &GroupData) -> Ordering {
    a.group
        .name
        .to_lowercase()
        .cmp(&b.group.name.to_lowercase())
}

/// Compare two rows by a number-valued column's raw values.
pub fn number_compare(col: &dyn NumberValued, a: &DataRow, b: &DataRow) -> Ordering {
    compare_numbers(col.raw_number(a), col.raw_number(b))
}

/// Compare two groups by the column's sort-method statistic over their rows.
pub fn number_group_compare(col: &dyn NumberValued, a: &GroupData, b: &GroupData) -> Ordering {
    let method = col.sort_method();
    let stat = |g: &GroupData| statistic(g.rows.iter().map(|r| col.raw_number(r)), method);
    compare_numbers(stat(a), stat(b))
}

/// Position of a category name among the column's categories.
fn category_rank(col: &dyn CategoricalValued, name: &str) -> Option<usize> {
    col.categories()
        .iter()
        .position(|c| c.name == name || c.label == name)
}

/// Compare two rows by category order; missing and unknown values sort last.
pub fn categorical_compare(col: &dyn CategoricalValued, a: &DataRow, b: &DataRow) -> Ordering {
    let rank = |row: &DataRow| col.category(row).and_then(|c| category_rank(col, &c.name));
    match (rank(a), rank(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Compare two groups by the category order of their names, then by name.
pub fn categorical_group_compare(col: &dyn CategoricalValued, a: &GroupData, b: &GroupData) -> Ordering {
    match (category_rank(col, &a.group.name), category_rank(col, &b.group.name)) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => compare_group_names(a, b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nan_sorts_first_ascending() {
        let mut v = vec![3.0, f64::NAN, 1.0];
        v.sort_by(|a, b| compare_numbers(*a, *b));
        assert!(v[0].is_nan());
        assert_eq!(&v[1..], &[1.0, 3.0]);
    }

    #[test]
    fn test_statistics() {
        let v = [4.0, 1.0, f64::NAN, 3.0, 2.0];
        assert_eq!(statistic(v, SortMethod::Min), 1.0);
        assert_eq!(statistic(v, SortMethod::Max), 4.0);
        assert_eq!(statistic(v, SortMethod::Mean), 2.5);
        assert_eq!(statistic(v, SortMethod::Median), 2.5);
        assert_eq!(statistic(v, SortMethod::Q1), 1.75);
        assert_eq!(statistic(v, SortMethod::Q3), 3.25);
        assert!(statistic([f64::NAN], SortMethod::Mean).is_nan());
    }

    #[test]
    fn test_box_plot_summary() {
        let summary = BoxPlotData::from_values([5.0, 1.0, f64::NAN, 3.0]);
        assert_eq!(
            summary,
            Some(BoxPlotData {
                min: 1.0,
                q1: 2.0,
                median: 3.0,
                q3: 4.0,
                max: 5.0,
                mean: Some(3.0),
            })
        );
        assert!(BoxPlotData::from_values([f64::NAN]).is_none());

        let without_mean = BoxPlotData {
            mean: None,
            ..summary.unwrap_or_else(|| panic!("no summary"))
        };
        assert_eq!(without_mean.statistic(SortMethod::Mean), 3.0);
        assert_eq!(without_mean.statistic(SortMethod::Q3), 4.0);
    }

    #[test]
    fn test_sort_method_wire_names() {
        for m in SortMethod::ALL {
            assert_eq!(serde_json::to_value(m).ok(), Some(serde_json::json!(m.as_str())));
        }
    }
}
