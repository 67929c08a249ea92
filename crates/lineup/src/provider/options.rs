//! Provider configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::ranking::RankingConfig;

/// How the aggregation state of a newly seen group is seeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AggregationStrategy {
    /// Groups start expanded.
    #[default]
    #[serde(rename = "item")]
    Item,
    /// Groups start collapsed.
    #[serde(rename = "group")]
    Group,
    #[serde(rename = "group+item")]
    GroupItem,
    #[serde(rename = "group+item+top")]
    GroupItemTop,
    /// Groups start showing the top N rows.
    #[serde(rename = "group+top+item")]
    GroupTopItem,
}

impl AggregationStrategy {
    /// The raw initial state for a new group.
    pub fn initial_state(self, show_top_n: u32) -> i32 {
        match self {
            Self::Group => 0,
            Self::Item | Self::GroupItem | Self::GroupItemTop => -1,
            Self::GroupTopItem => top_n_state(show_top_n),
        }
    }
}

pub(crate) fn top_n_state(show_top_n: u32) -> i32 {
    i32::try_from(show_top_n).unwrap_or(i32::MAX)
}

/// Options of a [`DataProvider`](super::DataProvider).
///
/// Loadable from TOML or JSON; missing keys take their defaults.
///
/// ```
/// use lineup::provider::ProviderOptions;
///
/// let options = ProviderOptions::from_toml_str("showTopN = 5\nsingleSelection = true").unwrap();
/// assert_eq!(options.show_top_n, 5);
/// assert!(options.single_selection);
/// assert_eq!(options.max_sort_criteria, 2);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderOptions {
    #[serde(rename = "showTopN")]
    pub show_top_n: u32,
    pub aggregation_strategy: AggregationStrategy,
    /// Whether an inherited aggregation state is memoized on the group.
    pub propagate_aggregation_state: bool,
    pub single_selection: bool,
    /// Whether a filter change in one ranking reorders all rankings.
    pub filter_globally: bool,
    pub max_sort_criteria: usize,
    pub max_group_columns: usize,
    pub reorder_debounce_ms: u64,
}

impl Default for ProviderOptions {
    fn default() -> Self {
        Self {
            show_top_n: 10,
            aggregation_strategy: AggregationStrategy::Item,
            propagate_aggregation_state: true,
            single_selection: false,
            filter_globally: false,
            max_sort_criteria: 2,
            max_group_columns: 1,
            reorder_debounce_ms: 100,
        }
    }
}

impl ProviderOptions {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Criteria limits for new rankings.
    pub fn ranking_config(&self) -> RankingConfig {
        RankingConfig {
            max_sort_criteria: self.max_sort_criteria,
            max_group_columns: self.max_group_columns,
        }
    }

    pub fn reorder_delay(&self) -> Duration {
        Duration::from_millis(self.reorder_debounce_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_defaults() {
        let options = ProviderOptions::default();
        assert_eq!(options.show_top_n, 10);
        assert_eq!(options.aggregation_strategy, AggregationStrategy::Item);
        assert!(options.propagate_aggregation_state);
        assert_eq!(options.reorder_delay(), Duration::from_millis(100));
        assert_eq!(options.ranking_config(), RankingConfig::default());
    }

    #[test]
    fn test_toml_strategy_names() {
        let options = match ProviderOptions::from_toml_str(
            r#"
            aggregationStrategy = "group+top+item"
            reorderDebounceMs = 0
            maxGroupColumns = 3
            "#,
        ) {
            Ok(o) => o,
            Err(e) => panic!("{e}"),
        };
        assert_eq!(options.aggregation_strategy, AggregationStrategy::GroupTopItem);
        assert_eq!(options.reorder_delay(), Duration::ZERO);
        assert_eq!(options.ranking_config().max_group_columns, 3);
        assert_eq!(options.show_top_n, 10);
    }

    #[test]
    fn test_json_and_errors() {
        let options = ProviderOptions::from_json_str(r#"{"showTopN": 3, "filterGlobally": true}"#);
        assert!(matches!(options, Ok(ref o) if o.show_top_n == 3 && o.filter_globally));
        assert!(matches!(ProviderOptions::from_toml_str("showTopN = \"x\""), Err(Error::Toml(_))));
        assert!(matches!(ProviderOptions::from_json_str("{"), Err(Error::Json(_))));
    }

    #[test]
    fn test_initial_states() {
        assert_eq!(AggregationStrategy::Item.initial_state(10), -1);
        assert_eq!(AggregationStrategy::Group.initial_state(10), 0);
        assert_eq!(AggregationStrategy::GroupItem.initial_state(10), -1);
        assert_eq!(AggregationStrategy::GroupItemTop.initial_state(10), -1);
        assert_eq!(AggregationStrategy::GroupTopItem.initial_state(7), 7);
    }
}
