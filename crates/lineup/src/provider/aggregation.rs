//! Per-group expand / collapse / top-N state.
//!
//! States are stored raw per `"<rankingId>@<groupName>"` key: `-1` expands
//! a group, `0` collapses it and a positive `N` shows its top N rows. A group
//! without an entry inherits the nearest ancestor's entry, or expands.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::group::Group;

/// Raw state of an expanded group.
pub const EXPAND: i32 = -1;
/// Raw state of a collapsed group.
pub const COLLAPSE: i32 = 0;

/// The aggregation state of a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationState {
    Expand,
    Collapse,
    ExpandTopN,
}

impl AggregationState {
    pub fn from_raw(value: i32) -> Self {
        match value {
            v if v < 0 => Self::Expand,
            0 => Self::Collapse,
            _ => Self::ExpandTopN,
        }
    }

    /// The raw value, using `show_top_n` for [`ExpandTopN`](Self::ExpandTopN).
    pub fn to_raw(self, show_top_n: u32) -> i32 {
        match self {
            Self::Expand => EXPAND,
            Self::Collapse => COLLAPSE,
            Self::ExpandTopN => super::options::top_n_state(show_top_n),
        }
    }
}

/// Key of a group's entry.
pub fn aggregation_key(ranking: &str, group: &Group) -> String {
    format!("{ranking}@{}", group.name)
}

/// Dumped entries: a key → state map, or a bare key list meaning collapsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AggregationsDump {
    States(BTreeMap<String, i32>),
    Collapsed(Vec<String>),
}

impl Default for AggregationsDump {
    fn default() -> Self {
        Self::States(BTreeMap::new())
    }
}

/// The stored entries of all rankings.
#[derive(Debug, Default)]
pub(crate) struct Aggregations {
    entries: HashMap<String, i32>,
}

impl Aggregations {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entry(&self, key: &str) -> Option<i32> {
        self.entries.get(key).copied()
    }

    /// Effective raw state of `group`.
    ///
    /// With `propagate`, an inherited value is written onto the group's own
    /// key before it is returned.
    pub fn get(&mut self, ranking: &str, group: &Group, propagate: bool) -> i32 {
        let mut current = Some(group);
        let mut is_leaf = true;
        while let Some(g) = current {
            if let Some(&value) = self.entries.get(&aggregation_key(ranking, g)) {
                if propagate && !is_leaf {
                    self.entries.insert(aggregation_key(ranking, group), value);
                }
                return value;
            }
            is_leaf = false;
            current = g.parent.as_deref();
        }
        EXPAND
    }

    /// Remove the entries of every ancestor of `group`.
    fn strip_parents(&mut self, ranking: &str, group: &Group) -> bool {
        let mut changed = false;
        let mut current = group.parent.as_deref();
        while let Some(g) = current {
            changed |= self.entries.remove(&aggregation_key(ranking, g)).is_some();
            current = g.parent.as_deref();
        }
        changed
    }

    /// Set `target` on every group after stripping its ancestors' entries.
    ///
    /// Returns the previous states of the groups that changed, or `None` when
    /// neither a group nor an ancestor entry changed.
    pub fn set(&mut self, ranking: &str, groups: &[Arc<Group>], target: i32, propagate: bool) -> Option<Vec<i32>> {
        let mut previous = Vec::new();
        let mut parents_changed = false;
        for group in groups {
            parents_changed |= self.strip_parents(ranking, group);
            let current = self.get(ranking, group, propagate);
            if current == target {
                continue;
            }
            previous.push(current);
            let key = aggregation_key(ranking, group);
            if target >= 0 {
                self.entries.insert(key, target);
            } else {
                self.entries.remove(&key);
            }
        }
        (parents_changed || !previous.is_empty()).then_some(previous)
    }

    /// Give groups without an entry the `initial` state. Expanding needs no entry.
    pub fn seed<'a>(&mut self, ranking: &str, groups: impl IntoIterator<Item = &'a Group>, initial: i32) {
        if initial < 0 {
            return;
        }
        for group in groups {
            self.entries.entry(aggregation_key(ranking, group)).or_insert(initial);
        }
    }

    /// Replace every entry equal to `old` by `new`.
    pub fn rewrite(&mut self, old: i32, new: i32) {
        for value in self.entries.values_mut() {
            if *value == old {
                *value = new;
            }
        }
    }

    pub fn remove_ranking(&mut self, ranking: &str) {
        let prefix = format!("{ranking}@");
        self.entries.retain(|k, _| !k.starts_with(&prefix));
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn dump(&self) -> AggregationsDump {
        AggregationsDump::States(self.entries.iter().map(|(k, v)| (k.clone(), *v)).collect())
    }

    pub fn restore(&mut self, dump: &AggregationsDump) {
        self.entries.clear();
        match dump {
            AggregationsDump::States(states) => {
                self.entries.extend(states.iter().map(|(k, v)| (k.clone(), *v)));
            }
            AggregationsDump::Collapsed(keys) => {
                self.entries.extend(keys.iter().map(|k| (k.clone(), COLLAPSE)));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn family() -> (Arc<Group>, Arc<Group>, Arc<Group>) {
        let parent = Arc::new(Group::new("p", "red"));
        let g = Arc::new(Group::new("p ∩ g", "red").with_parent(parent.clone()));
        let g2 = Arc::new(Group::new("p ∩ g2", "red").with_parent(parent.clone()));
        (parent, g, g2)
    }

    #[test]
    fn test_inheritance_and_stripping() {
        let (parent, g, g2) = family();
        let mut aggregations = Aggregations::default();
        aggregations.set("rank0", &[parent.clone()], COLLAPSE, true);

        assert_eq!(aggregations.get("rank0", &g, true), COLLAPSE);
        assert_eq!(aggregations.entry("rank0@p ∩ g"), Some(COLLAPSE));

        let previous = aggregations.set("rank0", &[g.clone()], EXPAND, true);
        assert_eq!(previous, Some(vec![COLLAPSE]));
        assert_eq!(aggregations.entry("rank0@p"), None);
        assert_eq!(aggregations.get("rank0", &g2, true), EXPAND);
        assert_eq!(aggregations.get("rank0", &g, true), EXPAND);
    }

    #[test]
    fn test_without_propagation() {
        let (parent, g, _) = family();
        let mut aggregations = Aggregations::default();
        aggregations.set("rank0", &[parent], 5, false);
        assert_eq!(aggregations.get("rank0", &g, false), 5);
        assert_eq!(aggregations.entry("rank0@p ∩ g"), None);
    }

    #[test]
    fn test_unchanged_set_reports_nothing() {
        let (_, g, _) = family();
        let mut aggregations = Aggregations::default();
        assert_eq!(aggregations.set("rank0", &[g.clone()], EXPAND, true), None);
        assert_eq!(aggregations.set("rank0", &[g.clone()], 3, true), Some(vec![EXPAND]));
        assert_eq!(aggregations.set("rank0", &[g], 3, true), None);
    }

    #[test]
    fn test_seed_rewrite_and_remove() {
        let (_, g, g2) = family();
        let mut aggregations = Aggregations::default();
        aggregations.seed("rank0", [g.as_ref()], EXPAND);
        assert_eq!(aggregations.len(), 0);

        aggregations.set("rank0", &[g.clone()], COLLAPSE, true);
        aggregations.seed("rank0", [g.as_ref(), g2.as_ref()], 10);
        assert_eq!(aggregations.entry("rank0@p ∩ g"), Some(COLLAPSE));
        assert_eq!(aggregations.entry("rank0@p ∩ g2"), Some(10));

        aggregations.rewrite(10, 4);
        assert_eq!(aggregations.entry("rank0@p ∩ g2"), Some(4));

        aggregations.seed("rank1", [g.as_ref()], 10);
        aggregations.remove_ranking("rank0");
        assert_eq!(aggregations.len(), 1);
        assert_eq!(aggregations.entry("rank1@p ∩ g"), Some(10));
    }

    #[test]
    fn test_dump_forms() {
        let mut aggregations = Aggregations::default();
        let keys: AggregationsDump = match serde_json::from_value(json!(["rank0@a", "rank0@b"])) {
            Ok(d) => d,
            Err(e) => panic!("{e}"),
        };
        aggregations.restore(&keys);
        assert_eq!(aggregations.entry("rank0@b"), Some(COLLAPSE));

        let states: AggregationsDump = match serde_json::from_value(json!({"rank0@a": 5})) {
            Ok(d) => d,
            Err(e) => panic!("{e}"),
        };
        aggregations.restore(&states);
        assert_eq!(aggregations.len(), 1);
        assert_eq!(aggregations.dump(), states);
    }

    #[test]
    fn test_state_conversion() {
        assert_eq!(AggregationState::from_raw(-1), AggregationState::Expand);
        assert_eq!(AggregationState::from_raw(0), AggregationState::Collapse);
        assert_eq!(AggregationState::from_raw(7), AggregationState::ExpandTopN);
        assert_eq!(AggregationState::ExpandTopN.to_raw(10), 10);
        assert_eq!(AggregationState::Collapse.to_raw(10), 0);
    }
}
