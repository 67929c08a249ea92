//! Event payloads and dirty reasons of the ranking engine.
//!
//! Every entity announces changes through a [`Dispatcher`]; listeners receive
//! an [`EventContext`] whose payload is one of the [`EventPayload`] variants.

use std::sync::Arc;

use lineup_core::{EventContext, EventDispatcher};
use serde::{Deserialize, Serialize};

use crate::column::{ColumnMetadata, ColumnRef};
use crate::group::{Group, OrderedGroup};
use crate::ranking::{Ranking, SortCriterion};

/// Dispatcher type used by columns, rankings and providers.
pub type Dispatcher = EventDispatcher<EventPayload>;

/// Listener context type used by columns, rankings and providers.
pub type Context = EventContext<EventPayload>;

/// Why a ranking's row order has to be recomputed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DirtyReason {
    /// Anything could have changed; recompute everything.
    Unknown,
    /// A filter changed.
    FilterChanged,
    /// The sort criteria list changed.
    SortCriteriaChanged,
    /// Values of a sort criterion column changed.
    SortCriteriaDirty,
    /// The group criteria list changed.
    GroupCriteriaChanged,
    /// Values or grouping of a group criterion column changed.
    GroupCriteriaDirty,
    /// The group sort criteria list changed.
    GroupSortCriteriaChanged,
    /// Values of a group sort criterion column changed.
    GroupSortCriteriaDirty,
}

/// Union two reason sets, keeping first-seen order.
pub fn merge_reasons(mut current: Vec<DirtyReason>, next: Vec<DirtyReason>) -> Vec<DirtyReason> {
    for reason in next {
        if !current.contains(&reason) {
            current.push(reason);
        }
    }
    current
}

/// A change of a ranking's derived order and groups.
#[derive(Debug, Clone)]
pub struct OrderChange {
    /// Flattened order before the change.
    pub previous: Vec<usize>,
    /// Flattened order after the change.
    pub current: Vec<usize>,
    /// Groups before the change.
    pub previous_groups: Vec<OrderedGroup>,
    /// Groups after the change.
    pub current_groups: Vec<OrderedGroup>,
    /// Reasons that triggered the reorder.
    pub reasons: Vec<DirtyReason>,
}

/// A change of per-group aggregation state.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateChange {
    /// Id of the affected ranking.
    pub ranking: String,
    /// Affected groups.
    pub groups: Vec<Arc<Group>>,
    /// Previous raw states (-1 expand, 0 collapse, N top-N), one per changed group.
    pub previous: Vec<i32>,
    /// Requested raw states, one per group.
    pub current: Vec<i32>,
    /// Whether the change came from a bulk call.
    pub bulk: bool,
}

/// Payload carried by an emitted event.
#[derive(Debug, Clone)]
pub enum EventPayload {
    /// No arguments.
    None,
    /// Column width change.
    Width { previous: f64, current: f64 },
    /// Visibility or collapse flag change.
    Flag { previous: bool, current: bool },
    /// Renderer type change.
    Text { previous: String, current: String },
    /// Column metadata change.
    MetaData {
        previous: ColumnMetadata,
        current: ColumnMetadata,
    },
    /// Kind-specific state change in dump form (filter, mapping, sort method, ...).
    Value {
        previous: serde_json::Value,
        current: serde_json::Value,
    },
    /// A child was added, removed or moved.
    Child {
        column: ColumnRef,
        index: usize,
        previous_index: Option<usize>,
    },
    /// Stack weights change.
    Weights { previous: Vec<f64>, current: Vec<f64> },
    /// Sort or group-sort criteria change.
    SortCriteria {
        previous: Vec<SortCriterion>,
        current: Vec<SortCriterion>,
    },
    /// Group criteria change.
    GroupColumns {
        previous: Vec<ColumnRef>,
        current: Vec<ColumnRef>,
    },
    /// Explicit dirty-order reasons.
    Reasons(Vec<DirtyReason>),
    /// New order and groups of a ranking.
    Order(Box<OrderChange>),
    /// A ranking was added or removed; `None` for "all rankings".
    Ranking {
        ranking: Option<Arc<Ranking>>,
        index: Option<usize>,
    },
    /// The current selection.
    Selection(Vec<usize>),
    /// Busy flag.
    Busy(bool),
    /// Aggregation state change.
    Aggregate(AggregateChange),
    /// Default top-N change.
    ShowTopN { previous: u32, current: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_reasons_is_a_union() {
        let merged = merge_reasons(
            vec![DirtyReason::SortCriteriaChanged],
            vec![DirtyReason::GroupCriteriaChanged, DirtyReason::SortCriteriaChanged],
        );
        assert_eq!(
            merged,
            vec![DirtyReason::SortCriteriaChanged, DirtyReason::GroupCriteriaChanged]
        );
    }

    #[test]
    fn test_reason_wire_names() {
        assert_eq!(
            serde_json::to_string(&DirtyReason::GroupSortCriteriaDirty).ok(),
            Some("\"GROUP_SORT_CRITERIA_DIRTY\"".to_string())
        );
    }
}
