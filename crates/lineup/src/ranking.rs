//! Rankings: ordered top-level columns plus sort, group and group-sort
//! criteria.
//!
//! A ranking derives three snapshot functions from its criteria:
//!
//! - [`Ranking::comparator`] orders rows, falling back to the row index
//! - [`Ranking::grouper`] assigns a row to a (possibly joined) group
//! - [`Ranking::group_comparator`] orders groups, falling back to the name
//!
//! Anything that affects the order ends in a `dirtyOrder` emit carrying the
//! [`DirtyReason`]s; the provider schedules the actual reorder and hands the
//! result back through [`Ranking::set_groups`].

use std::cmp::Ordering;
use std::fmt;
use std::sync::{Arc, Weak};

use lineup_core::logging::targets;
use lineup_core::{DebugNode, EventKind, Subscription};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::column::strategy::compare_group_names;
use crate::column::{
    ChildEntry, Column, ColumnDesc, ColumnDump, ColumnParent, ColumnRef, DescRef, same_column,
};
use crate::events::{Dispatcher, DirtyReason, EventPayload, OrderChange};
use crate::group::{Group, GroupData, OrderedGroup, join_groups};
use crate::registry::TypeFactory;
use crate::row::DataRow;

/// Column events a ranking re-emits as its own.
const FORWARDED: [EventKind; 5] = [
    EventKind::DirtyHeader,
    EventKind::DirtyValues,
    EventKind::DirtyCaches,
    EventKind::Dirty,
    EventKind::FilterChanged,
];

/// One entry of a sort or group-sort criteria list.
#[derive(Clone)]
pub struct SortCriterion {
    pub col: ColumnRef,
    pub asc: bool,
}

impl SortCriterion {
    pub fn new(col: ColumnRef, asc: bool) -> Self {
        Self { col, asc }
    }
}

impl PartialEq for SortCriterion {
    fn eq(&self, other: &Self) -> bool {
        self.asc == other.asc && same_column(&self.col, &other.col)
    }
}

impl fmt::Debug for SortCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SortCriterion")
            .field("col", &self.col.id())
            .field("asc", &self.asc)
            .finish()
    }
}

/// Limits of the criteria lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RankingConfig {
    /// Maximum length of the sort and group-sort criteria lists.
    pub max_sort_criteria: usize,
    /// Maximum number of group columns.
    pub max_group_columns: usize,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            max_sort_criteria: 2,
            max_group_columns: 1,
        }
    }
}

/// A criterion in dump form; `sort_by` is the column id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CriterionDump {
    pub sort_by: String,
    pub asc: bool,
}

/// A ranking in dump form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingDump {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub columns: Vec<ColumnDump>,
    #[serde(default)]
    pub sort_criteria: Vec<CriterionDump>,
    #[serde(default)]
    pub group_columns: Vec<String>,
    #[serde(default)]
    pub group_sort_criteria: Vec<CriterionDump>,
}

#[derive(Clone, Copy)]
enum CriteriaList {
    Sort,
    GroupSort,
}

impl CriteriaList {
    fn changed_kind(self) -> EventKind {
        match self {
            Self::Sort => EventKind::SortCriteriaChanged,
            Self::GroupSort => EventKind::GroupSortCriteriaChanged,
        }
    }

    fn changed_reason(self) -> DirtyReason {
        match self {
            Self::Sort => DirtyReason::SortCriteriaChanged,
            Self::GroupSort => DirtyReason::GroupSortCriteriaChanged,
        }
    }

    fn dirty_reason(self) -> DirtyReason {
        match self {
            Self::Sort => DirtyReason::SortCriteriaDirty,
            Self::GroupSort => DirtyReason::GroupSortCriteriaDirty,
        }
    }
}

#[derive(Default)]
struct RankingState {
    columns: Vec<ChildEntry>,
    sort_criteria: Vec<SortCriterion>,
    group_sort_criteria: Vec<SortCriterion>,
    group_columns: Vec<ColumnRef>,
    sort_subscriptions: Vec<Subscription>,
    group_sort_subscriptions: Vec<Subscription>,
    group_subscriptions: Vec<Subscription>,
    groups: Vec<OrderedGroup>,
    order: Vec<usize>,
    index2pos: Vec<Option<usize>>,
}

/// An orderable view: columns plus criteria plus the derived groups.
///
/// The id is fixed at construction; the provider keys its per-ranking
/// bookkeeping by it.
pub struct Ranking {
    id: String,
    me: Weak<Ranking>,
    config: RankingConfig,
    state: RwLock<RankingState>,
    events: Dispatcher,
}

/// Apply a priority change to a criteria-like list.
///
/// An existing entry is removed and, with a priority, reinserted at the
/// clamped slot. A new entry with a priority replaces the entry at that slot
/// (or is appended past the end).
fn hierarchy<T>(mut list: Vec<T>, existing: Option<usize>, entry: T, priority: Option<usize>) -> Vec<T> {
    match (existing, priority) {
        (Some(index), priority) => {
            list.remove(index);
            if let Some(p) = priority {
                let p = p.min(list.len());
                list.insert(p, entry);
            }
        }
        (None, Some(p)) => {
            if p < list.len() {
                list[p] = entry;
            } else {
                list.push(entry);
            }
        }
        (None, None) => {}
    }
    list
}

impl Ranking {
    pub fn new(id: impl Into<String>, config: RankingConfig) -> Arc<Self> {
        let id = id.into();
        Arc::new_cyclic(|me| Self {
            id,
            me: me.clone(),
            config,
            state: RwLock::new(RankingState::default()),
            events: Dispatcher::new(),
        })
    }

    pub fn id(&self) -> String {
        self.id.clone()
    }

    pub fn config(&self) -> RankingConfig {
        self.config
    }

    pub fn events(&self) -> &Dispatcher {
        &self.events
    }

    /// Whether `col` lives somewhere inside this ranking.
    pub fn owns(&self, col: &ColumnRef) -> bool {
        col.find_my_ranker()
            .is_some_and(|r| std::ptr::eq(Arc::as_ptr(&r), self))
    }

    // --- columns ------------------------------------------------------------

    /// A fresh copy of the top-level columns.
    pub fn children(&self) -> Vec<ColumnRef> {
        self.state.read().columns.iter().map(|e| e.column.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.state.read().columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().columns.is_empty()
    }

    pub fn at(&self, index: usize) -> Option<ColumnRef> {
        self.state.read().columns.get(index).map(|e| e.column.clone())
    }

    pub fn index_of(&self, col: &ColumnRef) -> Option<usize> {
        self.state
            .read()
            .columns
            .iter()
            .position(|e| same_column(&e.column, col))
    }

    /// Every column of the ranking, depth first.
    pub fn flat_columns(&self) -> Vec<ColumnRef> {
        self.children().iter().flat_map(|c| c.flatten()).collect()
    }

    pub fn find(&self, id: &str) -> Option<ColumnRef> {
        self.flat_columns().into_iter().find(|c| c.id() == id)
    }

    /// Resolve an index path such as `"@1@0"`.
    pub fn find_by_path(&self, path: &str) -> Option<ColumnRef> {
        let mut indices = path
            .split('@')
            .skip(1)
            .map(|s| s.parse::<usize>().ok());
        let mut current = self.at(indices.next()??)?;
        for index in indices {
            let next = current.as_composite()?.at(index?)?;
            current = next;
        }
        Some(current)
    }

    /// Insert `col` at `index` (clamped), detaching it from any previous
    /// parent.
    pub fn insert(&self, col: ColumnRef, index: usize) -> Option<ColumnRef> {
        if !matches!(col.base().parent(), ColumnParent::None) {
            col.base().remove_me();
        }
        let weak = self.me.clone();
        let subscriptions = vec![
            self.events.forward(col.events(), &FORWARDED),
            col.events().subscribe(&[EventKind::FilterChanged], move |_| {
                if let Some(ranking) = weak.upgrade() {
                    ranking.dirty_order(vec![DirtyReason::FilterChanged]);
                }
            }),
        ];
        col.base().attach(ColumnParent::Ranking(self.me.clone()));
        let index = {
            let mut state = self.state.write();
            let index = index.min(state.columns.len());
            state
                .columns
                .insert(index, ChildEntry::new(col.clone(), subscriptions));
            index
        };
        tracing::trace!(target: targets::RANKING, ranking = %self.id(), column = %col.id(), index, "column added");
        self.events.emit(
            &[
                EventKind::AddColumn,
                EventKind::DirtyHeader,
                EventKind::DirtyValues,
                EventKind::Dirty,
            ],
            EventPayload::Child {
                column: col.clone(),
                index,
                previous_index: None,
            },
        );
        if col.is_filtered() {
            self.dirty_order(vec![DirtyReason::FilterChanged]);
        }
        Some(col)
    }

    pub fn push(&self, col: ColumnRef) -> Option<ColumnRef> {
        let len = self.len();
        self.insert(col, len)
    }

    pub fn insert_after(&self, col: ColumnRef, reference: &ColumnRef) -> Option<ColumnRef> {
        let index = self.index_of(reference)?;
        self.insert(col, index + 1)
    }

    /// Move `col` to `index`, counted before its removal.
    pub fn move_column(&self, col: &ColumnRef, index: usize) -> Option<ColumnRef> {
        let (previous, current) = {
            let mut state = self.state.write();
            let previous = state.columns.iter().position(|e| same_column(&e.column, col))?;
            let target = if previous < index { index - 1 } else { index };
            let target = target.min(state.columns.len() - 1);
            if target == previous {
                return Some(col.clone());
            }
            let entry = state.columns.remove(previous);
            state.columns.insert(target, entry);
            (previous, target)
        };
        self.events.emit(
            &[
                EventKind::MoveColumn,
                EventKind::DirtyHeader,
                EventKind::DirtyValues,
                EventKind::Dirty,
            ],
            EventPayload::Child {
                column: col.clone(),
                index: current,
                previous_index: Some(previous),
            },
        );
        Some(col.clone())
    }

    /// Remove a top-level column. Criteria referring to it or to one of its
    /// descendants are dropped first.
    pub fn remove(&self, col: &ColumnRef) -> bool {
        let (index, entry) = {
            let mut state = self.state.write();
            let Some(index) = state.columns.iter().position(|e| same_column(&e.column, col)) else {
                return false;
            };
            (index, state.columns.remove(index))
        };
        drop(entry);

        let removed = col.flatten();
        let gone = |c: &ColumnRef| removed.iter().any(|r| same_column(r, c));
        let sort = self.sort_criteria();
        if sort.iter().any(|s| gone(&s.col)) {
            self.set_sort_criteria(sort.into_iter().filter(|s| !gone(&s.col)).collect());
        }
        let group_sort = self.group_sort_criteria();
        if group_sort.iter().any(|s| gone(&s.col)) {
            self.set_group_sort_criteria(group_sort.into_iter().filter(|s| !gone(&s.col)).collect());
        }
        let group_columns = self.group_columns();
        if group_columns.iter().any(|c| gone(c)) {
            self.set_group_criteria(group_columns.into_iter().filter(|c| !gone(c)).collect());
        }

        col.base().detach();
        tracing::trace!(target: targets::RANKING, ranking = %self.id(), column = %col.id(), index, "column removed");
        self.events.emit(
            &[
                EventKind::RemoveColumn,
                EventKind::DirtyHeader,
                EventKind::DirtyValues,
                EventKind::Dirty,
            ],
            EventPayload::Child {
                column: col.clone(),
                index,
                previous_index: None,
            },
        );
        if col.is_filtered() {
            self.dirty_order(vec![DirtyReason::FilterChanged]);
        }
        true
    }

    /// Remove every column.
    pub fn clear(&self) {
        for col in self.children().iter().rev() {
            self.remove(col);
        }
    }

    // --- criteria -----------------------------------------------------------

    /// A fresh copy of the sort criteria.
    pub fn sort_criteria(&self) -> Vec<SortCriterion> {
        self.state.read().sort_criteria.clone()
    }

    /// A fresh copy of the group-sort criteria.
    pub fn group_sort_criteria(&self) -> Vec<SortCriterion> {
        self.state.read().group_sort_criteria.clone()
    }

    /// A fresh copy of the group columns.
    pub fn group_columns(&self) -> Vec<ColumnRef> {
        self.state.read().group_columns.clone()
    }

    /// Replace the sort criteria. Returns whether anything changed.
    pub fn set_sort_criteria(&self, criteria: Vec<SortCriterion>) -> bool {
        self.replace_criteria(CriteriaList::Sort, criteria)
    }

    /// Replace the group-sort criteria. Returns whether anything changed.
    pub fn set_group_sort_criteria(&self, criteria: Vec<SortCriterion>) -> bool {
        self.replace_criteria(CriteriaList::GroupSort, criteria)
    }

    fn replace_criteria(&self, which: CriteriaList, mut criteria: Vec<SortCriterion>) -> bool {
        criteria.truncate(self.config.max_sort_criteria);
        let subscriptions =
            self.subscribe_dirty(criteria.iter().map(|c| &c.col), which.dirty_reason());
        let (previous, stale) = {
            let mut state = self.state.write();
            let state = &mut *state;
            let (list, subs) = match which {
                CriteriaList::Sort => (&mut state.sort_criteria, &mut state.sort_subscriptions),
                CriteriaList::GroupSort => (
                    &mut state.group_sort_criteria,
                    &mut state.group_sort_subscriptions,
                ),
            };
            if *list == criteria {
                return false;
            }
            (
                std::mem::replace(list, criteria.clone()),
                std::mem::replace(subs, subscriptions),
            )
        };
        drop(stale);
        tracing::debug!(
            target: targets::RANKING,
            ranking = %self.id(),
            kind = %which.changed_kind(),
            criteria = ?criteria,
            "criteria changed"
        );
        self.events.emit(
            &[
                which.changed_kind(),
                EventKind::DirtyHeader,
                EventKind::DirtyValues,
                EventKind::Dirty,
            ],
            EventPayload::SortCriteria {
                previous,
                current: criteria,
            },
        );
        self.dirty_order(vec![which.changed_reason()]);
        true
    }

    /// Replace the group columns. Returns whether anything changed.
    pub fn set_group_criteria(&self, mut columns: Vec<ColumnRef>) -> bool {
        columns.truncate(self.config.max_group_columns);
        let subscriptions = self.subscribe_dirty(columns.iter(), DirtyReason::GroupCriteriaDirty);
        let (previous, stale) = {
            let mut state = self.state.write();
            let unchanged = state.group_columns.len() == columns.len()
                && state
                    .group_columns
                    .iter()
                    .zip(&columns)
                    .all(|(a, b)| same_column(a, b));
            if unchanged {
                return false;
            }
            (
                std::mem::replace(&mut state.group_columns, columns.clone()),
                std::mem::replace(&mut state.group_subscriptions, subscriptions),
            )
        };
        drop(stale);
        self.events.emit(
            &[
                EventKind::GroupCriteriaChanged,
                EventKind::DirtyHeader,
                EventKind::DirtyValues,
                EventKind::Dirty,
            ],
            EventPayload::GroupColumns {
                previous,
                current: columns,
            },
        );
        self.dirty_order(vec![DirtyReason::GroupCriteriaChanged]);
        true
    }

    fn subscribe_dirty<'a>(
        &self,
        columns: impl Iterator<Item = &'a ColumnRef>,
        reason: DirtyReason,
    ) -> Vec<Subscription> {
        columns
            .map(|col| {
                let weak = self.me.clone();
                col.events().subscribe(&[EventKind::DirtyValues], move |_| {
                    if let Some(ranking) = weak.upgrade() {
                        ranking.dirty_order(vec![reason]);
                    }
                })
            })
            .collect()
    }

    /// Sort by `col` at `priority`; `None` removes it from the criteria.
    /// Returns `false` for a column of another ranking.
    pub fn sort_by(&self, col: &ColumnRef, ascending: bool, priority: Option<usize>) -> bool {
        if !self.owns(col) {
            return false;
        }
        let criteria = self.sort_criteria();
        let existing = criteria.iter().position(|c| same_column(&c.col, col));
        let next = hierarchy(criteria, existing, SortCriterion::new(col.clone(), ascending), priority);
        self.set_sort_criteria(next);
        true
    }

    /// Sort groups by `col` at `priority`; `None` removes it.
    pub fn group_sort_by(&self, col: &ColumnRef, ascending: bool, priority: Option<usize>) -> bool {
        if !self.owns(col) {
            return false;
        }
        let criteria = self.group_sort_criteria();
        let existing = criteria.iter().position(|c| same_column(&c.col, col));
        let next = hierarchy(criteria, existing, SortCriterion::new(col.clone(), ascending), priority);
        self.set_group_sort_criteria(next);
        true
    }

    /// Group by `col` at `priority`; `None` removes it.
    pub fn group_by(&self, col: &ColumnRef, priority: Option<usize>) -> bool {
        if !self.owns(col) {
            return false;
        }
        let columns = self.group_columns();
        let existing = columns.iter().position(|c| same_column(c, col));
        let next = hierarchy(columns, existing, col.clone(), priority);
        self.set_group_criteria(next);
        true
    }

    /// Cycle `col` through default direction, opposite direction and
    /// unsorted. Sorting by a new column replaces all criteria.
    pub fn toggle_sorting(&self, col: &ColumnRef) -> bool {
        if !self.owns(col) {
            return false;
        }
        let default_asc = col.default_sort_ascending();
        let mut criteria = self.sort_criteria();
        match criteria.iter().position(|c| same_column(&c.col, col)) {
            None => criteria = vec![SortCriterion::new(col.clone(), default_asc)],
            Some(i) if criteria[i].asc == default_asc => criteria[i].asc = !default_asc,
            Some(i) => {
                criteria.remove(i);
            }
        }
        self.set_sort_criteria(criteria);
        true
    }

    /// Group by `col` alone, or stop grouping by it.
    pub fn toggle_grouping(&self, col: &ColumnRef) -> bool {
        if !self.owns(col) {
            return false;
        }
        let mut columns = self.group_columns();
        match columns.iter().position(|c| same_column(c, col)) {
            Some(i) => {
                columns.remove(i);
            }
            None => columns = vec![col.clone()],
        }
        self.set_group_criteria(columns);
        true
    }

    // --- derived order ------------------------------------------------------

    /// Row comparator over the current sort criteria. Ties are broken by
    /// the row index, so the order is total.
    pub fn comparator(&self) -> impl Fn(&DataRow, &DataRow) -> Ordering + Send + Sync + 'static {
        let criteria = self.sort_criteria();
        move |a, b| {
            for criterion in &criteria {
                let r = criterion.col.compare(a, b);
                if r.is_ne() {
                    return if criterion.asc { r } else { r.reverse() };
                }
            }
            a.index.cmp(&b.index)
        }
    }

    /// Row grouper over the current group columns.
    pub fn grouper(&self) -> impl Fn(&DataRow) -> Group + Send + Sync + 'static {
        let columns = self.group_columns();
        move |row| match columns.as_slice() {
            [] => Group::default_group(),
            [single] => single.group(row),
            many => join_groups(&many.iter().map(|c| c.group(row)).collect::<Vec<_>>()),
        }
    }

    /// Group comparator over the current group-sort criteria, falling back
    /// to the case-insensitive group name.
    pub fn group_comparator(&self) -> impl Fn(&GroupData, &GroupData) -> Ordering + Send + Sync + 'static {
        let criteria = self.group_sort_criteria();
        move |a, b| {
            for criterion in &criteria {
                let r = criterion.col.group_compare(a, b);
                if r.is_ne() {
                    return if criterion.asc { r } else { r.reverse() };
                }
            }
            compare_group_names(a, b)
        }
    }

    /// Whether any column filters rows.
    pub fn is_filtered(&self) -> bool {
        self.children().iter().any(|c| c.is_filtered())
    }

    /// Whether `row` passes every column's filter.
    pub fn filter(&self, row: &DataRow) -> bool {
        self.children().iter().all(|c| c.filter(row))
    }

    /// Announce that the order must be recomputed.
    pub fn dirty_order(&self, reasons: Vec<DirtyReason>) {
        tracing::trace!(target: targets::RANKING, ranking = %self.id(), ?reasons, "dirty order");
        self.events.emit(
            &[EventKind::DirtyOrder, EventKind::DirtyValues, EventKind::Dirty],
            EventPayload::Reasons(reasons),
        );
    }

    /// Install a reorder result.
    pub fn set_groups(&self, groups: Vec<OrderedGroup>, index2pos: Vec<Option<usize>>, reasons: Vec<DirtyReason>) {
        let order: Vec<usize> = groups.iter().flat_map(|g| g.order.iter().copied()).collect();
        let (previous, previous_groups) = {
            let mut state = self.state.write();
            state.index2pos = index2pos;
            (
                std::mem::replace(&mut state.order, order.clone()),
                std::mem::replace(&mut state.groups, groups.clone()),
            )
        };
        let groups_changed = previous_groups.len() != groups.len()
            || previous_groups
                .iter()
                .zip(&groups)
                .any(|(a, b)| a.group != b.group);
        let mut kinds = vec![EventKind::OrderChanged];
        if groups_changed {
            kinds.push(EventKind::GroupsChanged);
        }
        kinds.extend([EventKind::DirtyValues, EventKind::Dirty]);
        self.events.emit(
            &kinds,
            EventPayload::Order(Box::new(OrderChange {
                previous,
                current: order,
                previous_groups,
                current_groups: groups,
                reasons,
            })),
        );
    }

    /// A fresh copy of the groups.
    pub fn groups(&self) -> Vec<OrderedGroup> {
        self.state.read().groups.clone()
    }

    /// The flattened order over all groups.
    pub fn order(&self) -> Vec<usize> {
        self.state.read().order.clone()
    }

    /// Position of every row index in the order, `None` for filtered rows.
    pub fn index2pos(&self) -> Vec<Option<usize>> {
        self.state.read().index2pos.clone()
    }

    /// Zero-based rank of row `index`.
    pub fn rank_of(&self, index: usize) -> Option<usize> {
        self.state.read().index2pos.get(index).copied().flatten()
    }

    // --- dump ---------------------------------------------------------------

    pub fn dump(&self, to_desc_ref: &dyn Fn(&ColumnDesc) -> DescRef) -> RankingDump {
        let criteria = |list: Vec<SortCriterion>| {
            list.iter()
                .map(|c| CriterionDump {
                    sort_by: c.col.id(),
                    asc: c.asc,
                })
                .collect()
        };
        RankingDump {
            id: Some(self.id()),
            columns: self.children().iter().map(|c| c.dump(to_desc_ref)).collect(),
            sort_criteria: criteria(self.sort_criteria()),
            group_columns: self.group_columns().iter().map(|c| c.id()).collect(),
            group_sort_criteria: criteria(self.group_sort_criteria()),
        }
    }

    /// Replace columns and criteria with the dumped ones. Columns the
    /// factory cannot restore and criteria naming unknown ids are dropped.
    #[tracing::instrument(skip_all, fields(ranking = %self.id()))]
    pub fn restore(&self, dump: &RankingDump, factory: &dyn TypeFactory) {
        self.set_sort_criteria(Vec::new());
        self.set_group_sort_criteria(Vec::new());
        self.set_group_criteria(Vec::new());
        self.clear();
        for child in &dump.columns {
            match factory.restore_column(child) {
                Some(col) => {
                    self.push(col);
                }
                None => {
                    tracing::warn!(target: targets::DUMP, column = %child.id, "dropping unrestorable column");
                }
            }
        }
        let resolve = |list: &[CriterionDump]| -> Vec<SortCriterion> {
            list.iter()
                .filter_map(|c| match self.find(&c.sort_by) {
                    Some(col) => Some(SortCriterion::new(col, c.asc)),
                    None => {
                        tracing::warn!(target: targets::DUMP, id = %c.sort_by, "unknown criterion column");
                        None
                    }
                })
                .collect()
        };
        self.set_sort_criteria(resolve(&dump.sort_criteria));
        self.set_group_sort_criteria(resolve(&dump.group_sort_criteria));
        let group_columns = dump
            .group_columns
            .iter()
            .filter_map(|id| {
                let col = self.find(id);
                if col.is_none() {
                    tracing::warn!(target: targets::DUMP, %id, "unknown group column");
                }
                col
            })
            .collect();
        self.set_group_criteria(group_columns);
    }

    pub fn debug_node(&self) -> DebugNode {
        let describe = |list: Vec<SortCriterion>| {
            list.iter()
                .map(|c| format!("{} {}", c.col.id(), if c.asc { "asc" } else { "desc" }))
                .collect::<Vec<_>>()
                .join(", ")
        };
        let grouped = self
            .group_columns()
            .iter()
            .map(|c| c.id())
            .collect::<Vec<_>>()
            .join(", ");
        let group_count = self.state.read().groups.len();
        DebugNode::new(self.id(), self.id(), "ranking")
            .with_property("sort", describe(self.sort_criteria()))
            .with_property("groupBy", grouped)
            .with_property("groupSort", describe(self.group_sort_criteria()))
            .with_property("groups", group_count)
            .with_children(self.children().iter().map(|c| c.debug_node()).collect())
    }
}

impl fmt::Debug for Ranking {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ranking")
            .field("id", &self.id())
            .field("columns", &self.len())
            .field("sort_criteria", &self.sort_criteria())
            .finish_non_exhaustive()
    }
}

static_assertions::assert_impl_all!(Ranking: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::{CategoricalColumn, CompositeColumn, NumberColumn, NumberValued, StringColumn};
    use crate::row::to_rows;
    use parking_lot::Mutex;
    use serde_json::json;

    fn number(id: &str, field: &str) -> ColumnRef {
        NumberColumn::create(id, Arc::new(ColumnDesc::data("number", field)))
    }

    fn sorted(ranking: &Ranking, rows: &[DataRow]) -> Vec<usize> {
        let cmp = ranking.comparator();
        let mut rows = rows.to_vec();
        rows.sort_by(|a, b| cmp(a, b));
        rows.iter().map(|r| r.index).collect()
    }

    #[test]
    fn test_no_criteria_orders_by_index() {
        let ranking = Ranking::new("rank0", RankingConfig::default());
        let mut rows = to_rows(vec![json!({}), json!({}), json!({})]);
        rows.reverse();
        assert_eq!(sorted(&ranking, &rows), vec![0, 1, 2]);
    }

    #[test]
    fn test_descending_number() {
        let ranking = Ranking::new("rank0", RankingConfig::default());
        let col = number("col1", "v");
        ranking.push(col.clone());
        assert!(ranking.sort_by(&col, false, Some(0)));
        let rows = to_rows(vec![json!({"v": 5}), json!({"v": 1}), json!({"v": 3})]);
        assert_eq!(sorted(&ranking, &rows), vec![0, 2, 1]);
    }

    #[test]
    fn test_join_of_two_group_columns() {
        let ranking = Ranking::new(
            "rank0",
            RankingConfig {
                max_group_columns: 2,
                ..RankingConfig::default()
            },
        );
        let color: ColumnRef = CategoricalColumn::create(
            "color",
            Arc::new(ColumnDesc::data("categorical", "color").with_categories(["Red", "Blue"])),
        );
        let size: ColumnRef = CategoricalColumn::create(
            "size",
            Arc::new(ColumnDesc::data("categorical", "size").with_categories(["Small", "Large"])),
        );
        ranking.push(color.clone());
        ranking.push(size.clone());
        assert!(ranking.group_by(&color, Some(0)));
        assert!(ranking.group_by(&size, Some(1)));

        let rows = to_rows(vec![
            json!({"color": "Red", "size": "Small"}),
            json!({"color": "Red", "size": "Large"}),
        ]);
        let grouper = ranking.grouper();
        let a = grouper(&rows[0]);
        let b = grouper(&rows[1]);
        assert_eq!(a.name, "Red ∩ Small");
        assert_eq!(b.name, "Red ∩ Large");
        assert_eq!(a.parent.as_ref().map(|p| p.name.as_str()), Some("Red"));
        assert_eq!(a.parent, b.parent);
    }

    #[test]
    fn test_criteria_limits_and_hierarchy() {
        let ranking = Ranking::new("rank0", RankingConfig::default());
        let cols: Vec<ColumnRef> = (0..4).map(|i| number(&format!("c{i}"), "v")).collect();
        for c in &cols {
            ranking.push(c.clone());
        }
        for c in &cols {
            ranking.sort_by(c, true, Some(1));
            ranking.group_by(c, Some(3));
            assert!(ranking.sort_criteria().len() <= 2);
            assert!(ranking.group_columns().len() <= 1);
        }
        let ids = |r: &Ranking| r.sort_criteria().iter().map(|c| c.col.id()).collect::<Vec<_>>();
        assert_eq!(ids(&ranking), vec!["c0", "c3"]);

        ranking.sort_by(&cols[0], false, Some(0));
        assert_eq!(ids(&ranking), vec!["c0", "c3"]);
        ranking.sort_by(&cols[1], false, Some(1));
        assert_eq!(ids(&ranking), vec!["c0", "c1"]);
        ranking.sort_by(&cols[1], true, Some(0));
        assert_eq!(ids(&ranking), vec!["c1", "c0"]);
        ranking.sort_by(&cols[0], true, None);
        assert_eq!(ids(&ranking), vec!["c1"]);
    }

    #[test]
    fn test_foreign_column_is_rejected() {
        let first = Ranking::new("a", RankingConfig::default());
        let second = Ranking::new("b", RankingConfig::default());
        let col = number("c", "v");
        first.push(col.clone());
        assert!(!second.sort_by(&col, true, Some(0)));
        assert!(!second.group_by(&col, Some(0)));
        assert!(second.sort_criteria().is_empty());
    }

    #[test]
    fn test_toggle_sorting_cycle() {
        let ranking = Ranking::new("rank0", RankingConfig::default());
        let name: ColumnRef = StringColumn::create("name", Arc::new(ColumnDesc::data("string", "name")));
        let score = number("score", "v");
        ranking.push(name.clone());
        ranking.push(score.clone());

        ranking.toggle_sorting(&score);
        assert_eq!(ranking.sort_criteria(), vec![SortCriterion::new(score.clone(), false)]);
        ranking.toggle_sorting(&score);
        assert_eq!(ranking.sort_criteria(), vec![SortCriterion::new(score.clone(), true)]);
        ranking.toggle_sorting(&score);
        assert!(ranking.sort_criteria().is_empty());
        ranking.toggle_sorting(&name);
        assert_eq!(ranking.sort_criteria(), vec![SortCriterion::new(name.clone(), true)]);

        ranking.toggle_grouping(&name);
        assert_eq!(ranking.group_columns().len(), 1);
        ranking.toggle_grouping(&name);
        assert!(ranking.group_columns().is_empty());
    }

    #[test]
    fn test_dirty_order_reasons() {
        let ranking = Ranking::new("rank0", RankingConfig::default());
        let col = NumberColumn::create("score", Arc::new(ColumnDesc::data("number", "v")));
        let col_ref: ColumnRef = col.clone();
        ranking.push(col_ref.clone());

        let reasons = Arc::new(Mutex::new(Vec::new()));
        let seen = reasons.clone();
        let _sub = ranking.events().subscribe(&[EventKind::DirtyOrder], move |ctx| {
            if let EventPayload::Reasons(r) = &*ctx.payload {
                seen.lock().extend(r.iter().copied());
            }
        });

        ranking.sort_by(&col_ref, false, Some(0));
        col.set_sort_method(crate::column::SortMethod::Max);
        col.set_filter(crate::column::NumberFilter::range(0.0, 1.0));
        ranking.sort_by(&col_ref, false, Some(0));

        assert_eq!(
            *reasons.lock(),
            vec![
                DirtyReason::SortCriteriaChanged,
                DirtyReason::SortCriteriaDirty,
                DirtyReason::FilterChanged,
                DirtyReason::SortCriteriaDirty,
            ]
        );
    }

    #[test]
    fn test_remove_strips_criteria() {
        let ranking = Ranking::new("rank0", RankingConfig::default());
        let a = number("a", "v");
        let b = number("b", "w");
        ranking.push(a.clone());
        ranking.push(b.clone());
        ranking.sort_by(&a, true, Some(0));
        ranking.sort_by(&b, true, Some(1));
        ranking.group_by(&a, Some(0));

        assert!(a.base().remove_me());
        assert_eq!(ranking.sort_criteria(), vec![SortCriterion::new(b.clone(), true)]);
        assert!(ranking.group_columns().is_empty());
        assert!(a.find_my_ranker().is_none());
        assert_eq!(ranking.len(), 1);
    }

    #[test]
    fn test_paths_and_moves() {
        let ranking = Ranking::new("rank0", RankingConfig::default());
        let stack = crate::column::StackColumn::create("stack", Arc::new(ColumnDesc::new("stack", "Stack")));
        let inner = number("inner", "v");
        stack.push(inner.clone());
        ranking.push(number("first", "v"));
        ranking.push(stack.clone());

        assert_eq!(inner.base().fqpath(), "@1@0");
        assert_eq!(inner.base().fqid(), "rank0_stack_inner");
        assert!(ranking.find_by_path("@1@0").is_some_and(|c| same_column(&c, &inner)));
        assert!(ranking.find("inner").is_some());
        assert!(ranking.find_by_path("@7").is_none());

        let stack_ref: ColumnRef = stack;
        ranking.move_column(&stack_ref, 0);
        assert_eq!(ranking.index_of(&stack_ref), Some(0));
        assert_eq!(ranking.flat_columns().len(), 3);
    }

    #[test]
    fn test_set_groups_events() {
        let ranking = Ranking::new("rank0", RankingConfig::default());
        let kinds = Arc::new(Mutex::new(Vec::new()));
        let seen = kinds.clone();
        let _sub = ranking.events().subscribe(&[EventKind::OrderChanged, EventKind::GroupsChanged], move |ctx| {
            seen.lock().push(ctx.kind);
        });

        let groups = vec![OrderedGroup::new(Group::default_group(), vec![2, 0, 1])];
        ranking.set_groups(groups.clone(), vec![Some(1), Some(2), Some(0)], vec![DirtyReason::Unknown]);
        ranking.set_groups(groups, vec![Some(1), Some(2), Some(0)], vec![DirtyReason::Unknown]);
        assert_eq!(
            *kinds.lock(),
            vec![EventKind::OrderChanged, EventKind::GroupsChanged, EventKind::OrderChanged]
        );
        assert_eq!(ranking.order(), vec![2, 0, 1]);
        assert_eq!(ranking.rank_of(0), Some(1));
    }
}
