//! Support columns: row rank, selection checkbox and group aggregation
//! toggle.
//!
//! Selection and aggregation live in the provider. These columns reach it
//! through the [`SupportHost`] bound to their description; without a host
//! a selection column reads its raw row value and an aggregate column
//! reports every group as expanded.

use std::any::Any;
use std::cmp::Ordering;
use std::fmt;
use std::sync::{Arc, Weak};

use serde_json::Value;

use super::{Column, ColumnBase, ColumnDesc};
use crate::group::Group;
use crate::ranking::Ranking;
use crate::row::DataRow;

pub const RANK_TYPE: &str = "rank";
pub const SELECTION_TYPE: &str = "selection";
pub const AGGREGATE_TYPE: &str = "aggregate";

pub const RANK_WIDTH: f64 = 50.0;
pub const SELECTION_WIDTH: f64 = 20.0;
pub const AGGREGATE_WIDTH: f64 = 20.0;

/// Whether `kind` is one of the support column types.
pub fn is_support_type(kind: &str) -> bool {
    matches!(kind, RANK_TYPE | SELECTION_TYPE | AGGREGATE_TYPE)
}

/// Owner of the selection and aggregation state support columns display.
pub trait SupportHost: Send + Sync {
    fn is_selected(&self, index: usize) -> bool;

    /// Select or deselect row `index`. Returns whether anything changed.
    fn set_selected(&self, index: usize, selected: bool) -> bool;

    fn is_aggregated(&self, ranking: &Ranking, group: &Group) -> bool;

    /// Collapse or expand `group`. Returns whether anything changed.
    fn set_aggregated(&self, ranking: &Ranking, group: &Arc<Group>, aggregated: bool) -> bool;
}

/// Weak handle to a [`SupportHost`], carried by column descriptions.
#[derive(Clone)]
pub struct HostRef(Weak<dyn SupportHost>);

impl HostRef {
    pub fn new(host: Weak<dyn SupportHost>) -> Self {
        Self(host)
    }

    pub fn get(&self) -> Option<Arc<dyn SupportHost>> {
        self.0.upgrade()
    }
}

impl PartialEq for HostRef {
    fn eq(&self, other: &Self) -> bool {
        Weak::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for HostRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("HostRef(..)")
    }
}

/// `desc` bound to `host` if it is a support description without a host.
pub fn bind_host(desc: Arc<ColumnDesc>, host: &HostRef) -> Arc<ColumnDesc> {
    if !is_support_type(&desc.kind) || desc.host.is_some() {
        return desc;
    }
    Arc::new(ColumnDesc {
        host: Some(host.clone()),
        ..(*desc).clone()
    })
}

fn host_of(base: &ColumnBase) -> Option<Arc<dyn SupportHost>> {
    base.desc().host.as_ref()?.get()
}

fn support_base(id: String, desc: Arc<ColumnDesc>, me: Weak<dyn Column>, width: f64) -> ColumnBase {
    let explicit = desc.width.is_some();
    let base = ColumnBase::new(id, desc, me);
    if !explicit {
        base.set_width_silent(width);
    }
    base
}

/// The 1-based position of each row in its ranking.
pub struct RankColumn {
    base: ColumnBase,
}

impl RankColumn {
    pub fn default_desc() -> ColumnDesc {
        ColumnDesc::new(RANK_TYPE, "Rank")
    }

    pub fn create(id: impl Into<String>, desc: Arc<ColumnDesc>) -> Arc<Self> {
        let id = id.into();
        Arc::new_cyclic(|me: &Weak<Self>| {
            let me: Weak<dyn Column> = me.clone();
            Self {
                base: support_base(id, desc, me, RANK_WIDTH),
            }
        })
    }

    /// Rank of `row`, `None` when detached or filtered out.
    pub fn rank(&self, row: &DataRow) -> Option<usize> {
        let ranking = self.base.find_my_ranker()?;
        ranking.rank_of(row.index).map(|pos| pos + 1)
    }
}

impl Column for RankColumn {
    fn base(&self) -> &ColumnBase {
        &self.base
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn value(&self, row: &DataRow) -> Value {
        self.rank(row).map_or(Value::Null, Value::from)
    }
}

/// Checkbox column mirroring the provider's selection.
pub struct SelectionColumn {
    base: ColumnBase,
}

impl SelectionColumn {
    pub const SELECTED_GROUP: &'static str = "Selected";
    pub const UNSELECTED_GROUP: &'static str = "Unselected";

    pub fn default_desc() -> ColumnDesc {
        ColumnDesc {
            description: Some("Selection".into()),
            ..ColumnDesc::new(SELECTION_TYPE, "S")
        }
    }

    pub fn create(id: impl Into<String>, desc: Arc<ColumnDesc>) -> Arc<Self> {
        let id = id.into();
        Arc::new_cyclic(|me: &Weak<Self>| {
            let me: Weak<dyn Column> = me.clone();
            Self {
                base: support_base(id, desc, me, SELECTION_WIDTH),
            }
        })
    }

    pub fn is_selected(&self, row: &DataRow) -> bool {
        match host_of(&self.base) {
            Some(host) => host.is_selected(row.index),
            None => matches!(self.base.raw_value(row), Some(Value::Bool(true))),
        }
    }

    /// Select or deselect `row`. `false` when unchanged or without a host.
    pub fn set_value(&self, row: &DataRow, selected: bool) -> bool {
        if self.is_selected(row) == selected {
            return false;
        }
        host_of(&self.base).is_some_and(|host| host.set_selected(row.index, selected))
    }

    /// Apply one selection state to many rows.
    pub fn set_values(&self, rows: &[DataRow], selected: bool) -> bool {
        let Some(host) = host_of(&self.base) else {
            return false;
        };
        let mut changed = false;
        for row in rows {
            changed |= host.set_selected(row.index, selected);
        }
        changed
    }

    /// Flip the selection of `row`; returns the new state.
    pub fn toggle_value(&self, row: &DataRow) -> bool {
        let selected = !self.is_selected(row);
        self.set_value(row, selected);
        selected
    }
}

impl Column for SelectionColumn {
    fn base(&self) -> &ColumnBase {
        &self.base
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn value(&self, row: &DataRow) -> Value {
        Value::Bool(self.is_selected(row))
    }

    fn compare(&self, a: &DataRow, b: &DataRow) -> Ordering {
        self.is_selected(a).cmp(&self.is_selected(b))
    }

    fn group(&self, row: &DataRow) -> Group {
        if self.is_selected(row) {
            Group::new(Self::SELECTED_GROUP, "orange")
        } else {
            Group::new(Self::UNSELECTED_GROUP, "gray")
        }
    }

    fn default_sort_ascending(&self) -> bool {
        false
    }
}

/// Per-group collapse toggle of the owning ranking.
pub struct AggregateGroupColumn {
    base: ColumnBase,
}

impl AggregateGroupColumn {
    pub fn default_desc() -> ColumnDesc {
        ColumnDesc {
            description: Some("Aggregate Groups".into()),
            ..ColumnDesc::new(AGGREGATE_TYPE, "A")
        }
    }

    pub fn create(id: impl Into<String>, desc: Arc<ColumnDesc>) -> Arc<Self> {
        let id = id.into();
        Arc::new_cyclic(|me: &Weak<Self>| {
            let me: Weak<dyn Column> = me.clone();
            Self {
                base: support_base(id, desc, me, AGGREGATE_WIDTH),
            }
        })
    }

    pub fn is_aggregated(&self, group: &Group) -> bool {
        match (self.base.find_my_ranker(), host_of(&self.base)) {
            (Some(ranking), Some(host)) => host.is_aggregated(&ranking, group),
            _ => false,
        }
    }

    /// Collapse or expand `group`. `false` when unchanged, detached or
    /// without a host.
    pub fn set_aggregated(&self, group: &Arc<Group>, aggregated: bool) -> bool {
        match (self.base.find_my_ranker(), host_of(&self.base)) {
            (Some(ranking), Some(host)) => host.set_aggregated(&ranking, group, aggregated),
            _ => false,
        }
    }
}

impl Column for AggregateGroupColumn {
    fn base(&self) -> &ColumnBase {
        &self.base
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ranking::RankingConfig;
    use crate::row::to_rows;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::collections::BTreeSet;

    #[derive(Default)]
    struct Host {
        selection: Mutex<BTreeSet<usize>>,
        collapsed: Mutex<Vec<String>>,
    }

    impl SupportHost for Host {
        fn is_selected(&self, index: usize) -> bool {
            self.selection.lock().contains(&index)
        }

        fn set_selected(&self, index: usize, selected: bool) -> bool {
            let mut selection = self.selection.lock();
            if selected { selection.insert(index) } else { selection.remove(&index) }
        }

        fn is_aggregated(&self, ranking: &Ranking, group: &Group) -> bool {
            self.collapsed.lock().contains(&format!("{}@{}", ranking.id(), group.name))
        }

        fn set_aggregated(&self, ranking: &Ranking, group: &Arc<Group>, aggregated: bool) -> bool {
            let key = format!("{}@{}", ranking.id(), group.name);
            let mut collapsed = self.collapsed.lock();
            let present = collapsed.contains(&key);
            match (present, aggregated) {
                (false, true) => collapsed.push(key),
                (true, false) => collapsed.retain(|k| k != &key),
                _ => return false,
            }
            true
        }
    }

    fn bound(desc: ColumnDesc, host: &Arc<Host>) -> Arc<ColumnDesc> {
        let weak: Weak<dyn SupportHost> = Arc::downgrade(host) as Weak<dyn SupportHost>;
        bind_host(Arc::new(desc), &HostRef::new(weak))
    }

    #[test]
    fn test_default_widths_and_kinds() {
        let rank = RankColumn::create("r", Arc::new(RankColumn::default_desc()));
        let selection = SelectionColumn::create("s", Arc::new(SelectionColumn::default_desc()));
        let aggregate = AggregateGroupColumn::create("a", Arc::new(AggregateGroupColumn::default_desc()));
        assert_eq!(rank.base().width(), RANK_WIDTH);
        assert_eq!(selection.base().width(), SELECTION_WIDTH);
        assert_eq!(aggregate.base().width(), AGGREGATE_WIDTH);
        assert_eq!(selection.base().label(), "S");

        let wide = RankColumn::create("r", Arc::new(ColumnDesc { width: Some(80.0), ..RankColumn::default_desc() }));
        assert_eq!(wide.base().width(), 80.0);
        assert!(is_support_type("aggregate"));
        assert!(!is_support_type("number"));
    }

    #[test]
    fn test_rank_follows_ranking_order() {
        let ranking = Ranking::new("rank0", RankingConfig::default());
        let rank = RankColumn::create("r", Arc::new(RankColumn::default_desc()));
        let rows = to_rows(vec![json!({}), json!({}), json!({})]);
        assert_eq!(rank.rank(&rows[0]), None);

        ranking.push(rank.clone());
        ranking.set_groups(
            vec![crate::group::OrderedGroup::new(Group::default_group(), vec![2, 0])],
            vec![Some(1), None, Some(0)],
            Vec::new(),
        );
        assert_eq!(rank.value(&rows[2]), json!(1));
        assert_eq!(rank.value(&rows[0]), json!(2));
        assert_eq!(rank.value(&rows[1]), Value::Null);
    }

    #[test]
    fn test_selection_through_host() {
        let host = Arc::new(Host::default());
        let col = SelectionColumn::create("s", bound(SelectionColumn::default_desc(), &host));
        let rows = to_rows(vec![json!({}), json!({}), json!({})]);

        assert!(col.set_value(&rows[1], true));
        assert!(!col.set_value(&rows[1], true));
        assert!(col.toggle_value(&rows[2]));
        assert!(host.is_selected(2));
        assert_eq!(col.value(&rows[1]), json!(true));
        assert_eq!(col.compare(&rows[0], &rows[1]), Ordering::Less);
        assert_eq!(col.group(&rows[1]).name, SelectionColumn::SELECTED_GROUP);
        assert_eq!(col.group(&rows[0]).name, SelectionColumn::UNSELECTED_GROUP);

        assert!(col.set_values(&rows, false));
        assert!(host.selection.lock().is_empty());
    }

    #[test]
    fn test_selection_without_host_reads_rows() {
        let col = SelectionColumn::create("s", Arc::new(ColumnDesc::data(SELECTION_TYPE, "picked")));
        let rows = to_rows(vec![json!({"picked": true}), json!({"picked": "yes"})]);
        assert!(col.is_selected(&rows[0]));
        assert!(!col.is_selected(&rows[1]));
        assert!(!col.set_value(&rows[1], true));
    }

    #[test]
    fn test_aggregate_needs_ranking_and_host() {
        let host = Arc::new(Host::default());
        let col = AggregateGroupColumn::create("a", bound(AggregateGroupColumn::default_desc(), &host));
        let group = Arc::new(Group::new("x", "red"));
        assert!(!col.set_aggregated(&group, true));

        let ranking = Ranking::new("rank3", RankingConfig::default());
        ranking.push(col.clone());
        assert!(col.set_aggregated(&group, true));
        assert!(!col.set_aggregated(&group, true));
        assert!(col.is_aggregated(&group));
        assert_eq!(*host.collapsed.lock(), vec!["rank3@x".to_string()]);
    }

    #[test]
    fn test_bind_host_only_touches_unbound_support_descs() {
        let host = Arc::new(Host::default());
        let weak: Weak<dyn SupportHost> = Arc::downgrade(&host) as Weak<dyn SupportHost>;
        let href = HostRef::new(weak);

        let number = Arc::new(ColumnDesc::data("number", "v"));
        assert!(Arc::ptr_eq(&bind_host(number.clone(), &href), &number));

        let selection = bind_host(Arc::new(SelectionColumn::default_desc()), &href);
        assert_eq!(selection.host.as_ref(), Some(&href));
        assert!(Arc::ptr_eq(&bind_host(selection.clone(), &href), &selection));
    }
}
