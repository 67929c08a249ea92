//! The column tree.
//!
//! Every column embeds a [`ColumnBase`] holding its identity, description,
//! parent link, width/visibility/metadata state and its event dispatcher.
//! Kind-specific behavior (values, comparison, grouping, filtering, dump
//! fields) comes from the [`Column`] trait.
//!
//! Columns are shared as [`ColumnRef`] (`Arc<dyn Column>`). A column knows its
//! parent through a weak link, which is either a composite column or a
//! ranking; the parent owns the strong reference.
//!
//! ```
//! use lineup::column::{Column, ColumnDesc, NumberColumn};
//! use lineup_core::EventKind;
//!
//! let col = NumberColumn::create("col1", ColumnDesc::data("number", "score").into());
//! let _sub = col.base().events().subscribe(&[EventKind::WidthChanged], |ctx| {
//!     assert_eq!(ctx.primary, EventKind::WidthChanged);
//! });
//! col.base().apply_width(150.0);
//! assert_eq!(col.base().width(), 150.0);
//! ```

mod boolean;
mod boxplot;
mod categorical;
pub mod composite;
mod date;
mod desc;
mod dump;
mod number;
mod set;
pub mod strategy;
mod string;
mod support;

use std::any::Any;
use std::cmp::Ordering;
use std::fmt;
use std::sync::{Arc, Weak};

use lineup_core::logging::targets;
use lineup_core::{DebugNode, EventKind, Property, Subscription};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::events::{Dispatcher, EventPayload};
use crate::group::{Group, GroupData};
use crate::ranking::Ranking;
use crate::registry::TypeFactory;
use crate::row::DataRow;

pub use boolean::BooleanColumn;
pub use boxplot::BoxPlotColumn;
pub use categorical::{CATEGORY_PALETTE, CategoricalColumn, Category};
pub use composite::{
    CompositeBase, CompositeColumn, ImpositionColumn, NestedColumn, ReduceColumn, StackColumn,
};
pub use date::DateColumn;
pub use desc::{Accessor, CategoryDesc, ColumnDesc, DescRef};
pub use dump::{ColumnDump, read_extra, write_extra};
pub use number::{NumberColumn, NumberFilter};
pub use set::{EMPTY_SET_GROUP_NAME, SetColumn, SetFilter, SetMatch};
pub use strategy::SortMethod;
pub use string::{StringColumn, StringFilter};
pub use support::{
    AGGREGATE_TYPE, AggregateGroupColumn, HostRef, RANK_TYPE, RankColumn, SELECTION_TYPE,
    SelectionColumn, SupportHost, bind_host, is_support_type,
};

/// Shared handle to a column of any kind.
pub type ColumnRef = Arc<dyn Column>;

/// Default width of a new column.
pub const DEFAULT_WIDTH: f64 = 100.0;

/// Widths closer than this are considered equal.
pub const WIDTH_TOLERANCE: f64 = 0.5;

/// Whether two handles point at the same column.
pub fn same_column(a: &ColumnRef, b: &ColumnRef) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Display metadata of a column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnMetadata {
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default)]
    pub description: String,
}

/// Where a column currently sits in the tree.
#[derive(Clone, Default)]
pub(crate) enum ColumnParent {
    #[default]
    None,
    Composite(Weak<dyn Column>),
    Ranking(Weak<Ranking>),
}

/// Sort position of a column within a criteria list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortPosition {
    pub ascending: bool,
    pub priority: usize,
}

/// A child held by a composite or a ranking, together with the
/// subscriptions the parent keeps on it.
pub(crate) struct ChildEntry {
    pub column: ColumnRef,
    _subscriptions: Vec<Subscription>,
}

impl ChildEntry {
    pub fn new(column: ColumnRef, subscriptions: Vec<Subscription>) -> Self {
        Self {
            column,
            _subscriptions: subscriptions,
        }
    }
}

/// State shared by every column kind.
pub struct ColumnBase {
    id: RwLock<String>,
    desc: Arc<ColumnDesc>,
    me: Weak<dyn Column>,
    parent: RwLock<ColumnParent>,
    width: Property<f64>,
    visible: Property<bool>,
    metadata: Property<ColumnMetadata>,
    renderer: Property<String>,
    group_renderer: Property<String>,
    events: Dispatcher,
}

impl ColumnBase {
    /// Create the base of a column. `me` is the weak self-reference obtained
    /// from `Arc::new_cyclic`.
    pub fn new(id: impl Into<String>, desc: Arc<ColumnDesc>, me: Weak<dyn Column>) -> Self {
        let id = id.into();
        let label = if desc.label.is_empty() {
            id.clone()
        } else {
            desc.label.clone()
        };
        Self {
            width: Property::new(desc.width.unwrap_or(DEFAULT_WIDTH)),
            visible: Property::new(desc.visible.unwrap_or(true)),
            metadata: Property::new(ColumnMetadata {
                label,
                color: desc.color.clone(),
                description: desc.description.clone().unwrap_or_default(),
            }),
            renderer: Property::new(default_renderer(&desc)),
            group_renderer: Property::new(default_group_renderer(&desc)),
            id: RwLock::new(id),
            desc,
            me,
            parent: RwLock::new(ColumnParent::None),
            events: Dispatcher::new(),
        }
    }

    pub fn id(&self) -> String {
        self.id.read().clone()
    }

    pub(crate) fn set_id(&self, id: String) {
        *self.id.write() = id;
    }

    pub fn desc(&self) -> &Arc<ColumnDesc> {
        &self.desc
    }

    /// The registered type tag.
    pub fn kind(&self) -> &str {
        &self.desc.kind
    }

    pub fn events(&self) -> &Dispatcher {
        &self.events
    }

    /// A strong handle to the column owning this base.
    pub fn me(&self) -> Option<ColumnRef> {
        self.me.upgrade()
    }

    /// The raw value of `row` for this column: through the accessor if the
    /// description has one, else the row field named by `desc.column`.
    pub fn raw_value(&self, row: &DataRow) -> Option<Value> {
        if let Some(accessor) = &self.desc.accessor {
            return Some(accessor.get(row));
        }
        let field = self.desc.column.as_deref()?;
        row.field(field).cloned()
    }

    // --- width / visibility -------------------------------------------------

    pub fn width(&self) -> f64 {
        self.width.get()
    }

    pub(crate) fn set_width_silent(&self, width: f64) {
        self.width.set_silent(width);
    }

    /// Set the width and emit `widthChanged`. Changes within
    /// [`WIDTH_TOLERANCE`] are ignored.
    pub fn apply_width(&self, width: f64) {
        let same = |a: &f64, b: &f64| (a - b).abs() < WIDTH_TOLERANCE;
        if let Some(previous) = self.width.replace_if_different(width, same) {
            self.events.emit(
                &[
                    EventKind::WidthChanged,
                    EventKind::DirtyHeader,
                    EventKind::DirtyValues,
                    EventKind::Dirty,
                ],
                EventPayload::Width {
                    previous,
                    current: width,
                },
            );
        }
    }

    pub fn is_visible(&self) -> bool {
        self.visible.get()
    }

    pub fn set_visible(&self, visible: bool) {
        if let Some(previous) = self.visible.replace(visible) {
            self.events.emit(
                &[
                    EventKind::VisibilityChanged,
                    EventKind::DirtyHeader,
                    EventKind::DirtyValues,
                    EventKind::Dirty,
                ],
                EventPayload::Flag {
                    previous,
                    current: visible,
                },
            );
        }
    }

    // --- metadata / renderers -----------------------------------------------

    pub fn label(&self) -> String {
        self.metadata.with(|m| m.label.clone())
    }

    pub fn metadata(&self) -> ColumnMetadata {
        self.metadata.get()
    }

    pub fn set_metadata(&self, metadata: ColumnMetadata) {
        let Some(previous) = self.metadata.replace(metadata.clone()) else {
            return;
        };
        let mut kinds = Vec::with_capacity(5);
        if previous.label != metadata.label {
            kinds.push(EventKind::LabelChanged);
        }
        kinds.extend([
            EventKind::MetaDataChanged,
            EventKind::DirtyHeader,
            EventKind::DirtyValues,
            EventKind::Dirty,
        ]);
        self.events.emit(
            &kinds,
            EventPayload::MetaData {
                previous,
                current: metadata,
            },
        );
    }

    pub fn set_label(&self, label: impl Into<String>) {
        let mut metadata = self.metadata();
        metadata.label = label.into();
        self.set_metadata(metadata);
    }

    pub fn renderer(&self) -> String {
        self.renderer.get()
    }

    pub fn set_renderer(&self, renderer: impl Into<String>) {
        let renderer = renderer.into();
        if let Some(previous) = self.renderer.replace(renderer.clone()) {
            self.events.emit(
                &[
                    EventKind::RendererTypeChanged,
                    EventKind::DirtyValues,
                    EventKind::Dirty,
                ],
                EventPayload::Text {
                    previous,
                    current: renderer,
                },
            );
        }
    }

    pub fn group_renderer(&self) -> String {
        self.group_renderer.get()
    }

    pub fn set_group_renderer(&self, renderer: impl Into<String>) {
        let renderer = renderer.into();
        if let Some(previous) = self.group_renderer.replace(renderer.clone()) {
            self.events.emit(
                &[
                    EventKind::GroupRendererChanged,
                    EventKind::DirtyValues,
                    EventKind::Dirty,
                ],
                EventPayload::Text {
                    previous,
                    current: renderer,
                },
            );
        }
    }

    // --- tree membership ----------------------------------------------------

    pub(crate) fn parent(&self) -> ColumnParent {
        self.parent.read().clone()
    }

    pub(crate) fn attach(&self, parent: ColumnParent) {
        *self.parent.write() = parent;
    }

    pub(crate) fn detach(&self) {
        *self.parent.write() = ColumnParent::None;
    }

    /// The composite column this column is a child of.
    pub fn parent_column(&self) -> Option<ColumnRef> {
        match &*self.parent.read() {
            ColumnParent::Composite(p) => p.upgrade(),
            _ => None,
        }
    }

    /// The ranking owning this column, walking up through composites.
    pub fn find_my_ranker(&self) -> Option<Arc<Ranking>> {
        match self.parent() {
            ColumnParent::None => None,
            ColumnParent::Ranking(r) => r.upgrade(),
            ColumnParent::Composite(p) => p.upgrade()?.base().find_my_ranker(),
        }
    }

    /// Fully qualified id: the parent's fqid and this id joined by `_`.
    pub fn fqid(&self) -> String {
        match self.parent() {
            ColumnParent::None => self.id(),
            ColumnParent::Ranking(r) => match r.upgrade() {
                Some(r) => format!("{}_{}", r.id(), self.id()),
                None => self.id(),
            },
            ColumnParent::Composite(p) => match p.upgrade() {
                Some(p) => format!("{}_{}", p.base().fqid(), self.id()),
                None => self.id(),
            },
        }
    }

    /// Index path from the ranking, e.g. `"@2@0"` for the first child of the
    /// third ranking column. Empty when detached.
    pub fn fqpath(&self) -> String {
        let Some(me) = self.me() else {
            return String::new();
        };
        match self.parent() {
            ColumnParent::None => String::new(),
            ColumnParent::Ranking(r) => r
                .upgrade()
                .and_then(|r| r.index_of(&me))
                .map(|i| format!("@{i}"))
                .unwrap_or_default(),
            ColumnParent::Composite(p) => p
                .upgrade()
                .and_then(|p| {
                    let index = p.as_composite()?.index_of(&me)?;
                    Some(format!("{}@{index}", p.base().fqpath()))
                })
                .unwrap_or_default(),
        }
    }

    /// Remove this column from its parent.
    pub fn remove_me(&self) -> bool {
        let Some(me) = self.me() else {
            return false;
        };
        match self.parent() {
            ColumnParent::None => false,
            ColumnParent::Ranking(r) => r.upgrade().is_some_and(|r| r.remove(&me)),
            ColumnParent::Composite(p) => p
                .upgrade()
                .and_then(|p| p.as_composite().map(|c| c.remove(&me)))
                .unwrap_or(false),
        }
    }

    /// Insert `col` right after this column in its parent.
    pub fn insert_after_me(&self, col: ColumnRef) -> Option<ColumnRef> {
        let me = self.me()?;
        match self.parent() {
            ColumnParent::None => None,
            ColumnParent::Ranking(r) => r.upgrade()?.insert_after(col, &me),
            ColumnParent::Composite(p) => p.upgrade()?.as_composite()?.insert_after(col, &me),
        }
    }

    pub fn sort_by_me(&self, ascending: bool, priority: Option<usize>) -> bool {
        match (self.find_my_ranker(), self.me()) {
            (Some(r), Some(me)) => r.sort_by(&me, ascending, priority),
            _ => false,
        }
    }

    pub fn group_sort_by_me(&self, ascending: bool, priority: Option<usize>) -> bool {
        match (self.find_my_ranker(), self.me()) {
            (Some(r), Some(me)) => r.group_sort_by(&me, ascending, priority),
            _ => false,
        }
    }

    pub fn toggle_my_sorting(&self) -> bool {
        match (self.find_my_ranker(), self.me()) {
            (Some(r), Some(me)) => r.toggle_sorting(&me),
            _ => false,
        }
    }

    /// Toggle grouping by this column.
    pub fn group_by_me(&self) -> bool {
        match (self.find_my_ranker(), self.me()) {
            (Some(r), Some(me)) => r.toggle_grouping(&me),
            _ => false,
        }
    }

    pub fn is_sorted_by_me(&self) -> Option<SortPosition> {
        let (r, me) = (self.find_my_ranker()?, self.me()?);
        position_in(&r.sort_criteria(), &me)
    }

    pub fn is_group_sorted_by_me(&self) -> Option<SortPosition> {
        let (r, me) = (self.find_my_ranker()?, self.me()?);
        position_in(&r.group_sort_criteria(), &me)
    }

    /// Position of this column among its ranking's group columns.
    pub fn is_grouped_by(&self) -> Option<usize> {
        let (r, me) = (self.find_my_ranker()?, self.me()?);
        r.group_columns().iter().position(|c| same_column(c, &me))
    }

    // --- dump ---------------------------------------------------------------

    pub(crate) fn dump_base(&self, to_desc_ref: &dyn Fn(&ColumnDesc) -> DescRef) -> ColumnDump {
        let metadata = self.metadata();
        let default_label = if self.desc.label.is_empty() {
            self.id()
        } else {
            self.desc.label.clone()
        };
        let renderer = self.renderer();
        let group_renderer = self.group_renderer();
        ColumnDump {
            id: self.id(),
            desc: to_desc_ref(&self.desc),
            width: self.width(),
            visible: (!self.is_visible()).then_some(false),
            label: (metadata.label != default_label).then_some(metadata.label),
            color: metadata.color.filter(|c| Some(c) != self.desc.color.as_ref()),
            renderer: (renderer != default_renderer(&self.desc)).then_some(renderer),
            group_renderer: (group_renderer != default_group_renderer(&self.desc))
                .then_some(group_renderer),
            children: Vec::new(),
            extra: Map::new(),
        }
    }

    pub(crate) fn restore_base(&self, dump: &ColumnDump) {
        self.width.set_silent(dump.width);
        if let Some(visible) = dump.visible {
            self.visible.set_silent(visible);
        }
        let mut metadata = self.metadata();
        if let Some(label) = &dump.label {
            metadata.label.clone_from(label);
        }
        if dump.color.is_some() {
            metadata.color.clone_from(&dump.color);
        }
        self.metadata.set_silent(metadata);
        if let Some(renderer) = &dump.renderer {
            self.renderer.set_silent(renderer.clone());
        }
        if let Some(renderer) = &dump.group_renderer {
            self.group_renderer.set_silent(renderer.clone());
        }
    }
}

fn default_renderer(desc: &ColumnDesc) -> String {
    desc.renderer.clone().unwrap_or_else(|| desc.kind.clone())
}

fn default_group_renderer(desc: &ColumnDesc) -> String {
    desc.group_renderer.clone().unwrap_or_else(|| desc.kind.clone())
}

fn position_in(criteria: &[crate::ranking::SortCriterion], col: &ColumnRef) -> Option<SortPosition> {
    criteria
        .iter()
        .position(|c| same_column(&c.col, col))
        .map(|priority| SortPosition {
            ascending: criteria[priority].asc,
            priority,
        })
}

impl fmt::Debug for ColumnBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnBase")
            .field("id", &self.id())
            .field("type", &self.desc.kind)
            .field("width", &self.width())
            .finish_non_exhaustive()
    }
}

/// Behavior of a column kind.
///
/// Comparison is always ascending; rankings flip it for descending criteria.
pub trait Column: Send + Sync + 'static {
    fn base(&self) -> &ColumnBase;

    fn as_any(&self) -> &dyn Any;

    /// The value of `row`, in JSON form.
    fn value(&self, row: &DataRow) -> Value {
        self.base().raw_value(row).unwrap_or(Value::Null)
    }

    /// Display label of `row`.
    fn label_of(&self, row: &DataRow) -> String {
        value_to_label(&self.value(row))
    }

    fn compare(&self, _a: &DataRow, _b: &DataRow) -> Ordering {
        Ordering::Equal
    }

    fn group(&self, _row: &DataRow) -> Group {
        Group::default_group()
    }

    fn group_compare(&self, a: &GroupData, b: &GroupData) -> Ordering {
        strategy::compare_group_names(a, b)
    }

    /// Direction a fresh sort by this column starts with.
    fn default_sort_ascending(&self) -> bool {
        true
    }

    fn is_filtered(&self) -> bool {
        false
    }

    /// Whether `row` passes this column's filter.
    fn filter(&self, _row: &DataRow) -> bool {
        true
    }

    fn as_number(&self) -> Option<&dyn NumberValued> {
        None
    }

    fn as_categorical(&self) -> Option<&dyn CategoricalValued> {
        None
    }

    fn as_composite(&self) -> Option<&dyn CompositeColumn> {
        None
    }

    fn set_width(&self, width: f64) {
        self.base().apply_width(width);
    }

    /// Write kind-specific dump fields.
    fn dump_extra(&self, _extra: &mut Map<String, Value>) {}

    /// Read kind-specific dump fields. Does not emit events.
    fn restore_extra(&self, _extra: &Map<String, Value>) {}

    /// Kind-specific details for debug output.
    fn debug_properties(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    fn dump(&self, to_desc_ref: &dyn Fn(&ColumnDesc) -> DescRef) -> ColumnDump {
        let mut dump = self.base().dump_base(to_desc_ref);
        self.dump_extra(&mut dump.extra);
        if let Some(composite) = self.as_composite() {
            dump.children = composite
                .children()
                .iter()
                .map(|c| c.dump(to_desc_ref))
                .collect();
        }
        dump
    }

    fn restore(&self, dump: &ColumnDump, factory: &dyn TypeFactory) {
        self.base().restore_base(dump);
        self.restore_extra(&dump.extra);
        if let Some(composite) = self.as_composite() {
            for child in &dump.children {
                match factory.restore_column(child) {
                    Some(col) => {
                        if composite.push(col).is_none() {
                            tracing::warn!(target: targets::DUMP, child = %child.id, "child rejected on restore");
                        }
                    }
                    None => {
                        tracing::warn!(target: targets::DUMP, child = %child.id, "dropping unrestorable child");
                    }
                }
            }
        }
    }

    /// Replace the id of this column and all descendants.
    fn assign_new_id(&self, next_id: &mut dyn FnMut() -> String) {
        self.base().set_id(next_id());
        if let Some(composite) = self.as_composite() {
            for child in composite.children() {
                child.assign_new_id(next_id);
            }
        }
    }

    fn debug_node(&self) -> DebugNode {
        let base = self.base();
        let mut node = DebugNode::new(base.label(), base.id(), base.kind())
            .with_property("width", base.width());
        if !base.is_visible() {
            node = node.with_property("visible", false);
        }
        for (key, value) in self.debug_properties() {
            node = node.with_property(key, value);
        }
        if let Some(composite) = self.as_composite() {
            node = node.with_children(composite.children().iter().map(|c| c.debug_node()).collect());
        }
        node
    }
}

impl dyn Column {
    pub fn id(&self) -> String {
        self.base().id()
    }

    pub fn kind(&self) -> &str {
        self.base().kind()
    }

    pub fn label(&self) -> String {
        self.base().label()
    }

    pub fn width(&self) -> f64 {
        self.base().width()
    }

    pub fn events(&self) -> &Dispatcher {
        self.base().events()
    }

    pub fn find_my_ranker(&self) -> Option<Arc<Ranking>> {
        self.base().find_my_ranker()
    }

    /// Downcast to a concrete column type.
    pub fn downcast_ref<T: Column>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    /// This column and all its descendants, depth first.
    pub fn flatten(&self) -> Vec<ColumnRef> {
        let mut out = Vec::new();
        if let Some(me) = self.base().me() {
            out.push(me);
        }
        if let Some(composite) = self.as_composite() {
            for child in composite.children() {
                out.extend(child.flatten());
            }
        }
        out
    }
}

impl fmt::Debug for dyn Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Column")
            .field("id", &self.base().id())
            .field("type", &self.base().kind())
            .finish_non_exhaustive()
    }
}

/// A column with numeric values.
pub trait NumberValued: Send + Sync {
    /// The mapped value in `[0, 1]`, NaN when missing.
    fn number(&self, row: &DataRow) -> f64;

    /// The value before mapping, NaN when missing.
    fn raw_number(&self, row: &DataRow) -> f64;

    fn sort_method(&self) -> SortMethod;

    fn set_sort_method(&self, method: SortMethod);
}

/// A column with categorical values.
pub trait CategoricalValued: Send + Sync {
    fn categories(&self) -> Vec<Category>;

    /// The category of `row`, `None` when missing.
    fn category(&self, row: &DataRow) -> Option<Category>;

    /// Color of `row`'s category, the default group color when missing.
    fn color_of(&self, row: &DataRow) -> String {
        self.category(row)
            .map(|c| c.color)
            .unwrap_or_else(|| crate::group::DEFAULT_COLOR.to_string())
    }
}

/// Convert a raw value to a number. Missing and non-numeric values are NaN.
pub(crate) fn value_to_number(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::String(s) => s.trim().parse().unwrap_or(f64::NAN),
        Value::Bool(b) => f64::from(u8::from(*b)),
        _ => f64::NAN,
    }
}

/// Convert a value to its display text. `null` is empty.
pub(crate) fn value_to_label(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Emit a kind-specific state change carrying dump-form values.
pub(crate) fn emit_value_change(
    base: &ColumnBase,
    kind: EventKind,
    previous: Value,
    current: Value,
) {
    base.events().emit(
        &[kind, EventKind::DirtyValues, EventKind::Dirty],
        EventPayload::Value { previous, current },
    );
}

static_assertions::assert_impl_all!(ColumnBase: Send, Sync);
static_assertions::assert_impl_all!(ColumnDump: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    fn number(id: &str) -> ColumnRef {
        NumberColumn::create(id, Arc::new(ColumnDesc::data("number", "v")))
    }

    #[test]
    fn test_width_tolerance_and_events() {
        let col = number("a");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let _sub = col.events().subscribe(&[EventKind::WidthChanged, EventKind::Dirty], move |ctx| {
            seen_clone.lock().push(ctx.kind);
        });

        col.set_width(100.3);
        assert!(seen.lock().is_empty());
        col.set_width(150.0);
        assert_eq!(*seen.lock(), vec![EventKind::WidthChanged, EventKind::Dirty]);
        assert_eq!(col.width(), 150.0);
    }

    #[test]
    fn test_metadata_label_change_emits_label_changed() {
        let col = number("a");
        let primaries = Arc::new(Mutex::new(Vec::new()));
        let p = primaries.clone();
        let _sub = col.events().subscribe(&[EventKind::MetaDataChanged], move |ctx| {
            p.lock().push(ctx.primary);
        });

        col.base().set_label("Score");
        let mut metadata = col.base().metadata();
        metadata.description = "points".into();
        col.base().set_metadata(metadata.clone());
        col.base().set_metadata(metadata);

        assert_eq!(
            *primaries.lock(),
            vec![EventKind::LabelChanged, EventKind::MetaDataChanged]
        );
    }

    #[test]
    fn test_dump_only_carries_changed_fields() {
        let col = number("a");
        let dump = col.dump(&DescRef::of);
        assert_eq!(dump.label, None);
        assert_eq!(dump.renderer, None);
        assert_eq!(dump.visible, None);

        col.base().set_label("Renamed");
        col.base().set_visible(false);
        col.base().set_renderer("bar");
        let dump = col.dump(&DescRef::of);
        assert_eq!(dump.label.as_deref(), Some("Renamed"));
        assert_eq!(dump.visible, Some(false));
        assert_eq!(dump.renderer.as_deref(), Some("bar"));
    }

    #[test]
    fn test_detached_column_navigation() {
        let col = number("a");
        assert!(col.find_my_ranker().is_none());
        assert_eq!(col.base().fqid(), "a");
        assert_eq!(col.base().fqpath(), "");
        assert!(!col.base().remove_me());
        assert!(!col.base().sort_by_me(true, Some(0)));
        assert!(col.downcast_ref::<NumberColumn>().is_some());
        assert!(col.downcast_ref::<StringColumn>().is_none());
    }

    #[test]
    fn test_value_conversion() {
        assert_eq!(value_to_number(&json!(2.5)), 2.5);
        assert_eq!(value_to_number(&json!(" 7 ")), 7.0);
        assert!(value_to_number(&json!(null)).is_nan());
        assert!(value_to_number(&json!("x")).is_nan());
        assert_eq!(value_to_label(&json!(null)), "");
        assert_eq!(value_to_label(&json!("a")), "a");
        assert_eq!(value_to_label(&json!(3)), "3");
    }
}
