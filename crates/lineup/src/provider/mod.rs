//! The provider: rankings over one dataset, selection, reorder scheduling
//! and per-group aggregation state.
//!
//! # Reordering
//!
//! Every ranking announces order-affecting changes with a `dirtyOrder` event.
//! The provider folds these per ranking into a [`Debouncer`] that unions the
//! [`DirtyReason`]s. Nothing runs on its own: the host calls
//! [`DataProvider::process_pending`] (using
//! [`DataProvider::time_until_next_reorder`] to know when) or forces all
//! pending work with [`DataProvider::flush_reorders`].
//!
//! A reorder pass asks the [`DataSource`] to sort. The result may be
//! deferred; in-flight results are polled from `process_pending`. Each pass
//! carries a per-ranking sequence number, and only the newest pass of a
//! ranking that is still part of the provider is applied.
//!
//! ```
//! use std::sync::Arc;
//! use lineup::column::ColumnDesc;
//! use lineup::provider::{DataProvider, LocalDataSource, ProviderOptions};
//! use serde_json::json;
//!
//! let source = Arc::new(LocalDataSource::new(vec![json!({"v": 1}), json!({"v": 3}), json!({"v": 2})]));
//! let provider = DataProvider::new(
//!     source,
//!     vec![ColumnDesc::data("number", "v").with_domain([0.0, 5.0])],
//!     ProviderOptions::default(),
//! );
//! let ranking = provider.derive_ranking(false);
//! let column = ranking.at(0).unwrap();
//! ranking.sort_by(&column, false, Some(0));
//! provider.flush_reorders();
//! assert_eq!(ranking.order(), vec![1, 2, 0]);
//! ```

mod aggregation;
mod local;
mod options;
mod source;

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use futures_util::task::noop_waker;
use lineup_core::logging::targets;
use lineup_core::{DebugNode, Debouncer, EventKind, Property, Subscription, TreeDebug};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::column::{
    AggregateGroupColumn, ColumnDesc, ColumnDump, ColumnRef, DescRef, HostRef, RankColumn,
    SelectionColumn, SupportHost, bind_host, is_support_type,
};
use crate::error::Result;
use crate::events::{AggregateChange, Dispatcher, DirtyReason, EventPayload, merge_reasons};
use crate::group::{Group, unify_parents};
use crate::ranking::{Ranking, RankingDump};
use crate::registry::{DescFactory, TypeFactory, TypeRegistry};
use crate::row::DataRow;

pub use aggregation::{AggregationState, AggregationsDump, COLLAPSE, EXPAND, aggregation_key};
pub use local::{LocalDataSource, group_names};
pub use options::{AggregationStrategy, ProviderOptions};
pub use source::{DataSource, Deferred, RowFilter, SortRequest, SortResult};

use aggregation::Aggregations;

/// Identifies the dump format.
pub const SCHEMA_REF: &str = "lineup/provider-dump/v1";

/// Ranking events the provider re-emits as its own.
const FORWARDED: [EventKind; 9] = [
    EventKind::AddColumn,
    EventKind::RemoveColumn,
    EventKind::MoveColumn,
    EventKind::OrderChanged,
    EventKind::GroupsChanged,
    EventKind::DirtyHeader,
    EventKind::DirtyValues,
    EventKind::DirtyCaches,
    EventKind::Dirty,
];

/// A provider in dump form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderDump {
    #[serde(rename = "$schema", default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(default)]
    pub uid: usize,
    #[serde(default)]
    pub selection: Vec<usize>,
    #[serde(default)]
    pub aggregations: AggregationsDump,
    #[serde(default)]
    pub rankings: Vec<RankingDump>,
    #[serde(rename = "showTopN", default, skip_serializing_if = "Option::is_none")]
    pub show_top_n: Option<u32>,
}

struct RankingEntry {
    ranking: Arc<Ranking>,
    _subscriptions: Vec<Subscription>,
}

struct InFlight {
    ranking: Weak<Ranking>,
    key: String,
    seq: u64,
    reasons: Vec<DirtyReason>,
    result: Deferred<SortResult>,
}

struct Finished {
    ranking: Weak<Ranking>,
    key: String,
    seq: u64,
    reasons: Vec<DirtyReason>,
    result: SortResult,
}

/// Owns the rankings over one [`DataSource`].
pub struct DataProvider {
    me: Weak<DataProvider>,
    options: ProviderOptions,
    registry: TypeRegistry,
    source: Arc<dyn DataSource>,
    descs: RwLock<Vec<Arc<ColumnDesc>>>,
    rankings: RwLock<Vec<RankingEntry>>,
    uid: AtomicUsize,
    ranking_index: AtomicUsize,
    selection: RwLock<BTreeSet<usize>>,
    show_top_n: Property<u32>,
    aggregations: Mutex<Aggregations>,
    reorders: Mutex<Debouncer<String, Vec<DirtyReason>>>,
    in_flight: Mutex<Vec<InFlight>>,
    sequences: Mutex<HashMap<String, u64>>,
    busy: AtomicUsize,
    events: Dispatcher,
}

impl DataProvider {
    /// A provider with the standard column types.
    pub fn new(source: Arc<dyn DataSource>, descs: Vec<ColumnDesc>, options: ProviderOptions) -> Arc<Self> {
        Self::with_registry(source, descs, options, TypeRegistry::standard())
    }

    pub fn with_registry(
        source: Arc<dyn DataSource>,
        descs: Vec<ColumnDesc>,
        options: ProviderOptions,
        registry: TypeRegistry,
    ) -> Arc<Self> {
        let delay = options.reorder_delay();
        let show_top_n = options.show_top_n;
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            options,
            registry,
            source,
            descs: RwLock::new(descs.into_iter().map(Arc::new).collect()),
            rankings: RwLock::new(Vec::new()),
            uid: AtomicUsize::new(0),
            ranking_index: AtomicUsize::new(0),
            selection: RwLock::new(BTreeSet::new()),
            show_top_n: Property::new(show_top_n),
            aggregations: Mutex::new(Aggregations::default()),
            reorders: Mutex::new(Debouncer::new(delay, merge_reasons)),
            in_flight: Mutex::new(Vec::new()),
            sequences: Mutex::new(HashMap::new()),
            busy: AtomicUsize::new(0),
            events: Dispatcher::new(),
        })
    }

    pub fn options(&self) -> &ProviderOptions {
        &self.options
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn source(&self) -> &Arc<dyn DataSource> {
        &self.source
    }

    pub fn events(&self) -> &Dispatcher {
        &self.events
    }

    // --- column descriptions ------------------------------------------------

    /// A fresh copy of the known column descriptions.
    pub fn column_descs(&self) -> Vec<Arc<ColumnDesc>> {
        self.descs.read().clone()
    }

    pub fn add_desc(&self, desc: ColumnDesc) -> Arc<ColumnDesc> {
        let desc = Arc::new(desc);
        self.descs.write().push(desc.clone());
        desc
    }

    /// The known description of data column `column` of `kind`.
    pub fn find_desc(&self, kind: &str, column: &str) -> Option<Arc<ColumnDesc>> {
        self.descs
            .read()
            .iter()
            .find(|d| d.kind == kind && d.column.as_deref() == Some(column))
            .cloned()
    }

    // --- columns ------------------------------------------------------------

    fn next_id(&self) -> String {
        format!("col{}", self.uid.fetch_add(1, Ordering::SeqCst))
    }

    fn next_ranking_id(&self) -> String {
        format!("rank{}", self.ranking_index.fetch_add(1, Ordering::SeqCst))
    }

    /// Create a column with a fresh id; `None` for unknown kinds.
    ///
    /// Support columns are bound to this provider's selection and
    /// aggregation state.
    pub fn create(&self, desc: Arc<ColumnDesc>) -> Option<ColumnRef> {
        if !self.registry.is_registered(&desc.kind) {
            tracing::warn!(target: targets::PROVIDER, kind = %desc.kind, "cannot create column of unknown type");
            return None;
        }
        self.registry.create(self.next_id(), bind_host(desc, &self.host()))
    }

    fn host(&self) -> HostRef {
        let me: Weak<dyn SupportHost> = self.me.clone();
        HostRef::new(me)
    }

    fn factory<'a>(&'a self, descs: &'a [Arc<ColumnDesc>]) -> DescFactory<'a> {
        DescFactory {
            registry: &self.registry,
            descs,
            host: Some(self.host()),
        }
    }

    /// Create a column and append it to `ranking`.
    pub fn push(&self, ranking: &Ranking, desc: Arc<ColumnDesc>) -> Option<ColumnRef> {
        let col = self.create(desc)?;
        ranking.push(col)
    }

    /// Create a column and insert it into `ranking` at `index`.
    pub fn insert(&self, ranking: &Ranking, index: usize, desc: Arc<ColumnDesc>) -> Option<ColumnRef> {
        let col = self.create(desc)?;
        ranking.insert(col, index)
    }

    pub fn dump_column(&self, col: &ColumnRef) -> ColumnDump {
        col.dump(&DescRef::of)
    }

    /// Restore a column dump under fresh ids.
    pub fn restore_column(&self, dump: &ColumnDump) -> Option<ColumnRef> {
        let descs = self.column_descs();
        let col = self.factory(&descs).restore_column(dump)?;
        col.assign_new_id(&mut || self.next_id());
        Some(col)
    }

    /// Copy a column subtree by dumping and restoring it.
    pub fn clone_column(&self, col: &ColumnRef) -> Option<ColumnRef> {
        self.restore_column(&self.dump_column(col))
    }

    /// The first column with `id` in any ranking.
    pub fn find(&self, id: &str) -> Option<ColumnRef> {
        self.rankings().iter().find_map(|r| r.find(id))
    }

    // --- rankings -----------------------------------------------------------

    /// A fresh copy of the ranking list.
    pub fn rankings(&self) -> Vec<Arc<Ranking>> {
        self.rankings.read().iter().map(|e| e.ranking.clone()).collect()
    }

    pub fn first_ranking(&self) -> Option<Arc<Ranking>> {
        self.rankings.read().first().map(|e| e.ranking.clone())
    }

    pub fn last_ranking(&self) -> Option<Arc<Ranking>> {
        self.rankings.read().last().map(|e| e.ranking.clone())
    }

    fn contains_ranking(&self, ranking: &Arc<Ranking>) -> bool {
        self.rankings.read().iter().any(|e| Arc::ptr_eq(&e.ranking, ranking))
    }

    /// Create an empty ranking and append it.
    pub fn push_ranking(&self) -> Arc<Ranking> {
        let ranking = Ranking::new(self.next_ranking_id(), self.options.ranking_config());
        self.insert_ranking(ranking.clone(), None);
        ranking
    }

    /// Append a copy of `existing` with fresh ranking and column ids.
    pub fn clone_ranking(&self, existing: &Ranking) -> Arc<Ranking> {
        let ranking = self.restore_ranking(&existing.dump(&DescRef::of));
        self.insert_ranking(ranking.clone(), None);
        ranking
    }

    /// Add `ranking` at `index` (default: the end) and reorder it right away.
    pub fn insert_ranking(&self, ranking: Arc<Ranking>, index: Option<usize>) -> usize {
        let provider = self.me.clone();
        let weak = Arc::downgrade(&ranking);
        let dirty = ranking.events().subscribe(&[EventKind::DirtyOrder], move |ctx| {
            let (Some(provider), Some(ranking)) = (provider.upgrade(), weak.upgrade()) else {
                return;
            };
            let reasons = match ctx.payload.as_ref() {
                EventPayload::Reasons(reasons) => reasons.clone(),
                _ => vec![DirtyReason::Unknown],
            };
            provider.schedule_reorder(&ranking, reasons);
        });
        let forward = self.events.forward(ranking.events(), &FORWARDED);

        let index = {
            let mut rankings = self.rankings.write();
            let index = index.unwrap_or(rankings.len()).min(rankings.len());
            rankings.insert(
                index,
                RankingEntry {
                    ranking: ranking.clone(),
                    _subscriptions: vec![dirty, forward],
                },
            );
            index
        };
        tracing::debug!(target: targets::PROVIDER, ranking = %ranking.id(), index, "ranking added");
        self.events.emit(
            &[
                EventKind::AddRanking,
                EventKind::DirtyHeader,
                EventKind::DirtyValues,
                EventKind::Dirty,
            ],
            EventPayload::Ranking {
                ranking: Some(ranking.clone()),
                index: Some(index),
            },
        );
        self.start_sort(&ranking, vec![DirtyReason::Unknown]);
        self.poll_sorts();
        index
    }

    fn clean_up(&self, ranking: &Ranking) {
        let id = ranking.id();
        self.reorders.lock().cancel(&id);
        self.sequences.lock().remove(&id);
        self.aggregations.lock().remove_ranking(&id);
    }

    /// Remove `ranking`. Pending and in-flight reorders of it are dropped.
    pub fn remove_ranking(&self, ranking: &Arc<Ranking>) -> bool {
        let removed = {
            let mut rankings = self.rankings.write();
            rankings
                .iter()
                .position(|e| Arc::ptr_eq(&e.ranking, ranking))
                .map(|index| (index, rankings.remove(index)))
        };
        let Some((index, entry)) = removed else {
            return false;
        };
        drop(entry);
        self.clean_up(ranking);
        tracing::debug!(target: targets::PROVIDER, ranking = %ranking.id(), index, "ranking removed");
        self.events.emit(
            &[
                EventKind::RemoveRanking,
                EventKind::DirtyHeader,
                EventKind::DirtyValues,
                EventKind::Dirty,
            ],
            EventPayload::Ranking {
                ranking: Some(ranking.clone()),
                index: Some(index),
            },
        );
        true
    }

    pub fn clear_rankings(&self) {
        let entries = std::mem::take(&mut *self.rankings.write());
        for entry in &entries {
            self.clean_up(&entry.ranking);
        }
        drop(entries);
        self.events.emit(
            &[
                EventKind::RemoveRanking,
                EventKind::DirtyHeader,
                EventKind::DirtyValues,
                EventKind::Dirty,
            ],
            EventPayload::Ranking {
                ranking: None,
                index: None,
            },
        );
    }

    /// The first ranking, or a new one holding a rank column if there is none.
    pub fn ensure_one_ranking(&self) -> Arc<Ranking> {
        if let Some(ranking) = self.first_ranking() {
            return ranking;
        }
        let ranking = self.push_ranking();
        self.push(&ranking, Arc::new(RankColumn::default_desc()));
        ranking
    }

    /// Push a ranking with the support columns followed by one column per
    /// known data description.
    pub fn derive_default(&self) -> Arc<Ranking> {
        self.derive_ranking(true)
    }

    /// Push a ranking with one column per known data description, led by
    /// the aggregate, rank and (unless single selection) selection columns
    /// when `support_columns` is set.
    pub fn derive_ranking(&self, support_columns: bool) -> Arc<Ranking> {
        let ranking = self.push_ranking();
        if support_columns {
            self.push(&ranking, Arc::new(AggregateGroupColumn::default_desc()));
            self.push(&ranking, Arc::new(RankColumn::default_desc()));
            if !self.options.single_selection {
                self.push(&ranking, Arc::new(SelectionColumn::default_desc()));
            }
        }
        for desc in self.column_descs() {
            if !is_support_type(&desc.kind) {
                self.push(&ranking, desc);
            }
        }
        ranking
    }

    /// Clear every column filter in every ranking.
    pub fn clear_filters(&self) -> usize {
        let mut cleared = 0;
        for ranking in self.rankings() {
            for col in ranking.flat_columns() {
                if col.is_filtered() && clear_filter(&col) {
                    cleared += 1;
                }
            }
        }
        cleared
    }

    // --- reorder scheduling -------------------------------------------------

    fn schedule_reorder(&self, ranking: &Arc<Ranking>, reasons: Vec<DirtyReason>) {
        let others: Vec<Arc<Ranking>> =
            if self.options.filter_globally && reasons.contains(&DirtyReason::FilterChanged) {
                self.rankings()
                    .into_iter()
                    .filter(|r| !Arc::ptr_eq(r, ranking))
                    .collect()
            } else {
                Vec::new()
            };
        let mut reorders = self.reorders.lock();
        tracing::trace!(target: targets::PROVIDER, ranking = %ranking.id(), ?reasons, "reorder scheduled");
        reorders.trigger(ranking.id(), reasons);
        for other in others {
            reorders.trigger(other.id(), vec![DirtyReason::FilterChanged]);
        }
    }

    /// Whether any reorder is waiting for its window or its result.
    pub fn has_pending_reorders(&self) -> bool {
        self.reorders.lock().pending_count() > 0 || !self.in_flight.lock().is_empty()
    }

    /// Time until the next debounced reorder is due, `None` when none is.
    pub fn time_until_next_reorder(&self) -> Option<Duration> {
        self.reorders.lock().time_until_next(Instant::now())
    }

    /// Start due reorders and apply finished results. Returns the number
    /// of results applied.
    pub fn process_pending(&self) -> usize {
        self.process_pending_at(Instant::now())
    }

    /// Like [`process_pending`](Self::process_pending) as of `now`.
    pub fn process_pending_at(&self, now: Instant) -> usize {
        let ready = self.reorders.lock().take_ready(now);
        self.start_all(ready);
        self.poll_sorts()
    }

    /// Start every pending reorder regardless of its window and apply
    /// finished results.
    pub fn flush_reorders(&self) -> usize {
        let ready = self.reorders.lock().flush_all();
        self.start_all(ready);
        self.poll_sorts()
    }

    fn start_all(&self, ready: Vec<(String, Vec<DirtyReason>)>) {
        for (key, reasons) in ready {
            let ranking = self.rankings().into_iter().find(|r| r.id() == key);
            match ranking {
                Some(ranking) => self.start_sort(&ranking, reasons),
                None => {
                    tracing::debug!(target: targets::PROVIDER, ranking = %key, "reorder of unknown ranking skipped");
                }
            }
        }
    }

    fn global_filter(&self, ranking: &Arc<Ranking>) -> Option<RowFilter> {
        if !self.options.filter_globally {
            return None;
        }
        let others: Vec<Arc<Ranking>> = self
            .rankings()
            .into_iter()
            .filter(|r| !Arc::ptr_eq(r, ranking) && r.is_filtered())
            .collect();
        if others.is_empty() {
            return None;
        }
        Some(Arc::new(move |row: &DataRow| others.iter().all(|r| r.filter(row))))
    }

    #[tracing::instrument(skip_all, fields(ranking = %ranking.id()))]
    fn start_sort(&self, ranking: &Arc<Ranking>, reasons: Vec<DirtyReason>) {
        let key = ranking.id();
        let seq = {
            let mut sequences = self.sequences.lock();
            let seq = sequences.entry(key.clone()).or_insert(0);
            *seq += 1;
            *seq
        };
        tracing::debug!(target: targets::PROVIDER, seq, ?reasons, "reorder started");
        self.enter_busy();
        let result = self.source.sort(SortRequest {
            ranking: ranking.clone(),
            reasons: reasons.clone(),
            global_filter: self.global_filter(ranking),
        });
        self.in_flight.lock().push(InFlight {
            ranking: Arc::downgrade(ranking),
            key,
            seq,
            reasons,
            result,
        });
    }

    fn poll_sorts(&self) -> usize {
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        let mut finished = Vec::new();
        self.in_flight.lock().retain_mut(|f| match f.result.poll_unpin(&mut cx) {
            Poll::Ready(result) => {
                finished.push(Finished {
                    ranking: f.ranking.clone(),
                    key: std::mem::take(&mut f.key),
                    seq: f.seq,
                    reasons: std::mem::take(&mut f.reasons),
                    result,
                });
                false
            }
            Poll::Pending => true,
        });
        let mut applied = 0;
        for done in finished {
            if self.apply_sort(done) {
                applied += 1;
            }
            self.leave_busy();
        }
        applied
    }

    #[tracing::instrument(skip_all, fields(ranking = %done.key, seq = done.seq))]
    fn apply_sort(&self, done: Finished) -> bool {
        let Some(ranking) = done.ranking.upgrade().filter(|r| self.contains_ranking(r)) else {
            tracing::debug!(target: targets::PROVIDER, "dropping sort result of a removed ranking");
            return false;
        };
        if self.sequences.lock().get(&done.key).copied() != Some(done.seq) {
            tracing::debug!(target: targets::PROVIDER, "dropping stale sort result");
            return false;
        }
        let mut groups = done.result.groups;
        unify_parents(&mut groups);
        let initial = self
            .options
            .aggregation_strategy
            .initial_state(self.show_top_n());
        self.aggregations
            .lock()
            .seed(&done.key, groups.iter().map(|g| g.group.as_ref()), initial);
        tracing::debug!(target: targets::PROVIDER, groups = groups.len(), "reorder applied");
        ranking.set_groups(groups, done.result.index2pos, done.reasons);
        true
    }

    fn enter_busy(&self) {
        if self.busy.fetch_add(1, Ordering::SeqCst) == 0 {
            self.events.emit(&[EventKind::Busy], EventPayload::Busy(true));
        }
    }

    fn leave_busy(&self) {
        if self.busy.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.events.emit(&[EventKind::Busy], EventPayload::Busy(false));
        }
    }

    /// Whether a sort is in flight.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst) > 0
    }

    // --- rows ---------------------------------------------------------------

    pub fn view(&self, indices: &[usize]) -> Deferred<Vec<DataRow>> {
        self.source.view(indices)
    }

    pub fn row(&self, index: usize) -> Option<DataRow> {
        self.source.row(index)
    }

    // --- selection ----------------------------------------------------------

    fn fire_selection(&self, selection: Vec<usize>) {
        self.events
            .emit(&[EventKind::SelectionChanged], EventPayload::Selection(selection));
    }

    pub fn is_selected(&self, index: usize) -> bool {
        self.selection.read().contains(&index)
    }

    /// The selected indices, ascending.
    pub fn selection(&self) -> Vec<usize> {
        self.selection.read().iter().copied().collect()
    }

    /// Add `index` to the selection. With single selection it replaces it.
    pub fn select(&self, index: usize) -> bool {
        let selection = {
            let mut selection = self.selection.write();
            if selection.contains(&index) {
                return false;
            }
            if self.options.single_selection {
                selection.clear();
            }
            selection.insert(index);
            selection.iter().copied().collect()
        };
        self.fire_selection(selection);
        true
    }

    /// Add all `indices`. With single selection only the first is kept.
    pub fn select_all(&self, indices: &[usize]) -> bool {
        let selection = {
            let mut selection = self.selection.write();
            if indices.iter().all(|i| selection.contains(i)) {
                return false;
            }
            if self.options.single_selection {
                selection.clear();
                selection.extend(indices.first());
            } else {
                selection.extend(indices);
            }
            selection.iter().copied().collect()
        };
        self.fire_selection(selection);
        true
    }

    /// Select every row of `ranking`'s current order.
    pub fn select_all_of(&self, ranking: &Ranking) -> bool {
        self.set_selection(&ranking.order())
    }

    /// Replace the selection.
    pub fn set_selection(&self, indices: &[usize]) -> bool {
        if indices.is_empty() {
            return self.clear_selection();
        }
        {
            let mut selection = self.selection.write();
            let same = selection.len() == indices.len() && indices.iter().all(|i| selection.contains(i));
            if same {
                return false;
            }
            selection.clear();
        }
        self.select_all(indices)
    }

    /// Toggle `index`; without `additional` the rest of the selection is
    /// replaced. Returns whether `index` is selected afterwards.
    pub fn toggle_selection(&self, index: usize, additional: bool) -> bool {
        if self.is_selected(index) {
            if additional {
                self.deselect(index);
            } else {
                self.clear_selection();
            }
            return false;
        }
        if additional {
            self.select(index);
        } else {
            self.set_selection(&[index]);
        }
        true
    }

    pub fn deselect(&self, index: usize) -> bool {
        self.deselect_all(&[index])
    }

    pub fn deselect_all(&self, indices: &[usize]) -> bool {
        let selection = {
            let mut selection = self.selection.write();
            if indices.iter().all(|i| !selection.contains(i)) {
                return false;
            }
            for i in indices {
                selection.remove(i);
            }
            selection.iter().copied().collect()
        };
        self.fire_selection(selection);
        true
    }

    pub fn clear_selection(&self) -> bool {
        {
            let mut selection = self.selection.write();
            if selection.is_empty() {
                return false;
            }
            selection.clear();
        }
        self.fire_selection(Vec::new());
        true
    }

    /// Rows of the current selection.
    pub fn selected_rows(&self) -> Deferred<Vec<DataRow>> {
        self.view(&self.selection())
    }

    // --- aggregation --------------------------------------------------------

    pub fn show_top_n(&self) -> u32 {
        self.show_top_n.get()
    }

    /// Change the top-N default. Stored entries equal to the old default
    /// follow the new one.
    pub fn set_show_top_n(&self, value: u32) {
        let Some(previous) = self.show_top_n.replace(value) else {
            return;
        };
        self.aggregations
            .lock()
            .rewrite(options::top_n_state(previous), options::top_n_state(value));
        self.events.emit(
            &[EventKind::ShowTopNChanged, EventKind::DirtyValues, EventKind::Dirty],
            EventPayload::ShowTopN {
                previous,
                current: value,
            },
        );
    }

    /// Effective raw state of `group`: -1 expanded, 0 collapsed, N top-N.
    ///
    /// An inherited state is memoized on the group when
    /// `propagate_aggregation_state` is set.
    pub fn top_n_aggregated(&self, ranking: &Ranking, group: &Group) -> i32 {
        self.aggregations
            .lock()
            .get(&ranking.id(), group, self.options.propagate_aggregation_state)
    }

    pub fn aggregation_state(&self, ranking: &Ranking, group: &Group) -> AggregationState {
        AggregationState::from_raw(self.top_n_aggregated(ranking, group))
    }

    /// Whether `group` is collapsed or limited to its top rows.
    pub fn is_aggregated(&self, ranking: &Ranking, group: &Group) -> bool {
        self.top_n_aggregated(ranking, group) >= 0
    }

    pub fn set_aggregated(&self, ranking: &Ranking, group: &Arc<Group>, aggregated: bool) -> bool {
        let state = if aggregated {
            AggregationState::Collapse
        } else {
            AggregationState::Expand
        };
        self.set_aggregation_state(ranking, group, state)
    }

    pub fn set_aggregation_state(&self, ranking: &Ranking, group: &Arc<Group>, state: AggregationState) -> bool {
        self.set_top_n_aggregated(ranking, group, state.to_raw(self.show_top_n()))
    }

    /// Set the raw state of one group, stripping its ancestors' entries.
    pub fn set_top_n_aggregated(&self, ranking: &Ranking, group: &Arc<Group>, value: i32) -> bool {
        self.apply_aggregation(ranking, std::slice::from_ref(group), value, false)
    }

    /// Set the raw state of many groups with a single event.
    pub fn set_top_n_aggregated_all(&self, ranking: &Ranking, groups: &[Arc<Group>], value: i32) -> bool {
        self.apply_aggregation(ranking, groups, value, true)
    }

    /// Apply `state` to every current group of `ranking`.
    pub fn aggregate_all_of(&self, ranking: &Ranking, state: AggregationState) -> bool {
        let groups: Vec<Arc<Group>> = ranking.groups().into_iter().map(|g| g.group).collect();
        self.set_top_n_aggregated_all(ranking, &groups, state.to_raw(self.show_top_n()))
    }

    fn apply_aggregation(&self, ranking: &Ranking, groups: &[Arc<Group>], value: i32, bulk: bool) -> bool {
        let id = ranking.id();
        let previous = self.aggregations.lock().set(
            &id,
            groups,
            value,
            self.options.propagate_aggregation_state,
        );
        let Some(mut previous) = previous else {
            return false;
        };
        if !bulk && previous.is_empty() {
            previous.push(value);
        }
        tracing::trace!(target: targets::AGGREGATION, ranking = %id, value, groups = groups.len(), "aggregation changed");
        self.events.emit(
            &[EventKind::Aggregate, EventKind::DirtyValues, EventKind::Dirty],
            EventPayload::Aggregate(AggregateChange {
                ranking: id,
                groups: groups.to_vec(),
                previous,
                current: vec![value; groups.len()],
                bulk,
            }),
        );
        true
    }

    // --- dump ---------------------------------------------------------------

    pub fn dump(&self) -> ProviderDump {
        ProviderDump {
            schema: Some(SCHEMA_REF.to_string()),
            uid: self.uid.load(Ordering::SeqCst),
            selection: self.selection(),
            aggregations: self.aggregations.lock().dump(),
            rankings: self.rankings().iter().map(|r| r.dump(&DescRef::of)).collect(),
            show_top_n: Some(self.show_top_n()),
        }
    }

    pub fn dump_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.dump())?)
    }

    /// Restore a ranking dump into a new ranking (not added) with fresh ids.
    pub fn restore_ranking(&self, dump: &RankingDump) -> Arc<Ranking> {
        let ranking = Ranking::new(self.next_ranking_id(), self.options.ranking_config());
        let descs = self.column_descs();
        ranking.restore(dump, &self.factory(&descs));
        for col in ranking.children() {
            col.assign_new_id(&mut || self.next_id());
        }
        ranking
    }

    /// Replace rankings, selection and aggregation state with the dumped
    /// ones. Columns get fresh ids; ranking ids are kept unless missing or
    /// repeated, in which case the ranking gets a fresh one.
    #[tracing::instrument(skip_all, fields(rankings = dump.rankings.len()))]
    pub fn restore(&self, dump: &ProviderDump) {
        self.clear_rankings();
        self.uid.store(dump.uid, Ordering::SeqCst);
        {
            let mut selection = self.selection.write();
            selection.clear();
            selection.extend(dump.selection.iter().copied());
        }
        if let Some(show_top_n) = dump.show_top_n {
            self.show_top_n.set_silent(show_top_n);
        }
        self.aggregations.lock().restore(&dump.aggregations);

        let descs = self.column_descs();
        let factory = self.factory(&descs);
        // explicit `rankN` ids are reserved before any id is generated
        if let Some(max) = dump
            .rankings
            .iter()
            .filter_map(|r| r.id.as_deref().and_then(ranking_index_of))
            .max()
        {
            self.ranking_index.fetch_max(max + 1, Ordering::SeqCst);
        }
        let mut used: HashSet<String> = HashSet::new();
        for ranking_dump in &dump.rankings {
            let id = match &ranking_dump.id {
                Some(id) if used.insert(id.clone()) => id.clone(),
                Some(id) => {
                    let fresh = self.unused_ranking_id(&mut used);
                    tracing::warn!(target: targets::DUMP, duplicate = %id, %fresh, "duplicate ranking id in dump");
                    fresh
                }
                None => self.unused_ranking_id(&mut used),
            };
            let ranking = Ranking::new(id, self.options.ranking_config());
            ranking.restore(ranking_dump, &factory);
            self.insert_ranking(ranking, None);
        }

        for ranking in self.rankings() {
            for col in ranking.children() {
                col.assign_new_id(&mut || self.next_id());
            }
        }
    }

    fn unused_ranking_id(&self, used: &mut HashSet<String>) -> String {
        loop {
            let id = self.next_ranking_id();
            if used.insert(id.clone()) {
                return id;
            }
        }
    }

    /// Parse and restore a JSON dump.
    pub fn restore_json(&self, json: &str) -> Result<()> {
        let dump: ProviderDump = serde_json::from_str(json)?;
        self.restore(&dump);
        Ok(())
    }

    // --- diagnostics --------------------------------------------------------

    pub fn debug_node(&self) -> DebugNode {
        let rankings = self.rankings();
        let aggregations = self.aggregations.lock().len();
        DebugNode::new("provider", "provider", "DataProvider")
            .with_property("rows", self.source.len())
            .with_property("selected", self.selection.read().len())
            .with_property("aggregations", aggregations)
            .with_property("showTopN", self.show_top_n())
            .with_children(rankings.iter().map(|r| r.debug_node()).collect())
    }

    /// The provider and its rankings as a text tree.
    pub fn debug_tree(&self) -> String {
        TreeDebug::new().format(&self.debug_node())
    }
}

impl SupportHost for DataProvider {
    fn is_selected(&self, index: usize) -> bool {
        DataProvider::is_selected(self, index)
    }

    fn set_selected(&self, index: usize, selected: bool) -> bool {
        if selected {
            self.select(index)
        } else {
            self.deselect(index)
        }
    }

    fn is_aggregated(&self, ranking: &Ranking, group: &Group) -> bool {
        DataProvider::is_aggregated(self, ranking, group)
    }

    fn set_aggregated(&self, ranking: &Ranking, group: &Arc<Group>, aggregated: bool) -> bool {
        DataProvider::set_aggregated(self, ranking, group, aggregated)
    }
}

/// The `N` of a `rankN` id.
fn ranking_index_of(id: &str) -> Option<usize> {
    id.strip_prefix("rank")?.parse().ok()
}

/// Reset the filter of a leaf column; `false` for kinds without one.
fn clear_filter(col: &ColumnRef) -> bool {
    use crate::column::{BooleanColumn, CategoricalColumn, NumberColumn, SetColumn, StringColumn};

    if let Some(number) = col.downcast_ref::<NumberColumn>() {
        number.set_filter(Default::default());
    } else if let Some(string) = col.downcast_ref::<StringColumn>() {
        string.set_filter(None);
    } else if let Some(categorical) = col.downcast_ref::<CategoricalColumn>() {
        categorical.set_filter(None);
    } else if let Some(boolean) = col.downcast_ref::<BooleanColumn>() {
        boolean.set_filter(None);
    } else if let Some(set) = col.downcast_ref::<SetColumn>() {
        set.set_filter(None);
    } else {
        return false;
    }
    true
}

impl std::fmt::Debug for DataProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataProvider")
            .field("rankings", &self.rankings.read().len())
            .field("selection", &self.selection())
            .field("busy", &self.is_busy())
            .finish_non_exhaustive()
    }
}

static_assertions::assert_impl_all!(DataProvider: Send, Sync);
