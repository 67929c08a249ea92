//! Reorders against a data source whose sort results arrive later.

mod common;

use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future;
use lineup::column::ColumnDesc;
use lineup::events::EventPayload;
use lineup::group::{Group, OrderedGroup};
use lineup::provider::{
    DataProvider, DataSource, Deferred, LocalDataSource, SortRequest, SortResult,
};
use lineup::row::DataRow;
use lineup_core::EventKind;
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::oneshot;

use common::{Recorder, immediate, init_tracing};

/// Parks every sort until the test answers it.
#[derive(Default)]
struct ManualSource {
    pending: Mutex<Vec<(SortRequest, oneshot::Sender<SortResult>)>>,
}

impl ManualSource {
    fn pending(&self) -> usize {
        self.pending.lock().len()
    }

    /// Answer the `nth` parked sort, oldest first.
    fn answer(&self, nth: usize, order: Vec<usize>) {
        let (_, tx) = self.pending.lock().remove(nth);
        let mut index2pos = vec![None; 3];
        for (pos, &index) in order.iter().enumerate() {
            index2pos[index] = Some(pos);
        }
        let result = SortResult {
            groups: vec![OrderedGroup::new(Group::default_group(), order)],
            index2pos,
        };
        let _ = tx.send(result);
    }

    fn reasons(&self, nth: usize) -> Vec<lineup::events::DirtyReason> {
        self.pending.lock()[nth].0.reasons.clone()
    }
}

impl DataSource for ManualSource {
    fn len(&self) -> usize {
        3
    }

    fn row(&self, index: usize) -> Option<DataRow> {
        (index < 3).then(|| DataRow::new(index, json!({"v": index})))
    }

    fn view(&self, indices: &[usize]) -> Deferred<Vec<DataRow>> {
        future::ready(indices.iter().filter_map(|&i| self.row(i)).collect()).boxed()
    }

    fn sort(&self, request: SortRequest) -> Deferred<SortResult> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().push((request, tx));
        async move { rx.await.unwrap_or_default() }.boxed()
    }
}

fn manual() -> (Arc<ManualSource>, Arc<DataProvider>) {
    init_tracing();
    let source = Arc::new(ManualSource::default());
    let provider = DataProvider::new(
        source.clone(),
        vec![ColumnDesc::data("number", "v").with_domain([0.0, 2.0])],
        immediate(),
    );
    (source, provider)
}

#[test]
fn test_result_applied_once_answered() {
    let (source, provider) = manual();
    let ranking = provider.push_ranking();

    assert_eq!(source.pending(), 1);
    assert!(provider.is_busy());
    assert!(provider.has_pending_reorders());
    assert!(ranking.order().is_empty());

    source.answer(0, vec![2, 0, 1]);
    assert_eq!(provider.process_pending(), 1);

    assert_eq!(ranking.order(), vec![2, 0, 1]);
    assert_eq!(ranking.rank_of(1), Some(2));
    assert!(!provider.is_busy());
    assert!(!provider.has_pending_reorders());
}

#[test]
fn test_stale_result_is_dropped() {
    let (source, provider) = manual();
    let ranking = provider.push_ranking();
    ranking.dirty_order(vec![lineup::events::DirtyReason::FilterChanged]);
    provider.flush_reorders();
    assert_eq!(source.pending(), 2);
    assert_eq!(source.reasons(1), vec![lineup::events::DirtyReason::FilterChanged]);

    source.answer(1, vec![1, 2, 0]);
    assert_eq!(provider.process_pending(), 1);
    assert_eq!(ranking.order(), vec![1, 2, 0]);
    assert!(provider.is_busy());

    source.answer(0, vec![0, 1, 2]);
    assert_eq!(provider.process_pending(), 0);
    assert_eq!(ranking.order(), vec![1, 2, 0]);
    assert!(!provider.is_busy());
}

#[test]
fn test_result_of_removed_ranking_is_dropped() {
    let (source, provider) = manual();
    let ranking = provider.push_ranking();
    let orders = Recorder::new();
    let sink = orders.clone();
    let _sub = ranking.events().subscribe(&[EventKind::OrderChanged], move |ctx| {
        if let EventPayload::Order(change) = &*ctx.payload {
            sink.push(change.current.clone());
        }
    });

    assert!(provider.remove_ranking(&ranking));
    source.answer(0, vec![2, 1, 0]);

    assert_eq!(provider.process_pending(), 0);
    assert!(ranking.order().is_empty());
    assert_eq!(orders.len(), 0);
    assert!(!provider.is_busy());
}

#[test]
fn test_busy_spans_overlapping_sorts() {
    let (source, provider) = manual();
    let busy = Recorder::new();
    let sink = busy.clone();
    let _sub = provider.events().subscribe(&[EventKind::Busy], move |ctx| {
        if let EventPayload::Busy(flag) = &*ctx.payload {
            sink.push(*flag);
        }
    });

    provider.push_ranking();
    provider.push_ranking();
    assert_eq!(source.pending(), 2);
    assert_eq!(busy.take(), vec![true]);

    source.answer(0, vec![0, 1, 2]);
    provider.process_pending();
    assert!(busy.take().is_empty());

    source.answer(0, vec![0, 1, 2]);
    provider.process_pending();
    assert_eq!(busy.take(), vec![false]);
}

/// Sorts locally, then hands the result over from a runtime task.
struct DelayedSource {
    local: LocalDataSource,
    delay: Duration,
}

impl DataSource for DelayedSource {
    fn len(&self) -> usize {
        self.local.len()
    }

    fn row(&self, index: usize) -> Option<DataRow> {
        self.local.row(index)
    }

    fn view(&self, indices: &[usize]) -> Deferred<Vec<DataRow>> {
        self.local.view(indices)
    }

    fn sort(&self, request: SortRequest) -> Deferred<SortResult> {
        let result = self.local.sort_now(&request);
        let delay = self.delay;
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(result);
        });
        async move { rx.await.unwrap_or_default() }.boxed()
    }
}

#[tokio::test]
async fn test_results_from_runtime_task() {
    init_tracing();
    let source = Arc::new(DelayedSource {
        local: LocalDataSource::new(vec![json!({"v": 2}), json!({"v": 7}), json!({"v": 5})]),
        delay: Duration::from_millis(5),
    });
    let provider = DataProvider::new(
        source,
        vec![ColumnDesc::data("number", "v").with_domain([0.0, 10.0])],
        immediate(),
    );
    let ranking = provider.derive_ranking(false);
    ranking.sort_by(&ranking.at(0).unwrap(), false, Some(0));
    provider.flush_reorders();

    for _ in 0..200 {
        provider.process_pending();
        if !provider.has_pending_reorders() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert!(!provider.has_pending_reorders());
    assert_eq!(ranking.order(), vec![1, 2, 0]);
}
