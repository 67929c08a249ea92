//! In-memory data source.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future;
use lineup_core::logging::targets;
use parking_lot::RwLock;
use serde_json::Value;

use super::source::{DataSource, Deferred, SortRequest, SortResult};
use crate::group::{GroupData, OrderedGroup};
use crate::row::{DataRow, to_rows};

/// Holds all rows in memory and sorts synchronously.
///
/// Rows are filtered by the ranking (and the global filter), bucketed by the
/// ranking's grouper, sorted within each group by the row comparator, and
/// the groups are ordered by the group comparator.
#[derive(Debug, Default)]
pub struct LocalDataSource {
    rows: RwLock<Arc<Vec<DataRow>>>,
}

impl LocalDataSource {
    pub fn new(records: impl IntoIterator<Item = Value>) -> Self {
        Self {
            rows: RwLock::new(Arc::new(to_rows(records))),
        }
    }

    /// Replace all rows. Rankings are not reordered automatically.
    pub fn set_data(&self, records: impl IntoIterator<Item = Value>) {
        *self.rows.write() = Arc::new(to_rows(records));
    }

    pub fn rows(&self) -> Arc<Vec<DataRow>> {
        self.rows.read().clone()
    }

    /// Sort on the calling thread.
    pub fn sort_now(&self, request: &SortRequest) -> SortResult {
        let rows = self.rows();
        let grouper = request.ranking.grouper();
        let comparator = request.ranking.comparator();
        let group_comparator = request.ranking.group_comparator();

        let mut buckets: Vec<GroupData> = Vec::new();
        let mut by_name: HashMap<String, usize> = HashMap::new();
        for row in rows.iter().filter(|r| request.accepts(r)) {
            let group = grouper(row);
            let slot = match by_name.get(&group.name) {
                Some(&slot) => slot,
                None => {
                    by_name.insert(group.name.clone(), buckets.len());
                    buckets.push(GroupData {
                        group: Arc::new(group),
                        rows: Vec::new(),
                    });
                    buckets.len() - 1
                }
            };
            buckets[slot].rows.push(row.clone());
        }

        for bucket in &mut buckets {
            bucket.rows.sort_by(&comparator);
        }
        buckets.sort_by(&group_comparator);

        let mut index2pos = vec![None; rows.len()];
        let mut position = 0;
        let groups: Vec<OrderedGroup> = buckets
            .into_iter()
            .map(|bucket| {
                let order: Vec<usize> = bucket.rows.iter().map(|r| r.index).collect();
                for &index in &order {
                    if let Some(slot) = index2pos.get_mut(index) {
                        *slot = Some(position);
                    }
                    position += 1;
                }
                OrderedGroup {
                    group: bucket.group,
                    order,
                }
            })
            .collect();

        tracing::debug!(
            target: targets::PROVIDER,
            ranking = %request.ranking.id(),
            groups = groups.len(),
            rows = position,
            "sorted locally"
        );
        SortResult { groups, index2pos }
    }
}

impl DataSource for LocalDataSource {
    fn len(&self) -> usize {
        self.rows.read().len()
    }

    fn row(&self, index: usize) -> Option<DataRow> {
        self.rows.read().get(index).cloned()
    }

    fn view(&self, indices: &[usize]) -> Deferred<Vec<DataRow>> {
        let rows = self.rows();
        let view = indices.iter().filter_map(|&i| rows.get(i).cloned()).collect();
        future::ready(view).boxed()
    }

    fn sort(&self, request: SortRequest) -> Deferred<SortResult> {
        future::ready(self.sort_now(&request)).boxed()
    }
}

impl From<Vec<Value>> for LocalDataSource {
    fn from(records: Vec<Value>) -> Self {
        Self::new(records)
    }
}

/// Groups of a result, keyed by name, for tests and diagnostics.
pub fn group_names(result: &SortResult) -> Vec<String> {
    result.groups.iter().map(|g| g.name().to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::{CategoricalColumn, ColumnDesc, ColumnRef, NumberColumn, NumberFilter};
    use crate::ranking::{Ranking, RankingConfig};
    use serde_json::json;

    fn source() -> LocalDataSource {
        LocalDataSource::new(vec![
            json!({"v": 5, "c": "b"}),
            json!({"v": 1, "c": "a"}),
            json!({"v": 3, "c": "b"}),
            json!({"v": null, "c": "a"}),
        ])
    }

    fn request(ranking: &Arc<Ranking>) -> SortRequest {
        SortRequest {
            ranking: ranking.clone(),
            reasons: Vec::new(),
            global_filter: None,
        }
    }

    #[test]
    fn test_unsorted_keeps_index_order() {
        let ranking = Ranking::new("rank0", RankingConfig::default());
        let result = source().sort_now(&request(&ranking));
        assert_eq!(group_names(&result), vec!["Default"]);
        assert_eq!(result.groups[0].order, vec![0, 1, 2, 3]);
        assert_eq!(result.index2pos, vec![Some(0), Some(1), Some(2), Some(3)]);
    }

    #[test]
    fn test_grouped_and_sorted() {
        let ranking = Ranking::new("rank0", RankingConfig::default());
        let value: ColumnRef = NumberColumn::create("v", Arc::new(ColumnDesc::data("number", "v").with_domain([0.0, 10.0])));
        let category: ColumnRef = CategoricalColumn::create(
            "c",
            Arc::new(ColumnDesc::data("categorical", "c").with_categories(["a", "b"])),
        );
        ranking.push(value.clone());
        ranking.push(category.clone());
        ranking.sort_by(&value, false, Some(0));
        ranking.group_by(&category, Some(0));

        let result = source().sort_now(&request(&ranking));
        assert_eq!(group_names(&result), vec!["a", "b"]);
        assert_eq!(result.groups[0].order, vec![1, 3]);
        assert_eq!(result.groups[1].order, vec![0, 2]);
        assert_eq!(result.index2pos, vec![Some(2), Some(0), Some(3), Some(1)]);
    }

    #[test]
    fn test_filtered_rows_have_no_position() {
        let ranking = Ranking::new("rank0", RankingConfig::default());
        let value = NumberColumn::create("v", Arc::new(ColumnDesc::data("number", "v").with_domain([0.0, 10.0])));
        ranking.push(value.clone());
        value.set_filter(NumberFilter {
            min: Some(2.0),
            max: None,
            filter_missing: true,
        });

        let result = source().sort_now(&request(&ranking));
        assert_eq!(result.groups[0].order, vec![0, 2]);
        assert_eq!(result.index2pos, vec![Some(0), None, Some(1), None]);
    }

    #[test]
    fn test_global_filter_and_view() {
        let ranking = Ranking::new("rank0", RankingConfig::default());
        let data = source();
        let mut req = request(&ranking);
        req.global_filter = Some(Arc::new(|row: &DataRow| row.index % 2 == 0));
        let result = data.sort(req).now_or_never().unwrap_or_default();
        assert_eq!(result.groups[0].order, vec![0, 2]);

        let view = data.view(&[2, 9, 0]).now_or_never().unwrap_or_default();
        assert_eq!(view.iter().map(|r| r.index).collect::<Vec<_>>(), vec![2, 0]);
        assert_eq!(data.len(), 4);
        assert!(data.row(4).is_none());
    }
}
