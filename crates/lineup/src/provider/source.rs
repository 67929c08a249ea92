//! The dataset collaborator the provider sorts and reads through.

use std::fmt;
use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::events::DirtyReason;
use crate::group::OrderedGroup;
use crate::ranking::Ranking;
use crate::row::DataRow;

/// A result that may arrive later. Synchronous sources return a ready future.
pub type Deferred<T> = BoxFuture<'static, T>;

/// A row predicate applied on top of a ranking's own filter.
pub type RowFilter = Arc<dyn Fn(&DataRow) -> bool + Send + Sync>;

/// What the provider asks a data source to sort.
#[derive(Clone)]
pub struct SortRequest {
    pub ranking: Arc<Ranking>,
    pub reasons: Vec<DirtyReason>,
    /// Filters of the other rankings when filtering globally.
    pub global_filter: Option<RowFilter>,
}

impl SortRequest {
    /// Whether `row` passes the ranking filter and the global one.
    pub fn accepts(&self, row: &DataRow) -> bool {
        self.ranking.filter(row) && self.global_filter.as_ref().is_none_or(|f| f(row))
    }
}

impl fmt::Debug for SortRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SortRequest")
            .field("ranking", &self.ranking.id())
            .field("reasons", &self.reasons)
            .field("global_filter", &self.global_filter.is_some())
            .finish()
    }
}

/// Ordered groups plus the position of every row in the flattened order.
///
/// `index2pos[i]` is `None` for rows that were filtered out.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SortResult {
    pub groups: Vec<OrderedGroup>,
    pub index2pos: Vec<Option<usize>>,
}

/// Owns the rows. The engine never stores row values itself.
pub trait DataSource: Send + Sync {
    /// Number of rows.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn row(&self, index: usize) -> Option<DataRow>;

    /// Rows for `indices`; unknown indices are skipped.
    fn view(&self, indices: &[usize]) -> Deferred<Vec<DataRow>>;

    fn sort(&self, request: SortRequest) -> Deferred<SortResult>;
}
