//! LineUp - the ranking and ordering engine of a tabular ranking view.
//!
//! The crate models:
//!
//! - **Columns** ([`column`]): typed value columns and composites (weighted
//!   stacks, reductions, nested and imposition wrappers) forming a tree that
//!   bubbles change events up to its ranking
//! - **Rankings** ([`ranking`]): top-level columns plus sort, group and
//!   group-sort criteria, and the derived row order and groups
//! - **The provider** ([`provider`]): rankings over one dataset, debounced
//!   reordering, selection and per-group aggregation state
//! - **Mapping functions** ([`mapping`]): numeric domain to `[0, 1]`
//!   transforms used by number columns
//!
//! Infrastructure (event dispatch, debouncing, properties, logging helpers)
//! lives in [`lineup_core`].
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use lineup::prelude::*;
//! use serde_json::json;
//!
//! let source = Arc::new(LocalDataSource::new(vec![
//!     json!({"name": "a", "score": 5}),
//!     json!({"name": "b", "score": 1}),
//!     json!({"name": "c", "score": 3}),
//! ]));
//! let provider = DataProvider::new(
//!     source,
//!     vec![
//!         ColumnDesc::data("string", "name"),
//!         ColumnDesc::data("number", "score").with_domain([0.0, 10.0]),
//!     ],
//!     ProviderOptions::default(),
//! );
//!
//! let ranking = provider.derive_default();
//! // aggregate, rank and selection columns lead the ranking
//! let score = ranking.children().into_iter().find(|c| c.label() == "score").unwrap();
//! score.base().toggle_my_sorting();
//! provider.flush_reorders();
//! assert_eq!(ranking.order(), vec![0, 2, 1]);
//! ```

pub mod column;
pub mod error;
pub mod events;
pub mod group;
pub mod mapping;
pub mod provider;
pub mod ranking;
pub mod registry;
pub mod row;

pub use error::{Error, Result};
pub use lineup_core;

/// Common imports.
pub mod prelude {
    pub use crate::column::{Column, ColumnDesc, ColumnRef, CompositeColumn, NumberValued};
    pub use crate::events::{DirtyReason, EventPayload};
    pub use crate::group::{Group, OrderedGroup};
    pub use crate::mapping::MappingFunction;
    pub use crate::provider::{
        AggregationState, DataProvider, DataSource, LocalDataSource, ProviderOptions,
    };
    pub use crate::ranking::{Ranking, SortCriterion};
    pub use crate::registry::{TypeFactory, TypeRegistry};
    pub use crate::row::DataRow;
    pub use lineup_core::EventKind;
}
