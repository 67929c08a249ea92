//! Column type registry and the type factory used by dump restore.
//!
//! Each registered kind maps to a constructor and a static capability table.
//! Kinds may extend another kind; the resolved capability set (own plus
//! inherited) is computed on first request and cached in the registry until
//! the next registration.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use lineup_core::logging::targets;
use parking_lot::RwLock;

use crate::column::{
    AggregateGroupColumn, BooleanColumn, BoxPlotColumn, CategoricalColumn, ColumnDesc, ColumnDump,
    ColumnRef, DateColumn, DescRef, HostRef, ImpositionColumn, NestedColumn, NumberColumn,
    RankColumn, ReduceColumn, SelectionColumn, SetColumn, StackColumn, StringColumn, bind_host,
};
use crate::error::{Error, Result};

/// Builds a column of one kind from an id and a description.
pub type Constructor = fn(String, Arc<ColumnDesc>) -> ColumnRef;

/// Turns a column dump back into a live column.
pub trait TypeFactory {
    /// Restore `dump`, or `None` when its description or kind is unknown.
    fn restore_column(&self, dump: &ColumnDump) -> Option<ColumnRef>;
}

/// What the user may do with a column of some kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Rename,
    Remove,
    Sort,
    SortGroups,
    Group,
    Filter,
    EditMapping,
    ChangeSortMethod,
    EditWeights,
    Collapse,
    ChangeReduce,
}

#[derive(Clone)]
struct TypeEntry {
    constructor: Option<Constructor>,
    capabilities: &'static [Capability],
    extends: Option<&'static str>,
}

/// Kinds too deep in an `extends` chain are treated as cyclic.
const MAX_EXTENDS_DEPTH: usize = 16;

/// Maps column kinds to constructors and capabilities.
#[derive(Default)]
pub struct TypeRegistry {
    types: HashMap<String, TypeEntry>,
    resolved: RwLock<HashMap<String, Arc<[Capability]>>>,
}

impl TypeRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with every built-in kind.
    pub fn standard() -> Self {
        use Capability::*;

        let mut registry = Self::new();
        registry.register_abstract("column", &[Rename, Remove], None);
        registry.register_abstract("value", &[Sort], Some("column"));
        registry.register_abstract("composite", &[], Some("column"));

        registry.register(
            "number",
            |id, desc| NumberColumn::create(id, desc),
            &[SortGroups, Group, Filter, EditMapping, ChangeSortMethod],
            Some("value"),
        );
        registry.register("string", |id, desc| StringColumn::create(id, desc), &[Group, Filter], Some("value"));
        registry.register(
            "categorical",
            |id, desc| CategoricalColumn::create(id, desc),
            &[SortGroups, Group, Filter],
            Some("value"),
        );
        registry.register("date", |id, desc| DateColumn::create(id, desc), &[Group], Some("value"));
        registry.register("boolean", |id, desc| BooleanColumn::create(id, desc), &[Group, Filter], Some("value"));
        registry.register("set", |id, desc| SetColumn::create(id, desc), &[Group, Filter], Some("value"));
        registry.register(
            "boxplot",
            |id, desc| BoxPlotColumn::create(id, desc),
            &[SortGroups, EditMapping, ChangeSortMethod],
            Some("value"),
        );

        registry.register("rank", |id, desc| RankColumn::create(id, desc), &[], Some("column"));
        registry.register("selection", |id, desc| SelectionColumn::create(id, desc), &[Group], Some("value"));
        registry.register("aggregate", |id, desc| AggregateGroupColumn::create(id, desc), &[], Some("column"));

        registry.register(
            "stack",
            |id, desc| StackColumn::create(id, desc),
            &[Sort, SortGroups, ChangeSortMethod, EditWeights, Collapse],
            Some("composite"),
        );
        for kind in ["min", "max", "mean"] {
            registry.register(
                kind,
                |id, desc| ReduceColumn::create(id, desc),
                &[Sort, SortGroups, ChangeSortMethod],
                Some("composite"),
            );
        }
        registry.register("reduce", |id, desc| ReduceColumn::create(id, desc), &[ChangeReduce], Some("mean"));
        registry.register("nested", |id, desc| NestedColumn::create(id, desc), &[Sort], Some("composite"));
        registry.register(
            "imposition",
            |id, desc| ImpositionColumn::create(id, desc),
            &[Sort, SortGroups],
            Some("composite"),
        );
        registry
    }

    /// Register (or replace) a constructible kind.
    pub fn register(
        &mut self,
        kind: impl Into<String>,
        constructor: Constructor,
        capabilities: &'static [Capability],
        extends: Option<&'static str>,
    ) {
        self.insert(kind.into(), Some(constructor), capabilities, extends);
    }

    /// Register a kind that only exists to be extended.
    pub fn register_abstract(
        &mut self,
        kind: impl Into<String>,
        capabilities: &'static [Capability],
        extends: Option<&'static str>,
    ) {
        self.insert(kind.into(), None, capabilities, extends);
    }

    fn insert(
        &mut self,
        kind: String,
        constructor: Option<Constructor>,
        capabilities: &'static [Capability],
        extends: Option<&'static str>,
    ) {
        tracing::trace!(target: targets::COLUMN, %kind, "column type registered");
        self.types.insert(
            kind,
            TypeEntry {
                constructor,
                capabilities,
                extends,
            },
        );
        self.resolved.get_mut().clear();
    }

    /// Whether `kind` can be constructed.
    pub fn is_registered(&self, kind: &str) -> bool {
        self.types.get(kind).is_some_and(|t| t.constructor.is_some())
    }

    /// Every constructible kind, sorted.
    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self
            .types
            .iter()
            .filter(|(_, t)| t.constructor.is_some())
            .map(|(k, _)| k.clone())
            .collect();
        kinds.sort();
        kinds
    }

    /// Own and inherited capabilities of `kind`; empty for unknown kinds.
    pub fn capabilities(&self, kind: &str) -> Arc<[Capability]> {
        if let Some(cached) = self.resolved.read().get(kind) {
            return cached.clone();
        }
        let mut all: Vec<Capability> = Vec::new();
        let mut current = Some(kind);
        let mut depth = 0;
        while let Some(k) = current {
            let Some(entry) = self.types.get(k) else {
                break;
            };
            for cap in entry.capabilities {
                if !all.contains(cap) {
                    all.push(*cap);
                }
            }
            depth += 1;
            if depth >= MAX_EXTENDS_DEPTH {
                tracing::warn!(target: targets::COLUMN, %kind, "extends chain too deep");
                break;
            }
            current = entry.extends;
        }
        let resolved: Arc<[Capability]> = all.into();
        self.resolved.write().insert(kind.to_string(), resolved.clone());
        resolved
    }

    pub fn has_capability(&self, kind: &str, capability: Capability) -> bool {
        self.capabilities(kind).contains(&capability)
    }

    /// Create a column of `desc.kind`, or `None` for unknown kinds.
    pub fn create(&self, id: impl Into<String>, desc: Arc<ColumnDesc>) -> Option<ColumnRef> {
        match self.types.get(&desc.kind).and_then(|t| t.constructor) {
            Some(constructor) => Some(constructor(id.into(), desc)),
            None => {
                tracing::warn!(target: targets::COLUMN, kind = %desc.kind, "unknown column type");
                None
            }
        }
    }

    /// Like [`create`](Self::create), reporting unknown kinds as an error.
    pub fn try_create(&self, id: impl Into<String>, desc: Arc<ColumnDesc>) -> Result<ColumnRef> {
        match self.types.get(&desc.kind).and_then(|t| t.constructor) {
            Some(constructor) => Ok(constructor(id.into(), desc)),
            None => Err(Error::UnknownColumnType(desc.kind.clone())),
        }
    }

    /// Create a column from `dump` with the resolved `desc` and restore its state.
    pub fn restore(
        &self,
        dump: &ColumnDump,
        desc: Arc<ColumnDesc>,
        factory: &dyn TypeFactory,
    ) -> Option<ColumnRef> {
        let col = self.create(dump.id.clone(), desc)?;
        col.restore(dump, factory);
        Some(col)
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("kinds", &self.kinds())
            .finish_non_exhaustive()
    }
}

/// Resolve a description reference against known descriptions.
///
/// A `"<type>@<column>"` reference matches a known description with that
/// kind and data column; unmatched references fall back to a fresh data
/// description. A bare type becomes a description with only that type.
pub fn resolve_desc(reference: &DescRef, known: &[Arc<ColumnDesc>]) -> Arc<ColumnDesc> {
    match reference {
        DescRef::Inline(desc) => known
            .iter()
            .find(|d| d.matches(desc))
            .cloned()
            .unwrap_or_else(|| Arc::new(desc.clone())),
        DescRef::Ref(reference) => {
            let (kind, column) = DescRef::parts(reference);
            match column {
                Some(column) => known
                    .iter()
                    .find(|d| d.kind == kind && d.column.as_deref() == Some(column))
                    .cloned()
                    .unwrap_or_else(|| Arc::new(ColumnDesc::data(kind, column))),
                None => Arc::new(ColumnDesc::new(kind, kind)),
            }
        }
    }
}

impl TypeFactory for TypeRegistry {
    fn restore_column(&self, dump: &ColumnDump) -> Option<ColumnRef> {
        self.restore(dump, resolve_desc(&dump.desc, &[]), self)
    }
}

/// A type factory that resolves descriptions against a provider's list.
///
/// Restored support columns are bound to `host`.
pub struct DescFactory<'a> {
    pub registry: &'a TypeRegistry,
    pub descs: &'a [Arc<ColumnDesc>],
    pub host: Option<HostRef>,
}

impl TypeFactory for DescFactory<'_> {
    fn restore_column(&self, dump: &ColumnDump) -> Option<ColumnRef> {
        let mut desc = resolve_desc(&dump.desc, self.descs);
        if let Some(host) = &self.host {
            desc = bind_host(desc, host);
        }
        self.registry.restore(dump, desc, self)
    }
}

static_assertions::assert_impl_all!(TypeRegistry: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::{Column, CompositeColumn};
    use serde_json::json;

    #[test]
    fn test_standard_kinds() {
        let registry = TypeRegistry::standard();
        let kinds = registry.kinds();
        for kind in [
            "aggregate", "boolean", "boxplot", "categorical", "date", "imposition", "max", "mean", "min",
            "nested", "number", "rank", "reduce", "selection", "set", "stack", "string",
        ] {
            assert!(kinds.iter().any(|k| k == kind), "missing {kind}");
        }
        assert!(!registry.is_registered("composite"));
        assert!(registry.create("c0", Arc::new(ColumnDesc::new("composite", "x"))).is_none());
    }

    #[test]
    fn test_inherited_capabilities() {
        let registry = TypeRegistry::standard();
        assert!(registry.has_capability("number", Capability::Filter));
        assert!(registry.has_capability("number", Capability::Sort));
        assert!(registry.has_capability("number", Capability::Remove));
        assert!(registry.has_capability("reduce", Capability::ChangeReduce));
        assert!(registry.has_capability("reduce", Capability::ChangeSortMethod));
        assert!(!registry.has_capability("mean", Capability::ChangeReduce));
        assert!(!registry.has_capability("string", Capability::EditMapping));
        assert!(registry.capabilities("unknown").is_empty());
        assert!(registry.has_capability("set", Capability::Filter));
        assert!(registry.has_capability("boxplot", Capability::ChangeSortMethod));
        assert!(registry.has_capability("selection", Capability::Sort));
        assert!(!registry.has_capability("rank", Capability::Sort));
        assert!(registry.has_capability("aggregate", Capability::Remove));
    }

    #[test]
    fn test_cache_invalidated_on_register() {
        let mut registry = TypeRegistry::standard();
        assert!(!registry.has_capability("string", Capability::EditMapping));
        registry.register(
            "string",
            |id, desc| StringColumn::create(id, desc),
            &[Capability::EditMapping],
            Some("value"),
        );
        assert!(registry.has_capability("string", Capability::EditMapping));
        assert!(!registry.has_capability("string", Capability::Filter));
    }

    #[test]
    fn test_cyclic_extends_terminates() {
        let mut registry = TypeRegistry::new();
        registry.register_abstract("a", &[Capability::Sort], Some("b"));
        registry.register_abstract("b", &[Capability::Group], Some("a"));
        assert_eq!(registry.capabilities("a").len(), 2);
    }

    #[test]
    fn test_try_create_unknown() {
        let registry = TypeRegistry::standard();
        let err = registry.try_create("x", Arc::new(ColumnDesc::new("sparkline", "S")));
        assert!(matches!(err, Err(Error::UnknownColumnType(kind)) if kind == "sparkline"));
    }

    #[test]
    fn test_restore_resolves_known_desc() {
        let registry = TypeRegistry::standard();
        let known = vec![Arc::new(ColumnDesc::data("number", "score").with_label("Score"))];
        let factory = DescFactory {
            registry: &registry,
            descs: &known,
            host: None,
        };
        let dump: ColumnDump = match serde_json::from_value(json!({
            "id": "col7",
            "desc": "number@score",
            "width": 80
        })) {
            Ok(d) => d,
            Err(e) => panic!("{e}"),
        };
        let col = match factory.restore_column(&dump) {
            Some(c) => c,
            None => panic!("not restored"),
        };
        assert_eq!(col.id(), "col7");
        assert_eq!(col.label(), "Score");
        assert_eq!(col.width(), 80.0);
        assert!(Arc::ptr_eq(col.base().desc(), &known[0]));
    }

    #[test]
    fn test_restore_composite_children() {
        let registry = TypeRegistry::standard();
        let stack = StackColumn::create("s", Arc::new(ColumnDesc::new("stack", "Stack")));
        stack.push(NumberColumn::create("a", Arc::new(ColumnDesc::data("number", "a"))));
        stack.push(NumberColumn::create("b", Arc::new(ColumnDesc::data("number", "b"))));
        let dump = stack.dump(&DescRef::of);

        let restored = match registry.restore_column(&dump) {
            Some(c) => c,
            None => panic!("not restored"),
        };
        let composite = restored.as_composite().map(|c| c.len());
        assert_eq!(composite, Some(2));
        assert_eq!(restored.dump(&DescRef::of), dump);
    }

    #[test]
    fn test_unknown_kind_in_dump() {
        let registry = TypeRegistry::standard();
        let dump: ColumnDump = match serde_json::from_value(json!({
            "id": "col1",
            "desc": "heatmap@values",
            "width": 100
        })) {
            Ok(d) => d,
            Err(e) => panic!("{e}"),
        };
        assert!(registry.restore_column(&dump).is_none());
    }
}
