//! Groups: named partitions of rows, optionally chained to a parent group.
//!
//! Grouping by several columns builds a chain of intersection groups, e.g.
//! `"Red"` → `"Red ∩ Small"`. After a reorder pass, [`unify_parents`] makes
//! structurally equal ancestor chains share the same `Arc`, so consumers can
//! compare ancestors by pointer.

use std::collections::HashMap;
use std::sync::Arc;

use crate::row::DataRow;

/// Color used for groups without an explicit color.
pub const DEFAULT_COLOR: &str = "#C1C1C1";

/// Name of the group holding all rows when nothing is grouped.
pub const DEFAULT_GROUP_NAME: &str = "Default";

/// Name of the group holding rows with a missing grouping value.
pub const MISSING_GROUP_NAME: &str = "Missing values";

/// A named group with an optional parent.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub name: String,
    pub color: String,
    pub parent: Option<Arc<Group>>,
}

impl Group {
    /// A root group.
    pub fn new(name: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            color: color.into(),
            parent: None,
        }
    }

    /// The group all rows fall into when no grouping is active.
    pub fn default_group() -> Self {
        Self::new(DEFAULT_GROUP_NAME, "gray")
    }

    /// The group for rows whose grouping value is missing.
    pub fn missing() -> Self {
        Self::new(MISSING_GROUP_NAME, DEFAULT_COLOR)
    }

    /// Copy with a parent.
    pub fn with_parent(mut self, parent: Arc<Group>) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Ancestors from the root down to the direct parent.
    pub fn ancestors(&self) -> Vec<Arc<Group>> {
        let mut chain = Vec::new();
        let mut current = self.parent.clone();
        while let Some(g) = current {
            current = g.parent.clone();
            chain.push(g);
        }
        chain.reverse();
        chain
    }

    /// Depth in the parent chain; roots have depth 0.
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut current = self.parent.as_deref();
        while let Some(g) = current {
            depth += 1;
            current = g.parent.as_deref();
        }
        depth
    }
}

/// A group together with its materialized row order.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderedGroup {
    pub group: Arc<Group>,
    pub order: Vec<usize>,
}

impl OrderedGroup {
    pub fn new(group: Group, order: Vec<usize>) -> Self {
        Self {
            group: Arc::new(group),
            order,
        }
    }

    pub fn name(&self) -> &str {
        &self.group.name
    }
}

/// A group together with its rows, as seen by group comparators.
#[derive(Debug, Clone)]
pub struct GroupData {
    pub group: Arc<Group>,
    pub rows: Vec<DataRow>,
}

/// Combine per-column groups into one intersection group.
///
/// - no groups: a copy of the default group
/// - one root group: a copy of it
/// - otherwise the groups (each preceded by its own ancestors) form a chain
///   where every element names itself `"<parent> ∩ <name>"` and inherits the
///   parent's color unless it has a non-default one; the last element is
///   returned.
pub fn join_groups(groups: &[Group]) -> Group {
    match groups {
        [] => return Group::default_group(),
        [single] if single.parent.is_none() => return single.clone(),
        _ => {}
    }

    let mut chain: Vec<(String, String)> = Vec::new();
    for group in groups {
        chain.extend(group.ancestors().iter().map(|g| (g.name.clone(), g.color.clone())));
        chain.push((group.name.clone(), group.color.clone()));
    }

    let mut iter = chain.into_iter();
    let Some((name, color)) = iter.next() else {
        return Group::default_group();
    };
    let mut current = Group::new(name, color);
    for (name, color) in iter {
        let parent = Arc::new(current);
        let color = if color != DEFAULT_COLOR {
            color
        } else {
            parent.color.clone()
        };
        current = Group {
            name: format!("{} ∩ {}", parent.name, name),
            color,
            parent: Some(parent),
        };
    }
    current
}

/// Make ancestor chains that are structurally equal share the same `Arc`.
///
/// Ancestors are identified by their name path from the root; the first
/// instance seen for a path becomes the canonical one.
pub fn unify_parents(groups: &mut [OrderedGroup]) {
    if groups.len() <= 1 {
        return;
    }
    let mut lookup: HashMap<Vec<String>, Arc<Group>> = HashMap::new();
    for entry in groups.iter_mut() {
        let Some(parent) = &entry.group.parent else {
            continue;
        };
        let canonical = resolve(parent, &mut lookup).0;
        if !Arc::ptr_eq(&canonical, parent) {
            let mut group = (*entry.group).clone();
            group.parent = Some(canonical);
            entry.group = Arc::new(group);
        }
    }
}

fn resolve(
    group: &Arc<Group>,
    lookup: &mut HashMap<Vec<String>, Arc<Group>>,
) -> (Arc<Group>, Vec<String>) {
    let (parent, mut path) = match &group.parent {
        Some(p) => {
            let (canonical, path) = resolve(p, lookup);
            (Some(canonical), path)
        }
        None => (None, Vec::new()),
    };
    path.push(group.name.clone());
    if let Some(existing) = lookup.get(&path) {
        return (existing.clone(), path);
    }
    let same_parent = match (&parent, &group.parent) {
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    };
    let canonical = if same_parent {
        group.clone()
    } else {
        Arc::new(Group {
            name: group.name.clone(),
            color: group.color.clone(),
            parent,
        })
    };
    lookup.insert(path.clone(), canonical.clone());
    (canonical, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_empty_and_single() {
        assert_eq!(join_groups(&[]), Group::default_group());
        let red = Group::new("Red", "red");
        assert_eq!(join_groups(std::slice::from_ref(&red)), red);
    }

    #[test]
    fn test_join_two_builds_chain() {
        let g = join_groups(&[Group::new("Red", "red"), Group::new("Small", DEFAULT_COLOR)]);
        assert_eq!(g.name, "Red ∩ Small");
        assert_eq!(g.color, "red");
        let parent = g.parent.as_deref().map(|p| p.name.as_str());
        assert_eq!(parent, Some("Red"));
    }

    #[test]
    fn test_join_three_keeps_leaf_color() {
        let g = join_groups(&[
            Group::new("A", DEFAULT_COLOR),
            Group::new("B", "blue"),
            Group::new("C", DEFAULT_COLOR),
        ]);
        assert_eq!(g.name, "A ∩ B ∩ C");
        assert_eq!(g.color, "blue");
        assert_eq!(g.depth(), 2);
        let names: Vec<String> = g.ancestors().iter().map(|a| a.name.clone()).collect();
        assert_eq!(names, vec!["A", "A ∩ B"]);
    }

    #[test]
    fn test_join_single_with_parent_copies_chain() {
        let root = Arc::new(Group::new("Root", "green"));
        let child = Group::new("Leaf", DEFAULT_COLOR).with_parent(root);
        let g = join_groups(&[child]);
        assert_eq!(g.name, "Root ∩ Leaf");
        assert_eq!(g.color, "green");
    }

    #[test]
    fn test_unify_shares_parents() {
        let a = join_groups(&[Group::new("Red", "red"), Group::new("Small", DEFAULT_COLOR)]);
        let b = join_groups(&[Group::new("Red", "red"), Group::new("Large", DEFAULT_COLOR)]);
        let c = join_groups(&[Group::new("Blue", "blue"), Group::new("Large", DEFAULT_COLOR)]);
        let mut groups = vec![
            OrderedGroup::new(a, vec![0]),
            OrderedGroup::new(b, vec![1]),
            OrderedGroup::new(c, vec![2]),
        ];

        unify_parents(&mut groups);

        let parent = |i: usize| groups[i].group.parent.clone();
        match (parent(0), parent(1), parent(2)) {
            (Some(p0), Some(p1), Some(p2)) => {
                assert!(Arc::ptr_eq(&p0, &p1));
                assert!(!Arc::ptr_eq(&p0, &p2));
                assert_eq!(p0.name, "Red");
            }
            _ => panic!("missing parents"),
        }
        assert_eq!(groups[0].name(), "Red ∩ Small");
    }

    #[test]
    fn test_unify_deep_chains() {
        let make = |leaf: &str| {
            join_groups(&[
                Group::new("A", DEFAULT_COLOR),
                Group::new("B", DEFAULT_COLOR),
                Group::new(leaf, DEFAULT_COLOR),
            ])
        };
        let mut groups = vec![OrderedGroup::new(make("x"), vec![0]), OrderedGroup::new(make("y"), vec![1])];
        unify_parents(&mut groups);
        let ancestors0 = groups[0].group.ancestors();
        let ancestors1 = groups[1].group.ancestors();
        assert!(Arc::ptr_eq(&ancestors0[0], &ancestors1[0]));
        assert!(Arc::ptr_eq(&ancestors0[1], &ancestors1[1]));
    }
}
