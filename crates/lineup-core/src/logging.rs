//! Logging and debugging facilities.
//!
//! LineUp uses the `tracing` crate for instrumentation. Install any
//! subscriber in the host application to see the output:
//!
//! ```no_run
//! tracing_subscriber::fmt()
//!     .with_env_filter("lineup=debug,lineup_core=trace")
//!     .init();
//! ```
//!
//! Column trees and rankings can be rendered for diagnostics through
//! [`TreeDebug`], which formats any [`DebugNode`] snapshot.

use std::fmt::{self, Write};

/// Target names for filtering log output.
pub mod targets {
    /// Core crate root.
    pub const CORE: &str = "lineup_core";
    /// Event dispatch and subscriptions.
    pub const EVENT: &str = "lineup_core::event";
    /// Debounce triggers and deliveries.
    pub const DEBOUNCE: &str = "lineup_core::debounce";
    /// Column tree mutation.
    pub const COLUMN: &str = "lineup::column";
    /// Ranking criteria and groups.
    pub const RANKING: &str = "lineup::ranking";
    /// Provider scheduling and reorder passes.
    pub const PROVIDER: &str = "lineup::provider";
    /// Aggregation state changes.
    pub const AGGREGATION: &str = "lineup::provider::aggregation";
    /// Dump and restore.
    pub const DUMP: &str = "lineup::dump";
}

/// A snapshot of one node of a tree, for debug output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DebugNode {
    /// Human readable label.
    pub label: String,
    /// Identifier, e.g. a column id.
    pub id: String,
    /// Type tag, e.g. `"stack"`.
    pub type_name: String,
    /// Extra `key=value` details.
    pub properties: Vec<(String, String)>,
    /// Child nodes in order.
    pub children: Vec<DebugNode>,
}

impl DebugNode {
    /// Create a leaf node.
    pub fn new(label: impl Into<String>, id: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            id: id.into(),
            type_name: type_name.into(),
            ..Default::default()
        }
    }

    /// Add a detail line.
    pub fn with_property(mut self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        self.properties.push((key.into(), value.to_string()));
        self
    }

    /// Set the children.
    pub fn with_children(mut self, children: Vec<DebugNode>) -> Self {
        self.children = children;
        self
    }

    /// Total number of nodes in this subtree.
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(DebugNode::count).sum::<usize>()
    }
}

/// Style options for tree visualization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TreeStyle {
    /// ASCII characters for tree branches.
    Ascii,
    /// Unicode box-drawing characters.
    #[default]
    Unicode,
    /// Compact single-line representation.
    Compact,
}

/// Configuration for tree debug output.
#[derive(Debug, Clone)]
pub struct TreeFormatOptions {
    /// The style of tree visualization.
    pub style: TreeStyle,
    /// Whether to show node ids.
    pub show_ids: bool,
    /// Whether to show type tags.
    pub show_types: bool,
    /// Whether to show detail lines.
    pub show_properties: bool,
    /// Maximum depth to traverse (None for unlimited).
    pub max_depth: Option<usize>,
    /// Indent size for each level.
    pub indent_size: usize,
}

impl Default for TreeFormatOptions {
    fn default() -> Self {
        Self {
            style: TreeStyle::default(),
            show_ids: true,
            show_types: true,
            show_properties: false,
            max_depth: None,
            indent_size: 2,
        }
    }
}

impl TreeFormatOptions {
    /// Options for detailed debugging output.
    pub fn detailed() -> Self {
        Self {
            show_properties: true,
            ..Default::default()
        }
    }

    /// Options for minimal output.
    pub fn minimal() -> Self {
        Self {
            show_ids: false,
            show_types: false,
            show_properties: false,
            ..Default::default()
        }
    }
}

/// Formats [`DebugNode`] trees.
#[derive(Debug, Clone, Default)]
pub struct TreeDebug {
    options: TreeFormatOptions,
}

impl TreeDebug {
    /// Create a formatter with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a formatter with custom options.
    pub fn with_options(options: TreeFormatOptions) -> Self {
        Self { options }
    }

    /// Format a whole tree.
    pub fn format(&self, root: &DebugNode) -> String {
        let mut output = String::new();
        // Writing to a String cannot fail.
        let _ = self.format_into(root, 0, true, &mut output);
        output
    }

    fn format_into(
        &self,
        node: &DebugNode,
        depth: usize,
        is_last: bool,
        output: &mut String,
    ) -> fmt::Result {
        if self.options.max_depth.is_some_and(|max| depth > max) {
            return Ok(());
        }

        output.push_str(&self.build_prefix(depth, is_last));
        output.push_str(if node.label.is_empty() {
            "(unnamed)"
        } else {
            &node.label
        });
        if self.options.show_ids && !node.id.is_empty() {
            write!(output, " [{}]", node.id)?;
        }
        if self.options.show_types && !node.type_name.is_empty() {
            write!(output, " ({})", node.type_name)?;
        }
        output.push('\n');

        if self.options.show_properties {
            let prefix = self.build_property_prefix(depth);
            for (key, value) in &node.properties {
                writeln!(output, "{prefix}  .{key} = {value}")?;
            }
        }

        let child_count = node.children.len();
        for (i, child) in node.children.iter().enumerate() {
            self.format_into(child, depth + 1, i + 1 == child_count, output)?;
        }
        Ok(())
    }

    fn build_prefix(&self, depth: usize, is_last: bool) -> String {
        if depth == 0 {
            return String::new();
        }

        let (branch, tee, corner) = match self.options.style {
            TreeStyle::Ascii => ("|", "+-- ", "`-- "),
            TreeStyle::Unicode => (
                "\u{2502}",
                "\u{251c}\u{2500}\u{2500} ",
                "\u{2514}\u{2500}\u{2500} ",
            ),
            TreeStyle::Compact => ("", "- ", "- "),
        };

        let mut prefix = String::new();
        for _ in 0..(depth - 1) {
            prefix.push_str(branch);
            prefix.extend(std::iter::repeat_n(' ', self.options.indent_size));
        }
        prefix.push_str(if is_last { corner } else { tee });
        prefix
    }

    fn build_property_prefix(&self, depth: usize) -> String {
        let branch = match self.options.style {
            TreeStyle::Ascii => "|",
            TreeStyle::Unicode => "\u{2502}",
            TreeStyle::Compact => "",
        };
        let mut prefix = String::new();
        for _ in 0..depth {
            prefix.push_str(branch);
            prefix.extend(std::iter::repeat_n(' ', self.options.indent_size));
        }
        prefix
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DebugNode {
        DebugNode::new("Ranking", "rank0", "ranking").with_children(vec![
            DebugNode::new("Score", "col1", "stack")
                .with_property("width", 200)
                .with_children(vec![
                    DebugNode::new("A", "col2", "number"),
                    DebugNode::new("B", "col3", "number"),
                ]),
            DebugNode::new("Name", "col4", "string"),
        ])
    }

    #[test]
    fn test_ascii_format() {
        let out = TreeDebug::with_options(TreeFormatOptions {
            style: TreeStyle::Ascii,
            ..Default::default()
        })
        .format(&sample());
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "Ranking [rank0] (ranking)");
        assert_eq!(lines[1], "+-- Score [col1] (stack)");
        assert_eq!(lines[2], "|  +-- A [col2] (number)");
        assert_eq!(lines[3], "|  `-- B [col3] (number)");
        assert_eq!(lines[4], "`-- Name [col4] (string)");
    }

    #[test]
    fn test_minimal_and_depth() {
        let out = TreeDebug::with_options(TreeFormatOptions {
            max_depth: Some(1),
            ..TreeFormatOptions::minimal()
        })
        .format(&sample());
        assert_eq!(out.lines().count(), 3);
        assert!(!out.contains("col1"));
        assert_eq!(sample().count(), 5);
    }

    #[test]
    fn test_detailed_shows_properties() {
        let out = TreeDebug::with_options(TreeFormatOptions::detailed()).format(&sample());
        assert!(out.contains(".width = 200"));
    }
}
