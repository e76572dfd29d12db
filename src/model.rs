//! View model: the expand/collapse-aware projection of the tree.
//!
//! `LogModel` is the only owner of "what is currently visible": an ordered
//! flattening of the expanded tree rows plus the selected node whose raw
//! lines feed the detail pane. Views pull rows through [`PaneId`]-addressed
//! accessors and report cursor events back through the controller.

use crate::tree::{LogTree, NodeId};

/// Indent per tree level in the tree pane.
const ROW_INDENT: &str = "  ";

/// The two panes served by the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaneId {
    Tree,
    Detail,
}

/// Owner of the tree and its visible-row projection.
#[derive(Debug, Clone)]
pub struct LogModel {
    tree: LogTree,
    root: NodeId,
    displayed_rows: Vec<NodeId>,
    selected: NodeId,
}

impl LogModel {
    pub fn new(tree: LogTree) -> Self {
        let root = tree.root();
        Self::with_root(tree, root)
    }

    /// View a subtree as the model root (used for `--path` startup).
    pub fn with_root(tree: LogTree, root: NodeId) -> Self {
        let mut model = Self { tree, root, displayed_rows: Vec::new(), selected: root };
        model.reset();
        model
    }

    /// Back to the initial projection: the root expanded one level, root
    /// selected.
    pub fn reset(&mut self) {
        self.displayed_rows.clear();
        self.displayed_rows.push(self.root);
        self.displayed_rows.extend(self.tree.node(self.root).children.iter().copied());
        self.selected = self.root;
    }

    pub fn tree(&self) -> &LogTree {
        &self.tree
    }

    pub fn selected(&self) -> NodeId {
        self.selected
    }

    /// Space-joined labels from the tree root to the selected node.
    pub fn selected_path(&self) -> String {
        self.tree.render_path(self.selected)
    }

    /// Raw lines of the selected node, in original order.
    pub fn selected_lines(&self) -> Vec<&str> {
        self.tree.node_lines(self.selected).collect()
    }

    pub fn row_count(&self, pane: PaneId) -> usize {
        match pane {
            PaneId::Tree => self.displayed_rows.len(),
            PaneId::Detail => self.tree.node(self.selected).lines.len(),
        }
    }

    pub fn visible_rows(&self, pane: PaneId, origin: usize, count: usize) -> Vec<String> {
        match pane {
            PaneId::Tree => self
                .displayed_rows
                .iter()
                .skip(origin)
                .take(count)
                .map(|&id| self.row_label(id))
                .collect(),
            PaneId::Detail => {
                self.tree.node_lines(self.selected).skip(origin).take(count).map(str::to_string).collect()
            }
        }
    }

    pub fn content_width(&self, pane: PaneId) -> usize {
        match pane {
            PaneId::Tree => self
                .displayed_rows
                .iter()
                .map(|&id| self.row_label(id).chars().count())
                .max()
                .unwrap_or(0),
            PaneId::Detail => {
                self.tree.node_lines(self.selected).map(|line| line.chars().count()).max().unwrap_or(0)
            }
        }
    }

    /// Select the node at a tree row. Returns true when the selection (and
    /// with it the detail pane content) changed.
    pub fn select(&mut self, row: usize) -> bool {
        let Some(&id) = self.displayed_rows.get(row) else {
            return false;
        };
        if id == self.selected {
            return false;
        }
        self.selected = id;
        true
    }

    /// Expand or collapse the node at a tree row. Returns true when the
    /// projection changed.
    pub fn toggle(&mut self, row: usize) -> bool {
        let Some(&id) = self.displayed_rows.get(row) else {
            return false;
        };
        let depth = self.tree.node(id).depth;

        if self.is_expanded(row) {
            // Remove the node's entire visible subtree: the contiguous run of
            // deeper rows that follows it.
            let start = row + 1;
            let mut end = start;
            while end < self.displayed_rows.len()
                && self.tree.node(self.displayed_rows[end]).depth > depth
            {
                end += 1;
            }
            self.displayed_rows.drain(start..end);
            return true;
        }

        let children = self.tree.node(id).children.clone();
        if children.is_empty() {
            return false;
        }
        self.displayed_rows.splice(row + 1..row + 1, children);
        true
    }

    /// A row is expanded iff the next displayed row sits deeper; the last row
    /// never is.
    pub fn is_expanded(&self, row: usize) -> bool {
        let Some(&id) = self.displayed_rows.get(row) else {
            return false;
        };
        match self.displayed_rows.get(row + 1) {
            Some(&next) => self.tree.node(next).depth > self.tree.node(id).depth,
            None => false,
        }
    }

    /// Rendered tree-pane label: indent by depth relative to the model root,
    /// `+` for nodes with children, `-` for leaves, then the value.
    fn row_label(&self, id: NodeId) -> String {
        let node = self.tree.node(id);
        let rel_depth = node.depth - self.tree.node(self.root).depth;
        let marker = if node.children.is_empty() { '-' } else { '+' };
        let mut label = ROW_INDENT.repeat(rel_depth);
        label.push(marker);
        label.push(' ');
        label.push_str(&node.value);
        label
    }
}

#[cfg(test)]
mod tests {
    use super::{LogModel, PaneId};
    use crate::tree::{build_tree, TreeLimits};

    fn model_over(lines: &[&str]) -> LogModel {
        let tree =
            build_tree(lines.iter().map(|line| line.to_string()).collect(), &TreeLimits::default());
        LogModel::new(tree)
    }

    fn seeded() -> LogModel {
        model_over(&[
            "error a x one",
            "error a x two",
            "error a y",
            "warn disk low",
            "warn disk failing",
            "info started",
        ])
    }

    #[test]
    fn starts_with_root_expanded_one_level() {
        let model = seeded();
        // Root plus its three children: error a, info started, warn disk.
        assert_eq!(model.row_count(PaneId::Tree), 4);
        assert_eq!(model.selected(), model.tree().root());
        let rows = model.visible_rows(PaneId::Tree, 0, 10);
        assert_eq!(rows[0], "+ ");
        assert_eq!(rows[1], "  + error a");
        assert_eq!(rows[2], "  - info started");
        assert_eq!(rows[3], "  + warn disk");
    }

    #[test]
    fn detail_pane_follows_selection() {
        let mut model = seeded();
        assert_eq!(model.row_count(PaneId::Detail), 6);

        assert!(model.select(2));
        assert_eq!(model.selected_path(), "info started");
        assert_eq!(model.visible_rows(PaneId::Detail, 0, 10), vec!["info started".to_string()]);

        // Re-selecting the same row reports no change.
        assert!(!model.select(2));
    }

    #[test]
    fn select_out_of_range_is_ignored() {
        let mut model = seeded();
        assert!(!model.select(99));
        assert_eq!(model.selected(), model.tree().root());
    }

    #[test]
    fn toggle_expands_children_in_place() {
        let mut model = seeded();
        assert!(model.toggle(1));
        let rows = model.visible_rows(PaneId::Tree, 0, 10);
        assert_eq!(rows[1], "  + error a");
        assert_eq!(rows[2], "    + x");
        assert_eq!(rows[3], "    - y");
        assert_eq!(rows[4], "  - info started");
    }

    #[test]
    fn toggle_collapse_removes_exactly_the_visible_subtree() {
        let mut model = seeded();
        model.toggle(1); // expand "error a" -> x, y
        model.toggle(2); // expand "x" -> one, two
        assert_eq!(model.row_count(PaneId::Tree), 8);

        // Collapsing "error a" removes its two children plus the two expanded
        // grandchildren; later siblings shift up by the removed count.
        assert!(model.toggle(1));
        assert_eq!(model.row_count(PaneId::Tree), 4);
        let rows = model.visible_rows(PaneId::Tree, 0, 10);
        assert_eq!(rows[2], "  - info started");
        assert_eq!(rows[3], "  + warn disk");
    }

    #[test]
    fn toggle_on_leaf_is_a_noop() {
        let mut model = seeded();
        assert!(!model.toggle(2)); // "info started" has no children
        assert_eq!(model.row_count(PaneId::Tree), 4);
    }

    #[test]
    fn expansion_state_comes_from_row_depths() {
        let mut model = seeded();
        assert!(model.is_expanded(0)); // root
        assert!(!model.is_expanded(1));
        model.toggle(1);
        assert!(model.is_expanded(1));
        assert!(!model.is_expanded(model.row_count(PaneId::Tree) - 1));
    }

    #[test]
    fn content_width_tracks_widest_row() {
        let model = seeded();
        assert_eq!(model.content_width(PaneId::Tree), "  - info started".chars().count());
        assert_eq!(model.content_width(PaneId::Detail), "warn disk failing".chars().count());
    }

    #[test]
    fn subtree_root_uses_relative_indentation() {
        let lines = ["error a x", "error a y", "warn b"];
        let tree =
            build_tree(lines.iter().map(|line| line.to_string()).collect(), &TreeLimits::default());
        let sub = tree.get_subtree("error a").expect("subtree");
        let model = LogModel::with_root(tree, sub);
        let rows = model.visible_rows(PaneId::Tree, 0, 10);
        assert_eq!(rows[0], "+ error a");
        assert_eq!(rows[1], "  - x");
        assert_eq!(rows[2], "  - y");
        // Detail shows only the subtree's lines.
        assert_eq!(model.row_count(PaneId::Detail), 2);
    }
}
