//! Keyword tree construction over tokenized log lines.
//!
//! Lines sharing a run of leading keywords collapse into a single node; the
//! tree is bounded in depth, fan-out and label length so that arbitrarily
//! noisy input still produces something navigable.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::tokenize::tokenize;

pub const MAX_TREE_DEPTH: usize = 10;
pub const MAX_CHILD_COUNT: usize = 50;
pub const MAX_VALUE_LEN: usize = 120;
pub const MIN_CHILD_LINES: usize = 1;

const DUMP_INDENT: &str = "    ";
const PATH_SEPARATORS: &[char] = &[' ', '.'];

/// Shape limits applied while building a [`LogTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeLimits {
    pub max_depth: usize,
    pub max_children: usize,
    pub max_value_len: usize,
    pub min_child_lines: usize,
}

impl Default for TreeLimits {
    fn default() -> Self {
        Self {
            max_depth: MAX_TREE_DEPTH,
            max_children: MAX_CHILD_COUNT,
            max_value_len: MAX_VALUE_LEN,
            min_child_lines: MIN_CHILD_LINES,
        }
    }
}

/// Index of a node inside its [`LogTree`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// One group of lines sharing a path of leading keywords.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogTreeNode {
    pub value: String,
    pub depth: usize,
    pub parent: Option<NodeId>,
    /// Indices into the tree's line store: every line reachable through this
    /// node, in original order. A parent's list is a superset of the union of
    /// its children's lists.
    pub lines: Vec<u32>,
    /// Ordered by `value`; empty for leaves.
    pub children: Vec<NodeId>,
}

/// Errors raised by path lookup.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TreeError {
    #[error("path not found in tree: {path}")]
    PathNotFound { path: String },
}

/// Arena-allocated keyword tree. The line text lives once in `lines`; nodes
/// refer to it by index. Immutable after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogTree {
    nodes: Vec<LogTreeNode>,
    lines: Vec<String>,
}

struct WorkItem {
    parent: Option<NodeId>,
    label: String,
    depth: usize,
    key_depth: usize,
    pairs: Vec<u32>,
}

/// Build the keyword tree for a batch of already-normalized lines.
pub fn build_tree(lines: Vec<String>, limits: &TreeLimits) -> LogTree {
    let tokens: Vec<Vec<String>> = lines.iter().map(|line| tokenize(line)).collect();
    let mut tree = LogTree { nodes: Vec::new(), lines };

    let mut work = vec![WorkItem {
        parent: None,
        label: String::new(),
        depth: 0,
        key_depth: 0,
        pairs: (0..tree.lines.len() as u32).collect(),
    }];

    while let Some(item) = work.pop() {
        build_node(&mut tree, &tokens, limits, item, &mut work);
    }

    for idx in 0..tree.nodes.len() {
        let mut children = std::mem::take(&mut tree.nodes[idx].children);
        children.sort_by(|a, b| tree.nodes[a.0].value.cmp(&tree.nodes[b.0].value));
        tree.nodes[idx].children = children;
    }

    tree
}

/// Build one node from a work item, queueing its children. Chain compression
/// runs as a loop here instead of re-entering the work list, so a run of
/// never-branching tokens costs one node and no extra stack.
fn build_node(
    tree: &mut LogTree,
    tokens: &[Vec<String>],
    limits: &TreeLimits,
    item: WorkItem,
    work: &mut Vec<WorkItem>,
) {
    let WorkItem { parent, mut label, depth, mut key_depth, pairs } = item;

    let id = NodeId(tree.nodes.len());
    if let Some(parent) = parent {
        tree.nodes[parent.0].children.push(id);
    }

    let mut capped = truncate_label(&mut label, limits.max_value_len);
    let mut buckets: Vec<(String, Vec<u32>)> = Vec::new();

    if !capped && depth < limits.max_depth {
        loop {
            let mut grouped: BTreeMap<&str, Vec<u32>> = BTreeMap::new();
            let mut has_final = false;
            for &pair in &pairs {
                match tokens[pair as usize].get(key_depth) {
                    Some(token) => grouped.entry(token.as_str()).or_default().push(pair),
                    None => has_final = true,
                }
            }

            // Chain compression: a single key shared by every pair never
            // branches, so it merges into this node's label instead of
            // producing a one-child chain.
            if grouped.len() == 1 && !has_final {
                let key = *grouped.keys().next().expect("one key");
                if !label.is_empty() {
                    label.push(' ');
                }
                label.push_str(key);
                key_depth += 1;
                if truncate_label(&mut label, limits.max_value_len) {
                    capped = true;
                    break;
                }
                continue;
            }

            buckets = prune_buckets(grouped, limits);
            break;
        }
    }

    tree.nodes.push(LogTreeNode {
        value: label,
        depth,
        parent,
        lines: pairs,
        children: Vec::new(),
    });

    if !capped {
        for (key, bucket) in buckets {
            work.push(WorkItem {
                parent: Some(id),
                label: key,
                depth: depth + 1,
                key_depth: key_depth + 1,
                pairs: bucket,
            });
        }
    }
}

/// Adaptive pruning: drop buckets under a line-count threshold, doubling the
/// threshold until the surviving count fits under the child cap. Pruned lines
/// stay in the parent's own line list, so pruning narrows navigation but
/// never loses data.
fn prune_buckets(
    grouped: BTreeMap<&str, Vec<u32>>,
    limits: &TreeLimits,
) -> Vec<(String, Vec<u32>)> {
    let buckets: Vec<(String, Vec<u32>)> =
        grouped.into_iter().map(|(key, pairs)| (key.to_string(), pairs)).collect();

    let mut threshold = limits.min_child_lines.max(1);
    for _ in 0..usize::BITS {
        let surviving = buckets.iter().filter(|(_, pairs)| pairs.len() >= threshold).count();
        if surviving <= limits.max_children {
            return buckets.into_iter().filter(|(_, pairs)| pairs.len() >= threshold).collect();
        }
        threshold = threshold.saturating_mul(2);
    }
    Vec::new()
}

/// Truncate at a char boundary when the label exceeds the cap. A capped label
/// also stops recursion: the cap is the safety valve against pathological
/// long-token runs.
fn truncate_label(label: &mut String, max_len: usize) -> bool {
    if label.len() <= max_len {
        return false;
    }
    let mut cut = max_len;
    while !label.is_char_boundary(cut) {
        cut -= 1;
    }
    label.truncate(cut);
    true
}

impl LogTree {
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn node(&self, id: NodeId) -> &LogTreeNode {
        &self.nodes[id.0]
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn line(&self, idx: u32) -> &str {
        &self.lines[idx as usize]
    }

    /// Raw lines under a node, in original order.
    pub fn node_lines(&self, id: NodeId) -> impl Iterator<Item = &str> {
        self.nodes[id.0].lines.iter().map(|&idx| self.lines[idx as usize].as_str())
    }

    /// Resolve a dotted/space-separated path to a node. Components may be
    /// abbreviated to any prefix of a node's label; the first matching child
    /// wins.
    pub fn get_subtree(&self, path: &str) -> Result<NodeId, TreeError> {
        let trimmed = path.trim().trim_matches(PATH_SEPARATORS);
        self.resolve(self.root(), trimmed)
            .ok_or_else(|| TreeError::PathNotFound { path: path.to_string() })
    }

    fn resolve(&self, id: NodeId, path: &str) -> Option<NodeId> {
        let node = &self.nodes[id.0];
        if node.value.starts_with(path) {
            return Some(id);
        }
        let rest = path.strip_prefix(node.value.as_str())?;
        let rest = rest.trim_start_matches(PATH_SEPARATORS);
        if rest.is_empty() {
            return Some(id);
        }
        node.children.iter().find_map(|&child| self.resolve(child, rest))
    }

    /// The node's labels from the root down, space-joined. Right inverse of
    /// [`LogTree::get_subtree`].
    pub fn render_path(&self, id: NodeId) -> String {
        let mut values = Vec::new();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let node = &self.nodes[current.0];
            if !node.value.is_empty() {
                values.push(node.value.as_str());
            }
            cursor = node.parent;
        }
        values.reverse();
        values.join(" ")
    }

    /// The full tree as an indented text dump, one node per line.
    pub fn dump(&self) -> String {
        self.dump_from(self.root())
    }

    /// Indented dump of a subtree; indentation stays proportional to the
    /// absolute node depth.
    pub fn dump_from(&self, id: NodeId) -> String {
        let mut out = String::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let node = &self.nodes[current.0];
            for _ in 0..node.depth {
                out.push_str(DUMP_INDENT);
            }
            out.push_str(&node.value);
            out.push('\n');
            stack.extend(node.children.iter().rev());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::{build_tree, LogTree, NodeId, TreeError, TreeLimits};

    fn build(lines: &[&str]) -> LogTree {
        build_tree(lines.iter().map(|line| line.to_string()).collect(), &TreeLimits::default())
    }

    fn child_values(tree: &LogTree, id: NodeId) -> Vec<String> {
        tree.node(id).children.iter().map(|&child| tree.node(child).value.clone()).collect()
    }

    #[test]
    fn empty_input_builds_degenerate_root() {
        let tree = build(&[]);
        assert_eq!(tree.node_count(), 1);
        let root = tree.node(tree.root());
        assert!(root.lines.is_empty());
        assert!(root.children.is_empty());
        assert_eq!(root.value, "");
    }

    #[test]
    fn single_line_collapses_into_one_node() {
        let tree = build(&["error   25-Apr-2017 20:37:09    [some message] more text"]);
        let root = tree.node(tree.root());
        assert!(root.children.is_empty());
        assert_eq!(root.value, "error some message more text");
        assert_eq!(tree.node_lines(tree.root()).count(), 1);
    }

    #[test]
    fn identical_lines_merge_without_children() {
        let tree = build(&["error some message", "error some message"]);
        let root = tree.node(tree.root());
        assert!(root.children.is_empty());
        assert_eq!(root.value, "error some message");
        assert_eq!(root.lines.len(), 2);
    }

    #[test]
    fn prefix_line_keeps_suffix_as_child() {
        let lines = ["error some message", "error some message with more text"];
        let tree = build(&lines);
        let root = tree.node(tree.root());
        assert_eq!(root.value, "error some message");
        assert_eq!(root.children.len(), 1);
        assert_eq!(root.lines.len(), 2);

        let child = tree.node(root.children[0]);
        assert!(child.children.is_empty());
        assert_eq!(child.value, "with more text");
        assert_eq!(tree.node_lines(root.children[0]).collect::<Vec<_>>(), vec![lines[1]]);
    }

    #[test]
    fn cruft_is_dropped_before_grouping() {
        let tree = build(&["error a 25-Apr-2017 20:37:09 x", "error a y"]);
        let root = tree.node(tree.root());
        assert_eq!(root.value, "error a");
        assert_eq!(root.lines.len(), 2);
        assert_eq!(child_values(&tree, tree.root()), vec!["x", "y"]);
        let collected: Vec<&str> = tree.node_lines(tree.root()).collect();
        assert_eq!(collected, vec!["error a 25-Apr-2017 20:37:09 x", "error a y"]);
    }

    #[test]
    fn children_are_sorted_by_value() {
        let tree = build(&["log zebra 1", "log apple 2", "log mango 3"]);
        assert_eq!(child_values(&tree, tree.root()), vec!["apple 2", "mango 3", "zebra 1"]);
    }

    #[test]
    fn all_cruft_line_terminates_at_root() {
        let tree = build(&["error x", "2017/04/25 11:22:33"]);
        let root = tree.node(tree.root());
        // The token-free line is final at depth 0, so the shared prefix never
        // merges into the root label.
        assert_eq!(root.value, "");
        assert_eq!(root.lines.len(), 2);
        assert_eq!(child_values(&tree, tree.root()), vec!["error x"]);
    }

    #[test]
    fn building_twice_is_idempotent() {
        let lines = [
            "error a x",
            "error a y",
            "warn b z",
            "warn b z second",
            "2017/04/25 pure cruft 11:22:33",
        ];
        assert_eq!(build(&lines), build(&lines));
    }

    #[test]
    fn parent_lines_cover_children_and_finals_in_order() {
        let lines =
            ["error a x", "warn b", "error a y", "error a", "warn b extra", "unrelated one two"];
        let tree = build(&lines);

        let mut stack = vec![tree.root()];
        while let Some(id) = stack.pop() {
            let node = tree.node(id);
            let mut from_children: Vec<u32> = Vec::new();
            for &child in &node.children {
                from_children.extend(&tree.node(child).lines);
            }
            // Every child line appears in the parent, and the parent's order
            // is the original input order.
            for line in &from_children {
                assert!(node.lines.contains(line));
            }
            assert!(node.lines.windows(2).all(|pair| pair[0] < pair[1]));
            stack.extend(&node.children);
        }
    }

    #[test]
    fn chain_compression_merges_shared_run() {
        let tree = build(&["a b c d x", "a b c d y"]);
        let root = tree.node(tree.root());
        assert_eq!(root.value, "a b c d");
        assert_eq!(child_values(&tree, tree.root()), vec!["x", "y"]);
    }

    #[test]
    fn value_length_cap_stops_recursion() {
        let limits = TreeLimits { max_value_len: 10, ..TreeLimits::default() };
        let tree = build_tree(
            vec!["alpha beta gamma delta x".to_string(), "alpha beta gamma delta y".to_string()],
            &limits,
        );
        let root = tree.node(tree.root());
        assert!(root.value.len() <= 10);
        assert!(root.children.is_empty());
        assert_eq!(root.lines.len(), 2);
    }

    #[test]
    fn depth_cap_stops_recursion() {
        let limits = TreeLimits { max_depth: 2, ..TreeLimits::default() };
        // Every level branches two ways, so chain compression cannot flatten
        // the input and only the depth cap bounds the tree.
        let mut lines = Vec::new();
        for a in 0..2 {
            for b in 0..2 {
                for c in 0..2 {
                    lines.push(format!("root a{a} b{b} c{c}"));
                }
            }
        }
        let tree = build_tree(lines, &limits);
        let mut stack = vec![tree.root()];
        let mut max_depth = 0;
        while let Some(id) = stack.pop() {
            let node = tree.node(id);
            max_depth = max_depth.max(node.depth);
            if node.depth == limits.max_depth {
                assert!(node.children.is_empty());
                // The c-level variants stay merged into the capped node.
                assert_eq!(node.lines.len(), 2);
            }
            stack.extend(&node.children);
        }
        assert_eq!(max_depth, 2);
    }

    #[test]
    fn pruning_respects_threshold_and_cap() {
        let limits = TreeLimits { max_children: 8, ..TreeLimits::default() };
        let mut lines = Vec::new();
        // Six heavy keys with three lines each, sixty singletons: the first
        // doubling (threshold 2) trims the level down to the heavy keys.
        for key in 0..6 {
            for line in 0..3 {
                lines.push(format!("app heavy{key} event{line}"));
            }
        }
        for key in 0..60 {
            lines.push(format!("app single{key} event"));
        }
        let total = lines.len();
        let tree = build_tree(lines, &limits);
        let root = tree.node(tree.root());

        assert_eq!(root.value, "app");
        assert_eq!(root.children.len(), 6);
        // Pruned lines are still accounted for at the parent.
        assert_eq!(root.lines.len(), total);
        for &child in &root.children {
            assert_eq!(tree.node(child).lines.len(), 3);
        }
    }

    #[test]
    fn overfull_level_with_uniform_singletons_keeps_no_children() {
        let limits = TreeLimits { max_children: 8, ..TreeLimits::default() };
        let lines: Vec<String> = (0..20).map(|key| format!("app key{key}")).collect();
        let tree = build_tree(lines, &limits);
        let root = tree.node(tree.root());
        assert_eq!(root.value, "app");
        assert!(root.children.is_empty());
        assert_eq!(root.lines.len(), 20);
    }

    #[test]
    fn get_subtree_inverts_render_path() {
        let tree = build(&[
            "error a x one",
            "error a y",
            "warn disk low",
            "warn disk failing badly",
            "info started",
        ]);
        let mut stack = vec![tree.root()];
        while let Some(id) = stack.pop() {
            let path = tree.render_path(id);
            assert_eq!(tree.get_subtree(&path), Ok(id), "path {path:?}");
            stack.extend(&tree.node(id).children);
        }
    }

    #[test]
    fn get_subtree_accepts_abbreviations_and_dots() {
        let tree = build(&["error a x", "error a y", "warn b z"]);
        let full = tree.get_subtree("error a x").expect("full path");
        assert_eq!(tree.node(full).value, "x");
        assert_eq!(tree.get_subtree("error a.x"), Ok(full));

        let abbreviated = tree.get_subtree("err").expect("prefix abbreviation");
        assert_eq!(tree.node(abbreviated).value, "error a");
    }

    #[test]
    fn get_subtree_reports_missing_paths() {
        let tree = build(&["error a x", "error a y"]);
        assert_eq!(
            tree.get_subtree("nothing here"),
            Err(TreeError::PathNotFound { path: "nothing here".to_string() })
        );
    }

    #[test]
    fn dump_indents_by_depth() {
        let tree = build(&["error a x", "error a y"]);
        let dump = tree.dump();
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines, vec!["error a", "    x", "    y"]);
    }
}
