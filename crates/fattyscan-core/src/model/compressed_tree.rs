/// Arena-backed compressed tree built incrementally by the walker.
///
/// All nodes live in a single `Vec<CompressedNode>`. The walker appends a
/// directory node before walking it and links it into its parent only once
/// its subtree turns out to be non-empty; a discarded subtree is removed by
/// truncating the arena back to where it began. Because the walk is a
/// single depth-first pass, everything past that point belongs to the
/// discarded subtree.
use super::compressed_node::{CompressedNode, NodeIndex};
use super::size::format_size;
use compact_str::CompactString;
use std::fmt::Write;

/// The compressed tree produced by one scan. Index 0 is always the root.
#[derive(Debug, Clone, Default)]
pub struct CompressedTree {
    /// Arena: every node in a flat, cache-friendly vector.
    nodes: Vec<CompressedNode>,
}

impl CompressedTree {
    /// Create a tree holding only a root directory.
    ///
    /// `estimated_nodes` is a pre-allocation hint; the arena grows as needed.
    pub fn with_root(name: CompactString, is_file_filled: bool, estimated_nodes: usize) -> Self {
        let mut nodes = Vec::with_capacity(estimated_nodes.max(1));
        nodes.push(CompressedNode::new_dir(name, is_file_filled));
        Self { nodes }
    }

    /// Index of the root node, or `None` for an empty tree.
    #[inline]
    pub fn root(&self) -> Option<NodeIndex> {
        if self.nodes.is_empty() {
            None
        } else {
            Some(NodeIndex(0))
        }
    }

    /// Allocate a new, unlinked node in the arena and return its index.
    pub fn add_node(&mut self, node: CompressedNode) -> NodeIndex {
        let idx = NodeIndex::new(self.nodes.len());
        self.nodes.push(node);
        idx
    }

    /// Link `child` as the last child of `parent`.
    pub fn append_child(&mut self, parent: NodeIndex, child: NodeIndex) {
        debug_assert!(child.idx() < self.nodes.len(), "child outside arena");
        self.nodes[child.idx()].next_sibling = None;
        match self.nodes[parent.idx()].last_child {
            Some(last) => self.nodes[last.idx()].next_sibling = Some(child),
            None => self.nodes[parent.idx()].first_child = Some(child),
        }
        self.nodes[parent.idx()].last_child = Some(child);
    }

    /// Add `delta` bytes to a node's running size.
    #[inline]
    pub fn add_size(&mut self, index: NodeIndex, delta: u64) {
        let node = &mut self.nodes[index.idx()];
        node.size = node.size.saturating_add(delta);
    }

    /// Drop every node at or after `len`.
    ///
    /// Only valid for nodes that were never linked into a surviving parent.
    pub fn truncate(&mut self, len: usize) {
        debug_assert!(len >= 1, "the root cannot be truncated away");
        self.nodes.truncate(len);
    }

    /// Release spare arena capacity left over from growth during the walk.
    pub fn shrink_to_fit(&mut self) {
        self.nodes.shrink_to_fit();
    }

    /// Iterate the cached children of a node in insertion order.
    pub fn children(&self, parent: NodeIndex) -> Children<'_> {
        Children {
            tree: self,
            next: self.nodes[parent.idx()].first_child,
        }
    }

    /// Look up a cached child by name.
    ///
    /// An exact match wins; otherwise the first case-insensitive match is
    /// returned.
    pub fn find_child(&self, parent: NodeIndex, name: &str) -> Option<NodeIndex> {
        let mut folded: Option<NodeIndex> = None;
        let wanted = name.to_lowercase();
        for child in self.children(parent) {
            let child_name = self.nodes[child.idx()].name.as_str();
            if child_name == name {
                return Some(child);
            }
            if folded.is_none() && child_name.to_lowercase() == wanted {
                folded = Some(child);
            }
        }
        folded
    }

    /// Get the node at the given index.
    #[inline]
    pub fn node(&self, index: NodeIndex) -> &CompressedNode {
        &self.nodes[index.idx()]
    }

    /// Mutable access to the node at the given index.
    #[inline]
    pub fn node_mut(&mut self, index: NodeIndex) -> &mut CompressedNode {
        &mut self.nodes[index.idx()]
    }

    /// Total size of the root, or 0 for a cleared tree.
    pub fn total_size(&self) -> u64 {
        self.nodes.first().map(|n| n.size).unwrap_or(0)
    }

    /// Total number of nodes in the arena (linked or not).
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if the tree contains no nodes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Indented, depth-limited rendering of the cached tree.
    ///
    /// `depth = 1` renders the root line only.
    pub fn render(&self, depth: usize) -> String {
        let mut out = String::new();
        if let Some(root) = self.root() {
            self.render_node(root, depth, 0, &mut out);
        }
        out
    }

    fn render_node(&self, index: NodeIndex, depth: usize, indent: usize, out: &mut String) {
        let node = self.node(index);
        if indent > 0 {
            out.push('\n');
        }
        for _ in 0..indent {
            out.push_str("  ");
        }
        let _ = write!(out, "{} {}", node.name, format_size(node.size));
        if depth > 1 {
            for child in self.children(index) {
                self.render_node(child, depth - 1, indent + 1, out);
            }
        }
    }
}

/// Iterator over the cached children of one node.
pub struct Children<'a> {
    tree: &'a CompressedTree,
    next: Option<NodeIndex>,
}

impl Iterator for Children<'_> {
    type Item = NodeIndex;

    fn next(&mut self) -> Option<NodeIndex> {
        let current = self.next?;
        self.next = self.tree.nodes[current.idx()].next_sibling;
        Some(current)
    }
}
