/// A single node in the arena-allocated compressed tree.
///
/// Nodes are stored in a flat `Vec<CompressedNode>` and refer to each other
/// through `NodeIndex` values. There is deliberately no parent link: the
/// query layer carries the full path down its recursion instead, so a
/// subtree can be discarded without fixing up back-references.
use compact_str::CompactString;

/// Lightweight index into the arena `Vec<CompressedNode>`.
///
/// Uses `u32` to keep nodes small — supports up to ~4 billion nodes,
/// which is more than enough for any real filesystem.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeIndex(pub u32);

impl NodeIndex {
    /// Create a new `NodeIndex` from a `usize`.
    #[inline]
    pub fn new(index: usize) -> Self {
        debug_assert!(index <= u32::MAX as usize, "NodeIndex overflow");
        Self(index as u32)
    }

    /// Return the index as a `usize` for Vec indexing.
    #[inline]
    pub fn idx(self) -> usize {
        self.0 as usize
    }
}

/// One file or directory in the compressed tree.
///
/// `size` is always exact. The child list is a cache of that exactness and
/// may be incomplete: directories beyond the fill depth keep only their
/// sub-directories, and zero-sized entries are never stored at all.
#[derive(Debug, Clone)]
pub struct CompressedNode {
    /// Entry name only (NOT the full path), stored as compact UTF-8.
    pub name: CompactString,

    /// Logical size in bytes. For directories, the sum of every descendant
    /// file, whether or not those descendants are cached.
    pub size: u64,

    /// `true` if this node represents a directory.
    pub is_dir: bool,

    /// `true` if the immediate file children of this directory are cached.
    /// When `false`, file children must be re-read from disk on demand.
    pub is_file_filled: bool,

    /// First child. Children form a singly-linked list via [`next_sibling`].
    pub first_child: Option<NodeIndex>,

    /// Last child, kept so appends are O(1) and preserve enumeration order.
    pub last_child: Option<NodeIndex>,

    /// Next sibling under the same parent.
    pub next_sibling: Option<NodeIndex>,
}

impl CompressedNode {
    /// Create a file leaf with a known size.
    pub fn new_file(name: CompactString, size: u64) -> Self {
        Self {
            name,
            size,
            is_dir: false,
            is_file_filled: false,
            first_child: None,
            last_child: None,
            next_sibling: None,
        }
    }

    /// Create an empty directory node; its size grows as the walker appends.
    pub fn new_dir(name: CompactString, is_file_filled: bool) -> Self {
        Self {
            name,
            size: 0,
            is_dir: true,
            is_file_filled,
            first_child: None,
            last_child: None,
            next_sibling: None,
        }
    }

    /// Returns `true` if this node has at least one cached child.
    #[inline]
    pub fn has_children(&self) -> bool {
        self.first_child.is_some()
    }
}
