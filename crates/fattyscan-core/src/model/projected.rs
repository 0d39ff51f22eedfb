/// Projected view — the fully materialised, depth- and size-bounded copy of
/// part of the compressed tree handed to callers.
///
/// A `ProjectedNode` owns its data outright; it never borrows from the live
/// tree and stays valid after the scan moves on or the session is cleared.
use super::size::format_size;
use serde::Serialize;
use std::fmt::Write;

/// Display name given to the synthetic remainder entry.
pub const OTHERS_NAME: &str = "Others";

/// One entry of a projected view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectedNode {
    /// Entry name. For the view root this is the full requested path.
    pub name: String,
    /// `true` for directories.
    pub is_dir: bool,
    /// `true` for the synthetic entry aggregating every filtered-out child.
    pub is_others: bool,
    /// Size in bytes.
    pub size: u64,
    /// Included children, followed by the Others entry when anything was
    /// filtered out.
    pub children: Vec<ProjectedNode>,
}

impl ProjectedNode {
    /// A directory or file entry with no children yet.
    pub fn new(name: impl Into<String>, is_dir: bool, size: u64) -> Self {
        Self {
            name: name.into(),
            is_dir,
            is_others: false,
            size,
            children: Vec::new(),
        }
    }

    /// The synthetic remainder entry.
    pub fn others(size: u64) -> Self {
        Self {
            name: OTHERS_NAME.to_string(),
            is_dir: false,
            is_others: true,
            size,
            children: Vec::new(),
        }
    }

    /// Sum of the direct children's sizes.
    pub fn children_size(&self) -> u64 {
        self.children.iter().map(|c| c.size).sum()
    }

    /// Find a direct child by exact name.
    pub fn child(&self, name: &str) -> Option<&ProjectedNode> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Indented, depth-limited text rendering.
    pub fn render(&self, depth: usize) -> String {
        let mut out = String::new();
        self.render_into(depth, 0, &mut out);
        out
    }

    fn render_into(&self, depth: usize, indent: usize, out: &mut String) {
        if indent > 0 {
            out.push('\n');
        }
        for _ in 0..indent {
            out.push_str("  ");
        }
        let _ = write!(out, "{} {}", self.name, format_size(self.size));
        if self.is_dir && !self.is_others {
            out.push('/');
        }
        if depth > 1 {
            for child in &self.children {
                child.render_into(depth - 1, indent + 1, out);
            }
        }
    }
}
