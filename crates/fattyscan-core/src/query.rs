/// Tree query and projection.
///
/// Builds a bounded, filtered copy of part of the compressed tree. Each
/// level is filtered against its own parent's size, file children that the
/// scan did not cache are read back from disk, and whatever the filter
/// dropped is folded into one synthetic "Others" entry so the children of a
/// projected directory always add up to its size.
use std::ffi::OsStr;
use std::fs;
use std::path::{Component, Path, PathBuf};

use tracing::debug;

use crate::error::ScanError;
use crate::model::{CompressedTree, NodeIndex, ProjectedNode};
use crate::platform::{is_link, is_offline};

/// Project the subtree at `start_path` (or the scan root when `None`).
///
/// Returns `Ok(None)` if the path lies inside the scan but has no cached
/// node, e.g. an empty directory or one the walker has not finished yet.
pub fn get_tree(
    tree: &CompressedTree,
    scan_path: &Path,
    start_path: Option<&Path>,
    depth: usize,
    ignore_size: f64,
) -> Result<Option<ProjectedNode>, ScanError> {
    if depth == 0 {
        return Err(ScanError::invalid_argument("depth must be at least 1"));
    }
    if !ignore_size.is_finite() || ignore_size < 0.0 {
        return Err(ScanError::invalid_argument(format!(
            "ignore_size must be a non-negative number, got {ignore_size}"
        )));
    }

    let Some((index, full_path)) = resolve(tree, scan_path, start_path)? else {
        return Ok(None);
    };
    let name = full_path.to_string_lossy().into_owned();
    Ok(Some(project(tree, index, &full_path, name, depth, ignore_size)))
}

/// Resolve `start_path` to a cached node and its real on-disk path.
///
/// Segments are matched exactly first, then case-insensitively; the
/// returned path is built from the cached names, not the caller's spelling.
pub fn resolve(
    tree: &CompressedTree,
    scan_path: &Path,
    start_path: Option<&Path>,
) -> Result<Option<(NodeIndex, PathBuf)>, ScanError> {
    let Some(root) = tree.root() else {
        return Ok(None);
    };
    let start = match start_path {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => return Ok(Some((root, scan_path.to_path_buf()))),
    };

    let rest = strip_scan_prefix(scan_path, start).ok_or_else(|| {
        ScanError::invalid_argument(format!(
            "{} is not inside the scanned path {}",
            start.display(),
            scan_path.display()
        ))
    })?;

    let mut current = root;
    let mut full_path = scan_path.to_path_buf();
    for segment in rest {
        let segment = segment.to_string_lossy();
        match tree.find_child(current, &segment) {
            Some(child) => {
                full_path.push(tree.node(child).name.as_str());
                current = child;
            }
            None => return Ok(None),
        }
    }
    Ok(Some((current, full_path)))
}

/// Copy `index` into a projected node bounded to `depth` levels.
///
/// `depth = 1` yields the node alone. Files are always leaves.
pub fn project(
    tree: &CompressedTree,
    index: NodeIndex,
    full_path: &Path,
    name: String,
    depth: usize,
    ignore_size: f64,
) -> ProjectedNode {
    let node = tree.node(index);
    let mut view = ProjectedNode::new(name, node.is_dir, node.size);
    if depth <= 1 || !node.is_dir {
        return view;
    }

    let parent_size = node.size.max(1) as f64;
    let mut included: u64 = 0;

    for child_index in tree.children(index) {
        let child = tree.node(child_index);
        if child.name.is_empty() || !passes_filter(child.size, parent_size, ignore_size) {
            continue;
        }
        let child_path = full_path.join(child.name.as_str());
        let child_view = project(
            tree,
            child_index,
            &child_path,
            child.name.to_string(),
            depth - 1,
            ignore_size,
        );
        included += child_view.size;
        view.children.push(child_view);
    }

    if !node.is_file_filled {
        included += read_live_files(full_path, parent_size, ignore_size, &mut view.children);
    }

    if included < node.size {
        view.children.push(ProjectedNode::others(node.size - included));
    }
    view
}

/// Whether a child of `size` bytes survives the filter under a parent of
/// `parent_size` bytes.
///
/// `0` keeps everything, `(0, 1)` is a fraction of the parent, and `>= 1`
/// is an absolute byte threshold.
pub fn passes_filter(size: u64, parent_size: f64, ignore_size: f64) -> bool {
    if ignore_size <= 0.0 {
        true
    } else if ignore_size < 1.0 {
        size as f64 / parent_size >= ignore_size
    } else {
        size as f64 >= ignore_size
    }
}

/// Append the uncached file children of `dir`, read live from disk.
///
/// Applies the walker's skip rules plus the size filter. Any I/O error just
/// ends the listing. Returns the bytes appended.
fn read_live_files(
    dir: &Path,
    parent_size: f64,
    ignore_size: f64,
    out: &mut Vec<ProjectedNode>,
) -> u64 {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            debug!("Live read of {} failed: {err}", dir.display());
            return 0;
        }
    };

    let mut added: u64 = 0;
    for entry in entries.flatten() {
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        if metadata.is_dir() || is_link(&metadata) || is_offline(&metadata) {
            continue;
        }
        let len = metadata.len();
        if len == 0 || !passes_filter(len, parent_size, ignore_size) {
            continue;
        }
        out.push(ProjectedNode::new(
            entry.file_name().to_string_lossy().into_owned(),
            false,
            len,
        ));
        added += len;
    }
    added
}

/// Components of `start` past `scan`, or `None` if `scan` is not a prefix.
fn strip_scan_prefix<'a>(scan: &Path, start: &'a Path) -> Option<Vec<&'a OsStr>> {
    let mut start_components = start.components().filter(|c| !matches!(c, Component::CurDir));
    for scan_component in scan.components().filter(|c| !matches!(c, Component::CurDir)) {
        let start_component = start_components.next()?;
        if !same_component(scan_component.as_os_str(), start_component.as_os_str()) {
            return None;
        }
    }

    let mut rest = Vec::new();
    for component in start_components {
        match component {
            Component::Normal(segment) => rest.push(segment),
            _ => return None,
        }
    }
    Some(rest)
}

fn same_component(a: &OsStr, b: &OsStr) -> bool {
    a == b || a.to_string_lossy().to_lowercase() == b.to_string_lossy().to_lowercase()
}
