/// Recursive depth-first walker that fills the compressed tree.
///
/// The walker never holds the shared lock across a recursive call. Each
/// append or size update takes the lock through [`WalkSink::with_tree`] and
/// releases it immediately, so queries running beside a scan are blocked for
/// one node operation at most.
///
/// A directory is linked into its parent only after its subtree finished
/// with a nonzero size. Until then it sits unlinked at the end of the arena;
/// if it ends up empty or unreadable the arena is truncated back, which is
/// sound because the walk is a single depth-first pass.
use crate::error::ScanError;
use crate::model::{CompressedNode, CompressedTree, NodeIndex};
use crate::platform::{is_link, is_offline};
use crate::scanner::progress::{ProgressEstimator, ProgressSnapshot};
use crate::scanner::CancelToken;
use compact_str::CompactString;
use std::fs;
use std::io;
use std::path::Path;
use tracing::debug;

/// Where the walker writes its results.
pub trait WalkSink {
    /// Run `f` with exclusive access to the shared tree and estimator.
    fn with_tree<R>(&self, f: impl FnOnce(&mut CompressedTree, &mut ProgressEstimator) -> R) -> R;

    /// Forward a throttled progress snapshot to listeners. Called with no
    /// lock held.
    fn publish_progress(&self, snapshot: ProgressSnapshot);
}

/// One traversal over one scan root.
pub struct Walker<'a, S: WalkSink> {
    sink: &'a S,
    cancel: CancelToken,
}

impl<'a, S: WalkSink> Walker<'a, S> {
    pub fn new(sink: &'a S, cancel: CancelToken) -> Self {
        Self { sink, cancel }
    }

    /// Walk `dir` into the existing node `target`.
    ///
    /// `fill_depth` counts the levels, `target` included, whose file entries
    /// are cached: a directory caches its files while its remaining depth is
    /// above 1. Returns `ScanError::Cancelled` as soon as a stop is observed;
    /// any other error means `dir` itself could not be enumerated.
    pub fn walk(&self, dir: &Path, target: NodeIndex, fill_depth: u32) -> Result<(), ScanError> {
        self.check_cancel()?;
        let is_file_filled = fill_depth > 1;
        self.sink.with_tree(|tree, estimator| {
            let node = tree.node_mut(target);
            node.is_dir = true;
            node.is_file_filled = is_file_filled;
            estimator.enter_dir();
        });

        let result = self.walk_entries(dir, target, fill_depth);

        if !matches!(result, Err(ScanError::Cancelled)) {
            let snapshot = self.sink.with_tree(|_, estimator| estimator.exit_dir());
            self.publish(snapshot);
        }
        result
    }

    fn walk_entries(&self, dir: &Path, target: NodeIndex, fill_depth: u32) -> Result<(), ScanError> {
        let iter = fs::read_dir(dir).map_err(|e| ScanError::io(dir, e))?;
        let (entries, unreadable) = split_entries(dir, iter);

        let entry_count = entries.len() + unreadable;
        self.sink
            .with_tree(|_, estimator| estimator.set_entry_count(entry_count));
        for _ in 0..unreadable {
            self.skip_entry();
        }
        let is_file_filled = fill_depth > 1;

        for entry in entries {
            self.check_cancel()?;

            let path = entry.path();
            let metadata = match entry.metadata() {
                Ok(m) => m,
                Err(err) => {
                    debug!("Skipping {}: {err}", path.display());
                    self.skip_entry();
                    continue;
                }
            };

            if is_link(&metadata) {
                debug!("Skipping link {}", path.display());
                self.skip_entry();
                continue;
            }

            let name = CompactString::new(entry.file_name().to_string_lossy());

            if metadata.is_dir() {
                self.walk_subdir(&path, name, target, fill_depth)?;
                continue;
            }

            if is_offline(&metadata) {
                debug!("Skipping offline file {}", path.display());
                self.skip_entry();
                continue;
            }

            let len = metadata.len();
            let snapshot = self.sink.with_tree(|tree, estimator| {
                tree.add_size(target, len);
                if is_file_filled && len > 0 {
                    let leaf = tree.add_node(CompressedNode::new_file(name, len));
                    tree.append_child(target, leaf);
                }
                let by_size = estimator.add_bytes(len);
                estimator.complete_entry().or(by_size)
            });
            self.publish(snapshot);
        }

        Ok(())
    }

    /// Walk one sub-directory and attach it to `parent` if it holds data.
    fn walk_subdir(
        &self,
        path: &Path,
        name: CompactString,
        parent: NodeIndex,
        fill_depth: u32,
    ) -> Result<(), ScanError> {
        let child_fill = fill_depth.saturating_sub(1);
        let (child, mark) = self.sink.with_tree(|tree, _| {
            let mark = tree.len();
            let child = tree.add_node(CompressedNode::new_dir(name, child_fill > 1));
            (child, mark)
        });

        match self.walk(path, child, child_fill) {
            Ok(()) => {
                self.sink.with_tree(|tree, _| {
                    let size = tree.node(child).size;
                    if size > 0 {
                        tree.append_child(parent, child);
                        tree.add_size(parent, size);
                    } else {
                        tree.truncate(mark);
                    }
                });
                Ok(())
            }
            Err(ScanError::Cancelled) => {
                self.sink.with_tree(|tree, _| tree.truncate(mark));
                Err(ScanError::Cancelled)
            }
            Err(err) => {
                debug!("Skipping unreadable subtree: {err}");
                self.sink.with_tree(|tree, _| tree.truncate(mark));
                Ok(())
            }
        }
    }

    /// Count a skipped non-directory entry as done.
    fn skip_entry(&self) {
        let snapshot = self.sink.with_tree(|_, estimator| estimator.complete_entry());
        self.publish(snapshot);
    }

    fn publish(&self, snapshot: Option<ProgressSnapshot>) {
        if let Some(snapshot) = snapshot {
            self.sink.publish_progress(snapshot);
        }
    }

    fn check_cancel(&self) -> Result<(), ScanError> {
        if self.cancel.is_cancelled() {
            Err(ScanError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Keep the entries that could be read, counting the ones that could not.
fn split_entries<T>(dir: &Path, iter: impl Iterator<Item = io::Result<T>>) -> (Vec<T>, usize) {
    let mut entries = Vec::new();
    let mut unreadable = 0;
    for entry in iter {
        match entry {
            Ok(entry) => entries.push(entry),
            Err(err) => {
                debug!("Skipping unreadable entry in {}: {err}", dir.display());
                unreadable += 1;
            }
        }
    }
    (entries, unreadable)
}
