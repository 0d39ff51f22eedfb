/// Scanner module — the recursive walker and its progress estimator.
///
/// The walker fills a shared compressed tree depth-first while the
/// estimator turns its traversal events into a throttled completion value.
/// Both are driven by [`ScanSession`](crate::session::ScanSession), which
/// owns the background thread and the shared lock.
pub mod progress;
pub mod walker;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub use progress::{ProgressEstimator, ProgressMode, ProgressSnapshot};
pub use walker::{WalkSink, Walker};

/// Cooperative stop signal shared between a session and its walker.
///
/// One token exists per scan; a fresh scan gets a fresh token, so a stale
/// stop request can never cancel the next scan.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request the scan to stop as soon as possible.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// Check whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}
