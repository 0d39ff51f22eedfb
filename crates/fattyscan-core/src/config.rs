/// Scan session configuration.
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tunables for one [`ScanSession`](crate::session::ScanSession).
///
/// Every field has a default, so a partial JSON document deserializes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// File-caching budget. The scan root starts with this value and each
    /// level below gets one less; a directory caches its file entries only
    /// while its budget is above 1. Other directories keep sub-directories
    /// and sizes, and their files are read back at query time.
    pub fill_depth: u32,

    /// Minimum progress increase between two progress events.
    pub progress_min_delta: f64,

    /// Minimum wall-clock gap between two progress events, in milliseconds.
    pub progress_min_interval_ms: u64,

    /// Bound of each channel handed out by `subscribe()`.
    pub event_channel_capacity: usize,

    /// Stack size of the scan thread. The walk is recursive, so deeply
    /// nested trees need more than the platform default.
    pub walker_stack_size: usize,
}

impl ScanConfig {
    /// Progress throttle interval as a `Duration`.
    pub fn progress_min_interval(&self) -> Duration {
        Duration::from_millis(self.progress_min_interval_ms)
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            fill_depth: 3,
            progress_min_delta: 0.0001,
            progress_min_interval_ms: 300,
            event_channel_capacity: 4_096,
            walker_stack_size: 64 * 1024 * 1024,
        }
    }
}
