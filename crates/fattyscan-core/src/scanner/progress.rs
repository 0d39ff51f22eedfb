/// Scan progress estimation — turns raw traversal events into a bounded
/// 0..1 completion estimate and decides when an event is worth emitting.
///
/// Two modes are chosen once per scan:
///
/// - **Size:** the scan root is a whole volume, so the volume's used bytes
///   are a good upfront total and progress is bytes seen ÷ used bytes.
/// - **FileCount:** an arbitrary folder has no upfront total. The root owns
///   weight 1.0; each directory splits its weight equally between its
///   entries, and finishing an entry retires its share. A directory that
///   exits short of its weight (skipped or unreadable entries) is topped up
///   so the estimate still converges.
use serde::Serialize;
use std::time::{Duration, Instant};

/// Upper bound reported before [`ProgressEstimator::complete`] is called.
const MAX_FRACTION_BEFORE_COMPLETE: f64 = 0.9999;

/// Progress value published to listeners.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    /// Estimated completion in `[0, 1]`.
    pub fraction: f64,
    /// Cumulative bytes of the files visited so far.
    pub bytes_processed: u64,
}

impl ProgressSnapshot {
    /// Snapshot of a session that has not scanned anything.
    pub const ZERO: Self = Self {
        fraction: 0.0,
        bytes_processed: 0,
    };
}

/// Estimation strategy, selected when a scan starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressMode {
    /// Whole-volume scan with a known byte total.
    Size { total_bytes: u64 },
    /// Arbitrary subtree, estimated by weighted recursive descent.
    FileCount,
}

/// Weight bookkeeping for one directory on the current traversal path.
#[derive(Debug, Clone, Copy)]
struct Frame {
    /// Retired weight when the directory was entered.
    start: f64,
    /// Weight this directory owns in the overall estimate.
    weight: f64,
    /// Weight of each of its entries, `weight / entry_count`.
    share: f64,
}

/// Dual-mode, throttled progress estimator.
#[derive(Debug)]
pub struct ProgressEstimator {
    mode: ProgressMode,
    min_delta: f64,
    min_interval: Duration,
    frames: Vec<Frame>,
    /// FileCount mode: weight retired so far.
    retired: f64,
    bytes: u64,
    last_emit_at: Option<Instant>,
    last_emit_fraction: f64,
    is_completed: bool,
}

impl ProgressEstimator {
    /// Create an estimator with the given throttle thresholds.
    pub fn new(min_delta: f64, min_interval: Duration) -> Self {
        Self {
            mode: ProgressMode::FileCount,
            min_delta,
            min_interval,
            frames: Vec::new(),
            retired: 0.0,
            bytes: 0,
            last_emit_at: None,
            last_emit_fraction: 0.0,
            is_completed: false,
        }
    }

    /// Reset all accumulators and select the mode for a new scan.
    pub fn start(&mut self, mode: ProgressMode) {
        self.reset();
        self.mode = match mode {
            ProgressMode::Size { total_bytes: 0 } => ProgressMode::FileCount,
            other => other,
        };
    }

    /// Clear all accumulators.
    pub fn reset(&mut self) {
        self.mode = ProgressMode::FileCount;
        self.frames.clear();
        self.retired = 0.0;
        self.bytes = 0;
        self.last_emit_at = None;
        self.last_emit_fraction = 0.0;
        self.is_completed = false;
    }

    /// The mode in effect.
    pub fn mode(&self) -> ProgressMode {
        self.mode
    }

    /// A directory is about to be enumerated.
    ///
    /// The first directory is the scan root and owns weight 1.0; every other
    /// one owns one share of the directory currently on top.
    pub fn enter_dir(&mut self) {
        let weight = self.frames.last().map(|f| f.share).unwrap_or(1.0);
        self.frames.push(Frame {
            start: self.retired,
            weight,
            share: 0.0,
        });
    }

    /// The directory on top has `count` entries.
    pub fn set_entry_count(&mut self, count: usize) {
        if let Some(frame) = self.frames.last_mut() {
            frame.share = if count == 0 {
                0.0
            } else {
                frame.weight / count as f64
            };
        }
    }

    /// One non-directory entry of the directory on top is finished, whether
    /// it was counted or skipped.
    pub fn complete_entry(&mut self) -> Option<ProgressSnapshot> {
        if let Some(frame) = self.frames.last() {
            self.retired += frame.share;
        }
        self.maybe_emit()
    }

    /// File bytes were consumed.
    pub fn add_bytes(&mut self, len: u64) -> Option<ProgressSnapshot> {
        self.bytes = self.bytes.saturating_add(len);
        self.maybe_emit()
    }

    /// The directory on top is finished. Its whole weight is retired, even
    /// if some entries never reported.
    pub fn exit_dir(&mut self) -> Option<ProgressSnapshot> {
        if let Some(frame) = self.frames.pop() {
            let target = frame.start + frame.weight;
            if self.retired < target {
                self.retired = target;
            }
        }
        self.maybe_emit()
    }

    /// Current estimate, clamped below 1 until completion.
    pub fn fraction(&self) -> f64 {
        if self.is_completed {
            return 1.0;
        }
        let raw = match self.mode {
            ProgressMode::Size { total_bytes } => self.bytes as f64 / total_bytes.max(1) as f64,
            ProgressMode::FileCount => self.retired,
        };
        raw.clamp(0.0, MAX_FRACTION_BEFORE_COMPLETE)
    }

    /// Current snapshot, regardless of throttling.
    pub fn current(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            fraction: self.fraction(),
            bytes_processed: self.bytes,
        }
    }

    /// Mark the scan finished and return the final `1.0` snapshot.
    pub fn complete(&mut self) -> ProgressSnapshot {
        self.is_completed = true;
        self.flush()
    }

    /// Return the current snapshot unconditionally, recording it as emitted.
    pub fn flush(&mut self) -> ProgressSnapshot {
        let snapshot = self.current();
        self.last_emit_at = Some(Instant::now());
        self.last_emit_fraction = snapshot.fraction;
        snapshot
    }

    /// Emit only once both the fractional delta and the interval have passed.
    fn maybe_emit(&mut self) -> Option<ProgressSnapshot> {
        if self.is_completed {
            return None;
        }
        let fraction = self.fraction();
        if fraction - self.last_emit_fraction < self.min_delta {
            return None;
        }
        let now = Instant::now();
        if let Some(at) = self.last_emit_at {
            if now.duration_since(at) < self.min_interval {
                return None;
            }
        }
        self.last_emit_at = Some(now);
        self.last_emit_fraction = fraction;
        Some(ProgressSnapshot {
            fraction,
            bytes_processed: self.bytes,
        })
    }
}
