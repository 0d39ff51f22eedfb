/// Scan session — the single object collaborators talk to.
///
/// A session owns the state machine, the shared compressed tree, the
/// progress estimator, and the cancel token of the active scan. One scan
/// runs at a time on a dedicated background thread; every public method is
/// safe to call from any thread while it runs.
///
/// # Locking
///
/// `inner` is the one exclusive lock over state, tree and estimator. The
/// walker takes it around each individual append, never around a whole
/// subtree. Events are dispatched with `inner` released, so listeners may
/// call back into the session. Dispatch runs under the re-entrant
/// `sequencer` lock, which orders events across threads; an event raised by
/// a listener callback is queued and delivered once the current event has
/// reached every listener. Lock order is always `sequencer` → `inner`.
use std::any::Any;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use compact_str::CompactString;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::ScanConfig;
use crate::error::ScanError;
use crate::model::size::format_size;
use crate::model::{CompressedTree, ProjectedNode};
use crate::platform;
use crate::query;
use crate::scanner::{
    CancelToken, ProgressEstimator, ProgressMode, ProgressSnapshot, WalkSink, Walker,
};

/// Initial arena capacity for a new scan.
const INITIAL_TREE_CAPACITY: usize = 64 * 1024;

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ScanState {
    /// No scan result is held.
    Idle,
    /// A walk is running; the partial tree can already be queried.
    Scanning,
    /// The walk finished; the full tree can be queried.
    Completed,
    /// The previous result is being discarded.
    Cleaning,
}

/// An event delivered to channel subscribers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScanEvent {
    Progress(ProgressSnapshot),
    StateChanged(ScanState),
}

/// Receives session events. Both callbacks default to no-ops.
///
/// Callbacks run on whichever thread raised the event (the caller's for
/// state changes it triggers, the scan thread otherwise). A panicking
/// callback is logged and does not affect the session.
pub trait ScanListener: Send + Sync {
    fn on_progress(&self, _snapshot: ProgressSnapshot) {}

    fn on_state_changed(&self, _state: ScanState) {}

    /// Closed listeners are unregistered after the current dispatch.
    fn is_closed(&self) -> bool {
        false
    }
}

/// Handle returned by [`ScanSession::add_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Forwards events into a bounded channel handed out by `subscribe()`.
struct ChannelListener {
    tx: Sender<ScanEvent>,
    closed: AtomicBool,
}

impl ChannelListener {
    fn forward(&self, event: ScanEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                debug!("Event channel full, dropping {event:?}");
            }
            Err(TrySendError::Disconnected(_)) => {
                self.closed.store(true, Ordering::Relaxed);
            }
        }
    }
}

impl ScanListener for ChannelListener {
    fn on_progress(&self, snapshot: ProgressSnapshot) {
        self.forward(ScanEvent::Progress(snapshot));
    }

    fn on_state_changed(&self, state: ScanState) {
        self.forward(ScanEvent::StateChanged(state));
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }
}

/// Everything guarded by the session lock.
struct Inner {
    state: ScanState,
    scan_path: Option<PathBuf>,
    tree: CompressedTree,
    estimator: ProgressEstimator,
    cancel: Option<CancelToken>,
}

#[derive(Default)]
struct Listeners {
    next_id: u64,
    entries: Vec<(ListenerId, Arc<dyn ScanListener>)>,
}

/// Events waiting for the dispatch already running on the lock owner's
/// thread.
#[derive(Default)]
struct DispatchQueue {
    pending: VecDeque<ScanEvent>,
    draining: bool,
}

/// State shared between the session handle and its scan thread.
struct Shared {
    config: ScanConfig,
    inner: Mutex<Inner>,
    listeners: RwLock<Listeners>,
    sequencer: ReentrantMutex<RefCell<DispatchQueue>>,
}

/// Orchestrates scans over one compressed tree.
pub struct ScanSession {
    shared: Arc<Shared>,
}

impl Default for ScanSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanSession {
    /// Create an idle session with default configuration.
    pub fn new() -> Self {
        Self::with_config(ScanConfig::default())
    }

    /// Create an idle session with the given configuration.
    pub fn with_config(config: ScanConfig) -> Self {
        let estimator =
            ProgressEstimator::new(config.progress_min_delta, config.progress_min_interval());
        Self {
            shared: Arc::new(Shared {
                config,
                inner: Mutex::new(Inner {
                    state: ScanState::Idle,
                    scan_path: None,
                    tree: CompressedTree::default(),
                    estimator,
                    cancel: None,
                }),
                listeners: RwLock::new(Listeners::default()),
                sequencer: ReentrantMutex::new(RefCell::new(DispatchQueue::default())),
            }),
        }
    }

    /// The configuration this session was built with.
    pub fn config(&self) -> &ScanConfig {
        &self.shared.config
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ScanState {
        self.shared.inner.lock().state
    }

    /// Path of the current scan. `None` while idle.
    pub fn scan_path(&self) -> Option<PathBuf> {
        self.shared.inner.lock().scan_path.clone()
    }

    /// Latest progress estimate, ignoring the event throttle.
    pub fn current_progress(&self) -> ProgressSnapshot {
        self.shared.inner.lock().estimator.current()
    }

    /// Volume roots available for scanning.
    pub fn list_volumes(&self) -> Vec<String> {
        platform::list_volumes()
    }

    /// Start scanning `path` on a background thread.
    ///
    /// Returns as soon as the thread is launched. Any previous result is
    /// discarded first.
    pub fn start_scan(&self, path: impl AsRef<Path>) -> Result<(), ScanError> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(ScanError::invalid_argument("scan path is empty"));
        }
        if !(path.is_absolute() || path.has_root()) {
            return Err(ScanError::invalid_argument(format!(
                "scan path must be absolute: {}",
                path.display()
            )));
        }

        let _seq = self.shared.sequencer.lock();
        let cancel = CancelToken::new();
        let previous = {
            let mut inner = self.shared.inner.lock();
            if matches!(inner.state, ScanState::Scanning | ScanState::Cleaning) {
                return Err(ScanError::InvalidState {
                    operation: "start a scan",
                    state: inner.state,
                });
            }
            let root = CompressedTree::with_root(
                CompactString::new(path.to_string_lossy()),
                self.shared.config.fill_depth > 1,
                INITIAL_TREE_CAPACITY,
            );
            inner.estimator.reset();
            inner.cancel = Some(cancel.clone());
            inner.scan_path = Some(path.to_path_buf());
            inner.state = ScanState::Scanning;
            std::mem::replace(&mut inner.tree, root)
        };
        // The old arena is freed outside the lock.
        drop(previous);

        info!("Scan start, path: {}", path.display());
        self.shared.emit_state(ScanState::Scanning);

        let shared = Arc::clone(&self.shared);
        let scan_path = path.to_path_buf();
        let spawned = thread::Builder::new()
            .name("fattyscan-walker".into())
            .stack_size(self.shared.config.walker_stack_size)
            .spawn(move || shared.run_scan(scan_path, cancel));

        if let Err(err) = spawned {
            warn!("Failed to spawn scan thread: {err}");
            self.shared.finish_unsuccessful();
            return Err(ScanError::io(path, err));
        }
        Ok(())
    }

    /// Ask the active scan to stop at its next checkpoint. No-op if idle.
    pub fn stop_scan(&self) {
        let inner = self.shared.inner.lock();
        if let Some(cancel) = &inner.cancel {
            cancel.cancel();
        }
    }

    /// Discard the current result and return to `Idle`.
    pub fn clean_scan(&self) -> Result<(), ScanError> {
        let _seq = self.shared.sequencer.lock();
        {
            let mut inner = self.shared.inner.lock();
            match inner.state {
                ScanState::Idle => return Ok(()),
                ScanState::Scanning | ScanState::Cleaning => {
                    return Err(ScanError::InvalidState {
                        operation: "clean the scan",
                        state: inner.state,
                    });
                }
                ScanState::Completed => inner.state = ScanState::Cleaning,
            }
        }
        self.shared.emit_state(ScanState::Cleaning);

        let discarded = {
            let mut inner = self.shared.inner.lock();
            inner.scan_path = None;
            inner.estimator.reset();
            inner.state = ScanState::Idle;
            std::mem::take(&mut inner.tree)
        };
        drop(discarded);
        debug!("Scan result discarded");

        self.shared.emit_state(ScanState::Idle);
        Ok(())
    }

    /// Project part of the current tree; see [`query::get_tree`].
    ///
    /// Works mid-scan against whatever has been built so far.
    pub fn get_tree(
        &self,
        start_path: Option<&Path>,
        depth: usize,
        ignore_size: f64,
    ) -> Result<Option<ProjectedNode>, ScanError> {
        let inner = self.shared.inner.lock();
        let scan_path = match (&inner.scan_path, inner.tree.is_empty()) {
            (Some(path), false) => path,
            _ => {
                return Err(ScanError::InvalidState {
                    operation: "query the tree",
                    state: inner.state,
                })
            }
        };
        query::get_tree(&inner.tree, scan_path, start_path, depth, ignore_size)
    }

    /// Register a listener; it receives every event raised from now on.
    pub fn add_listener(&self, listener: Arc<dyn ScanListener>) -> ListenerId {
        let mut listeners = self.shared.listeners.write();
        let id = ListenerId(listeners.next_id);
        listeners.next_id += 1;
        listeners.entries.push((id, listener));
        id
    }

    /// Unregister a listener. Returns `false` if it was not registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.shared.listeners.write();
        let before = listeners.entries.len();
        listeners.entries.retain(|(entry_id, _)| *entry_id != id);
        listeners.entries.len() != before
    }

    /// Subscribe to all events through a bounded channel.
    ///
    /// The subscription ends when the receiver is dropped.
    pub fn subscribe(&self) -> Receiver<ScanEvent> {
        let (tx, rx) = crossbeam_channel::bounded(self.shared.config.event_channel_capacity);
        self.add_listener(Arc::new(ChannelListener {
            tx,
            closed: AtomicBool::new(false),
        }));
        rx
    }
}

impl Drop for ScanSession {
    fn drop(&mut self) {
        // The scan thread holds its own reference; make it wind down.
        self.stop_scan();
    }
}

impl Shared {
    /// Body of the scan thread.
    fn run_scan(&self, scan_path: PathBuf, cancel: CancelToken) {
        let start = Instant::now();
        let outcome = guarded(|| self.walk_root(&scan_path, cancel));
        self.finish_scan(outcome, &scan_path, start);
    }

    /// Pick the progress mode and walk the scan root.
    fn walk_root(&self, scan_path: &Path, cancel: CancelToken) -> Result<(), ScanError> {
        let mode = if platform::is_volume_root(scan_path) {
            match platform::volume_used_bytes(scan_path) {
                Some(total_bytes) => ProgressMode::Size { total_bytes },
                None => ProgressMode::FileCount,
            }
        } else {
            ProgressMode::FileCount
        };
        debug!("Progress mode for {}: {mode:?}", scan_path.display());

        let root = {
            let mut inner = self.inner.lock();
            inner.estimator.start(mode);
            inner.tree.root()
        };
        let root = root.ok_or_else(|| ScanError::internal("scan tree has no root"))?;
        Walker::new(self, cancel).walk(scan_path, root, self.config.fill_depth)
    }

    /// Resolve a finished walk into `Completed` or back to `Idle`.
    fn finish_scan(&self, outcome: Result<(), ScanError>, scan_path: &Path, start: Instant) {
        match outcome {
            Ok(()) => {
                let _seq = self.sequencer.lock();
                let (snapshot, size) = {
                    let mut inner = self.inner.lock();
                    inner.tree.shrink_to_fit();
                    debug!("Cached tree:\n{}", inner.tree.render(2));
                    inner.cancel = None;
                    inner.state = ScanState::Completed;
                    (inner.estimator.complete(), inner.tree.total_size())
                };
                info!(
                    "Scan Completed, size: {}, elapsed: {:?}",
                    format_size(size),
                    start.elapsed()
                );
                self.emit_progress(snapshot);
                self.emit_state(ScanState::Completed);
            }
            Err(ScanError::Cancelled) => {
                warn!(
                    "Scan of {} cancelled after {:?}, result discarded",
                    scan_path.display(),
                    start.elapsed()
                );
                self.finish_unsuccessful();
            }
            Err(err) => {
                warn!("Scan of {} failed: {err}", scan_path.display());
                self.finish_unsuccessful();
            }
        }
    }

    /// Discard a cancelled or failed scan and return to `Idle`, emitting the
    /// last progress value and the state change.
    fn finish_unsuccessful(&self) {
        let _seq = self.sequencer.lock();
        let (snapshot, discarded) = {
            let mut inner = self.inner.lock();
            inner.cancel = None;
            inner.scan_path = None;
            inner.state = ScanState::Idle;
            let snapshot = inner.estimator.flush();
            (snapshot, std::mem::take(&mut inner.tree))
        };
        drop(discarded);
        self.emit_progress(snapshot);
        self.emit_state(ScanState::Idle);
    }

    fn emit_progress(&self, snapshot: ProgressSnapshot) {
        self.emit(ScanEvent::Progress(snapshot));
    }

    fn emit_state(&self, state: ScanState) {
        self.emit(ScanEvent::StateChanged(state));
    }

    /// Deliver `event`, or queue it behind the event this thread is already
    /// delivering.
    fn emit(&self, event: ScanEvent) {
        let seq = self.sequencer.lock();
        {
            let mut queue = seq.borrow_mut();
            queue.pending.push_back(event);
            if queue.draining {
                return;
            }
            queue.draining = true;
        }
        loop {
            let next = seq.borrow_mut().pending.pop_front();
            match next {
                Some(event) => self.deliver(event),
                None => break,
            }
        }
        seq.borrow_mut().draining = false;
    }

    /// Call every listener in registration order with no session lock held.
    fn deliver(&self, event: ScanEvent) {
        let snapshot: Vec<Arc<dyn ScanListener>> = self
            .listeners
            .read()
            .entries
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        let mut any_closed = false;
        for listener in &snapshot {
            let call = || match event {
                ScanEvent::Progress(snapshot) => listener.on_progress(snapshot),
                ScanEvent::StateChanged(state) => listener.on_state_changed(state),
            };
            if catch_unwind(AssertUnwindSafe(call)).is_err() {
                warn!("Scan listener panicked; event skipped for that listener");
            }
            any_closed |= listener.is_closed();
        }

        if any_closed {
            self.listeners
                .write()
                .entries
                .retain(|(_, listener)| !listener.is_closed());
        }
    }
}

/// Run a walk, turning a panic anywhere beneath it into an error.
fn guarded(walk: impl FnOnce() -> Result<(), ScanError>) -> Result<(), ScanError> {
    catch_unwind(AssertUnwindSafe(walk))
        .unwrap_or_else(|payload| Err(ScanError::internal(panic_message(&*payload))))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl WalkSink for Shared {
    fn with_tree<R>(&self, f: impl FnOnce(&mut CompressedTree, &mut ProgressEstimator) -> R) -> R {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        f(&mut inner.tree, &mut inner.estimator)
    }

    fn publish_progress(&self, snapshot: ProgressSnapshot) {
        self.emit_progress(snapshot);
    }
}
