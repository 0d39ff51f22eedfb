/// End-to-end session integration tests.
///
/// These tests drive a real `ScanSession` against a temporary filesystem:
/// the background thread, the shared tree, the event channel, and the live
/// file fallback of the projector all run for real, with no mocking.
use crossbeam_channel::{Receiver, RecvTimeoutError};
use fattyscan_core::{
    ProjectedNode, ScanConfig, ScanError, ScanEvent, ScanListener, ScanSession, ScanState,
    OTHERS_NAME,
};
use parking_lot::Mutex;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tempfile::TempDir;

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Create the reference tree:
///
/// ```text
/// root/
///   a/
///     b.txt   (100 bytes)
///     c/
///       d.txt (50 bytes)
/// ```
fn build_test_tree(root: &Path) {
    fs::create_dir_all(root.join("a").join("c")).unwrap();
    write_bytes(&root.join("a").join("b.txt"), 100);
    write_bytes(&root.join("a").join("c").join("d.txt"), 50);
}

fn write_bytes(path: &Path, n: usize) {
    let mut f = fs::File::create(path).unwrap();
    f.write_all(&vec![0u8; n]).unwrap();
}

/// A session that publishes every progress change.
fn unthrottled_session() -> ScanSession {
    ScanSession::with_config(ScanConfig {
        progress_min_delta: 0.0,
        progress_min_interval_ms: 0,
        ..ScanConfig::default()
    })
}

/// Collect events until the scan reaches `Completed` or falls back to
/// `Idle`, waiting at most 30 seconds.
fn wait_for_terminal(rx: &Receiver<ScanEvent>) -> Vec<ScanEvent> {
    let deadline = Instant::now() + Duration::from_secs(30);
    let mut events = Vec::new();
    loop {
        assert!(
            Instant::now() < deadline,
            "scan did not finish within 30 seconds"
        );
        match rx.recv_timeout(Duration::from_millis(10)) {
            Ok(event) => {
                let terminal = matches!(
                    event,
                    ScanEvent::StateChanged(ScanState::Completed | ScanState::Idle)
                );
                events.push(event);
                if terminal {
                    return events;
                }
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                panic!("event channel disconnected before the scan finished")
            }
        }
    }
}

fn scan_to_completion(session: &ScanSession, path: &Path) -> Vec<ScanEvent> {
    let rx = session.subscribe();
    session.start_scan(path).unwrap();
    let events = wait_for_terminal(&rx);
    assert_eq!(
        events.last(),
        Some(&ScanEvent::StateChanged(ScanState::Completed))
    );
    events
}

fn assert_children_sum(node: &ProjectedNode) {
    if !node.children.is_empty() {
        assert_eq!(
            node.children_size(),
            node.size,
            "children of {} do not add up",
            node.name
        );
    }
    for child in &node.children {
        assert_children_sum(child);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

/// The unfiltered view reports exact sizes and no Others entries, including
/// the level whose files are read live.
#[test]
fn full_projection_is_exact() {
    let tmp = TempDir::new().expect("failed to create temp dir");
    build_test_tree(tmp.path());
    let session = ScanSession::new();
    scan_to_completion(&session, tmp.path());

    let view = session.get_tree(None, 10, 0.0).unwrap().unwrap();
    assert_eq!(view.name, tmp.path().to_string_lossy());
    assert_eq!(view.size, 150);

    let a = view.child("a").unwrap();
    assert_eq!(a.size, 150);
    assert_eq!(a.child("b.txt").unwrap().size, 100);
    let c = a.child("c").unwrap();
    assert_eq!(c.size, 50);
    assert_eq!(c.child("d.txt").unwrap().size, 50);
    assert!(a.child(OTHERS_NAME).is_none());
    assert!(c.child(OTHERS_NAME).is_none());
}

/// A relative filter folds the small child into Others.
#[test]
fn fractional_filter_produces_others() {
    let tmp = TempDir::new().expect("failed to create temp dir");
    build_test_tree(tmp.path());
    let session = ScanSession::new();
    scan_to_completion(&session, tmp.path());

    let view = session.get_tree(None, 5, 0.5).unwrap().unwrap();
    let a = view.child("a").unwrap();
    let names: Vec<_> = a.children.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["b.txt", OTHERS_NAME]);
    let others = a.child(OTHERS_NAME).unwrap();
    assert!(others.is_others);
    assert_eq!(others.size, 50);
    assert_children_sum(&view);
}

/// Querying a sub-path returns the full path as the view root name.
#[test]
fn subpath_query() {
    let tmp = TempDir::new().expect("failed to create temp dir");
    build_test_tree(tmp.path());
    let session = ScanSession::new();
    scan_to_completion(&session, tmp.path());

    let start = tmp.path().join("a").join("c");
    let view = session.get_tree(Some(&start), 2, 0.0).unwrap().unwrap();
    assert_eq!(view.name, start.to_string_lossy());
    assert_eq!(view.size, 50);
    assert_eq!(view.children.len(), 1);
}

/// A start path outside the scanned tree is rejected.
#[test]
fn start_path_outside_scan_is_invalid() {
    let tmp = TempDir::new().expect("failed to create temp dir");
    let other = TempDir::new().expect("failed to create temp dir");
    build_test_tree(tmp.path());
    let session = ScanSession::new();
    scan_to_completion(&session, tmp.path());

    let err = session.get_tree(Some(other.path()), 2, 0.0).unwrap_err();
    assert!(matches!(err, ScanError::InvalidArgument { .. }));
}

/// Two identical queries against a completed scan yield identical views.
#[test]
fn queries_are_idempotent() {
    let tmp = TempDir::new().expect("failed to create temp dir");
    build_test_tree(tmp.path());
    for i in 0..20 {
        write_bytes(&tmp.path().join(format!("file{i:02}.bin")), 10 * (i + 1));
    }
    let session = ScanSession::new();
    scan_to_completion(&session, tmp.path());

    let first = session.get_tree(None, 4, 0.01).unwrap();
    let second = session.get_tree(None, 4, 0.01).unwrap();
    assert_eq!(first, second);
    assert_children_sum(&first.unwrap());
}

/// Progress never decreases and the final value is exactly 1.0, delivered
/// before the Completed state change.
#[test]
fn progress_is_monotonic_and_completes() {
    let tmp = TempDir::new().expect("failed to create temp dir");
    for d in 0..5 {
        let dir = tmp.path().join(format!("dir{d}"));
        fs::create_dir_all(&dir).unwrap();
        for i in 0..10 {
            write_bytes(&dir.join(format!("file{i}.bin")), 512);
        }
    }
    let session = unthrottled_session();
    let events = scan_to_completion(&session, tmp.path());

    assert_eq!(
        events.first(),
        Some(&ScanEvent::StateChanged(ScanState::Scanning))
    );
    let fractions: Vec<f64> = events
        .iter()
        .filter_map(|e| match e {
            ScanEvent::Progress(p) => Some(p.fraction),
            ScanEvent::StateChanged(_) => None,
        })
        .collect();
    assert!(fractions.len() > 1);
    assert!(
        fractions.windows(2).all(|w| w[0] <= w[1]),
        "progress went backwards: {fractions:?}"
    );
    assert!(fractions[..fractions.len() - 1].iter().all(|f| *f < 1.0));
    match events[events.len() - 2] {
        ScanEvent::Progress(p) => {
            assert_eq!(p.fraction, 1.0);
            assert_eq!(p.bytes_processed, 5 * 10 * 512);
        }
        other => panic!("expected final progress before Completed, got {other:?}"),
    }
    assert_eq!(session.current_progress().fraction, 1.0);
}

/// Stops the first scan it sees start.
///
/// The Scanning transition is delivered on the caller's thread before the
/// walker thread exists, so the stop always lands before the first entry.
struct StopOnStart {
    session: Mutex<Weak<ScanSession>>,
    fired: AtomicBool,
}

impl ScanListener for StopOnStart {
    fn on_state_changed(&self, state: ScanState) {
        if state != ScanState::Scanning || self.fired.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(session) = self.session.lock().upgrade() {
            session.stop_scan();
        }
    }
}

/// A stopped scan discards its result and returns to Idle without ever
/// reporting full progress.
#[test]
fn stop_scan_returns_to_idle() {
    let tmp = TempDir::new().expect("failed to create temp dir");
    build_test_tree(tmp.path());
    let session = Arc::new(ScanSession::new());
    session.add_listener(Arc::new(StopOnStart {
        session: Mutex::new(Arc::downgrade(&session)),
        fired: AtomicBool::new(false),
    }));
    let rx = session.subscribe();
    session.start_scan(tmp.path()).unwrap();

    let events = wait_for_terminal(&rx);
    assert_eq!(events.len(), 3, "unexpected events {events:?}");
    assert_eq!(events[0], ScanEvent::StateChanged(ScanState::Scanning));
    match events[1] {
        ScanEvent::Progress(p) => assert!(p.fraction < 1.0),
        other => panic!("expected a final progress value, got {other:?}"),
    }
    assert_eq!(events[2], ScanEvent::StateChanged(ScanState::Idle));

    assert_eq!(session.state(), ScanState::Idle);
    assert!(session.scan_path().is_none());
    assert!(matches!(
        session.get_tree(None, 2, 0.0),
        Err(ScanError::InvalidState { .. })
    ));

    // The next scan gets a fresh token and runs to completion.
    drop(rx);
    scan_to_completion(&session, tmp.path());
    assert_eq!(session.get_tree(None, 1, 0.0).unwrap().unwrap().size, 150);
}

/// Cleaning goes through Cleaning to Idle and drops the result.
#[test]
fn clean_scan_discards_result() {
    let tmp = TempDir::new().expect("failed to create temp dir");
    build_test_tree(tmp.path());
    let session = ScanSession::new();
    scan_to_completion(&session, tmp.path());

    let rx = session.subscribe();
    session.clean_scan().unwrap();
    let events: Vec<_> = rx.try_iter().collect();
    assert_eq!(
        events,
        vec![
            ScanEvent::StateChanged(ScanState::Cleaning),
            ScanEvent::StateChanged(ScanState::Idle),
        ]
    );
    assert_eq!(session.state(), ScanState::Idle);
    assert!(matches!(
        session.get_tree(None, 2, 0.0),
        Err(ScanError::InvalidState { .. })
    ));
}

/// Calls made while a scan is running are rejected with InvalidState.
///
/// The listener runs on the caller's thread for the Scanning transition, so
/// the session is guaranteed to be mid-scan when it calls back in.
#[test]
fn operations_during_scan_are_rejected() {
    struct Reentrant {
        session: Mutex<Weak<ScanSession>>,
        start_rejected: Mutex<Option<bool>>,
        clean_rejected: Mutex<Option<bool>>,
    }

    impl ScanListener for Reentrant {
        fn on_state_changed(&self, state: ScanState) {
            if state != ScanState::Scanning || self.start_rejected.lock().is_some() {
                return;
            }
            let Some(session) = self.session.lock().upgrade() else {
                return;
            };
            let start = session.start_scan(std::env::temp_dir());
            *self.start_rejected.lock() =
                Some(matches!(start, Err(ScanError::InvalidState { .. })));
            let clean = session.clean_scan();
            *self.clean_rejected.lock() =
                Some(matches!(clean, Err(ScanError::InvalidState { .. })));
        }
    }

    let tmp = TempDir::new().expect("failed to create temp dir");
    build_test_tree(tmp.path());
    let session = Arc::new(ScanSession::new());
    let listener = Arc::new(Reentrant {
        session: Mutex::new(Arc::downgrade(&session)),
        start_rejected: Mutex::new(None),
        clean_rejected: Mutex::new(None),
    });
    session.add_listener(listener.clone());
    scan_to_completion(&session, tmp.path());

    assert_eq!(*listener.start_rejected.lock(), Some(true));
    assert_eq!(*listener.clean_rejected.lock(), Some(true));
}

/// With fill_depth 1 no files are cached, yet the view still lists them.
#[test]
fn lazy_file_fallback() {
    let tmp = TempDir::new().expect("failed to create temp dir");
    fs::create_dir_all(tmp.path().join("sub")).unwrap();
    write_bytes(&tmp.path().join("x.bin"), 1_000);
    write_bytes(&tmp.path().join("sub").join("y.bin"), 500);

    let session = ScanSession::with_config(ScanConfig {
        fill_depth: 1,
        ..ScanConfig::default()
    });
    scan_to_completion(&session, tmp.path());

    let view = session.get_tree(None, 3, 0.0).unwrap().unwrap();
    assert_eq!(view.size, 1_500);
    assert_eq!(view.child("x.bin").unwrap().size, 1_000);
    let sub = view.child("sub").unwrap();
    assert_eq!(sub.child("y.bin").unwrap().size, 500);
    assert_children_sum(&view);
}

/// A panicking listener does not stop the scan or other listeners.
#[test]
fn panicking_listener_is_isolated() {
    struct Panicky;
    impl ScanListener for Panicky {
        fn on_state_changed(&self, _state: ScanState) {
            panic!("listener failure");
        }
    }

    let tmp = TempDir::new().expect("failed to create temp dir");
    build_test_tree(tmp.path());
    let session = ScanSession::new();
    session.add_listener(Arc::new(Panicky));
    scan_to_completion(&session, tmp.path());
    assert_eq!(session.state(), ScanState::Completed);
}

/// Scanning again from Completed replaces the previous result.
#[test]
fn rescan_replaces_result() {
    let tmp = TempDir::new().expect("failed to create temp dir");
    build_test_tree(tmp.path());
    let session = ScanSession::new();
    scan_to_completion(&session, tmp.path());
    assert_eq!(session.get_tree(None, 1, 0.0).unwrap().unwrap().size, 150);

    write_bytes(&tmp.path().join("extra.bin"), 850);
    scan_to_completion(&session, tmp.path());
    assert_eq!(session.get_tree(None, 1, 0.0).unwrap().unwrap().size, 1_000);
}

/// An unreadable scan root ends in Idle rather than Completed.
#[test]
fn missing_root_ends_idle() {
    let tmp = TempDir::new().expect("failed to create temp dir");
    let missing = tmp.path().join("does-not-exist");
    let session = ScanSession::new();
    let rx = session.subscribe();
    session.start_scan(&missing).unwrap();

    let events = wait_for_terminal(&rx);
    assert_eq!(
        events.last(),
        Some(&ScanEvent::StateChanged(ScanState::Idle))
    );
    assert_eq!(session.state(), ScanState::Idle);
}

/// Volume enumeration must not panic; every entry is a non-empty root.
#[test]
fn list_volumes_does_not_panic() {
    let session = ScanSession::new();
    for volume in session.list_volumes() {
        assert!(!volume.is_empty());
    }
}

/// Cleans the result as soon as a scan completes.
struct CleanOnComplete {
    session: Mutex<Weak<ScanSession>>,
}

impl ScanListener for CleanOnComplete {
    fn on_state_changed(&self, state: ScanState) {
        if state != ScanState::Completed {
            return;
        }
        if let Some(session) = self.session.lock().upgrade() {
            session.clean_scan().unwrap();
        }
    }
}

/// Events raised from inside a callback reach every listener after the
/// event being delivered, so the last state seen matches the session.
#[test]
fn nested_transitions_keep_event_order() {
    let tmp = TempDir::new().expect("failed to create temp dir");
    build_test_tree(tmp.path());
    let session = Arc::new(ScanSession::new());
    session.add_listener(Arc::new(CleanOnComplete {
        session: Mutex::new(Arc::downgrade(&session)),
    }));
    let rx = session.subscribe();
    session.start_scan(tmp.path()).unwrap();

    let deadline = Instant::now() + Duration::from_secs(30);
    let mut states = Vec::new();
    while states.last() != Some(&ScanState::Idle) {
        assert!(
            Instant::now() < deadline,
            "scan did not finish within 30 seconds, saw {states:?}"
        );
        match rx.recv_timeout(Duration::from_millis(10)) {
            Ok(ScanEvent::StateChanged(state)) => states.push(state),
            Ok(ScanEvent::Progress(_)) | Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => panic!("event channel disconnected"),
        }
    }

    assert_eq!(
        states,
        vec![
            ScanState::Scanning,
            ScanState::Completed,
            ScanState::Cleaning,
            ScanState::Idle,
        ]
    );
    assert_eq!(session.state(), ScanState::Idle);
}

/// Queries every partial tree it is told about.
struct QueryOnProgress {
    session: Mutex<Weak<ScanSession>>,
    views: Mutex<Vec<ProjectedNode>>,
}

impl ScanListener for QueryOnProgress {
    fn on_progress(&self, _snapshot: fattyscan_core::ProgressSnapshot) {
        let Some(session) = self.session.lock().upgrade() else {
            return;
        };
        if session.state() != ScanState::Scanning {
            return;
        }
        if let Ok(Some(view)) = session.get_tree(None, 10, 0.0) {
            self.views.lock().push(view);
        }
    }
}

/// Queries made while the walk is running see a consistent partial tree.
#[test]
fn queries_during_scan_see_partial_tree() {
    let tmp = TempDir::new().expect("failed to create temp dir");
    for d in 0..10 {
        let dir = tmp.path().join(format!("dir{d}")).join("nested");
        fs::create_dir_all(&dir).unwrap();
        for i in 0..10 {
            write_bytes(&dir.join(format!("file{i}.bin")), 256);
        }
        write_bytes(&tmp.path().join(format!("top{d}.bin")), 128);
    }
    let session = Arc::new(unthrottled_session());
    let listener = Arc::new(QueryOnProgress {
        session: Mutex::new(Arc::downgrade(&session)),
        views: Mutex::new(Vec::new()),
    });
    session.add_listener(listener.clone());
    scan_to_completion(&session, tmp.path());

    let views = listener.views.lock();
    assert!(!views.is_empty(), "no query ran during the scan");
    let total = 10 * (10 * 256 + 128);
    let mut last_size = 0;
    for view in views.iter() {
        assert_children_sum(view);
        assert!(view.size <= total);
        assert!(view.size >= last_size, "partial size went backwards");
        last_size = view.size;
    }
    assert_eq!(session.get_tree(None, 1, 0.0).unwrap().unwrap().size, total);
}

