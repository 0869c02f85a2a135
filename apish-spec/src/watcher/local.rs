//! Local-path spec watcher.
//!
//! Watches one spec file through filesystem events on its containing
//! directory, falling back to mtime polling when the directory disappears
//! or the event backend is unavailable, and re-arming event mode once the
//! file is back. One loop owns the mode transitions; every content check
//! goes through the same rescan so `check_now`, event handling, and polling
//! agree on the baseline.

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::{Mutex, RwLock};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime};

use crate::hash::sha256_hex;
use crate::watcher::{ChangeEvent, ChangeHandler, ChangeKind, WatchMode, dispatch};

/// Default stat cadence in polling mode.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Settle time after a filesystem event before re-reading, so an editor or
/// atomic-rename writer can finish.
pub const EVENT_DEBOUNCE: Duration = Duration::from_millis(50);

/// Upper bound on how long the loop sleeps before rechecking its stop flag.
const MAX_TICK: Duration = Duration::from_millis(250);

/// Last observed state of the watched file. Events are emitted only against
/// changes from this baseline.
#[derive(Default)]
struct Baseline {
    initialized: bool,
    exists: bool,
    hash: Option<String>,
    mtime: Option<SystemTime>,
}

struct LocalInner {
    app: String,
    path: PathBuf,
    parent: PathBuf,
    file_name: OsString,
    poll_interval: Mutex<Duration>,
    debounce: Duration,
    handlers: RwLock<Vec<ChangeHandler>>,
    baseline: Mutex<Baseline>,
    mode: Mutex<WatchMode>,
    running: AtomicBool,
    stopped: AtomicBool,
}

/// Watches a local spec file and emits [`ChangeEvent`]s.
pub struct LocalSpecWatcher {
    inner: Arc<LocalInner>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for LocalSpecWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalSpecWatcher")
            .field("app", &self.inner.app)
            .field("path", &self.inner.path)
            .field("mode", &self.mode())
            .finish_non_exhaustive()
    }
}

impl LocalSpecWatcher {
    pub fn new(app: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        let path: PathBuf = path.into();
        let parent = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let file_name = path
            .file_name()
            .map(OsString::from)
            .unwrap_or_default();
        Self {
            inner: Arc::new(LocalInner {
                app: app.into(),
                path,
                parent,
                file_name,
                poll_interval: Mutex::new(DEFAULT_POLL_INTERVAL),
                debounce: EVENT_DEBOUNCE,
                handlers: RwLock::new(Vec::new()),
                baseline: Mutex::new(Baseline::default()),
                mode: Mutex::new(WatchMode::Polling),
                running: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
            }),
            thread: Mutex::new(None),
        }
    }

    /// Adjust the polling cadence (also bounds how quickly event mode is
    /// re-armed after a fallback).
    pub fn with_poll_interval(self, interval: Duration) -> Self {
        *self.inner.poll_interval.lock() = interval;
        self
    }

    pub fn app(&self) -> &str {
        &self.inner.app
    }

    pub fn source(&self) -> String {
        self.inner.path.to_string_lossy().into_owned()
    }

    pub fn mode(&self) -> WatchMode {
        *self.inner.mode.lock()
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst) && !self.inner.stopped.load(Ordering::SeqCst)
    }

    pub fn add_handler(&self, handler: impl Fn(&ChangeEvent) + Send + Sync + 'static) {
        self.inner.handlers.write().push(Arc::new(handler));
    }

    /// Start the watch loop on its own thread. Idempotent; a stopped
    /// watcher stays stopped.
    pub fn start(&self) {
        if self.inner.stopped.load(Ordering::SeqCst) {
            log::warn!(
                "Watcher for '{}' is stopped and cannot be restarted",
                self.inner.app
            );
            return;
        }
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return;
        }
        init_baseline(&self.inner);
        let inner = Arc::clone(&self.inner);
        let handle = std::thread::Builder::new()
            .name(format!("spec-watch-{}", self.inner.app))
            .spawn(move || run_loop(inner));
        match handle {
            Ok(handle) => {
                *self.thread.lock() = Some(handle);
                log::info!(
                    "Watching local spec {} for '{}'",
                    self.inner.path.display(),
                    self.inner.app
                );
            }
            Err(e) => {
                self.inner.running.store(false, Ordering::SeqCst);
                log::error!("Failed to spawn watcher thread for '{}': {e}", self.inner.app);
            }
        }
    }

    /// Stop the watch loop. Terminal once the watcher has run; stopping a
    /// watcher that never started is a no-op and leaves it startable.
    pub fn stop(&self) {
        if !self.inner.running.load(Ordering::SeqCst) {
            return;
        }
        self.inner.stopped.store(true, Ordering::SeqCst);
        if let Some(handle) = self.thread.lock().take() {
            let _ = handle.join();
        }
        self.inner.running.store(false, Ordering::SeqCst);
    }

    /// Single immediate check against the baseline. The first call
    /// initializes the baseline and reports nothing. Any resulting event is
    /// also dispatched to handlers.
    pub fn check_now(&self) -> Option<ChangeEvent> {
        let event = rescan(&self.inner, true);
        if let Some(event) = &event {
            dispatch(&self.inner.handlers, event);
        }
        event
    }
}

fn set_mode(inner: &LocalInner, mode: WatchMode) {
    let mut current = inner.mode.lock();
    if *current != mode {
        log::debug!(
            "Watcher for '{}' switching to {mode} mode",
            inner.app
        );
        *current = mode;
    }
}

/// Stat and hash the file so later checks have something to compare to.
/// Quiet: the current content is the baseline, not a change.
fn init_baseline(inner: &LocalInner) {
    let mut baseline = inner.baseline.lock();
    if baseline.initialized {
        return;
    }
    *baseline = stat_file(&inner.path);
    baseline.initialized = true;
}

fn stat_file(path: &Path) -> Baseline {
    match std::fs::metadata(path) {
        Ok(md) => {
            let hash = std::fs::read(path).ok().map(|bytes| sha256_hex(&bytes));
            Baseline {
                initialized: true,
                exists: true,
                hash,
                mtime: md.modified().ok(),
            }
        }
        Err(_) => Baseline {
            initialized: true,
            exists: false,
            hash: None,
            mtime: None,
        },
    }
}

/// Compare the file to the baseline and produce at most one event.
///
/// `force_hash` re-reads even when mtime has not advanced (filesystem
/// events and explicit checks do not trust mtime granularity); polling
/// leaves it false so unchanged files cost one stat, not one read.
fn rescan(inner: &LocalInner, force_hash: bool) -> Option<ChangeEvent> {
    let mut baseline = inner.baseline.lock();
    if !baseline.initialized {
        *baseline = stat_file(&inner.path);
        baseline.initialized = true;
        return None;
    }

    let source = inner.path.to_string_lossy();
    match std::fs::metadata(&inner.path) {
        Err(_) => {
            if baseline.exists {
                baseline.exists = false;
                baseline.hash = None;
                baseline.mtime = None;
                return Some(ChangeEvent::new(&inner.app, &source, ChangeKind::Deleted));
            }
            None
        }
        Ok(md) => {
            let mtime = md.modified().ok();
            let appeared = !baseline.exists;
            let mtime_advanced = match (mtime, baseline.mtime) {
                (Some(new), Some(old)) => new > old,
                _ => true,
            };
            if !appeared && !force_hash && !mtime_advanced {
                return None;
            }

            let bytes = match std::fs::read(&inner.path) {
                Ok(bytes) => bytes,
                Err(e) => {
                    return Some(
                        ChangeEvent::new(&inner.app, &source, ChangeKind::Error)
                            .with_error(format!("failed to read {}: {e}", inner.path.display())),
                    );
                }
            };
            let hash = sha256_hex(&bytes);
            baseline.exists = true;
            baseline.mtime = mtime;
            if baseline.hash.as_deref() == Some(hash.as_str()) {
                // Touch: mtime moved, content did not.
                return None;
            }
            baseline.hash = Some(hash);
            Some(
                ChangeEvent::new(&inner.app, &source, ChangeKind::Modified)
                    .with_content(String::from_utf8_lossy(&bytes).into_owned()),
            )
        }
    }
}

fn event_names_target(inner: &LocalInner, event: &notify::Event) -> bool {
    event
        .paths
        .iter()
        .any(|p| p.file_name().is_some_and(|name| name == inner.file_name))
}

fn relevant_kind(kind: &notify::EventKind) -> bool {
    matches!(
        kind,
        notify::EventKind::Modify(_) | notify::EventKind::Create(_) | notify::EventKind::Remove(_)
    )
}

/// Subscribe to events on the containing directory.
fn subscribe(
    inner: &LocalInner,
    tx: &Sender<Result<notify::Event, notify::Error>>,
) -> Option<RecommendedWatcher> {
    let tx = tx.clone();
    let mut watcher = match notify::recommended_watcher(move |result| {
        let _ = tx.send(result);
    }) {
        Ok(watcher) => watcher,
        Err(e) => {
            log::warn!(
                "Filesystem events unavailable for '{}' ({e}); polling instead",
                inner.app
            );
            return None;
        }
    };
    if let Err(e) = watcher.watch(&inner.parent, RecursiveMode::NonRecursive) {
        log::debug!(
            "Cannot watch {} for '{}': {e}",
            inner.parent.display(),
            inner.app
        );
        return None;
    }
    Some(watcher)
}

fn run_loop(inner: Arc<LocalInner>) {
    let (tx, rx) = mpsc::channel();

    let mut fs_watcher = subscribe(&inner, &tx);
    set_mode(
        &inner,
        if fs_watcher.is_some() {
            WatchMode::Event
        } else {
            WatchMode::Polling
        },
    );

    let mut since_poll = Duration::ZERO;
    while !inner.stopped.load(Ordering::SeqCst) {
        let poll_interval = *inner.poll_interval.lock();
        let tick = poll_interval.min(MAX_TICK);
        if fs_watcher.is_some() {
            event_wait(&inner, &rx, tick, &mut fs_watcher);
        } else {
            std::thread::sleep(tick);
            since_poll += tick;
            if since_poll >= poll_interval {
                since_poll = Duration::ZERO;
                poll_tick(&inner, &tx, &rx, &mut fs_watcher);
            }
        }
    }
    drop(fs_watcher);
    log::debug!("Watcher for '{}' stopped", inner.app);
}

/// One event-mode iteration: wait for an event (bounded by `tick`), settle,
/// rescan, and fall back to polling if the directory itself is gone.
fn event_wait(
    inner: &LocalInner,
    rx: &Receiver<Result<notify::Event, notify::Error>>,
    tick: Duration,
    fs_watcher: &mut Option<RecommendedWatcher>,
) {
    match rx.recv_timeout(tick) {
        Ok(Ok(event)) => {
            if event_names_target(inner, &event) && relevant_kind(&event.kind) {
                std::thread::sleep(inner.debounce);
                // Coalesce the burst a single save produces.
                while rx.try_recv().is_ok() {}
                if let Some(change) = rescan(inner, true) {
                    dispatch(&inner.handlers, &change);
                }
            }
        }
        Ok(Err(e)) => {
            log::warn!("Filesystem watch error for '{}': {e}", inner.app);
            let event = ChangeEvent::new(
                &inner.app,
                &inner.path.to_string_lossy(),
                ChangeKind::Error,
            )
            .with_error(e);
            dispatch(&inner.handlers, &event);
        }
        Err(RecvTimeoutError::Timeout) => {}
        Err(RecvTimeoutError::Disconnected) => {
            *fs_watcher = None;
            set_mode(inner, WatchMode::Polling);
            return;
        }
    }

    // The subscription dies silently with its directory.
    if !inner.parent.exists() {
        if let Some(change) = rescan(inner, true) {
            dispatch(&inner.handlers, &change);
        }
        *fs_watcher = None;
        set_mode(inner, WatchMode::Polling);
    }
}

/// One polling iteration: stat/rescan, then try to re-arm event mode.
fn poll_tick(
    inner: &LocalInner,
    tx: &Sender<Result<notify::Event, notify::Error>>,
    rx: &Receiver<Result<notify::Event, notify::Error>>,
    fs_watcher: &mut Option<RecommendedWatcher>,
) {
    if let Some(change) = rescan(inner, false) {
        dispatch(&inner.handlers, &change);
    }

    if inner.parent.exists() && inner.path.exists() {
        // Drop events queued while the old subscription wound down.
        while rx.try_recv().is_ok() {}
        if let Some(watcher) = subscribe(inner, tx) {
            // Catch anything written between the rescan and the subscribe.
            if let Some(change) = rescan(inner, true) {
                dispatch(&inner.handlers, &change);
            }
            *fs_watcher = Some(watcher);
            set_mode(inner, WatchMode::Event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn watcher_for(path: &Path) -> LocalSpecWatcher {
        LocalSpecWatcher::new("petstore", path)
    }

    #[test]
    fn first_check_initializes_quietly() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("spec.yaml");
        fs::write(&path, "v: 1\n").unwrap();

        let watcher = watcher_for(&path);
        assert!(watcher.check_now().is_none());
        // Unchanged content stays quiet.
        assert!(watcher.check_now().is_none());
    }

    #[test]
    fn content_change_emits_modified_with_new_bytes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("spec.yaml");
        fs::write(&path, "v: 1\n").unwrap();

        let watcher = watcher_for(&path);
        watcher.check_now();

        fs::write(&path, "v: 2\n").unwrap();
        let event = watcher.check_now().expect("modified event");
        assert_eq!(event.kind, ChangeKind::Modified);
        assert_eq!(event.new_content.as_deref(), Some("v: 2\n"));
        assert_eq!(event.app_name, "petstore");

        // Idempotent: the baseline advanced.
        assert!(watcher.check_now().is_none());
    }

    #[test]
    fn touch_with_same_content_emits_nothing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("spec.yaml");
        fs::write(&path, "v: 1\n").unwrap();

        let watcher = watcher_for(&path);
        watcher.check_now();

        // Rewrite identical bytes; mtime advances, hash does not.
        fs::write(&path, "v: 1\n").unwrap();
        assert!(watcher.check_now().is_none());
    }

    #[test]
    fn deletion_emits_once_and_reappearance_emits_modified() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("spec.yaml");
        fs::write(&path, "v: 1\n").unwrap();

        let watcher = watcher_for(&path);
        watcher.check_now();

        fs::remove_file(&path).unwrap();
        let event = watcher.check_now().expect("deleted event");
        assert_eq!(event.kind, ChangeKind::Deleted);
        assert!(watcher.check_now().is_none(), "deleted reported twice");

        // Recreation is a change even if the bytes match the old baseline.
        fs::write(&path, "v: 1\n").unwrap();
        let event = watcher.check_now().expect("modified event");
        assert_eq!(event.kind, ChangeKind::Modified);
    }

    #[test]
    fn missing_file_at_first_check_is_not_deleted() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("spec.yaml");

        let watcher = watcher_for(&path);
        assert!(watcher.check_now().is_none());
        assert!(watcher.check_now().is_none());

        // It appearing later is a modification.
        fs::write(&path, "v: 1\n").unwrap();
        let event = watcher.check_now().expect("modified event");
        assert_eq!(event.kind, ChangeKind::Modified);
    }

    #[test]
    fn check_now_dispatches_to_handlers() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("spec.yaml");
        fs::write(&path, "v: 1\n").unwrap();

        let watcher = watcher_for(&path);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_ref = Arc::clone(&seen);
        watcher.add_handler(move |event| seen_ref.lock().push(event.kind));

        watcher.check_now();
        fs::write(&path, "v: 2\n").unwrap();
        watcher.check_now();

        assert_eq!(*seen.lock(), vec![ChangeKind::Modified]);
    }

    #[test]
    fn stop_is_terminal_only_after_running() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("spec.yaml");
        fs::write(&path, "v: 1\n").unwrap();

        let watcher = watcher_for(&path);
        // Stopping before start is a no-op and leaves the watcher startable.
        watcher.stop();
        assert!(!watcher.is_running());

        watcher.start();
        assert!(watcher.is_running());
        watcher.start();
        assert!(watcher.is_running(), "second start must be a no-op");

        watcher.stop();
        assert!(!watcher.is_running());
        watcher.start();
        assert!(!watcher.is_running(), "stopped watcher must not restart");
    }
}
