//! Watcher manager.
//!
//! Keeps the app-to-watcher mapping and fans handler callbacks in and out.
//! `watch` dispatches on the source form: HTTP/HTTPS URLs get a
//! [`RemoteSpecWatcher`], anything else a [`LocalSpecWatcher`]. Handlers are
//! registered once on the manager and reach every watcher, including ones
//! added after the handler.

use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use apish_config::{AppRegistry, paths};

use crate::cache::SpecCache;
use crate::error::SpecError;
use crate::http;
use crate::watcher::{ChangeEvent, ChangeHandler, LocalSpecWatcher, RemoteSpecWatcher, dispatch};

/// One registered watcher, local or remote.
enum AppWatcher {
    Local(LocalSpecWatcher),
    Remote(RemoteSpecWatcher),
}

impl AppWatcher {
    fn start(&self) {
        match self {
            Self::Local(w) => w.start(),
            Self::Remote(w) => w.start(),
        }
    }

    fn stop(&self) {
        match self {
            Self::Local(w) => w.stop(),
            Self::Remote(w) => w.stop(),
        }
    }

    fn check_now(&self) -> Option<ChangeEvent> {
        match self {
            Self::Local(w) => w.check_now(),
            Self::Remote(w) => w.check_now(),
        }
    }

    fn source(&self) -> String {
        match self {
            Self::Local(w) => w.source(),
            Self::Remote(w) => w.source().to_string(),
        }
    }
}

/// Watches any number of apps and delivers their [`ChangeEvent`]s to a
/// shared set of handlers.
///
/// The handler list is snapshotted at dispatch time, so handlers added
/// late still hear from watchers registered earlier. Watcher callbacks run
/// on the watcher's own thread; the manager never holds its map lock while
/// calling into a watcher, so handlers may call back into the manager.
pub struct WatcherManager {
    config_root: PathBuf,
    watchers: Mutex<BTreeMap<String, Arc<AppWatcher>>>,
    handlers: Arc<RwLock<Vec<ChangeHandler>>>,
    started: AtomicBool,
    stopped: AtomicBool,
}

impl std::fmt::Debug for WatcherManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherManager")
            .field("config_root", &self.config_root)
            .field("watched", &self.watched_apps())
            .finish_non_exhaustive()
    }
}

impl WatcherManager {
    pub fn new(config_root: impl Into<PathBuf>) -> Self {
        Self {
            config_root: config_root.into(),
            watchers: Mutex::new(BTreeMap::new()),
            handlers: Arc::new(RwLock::new(Vec::new())),
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        }
    }

    /// Manager rooted at the platform config directory.
    pub fn open_default() -> Self {
        Self::new(paths::config_root())
    }

    /// Register a handler for change events from every watched app.
    pub fn add_handler(&self, handler: impl Fn(&ChangeEvent) + Send + Sync + 'static) {
        self.handlers.write().push(Arc::new(handler));
    }

    /// Watch `source` for `app`, replacing any existing watcher for the
    /// same app. URLs are validated up front; local paths may point at
    /// files that do not exist yet.
    pub fn watch(&self, app: &str, source: &str) -> Result<(), SpecError> {
        let forward = {
            let handlers = Arc::clone(&self.handlers);
            move |event: &ChangeEvent| dispatch(&handlers, event)
        };

        let watcher = if http::is_url(source) {
            http::validate_spec_url(source)?;
            let remote = RemoteSpecWatcher::new(SpecCache::new(&self.config_root), app, source);
            remote.add_handler(forward);
            AppWatcher::Remote(remote)
        } else {
            let local = LocalSpecWatcher::new(app, paths::expand_home_dir(source));
            local.add_handler(forward);
            AppWatcher::Local(local)
        };

        if self.started.load(Ordering::SeqCst) && !self.stopped.load(Ordering::SeqCst) {
            watcher.start();
        }

        let previous = self.watchers.lock().insert(app.to_string(), Arc::new(watcher));
        // Stop the replaced watcher outside the lock; its final events may
        // run handlers that call back into this manager.
        if let Some(previous) = previous {
            previous.stop();
            log::debug!("Replaced watcher for '{app}'");
        }
        Ok(())
    }

    /// Watch the spec source recorded in the registry for `app`.
    pub fn watch_app(&self, app: &str) -> Result<(), SpecError> {
        let record = AppRegistry::new(&self.config_root).load(app)?;
        self.watch(app, &record.spec_source)
    }

    /// Remove and stop the watcher for `app`. Returns whether one existed.
    pub fn unwatch(&self, app: &str) -> bool {
        let removed = self.watchers.lock().remove(app);
        match removed {
            Some(watcher) => {
                watcher.stop();
                log::info!("Stopped watching '{app}'");
                true
            }
            None => false,
        }
    }

    /// Start every registered watcher. Watchers added afterwards start
    /// immediately. Idempotent; a stopped manager stays stopped.
    pub fn start(&self) {
        if self.stopped.load(Ordering::SeqCst) {
            log::warn!("Watcher manager is stopped and cannot be restarted");
            return;
        }
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        for watcher in self.snapshot() {
            watcher.start();
        }
    }

    /// Stop every watcher. Terminal once the manager has started; the
    /// watchers stay registered and still serve synchronous checks.
    pub fn stop(&self) {
        if !self.started.swap(false, Ordering::SeqCst) {
            return;
        }
        self.stopped.store(true, Ordering::SeqCst);
        for watcher in self.snapshot() {
            watcher.stop();
        }
    }

    /// Immediate check of every watched app, in app-name order. Events are
    /// dispatched to handlers as usual and also collected here.
    pub fn check_all_now(&self) -> Vec<ChangeEvent> {
        self.snapshot()
            .iter()
            .filter_map(|watcher| watcher.check_now())
            .collect()
    }

    /// Immediate check of one app. `None` for unwatched apps and for
    /// checks that found no change.
    pub fn check_app_now(&self, app: &str) -> Option<ChangeEvent> {
        let watcher = self.watchers.lock().get(app).cloned()?;
        watcher.check_now()
    }

    /// Names of all watched apps, sorted.
    pub fn watched_apps(&self) -> Vec<String> {
        self.watchers.lock().keys().cloned().collect()
    }

    /// The source the watcher for `app` is bound to.
    pub fn watched_source(&self, app: &str) -> Option<String> {
        let watcher = self.watchers.lock().get(app).cloned()?;
        Some(watcher.source())
    }

    fn snapshot(&self) -> Vec<Arc<AppWatcher>> {
        self.watchers.lock().values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watcher::ChangeKind;
    use apish_config::AppRecord;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn watch_dispatches_on_source_form() {
        let root = TempDir::new().unwrap();
        let manager = WatcherManager::new(root.path());
        let spec = root.path().join("petstore.yaml");
        fs::write(&spec, "openapi: 3.1.0\n").unwrap();

        manager.watch("petstore", spec.to_str().unwrap()).unwrap();
        manager
            .watch("billing", "https://no-such-host.invalid/openapi.json")
            .unwrap();

        assert_eq!(manager.watched_apps(), vec!["billing", "petstore"]);
        let watchers = manager.watchers.lock();
        assert!(matches!(**watchers.get("petstore").unwrap(), AppWatcher::Local(_)));
        assert!(matches!(**watchers.get("billing").unwrap(), AppWatcher::Remote(_)));
    }

    #[test]
    fn malformed_url_is_rejected() {
        let root = TempDir::new().unwrap();
        let manager = WatcherManager::new(root.path());
        assert!(manager.watch("petstore", "https://").is_err());
        assert!(manager.watched_apps().is_empty());
    }

    #[test]
    fn rewatch_replaces_the_existing_watcher() {
        let root = TempDir::new().unwrap();
        let manager = WatcherManager::new(root.path());
        let first = root.path().join("a.yaml");
        let second = root.path().join("b.yaml");

        manager.watch("petstore", first.to_str().unwrap()).unwrap();
        manager.watch("petstore", second.to_str().unwrap()).unwrap();

        assert_eq!(manager.watched_apps(), vec!["petstore"]);
        assert_eq!(
            manager.watched_source("petstore").unwrap(),
            second.to_string_lossy()
        );
    }

    #[test]
    fn unwatch_reports_whether_a_watcher_existed() {
        let root = TempDir::new().unwrap();
        let manager = WatcherManager::new(root.path());
        let spec = root.path().join("petstore.yaml");
        fs::write(&spec, "openapi: 3.1.0\n").unwrap();

        manager.watch("petstore", spec.to_str().unwrap()).unwrap();
        assert!(manager.unwatch("petstore"));
        assert!(!manager.unwatch("petstore"));
        assert!(manager.watched_apps().is_empty());
    }

    #[test]
    fn check_all_now_reports_changed_apps() {
        let root = TempDir::new().unwrap();
        let manager = WatcherManager::new(root.path());
        let stable = root.path().join("stable.yaml");
        let churning = root.path().join("churning.yaml");
        fs::write(&stable, "v: 1\n").unwrap();
        fs::write(&churning, "v: 1\n").unwrap();

        manager.watch("stable", stable.to_str().unwrap()).unwrap();
        manager.watch("churning", churning.to_str().unwrap()).unwrap();

        // First pass only establishes baselines.
        assert!(manager.check_all_now().is_empty());

        fs::write(&churning, "v: 2\n").unwrap();
        let events = manager.check_all_now();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].app_name, "churning");
        assert_eq!(events[0].kind, ChangeKind::Modified);
        assert_eq!(events[0].new_content.as_deref(), Some("v: 2\n"));
    }

    #[test]
    fn check_app_now_returns_none_for_unwatched_apps() {
        let root = TempDir::new().unwrap();
        let manager = WatcherManager::new(root.path());
        assert!(manager.check_app_now("nobody").is_none());
    }

    #[test]
    fn handlers_fan_out_to_all_watchers_even_when_added_late() {
        let root = TempDir::new().unwrap();
        let manager = WatcherManager::new(root.path());
        let spec = root.path().join("petstore.yaml");
        fs::write(&spec, "v: 1\n").unwrap();

        let early: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&early);
        manager.add_handler(move |event| sink.lock().push(event.app_name.clone()));

        manager.watch("petstore", spec.to_str().unwrap()).unwrap();
        manager.check_app_now("petstore");

        let late: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&late);
        manager.add_handler(move |event| sink.lock().push(event.app_name.clone()));

        fs::write(&spec, "v: 2\n").unwrap();
        let event = manager.check_app_now("petstore").expect("change event");
        assert_eq!(event.kind, ChangeKind::Modified);

        assert_eq!(*early.lock(), vec!["petstore"]);
        assert_eq!(*late.lock(), vec!["petstore"]);
    }

    #[test]
    fn watch_app_uses_the_recorded_spec_source() {
        let root = TempDir::new().unwrap();
        let spec = root.path().join("petstore.yaml");
        fs::write(&spec, "openapi: 3.1.0\n").unwrap();

        let registry = AppRegistry::new(root.path());
        let mut record = AppRecord::new("petstore", spec.to_string_lossy());
        registry.save(&mut record).unwrap();

        let manager = WatcherManager::new(root.path());
        manager.watch_app("petstore").unwrap();
        assert_eq!(
            manager.watched_source("petstore").unwrap(),
            spec.to_string_lossy()
        );

        assert!(manager.watch_app("missing").is_err());
    }

    #[test]
    fn watchers_added_after_start_run_immediately() {
        let root = TempDir::new().unwrap();
        let manager = WatcherManager::new(root.path());
        let spec = root.path().join("petstore.yaml");
        fs::write(&spec, "v: 1\n").unwrap();

        manager.start();
        manager.watch("petstore", spec.to_str().unwrap()).unwrap();
        {
            let watchers = manager.watchers.lock();
            let AppWatcher::Local(watcher) = &**watchers.get("petstore").unwrap() else {
                panic!("expected a local watcher");
            };
            assert!(watcher.is_running());
        }

        manager.stop();
        let watchers = manager.watchers.lock();
        let AppWatcher::Local(watcher) = &**watchers.get("petstore").unwrap() else {
            panic!("expected a local watcher");
        };
        assert!(!watcher.is_running());
    }

    #[test]
    fn stopped_manager_still_serves_synchronous_checks() {
        let root = TempDir::new().unwrap();
        let manager = WatcherManager::new(root.path());
        let spec = root.path().join("petstore.yaml");
        fs::write(&spec, "v: 1\n").unwrap();

        manager.watch("petstore", spec.to_str().unwrap()).unwrap();
        manager.start();
        manager.stop();

        assert!(manager.check_app_now("petstore").is_none());
        fs::write(&spec, "v: 2\n").unwrap();
        let event = manager.check_app_now("petstore").expect("change event");
        assert_eq!(event.kind, ChangeKind::Modified);
    }
}
