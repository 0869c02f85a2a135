//! Remote spec watcher.
//!
//! Re-checks a remote source around its cache expiry: each tick does
//! nothing while the cached copy is comfortably fresh, and otherwise runs a
//! conditional fetch through the spec cache. The first body ever seen is
//! `Modified`; any later hash change is `Expired`. Fetch failures become
//! `Error` events and watching continues.

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::cache::SpecCache;
use crate::hash::sha256_hex;
use crate::watcher::{ChangeEvent, ChangeHandler, ChangeKind, dispatch};

/// Default cadence of expiry checks.
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// How close to expiry a cached spec must be before a tick refetches.
pub const DEFAULT_REFRESH_BEFORE: Duration = Duration::from_secs(5 * 60);

/// Upper bound on how long the loop sleeps before rechecking its stop flag.
const MAX_TICK: Duration = Duration::from_millis(250);

struct RemoteInner {
    app: String,
    source: String,
    cache: SpecCache,
    check_interval: Mutex<Duration>,
    refresh_before: Mutex<Duration>,
    handlers: RwLock<Vec<ChangeHandler>>,
    /// Hash of the last body this watcher (or the on-disk cache) saw.
    /// `None` means no fetch has ever happened.
    last_hash: Mutex<Option<String>>,
    seeded: AtomicBool,
    running: AtomicBool,
    stopped: AtomicBool,
}

/// Watches a remote spec URL through the cache and emits [`ChangeEvent`]s.
pub struct RemoteSpecWatcher {
    inner: Arc<RemoteInner>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for RemoteSpecWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteSpecWatcher")
            .field("app", &self.inner.app)
            .field("source", &self.inner.source)
            .finish_non_exhaustive()
    }
}

impl RemoteSpecWatcher {
    /// The watcher owns the cache it fetches through; pass one rooted at
    /// the same config directory as the registry.
    pub fn new(cache: SpecCache, app: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(RemoteInner {
                app: app.into(),
                source: source.into(),
                cache,
                check_interval: Mutex::new(DEFAULT_CHECK_INTERVAL),
                refresh_before: Mutex::new(DEFAULT_REFRESH_BEFORE),
                handlers: RwLock::new(Vec::new()),
                last_hash: Mutex::new(None),
                seeded: AtomicBool::new(false),
                running: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
            }),
            thread: Mutex::new(None),
        }
    }

    pub fn with_check_interval(self, interval: Duration) -> Self {
        *self.inner.check_interval.lock() = interval;
        self
    }

    pub fn with_refresh_before(self, margin: Duration) -> Self {
        *self.inner.refresh_before.lock() = margin;
        self
    }

    pub fn app(&self) -> &str {
        &self.inner.app
    }

    pub fn source(&self) -> &str {
        &self.inner.source
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst) && !self.inner.stopped.load(Ordering::SeqCst)
    }

    pub fn add_handler(&self, handler: impl Fn(&ChangeEvent) + Send + Sync + 'static) {
        self.inner.handlers.write().push(Arc::new(handler));
    }

    /// Start periodic checks on a dedicated thread. Idempotent; a stopped
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
        seed_baseline(&self.inner);
        let inner = Arc::clone(&self.inner);
        let handle = std::thread::Builder::new()
            .name(format!("spec-watch-{}", self.inner.app))
            .spawn(move || run_loop(inner));
        match handle {
            Ok(handle) => {
                *self.thread.lock() = Some(handle);
                log::info!(
                    "Watching remote spec {} for '{}'",
                    self.inner.source,
                    self.inner.app
                );
            }
            Err(e) => {
                self.inner.running.store(false, Ordering::SeqCst);
                log::error!("Failed to spawn watcher thread for '{}': {e}", self.inner.app);
            }
        }
    }

    /// Stop the check loop. Terminal once the watcher has run; stopping a
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

    /// Single immediate check. Unlike the periodic tick this ignores the
    /// freshness margin and always revalidates (conditionally, so an
    /// unchanged spec costs one 304). The resulting event, if any, is also
    /// dispatched to handlers.
    pub fn check_now(&self) -> Option<ChangeEvent> {
        seed_baseline(&self.inner);
        let event = check_once(&self.inner, true);
        if let Some(event) = &event {
            dispatch(&self.inner.handlers, event);
        }
        event
    }
}

/// Adopt the on-disk cache state as the baseline so a watcher started over
/// a warm cache does not re-announce content the caller already has.
fn seed_baseline(inner: &RemoteInner) {
    if inner.seeded.swap(true, Ordering::SeqCst) {
        return;
    }
    if let Ok(info) = inner.cache.get_info(&inner.app)
        && info.source_url == inner.source
    {
        *inner.last_hash.lock() = Some(info.content_hash);
    }
}

/// One check. When `force` is false the check is skipped while the cache
/// expiry is further away than the refresh margin.
fn check_once(inner: &RemoteInner, force: bool) -> Option<ChangeEvent> {
    if !force
        && let Ok(info) = inner.cache.get_info(&inner.app)
        && info.source_url == inner.source
    {
        let margin = chrono::Duration::from_std(*inner.refresh_before.lock())
            .unwrap_or_else(|_| chrono::Duration::seconds(300));
        if info.expires_at - Utc::now() > margin {
            return None;
        }
    }

    match inner.cache.fetch(&inner.app, &inner.source) {
        Ok(result) => {
            let new_hash = sha256_hex(result.content.as_bytes());
            let mut last = inner.last_hash.lock();
            let kind = match last.as_deref() {
                None => ChangeKind::Modified,
                Some(old) if old != new_hash => ChangeKind::Expired,
                Some(_) => return None,
            };
            *last = Some(new_hash);
            log::info!(
                "Remote spec for '{}' changed ({kind})",
                inner.app
            );
            Some(
                ChangeEvent::new(&inner.app, &inner.source, kind)
                    .with_content(result.content),
            )
        }
        Err(e) => {
            log::warn!("Remote spec check failed for '{}': {e}", inner.app);
            Some(ChangeEvent::new(&inner.app, &inner.source, ChangeKind::Error).with_error(e))
        }
    }
}

fn run_loop(inner: Arc<RemoteInner>) {
    let mut since_check = Duration::ZERO;
    while !inner.stopped.load(Ordering::SeqCst) {
        let check_interval = *inner.check_interval.lock();
        let tick = check_interval.min(MAX_TICK);
        std::thread::sleep(tick);
        since_check += tick;
        if since_check >= check_interval {
            since_check = Duration::ZERO;
            if let Some(event) = check_once(&inner, false) {
                dispatch(&inner.handlers, &event);
            }
        }
    }
    log::debug!("Watcher for '{}' stopped", inner.app);
}
