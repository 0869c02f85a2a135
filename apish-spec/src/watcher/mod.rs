//! Spec change watchers.
//!
//! A watcher is bound to one (app, source) pair. Local paths are watched
//! through filesystem events with a polling fallback; remote URLs are
//! re-checked around their cache expiry. A [`WatcherManager`] owns one
//! watcher per app and fans change events out to registered handlers.

mod local;
mod manager;
mod remote;

pub use local::LocalSpecWatcher;
pub use manager::WatcherManager;
pub use remote::RemoteSpecWatcher;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// What changed about a watched spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// Content changed (or appeared) at the source.
    Modified,
    /// The source file is gone.
    Deleted,
    /// A remote spec's content changed on revalidation.
    Expired,
    /// The check itself failed; watching continues.
    Error,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChangeKind::Modified => "modified",
            ChangeKind::Deleted => "deleted",
            ChangeKind::Expired => "expired",
            ChangeKind::Error => "error",
        };
        f.write_str(s)
    }
}

/// How a local watcher is currently observing its file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchMode {
    /// Subscribed to filesystem events on the containing directory.
    Event,
    /// Periodically stat-ing the file (directory missing or events
    /// unavailable).
    Polling,
}

impl fmt::Display for WatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WatchMode::Event => "event",
            WatchMode::Polling => "polling",
        })
    }
}

/// A change delivered to handlers.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub app_name: String,
    pub source_url: String,
    pub kind: ChangeKind,
    /// New body for `Modified` and `Expired` events.
    pub new_content: Option<String>,
    /// Cause for `Error` events.
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ChangeEvent {
    pub(crate) fn new(app: &str, source: &str, kind: ChangeKind) -> Self {
        Self {
            app_name: app.to_string(),
            source_url: source.to_string(),
            kind,
            new_content: None,
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub(crate) fn with_content(mut self, content: String) -> Self {
        self.new_content = Some(content);
        self
    }

    pub(crate) fn with_error(mut self, error: impl fmt::Display) -> Self {
        self.error = Some(error.to_string());
        self
    }
}

/// Handler invoked synchronously on the watcher's thread for every event.
pub type ChangeHandler = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

/// Call every registered handler with `event`. The list is snapshotted
/// under a short read lock first, so handlers registered mid-dispatch see
/// only subsequent events and a handler registering another handler does
/// not deadlock.
pub(crate) fn dispatch(handlers: &RwLock<Vec<ChangeHandler>>, event: &ChangeEvent) {
    let snapshot: Vec<ChangeHandler> = handlers.read().clone();
    for handler in &snapshot {
        handler(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn kinds_and_modes_display_lowercase() {
        assert_eq!(ChangeKind::Modified.to_string(), "modified");
        assert_eq!(ChangeKind::Deleted.to_string(), "deleted");
        assert_eq!(ChangeKind::Expired.to_string(), "expired");
        assert_eq!(ChangeKind::Error.to_string(), "error");
        assert_eq!(WatchMode::Event.to_string(), "event");
        assert_eq!(WatchMode::Polling.to_string(), "polling");
    }

    #[test]
    fn dispatch_reaches_every_handler_in_order() {
        let handlers: RwLock<Vec<ChangeHandler>> = RwLock::new(Vec::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        for tag in ["first", "second"] {
            let seen = Arc::clone(&seen);
            handlers
                .write()
                .push(Arc::new(move |event: &ChangeEvent| {
                    seen.lock().push(format!("{tag}:{}", event.kind));
                }));
        }

        let event = ChangeEvent::new("petstore", "/tmp/spec.yaml", ChangeKind::Modified);
        dispatch(&handlers, &event);
        assert_eq!(*seen.lock(), vec!["first:modified", "second:modified"]);
    }

    #[test]
    fn handler_registered_during_dispatch_waits_for_next_event() {
        let handlers: Arc<RwLock<Vec<ChangeHandler>>> = Arc::new(RwLock::new(Vec::new()));
        let late_calls = Arc::new(Mutex::new(0usize));

        let handlers_ref = Arc::clone(&handlers);
        let late_calls_ref = Arc::clone(&late_calls);
        handlers.write().push(Arc::new(move |_event: &ChangeEvent| {
            let late_calls = Arc::clone(&late_calls_ref);
            handlers_ref.write().push(Arc::new(move |_event: &ChangeEvent| {
                *late_calls.lock() += 1;
            }));
        }));

        let event = ChangeEvent::new("petstore", "/tmp/spec.yaml", ChangeKind::Modified);
        dispatch(&handlers, &event);
        assert_eq!(*late_calls.lock(), 0, "late handler ran on the same event");

        dispatch(&handlers, &event);
        assert_eq!(*late_calls.lock(), 1);
    }
}
