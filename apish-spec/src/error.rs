//! Spec cache and watcher error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by the spec cache and watchers.
///
/// A stale-cache serve is not an error; it comes back as data with a
/// warning attached (see `FetchResult::cache_warning`). These variants are
/// the fatal cases only.
#[derive(Debug, Error)]
pub enum SpecError {
    // Fetching
    #[error("spec fetch failed with HTTP {code} {status}")]
    HttpStatus { code: u16, status: String },

    #[error("network error fetching '{url}': {source}")]
    Network {
        url: String,
        #[source]
        source: Box<ureq::Error>,
    },

    #[error("spec source '{source}' is not usable: {reason}")]
    InvalidSource { r#source: String, reason: String },

    // Cache state
    #[error("no cached spec for app '{app}'")]
    NotCached { app: String },

    // Persistence
    #[error("failed to write '{path}': {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Config(#[from] apish_config::ConfigError),

    #[error("metadata serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
