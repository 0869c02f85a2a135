//! Spec fetching, caching, and change watching for apish.
//!
//! Everything an installed app needs to keep its OpenAPI spec current:
//!
//! - Conditional HTTP fetches (ETag / Last-Modified) with TTLs derived from
//!   response caching headers
//! - A per-app cache of spec bodies, hashed so unchanged content is
//!   recognized wherever it comes from
//! - A parsed-form side cache validated against the source fingerprint
//! - Stale-serve fallback when the network is down
//! - Local-path and remote change watchers behind one manager (the
//!   `watcher` feature, on by default)
//!
//! Cache layout is one directory per app under the shared config root;
//! [`SpecCache`] documents the protocol details.

pub mod cache;
pub mod error;
pub mod hash;
pub mod http;
pub mod meta;
#[cfg(feature = "watcher")]
pub mod watcher;

pub use error::SpecError;
// Cache and fetch results
pub use cache::{CacheInfo, FetchOptions, FetchResult, PARSER_VERSION, SpecCache};
// Cached-body metadata
pub use meta::{CacheMetadata, DEFAULT_TTL_SECS, SpecFormat};
// Source classification and fetch bounds
pub use http::{MAX_SPEC_SIZE, is_url};
// Body hashing
pub use hash::{sha256_file, sha256_hex};
// Change watching
#[cfg(feature = "watcher")]
pub use watcher::{
    ChangeEvent, ChangeHandler, ChangeKind, LocalSpecWatcher, RemoteSpecWatcher, WatchMode,
    WatcherManager,
};
