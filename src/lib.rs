// Library exports for the apish CLI and for embedding apish as a library.
//
// The root crate is a thin facade: all behavior lives in the sub-crates.
// apish-config owns the on-disk registry, profiles, and import/export;
// apish-spec owns spec fetching, caching, and change watching.

/// Application version (root crate version, for use by sub-crates).
/// Sub-crates should receive this via parameter rather than using
/// `env!("CARGO_PKG_VERSION")` which resolves to the sub-crate's version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// User-Agent sent on spec fetches performed on behalf of this binary.
/// Pass to [`spec::SpecCache::with_user_agent`] so requests carry the root
/// crate's version rather than apish-spec's.
pub fn user_agent() -> String {
    format!("apish/{VERSION}")
}

pub mod config {
    //! Configuration re-exports from the apish-config crate.
    pub use apish_config::{
        AppInfo, AppRecord, AppRegistry, AuthConfig, BulkExport, BulkImportReport, ConfigError,
        CreateProfileOptions, DEFAULT_TIMEOUT_SECS, EXPORT_VERSION, ExportOptions, ExportedProfile,
        FetchAuth, ImportOptions, ImportValidation, OAuth2Config, Profile, ProfileExport,
        ProfileManager, RECORD_SCHEMA_VERSION, RESERVED_NAMES, RetryConfig, SafetyConfig,
        TlsConfig, UpdateProfileOptions, config_root, expand_home_dir, parse_import, shim_dir,
        validate_and_resolve, validate_app_name, validate_profile_name,
    };
}

pub mod spec {
    //! Spec cache and watcher re-exports from the apish-spec crate.
    pub use apish_spec::{
        CacheInfo, CacheMetadata, FetchOptions, FetchResult, MAX_SPEC_SIZE, PARSER_VERSION,
        SpecCache, SpecError, SpecFormat, is_url, sha256_file, sha256_hex,
    };
    pub use apish_spec::{
        ChangeEvent, ChangeHandler, ChangeKind, LocalSpecWatcher, RemoteSpecWatcher, WatchMode,
        WatcherManager,
    };
}
