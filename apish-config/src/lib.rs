//! Configuration system for apish installed applications.
//!
//! This crate owns the on-disk registry of installed apps and everything
//! layered on top of it:
//!
//! - Platform config-root and shim-directory resolution
//! - Application records (YAML, one file per app) and their registry
//! - Environment profiles and the profile manager
//! - Credential-free profile export and multi-format import
//! - App and profile name validation
//! - TLS material (PEM) validation for profile overrides
//!
//! Secrets never pass through this crate. Records hold auth *descriptors*
//! (where a credential goes); the credential itself is the keyring's
//! problem, resolved at request time by the caller.

pub mod duration;
pub mod error;
pub mod export;
pub mod manager;
pub mod names;
pub mod paths;
pub mod record;
pub mod registry;
pub mod tls;

// Re-export main types for convenience
pub use error::ConfigError;
pub use record::{
    AppRecord, AuthConfig, DEFAULT_TIMEOUT_SECS, FetchAuth, OAuth2Config, Profile,
    RECORD_SCHEMA_VERSION, RetryConfig, SafetyConfig, TlsConfig,
};
pub use registry::{AppInfo, AppRegistry};
// Profile lifecycle
pub use manager::{CreateProfileOptions, ProfileManager, UpdateProfileOptions};
// Export / import
pub use export::{
    BulkExport, BulkImportReport, EXPORT_VERSION, ExportOptions, ExportedProfile, ImportOptions,
    ImportValidation, ProfileExport, parse_import,
};
// Path resolution
pub use paths::{CONFIG_DIR_ENV, config_root, expand_home_dir, shim_dir, validate_and_resolve};
// Name rules
pub use names::{RESERVED_NAMES, validate_app_name, validate_profile_name};
// TLS material checks
pub use tls::{validate_ca_bundle, validate_certificate, validate_private_key, validate_tls_set};
// Human-readable durations (Go shape, e.g. "1m30s")
pub use duration::{format_go_duration, parse_go_duration};
