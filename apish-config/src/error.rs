//! Typed error variants for the apish-config crate.
//!
//! Provides structured error types for registry I/O, profile operations, and
//! path/TLS validation. Callers at the crate boundary match on specific
//! variants instead of parsing message strings.

use thiserror::Error;

/// Top-level error type for the configuration system.
///
/// Covers the failure categories callers want to distinguish:
/// - Name validation (app and profile names, reserved words)
/// - Registry lookups (missing or already-installed apps)
/// - Profile lifecycle (missing, duplicate, last-profile protection)
/// - Path and TLS material validation
/// - Persistence (serialization, atomic write, raw I/O)
#[derive(Debug, Error)]
pub enum ConfigError {
    // -----------------------------------------------------------------------
    // Name validation
    // -----------------------------------------------------------------------
    /// The app name violates the naming rules.
    #[error("Invalid app name '{name}': {rule}")]
    InvalidName {
        /// The rejected name.
        name: String,
        /// Which rule it broke, in human-readable form.
        rule: String,
    },

    /// The app name collides with a built-in command word.
    #[error("App name '{name}' is reserved; choose a different name")]
    ReservedName {
        /// The rejected name.
        name: String,
    },

    /// The profile name violates the naming rules.
    #[error("Invalid profile name '{name}': {rule}")]
    InvalidProfileName {
        /// The rejected name.
        name: String,
        /// Which rule it broke, in human-readable form.
        rule: String,
    },

    // -----------------------------------------------------------------------
    // Registry lookups
    // -----------------------------------------------------------------------
    /// No record exists for the requested app.
    #[error("App '{app}' is not installed")]
    AppNotFound {
        /// The requested app name.
        app: String,
    },

    /// A record already exists and the operation refuses to replace it.
    #[error("App '{app}' is already installed")]
    AppExists {
        /// The conflicting app name.
        app: String,
    },

    // -----------------------------------------------------------------------
    // Profile lifecycle
    // -----------------------------------------------------------------------
    /// The named profile does not exist in the app record.
    #[error("Profile '{profile}' not found for app '{app}'")]
    ProfileNotFound {
        /// The app whose record was searched.
        app: String,
        /// The missing profile name.
        profile: String,
    },

    /// A profile with this name already exists and overwrite was not requested.
    #[error("Profile '{profile}' already exists for app '{app}'")]
    ProfileExists {
        /// The app whose record holds the profile.
        app: String,
        /// The conflicting profile name.
        profile: String,
    },

    /// Deleting this profile would leave the app with none.
    #[error("Cannot delete the last remaining profile for app '{app}'")]
    LastProfileDeletion {
        /// The app that would be left profile-less.
        app: String,
    },

    /// The record's default profile pointer names a profile that is absent.
    #[error("Default profile '{profile}' does not exist for app '{app}'")]
    DefaultProfileMissing {
        /// The app whose record is inconsistent.
        app: String,
        /// The dangling default profile name.
        profile: String,
    },

    /// A profile is missing its base URL.
    #[error("Profile '{profile}' has no base URL")]
    BaseUrlRequired {
        /// The incomplete profile name.
        profile: String,
    },

    /// The record names no spec source at all.
    #[error("App '{app}' has no spec source")]
    SpecSourceRequired {
        /// The incomplete app name.
        app: String,
    },

    // -----------------------------------------------------------------------
    // Path / TLS validation
    // -----------------------------------------------------------------------
    /// A user-supplied file path failed validation.
    #[error("Invalid path '{path}': {reason}")]
    PathValidation {
        /// The offending path, as supplied (after `~` expansion).
        path: String,
        /// Why it was rejected.
        reason: String,
        /// Underlying I/O error, when one was involved.
        #[source]
        source: Option<std::io::Error>,
    },

    /// Client certificate and key were not supplied together.
    #[error("Client certificate and key must both be provided, or neither")]
    ClientCertKeyPair,

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------
    /// An app record contained invalid YAML or could not be serialized.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    /// An export/import document contained invalid JSON or could not be
    /// serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A file could not be written or renamed into place.
    #[error("Failed to write '{path}': {source}")]
    WriteFailed {
        /// Destination path of the failed write.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// An import document matched none of the recognized shapes.
    #[error("Unrecognized import format: expected a v2.0 export, a v1.0 legacy export, or a plain profile mapping")]
    UnrecognizedImportFormat,

    /// An I/O error with no more specific classification.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
