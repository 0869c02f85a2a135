//! Application record and profile types.
//!
//! An application record is the unit of persistence: one installed API tool,
//! its spec source(s), and its named environment profiles. Records serialize
//! to YAML under `<config_root>/apps/<name>.yaml`. Secrets never appear in
//! these structures; the keyring collaborator owns them, keyed by
//! (app, profile).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Schema version stamped into new records.
pub const RECORD_SCHEMA_VERSION: &str = "1.0";

/// Default per-request timeout for new profiles, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

fn default_schema_version() -> String {
    RECORD_SCHEMA_VERSION.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

/// One installed application: spec source plus environment profiles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppRecord {
    /// App name; equals the record's file stem. Backfilled on load when the
    /// file omits it.
    #[serde(default)]
    pub name: String,

    /// Primary spec location: absolute local path or HTTPS URL.
    pub spec_source: String,

    /// Additional spec locations for merged specs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub spec_sources: Vec<String>,

    /// Human-readable description shown in listings.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    /// Record schema version (not the API's version).
    #[serde(default = "default_schema_version")]
    pub version: String,

    /// Set once, the first time the record is saved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    /// Stamped on every save.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,

    /// Name of the profile used when none is selected explicitly.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub default_profile: String,

    /// Environment profiles, keyed by name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub profiles: BTreeMap<String, Profile>,

    /// Operation count cached from the last successful spec parse.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_count: Option<usize>,

    /// Free-form annotations (install source, team tags, and the like).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl AppRecord {
    /// Create a record with no profiles yet.
    pub fn new(name: impl Into<String>, spec_source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            spec_source: spec_source.into(),
            spec_sources: Vec::new(),
            description: String::new(),
            version: default_schema_version(),
            created_at: None,
            updated_at: None,
            default_profile: String::new(),
            profiles: BTreeMap::new(),
            operation_count: None,
            metadata: BTreeMap::new(),
        }
    }

    /// All spec sources: the primary first, then any extras.
    pub fn all_sources(&self) -> Vec<&str> {
        let mut sources = Vec::with_capacity(1 + self.spec_sources.len());
        if !self.spec_source.is_empty() {
            sources.push(self.spec_source.as_str());
        }
        sources.extend(self.spec_sources.iter().map(String::as_str));
        sources
    }

    pub fn has_profile(&self, name: &str) -> bool {
        self.profiles.contains_key(name)
    }

    pub fn profile(&self, name: &str) -> Option<&Profile> {
        self.profiles.get(name)
    }

    pub fn profile_mut(&mut self, name: &str) -> Option<&mut Profile> {
        self.profiles.get_mut(name)
    }

    /// Profile names in stable (sorted) order.
    pub fn profile_names(&self) -> Vec<String> {
        self.profiles.keys().cloned().collect()
    }

    /// Insert a profile under its own name. The first profile inserted into
    /// an empty record becomes the default.
    pub fn add_profile(&mut self, profile: Profile) {
        let name = profile.name.clone();
        let was_empty = self.profiles.is_empty();
        self.profiles.insert(name.clone(), profile);
        if was_empty || self.default_profile.is_empty() {
            self.set_default_profile(&name);
        }
    }

    /// Point the default at `name` and re-sync every profile's `is_default`
    /// flag. Callers verify existence first; a missing name simply clears
    /// all flags.
    pub fn set_default_profile(&mut self, name: &str) {
        self.default_profile = name.to_string();
        for (profile_name, profile) in &mut self.profiles {
            profile.is_default = profile_name == name;
        }
    }
}

/// One named environment for an app: where requests go and how they are
/// decorated. Holds no credential material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// Profile name; matches its key in the record's profile map.
    #[serde(default)]
    pub name: String,

    /// Base URL requests are issued against.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub base_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Headers sent on every invocation.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,

    /// Query parameters appended to every invocation.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub query_params: BTreeMap<String, String>,

    /// How to authenticate (descriptor only; the secret lives in the keyring).
    #[serde(default, skip_serializing_if = "AuthConfig::is_unset")]
    pub auth: AuthConfig,

    /// TLS material overrides for this environment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsConfig>,

    /// Guard rails for AI-driven invocation; opaque to this crate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub safety: Option<SafetyConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryConfig>,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Mirrors `AppRecord::default_profile`; kept in sync on save.
    #[serde(default)]
    pub is_default: bool,

    /// Auth descriptor for fetching the spec itself (private spec sources).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec_fetch_auth: Option<FetchAuth>,

    /// Extra headers for fetching the spec itself.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub spec_fetch_headers: BTreeMap<String, String>,
}

impl Profile {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            description: None,
            headers: BTreeMap::new(),
            query_params: BTreeMap::new(),
            auth: AuthConfig::default(),
            tls: None,
            safety: None,
            retry: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            is_default: false,
            spec_fetch_auth: None,
            spec_fetch_headers: BTreeMap::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_query_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_params.insert(name.into(), value.into());
        self
    }

    pub fn with_auth(mut self, auth: AuthConfig) -> Self {
        self.auth = auth;
        self
    }
}

/// Authentication descriptor. String-typed so legacy records and imports
/// load without a schema migration; recognized values are documented per
/// field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthConfig {
    /// One of `bearer`, `api_key`, `basic`, `oauth2`, `none`, or empty.
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub auth_type: String,

    /// Where the credential is injected: `header`, `query`, or `cookie`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub location: String,

    /// Header or parameter name carrying the credential (e.g. `X-API-Key`).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub key_name: String,

    /// Scheme prefix for header credentials (e.g. `Bearer`).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub scheme: String,

    /// OAuth2 endpoints and identifiers. Client secrets live in the keyring.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth2: Option<OAuth2Config>,
}

impl AuthConfig {
    /// True when every field is empty; such a config is omitted from disk.
    pub fn is_unset(&self) -> bool {
        self.auth_type.is_empty()
            && self.location.is_empty()
            && self.key_name.is_empty()
            && self.scheme.is_empty()
            && self.oauth2.is_none()
    }
}

/// Non-secret OAuth2 settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OAuth2Config {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub client_id: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub token_url: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes: Vec<String>,
}

/// TLS overrides for one environment. Paths are validated when configured,
/// not at request time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TlsConfig {
    /// Disable server certificate verification. Loudly discouraged.
    #[serde(default)]
    pub skip_verify: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_bundle: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_cert: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_key: Option<String>,

    /// SNI override when the host header and certificate name differ.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_name: Option<String>,

    /// Minimum TLS version as a string (e.g. `"1.2"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_version: Option<String>,
}

/// Safety policy knobs consumed by the request builder, opaque here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SafetyConfig {
    /// Permit only read-style operations (GET/HEAD and spec-declared safe ops).
    #[serde(default)]
    pub read_only: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allow_operations: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deny_operations: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit_per_minute: Option<u32>,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    10_000
}

/// Retry policy for API invocations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Status codes worth retrying; empty means the builder's defaults.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub retry_on_status: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            retry_on_status: Vec::new(),
        }
    }
}

/// Descriptor for authenticating a spec fetch. The secret itself is resolved
/// by the caller (from the keyring) into `value` at fetch time and is never
/// written to disk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FetchAuth {
    /// One of `bearer`, `basic`, or `api_key`.
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub auth_type: String,

    /// Header or query parameter name; defaults to `X-API-Key` for api_key.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub key_name: String,

    /// `header` or `query`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub location: String,

    /// Resolved secret. Runtime-only.
    #[serde(skip)]
    pub value: Option<String>,
}
