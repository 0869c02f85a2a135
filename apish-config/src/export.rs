//! Profile export and import.
//!
//! Exports are shareable by construction: credential-bearing headers and
//! query parameters are stripped, OAuth2 details are dropped, and only the
//! auth descriptor (type, location, key name, scheme) survives. Import
//! accepts three document shapes: the current v2 export, the v1 legacy
//! nested form, and a bare profile mapping with conventional keys. Legacy
//! shapes are promoted through an explicit layer; unknown scalar fields land
//! in the document's metadata bag instead of being dropped.

use crate::duration::{format_go_duration, parse_go_duration};
use crate::error::ConfigError;
use crate::manager::ProfileManager;
use crate::names::validate_profile_name;
use crate::record::{AuthConfig, Profile, RetryConfig, SafetyConfig, TlsConfig};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Version written into new export documents.
pub const EXPORT_VERSION: &str = "2.0";

/// Header-name fragments that mark a header as credential-bearing.
const SENSITIVE_HEADER_MARKERS: &[&str] = &[
    "authorization",
    "x-api-key",
    "x-auth",
    "x-token",
    "bearer",
    "api-key",
    "apikey",
    "secret",
    "password",
    "credential",
];

/// Query-parameter-name fragments that mark a parameter as credential-bearing.
const SENSITIVE_QUERY_MARKERS: &[&str] = &[
    "key",
    "token",
    "secret",
    "password",
    "auth",
    "api_key",
    "apikey",
    "access_token",
];

fn is_sensitive(name: &str, markers: &[&str]) -> bool {
    let lower = name.to_ascii_lowercase();
    markers.iter().any(|marker| lower.contains(marker))
}

/// Profile as it appears inside an export document. Differs from
/// [`Profile`] in that the timeout is a duration string and no fetch or
/// default-flag state is carried.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExportedProfile {
    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub base_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Auth descriptor only; OAuth2 endpoints and anything secret-shaped
    /// never appear here.
    #[serde(default, skip_serializing_if = "AuthConfig::is_unset")]
    pub auth: AuthConfig,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub query_params: BTreeMap<String, String>,

    /// Go-style duration string (`"1m0s"`); omitted when zero.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub timeout: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub safety: Option<SafetyConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryConfig>,
}

/// A single-profile export document (version 2).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileExport {
    pub version: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub app_name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub profile_name: String,

    pub profile: ExportedProfile,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exported_at: Option<DateTime<Utc>>,

    /// Fields from legacy documents that have no v2 home.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

/// Whole-app export document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BulkExport {
    pub version: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub app_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exported_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub profiles: BTreeMap<String, ExportedProfile>,
}

/// Options for [`ProfileManager::export`] and [`ProfileManager::export_all`].
/// TLS, safety, and retry sections stay out of exports unless asked for.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExportOptions {
    pub include_tls: bool,
    pub include_safety: bool,
    pub include_retry: bool,
}

/// Options for [`ProfileManager::import`].
#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    /// Install under this name instead of the document's.
    pub target_name: Option<String>,
    /// Required to replace an existing profile.
    pub overwrite: bool,
    pub set_as_default: bool,
    /// When replacing, keep existing headers the import does not mention.
    pub merge_headers: bool,
}

/// Outcome of [`ProfileManager::validate_import`].
#[derive(Debug, Clone, Default)]
pub struct ImportValidation {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ImportValidation {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Outcome of [`ProfileManager::import_bulk`].
#[derive(Debug, Clone, Default)]
pub struct BulkImportReport {
    pub imported: Vec<String>,
    pub skipped: Vec<String>,
}

// Legacy v1 document: nested profile with flattened auth fields.
#[derive(Debug, Deserialize)]
struct LegacyExportV1 {
    #[serde(default)]
    app: String,
    #[serde(default)]
    name: String,
    profile: LegacyProfileV1,
}

#[derive(Debug, Default, Deserialize)]
struct LegacyProfileV1 {
    #[serde(default)]
    name: String,
    #[serde(default)]
    base_url: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    auth_type: String,
    #[serde(default)]
    auth_location: String,
    #[serde(default)]
    key_name: String,
    #[serde(default)]
    scheme: String,
    #[serde(default)]
    headers: BTreeMap<String, String>,
    #[serde(default)]
    query_params: BTreeMap<String, String>,
    #[serde(default)]
    timeout_secs: u64,
}

/// Produce the stripped, shareable form of a profile.
fn strip_profile(profile: &Profile, options: &ExportOptions) -> ExportedProfile {
    let headers = profile
        .headers
        .iter()
        .filter(|(name, _)| !is_sensitive(name, SENSITIVE_HEADER_MARKERS))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    let query_params = profile
        .query_params
        .iter()
        .filter(|(name, _)| !is_sensitive(name, SENSITIVE_QUERY_MARKERS))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    ExportedProfile {
        name: profile.name.clone(),
        base_url: profile.base_url.clone(),
        description: profile.description.clone(),
        auth: AuthConfig {
            auth_type: profile.auth.auth_type.clone(),
            location: profile.auth.location.clone(),
            key_name: profile.auth.key_name.clone(),
            scheme: profile.auth.scheme.clone(),
            oauth2: None,
        },
        headers,
        query_params,
        timeout: if profile.timeout_secs == 0 {
            String::new()
        } else {
            format_go_duration(profile.timeout_secs)
        },
        tls: options.include_tls.then(|| profile.tls.clone()).flatten(),
        safety: options
            .include_safety
            .then(|| profile.safety.clone())
            .flatten(),
        retry: options
            .include_retry
            .then(|| profile.retry.clone())
            .flatten(),
    }
}

fn promote_legacy(legacy: LegacyExportV1) -> ProfileExport {
    let p = legacy.profile;
    let name = if p.name.is_empty() { legacy.name } else { p.name };
    ProfileExport {
        version: "1.0".to_string(),
        app_name: legacy.app,
        profile_name: name.clone(),
        profile: ExportedProfile {
            name,
            base_url: p.base_url,
            description: p.description,
            auth: AuthConfig {
                auth_type: p.auth_type,
                location: p.auth_location,
                key_name: p.key_name,
                scheme: p.scheme,
                oauth2: None,
            },
            headers: p.headers,
            query_params: p.query_params,
            timeout: if p.timeout_secs == 0 {
                String::new()
            } else {
                format_go_duration(p.timeout_secs)
            },
            tls: None,
            safety: None,
            retry: None,
        },
        exported_at: None,
        metadata: BTreeMap::new(),
    }
}

fn string_map(value: Option<&serde_json::Value>) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    if let Some(obj) = value.and_then(|v| v.as_object()) {
        for (k, v) in obj {
            if let Some(s) = v.as_str() {
                map.insert(k.clone(), s.to_string());
            }
        }
    }
    map
}

/// Promote a bare mapping with conventional keys. Returns `None` when the
/// document doesn't even look like a profile.
fn promote_untyped(obj: &serde_json::Map<String, serde_json::Value>) -> Option<ProfileExport> {
    let name = obj
        .get("profile_name")
        .or_else(|| obj.get("name"))
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let base_url = obj
        .get("base_url")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    if name.is_empty() && base_url.is_empty() {
        return None;
    }

    let str_of = |key: &str| {
        obj.get(key)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    };

    let timeout = match obj.get("timeout") {
        Some(serde_json::Value::Number(n)) => n
            .as_u64()
            .map(format_go_duration)
            .unwrap_or_default(),
        Some(serde_json::Value::String(s)) => s.clone(),
        _ => String::new(),
    };

    // Anything scalar we did not recognize rides along in the metadata bag.
    const KNOWN_KEYS: &[&str] = &[
        "profile_name",
        "name",
        "base_url",
        "description",
        "auth_type",
        "auth_location",
        "key_name",
        "scheme",
        "headers",
        "query_params",
        "timeout",
    ];
    let mut metadata = BTreeMap::new();
    for (key, value) in obj {
        if !KNOWN_KEYS.contains(&key.as_str()) && !value.is_object() && !value.is_array() {
            metadata.insert(key.clone(), value.clone());
        }
    }

    Some(ProfileExport {
        version: "1.0".to_string(),
        app_name: String::new(),
        profile_name: name.clone(),
        profile: ExportedProfile {
            name,
            base_url,
            description: obj
                .get("description")
                .and_then(|v| v.as_str())
                .map(String::from),
            auth: AuthConfig {
                auth_type: str_of("auth_type"),
                location: str_of("auth_location"),
                key_name: str_of("key_name"),
                scheme: str_of("scheme"),
                oauth2: None,
            },
            headers: string_map(obj.get("headers")),
            query_params: string_map(obj.get("query_params")),
            timeout,
            tls: None,
            safety: None,
            retry: None,
        },
        exported_at: None,
        metadata,
    })
}

fn parse_document(doc: &str) -> Result<serde_json::Value, ConfigError> {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(doc) {
        return Ok(value);
    }
    serde_yaml_ng::from_str::<serde_json::Value>(doc)
        .map_err(|_| ConfigError::UnrecognizedImportFormat)
}

/// Parse an import document, whatever its vintage, into the v2 shape.
///
/// Shapes are tried most-specific first: a v2 document, the v1 legacy
/// nested form, then a bare profile mapping. JSON and YAML encodings are
/// both accepted.
///
/// # Errors
///
/// [`ConfigError::UnrecognizedImportFormat`] when no shape matches.
pub fn parse_import(doc: &str) -> Result<ProfileExport, ConfigError> {
    let value = parse_document(doc)?;
    let obj = value
        .as_object()
        .ok_or(ConfigError::UnrecognizedImportFormat)?;
    let version = obj
        .get("version")
        .and_then(|v| v.as_str())
        .unwrap_or_default();

    if version.starts_with('2') && obj.contains_key("profile") {
        return serde_json::from_value(value.clone())
            .map_err(|_| ConfigError::UnrecognizedImportFormat);
    }
    if version.starts_with('1') && obj.contains_key("profile") {
        let legacy: LegacyExportV1 = serde_json::from_value(value.clone())
            .map_err(|_| ConfigError::UnrecognizedImportFormat)?;
        return Ok(promote_legacy(legacy));
    }
    promote_untyped(obj).ok_or(ConfigError::UnrecognizedImportFormat)
}

impl ProfileManager {
    /// Export one profile as a credential-free document.
    pub fn export(
        &self,
        profile: &str,
        options: &ExportOptions,
    ) -> Result<ProfileExport, ConfigError> {
        let p = self.get(profile)?;
        Ok(ProfileExport {
            version: EXPORT_VERSION.to_string(),
            app_name: self.app_name().to_string(),
            profile_name: p.name.clone(),
            profile: strip_profile(p, options),
            exported_at: Some(Utc::now()),
            metadata: BTreeMap::new(),
        })
    }

    /// Export every profile of the app.
    pub fn export_all(&self, options: &ExportOptions) -> BulkExport {
        let profiles = self
            .record()
            .profiles
            .iter()
            .map(|(name, profile)| (name.clone(), strip_profile(profile, options)))
            .collect();
        BulkExport {
            version: EXPORT_VERSION.to_string(),
            app_name: self.app_name().to_string(),
            exported_at: Some(Utc::now()),
            profiles,
        }
    }

    /// Import a profile document. Returns the name it was installed under.
    ///
    /// The change is in-memory until [`ProfileManager::save`], like every
    /// other mutation on this type.
    pub fn import(&mut self, doc: &str, options: ImportOptions) -> Result<String, ConfigError> {
        let export = parse_import(doc)?;
        let name = options
            .target_name
            .clone()
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| {
                if export.profile_name.is_empty() {
                    export.profile.name.clone()
                } else {
                    export.profile_name.clone()
                }
            });
        validate_profile_name(&name)?;
        if export.profile.base_url.is_empty() {
            return Err(ConfigError::BaseUrlRequired {
                profile: name.clone(),
            });
        }

        let existing = self.record().profile(&name).cloned();
        if existing.is_some() && !options.overwrite {
            return Err(ConfigError::ProfileExists {
                app: self.app_name().to_string(),
                profile: name.clone(),
            });
        }

        let mut profile = self.profile_from_export(&name, &export.profile);
        if options.merge_headers
            && let Some(old) = existing
        {
            // Existing headers survive unless the import overrides them.
            let mut merged = old.headers;
            merged.extend(profile.headers);
            profile.headers = merged;
        }

        let was_default = self.record().default_profile == name;
        self.record_mut().profiles.remove(&name);
        self.record_mut().add_profile(profile);
        if options.set_as_default || was_default {
            self.record_mut().set_default_profile(&name);
        }
        log::info!(
            "Imported profile '{}' into app '{}' (document version {})",
            name,
            self.app_name(),
            export.version
        );
        Ok(name)
    }

    /// Import a bulk document. Existing profiles are skipped unless
    /// `overwrite` is set; the report names both groups.
    pub fn import_bulk(
        &mut self,
        doc: &str,
        overwrite: bool,
    ) -> Result<BulkImportReport, ConfigError> {
        let value = parse_document(doc)?;
        let bulk: BulkExport = serde_json::from_value(value)
            .map_err(|_| ConfigError::UnrecognizedImportFormat)?;
        if bulk.profiles.is_empty() {
            return Err(ConfigError::UnrecognizedImportFormat);
        }

        let mut report = BulkImportReport::default();
        for (name, exported) in &bulk.profiles {
            validate_profile_name(name)?;
            if self.record().has_profile(name) && !overwrite {
                report.skipped.push(name.clone());
                continue;
            }
            let profile = self.profile_from_export(name, exported);
            self.record_mut().profiles.remove(name);
            self.record_mut().add_profile(profile);
            report.imported.push(name.clone());
        }
        // Overwrites may have reinserted the default; re-sync its flag.
        let default = self.record().default_profile.clone();
        if self.record().has_profile(&default) {
            self.record_mut().set_default_profile(&default);
        }
        log::info!(
            "Bulk import into app '{}': {} imported, {} skipped",
            self.app_name(),
            report.imported.len(),
            report.skipped.len()
        );
        Ok(report)
    }

    /// Check an import document without touching the record.
    ///
    /// Errors make the document unusable (missing profile name or base URL);
    /// warnings flag things worth a prompt (legacy format, an existing
    /// profile that would need `overwrite`, no auth descriptor).
    ///
    /// # Errors
    ///
    /// Only [`ConfigError::UnrecognizedImportFormat`] when the document
    /// cannot be parsed at all.
    pub fn validate_import(&self, doc: &str) -> Result<ImportValidation, ConfigError> {
        let value = parse_document(doc)?;
        let has_version = value
            .as_object()
            .is_some_and(|obj| obj.contains_key("version"));

        let export = parse_import(doc)?;
        let mut validation = ImportValidation::default();

        if !has_version {
            validation
                .warnings
                .push("document has no version field; assuming legacy format".to_string());
        }

        let name = if export.profile_name.is_empty() {
            export.profile.name.clone()
        } else {
            export.profile_name.clone()
        };
        if name.is_empty() {
            validation.errors.push("missing profile name".to_string());
        } else if self.record().has_profile(&name) {
            validation.warnings.push(format!(
                "profile '{name}' already exists; import will require overwrite"
            ));
        }
        if export.profile.base_url.is_empty() {
            validation.errors.push("missing base_url".to_string());
        }
        if export.profile.auth.auth_type.is_empty() {
            validation
                .warnings
                .push("no auth type specified".to_string());
        }
        Ok(validation)
    }

    fn profile_from_export(&self, name: &str, exported: &ExportedProfile) -> Profile {
        let mut profile = Profile::new(name, exported.base_url.clone());
        profile.description = exported.description.clone();
        profile.auth = exported.auth.clone();
        profile.headers = exported.headers.clone();
        profile.query_params = exported.query_params.clone();
        profile.timeout_secs = if exported.timeout.is_empty() {
            crate::record::DEFAULT_TIMEOUT_SECS
        } else {
            parse_go_duration(&exported.timeout)
                .unwrap_or(crate::record::DEFAULT_TIMEOUT_SECS)
        };
        profile.tls = exported.tls.clone();
        profile.safety = exported.safety.clone();
        profile.retry = exported.retry.clone();
        profile
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::AppRecord;
    use crate::registry::AppRegistry;
    use tempfile::TempDir;

    fn manager_with_profile(profile: Profile) -> (TempDir, ProfileManager) {
        let dir = TempDir::new().unwrap();
        let registry = AppRegistry::new(dir.path());
        let mut record = AppRecord::new("petstore", "/abs/spec.yaml");
        record.add_profile(profile);
        registry.save(&mut record).unwrap();
        let manager = ProfileManager::load(&registry, "petstore").unwrap();
        (dir, manager)
    }

    fn empty_manager() -> (TempDir, ProfileManager) {
        let dir = TempDir::new().unwrap();
        let registry = AppRegistry::new(dir.path());
        let mut record = AppRecord::new("fresh", "/abs/spec.yaml");
        registry.save(&mut record).unwrap();
        let manager = ProfileManager::load(&registry, "fresh").unwrap();
        (dir, manager)
    }

    #[test]
    fn export_strips_credential_headers_and_params() {
        let profile = Profile::new("prod", "https://api.example.com")
            .with_header("Authorization", "Bearer X")
            .with_header("X-Custom", "v")
            .with_query_param("api_key", "S")
            .with_query_param("version", "v2");
        let (_dir, manager) = manager_with_profile(profile);

        let export = manager.export("prod", &ExportOptions::default()).unwrap();
        assert_eq!(export.profile.headers.len(), 1);
        assert_eq!(export.profile.headers["X-Custom"], "v");
        assert_eq!(export.profile.query_params.len(), 1);
        assert_eq!(export.profile.query_params["version"], "v2");

        let json = serde_json::to_string(&export).unwrap();
        for secret in ["Authorization", "Bearer", "api_key", "\"S\""] {
            assert!(!json.contains(secret), "'{secret}' leaked: {json}");
        }
        assert!(json.contains("X-Custom"));
    }

    #[test]
    fn export_carries_version_identity_and_timestamp() {
        let (_dir, manager) =
            manager_with_profile(Profile::new("prod", "https://api.example.com"));
        let export = manager.export("prod", &ExportOptions::default()).unwrap();
        assert_eq!(export.version, EXPORT_VERSION);
        assert_eq!(export.app_name, "petstore");
        assert_eq!(export.profile_name, "prod");
        assert!(export.exported_at.is_some());
    }

    #[test]
    fn export_formats_timeout_as_go_duration() {
        let mut profile = Profile::new("prod", "https://api.example.com");
        profile.timeout_secs = 60;
        let (_dir, manager) = manager_with_profile(profile);
        let export = manager.export("prod", &ExportOptions::default()).unwrap();
        assert_eq!(export.profile.timeout, "1m0s");

        let json = serde_json::to_string(&export).unwrap();
        assert!(json.contains("\"1m0s\""), "{json}");
    }

    #[test]
    fn export_omits_zero_timeout() {
        let mut profile = Profile::new("prod", "https://api.example.com");
        profile.timeout_secs = 0;
        let (_dir, manager) = manager_with_profile(profile);
        let export = manager.export("prod", &ExportOptions::default()).unwrap();
        let json = serde_json::to_string(&export).unwrap();
        assert!(!json.contains("timeout"), "{json}");
    }

    #[test]
    fn export_gates_optional_sections() {
        let mut profile = Profile::new("prod", "https://api.example.com");
        profile.tls = Some(TlsConfig {
            skip_verify: true,
            ..Default::default()
        });
        profile.safety = Some(SafetyConfig {
            read_only: true,
            ..Default::default()
        });
        profile.retry = Some(RetryConfig::default());
        let (_dir, manager) = manager_with_profile(profile);

        let bare = manager.export("prod", &ExportOptions::default()).unwrap();
        assert!(bare.profile.tls.is_none());
        assert!(bare.profile.safety.is_none());
        assert!(bare.profile.retry.is_none());

        let full = manager
            .export(
                "prod",
                &ExportOptions {
                    include_tls: true,
                    include_safety: true,
                    include_retry: true,
                },
            )
            .unwrap();
        assert!(full.profile.tls.is_some());
        assert!(full.profile.safety.is_some());
        assert!(full.profile.retry.is_some());
    }

    #[test]
    fn export_drops_oauth2_entirely() {
        let mut profile = Profile::new("prod", "https://api.example.com");
        profile.auth = AuthConfig {
            auth_type: "oauth2".into(),
            location: "header".into(),
            key_name: String::new(),
            scheme: String::new(),
            oauth2: Some(crate::record::OAuth2Config {
                client_id: "abc123".into(),
                token_url: "https://auth.example.com/token".into(),
                scopes: vec!["read".into()],
            }),
        };
        let (_dir, manager) = manager_with_profile(profile);
        let export = manager.export("prod", &ExportOptions::default()).unwrap();
        assert!(export.profile.auth.oauth2.is_none());
        let json = serde_json::to_string(&export).unwrap();
        assert!(!json.contains("abc123"), "{json}");
    }

    #[test]
    fn import_v2_round_trips_non_credential_fields() {
        let profile = Profile::new("prod", "https://api.example.com")
            .with_description("production")
            .with_header("X-Custom", "v")
            .with_query_param("version", "v2");
        let (_dir, manager) = manager_with_profile(profile);
        let doc =
            serde_json::to_string(&manager.export("prod", &ExportOptions::default()).unwrap())
                .unwrap();

        let (_dir2, mut fresh) = empty_manager();
        let name = fresh.import(&doc, ImportOptions::default()).unwrap();
        assert_eq!(name, "prod");

        let imported = fresh.get("prod").unwrap();
        assert_eq!(imported.base_url, "https://api.example.com");
        assert_eq!(imported.description.as_deref(), Some("production"));
        assert_eq!(imported.headers["X-Custom"], "v");
        assert_eq!(imported.query_params["version"], "v2");
        // First profile of a fresh app becomes the default.
        assert_eq!(fresh.record().default_profile, "prod");
    }

    #[test]
    fn import_v1_legacy_document() {
        let doc = r#"{
            "version": "1.0",
            "app": "oldtool",
            "name": "staging",
            "profile": {
                "base_url": "https://staging.example.com",
                "auth_type": "bearer",
                "auth_location": "header",
                "scheme": "Bearer",
                "headers": {"X-Env": "staging"},
                "timeout_secs": 90
            }
        }"#;
        let (_dir, mut manager) = empty_manager();
        let name = manager.import(doc, ImportOptions::default()).unwrap();
        assert_eq!(name, "staging");

        let profile = manager.get("staging").unwrap();
        assert_eq!(profile.auth.auth_type, "bearer");
        assert_eq!(profile.auth.scheme, "Bearer");
        assert_eq!(profile.headers["X-Env"], "staging");
        assert_eq!(profile.timeout_secs, 90);
    }

    #[test]
    fn import_untyped_mapping_with_metadata_bag() {
        let doc = r#"{
            "profile_name": "dev",
            "base_url": "https://dev.example.com",
            "auth_type": "api_key",
            "headers": {"X-Env": "dev"},
            "exported_by": "old-cli",
            "revision": 7
        }"#;
        let parsed = parse_import(doc).unwrap();
        assert_eq!(parsed.version, "1.0");
        assert_eq!(parsed.metadata["exported_by"], "old-cli");
        assert_eq!(parsed.metadata["revision"], 7);

        let (_dir, mut manager) = empty_manager();
        let name = manager.import(doc, ImportOptions::default()).unwrap();
        assert_eq!(name, "dev");
        assert_eq!(manager.get("dev").unwrap().auth.auth_type, "api_key");
    }

    #[test]
    fn import_accepts_yaml_encoding() {
        let doc = "profile_name: dev\nbase_url: https://dev.example.com\n";
        let (_dir, mut manager) = empty_manager();
        assert_eq!(
            manager.import(doc, ImportOptions::default()).unwrap(),
            "dev"
        );
    }

    #[test]
    fn import_requires_overwrite_for_existing() {
        let (_dir, mut manager) =
            manager_with_profile(Profile::new("prod", "https://old.example.com"));
        let doc = r#"{"profile_name": "prod", "base_url": "https://new.example.com"}"#;

        assert!(matches!(
            manager.import(doc, ImportOptions::default()).unwrap_err(),
            ConfigError::ProfileExists { .. }
        ));

        let opts = ImportOptions {
            overwrite: true,
            ..Default::default()
        };
        manager.import(doc, opts).unwrap();
        assert_eq!(manager.get("prod").unwrap().base_url, "https://new.example.com");
    }

    #[test]
    fn import_merge_headers_keeps_unmentioned_keys() {
        let profile = Profile::new("prod", "https://api.example.com")
            .with_header("X-Keep", "stays")
            .with_header("X-Replace", "old");
        let (_dir, mut manager) = manager_with_profile(profile);

        let doc = r#"{
            "profile_name": "prod",
            "base_url": "https://api.example.com",
            "headers": {"X-Replace": "new"}
        }"#;
        let opts = ImportOptions {
            overwrite: true,
            merge_headers: true,
            ..Default::default()
        };
        manager.import(doc, opts).unwrap();

        let merged = manager.get("prod").unwrap();
        assert_eq!(merged.headers["X-Keep"], "stays");
        assert_eq!(merged.headers["X-Replace"], "new");

        // Without merge_headers the import's map wins wholesale.
        let opts = ImportOptions {
            overwrite: true,
            ..Default::default()
        };
        manager.import(doc, opts).unwrap();
        assert!(!manager.get("prod").unwrap().headers.contains_key("X-Keep"));
    }

    #[test]
    fn import_target_name_overrides_document() {
        let doc = r#"{"profile_name": "dev", "base_url": "https://dev.example.com"}"#;
        let (_dir, mut manager) = empty_manager();
        let opts = ImportOptions {
            target_name: Some("renamed".into()),
            ..Default::default()
        };
        assert_eq!(manager.import(doc, opts).unwrap(), "renamed");
        assert!(manager.get("dev").is_err());
    }

    #[test]
    fn import_rejects_garbage_and_missing_base_url() {
        let (_dir, mut manager) = empty_manager();
        assert!(matches!(
            manager
                .import("this is not a document", ImportOptions::default())
                .unwrap_err(),
            ConfigError::UnrecognizedImportFormat
        ));
        assert!(matches!(
            manager
                .import("[1, 2, 3]", ImportOptions::default())
                .unwrap_err(),
            ConfigError::UnrecognizedImportFormat
        ));
        assert!(matches!(
            manager
                .import(
                    r#"{"profile_name": "dev"}"#,
                    ImportOptions::default()
                )
                .unwrap_err(),
            ConfigError::BaseUrlRequired { .. }
        ));
    }

    #[test]
    fn validate_import_reports_errors_and_warnings() {
        let (_dir, manager) =
            manager_with_profile(Profile::new("prod", "https://api.example.com"));

        let ok = manager
            .validate_import(r#"{"profile_name": "dev", "base_url": "https://d.example.com"}"#)
            .unwrap();
        assert!(ok.is_valid());
        assert!(
            ok.warnings.iter().any(|w| w.contains("version")),
            "legacy warning expected: {:?}",
            ok.warnings
        );
        assert!(
            ok.warnings.iter().any(|w| w.contains("auth")),
            "auth warning expected: {:?}",
            ok.warnings
        );

        let clash = manager
            .validate_import(r#"{"profile_name": "prod", "base_url": "https://x.example.com"}"#)
            .unwrap();
        assert!(clash.warnings.iter().any(|w| w.contains("already exists")));

        let broken = manager.validate_import(r#"{"base_url": "https://x.example.com"}"#).unwrap();
        assert!(!broken.is_valid());
        assert!(broken.errors.iter().any(|e| e.contains("name")));
    }

    #[test]
    fn bulk_round_trip_skips_existing_without_overwrite() {
        let profile_a = Profile::new("a", "https://a.example.com").with_header("X-A", "1");
        let (_dir, mut manager) = manager_with_profile(profile_a);
        manager
            .record_mut()
            .add_profile(Profile::new("b", "https://b.example.com"));

        let doc = serde_json::to_string(&manager.export_all(&ExportOptions::default())).unwrap();

        // Into an app that already has "a".
        let (_dir2, mut target) =
            manager_with_profile(Profile::new("a", "https://other.example.com"));
        let report = target.import_bulk(&doc, false).unwrap();
        assert_eq!(report.imported, vec!["b".to_string()]);
        assert_eq!(report.skipped, vec!["a".to_string()]);
        assert_eq!(target.get("a").unwrap().base_url, "https://other.example.com");

        let report = target.import_bulk(&doc, true).unwrap();
        assert_eq!(report.imported.len(), 2);
        assert_eq!(target.get("a").unwrap().base_url, "https://a.example.com");
    }

    #[test]
    fn bulk_import_rejects_empty_documents() {
        let (_dir, mut manager) = empty_manager();
        assert!(matches!(
            manager.import_bulk(r#"{"version": "2.0"}"#, false).unwrap_err(),
            ConfigError::UnrecognizedImportFormat
        ));
    }
}
