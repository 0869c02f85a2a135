//! Cache metadata: the sidecar file describing a cached spec body.
//!
//! One `meta.json` per app, sibling of the cached body. It carries the
//! revalidation tokens (ETag, Last-Modified), freshness window, integrity
//! hash, the non-secret fetch descriptors needed to revalidate with the
//! same addressing, and an optional pointer to the parsed-form cache.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::SpecError;

/// Fallback freshness window when the server declares nothing.
pub const DEFAULT_TTL_SECS: i64 = 24 * 60 * 60;

/// On-disk format of a cached spec body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpecFormat {
    #[default]
    Yaml,
    Json,
}

impl SpecFormat {
    pub fn extension(self) -> &'static str {
        match self {
            SpecFormat::Yaml => "yaml",
            SpecFormat::Json => "json",
        }
    }
}

/// Sidecar metadata for one cached spec.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheMetadata {
    /// Source the body was fetched from (URL or local path).
    pub source_url: String,

    #[serde(default)]
    pub format: SpecFormat,

    /// HTTP revalidation tokens, verbatim from the response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,

    pub fetched_at: DateTime<Utc>,

    pub expires_at: DateTime<Utc>,

    /// Lowercase hex SHA-256 over the body file.
    pub content_hash: String,

    /// Body size in bytes.
    pub size: u64,

    /// Non-secret fetch descriptors, captured so a later revalidation can
    /// address the source the same way with a freshly resolved secret.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fetch_headers: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub fetch_auth_type: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub fetch_auth_key_name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub fetch_auth_location: String,

    /// Parsed-form cache pointer, set by `save_parsed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parsed_spec_path: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parsed_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub parser_version: String,
}

impl CacheMetadata {
    pub fn is_stale(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// Read metadata from disk. Absent and corrupt files both come back as
    /// `None`; a cache that cannot be trusted is treated as no cache.
    pub fn load(path: &Path) -> Option<CacheMetadata> {
        let text = fs::read_to_string(path).ok()?;
        match serde_json::from_str(&text) {
            Ok(meta) => Some(meta),
            Err(e) => {
                log::warn!(
                    "Ignoring corrupt cache metadata at {}: {e}",
                    path.display()
                );
                None
            }
        }
    }

    /// Write metadata atomically: serialize, write a `.tmp` sibling, rename
    /// onto the target. Readers see the old file or the new one, whole.
    pub fn save(&self, path: &Path) -> Result<(), SpecError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| SpecError::WriteFailed {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        let json = serde_json::to_string_pretty(self)?;
        let temp = path.with_extension("json.tmp");
        fs::write(&temp, &json).map_err(|e| SpecError::WriteFailed {
            path: temp.clone(),
            source: e,
        })?;
        if let Err(e) = fs::rename(&temp, path) {
            let _ = fs::remove_file(&temp);
            return Err(SpecError::WriteFailed {
                path: path.to_path_buf(),
                source: e,
            });
        }
        Ok(())
    }
}

/// One pass over a Cache-Control header value.
enum CacheDirective {
    MaxAge(u64),
    NoStore,
    Unspecified,
}

fn parse_cache_control(value: &str) -> CacheDirective {
    let mut max_age = None;
    let mut no_store = false;
    for directive in value.split(',') {
        let directive = directive.trim().to_ascii_lowercase();
        if let Some(seconds) = directive.strip_prefix("max-age=") {
            if let Ok(n) = seconds.trim().parse::<u64>() {
                max_age = Some(n);
            }
        } else if directive == "no-cache" || directive == "no-store" {
            no_store = true;
        }
    }
    // max-age outranks no-cache when a server sends both.
    match (max_age, no_store) {
        (Some(n), _) => CacheDirective::MaxAge(n),
        (None, true) => CacheDirective::NoStore,
        (None, false) => CacheDirective::Unspecified,
    }
}

/// Derive the expiry instant from response headers.
///
/// Priority: `Cache-Control: max-age=N`, then `no-cache`/`no-store`
/// (immediate expiry), then a parseable `Expires` date, then a 24-hour
/// default.
pub fn compute_expiry(
    now: DateTime<Utc>,
    cache_control: Option<&str>,
    expires: Option<&str>,
) -> DateTime<Utc> {
    if let Some(value) = cache_control {
        match parse_cache_control(value) {
            CacheDirective::MaxAge(n) => return now + Duration::seconds(n as i64),
            CacheDirective::NoStore => return now,
            CacheDirective::Unspecified => {}
        }
    }
    if let Some(value) = expires
        && let Ok(parsed) = DateTime::parse_from_rfc2822(value)
    {
        return parsed.with_timezone(&Utc);
    }
    now + Duration::seconds(DEFAULT_TTL_SECS)
}

/// Detect a fetched body's format from Content-Type, falling back to the
/// URL suffix, defaulting to YAML.
pub fn detect_format(content_type: Option<&str>, url: &str) -> SpecFormat {
    if let Some(ct) = content_type {
        let ct = ct.to_ascii_lowercase();
        if ct.contains("json") {
            return SpecFormat::Json;
        }
        if ct.contains("yaml") || ct.contains("yml") {
            return SpecFormat::Yaml;
        }
    }
    let path = url.split('?').next().unwrap_or(url);
    if path.ends_with(".json") {
        SpecFormat::Json
    } else {
        SpecFormat::Yaml
    }
}

/// Format of a local spec file, by extension.
pub fn format_for_path(path: &Path) -> SpecFormat {
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => SpecFormat::Json,
        _ => SpecFormat::Yaml,
    }
}
