//! Spec cache with conditional HTTP revalidation.
//!
//! One cache directory per app (`<config_root>/apps/<app>/cache/`) holding
//! the spec body, its metadata sidecar, and optionally a parsed form. Remote
//! sources go through the full conditional-request protocol (ETag /
//! Last-Modified revalidation, Cache-Control freshness, stale-serve on
//! network failure). Local paths are authoritative: the body is never
//! copied, only a metadata fingerprint is kept so the parsed-form cache can
//! tell when the source file changed.
//!
//! No locking across operations; a cache instance is single-writer by
//! convention. Atomic renames keep concurrent readers consistent.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use apish_config::{FetchAuth, Profile, paths};
use base64::Engine as _;

use crate::error::SpecError;
use crate::hash::{sha256_file, sha256_hex};
use crate::http;
use crate::meta::{CacheMetadata, SpecFormat, compute_expiry, detect_format, format_for_path};

/// Version stamped into parsed-form metadata. A parsed cache written by a
/// different parser version is discarded.
pub const PARSER_VERSION: &str = "1.0";

const META_FILE: &str = "meta.json";
const PARSED_FILE: &str = "parsed.json";

/// Non-secret options applied to spec fetch requests.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Extra request headers.
    pub headers: BTreeMap<String, String>,
    /// Auth descriptor with its secret resolved by the caller.
    pub auth: Option<FetchAuth>,
}

impl FetchOptions {
    /// Fetch options recorded on a profile (for private spec sources). The
    /// auth descriptor comes back without its secret; the caller resolves
    /// that from the keyring.
    pub fn from_profile(profile: &Profile) -> Self {
        Self {
            headers: profile.spec_fetch_headers.clone(),
            auth: profile.spec_fetch_auth.clone(),
        }
    }

    /// Merge per-call overrides onto these options. Header maps union with
    /// override values winning; an override that specifies auth replaces the
    /// auth tuple wholesale.
    pub fn merged_with(&self, overrides: &FetchOptions) -> FetchOptions {
        let mut headers = self.headers.clone();
        headers.extend(
            overrides
                .headers
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        FetchOptions {
            headers,
            auth: overrides.auth.clone().or_else(|| self.auth.clone()),
        }
    }
}

/// Outcome of a fetch: the body plus where it came from.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub content: String,
    pub format: SpecFormat,
    /// True when the body was served from the cache (fresh hit, 304
    /// revalidation, or stale-serve).
    pub from_cache: bool,
    /// Set when the body is a stale cache served because the network failed.
    pub cache_warning: Option<String>,
}

/// Projection of one app's cache state for listings.
#[derive(Debug, Clone, Serialize)]
pub struct CacheInfo {
    pub app: String,
    pub source_url: String,
    pub format: SpecFormat,
    pub fetched_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub size: u64,
    pub content_hash: String,
    pub is_stale: bool,
    pub has_parsed: bool,
}

impl CacheInfo {
    /// Time elapsed since the body was fetched.
    pub fn age(&self) -> Duration {
        Utc::now() - self.fetched_at
    }
}

/// Per-app spec cache rooted at a config directory.
pub struct SpecCache {
    config_root: PathBuf,
    agent: ureq::Agent,
    user_agent: String,
    default_options: FetchOptions,
}

impl SpecCache {
    pub fn new(config_root: impl Into<PathBuf>) -> Self {
        Self {
            config_root: config_root.into(),
            agent: http::agent(),
            user_agent: concat!("apish/", env!("CARGO_PKG_VERSION")).to_string(),
            default_options: FetchOptions::default(),
        }
    }

    /// Cache rooted at the platform config directory.
    pub fn open_default() -> Self {
        Self::new(paths::config_root())
    }

    /// Override the User-Agent (the host binary passes its own version).
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Install app-wide fetch options (e.g. auth for a private spec host).
    pub fn with_default_options(mut self, options: FetchOptions) -> Self {
        self.default_options = options;
        self
    }

    pub fn cache_dir(&self, app: &str) -> PathBuf {
        paths::app_cache_dir(&self.config_root, app)
    }

    fn meta_path(&self, app: &str) -> PathBuf {
        self.cache_dir(app).join(META_FILE)
    }

    fn body_path(&self, app: &str, format: SpecFormat) -> PathBuf {
        self.cache_dir(app).join(format!("spec.{}", format.extension()))
    }

    fn parsed_path(&self, app: &str) -> PathBuf {
        self.cache_dir(app).join(PARSED_FILE)
    }

    /// Fetch a spec with the cache's default options.
    pub fn fetch(&self, app: &str, source: &str) -> Result<FetchResult, SpecError> {
        self.fetch_with_options(app, source, &FetchOptions::default())
    }

    /// Fetch a spec, merging per-call options over the defaults.
    pub fn fetch_with_options(
        &self,
        app: &str,
        source: &str,
        overrides: &FetchOptions,
    ) -> Result<FetchResult, SpecError> {
        let options = self.default_options.merged_with(overrides);
        if http::is_url(source) {
            self.fetch_remote(app, source, &options)
        } else {
            self.fetch_local(app, source)
        }
    }

    /// Drop any cached state and fetch fresh.
    pub fn refresh(&self, app: &str, source: &str) -> Result<FetchResult, SpecError> {
        self.clear(app)?;
        self.fetch(app, source)
    }

    /// Remove the app's cache directory. Idempotent.
    pub fn clear(&self, app: &str) -> Result<(), SpecError> {
        let dir = self.cache_dir(app);
        match fs::remove_dir_all(&dir) {
            Ok(()) => {
                log::debug!("Cleared spec cache for '{app}'");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SpecError::Io(e)),
        }
    }

    /// Clear the cache of every registered app. Returns how many were
    /// cleared.
    pub fn clear_all(&self) -> Result<usize, SpecError> {
        let registry = apish_config::AppRegistry::new(&self.config_root);
        let mut cleared = 0;
        for app in registry.list()? {
            if self.meta_path(&app).exists() {
                self.clear(&app)?;
                cleared += 1;
            }
        }
        Ok(cleared)
    }

    /// Cache state for one app, or [`SpecError::NotCached`].
    pub fn get_info(&self, app: &str) -> Result<CacheInfo, SpecError> {
        let meta = CacheMetadata::load(&self.meta_path(app)).ok_or_else(|| {
            SpecError::NotCached {
                app: app.to_string(),
            }
        })?;
        let has_parsed = meta
            .parsed_spec_path
            .as_deref()
            .is_some_and(Path::exists);
        Ok(CacheInfo {
            app: app.to_string(),
            source_url: meta.source_url.clone(),
            format: meta.format,
            fetched_at: meta.fetched_at,
            expires_at: meta.expires_at,
            size: meta.size,
            content_hash: meta.content_hash.clone(),
            is_stale: meta.is_stale(),
            has_parsed,
        })
    }

    /// Apps with a cache metadata file, sorted.
    pub fn list_cached_apps(&self) -> Vec<String> {
        let apps_dir = paths::apps_dir(&self.config_root);
        let Ok(entries) = fs::read_dir(&apps_dir) else {
            return Vec::new();
        };
        let mut apps: Vec<String> = entries
            .flatten()
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| self.meta_path(name).exists())
            .collect();
        apps.sort();
        apps
    }

    // ---- parsed-form cache ----

    /// Store the external parser's output next to the cached body and point
    /// the metadata at it. Requires a prior fetch (the metadata must exist).
    pub fn save_parsed(
        &self,
        app: &str,
        parsed: &serde_json::Value,
    ) -> Result<PathBuf, SpecError> {
        let meta_path = self.meta_path(app);
        let mut meta =
            CacheMetadata::load(&meta_path).ok_or_else(|| SpecError::NotCached {
                app: app.to_string(),
            })?;

        let path = self.parsed_path(app);
        let json = serde_json::to_string(parsed)?;
        let temp = path.with_extension("json.tmp");
        fs::write(&temp, &json).map_err(|e| SpecError::WriteFailed {
            path: temp.clone(),
            source: e,
        })?;
        if let Err(e) = fs::rename(&temp, &path) {
            let _ = fs::remove_file(&temp);
            return Err(SpecError::WriteFailed {
                path: path.clone(),
                source: e,
            });
        }

        meta.parsed_spec_path = Some(path.clone());
        meta.parsed_at = Some(Utc::now());
        meta.parser_version = PARSER_VERSION.to_string();
        meta.save(&meta_path)?;
        Ok(path)
    }

    /// Load the parsed form if it is still valid, else `None`.
    pub fn load_parsed(&self, app: &str) -> Result<Option<serde_json::Value>, SpecError> {
        if !self.validate_parsed(app) {
            return Ok(None);
        }
        let Some(meta) = CacheMetadata::load(&self.meta_path(app)) else {
            return Ok(None);
        };
        let Some(path) = meta.parsed_spec_path else {
            return Ok(None);
        };
        let text = fs::read_to_string(&path)?;
        match serde_json::from_str(&text) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                log::warn!(
                    "Ignoring corrupt parsed spec at {}: {e}",
                    path.display()
                );
                Ok(None)
            }
        }
    }

    /// True iff the parsed-form cache can be used as-is: pointer set, parser
    /// version current, file present, source unchanged (local sources are
    /// re-hashed), and the cache not TTL-stale.
    pub fn validate_parsed(&self, app: &str) -> bool {
        let Some(meta) = CacheMetadata::load(&self.meta_path(app)) else {
            return false;
        };
        let Some(parsed_path) = &meta.parsed_spec_path else {
            return false;
        };
        if meta.parser_version != PARSER_VERSION || !parsed_path.exists() {
            return false;
        }
        if !http::is_url(&meta.source_url) {
            match sha256_file(Path::new(&meta.source_url)) {
                Ok(hash) if hash == meta.content_hash => {}
                _ => return false,
            }
        }
        !meta.is_stale()
    }

    // ---- fetch paths ----

    /// Local files are authoritative: read, hash, and persist a metadata
    /// fingerprint (24 h synthetic TTL) so the parsed-form cache can detect
    /// source changes. The body itself is never cached.
    fn fetch_local(&self, app: &str, source: &str) -> Result<FetchResult, SpecError> {
        let path = apish_config::validate_and_resolve(source)?;
        let content = fs::read_to_string(&path)?;
        let format = format_for_path(&path);
        let now = Utc::now();

        let content_hash = sha256_hex(content.as_bytes());
        let meta_path = self.meta_path(app);
        // The parsed-form pointer survives a refetch only while the content
        // it was parsed from is still what is on disk.
        let previous = CacheMetadata::load(&meta_path)
            .filter(|meta| meta.content_hash == content_hash)
            .unwrap_or_default();
        let meta = CacheMetadata {
            source_url: path.to_string_lossy().into_owned(),
            format,
            etag: None,
            last_modified: None,
            fetched_at: now,
            expires_at: now + Duration::seconds(crate::meta::DEFAULT_TTL_SECS),
            content_hash,
            size: content.len() as u64,
            parsed_spec_path: previous.parsed_spec_path,
            parsed_at: previous.parsed_at,
            parser_version: previous.parser_version,
            ..Default::default()
        };
        meta.save(&meta_path)?;

        Ok(FetchResult {
            content,
            format,
            from_cache: false,
            cache_warning: None,
        })
    }

    fn fetch_remote(
        &self,
        app: &str,
        source: &str,
        options: &FetchOptions,
    ) -> Result<FetchResult, SpecError> {
        http::validate_spec_url(source)?;

        let meta_path = self.meta_path(app);
        let existing =
            CacheMetadata::load(&meta_path).filter(|meta| meta.source_url == source);

        // Fresh hit: unexpired metadata for this source with an intact body.
        if let Some(meta) = &existing
            && !meta.is_stale()
            && let Some(body) = self.read_cached_body(app, meta)
        {
            log::debug!("Spec cache hit for '{app}'");
            return Ok(FetchResult {
                content: body,
                format: meta.format,
                from_cache: true,
                cache_warning: None,
            });
        }

        let response = match self.send_request(source, options, existing.as_ref()) {
            Ok(response) => response,
            Err(e) => {
                // Stale-serve: degraded but usable beats nothing.
                if let Some(meta) = &existing
                    && let Some(body) = self.read_cached_body(app, meta)
                {
                    log::warn!("Serving stale cached spec for '{app}': {e}");
                    return Ok(FetchResult {
                        content: body,
                        format: meta.format,
                        from_cache: true,
                        cache_warning: Some(format!(
                            "using cached spec from {}; fetch failed: {e}",
                            meta.fetched_at.to_rfc3339()
                        )),
                    });
                }
                return Err(SpecError::Network {
                    url: source.to_string(),
                    source: Box::new(e),
                });
            }
        };

        let status = response.status();
        match status.as_u16() {
            304 => {
                if let Some(mut meta) = existing {
                    if let Some(body) = self.read_cached_body(app, &meta) {
                        let headers = ResponseHeaders::capture(&response);
                        meta.expires_at = compute_expiry(
                            Utc::now(),
                            headers.cache_control.as_deref(),
                            headers.expires.as_deref(),
                        );
                        if headers.etag.is_some() {
                            meta.etag = headers.etag;
                        }
                        if headers.last_modified.is_some() {
                            meta.last_modified = headers.last_modified;
                        }
                        meta.save(&meta_path)?;
                        log::debug!("Spec for '{app}' revalidated (304)");
                        return Ok(FetchResult {
                            content: body,
                            format: meta.format,
                            from_cache: true,
                            cache_warning: None,
                        });
                    }
                }
                // 304 with no usable local body: the conditional tokens lied
                // about our state. Refetch unconditionally.
                log::warn!("Got 304 for '{app}' but no cached body; refetching");
                let response = self
                    .send_request(source, options, None)
                    .map_err(|e| SpecError::Network {
                        url: source.to_string(),
                        source: Box::new(e),
                    })?;
                if response.status().as_u16() != 200 {
                    let status = response.status();
                    return Err(SpecError::HttpStatus {
                        code: status.as_u16(),
                        status: status.canonical_reason().unwrap_or("").to_string(),
                    });
                }
                self.store_response(app, source, options, response)
            }
            200 => self.store_response(app, source, options, response),
            code => Err(SpecError::HttpStatus {
                code,
                status: status.canonical_reason().unwrap_or("").to_string(),
            }),
        }
    }

    fn send_request(
        &self,
        source: &str,
        options: &FetchOptions,
        revalidate: Option<&CacheMetadata>,
    ) -> Result<ureq::http::Response<ureq::Body>, ureq::Error> {
        let mut request = self
            .agent
            .get(source)
            .header(
                "Accept",
                "application/json, application/yaml, text/yaml, */*",
            )
            .header("User-Agent", &self.user_agent);

        if let Some(meta) = revalidate {
            if let Some(etag) = &meta.etag {
                request = request.header("If-None-Match", etag);
            }
            if let Some(last_modified) = &meta.last_modified {
                request = request.header("If-Modified-Since", last_modified);
            }
        }
        for (name, value) in &options.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(auth) = &options.auth {
            request = apply_auth(request, auth);
        }
        request.call()
    }

    fn store_response(
        &self,
        app: &str,
        source: &str,
        options: &FetchOptions,
        response: ureq::http::Response<ureq::Body>,
    ) -> Result<FetchResult, SpecError> {
        let headers = ResponseHeaders::capture(&response);
        let body = http::read_body(response, source)?;

        let format = detect_format(headers.content_type.as_deref(), source);
        let now = Utc::now();
        let (auth_type, auth_key_name, auth_location) = match &options.auth {
            Some(auth) => (
                auth.auth_type.clone(),
                auth.key_name.clone(),
                auth.location.clone(),
            ),
            None => Default::default(),
        };
        let meta = CacheMetadata {
            source_url: source.to_string(),
            format,
            etag: headers.etag,
            last_modified: headers.last_modified,
            fetched_at: now,
            expires_at: compute_expiry(
                now,
                headers.cache_control.as_deref(),
                headers.expires.as_deref(),
            ),
            content_hash: sha256_hex(body.as_bytes()),
            size: body.len() as u64,
            fetch_headers: options.headers.clone(),
            fetch_auth_type: auth_type,
            fetch_auth_key_name: auth_key_name,
            fetch_auth_location: auth_location,
            parsed_spec_path: None,
            parsed_at: None,
            parser_version: String::new(),
        };

        self.persist_body(app, format, &body)?;
        meta.save(&self.meta_path(app))?;
        log::info!(
            "Cached spec for '{app}' ({} bytes, expires {})",
            meta.size,
            meta.expires_at.to_rfc3339()
        );

        Ok(FetchResult {
            content: body,
            format,
            from_cache: false,
            cache_warning: None,
        })
    }

    fn persist_body(&self, app: &str, format: SpecFormat, body: &str) -> Result<(), SpecError> {
        let path = self.body_path(app, format);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| SpecError::WriteFailed {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        let temp = path.with_extension(format!("{}.tmp", format.extension()));
        fs::write(&temp, body).map_err(|e| SpecError::WriteFailed {
            path: temp.clone(),
            source: e,
        })?;
        if let Err(e) = fs::rename(&temp, &path) {
            let _ = fs::remove_file(&temp);
            return Err(SpecError::WriteFailed { path, source: e });
        }
        // A format flip (yaml -> json or back) must not leave the old body
        // around to shadow the new one.
        let other = match format {
            SpecFormat::Yaml => self.body_path(app, SpecFormat::Json),
            SpecFormat::Json => self.body_path(app, SpecFormat::Yaml),
        };
        let _ = fs::remove_file(other);
        Ok(())
    }

    /// Read the cached body and verify its hash against the metadata. Any
    /// mismatch or read failure is treated as "no cached body".
    fn read_cached_body(&self, app: &str, meta: &CacheMetadata) -> Option<String> {
        let path = self.body_path(app, meta.format);
        let body = fs::read_to_string(&path).ok()?;
        if sha256_hex(body.as_bytes()) == meta.content_hash {
            Some(body)
        } else {
            log::debug!(
                "Cached body hash mismatch for '{app}'; refetching from source"
            );
            None
        }
    }
}

/// Response headers the cache cares about, captured before the body is
/// consumed.
struct ResponseHeaders {
    etag: Option<String>,
    last_modified: Option<String>,
    cache_control: Option<String>,
    expires: Option<String>,
    content_type: Option<String>,
}

impl ResponseHeaders {
    fn capture(response: &ureq::http::Response<ureq::Body>) -> Self {
        let header = |name: &str| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(String::from)
        };
        Self {
            etag: header("etag"),
            last_modified: header("last-modified"),
            cache_control: header("cache-control"),
            expires: header("expires"),
            content_type: header("content-type"),
        }
    }
}

fn apply_auth(
    request: ureq::RequestBuilder<ureq::typestate::WithoutBody>,
    auth: &FetchAuth,
) -> ureq::RequestBuilder<ureq::typestate::WithoutBody> {
    let Some(value) = &auth.value else {
        log::warn!(
            "Spec fetch auth '{}' has no resolved secret; sending unauthenticated",
            auth.auth_type
        );
        return request;
    };
    match auth.auth_type.as_str() {
        "bearer" => request.header("Authorization", format!("Bearer {value}")),
        "basic" => {
            let encoded = base64::engine::general_purpose::STANDARD.encode(value);
            request.header("Authorization", format!("Basic {encoded}"))
        }
        "api_key" => {
            let key_name = if auth.key_name.is_empty() {
                "X-API-Key"
            } else {
                auth.key_name.as_str()
            };
            if auth.location == "query" {
                request.query(key_name, value)
            } else {
                request.header(key_name, value.as_str())
            }
        }
        other => {
            log::warn!("Unknown spec fetch auth type '{other}'; sending unauthenticated");
            request
        }
    }
}
