//! HTTP client helper with native-tls support.

use crate::error::SpecError;
use std::time::Duration;
use ureq::Agent;
use ureq::tls::{RootCerts, TlsConfig, TlsProvider};

/// Global timeout for all HTTP operations (30 seconds).
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum spec body size (10 MB). Specs beyond this are almost certainly
/// not OpenAPI documents.
pub const MAX_SPEC_SIZE: u64 = 10 * 1024 * 1024;

/// True when the source string addresses a remote spec rather than a
/// local file.
pub fn is_url(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

/// Validate a spec URL before any network request.
///
/// HTTPS is the norm; plain HTTP is tolerated (development servers, CI
/// stubs) but logged. Every other scheme is rejected.
pub fn validate_spec_url(url_str: &str) -> Result<url::Url, SpecError> {
    let parsed = url::Url::parse(url_str).map_err(|e| SpecError::InvalidSource {
        source: url_str.to_string(),
        reason: format!("invalid URL: {e}"),
    })?;

    match parsed.scheme() {
        "https" => {}
        "http" => {
            log::warn!("Fetching spec over plain HTTP: {url_str}");
        }
        scheme => {
            return Err(SpecError::InvalidSource {
                source: url_str.to_string(),
                reason: format!("scheme '{scheme}' is not supported; use https"),
            });
        }
    }
    Ok(parsed)
}

/// Create a new HTTP agent configured with native-tls and a global timeout.
///
/// Status codes are *not* mapped to errors by the agent: the cache needs to
/// see 304 (and classify 4xx/5xx itself), so only transport failures come
/// back as `Err`.
pub fn agent() -> Agent {
    let tls_config = TlsConfig::builder()
        .provider(TlsProvider::NativeTls)
        .root_certs(RootCerts::PlatformVerifier)
        .build();

    Agent::config_builder()
        .tls_config(tls_config)
        .timeout_global(Some(HTTP_TIMEOUT))
        .http_status_as_error(false)
        .build()
        .into()
}

/// Read a response body as text, bounded by [`MAX_SPEC_SIZE`].
pub fn read_body(
    response: ureq::http::Response<ureq::Body>,
    url: &str,
) -> Result<String, SpecError> {
    response
        .into_body()
        .with_config()
        .limit(MAX_SPEC_SIZE)
        .read_to_string()
        .map_err(|e| SpecError::Network {
            url: url.to_string(),
            source: Box::new(e),
        })
}
