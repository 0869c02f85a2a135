//! Profile manager: CRUD over one app's profiles.
//!
//! A manager is bound to a single app and works on an in-memory copy of its
//! record. Mutations stay in memory until `save()`; `reload()` discards them
//! in favor of the on-disk state. Two managers over the same app are not
//! synchronized; the atomic rename in the registry means the last save wins.
//!
//! Export and import live in the `export` module and hang off the same type.

use crate::error::ConfigError;
use crate::names::validate_profile_name;
use crate::record::{
    AppRecord, AuthConfig, DEFAULT_TIMEOUT_SECS, Profile, RetryConfig, SafetyConfig, TlsConfig,
};
use crate::registry::AppRegistry;
use crate::tls::validate_tls_set;
use std::collections::BTreeMap;

/// Options for [`ProfileManager::create`].
#[derive(Debug, Clone, Default)]
pub struct CreateProfileOptions {
    pub base_url: String,
    pub description: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub query_params: BTreeMap<String, String>,
    pub auth: Option<AuthConfig>,
    /// Defaults to [`DEFAULT_TIMEOUT_SECS`] when absent.
    pub timeout_secs: Option<u64>,
    pub set_as_default: bool,
}

/// Options for [`ProfileManager::update`]. Absent or empty fields leave the
/// profile untouched; header and query maps are merged into the existing
/// ones, new keys winning.
#[derive(Debug, Clone, Default)]
pub struct UpdateProfileOptions {
    pub base_url: Option<String>,
    pub description: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub query_params: BTreeMap<String, String>,
    pub auth: Option<AuthConfig>,
    pub timeout_secs: Option<u64>,
}

/// CRUD view over one app's profiles.
#[derive(Debug)]
pub struct ProfileManager {
    registry: AppRegistry,
    record: AppRecord,
}

impl ProfileManager {
    /// Load the app's record and bind a manager to it.
    pub fn load(registry: &AppRegistry, app: &str) -> Result<Self, ConfigError> {
        let record = registry.load(app)?;
        Ok(Self {
            registry: registry.clone(),
            record,
        })
    }

    /// Replace the in-memory copy with the current on-disk record,
    /// discarding unsaved changes.
    pub fn reload(&mut self) -> Result<(), ConfigError> {
        self.record = self.registry.load(&self.record.name)?;
        Ok(())
    }

    /// Persist the in-memory record (stamps `updated_at`).
    pub fn save(&mut self) -> Result<(), ConfigError> {
        self.registry.save(&mut self.record)
    }

    pub fn app_name(&self) -> &str {
        &self.record.name
    }

    pub fn record(&self) -> &AppRecord {
        &self.record
    }

    /// Profile names in stable (sorted) order.
    pub fn list(&self) -> Vec<String> {
        self.record.profile_names()
    }

    pub fn get(&self, name: &str) -> Result<&Profile, ConfigError> {
        self.record
            .profile(name)
            .ok_or_else(|| self.not_found(name))
    }

    /// The default profile, when the record has one.
    pub fn get_default(&self) -> Option<&Profile> {
        self.record.profile(&self.record.default_profile)
    }

    /// Resolve the working profile: an explicit name wins, otherwise the
    /// record's default.
    ///
    /// # Errors
    ///
    /// [`ConfigError::ProfileNotFound`] when the explicit name is unknown or
    /// when no default resolves.
    pub fn select(&self, explicit: Option<&str>) -> Result<&Profile, ConfigError> {
        match explicit {
            Some(name) => self.get(name),
            None => self
                .get_default()
                .ok_or_else(|| self.not_found(&self.record.default_profile)),
        }
    }

    /// Create a profile.
    ///
    /// The first profile of an app always becomes the default, as does any
    /// profile created with `set_as_default`.
    pub fn create(&mut self, name: &str, options: CreateProfileOptions) -> Result<(), ConfigError> {
        validate_profile_name(name)?;
        if self.record.has_profile(name) {
            return Err(ConfigError::ProfileExists {
                app: self.record.name.clone(),
                profile: name.to_string(),
            });
        }
        if options.base_url.is_empty() {
            return Err(ConfigError::BaseUrlRequired {
                profile: name.to_string(),
            });
        }

        let mut profile = Profile::new(name, options.base_url);
        profile.description = options.description;
        profile.headers = options.headers;
        profile.query_params = options.query_params;
        if let Some(auth) = options.auth {
            profile.auth = auth;
        }
        profile.timeout_secs = options.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);

        self.record.add_profile(profile);
        if options.set_as_default {
            self.record.set_default_profile(name);
        }
        log::info!(
            "Created profile '{}' for app '{}'",
            name,
            self.record.name
        );
        Ok(())
    }

    /// Partially update a profile. See [`UpdateProfileOptions`] for the
    /// merge rules; headers can be added or overridden here but never
    /// removed, that is what [`ProfileManager::delete_header`] is for.
    pub fn update(&mut self, name: &str, options: UpdateProfileOptions) -> Result<(), ConfigError> {
        let app = self.record.name.clone();
        let profile = self
            .record
            .profile_mut(name)
            .ok_or(ConfigError::ProfileNotFound {
                app,
                profile: name.to_string(),
            })?;

        if let Some(base_url) = options.base_url
            && !base_url.is_empty()
        {
            profile.base_url = base_url;
        }
        if let Some(description) = options.description
            && !description.is_empty()
        {
            profile.description = Some(description);
        }
        profile.headers.extend(options.headers);
        profile.query_params.extend(options.query_params);
        if let Some(auth) = options.auth {
            profile.auth = auth;
        }
        if let Some(timeout_secs) = options.timeout_secs {
            profile.timeout_secs = timeout_secs;
        }
        Ok(())
    }

    /// Delete a profile.
    ///
    /// The last remaining profile cannot be deleted. Deleting the default
    /// promotes one of the survivors; which one is unspecified and callers
    /// must not rely on it.
    pub fn delete(&mut self, name: &str) -> Result<(), ConfigError> {
        if !self.record.has_profile(name) {
            return Err(self.not_found(name));
        }
        if self.record.profiles.len() == 1 {
            return Err(ConfigError::LastProfileDeletion {
                app: self.record.name.clone(),
            });
        }

        self.record.profiles.remove(name);
        if self.record.default_profile == name {
            let survivor = self
                .record
                .profiles
                .keys()
                .next()
                .cloned()
                .unwrap_or_default();
            self.record.set_default_profile(&survivor);
            log::info!(
                "Deleted default profile '{}' of app '{}'; promoted '{}'",
                name,
                self.record.name,
                survivor
            );
        } else {
            log::info!("Deleted profile '{}' of app '{}'", name, self.record.name);
        }
        Ok(())
    }

    /// Rename a profile, carrying the default pointer along when needed.
    pub fn rename(&mut self, old: &str, new: &str) -> Result<(), ConfigError> {
        validate_profile_name(new)?;
        if self.record.has_profile(new) {
            return Err(ConfigError::ProfileExists {
                app: self.record.name.clone(),
                profile: new.to_string(),
            });
        }
        let Some(mut profile) = self.record.profiles.remove(old) else {
            return Err(self.not_found(old));
        };
        profile.name = new.to_string();
        self.record.profiles.insert(new.to_string(), profile);
        if self.record.default_profile == old {
            self.record.set_default_profile(new);
        }
        Ok(())
    }

    /// Deep-copy a profile under a new name. The copy never inherits default
    /// status. Profiles hold no credential material, so there is nothing to
    /// scrub.
    pub fn copy(&mut self, src: &str, dst: &str) -> Result<(), ConfigError> {
        validate_profile_name(dst)?;
        if self.record.has_profile(dst) {
            return Err(ConfigError::ProfileExists {
                app: self.record.name.clone(),
                profile: dst.to_string(),
            });
        }
        let mut copied = self.get(src)?.clone();
        copied.name = dst.to_string();
        copied.is_default = false;
        self.record.profiles.insert(dst.to_string(), copied);
        Ok(())
    }

    /// Point the default at an existing profile.
    pub fn set_default(&mut self, name: &str) -> Result<(), ConfigError> {
        if !self.record.has_profile(name) {
            return Err(self.not_found(name));
        }
        self.record.set_default_profile(name);
        Ok(())
    }

    pub fn set_header(
        &mut self,
        profile: &str,
        name: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let app = self.record.name.clone();
        let p = self
            .record
            .profile_mut(profile)
            .ok_or(ConfigError::ProfileNotFound {
                app,
                profile: profile.to_string(),
            })?;
        p.headers.insert(name.to_string(), value.to_string());
        Ok(())
    }

    /// Remove a header. Removing a header that is not set is a no-op.
    pub fn delete_header(&mut self, profile: &str, name: &str) -> Result<(), ConfigError> {
        let app = self.record.name.clone();
        let p = self
            .record
            .profile_mut(profile)
            .ok_or(ConfigError::ProfileNotFound {
                app,
                profile: profile.to_string(),
            })?;
        p.headers.remove(name);
        Ok(())
    }

    pub fn set_query_param(
        &mut self,
        profile: &str,
        name: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let app = self.record.name.clone();
        let p = self
            .record
            .profile_mut(profile)
            .ok_or(ConfigError::ProfileNotFound {
                app,
                profile: profile.to_string(),
            })?;
        p.query_params.insert(name.to_string(), value.to_string());
        Ok(())
    }

    /// Install a TLS configuration after validating the referenced files
    /// and the cert/key pairing rule.
    pub fn configure_tls(&mut self, profile: &str, tls: TlsConfig) -> Result<(), ConfigError> {
        validate_tls_set(
            tls.ca_bundle.as_deref(),
            tls.client_cert.as_deref(),
            tls.client_key.as_deref(),
        )?;
        let app = self.record.name.clone();
        let p = self
            .record
            .profile_mut(profile)
            .ok_or(ConfigError::ProfileNotFound {
                app,
                profile: profile.to_string(),
            })?;
        p.tls = Some(tls);
        Ok(())
    }

    pub fn configure_safety(
        &mut self,
        profile: &str,
        safety: SafetyConfig,
    ) -> Result<(), ConfigError> {
        let app = self.record.name.clone();
        let p = self
            .record
            .profile_mut(profile)
            .ok_or(ConfigError::ProfileNotFound {
                app,
                profile: profile.to_string(),
            })?;
        p.safety = Some(safety);
        Ok(())
    }

    pub fn configure_retry(
        &mut self,
        profile: &str,
        retry: RetryConfig,
    ) -> Result<(), ConfigError> {
        let app = self.record.name.clone();
        let p = self
            .record
            .profile_mut(profile)
            .ok_or(ConfigError::ProfileNotFound {
                app,
                profile: profile.to_string(),
            })?;
        p.retry = Some(retry);
        Ok(())
    }

    pub(crate) fn record_mut(&mut self) -> &mut AppRecord {
        &mut self.record
    }

    fn not_found(&self, profile: &str) -> ConfigError {
        ConfigError::ProfileNotFound {
            app: self.record.name.clone(),
            profile: profile.to_string(),
        }
    }
}
