//! On-disk application registry.
//!
//! Maps app names to application records at `<config_root>/apps/<name>.yaml`.
//! Saves are atomic: the record is written to a `.tmp` sibling and renamed
//! onto the target, so readers observe either the old file or the new one,
//! never a partial write.

use crate::error::ConfigError;
use crate::names::{validate_app_name, validate_profile_name};
use crate::paths;
use crate::record::{AppRecord, RECORD_SCHEMA_VERSION};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// File extension for application records; fixed for the deployment.
pub const RECORD_EXT: &str = "yaml";

/// Listing projection returned by [`AppRegistry::list_with_info`].
#[derive(Debug, Clone, Serialize)]
pub struct AppInfo {
    pub name: String,
    pub description: String,
    pub spec_source: String,
    pub default_profile: String,
    pub profile_count: usize,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Registry of installed applications, rooted at one config directory.
#[derive(Debug, Clone)]
pub struct AppRegistry {
    config_root: PathBuf,
}

impl AppRegistry {
    /// Open a registry rooted at an explicit directory. Nothing is created
    /// until the first save.
    pub fn new(config_root: impl Into<PathBuf>) -> Self {
        Self {
            config_root: config_root.into(),
        }
    }

    /// Open the registry at the platform config root (honoring the
    /// `APISH_CONFIG_DIR` override).
    pub fn open_default() -> Self {
        Self::new(paths::config_root())
    }

    pub fn config_root(&self) -> &Path {
        &self.config_root
    }

    /// Directory holding every record file.
    pub fn apps_dir(&self) -> PathBuf {
        paths::apps_dir(&self.config_root)
    }

    /// Path of one app's record file.
    pub fn record_path(&self, name: &str) -> PathBuf {
        self.apps_dir().join(format!("{name}.{RECORD_EXT}"))
    }

    /// Path of one app's cache directory.
    pub fn cache_dir(&self, name: &str) -> PathBuf {
        paths::app_cache_dir(&self.config_root, name)
    }

    /// Persist a record atomically.
    ///
    /// Validates the name, defaults the schema version, stamps `updated_at`
    /// (and `created_at` on first save), re-syncs per-profile names and
    /// default flags from the record's maps, then writes via temp + rename.
    ///
    /// # Errors
    ///
    /// Name validation errors, [`ConfigError::Yaml`] on serialization
    /// failure, or [`ConfigError::WriteFailed`] when the file cannot be
    /// written or renamed into place.
    pub fn save(&self, record: &mut AppRecord) -> Result<(), ConfigError> {
        validate_app_name(&record.name)?;

        if record.version.is_empty() {
            record.version = RECORD_SCHEMA_VERSION.to_string();
        }
        let now = Utc::now();
        record.updated_at = Some(now);
        if record.created_at.is_none() {
            record.created_at = Some(now);
        }

        // The profile map keys are authoritative for profile names and the
        // default pointer is authoritative for is_default flags.
        for (key, profile) in &mut record.profiles {
            profile.name = key.clone();
        }
        if !record.default_profile.is_empty() {
            let default = record.default_profile.clone();
            record.set_default_profile(&default);
        }

        let apps_dir = self.apps_dir();
        fs::create_dir_all(&apps_dir).map_err(|e| ConfigError::WriteFailed {
            path: apps_dir.display().to_string(),
            source: e,
        })?;

        let yaml = serde_yaml_ng::to_string(record)?;
        let path = self.record_path(&record.name);
        let temp_path = path.with_extension(format!("{RECORD_EXT}.tmp"));

        fs::write(&temp_path, &yaml).map_err(|e| ConfigError::WriteFailed {
            path: temp_path.display().to_string(),
            source: e,
        })?;
        if let Err(e) = fs::rename(&temp_path, &path) {
            // Best effort: don't leave the temp sibling behind.
            let _ = fs::remove_file(&temp_path);
            return Err(ConfigError::WriteFailed {
                path: path.display().to_string(),
                source: e,
            });
        }

        log::debug!("Saved app record {}", path.display());
        Ok(())
    }

    /// Persist a record only if no app with that name is installed yet.
    ///
    /// # Errors
    ///
    /// [`ConfigError::AppExists`] when a record file is already present;
    /// otherwise the same errors as [`AppRegistry::save`].
    pub fn save_new(&self, record: &mut AppRecord) -> Result<(), ConfigError> {
        validate_app_name(&record.name)?;
        if self.record_path(&record.name).exists() {
            return Err(ConfigError::AppExists {
                app: record.name.clone(),
            });
        }
        self.save(record)
    }

    /// Load one app's record.
    ///
    /// # Errors
    ///
    /// Name validation errors, [`ConfigError::AppNotFound`] when no record
    /// file exists, or [`ConfigError::Yaml`] when the file does not parse.
    pub fn load(&self, name: &str) -> Result<AppRecord, ConfigError> {
        validate_app_name(name)?;
        let path = self.record_path(name);
        if !path.exists() {
            return Err(ConfigError::AppNotFound {
                app: name.to_string(),
            });
        }
        let contents = fs::read_to_string(&path)?;
        let mut record: AppRecord = serde_yaml_ng::from_str(&contents)?;
        // The file stem is authoritative when the file omits the name.
        if record.name.is_empty() {
            record.name = name.to_string();
        }
        Ok(record)
    }

    /// Whether a record exists for `name`. Invalid names simply return false.
    pub fn exists(&self, name: &str) -> bool {
        validate_app_name(name).is_ok() && self.record_path(name).exists()
    }

    /// Remove one app's record file.
    ///
    /// The app's cache directory is left for the spec cache to clear; this
    /// removes only the record.
    ///
    /// # Errors
    ///
    /// [`ConfigError::AppNotFound`] when no record file exists.
    pub fn delete(&self, name: &str) -> Result<(), ConfigError> {
        validate_app_name(name)?;
        let path = self.record_path(name);
        if !path.exists() {
            return Err(ConfigError::AppNotFound {
                app: name.to_string(),
            });
        }
        fs::remove_file(&path)?;
        log::info!("Deleted app record {}", path.display());
        Ok(())
    }

    /// Installed app names, sorted.
    pub fn list(&self) -> Result<Vec<String>, ConfigError> {
        let apps_dir = self.apps_dir();
        if !apps_dir.exists() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(&apps_dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXT) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Listing projection for every installed app.
    ///
    /// Records that fail to parse are skipped with a warning so one corrupt
    /// file does not block the listing.
    pub fn list_with_info(&self) -> Result<Vec<AppInfo>, ConfigError> {
        let mut infos = Vec::new();
        for name in self.list()? {
            match self.load(&name) {
                Ok(record) => infos.push(AppInfo {
                    name: record.name.clone(),
                    description: record.description.clone(),
                    spec_source: record.spec_source.clone(),
                    default_profile: record.default_profile.clone(),
                    profile_count: record.profiles.len(),
                    created_at: record.created_at,
                    updated_at: record.updated_at,
                }),
                Err(e) => {
                    log::warn!("Skipping unreadable app record '{name}': {e}");
                }
            }
        }
        Ok(infos)
    }

    /// Composite record validation: name, at least one spec source, every
    /// profile named and reachable, and a default pointer that resolves.
    /// The first failing check wins.
    pub fn validate(&self, record: &AppRecord) -> Result<(), ConfigError> {
        validate_app_name(&record.name)?;

        if record.all_sources().is_empty() {
            return Err(ConfigError::SpecSourceRequired {
                app: record.name.clone(),
            });
        }

        for (name, profile) in &record.profiles {
            validate_profile_name(name)?;
            if profile.base_url.is_empty() {
                return Err(ConfigError::BaseUrlRequired {
                    profile: name.clone(),
                });
            }
        }

        if !record.default_profile.is_empty() && !record.has_profile(&record.default_profile) {
            return Err(ConfigError::DefaultProfileMissing {
                app: record.name.clone(),
                profile: record.default_profile.clone(),
            });
        }

        Ok(())
    }
}
