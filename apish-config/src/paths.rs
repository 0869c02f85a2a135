//! Platform path resolution and defensive validation of user-supplied paths.
//!
//! Everything apish persists lives under a single config root. The root is
//! overridable through `APISH_CONFIG_DIR` so tests and portable installs can
//! relocate it; otherwise it follows each platform's convention. Layout
//! helpers below are the single source of truth for where records and cache
//! directories sit under that root.

use crate::error::ConfigError;
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable that overrides the config root.
pub const CONFIG_DIR_ENV: &str = "APISH_CONFIG_DIR";

/// Directory name used under platform config/data roots.
const APP_DIR_NAME: &str = "apish";

/// Resolve the configuration root directory.
///
/// Precedence: `APISH_CONFIG_DIR` (with `~` expansion), then the platform
/// default (macOS: `~/Library/Application Support/apish`; Windows:
/// `%APPDATA%\apish`; elsewhere `$XDG_CONFIG_HOME/apish` falling back to
/// `~/.config/apish`). The directory is not created here; writers create it
/// on demand.
pub fn config_root() -> PathBuf {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV)
        && !dir.is_empty()
    {
        return expand_home_dir(&dir);
    }
    default_config_root()
}

fn default_config_root() -> PathBuf {
    #[cfg(target_os = "macos")]
    {
        if let Some(home) = dirs::home_dir() {
            home.join("Library")
                .join("Application Support")
                .join(APP_DIR_NAME)
        } else {
            PathBuf::from(APP_DIR_NAME)
        }
    }
    #[cfg(target_os = "windows")]
    {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join(APP_DIR_NAME)
        } else if let Some(home) = dirs::home_dir() {
            home.join(APP_DIR_NAME)
        } else {
            PathBuf::from(APP_DIR_NAME)
        }
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME")
            && !xdg.is_empty()
        {
            return PathBuf::from(xdg).join(APP_DIR_NAME);
        }
        if let Some(home) = dirs::home_dir() {
            home.join(".config").join(APP_DIR_NAME)
        } else {
            PathBuf::from(APP_DIR_NAME)
        }
    }
}

/// Resolve the directory where generated command shims are installed.
///
/// Windows: `%LOCALAPPDATA%\apish\bin`; everywhere else `~/.local/bin`,
/// which most shells already have on `PATH`.
pub fn shim_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Some(data_dir) = dirs::data_local_dir() {
            data_dir.join(APP_DIR_NAME).join("bin")
        } else if let Some(home) = dirs::home_dir() {
            home.join(APP_DIR_NAME).join("bin")
        } else {
            PathBuf::from("bin")
        }
    }
    #[cfg(not(target_os = "windows"))]
    {
        if let Some(home) = dirs::home_dir() {
            home.join(".local").join("bin")
        } else {
            PathBuf::from("bin")
        }
    }
}

/// Directory holding all application records.
pub fn apps_dir(config_root: &Path) -> PathBuf {
    config_root.join("apps")
}

/// Per-app cache directory (sibling of the record, named after the app).
pub fn app_cache_dir(config_root: &Path, app: &str) -> PathBuf {
    apps_dir(config_root).join(app).join("cache")
}

/// Expand a leading `~` or `~/` to the user's home directory.
///
/// Paths without the prefix, and systems where the home directory cannot be
/// determined, pass through unchanged.
pub fn expand_home_dir(path: &str) -> PathBuf {
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    } else if let Some(rest) = path.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    PathBuf::from(path)
}

/// Validate a user-supplied file path and resolve it to absolute form.
///
/// Expands `~`, absolutizes against the current directory, then requires
/// that the target exists, is a regular file, and can actually be opened for
/// reading. Used for spec sources, CA bundles, and client cert/key paths
/// before they are stored in a profile.
///
/// # Errors
///
/// Returns [`ConfigError::PathValidation`] naming the path and the first
/// check that failed.
pub fn validate_and_resolve(path: &str) -> Result<PathBuf, ConfigError> {
    if path.trim().is_empty() {
        return Err(ConfigError::PathValidation {
            path: path.to_string(),
            reason: "path is empty".to_string(),
            source: None,
        });
    }

    let expanded = expand_home_dir(path);
    let absolute = if expanded.is_absolute() {
        expanded
    } else {
        let cwd = std::env::current_dir().map_err(|e| ConfigError::PathValidation {
            path: path.to_string(),
            reason: "could not determine current directory".to_string(),
            source: Some(e),
        })?;
        cwd.join(expanded)
    };

    let metadata = fs::metadata(&absolute).map_err(|e| ConfigError::PathValidation {
        path: absolute.display().to_string(),
        reason: "file does not exist".to_string(),
        source: Some(e),
    })?;

    if metadata.is_dir() {
        return Err(ConfigError::PathValidation {
            path: absolute.display().to_string(),
            reason: "path is a directory, expected a file".to_string(),
            source: None,
        });
    }
    if !metadata.is_file() {
        return Err(ConfigError::PathValidation {
            path: absolute.display().to_string(),
            reason: "path is not a regular file".to_string(),
            source: None,
        });
    }

    // Open-for-read probe: existence alone does not prove the current user
    // may actually read it.
    fs::File::open(&absolute).map_err(|e| ConfigError::PathValidation {
        path: absolute.display().to_string(),
        reason: "file is not readable".to_string(),
        source: Some(e),
    })?;

    Ok(absolute)
}
