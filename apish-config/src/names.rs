//! App and profile name validation.
//!
//! App names become shell commands and registry file stems, so the rules are
//! strict: start with an ASCII letter, continue with letters, digits,
//! hyphen, or underscore, at most 64 characters, and never a word the apish
//! binary itself claims. Validation rejects; it never truncates or rewrites.

use crate::error::ConfigError;

/// Maximum length of an app or profile name, in bytes.
pub const MAX_NAME_LEN: usize = 64;

/// Command words reserved for the apish binary and its built-in subcommands.
///
/// An installed app shadows nothing: a record named `list` would make
/// `apish list` ambiguous, so these are rejected at save time
/// (case-insensitive).
pub const RESERVED_NAMES: &[&str] = &[
    "apish",
    "api",
    "cache",
    "completion",
    "config",
    "help",
    "import",
    "install",
    "list",
    "profile",
    "self",
    "spec",
    "uninstall",
    "update",
    "upgrade",
    "version",
    "watch",
];

/// Check the shared character-class rules for app and profile names.
///
/// Returns the broken rule as a human-readable string, or `None` when the
/// name is acceptable.
fn name_rule_violation(name: &str) -> Option<String> {
    if name.is_empty() {
        return Some("name must not be empty".to_string());
    }
    if name.len() > MAX_NAME_LEN {
        return Some(format!(
            "name exceeds {} characters (got {})",
            MAX_NAME_LEN,
            name.len()
        ));
    }
    let mut chars = name.chars();
    // First character must be a letter so names never parse as flags or
    // numbers on a command line.
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        Some(c) => {
            return Some(format!(
                "name must start with a letter (starts with '{c}')"
            ));
        }
        None => return Some("name must not be empty".to_string()),
    }
    for c in chars {
        if !(c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            return Some(format!(
                "name may only contain letters, digits, '-' and '_' (found '{c}')"
            ));
        }
    }
    None
}

/// Validate an application name.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidName`] when the character-class or length
/// rules are broken, or [`ConfigError::ReservedName`] when the name collides
/// with a built-in command word.
pub fn validate_app_name(name: &str) -> Result<(), ConfigError> {
    if let Some(rule) = name_rule_violation(name) {
        return Err(ConfigError::InvalidName {
            name: name.to_string(),
            rule,
        });
    }
    if RESERVED_NAMES
        .iter()
        .any(|r| r.eq_ignore_ascii_case(name))
    {
        return Err(ConfigError::ReservedName {
            name: name.to_string(),
        });
    }
    Ok(())
}

/// Validate a profile name.
///
/// Same character class and length limit as app names; profiles are not
/// checked against the reserved-word list since they never become commands.
pub fn validate_profile_name(name: &str) -> Result<(), ConfigError> {
    if let Some(rule) = name_rule_violation(name) {
        return Err(ConfigError::InvalidProfileName {
            name: name.to_string(),
            rule,
        });
    }
    Ok(())
}
