//! Storage Mode & Setting Scope
//!
//! The two small enumerations every persistence component agrees on:
//! where settings live for this process (`StorageMode`) and who a setting
//! belongs to (`SettingScope`).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Where settings and logs are persisted for the lifetime of a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum StorageMode {
    /// Encrypted JSON files in the data directory
    #[default]
    Local,
    /// Central relational database
    Database,
}

impl StorageMode {
    /// Canonical text form, as persisted under `System/StorageMode`
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageMode::Local => "Local",
            StorageMode::Database => "Database",
        }
    }
}

impl fmt::Display for StorageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageMode {
    type Err = CoreError;

    /// Exact, case-sensitive match. Anything else is rejected so callers can
    /// fall back to `Local` explicitly.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Local" => Ok(StorageMode::Local),
            "Database" => Ok(StorageMode::Database),
            other => Err(CoreError::parse(format!("unknown storage mode: {}", other))),
        }
    }
}

/// Scope of a single setting entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SettingScope {
    /// Applies to the whole installation
    Application,
    /// Applies to one user identity
    User,
}

impl SettingScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettingScope::Application => "App",
            SettingScope::User => "User",
        }
    }
}

impl fmt::Display for SettingScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SettingScope {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "App" => Ok(SettingScope::Application),
            "User" => Ok(SettingScope::User),
            other => Err(CoreError::parse(format!("unknown setting scope: {}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_mode_default_is_local() {
        assert_eq!(StorageMode::default(), StorageMode::Local);
    }

    #[test]
    fn test_storage_mode_parse() {
        assert_eq!("Database".parse::<StorageMode>().unwrap(), StorageMode::Database);
        assert_eq!("Local".parse::<StorageMode>().unwrap(), StorageMode::Local);
        assert!("database".parse::<StorageMode>().is_err());
        assert!("".parse::<StorageMode>().is_err());
    }

    #[test]
    fn test_storage_mode_display_matches_parse() {
        for mode in [StorageMode::Local, StorageMode::Database] {
            assert_eq!(mode.to_string().parse::<StorageMode>().unwrap(), mode);
        }
    }

    #[test]
    fn test_setting_scope_text() {
        assert_eq!(SettingScope::Application.as_str(), "App");
        assert_eq!("User".parse::<SettingScope>().unwrap(), SettingScope::User);
        assert!("Global".parse::<SettingScope>().is_err());
    }
}
