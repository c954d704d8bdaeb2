//! Configuration loading for the synchronization services
//!
//! Settings resolve in priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable naming the database file
pub const ENV_DATABASE: &str = "SAGESYNC_DATABASE";
/// Environment variable naming the owner key for synchronized entities
pub const ENV_OWNER_KEY: &str = "SAGESYNC_OWNER_KEY";

const DEFAULT_DATABASE: &str = "sagesync.db";
const DEFAULT_OWNER_KEY: &str = "group:flylight";

/// Settings read from an optional TOML config file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    /// Database file path
    pub database: Option<String>,
    /// Owner key applied to entities created by the engine
    pub owner_key: Option<String>,
    /// Pipeline process name recorded on status transitions
    pub process: Option<String>,
}

impl TomlConfig {
    /// Load a TOML config file. A missing file is not an error; it yields
    /// the empty config so lower-priority defaults apply.
    pub fn load(path: &Path) -> Result<TomlConfig> {
        if !path.exists() {
            return Ok(TomlConfig::default());
        }
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }
}

/// Resolve the database path: CLI arg, then env, then TOML, then default.
pub fn resolve_database(cli_arg: Option<&str>, toml_config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return PathBuf::from(path);
    }
    if let Ok(path) = std::env::var(ENV_DATABASE) {
        return PathBuf::from(path);
    }
    if let Some(path) = &toml_config.database {
        return PathBuf::from(path);
    }
    PathBuf::from(DEFAULT_DATABASE)
}

/// Resolve the owner key: CLI arg, then env, then TOML, then default.
pub fn resolve_owner_key(cli_arg: Option<&str>, toml_config: &TomlConfig) -> String {
    if let Some(owner) = cli_arg {
        return owner.to_string();
    }
    if let Ok(owner) = std::env::var(ENV_OWNER_KEY) {
        return owner;
    }
    if let Some(owner) = &toml_config.owner_key {
        return owner.clone();
    }
    DEFAULT_OWNER_KEY.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_arg_takes_priority() {
        let toml = TomlConfig {
            database: Some("from_toml.db".to_string()),
            ..Default::default()
        };
        let path = resolve_database(Some("from_cli.db"), &toml);
        assert_eq!(path, PathBuf::from("from_cli.db"));
    }

    #[test]
    fn test_toml_fallback() {
        let toml = TomlConfig {
            owner_key: Some("group:split_screen".to_string()),
            ..Default::default()
        };
        // Only meaningful when the env var is unset, which is the normal test environment
        if std::env::var(ENV_OWNER_KEY).is_err() {
            assert_eq!(resolve_owner_key(None, &toml), "group:split_screen");
        }
    }

    #[test]
    fn test_compiled_default() {
        let toml = TomlConfig::default();
        if std::env::var(ENV_DATABASE).is_err() {
            assert_eq!(resolve_database(None, &toml), PathBuf::from(DEFAULT_DATABASE));
        }
    }
}
