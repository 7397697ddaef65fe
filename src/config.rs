//! Server Configuration
//!
//! Loaded from a TOML file; every field has a default so a missing file or a
//! partial file both work.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::info;

use crate::quest::DEFAULT_STORAGE_KEY;

/// Environment variable naming the config file
pub const CONFIG_PATH_ENV: &str = "METRAVEL_CONFIG";

/// `database_url` value selecting the in-process store
pub const MEMORY_DATABASE: &str = "memory";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// SQLite URL, or `memory` for a store that lives only as long as the process
    pub database_url: String,
    /// Quest catalog directory; the built-in catalog is used when unset
    pub data_dir: Option<PathBuf>,
    /// Key of the progress document
    pub storage_key: String,
    /// Default tracing directive, overridden by `RUST_LOG`
    pub log_directive: String,
    pub permissive_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            database_url: "sqlite:metravel.db?mode=rwc".to_string(),
            data_dir: None,
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            log_directive: "metravel_quests=info".to_string(),
            permissive_cors: true,
        }
    }
}

impl ServerConfig {
    /// Read the file at `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, String> {
        if !path.exists() {
            info!("Config file {:?} not found, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {:?}: {}", path, e))?;
        Self::from_toml(&content).map_err(|e| format!("{:?}: {}", path, e))
    }

    /// Read the file named by `METRAVEL_CONFIG`, else `config.toml`
    pub fn from_env() -> Result<Self, String> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| "config.toml".to_string());
        Self::load(Path::new(&path))
    }

    pub fn from_toml(content: &str) -> Result<Self, String> {
        let config: Self =
            toml::from_str(content).map_err(|e| format!("Failed to parse config: {}", e))?;

        if config.storage_key.trim().is_empty() {
            return Err("storage_key must not be empty".to_string());
        }
        Ok(config)
    }

    pub fn uses_memory_store(&self) -> bool {
        self.database_url == MEMORY_DATABASE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = ServerConfig::from_toml(
            r#"
bind_addr = "127.0.0.1:9000"
data_dir = "data"
"#,
        )
        .unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:9000");
        assert_eq!(config.data_dir, Some(PathBuf::from("data")));
        assert_eq!(config.storage_key, DEFAULT_STORAGE_KEY);
        assert!(config.permissive_cors);
        assert!(!config.uses_memory_store());
    }

    #[test]
    fn test_rejects_bad_files() {
        assert!(ServerConfig::from_toml("bind_addr = 5").is_err());
        assert!(ServerConfig::from_toml("storage_key = \"\"").is_err());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = ServerConfig::load(&temp_dir.path().join("nope.toml")).unwrap();
        assert_eq!(config, ServerConfig::default());

        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "database_url = \"memory\"").unwrap();
        assert!(ServerConfig::load(&path).unwrap().uses_memory_store());
    }
}
