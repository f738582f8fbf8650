//! Configuration management with file persistence

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::domain::resolver::ResolveMode;

/// Skillpath configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseSettings,
    pub locking: LockingSettings,
    pub resolver: ResolverSettings,
    pub listing: ListingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DatabaseSettings {
    /// Database file; defaults to `<config dir>/skillpath.db`
    pub path: Option<PathBuf>,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LockingSettings {
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ResolverSettings {
    /// Base URL of a remote goal resolver
    pub endpoint: Option<String>,
    pub timeout_secs: u64,
    pub default_mode: ResolveMode,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ListingSettings {
    pub default_page_size: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: None,
            max_connections: 5,
        }
    }
}

impl Default for LockingSettings {
    fn default() -> Self {
        Self { timeout_ms: 10_000 }
    }
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_secs: 30,
            default_mode: ResolveMode::Greedy,
        }
    }
}

impl Default for ListingSettings {
    fn default() -> Self {
        Self {
            default_page_size: 10,
        }
    }
}

impl LockingSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl ResolverSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Keys accepted by [`Config::get`] and [`Config::set`]
pub const CONFIG_KEYS: &[&str] = &[
    "database.path",
    "database.max_connections",
    "locking.timeout_ms",
    "resolver.endpoint",
    "resolver.timeout_secs",
    "resolver.default_mode",
    "listing.default_page_size",
];

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let dir = if let Ok(custom_dir) = env::var("SKILLPATH_CONFIG_DIR") {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| anyhow!("Could not determine config directory"))?
                .join("skillpath")
        };
        Ok(dir)
    }

    /// Get the config file path
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from file, or fall back to defaults if it doesn't exist
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::config_path()?;

        if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config: Config = toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> anyhow::Result<()> {
        self.validate()?;

        let dir = Self::config_dir()?;
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;

        let path = Self::config_path()?;
        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(&path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database.max_connections == 0 {
            return Err(anyhow!("database.max_connections must be at least 1"));
        }
        if self.locking.timeout_ms == 0 {
            return Err(anyhow!("locking.timeout_ms must be greater than 0"));
        }
        if self.resolver.timeout_secs == 0 {
            return Err(anyhow!("resolver.timeout_secs must be greater than 0"));
        }
        if self.listing.default_page_size == 0 {
            return Err(anyhow!("listing.default_page_size must be at least 1"));
        }
        if let Some(endpoint) = &self.resolver.endpoint {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                return Err(anyhow!(
                    "resolver.endpoint must be an http(s) URL, got '{}'",
                    endpoint
                ));
            }
        }
        Ok(())
    }

    /// Resolved database path
    pub fn database_path(&self) -> PathBuf {
        self.database
            .path
            .clone()
            .unwrap_or_else(crate::storage::default_database_path)
    }

    /// Get a configuration value by key
    pub fn get(&self, key: &str) -> anyhow::Result<String> {
        match key {
            "database.path" => Ok(self.database_path().display().to_string()),
            "database.max_connections" => Ok(self.database.max_connections.to_string()),
            "locking.timeout_ms" => Ok(self.locking.timeout_ms.to_string()),
            "resolver.endpoint" => Ok(self
                .resolver
                .endpoint
                .clone()
                .unwrap_or_else(|| "(not set)".to_string())),
            "resolver.timeout_secs" => Ok(self.resolver.timeout_secs.to_string()),
            "resolver.default_mode" => Ok(self.resolver.default_mode.as_str().to_string()),
            "listing.default_page_size" => Ok(self.listing.default_page_size.to_string()),
            _ => Err(anyhow!(
                "Unknown configuration key: {}. Use `skillpath config list` to see available keys.",
                key
            )),
        }
    }

    /// Set a configuration value by key
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            "database.path" => {
                self.database.path = Some(PathBuf::from(value));
            }
            "database.max_connections" => {
                self.database.max_connections = value
                    .parse()
                    .with_context(|| format!("Invalid max_connections value: {}", value))?;
            }
            "locking.timeout_ms" => {
                self.locking.timeout_ms = value
                    .parse()
                    .with_context(|| format!("Invalid timeout_ms value: {}", value))?;
            }
            "resolver.endpoint" => {
                self.resolver.endpoint = if value.is_empty() {
                    None
                } else {
                    Some(value.trim_end_matches('/').to_string())
                };
            }
            "resolver.timeout_secs" => {
                self.resolver.timeout_secs = value
                    .parse()
                    .with_context(|| format!("Invalid timeout_secs value: {}", value))?;
            }
            "resolver.default_mode" => {
                self.resolver.default_mode = ResolveMode::parse(value).ok_or_else(|| {
                    anyhow!("Invalid resolver mode '{}'. Use 'greedy' or 'optimal'.", value)
                })?;
            }
            "listing.default_page_size" => {
                self.listing.default_page_size = value
                    .parse()
                    .with_context(|| format!("Invalid page size value: {}", value))?;
            }
            _ => {
                return Err(anyhow!(
                    "Unknown configuration key: {}. Use `skillpath config list` to see available keys.",
                    key
                ));
            }
        }

        self.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();

        assert!(config.database.path.is_none());
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.locking.timeout(), Duration::from_secs(10));
        assert!(config.resolver.endpoint.is_none());
        assert_eq!(config.resolver.timeout(), Duration::from_secs(30));
        assert_eq!(config.resolver.default_mode, ResolveMode::Greedy);
        assert_eq!(config.listing.default_page_size, 10);
        config.validate().unwrap();
    }

    #[test]
    fn test_get_and_set_roundtrip_every_key() {
        let mut config = Config::default();
        config.set("resolver.endpoint", "http://localhost:8080/").unwrap();
        config.set("resolver.default_mode", "optimal").unwrap();
        config.set("listing.default_page_size", "25").unwrap();

        assert_eq!(config.get("resolver.endpoint").unwrap(), "http://localhost:8080");
        assert_eq!(config.get("resolver.default_mode").unwrap(), "optimal");
        assert_eq!(config.get("listing.default_page_size").unwrap(), "25");

        for key in CONFIG_KEYS {
            assert!(config.get(key).is_ok(), "key {} should be readable", key);
        }
    }

    #[test]
    fn test_set_rejects_invalid_values() {
        let mut config = Config::default();
        assert!(config.set("resolver.default_mode", "exhaustive").is_err());
        assert!(config.set("listing.default_page_size", "0").is_err());
        assert!(config.set("resolver.endpoint", "ftp://solver").is_err());
        assert!(config.set("unknown.key", "1").is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [resolver]
            timeout_secs = 5
            default_mode = "optimal"
            "#,
        )
        .unwrap();

        assert_eq!(config.resolver.timeout_secs, 5);
        assert_eq!(config.resolver.default_mode, ResolveMode::Optimal);
        assert_eq!(config.listing.default_page_size, 10);
        assert_eq!(config.locking.timeout_ms, 10_000);
    }

    #[test]
    fn test_serialization_roundtrip() {
        let mut config = Config::default();
        config.set("database.path", "/tmp/skillpath-test.db").unwrap();

        let serialized = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed, config);
    }
}
