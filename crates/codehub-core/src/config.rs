use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::models::SortBy;

/// Main configuration structure
///
/// Loaded from the config file, then patched by environment variables and
/// finally by CLI flags. Priority: CLI > Env > File > Defaults.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub github: GitHubConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
}

impl Config {
    /// Load config from the default location, falling back to defaults
    pub fn load() -> crate::Result<Self> {
        let path = Self::config_path()?;
        Self::load_from(&path)
    }

    /// Load config from an explicit path; a missing file means defaults
    pub fn load_from(path: &Path) -> crate::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        toml::from_str(&contents).map_err(|e| {
            crate::Error::ConfigError(format!("Failed to parse {}: {}", path.display(), e))
        })
    }

    /// Save config to the default location
    pub fn save(&self) -> crate::Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> crate::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| crate::Error::ConfigError(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Apply `GITHUB_TOKEN`, `CODEHUB_USER` and `CODEHUB_DB` overrides
    pub fn with_env(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(token) = lookup("GITHUB_TOKEN") {
            self.github.token = Some(token);
        }
        if let Some(user) = lookup("CODEHUB_USER") {
            self.dashboard.user = Some(user);
        }
        if let Some(db) = lookup("CODEHUB_DB") {
            self.storage.database_path = Some(PathBuf::from(db));
        }
        self
    }

    /// `<config dir>/codehub/config.toml`
    pub fn config_path() -> crate::Result<PathBuf> {
        let dir = dirs::config_dir()
            .ok_or_else(|| crate::Error::ConfigError("Could not find config directory".into()))?;
        Ok(dir.join("codehub").join("config.toml"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    /// Personal access token; raises the search rate limit
    pub token: Option<String>,

    /// API URL (for GitHub Enterprise)
    #[serde(default = "default_github_url")]
    pub api_url: String,

    /// Results fetched per search
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

fn default_github_url() -> String {
    codehub_api::github::GITHUB_API_BASE.to_string()
}

fn default_per_page() -> u32 {
    30
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_url: default_github_url(),
            per_page: default_per_page(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    /// SQLite database file; defaults to the user data directory
    pub database_path: Option<PathBuf>,
}

impl StorageConfig {
    pub fn resolved_database_path(&self) -> crate::Result<PathBuf> {
        if let Some(path) = &self.database_path {
            return Ok(path.clone());
        }
        let dir = dirs::data_dir()
            .ok_or_else(|| crate::Error::ConfigError("Could not find data directory".into()))?;
        Ok(dir.join("codehub").join("dashboard.db"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardConfig {
    /// Store partition to work in; defaults to the OS user name
    pub user: Option<String>,

    /// Seconds a removed repository can be restored
    #[serde(default = "default_undo_window")]
    pub undo_window_secs: u64,

    #[serde(default)]
    pub default_sort: SortBy,
}

fn default_undo_window() -> u64 {
    30
}

impl DashboardConfig {
    pub fn resolved_user(&self) -> String {
        self.user
            .clone()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(whoami::username)
    }

    pub fn undo_window(&self) -> Duration {
        Duration::from_secs(self.undo_window_secs)
    }
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            user: None,
            undo_window_secs: default_undo_window(),
            default_sort: SortBy::default(),
        }
    }
}
