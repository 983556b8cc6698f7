//! Configuration for the mirror.
//!
//! # Configuration Location
//!
//! By default, configuration is read from `<config dir>/mirror/config.toml`
//! (`~/.config/mirror/config.toml` on Linux). This can be overridden with the
//! `MIRROR_CONFIG_PATH` environment variable. A missing file means defaults.
//!
//! # Example
//!
//! ```toml
//! [general]
//! log_level = "info"
//!
//! [api]
//! base_url = "https://api.vercel.com"
//! request_timeout_secs = 30
//!
//! [files]
//! exclude = ["**/node_modules", "**/.git"]
//! max_projects_per_folder = 100
//!
//! [deployments]
//! auto_refresh = true
//! auto_refresh_period_secs = 30
//! ```

use crate::error::{MirrorError, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

// Environment variable names
pub const ENV_CONFIG_PATH: &str = "MIRROR_CONFIG_PATH";
pub const ENV_LOG_LEVEL: &str = "MIRROR_LOG_LEVEL";
pub const ENV_API_URL: &str = "MIRROR_API_URL";
pub const ENV_TOKEN: &str = "MIRROR_TOKEN";
pub const ENV_TEAM_ID: &str = "MIRROR_TEAM_ID";

pub const DEFAULT_API_URL: &str = "https://api.vercel.com";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    pub general: GeneralConfig,
    pub api: ApiConfig,
    pub files: FilesConfig,
    pub deployments: DeploymentsConfig,
    pub checks: RefreshConfig,
    pub logs: RefreshConfig,
    pub state: StateConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub request_timeout_secs: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub deployments_page_limit: u32,
    /// Access token used when no interactive session exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            request_timeout_secs: 30,
            max_retries: 2,
            retry_delay_ms: 500,
            deployments_page_limit: 50,
            token: None,
            team_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilesConfig {
    /// Glob patterns excluded from project discovery.
    pub exclude: Vec<String>,
    /// Upper bound on descriptors discovered per workspace folder.
    pub max_projects_per_folder: usize,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            exclude: vec!["**/node_modules".to_string(), "**/.git".to_string()],
            max_projects_per_folder: 100,
        }
    }
}

impl FilesConfig {
    /// Compile the exclude patterns.
    pub fn exclude_set(&self) -> Result<GlobSet> {
        build_glob_set(&self.exclude)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploymentsConfig {
    pub auto_refresh: bool,
    pub auto_refresh_period_secs: u64,
}

impl Default for DeploymentsConfig {
    fn default() -> Self {
        Self {
            auto_refresh: true,
            auto_refresh_period_secs: 30,
        }
    }
}

/// Background polling of checks or build logs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    pub auto_refresh: bool,
    pub interval_secs: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            auto_refresh: true,
            interval_secs: 6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    /// JSON file holding persisted UI state.
    pub workspace_state_path: PathBuf,
}

impl Default for StateConfig {
    fn default() -> Self {
        let base = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            workspace_state_path: base.join("mirror").join("workspace-state.json"),
        }
    }
}

/// Compile glob patterns into a single matcher. Patterns match slash-separated paths.
pub fn build_glob_set(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| {
            MirrorError::config(format!("Invalid exclude glob '{pattern}': {e}"))
        })?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| MirrorError::config(format!("Failed to build exclude globs: {e}")))
}

impl MirrorConfig {
    /// Load configuration from the default location, falling back to defaults when the
    /// file does not exist. Environment overrides are applied in both cases.
    pub async fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            Self::load_from_path(&path).await
        } else {
            debug!("No configuration at {}, using defaults", path.display());
            let mut config = Self::default();
            config.merge_env_vars();
            config.validate()?;
            Ok(config)
        }
    }

    /// Load configuration from a specific path
    pub async fn load_from_path(path: &Path) -> Result<Self> {
        debug!("Loading configuration from: {}", path.display());

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| MirrorError::config(format!("Failed to read config file: {e}")))?;

        let mut config = Self::from_toml_str(&content)?;
        config.merge_env_vars();
        config.validate()?;

        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| MirrorError::config(format!("Failed to parse config file: {e}")))
    }

    /// Save configuration atomically (temp file, then rename).
    pub async fn save_to_path(&self, path: &Path) -> Result<()> {
        self.validate()?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| MirrorError::config(format!("Failed to create config directory: {e}")))?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| MirrorError::config(format!("Failed to serialize config: {e}")))?;

        let temp_path = path.with_extension("toml.tmp");
        tokio::fs::write(&temp_path, content)
            .await
            .map_err(|e| MirrorError::config(format!("Failed to write config file: {e}")))?;
        tokio::fs::rename(&temp_path, path)
            .await
            .map_err(|e| MirrorError::config(format!("Failed to rename config file: {e}")))?;

        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var(ENV_CONFIG_PATH) {
            return Ok(PathBuf::from(path));
        }

        let base = dirs::config_dir()
            .ok_or_else(|| MirrorError::config("Could not determine config directory"))?;
        Ok(base.join("mirror").join("config.toml"))
    }

    /// Apply `MIRROR_*` environment overrides.
    pub fn merge_env_vars(&mut self) {
        self.merge_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable source.
    pub fn merge_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            self.general.log_level = level;
        }
        if let Some(url) = lookup(ENV_API_URL) {
            self.api.base_url = url;
        }
        if let Some(token) = lookup(ENV_TOKEN).filter(|t| !t.is_empty()) {
            self.api.token = Some(token);
        }
        if let Some(team_id) = lookup(ENV_TEAM_ID).filter(|t| !t.is_empty()) {
            self.api.team_id = Some(team_id);
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.general.log_level.as_str()) {
            return Err(MirrorError::config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.general.log_level,
                valid_log_levels.join(", ")
            )));
        }

        if self.api.base_url.trim().is_empty() {
            return Err(MirrorError::config("api.base_url must not be empty"));
        }

        if self.files.max_projects_per_folder == 0 {
            return Err(MirrorError::config(
                "files.max_projects_per_folder must be greater than 0",
            ));
        }

        if self.deployments.auto_refresh_period_secs == 0 {
            return Err(MirrorError::config(
                "deployments.auto_refresh_period_secs must be greater than 0",
            ));
        }

        if self.checks.interval_secs == 0 || self.logs.interval_secs == 0 {
            return Err(MirrorError::config("refresh intervals must be greater than 0"));
        }

        self.files.exclude_set()?;
        Ok(())
    }
}
