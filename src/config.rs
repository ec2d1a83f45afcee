//! Configuration for taskloop

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
}

/// Which storage substrate holds the collections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Structured values in a SQLite key-value table
    #[default]
    Sqlite,
    /// One JSON text file per key
    File,
    /// Process memory, nothing survives exit
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: Backend,

    /// SQLite file for `sqlite`, directory for `file`. Unset means a
    /// per-backend location under the data directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            path: None,
        }
    }
}

impl StorageConfig {
    /// Configured path, or the backend's default location
    pub fn resolved_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| default_storage_path(self.backend))
    }
}

/// REST backend the repository mirrors records to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default)]
    pub enabled: bool,

    /// REST root, e.g. `https://project.supabase.co/rest/v1`
    #[serde(default)]
    pub url: String,

    /// Sent both as `apikey` and as the bearer credential
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_tasks_table")]
    pub tasks_table: String,

    #[serde(default = "default_streaks_table")]
    pub streaks_table: String,

    #[serde(default = "default_pending_table")]
    pub pending_table: String,

    /// Per-request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: String::new(),
            api_key: String::new(),
            tasks_table: default_tasks_table(),
            streaks_table: default_streaks_table(),
            pending_table: default_pending_table(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl RemoteConfig {
    /// A mirror is only built when enabled and pointed somewhere
    pub fn is_active(&self) -> bool {
        self.enabled && !self.url.trim().is_empty()
    }

    /// Collection endpoint for a table
    pub fn endpoint(&self, table: &str) -> String {
        format!("{}/{}", self.url.trim_end_matches('/'), table)
    }
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("taskloop"))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn default_storage_path(backend: Backend) -> PathBuf {
    match backend {
        Backend::Sqlite => data_dir().join("taskloop.sqlite"),
        Backend::File => data_dir().join("collections"),
        Backend::Memory => PathBuf::new(),
    }
}

fn default_tasks_table() -> String {
    "Tasks".to_string()
}

fn default_streaks_table() -> String {
    "Streaks".to_string()
}

fn default_pending_table() -> String {
    "PendingTasks".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

impl Config {
    /// Default config path
    pub fn default_path() -> Result<PathBuf> {
        if let Ok(env_path) = std::env::var("TASKLOOP_CONFIG") {
            return Ok(PathBuf::from(env_path));
        }

        let local = PathBuf::from("taskloop.toml");
        if local.exists() {
            return Ok(local);
        }

        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?
            .join("taskloop");

        Ok(config_dir.join("config.toml"))
    }

    /// Load config from default path, falling back to defaults
    pub fn load() -> Result<Self> {
        let path = Self::default_path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).context("Failed to read config file")?;
        toml::from_str(&content).context("Failed to parse config file")
    }

    /// Save config to specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        let with_comments = format!(
            "# taskloop configuration\n\
             # storage.backend: sqlite | file | memory\n\n\
             {}\n\n\
             # Set remote.enabled = true with url and api_key to mirror records\n",
            content
        );

        std::fs::write(path, with_comments).context("Failed to write config file")?;

        Ok(())
    }
}
