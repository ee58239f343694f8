//! Configuration management for playdash.
//!
//! Handles loading configuration from TOML files.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use super::catalog::DEFAULT_EXTENSIONS;
use super::executor::DEFAULT_RUNNER;
use super::snapshot::DEFAULT_STATE_FILE;

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Playbook discovery settings
    pub playbooks: PlaybooksConfig,

    /// HTTP server settings
    pub server: ServerConfig,

    /// Saved state settings
    pub state: StateConfig,

    /// Runner settings
    pub runner: RunnerConfig,
}

/// Playbook discovery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybooksConfig {
    /// Directory scanned for playbooks (`~` and environment variables are expanded)
    pub dir: String,

    /// File extensions treated as playbooks
    pub extensions: Vec<String>,
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to bind to
    pub port: u16,

    /// Directory served under `/static`
    pub static_dir: PathBuf,

    /// Page served at `/`
    pub index_file: PathBuf,
}

/// Saved state settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    /// Location of the state document
    pub file: PathBuf,
}

/// Runner settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Executable that runs a playbook, resolved on `PATH`
    pub program: String,

    /// Arguments passed before the playbook path
    pub args: Vec<String>,

    /// What to do when a playbook is triggered while it is already running
    pub concurrent_runs: ConcurrentRuns,
}

/// Policy for triggering a playbook that already has a run in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConcurrentRuns {
    /// Start another run; the last one to finish wins
    #[default]
    Allow,
    /// Refuse the trigger
    Reject,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Looks for config in:
    /// 1. `.playdash.toml` in current directory
    /// 2. `~/.config/playdash/config.toml`
    /// 3. Falls back to defaults
    pub fn load() -> anyhow::Result<Self> {
        let local_config = PathBuf::from(".playdash.toml");
        if local_config.exists() {
            return Self::load_from_file(&local_config);
        }

        if let Some(config_dir) = Self::config_dir() {
            let global_config = config_dir.join("config.toml");
            if global_config.exists() {
                return Self::load_from_file(&global_config);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        tracing::debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Get the config directory path.
    pub fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("playdash"))
    }

    /// Get the playbooks directory with `~` and variables expanded.
    ///
    /// Falls back to the literal value if expansion fails.
    pub fn playbooks_dir(&self) -> PathBuf {
        match shellexpand::full(&self.playbooks.dir) {
            Ok(expanded) => PathBuf::from(expanded.as_ref()),
            Err(e) => {
                tracing::warn!(dir = %self.playbooks.dir, error = %e, "Could not expand playbooks dir");
                PathBuf::from(&self.playbooks.dir)
            }
        }
    }
}

impl ServerConfig {
    /// Get the socket address.
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid listen address {}:{}", self.host, self.port))
    }
}

impl Default for PlaybooksConfig {
    fn default() -> Self {
        Self {
            dir: "/etc/ansible/playbooks".to_string(),
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| (*e).to_string()).collect(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            static_dir: PathBuf::from("static"),
            index_file: PathBuf::from("templates/index.html"),
        }
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        Self { file: PathBuf::from(DEFAULT_STATE_FILE) }
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            program: DEFAULT_RUNNER.to_string(),
            args: Vec::new(),
            concurrent_runs: ConcurrentRuns::Allow,
        }
    }
}
