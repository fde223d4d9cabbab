use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::health::HealthSettings;
use crate::core::substrate::rpc::PeerCommand;

pub const SETTINGS_FILE: &str = "pmrelay.toml";

/// `~/.pmrelay`, falling back to the working directory without a home.
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".pmrelay"))
        .unwrap_or_else(|| PathBuf::from(".pmrelay"))
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub substrate: SubstrateSettings,

    #[serde(default)]
    pub health: HealthConfig,

    #[serde(default)]
    pub paths: PathSettings,

    #[serde(default)]
    pub logging: LoggingSettings,

    /// File these settings were read from; `None` when running on defaults.
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubstrateSettings {
    #[serde(default = "default_substrate_command")]
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default)]
    pub env: HashMap<String, String>,

    #[serde(default = "default_init_timeout_secs")]
    pub init_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HealthConfig {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct PathSettings {
    /// Flat JSON object with every integration's configuration values.
    #[serde(default)]
    pub integrations: Option<PathBuf>,

    /// Directory of `*.json` operation definitions.
    #[serde(default)]
    pub operations: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_substrate_command() -> String {
    "pm-substrate".to_string()
}
fn default_init_timeout_secs() -> u64 {
    15
}
fn default_debounce_ms() -> u64 {
    500
}
fn default_probe_timeout_ms() -> u64 {
    5000
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for SubstrateSettings {
    fn default() -> Self {
        Self {
            command: default_substrate_command(),
            args: Vec::new(),
            env: HashMap::new(),
            init_timeout_secs: default_init_timeout_secs(),
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            probe_timeout_ms: default_probe_timeout_ms(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Settings {
    /// Loads `path`, or the default settings file when `None`. A missing file
    /// yields defaults. Runs before logging is up, so it reports through
    /// [`Settings::source`] instead of logging.
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| data_dir().join(SETTINGS_FILE));
        if !config_path.exists() {
            return Ok(Self::default());
        }
        let content = tokio::fs::read_to_string(&config_path).await?;
        let mut settings: Settings = toml::from_str(&content)
            .with_context(|| format!("Invalid settings file {}", config_path.display()))?;
        settings.source = Some(config_path);
        Ok(settings)
    }

    pub fn integrations_path(&self) -> PathBuf {
        self.paths
            .integrations
            .clone()
            .unwrap_or_else(|| data_dir().join("integrations.json"))
    }

    pub fn operations_dir(&self) -> PathBuf {
        self.paths
            .operations
            .clone()
            .unwrap_or_else(|| data_dir().join("operations"))
    }

    pub fn health_settings(&self) -> HealthSettings {
        HealthSettings {
            debounce: Duration::from_millis(self.health.debounce_ms),
            probe_timeout: Duration::from_millis(self.health.probe_timeout_ms),
        }
    }

    pub fn peer_command(&self) -> PeerCommand {
        PeerCommand {
            command: self.substrate.command.clone(),
            args: self.substrate.args.clone(),
            env: self.substrate.env.clone(),
            init_timeout: Duration::from_secs(self.substrate.init_timeout_secs),
        }
    }

    pub fn log_level(&self) -> tracing::Level {
        self.logging.level.parse().unwrap_or(tracing::Level::INFO)
    }
}
