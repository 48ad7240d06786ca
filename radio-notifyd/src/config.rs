use std::path::{Path, PathBuf};
use serde::Deserialize;
use anyhow::{ensure, Context, Result};
use shared::types::{ChannelId, Station};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub notifier: NotifierConfig,
    #[serde(default)]
    pub api: ApiConfig,
    /// Stations seeded into the catalog when missing
    #[serde(default)]
    pub stations: Vec<Station>,
    /// Text channels notifications can be delivered to
    #[serde(default)]
    pub channels: Vec<ChannelConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_backend")]
    pub backend: StoreBackend,
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotifierConfig {
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_liveness_interval")]
    pub liveness_interval_secs: u64,
    /// JSON object of extra headers sent with every scoreboard request
    #[serde(default)]
    pub headers_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelConfig {
    pub id: ChannelId,
    pub webhook: String,
}

fn default_backend() -> StoreBackend {
    StoreBackend::Sqlite
}

fn default_db_path() -> PathBuf {
    PathBuf::from("/var/lib/radio-notify/radio.db")
}

fn default_interval() -> u64 {
    30
}

fn default_fetch_timeout() -> u64 {
    10
}

fn default_liveness_interval() -> u64 {
    30
}

fn default_listen() -> String {
    "127.0.0.1:8090".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            db_path: default_db_path(),
        }
    }
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            fetch_timeout_secs: default_fetch_timeout(),
            liveness_interval_secs: default_liveness_interval(),
            headers_path: None,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.notifier.validate()?;
        Ok(config)
    }
}

impl NotifierConfig {
    fn validate(&self) -> Result<()> {
        ensure!(self.interval_secs > 0, "notifier.interval_secs must be greater than 0");
        ensure!(self.fetch_timeout_secs > 0, "notifier.fetch_timeout_secs must be greater than 0");
        ensure!(
            self.liveness_interval_secs > 0,
            "notifier.liveness_interval_secs must be greater than 0"
        );
        Ok(())
    }
}
