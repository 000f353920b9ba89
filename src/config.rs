//! Client configuration
//!
//! Resolution order, later wins:
//! 1. built-in defaults
//! 2. `qcsync.toml` in the config directory
//! 3. environment variables (a `.env` file in the config directory is loaded first)

use crate::error::{OfflineError, OfflineResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

pub const CONFIG_FILE_NAME: &str = "qcsync.toml";

const ENV_API_URL: &str = "QCSYNC_API_URL";
const ENV_TIMEOUT_SECS: &str = "QCSYNC_TIMEOUT_SECS";
const ENV_DATA_DIR: &str = "QCSYNC_DATA_DIR";
const ENV_API_TOKEN: &str = "QCSYNC_API_TOKEN";
const ENV_WRITE_BACK: &str = "QCSYNC_WRITE_BACK";

/// When a drain cycle persists its progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteBackPolicy {
    /// Write the remaining list once, after the whole snapshot was replayed.
    /// A crash mid-drain can replay already-applied items again.
    #[default]
    EndOfCycle,
    /// Remove each item from the persisted list as soon as it succeeds.
    PerItem,
}

impl FromStr for WriteBackPolicy {
    type Err = OfflineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "end_of_cycle" => Ok(WriteBackPolicy::EndOfCycle),
            "per_item" => Ok(WriteBackPolicy::PerItem),
            other => Err(OfflineError::Config(format!(
                "unknown write-back policy: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub api_url: String,
    pub request_timeout_secs: u64,
    pub data_dir: PathBuf,
    pub write_back: WriteBackPolicy,
    /// Drain the queue on every transition to online.
    pub auto_sync: bool,
    /// Derive connectivity from the health endpoint at this interval.
    pub probe_interval_secs: Option<u64>,
    pub api_token: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8000/api/v1".to_string(),
            request_timeout_secs: 30,
            data_dir: default_data_dir(),
            write_back: WriteBackPolicy::default(),
            auto_sync: true,
            probe_interval_secs: None,
            api_token: None,
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
        .join("qcsync")
}

impl ClientConfig {
    /// Load configuration from a directory.
    ///
    /// A missing `qcsync.toml` means defaults; a malformed one is an error.
    pub fn load(dir: &Path) -> OfflineResult<Self> {
        let env_path = dir.join(".env");
        if env_path.exists() {
            let _ = dotenvy::from_path(&env_path);
        }

        let mut config = Self::from_file(&dir.join(CONFIG_FILE_NAME))?;
        config.apply_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }

    fn from_file(path: &Path) -> OfflineResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| OfflineError::Config(format!("{}: {}", path.display(), e)))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| OfflineError::Config(format!("{}: {}", path.display(), e)))?;

        if config.request_timeout_secs == 0 {
            return Err(OfflineError::Config(format!(
                "{}: request_timeout_secs must be greater than 0",
                path.display()
            )));
        }
        Ok(config)
    }

    /// Apply overrides from a variable lookup (the process environment in
    /// [`ClientConfig::load`]). Unparseable values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |name: &str| lookup(name).filter(|v| !v.is_empty());

        if let Some(url) = lookup(ENV_API_URL) {
            self.api_url = url;
        }

        if let Some(raw) = lookup(ENV_TIMEOUT_SECS) {
            match raw.parse::<u64>() {
                Ok(secs) if secs > 0 => self.request_timeout_secs = secs,
                _ => warn!("Ignoring invalid {}={}", ENV_TIMEOUT_SECS, raw),
            }
        }

        if let Some(dir) = lookup(ENV_DATA_DIR) {
            self.data_dir = PathBuf::from(dir);
        }

        if let Some(token) = lookup(ENV_API_TOKEN) {
            self.api_token = Some(token);
        }

        if let Some(raw) = lookup(ENV_WRITE_BACK) {
            match raw.parse() {
                Ok(policy) => self.write_back = policy,
                Err(e) => warn!("Ignoring {}: {}", ENV_WRITE_BACK, e),
            }
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
