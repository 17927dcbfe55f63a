use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::fanout::FailurePolicy;
use crate::poller::{ResultOrdering, TickPolicy};
use crate::util;

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the management server, e.g. `https://pmm.example.com`
    #[serde(default = "default_server_url")]
    pub server_url: String,

    /// API key sent as bearer token (takes precedence over basic auth)
    pub api_key: Option<String>,

    pub username: Option<String>,
    pub password: Option<String>,

    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Interval between cluster refreshes in seconds (default: 10)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    #[serde(default)]
    pub tick_policy: TickPolicy,

    #[serde(default)]
    pub failure_policy: FailurePolicy,

    #[serde(default)]
    pub result_ordering: ResultOrdering,
}

fn default_server_url() -> String {
    "http://localhost".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_poll_interval() -> u64 {
    10
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            api_key: None,
            username: None,
            password: None,
            timeout_secs: default_timeout(),
            poll_interval_secs: default_poll_interval(),
            tick_policy: TickPolicy::default(),
            failure_policy: FailurePolicy::default(),
            result_ordering: ResultOrdering::default(),
        }
    }
}

impl Config {
    /// Load configuration from file, or use defaults if no file exists.
    ///
    /// Environment variables override whatever the file says.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = path.map(Path::to_path_buf).or_else(default_config_path);

        let config = match config_path {
            Some(path) => read_config_file(&path)?,
            None => Self::default(),
        };

        let config = config.with_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Reject values the client cannot run with
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.poll_interval_secs > 0,
            "poll_interval_secs must be greater than zero"
        );
        ensure!(self.timeout_secs > 0, "timeout_secs must be greater than zero");
        Ok(())
    }

    /// Apply `PMM_URL`, `PMM_API_KEY`, `PMM_USER` and `PMM_PASSWORD`
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(url) = util::get_server_url() {
            self.server_url = url;
        }
        if let Some(key) = util::get_api_key() {
            self.api_key = Some(key);
        }
        if let Some((user, password)) = util::get_basic_auth() {
            self.username = Some(user);
            self.password = Some(password);
        }
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

fn default_config_path() -> Option<PathBuf> {
    let home = dirs::home_dir()?;
    let default_path = home.join(".config/pmm-console/config.toml");
    default_path.exists().then_some(default_path)
}

pub fn read_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config = toml::from_str::<Config>(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
    trace!("loaded config: {config:?}");

    config
        .validate()
        .with_context(|| format!("Invalid config file: {}", path.display()))?;
    Ok(config)
}
