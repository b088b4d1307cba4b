use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::session::runner::SupervisorConfig;

/// Bridge configuration, optionally loaded from a TOML file.
///
/// ```toml
/// target_channel = "C0123456789"
/// timeout = "5m"
/// heartbeat_interval = "30s"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// The only channel whose messages are acted on.
    pub target_channel: Option<String>,
    pub claude_bin: String,
    /// Sleep inhibitor binary, run as `<bin> -i`.
    pub inhibitor_bin: String,
    /// Wall-clock limit for one claude invocation.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub heartbeat_interval: Duration,
    /// Time between SIGTERM and SIGKILL when stopping a process.
    #[serde(with = "humantime_serde")]
    pub grace_period: Duration,
    /// Start the sleep inhibitor at startup.
    pub awake_on_start: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            target_channel: None,
            claude_bin: "claude".to_string(),
            inhibitor_bin: "caffeinate".to_string(),
            timeout: Duration::from_secs(300),
            heartbeat_interval: Duration::from_secs(30),
            grace_period: Duration::from_secs(5),
            awake_on_start: true,
        }
    }
}

impl Config {
    pub fn supervisor(&self) -> SupervisorConfig {
        SupervisorConfig {
            binary: self.claude_bin.clone(),
            timeout: self.timeout,
            grace_period: self.grace_period,
        }
    }
}

/// Load configuration from `path`.
///
/// Falls back to defaults if the file is missing.
pub fn load(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let config: Config =
        toml::from_str(&contents).with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(config)
}
