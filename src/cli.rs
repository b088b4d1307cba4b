use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "claude-bridge",
    about = "Relay a chat channel to Claude Code's -p mode",
    version
)]
pub struct Cli {
    /// Config file (TOML). Missing file means defaults.
    #[arg(long, default_value = "claude-bridge.toml")]
    pub config: PathBuf,

    /// Channel to service; messages from any other channel are ignored.
    #[arg(long, env = "TARGET_CHANNEL_ID")]
    pub channel: Option<String>,

    /// Claude binary to invoke.
    #[arg(long)]
    pub claude_bin: Option<String>,

    /// Sleep inhibitor binary, run as `<bin> -i`.
    #[arg(long)]
    pub inhibitor_bin: Option<String>,

    /// Invocation timeout, e.g. `300s` or `5m`.
    #[arg(long)]
    pub timeout: Option<humantime::Duration>,

    /// Interval between progress notices while claude runs.
    #[arg(long)]
    pub heartbeat: Option<humantime::Duration>,

    /// Don't start the sleep inhibitor at startup.
    #[arg(long)]
    pub no_awake: bool,

    /// Log level when RUST_LOG is not set.
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON.
    #[arg(long)]
    pub json_logs: bool,
}

impl Cli {
    /// Layer command-line values over `config`.
    pub fn apply(&self, config: &mut claude_bridge::config::Config) {
        if let Some(ref channel) = self.channel {
            config.target_channel = Some(channel.clone());
        }
        if let Some(ref bin) = self.claude_bin {
            config.claude_bin.clone_from(bin);
        }
        if let Some(ref bin) = self.inhibitor_bin {
            config.inhibitor_bin.clone_from(bin);
        }
        if let Some(timeout) = self.timeout {
            config.timeout = timeout.into();
        }
        if let Some(heartbeat) = self.heartbeat {
            config.heartbeat_interval = heartbeat.into();
        }
        if self.no_awake {
            config.awake_on_start = false;
        }
    }
}
