use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use kai_dispatch::{AgentConfig, DEFAULT_COMMAND_PREFIX, SETTINGS_FILE_NAME};

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_prefix(value: &str) -> Result<String, String> {
    if value.trim().is_empty() || value.chars().any(char::is_whitespace) {
        return Err("prefix must be non-empty and contain no whitespace".to_string());
    }
    Ok(value.to_string())
}

#[derive(Debug, Parser)]
#[command(
    name = "kai",
    about = "Command dispatch agent for a messaging session",
    version
)]
pub struct Cli {
    #[arg(
        long = "settings-path",
        env = "KAI_SETTINGS_PATH",
        default_value = SETTINGS_FILE_NAME,
        help = "Settings file holding the persisted mode and auto status view flag."
    )]
    pub settings_path: PathBuf,

    #[arg(
        long,
        env = "KAI_PREFIX",
        default_value = DEFAULT_COMMAND_PREFIX,
        value_parser = parse_prefix,
        help = "Prefix that marks a message as a command."
    )]
    pub prefix: String,

    #[arg(
        long,
        env = "KAI_OWNER",
        help = "Owner identity. Defaults to the connected account."
    )]
    pub owner: Option<String>,

    #[arg(
        long = "assets-dir",
        env = "KAI_ASSETS_DIR",
        help = "Directory holding optional welcome.jpg and hidetag.jpg images."
    )]
    pub assets_dir: Option<PathBuf>,

    #[arg(
        long = "auth-dir",
        env = "KAI_AUTH_DIR",
        help = "Session auth directory removed by the clean command."
    )]
    pub auth_dir: Option<PathBuf>,

    #[arg(
        long = "presence-interval-secs",
        env = "KAI_PRESENCE_INTERVAL_SECS",
        default_value_t = 30,
        value_parser = parse_positive_u64,
        help = "Seconds between presence refreshes while connected."
    )]
    pub presence_interval_secs: u64,

    #[arg(
        long,
        env = "KAI_FIXTURE",
        help = "JSON fixture of transport events to replay through the agent."
    )]
    pub fixture: PathBuf,

    #[arg(
        long = "outbound-log",
        env = "KAI_OUTBOUND_LOG",
        help = "Write recorded outbound actions as JSON lines here instead of stdout."
    )]
    pub outbound_log: Option<PathBuf>,

    #[arg(
        long = "log-level",
        env = "KAI_LOG_LEVEL",
        help = "Tracing filter directive, e.g. info or kai_dispatch=debug. Overrides RUST_LOG."
    )]
    pub log_level: Option<String>,
}

impl Cli {
    pub fn agent_config(&self) -> AgentConfig {
        AgentConfig {
            command_prefix: self.prefix.clone(),
            owner_identity: self.owner.clone(),
            settings_path: Some(self.settings_path.clone()),
            assets_dir: self.assets_dir.clone(),
            auth_dir: self.auth_dir.clone(),
            presence_interval: Duration::from_secs(self.presence_interval_secs),
        }
    }
}
