use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Storefront support chat server
#[derive(Parser, Serialize, Deserialize, Clone, Debug)]
#[command(name = "shopchat-server", version, about = "Storefront support chat server")]
pub struct Config {
    /// Port to listen on
    #[arg(long, env = "SHOPCHAT_PORT", default_value = "3000")]
    pub port: u16,

    /// Bind address
    #[arg(long, env = "SHOPCHAT_BIND_ADDRESS", default_value = "0.0.0.0")]
    pub bind_address: String,

    /// Path to TOML config file
    #[arg(long, default_value = "./shopchat.toml")]
    pub config: String,

    /// Enable structured JSON logging (for Docker/production)
    #[arg(long, env = "SHOPCHAT_JSON_LOGS")]
    pub json_logs: bool,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    pub generate_config: bool,

    /// Data directory for the message database
    #[arg(long, env = "SHOPCHAT_DATA_DIR", default_value = "./data")]
    pub data_dir: String,

    /// Chat behaviour (loaded from [chat] section in TOML).
    /// Left out of the CLI layer entirely so it cannot mask the file.
    #[arg(skip)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat: Option<ChatConfig>,
}

/// Chat routing and connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Identifier admins share in stored conversations (default: "admin")
    #[serde(default = "default_admin_id")]
    pub admin_id: String,

    /// Maximum message length in characters (default: 4000)
    #[serde(default = "default_max_text_length")]
    pub max_text_length: usize,

    /// Seconds between server pings (default: 30)
    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: u64,

    /// Seconds to wait for a pong before closing (default: 10)
    #[serde(default = "default_pong_timeout")]
    pub pong_timeout_secs: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            admin_id: default_admin_id(),
            max_text_length: default_max_text_length(),
            ping_interval_secs: default_ping_interval(),
            pong_timeout_secs: default_pong_timeout(),
        }
    }
}

impl ChatConfig {
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs.max(1))
    }

    pub fn pong_timeout(&self) -> Duration {
        Duration::from_secs(self.pong_timeout_secs.max(1))
    }
}

fn default_admin_id() -> String {
    "admin".to_string()
}

fn default_max_text_length() -> usize {
    4000
}

fn default_ping_interval() -> u64 {
    30
}

fn default_pong_timeout() -> u64 {
    10
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            bind_address: "0.0.0.0".to_string(),
            config: "./shopchat.toml".to_string(),
            json_logs: false,
            generate_config: false,
            data_dir: "./data".to_string(),
            chat: Some(ChatConfig::default()),
        }
    }
}

impl Config {
    /// The [chat] section, falling back to built-in defaults.
    pub fn chat_config(&self) -> ChatConfig {
        self.chat.clone().unwrap_or_default()
    }

    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (SHOPCHAT_*) < CLI args
    pub fn load() -> Result<Self, figment::Error> {
        let cli = Config::parse();
        let config_path = cli.config.clone();

        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_path))
            .merge(Env::prefixed("SHOPCHAT_").split("__"))
            .merge(Serialized::defaults(cli))
            .extract()
    }
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# Shopchat Server Configuration
# Place this file at ./shopchat.toml or specify with --config <path>
# All settings can be overridden via environment variables (SHOPCHAT_PORT,
# SHOPCHAT_CHAT__ADMIN_ID, etc.) or CLI flags (--port, etc.)

# Server port (default: 3000)
# port = 3000

# Bind address (default: 0.0.0.0, all interfaces)
# bind_address = "0.0.0.0"

# Enable structured JSON logging for Docker/production
# json_logs = false

# Data directory for the SQLite message database
# data_dir = "./data"

# ---- Chat ----
# [chat]

# Identifier admins share in stored conversations. Customers request
# history with this id to see their support thread.
# admin_id = "admin"

# Maximum message length in characters
# max_text_length = 4000

# WebSocket heartbeat: ping every N seconds, close if no pong within M seconds
# ping_interval_secs = 30
# pong_timeout_secs = 10
"#
    .to_string()
}
