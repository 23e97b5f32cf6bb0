//! Configuration module for meshmesh-probe.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values, and every default
//! reproduces the stock bridge session (`127.0.0.1:6053`, node `0.28.139.56`).

use crate::protocol::handshake::HandshakeError;
use crate::protocol::{HandshakeLine, HelloRequest};
use bytes::Bytes;
use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Command-line arguments for the probe
#[derive(Parser, Debug)]
#[command(name = "meshmesh-probe")]
#[command(author = "meshmesh-probe authors")]
#[command(version = "0.1.0")]
#[command(about = "Handshake and keep-alive probe for the meshmesh API bridge", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Bridge address to connect to (e.g., 127.0.0.1:6053)
    #[arg(short, long)]
    pub target: Option<String>,

    /// Mesh node address announced in the handshake line
    #[arg(short, long)]
    pub node: Option<String>,

    /// Node port announced in the handshake line
    #[arg(short = 'p', long)]
    pub node_port: Option<u16>,

    /// Client identification sent in the hello payload
    #[arg(long)]
    pub client_info: Option<String>,

    /// End the session when the bridge does not acknowledge the handshake
    #[arg(long)]
    pub exit_on_reject: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub target: TargetConfig,
    #[serde(default)]
    pub handshake: HandshakeConfig,
    #[serde(default)]
    pub hello: HelloConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where to connect
#[derive(Debug, Deserialize)]
pub struct TargetConfig {
    /// Bridge address
    #[serde(default = "default_address")]
    pub address: String,
    /// Connect timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            connect_timeout_ms: default_timeout_ms(),
        }
    }
}

/// Handshake line and acknowledgment handling
#[derive(Debug, Deserialize)]
pub struct HandshakeConfig {
    /// Node address announced in the handshake line
    #[serde(default = "default_node")]
    pub node: String,
    /// Node port announced in the handshake line
    #[serde(default = "default_node_port")]
    pub port: u16,
    /// Delay between the acknowledgment and the hello payload in milliseconds
    #[serde(default = "default_ack_delay_ms")]
    pub ack_delay_ms: u64,
    /// Stop instead of monitoring when the acknowledgment does not match
    #[serde(default)]
    pub exit_on_reject: bool,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            node: default_node(),
            port: default_node_port(),
            ack_delay_ms: default_ack_delay_ms(),
            exit_on_reject: false,
        }
    }
}

/// Hello payload sent after the acknowledgment
#[derive(Debug, Deserialize)]
pub struct HelloConfig {
    #[serde(default = "default_client_info")]
    pub client_info: String,
    #[serde(default = "default_api_version_major")]
    pub api_version_major: u32,
    #[serde(default = "default_api_version_minor")]
    pub api_version_minor: u32,
    /// Raw payload as hex; replaces the encoded hello frame when set
    pub payload_hex: Option<String>,
}

impl Default for HelloConfig {
    fn default() -> Self {
        Self {
            client_info: default_client_info(),
            api_version_major: default_api_version_major(),
            api_version_minor: default_api_version_minor(),
            payload_hex: None,
        }
    }
}

/// Read loop tuning
#[derive(Debug, Deserialize)]
pub struct SessionConfig {
    /// Read timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub read_timeout_ms: u64,
    /// Pause after a read timeout in milliseconds
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Maximum bytes taken by a single read
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            read_timeout_ms: default_timeout_ms(),
            retry_delay_ms: default_retry_delay_ms(),
            read_buffer_size: default_read_buffer_size(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_address() -> String {
    "127.0.0.1:6053".to_string()
}

fn default_timeout_ms() -> u64 {
    5_000
}

fn default_node() -> String {
    "0.28.139.56".to_string()
}

fn default_node_port() -> u16 {
    6053
}

fn default_ack_delay_ms() -> u64 {
    500
}

fn default_client_info() -> String {
    "aioesphomeapi".to_string()
}

fn default_api_version_major() -> u32 {
    1
}

fn default_api_version_minor() -> u32 {
    7
}

fn default_retry_delay_ms() -> u64 {
    100
}

fn default_read_buffer_size() -> usize {
    4096
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub target: String,
    pub connect_timeout: Duration,
    pub handshake: HandshakeLine,
    pub ack_delay: Duration,
    pub exit_on_reject: bool,
    pub payload: Bytes,
    pub read_timeout: Duration,
    pub retry_delay: Duration,
    pub read_buffer_size: usize,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();

        // Load TOML config if specified
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Self::resolve(cli, toml_config)
    }

    /// Merge CLI args over file values.
    pub fn resolve(cli: CliArgs, file: TomlConfig) -> Result<Self, ConfigError> {
        let hello = HelloRequest {
            client_info: cli.client_info.unwrap_or(file.hello.client_info),
            api_version_major: file.hello.api_version_major,
            api_version_minor: file.hello.api_version_minor,
        };

        let payload = match file.hello.payload_hex {
            Some(raw) => {
                let bytes = hex::decode(raw.trim()).map_err(ConfigError::InvalidPayload)?;
                Bytes::from(bytes)
            }
            None => hello.to_frame().encode().freeze(),
        };

        let handshake = HandshakeLine::new(
            cli.node.unwrap_or(file.handshake.node),
            cli.node_port.unwrap_or(file.handshake.port),
        );
        // The bridge splits on '|'; the line must read back as written.
        let echoed = HandshakeLine::parse(&handshake.to_string())
            .map_err(ConfigError::InvalidHandshake)?;
        if echoed != handshake {
            return Err(ConfigError::InvalidHandshake(HandshakeError::MissingNode));
        }

        Ok(Config {
            target: cli.target.unwrap_or(file.target.address),
            connect_timeout: Duration::from_millis(file.target.connect_timeout_ms),
            handshake,
            ack_delay: Duration::from_millis(file.handshake.ack_delay_ms),
            exit_on_reject: cli.exit_on_reject || file.handshake.exit_on_reject,
            payload,
            read_timeout: Duration::from_millis(file.session.read_timeout_ms),
            retry_delay: Duration::from_millis(file.session.retry_delay_ms),
            read_buffer_size: file.session.read_buffer_size.max(1),
            log_level: cli.log_level.unwrap_or(file.logging.level),
        })
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
    InvalidPayload(hex::FromHexError),
    InvalidHandshake(HandshakeError),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileRead(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::TomlParse(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::InvalidPayload(e) => write!(f, "Invalid hello.payload_hex: {}", e),
            ConfigError::InvalidHandshake(e) => write!(f, "Invalid handshake node: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}
