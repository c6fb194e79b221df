//! Configuration management for Latchkey server
//!
//! Settings come from `conf/application.yml`, overlaid by `LATCHKEY__*`
//! environment variables and finally by command line flags.

use anyhow::Context;
use clap::Parser;
use config::{Config, ConfigError, Environment};
use latchkey_core::LockConfig;

use super::constants::{
    DEFAULT_CONFIG_FILE, DEFAULT_SERVER_ADDRESS, DEFAULT_SERVER_PORT, ENV_PREFIX, ENV_SEPARATOR,
    LOCK_PROPERTY, LOGGING_CONSOLE_PROPERTY, LOGGING_DIR_PROPERTY, LOGGING_FILE_PROPERTY,
    LOGGING_LEVEL_PROPERTY, LOGGING_ROTATION_PROPERTY, NODES_PROPERTY, SERVER_ADDRESS_PROPERTY,
    SERVER_PORT_PROPERTY,
};
use crate::startup::LoggingConfig;

/// Command line arguments for the server
#[derive(Debug, Parser)]
#[command(name = "latchkey-server", version, about = "Quorum distributed lock server")]
pub struct Cli {
    /// Configuration file
    #[arg(short = 'c', long = "config", default_value = DEFAULT_CONFIG_FILE)]
    pub config: String,
    /// HTTP port
    #[arg(short = 'p', long = "port", env = "PORT")]
    pub port: Option<u16>,
    /// Storage node endpoint, repeat for every node
    #[arg(short = 'n', long = "node")]
    pub nodes: Vec<String>,
}

/// Application configuration loaded from config files and environment
#[derive(Clone, Debug, Default)]
pub struct Configuration {
    pub config: Config,
}

impl Configuration {
    pub fn new() -> anyhow::Result<Self> {
        Self::from_cli(Cli::parse())
    }

    pub fn from_cli(args: Cli) -> anyhow::Result<Self> {
        let mut config_builder = Config::builder()
            .add_source(config::File::with_name(&args.config).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator(ENV_SEPARATOR)
                    .list_separator(",")
                    .with_list_parse_key(NODES_PROPERTY)
                    .try_parsing(true),
            );

        if let Some(port) = args.port {
            config_builder = config_builder
                .set_override(SERVER_PORT_PROPERTY, i64::from(port))
                .context("failed to set server port override")?;
        }
        if !args.nodes.is_empty() {
            config_builder = config_builder
                .set_override(NODES_PROPERTY, args.nodes)
                .context("failed to set storage node override")?;
        }

        let config = config_builder
            .build()
            .with_context(|| format!("failed to build configuration from {}", args.config))?;

        Ok(Configuration { config })
    }

    // ========================================================================
    // Server Configuration
    // ========================================================================

    pub fn server_address(&self) -> String {
        self.config
            .get_string(SERVER_ADDRESS_PROPERTY)
            .unwrap_or(DEFAULT_SERVER_ADDRESS.to_string())
    }

    pub fn server_port(&self) -> u16 {
        self.config
            .get_int(SERVER_PORT_PROPERTY)
            .ok()
            .and_then(|port| u16::try_from(port).ok())
            .unwrap_or(DEFAULT_SERVER_PORT)
    }

    // ========================================================================
    // Lock Configuration
    // ========================================================================

    /// Storage node endpoints, empty when none are configured
    pub fn nodes(&self) -> Vec<String> {
        self.config
            .get::<Vec<String>>(NODES_PROPERTY)
            .unwrap_or_default()
            .into_iter()
            .map(|endpoint| endpoint.trim().to_string())
            .filter(|endpoint| !endpoint.is_empty())
            .collect()
    }

    pub fn lock_config(&self) -> anyhow::Result<LockConfig> {
        let lock_config = match self.config.get::<LockConfig>(LOCK_PROPERTY) {
            Ok(lock_config) => lock_config,
            Err(ConfigError::NotFound(_)) => LockConfig::default(),
            Err(e) => return Err(e).context("invalid lock configuration"),
        };
        lock_config.validate()?;
        Ok(lock_config)
    }

    // ========================================================================
    // Logging Configuration
    // ========================================================================

    pub fn logging_config(&self) -> LoggingConfig {
        LoggingConfig::from_config(
            self.config.get_string(LOGGING_DIR_PROPERTY).ok(),
            self.config.get_bool(LOGGING_CONSOLE_PROPERTY).unwrap_or(true),
            self.config.get_bool(LOGGING_FILE_PROPERTY).unwrap_or(false),
            self.config
                .get_string(LOGGING_LEVEL_PROPERTY)
                .unwrap_or("info".to_string()),
            self.config.get_string(LOGGING_ROTATION_PROPERTY).ok(),
        )
    }
}
