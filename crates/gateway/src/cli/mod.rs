pub mod config;
pub mod devices;

use std::path::Path;

use anyhow::Context;
use clap::{Parser, Subcommand};

use pb_domain::config::Config;

/// podbridge: bridges robot audio to speech-recognition back-ends.
#[derive(Debug, Parser)]
#[command(name = "podbridge", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the gateway server (default when no subcommand is given).
    Serve,
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// List the robots configured in `[devices]`.
    Devices,
    /// Print version information.
    Version,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any errors.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

// ── Config loading helper ─────────────────────────────────────────────

/// Load the configuration from the path in `PB_CONFIG` (or `config.toml`).
/// Returns the parsed [`Config`] and the path that was used.
pub fn load_config() -> anyhow::Result<(Config, String)> {
    let config_path = std::env::var("PB_CONFIG").unwrap_or_else(|_| "config.toml".into());
    let config = load_config_from(&config_path)?;
    Ok((config, config_path))
}

/// Parse `path`; a missing file yields the defaults.
pub fn load_config_from(path: impl AsRef<Path>) -> anyhow::Result<Config> {
    let path = path.as_ref();
    Config::load(path).with_context(|| format!("loading {}", path.display()))
}
