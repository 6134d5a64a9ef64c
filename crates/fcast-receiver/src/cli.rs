//! Command-line interface definition.

use std::net::IpAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::ReceiverConfig;
use crate::logging::{TracingConfig, TracingOutputFormat};

/// fcast-receiver - Play media sent from FCast senders
#[derive(Debug, Parser)]
#[command(name = "fcast-receiver")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = "FCAST_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v')]
    pub debug: bool,

    /// Log output format
    #[arg(long, value_enum)]
    pub log_format: Option<TracingOutputFormat>,

    // --- Overrides for config.toml ---
    /// TCP port to listen on
    #[arg(long, short)]
    pub port: Option<u16>,

    /// Address to listen on
    #[arg(long)]
    pub bind: Option<IpAddr>,

    /// Do not start the manifest HTTP server
    #[arg(long)]
    pub no_manifest_server: bool,

    /// Show desktop notifications
    #[arg(long)]
    pub desktop_notifications: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Configuration actions.
#[derive(Debug, Clone, Copy, Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Dump,
    /// Print the configuration file path
    Path,
}

impl Cli {
    /// Applies command-line overrides on top of the loaded configuration.
    pub fn apply_overrides(&self, mut config: ReceiverConfig) -> ReceiverConfig {
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(bind) = self.bind {
            config.server.bind_address = bind;
        }
        if self.no_manifest_server {
            config.manifest.enabled = false;
        }
        if self.desktop_notifications {
            config.notifications.desktop = true;
        }
        config
    }

    /// Returns the tracing configuration selected by the flags.
    pub fn tracing_config(&self) -> TracingConfig {
        let config = if self.debug {
            TracingConfig::debug()
        } else {
            TracingConfig::default()
        };
        match self.log_format {
            Some(format) => config.with_format(format),
            None => config,
        }
    }

    /// Returns the configuration file in effect.
    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(ReceiverConfig::default_path)
    }
}
