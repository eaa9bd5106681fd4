use crate::consolidated::LogFormat;
use crate::display::DisplayFilter;
use crate::error::ListenerError;
use crate::log_entry::Level;
use crate::receiver::Transport;
use crate::session::RebootPolicy;
use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::net::Ipv4Addr;
use std::path::PathBuf;

#[derive(Parser, Debug, Default)]
#[clap(name = "udp-log-listener", version, about = "Listen for device log lines over UDP")]
pub struct Cli {
    /// Path to an optional TOML configuration file
    #[clap(long)]
    pub config: Option<PathBuf>,

    /// Multicast group to join
    #[clap(long)]
    pub multicast: Option<Ipv4Addr>,

    /// Use unicast instead of multicast (listen on --host)
    #[clap(long)]
    pub unicast: bool,

    /// Host to bind to in unicast mode
    #[clap(long)]
    pub host: Option<String>,

    /// UDP port to listen on
    #[clap(long)]
    pub port: Option<u16>,

    /// Minimum log level to display
    #[clap(long, value_enum)]
    pub filter: Option<Level>,

    /// Hide records whose function field contains any of these file paths
    #[clap(long, num_args = 0..)]
    pub exclude_files: Option<Vec<String>>,

    /// Hide records whose function field contains any of these names
    #[clap(long, num_args = 0..)]
    pub exclude_functions: Option<Vec<String>>,

    /// Disable colored output
    #[clap(long)]
    pub no_color: bool,

    /// Do not print lines that fail to parse
    #[clap(long)]
    pub hide_unparsed: bool,

    /// Also write every datagram to this file
    #[clap(long)]
    pub log_file: Option<PathBuf>,

    /// Format of --log-file
    #[clap(long, value_enum)]
    pub log_format: Option<LogFormat>,

    /// Disable per-device session log files
    #[clap(long)]
    pub no_auto_device_logs: bool,

    /// Directory for per-device session log files
    #[clap(long)]
    pub device_log_dir: Option<PathBuf>,

    /// Enable debug output for troubleshooting
    #[clap(long)]
    pub debug: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    Unicast,
    Multicast,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub mode: TransportMode,
    pub host: String,
    pub port: u16,
    pub multicast_group: Ipv4Addr,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            mode: TransportMode::Multicast,
            host: "0.0.0.0".to_string(),
            port: 514,
            multicast_group: Ipv4Addr::new(239, 255, 255, 250),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub min_level: Level,
    pub exclude_functions: Vec<String>,
    pub exclude_files: Vec<String>,
    pub color: bool,
    pub show_unparsed: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            min_level: Level::Verbose,
            exclude_functions: Vec::new(),
            exclude_files: Vec::new(),
            color: true,
            show_unparsed: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub device_logs: bool,
    pub device_log_dir: PathBuf,
    pub device_log_prefix: String,
    pub log_file: Option<PathBuf>,
    pub log_format: LogFormat,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            device_logs: true,
            device_log_dir: PathBuf::from("logs"),
            device_log_prefix: "energyme".to_string(),
            log_file: None,
            log_format: LogFormat::Structured,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub transport: TransportConfig,
    pub display: DisplayConfig,
    pub persistence: PersistenceConfig,
    pub reboot: RebootPolicy,
    pub debug: bool,
}

impl Config {
    pub fn transport(&self) -> Transport {
        match self.transport.mode {
            TransportMode::Unicast => Transport::Unicast {
                host: self.transport.host.clone(),
                port: self.transport.port,
            },
            TransportMode::Multicast => Transport::Multicast {
                group: self.transport.multicast_group,
                port: self.transport.port,
            },
        }
    }

    pub fn display_filter(&self) -> DisplayFilter {
        DisplayFilter::new(
            self.display.min_level,
            &self.display.exclude_functions,
            &self.display.exclude_files,
        )
    }

    pub fn validate(&self) -> std::result::Result<(), ListenerError> {
        if self.transport.mode == TransportMode::Multicast
            && !self.transport.multicast_group.is_multicast()
        {
            return Err(ListenerError::Config(format!(
                "{} is not a multicast address",
                self.transport.multicast_group
            )));
        }
        if self.persistence.device_log_prefix.contains(['/', '\\']) {
            return Err(ListenerError::Config(
                "device_log_prefix must not contain path separators".to_string(),
            ));
        }
        Ok(())
    }
}

pub fn load_config(cli: &Cli) -> Result<Config> {
    let mut config: Config = match cli.config {
        Some(ref path) => {
            let config_content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&config_content).context("Failed to parse config file")?
        }
        None => Config::default(),
    };

    // Apply CLI overrides
    if cli.unicast {
        config.transport.mode = TransportMode::Unicast;
    }
    if let Some(group) = cli.multicast {
        config.transport.multicast_group = group;
        if !cli.unicast {
            config.transport.mode = TransportMode::Multicast;
        }
    }
    if let Some(ref host) = cli.host {
        config.transport.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.transport.port = port;
    }

    if let Some(level) = cli.filter {
        config.display.min_level = level;
    }
    if let Some(ref files) = cli.exclude_files {
        config.display.exclude_files = files.clone();
    }
    if let Some(ref functions) = cli.exclude_functions {
        config.display.exclude_functions = functions.clone();
    }
    if cli.no_color {
        config.display.color = false;
    }
    if cli.hide_unparsed {
        config.display.show_unparsed = false;
    }

    if let Some(ref log_file) = cli.log_file {
        config.persistence.log_file = Some(log_file.clone());
    }
    if let Some(format) = cli.log_format {
        config.persistence.log_format = format;
    }
    if cli.no_auto_device_logs {
        config.persistence.device_logs = false;
    }
    if let Some(ref dir) = cli.device_log_dir {
        config.persistence.device_log_dir = dir.clone();
    }

    if cli.debug {
        config.debug = true;
    }

    config.validate()?;
    Ok(config)
}
