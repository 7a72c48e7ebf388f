use clap::Parser;
use serde::Deserialize;
use std::{fs, path::Path, time::Duration};
use tracing::{error, info, warn};

use crate::agent_modules::error::AgentError;
use crate::agent_modules::identity::resolve_outbound_ip;
use crate::version::AGENT_VERSION;

pub const DEFAULT_INFLUXDB_ADDRESS: &str = "http://localhost:8086";
pub const DEFAULT_INFLUXDB_DBNAME: &str = "mydb";
pub const DEFAULT_INFLUXDB_MEASUREMENT: &str = "docker_stats";
pub const DEFAULT_SERVER_ROLE: &str = "app";
pub const DEFAULT_DOCKER_BIN: &str = "docker";
pub const DEFAULT_LOG_DIR: &str = "logs";
pub const DEFAULT_INTERVAL_SECONDS: u64 = 15;

/// Command line surface. Every option can also come from the environment;
/// anything left unset falls through to the config file and then to defaults.
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "docker-stats-agent", version = AGENT_VERSION, about = "Ships docker stats to InfluxDB")]
pub struct AgentCli {
    /// Optional TOML file with the same keys as the long options (snake_case).
    #[arg(long, env = "AGENT_CONFIG")]
    pub config: Option<String>,

    #[arg(long, env = "INFLUXDB_ADDRESS")]
    pub influxdb_address: Option<String>,

    #[arg(long, env = "INFLUXDB_DBNAME")]
    pub influxdb_dbname: Option<String>,

    #[arg(long, env = "INFLUXDB_MEASUREMENT")]
    pub influxdb_measurement: Option<String>,

    #[arg(long, env = "INFLUXDB_USERNAME")]
    pub influxdb_username: Option<String>,

    #[arg(long, env = "INFLUXDB_PASSWORD", hide_env_values = true)]
    pub influxdb_password: Option<String>,

    /// Defaults to the address of the interface used for outbound traffic.
    #[arg(long, env = "SERVER_ID")]
    pub server_id: Option<String>,

    #[arg(long, env = "SERVER_ROLE")]
    pub server_role: Option<String>,

    #[arg(long, env = "COLLECT_INTERVAL_SECONDS")]
    pub interval_seconds: Option<u64>,

    #[arg(long, env = "DOCKER_BIN")]
    pub docker_bin: Option<String>,

    #[arg(long, env = "LOG_DIR")]
    pub log_dir: Option<String>,

    /// Collect and write a single batch, then exit.
    #[arg(long)]
    pub once: bool,
}

// Partial config for layering
#[derive(Deserialize, Default, Debug)]
pub struct FileConfig {
    pub influxdb_address: Option<String>,
    pub influxdb_dbname: Option<String>,
    pub influxdb_measurement: Option<String>,
    pub influxdb_username: Option<String>,
    pub influxdb_password: Option<String>,
    pub server_id: Option<String>,
    pub server_role: Option<String>,
    pub interval_seconds: Option<u64>,
    pub docker_bin: Option<String>,
}

/// Immutable run configuration, built once before the collection loop starts.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub influxdb_address: String,
    pub influxdb_dbname: String,
    pub influxdb_measurement: String,
    pub influxdb_username: Option<String>,
    pub influxdb_password: Option<String>,
    pub server_id: String,
    /// Kept as configured; lower-cased when tags are built.
    pub server_role: String,
    pub collect_interval: Duration,
    pub docker_bin: String,
}

impl AgentConfig {
    /// Merges the layers: flag/env beats file, file beats default.
    pub fn from_layers(cli: &AgentCli, file: FileConfig, server_id: String) -> Self {
        let interval_seconds = match cli.interval_seconds.or(file.interval_seconds) {
            Some(0) => {
                warn!(
                    fallback = DEFAULT_INTERVAL_SECONDS,
                    "Collect interval of 0 seconds is not allowed, falling back to default."
                );
                DEFAULT_INTERVAL_SECONDS
            }
            Some(secs) => secs,
            None => DEFAULT_INTERVAL_SECONDS,
        };

        AgentConfig {
            influxdb_address: cli
                .influxdb_address
                .clone()
                .or(file.influxdb_address)
                .unwrap_or_else(|| DEFAULT_INFLUXDB_ADDRESS.to_string()),
            influxdb_dbname: cli
                .influxdb_dbname
                .clone()
                .or(file.influxdb_dbname)
                .unwrap_or_else(|| DEFAULT_INFLUXDB_DBNAME.to_string()),
            influxdb_measurement: cli
                .influxdb_measurement
                .clone()
                .or(file.influxdb_measurement)
                .unwrap_or_else(|| DEFAULT_INFLUXDB_MEASUREMENT.to_string()),
            influxdb_username: cli.influxdb_username.clone().or(file.influxdb_username),
            influxdb_password: cli.influxdb_password.clone().or(file.influxdb_password),
            server_id,
            server_role: cli
                .server_role
                .clone()
                .or(file.server_role)
                .unwrap_or_else(|| DEFAULT_SERVER_ROLE.to_string()),
            collect_interval: Duration::from_secs(interval_seconds),
            docker_bin: cli
                .docker_bin
                .clone()
                .or(file.docker_bin)
                .unwrap_or_else(|| DEFAULT_DOCKER_BIN.to_string()),
        }
    }
}

pub fn load_file_config(config_path_str: &str) -> Result<FileConfig, AgentError> {
    let config_path = Path::new(config_path_str);
    // Canonicalize only for the log line; a missing file is reported by the read below.
    let absolute_path_display = config_path
        .canonicalize()
        .unwrap_or_else(|_| config_path.to_path_buf());
    info!(path = ?absolute_path_display, "Attempting to load config.");

    let config_str = fs::read_to_string(config_path).map_err(|e| {
        error!(path = %config_path_str, error = %e, "Failed to read agent config file.");
        AgentError::ConfigRead {
            path: config_path_str.to_string(),
            source: e,
        }
    })?;

    toml::from_str(&config_str).map_err(|e| {
        error!(path = %config_path_str, error = %e, "Failed to parse agent config file.");
        AgentError::ConfigParse {
            path: config_path_str.to_string(),
            source: e,
        }
    })
}

/// Builds the run configuration, probing the outbound IP only when no server id
/// was given anywhere.
pub async fn resolve_config(cli: &AgentCli) -> Result<AgentConfig, AgentError> {
    let file_config = match &cli.config {
        Some(path) => load_file_config(path)?,
        None => FileConfig::default(),
    };

    let server_id = match cli.server_id.clone().or_else(|| file_config.server_id.clone()) {
        Some(id) => id,
        None => {
            let ip = resolve_outbound_ip().await?;
            info!(server_id = %ip, "No server id configured, using outbound IP.");
            ip
        }
    };

    let config = AgentConfig::from_layers(cli, file_config, server_id);
    info!(
        influxdb_address = %config.influxdb_address,
        influxdb_dbname = %config.influxdb_dbname,
        measurement = %config.influxdb_measurement,
        server_id = %config.server_id,
        server_role = %config.server_role,
        interval_seconds = config.collect_interval.as_secs(),
        "Loaded config successfully."
    );
    Ok(config)
}
