use std::process::ExitStatus;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Could not determine outbound IP address: {0}")]
    OutboundIp(String),
    #[error("Failed to spawn stats command '{command}': {source}")]
    CommandSpawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Stats command exited with {status}: {stderr}")]
    CommandFailed { status: ExitStatus, stderr: String },
    #[error("Failed to decode stats fragment: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("No number in field '{field}' (value: {value:?})")]
    Extract { field: &'static str, value: String },
    #[error("Tag '{0}' is empty")]
    EmptyTag(&'static str),
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),
    #[error("Write request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Store rejected write with status {status}: {body}")]
    StoreRejected { status: u16, body: String },
    #[error("Failed to read config file '{path}': {source}")]
    ConfigRead {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {source}")]
    ConfigParse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}
