use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command as TokioCommand;
use tracing::{debug, error};

use crate::agent_modules::error::AgentError;

/// Go template handed to `docker stats`: one JSON object per container,
/// each terminated by a comma.
pub const STATS_FORMAT: &str = r#"{"id": "{{.ID}}", "name": "{{.Name}}", "memory_usage": "{{.MemUsage}}", "memory_percentage": "{{.MemPerc}}", "cpu_percentage": "{{.CPUPerc}}"},"#;

/// Produces one raw stats snapshot per call.
#[async_trait]
pub trait StatsSource: Send + Sync {
    async fn invoke(&self) -> Result<Vec<u8>, AgentError>;
}

pub struct DockerStats {
    docker_bin: String,
}

impl DockerStats {
    pub fn new(docker_bin: impl Into<String>) -> Self {
        Self {
            docker_bin: docker_bin.into(),
        }
    }

    fn command(&self) -> TokioCommand {
        let mut command = TokioCommand::new(&self.docker_bin);
        command.args(["stats", "--no-stream", "--format", STATS_FORMAT]);
        command.stdin(Stdio::null());
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());
        command.kill_on_drop(true);
        command
    }
}

#[async_trait]
impl StatsSource for DockerStats {
    async fn invoke(&self) -> Result<Vec<u8>, AgentError> {
        let output = self.command().output().await.map_err(|e| {
            error!(command = %self.docker_bin, error = %e, "Failed to spawn stats command.");
            AgentError::CommandSpawn {
                command: self.docker_bin.clone(),
                source: e,
            }
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            error!(status = %output.status, stderr = %stderr, "Stats command failed.");
            return Err(AgentError::CommandFailed {
                status: output.status,
                stderr,
            });
        }

        debug!(bytes = output.stdout.len(), "Captured stats command output.");
        Ok(output.stdout)
    }
}
