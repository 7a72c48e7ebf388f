use async_trait::async_trait;
use std::fmt::Write as _;
use tracing::{debug, error, info};

use crate::agent_modules::config::AgentConfig;
use crate::agent_modules::error::AgentError;
use crate::agent_modules::metrics::MetricPoint;

/// Points of a single tick, bound to one database at second precision.
/// Consumed by the write, so it can only be sent once.
#[derive(Debug, Clone)]
pub struct Batch {
    database: String,
    points: Vec<MetricPoint>,
}

impl Batch {
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            points: Vec::new(),
        }
    }

    pub fn add_point(&mut self, point: MetricPoint) {
        self.points.push(point);
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    /// Timestamp precision query value understood by the store.
    pub fn precision(&self) -> &'static str {
        "s"
    }

    pub fn points(&self) -> &[MetricPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Line protocol body, one line per point.
    pub fn to_line_protocol(&self) -> String {
        let mut body = String::new();
        for point in &self.points {
            write_point_line(&mut body, point);
            body.push('\n');
        }
        body
    }
}

fn escape_measurement(out: &mut String, value: &str) {
    for c in value.chars() {
        if matches!(c, ',' | ' ') {
            out.push('\\');
        }
        out.push(c);
    }
}

fn escape_key_or_tag(out: &mut String, value: &str) {
    for c in value.chars() {
        if matches!(c, ',' | '=' | ' ') {
            out.push('\\');
        }
        out.push(c);
    }
}

fn write_point_line(out: &mut String, point: &MetricPoint) {
    escape_measurement(out, &point.measurement);
    for (key, value) in &point.tags {
        out.push(',');
        escape_key_or_tag(out, key);
        out.push('=');
        escape_key_or_tag(out, value);
    }
    for (i, (key, value)) in point.fields.iter().enumerate() {
        out.push(if i == 0 { ' ' } else { ',' });
        escape_key_or_tag(out, key);
        // Writing into a String cannot fail.
        let _ = write!(out, "={value}");
    }
    let _ = write!(out, " {}", point.timestamp.timestamp());
}

/// Destination for a tick's batch.
#[async_trait]
pub trait MetricsSink: Send + Sync {
    async fn write(&self, batch: Batch) -> Result<(), AgentError>;
}

/// Writes batches to the InfluxDB 1.x HTTP `/write` endpoint.
pub struct InfluxWriter {
    write_url: String,
    username: Option<String>,
    password: Option<String>,
}

impl InfluxWriter {
    pub fn new(config: &AgentConfig) -> Self {
        Self {
            write_url: format!("{}/write", config.influxdb_address.trim_end_matches('/')),
            username: config.influxdb_username.clone(),
            password: config.influxdb_password.clone(),
        }
    }
}

#[async_trait]
impl MetricsSink for InfluxWriter {
    async fn write(&self, batch: Batch) -> Result<(), AgentError> {
        if batch.is_empty() {
            debug!("Batch is empty, skipping write.");
            return Ok(());
        }

        // The client lives for this write only and is dropped on every return path.
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| AgentError::ClientBuild(e.to_string()))?;

        let mut request = client
            .post(&self.write_url)
            .query(&[("db", batch.database()), ("precision", batch.precision())])
            .body(batch.to_line_protocol());
        if let Some(username) = &self.username {
            request = request.basic_auth(username, self.password.as_ref());
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %body.trim(), "Store rejected metrics batch.");
            return Err(AgentError::StoreRejected {
                status: status.as_u16(),
                body: body.trim().to_string(),
            });
        }

        info!(
            database = %batch.database(),
            points = batch.len(),
            "Wrote metrics batch."
        );
        Ok(())
    }
}
