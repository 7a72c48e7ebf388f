use chrono::{DateTime, SubsecRound, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::agent_modules::config::AgentConfig;
use crate::agent_modules::error::AgentError;
use crate::agent_modules::parser::ContainerRecord;

pub const TAG_SERVER_ID: &str = "server_id";
pub const TAG_SERVER_ROLE: &str = "server_role";
pub const TAG_CONTAINER: &str = "container";

pub const FIELD_MEMORY_USAGE: &str = "memory_usage";
pub const FIELD_MEMORY_PERCENTAGE: &str = "memory_percentage";
pub const FIELD_CPU_PERCENTAGE: &str = "cpu_percentage";

// Optional sign, optional integer part with a dot, then at least one digit.
static NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[+-]?([0-9]*[.])?[0-9]+").expect("numeric pattern compiles"));

/// One tagged observation for a single container.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricPoint {
    pub measurement: String,
    pub tags: BTreeMap<String, String>,
    pub fields: BTreeMap<String, f64>,
    /// Wall-clock time of construction, truncated to whole seconds.
    pub timestamp: DateTime<Utc>,
}

/// First number found anywhere in `text`, units and trailing text ignored.
/// `"12.3MiB / 1.9GiB"` gives `12.3`, the used amount rather than the limit.
pub fn extract_number(text: &str) -> Option<f64> {
    let found = NUMBER_RE.find(text)?;
    found
        .as_str()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

fn extract_field(field: &'static str, value: &str) -> Result<f64, AgentError> {
    extract_number(value).ok_or_else(|| AgentError::Extract {
        field,
        value: value.to_string(),
    })
}

pub fn build_tags(
    record: &ContainerRecord,
    config: &AgentConfig,
) -> Result<BTreeMap<String, String>, AgentError> {
    let tags = [
        (TAG_SERVER_ID, config.server_id.clone()),
        (TAG_SERVER_ROLE, config.server_role.to_lowercase()),
        (TAG_CONTAINER, record.name.clone()),
    ];

    let mut map = BTreeMap::new();
    for (key, value) in tags {
        if value.trim().is_empty() {
            return Err(AgentError::EmptyTag(key));
        }
        map.insert(key.to_string(), value);
    }
    Ok(map)
}

pub fn extract_point(
    record: &ContainerRecord,
    config: &AgentConfig,
) -> Result<MetricPoint, AgentError> {
    let tags = build_tags(record, config)?;

    let mut fields = BTreeMap::new();
    fields.insert(
        FIELD_MEMORY_USAGE.to_string(),
        extract_field(FIELD_MEMORY_USAGE, &record.memory_usage)?,
    );
    fields.insert(
        FIELD_MEMORY_PERCENTAGE.to_string(),
        extract_field(FIELD_MEMORY_PERCENTAGE, &record.memory_percentage)?,
    );
    fields.insert(
        FIELD_CPU_PERCENTAGE.to_string(),
        extract_field(FIELD_CPU_PERCENTAGE, &record.cpu_percentage)?,
    );

    Ok(MetricPoint {
        measurement: config.influxdb_measurement.clone(),
        tags,
        fields,
        timestamp: Utc::now().trunc_subsecs(0),
    })
}

/// Turns every usable record into a point. A record that cannot be converted
/// is logged and left out; the rest of the snapshot is unaffected.
pub fn extract_points(records: &[ContainerRecord], config: &AgentConfig) -> Vec<MetricPoint> {
    let mut points = Vec::with_capacity(records.len());
    for record in records {
        match extract_point(record, config) {
            Ok(point) => points.push(point),
            Err(e) => {
                warn!(container_id = %record.id, container = %record.name, error = %e, "Skipping container record.");
            }
        }
    }
    debug!(
        records = records.len(),
        points = points.len(),
        "Extracted metric points."
    );
    points
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent_modules::config::{AgentCli, FileConfig};

    fn config(server_id: &str, role: &str) -> AgentConfig {
        let cli = AgentCli {
            server_role: Some(role.to_string()),
            ..Default::default()
        };
        AgentConfig::from_layers(&cli, FileConfig::default(), server_id.to_string())
    }

    fn record(name: &str, mem: &str, mem_pct: &str, cpu: &str) -> ContainerRecord {
        ContainerRecord {
            id: format!("id-{name}"),
            name: name.into(),
            memory_usage: mem.into(),
            memory_percentage: mem_pct.into(),
            cpu_percentage: cpu.into(),
        }
    }

    #[test]
    fn test_extract_number_takes_first_match() {
        assert_eq!(extract_number("12.3MiB / 1.9GiB"), Some(12.3));
        assert_eq!(extract_number("0.42%"), Some(0.42));
        assert_eq!(extract_number("-3.5"), Some(-3.5));
        assert_eq!(extract_number("+7"), Some(7.0));
        assert_eq!(extract_number(".5%"), Some(0.5));
        assert_eq!(extract_number("usage: 1.2.3"), Some(1.2));
        assert_eq!(extract_number("1,024KiB"), Some(1.0));
    }

    #[test]
    fn test_extract_number_without_digits() {
        assert_eq!(extract_number(""), None);
        assert_eq!(extract_number("--"), None);
        assert_eq!(extract_number("N/A"), None);
        assert_eq!(extract_number("%"), None);
    }

    #[test]
    fn test_extract_number_rejects_overflow() {
        let huge = "9".repeat(400);
        assert_eq!(extract_number(&huge), None);
    }

    #[test]
    fn test_server_role_is_lowercased() {
        let tags = build_tags(&record("web", "1MiB", "1%", "1%"), &config("10.0.0.5", "App")).unwrap();
        assert_eq!(tags[TAG_SERVER_ROLE], "app");

        let tags = build_tags(&record("web", "1MiB", "1%", "1%"), &config("h", "BACKEND-Worker")).unwrap();
        assert_eq!(tags[TAG_SERVER_ROLE], "backend-worker");
    }

    #[test]
    fn test_empty_container_name_is_rejected() {
        let result = build_tags(&record("", "1MiB", "1%", "1%"), &config("h", "app"));
        assert!(matches!(result, Err(AgentError::EmptyTag(TAG_CONTAINER))));
    }

    #[test]
    fn test_end_to_end_single_record() {
        let raw = b"{\"id\":\"1\",\"name\":\"web\",\"memory_usage\":\"50MiB / 100MiB\",\"memory_percentage\":\"50.00%\",\"cpu_percentage\":\"2.50%\"},\n";
        let records = crate::agent_modules::parser::parse_records(raw);
        let before = Utc::now().trunc_subsecs(0);

        let points = extract_points(&records, &config("10.0.0.5", "App"));

        assert_eq!(points.len(), 1);
        let point = &points[0];
        assert_eq!(point.measurement, "docker_stats");

        let expected_tags: BTreeMap<String, String> = [
            ("server_id", "10.0.0.5"),
            ("server_role", "app"),
            ("container", "web"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        assert_eq!(point.tags, expected_tags);

        let expected_fields: BTreeMap<String, f64> = [
            ("memory_usage", 50.0),
            ("memory_percentage", 50.0),
            ("cpu_percentage", 2.5),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        assert_eq!(point.fields, expected_fields);

        assert!(point.timestamp >= before);
        assert_eq!(point.timestamp.timestamp_subsec_nanos(), 0);
    }

    #[test]
    fn test_bad_record_is_skipped_others_kept() {
        let records = vec![
            record("web", "50MiB / 100MiB", "50.00%", "2.50%"),
            record("starting", "--", "--", "--"),
            record("db", "1.5GiB / 4GiB", "37.50%", "0.10%"),
            record("", "1MiB", "1%", "1%"),
        ];

        let points = extract_points(&records, &config("h", "app"));

        let containers: Vec<&str> = points
            .iter()
            .map(|p| p.tags[TAG_CONTAINER].as_str())
            .collect();
        assert_eq!(containers, vec!["web", "db"]);
        assert_eq!(points[1].fields[FIELD_MEMORY_USAGE], 1.5);
    }

    #[test]
    fn test_extract_error_names_the_field() {
        let err = extract_point(&record("web", "1MiB", "1%", "n/a"), &config("h", "app")).unwrap_err();
        match err {
            AgentError::Extract { field, value } => {
                assert_eq!(field, FIELD_CPU_PERCENTAGE);
                assert_eq!(value, "n/a");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_no_records_no_points() {
        assert!(extract_points(&[], &config("h", "app")).is_empty());
    }
}
