//! Decoding of `docker stats` output.
//!
//! The stats command prints one JSON object per container, each followed by a
//! `,` separator and a newline, without any enclosing array. Every line is
//! decoded on its own, so an empty snapshot or a stray trailing separator needs
//! no special handling and one damaged line does not hide the others.
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::agent_modules::error::AgentError;

/// One container as reported by a single stats snapshot.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ContainerRecord {
    pub id: String,
    pub name: String,
    /// e.g. "12.3MiB / 1.9GiB"
    pub memory_usage: String,
    /// e.g. "0.65%"
    pub memory_percentage: String,
    /// e.g. "1.23%"
    pub cpu_percentage: String,
}

/// Decodes a single fragment, with or without its trailing separator.
pub fn parse_fragment(fragment: &str) -> Result<ContainerRecord, AgentError> {
    let body = fragment.trim();
    let body = body.strip_suffix(',').unwrap_or(body).trim_end();
    Ok(serde_json::from_str(body)?)
}

/// Decodes every fragment in `raw`, in output order. Undecodable fragments are
/// logged and skipped.
pub fn parse_records(raw: &[u8]) -> Vec<ContainerRecord> {
    let text = String::from_utf8_lossy(raw);
    let mut records = Vec::new();

    for (line_no, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match parse_fragment(line) {
            Ok(record) => records.push(record),
            Err(e) => {
                warn!(line = line_no + 1, fragment = %line.trim(), error = %e, "Skipping malformed stats fragment.");
            }
        }
    }

    records
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, name: &str, mem: &str, mem_pct: &str, cpu: &str) -> ContainerRecord {
        ContainerRecord {
            id: id.into(),
            name: name.into(),
            memory_usage: mem.into(),
            memory_percentage: mem_pct.into(),
            cpu_percentage: cpu.into(),
        }
    }

    /// Renders records the way the stats command does.
    fn render(records: &[ContainerRecord]) -> String {
        records
            .iter()
            .map(|r| format!("{},\n", serde_json::to_string(r).unwrap()))
            .collect()
    }

    #[test]
    fn test_empty_input_yields_no_records() {
        assert!(parse_records(b"").is_empty());
        assert!(parse_records(b"\n").is_empty());
        assert!(parse_records(b"  \n\t\n").is_empty());
    }

    #[test]
    fn test_single_docker_line() {
        let raw = b"{\"id\": \"4f2a\", \"name\": \"web\", \"memory_usage\": \"12.3MiB / 1.9GiB\", \"memory_percentage\": \"0.65%\", \"cpu_percentage\": \"1.23%\"},\n";
        let records = parse_records(raw);
        assert_eq!(
            records,
            vec![record("4f2a", "web", "12.3MiB / 1.9GiB", "0.65%", "1.23%")]
        );
    }

    #[test]
    fn test_round_trip_preserves_order() {
        let records = vec![
            record("1", "web", "50MiB / 100MiB", "50.00%", "2.50%"),
            record("2", "db", "1.2GiB / 3.8GiB", "31.58%", "0.04%"),
            record("3", "cache", "--", "--", "--"),
        ];

        let parsed = parse_records(render(&records).as_bytes());

        assert_eq!(parsed, records);
        assert_eq!(render(&parsed), render(&records));
    }

    #[test]
    fn test_tolerates_missing_final_separator_and_crlf() {
        let raw = "{\"id\":\"1\",\"name\":\"a\",\"memory_usage\":\"1MiB\",\"memory_percentage\":\"1%\",\"cpu_percentage\":\"1%\"},\r\n\
                   {\"id\":\"2\",\"name\":\"b\",\"memory_usage\":\"2MiB\",\"memory_percentage\":\"2%\",\"cpu_percentage\":\"2%\"}";
        let records = parse_records(raw.as_bytes());
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].name, "b");
    }

    #[test]
    fn test_malformed_fragment_is_skipped() {
        let raw = "{\"id\":\"1\",\"name\":\"a\",\"memory_usage\":\"1MiB\",\"memory_percentage\":\"1%\",\"cpu_percentage\":\"1%\"},\n\
                   {\"id\":\"2\",\"name\":\"b\",\"memory_usage\":\n\
                   {\"id\":\"3\",\"name\":\"c\",\"memory_usage\":\"3MiB\",\"memory_percentage\":\"3%\",\"cpu_percentage\":\"3%\"},\n";
        let names: Vec<String> = parse_records(raw.as_bytes())
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["a", "c"]);
    }

    #[test]
    fn test_fragment_requires_all_string_fields() {
        let missing = parse_fragment(r#"{"id":"1","name":"a","memory_usage":"1MiB","memory_percentage":"1%"},"#);
        assert!(matches!(missing, Err(AgentError::Decode(_))));

        let numeric = parse_fragment(
            r#"{"id":1,"name":"a","memory_usage":"1MiB","memory_percentage":"1%","cpu_percentage":"1%"}"#,
        );
        assert!(matches!(numeric, Err(AgentError::Decode(_))));
    }

    #[test]
    fn test_garbage_output_yields_no_records() {
        assert!(parse_records(b"Cannot connect to the Docker daemon\n").is_empty());
        assert!(parse_records(&[0xff, 0xfe, b',', b'\n']).is_empty());
    }
}
