use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::agent_modules::config::AgentConfig;
use crate::agent_modules::metrics::extract_points;
use crate::agent_modules::parser::parse_records;
use crate::agent_modules::stats::StatsSource;
use crate::agent_modules::writer::{Batch, MetricsSink};

/// What a single collection tick ended with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The stats command failed; nothing was parsed.
    StatsUnavailable,
    /// The command ran but reported no usable container.
    NoRecords,
    /// Records were found but none produced a point.
    NoPoints,
    Written { points: usize },
    WriteFailed { points: usize },
}

/// Runs one invoke → parse → extract → write pass.
pub async fn run_tick<S, W>(source: &S, sink: &W, config: &AgentConfig) -> TickOutcome
where
    S: StatsSource + ?Sized,
    W: MetricsSink + ?Sized,
{
    let raw = match source.invoke().await {
        Ok(raw) => raw,
        Err(e) => {
            error!(stage = "invoke", error = %e, "Failed to collect container stats.");
            return TickOutcome::StatsUnavailable;
        }
    };

    let records = parse_records(&raw);
    if records.is_empty() {
        debug!(stage = "parse", "No container records this tick.");
        return TickOutcome::NoRecords;
    }

    let points = extract_points(&records, config);
    if points.is_empty() {
        warn!(
            stage = "extract",
            records = records.len(),
            "No metric points could be extracted, skipping write."
        );
        return TickOutcome::NoPoints;
    }

    let mut batch = Batch::new(config.influxdb_dbname.as_str());
    for point in points {
        batch.add_point(point);
    }
    let point_count = batch.len();

    match sink.write(batch).await {
        Ok(()) => TickOutcome::Written {
            points: point_count,
        },
        Err(e) => {
            error!(stage = "write", points = point_count, error = %e, "Failed to write metrics batch.");
            TickOutcome::WriteFailed {
                points: point_count,
            }
        }
    }
}

/// Runs a tick every `config.collect_interval`, the first one immediately, until
/// the shutdown channel fires. A tick always finishes before the next one is
/// considered; ticks missed while a slow one was running are not replayed.
pub async fn collection_loop<S, W>(
    source: &S,
    sink: &W,
    config: &AgentConfig,
    mut shutdown_rx: watch::Receiver<()>,
) where
    S: StatsSource + ?Sized,
    W: MetricsSink + ?Sized,
{
    let period = if config.collect_interval.is_zero() {
        Duration::from_secs(crate::agent_modules::config::DEFAULT_INTERVAL_SECONDS)
    } else {
        config.collect_interval
    };
    let mut collect_interval = tokio::time::interval(period);
    collect_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        interval_seconds = period.as_secs(),
        measurement = %config.influxdb_measurement,
        "Metrics collection task started."
    );

    loop {
        tokio::select! {
            biased;

            _ = shutdown_rx.changed() => {
                info!("Shutdown signal received, terminating metrics collection loop.");
                break;
            }

            _ = collect_interval.tick() => {
                let outcome = run_tick(source, sink, config).await;
                debug!(outcome = ?outcome, "Collection tick finished.");
            }
        }
    }
    info!("Metrics collection loop gracefully shut down.");
}
