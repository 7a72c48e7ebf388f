use clap::Parser;
use std::error::Error;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_appender::rolling;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use docker_stats_agent::agent_modules::config::{resolve_config, AgentCli, DEFAULT_LOG_DIR};
use docker_stats_agent::agent_modules::scheduler::{collection_loop, run_tick};
use docker_stats_agent::agent_modules::stats::DockerStats;
use docker_stats_agent::agent_modules::writer::InfluxWriter;
use docker_stats_agent::version::AGENT_VERSION;

fn init_logging(log_dir: &str) {
    // Log to a file: JSON format, daily rotation
    let file_appender = rolling::daily(log_dir, "docker-stats-agent.log");
    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .json();

    let stdout_layer = fmt::layer().with_writer(std::io::stdout);

    // Default to `info` level if RUST_LOG is not set.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();
}

/// Resolves once Ctrl-C or, on unix, SIGTERM arrives.
async fn wait_for_termination() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
                return;
            }
            Err(e) => {
                warn!(error = %e, "Could not install SIGTERM handler, only Ctrl-C will stop the agent.");
            }
        }
    }
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl-C.");
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // A missing .env file is fine.
    dotenv::dotenv().ok();
    let cli = AgentCli::parse();

    init_logging(cli.log_dir.as_deref().unwrap_or(DEFAULT_LOG_DIR));
    info!(version = AGENT_VERSION, "Starting docker stats agent...");

    let config = match resolve_config(&cli).await {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Critical error resolving configuration. Exiting.");
            return Err(e.into());
        }
    };

    let source = DockerStats::new(config.docker_bin.clone());
    let sink = InfluxWriter::new(&config);

    if cli.once {
        let outcome = run_tick(&source, &sink, &config).await;
        info!(outcome = ?outcome, "Single collection finished.");
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(());
    tokio::spawn(async move {
        wait_for_termination().await;
        info!("Termination signal received.");
        let _ = shutdown_tx.send(());
    });

    collection_loop(&source, &sink, &config, shutdown_rx).await;
    info!("Agent stopped.");
    Ok(())
}
