//! Alliance Guard daemon
//!
//! Runs the alliance integrity engine: seeds alliances, bootstraps bot
//! ownership, and keeps the integrity monitor scanning until shutdown.

use std::path::PathBuf;

use alliance_daemon::{DaemonConfig, DaemonError, DaemonResult, GuardDaemon, Overrides};
use alliance_types::ActorId;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Alliance Guard CLI
#[derive(Parser)]
#[command(name = "alliance-guardd")]
#[command(about = "Alliance Guard - mutation integrity daemon", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "ALLIANCE_CONFIG")]
    config: Option<String>,

    /// JSON file with the initial alliances
    #[arg(short, long, env = "ALLIANCE_SEED")]
    seed: Option<PathBuf>,

    /// Bot owner id
    #[arg(long, env = "ALLIANCE_BOT_OWNER")]
    bot_owner: Option<String>,

    /// Platform (guild) owner id
    #[arg(long, env = "ALLIANCE_DISCORD_OWNER")]
    discord_owner: Option<String>,

    /// Integrity scan interval in milliseconds
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Log level, overriding `logging.level`
    #[arg(long, env = "ALLIANCE_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "ALLIANCE_LOG_JSON")]
    json: bool,
}

#[tokio::main]
async fn main() -> DaemonResult<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = DaemonConfig::load(cli.config.as_deref())
        .map_err(|e| DaemonError::Config(e.to_string()))?;

    // Override with CLI args
    config.apply_overrides(Overrides {
        seed_path: cli.seed,
        bot_owner_id: cli.bot_owner.map(ActorId::new),
        discord_owner_id: cli.discord_owner.map(ActorId::new),
        interval_ms: cli.interval_ms,
        log_level: cli.log_level,
        json: cli.json,
    });

    // Initialize tracing
    let env_filter = config.logging.env_filter();
    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        interval_ms = config.integrity.monitor.interval_ms,
        log_level = %config.logging.level,
        "Alliance guard starting"
    );

    let daemon = GuardDaemon::new(config).await?;
    daemon.run_until(shutdown_signal()).await
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to install terminate handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
