mod bootstrap;
mod health;
mod services;

use std::time::Duration;

use anyhow::Result;
use henhouse_core::config::{AppConfig, LoadOptions};

fn init_logging(config: &AppConfig) {
    use henhouse_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Logging comes up before bootstrap so its events are captured.
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    health::spawn(
        &app.config.server.bind_address,
        app.config.server.health_check_port,
        app.db_pool.clone(),
    )
    .await?;

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        marker_emoji = %app.config.rewards.marker_emoji,
        chickens_per_user = app.config.rewards.chickens_per_user,
        "henhouse-server started"
    );

    tokio::select! {
        result = app.slack_runner.start() => {
            result?;
            wait_for_shutdown().await?;
        }
        result = wait_for_shutdown() => result?,
    }

    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "henhouse-server stopping"
    );
    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    if tokio::time::timeout(grace, app.db_pool.close()).await.is_err() {
        tracing::warn!(
            event_name = "system.server.shutdown_timeout",
            correlation_id = "shutdown",
            grace_secs = grace.as_secs(),
            "database pool did not close within the grace period"
        );
    }

    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
