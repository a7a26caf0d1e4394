use henhouse_core::config::{AppConfig, LoadOptions};
use henhouse_db::{connect_with_settings, migrations};

use crate::commands::{CommandFailure, CommandResult, FailureClass};

pub fn run() -> CommandResult {
    CommandResult::status("migrate", migrate())
}

fn migrate() -> Result<String, CommandFailure> {
    let config = AppConfig::load(LoadOptions::default()).map_err(|error| {
        CommandFailure::new(FailureClass::ConfigValidation, format!("configuration issue: {error}"))
    })?;

    let runtime =
        tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|error| {
            CommandFailure::new(
                FailureClass::RuntimeInit,
                format!("failed to initialize async runtime: {error}"),
            )
        })?;

    runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| CommandFailure::new(FailureClass::DbConnectivity, error.to_string()))?;

        let applied = migrations::run_pending(&pool)
            .await
            .map_err(|error| CommandFailure::new(FailureClass::Migration, error.to_string()));
        pool.close().await;
        applied?;

        Ok(format!(
            "henhouse schema is current ({} migrations known to this build)",
            migrations::MIGRATOR.iter().count()
        ))
    })
}
