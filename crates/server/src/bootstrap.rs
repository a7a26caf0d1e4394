use std::sync::Arc;

use henhouse_core::config::{AppConfig, ConfigError, LoadOptions};
use henhouse_core::RewardExtractor;
use henhouse_db::{connect_with_settings, migrations, DbPool};
use henhouse_slack::commands::{CommandRouter, LoggingNotifier, Notifier};
use henhouse_slack::events::{henhouse_dispatcher, MessageDispatcher};
use henhouse_slack::socket::{NoopSocketTransport, ReconnectPolicy, SocketModeRunner};
use thiserror::Error;
use tracing::info;

use crate::services::{ChickenRenamer, DirectMessageCommands, EggGiver, Repositories};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub slack_runner: SocketModeRunner,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let notifier: Arc<dyn Notifier> = Arc::new(LoggingNotifier);
    let dispatcher = message_dispatcher(&config, Repositories::sqlite(db_pool.clone()), &notifier);
    let slack_runner = SocketModeRunner::new(
        Arc::new(NoopSocketTransport),
        henhouse_dispatcher(dispatcher),
        ReconnectPolicy::default(),
    )
    .with_failure_notifier(notifier);

    Ok(Application { config, db_pool, slack_runner })
}

/// Wires the collaborator services into a message dispatcher.
pub fn message_dispatcher(
    config: &AppConfig,
    repositories: Repositories,
    notifier: &Arc<dyn Notifier>,
) -> MessageDispatcher {
    let chickens_per_user = config.rewards.chickens_per_user;
    let renamer = Arc::new(ChickenRenamer::new(repositories.clone(), notifier.clone()));
    let commands = DirectMessageCommands::new(
        repositories.clone(),
        notifier.clone(),
        renamer.clone(),
        chickens_per_user,
    );
    let eggs = EggGiver::new(repositories, notifier.clone(), chickens_per_user);

    MessageDispatcher::new(
        RewardExtractor::new(&config.rewards.marker_emoji),
        renamer,
        CommandRouter::new(Arc::new(commands)),
        Arc::new(eggs),
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use henhouse_core::config::{AppConfig, ConfigOverrides, LoadOptions};
    use henhouse_core::domain::user::{SlackUserId, WorkspaceId};
    use henhouse_core::DmCommand;
    use henhouse_db::repositories::{EggRepository, SqlEggRepository};
    use henhouse_slack::commands::Notifier;
    use henhouse_slack::events::{
        ConversationType, EventContext, GiveOutcome, MessageEvent, MessageOutcome, ReplyOutcome,
    };

    use crate::bootstrap::{bootstrap, message_dispatcher};
    use crate::services::testing::RecordingNotifier;
    use crate::services::Repositories;

    #[tokio::test]
    async fn bootstrap_fails_fast_without_required_slack_tokens() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                slack_app_token: Some("invalid-token".to_string()),
                slack_bot_token: Some("xoxb-valid".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await;

        assert!(result.is_err());
        let message = result.err().expect("error").to_string();
        assert!(message.contains("slack.app_token"));
    }

    #[tokio::test]
    async fn bootstrap_applies_henhouse_schema() {
        let app = bootstrap(valid_overrides("sqlite::memory:"))
            .await
            .expect("bootstrap should succeed with valid overrides");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN ('slack_user', 'chicken', 'egg')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("schema query");
        assert_eq!(table_count, 3);

        app.db_pool.close().await;
    }

    #[tokio::test]
    async fn public_reward_then_rename_conversation_end_to_end() {
        let app = bootstrap(valid_overrides("sqlite::memory:")).await.expect("bootstrap");
        let repositories = Repositories::sqlite(app.db_pool.clone());
        let recorder = Arc::new(RecordingNotifier::default());
        let notifier: Arc<dyn Notifier> = recorder.clone();
        let dispatcher = message_dispatcher(&app.config, repositories.clone(), &notifier);
        let ctx = EventContext::default();
        let workspace = WorkspaceId("T1".to_owned());

        let outcome = dispatcher
            .handle_message(
                &event(ConversationType::Public, "USENDER", "<@U1234> good job! :egg: :egg:"),
                &ctx,
            )
            .await
            .expect("reward");
        assert!(matches!(
            outcome,
            MessageOutcome::EggsGiven(GiveOutcome::Credited { eggs_per_recipient: 2, .. })
        ));
        let eggs = SqlEggRepository::new(app.db_pool.clone());
        let received =
            eggs.count_received(&workspace, &SlackUserId("U1234".to_owned())).await.expect("count");
        assert_eq!(received, 2);

        let outcome = dispatcher
            .handle_message(&event(ConversationType::DirectMessage, "U1234", "rename"), &ctx)
            .await
            .expect("rename command");
        assert_eq!(outcome, MessageOutcome::CommandHandled(DmCommand::Rename));

        let outcome = dispatcher
            .handle_message(&event(ConversationType::DirectMessage, "U1234", "eggs"), &ctx)
            .await
            .expect("reply");
        assert!(matches!(
            outcome,
            MessageOutcome::ReplyResolved(ReplyOutcome::Renamed { ref name, .. }) if name == "eggs"
        ));

        let chickens = repositories
            .chickens
            .list_for_owner(&workspace, &SlackUserId("U1234".to_owned()))
            .await
            .expect("list");
        assert_eq!(chickens[0].name.as_deref(), Some("eggs"));
        assert!(recorder.sent().await.iter().any(|(user, _)| user == "U1234"));

        app.db_pool.close().await;
    }

    fn event(conversation_type: ConversationType, sender: &str, text: &str) -> MessageEvent {
        MessageEvent {
            channel_id: "C1".to_owned(),
            conversation_type,
            sender: Some(SlackUserId(sender.to_owned())),
            workspace_id: WorkspaceId("T1".to_owned()),
            text: text.to_owned(),
            subtype: None,
            ts: "1730000000.0001".to_owned(),
        }
    }

    fn valid_overrides(database_url: &str) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(database_url.to_string()),
                slack_app_token: Some("xapp-test".to_string()),
                slack_bot_token: Some("xoxb-test".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[test]
    fn default_config_hatches_five_chickens() {
        assert_eq!(AppConfig::default().rewards.chickens_per_user, 5);
    }
}
