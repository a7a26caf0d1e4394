use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use henhouse_core::domain::user::{SlackUserId, WorkspaceId};
use henhouse_core::{ApplicationError, DmCommand};

use crate::blocks::MessageTemplate;

/// Executes the administrative commands users send the bot in a direct message.
#[async_trait]
pub trait DmCommandService: Send + Sync {
    async fn help(&self, user: &SlackUserId, workspace: &WorkspaceId)
        -> Result<(), ApplicationError>;

    /// Starts the rename conversation for every chicken the user owns.
    async fn start_rename(
        &self,
        user: &SlackUserId,
        workspace: &WorkspaceId,
    ) -> Result<(), ApplicationError>;

    async fn list_chickens(
        &self,
        user: &SlackUserId,
        workspace: &WorkspaceId,
    ) -> Result<(), ApplicationError>;

    async fn egg_balance(
        &self,
        user: &SlackUserId,
        workspace: &WorkspaceId,
    ) -> Result<(), ApplicationError>;
}

/// Parses a DM into a [`DmCommand`] and hands it to the matching service method.
#[derive(Clone)]
pub struct CommandRouter {
    service: Arc<dyn DmCommandService>,
}

impl CommandRouter {
    pub fn new(service: Arc<dyn DmCommandService>) -> Self {
        Self { service }
    }

    /// Text outside the known command set fails with `UnrecognizedCommand`
    /// without calling the service.
    pub async fn route(
        &self,
        user: &SlackUserId,
        workspace: &WorkspaceId,
        text: &str,
    ) -> Result<DmCommand, ApplicationError> {
        let command = text.parse::<DmCommand>()?;
        match command {
            DmCommand::Help => self.service.help(user, workspace).await?,
            DmCommand::Rename => self.service.start_rename(user, workspace).await?,
            DmCommand::Chickens => self.service.list_chickens(user, workspace).await?,
            DmCommand::Eggs => self.service.egg_balance(user, workspace).await?,
        }
        Ok(command)
    }
}

/// Outbound direct messages to a user.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_direct_message(
        &self,
        workspace: &WorkspaceId,
        user: &SlackUserId,
        message: MessageTemplate,
    ) -> Result<(), ApplicationError>;
}

/// Notifier that records outbound messages in the log instead of delivering them.
#[derive(Default)]
pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn send_direct_message(
        &self,
        workspace: &WorkspaceId,
        user: &SlackUserId,
        message: MessageTemplate,
    ) -> Result<(), ApplicationError> {
        info!(
            event_name = "egress.slack.direct_message",
            workspace_id = %workspace,
            user_id = %user,
            blocks = message.blocks.len(),
            fallback_text = %message.fallback_text,
            "direct message queued"
        );
        Ok(())
    }
}
