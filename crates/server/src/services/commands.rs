use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tracing::info;

use henhouse_core::domain::chicken::Chicken;
use henhouse_core::domain::user::{SlackUser, SlackUserId, WorkspaceId};
use henhouse_core::ApplicationError;
use henhouse_slack::blocks::{chickens_message, eggs_message, help_message};
use henhouse_slack::commands::{DmCommandService, Notifier};

use super::{persistence, ChickenRenamer, Repositories};

pub struct DirectMessageCommands {
    repositories: Repositories,
    notifier: Arc<dyn Notifier>,
    renamer: Arc<ChickenRenamer>,
    chickens_per_user: u32,
}

impl DirectMessageCommands {
    pub fn new(
        repositories: Repositories,
        notifier: Arc<dyn Notifier>,
        renamer: Arc<ChickenRenamer>,
        chickens_per_user: u32,
    ) -> Self {
        Self { repositories, notifier, renamer, chickens_per_user }
    }

    async fn provision(
        &self,
        user: &SlackUserId,
        workspace: &WorkspaceId,
    ) -> Result<SlackUser, ApplicationError> {
        let provisioned = self
            .repositories
            .users
            .ensure_provisioned(workspace, user, self.chickens_per_user, Utc::now())
            .await
            .map_err(persistence)?;
        if provisioned.created {
            info!(
                event_name = "henhouse.user.provisioned",
                workspace_id = %workspace,
                user_id = %user,
                chickens = self.chickens_per_user,
                "hatched chickens for new user"
            );
        }
        Ok(provisioned.user)
    }

    /// The owner's chickens with `laid_today` as of `today`. The stored flags
    /// are only reset on the owner's next give, so a stale refresh means none
    /// of them has laid yet today.
    pub(crate) async fn chickens_as_of(
        &self,
        user: &SlackUserId,
        workspace: &WorkspaceId,
        today: NaiveDate,
    ) -> Result<Vec<Chicken>, ApplicationError> {
        let owner = self.provision(user, workspace).await?;
        let mut chickens = self
            .repositories
            .chickens
            .list_for_owner(workspace, user)
            .await
            .map_err(persistence)?;
        if owner.needs_daily_refresh(today) {
            for chicken in &mut chickens {
                chicken.laid_today = false;
            }
        }
        Ok(chickens)
    }
}

#[async_trait]
impl DmCommandService for DirectMessageCommands {
    async fn help(
        &self,
        user: &SlackUserId,
        workspace: &WorkspaceId,
    ) -> Result<(), ApplicationError> {
        self.notifier.send_direct_message(workspace, user, help_message()).await
    }

    async fn start_rename(
        &self,
        user: &SlackUserId,
        workspace: &WorkspaceId,
    ) -> Result<(), ApplicationError> {
        self.provision(user, workspace).await?;
        let marked = self
            .repositories
            .chickens
            .mark_all_awaiting_rename(workspace, user)
            .await
            .map_err(persistence)?;
        info!(
            event_name = "henhouse.rename.started",
            workspace_id = %workspace,
            user_id = %user,
            chickens = marked,
            "rename conversation started"
        );

        self.renamer.prompt_next(workspace, user).await?;
        Ok(())
    }

    async fn list_chickens(
        &self,
        user: &SlackUserId,
        workspace: &WorkspaceId,
    ) -> Result<(), ApplicationError> {
        let chickens = self.chickens_as_of(user, workspace, Utc::now().date_naive()).await?;
        self.notifier.send_direct_message(workspace, user, chickens_message(&chickens)).await
    }

    async fn egg_balance(
        &self,
        user: &SlackUserId,
        workspace: &WorkspaceId,
    ) -> Result<(), ApplicationError> {
        self.provision(user, workspace).await?;
        let received =
            self.repositories.eggs.count_received(workspace, user).await.map_err(persistence)?;
        let available = self
            .repositories
            .eggs
            .available_today(workspace, user, Utc::now().date_naive())
            .await
            .map_err(persistence)?;

        self.notifier.send_direct_message(workspace, user, eggs_message(received, available)).await
    }
}
