use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use henhouse_core::domain::chicken::{normalize_chicken_name, Chicken};
use henhouse_core::domain::user::{SlackUserId, WorkspaceId};
use henhouse_core::{ApplicationError, DomainError};
use henhouse_slack::blocks::{rename_complete_message, rename_prompt_message};
use henhouse_slack::commands::Notifier;
use henhouse_slack::events::{PendingReplyService, ReplyOutcome};

use super::{persistence, Repositories};

/// Applies DM replies to chickens awaiting a new name, one chicken per reply
/// in hatch order.
pub struct ChickenRenamer {
    repositories: Repositories,
    notifier: Arc<dyn Notifier>,
}

impl ChickenRenamer {
    pub fn new(repositories: Repositories, notifier: Arc<dyn Notifier>) -> Self {
        Self { repositories, notifier }
    }

    /// Prompts the owner for the next chicken still awaiting a name, if any.
    pub(crate) async fn prompt_next(
        &self,
        workspace: &WorkspaceId,
        owner: &SlackUserId,
    ) -> Result<Option<Chicken>, ApplicationError> {
        let chickens = self
            .repositories
            .chickens
            .list_for_owner(workspace, owner)
            .await
            .map_err(persistence)?;
        let remaining = chickens.iter().filter(|chicken| chicken.awaiting_rename).count();
        let Some(next) = chickens.into_iter().find(|chicken| chicken.awaiting_rename) else {
            return Ok(None);
        };

        self.notifier
            .send_direct_message(workspace, owner, rename_prompt_message(&next, remaining))
            .await?;
        Ok(Some(next))
    }
}

#[async_trait]
impl PendingReplyService for ChickenRenamer {
    async fn find_pending(
        &self,
        user: &SlackUserId,
        workspace: &WorkspaceId,
    ) -> Result<Option<Chicken>, ApplicationError> {
        self.repositories.chickens.find_awaiting_rename(workspace, user).await.map_err(persistence)
    }

    async fn resolve_pending(
        &self,
        chicken: &Chicken,
        reply: &str,
    ) -> Result<ReplyOutcome, ApplicationError> {
        let name = normalize_chicken_name(reply).ok_or(DomainError::InvalidChickenName)?;

        let applied = self
            .repositories
            .chickens
            .rename_if_awaiting(&chicken.id, &name)
            .await
            .map_err(persistence)?;
        if !applied {
            info!(
                event_name = "henhouse.rename.stale",
                workspace_id = %chicken.workspace_id,
                user_id = %chicken.owner_id,
                chicken_id = %chicken.id.0,
                "chicken was no longer awaiting a rename"
            );
            return Ok(ReplyOutcome::Stale);
        }

        info!(
            event_name = "henhouse.rename.applied",
            workspace_id = %chicken.workspace_id,
            user_id = %chicken.owner_id,
            chicken_id = %chicken.id.0,
            "chicken renamed"
        );
        // The rename is committed; reply failures must not report it as failed.
        let replied = async {
            self.notifier
                .send_direct_message(
                    &chicken.workspace_id,
                    &chicken.owner_id,
                    rename_complete_message(&name),
                )
                .await?;
            self.prompt_next(&chicken.workspace_id, &chicken.owner_id).await?;
            Ok::<(), ApplicationError>(())
        }
        .await;
        if let Err(error) = replied {
            warn!(
                event_name = "henhouse.rename.notify_failed",
                workspace_id = %chicken.workspace_id,
                user_id = %chicken.owner_id,
                chicken_id = %chicken.id.0,
                error = %error,
                "could not send rename confirmation"
            );
        }

        Ok(ReplyOutcome::Renamed { chicken_id: chicken.id, name })
    }
}
