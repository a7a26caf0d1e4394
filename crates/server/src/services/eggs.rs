use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, warn};

use henhouse_core::domain::user::{SlackUserId, WorkspaceId};
use henhouse_core::{ApplicationError, DomainError};
use henhouse_db::repositories::{LayEggsRequest, LayEggsResult};
use henhouse_slack::blocks::eggs_received_message;
use henhouse_slack::commands::Notifier;
use henhouse_slack::events::{EggGivingService, GiveOutcome};

use super::{persistence, Repositories};

/// Credits eggs from the sender's chickens. Senders cannot reward themselves;
/// they are dropped from the recipient list.
pub struct EggGiver {
    repositories: Repositories,
    notifier: Arc<dyn Notifier>,
    chickens_per_user: u32,
}

impl EggGiver {
    pub fn new(
        repositories: Repositories,
        notifier: Arc<dyn Notifier>,
        chickens_per_user: u32,
    ) -> Self {
        Self { repositories, notifier, chickens_per_user }
    }
}

#[async_trait]
impl EggGivingService for EggGiver {
    async fn give_eggs(
        &self,
        workspace: &WorkspaceId,
        sender: &SlackUserId,
        count: u32,
        recipients: &[SlackUserId],
    ) -> Result<GiveOutcome, ApplicationError> {
        if count == 0 {
            return Err(DomainError::InvariantViolation(
                "egg count must be at least one".to_owned(),
            )
            .into());
        }

        let eligible: Vec<SlackUserId> =
            recipients.iter().filter(|recipient| *recipient != sender).cloned().collect();
        if eligible.is_empty() {
            info!(
                event_name = "henhouse.eggs.no_eligible_recipients",
                workspace_id = %workspace,
                user_id = %sender,
                "sender only rewarded themselves; nothing to give"
            );
            return Ok(GiveOutcome::NoEligibleRecipients);
        }

        let now = Utc::now();
        for user in std::iter::once(sender).chain(eligible.iter()) {
            self.repositories
                .users
                .ensure_provisioned(workspace, user, self.chickens_per_user, now)
                .await
                .map_err(persistence)?;
        }

        let request = LayEggsRequest {
            workspace_id: workspace.clone(),
            giver_id: sender.clone(),
            recipients: eligible.clone(),
            eggs_per_recipient: count,
            today: now.date_naive(),
            now,
        };

        match self.repositories.eggs.lay_eggs(request).await.map_err(persistence)? {
            LayEggsResult::Insufficient { available, requested } => {
                info!(
                    event_name = "henhouse.eggs.insufficient",
                    workspace_id = %workspace,
                    user_id = %sender,
                    available,
                    requested,
                    "sender does not have enough eggs left today"
                );
                Err(DomainError::InsufficientEggs { available, requested }.into())
            }
            LayEggsResult::Laid { eggs, remaining_today } => {
                info!(
                    event_name = "henhouse.eggs.given",
                    workspace_id = %workspace,
                    user_id = %sender,
                    recipients = eligible.len(),
                    eggs = eggs.len(),
                    remaining_today,
                    "eggs given"
                );

                for recipient in &eligible {
                    let message = eggs_received_message(sender, count);
                    if let Err(error) =
                        self.notifier.send_direct_message(workspace, recipient, message).await
                    {
                        warn!(
                            event_name = "henhouse.eggs.notify_failed",
                            workspace_id = %workspace,
                            user_id = %recipient,
                            error = %error,
                            "could not tell recipient about their eggs"
                        );
                    }
                }

                Ok(GiveOutcome::Credited {
                    recipients: eligible,
                    eggs_per_recipient: count,
                    remaining_today,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use henhouse_core::domain::user::{SlackUserId, WorkspaceId};
    use henhouse_core::{ApplicationError, DomainError};
    use henhouse_db::{connect_with_settings, migrations};
    use henhouse_slack::events::{EggGivingService, GiveOutcome};

    use super::EggGiver;
    use crate::services::testing::RecordingNotifier;
    use crate::services::Repositories;

    fn workspace() -> WorkspaceId {
        WorkspaceId("T1".to_owned())
    }

    fn ids(raw: &[&str]) -> Vec<SlackUserId> {
        raw.iter().map(|id| SlackUserId((*id).to_owned())).collect()
    }

    async fn sqlite_giver() -> (EggGiver, Repositories, Arc<RecordingNotifier>) {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrate");
        let repositories = Repositories::sqlite(pool);
        let notifier = Arc::new(RecordingNotifier::default());
        (EggGiver::new(repositories.clone(), notifier.clone(), 5), repositories, notifier)
    }

    #[tokio::test]
    async fn credits_each_recipient_and_tells_them() {
        let (giver, repositories, notifier) = sqlite_giver().await;
        let sender = SlackUserId("USENDER".to_owned());

        let outcome = giver
            .give_eggs(&workspace(), &sender, 2, &ids(&["U1234", "U2345"]))
            .await
            .expect("give");

        assert_eq!(
            outcome,
            GiveOutcome::Credited {
                recipients: ids(&["U1234", "U2345"]),
                eggs_per_recipient: 2,
                remaining_today: 1,
            }
        );
        for recipient in ids(&["U1234", "U2345"]) {
            let received =
                repositories.eggs.count_received(&workspace(), &recipient).await.expect("count");
            assert_eq!(received, 2);
        }
        let sent = notifier.sent().await;
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0], ("U1234".to_owned(), "You received 2 egg(s)".to_owned()));
    }

    #[tokio::test]
    async fn sender_is_dropped_from_recipients() {
        let (giver, repositories, _) = sqlite_giver().await;
        let sender = SlackUserId("USENDER".to_owned());

        let outcome = giver
            .give_eggs(&workspace(), &sender, 1, &ids(&["USENDER", "U1234"]))
            .await
            .expect("give");

        let GiveOutcome::Credited { recipients, .. } = outcome else {
            panic!("expected eggs to be credited");
        };
        assert_eq!(recipients, ids(&["U1234"]));
        let own = repositories.eggs.count_received(&workspace(), &sender).await.expect("count");
        assert_eq!(own, 0);
    }

    #[tokio::test]
    async fn rewarding_only_yourself_is_a_no_op() {
        let (giver, repositories, notifier) = sqlite_giver().await;
        let sender = SlackUserId("USENDER".to_owned());

        let outcome =
            giver.give_eggs(&workspace(), &sender, 3, &ids(&["USENDER"])).await.expect("give");

        assert_eq!(outcome, GiveOutcome::NoEligibleRecipients);
        assert_eq!(repositories.users.find(&workspace(), &sender).await.expect("find"), None);
        assert!(notifier.sent().await.is_empty());
    }

    #[tokio::test]
    async fn over_allowance_gives_nothing() {
        let (giver, repositories, notifier) = sqlite_giver().await;
        let sender = SlackUserId("USENDER".to_owned());

        let error = giver
            .give_eggs(&workspace(), &sender, 2, &ids(&["U1", "U2", "U3"]))
            .await
            .expect_err("six eggs from five chickens");

        assert_eq!(
            error,
            ApplicationError::Domain(DomainError::InsufficientEggs { available: 5, requested: 6 })
        );
        for recipient in ids(&["U1", "U2", "U3"]) {
            let received =
                repositories.eggs.count_received(&workspace(), &recipient).await.expect("count");
            assert_eq!(received, 0);
        }
        assert!(notifier.sent().await.is_empty());
    }

    #[tokio::test]
    async fn daily_allowance_is_spent_across_messages() {
        let repositories = Repositories::in_memory();
        let giver =
            EggGiver::new(repositories.clone(), Arc::new(RecordingNotifier::default()), 3);
        let sender = SlackUserId("USENDER".to_owned());

        giver.give_eggs(&workspace(), &sender, 2, &ids(&["U1"])).await.expect("first give");
        let error = giver
            .give_eggs(&workspace(), &sender, 2, &ids(&["U2"]))
            .await
            .expect_err("only one egg left");

        assert_eq!(
            error,
            ApplicationError::Domain(DomainError::InsufficientEggs { available: 1, requested: 2 })
        );
        let outcome =
            giver.give_eggs(&workspace(), &sender, 1, &ids(&["U2"])).await.expect("last egg");
        assert!(matches!(outcome, GiveOutcome::Credited { remaining_today: 0, .. }));
    }
}
