use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::RwLock;

use henhouse_core::domain::chicken::{Chicken, ChickenId};
use henhouse_core::domain::egg::Egg;
use henhouse_core::domain::user::{SlackUser, SlackUserId, WorkspaceId};

use super::{
    ChickenRepository, EggRepository, LayEggsRequest, LayEggsResult, Provisioned,
    RepositoryError, SlackUserRepository,
};

#[derive(Default)]
struct HenhouseState {
    users: HashMap<(WorkspaceId, SlackUserId), SlackUser>,
    /// Kept in hatch order.
    chickens: Vec<Chicken>,
    eggs: Vec<Egg>,
}

impl HenhouseState {
    fn owned_by<'a>(
        &'a self,
        workspace_id: &'a WorkspaceId,
        owner_id: &'a SlackUserId,
    ) -> impl Iterator<Item = &'a Chicken> + 'a {
        self.chickens
            .iter()
            .filter(move |c| &c.workspace_id == workspace_id && &c.owner_id == owner_id)
    }

    fn refresh_if_stale(
        &mut self,
        workspace_id: &WorkspaceId,
        giver_id: &SlackUserId,
        today: NaiveDate,
    ) -> Result<(), RepositoryError> {
        let user = self.users.get_mut(&(workspace_id.clone(), giver_id.clone())).ok_or_else(
            || RepositoryError::NotFound(format!("slack user {workspace_id}/{giver_id}")),
        )?;
        if !user.needs_daily_refresh(today) {
            return Ok(());
        }
        user.daily_eggs_last_refreshed_on = Some(today);
        for chicken in self
            .chickens
            .iter_mut()
            .filter(|c| &c.workspace_id == workspace_id && &c.owner_id == giver_id)
        {
            chicken.laid_today = false;
        }
        Ok(())
    }
}

/// Test double that keeps users, chickens and eggs in one locked state so
/// multi-step operations stay atomic.
#[derive(Default)]
pub struct InMemoryHenhouse {
    state: RwLock<HenhouseState>,
}

#[async_trait::async_trait]
impl SlackUserRepository for InMemoryHenhouse {
    async fn find(
        &self,
        workspace_id: &WorkspaceId,
        user_id: &SlackUserId,
    ) -> Result<Option<SlackUser>, RepositoryError> {
        let state = self.state.read().await;
        let user = state.users.get(&(workspace_id.clone(), user_id.clone())).cloned();
        Ok(user)
    }

    async fn ensure_provisioned(
        &self,
        workspace_id: &WorkspaceId,
        user_id: &SlackUserId,
        chickens: u32,
        now: DateTime<Utc>,
    ) -> Result<Provisioned, RepositoryError> {
        let mut state = self.state.write().await;
        let key = (workspace_id.clone(), user_id.clone());
        if let Some(user) = state.users.get(&key) {
            return Ok(Provisioned { user: user.clone(), created: false });
        }

        let user = SlackUser::new(workspace_id.clone(), user_id.clone(), now);
        state.users.insert(key, user.clone());
        for _ in 0..chickens {
            state.chickens.push(Chicken::hatch(workspace_id.clone(), user_id.clone(), now));
        }
        Ok(Provisioned { user, created: true })
    }
}

#[async_trait::async_trait]
impl ChickenRepository for InMemoryHenhouse {
    async fn list_for_owner(
        &self,
        workspace_id: &WorkspaceId,
        owner_id: &SlackUserId,
    ) -> Result<Vec<Chicken>, RepositoryError> {
        let state = self.state.read().await;
        let chickens = state.owned_by(workspace_id, owner_id).cloned().collect();
        Ok(chickens)
    }

    async fn find_awaiting_rename(
        &self,
        workspace_id: &WorkspaceId,
        owner_id: &SlackUserId,
    ) -> Result<Option<Chicken>, RepositoryError> {
        let state = self.state.read().await;
        let pending = state.owned_by(workspace_id, owner_id).find(|c| c.awaiting_rename).cloned();
        Ok(pending)
    }

    async fn mark_all_awaiting_rename(
        &self,
        workspace_id: &WorkspaceId,
        owner_id: &SlackUserId,
    ) -> Result<u64, RepositoryError> {
        let mut state = self.state.write().await;
        let mut marked = 0;
        for chicken in state
            .chickens
            .iter_mut()
            .filter(|c| &c.workspace_id == workspace_id && &c.owner_id == owner_id)
        {
            chicken.awaiting_rename = true;
            marked += 1;
        }
        Ok(marked)
    }

    async fn rename_if_awaiting(
        &self,
        id: &ChickenId,
        name: &str,
    ) -> Result<bool, RepositoryError> {
        let mut state = self.state.write().await;
        let Some(chicken) = state.chickens.iter_mut().find(|c| &c.id == id && c.awaiting_rename)
        else {
            return Ok(false);
        };
        chicken.name = Some(name.to_owned());
        chicken.awaiting_rename = false;
        Ok(true)
    }
}

#[async_trait::async_trait]
impl EggRepository for InMemoryHenhouse {
    async fn lay_eggs(&self, request: LayEggsRequest) -> Result<LayEggsResult, RepositoryError> {
        let mut state = self.state.write().await;
        let workspace_id = &request.workspace_id;
        let giver_id = &request.giver_id;

        // Work on a copy so an insufficient allowance leaves the state untouched.
        let mut draft = HenhouseState {
            users: state.users.clone(),
            chickens: state.chickens.clone(),
            eggs: Vec::new(),
        };
        draft.refresh_if_stale(workspace_id, giver_id, request.today)?;

        let layers: Vec<ChickenId> = draft
            .owned_by(workspace_id, giver_id)
            .filter(|c| !c.laid_today)
            .map(|c| c.id)
            .collect();
        let available = u32::try_from(layers.len()).unwrap_or(u32::MAX);
        let requested = request.total_requested();
        if available < requested {
            return Ok(LayEggsResult::Insufficient { available, requested });
        }

        let mut layers = layers.into_iter();
        let mut eggs = Vec::new();
        for recipient in &request.recipients {
            for _ in 0..request.eggs_per_recipient {
                let Some(chicken_id) = layers.next() else {
                    return Err(RepositoryError::Decode(
                        "ran out of laying chickens after availability check".to_owned(),
                    ));
                };
                if let Some(chicken) = draft.chickens.iter_mut().find(|c| c.id == chicken_id) {
                    chicken.laid_today = true;
                }
                let egg = Egg::lay(
                    chicken_id,
                    workspace_id.clone(),
                    giver_id.clone(),
                    recipient.clone(),
                    request.now,
                );
                eggs.push(Egg { laid_on: request.today, ..egg });
            }
        }

        state.users = draft.users;
        state.chickens = draft.chickens;
        state.eggs.extend(eggs.iter().cloned());
        Ok(LayEggsResult::Laid { eggs, remaining_today: available - requested })
    }

    async fn count_received(
        &self,
        workspace_id: &WorkspaceId,
        owner_id: &SlackUserId,
    ) -> Result<u64, RepositoryError> {
        let state = self.state.read().await;
        let count = state
            .eggs
            .iter()
            .filter(|egg| &egg.workspace_id == workspace_id && &egg.owned_by == owner_id)
            .count();
        Ok(u64::try_from(count).unwrap_or(u64::MAX))
    }

    async fn available_today(
        &self,
        workspace_id: &WorkspaceId,
        giver_id: &SlackUserId,
        today: NaiveDate,
    ) -> Result<u32, RepositoryError> {
        let state = self.state.read().await;
        let user = state.users.get(&(workspace_id.clone(), giver_id.clone())).ok_or_else(|| {
            RepositoryError::NotFound(format!("slack user {workspace_id}/{giver_id}"))
        })?;
        let stale = user.needs_daily_refresh(today);
        let count =
            state.owned_by(workspace_id, giver_id).filter(|c| stale || !c.laid_today).count();
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }
}
