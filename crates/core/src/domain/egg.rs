use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::chicken::ChickenId;
use crate::domain::user::{SlackUserId, WorkspaceId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EggId(pub Uuid);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Egg {
    pub id: EggId,
    pub workspace_id: WorkspaceId,
    pub laid_by: ChickenId,
    pub given_by: SlackUserId,
    pub owned_by: SlackUserId,
    pub laid_on: NaiveDate,
    pub created_at: DateTime<Utc>,
}

impl Egg {
    pub fn lay(
        chicken: ChickenId,
        workspace_id: WorkspaceId,
        given_by: SlackUserId,
        owned_by: SlackUserId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: EggId(Uuid::new_v4()),
            workspace_id,
            laid_by: chicken,
            given_by,
            owned_by,
            laid_on: now.date_naive(),
            created_at: now,
        }
    }
}
