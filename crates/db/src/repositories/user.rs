use chrono::{DateTime, Utc};
use sqlx::Row;

use henhouse_core::domain::chicken::Chicken;
use henhouse_core::domain::user::{SlackUser, SlackUserId, WorkspaceId};

use super::chicken::insert_chicken;
use super::{parse_date, parse_timestamp, Provisioned, RepositoryError, SlackUserRepository};
use crate::DbPool;

pub struct SqlSlackUserRepository {
    pool: DbPool,
}

impl SqlSlackUserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> Result<SlackUser, RepositoryError> {
    let workspace_id: String =
        row.try_get("workspace_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let user_id: String =
        row.try_get("user_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let is_active: bool =
        row.try_get("is_active").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let refreshed_on: Option<String> = row
        .try_get("daily_eggs_last_refreshed_on")
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(SlackUser {
        workspace_id: WorkspaceId(workspace_id),
        user_id: SlackUserId(user_id),
        is_active,
        daily_eggs_last_refreshed_on: refreshed_on.as_deref().map(parse_date).transpose()?,
        created_at: parse_timestamp(&created_at)?,
    })
}

#[async_trait::async_trait]
impl SlackUserRepository for SqlSlackUserRepository {
    async fn find(
        &self,
        workspace_id: &WorkspaceId,
        user_id: &SlackUserId,
    ) -> Result<Option<SlackUser>, RepositoryError> {
        let row = sqlx::query(
            "SELECT workspace_id, user_id, is_active, daily_eggs_last_refreshed_on, created_at
             FROM slack_user WHERE workspace_id = ? AND user_id = ?",
        )
        .bind(&workspace_id.0)
        .bind(&user_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_user).transpose()
    }

    async fn ensure_provisioned(
        &self,
        workspace_id: &WorkspaceId,
        user_id: &SlackUserId,
        chickens: u32,
        now: DateTime<Utc>,
    ) -> Result<Provisioned, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            "INSERT OR IGNORE INTO slack_user (workspace_id, user_id, is_active, created_at)
             VALUES (?, ?, 1, ?)",
        )
        .bind(&workspace_id.0)
        .bind(&user_id.0)
        .bind(now.to_rfc3339())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let created = inserted == 1;
        if created {
            for _ in 0..chickens {
                let chicken = Chicken::hatch(workspace_id.clone(), user_id.clone(), now);
                insert_chicken(&mut *tx, &chicken).await?;
            }
        }

        let row = sqlx::query(
            "SELECT workspace_id, user_id, is_active, daily_eggs_last_refreshed_on, created_at
             FROM slack_user WHERE workspace_id = ? AND user_id = ?",
        )
        .bind(&workspace_id.0)
        .bind(&user_id.0)
        .fetch_one(&mut *tx)
        .await?;
        let user = row_to_user(&row)?;

        tx.commit().await?;
        Ok(Provisioned { user, created })
    }
}
